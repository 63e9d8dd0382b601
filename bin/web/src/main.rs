//! Web server binary for RealText - a server-rendered threaded-discussion frontend.
//!
//! Thin presentation layer over the `realtext` core: handlers collect and
//! validate form input, resolve the caller from the session, call into the
//! core with that identity, and re-render from fresh reads. Policy
//! outcomes map to redirects; `Forbidden` and `NotFound` map to 403/404.

use askama::Template;
use axum::{
    extract::{Form, Path, Query, State},
    http::{header::REFERER, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use realtext::auth::{self, Password, User};
use realtext::error::RealtextError;
use realtext::messages::{self, EditOutcome, Message};
use realtext::storage::StoreConfig;
use realtext::store::DiscussionStore;
use realtext::topics::{self, Topic};
use realtext::types::{current_timestamp_millis, MessageId, TopicId, UserId};
use realtext::validation;
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_sessions::{MemoryStore, Session, SessionManagerLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod csrf;
mod templates;

use csrf::{get_csrf_token, CsrfProtectedForm, CsrfStore};
use templates::{
    FeedTemplate, LoginTemplate, MessageView, RegisterTemplate, ReplyView, TopicNav,
};

/// Session key holding the logged-in user's id.
const SESSION_USER_KEY: &str = "user_id";

/// Shared application state.
#[derive(Clone)]
struct AppState {
    store: Arc<DiscussionStore>,
    csrf: CsrfStore,
}

/// Form data for posting a message
#[derive(Debug, Deserialize)]
struct MessageForm {
    content: String,
    #[serde(default)]
    topic_id: Option<String>,
}

/// Form data for replying to a message
#[derive(Debug, Deserialize)]
struct ReplyForm {
    reply_content: String,
}

/// Form data for editing a message
#[derive(Debug, Deserialize)]
struct EditForm {
    content: String,
}

/// Form data for creating a topic
#[derive(Debug, Deserialize)]
struct TopicForm {
    topic_name: String,
}

/// Form data for registration
#[derive(Debug, Deserialize)]
struct RegisterForm {
    username: String,
    password: String,
    confirm_password: String,
}

/// Form data for login
#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

/// Query string carried through feed redirects.
#[derive(Debug, Deserialize, Default)]
struct FeedQuery {
    #[serde(default)]
    err: Option<String>,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "realtext=info,tower_http=debug".into()),
        )
        .init();

    let data_dir =
        std::env::var("REALTEXT_DATA_DIR").unwrap_or_else(|_| "realtext_data".to_string());
    let bind_addr = std::env::var("REALTEXT_BIND").unwrap_or_else(|_| "127.0.0.1:3000".to_string());

    let store = DiscussionStore::open(
        std::path::Path::new(&data_dir).join("db"),
        &StoreConfig::default(),
    )?;

    let state = AppState {
        store: Arc::new(store),
        csrf: CsrfStore::new(),
    };

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false) // Set to true in production with HTTPS
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_name("realtext-session")
        .with_http_only(true);

    let app = Router::new()
        .route("/", get(feed_page))
        .route("/topic/:topic_id", get(topic_feed_page))
        .route("/post", post(post_message))
        .route("/reply/:msg_id", post(post_reply))
        .route("/edit/:msg_id", get(edit_form).post(submit_edit))
        .route("/like/:msg_id", get(like_message))
        .route("/delete/:msg_id", get(delete_message))
        .route("/add_topic", post(add_topic))
        .route("/register", get(register_page).post(submit_register))
        .route("/login", get(login_page).post(submit_login))
        .route("/logout", get(logout))
        .nest_service("/static", ServeDir::new("static"))
        .layer(session_layer)
        .with_state(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("RealText running on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// =============================================================================
// Identity and error plumbing
// =============================================================================

/// Resolves the logged-in user from the session, if any.
async fn current_user(
    session: &Session,
    store: &DiscussionStore,
) -> std::result::Result<Option<User>, StatusCode> {
    let user_id: Option<u64> = session.get(SESSION_USER_KEY).await.map_err(|e| {
        error!("Failed to read session: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    match user_id {
        Some(raw) => store.get_user(UserId(raw)).map_err(internal_error),
        None => Ok(None),
    }
}

/// Maps a core error to the status code this layer exposes.
fn error_status(err: &RealtextError) -> StatusCode {
    match err {
        RealtextError::Unauthenticated => StatusCode::UNAUTHORIZED,
        RealtextError::Forbidden(_) => StatusCode::FORBIDDEN,
        RealtextError::NotFound(_) => StatusCode::NOT_FOUND,
        RealtextError::ContentInvalid(_)
        | RealtextError::Validation(_)
        | RealtextError::DuplicateUsername(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn internal_error(err: RealtextError) -> StatusCode {
    error!("Internal error: {}", err);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Where to send the caller back to, from the Referer header.
fn back_url(headers: &HeaderMap) -> String {
    headers
        .get(REFERER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("/")
        .to_string()
}

fn format_timestamp(millis: u64) -> String {
    chrono::DateTime::from_timestamp_millis(millis as i64)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

// =============================================================================
// Feed rendering
// =============================================================================

fn reply_view(
    store: &DiscussionStore,
    msg: &Message,
    viewer: Option<&User>,
) -> realtext::Result<ReplyView> {
    let author = store
        .get_user(msg.author)?
        .map(|u| u.username)
        .unwrap_or_else(|| "unknown".to_string());
    Ok(ReplyView {
        id: msg.id.0,
        author,
        content: msg.content.clone(),
        posted_at: format_timestamp(msg.created_at),
        like_count: store.like_count(msg.id)?,
        liked_by_me: match viewer {
            Some(u) => store.has_liked(u.id, msg.id)?,
            None => false,
        },
        can_delete: viewer.is_some_and(|u| u.id == msg.author || u.is_admin),
    })
}

fn message_view(
    store: &DiscussionStore,
    msg: &Message,
    viewer: Option<&User>,
    now: u64,
    editing_id: Option<MessageId>,
) -> realtext::Result<MessageView> {
    let author = store
        .get_user(msg.author)?
        .map(|u| u.username)
        .unwrap_or_else(|| "unknown".to_string());
    let topic_name = match msg.topic {
        Some(topic_id) => store.get_topic(topic_id)?.map(|t| t.name),
        None => None,
    };
    let replies = store
        .list_replies(msg.id)?
        .iter()
        .map(|r| reply_view(store, r, viewer))
        .collect::<realtext::Result<Vec<_>>>()?;

    Ok(MessageView {
        id: msg.id.0,
        author,
        content: msg.content.clone(),
        posted_at: format_timestamp(msg.created_at),
        topic_name,
        like_count: store.like_count(msg.id)?,
        liked_by_me: match viewer {
            Some(u) => store.has_liked(u.id, msg.id)?,
            None => false,
        },
        can_edit: viewer.is_some_and(|u| u.id == msg.author) && msg.is_editable_at(now),
        can_delete: viewer.is_some_and(|u| u.id == msg.author || u.is_admin),
        editing: editing_id == Some(msg.id),
        replies,
    })
}

/// Renders the feed page, optionally scoped to a topic, optionally with
/// one message swapped out for its inline edit form.
async fn render_feed(
    state: &AppState,
    session: &Session,
    topic: Option<&Topic>,
    editing: Option<&Message>,
    error: Option<String>,
) -> std::result::Result<Html<String>, StatusCode> {
    let store = &state.store;
    let viewer = current_user(session, store).await?;
    let now = current_timestamp_millis();

    let feed = messages::list_feed(store, topic.map(|t| t.id)).map_err(internal_error)?;
    let views = feed
        .iter()
        .map(|m| message_view(store, m, viewer.as_ref(), now, editing.map(|e| e.id)))
        .collect::<realtext::Result<Vec<_>>>()
        .map_err(internal_error)?;

    let topic_nav = topics::list_topics(store)
        .map_err(internal_error)?
        .into_iter()
        .map(|t| TopicNav {
            id: t.id.0,
            name: t.name,
        })
        .collect();

    let current_topic_name = match (editing, topic) {
        (Some(_), _) => "Editing...".to_string(),
        (None, Some(t)) => format!("#{}", t.name),
        (None, None) => "Community Feed".to_string(),
    };

    let csrf_token = get_csrf_token(session, &state.csrf).await?;
    let template = FeedTemplate {
        current_topic_name,
        post_topic_id: topic.map(|t| t.id.0),
        topics: topic_nav,
        messages: views,
        logged_in: viewer.is_some(),
        username: viewer.as_ref().map(|u| u.username.clone()).unwrap_or_default(),
        is_admin: viewer.as_ref().is_some_and(|u| u.is_admin),
        editing_content: editing.map(|m| m.content.clone()).unwrap_or_default(),
        error,
        csrf_token,
    };
    Ok(Html(template.render().map_err(|e| {
        error!("Template rendering failed: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?))
}

fn feed_error_message(code: &str) -> String {
    match code {
        "invalid" => "Messages must be between 1 and 500 characters.".to_string(),
        "topic_invalid" => "Topic names must be between 1 and 50 characters.".to_string(),
        other => other.to_string(),
    }
}

// =============================================================================
// Feed and message handlers
// =============================================================================

/// Community feed: top-level messages of every topic plus topic-less ones.
async fn feed_page(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<FeedQuery>,
) -> std::result::Result<Html<String>, StatusCode> {
    let error = query.err.as_deref().map(feed_error_message);
    render_feed(&state, &session, None, None, error).await
}

/// Feed filtered to one topic.
async fn topic_feed_page(
    State(state): State<AppState>,
    session: Session,
    Path(topic_id): Path<u64>,
    Query(query): Query<FeedQuery>,
) -> std::result::Result<Html<String>, StatusCode> {
    let topic = state
        .store
        .get_topic(TopicId(topic_id))
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;
    let error = query.err.as_deref().map(feed_error_message);
    render_feed(&state, &session, Some(&topic), None, error).await
}

/// Creates a top-level message from the inline form.
async fn post_message(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CsrfProtectedForm<MessageForm>>,
) -> std::result::Result<Response, StatusCode> {
    if !form.validate(&session, &state.csrf) {
        warn!("CSRF validation failed for message post");
        return Err(StatusCode::FORBIDDEN);
    }
    let Some(user) = current_user(&session, &state.store).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    let topic = form
        .data
        .topic_id
        .as_deref()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(TopicId);
    let home = match topic {
        Some(t) => format!("/topic/{}", t),
        None => "/".to_string(),
    };

    match messages::post(&state.store, Some(&user), &form.data.content, topic) {
        Ok(_) => Ok(Redirect::to(&home).into_response()),
        Err(RealtextError::ContentInvalid(_)) => {
            Ok(Redirect::to(&format!("{}?err=invalid", home)).into_response())
        }
        Err(e) => Err(error_status(&e)),
    }
}

/// Creates a reply beneath an existing message.
async fn post_reply(
    State(state): State<AppState>,
    session: Session,
    Path(msg_id): Path<u64>,
    Form(form): Form<CsrfProtectedForm<ReplyForm>>,
) -> std::result::Result<Response, StatusCode> {
    if !form.validate(&session, &state.csrf) {
        warn!("CSRF validation failed for reply");
        return Err(StatusCode::FORBIDDEN);
    }
    let Some(user) = current_user(&session, &state.store).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    match messages::reply(
        &state.store,
        Some(&user),
        MessageId(msg_id),
        &form.data.reply_content,
    ) {
        Ok(_) => Ok(Redirect::to("/").into_response()),
        Err(RealtextError::ContentInvalid(_)) => {
            Ok(Redirect::to("/?err=invalid").into_response())
        }
        Err(e) => Err(error_status(&e)),
    }
}

/// Shows the inline edit form for a message the caller may still edit.
async fn edit_form(
    State(state): State<AppState>,
    session: Session,
    Path(msg_id): Path<u64>,
) -> std::result::Result<Response, StatusCode> {
    let Some(user) = current_user(&session, &state.store).await? else {
        return Ok(Redirect::to("/login").into_response());
    };
    let msg = state
        .store
        .get_message(MessageId(msg_id))
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    if msg.author != user.id {
        return Err(StatusCode::FORBIDDEN);
    }
    if !msg.is_editable_at(current_timestamp_millis()) {
        // Window elapsed: back to the feed rather than an error page.
        return Ok(Redirect::to("/").into_response());
    }

    let page = render_feed(&state, &session, None, Some(&msg), None).await?;
    Ok(page.into_response())
}

/// Applies an edit submitted from the inline form.
async fn submit_edit(
    State(state): State<AppState>,
    session: Session,
    Path(msg_id): Path<u64>,
    Form(form): Form<CsrfProtectedForm<EditForm>>,
) -> std::result::Result<Response, StatusCode> {
    if !form.validate(&session, &state.csrf) {
        warn!("CSRF validation failed for edit");
        return Err(StatusCode::FORBIDDEN);
    }
    let Some(user) = current_user(&session, &state.store).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    match messages::edit(&state.store, Some(&user), MessageId(msg_id), &form.data.content) {
        // Expired edits redirect home with the message untouched.
        Ok(EditOutcome::Updated(_)) | Ok(EditOutcome::Expired(_)) => {
            Ok(Redirect::to("/").into_response())
        }
        Err(RealtextError::ContentInvalid(_)) => {
            Ok(Redirect::to("/?err=invalid").into_response())
        }
        Err(e) => Err(error_status(&e)),
    }
}

/// Toggles the caller's like and bounces back to where they came from.
async fn like_message(
    State(state): State<AppState>,
    session: Session,
    Path(msg_id): Path<u64>,
    headers: HeaderMap,
) -> std::result::Result<Response, StatusCode> {
    let Some(user) = current_user(&session, &state.store).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    match messages::toggle_like(&state.store, Some(&user), MessageId(msg_id)) {
        Ok(_) => Ok(Redirect::to(&back_url(&headers)).into_response()),
        Err(e) => Err(error_status(&e)),
    }
}

/// Deletes a message (author or admin) together with its reply tree.
async fn delete_message(
    State(state): State<AppState>,
    session: Session,
    Path(msg_id): Path<u64>,
) -> std::result::Result<Response, StatusCode> {
    let Some(user) = current_user(&session, &state.store).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    match messages::delete(&state.store, Some(&user), MessageId(msg_id)) {
        Ok(()) => Ok(Redirect::to("/").into_response()),
        Err(e) => Err(error_status(&e)),
    }
}

/// Creates a topic; admin-only.
async fn add_topic(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CsrfProtectedForm<TopicForm>>,
) -> std::result::Result<Response, StatusCode> {
    if !form.validate(&session, &state.csrf) {
        warn!("CSRF validation failed for topic creation");
        return Err(StatusCode::FORBIDDEN);
    }
    let Some(user) = current_user(&session, &state.store).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    match topics::create_topic(&state.store, Some(&user), &form.data.topic_name) {
        Ok(_) => Ok(Redirect::to("/").into_response()),
        Err(RealtextError::ContentInvalid(_)) => {
            Ok(Redirect::to("/?err=topic_invalid").into_response())
        }
        Err(e) => Err(error_status(&e)),
    }
}

// =============================================================================
// Account handlers
// =============================================================================

async fn register_page(
    State(state): State<AppState>,
    session: Session,
) -> std::result::Result<Html<String>, StatusCode> {
    let csrf_token = get_csrf_token(&session, &state.csrf).await?;
    render_register(None, csrf_token)
}

fn render_register(
    error: Option<String>,
    csrf_token: String,
) -> std::result::Result<Html<String>, StatusCode> {
    let template = RegisterTemplate { error, csrf_token };
    Ok(Html(template.render().map_err(|e| {
        error!("Template rendering failed: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?))
}

async fn submit_register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CsrfProtectedForm<RegisterForm>>,
) -> std::result::Result<Response, StatusCode> {
    if !form.validate(&session, &state.csrf) {
        warn!("CSRF validation failed for registration");
        return Err(StatusCode::FORBIDDEN);
    }
    let csrf_token = get_csrf_token(&session, &state.csrf).await?;

    // Form-level validation happens here, before the credential store.
    if let Err(e) = validation::check_username(&form.data.username) {
        return Ok(render_register(Some(e.to_string()), csrf_token)?.into_response());
    }
    if let Err(e) = validation::check_password(&form.data.password) {
        return Ok(render_register(Some(e.to_string()), csrf_token)?.into_response());
    }
    if form.data.password != form.data.confirm_password {
        return Ok(
            render_register(Some("Passwords do not match.".to_string()), csrf_token)?
                .into_response(),
        );
    }

    match auth::register(
        &state.store,
        &form.data.username,
        &Password::new(form.data.password.clone()),
    ) {
        Ok(_) => Ok(Redirect::to("/login").into_response()),
        Err(e @ RealtextError::DuplicateUsername(_)) => {
            Ok(render_register(Some(e.to_string()), csrf_token)?.into_response())
        }
        Err(e) => Err(error_status(&e)),
    }
}

async fn login_page(
    State(state): State<AppState>,
    session: Session,
) -> std::result::Result<Html<String>, StatusCode> {
    let csrf_token = get_csrf_token(&session, &state.csrf).await?;
    render_login(None, csrf_token)
}

fn render_login(
    error: Option<String>,
    csrf_token: String,
) -> std::result::Result<Html<String>, StatusCode> {
    let template = LoginTemplate { error, csrf_token };
    Ok(Html(template.render().map_err(|e| {
        error!("Template rendering failed: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?))
}

async fn submit_login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CsrfProtectedForm<LoginForm>>,
) -> std::result::Result<Response, StatusCode> {
    if !form.validate(&session, &state.csrf) {
        warn!("CSRF validation failed for login");
        return Err(StatusCode::FORBIDDEN);
    }

    let password = Password::new(form.data.password.clone());
    match auth::authenticate(&state.store, &form.data.username, &password) {
        Ok(Some(user)) => {
            session
                .insert(SESSION_USER_KEY, user.id.0)
                .await
                .map_err(|e| {
                    error!("Failed to write session: {:?}", e);
                    StatusCode::INTERNAL_SERVER_ERROR
                })?;
            info!(username = %user.username, "user logged in");
            Ok(Redirect::to("/").into_response())
        }
        Ok(None) => {
            let csrf_token = get_csrf_token(&session, &state.csrf).await?;
            Ok(
                render_login(Some("Invalid username or password.".to_string()), csrf_token)?
                    .into_response(),
            )
        }
        Err(e) => Err(error_status(&e)),
    }
}

async fn logout(session: Session) -> std::result::Result<Redirect, StatusCode> {
    session.flush().await.map_err(|e| {
        error!("Failed to clear session: {:?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Redirect::to("/"))
}
