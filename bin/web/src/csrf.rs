//! CSRF protection for the RealText web interface
//!
//! Provides Cross-Site Request Forgery protection using session-based tokens.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tower_sessions::Session;
use tracing::{debug, error};
use uuid::Uuid;

/// In-memory CSRF token store, keyed by session id.
#[derive(Clone, Debug, Default)]
pub struct CsrfStore {
    tokens: Arc<RwLock<HashMap<String, String>>>,
}

impl CsrfStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a new CSRF token for the session
    fn generate_token(&self, session_id: &str) -> Result<String, StatusCode> {
        let token = Uuid::new_v4().to_string();
        let mut tokens = self.tokens.write().map_err(|_| {
            error!("CSRF token store lock poisoned");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        tokens.insert(session_id.to_string(), token.clone());
        Ok(token)
    }

    /// Validate a CSRF token for the session
    fn validate_token(&self, session_id: &str, token: &str) -> bool {
        match self.tokens.read() {
            Ok(tokens) => tokens.get(session_id).is_some_and(|stored| stored == token),
            Err(_) => false,
        }
    }

    fn existing_token(&self, session_id: &str) -> Option<String> {
        self.tokens.read().ok()?.get(session_id).cloned()
    }
}

/// Get or create a CSRF token for the current session
pub async fn get_csrf_token(
    session: &Session,
    csrf_store: &CsrfStore,
) -> Result<String, StatusCode> {
    // Get session ID, create a new session if none exists
    let session_id = match session.id() {
        Some(id) => id.to_string(),
        None => {
            debug!("Creating new session");
            session.insert("initialized", true).await.map_err(|e| {
                error!("Failed to initialize session: {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

            // Save/commit the session to ensure it gets an ID
            session.save().await.map_err(|e| {
                error!("Failed to save session: {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

            match session.id() {
                Some(id) => id.to_string(),
                None => {
                    error!("Failed to get session ID after initialization and save");
                    return Err(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
        }
    };

    if let Some(existing) = csrf_store.existing_token(&session_id) {
        return Ok(existing);
    }

    debug!("Generating new CSRF token for session {}", session_id);
    csrf_store.generate_token(&session_id)
}

/// Form data wrapper that includes CSRF token validation
#[derive(Debug, Deserialize, Serialize)]
pub struct CsrfProtectedForm<T> {
    pub csrf_token: String,
    #[serde(flatten)]
    pub data: T,
}

impl<T> CsrfProtectedForm<T> {
    /// Validate the CSRF token
    pub fn validate(&self, session: &Session, csrf_store: &CsrfStore) -> bool {
        let session_id = match session.id() {
            Some(id) => id.to_string(),
            None => return false,
        };
        csrf_store.validate_token(&session_id, &self.csrf_token)
    }
}
