//! Message lifecycle engine: post, reply, edit, delete, like, list.
//!
//! Every operation takes the caller's identity explicitly; there is no
//! ambient session state down here. Authorization rules:
//!
//! - posting, replying and liking require a logged-in user
//! - editing is author-only and expires 10 minutes after creation —
//!   an expired edit is a policy outcome ([`EditOutcome::Expired`]),
//!   not an error, and never mutates the message
//! - deletion is author-or-admin, has no time limit, and cascades to
//!   every transitive reply and like edge
//!
//! A message's content state machine is
//! `Created -> Editable (0-10 min) -> Locked -> Deleted (terminal)`;
//! likes are an orthogonal per-(user, message) toggle.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{require_user, User};
use crate::constants::EDIT_WINDOW_MILLIS;
use crate::error::{RealtextError, Result};
use crate::store::DiscussionStore;
use crate::types::{current_timestamp_millis, MessageId, TopicId};
use crate::validation;

/// A message: a top-level post or a reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique id.
    pub id: MessageId,
    /// Message body, at most 500 characters.
    pub content: String,
    /// Creation timestamp in milliseconds since the Unix epoch. Immutable.
    pub created_at: u64,
    /// Author. Immutable.
    pub author: crate::types::UserId,
    /// Topic scope. `None` for community-feed messages; replies inherit
    /// their parent's value. Immutable.
    pub topic: Option<TopicId>,
    /// Immediate parent for replies, `None` for top-level messages. A
    /// reply to a reply points at that reply, never at the thread root.
    pub parent: Option<MessageId>,
}

impl Message {
    /// Whether this message is a top-level post.
    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether the author may still edit this message at `now`.
    pub fn is_editable_at(&self, now: u64) -> bool {
        now < self.created_at.saturating_add(EDIT_WINDOW_MILLIS)
    }
}

/// Result of an edit attempt that passed authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The content was updated; carries the new message state.
    Updated(Message),
    /// The 10-minute window has elapsed; carries the unmodified message.
    /// Callers should redirect rather than show an edit form.
    Expired(Message),
}

/// State of a (user, message) like edge after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeState {
    /// The user now likes the message.
    Liked,
    /// The user no longer likes the message.
    Unliked,
}

/// Creates a top-level message, optionally scoped to a topic.
///
/// # Errors
/// Returns `Unauthenticated` for anonymous callers, `ContentInvalid` for
/// empty or over-length content, and `NotFound` for a dangling topic id.
pub fn post(
    store: &DiscussionStore,
    author: Option<&User>,
    content: &str,
    topic: Option<TopicId>,
) -> Result<Message> {
    let author = require_user(author)?;
    validation::check_content(content)?;

    if let Some(topic_id) = topic {
        if store.get_topic(topic_id)?.is_none() {
            return Err(RealtextError::not_found(format!("topic {}", topic_id)));
        }
    }

    let msg = store.insert_message(content, author.id, topic, None)?;
    info!(
        msg_id = msg.id.0,
        author = %author.username,
        topic = ?msg.topic,
        "posted message"
    );
    Ok(msg)
}

/// Creates a reply to an existing message.
///
/// The reply inherits the parent's topic and records the immediate parent,
/// so replying to a reply nests under that reply.
///
/// # Errors
/// Returns `NotFound` if the parent does not exist, plus the same
/// `Unauthenticated`/`ContentInvalid` cases as [`post`].
pub fn reply(
    store: &DiscussionStore,
    author: Option<&User>,
    parent_id: MessageId,
    content: &str,
) -> Result<Message> {
    let author = require_user(author)?;
    validation::check_content(content)?;

    let parent = store
        .get_message(parent_id)?
        .ok_or_else(|| RealtextError::not_found(format!("message {}", parent_id)))?;

    let msg = store.insert_message(content, author.id, parent.topic, Some(parent.id))?;
    info!(
        msg_id = msg.id.0,
        parent_id = parent.id.0,
        author = %author.username,
        "posted reply"
    );
    Ok(msg)
}

/// Edits a message's content.
///
/// Author-only; admins get no bypass. Once the 10-minute window has
/// elapsed the attempt returns [`EditOutcome::Expired`] with the message
/// untouched.
///
/// # Errors
/// Returns `NotFound` for a missing message, `Forbidden` for a non-author
/// editor and `ContentInvalid` for bad replacement content.
pub fn edit(
    store: &DiscussionStore,
    editor: Option<&User>,
    msg_id: MessageId,
    new_content: &str,
) -> Result<EditOutcome> {
    let editor = require_user(editor)?;

    let mut msg = store
        .get_message(msg_id)?
        .ok_or_else(|| RealtextError::not_found(format!("message {}", msg_id)))?;

    if msg.author != editor.id {
        return Err(RealtextError::forbidden(
            "Only the author can edit a message",
        ));
    }
    if !msg.is_editable_at(current_timestamp_millis()) {
        return Ok(EditOutcome::Expired(msg));
    }

    validation::check_content(new_content)?;
    msg.content = new_content.to_string();
    store.update_message(&msg)?;

    info!(msg_id = msg.id.0, editor = %editor.username, "edited message");
    Ok(EditOutcome::Updated(msg))
}

/// Deletes a message and its entire reply tree.
///
/// Allowed for the author or any admin, with no time limit. The message,
/// every transitive reply and all their like edges disappear atomically.
///
/// # Errors
/// Returns `NotFound` for a missing message and `Forbidden` for anyone
/// else.
pub fn delete(store: &DiscussionStore, requester: Option<&User>, msg_id: MessageId) -> Result<()> {
    let requester = require_user(requester)?;

    let msg = store
        .get_message(msg_id)?
        .ok_or_else(|| RealtextError::not_found(format!("message {}", msg_id)))?;

    if msg.author != requester.id && !requester.is_admin {
        return Err(RealtextError::forbidden(
            "Only the author or an admin can delete a message",
        ));
    }

    let removed = store.delete_cascade(&msg)?;
    info!(
        msg_id = msg.id.0,
        requester = %requester.username,
        messages_deleted = removed,
        "deleted message"
    );
    Ok(())
}

/// Toggles the caller's like on a message and returns the new state.
///
/// # Errors
/// Returns `Unauthenticated` for anonymous callers and `NotFound` for a
/// missing message.
pub fn toggle_like(
    store: &DiscussionStore,
    user: Option<&User>,
    msg_id: MessageId,
) -> Result<LikeState> {
    let user = require_user(user)?;

    if store.get_message(msg_id)?.is_none() {
        return Err(RealtextError::not_found(format!("message {}", msg_id)));
    }

    store.toggle_like(user.id, msg_id)
}

/// Lists top-level messages, newest first, optionally filtered by topic.
///
/// With `None`, messages of every topic and topic-less messages appear
/// together. Replies never appear here; they are reachable only through
/// [`list_replies`].
pub fn list_feed(store: &DiscussionStore, topic: Option<TopicId>) -> Result<Vec<Message>> {
    store.list_feed(topic)
}

/// Lists the direct replies of a message, oldest first.
pub fn list_replies(store: &DiscussionStore, msg_id: MessageId) -> Result<Vec<Message>> {
    store.list_replies(msg_id)
}

/// Loads a single message.
///
/// # Errors
/// Returns `NotFound` if it does not exist.
pub fn get_message(store: &DiscussionStore, msg_id: MessageId) -> Result<Message> {
    store
        .get_message(msg_id)?
        .ok_or_else(|| RealtextError::not_found(format!("message {}", msg_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{register, Password};
    use crate::constants::ADMIN_BOOTSTRAP_PASSWORD;
    use crate::storage::StoreConfig;
    use tempfile::TempDir;

    fn open_store() -> (DiscussionStore, TempDir) {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let store = DiscussionStore::open(temp.path().join("db"), &StoreConfig::default())
            .expect("Failed to open store");
        (store, temp)
    }

    fn user(store: &DiscussionStore, name: &str) -> User {
        register(store, name, &Password::new("Passw0rd!")).unwrap()
    }

    fn admin(store: &DiscussionStore, name: &str) -> User {
        register(store, name, &Password::new(ADMIN_BOOTSTRAP_PASSWORD)).unwrap()
    }

    #[test]
    fn test_post_requires_login_and_valid_content() {
        let (store, _temp) = open_store();
        let alice = user(&store, "alice");

        assert!(matches!(
            post(&store, None, "hello", None).unwrap_err(),
            RealtextError::Unauthenticated
        ));
        assert!(matches!(
            post(&store, Some(&alice), "", None).unwrap_err(),
            RealtextError::ContentInvalid(_)
        ));
        assert!(matches!(
            post(&store, Some(&alice), &"x".repeat(501), None).unwrap_err(),
            RealtextError::ContentInvalid(_)
        ));

        let msg = post(&store, Some(&alice), "hello", None).unwrap();
        assert!(msg.is_top_level());
        assert_eq!(msg.author, alice.id);
    }

    #[test]
    fn test_post_to_missing_topic_is_not_found() {
        let (store, _temp) = open_store();
        let alice = user(&store, "alice");
        let err = post(&store, Some(&alice), "hello", Some(TopicId(999))).unwrap_err();
        assert!(matches!(err, RealtextError::NotFound(_)));
    }

    #[test]
    fn test_reply_inherits_topic_and_points_at_immediate_parent() {
        let (store, _temp) = open_store();
        let boss = admin(&store, "boss");
        let alice = user(&store, "alice");
        let topic = crate::topics::create_topic(&store, Some(&boss), "news").unwrap();

        let root = post(&store, Some(&alice), "root", Some(topic.id)).unwrap();
        let child = reply(&store, Some(&alice), root.id, "child").unwrap();
        let grandchild = reply(&store, Some(&alice), child.id, "grandchild").unwrap();

        assert_eq!(child.topic, Some(topic.id));
        assert_eq!(child.parent, Some(root.id));
        // Nested reply hangs off the reply, not the thread root.
        assert_eq!(grandchild.parent, Some(child.id));
        assert_eq!(grandchild.topic, Some(topic.id));

        let direct = list_replies(&store, root.id).unwrap();
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].id, child.id);
    }

    #[test]
    fn test_reply_to_missing_parent_is_not_found() {
        let (store, _temp) = open_store();
        let alice = user(&store, "alice");
        let err = reply(&store, Some(&alice), MessageId(999), "hi").unwrap_err();
        assert!(matches!(err, RealtextError::NotFound(_)));
    }

    #[test]
    fn test_edit_within_window_updates_content() {
        let (store, _temp) = open_store();
        let alice = user(&store, "alice");
        let msg = post(&store, Some(&alice), "draft", None).unwrap();

        match edit(&store, Some(&alice), msg.id, "final").unwrap() {
            EditOutcome::Updated(updated) => assert_eq!(updated.content, "final"),
            other => panic!("expected Updated, got {:?}", other),
        }
        assert_eq!(get_message(&store, msg.id).unwrap().content, "final");
    }

    #[test]
    fn test_edit_by_non_author_is_forbidden_even_for_admins() {
        let (store, _temp) = open_store();
        let alice = user(&store, "alice");
        let boss = admin(&store, "boss");
        let msg = post(&store, Some(&alice), "mine", None).unwrap();

        let err = edit(&store, Some(&boss), msg.id, "theirs").unwrap_err();
        assert!(matches!(err, RealtextError::Forbidden(_)));
        assert_eq!(get_message(&store, msg.id).unwrap().content, "mine");
    }

    #[test]
    fn test_edit_after_window_is_expired_noop() {
        let (store, _temp) = open_store();
        let alice = user(&store, "alice");
        let eleven_minutes_ago = current_timestamp_millis() - 11 * 60 * 1000;
        let msg = store
            .insert_message_at("old", alice.id, None, None, eleven_minutes_ago)
            .unwrap();

        match edit(&store, Some(&alice), msg.id, "too late").unwrap() {
            EditOutcome::Expired(unchanged) => assert_eq!(unchanged.content, "old"),
            other => panic!("expected Expired, got {:?}", other),
        }
        assert_eq!(get_message(&store, msg.id).unwrap().content, "old");
    }

    #[test]
    fn test_editability_window_boundary() {
        let msg = Message {
            id: MessageId(1),
            content: "x".to_string(),
            created_at: 1_000,
            author: crate::types::UserId(1),
            topic: None,
            parent: None,
        };
        assert!(msg.is_editable_at(1_000 + EDIT_WINDOW_MILLIS - 1));
        assert!(!msg.is_editable_at(1_000 + EDIT_WINDOW_MILLIS));
    }

    #[test]
    fn test_delete_is_author_or_admin_only() {
        let (store, _temp) = open_store();
        let alice = user(&store, "alice");
        let mallory = user(&store, "mallory");
        let boss = admin(&store, "boss");

        let msg = post(&store, Some(&alice), "mine", None).unwrap();
        let err = delete(&store, Some(&mallory), msg.id).unwrap_err();
        assert!(matches!(err, RealtextError::Forbidden(_)));

        // Admin may delete someone else's message.
        delete(&store, Some(&boss), msg.id).unwrap();
        assert!(matches!(
            delete(&store, Some(&alice), msg.id).unwrap_err(),
            RealtextError::NotFound(_)
        ));
    }

    #[test]
    fn test_like_toggle_is_idempotent_pairwise() {
        let (store, _temp) = open_store();
        let alice = user(&store, "alice");
        let bob = user(&store, "bobby");
        let msg = post(&store, Some(&alice), "likeable", None).unwrap();

        assert_eq!(
            toggle_like(&store, Some(&bob), msg.id).unwrap(),
            LikeState::Liked
        );
        assert_eq!(
            toggle_like(&store, Some(&bob), msg.id).unwrap(),
            LikeState::Unliked
        );
        assert_eq!(store.like_count(msg.id).unwrap(), 0);

        assert!(matches!(
            toggle_like(&store, None, msg.id).unwrap_err(),
            RealtextError::Unauthenticated
        ));
        assert!(matches!(
            toggle_like(&store, Some(&bob), MessageId(999)).unwrap_err(),
            RealtextError::NotFound(_)
        ));
    }
}
