//! Topic registry: a flat namespace of named discussion channels.
//!
//! Topics are created by admins and never renamed or deleted. Creating a
//! topic whose name already exists is a silent no-op that returns the
//! existing topic.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{require_user, User};
use crate::error::{RealtextError, Result};
use crate::store::DiscussionStore;
use crate::types::TopicId;
use crate::validation;

/// A named discussion channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Topic {
    /// Unique id.
    pub id: TopicId,
    /// Unique name, fixed at creation.
    pub name: String,
    /// Creation timestamp in milliseconds since the Unix epoch.
    pub created_at: u64,
}

/// Creates a topic.
///
/// # Errors
/// Returns `Unauthenticated` for anonymous callers and `Forbidden` for
/// non-admins. A name collision is not an error: the existing topic is
/// returned unchanged.
pub fn create_topic(
    store: &DiscussionStore,
    requester: Option<&User>,
    name: &str,
) -> Result<Topic> {
    let requester = require_user(requester)?;
    if !requester.is_admin {
        return Err(RealtextError::forbidden("Only admins can create topics"));
    }
    validation::check_topic_name(name)?;

    let topic = store.insert_topic(name.trim())?;
    info!(topic_id = topic.id.0, name = %topic.name, "topic ensured");
    Ok(topic)
}

/// Lists every topic, in creation order.
pub fn list_topics(store: &DiscussionStore) -> Result<Vec<Topic>> {
    store.list_topics()
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

    #[test]
    fn test_admin_creates_topic() {
        let (store, _temp) = open_store();
        let admin = register(&store, "boss", &Password::new(ADMIN_BOOTSTRAP_PASSWORD)).unwrap();

        let topic = create_topic(&store, Some(&admin), "news").unwrap();
        assert_eq!(topic.name, "news");
        assert_eq!(list_topics(&store).unwrap(), vec![topic]);
    }

    #[test]
    fn test_non_admin_is_forbidden() {
        let (store, _temp) = open_store();
        let alice = register(&store, "alice", &Password::new("Passw0rd!")).unwrap();

        let err = create_topic(&store, Some(&alice), "news").unwrap_err();
        assert!(matches!(err, RealtextError::Forbidden(_)));
        assert!(list_topics(&store).unwrap().is_empty());
    }

    #[test]
    fn test_anonymous_is_unauthenticated() {
        let (store, _temp) = open_store();
        let err = create_topic(&store, None, "news").unwrap_err();
        assert!(matches!(err, RealtextError::Unauthenticated));
    }

    #[test]
    fn test_duplicate_name_returns_existing_topic() {
        let (store, _temp) = open_store();
        let admin = register(&store, "boss", &Password::new(ADMIN_BOOTSTRAP_PASSWORD)).unwrap();

        let first = create_topic(&store, Some(&admin), "news").unwrap();
        let second = create_topic(&store, Some(&admin), "news").unwrap();
        assert_eq!(first, second);
        assert_eq!(list_topics(&store).unwrap().len(), 1);
    }
}
