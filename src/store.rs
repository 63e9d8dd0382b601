//! Discussion data persistence using RocksDB.
//!
//! ## Storage Layout
//!
//! Uses column families for logical separation:
//! - `users`: `{user_id}` -> serialized User
//! - `usernames`: `{username}` -> user_id (uniqueness index)
//! - `topics`: `{topic_id}` -> serialized Topic
//! - `topic_names`: `{name}` -> topic_id (uniqueness index)
//! - `messages`: `{msg_id}` -> serialized Message
//! - `likes`: `{msg_id}{user_id}` -> () (explicit join table)
//! - `meta`: `next_id` -> u64 id counter
//!
//! Index column families for ordered queries (values hold the message id):
//! - `idx_feed`: `{inverted_ts}{inverted_id}` -> msg_id (top-level, newest first)
//! - `idx_topic`: `{topic_id}{inverted_ts}{inverted_id}` -> msg_id (per-topic feed)
//! - `idx_replies`: `{parent_id}{ts}{msg_id}` -> msg_id (direct children, oldest first)
//!
//! All ids are encoded as 8 bytes big-endian, so composite keys are plain
//! concatenations and lexicographic order matches tuple order. Inverted
//! timestamps (`u64::MAX - ts`) make an ascending scan yield newest-first;
//! ties fall back to the inverted id, so feed order is total and stable.
//!
//! Multi-key mutations (record plus its index entries, cascade deletes)
//! are committed as a single `WriteBatch`. Id allocation and unique-name
//! claims are serialized by a store-level mutex, since RocksDB has no
//! unique constraint of its own.

use rocksdb::WriteBatch;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::auth::User;
use crate::error::{RealtextError, Result};
use crate::messages::{LikeState, Message};
use crate::storage::rocksdb::{concat_keys, decode, encode};
use crate::storage::{StoreConfig, StoreHandle};
use crate::topics::Topic;
use crate::types::{current_timestamp_millis, invert_timestamp, MessageId, TopicId, UserId};

/// Column family names.
const CF_USERS: &str = "users";
const CF_USERNAMES: &str = "usernames";
const CF_TOPICS: &str = "topics";
const CF_TOPIC_NAMES: &str = "topic_names";
const CF_MESSAGES: &str = "messages";
const CF_LIKES: &str = "likes";
const CF_META: &str = "meta";

/// Index column families for ordered queries.
const CF_IDX_FEED: &str = "idx_feed";
const CF_IDX_TOPIC: &str = "idx_topic";
const CF_IDX_REPLIES: &str = "idx_replies";

const ALL_COLUMN_FAMILIES: &[&str] = &[
    CF_USERS,
    CF_USERNAMES,
    CF_TOPICS,
    CF_TOPIC_NAMES,
    CF_MESSAGES,
    CF_LIKES,
    CF_META,
    CF_IDX_FEED,
    CF_IDX_TOPIC,
    CF_IDX_REPLIES,
];

/// Key for the id counter in the meta column family.
const META_NEXT_ID: &[u8] = b"next_id";

/// Feed index key for a top-level message: newest first, id tie-break.
fn feed_index_key(msg: &Message) -> Vec<u8> {
    concat_keys(&[
        &invert_timestamp(msg.created_at).to_be_bytes(),
        &invert_timestamp(msg.id.0).to_be_bytes(),
    ])
}

/// Per-topic feed index key for a top-level message.
fn topic_index_key(topic: TopicId, msg: &Message) -> Vec<u8> {
    concat_keys(&[
        &topic.to_key_bytes(),
        &invert_timestamp(msg.created_at).to_be_bytes(),
        &invert_timestamp(msg.id.0).to_be_bytes(),
    ])
}

/// Reply index key: direct children of a parent, oldest first.
fn reply_index_key(parent: MessageId, msg: &Message) -> Vec<u8> {
    concat_keys(&[
        &parent.to_key_bytes(),
        &msg.created_at.to_be_bytes(),
        &msg.id.to_key_bytes(),
    ])
}

/// Like join-table key for a (message, user) edge.
fn like_key(msg: MessageId, user: UserId) -> Vec<u8> {
    concat_keys(&[&msg.to_key_bytes(), &user.to_key_bytes()])
}

/// RocksDB-backed store for users, topics, messages and likes.
#[derive(Debug)]
pub struct DiscussionStore {
    db: StoreHandle,
    /// Serializes id allocation and unique-name claims.
    alloc: Mutex<u64>,
}

impl DiscussionStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(db_path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let db = StoreHandle::open(db_path, config, ALL_COLUMN_FAMILIES)?;
        let next_id: u64 = db.get(CF_META, META_NEXT_ID)?.unwrap_or(1);

        info!(next_id, "opened discussion store");
        Ok(Self {
            db,
            alloc: Mutex::new(next_id),
        })
    }

    /// Locks the allocator, returning a guard over the next free id.
    fn alloc_guard(&self) -> Result<std::sync::MutexGuard<'_, u64>> {
        self.alloc
            .lock()
            .map_err(|_| RealtextError::storage("Id allocation lock poisoned"))
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Creates a user, enforcing username uniqueness.
    ///
    /// The check and the insert happen under the allocation lock and the
    /// record plus its name-index entry commit in one batch, so a name can
    /// never be claimed twice.
    ///
    /// # Errors
    /// Returns `DuplicateUsername` if the name is taken.
    pub fn create_user(
        &self,
        username: &str,
        password_hash: String,
        is_admin: bool,
    ) -> Result<User> {
        let mut next = self.alloc_guard()?;

        if self.db.exists(CF_USERNAMES, username.as_bytes())? {
            return Err(RealtextError::DuplicateUsername(username.to_string()));
        }

        let user = User {
            id: UserId(*next),
            username: username.to_string(),
            password_hash,
            is_admin,
            created_at: current_timestamp_millis(),
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &self.db.cf(CF_USERS)?,
            user.id.to_key_bytes(),
            encode(&user)?,
        );
        batch.put_cf(
            &self.db.cf(CF_USERNAMES)?,
            username.as_bytes(),
            encode(&user.id)?,
        );
        batch.put_cf(&self.db.cf(CF_META)?, META_NEXT_ID, encode(&(*next + 1))?);
        self.db.write(batch)?;

        *next += 1;
        Ok(user)
    }

    /// Loads a user by id.
    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.db.get(CF_USERS, &id.to_key_bytes())
    }

    /// Loads a user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let Some(id) = self.db.get::<UserId>(CF_USERNAMES, username.as_bytes())? else {
            return Ok(None);
        };
        self.get_user(id)
    }

    // =========================================================================
    // Topics
    // =========================================================================

    /// Inserts a topic, or returns the existing one if the name is taken.
    ///
    /// Name collisions are not an error: topic creation is idempotent per
    /// name and the existing record is returned unchanged.
    pub fn insert_topic(&self, name: &str) -> Result<Topic> {
        let mut next = self.alloc_guard()?;

        if let Some(existing) = self.get_topic_by_name(name)? {
            return Ok(existing);
        }

        let topic = Topic {
            id: TopicId(*next),
            name: name.to_string(),
            created_at: current_timestamp_millis(),
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &self.db.cf(CF_TOPICS)?,
            topic.id.to_key_bytes(),
            encode(&topic)?,
        );
        batch.put_cf(
            &self.db.cf(CF_TOPIC_NAMES)?,
            name.as_bytes(),
            encode(&topic.id)?,
        );
        batch.put_cf(&self.db.cf(CF_META)?, META_NEXT_ID, encode(&(*next + 1))?);
        self.db.write(batch)?;

        *next += 1;
        Ok(topic)
    }

    /// Loads a topic by id.
    pub fn get_topic(&self, id: TopicId) -> Result<Option<Topic>> {
        self.db.get(CF_TOPICS, &id.to_key_bytes())
    }

    /// Loads a topic by name.
    pub fn get_topic_by_name(&self, name: &str) -> Result<Option<Topic>> {
        let Some(id) = self.db.get::<TopicId>(CF_TOPIC_NAMES, name.as_bytes())? else {
            return Ok(None);
        };
        self.get_topic(id)
    }

    /// Lists every topic, in creation order.
    pub fn list_topics(&self) -> Result<Vec<Topic>> {
        let mut topics = Vec::new();
        self.db.iterate_all(CF_TOPICS, |_, value| {
            match decode::<Topic>(value) {
                Ok(topic) => topics.push(topic),
                Err(e) => warn!("Skipping undecodable topic record: {}", e),
            }
            true
        })?;
        topics.sort_by_key(|t| t.id);
        Ok(topics)
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Inserts a message timestamped now.
    pub fn insert_message(
        &self,
        content: &str,
        author: UserId,
        topic: Option<TopicId>,
        parent: Option<MessageId>,
    ) -> Result<Message> {
        self.insert_message_at(content, author, topic, parent, current_timestamp_millis())
    }

    /// Inserts a message with an explicit creation timestamp.
    ///
    /// The record and its index entries (feed or reply adjacency) commit
    /// in one batch.
    pub fn insert_message_at(
        &self,
        content: &str,
        author: UserId,
        topic: Option<TopicId>,
        parent: Option<MessageId>,
        created_at: u64,
    ) -> Result<Message> {
        let mut next = self.alloc_guard()?;

        let msg = Message {
            id: MessageId(*next),
            content: content.to_string(),
            created_at,
            author,
            topic,
            parent,
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &self.db.cf(CF_MESSAGES)?,
            msg.id.to_key_bytes(),
            encode(&msg)?,
        );
        let id_bytes = msg.id.to_key_bytes();
        match msg.parent {
            None => {
                batch.put_cf(&self.db.cf(CF_IDX_FEED)?, feed_index_key(&msg), id_bytes);
                if let Some(topic_id) = msg.topic {
                    batch.put_cf(
                        &self.db.cf(CF_IDX_TOPIC)?,
                        topic_index_key(topic_id, &msg),
                        id_bytes,
                    );
                }
            }
            Some(parent_id) => {
                batch.put_cf(
                    &self.db.cf(CF_IDX_REPLIES)?,
                    reply_index_key(parent_id, &msg),
                    id_bytes,
                );
            }
        }
        batch.put_cf(&self.db.cf(CF_META)?, META_NEXT_ID, encode(&(*next + 1))?);
        self.db.write(batch)?;

        *next += 1;
        Ok(msg)
    }

    /// Loads a message by id.
    pub fn get_message(&self, id: MessageId) -> Result<Option<Message>> {
        self.db.get(CF_MESSAGES, &id.to_key_bytes())
    }

    /// Rewrites a message record in place.
    ///
    /// Only the content is expected to change; creation time, author and
    /// scoping are immutable so the index entries stay valid.
    pub fn update_message(&self, msg: &Message) -> Result<()> {
        self.db.put(CF_MESSAGES, &msg.id.to_key_bytes(), msg)
    }

    /// Lists top-level messages, newest first, optionally filtered by topic.
    pub fn list_feed(&self, topic: Option<TopicId>) -> Result<Vec<Message>> {
        let ids = match topic {
            Some(topic_id) => self.index_scan(CF_IDX_TOPIC, &topic_id.to_key_bytes())?,
            None => self.index_scan(CF_IDX_FEED, &[])?,
        };
        self.load_messages(&ids)
    }

    /// Lists the direct replies of a message, oldest first.
    pub fn list_replies(&self, parent: MessageId) -> Result<Vec<Message>> {
        let ids = self.index_scan(CF_IDX_REPLIES, &parent.to_key_bytes())?;
        self.load_messages(&ids)
    }

    /// Scans an index column family, returning the referenced message ids
    /// in key order.
    fn index_scan(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<MessageId>> {
        let mut ids = Vec::new();
        let mut scan = |_: &[u8], value: &[u8]| {
            match <[u8; 8]>::try_from(value) {
                Ok(bytes) => ids.push(MessageId::from_key_bytes(bytes)),
                Err(_) => warn!(cf = cf_name, "Skipping index entry with malformed value"),
            }
            true
        };
        if prefix.is_empty() {
            self.db.iterate_all(cf_name, scan)?;
        } else {
            self.db.prefix_iterate(cf_name, prefix, scan)?;
        }
        Ok(ids)
    }

    /// Loads messages for a list of ids, skipping any that have vanished.
    fn load_messages(&self, ids: &[MessageId]) -> Result<Vec<Message>> {
        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_message(*id)? {
                Some(msg) => messages.push(msg),
                None => warn!(msg_id = id.0, "Index references a missing message"),
            }
        }
        Ok(messages)
    }

    // =========================================================================
    // Likes
    // =========================================================================

    /// Flips the (message, user) like edge and returns the new state.
    pub fn toggle_like(&self, user: UserId, msg: MessageId) -> Result<LikeState> {
        let key = like_key(msg, user);
        if self.db.exists(CF_LIKES, &key)? {
            self.db.delete(CF_LIKES, &key)?;
            Ok(LikeState::Unliked)
        } else {
            self.db.put(CF_LIKES, &key, &())?;
            Ok(LikeState::Liked)
        }
    }

    /// Whether the user has liked the message.
    pub fn has_liked(&self, user: UserId, msg: MessageId) -> Result<bool> {
        self.db.exists(CF_LIKES, &like_key(msg, user))
    }

    /// Number of users who like the message.
    pub fn like_count(&self, msg: MessageId) -> Result<usize> {
        self.db.prefix_count(CF_LIKES, &msg.to_key_bytes())
    }

    // =========================================================================
    // Cascade delete
    // =========================================================================

    /// Deletes a message together with every transitive reply, all of
    /// their like edges and all of their index entries, atomically.
    ///
    /// Returns the number of messages removed.
    pub fn delete_cascade(&self, root: &Message) -> Result<usize> {
        // Walk the reply tree breadth-first to collect the doomed set.
        let mut doomed = vec![root.clone()];
        let mut cursor = 0;
        while cursor < doomed.len() {
            let parent_id = doomed[cursor].id;
            doomed.extend(self.list_replies(parent_id)?);
            cursor += 1;
        }

        let mut batch = WriteBatch::default();
        let cf_messages = self.db.cf(CF_MESSAGES)?;
        let cf_likes = self.db.cf(CF_LIKES)?;
        let cf_idx_feed = self.db.cf(CF_IDX_FEED)?;
        let cf_idx_topic = self.db.cf(CF_IDX_TOPIC)?;
        let cf_idx_replies = self.db.cf(CF_IDX_REPLIES)?;

        for msg in &doomed {
            batch.delete_cf(&cf_messages, msg.id.to_key_bytes());
            for key in self.db.prefix_keys(CF_LIKES, &msg.id.to_key_bytes())? {
                batch.delete_cf(&cf_likes, &key);
            }
            match msg.parent {
                None => {
                    batch.delete_cf(&cf_idx_feed, feed_index_key(msg));
                    if let Some(topic_id) = msg.topic {
                        batch.delete_cf(&cf_idx_topic, topic_index_key(topic_id, msg));
                    }
                }
                Some(parent_id) => {
                    batch.delete_cf(&cf_idx_replies, reply_index_key(parent_id, msg));
                }
            }
        }

        self.db.write(batch)?;

        info!(
            root_id = root.id.0,
            messages_deleted = doomed.len(),
            "cascade-deleted message tree"
        );
        Ok(doomed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (DiscussionStore, TempDir) {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let store = DiscussionStore::open(temp.path().join("db"), &StoreConfig::default())
            .expect("Failed to open store");
        (store, temp)
    }

    fn seed_user(store: &DiscussionStore, name: &str) -> User {
        store
            .create_user(name, "$argon2id$test".to_string(), false)
            .unwrap()
    }

    #[test]
    fn test_ids_are_unique_across_entities() {
        let (store, _temp) = open_store();
        let user = seed_user(&store, "alice");
        let topic = store.insert_topic("news").unwrap();
        let msg = store.insert_message("hi", user.id, None, None).unwrap();

        assert_ne!(user.id.0, topic.id.0);
        assert_ne!(topic.id.0, msg.id.0);
    }

    #[test]
    fn test_id_counter_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("db");
        let first_id = {
            let store = DiscussionStore::open(&path, &StoreConfig::default()).unwrap();
            seed_user(&store, "alice").id
        };
        let store = DiscussionStore::open(&path, &StoreConfig::default()).unwrap();
        let second_id = seed_user(&store, "bob").id;
        assert!(second_id > first_id);
    }

    #[test]
    fn test_feed_is_newest_first_with_id_tiebreak() {
        let (store, _temp) = open_store();
        let user = seed_user(&store, "alice");

        let oldest = store
            .insert_message_at("first", user.id, None, None, 1_000)
            .unwrap();
        let tied_a = store
            .insert_message_at("tied a", user.id, None, None, 2_000)
            .unwrap();
        let tied_b = store
            .insert_message_at("tied b", user.id, None, None, 2_000)
            .unwrap();
        let newest = store
            .insert_message_at("last", user.id, None, None, 3_000)
            .unwrap();

        let feed = store.list_feed(None).unwrap();
        let ids: Vec<_> = feed.iter().map(|m| m.id).collect();
        // Equal timestamps break ties by descending id.
        assert_eq!(ids, vec![newest.id, tied_b.id, tied_a.id, oldest.id]);
    }

    #[test]
    fn test_topic_feed_excludes_other_topics_and_replies() {
        let (store, _temp) = open_store();
        let user = seed_user(&store, "alice");
        let news = store.insert_topic("news").unwrap();
        let misc = store.insert_topic("misc").unwrap();

        let in_news = store
            .insert_message("news post", user.id, Some(news.id), None)
            .unwrap();
        store
            .insert_message("misc post", user.id, Some(misc.id), None)
            .unwrap();
        store
            .insert_message("reply", user.id, Some(news.id), Some(in_news.id))
            .unwrap();

        let feed = store.list_feed(Some(news.id)).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].id, in_news.id);
    }

    #[test]
    fn test_replies_are_oldest_first() {
        let (store, _temp) = open_store();
        let user = seed_user(&store, "alice");
        let parent = store.insert_message("parent", user.id, None, None).unwrap();

        let r1 = store
            .insert_message_at("one", user.id, None, Some(parent.id), 1_000)
            .unwrap();
        let r2 = store
            .insert_message_at("two", user.id, None, Some(parent.id), 2_000)
            .unwrap();

        let replies = store.list_replies(parent.id).unwrap();
        let ids: Vec<_> = replies.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![r1.id, r2.id]);
    }

    #[test]
    fn test_like_toggle_roundtrip() {
        let (store, _temp) = open_store();
        let user = seed_user(&store, "alice");
        let msg = store.insert_message("hi", user.id, None, None).unwrap();

        assert_eq!(store.toggle_like(user.id, msg.id).unwrap(), LikeState::Liked);
        assert!(store.has_liked(user.id, msg.id).unwrap());
        assert_eq!(store.like_count(msg.id).unwrap(), 1);

        assert_eq!(
            store.toggle_like(user.id, msg.id).unwrap(),
            LikeState::Unliked
        );
        assert!(!store.has_liked(user.id, msg.id).unwrap());
        assert_eq!(store.like_count(msg.id).unwrap(), 0);
    }

    #[test]
    fn test_cascade_delete_removes_tree_and_likes() {
        let (store, _temp) = open_store();
        let alice = seed_user(&store, "alice");
        let bob = seed_user(&store, "bob");

        let root = store.insert_message("root", alice.id, None, None).unwrap();
        let child = store
            .insert_message("child", bob.id, None, Some(root.id))
            .unwrap();
        let grandchild = store
            .insert_message("grandchild", alice.id, None, Some(child.id))
            .unwrap();
        store.toggle_like(bob.id, root.id).unwrap();
        store.toggle_like(alice.id, grandchild.id).unwrap();

        let deleted = store.delete_cascade(&root).unwrap();
        assert_eq!(deleted, 3);

        assert!(store.get_message(root.id).unwrap().is_none());
        assert!(store.get_message(child.id).unwrap().is_none());
        assert!(store.get_message(grandchild.id).unwrap().is_none());
        assert!(store.list_feed(None).unwrap().is_empty());
        assert!(store.list_replies(root.id).unwrap().is_empty());
        assert_eq!(store.like_count(root.id).unwrap(), 0);
        assert_eq!(store.like_count(grandchild.id).unwrap(), 0);
    }

    #[test]
    fn test_insert_topic_is_idempotent_per_name() {
        let (store, _temp) = open_store();
        let first = store.insert_topic("news").unwrap();
        let second = store.insert_topic("news").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_topics().unwrap().len(), 1);
    }
}
