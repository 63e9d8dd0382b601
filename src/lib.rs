//! # RealText - a small threaded-discussion platform
//!
//! Users register, log in, post short messages optionally scoped to a
//! topic, reply in single-level threads, like messages, and edit or
//! delete their own posts. This crate is the core: accounts, topics and
//! the message lifecycle over a RocksDB-backed store. The bundled
//! `realtext-web` binary is a thin axum/askama frontend over it.
//!
//! ## Design
//!
//! - **Explicit identity**: every operation takes the caller as
//!   `Option<&User>`; nothing reads session state down here, which keeps
//!   the core testable without a simulated request.
//! - **Relational layout, explicit mechanics**: column families play the
//!   role of tables, likes are an explicit join table, and the reply-tree
//!   cascade is a breadth-first walk committed as one atomic batch.
//! - **Policy as data, not errors**: an expired edit returns
//!   [`messages::EditOutcome::Expired`] and a duplicate topic name
//!   returns the existing topic; neither is a failure.
//!
//! ## Example
//!
//! ```rust,no_run
//! use realtext::auth::{self, Password};
//! use realtext::messages;
//! use realtext::storage::StoreConfig;
//! use realtext::store::DiscussionStore;
//!
//! # fn main() -> realtext::Result<()> {
//! let store = DiscussionStore::open("realtext_data/db", &StoreConfig::default())?;
//! let alice = auth::register(&store, "alice", &Password::new("Passw0rd!"))?;
//! let msg = messages::post(&store, Some(&alice), "hello world", None)?;
//! println!("posted message {}", msg.id);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod constants;
pub mod error;
pub mod messages;
pub mod storage;
pub mod store;
pub mod topics;
pub mod types;
pub mod validation;

pub use error::{RealtextError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
