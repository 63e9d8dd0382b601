//! User accounts: registration and authentication.
//!
//! Passwords are stored only as Argon2id hashes. Authentication yields
//! the same denial for an unknown username and a wrong password, so the
//! login form cannot be used to enumerate accounts.
//!
//! Admin rights are granted at registration time when the submitted
//! password equals [`crate::constants::ADMIN_BOOTSTRAP_PASSWORD`]. See
//! the constant's documentation before deploying with the default value.

mod password;

pub use password::{hash_password, verify_password, Password};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::ADMIN_BOOTSTRAP_PASSWORD;
use crate::error::{RealtextError, Result};
use crate::store::DiscussionStore;
use crate::types::UserId;

/// A registered user.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Unique id.
    pub id: UserId,
    /// Unique username, chosen at registration.
    pub username: String,
    /// PHC-format Argon2id hash of the password.
    pub password_hash: String,
    /// Whether this user may create topics and delete any message.
    pub is_admin: bool,
    /// Registration timestamp in milliseconds since the Unix epoch.
    pub created_at: u64,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("is_admin", &self.is_admin)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Extracts a logged-in user from an optional caller identity.
///
/// # Errors
/// Returns `Unauthenticated` for an anonymous caller.
pub fn require_user(who: Option<&User>) -> Result<&User> {
    who.ok_or(RealtextError::Unauthenticated)
}

/// Registers a new user.
///
/// Callers are expected to have validated the username and password with
/// [`crate::validation`] first (the registration form does); this function
/// hashes the password and persists the account. Username uniqueness is
/// re-checked inside the store under its allocation lock, so two
/// concurrent registrations cannot both claim the same name.
///
/// # Errors
/// Returns `DuplicateUsername` if the name is taken.
pub fn register(store: &DiscussionStore, username: &str, password: &Password) -> Result<User> {
    let is_admin = password.as_str() == ADMIN_BOOTSTRAP_PASSWORD;
    let password_hash = hash_password(password)?;
    let user = store.create_user(username, password_hash, is_admin)?;

    info!(
        user_id = user.id.0,
        username = %user.username,
        is_admin = user.is_admin,
        "registered new user"
    );
    Ok(user)
}

/// Authenticates a username/password pair.
///
/// Returns `Ok(None)` for both an unknown username and a wrong password;
/// the two cases are deliberately indistinguishable to the caller.
pub fn authenticate(
    store: &DiscussionStore,
    username: &str,
    password: &Password,
) -> Result<Option<User>> {
    let Some(user) = store.get_user_by_username(username)? else {
        return Ok(None);
    };

    if verify_password(password, &user.password_hash)? {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreConfig;
    use tempfile::TempDir;

    fn open_store() -> (DiscussionStore, TempDir) {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let store = DiscussionStore::open(temp.path().join("db"), &StoreConfig::default())
            .expect("Failed to open store");
        (store, temp)
    }

    #[test]
    fn test_register_and_authenticate() {
        let (store, _temp) = open_store();
        let registered = register(&store, "alice", &Password::new("Passw0rd!")).unwrap();
        assert!(!registered.is_admin);
        assert_ne!(registered.password_hash, "Passw0rd!");

        let user = authenticate(&store, "alice", &Password::new("Passw0rd!"))
            .unwrap()
            .expect("valid credentials should authenticate");
        assert_eq!(user.id, registered.id);
    }

    #[test]
    fn test_wrong_password_and_unknown_user_deny_identically() {
        let (store, _temp) = open_store();
        register(&store, "alice", &Password::new("Passw0rd!")).unwrap();

        let wrong = authenticate(&store, "alice", &Password::new("Wr0ngPass")).unwrap();
        let unknown = authenticate(&store, "nobody", &Password::new("Passw0rd!")).unwrap();
        assert!(wrong.is_none());
        assert!(unknown.is_none());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let (store, _temp) = open_store();
        register(&store, "alice", &Password::new("Passw0rd!")).unwrap();

        let err = register(&store, "alice", &Password::new("0therPass")).unwrap_err();
        assert!(matches!(err, RealtextError::DuplicateUsername(_)));
    }

    #[test]
    fn test_bootstrap_password_grants_admin() {
        let (store, _temp) = open_store();
        let bob = register(&store, "bob", &Password::new(ADMIN_BOOTSTRAP_PASSWORD)).unwrap();
        assert!(bob.is_admin);

        let alice = register(&store, "alice", &Password::new("Passw0rd!")).unwrap();
        assert!(!alice.is_admin);
    }

    #[test]
    fn test_plaintext_is_never_persisted() {
        let (store, _temp) = open_store();
        let user = register(&store, "alice", &Password::new("Passw0rd!")).unwrap();
        assert!(user.password_hash.starts_with("$argon2id$"));
        assert!(!user.password_hash.contains("Passw0rd!"));
    }
}
