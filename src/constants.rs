//! Limits and policy constants for the discussion platform.

/// Maximum message content length in characters.
pub const MAX_CONTENT_LEN: usize = 500;

/// How long a message stays editable by its author after creation.
pub const EDIT_WINDOW_MILLIS: u64 = 10 * 60 * 1000;

/// Minimum username length.
pub const USERNAME_MIN_LEN: usize = 4;

/// Maximum username length.
pub const USERNAME_MAX_LEN: usize = 20;

/// Minimum password length.
pub const PASSWORD_MIN_LEN: usize = 8;

/// Symbols allowed in passwords, besides letters and digits.
pub const PASSWORD_SYMBOLS: &str = "@$!%*#?&";

/// Maximum topic name length.
pub const MAX_TOPIC_NAME_LEN: usize = 50;

/// Registering with this exact password grants the new account admin
/// rights. This bootstrap shortcut avoids a separate provisioning step
/// for the first admin; change the value before any real deployment.
pub const ADMIN_BOOTSTRAP_PASSWORD: &str = "admin007";
