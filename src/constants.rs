/// Maximum length of a metadata storage key or field name
/// "metadata_" (9) + 100 characters of record name
pub const MAX_METADATA_KEY_LEN: usize = 109;

/// Minimum run of allowed characters a password must contain
pub const MIN_SECRET_RUN: usize = 8;

/// Maximum length of a count note, in characters
pub const MAX_NOTE_LEN: usize = 256;

/// Expiry applied to the throwaway key written by the health check
pub const HEALTH_CHECK_KEY_TTL_SECS: u64 = 60;

// =============================================================================
// Storage Keys
// =============================================================================

/// Hash of every registered username (field and value are both the username)
pub const USERS_INDEX_KEY: &str = "users";

/// Hash of every metadata storage key that has been written
pub const METADATA_INDEX_KEY: &str = "metadata_keys";

/// Prefix applied to every metadata record name
pub const METADATA_KEY_PREFIX: &str = "metadata_";

/// The deploy counter
pub const COUNT_KEY: &str = "count-ah-ah-ah:id";

// =============================================================================
// Error Messages
// =============================================================================

/// Error message for a password that fails the format check
pub const ERR_INVALID_PASSWORD: &str = "Password verification failed.";

/// Error message for a note longer than MAX_NOTE_LEN
pub const ERR_NOTE_TOO_LONG: &str = "Note can only be 256 characters or less.";
