use crate::constants::METADATA_KEY_PREFIX;

/// Password hash of a user: `user:{username}`
pub fn user_password(username: &str) -> String {
    format!("user:{}", username)
}

/// Admin flag of a user: `user:{username}:admin`
pub fn user_admin(username: &str) -> String {
    format!("user:{}:admin", username)
}

/// Record name for an app, optionally scoped to an environment
pub fn metadata_record_name(app_name: &str, env_name: &str) -> String {
    if env_name.is_empty() {
        app_name.to_string()
    } else {
        format!("{}_{}", env_name, app_name)
    }
}

/// Storage key of a metadata record: `metadata_{record_name}`
pub fn metadata_record(app_name: &str, env_name: &str) -> String {
    format!(
        "{}{}",
        METADATA_KEY_PREFIX,
        metadata_record_name(app_name, env_name)
    )
}

/// Note attached to a count value: `{count_id}:note`
pub fn count_note(count_id: i64) -> String {
    format!("{}:note", count_id)
}

/// Throwaway key written by a health check
pub fn health_check(token: &str) -> String {
    format!("health_check_{}", token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_keys() {
        assert_eq!(user_password("alice"), "user:alice");
        assert_eq!(user_admin("alice"), "user:alice:admin");
    }

    #[test]
    fn test_metadata_keys() {
        assert_eq!(metadata_record_name("checkout", ""), "checkout");
        assert_eq!(metadata_record_name("checkout", "prod"), "prod_checkout");
        assert_eq!(metadata_record("checkout", ""), "metadata_checkout");
        assert_eq!(metadata_record("checkout", "prod"), "metadata_prod_checkout");
    }

    #[test]
    fn test_count_note_key() {
        assert_eq!(count_note(42), "42:note");
    }
}
