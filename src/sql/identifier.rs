//! Identifier checks.
//!
//! Identifiers are interpolated into statement text, never bound, so anything
//! that does not come from a record declaration must pass these checks first.

use crate::error::{DbError, DbResult};

/// `[A-Za-z_][A-Za-z0-9_$]*`
pub fn is_plain(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// A plain identifier with at most one `qualifier.` prefix.
pub fn is_qualified(name: &str) -> bool {
    match name.split_once('.') {
        Some((qualifier, rest)) => is_plain(qualifier) && is_plain(rest),
        None => is_plain(name),
    }
}

/// Validate an ad-hoc table name.
pub fn table(name: &str) -> DbResult<&str> {
    if is_qualified(name) {
        Ok(name)
    } else {
        Err(DbError::invalid_input(format!(
            "'{}' is not a valid table name",
            name
        )))
    }
}

/// Validate a column reference outside the bound table, e.g. `post.user_id`.
pub fn reference(name: &str) -> DbResult<&str> {
    if is_qualified(name) {
        Ok(name)
    } else {
        Err(DbError::invalid_input(format!(
            "'{}' is not a valid column reference",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain() {
        assert!(is_plain("post_id"));
        assert!(is_plain("_tmp"));
        assert!(is_plain("a$1"));
        assert!(!is_plain(""));
        assert!(!is_plain("1abc"));
        assert!(!is_plain("users.username"));
        assert!(!is_plain("name; DROP TABLE users"));
        assert!(!is_plain("naïve"));
    }

    #[test]
    fn test_qualified() {
        assert!(is_qualified("users.username"));
        assert!(is_qualified("username"));
        assert!(!is_qualified("a.b.c"));
        assert!(!is_qualified(".b"));
        assert!(!is_qualified("a."));
        assert!(!is_qualified("users.username OR 1=1"));
    }

    #[test]
    fn test_validators_return_input_error() {
        assert_eq!(table("post").unwrap(), "post");
        assert!(matches!(
            table("post p"),
            Err(DbError::InvalidInput { .. })
        ));
        assert!(matches!(
            reference("post.user_id = 1"),
            Err(DbError::InvalidInput { .. })
        ));
    }
}
