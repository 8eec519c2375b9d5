//! Validation of the identities used as object-key leaves.
//!
//! An identity is a domain name (`example.com`, `*.example.com`) or an ACME
//! account email. Valid identities:
//! - Must be non-empty
//! - Must not contain `/` (it would escape its namespace segment)
//! - Must not be `.` or contain `..`
//! - Must not contain whitespace or control characters

use crate::error::TypeError;

/// Validate a domain or email, returning `Ok(())` if it can be used as a key.
///
/// # Examples
///
/// ```
/// use tlsb2_types::validate_identity;
///
/// assert!(validate_identity("example.com").is_ok());
/// assert!(validate_identity("admin@example.com").is_ok());
/// assert!(validate_identity("").is_err());
/// assert!(validate_identity("../etc").is_err());
/// ```
pub fn validate_identity(identity: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidIdentity {
        identity: identity.to_string(),
        reason: reason.to_string(),
    };

    if identity.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if identity.contains('/') {
        return Err(invalid("must not contain '/'"));
    }
    if identity == "." {
        return Err(invalid("must not be '.'"));
    }
    if identity.contains("..") {
        return Err(invalid("must not contain '..'"));
    }
    if identity.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid("must not contain whitespace or control characters"));
    }
    Ok(())
}
