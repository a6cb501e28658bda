// DID and handle syntax validation

use crate::error::{MirageError, Result};
use regex::Regex;
use std::sync::OnceLock;

fn did_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^did:[a-z]+:[a-zA-Z0-9._:%-]*[a-zA-Z0-9._-]$").expect("invalid DID pattern")
    })
}

fn handle_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$",
        )
        .expect("invalid handle pattern")
    })
}

/// Check if a string looks like a DID (without validating it)
pub fn is_did(input: &str) -> bool {
    input.starts_with("did:")
}

/// Validate generic DID syntax: `did:<method>:<identifier>`
pub fn validate_did(did: &str) -> Result<()> {
    if did.len() > 2048 || !did_pattern().is_match(did) {
        return Err(MirageError::BadInput("did"));
    }
    Ok(())
}

/// Validate handle syntax (a domain name, at least two labels)
pub fn validate_handle(handle: &str) -> Result<()> {
    if handle.is_empty() || handle.len() > 253 {
        return Err(MirageError::BadInput("handle"));
    }
    if is_did(handle) || !handle.contains('.') {
        return Err(MirageError::BadInput("handle"));
    }
    if !handle_pattern().is_match(handle) {
        return Err(MirageError::BadInput("handle"));
    }
    Ok(())
}
