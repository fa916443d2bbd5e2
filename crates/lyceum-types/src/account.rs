use crate::error::TypeError;

/// Account names are plain strings with chain-enforced shape rules; the
/// uniqueness index lives in chain state.
pub type AccountName = String;

pub const MIN_ACCOUNT_NAME_LENGTH: usize = 3;
pub const MAX_ACCOUNT_NAME_LENGTH: usize = 16;

/// Validates the consensus shape of an account name.
///
/// Dot-separated labels, each at least three characters, starting with a
/// lowercase letter, containing only lowercase letters, digits and dashes,
/// and not ending with a dash.
pub fn validate_account_name(name: &str) -> Result<(), TypeError> {
    let fail = |reason: &'static str| TypeError::InvalidAccountName {
        name: name.to_string(),
        reason,
    };

    if name.len() < MIN_ACCOUNT_NAME_LENGTH {
        return Err(fail("shorter than 3 characters"));
    }
    if name.len() > MAX_ACCOUNT_NAME_LENGTH {
        return Err(fail("longer than 16 characters"));
    }

    for label in name.split('.') {
        if label.len() < MIN_ACCOUNT_NAME_LENGTH {
            return Err(fail("label shorter than 3 characters"));
        }
        if !label.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(fail("label must start with a lowercase letter"));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(fail("label contains an invalid character"));
        }
        if label.ends_with('-') {
            return Err(fail("label ends with a dash"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_names() {
        for name in ["alice", "bob-2", "research.lab", "abc", "a1b2c3"] {
            assert!(validate_account_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_bad_shapes() {
        for name in [
            "ab",                 // too short
            "a-very-long-name-x", // too long
            "1abc",               // starts with digit
            "Alice",              // uppercase
            "abc-",               // trailing dash
            "ab.cd",              // short label
            "abc..def",           // empty label
            "ab cd",              // whitespace
        ] {
            assert!(validate_account_name(name).is_err(), "{name} should be invalid");
        }
    }
}
