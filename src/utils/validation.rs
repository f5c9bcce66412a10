// Validation utilities for string fields

use crate::utils::transfer_errors::TransferError;

/// Normalize a provider-assigned account id: trim surrounding whitespace and
/// reject empty values before any slot state is created.
pub fn normalize_account_id(raw: &str) -> Result<String, TransferError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TransferError::InvalidArgument(
            "provider account id cannot be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Trim and optionally keep a string field
pub fn trim_optional_field(field: Option<&String>) -> Option<String> {
    field.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_account_id() {
        assert_eq!(
            normalize_account_id("  gd-12345  ").unwrap(),
            "gd-12345".to_string()
        );
        assert!(matches!(
            normalize_account_id("   "),
            Err(TransferError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_trim_optional_field() {
        assert_eq!(
            trim_optional_field(Some(&" x ".to_string())),
            Some("x".to_string())
        );
        assert_eq!(trim_optional_field(Some(&"  ".to_string())), None);
        assert_eq!(trim_optional_field(None), None);
    }
}
