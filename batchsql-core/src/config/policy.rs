//! Sanitization switches consulted before every write.

use serde::{Deserialize, Serialize};

/// Two independent switches controlling the sanitizer.
///
/// - `check_identifiers`: table and column names are validated and a
///   violation rejects the write.
/// - `check_values`: values inlined into literal-mode SQL are escaped.
///   Parameterized writes never escape; the driver binds the raw value.
///
/// Both default to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizationPolicy {
    /// Reject identifiers containing denylisted characters
    pub check_identifiers: bool,
    /// Escape denylisted characters inside literal values
    pub check_values: bool,
}

impl SanitizationPolicy {
    /// Policy with both checks enabled.
    pub const fn strict() -> Self {
        Self {
            check_identifiers: true,
            check_values: true,
        }
    }

    /// Builder method to toggle identifier checking.
    pub const fn with_identifier_checks(mut self, enabled: bool) -> Self {
        self.check_identifiers = enabled;
        self
    }

    /// Builder method to toggle value escaping.
    pub const fn with_value_checks(mut self, enabled: bool) -> Self {
        self.check_values = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults_off() {
        let policy = SanitizationPolicy::default();
        assert!(!policy.check_identifiers);
        assert!(!policy.check_values);
    }

    #[test]
    fn test_policy_builders() {
        let policy = SanitizationPolicy::default().with_identifier_checks(true);
        assert!(policy.check_identifiers);
        assert!(!policy.check_values);

        assert_eq!(
            SanitizationPolicy::default()
                .with_identifier_checks(true)
                .with_value_checks(true),
            SanitizationPolicy::strict()
        );
    }
}
