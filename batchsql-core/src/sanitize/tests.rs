//! Tests for identifier validation and value escaping.

use super::*;

// =============================================================================
// Identifier checks
// =============================================================================

#[test]
fn test_plain_identifiers_pass() {
    for name in ["users", "order_items", "Column1", "_private", "t2024"] {
        assert!(check_identifier(name).is_ok(), "{} should pass", name);
    }
}

#[test]
fn test_every_denylisted_character_is_rejected() {
    for ch in IDENTIFIER_DENYLIST {
        let name = format!("col{}x", ch);
        let err = check_identifier(&name).unwrap_err();
        match err {
            BatchSqlError::Injection { name: n, offending } => {
                assert_eq!(n, name);
                assert_eq!(offending, ch.to_string());
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}

#[test]
fn test_comment_marker_rejected() {
    let err = check_identifier("name--comment").unwrap_err();
    assert_eq!(err.to_string(), "Identifier [name--comment] contains [--]");

    // A single dash is allowed
    assert!(check_identifier("first-name").is_ok());
}

#[test]
fn test_first_denylist_entry_is_reported() {
    // ' ' precedes ';' in the denylist
    let err = check_identifier("a;b c").unwrap_err();
    assert!(matches!(err, BatchSqlError::Injection { ref offending, .. } if offending == " "));
}

#[test]
fn test_check_identifiers_stops_at_first_failure() {
    assert!(check_identifiers(&["a", "b", "c"]).is_ok());

    let err = check_identifiers(&["a", "b(", "c)"]).unwrap_err();
    assert!(matches!(err, BatchSqlError::Injection { ref name, .. } if name == "b("));
}

// =============================================================================
// Value escaping
// =============================================================================

#[test]
fn test_clean_value_untouched() {
    let mut value = "plain text 123".to_string();
    assert_eq!(check_value(&mut value), 0);
    assert_eq!(value, "plain text 123");
}

#[test]
fn test_single_type_escapes_every_occurrence() {
    let mut value = "50%, 60%".to_string();
    // '%' and ',' are two distinct types
    assert_eq!(check_value(&mut value), 2);
    assert_eq!(value, "50\\%\\, 60\\%");

    let mut value = "100%%".to_string();
    assert_eq!(check_value(&mut value), 1);
    assert_eq!(value, "100\\%\\%");
}

#[test]
fn test_quote_escape_collapses_double_backslash() {
    let mut value = "O'Brien".to_string();
    // ' is escaped, then the inserted backslash is itself escaped,
    // then the resulting run of two backslashes collapses back to one.
    assert_eq!(check_value(&mut value), 2);
    assert_eq!(value, "O\\'Brien");
}

#[test]
fn test_lossy_underscore_and_dot() {
    let mut value = "a_b.c".to_string();
    assert_eq!(check_value(&mut value), 2);
    assert_eq!(value, "a\\_b\\.c");
}

#[test]
fn test_mis_collapse_of_existing_backslash() {
    let mut value = "\\'".to_string();
    assert_eq!(check_value(&mut value), 2);
    // The quote is no longer protected by an odd number of backslashes
    assert_eq!(value, "\\\\'");
}

#[test]
fn test_collapse_uses_hit_count_as_run_length() {
    let mut value = "(a)".to_string();
    assert_eq!(check_value(&mut value), 2);
    assert_eq!(value, "\\(a\\)");
}

// =============================================================================
// Map checks
// =============================================================================

fn sample_map() -> RowMap {
    let mut map = RowMap::new();
    map.insert("name".to_string(), SqlValue::from("O'Brien"));
    map.insert("age".to_string(), SqlValue::from(40));
    map
}

#[test]
fn test_check_map_identifiers_only() {
    let mut map = sample_map();
    let policy = SanitizationPolicy::strict();
    check_map(&mut map, policy).unwrap();
    // Identifier pass wins; values stay raw
    assert_eq!(map["name"], SqlValue::from("O'Brien"));

    map.insert("bad key".to_string(), SqlValue::Null);
    assert!(check_map(&mut map, policy).is_err());
}

#[test]
fn test_check_map_values_only() {
    let mut map = sample_map();
    let policy = SanitizationPolicy::default().with_value_checks(true);
    check_map(&mut map, policy).unwrap();
    assert_eq!(map["name"], SqlValue::from("O\\'Brien"));
    assert_eq!(map["age"], SqlValue::from(40));
}

#[test]
fn test_check_map_disabled_is_noop() {
    let mut map = sample_map();
    map.insert("bad key".to_string(), SqlValue::from("x;"));
    check_map(&mut map, SanitizationPolicy::default()).unwrap();
    assert_eq!(map["bad key"], SqlValue::from("x;"));
}

#[test]
fn test_escape_rows_respects_policy() {
    let mut rows = vec![vec![SqlValue::from("a;b"), SqlValue::from(1)]];
    escape_rows(&mut rows, SanitizationPolicy::default());
    assert_eq!(rows[0][0], SqlValue::from("a;b"));

    escape_rows(&mut rows, SanitizationPolicy::default().with_value_checks(true));
    assert_eq!(rows[0][0], SqlValue::from("a\\;b"));
    assert_eq!(rows[0][1], SqlValue::from(1));
}
