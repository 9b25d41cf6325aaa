//! `key=value` tag parsing

use std::collections::BTreeMap;

use maz::context::{Tag, append_tags_to, tags_to_map};

fn tag(input: &str) -> Tag {
    input.parse().unwrap()
}

#[test]
fn test_simple_tag() {
    assert_eq!(
        tag("env=prod"),
        Tag {
            key: "env".to_string(),
            value: "prod".to_string()
        }
    );
}

#[test]
fn test_only_first_equals_splits() {
    let parsed = tag("a=b=c");
    assert_eq!(parsed.key, "a");
    assert_eq!(parsed.value, "b=c");
}

#[test]
fn test_empty_value_is_allowed() {
    assert_eq!(tag("owner=").value, "");
}

#[test]
fn test_missing_equals_is_an_error() {
    let err = "env".parse::<Tag>().unwrap_err();
    assert_eq!(err.to_string(), "Tag must be in the format 'key=value', got 'env'");
}

// Observed behaviour rather than a settled contract: a repeated key keeps its last value.
#[test]
fn test_duplicate_keys_last_wins() {
    let map = tags_to_map(&[tag("env=dev"), tag("team=core"), tag("env=prod")]);
    assert_eq!(map.get("env").map(String::as_str), Some("prod"));
    assert_eq!(map.len(), 2);
}

#[test]
fn test_append_keeps_existing_tags() {
    let mut existing = BTreeMap::from([("cost-center".to_string(), "42".to_string())]);
    append_tags_to(&[tag("env=prod")], &mut existing);
    assert_eq!(existing.len(), 2);
    assert_eq!(existing["env"], "prod");
}
