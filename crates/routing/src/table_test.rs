//! Tests for RouteTable
//!
//! Tests cover tag lookup, unmatched tags, builder validation and ordering.

use crate::{OutputId, RouteTable, RouteTableBuilder, RoutingError};

// =============================================================================
// Basic RouteTable tests
// =============================================================================

#[test]
fn test_new_table_is_empty() {
    let table = RouteTable::new();
    assert!(table.is_empty());
    assert_eq!(table.route_count(), 0);
    assert_eq!(table.output_count(), 0);
}

#[test]
fn test_unmatched_tag_returns_empty_slice() {
    let mut builder = RouteTableBuilder::new();
    let out = builder.register_output("file").unwrap();
    builder.subscribe("nginx", out);
    let table = builder.build();

    assert!(table.route("apache").is_empty());
    assert!(!table.has_route("apache"));
    assert!(table.route("").is_empty());
}

// =============================================================================
// Builder tests
// =============================================================================

#[test]
fn test_register_output_assigns_sequential_ids() {
    let mut builder = RouteTableBuilder::new();
    assert_eq!(builder.register_output("a").unwrap(), OutputId::new(0));
    assert_eq!(builder.register_output("b").unwrap(), OutputId::new(1));
    assert_eq!(builder.output_id("b"), Some(OutputId::new(1)));
    assert_eq!(builder.output_id("c"), None);
}

#[test]
fn test_register_duplicate_output_fails() {
    let mut builder = RouteTableBuilder::new();
    builder.register_output("file").unwrap();

    let err = builder.register_output("file").unwrap_err();
    assert!(matches!(err, RoutingError::DuplicateOutput { .. }));
}

#[test]
fn test_fan_out_preserves_subscription_order() {
    let mut builder = RouteTableBuilder::new();
    let a = builder.register_output("a").unwrap();
    let b = builder.register_output("b").unwrap();
    let c = builder.register_output("c").unwrap();
    builder.subscribe("x", c);
    builder.subscribe("x", a);
    builder.subscribe("x", b);

    let table = builder.build();
    assert_eq!(table.route("x"), &[c, a, b]);
}

#[test]
fn test_subscribe_twice_is_idempotent() {
    let mut builder = RouteTableBuilder::new();
    let a = builder.register_output("a").unwrap();
    builder.subscribe("x", a);
    builder.subscribe("x", a);

    let table = builder.build();
    assert_eq!(table.route("x"), &[a]);
}

#[test]
fn test_subscribe_by_name() {
    let mut builder = RouteTableBuilder::new();
    let a = builder.register_output("a").unwrap();
    builder.subscribe_by_name("x", "a").unwrap();

    let err = builder.subscribe_by_name("x", "missing").unwrap_err();
    assert!(matches!(err, RoutingError::UnknownOutput { .. }));

    let table = builder.build();
    assert_eq!(table.route("x"), &[a]);
}

#[test]
fn test_output_names_by_id() {
    let mut builder = RouteTableBuilder::new();
    let a = builder.register_output("file_out").unwrap();
    let b = builder.register_output("stdout_out").unwrap();
    let table = builder.build();

    assert_eq!(table.output_name(a), Some("file_out"));
    assert_eq!(table.output_name(b), Some("stdout_out"));
    assert_eq!(table.output_name(OutputId::new(9)), None);
    assert_eq!(table.output_names(), &["file_out", "stdout_out"]);
}

#[test]
fn test_registered_but_unsubscribed_output() {
    let mut builder = RouteTableBuilder::new();
    builder.register_output("idle").unwrap();
    let table = builder.build();

    assert_eq!(table.output_count(), 1);
    assert!(table.is_empty());
}

#[test]
fn test_iter_lists_every_tag() {
    let mut builder = RouteTableBuilder::new();
    let a = builder.register_output("a").unwrap();
    builder.subscribe("x", a);
    builder.subscribe("y", a);
    let table = builder.build();

    let mut tags: Vec<_> = table.iter().map(|(tag, _)| tag.to_string()).collect();
    tags.sort();
    assert_eq!(tags, vec!["x", "y"]);
}

#[test]
fn test_output_id_display() {
    assert_eq!(OutputId::new(3).to_string(), "output#3");
    assert_eq!(OutputId::from(7u16).as_usize(), 7);
}
