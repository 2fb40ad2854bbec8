use super::{FirewallAllowed, FirewallRule};
use std::collections::HashSet;

/// Structural equality of two rules as far as reconciliation is concerned.
///
/// Ranges, tags and ports are compared as sets. The description is ignored when
/// `skip_description` is set, since a shared rule's description is not owned by any
/// single caller.
pub fn rules_equal(a: &FirewallRule, b: &FirewallRule, skip_description: bool) -> bool {
    if a.allowed.len() != b.allowed.len() {
        return false;
    }

    if !a
        .allowed
        .iter()
        .zip(&b.allowed)
        .all(|(a, b)| allow_rules_equal(a, b))
    {
        return false;
    }

    if !equal_string_sets(&a.destination_ranges, &b.destination_ranges) {
        return false;
    }

    if !equal_string_sets(&a.source_ranges, &b.source_ranges) {
        return false;
    }

    if !equal_string_sets(&a.target_tags, &b.target_tags) {
        return false;
    }

    skip_description || a.description == b.description
}

fn allow_rules_equal(a: &FirewallAllowed, b: &FirewallAllowed) -> bool {
    a.ip_protocol == b.ip_protocol && equal_string_sets(&a.ports, &b.ports)
}

fn equal_string_sets(a: &[String], b: &[String]) -> bool {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    a == b
}
