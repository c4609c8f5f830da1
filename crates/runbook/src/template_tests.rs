// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn resolves_simple_placeholder() {
    let result = resolve("user {{Name}}", &vars(&[("Name", "alice")])).unwrap();
    assert_eq!(result, "user alice");
}

#[test]
fn lookup_is_case_sensitive() {
    let err = resolve("{{name}}", &vars(&[("Name", "alice")])).unwrap_err();
    assert_eq!(
        err,
        TemplateError::Unresolved {
            template: "{{name}}".to_string(),
            missing: vec!["name".to_string()],
        }
    );
}

#[test]
fn falls_back_to_underscore_prefix() {
    let result = resolve("{{batch_id}}", &vars(&[("_batch_id", "42")])).unwrap();
    assert_eq!(result, "42");
}

#[test]
fn exact_match_wins_over_prefixed() {
    let result = resolve(
        "{{batch_id}}",
        &vars(&[("batch_id", "exact"), ("_batch_id", "prefixed")]),
    )
    .unwrap();
    assert_eq!(result, "exact");
}

#[test]
fn collects_every_missing_name_once() {
    let err = resolve("{{a}} {{b}} {{a}}", &vars(&[])).unwrap_err();
    let TemplateError::Unresolved { missing, .. } = err;
    assert_eq!(missing, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn lenient_resolution_leaves_unknowns_in_place() {
    let result = resolve_lenient(
        "{{Known}} and {{MailboxGuid}}",
        &vars(&[("Known", "yes")]),
    );
    assert_eq!(result, "yes and {{MailboxGuid}}");
}

#[test]
fn references_lists_identifiers_in_order() {
    assert_eq!(
        references("{{b}} {{a}} {{b}}"),
        vec!["b".to_string(), "a".to_string()]
    );
    assert!(references("no placeholders").is_empty());
}

#[test]
fn non_identifier_braces_are_ignored() {
    // `{{1bad}}` does not match the identifier grammar, so it is neither
    // resolved nor reported missing.
    let result = resolve("{{1bad}}", &vars(&[])).unwrap();
    assert_eq!(result, "{{1bad}}");
}

#[yare::parameterized(
    plain            = { "no braces", true },
    resolved_pair    = { "{{name}}", true },
    two_pairs        = { "{{a}}-{{b}}", true },
    missing_close    = { "{{name", false },
    missing_open     = { "name}}", false },
    nested_open      = { "{{a {{b}}", false },
    trailing_open    = { "ok {{", false },
)]
fn balance_check(s: &str, balanced: bool) {
    assert_eq!(check_balanced(s), balanced);
}

#[test]
fn merge_precedence_matches_single_pass() {
    // Resolving against D merged with W (worker wins) equals resolving
    // against a single map built with the same precedence.
    let data = vars(&[("Region", "EU"), ("Name", "alice")]);
    let worker = vars(&[("Region", "US")]);

    let mut merged = data.clone();
    for (k, v) in &worker {
        merged.insert(k.clone(), v.clone());
    }

    let direct = resolve("{{Name}}@{{Region}}", &merged).unwrap();
    assert_eq!(direct, "alice@US");
}
