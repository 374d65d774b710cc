//! Injected candidate filters
//!
//! A filter is a pure function of `(candidates, input)` producing the
//! ordered filtered projection. Purity makes it safe to recompute on every
//! keystroke; only upstream retrieval is debounced.

use std::sync::Arc;

/// Pure projection from `(candidates, input)` to the filtered, ordered view.
///
/// Blank input must pass every candidate through in the selector's
/// canonical order.
pub type FilterFn<T> = Arc<dyn Fn(&[T], &str) -> Vec<T> + Send + Sync>;

/// Case-insensitive substring filter over one or more extracted fields.
///
/// A candidate matches when any of `match_fields` contains the trimmed,
/// lowercased input. Results are ordered by `sort_field`, case-insensitive;
/// blank input returns every candidate in that order.
pub fn substring_filter<T, M, S>(match_fields: Vec<M>, sort_field: S) -> FilterFn<T>
where
    T: Clone + Send + Sync + 'static,
    M: Fn(&T) -> String + Send + Sync + 'static,
    S: Fn(&T) -> String + Send + Sync + 'static,
{
    Arc::new(move |all, input| {
        let needle = input.trim().to_lowercase();
        let mut out: Vec<T> = all
            .iter()
            .filter(|item| {
                needle.is_empty()
                    || match_fields
                        .iter()
                        .any(|field| field(item).to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        out.sort_by_key(|item| sort_field(item).to_lowercase());
        out
    })
}

/// Convenience for candidates that are themselves strings: match and sort
/// on the value.
pub fn identity_filter() -> FilterFn<String> {
    substring_filter(vec![|s: &String| s.clone()], |s: &String| s.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn items() -> Vec<String> {
        vec!["AAA".to_string(), "CCC".to_string(), "BBB".to_string()]
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let filter = identity_filter();
        assert_eq!(filter(&items(), "a"), vec!["AAA".to_string()]);
        assert_eq!(filter(&items(), "B"), vec!["BBB".to_string()]);
    }

    #[test]
    fn blank_input_returns_all_in_canonical_order() {
        let filter = identity_filter();
        let all = items();
        assert_eq!(filter(&all, ""), vec!["AAA", "BBB", "CCC"]);
        assert_eq!(filter(&all, "   "), vec!["AAA", "BBB", "CCC"]);
    }

    #[test]
    fn multi_field_match_checks_every_field() {
        #[derive(Debug, Clone, PartialEq)]
        struct Pair {
            id: String,
            label: String,
        }
        let fields: Vec<fn(&Pair) -> String> =
            vec![|p| p.id.clone(), |p| p.label.clone()];
        let filter = substring_filter(fields, |p: &Pair| p.id.clone());
        let all = vec![
            Pair { id: "cpu".into(), label: "Processor load".into() },
            Pair { id: "mem".into(), label: "Memory usage".into() },
        ];
        let hits = filter(&all, "usage");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "mem");
    }

    proptest! {
        #[test]
        fn filter_is_pure(all in proptest::collection::vec("[a-zA-Z]{0,6}", 0..20), input in "[a-zA-Z]{0,4}") {
            let filter = identity_filter();
            prop_assert_eq!(filter(&all, &input), filter(&all, &input));
        }

        #[test]
        fn blank_input_loses_nothing(all in proptest::collection::vec("[a-zA-Z]{0,6}", 0..20)) {
            let filter = identity_filter();
            let out = filter(&all, "");
            prop_assert_eq!(out.len(), all.len());
            for item in &all {
                prop_assert!(out.contains(item));
            }
        }
    }
}
