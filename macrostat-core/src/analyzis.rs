//! Macro analysis records.
//!
//! [`MacroAnalyzis`] is the snapshot summary produced for a file, a crate or a
//! whole run: how many macros of each kind are defined, and how derive,
//! attribute and bang macros are invoked. It is plain data. The field order is
//! the canonical declaration order and is kept by every serializer we use.
//!
//! With the `typescript` feature the records derive `ts_rs::TS` and export
//! matching declarations to `bindings/`.

use std::collections::BTreeMap;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::error::{MacrostatError, MacrostatResult};

/// Usage map for derive macros: path as written in `#[derive(...)]` to the
/// number of times it is listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS), ts(export))]
pub struct DeriveMacroUsage(pub BTreeMap<String, usize>);

/// Usage map for attribute macros: attribute path as written to the number
/// of invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS), ts(export))]
pub struct AttributeMacroUsage(pub BTreeMap<String, usize>);

macro_rules! usage_map_impl {
    ($ty:ident) => {
        impl $ty {
            /// Record `count` more uses of `path`.
            pub fn add(&mut self, path: impl Into<String>, count: usize) {
                *self.0.entry(path.into()).or_insert(0) += count;
            }

            /// Uses recorded for `path` (0 if never seen).
            pub fn get(&self, path: &str) -> usize {
                self.0.get(path).copied().unwrap_or(0)
            }

            /// Sum of all recorded uses.
            pub fn total(&self) -> usize {
                self.0.values().sum()
            }

            /// Number of distinct macro paths.
            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
                self.0.iter().map(|(k, v)| (k.as_str(), *v))
            }

            /// Entries sorted by descending count, then by path.
            pub fn most_used(&self) -> Vec<(&str, usize)> {
                let mut entries: Vec<_> = self.iter().collect();
                entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
                entries
            }

            pub fn merge(&mut self, other: &$ty) {
                for (path, count) in &other.0 {
                    self.add(path.clone(), *count);
                }
            }
        }

        impl<S: Into<String>> FromIterator<(S, usize)> for $ty {
            fn from_iter<I: IntoIterator<Item = (S, usize)>>(iter: I) -> Self {
                let mut usage = Self::default();
                for (path, count) in iter {
                    usage.add(path, count);
                }
                usage
            }
        }
    };
}

usage_map_impl!(DeriveMacroUsage);
usage_map_impl!(AttributeMacroUsage);

/// Summary of macro definitions and invocations for an analyzed unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS), ts(export))]
pub struct MacroAnalyzis {
    /// `#[proc_macro_attribute]` definitions
    pub attribute_macro_definition_count: usize,
    /// `macro_rules!` and `macro` definitions
    pub declarative_macro_definition_count: usize,
    /// Function-like `#[proc_macro]` definitions
    pub procedural_macro_definition_count: usize,
    /// `#[proc_macro_derive]` definitions
    pub derive_macro_definition_count: usize,
    pub derive_macro_usage: DeriveMacroUsage,
    pub attribute_macro_invocation_count: usize,
    pub attribute_macro_usage: AttributeMacroUsage,
    /// Bang, derive and attribute invocations together
    pub macro_invocation_count: usize,
}

impl MacroAnalyzis {
    /// Total macro definitions of every kind.
    pub fn definition_count(&self) -> usize {
        self.attribute_macro_definition_count
            + self.declarative_macro_definition_count
            + self.procedural_macro_definition_count
            + self.derive_macro_definition_count
    }

    /// Derive invocations (each path listed in a `#[derive]`).
    pub fn derive_macro_invocation_count(&self) -> usize {
        self.derive_macro_usage.total()
    }

    /// Invocations that are neither derives nor attributes (`foo!(..)`).
    ///
    /// Saturates at zero for records that break the total invariant.
    pub fn bang_invocation_count(&self) -> usize {
        self.macro_invocation_count
            .saturating_sub(self.derive_macro_invocation_count())
            .saturating_sub(self.attribute_macro_invocation_count)
    }

    pub fn is_empty(&self) -> bool {
        self.definition_count() == 0 && self.macro_invocation_count == 0
    }

    /// Verify the cross-field invariants a producer is expected to uphold.
    ///
    /// The record itself accepts any combination of values; this is for
    /// checking data read back from disk or built by hand.
    pub fn check(&self) -> MacrostatResult<()> {
        let attribute_total = self.attribute_macro_usage.total();
        if attribute_total != self.attribute_macro_invocation_count {
            return Err(MacrostatError::invariant(format!(
                "attribute_macro_invocation_count is {} but attribute_macro_usage sums to {}",
                self.attribute_macro_invocation_count, attribute_total
            )));
        }

        let specific = self.derive_macro_invocation_count() + self.attribute_macro_invocation_count;
        if self.macro_invocation_count < specific {
            return Err(MacrostatError::invariant(format!(
                "macro_invocation_count {} is below derive + attribute invocations {}",
                self.macro_invocation_count, specific
            )));
        }

        Ok(())
    }

    /// Fold another snapshot into this one.
    pub fn merge(&mut self, other: &MacroAnalyzis) {
        self.attribute_macro_definition_count += other.attribute_macro_definition_count;
        self.declarative_macro_definition_count += other.declarative_macro_definition_count;
        self.procedural_macro_definition_count += other.procedural_macro_definition_count;
        self.derive_macro_definition_count += other.derive_macro_definition_count;
        self.derive_macro_usage.merge(&other.derive_macro_usage);
        self.attribute_macro_invocation_count += other.attribute_macro_invocation_count;
        self.attribute_macro_usage.merge(&other.attribute_macro_usage);
        self.macro_invocation_count += other.macro_invocation_count;
    }

    /// Merge a sequence of snapshots into a fresh one.
    pub fn merged<'a>(items: impl IntoIterator<Item = &'a MacroAnalyzis>) -> MacroAnalyzis {
        let mut total = MacroAnalyzis::default();
        for item in items {
            total.merge(item);
        }
        total
    }
}

impl AddAssign<&MacroAnalyzis> for MacroAnalyzis {
    fn add_assign(&mut self, rhs: &MacroAnalyzis) {
        self.merge(rhs);
    }
}

impl AddAssign for MacroAnalyzis {
    fn add_assign(&mut self, rhs: MacroAnalyzis) {
        self.merge(&rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> MacroAnalyzis {
        MacroAnalyzis {
            attribute_macro_definition_count: 2,
            declarative_macro_definition_count: 5,
            procedural_macro_definition_count: 1,
            derive_macro_definition_count: 3,
            derive_macro_usage: [("Debug", 4), ("Clone", 2)].into_iter().collect(),
            attribute_macro_invocation_count: 10,
            attribute_macro_usage: [("tokio::main", 1), ("async_trait", 9)]
                .into_iter()
                .collect(),
            macro_invocation_count: 19,
        }
    }

    #[test]
    fn test_example_serializes_with_exact_fields() {
        let value = serde_json::to_value(example()).unwrap();
        let obj = value.as_object().unwrap();

        let keys: Vec<&str> = obj.keys().map(|k| k.as_str()).collect();
        let mut expected = vec![
            "attribute_macro_definition_count",
            "declarative_macro_definition_count",
            "procedural_macro_definition_count",
            "derive_macro_definition_count",
            "derive_macro_usage",
            "attribute_macro_invocation_count",
            "attribute_macro_usage",
            "macro_invocation_count",
        ];
        let mut sorted_keys = keys.clone();
        sorted_keys.sort();
        expected.sort();
        assert_eq!(sorted_keys, expected);

        assert_eq!(obj["attribute_macro_definition_count"], 2);
        assert_eq!(obj["declarative_macro_definition_count"], 5);
        assert_eq!(obj["procedural_macro_definition_count"], 1);
        assert_eq!(obj["derive_macro_definition_count"], 3);
        assert_eq!(obj["attribute_macro_invocation_count"], 10);
        assert_eq!(obj["macro_invocation_count"], 19);
        assert_eq!(obj["derive_macro_usage"]["Debug"], 4);
        assert_eq!(obj["attribute_macro_usage"]["tokio::main"], 1);
    }

    #[test]
    fn test_field_order_is_declaration_order() {
        let json = serde_json::to_string(&example()).unwrap();
        let positions: Vec<usize> = [
            "\"attribute_macro_definition_count\"",
            "\"declarative_macro_definition_count\"",
            "\"procedural_macro_definition_count\"",
            "\"derive_macro_definition_count\"",
            "\"derive_macro_usage\"",
            "\"attribute_macro_invocation_count\"",
            "\"attribute_macro_usage\"",
            "\"macro_invocation_count\"",
        ]
        .iter()
        .map(|key| json.find(key).unwrap())
        .collect();

        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_json_round_trip() {
        let original = example();
        let json = serde_json::to_string_pretty(&original).unwrap();
        let back: MacroAnalyzis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let mut value = serde_json::to_value(example()).unwrap();
        value
            .as_object_mut()
            .unwrap()
            .remove("macro_invocation_count");

        let err = serde_json::from_value::<MacroAnalyzis>(value).unwrap_err();
        assert!(err.to_string().contains("macro_invocation_count"));
    }

    #[test]
    fn test_negative_count_is_rejected_at_deserialization() {
        // Counts are unsigned, so out-of-range input never reaches a record.
        let mut value = serde_json::to_value(example()).unwrap();
        value["derive_macro_definition_count"] = serde_json::json!(-1);

        assert!(serde_json::from_value::<MacroAnalyzis>(value).is_err());
    }

    #[test]
    fn test_inconsistent_record_is_accepted_but_fails_check() {
        let json = r#"{
            "attribute_macro_definition_count": 0,
            "declarative_macro_definition_count": 0,
            "procedural_macro_definition_count": 0,
            "derive_macro_definition_count": 0,
            "derive_macro_usage": {"Debug": 3},
            "attribute_macro_invocation_count": 0,
            "attribute_macro_usage": {},
            "macro_invocation_count": 1
        }"#;
        let record: MacroAnalyzis = serde_json::from_str(json).unwrap();
        assert!(matches!(
            record.check(),
            Err(MacrostatError::Invariant { .. })
        ));
        assert_eq!(record.bang_invocation_count(), 0);
    }

    #[test]
    fn test_check_accepts_example() {
        assert!(example().check().is_ok());
        assert_eq!(example().bang_invocation_count(), 19 - 6 - 10);
    }

    #[test]
    fn test_check_rejects_attribute_total_mismatch() {
        let mut record = example();
        record.attribute_macro_invocation_count = 7;
        assert!(record.check().is_err());
    }

    #[test]
    fn test_merge_sums_counts_and_maps() {
        let mut total = example();
        total += &example();

        assert_eq!(total.declarative_macro_definition_count, 10);
        assert_eq!(total.macro_invocation_count, 38);
        assert_eq!(total.derive_macro_usage.get("Debug"), 8);
        assert_eq!(total.attribute_macro_usage.get("async_trait"), 18);
        assert!(total.check().is_ok());
    }

    #[test]
    fn test_merged_of_nothing_is_default() {
        let total = MacroAnalyzis::merged(std::iter::empty());
        assert!(total.is_empty());
        assert_eq!(total, MacroAnalyzis::default());
    }

    #[test]
    fn test_most_used_orders_by_count() {
        let usage: DeriveMacroUsage = [("Clone", 2), ("Debug", 5), ("Copy", 2)]
            .into_iter()
            .collect();
        assert_eq!(
            usage.most_used(),
            vec![("Debug", 5), ("Clone", 2), ("Copy", 2)]
        );
        assert_eq!(usage.total(), 9);
        assert_eq!(usage.get("Hash"), 0);
    }

    #[test]
    fn test_usage_map_serializes_as_object() {
        let usage: AttributeMacroUsage = [("test_case", 3)].into_iter().collect();
        assert_eq!(serde_json::to_string(&usage).unwrap(), r#"{"test_case":3}"#);
    }
}
