//! Query string aggregation.
//!
//! Splits a raw query on `&`, each pair on its first `=`, decodes both halves
//! and folds the result into an insertion-ordered multi-map. A key seen once
//! holds a single value; the second occurrence turns it into an ordered list.

use super::decoder::{DecodingError, QueryDecoder};
use indexmap::map::Entry;
use indexmap::IndexMap;
use std::fmt::Write;

/// Value bound to a query key.
///
/// `None` is the absent value of a pair written without `=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    Single(Option<String>),
    Multi(Vec<Option<String>>),
}

impl ParameterValue {
    /// All values in arrival order.
    pub fn values(&self) -> &[Option<String>] {
        match self {
            ParameterValue::Single(value) => std::slice::from_ref(value),
            ParameterValue::Multi(values) => values,
        }
    }
}

/// Decoded query parameters, in order of first appearance.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    params: IndexMap<String, ParameterValue>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `key`.
    ///
    /// The first occurrence is stored as `Single`, the second converts the
    /// entry to `Multi` with the old value first, later ones append.
    pub fn insert(&mut self, key: String, value: Option<String>) {
        match self.params.entry(key) {
            Entry::Occupied(mut entry) => {
                let slot = entry.get_mut();
                *slot = match std::mem::replace(slot, ParameterValue::Multi(Vec::new())) {
                    ParameterValue::Single(first) => ParameterValue::Multi(vec![first, value]),
                    ParameterValue::Multi(mut values) => {
                        values.push(value);
                        ParameterValue::Multi(values)
                    }
                };
            }
            Entry::Vacant(entry) => {
                entry.insert(ParameterValue::Single(value));
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&ParameterValue> {
        self.params.get(key)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Keys and their values in order of first appearance.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.params.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// One `(key, value)` pair per occurrence, keys in first-seen order and
    /// values in arrival order within each key.
    pub fn occurrences(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.iter().flat_map(|(key, value)| {
            value.values().iter().map(move |v| (key, v.as_deref()))
        })
    }

    /// Render as `key = value` lines, one per occurrence. Absent values
    /// render as the empty string.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.occurrences() {
            // Writing to a String cannot fail
            let _ = writeln!(out, "{} = {}", key, value.unwrap_or(""));
        }
        out
    }
}

/// Builds a [`ParameterSet`] from a raw query string.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryAggregator {
    decoder: QueryDecoder,
}

impl QueryAggregator {
    pub fn new(decoder: QueryDecoder) -> Self {
        QueryAggregator { decoder }
    }

    /// Parse `raw` (the text after `?`) into a parameter set.
    ///
    /// `None` means the request had no query and yields an empty set. Empty
    /// pair-tokens are kept as the key `""` with an absent value. The first
    /// decoding failure aborts the whole query.
    pub fn aggregate(&self, raw: Option<&str>) -> Result<ParameterSet, DecodingError> {
        let mut params = ParameterSet::new();
        let Some(raw) = raw else {
            return Ok(params);
        };

        for pair in raw.split('&') {
            let (key, value) = match pair.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (pair, None),
            };

            let key = self.decoder.decode(key)?;
            let value = value.map(|v| self.decoder.decode(v)).transpose()?;
            params.insert(key, value);
        }

        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate(raw: &str) -> ParameterSet {
        QueryAggregator::default().aggregate(Some(raw)).unwrap()
    }

    fn single(value: &str) -> ParameterValue {
        ParameterValue::Single(Some(value.to_string()))
    }

    fn multi(values: &[&str]) -> ParameterValue {
        ParameterValue::Multi(values.iter().map(|v| Some(v.to_string())).collect())
    }

    #[test]
    fn test_absent_query() {
        let params = QueryAggregator::default().aggregate(None).unwrap();
        assert!(params.is_empty());
        assert_eq!(params.render(), "");
    }

    #[test]
    fn test_bare_key_has_absent_value() {
        let params = aggregate("flag%20on");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("flag on"), Some(&ParameterValue::Single(None)));
    }

    #[test]
    fn test_empty_value_is_not_absent() {
        let params = aggregate("a=");
        assert_eq!(params.get("a"), Some(&single("")));
    }

    #[test]
    fn test_repeated_key_keeps_order() {
        let params = aggregate("a=1&a=2&a=3");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("a"), Some(&multi(&["1", "2", "3"])));
        assert_eq!(params.render(), "a = 1\na = 2\na = 3\n");
    }

    #[test]
    fn test_mixed_single_and_multi() {
        let params = aggregate("x=1&y=2&x=3");
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["x", "y"]);
        assert_eq!(params.get("x"), Some(&multi(&["1", "3"])));
        assert_eq!(params.get("y"), Some(&single("2")));
        assert_eq!(params.render(), "x = 1\nx = 3\ny = 2\n");
    }

    #[test]
    fn test_split_on_first_equals_only() {
        let params = aggregate("a=b=c");
        assert_eq!(params.get("a"), Some(&single("b=c")));
    }

    #[test]
    fn test_empty_pair_tokens_are_kept() {
        let params = aggregate("a=1&&b=2");
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "", "b"]);
        assert_eq!(params.get(""), Some(&ParameterValue::Single(None)));

        let params = aggregate("&a=1&");
        assert_eq!(params.get(""), Some(&ParameterValue::Multi(vec![None, None])));
        assert_eq!(params.render(), " = \n = \na = 1\n");
    }

    #[test]
    fn test_empty_query_is_one_empty_pair() {
        let params = aggregate("");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get(""), Some(&ParameterValue::Single(None)));
    }

    #[test]
    fn test_absent_value_inside_multi() {
        let params = aggregate("k&k=v");
        assert_eq!(
            params.get("k"),
            Some(&ParameterValue::Multi(vec![None, Some("v".to_string())]))
        );
        assert_eq!(params.render(), "k = \nk = v\n");
    }

    #[test]
    fn test_keys_compared_after_decoding() {
        let params = aggregate("a+b=1&a%20b=2");
        assert_eq!(params.get("a b"), Some(&multi(&["1", "2"])));
    }

    #[test]
    fn test_encoded_delimiters_stay_in_tokens() {
        let params = aggregate("q=a%26b%3Dc&name=J%C3%BCrgen");
        assert_eq!(params.get("q"), Some(&single("a&b=c")));
        assert_eq!(params.get("name"), Some(&single("Jürgen")));
    }

    #[test]
    fn test_decoding_error_aborts_aggregation() {
        let aggregator = QueryAggregator::default();
        assert_eq!(
            aggregator.aggregate(Some("ok=1&bad=%zz&later=2")),
            Err(DecodingError::InvalidHexDigit { position: 0 })
        );
        assert!(aggregator.aggregate(Some("%4=1")).is_err());
    }

    #[test]
    fn test_occurrences_flatten_in_render_order() {
        let params = aggregate("b=1&a=2&b=3");
        let pairs: Vec<(&str, Option<&str>)> = params.occurrences().collect();
        assert_eq!(
            pairs,
            vec![("b", Some("1")), ("b", Some("3")), ("a", Some("2"))]
        );
    }
}
