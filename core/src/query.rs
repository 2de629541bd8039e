//! Query parameters and the per-call options that populate them.
//!
//! Multiple values for one key are joined with `,` into a single value when
//! the query string is written. `a=1` plus `a=2` goes out as `a=1%2C2`, never
//! as a repeated key.

use std::collections::BTreeMap;

use url::Url;

/// Query parameters keyed by name, each holding one or more values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: BTreeMap<String, Vec<String>>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value to `key`.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.params.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Replace all values of `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.params.insert(key.into(), vec![value.into()]);
        self
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.params.get(key).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Merge `other` into `self`, appending values key by key.
    pub fn extend(&mut self, other: &QueryParams) {
        for (key, values) in &other.params {
            self.params
                .entry(key.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
    }

    /// Each key with its values comma-joined, sorted by key.
    pub fn joined(&self) -> impl Iterator<Item = (&str, String)> + '_ {
        self.params
            .iter()
            .map(|(key, values)| (key.as_str(), values.join(",")))
    }

    /// Write these parameters into `url`'s query string. Keys already in the
    /// URL are kept unless overridden here; the result is sorted by key.
    pub fn apply_to(&self, url: &mut Url) {
        if self.is_empty() {
            return;
        }
        let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in url.query_pairs() {
            merged
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }
        for (key, value) in self.joined() {
            merged.insert(key.to_string(), vec![value]);
        }

        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, values) in &merged {
            for value in values {
                pairs.append_pair(key, value);
            }
        }
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (key, value) in iter {
            params.add(key, value);
        }
        params
    }
}

/// Accumulated query state for one GET or POST call.
#[derive(Debug, Clone, Default)]
pub struct QueryConfig {
    pub params: QueryParams,
}

/// A single query option, applied in order to a `QueryConfig`.
#[derive(Debug, Clone)]
pub enum QueryOption {
    /// Append one value to a key.
    Param { key: String, value: String },
    /// Append every value in the set.
    Params(QueryParams),
}

impl QueryOption {
    pub fn param(key: impl Into<String>, value: impl Into<String>) -> Self {
        QueryOption::Param {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn params(params: QueryParams) -> Self {
        QueryOption::Params(params)
    }

    fn apply(&self, config: &mut QueryConfig) {
        match self {
            QueryOption::Param { key, value } => {
                config.params.add(key.clone(), value.clone());
            }
            QueryOption::Params(params) => config.params.extend(params),
        }
    }
}

impl QueryConfig {
    pub fn from_options(options: &[QueryOption]) -> Self {
        let mut config = QueryConfig::default();
        for option in options {
            option.apply(&mut config);
        }
        config
    }
}
