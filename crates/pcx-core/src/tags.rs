//! Resource tags
//!
//! Tags flow through three layers:
//! - `tags`: what the resource configures
//! - default tags: provider-wide tags merged underneath every resource
//! - `tags_all`: the effective set on AWS (defaults overlaid by resource tags)
//!
//! Keys with the reserved `aws:` prefix are owned by AWS and never managed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix of tag keys reserved by AWS
pub const AWS_TAG_KEY_PREFIX: &str = "aws:";

/// A key/value tag set with deterministic ordering
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Drop keys reserved by AWS
    pub fn ignore_aws(&self) -> Self {
        self.iter()
            .filter(|(k, _)| !k.starts_with(AWS_TAG_KEY_PREFIX))
            .collect()
    }

    /// Drop keys matched by the ignore configuration
    pub fn ignore_config(&self, config: &IgnoreTagsConfig) -> Self {
        self.iter().filter(|(k, _)| !config.ignores(k)).collect()
    }

    /// Drop keys whose value is inherited unchanged from the default tags
    ///
    /// A resource tag that overrides a default with a different value is kept.
    pub fn remove_default_config(&self, defaults: &DefaultTagsConfig) -> Self {
        self.iter()
            .filter(|(k, v)| defaults.tags.get(k) != Some(*v))
            .collect()
    }

    /// Tags present in `self` that are missing from or differ in `old`
    pub fn updated(&self, old: &Tags) -> Self {
        self.iter()
            .filter(|(k, v)| old.get(k) != Some(*v))
            .collect()
    }

    /// Keys present in `self` that are missing from `new`
    pub fn removed(&self, new: &Tags) -> Self {
        self.iter()
            .filter(|(k, _)| new.get(k).is_none())
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Tags applied to every managed resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultTagsConfig {
    #[serde(default)]
    pub tags: Tags,
}

impl DefaultTagsConfig {
    /// Overlay resource tags on top of the defaults
    pub fn merge_tags(&self, tags: &Tags) -> Tags {
        let mut merged = self.tags.clone();
        for (k, v) in tags.iter() {
            merged.insert(k, v);
        }
        merged
    }
}

/// Tags managed outside this tool that reads must not report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreTagsConfig {
    /// Exact keys to ignore
    #[serde(default)]
    pub keys: Vec<String>,
    /// Key prefixes to ignore
    #[serde(default)]
    pub key_prefixes: Vec<String>,
}

impl IgnoreTagsConfig {
    pub fn ignores(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
            || self.key_prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }
}

/// The tag mutations needed to move from one tag set to another
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    /// Keys to create or overwrite
    pub upsert: Tags,
    /// Keys to delete
    pub remove: Vec<String>,
}

impl TagDiff {
    /// Compute the diff between old and new `tags_all`
    pub fn between(old: &Tags, new: &Tags) -> Self {
        Self {
            upsert: new.updated(old).ignore_aws(),
            remove: old
                .removed(new)
                .ignore_aws()
                .keys()
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.upsert.is_empty() && self.remove.is_empty()
    }
}
