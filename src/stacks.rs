//! Core profile data types shared by the parser, merger and concatenator.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::collections::btree_map;

pub type Pid = u32;

/// Run metadata document written into the artifact header.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Stack signature (`root;...;leaf`) to sample count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackToSampleCount(BTreeMap<String, u64>);

impl StackToSampleCount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` to `stack`, inserting it when not present yet.
    pub fn add(&mut self, stack: impl Into<String>, count: u64) {
        let slot = self.0.entry(stack.into()).or_insert(0);
        *slot = slot.saturating_add(count);
    }

    pub fn get(&self, stack: &str) -> Option<u64> {
        self.0.get(stack).copied()
    }

    pub fn total(&self) -> u64 {
        self.0.values().fold(0u64, |acc, c| acc.saturating_add(*c))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(stack, count)| (stack.as_str(), *count))
    }

    pub fn stacks(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for StackToSampleCount {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (stack, count) in iter {
            out.add(stack, count);
        }
        out
    }
}

impl IntoIterator for StackToSampleCount {
    type Item = (String, u64);
    type IntoIter = btree_map::IntoIter<String, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// One process's samples plus the identity collected for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessProfile {
    pub stacks: StackToSampleCount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_metadata: Option<serde_json::Value>,
}

impl ProcessProfile {
    pub fn new(stacks: StackToSampleCount) -> Self {
        Self { stacks, appid: None, app_metadata: None }
    }

    pub fn with_appid(mut self, appid: impl Into<String>) -> Self {
        self.appid = Some(appid.into());
        self
    }

    pub fn with_app_metadata(mut self, app_metadata: serde_json::Value) -> Self {
        self.app_metadata = Some(app_metadata);
        self
    }
}

pub type ProcessToProfile = BTreeMap<Pid, ProcessProfile>;

pub type ProcessToStackSampleCounters = BTreeMap<Pid, StackToSampleCount>;

/// System resource snapshot recorded alongside the profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub cpu_avg: Option<f64>,
    pub mem_avg: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_accumulates_existing_stacks() {
        let mut stacks = StackToSampleCount::new();
        stacks.add("a;b", 3);
        stacks.add("a;c", 1);
        stacks.add("a;b", 4);
        assert_eq!(stacks.get("a;b"), Some(7));
        assert_eq!(stacks.len(), 2);
        assert_eq!(stacks.total(), 8);
    }

    #[test]
    fn from_iter_merges_duplicates() {
        let stacks: StackToSampleCount = [("x", 1), ("x", 2), ("y", 5)].into_iter().collect();
        assert_eq!(stacks.get("x"), Some(3));
        assert_eq!(stacks.total(), 8);
    }
}
