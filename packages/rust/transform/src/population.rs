//! State population lookup for per-capita metrics.

use std::collections::BTreeMap;

use serde::Serialize;

/// Population counts keyed by state code.
///
/// Keys are trimmed and upper-cased both when the map is built and when it
/// is queried, so `"mh"`, `" MH"` and `"MH"` all name the same state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PopulationMap {
    entries: BTreeMap<String, u64>,
}

impl PopulationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, state_code: &str, population: u64) {
        self.entries.insert(normalize(state_code), population);
    }

    pub fn get(&self, state_code: &str) -> Option<u64> {
        self.entries.get(&normalize(state_code)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>> FromIterator<(K, u64)> for PopulationMap {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (code, population) in iter {
            map.insert(code.as_ref(), population);
        }
        map
    }
}

impl From<&BTreeMap<String, u64>> for PopulationMap {
    fn from(entries: &BTreeMap<String, u64>) -> Self {
        entries.iter().map(|(k, v)| (k.as_str(), *v)).collect()
    }
}

fn normalize(state_code: &str) -> String {
    state_code.trim().to_ascii_uppercase()
}
