//! Placeholder naming and the per-builder parameter table.

use crate::value::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Prefix of every generated placeholder name.
pub const PLACEHOLDER_PREFIX: &str = ":ph";

/// Monotonic source of placeholder names.
///
/// One sequence is shared by every builder created from the same [`Registry`](crate::Registry),
/// so nested relation queries and reused builders never hand out the same name twice.
#[derive(Debug, Default)]
pub struct PlaceholderSeq {
    next: AtomicU64,
}

impl PlaceholderSeq {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sequence behind an `Arc`, ready to be shared.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Allocate the next placeholder name (`:ph1`, `:ph2`, ...).
    pub fn next_name(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{PLACEHOLDER_PREFIX}{n}")
    }

    /// Number of names handed out so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

/// Ordered mapping from placeholder name to bound value.
///
/// Values are stored as given; quoting happens when the executor puts the
/// statement on the wire.
#[derive(Clone, Debug, Default)]
pub struct ParamTable {
    entries: Vec<(String, Value)>,
}

impl ParamTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind one value and return its placeholder name.
    pub fn bind(&mut self, seq: &PlaceholderSeq, value: impl Into<Value>) -> String {
        let name = seq.next_name();
        self.entries.push((name.clone(), value.into()));
        name
    }

    /// Bind every element of a sequence, returning the placeholder names in order.
    pub fn bind_all<I, V>(&mut self, seq: &PlaceholderSeq, values: I) -> Vec<String>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        values.into_iter().map(|v| self.bind(seq, v)).collect()
    }

    /// Look up the value bound to a placeholder name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Move all entries out, leaving the table empty.
    pub fn take(&mut self) -> ParamTable {
        std::mem::take(self)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
