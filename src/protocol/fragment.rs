//! Reassembly of multi-packet command responses.

use std::collections::{HashMap, HashSet};

use super::CommandResponse;

/// Buffers fragments of multi-packet command responses, keyed by sequence
/// number, until every part has arrived.
///
/// Only the receiver task touches this, so no locking is involved. With at
/// most one command in flight there is at most one live entry at any time.
#[derive(Debug, Default)]
pub struct FragmentBuffer {
    pending: HashMap<u8, Reassembly>,
}

#[derive(Debug)]
struct Reassembly {
    parts: Vec<String>,
    missing: HashSet<u8>,
}

impl Reassembly {
    fn new(total: u8) -> Self {
        Self {
            parts: vec![String::new(); usize::from(total)],
            missing: (0..total).collect(),
        }
    }

    fn insert(&mut self, index: u8, body: String) {
        // A server lying about part_index must not panic us.
        if usize::from(index) >= self.parts.len() {
            return;
        }
        // Duplicates overwrite the slot; missing is already cleared.
        self.parts[usize::from(index)] = body;
        self.missing.remove(&index);
    }

    fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    fn into_message(self) -> String {
        self.parts.concat()
    }
}

impl FragmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one fragment. Returns the full body, concatenated in part
    /// order, once every part of the sequence has arrived; the entry is
    /// released on completion.
    pub fn push(&mut self, response: CommandResponse) -> Option<String> {
        let (total, index) = response.multi?;

        let entry = self
            .pending
            .entry(response.sequence)
            .or_insert_with(|| Reassembly::new(total));
        entry.insert(index, response.body);

        if entry.is_complete() {
            let entry = self.pending.remove(&response.sequence)?;
            return Some(entry.into_message());
        }
        None
    }
}
