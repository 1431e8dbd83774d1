//! Tracking of mailbox ids already handled by this process.

use std::collections::HashSet;

use log::debug;

/// In-memory set of processed message ids.
///
/// The set lives for the process lifetime only. After a restart the server's
/// `\Seen` flag keeps already-fetched messages out of the UNSEEN search.
#[derive(Debug, Default)]
pub struct EmailTracker {
    processed: HashSet<String>,
}

impl EmailTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if a message id has been processed.
    pub fn is_processed(&self, id: &str) -> bool {
        self.processed.contains(id)
    }

    /// Marks an id as processed. Returns false if it already was.
    pub fn mark_processed(&mut self, id: &str) -> bool {
        let inserted = self.processed.insert(id.to_string());
        if inserted {
            debug!("Marked message {} as processed", id);
        }
        inserted
    }

    /// Keeps the ids that have not been processed yet, preserving order and
    /// dropping repeats within `ids` itself.
    pub fn filter_unprocessed(&self, ids: Vec<String>) -> Vec<String> {
        let mut seen = HashSet::new();
        ids.into_iter()
            .filter(|id| !self.is_processed(id) && seen.insert(id.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }
}
