//! Per-cycle configuration snapshots.
//!
//! The filter criteria may be edited while the relay is running. Each poll
//! cycle asks [`SettingsSource::refresh`] for a fresh snapshot instead of
//! reading shared mutable state.

use std::path::PathBuf;

use log::{debug, warn};

use super::loader::load_config;
use super::schema::FilterCriteria;

/// Re-reads the filter criteria from the config file once per cycle.
pub struct SettingsSource {
    path: Option<PathBuf>,
    last_good: FilterCriteria,
}

impl SettingsSource {
    /// A source backed by the config file at `path`, seeded with the
    /// criteria loaded at startup.
    pub fn from_file(path: PathBuf, initial: FilterCriteria) -> Self {
        Self {
            path: Some(path),
            last_good: initial,
        }
    }

    /// A source that always returns the same criteria.
    pub fn fixed(criteria: FilterCriteria) -> Self {
        Self {
            path: None,
            last_good: criteria,
        }
    }

    /// Returns the current filter criteria. A config file that fails to load
    /// keeps the previous snapshot in effect.
    pub fn refresh(&mut self) -> FilterCriteria {
        if let Some(path) = &self.path {
            match load_config(path) {
                Ok(config) => {
                    if config.filter != self.last_good {
                        debug!(
                            "Filter criteria changed: sender={:?} subject={:?}",
                            config.filter.sender, config.filter.subject
                        );
                    }
                    self.last_good = config.filter;
                }
                Err(e) => {
                    warn!(
                        "Failed to reload settings from {}: {}. Keeping previous filter.",
                        path.display(),
                        e
                    );
                }
            }
        }
        self.last_good.clone()
    }
}
