//! The long-running relay loop.

pub mod relay;

pub use relay::{CycleReport, RelayWorker};
