//! Cooperative job control.
//!
//! A predicate (the range limit, or `abort()` in a filter) raises
//! [`StopExtraction`] to end a job early. The job driver catches it, stops
//! enumerating items and reports success.

use thiserror::Error;

/// Signal that the current job should stop processing further items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Error)]
#[error("extraction stopped")]
pub struct StopExtraction;
