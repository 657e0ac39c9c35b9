//! The shared state accumulator.
//!
//! # Ownership
//!
//! `StateCell` has exactly one owner: the ingestion loop, which both folds
//! updates into it and reads it to annotate outgoing messages. It carries no
//! lock and no atomic, and is deliberately neither `Clone` nor `Copy`, so the
//! borrow checker enforces the single-writer invariant. If ingestion is ever
//! spread across tasks, the cell has to become an atomic or sit behind a
//! single serializing task.

use crate::error::PayloadError;
use crate::message::parse_delta;

/// Running sum of every integer payload received, in arrival order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StateCell {
    value: i64,
}

impl StateCell {
    /// Creates a cell starting at zero.
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// Creates a cell starting at `value`.
    pub const fn with_value(value: i64) -> Self {
        Self { value }
    }

    /// Returns the current value.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.value
    }

    /// Adds `delta` and returns the new value.
    ///
    /// Overflow wraps in two's complement rather than panicking.
    pub fn apply(&mut self, delta: i64) -> i64 {
        self.value = self.value.wrapping_add(delta);
        self.value
    }

    /// Parses `payload` as an integer and folds it into the cell.
    ///
    /// On parse failure the cell is unchanged and the reason is returned;
    /// callers treat that as "not an update", not as an error.
    pub fn ingest(&mut self, payload: &[u8]) -> Result<i64, PayloadError> {
        let delta = parse_delta(payload)?;
        Ok(self.apply(delta))
    }
}
