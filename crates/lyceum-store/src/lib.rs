//! Versioned in-memory object tables for the Lyceum chain state.
//!
//! This crate implements the undo machinery the chain builds its state on.
//! Every consensus entity lives as a row in a typed [`Table`] keyed by a
//! store-assigned monotonically increasing id, and every table carries a
//! stack of copy-on-write undo levels so that blocks and transactions can be
//! applied speculatively and rolled back in O(changes).
//!
//! # Key Types
//!
//! - [`StoreObject`] -- trait a row type implements (type name + id accessor)
//! - [`Table`] -- a single typed table with its undo-level stack
//! - [`StoreError`] -- row lookup failures
//!
//! # Design Rules
//!
//! 1. Ids are assigned by the table; removed ids are not reused, but undo
//!    rolls the watermark back so a re-applied change assigns the same ids.
//! 2. An undo level records each touched row once, with its pre-level value.
//! 3. Levels are strictly LIFO: undo and squash act on the newest level,
//!    commit retires the oldest.
//! 4. Mutations while no level is open are permanent immediately.
//! 5. Iteration order is ascending id, so table scans are deterministic.
//! 6. Missing-row lookups are errors; misuse of the level stack is a panic.

pub mod error;
pub mod table;

// Re-export primary types at crate root for ergonomic imports.
pub use error::StoreError;
pub use table::{StoreObject, Table};
