//! Iteration ledger and validity-window cascade over a SQLite row store.
//!
//! Entities keep an append-only history of iterations; the relations they
//! own are stored as intervals of the owner's iterations, so any past
//! iteration can be reconstructed with its dependents exactly as they were.

#![warn(missing_docs)]

pub mod admin;
pub mod cascade;
pub mod config;
pub mod history;
pub mod ledger;
pub mod logging;
pub mod lookup;
pub mod note;
pub mod schema;
pub mod store;
pub mod symmetric;
pub mod types;

pub use cascade::{Closed, DependentChange, Opened, RelationPredicate, ValidityCascade};
pub use config::{LedgerConfig, LedgerOptions};
pub use history::{HistoryReader, Snapshot};
pub use ledger::{IterationLedger, Revision, StatePolicy};
pub use lookup::{CounterMetrics, LookupMetrics, LookupService};
pub use schema::{EntityTypeId, Orientation, RelationId, RelationKind, Schema};
pub use store::{Session, Store};
pub use symmetric::{SymmetricAdapter, SymmetricView};
pub use types::{
    DependentId, DependentRecord, DisplayFields, EntityId, EntityRecord, ErrorKind, Iteration,
    LedgerError, NewDependent, Result, ValidityWindow,
};
