//! SQLite-backed row store and the per-transaction [`Session`] context.
//!
//! The store owns the connection, the schema, and the collaborators the
//! cascade consults (relation constraints, the lifecycle state policy). All
//! engine services are stateless and receive a `Session` explicitly; the
//! session is the storage transaction boundary.

pub mod condition;
mod ddl;
pub mod rows;

use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, warn};

use crate::cascade::{ConstraintRegistry, RelationPredicate, ValidityCascade};
use crate::config::LedgerOptions;
use crate::history::HistoryReader;
use crate::ledger::{AlwaysBump, IterationLedger, StatePolicy};
use crate::lookup::LookupService;
use crate::schema::{RelationId, Schema};
use crate::symmetric::SymmetricAdapter;
use crate::types::Result;

/// An open database plus the schema it was opened with.
pub struct Store {
    conn: Connection,
    schema: Arc<Schema>,
    options: LedgerOptions,
    constraints: ConstraintRegistry,
    policy: Arc<dyn StatePolicy>,
    lookup: LookupService,
}

impl Store {
    /// Opens or creates a file-backed store and ensures every table exists.
    pub fn open(path: impl AsRef<Path>, schema: Schema, options: LedgerOptions) -> Result<Self> {
        options.validate()?;
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", options.synchronous.pragma_value())?;
        Self::with_connection(conn, schema, options)
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory(schema: Schema, options: LedgerOptions) -> Result<Self> {
        options.validate()?;
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, schema, options)
    }

    fn with_connection(conn: Connection, schema: Schema, options: LedgerOptions) -> Result<Self> {
        ddl::create_tables(&conn, &schema)?;
        let lookup = LookupService::new(&options);
        debug!(
            entities = schema.entity_types().count(),
            relations = schema.relations().count(),
            chunk_size = options.chunk_size,
            "store.open"
        );
        Ok(Self {
            conn,
            schema: Arc::new(schema),
            options,
            constraints: ConstraintRegistry::default(),
            policy: Arc::new(AlwaysBump),
            lookup,
        })
    }

    /// Schema the store was opened with.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Options the store was opened with.
    pub fn options(&self) -> &LedgerOptions {
        &self.options
    }

    /// Batched lookup service bound to this store's options.
    pub fn lookup(&self) -> LookupService {
        self.lookup.clone()
    }

    /// Iteration ledger service.
    pub fn ledger(&self) -> IterationLedger {
        IterationLedger::new(self.lookup.clone())
    }

    /// Validity-window cascade service.
    pub fn cascade(&self) -> ValidityCascade {
        ValidityCascade::new(self.ledger())
    }

    /// As-of history reader.
    pub fn history(&self) -> HistoryReader {
        HistoryReader::new(self.lookup.clone())
    }

    /// Symmetric-relation adapter.
    pub fn symmetric(&self) -> SymmetricAdapter {
        SymmetricAdapter::new(self.lookup.clone())
    }

    /// Registers a validity predicate consulted before opening intervals of
    /// `relation`. Replaces any earlier predicate for the same relation.
    pub fn register_constraint(&mut self, relation: RelationId, predicate: RelationPredicate) {
        self.constraints.register(relation, predicate);
    }

    /// Installs the lifecycle policy consulted by [`IterationLedger::revise`].
    pub fn set_state_policy(&mut self, policy: Arc<dyn StatePolicy>) {
        self.policy = policy;
    }

    /// Runs `f` inside one immediate transaction.
    ///
    /// Commits when `f` returns `Ok`; rolls back every write when it returns
    /// `Err`, so a failed cascade never leaves a half-advanced owner.
    pub fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&Session<'_>) -> Result<T>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = {
            let session = Session {
                conn: &tx,
                schema: &self.schema,
                constraints: &self.constraints,
                policy: self.policy.as_ref(),
            };
            f(&session)
        };
        match outcome {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                warn!(error = %err, "store.transaction.rollback");
                tx.rollback()?;
                Err(err)
            }
        }
    }
}

/// Transaction context handed to every engine operation.
pub struct Session<'a> {
    conn: &'a Connection,
    schema: &'a Schema,
    constraints: &'a ConstraintRegistry,
    policy: &'a dyn StatePolicy,
}

impl<'a> Session<'a> {
    /// Connection bound to the open transaction.
    pub(crate) fn conn(&self) -> &'a Connection {
        self.conn
    }

    /// Schema of the store.
    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Relation predicates.
    pub fn constraints(&self) -> &'a ConstraintRegistry {
        self.constraints
    }

    /// Lifecycle policy.
    pub fn state_policy(&self) -> &'a dyn StatePolicy {
        self.policy
    }
}
