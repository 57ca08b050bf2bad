use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sink for lookup and bulk-write activity.
///
/// Implementations must be cheap; they are called on every chunk query and
/// every bulk statement.
pub trait LookupMetrics: Send + Sync {
    /// One chunked read was issued against `table`.
    fn chunk_query(&self, table: &str);

    /// One archive statement wrote `rows` rows.
    fn archive_insert(&self, rows: usize);

    /// One promotion statement wrote `rows` rows.
    fn bulk_update(&self, rows: usize);

    /// One dependent-interval statement wrote `rows` rows.
    fn dependent_write(&self, rows: usize);
}

/// Discards everything.
#[derive(Default)]
pub struct NoopMetrics;

impl LookupMetrics for NoopMetrics {
    fn chunk_query(&self, _table: &str) {}
    fn archive_insert(&self, _rows: usize) {}
    fn bulk_update(&self, _rows: usize) {}
    fn dependent_write(&self, _rows: usize) {}
}

/// Atomic counters, mostly useful in tests and diagnostics.
#[derive(Default)]
pub struct CounterMetrics {
    /// Chunk queries issued.
    pub chunk_queries: AtomicU64,
    /// Archive statements issued.
    pub archive_statements: AtomicU64,
    /// Rows archived.
    pub archived_rows: AtomicU64,
    /// Promotion statements issued.
    pub update_statements: AtomicU64,
    /// Rows promoted.
    pub updated_rows: AtomicU64,
    /// Dependent statements issued.
    pub dependent_statements: AtomicU64,
    /// Dependent rows written.
    pub dependent_rows: AtomicU64,
}

impl CounterMetrics {
    /// Chunk queries issued so far.
    pub fn chunk_queries(&self) -> u64 {
        self.chunk_queries.load(Ordering::Relaxed)
    }

    /// Archive statements issued so far.
    pub fn archive_statements(&self) -> u64 {
        self.archive_statements.load(Ordering::Relaxed)
    }

    /// Promotion statements issued so far.
    pub fn update_statements(&self) -> u64 {
        self.update_statements.load(Ordering::Relaxed)
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        for counter in [
            &self.chunk_queries,
            &self.archive_statements,
            &self.archived_rows,
            &self.update_statements,
            &self.updated_rows,
            &self.dependent_statements,
            &self.dependent_rows,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl LookupMetrics for CounterMetrics {
    fn chunk_query(&self, _table: &str) {
        self.chunk_queries.fetch_add(1, Ordering::Relaxed);
    }

    fn archive_insert(&self, rows: usize) {
        self.archive_statements.fetch_add(1, Ordering::Relaxed);
        self.archived_rows.fetch_add(rows as u64, Ordering::Relaxed);
    }

    fn bulk_update(&self, rows: usize) {
        self.update_statements.fetch_add(1, Ordering::Relaxed);
        self.updated_rows.fetch_add(rows as u64, Ordering::Relaxed);
    }

    fn dependent_write(&self, rows: usize) {
        self.dependent_statements.fetch_add(1, Ordering::Relaxed);
        self.dependent_rows.fetch_add(rows as u64, Ordering::Relaxed);
    }
}

/// Returns the default metrics sink.
pub fn default_metrics() -> Arc<dyn LookupMetrics> {
    Arc::new(NoopMetrics)
}
