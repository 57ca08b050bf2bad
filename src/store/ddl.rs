use rusqlite::Connection;

use crate::schema::Schema;
use crate::types::{Result, INFINITY};

// Storage identity of an entity row is (id, iteration); archive rows share
// the id with the live row.
fn entity_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT NOT NULL,
            iteration INTEGER NOT NULL CHECK (iteration >= 1),
            latest INTEGER NOT NULL,
            update_note TEXT,
            name TEXT,
            number TEXT,
            state TEXT,
            attrs TEXT,
            PRIMARY KEY (id, iteration)
        ) WITHOUT ROWID;
        CREATE UNIQUE INDEX IF NOT EXISTS {table}_latest ON {table} (id) WHERE latest = 1;"
    )
}

fn dependent_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            other_id TEXT,
            first_iteration INTEGER NOT NULL,
            last_iteration INTEGER NOT NULL,
            owner_name TEXT,
            owner_number TEXT,
            owner_state TEXT,
            other_name TEXT,
            other_number TEXT,
            other_state TEXT,
            attrs TEXT,
            PRIMARY KEY (id, first_iteration),
            CHECK (first_iteration <= last_iteration)
        ) WITHOUT ROWID;
        CREATE UNIQUE INDEX IF NOT EXISTS {table}_open ON {table} (id)
            WHERE last_iteration = {INFINITY};
        CREATE INDEX IF NOT EXISTS {table}_owner ON {table} (owner_id, last_iteration);
        CREATE INDEX IF NOT EXISTS {table}_other ON {table} (other_id, last_iteration);"
    )
}

pub(crate) fn create_tables(conn: &Connection, schema: &Schema) -> Result<()> {
    let mut batch = String::new();
    for ty in schema.entity_types() {
        batch.push_str(&entity_table_sql(&schema.entity(ty).table));
        batch.push('\n');
    }
    for rel in schema.relations() {
        batch.push_str(&dependent_table_sql(&schema.relation(rel).table));
        batch.push('\n');
    }
    conn.execute_batch(&batch)?;
    Ok(())
}
