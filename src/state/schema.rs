//! Database schema for the SQLite snapshot backend

/// SQL schema for the progress database
pub const SCHEMA_SQL: &str = r#"
-- One row per referenced collection
CREATE TABLE IF NOT EXISTS collections (
    key TEXT PRIMARY KEY,
    cursor INTEGER NOT NULL DEFAULT 0,
    last_item TEXT
);

-- ProcessedSet: items durably written to output
CREATE TABLE IF NOT EXISTS processed_items (
    collection TEXT NOT NULL REFERENCES collections(key),
    item_id TEXT NOT NULL,
    PRIMARY KEY (collection, item_id)
);

-- Items that failed and have not been emitted since
CREATE TABLE IF NOT EXISTS failed_items (
    collection TEXT NOT NULL REFERENCES collections(key),
    item_id TEXT NOT NULL,
    PRIMARY KEY (collection, item_id)
);

-- Snapshot version and last-updated timestamp
CREATE TABLE IF NOT EXISTS snapshot_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
