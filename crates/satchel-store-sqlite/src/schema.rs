//! SQL schema for the SQLite document backend.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS documents (
    doc_id   TEXT PRIMARY KEY,
    rev      TEXT NOT NULL,
    schema   TEXT NOT NULL,   -- copy of body.schema for pushdown filtering
    body     TEXT NOT NULL    -- full document JSON, including _id/_rev
);

-- Index requests from the engine are advisory for this adapter; they are
-- recorded so operators can inspect what the engine asked for.
CREATE TABLE IF NOT EXISTS index_requests (
    fields      TEXT PRIMARY KEY,  -- JSON array of dotted paths
    requested_on TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS documents_schema_idx ON documents(schema);
";
