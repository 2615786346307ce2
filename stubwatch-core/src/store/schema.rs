//! Store schema. Applied idempotently on every open; `user_version` records
//! the schema revision.

pub const SCHEMA_VERSION: i64 = 1;

pub const SCHEMA_SQL: &str = r#"
-- One row per lifecycle of a placeholder occurrence.
-- A key that reappears after resolution gets a new row; old rows are never reopened.
CREATE TABLE IF NOT EXISTS placeholder_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL,
    line_number INTEGER NOT NULL,
    pattern_id TEXT NOT NULL,
    context TEXT NOT NULL,
    suggestion TEXT,
    created_at TEXT NOT NULL,
    author TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'resolved')),
    resolved_at TEXT,
    resolved_by TEXT
);

-- At most one OPEN record per natural key.
CREATE UNIQUE INDEX IF NOT EXISTS idx_records_open_key
    ON placeholder_records(file_path, line_number, pattern_id, context)
    WHERE status = 'open';
CREATE INDEX IF NOT EXISTS idx_records_status ON placeholder_records(status);

CREATE TABLE IF NOT EXISTS audit_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    taken_at TEXT NOT NULL,
    open_count INTEGER NOT NULL,
    resolved_count INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS density_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    taken_at TEXT NOT NULL,
    open_count INTEGER NOT NULL,
    tracked_lines INTEGER NOT NULL,
    open_per_kloc REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS corrections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    file_path TEXT NOT NULL,
    backup_path TEXT,
    backup_sha256 TEXT,
    rationale TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('remediation', 'autofill')),
    outcome TEXT NOT NULL CHECK (outcome IN ('success', 'failure')),
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_corrections_file ON corrections(file_path);

CREATE TABLE IF NOT EXISTS rollbacks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    file_path TEXT NOT NULL,
    backup_path TEXT,
    correction_id INTEGER REFERENCES corrections(id),
    outcome TEXT NOT NULL CHECK (outcome IN ('success', 'failure')),
    detail TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rollbacks_file ON rollbacks(file_path);
"#;
