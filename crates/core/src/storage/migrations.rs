//! Versioned schema migrations (C10).
//!
//! Each migration is idempotent SQL applied inside one transaction via
//! `execute_batch`. `schema_version` tracks the highest version applied;
//! re-running a migration whose version is already recorded is a no-op.

/// A single schema migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: memories, rules, schema_version",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "FTS5 virtual table over memories + sync triggers",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Code entities, memory-code refs, file hashes",
        up: MIGRATION_V3_UP,
    },
    Migration {
        version: 4,
        description: "Visibility/sync passthrough columns on memories",
        up: MIGRATION_V4_UP,
    },
];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));

CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category TEXT NOT NULL,
    content TEXT NOT NULL,
    rationale TEXT,
    context TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    keywords TEXT NOT NULL DEFAULT '[]',
    file_path_absolute TEXT,
    file_path_relative TEXT,
    is_permanent INTEGER NOT NULL DEFAULT 0,
    pinned INTEGER NOT NULL DEFAULT 0,
    archived INTEGER NOT NULL DEFAULT 0,
    outcome TEXT,
    worked INTEGER,
    vector_embedding_ref TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_category ON memories(category);
CREATE INDEX IF NOT EXISTS idx_memories_file_path ON memories(file_path_relative);
CREATE INDEX IF NOT EXISTS idx_memories_archived ON memories(archived);
CREATE INDEX IF NOT EXISTS idx_memories_created_at ON memories(created_at);

CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trigger TEXT NOT NULL,
    trigger_keywords TEXT,
    must_do TEXT NOT NULL DEFAULT '[]',
    must_not TEXT NOT NULL DEFAULT '[]',
    ask_first TEXT NOT NULL DEFAULT '[]',
    warnings TEXT NOT NULL DEFAULT '[]',
    priority INTEGER NOT NULL DEFAULT 0,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rules_enabled ON rules(enabled);
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    content, rationale, tags,
    content='memories',
    content_rowid='id',
    tokenize='porter unicode61'
);

INSERT INTO memories_fts(rowid, content, rationale, tags)
SELECT id, content, COALESCE(rationale, ''), tags FROM memories
WHERE id NOT IN (SELECT rowid FROM memories_fts);

CREATE TRIGGER IF NOT EXISTS memories_fts_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, content, rationale, tags)
    VALUES (new.id, new.content, COALESCE(new.rationale, ''), new.tags);
END;

CREATE TRIGGER IF NOT EXISTS memories_fts_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content, rationale, tags)
    VALUES ('delete', old.id, old.content, COALESCE(old.rationale, ''), old.tags);
END;

CREATE TRIGGER IF NOT EXISTS memories_fts_au AFTER UPDATE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, content, rationale, tags)
    VALUES ('delete', old.id, old.content, COALESCE(old.rationale, ''), old.tags);
    INSERT INTO memories_fts(rowid, content, rationale, tags)
    VALUES (new.id, new.content, COALESCE(new.rationale, ''), new.tags);
END;

UPDATE schema_version SET version = 2, applied_at = datetime('now');
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (2, datetime('now'));
"#;

const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS code_entities (
    id TEXT PRIMARY KEY,
    project_path TEXT NOT NULL,
    file_path TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    name TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    line_start INTEGER NOT NULL,
    line_end INTEGER NOT NULL,
    signature TEXT,
    docstring TEXT,
    imports TEXT NOT NULL DEFAULT '[]',
    calls TEXT NOT NULL DEFAULT '[]',
    called_by TEXT NOT NULL DEFAULT '[]',
    inherits TEXT NOT NULL DEFAULT '[]',
    indexed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_code_entities_qualified_name ON code_entities(qualified_name);
CREATE INDEX IF NOT EXISTS idx_code_entities_project_file ON code_entities(project_path, file_path);
CREATE INDEX IF NOT EXISTS idx_code_entities_name ON code_entities(name);

CREATE TABLE IF NOT EXISTS memory_code_refs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id INTEGER NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    code_entity_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    line_number INTEGER,
    relationship TEXT NOT NULL DEFAULT 'about'
);

CREATE INDEX IF NOT EXISTS idx_memory_code_refs_memory ON memory_code_refs(memory_id);
CREATE INDEX IF NOT EXISTS idx_memory_code_refs_entity ON memory_code_refs(code_entity_id);

CREATE TABLE IF NOT EXISTS file_hashes (
    project_path TEXT NOT NULL,
    file_path TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    indexed_at TEXT NOT NULL,
    PRIMARY KEY (project_path, file_path)
);

UPDATE schema_version SET version = 3, applied_at = datetime('now');
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (3, datetime('now'));
"#;

const MIGRATION_V4_UP: &str = r#"
ALTER TABLE memories ADD COLUMN visibility TEXT NOT NULL DEFAULT 'private';
ALTER TABLE memories ADD COLUMN origin_id TEXT;
ALTER TABLE memories ADD COLUMN origin_user TEXT;
ALTER TABLE memories ADD COLUMN synced_at TEXT;
ALTER TABLE memories ADD COLUMN sync_hash TEXT;

UPDATE schema_version SET version = 4, applied_at = datetime('now');
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (4, datetime('now'));
"#;

pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply every migration with `version > current`, in order. Each statement
/// batch is guarded (`IF NOT EXISTS`, additive `ALTER TABLE`), so re-running
/// the full list against an up-to-date database is a no-op.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn migrates_fresh_database_to_latest() {
        let conn = Connection::open_in_memory().unwrap();
        let applied = apply_migrations(&conn).unwrap();
        assert_eq!(applied, MIGRATIONS.len() as u32);
        assert_eq!(get_current_version(&conn).unwrap(), 4);
    }

    #[test]
    fn running_migrations_twice_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        let applied_again = apply_migrations(&conn).unwrap();
        assert_eq!(applied_again, 0);
    }

    #[test]
    fn alter_table_columns_survive_rerun() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO memories (category, content, tags, keywords, created_at, updated_at)
             VALUES ('decision', 'use sqlite', '[]', '[]', datetime('now'), datetime('now'))",
            [],
        )
        .unwrap();
        apply_migrations(&conn).unwrap();
        let visibility: String = conn
            .query_row("SELECT visibility FROM memories WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(visibility, "private");
    }
}
