//! Typed query helpers over the schema defined in `migrations`. Kept
//! separate from connection/transaction plumbing in `mod.rs` so row mapping
//! can be unit-tested against an in-memory database.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::model::{CodeEntity, FileHash, Memory, MemoryCodeRef, Rule, SyncMeta};

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|n| n.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}

fn json_vec(s: Option<String>) -> Vec<String> {
    s.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default()
}

pub fn row_to_memory(row: &Row) -> rusqlite::Result<Memory> {
    let tags: String = row.get("tags")?;
    let keywords: String = row.get("keywords")?;
    let context: Option<String> = row.get("context")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let worked: Option<i64> = row.get("worked")?;

    Ok(Memory {
        id: row.get("id")?,
        category: row.get("category")?,
        content: row.get("content")?,
        rationale: row.get("rationale")?,
        context: context.and_then(|c| serde_json::from_str(&c).ok()),
        tags: json_vec(Some(tags)),
        keywords: json_vec(Some(keywords)),
        file_path_absolute: row.get("file_path_absolute")?,
        file_path_relative: row.get("file_path_relative")?,
        is_permanent: row.get::<_, i64>("is_permanent")? != 0,
        pinned: row.get::<_, i64>("pinned")? != 0,
        archived: row.get::<_, i64>("archived")? != 0,
        outcome: row.get("outcome")?,
        worked: worked.map(|w| w != 0),
        vector_embedding_ref: row.get("vector_embedding_ref")?,
        sync: SyncMeta {
            visibility: row.get("visibility")?,
            origin_id: row.get("origin_id")?,
            origin_user: row.get("origin_user")?,
            synced_at: row
                .get::<_, Option<String>>("synced_at")?
                .map(parse_ts),
            sync_hash: row.get("sync_hash")?,
        },
        created_at: parse_ts(created_at),
        updated_at: parse_ts(updated_at),
    })
}

const MEMORY_COLUMNS: &str = "id, category, content, rationale, context, tags, keywords, \
    file_path_absolute, file_path_relative, is_permanent, pinned, archived, outcome, worked, \
    vector_embedding_ref, visibility, origin_id, origin_user, synced_at, sync_hash, \
    created_at, updated_at";

/// Filter for the one broad select operation spec.md §4.1 calls for.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub ids: Option<Vec<i64>>,
    pub categories: Option<Vec<String>>,
    pub tags_any: Option<Vec<String>>,
    pub file_path: Option<String>,
    pub include_archived: bool,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

pub fn select_memories(conn: &Connection, filter: &MemoryFilter) -> Result<Vec<Memory>> {
    let mut sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE 1=1");
    let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if !filter.include_archived {
        sql.push_str(" AND archived = 0");
    }
    if let Some(ids) = &filter.ids {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        sql.push_str(&format!(" AND id IN ({placeholders})"));
        for id in ids {
            bound.push(Box::new(*id));
        }
    }
    if let Some(cats) = &filter.categories {
        if !cats.is_empty() {
            let placeholders = cats.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            sql.push_str(&format!(" AND category IN ({placeholders})"));
            for c in cats {
                bound.push(Box::new(c.clone()));
            }
        }
    }
    if let Some(since) = filter.since {
        sql.push_str(" AND created_at >= ?");
        bound.push(Box::new(since.to_rfc3339()));
    }
    if let Some(until) = filter.until {
        sql.push_str(" AND created_at <= ?");
        bound.push(Box::new(until.to_rfc3339()));
    }
    sql.push_str(" ORDER BY id");

    let mut stmt = conn.prepare(&sql)?;
    let bound_refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
    let rows = stmt.query_map(bound_refs.as_slice(), row_to_memory)?;
    let mut out = Vec::new();
    for row in rows {
        let m = row?;
        if let Some(tags_any) = &filter.tags_any {
            if !tags_any.is_empty() && !m.tags.iter().any(|t| tags_any.contains(t)) {
                continue;
            }
        }
        if let Some(fp) = &filter.file_path {
            // Component-aware suffix match done in Rust (not SQL `LIKE`) so
            // `_`/`%` in a real path are never treated as wildcards.
            let matches = match &m.file_path_relative {
                Some(rel) => rel == fp || rel.ends_with(&format!("/{fp}")),
                None => false,
            };
            if !matches {
                continue;
            }
        }
        out.push(m);
    }
    Ok(out)
}

pub fn get_memory(conn: &Connection, id: i64) -> Result<Option<Memory>> {
    let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1");
    Ok(conn
        .query_row(&sql, params![id], row_to_memory)
        .optional()?)
}

#[allow(clippy::too_many_arguments)]
pub fn insert_memory(
    tx: &rusqlite::Transaction,
    category: &str,
    content: &str,
    rationale: Option<&str>,
    context: Option<&serde_json::Value>,
    tags: &[String],
    keywords: &[String],
    file_path_absolute: Option<&str>,
    file_path_relative: Option<&str>,
    is_permanent: bool,
) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO memories (
            category, content, rationale, context, tags, keywords,
            file_path_absolute, file_path_relative, is_permanent, pinned, archived,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 0, ?10, ?10)",
        params![
            category,
            content,
            rationale,
            context.map(|c| c.to_string()),
            serde_json::to_string(tags).unwrap_or_default(),
            serde_json::to_string(keywords).unwrap_or_default(),
            file_path_absolute,
            file_path_relative,
            is_permanent as i64,
            now,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

pub fn update_memory_outcome(
    tx: &rusqlite::Transaction,
    id: i64,
    outcome: &str,
    worked: Option<bool>,
) -> Result<()> {
    tx.execute(
        "UPDATE memories SET outcome = ?1, worked = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            outcome,
            worked.map(|w| w as i64),
            Utc::now().to_rfc3339(),
            id
        ],
    )?;
    Ok(())
}

pub fn set_pin_archive(
    tx: &rusqlite::Transaction,
    id: i64,
    pinned: Option<bool>,
    archived: Option<bool>,
) -> Result<()> {
    if let Some(p) = pinned {
        let is_permanent_clause = if p { ", is_permanent = 1" } else { "" };
        tx.execute(
            &format!(
                "UPDATE memories SET pinned = ?1{is_permanent_clause}, updated_at = ?2 WHERE id = ?3"
            ),
            params![p as i64, Utc::now().to_rfc3339(), id],
        )?;
    }
    if let Some(a) = archived {
        tx.execute(
            "UPDATE memories SET archived = ?1, updated_at = ?2 WHERE id = ?3",
            params![a as i64, Utc::now().to_rfc3339(), id],
        )?;
    }
    Ok(())
}

pub fn set_vector_ref(tx: &rusqlite::Transaction, id: i64, vector_ref: Option<&str>) -> Result<()> {
    tx.execute(
        "UPDATE memories SET vector_embedding_ref = ?1 WHERE id = ?2",
        params![vector_ref, id],
    )?;
    Ok(())
}

pub fn delete_memory(tx: &rusqlite::Transaction, id: i64) -> Result<()> {
    tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
    Ok(())
}

/// Full-text search fallback lane (C1 FTS, used by C5 lane F).
pub struct FtsHit {
    pub id: i64,
    pub score: f32,
}

pub fn fts_query(conn: &Connection, text: &str, limit: usize) -> Result<Vec<FtsHit>> {
    let sanitized = sanitize_fts_query(text);
    if sanitized.is_empty() {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare(
        "SELECT rowid, bm25(memories_fts) AS rank FROM memories_fts
         WHERE memories_fts MATCH ?1 ORDER BY rank LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![sanitized, limit as i64], |row| {
        let rank: f64 = row.get("rank")?;
        Ok(FtsHit {
            id: row.get("rowid")?,
            // bm25() is negative and smaller-is-better; flip sign so callers
            // can max-scale like the other lanes.
            score: -rank as f32,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// FTS5 MATCH syntax treats `" * ( ) : ^ -` specially; quote each token so
/// arbitrary user text can never be parsed as a query operator.
fn sanitize_fts_query(text: &str) -> String {
    text.split_whitespace()
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

// ---- Rules -------------------------------------------------------------

fn row_to_rule(row: &Row) -> rusqlite::Result<Rule> {
    let created_at: String = row.get("created_at")?;
    Ok(Rule {
        id: row.get("id")?,
        trigger: row.get("trigger")?,
        trigger_keywords: row
            .get::<_, Option<String>>("trigger_keywords")?
            .and_then(|s| serde_json::from_str(&s).ok()),
        must_do: json_vec(row.get("must_do")?),
        must_not: json_vec(row.get("must_not")?),
        ask_first: json_vec(row.get("ask_first")?),
        warnings: json_vec(row.get("warnings")?),
        priority: row.get("priority")?,
        enabled: row.get::<_, i64>("enabled")? != 0,
        created_at: parse_ts(created_at),
    })
}

const RULE_COLUMNS: &str =
    "id, trigger, trigger_keywords, must_do, must_not, ask_first, warnings, priority, enabled, created_at";

#[allow(clippy::too_many_arguments)]
pub fn insert_rule(
    tx: &rusqlite::Transaction,
    trigger: &str,
    must_do: &[String],
    must_not: &[String],
    ask_first: &[String],
    warnings: &[String],
    priority: i32,
) -> Result<i64> {
    tx.execute(
        "INSERT INTO rules (trigger, must_do, must_not, ask_first, warnings, priority, enabled, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
        params![
            trigger,
            serde_json::to_string(must_do).unwrap_or_default(),
            serde_json::to_string(must_not).unwrap_or_default(),
            serde_json::to_string(ask_first).unwrap_or_default(),
            serde_json::to_string(warnings).unwrap_or_default(),
            priority,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

pub fn list_rules(conn: &Connection, enabled_only: bool) -> Result<Vec<Rule>> {
    let sql = if enabled_only {
        format!("SELECT {RULE_COLUMNS} FROM rules WHERE enabled = 1 ORDER BY priority DESC, id")
    } else {
        format!("SELECT {RULE_COLUMNS} FROM rules ORDER BY priority DESC, id")
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], row_to_rule)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ---- Code entities -------------------------------------------------------

fn row_to_entity(row: &Row) -> rusqlite::Result<CodeEntity> {
    let indexed_at: String = row.get("indexed_at")?;
    Ok(CodeEntity {
        id: row.get("id")?,
        project_path: row.get("project_path")?,
        file_path: row.get("file_path")?,
        entity_type: row.get("entity_type")?,
        name: row.get("name")?,
        qualified_name: row.get("qualified_name")?,
        line_start: row.get::<_, i64>("line_start")? as u32,
        line_end: row.get::<_, i64>("line_end")? as u32,
        signature: row.get("signature")?,
        docstring: row.get("docstring")?,
        imports: json_vec(row.get("imports")?),
        calls: json_vec(row.get("calls")?),
        called_by: json_vec(row.get("called_by")?),
        inherits: json_vec(row.get("inherits")?),
        indexed_at: parse_ts(indexed_at),
    })
}

const ENTITY_COLUMNS: &str = "id, project_path, file_path, entity_type, name, qualified_name, \
    line_start, line_end, signature, docstring, imports, calls, called_by, inherits, indexed_at";

pub fn upsert_entity(tx: &rusqlite::Transaction, e: &CodeEntity) -> Result<()> {
    tx.execute(
        "INSERT INTO code_entities (
            id, project_path, file_path, entity_type, name, qualified_name,
            line_start, line_end, signature, docstring, imports, calls, called_by, inherits, indexed_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)
        ON CONFLICT(id) DO UPDATE SET
            file_path=excluded.file_path, line_start=excluded.line_start, line_end=excluded.line_end,
            signature=excluded.signature, docstring=excluded.docstring, imports=excluded.imports,
            calls=excluded.calls, called_by=excluded.called_by, inherits=excluded.inherits,
            indexed_at=excluded.indexed_at",
        params![
            e.id,
            e.project_path,
            e.file_path,
            e.entity_type,
            e.name,
            e.qualified_name,
            e.line_start,
            e.line_end,
            e.signature,
            e.docstring,
            serde_json::to_string(&e.imports).unwrap_or_default(),
            serde_json::to_string(&e.calls).unwrap_or_default(),
            serde_json::to_string(&e.called_by).unwrap_or_default(),
            serde_json::to_string(&e.inherits).unwrap_or_default(),
            e.indexed_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn delete_entities_for_file(
    tx: &rusqlite::Transaction,
    project_path: &str,
    file_path: &str,
) -> Result<()> {
    tx.execute(
        "DELETE FROM code_entities WHERE project_path = ?1 AND file_path = ?2",
        params![project_path, file_path],
    )?;
    Ok(())
}

pub fn delete_entities_for_project(tx: &rusqlite::Transaction, project_path: &str) -> Result<()> {
    tx.execute(
        "DELETE FROM code_entities WHERE project_path = ?1",
        params![project_path],
    )?;
    Ok(())
}

pub fn find_entities_by_name(
    conn: &Connection,
    project_path: &str,
    name: &str,
) -> Result<Vec<CodeEntity>> {
    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM code_entities WHERE project_path = ?1 \
         AND (qualified_name = ?2 OR qualified_name LIKE ?3 OR name = ?2)"
    );
    let mut stmt = conn.prepare(&sql)?;
    let suffix_pattern = format!("%.{name}");
    let rows = stmt.query_map(params![project_path, name, suffix_pattern], row_to_entity)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn get_entity(conn: &Connection, id: &str) -> Result<Option<CodeEntity>> {
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM code_entities WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], row_to_entity).optional()?)
}

pub fn count_entities_by_type(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut stmt =
        conn.prepare("SELECT entity_type, COUNT(*) FROM code_entities GROUP BY entity_type")?;
    let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ---- Memory <-> code refs -------------------------------------------------

pub fn insert_memory_code_ref(
    tx: &rusqlite::Transaction,
    memory_id: i64,
    entity: &CodeEntity,
    relationship: &str,
) -> Result<()> {
    tx.execute(
        "INSERT INTO memory_code_refs
            (memory_id, code_entity_id, entity_type, entity_name, file_path, line_number, relationship)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            memory_id,
            entity.id,
            entity.entity_type,
            entity.name,
            entity.file_path,
            entity.line_start,
            relationship,
        ],
    )?;
    Ok(())
}

pub fn refs_for_memory(conn: &Connection, memory_id: i64) -> Result<Vec<MemoryCodeRef>> {
    let mut stmt = conn.prepare(
        "SELECT id, memory_id, code_entity_id, entity_type, entity_name, file_path, line_number, relationship
         FROM memory_code_refs WHERE memory_id = ?1",
    )?;
    let rows = stmt.query_map(params![memory_id], |row| {
        Ok(MemoryCodeRef {
            id: row.get(0)?,
            memory_id: row.get(1)?,
            code_entity_id: row.get(2)?,
            entity_type: row.get(3)?,
            entity_name: row.get(4)?,
            file_path: row.get(5)?,
            line_number: row.get::<_, Option<i64>>(6)?.map(|n| n as u32),
            relationship: row.get(7)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn refs_for_entity(conn: &Connection, entity_id: &str) -> Result<Vec<MemoryCodeRef>> {
    let mut stmt = conn.prepare(
        "SELECT id, memory_id, code_entity_id, entity_type, entity_name, file_path, line_number, relationship
         FROM memory_code_refs WHERE code_entity_id = ?1",
    )?;
    let rows = stmt.query_map(params![entity_id], |row| {
        Ok(MemoryCodeRef {
            id: row.get(0)?,
            memory_id: row.get(1)?,
            code_entity_id: row.get(2)?,
            entity_type: row.get(3)?,
            entity_name: row.get(4)?,
            file_path: row.get(5)?,
            line_number: row.get::<_, Option<i64>>(6)?.map(|n| n as u32),
            relationship: row.get(7)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ---- File hashes -----------------------------------------------------------

pub fn get_file_hash(conn: &Connection, project_path: &str, file_path: &str) -> Result<Option<FileHash>> {
    Ok(conn
        .query_row(
            "SELECT project_path, file_path, content_hash, indexed_at FROM file_hashes
             WHERE project_path = ?1 AND file_path = ?2",
            params![project_path, file_path],
            |row| {
                let indexed_at: String = row.get(3)?;
                Ok(FileHash {
                    project_path: row.get(0)?,
                    file_path: row.get(1)?,
                    content_hash: row.get(2)?,
                    indexed_at: parse_ts(indexed_at),
                })
            },
        )
        .optional()?)
}

pub fn set_file_hash(
    tx: &rusqlite::Transaction,
    project_path: &str,
    file_path: &str,
    content_hash: &str,
) -> Result<()> {
    tx.execute(
        "INSERT INTO file_hashes (project_path, file_path, content_hash, indexed_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(project_path, file_path) DO UPDATE SET content_hash = excluded.content_hash, indexed_at = excluded.indexed_at",
        params![project_path, file_path, content_hash, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::apply_migrations;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn insert_then_select_round_trips() {
        let mut conn = memory_db();
        let tx = conn.transaction().unwrap();
        let id = insert_memory(
            &tx,
            "decision",
            "Use PostgreSQL for the database layer",
            None,
            None,
            &["database".to_string()],
            &["postgresql".to_string()],
            None,
            None,
            false,
        )
        .unwrap();
        tx.commit().unwrap();

        let m = get_memory(&conn, id).unwrap().unwrap();
        assert_eq!(m.content, "Use PostgreSQL for the database layer");
        assert_eq!(m.tags, vec!["database".to_string()]);
        assert!(!m.archived);
    }

    #[test]
    fn select_memories_excludes_archived_by_default() {
        let mut conn = memory_db();
        let tx = conn.transaction().unwrap();
        let id = insert_memory(&tx, "pattern", "content", None, None, &[], &[], None, None, false).unwrap();
        set_pin_archive(&tx, id, None, Some(true)).unwrap();
        tx.commit().unwrap();

        let visible = select_memories(&conn, &MemoryFilter::default()).unwrap();
        assert!(visible.is_empty());

        let all = select_memories(
            &conn,
            &MemoryFilter {
                include_archived: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn pinning_sets_is_permanent() {
        let mut conn = memory_db();
        let tx = conn.transaction().unwrap();
        let id = insert_memory(&tx, "pattern", "content", None, None, &[], &[], None, None, false).unwrap();
        set_pin_archive(&tx, id, Some(true), None).unwrap();
        tx.commit().unwrap();

        let m = get_memory(&conn, id).unwrap().unwrap();
        assert!(m.pinned);
        assert!(m.is_permanent);
    }

    #[test]
    fn fts_query_finds_inserted_content() {
        let mut conn = memory_db();
        let tx = conn.transaction().unwrap();
        insert_memory(
            &tx,
            "decision",
            "Use PostgreSQL for the database layer",
            None,
            None,
            &[],
            &[],
            None,
            None,
            false,
        )
        .unwrap();
        tx.commit().unwrap();

        let hits = fts_query(&conn, "postgresql", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }
}
