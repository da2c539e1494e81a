//! Code indexer (C8): multi-language AST parsing over a project tree,
//! producing stable `CodeEntity` rows keyed by content-addressed IDs.
//! Query style grounded on CortexAST's `inspector.rs` (`run_query`,
//! "name"/"def" capture convention); file enumeration grounded on its
//! `scanner.rs` (`ignore::WalkBuilder`, `standard_filters(true)`).

pub mod languages;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lru::LruCache;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tree_sitter::{Parser, Query, QueryCursor, Tree};

use crate::error::Result;
use crate::model::CodeEntity;
use crate::storage::Storage;

use languages::{grammar, pick_language, spec_for, Lang};

/// One parsed entity before it is assigned imports/calls from its siblings.
#[derive(Debug, Clone)]
struct RawEntity {
    entity_type: &'static str,
    name: String,
    qualified_name: String,
    line_start: u32,
    line_end: u32,
    signature: Option<String>,
    docstring: Option<String>,
}

struct CachedTree {
    content_hash: String,
    tree: Tree,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

/// Bookkeeping the parse-tree cache needs across calls; split out so it
/// can be held behind a single `Mutex` independent of `CodeIndexer`'s
/// other fields.
struct ParseCache {
    trees: LruCache<PathBuf, CachedTree>,
    hits: u64,
    misses: u64,
}

pub struct CodeIndexer {
    project_path: String,
    cache: Mutex<ParseCache>,
}

impl CodeIndexer {
    pub fn new(project_path: impl Into<String>, cache_maxsize: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(cache_maxsize.max(1)).unwrap();
        CodeIndexer {
            project_path: project_path.into(),
            cache: Mutex::new(ParseCache {
                trees: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn parse_cache_stats(&self) -> ParseCacheStats {
        let cache = self.cache.lock().expect("parse cache mutex poisoned");
        ParseCacheStats {
            hits: cache.hits,
            misses: cache.misses,
            size: cache.trees.len(),
        }
    }

    /// Enumerate source files under `root`, parse each with its language's
    /// grammar, and write the resulting entities to `storage`. Reindexing
    /// is incremental: a file whose content hash matches `file_hashes` is
    /// skipped entirely (spec.md §4.8's "near-instant reindex" invariant).
    pub fn index_project(&self, root: &Path, storage: &Storage) -> Result<usize> {
        let files = enumerate_source_files(root);

        let project_path = self.project_path.clone();
        let to_parse: Vec<PathBuf> = {
            let mut pending = Vec::new();
            for path in files {
                let rel = relative_to(root, &path);
                let content = match std::fs::read_to_string(&path) {
                    Ok(c) => c,
                    Err(_) => continue,
                };
                let hash = content_hash(&content);
                let unchanged = storage
                    .with_reader(|conn| crate::storage::queries::get_file_hash(conn, &project_path, &rel))?
                    .map(|fh| fh.content_hash == hash)
                    .unwrap_or(false);
                if !unchanged {
                    pending.push(path);
                }
            }
            pending
        };

        let parsed: Vec<(PathBuf, String, Vec<RawEntity>, Vec<String>)> = to_parse
            .par_iter()
            .filter_map(|path| self.parse_file(path).map(|(content, entities, imports)| {
                (path.clone(), content, entities, imports)
            }))
            .collect();

        let mut indexed = 0;
        for (path, content, raw_entities, imports) in parsed {
            let rel = relative_to(root, &path);
            let hash = content_hash(&content);
            storage.with_write_tx(|tx| {
                crate::storage::queries::delete_entities_for_file(tx, &self.project_path, &rel)?;
                for raw in &raw_entities {
                    let entity = self.to_code_entity(&rel, raw, &imports);
                    crate::storage::queries::upsert_entity(tx, &entity)?;
                }
                crate::storage::queries::set_file_hash(tx, &self.project_path, &rel, &hash)?;
                Ok(())
            })?;
            indexed += raw_entities.len();
        }

        Ok(indexed)
    }

    fn parse_file(&self, path: &Path) -> Option<(String, Vec<RawEntity>, Vec<String>)> {
        let extension = path.extension()?.to_str()?;
        let lang = pick_language(extension)?;
        let language = grammar(lang)?;
        let content = std::fs::read_to_string(path).ok()?;
        let hash = content_hash(&content);

        let tree = {
            let mut cache = self.cache.lock().expect("parse cache mutex poisoned");
            if let Some(cached) = cache.trees.get(&path.to_path_buf()) {
                if cached.content_hash == hash {
                    cache.hits += 1;
                    cached.tree.clone()
                } else {
                    cache.misses += 1;
                    let tree = parse_with(&language, &content)?;
                    cache.trees.put(path.to_path_buf(), CachedTree { content_hash: hash.clone(), tree: tree.clone() });
                    tree
                }
            } else {
                cache.misses += 1;
                let tree = parse_with(&language, &content)?;
                cache.trees.put(path.to_path_buf(), CachedTree { content_hash: hash.clone(), tree: tree.clone() });
                tree
            }
        };

        let spec = spec_for(lang);
        let module_path = module_path_from_file(path, lang);

        let mut entities = Vec::new();
        for eq in spec.entity_queries {
            if let Ok(query) = Query::new(&language, eq.source) {
                run_entity_query(&query, &tree, &content, eq.kind, &module_path, spec.class_like_kinds, lang, &mut entities);
            }
        }

        let mut imports = Vec::new();
        if let Some(import_src) = spec.import_query {
            if let Ok(query) = Query::new(&language, import_src) {
                run_import_query(&query, &tree, &content, &mut imports);
            }
        }

        Some((content, entities, imports))
    }

    fn to_code_entity(&self, file_path: &str, raw: &RawEntity, imports: &[String]) -> CodeEntity {
        let id = stable_entity_id(&self.project_path, file_path, &raw.qualified_name, raw.entity_type);
        CodeEntity {
            id,
            project_path: self.project_path.clone(),
            file_path: file_path.to_string(),
            entity_type: raw.entity_type.to_string(),
            name: raw.name.clone(),
            qualified_name: raw.qualified_name.clone(),
            line_start: raw.line_start,
            line_end: raw.line_end,
            signature: raw.signature.clone(),
            docstring: raw.docstring.clone(),
            imports: imports.to_vec(),
            calls: Vec::new(),
            called_by: Vec::new(),
            inherits: Vec::new(),
            indexed_at: chrono::Utc::now(),
        }
    }

    /// Find an entity by name: exact qualified-name match first, then bare
    /// name, breaking ties by shortest qualified name (spec.md §4.8).
    pub fn find_entity(&self, storage: &Storage, name: &str) -> Result<Option<CodeEntity>> {
        let mut candidates =
            storage.with_reader(|conn| crate::storage::queries::find_entities_by_name(conn, &self.project_path, name))?;
        candidates.sort_by_key(|e| e.qualified_name.len());
        Ok(candidates.into_iter().next())
    }

    /// Entity plus the memories that reference it, used for change-impact
    /// queries (spec.md §4.8's "what else references this symbol").
    pub fn analyze_impact(
        &self,
        storage: &Storage,
        entity_id: &str,
    ) -> Result<Option<(CodeEntity, Vec<crate::model::MemoryCodeRef>)>> {
        let entity = storage.with_reader(|conn| crate::storage::queries::get_entity(conn, entity_id))?;
        match entity {
            Some(e) => {
                let refs = storage.with_reader(|conn| crate::storage::queries::refs_for_entity(conn, entity_id))?;
                Ok(Some((e, refs)))
            }
            None => Ok(None),
        }
    }
}

fn parse_with(language: &tree_sitter::Language, content: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    parser.set_language(language).ok()?;
    parser.parse(content, None)
}

fn run_entity_query(
    query: &Query,
    tree: &Tree,
    content: &str,
    kind: &'static str,
    module_path: &str,
    class_like_kinds: &[&str],
    lang: Lang,
    out: &mut Vec<RawEntity>,
) {
    let name_idx = query.capture_index_for_name("name");
    let def_idx = query.capture_index_for_name("def");
    let mut cursor = QueryCursor::new();
    let root = tree.root_node();
    for m in cursor.matches(query, root, content.as_bytes()) {
        let name_node = name_idx.and_then(|i| m.nodes_for_capture_index(i).next());
        let def_node = def_idx.and_then(|i| m.nodes_for_capture_index(i).next()).or(name_node);
        let (Some(name_node), Some(def_node)) = (name_node, def_node) else { continue };

        let Ok(name) = name_node.utf8_text(content.as_bytes()) else { continue };

        let mut segments: Vec<String> = Vec::new();
        if !module_path.is_empty() {
            segments.push(module_path.to_string());
        }
        segments.extend(enclosing_class_chain(def_node, class_like_kinds, content));
        segments.push(name.to_string());
        let qualified_name = segments.join(".");

        out.push(RawEntity {
            entity_type: kind,
            name: name.to_string(),
            qualified_name,
            line_start: def_node.start_position().row as u32 + 1,
            line_end: def_node.end_position().row as u32 + 1,
            signature: first_line(content, def_node),
            docstring: extract_docstring(lang, def_node, content),
        });
    }
}

/// Best-effort docstring/leading-comment capture (spec.md §4.8, §4.4's
/// `signature∪docstring` embedding trigger). Python's convention is a
/// string literal as the first statement in the body; every other
/// supported grammar names block/line comments `comment`, so a run of
/// comment nodes immediately preceding the entity is used instead.
fn extract_docstring(lang: Lang, def_node: tree_sitter::Node, content: &str) -> Option<String> {
    if lang == Lang::Python {
        if let Some(doc) = python_docstring(def_node, content) {
            return Some(doc);
        }
    }
    leading_comment(def_node, content)
}

fn python_docstring(def_node: tree_sitter::Node, content: &str) -> Option<String> {
    let body = def_node.child_by_field_name("body")?;
    let mut cursor = body.walk();
    let first_stmt = body.named_children(&mut cursor).next()?;
    if first_stmt.kind() != "expression_statement" {
        return None;
    }
    let mut inner = first_stmt.walk();
    let string_node = first_stmt.named_children(&mut inner).next()?;
    if string_node.kind() != "string" {
        return None;
    }
    let text = string_node.utf8_text(content.as_bytes()).ok()?;
    Some(text.trim_matches(|c| c == '"' || c == '\'').trim().to_string())
}

fn leading_comment(def_node: tree_sitter::Node, content: &str) -> Option<String> {
    let mut comments = Vec::new();
    let mut cur = def_node.prev_sibling();
    while let Some(node) = cur {
        if node.kind() == "comment" {
            if let Ok(text) = node.utf8_text(content.as_bytes()) {
                comments.push(text.trim().to_string());
            }
            cur = node.prev_sibling();
        } else {
            break;
        }
    }
    if comments.is_empty() {
        return None;
    }
    comments.reverse();
    Some(comments.join("\n"))
}

/// Walk `def_node`'s ancestors collecting the names of enclosing
/// class/impl/interface-like nodes (outermost first), so e.g. `class A {
/// fn save() }` and `class B { fn save() }` in one file get distinct
/// qualified names (`A.save`, `B.save`) instead of colliding on `save`.
fn enclosing_class_chain<'a>(
    def_node: tree_sitter::Node<'a>,
    class_like_kinds: &[&str],
    content: &str,
) -> Vec<String> {
    let mut names = Vec::new();
    let mut cur = def_node.parent();
    while let Some(node) = cur {
        if class_like_kinds.contains(&node.kind()) {
            if let Some(name) = class_like_name(node, content) {
                names.push(name);
            }
        }
        cur = node.parent();
    }
    names.reverse();
    names
}

/// Most class-like nodes expose their identifier via a `name` field; Rust's
/// `impl_item` has no such field and instead names the type it implements
/// via `type`.
fn class_like_name(node: tree_sitter::Node, content: &str) -> Option<String> {
    let name_node = node
        .child_by_field_name("name")
        .or_else(|| node.child_by_field_name("type"))?;
    name_node.utf8_text(content.as_bytes()).ok().map(|s| s.to_string())
}

fn run_import_query(query: &Query, tree: &Tree, content: &str, out: &mut Vec<String>) {
    let path_idx = query.capture_index_for_name("path");
    let mut cursor = QueryCursor::new();
    let root = tree.root_node();
    for m in cursor.matches(query, root, content.as_bytes()) {
        let Some(idx) = path_idx else { continue };
        for node in m.nodes_for_capture_index(idx) {
            if let Ok(text) = node.utf8_text(content.as_bytes()) {
                out.push(strip_quotes(text).to_string());
            }
        }
    }
    out.sort();
    out.dedup();
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches(|c| c == '"' || c == '\'')
}

fn first_line(content: &str, node: tree_sitter::Node) -> Option<String> {
    let text = node.utf8_text(content.as_bytes()).ok()?;
    text.lines().next().map(|l| l.trim().to_string())
}

/// Best-effort module path derived from the file path relative to the
/// language's usual package root (e.g. `src/foo/bar.rs` -> `foo.bar`).
/// Not exact for every language's module system; good enough to
/// disambiguate identically-named symbols across files.
fn module_path_from_file(path: &Path, _lang: Lang) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let parent_components: Vec<&str> = path
        .parent()
        .map(|p| {
            p.components()
                .filter_map(|c| c.as_os_str().to_str())
                .filter(|c| !["src", "lib", "."].contains(c))
                .collect()
        })
        .unwrap_or_default();

    let mut parts = parent_components;
    if stem != "mod" && stem != "__init__" && stem != "index" {
        parts.push(stem);
    }
    parts.join(".")
}

/// Stable, content-addressed entity ID. Deliberately excludes line
/// numbers: an entity that only moves within its file (no rename, no
/// signature change) must keep the same ID so memory/rule links survive
/// routine edits (spec.md invariant 7).
fn stable_entity_id(project_path: &str, file_path: &str, qualified_name: &str, entity_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_path.as_bytes());
    hasher.update(b":");
    hasher.update(file_path.as_bytes());
    hasher.update(b":");
    hasher.update(qualified_name.as_bytes());
    hasher.update(b":");
    hasher.update(entity_type.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn enumerate_source_files(root: &Path) -> Vec<PathBuf> {
    let excludes = languages::default_exclude_dirs();
    ignore::WalkBuilder::new(root)
        .standard_filters(true)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| {
            !entry
                .path()
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .any(|c| excludes.iter().any(|e| e == c))
        })
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .and_then(pick_language)
                .is_some()
        })
        .map(|entry| entry.into_path())
        .collect()
}

fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
