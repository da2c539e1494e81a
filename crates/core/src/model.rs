//! Data model (spec.md §3): Memory, Rule, CodeEntity, MemoryCodeRef, FileHash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Decision,
    Pattern,
    Warning,
    Learning,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Decision => "decision",
            Category::Pattern => "pattern",
            Category::Warning => "warning",
            Category::Learning => "learning",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "decision" => Some(Category::Decision),
            "pattern" => Some(Category::Pattern),
            "warning" => Some(Category::Warning),
            "learning" => Some(Category::Learning),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Team,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Team => "team",
            Visibility::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "team" => Visibility::Team,
            "public" => Visibility::Public,
            _ => Visibility::Private,
        }
    }
}

/// Sync passthrough metadata; the core treats these as opaque.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncMeta {
    pub visibility: String,
    pub origin_id: Option<String>,
    pub origin_user: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
    pub sync_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: i64,
    pub category: String,
    pub content: String,
    pub rationale: Option<String>,
    pub context: Option<serde_json::Value>,
    pub tags: Vec<String>,
    pub keywords: Vec<String>,
    pub file_path_absolute: Option<String>,
    pub file_path_relative: Option<String>,
    pub is_permanent: bool,
    pub pinned: bool,
    pub archived: bool,
    pub outcome: Option<String>,
    pub worked: Option<bool>,
    pub vector_embedding_ref: Option<String>,
    #[serde(flatten)]
    pub sync: SyncMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: i64,
    pub trigger: String,
    pub trigger_keywords: Option<Vec<String>>,
    pub must_do: Vec<String>,
    pub must_not: Vec<String>,
    pub ask_first: Vec<String>,
    pub warnings: Vec<String>,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    File,
    Class,
    Function,
    Method,
    Module,
    Import,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::File => "file",
            EntityType::Class => "class",
            EntityType::Function => "function",
            EntityType::Method => "method",
            EntityType::Module => "module",
            EntityType::Import => "import",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(EntityType::File),
            "class" => Some(EntityType::Class),
            "function" => Some(EntityType::Function),
            "method" => Some(EntityType::Method),
            "module" => Some(EntityType::Module),
            "import" => Some(EntityType::Import),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeEntity {
    pub id: String,
    pub project_path: String,
    pub file_path: String,
    pub entity_type: String,
    pub name: String,
    pub qualified_name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub imports: Vec<String>,
    pub calls: Vec<String>,
    pub called_by: Vec<String>,
    pub inherits: Vec<String>,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    About,
    Modifies,
    Introduces,
    Deprecates,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::About => "about",
            Relationship::Modifies => "modifies",
            Relationship::Introduces => "introduces",
            Relationship::Deprecates => "deprecates",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryCodeRef {
    pub id: i64,
    pub memory_id: i64,
    pub code_entity_id: String,
    pub entity_type: String,
    pub entity_name: String,
    pub file_path: String,
    pub line_number: Option<u32>,
    pub relationship: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHash {
    pub project_path: String,
    pub file_path: String,
    pub content_hash: String,
    pub indexed_at: DateTime<Utc>,
}

/// Payload carried alongside a dense vector in C2; must stay in lockstep
/// with the relational row's filterable fields (invariant 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPayload {
    pub category: String,
    pub tags: Vec<String>,
    pub file_path: Option<String>,
    pub worked: Option<bool>,
    pub is_permanent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips() {
        for c in [
            Category::Decision,
            Category::Pattern,
            Category::Warning,
            Category::Learning,
        ] {
            assert_eq!(Category::parse(c.as_str()), Some(c));
        }
        assert_eq!(Category::parse("nonsense"), None);
    }

    #[test]
    fn entity_type_round_trips() {
        for e in [
            EntityType::File,
            EntityType::Class,
            EntityType::Function,
            EntityType::Method,
            EntityType::Module,
            EntityType::Import,
        ] {
            assert_eq!(EntityType::parse(e.as_str()), Some(e));
        }
    }
}
