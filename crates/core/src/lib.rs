//! `memengine-core`: a per-project knowledge memory engine combining a
//! relational store, hybrid lexical/vector search, a rules engine, and a
//! multi-language code indexer, behind a per-project context manager.
//!
//! External callers (C11 adapters) go through [`context::ContextManager`]
//! to obtain a [`context::ProjectContext`], then call the C6/C7/C8
//! operations on it directly.

pub mod code;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod health;
pub mod memory;
pub mod model;
pub mod rules;
pub mod search;
pub mod storage;

pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::context::{ContextManager, ProjectContext};
    pub use crate::error::{EngineError, Result};
    pub use crate::health::{health, HealthReport};
    pub use crate::memory::{MemoryManager, RecallArgs};
    pub use crate::model::{Category, CodeEntity, EntityType, Memory, MemoryCodeRef, Rule};
    pub use crate::rules::RulesEngine;
}
