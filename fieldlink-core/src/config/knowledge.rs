//! Knowledge store configuration types.
//!
//! These are the resolved (non-optional) settings used by
//! `fieldlink-knowledge`, created from the user-facing
//! `KnowledgeToolsSettings` TOML struct via `From`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::settings::KnowledgeToolsSettings;

/// Resolved knowledge settings (all values filled with defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSettings {
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_duplicate_candidates")]
    pub duplicate_candidates: usize,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self {
            embedding_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
            db_path: default_db_path(),
            similarity_threshold: default_similarity_threshold(),
            duplicate_candidates: default_duplicate_candidates(),
            default_top_k: default_top_k(),
        }
    }
}

fn default_embedding_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_embedding_model() -> String {
    "bge-m3".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./knowledge_db/knowledge.sqlite3")
}

fn default_similarity_threshold() -> f32 {
    0.8
}

fn default_duplicate_candidates() -> usize {
    3
}

fn default_top_k() -> usize {
    3
}

impl From<&KnowledgeToolsSettings> for KnowledgeSettings {
    fn from(value: &KnowledgeToolsSettings) -> Self {
        let mut settings = KnowledgeSettings::default();
        if let Some(url) = &value.embedding_url {
            settings.embedding_url = url.clone();
        }
        if let Some(model) = &value.embedding_model {
            settings.embedding_model = model.clone();
        }
        if let Some(path) = &value.db_path {
            settings.db_path = PathBuf::from(path);
        }
        if let Some(threshold) = value.similarity_threshold {
            settings.similarity_threshold = threshold;
        }
        if let Some(candidates) = value.duplicate_candidates {
            settings.duplicate_candidates = candidates.max(1);
        }
        if let Some(top_k) = value.default_top_k {
            settings.default_top_k = top_k.max(1);
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_over_defaults() {
        let tools = KnowledgeToolsSettings {
            embedding_model: Some("nomic-embed-text".to_string()),
            db_path: Some("/tmp/kb.sqlite3".to_string()),
            duplicate_candidates: Some(0),
            ..Default::default()
        };

        let settings = KnowledgeSettings::from(&tools);
        assert_eq!(settings.embedding_model, "nomic-embed-text");
        assert_eq!(settings.embedding_url, "http://127.0.0.1:11434");
        assert_eq!(settings.db_path, PathBuf::from("/tmp/kb.sqlite3"));
        assert_eq!(settings.duplicate_candidates, 1);
        assert_eq!(settings.default_top_k, 3);
        assert!((settings.similarity_threshold - 0.8).abs() < f32::EPSILON);
    }
}
