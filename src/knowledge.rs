use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use chrono::Utc;
use colored::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cloud::CloudProvider;

/// File name of the persisted knowledge base.
pub const KNOWLEDGE_FILE_NAME: &str = ".docsort_knowledge.json";

/// Default categories that are always available, with their seed tokens.
const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    ("01 Antrag", &["antrag", "application", "bewerbung", "formular", "form"]),
    ("02 Bescheid", &["bescheid", "decision", "entscheidung", "beschluss", "notice"]),
    ("03 Vertrag", &["vertrag", "contract", "vereinbarung", "agreement"]),
    ("04 Rechnung", &["rechnung", "invoice", "bill", "faktura", "beleg", "quittung"]),
    ("05 Information", &["information", "info", "infoblatt", "mitteilung", "benachrichtigung"]),
];

/// Renamed legacy categories and where their tokens belong now.
const MIGRATION_MAP: &[(&str, &str)] = &[
    ("01 Vertrag", "03 Vertrag"),
    ("02 Information", "05 Information"),
    ("03 Rechnung", "04 Rechnung"),
];

const DEFAULT_CREATED_AT: &str = "2024-01-01T00:00:00Z";

fn now_stamp() -> String {
    Utc::now().to_rfc3339()
}

/// A category folder and the document-type tokens known to map to it.
///
/// Serialized as the value of a JSON object keyed by category name; the
/// name itself is never written into the value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub document_types: Vec<String>,
    #[serde(default = "now_stamp")]
    pub created_at: String,
}

impl Category {
    /// Case-insensitive membership check against the learned tokens.
    pub fn knows_token(&self, token: &str) -> bool {
        let token = token.to_lowercase();
        self.document_types
            .iter()
            .any(|known| known.to_lowercase() == token)
    }
}

/// Persisted mapping from category names to learned document types.
///
/// Categories keep their file insertion order: the resolver's first-match
/// rule depends on it.
#[derive(Debug)]
pub struct KnowledgeBase {
    path: PathBuf,
    categories: Vec<Category>,
}

impl KnowledgeBase {
    /// Locate the knowledge file: an existing file under a cloud provider's
    /// base folder wins, otherwise the home directory is used.
    pub fn locate(provider: Option<CloudProvider>) -> Result<PathBuf> {
        let providers: Vec<CloudProvider> = match provider {
            Some(p) => vec![p],
            None => CloudProvider::ALL.to_vec(),
        };

        for provider in providers {
            if let Some(base) = provider.base_dir() {
                let candidate = base.join(KNOWLEDGE_FILE_NAME);
                if candidate.exists() {
                    return Ok(candidate);
                }
            }
        }

        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(KNOWLEDGE_FILE_NAME))
    }

    /// Load the knowledge base from disk.
    ///
    /// A missing file yields an empty store; unparseable content is reported
    /// and treated as empty rather than aborting the session.
    pub fn load(path: PathBuf) -> Self {
        let mut kb = Self {
            path,
            categories: Vec::new(),
        };

        let data = match fs::read_to_string(&kb.path) {
            Ok(data) => data,
            Err(_) => return kb,
        };

        let entries: Map<String, Value> = match serde_json::from_str(&data) {
            Ok(entries) => entries,
            Err(e) => {
                eprintln!(
                    "{} Knowledge file is unreadable ({}), starting fresh",
                    "⚠️".yellow(),
                    e
                );
                return kb;
            }
        };

        for (name, value) in entries {
            // Entries with an unexpected shape are skipped, not fatal
            if let Ok(mut category) = serde_json::from_value::<Category>(value) {
                category.name = name;
                kb.categories.push(category);
            }
        }

        kb
    }

    /// Save the full in-memory state, atomically replacing the file.
    pub fn save(&self) -> Result<()> {
        let mut entries = Map::new();
        for category in &self.categories {
            let value = serde_json::to_value(category)
                .context("Failed to serialize category")?;
            entries.insert(category.name.clone(), value);
        }

        let data = serde_json::to_string_pretty(&Value::Object(entries))
            .context("Failed to serialize knowledge base")?;

        // Write to temp file first, then rename into place
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &data).context("Failed to write temp knowledge file")?;
        fs::rename(&temp_path, &self.path).context("Failed to finalize knowledge file")?;

        Ok(())
    }

    /// Guarantee the baseline categories exist, migrating renamed legacy
    /// names and consolidating underscore variants first.
    pub fn ensure_defaults(&mut self) -> Result<()> {
        for (old_name, new_name) in MIGRATION_MAP {
            // Tokens move to the new name only when it is not taken yet
            if self.get(new_name).is_none() {
                if let Some(category) = self.get_mut(old_name) {
                    println!("Migrating category: {} → {}", old_name, new_name);
                    category.name = new_name.to_string();
                }
            }
        }

        for (name, seed_tokens) in DEFAULT_CATEGORIES {
            if self.get(name).is_some() {
                continue;
            }

            let underscore_name = name.replace(' ', "_");
            if let Some(category) = self.get_mut(&underscore_name) {
                category.name = name.to_string();
            } else {
                self.categories.push(Category {
                    name: name.to_string(),
                    document_types: seed_tokens.iter().map(|t| t.to_string()).collect(),
                    created_at: DEFAULT_CREATED_AT.to_string(),
                });
            }
        }

        self.save()
    }

    /// Learn that `token` maps to `category`, persisting immediately.
    /// A token the category already knows (case-insensitively) is a no-op.
    pub fn record(&mut self, category_name: &str, token: &str) -> Result<()> {
        let idx = match self.categories.iter().position(|c| c.name == category_name) {
            Some(idx) => idx,
            None => {
                self.categories.push(Category {
                    name: category_name.to_string(),
                    document_types: Vec::new(),
                    created_at: now_stamp(),
                });
                self.categories.len() - 1
            }
        };

        if self.categories[idx].knows_token(token) {
            return Ok(());
        }

        self.categories[idx].document_types.push(token.to_string());
        self.save()
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Category> {
        self.categories.iter_mut().find(|c| c.name == name)
    }

    /// Categories in insertion order.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn knowledge_path(dir: &TempDir) -> PathBuf {
        dir.path().join(KNOWLEDGE_FILE_NAME)
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let kb = KnowledgeBase::load(knowledge_path(&dir));
        assert!(kb.is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = knowledge_path(&dir);
        fs::write(&path, "{ not json at all").unwrap();

        let kb = KnowledgeBase::load(path);
        assert!(kb.is_empty());
    }

    #[test]
    fn defaults_are_injected_in_order() {
        let dir = TempDir::new().unwrap();
        let mut kb = KnowledgeBase::load(knowledge_path(&dir));
        kb.ensure_defaults().unwrap();

        let names: Vec<&str> = kb.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["01 Antrag", "02 Bescheid", "03 Vertrag", "04 Rechnung", "05 Information"]
        );
        assert!(kb.get("04 Rechnung").unwrap().knows_token("invoice"));
    }

    #[test]
    fn learning_persists_across_reload() {
        let dir = TempDir::new().unwrap();
        let path = knowledge_path(&dir);

        let mut kb = KnowledgeBase::load(path.clone());
        kb.ensure_defaults().unwrap();
        kb.record("04 Rechnung", "Invoice").unwrap();

        let reloaded = KnowledgeBase::load(path);
        assert!(reloaded.get("04 Rechnung").unwrap().knows_token("invoice"));
    }

    #[test]
    fn record_is_idempotent_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let mut kb = KnowledgeBase::load(knowledge_path(&dir));
        kb.record("05 Information", "Zeugnis").unwrap();
        kb.record("05 Information", "zeugnis").unwrap();
        kb.record("05 Information", "ZEUGNIS").unwrap();

        let tokens = &kb.get("05 Information").unwrap().document_types;
        assert_eq!(tokens, &vec!["Zeugnis".to_string()]);
    }

    #[test]
    fn legacy_category_is_migrated() {
        let dir = TempDir::new().unwrap();
        let path = knowledge_path(&dir);
        fs::write(
            &path,
            r#"{ "01 Vertrag": { "document_types": ["contract"], "created_at": "2023-05-01T00:00:00Z" } }"#,
        )
        .unwrap();

        let mut kb = KnowledgeBase::load(path);
        kb.ensure_defaults().unwrap();

        assert!(kb.get("01 Vertrag").is_none());
        let migrated = kb.get("03 Vertrag").unwrap();
        assert_eq!(migrated.document_types, vec!["contract".to_string()]);
        assert_eq!(migrated.created_at, "2023-05-01T00:00:00Z");
    }

    #[test]
    fn migration_leaves_existing_target_alone() {
        let dir = TempDir::new().unwrap();
        let path = knowledge_path(&dir);
        fs::write(
            &path,
            r#"{
                "03 Vertrag": { "document_types": ["agreement"], "created_at": "2023-01-01T00:00:00Z" },
                "01 Vertrag": { "document_types": ["contract"], "created_at": "2023-05-01T00:00:00Z" }
            }"#,
        )
        .unwrap();

        let mut kb = KnowledgeBase::load(path);
        kb.ensure_defaults().unwrap();

        assert_eq!(
            kb.get("03 Vertrag").unwrap().document_types,
            vec!["agreement".to_string()]
        );
        assert!(kb.get("01 Vertrag").is_some());
    }

    #[test]
    fn underscore_variant_is_consolidated() {
        let dir = TempDir::new().unwrap();
        let path = knowledge_path(&dir);
        fs::write(
            &path,
            r#"{ "01_Antrag": { "document_types": ["bafoeg"], "created_at": "2023-02-01T00:00:00Z" } }"#,
        )
        .unwrap();

        let mut kb = KnowledgeBase::load(path);
        kb.ensure_defaults().unwrap();

        assert!(kb.get("01_Antrag").is_none());
        let antrag = kb.get("01 Antrag").unwrap();
        assert_eq!(antrag.document_types, vec!["bafoeg".to_string()]);
    }

    #[test]
    fn unknown_keys_and_missing_fields_are_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = knowledge_path(&dir);
        fs::write(
            &path,
            r#"{ "04 Rechnung": { "document_types": ["invoice"], "color": "red", "pinned": true } ,
                 "05 Information": {} }"#,
        )
        .unwrap();

        let kb = KnowledgeBase::load(path);
        assert!(kb.get("04 Rechnung").unwrap().knows_token("invoice"));
        let info = kb.get("05 Information").unwrap();
        assert!(info.document_types.is_empty());
        assert!(!info.created_at.is_empty());
    }
}
