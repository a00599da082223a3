//! Stage table: stage number → the fixed opponents for that stage.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::catalog::GuestCatalog;

#[derive(Debug, Error)]
pub enum StageTableError {
    #[error("failed to read stage table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid stage table json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("stage {stage} has no opponents")]
    EmptyStage { stage: usize },
}

#[derive(Debug, Deserialize)]
struct RawStageTable {
    stages: Vec<Vec<String>>,
    #[serde(default)]
    aliases: HashMap<String, String>,
}

#[derive(Clone, Debug, Default)]
pub struct StageTable {
    stages: Vec<Vec<String>>,
    aliases: HashMap<String, String>,
    tier_by_name: HashMap<String, u32>,
}

impl StageTable {
    pub fn new(stages: Vec<Vec<String>>) -> Self {
        Self::with_aliases(stages, HashMap::new())
    }

    /// `aliases` maps a stage-table spelling to the catalog spelling.
    pub fn with_aliases(stages: Vec<Vec<String>>, aliases: HashMap<String, String>) -> Self {
        let mut tier_by_name = HashMap::new();
        for (idx, names) in stages.iter().enumerate() {
            let stage = idx as u32 + 1;
            for name in names {
                tier_by_name.entry(name_key(name)).or_insert(stage);
                if let Some(alias) = aliases.get(name) {
                    tier_by_name.entry(name_key(alias)).or_insert(stage);
                }
            }
        }
        Self {
            stages,
            aliases,
            tier_by_name,
        }
    }

    pub fn load(path: &Path) -> Result<Self, StageTableError> {
        let text = fs::read_to_string(path).map_err(|source| StageTableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, StageTableError> {
        let raw: RawStageTable = serde_json::from_str(text)?;
        if let Some(idx) = raw.stages.iter().position(|names| names.is_empty()) {
            return Err(StageTableError::EmptyStage { stage: idx + 1 });
        }
        Ok(Self::with_aliases(raw.stages, raw.aliases))
    }

    pub fn total_stages(&self) -> usize {
        self.stages.len()
    }

    /// Opponent names for a 1-based stage; out-of-range stages are a
    /// configuration gap and yield an empty list.
    pub fn opponents(&self, stage: i32) -> &[String] {
        let valid = stage >= 1 && (stage as usize) <= self.stages.len();
        if !valid {
            tracing::warn!(stage, "invalid stage number");
            return &[];
        }
        &self.stages[stage as usize - 1]
    }

    pub fn tier_of(&self, name: &str) -> Option<u32> {
        self.tier_by_name.get(&name_key(name)).copied()
    }

    /// Catalog ids of a stage's opponents, in table order, deduplicated.
    /// Names missing from the catalog are logged and skipped.
    pub fn resolve_guest_ids(&self, stage: i32, catalog: &GuestCatalog) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for name in self.opponents(stage) {
            let guest = catalog.find_by_name(name).or_else(|| {
                self.aliases
                    .get(name)
                    .and_then(|alias| catalog.find_by_name(alias))
            });
            let Some(guest) = guest else {
                tracing::warn!(stage, guest = %name, "stage opponent missing from catalog");
                continue;
            };
            if seen.insert(guest.id.clone()) {
                ids.push(guest.id.clone());
            }
        }
        ids
    }
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> GuestCatalog {
        GuestCatalog::from_json_str(
            r#"{"episodes":[
                {"guest":"Cam Adams","title":"a","questions":[{"prompt":"p","choices":["x"],"correctAnswer":0}]},
                {"guest":"Elena Verna","title":"b","questions":[{"prompt":"p","choices":["x"],"correctAnswer":0}]}
            ]}"#,
        )
        .expect("catalog parses")
    }

    #[test]
    fn parses_stages_and_aliases() {
        let table = StageTable::from_json_str(
            r#"{"stages":[["Cameron Adams","Elena Verna"],["Someone"]],"aliases":{"Cameron Adams":"Cam Adams"}}"#,
        )
        .expect("table parses");
        assert_eq!(table.total_stages(), 2);
        assert_eq!(table.opponents(1).len(), 2);
        assert!(table.opponents(0).is_empty());
        assert!(table.opponents(3).is_empty());
        assert_eq!(table.tier_of("cam adams"), Some(1));
        assert_eq!(table.tier_of("Someone"), Some(2));
        assert_eq!(table.tier_of("Nobody"), None);
    }

    #[test]
    fn empty_stage_is_rejected() {
        let result = StageTable::from_json_str(r#"{"stages":[["a"],[]]}"#);
        assert!(matches!(result, Err(StageTableError::EmptyStage { stage: 2 })));
    }

    #[test]
    fn resolve_uses_aliases_dedupes_and_skips_missing() {
        let mut aliases = HashMap::new();
        aliases.insert("Cameron Adams".to_string(), "Cam Adams".to_string());
        let table = StageTable::with_aliases(
            vec![vec![
                "Cameron Adams".to_string(),
                "Elena Verna".to_string(),
                "elena verna".to_string(),
                "Ghost Guest".to_string(),
            ]],
            aliases,
        );
        let ids = table.resolve_guest_ids(1, &catalog());
        assert_eq!(ids, vec!["001".to_string(), "002".to_string()]);
    }
}
