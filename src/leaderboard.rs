use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::LEADERBOARD_CAPACITY;
use crate::server_utils::{normalize_leaderboard_limit, sanitize_name};

const LEADERBOARD_VERSION: u8 = 1;

/// A finished run's numbers as submitted by a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreSubmission {
    pub name: String,
    pub level: i32,
    pub xp: u64,
    #[serde(rename = "maxHp")]
    pub max_hp: i32,
    pub captured: usize,
    pub total: usize,
    pub accuracy: f64,
    pub correct: u64,
    pub wrong: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub level: i32,
    pub xp: u64,
    #[serde(rename = "maxHp", alias = "max_hp")]
    pub max_hp: i32,
    pub captured: usize,
    pub total: usize,
    pub accuracy: f64,
    #[serde(default)]
    pub correct: u64,
    #[serde(default)]
    pub wrong: u64,
    pub timestamp: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct LeaderboardResponse {
    #[serde(rename = "generatedAtIso")]
    pub generated_at_iso: String,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SaveResult {
    pub accepted: bool,
    pub rank: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct LeaderboardFile {
    version: u8,
    entries: Vec<LeaderboardEntry>,
}

#[derive(Clone, Debug, Deserialize)]
struct LeaderboardFileRaw {
    version: u8,
    entries: Vec<serde_json::Value>,
}

pub struct Leaderboard {
    file_path: Option<PathBuf>,
    entries: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    pub fn new(file_path: PathBuf) -> Self {
        let entries = load_entries(&file_path);
        Self {
            file_path: Some(file_path),
            entries,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            file_path: None,
            entries: Vec::new(),
        }
    }

    /// A name that is already listed is only replaced by a better run.
    pub fn save_score(&mut self, submission: &ScoreSubmission) -> SaveResult {
        let entry = LeaderboardEntry {
            id: make_entry_id(),
            name: sanitize_name(&submission.name),
            level: submission.level.max(1),
            xp: submission.xp,
            max_hp: submission.max_hp.max(0),
            captured: submission.captured,
            total: submission.total,
            accuracy: sanitize_accuracy(submission.accuracy),
            correct: submission.correct,
            wrong: submission.wrong,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let key = entry_key(&entry.name);
        let accepted = match self.entries.iter().position(|existing| entry_key(&existing.name) == key) {
            Some(idx) => {
                if compare_entries(&entry, &self.entries[idx]) == Ordering::Less {
                    self.entries[idx] = entry.clone();
                    true
                } else {
                    false
                }
            }
            None => {
                self.entries.push(entry.clone());
                true
            }
        };

        sort_entries(&mut self.entries);
        self.entries.truncate(LEADERBOARD_CAPACITY);
        if accepted {
            tracing::info!(name = %entry.name, level = entry.level, "leaderboard updated");
            self.save();
        }
        SaveResult {
            accepted,
            rank: self.player_rank(&entry.name),
        }
    }

    pub fn top(&self, requested_limit: Option<usize>) -> Vec<LeaderboardEntry> {
        let limit = normalize_leaderboard_limit(requested_limit);
        self.entries.iter().take(limit).cloned().collect()
    }

    pub fn build_response(&self, requested_limit: Option<usize>) -> LeaderboardResponse {
        LeaderboardResponse {
            generated_at_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            entries: self.top(requested_limit),
        }
    }

    /// 1-based position, `None` when the name is not listed.
    pub fn player_rank(&self, name: &str) -> Option<usize> {
        let key = entry_key(name);
        self.entries
            .iter()
            .position(|entry| entry_key(&entry.name) == key)
            .map(|idx| idx + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn save(&self) {
        let Some(path) = self.file_path.as_ref() else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(error) = fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), %error, "failed to create leaderboard dir");
                return;
            }
        }

        let payload = LeaderboardFile {
            version: LEADERBOARD_VERSION,
            entries: self.entries.clone(),
        };
        match serde_json::to_string_pretty(&payload) {
            Ok(text) => {
                if let Err(error) = fs::write(path, text) {
                    tracing::warn!(path = %path.display(), %error, "failed to write leaderboard");
                }
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "failed to serialize leaderboard");
            }
        }
    }
}

/// `Less` means `a` ranks above `b`.
fn compare_entries(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.level
        .cmp(&a.level)
        .then_with(|| b.xp.cmp(&a.xp))
        .then_with(|| b.captured.cmp(&a.captured))
}

fn sort_entries(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(|a, b| {
        compare_entries(a, b).then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}

fn sanitize_accuracy(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn load_entries(path: &Path) -> Vec<LeaderboardEntry> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), %error, "failed to read leaderboard");
            }
            return Vec::new();
        }
    };
    let parsed = match serde_json::from_str::<LeaderboardFileRaw>(&text) {
        Ok(value) if value.version == LEADERBOARD_VERSION => value,
        Ok(value) => {
            tracing::warn!(path = %path.display(), version = value.version, "unsupported leaderboard version");
            return Vec::new();
        }
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to parse leaderboard");
            return Vec::new();
        }
    };

    let mut sanitized: Vec<LeaderboardEntry> = Vec::new();
    for raw_value in parsed.entries {
        let entry: LeaderboardEntry = match serde_json::from_value(raw_value) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "skipping invalid leaderboard entry");
                continue;
            }
        };
        let Some(entry) = sanitize_entry(entry) else {
            continue;
        };
        let key = entry_key(&entry.name);
        match sanitized.iter_mut().find(|current| entry_key(&current.name) == key) {
            Some(current) => {
                if compare_entries(&entry, current) == Ordering::Less {
                    *current = entry;
                }
            }
            None => sanitized.push(entry),
        }
    }

    sort_entries(&mut sanitized);
    sanitized.truncate(LEADERBOARD_CAPACITY);
    sanitized
}

fn sanitize_entry(mut entry: LeaderboardEntry) -> Option<LeaderboardEntry> {
    let name = entry.name.trim();
    if name.is_empty() {
        return None;
    }
    entry.name = sanitize_name(name);
    entry.level = entry.level.max(1);
    entry.accuracy = sanitize_accuracy(entry.accuracy);
    Some(entry)
}

fn entry_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn make_entry_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("{}-{suffix}", now_ms())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(name: &str, level: i32, xp: u64, captured: usize) -> ScoreSubmission {
        ScoreSubmission {
            name: name.to_string(),
            level,
            xp,
            max_hp: 100,
            captured,
            total: 30,
            accuracy: 75.0,
            correct: 3,
            wrong: 1,
        }
    }

    fn temp_file(name: &str) -> PathBuf {
        let unique = format!(
            "{}-{}-{}",
            name,
            std::process::id(),
            now_ms().saturating_add(rand::random::<u32>() as u64)
        );
        std::env::temp_dir().join(unique).join("leaderboard.json")
    }

    #[test]
    fn orders_by_level_then_xp_then_captured() {
        let mut board = Leaderboard::in_memory();
        board.save_score(&submission("Low", 1, 50, 9));
        board.save_score(&submission("HighLessXp", 3, 200, 2));
        board.save_score(&submission("HighMoreXp", 3, 250, 1));
        board.save_score(&submission("HighMoreCaught", 3, 200, 5));

        let names: Vec<String> = board.top(None).into_iter().map(|entry| entry.name).collect();
        assert_eq!(names, vec!["HighMoreXp", "HighMoreCaught", "HighLessXp", "Low"]);
        assert_eq!(board.player_rank("low"), Some(4));
        assert_eq!(board.player_rank("Nobody"), None);
    }

    #[test]
    fn same_name_is_replaced_only_by_a_better_run() {
        let mut board = Leaderboard::in_memory();
        assert!(board.save_score(&submission("Ada", 2, 150, 3)).accepted);
        let worse = board.save_score(&submission("Ada", 2, 120, 9));
        assert!(!worse.accepted);
        assert_eq!(worse.rank, Some(1));
        assert_eq!(board.top(None)[0].xp, 150);

        assert!(board.save_score(&submission("ada", 3, 10, 0)).accepted);
        assert_eq!(board.len(), 1);
        assert_eq!(board.top(None)[0].level, 3);
    }

    #[test]
    fn keeps_only_top_entries() {
        let mut board = Leaderboard::in_memory();
        for idx in 0..(LEADERBOARD_CAPACITY + 10) {
            board.save_score(&submission(&format!("P{idx}"), 1 + idx as i32, 0, 0));
        }
        assert_eq!(board.len(), LEADERBOARD_CAPACITY);
        assert_eq!(board.top(Some(3)).len(), 3);
        assert_eq!(board.top(Some(0)).len(), 1);
        assert_eq!(board.player_rank("P0"), None);
        assert_eq!(board.build_response(Some(999)).entries.len(), LEADERBOARD_CAPACITY);
    }

    #[test]
    fn persists_and_sanitizes_on_load() {
        let path = temp_file("leaderboard-persist");
        {
            let mut board = Leaderboard::new(path.clone());
            board.save_score(&submission("Ada", 2, 150, 3));
        }
        let board = Leaderboard::new(path.clone());
        assert_eq!(board.player_rank("Ada"), Some(1));

        let parent = path.parent().expect("parent exists").to_path_buf();
        let raw = r#"{
  "version": 1,
  "entries": [
    { "id": "1", "name": "Grace", "level": 4, "xp": 10, "maxHp": 130, "captured": 2, "total": 30, "accuracy": 140.0, "timestamp": "t" },
    { "id": "2", "name": " grace ", "level": 5, "xp": 0, "maxHp": 140, "captured": 1, "total": 30, "accuracy": 50.0, "timestamp": "t" },
    { "id": "3", "name": "   ", "level": 9, "xp": 0, "maxHp": 100, "captured": 0, "total": 30, "accuracy": 0.0, "timestamp": "t" },
    { "id": "4", "name": "Broken", "level": "high" }
  ]
}"#;
        fs::write(&path, raw).expect("write file");
        let board = Leaderboard::new(path.clone());
        assert_eq!(board.len(), 1);
        let entry = &board.top(None)[0];
        assert_eq!(entry.name, "grace");
        assert_eq!(entry.level, 5);

        fs::write(&path, r#"{"version":2,"entries":[]}"#).expect("write file");
        assert!(Leaderboard::new(path.clone()).is_empty());

        let _ = fs::remove_dir_all(&parent);
    }
}
