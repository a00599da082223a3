//! Player progression persisted as a small versioned JSON file.
//!
//! The store never fails its caller: read and write problems are logged and
//! the game keeps going with whatever is in memory.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::battle::PlayerStats;
use crate::constants::{level_for_xp, max_hp_for_level, BATTLE_LOG_CAPACITY};
use crate::leaderboard::ScoreSubmission;
use crate::placement::PositionCache;
use crate::server_utils::sanitize_name;
use crate::types::{BattleOutcome, CachedPosition};

const PROGRESS_VERSION: u8 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleRecord {
    #[serde(rename = "guestId")]
    pub guest_id: String,
    pub won: bool,
    #[serde(rename = "totalQuestions")]
    pub total_questions: usize,
    #[serde(rename = "correctAnswers")]
    pub correct_answers: usize,
    #[serde(rename = "wrongAnswers")]
    pub wrong_answers: usize,
    #[serde(rename = "xpGained")]
    pub xp_gained: u64,
    #[serde(rename = "atMs", default)]
    pub at_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct ProgressState {
    name: String,
    xp: u64,
    hp: i32,
    captured: BTreeSet<String>,
    #[serde(rename = "battlesWon")]
    battles_won: u64,
    #[serde(rename = "battlesLost")]
    battles_lost: u64,
    #[serde(rename = "correctAnswers")]
    correct_answers: u64,
    #[serde(rename = "wrongAnswers")]
    wrong_answers: u64,
    #[serde(rename = "unlockedLevel")]
    unlocked_level: i32,
    positions: BTreeMap<String, Vec<CachedPosition>>,
    #[serde(rename = "battleLog")]
    battle_log: Vec<BattleRecord>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            name: "Player".to_string(),
            xp: 0,
            hp: max_hp_for_level(1),
            captured: BTreeSet::new(),
            battles_won: 0,
            battles_lost: 0,
            correct_answers: 0,
            wrong_answers: 0,
            unlocked_level: 1,
            positions: BTreeMap::new(),
            battle_log: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ProgressFile {
    version: u8,
    player: ProgressState,
}

#[derive(Clone, Debug, Deserialize)]
struct ProgressFileRaw {
    version: u8,
    player: serde_json::Value,
}

/// What changed when a battle result was recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordedBattle {
    pub newly_captured: bool,
    pub leveled_up: bool,
    pub revived: bool,
}

#[derive(Debug)]
pub struct ProgressStore {
    file_path: Option<PathBuf>,
    state: ProgressState,
}

impl ProgressStore {
    pub fn new(file_path: PathBuf) -> Self {
        let state = load_state(&file_path);
        Self {
            file_path: Some(file_path),
            state,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            file_path: None,
            state: ProgressState::default(),
        }
    }

    pub fn player_name(&self) -> &str {
        &self.state.name
    }

    pub fn set_player_name(&mut self, name: &str) -> &str {
        self.state.name = sanitize_name(name);
        self.save();
        &self.state.name
    }

    pub fn xp(&self) -> u64 {
        self.state.xp
    }

    pub fn level(&self) -> i32 {
        level_for_xp(self.state.xp)
    }

    pub fn max_hp(&self) -> i32 {
        max_hp_for_level(self.level())
    }

    pub fn hp(&self) -> i32 {
        self.state.hp
    }

    pub fn player_stats(&self) -> PlayerStats {
        PlayerStats {
            level: self.level(),
            hp: self.state.hp,
            max_hp: self.max_hp(),
        }
    }

    pub fn is_captured(&self, guest_id: &str) -> bool {
        self.state.captured.contains(guest_id)
    }

    pub fn captured_ids(&self) -> impl Iterator<Item = &str> {
        self.state.captured.iter().map(String::as_str)
    }

    pub fn captured_count(&self) -> usize {
        self.state.captured.len()
    }

    pub fn unlocked_level(&self) -> i32 {
        self.state.unlocked_level
    }

    /// Never lowers the stored value.
    pub fn raise_unlocked_level(&mut self, level: i32) -> bool {
        if level <= self.state.unlocked_level {
            return false;
        }
        self.state.unlocked_level = level;
        self.save();
        true
    }

    /// Percentage of all answered questions that were correct.
    pub fn accuracy(&self) -> f64 {
        let answered = self.state.correct_answers + self.state.wrong_answers;
        if answered == 0 {
            return 0.0;
        }
        self.state.correct_answers as f64 / answered as f64 * 100.0
    }

    pub fn battle_log(&self) -> &[BattleRecord] {
        &self.state.battle_log
    }

    pub fn record_battle_result(&mut self, outcome: &BattleOutcome) -> RecordedBattle {
        let level_before = self.level();
        let stats = &outcome.stats;

        self.state.xp += stats.xp_gained;
        self.state.correct_answers += stats.correct_answers as u64;
        self.state.wrong_answers += stats.wrong_answers as u64;
        if outcome.won {
            self.state.battles_won += 1;
        } else {
            self.state.battles_lost += 1;
        }

        let newly_captured = outcome.won && self.state.captured.insert(outcome.guest_id.clone());
        let leveled_up = self.level() > level_before;
        let max_hp = self.max_hp();
        let mut hp = outcome.player_hp.clamp(0, max_hp);
        let revived = !outcome.won && hp == 0;
        if revived {
            hp = max_hp;
        }
        self.state.hp = hp;

        self.state.battle_log.push(BattleRecord {
            guest_id: outcome.guest_id.clone(),
            won: outcome.won,
            total_questions: stats.total_questions,
            correct_answers: stats.correct_answers,
            wrong_answers: stats.wrong_answers,
            xp_gained: stats.xp_gained,
            at_ms: now_ms(),
        });
        trim_log(&mut self.state.battle_log);

        if leveled_up {
            tracing::info!(level = self.level(), "player leveled up");
        }
        self.save();
        RecordedBattle {
            newly_captured,
            leveled_up,
            revived,
        }
    }

    pub fn score_submission(&self, total_guests: usize) -> ScoreSubmission {
        ScoreSubmission {
            name: self.state.name.clone(),
            level: self.level(),
            xp: self.state.xp,
            max_hp: self.max_hp(),
            captured: self.captured_count(),
            total: total_guests,
            accuracy: self.accuracy().round(),
            correct: self.state.correct_answers,
            wrong: self.state.wrong_answers,
        }
    }

    fn save(&self) {
        let Some(path) = self.file_path.as_ref() else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(error) = fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), %error, "failed to create progress dir");
                return;
            }
        }
        let payload = ProgressFile {
            version: PROGRESS_VERSION,
            player: self.state.clone(),
        };
        match serde_json::to_string_pretty(&payload) {
            Ok(text) => {
                if let Err(error) = fs::write(path, text) {
                    tracing::warn!(path = %path.display(), %error, "failed to write progress");
                }
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "failed to serialize progress");
            }
        }
    }
}

impl PositionCache for ProgressStore {
    fn positions_for_level(&self, level_key: &str) -> Vec<CachedPosition> {
        self.state.positions.get(level_key).cloned().unwrap_or_default()
    }

    fn set_positions_for_level(&mut self, level_key: &str, positions: Vec<CachedPosition>) {
        self.state.positions.insert(level_key.to_string(), positions);
        self.save();
    }

    fn remove_position(&mut self, level_key: &str, guest_id: &str) {
        let Some(positions) = self.state.positions.get_mut(level_key) else {
            return;
        };
        let before = positions.len();
        positions.retain(|pos| pos.guest_id != guest_id);
        if positions.len() != before {
            self.save();
        }
    }
}

fn load_state(path: &Path) -> ProgressState {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), %error, "failed to read progress");
            }
            return ProgressState::default();
        }
    };
    let raw = match serde_json::from_str::<ProgressFileRaw>(&text) {
        Ok(value) if value.version == PROGRESS_VERSION => value,
        Ok(value) => {
            tracing::warn!(path = %path.display(), version = value.version, "unsupported progress version");
            return ProgressState::default();
        }
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to parse progress");
            return ProgressState::default();
        }
    };
    match serde_json::from_value::<ProgressState>(raw.player) {
        Ok(state) => sanitize_state(state),
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "invalid player progress, starting fresh");
            ProgressState::default()
        }
    }
}

fn sanitize_state(mut state: ProgressState) -> ProgressState {
    state.name = sanitize_name(&state.name);
    let max_hp = max_hp_for_level(level_for_xp(state.xp));
    state.hp = if state.hp <= 0 { max_hp } else { state.hp.min(max_hp) };
    state.unlocked_level = state.unlocked_level.max(1);
    state.captured.retain(|id| !id.trim().is_empty());
    state.positions.retain(|key, positions| !key.is_empty() && !positions.is_empty());
    trim_log(&mut state.battle_log);
    state
}

fn trim_log(log: &mut Vec<BattleRecord>) {
    if log.len() > BATTLE_LOG_CAPACITY {
        let excess = log.len() - BATTLE_LOG_CAPACITY;
        log.drain(..excess);
    }
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
    use crate::types::BattleStats;

    fn temp_file(name: &str) -> PathBuf {
        let unique = format!(
            "{}-{}-{}",
            name,
            std::process::id(),
            now_ms().saturating_add(rand::random::<u32>() as u64)
        );
        std::env::temp_dir().join(unique).join("progress.json")
    }

    fn outcome(guest_id: &str, won: bool, correct: usize, wrong: usize, xp: u64, hp: i32) -> BattleOutcome {
        BattleOutcome {
            guest_id: guest_id.to_string(),
            won,
            stats: BattleStats {
                total_questions: correct + wrong,
                correct_answers: correct,
                wrong_answers: wrong,
                xp_gained: xp,
                ..BattleStats::default()
            },
            player_hp: hp,
        }
    }

    #[test]
    fn battle_results_drive_level_hp_and_captures() {
        let mut store = ProgressStore::in_memory();
        assert_eq!(store.level(), 1);
        assert_eq!(store.max_hp(), 100);

        let recorded = store.record_battle_result(&outcome("001", true, 5, 0, 80, 100));
        assert!(recorded.newly_captured);
        assert!(!recorded.leveled_up);
        let recorded = store.record_battle_result(&outcome("001", true, 5, 0, 40, 90));
        assert!(!recorded.newly_captured);
        assert!(recorded.leveled_up);
        assert_eq!(store.level(), 2);
        assert_eq!(store.max_hp(), 110);
        assert_eq!(store.hp(), 90);
        assert_eq!(store.captured_count(), 1);
        assert!((store.accuracy() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn knocked_out_loss_revives_at_full_hp() {
        let mut store = ProgressStore::in_memory();
        let recorded = store.record_battle_result(&outcome("002", false, 1, 4, 10, 0));
        assert!(recorded.revived);
        assert_eq!(store.hp(), 100);
        assert!(!store.is_captured("002"));
        assert_eq!(store.battle_log().len(), 1);
    }

    #[test]
    fn unlocked_level_never_decreases() {
        let mut store = ProgressStore::in_memory();
        assert!(store.raise_unlocked_level(3));
        assert!(!store.raise_unlocked_level(2));
        assert!(!store.raise_unlocked_level(3));
        assert_eq!(store.unlocked_level(), 3);
    }

    #[test]
    fn battle_log_is_bounded() {
        let mut store = ProgressStore::in_memory();
        for idx in 0..(BATTLE_LOG_CAPACITY + 5) {
            store.record_battle_result(&outcome(&format!("{idx:03}"), false, 0, 1, 0, 50));
        }
        assert_eq!(store.battle_log().len(), BATTLE_LOG_CAPACITY);
        assert_eq!(store.battle_log()[0].guest_id, "005");
    }

    #[test]
    fn state_round_trips_through_file() {
        let path = temp_file("progress-store-save");
        {
            let mut store = ProgressStore::new(path.clone());
            store.set_player_name("  Ada Lovelace The Great  ");
            store.record_battle_result(&outcome("003", true, 3, 0, 60, 100));
            store.raise_unlocked_level(2);
            store.set_positions_for_level(
                "level-1",
                vec![CachedPosition {
                    guest_id: "004".to_string(),
                    x: 3,
                    y: 7,
                }],
            );
        }

        let store = ProgressStore::new(path.clone());
        assert_eq!(store.player_name(), "Ada Lovelace The");
        assert!(store.is_captured("003"));
        assert_eq!(store.unlocked_level(), 2);
        assert_eq!(store.xp(), 60);
        assert_eq!(store.positions_for_level("level-1").len(), 1);

        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn load_sanitizes_bad_values_and_rejects_unknown_versions() {
        let path = temp_file("progress-store-sanitize");
        let parent = path.parent().expect("parent exists").to_path_buf();
        fs::create_dir_all(&parent).expect("create dir");
        let raw = r#"{
  "version": 1,
  "player": {
    "name": "   ",
    "xp": 150,
    "hp": 999,
    "unlockedLevel": -4,
    "captured": ["001", " "],
    "positions": { "level-1": [] }
  }
}"#;
        fs::write(&path, raw).expect("write file");
        let store = ProgressStore::new(path.clone());
        assert_eq!(store.player_name(), "Player");
        assert_eq!(store.hp(), 110);
        assert_eq!(store.unlocked_level(), 1);
        assert_eq!(store.captured_count(), 1);
        assert!(store.positions_for_level("level-1").is_empty());

        fs::write(&path, r#"{"version":9,"player":{"xp":500}}"#).expect("write file");
        let store = ProgressStore::new(path.clone());
        assert_eq!(store.xp(), 0);

        fs::write(&path, "not json").expect("write file");
        let store = ProgressStore::new(path.clone());
        assert_eq!(store.level(), 1);

        let _ = fs::remove_dir_all(&parent);
    }

    #[test]
    fn score_submission_reflects_progress() {
        let mut store = ProgressStore::in_memory();
        store.set_player_name("Ada");
        store.record_battle_result(&outcome("001", true, 4, 1, 40, 90));
        let score = store.score_submission(30);
        assert_eq!(score.name, "Ada");
        assert_eq!(score.captured, 1);
        assert_eq!(score.total, 30);
        assert_eq!(score.correct, 4);
        assert_eq!(score.wrong, 1);
        assert!((score.accuracy - 80.0).abs() < f64::EPSILON);
    }
}
