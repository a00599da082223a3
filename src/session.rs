//! Wires catalog, stage table, progress and the overworld controller into
//! one game session. Hosts drive it with intents and a millisecond clock.

use thiserror::Error;

use crate::battle::{AnswerFeedback, BattleGuest, BattlePhase, BattleSession};
use crate::catalog::{CatalogError, GuestCatalog};
use crate::config::GameSettings;
use crate::leaderboard::ScoreSubmission;
use crate::overworld::{MoveResult, OverworldController, Roster, SpawnContext};
use crate::progress::{ProgressStore, RecordedBattle};
use crate::rng::Rng;
use crate::stages::{StageTable, StageTableError};
use crate::types::{BattleOutcome, OverworldEvent};
use crate::world::{WorldCycle, WorldMaps};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Stages(#[from] StageTableError),
}

/// Stage number backing a level. Cycling layouts wrap around the table.
pub fn stage_for_level(level: i32, total_stages: usize, cycle: WorldCycle) -> i32 {
    let level = level.max(1);
    match cycle {
        WorldCycle::Cycling if total_stages > 0 => (level - 1) % total_stages as i32 + 1,
        _ => level,
    }
}

/// Uncaptured catalog guests of the stage behind a level.
pub struct StageRoster<'a> {
    catalog: &'a GuestCatalog,
    stages: &'a StageTable,
    cycle: WorldCycle,
}

impl<'a> StageRoster<'a> {
    pub fn new(catalog: &'a GuestCatalog, stages: &'a StageTable, cycle: WorldCycle) -> Self {
        Self {
            catalog,
            stages,
            cycle,
        }
    }

    fn stage_guest_ids(&self, level: i32) -> Vec<String> {
        let stage = stage_for_level(level, self.stages.total_stages(), self.cycle);
        self.stages.resolve_guest_ids(stage, self.catalog)
    }
}

impl Roster for StageRoster<'_> {
    fn opponents_for_level(&self, level: i32) -> Vec<String> {
        self.stage_guest_ids(level)
            .into_iter()
            .filter(|id| !self.catalog.is_captured(id))
            .collect()
    }
}

/// What a finished battle changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BattleResolution {
    pub outcome: BattleOutcome,
    pub recorded: RecordedBattle,
    pub unlocked_level: Option<i32>,
}

pub struct GameContext {
    settings: GameSettings,
    catalog: GuestCatalog,
    stages: StageTable,
    progress: ProgressStore,
    overworld: OverworldController,
    battle: Option<BattleSession>,
    rng: Rng,
}

impl GameContext {
    pub fn new(
        settings: GameSettings,
        mut catalog: GuestCatalog,
        stages: StageTable,
        maps: WorldMaps,
        progress: ProgressStore,
        seed: u32,
    ) -> Self {
        catalog.assign_tiers(&stages, &settings.battle.boss_name);
        let captured: Vec<String> = progress.captured_ids().map(str::to_string).collect();
        for id in &captured {
            catalog.mark_captured(id);
        }

        let layout = settings.layout(stages.total_stages());
        let overworld = OverworldController::new(
            layout,
            maps,
            settings.placement.clone(),
            settings.overworld.clone(),
            seed,
            progress.player_name(),
            progress.unlocked_level(),
        );
        Self {
            settings,
            catalog,
            stages,
            progress,
            overworld,
            battle: None,
            rng: Rng::derive(seed, "battle"),
        }
    }

    /// Reads every data file named in `settings.paths`.
    pub fn from_settings(settings: GameSettings, seed: u32) -> Result<Self, SessionError> {
        let catalog = GuestCatalog::load(&settings.paths.catalog)?;
        let stages = StageTable::load(&settings.paths.stages)?;
        let maps = WorldMaps::load(&settings.worlds, &settings.paths.maps_dir, settings.tile_size());
        let progress = ProgressStore::new(settings.paths.progress.clone());
        Ok(Self::new(settings, catalog, stages, maps, progress, seed))
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &GuestCatalog {
        &self.catalog
    }

    pub fn stages(&self) -> &StageTable {
        &self.stages
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    pub fn overworld(&self) -> &OverworldController {
        &self.overworld
    }

    pub fn battle(&self) -> Option<&BattleSession> {
        self.battle.as_ref()
    }

    pub fn drain_events(&mut self) -> Vec<OverworldEvent> {
        self.overworld.drain_events()
    }

    /// Puts the player on the first level. Returns `false` when no world
    /// map could be loaded.
    pub fn start(&mut self) -> bool {
        let roster = StageRoster::new(&self.catalog, &self.stages, self.settings.world.cycle);
        let mut ctx = SpawnContext {
            roster: &roster,
            cache: &mut self.progress,
        };
        if !self.overworld.enter(1, &mut ctx) {
            return false;
        }
        self.refresh_unlocks();
        true
    }

    pub fn update(&mut self, now_ms: u64) {
        let roster = StageRoster::new(&self.catalog, &self.stages, self.settings.world.cycle);
        let mut ctx = SpawnContext {
            roster: &roster,
            cache: &mut self.progress,
        };
        self.overworld.update(now_ms, &mut ctx);
    }

    pub fn move_player(&mut self, now_ms: u64, dx: i32, dy: i32) -> MoveResult {
        self.overworld.attempt_move(now_ms, dx, dy)
    }

    pub fn set_player_name(&mut self, name: &str) {
        let name = self.progress.set_player_name(name).to_string();
        self.overworld.set_player_name(&name);
    }

    /// Challenges the nearest NPC and opens a battle against its guest.
    pub fn interact(&mut self) -> Option<&BattleSession> {
        if self.battle.is_some() {
            return None;
        }
        let guest_id = self.overworld.interact()?;
        let Some(guest) = self.catalog.get_by_id(&guest_id) else {
            tracing::warn!(guest_id = %guest_id, "npc has no catalog guest");
            self.overworld.reject_battle();
            return None;
        };
        let questions =
            self.catalog
                .pick_questions(&guest_id, self.settings.battle.questions_per_battle, &mut self.rng);
        let session = BattleSession::new(
            BattleGuest::from_guest(guest, self.settings.battle.guest_max_hp),
            questions,
            self.progress.player_stats(),
        );
        tracing::info!(guest_id = %guest_id, boss = session.is_boss(), "battle opened");
        self.battle = Some(session);
        self.battle.as_ref()
    }

    /// Declines the encounter. Before the first answer nothing is recorded;
    /// after it the battle closes through [`Self::finish_battle`] so damage
    /// taken and any verdict are kept.
    pub fn reject_battle(&mut self) -> Option<BattleResolution> {
        if self.battle.as_ref().is_some_and(|battle| !battle.is_untouched()) {
            tracing::debug!("reject after answering, closing battle instead");
            return self.finish_battle();
        }
        self.battle = None;
        self.overworld.reject_battle();
        None
    }

    pub fn answer(&mut self, choice: usize) -> Option<AnswerFeedback> {
        self.battle.as_mut()?.select_answer(choice)
    }

    pub fn next_question(&mut self) -> Option<BattleOutcome> {
        self.battle.as_mut()?.next_question()
    }

    /// Records a lost battle and restarts it against the same guest.
    pub fn retry_battle(&mut self) -> bool {
        let Some(session) = self.battle.as_mut() else {
            return false;
        };
        if session.phase() != (BattlePhase::Ended { won: false }) {
            return false;
        }
        let Some(outcome) = session.outcome() else {
            return false;
        };
        self.progress.record_battle_result(&outcome);
        session.retry();
        true
    }

    /// Closes the battle and applies its result. Leaving before the verdict
    /// counts as a loss.
    pub fn finish_battle(&mut self) -> Option<BattleResolution> {
        let mut session = self.battle.take()?;
        let outcome = match session.outcome() {
            Some(outcome) => outcome,
            None => session.end_battle(false)?,
        };

        let recorded = self.progress.record_battle_result(&outcome);
        if outcome.won {
            self.catalog.mark_captured(&outcome.guest_id);
        }
        self.overworld.finish_battle(&outcome, &mut self.progress);
        let unlocked_level = self.refresh_unlocks();
        Some(BattleResolution {
            outcome,
            recorded,
            unlocked_level,
        })
    }

    pub fn score_submission(&self) -> ScoreSubmission {
        self.progress.score_submission(self.catalog.len())
    }

    /// Unlocks the next level once every guest of the current stage is
    /// captured.
    fn refresh_unlocks(&mut self) -> Option<i32> {
        let level = self.overworld.current_level();
        let roster = StageRoster::new(&self.catalog, &self.stages, self.settings.world.cycle);
        let cleared = roster
            .stage_guest_ids(level)
            .iter()
            .all(|id| self.catalog.is_captured(id));
        if !cleared {
            return None;
        }
        let mut next = level + 1;
        if let Some(max) = self.overworld.layout().max_world_level() {
            next = next.min(max);
        }
        let raised_store = self.progress.raise_unlocked_level(next);
        let raised_view = self.overworld.unlock_level(next);
        (raised_store || raised_view).then_some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::PositionCache;
    use crate::tilemap::TileGrid;
    use crate::types::CachedPosition;
    use crate::world::WorldConfig;

    const CATALOG: &str = r#"{
        "episodes": [
            { "guest": "Ada", "title": "Ep 1", "questions": [
                { "prompt": "q1", "choices": ["a", "b"], "correctAnswer": 0 },
                { "prompt": "q2", "choices": ["a", "b"], "correctAnswer": 1 }
            ] },
            { "guest": "Bo", "title": "Ep 2", "questions": [
                { "prompt": "q1", "choices": ["a", "b"], "correctAnswer": 1 }
            ] },
            { "guest": "Cy", "title": "Ep 3", "questions": [
                { "prompt": "q1", "choices": ["a", "b"], "correctAnswer": 0 }
            ] }
        ]
    }"#;

    fn settings() -> GameSettings {
        let mut settings = GameSettings::default();
        settings.worlds = vec![WorldConfig::new("test")];
        settings.world.segments_per_world = 2;
        settings.world.segment_height = 8;
        settings.battle.boss_name = "Cy".to_string();
        settings
    }

    fn context(progress: ProgressStore) -> GameContext {
        let catalog = GuestCatalog::from_json_str(CATALOG).expect("catalog");
        let stages = StageTable::new(vec![
            vec!["Ada".to_string(), "Bo".to_string()],
            vec!["Cy".to_string()],
        ]);
        let rows: Vec<String> = (0..16).map(|_| ".".repeat(10)).collect();
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        let maps = WorldMaps::new(vec![Some(TileGrid::from_rows(&refs))]);
        GameContext::new(settings(), catalog, stages, maps, progress, 11)
    }

    fn progress_with_positions() -> ProgressStore {
        let mut progress = ProgressStore::in_memory();
        progress.set_positions_for_level(
            "level-1",
            vec![
                CachedPosition {
                    guest_id: "001".to_string(),
                    x: 6,
                    y: 5,
                },
                CachedPosition {
                    guest_id: "002".to_string(),
                    x: 1,
                    y: 4,
                },
            ],
        );
        progress
    }

    fn answer_all_correctly(ctx: &mut GameContext) -> BattleOutcome {
        loop {
            let correct = ctx
                .battle()
                .and_then(|battle| battle.current_question())
                .map(|question| question.correct_answer)
                .expect("question");
            assert!(ctx.answer(correct).expect("feedback").correct);
            if let Some(outcome) = ctx.next_question() {
                return outcome;
            }
        }
    }

    #[test]
    fn clearing_a_stage_unlocks_the_next_level() {
        let mut ctx = context(progress_with_positions());
        assert!(ctx.start());
        assert_eq!(ctx.overworld().npcs().len(), 2);

        let guest = ctx.interact().map(|battle| battle.guest().id.clone());
        assert_eq!(guest.as_deref(), Some("001"));
        let outcome = answer_all_correctly(&mut ctx);
        assert!(outcome.won);
        let resolution = ctx.finish_battle().expect("resolution");
        assert!(resolution.recorded.newly_captured);
        assert_eq!(resolution.unlocked_level, None);
        assert!(ctx.catalog().is_captured("001"));
        assert_eq!(ctx.overworld().npcs().len(), 1);
        assert!(ctx.progress().positions_for_level("level-1").iter().all(|pos| pos.guest_id != "001"));

        // Walk next to Bo at (1, 4).
        let mut now = 0;
        while ctx.overworld().player().x > 3 {
            assert_eq!(ctx.move_player(now, -1, 0), MoveResult::Moved);
            now += 200;
        }
        assert_eq!(
            ctx.interact().map(|battle| battle.guest().id.clone()).as_deref(),
            Some("002")
        );
        answer_all_correctly(&mut ctx);
        let resolution = ctx.finish_battle().expect("resolution");
        assert_eq!(resolution.unlocked_level, Some(2));
        assert_eq!(ctx.progress().unlocked_level(), 2);
        assert_eq!(ctx.overworld().unlocked_level(), 2);
        assert_eq!(ctx.progress().captured_count(), 2);

        let roster = StageRoster::new(ctx.catalog(), ctx.stages(), WorldCycle::Finite);
        assert!(roster.opponents_for_level(1).is_empty());
        assert_eq!(roster.opponents_for_level(2), vec!["003".to_string()]);
    }

    #[test]
    fn lost_battle_is_recorded_before_retry() {
        let mut ctx = context(progress_with_positions());
        assert!(ctx.start());
        assert!(ctx.interact().is_some());
        assert!(!ctx.retry_battle());

        let outcome = loop {
            let wrong = ctx
                .battle()
                .and_then(|battle| battle.current_question())
                .map(|question| 1 - question.correct_answer)
                .expect("question");
            assert!(!ctx.answer(wrong).expect("feedback").correct);
            if let Some(outcome) = ctx.next_question() {
                break outcome;
            }
        };
        assert!(!outcome.won);
        assert_eq!(outcome.stats.wrong_answers, 2);

        assert!(ctx.retry_battle());
        assert_eq!(ctx.progress().battle_log().len(), 1);
        assert_eq!(ctx.progress().hp(), 80);
        assert_eq!(ctx.battle().map(|battle| battle.player_hp()), Some(80));
        assert_eq!(
            ctx.battle().map(|battle| battle.phase()),
            Some(BattlePhase::AwaitingAnswer)
        );

        answer_all_correctly(&mut ctx);
        let resolution = ctx.finish_battle().expect("resolution");
        assert!(resolution.outcome.won);
        assert_eq!(ctx.progress().battle_log().len(), 2);
    }

    #[test]
    fn rejecting_records_nothing_and_is_idempotent() {
        let mut ctx = context(progress_with_positions());
        assert!(ctx.start());
        assert!(ctx.interact().is_some());
        assert!(ctx.reject_battle().is_none());
        assert!(ctx.reject_battle().is_none());

        assert!(ctx.battle().is_none());
        assert!(ctx.finish_battle().is_none());
        assert!(ctx.progress().battle_log().is_empty());
        let rejected = ctx
            .drain_events()
            .into_iter()
            .filter(|event| matches!(event, OverworldEvent::BattleRejected { .. }))
            .count();
        assert_eq!(rejected, 1);
        assert!(ctx.overworld().npcs().iter().all(|npc| !npc.challenged));
    }

    #[test]
    fn rejecting_after_a_win_keeps_the_capture() {
        let mut ctx = context(progress_with_positions());
        assert!(ctx.start());
        assert!(ctx.interact().is_some());
        let outcome = answer_all_correctly(&mut ctx);
        assert!(outcome.won);

        let resolution = ctx.reject_battle().expect("resolution");
        assert!(resolution.outcome.won);
        assert!(ctx.battle().is_none());
        assert!(ctx.catalog().is_captured("001"));
        assert_eq!(ctx.progress().xp(), outcome.stats.xp_gained);
        assert_eq!(ctx.progress().battle_log().len(), 1);
        assert_eq!(ctx.overworld().npcs().len(), 1);
    }

    #[test]
    fn rejecting_mid_battle_keeps_damage() {
        let mut ctx = context(progress_with_positions());
        assert!(ctx.start());
        assert!(ctx.interact().is_some());
        let wrong = ctx
            .battle()
            .and_then(|battle| battle.current_question())
            .map(|question| 1 - question.correct_answer)
            .expect("question");
        assert!(!ctx.answer(wrong).expect("feedback").correct);

        let resolution = ctx.reject_battle().expect("resolution");
        assert!(!resolution.outcome.won);
        assert_eq!(ctx.progress().hp(), 90);
        assert_eq!(ctx.progress().battle_log().len(), 1);
        assert!(!ctx.catalog().is_captured("001"));
        assert_eq!(ctx.overworld().npcs().len(), 2);
    }

    #[test]
    fn leaving_mid_battle_counts_as_loss() {
        let mut ctx = context(progress_with_positions());
        assert!(ctx.start());
        assert!(ctx.interact().is_some());
        let resolution = ctx.finish_battle().expect("resolution");
        assert!(!resolution.outcome.won);
        assert!(!ctx.catalog().is_captured("001"));
        assert_eq!(ctx.overworld().npcs().len(), 2);
    }

    #[test]
    fn captured_guests_from_progress_never_respawn() {
        let mut progress = progress_with_positions();
        progress.record_battle_result(&BattleOutcome {
            guest_id: "001".to_string(),
            won: true,
            stats: Default::default(),
            player_hp: 100,
        });
        let mut ctx = context(progress);
        assert!(ctx.catalog().is_captured("001"));
        assert!(ctx.start());
        let ids: Vec<_> = ctx
            .overworld()
            .npcs()
            .iter()
            .map(|npc| npc.guest_id.as_str())
            .collect();
        assert_eq!(ids, vec!["002"]);
    }

    #[test]
    fn boss_tier_comes_from_settings() {
        let ctx = context(ProgressStore::in_memory());
        assert!(ctx.catalog().get_by_id("003").expect("guest").tier.is_boss());
        assert!(!ctx.catalog().get_by_id("001").expect("guest").tier.is_boss());
    }

    #[test]
    fn from_settings_reads_data_files_and_survives_missing_maps() {
        let dir = std::env::temp_dir().join(format!(
            "lennyrpg-session-{}-{}",
            std::process::id(),
            rand::random::<u64>()
        ));
        std::fs::create_dir_all(&dir).expect("dir");
        std::fs::write(dir.join("questions.json"), CATALOG).expect("catalog");
        std::fs::write(dir.join("stages.json"), r#"{ "stages": [["Ada", "Bo"], ["Cy"]] }"#).expect("stages");

        let mut settings = settings();
        settings.worlds[0].map_path = Some("missing.json".into());
        settings.paths.catalog = dir.join("questions.json");
        settings.paths.stages = dir.join("stages.json");
        settings.paths.maps_dir = dir.clone();
        settings.paths.progress = dir.join("progress.json");

        let mut ctx = GameContext::from_settings(settings.clone(), 3).expect("context");
        assert_eq!(ctx.catalog().len(), 3);
        assert_eq!(ctx.stages().total_stages(), 2);
        assert!(!ctx.start());

        settings.paths.stages = dir.join("nope.json");
        assert!(matches!(
            GameContext::from_settings(settings, 3),
            Err(SessionError::Stages(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stage_numbers_wrap_only_when_cycling() {
        assert_eq!(stage_for_level(5, 3, WorldCycle::Finite), 5);
        assert_eq!(stage_for_level(4, 3, WorldCycle::Cycling), 1);
        assert_eq!(stage_for_level(6, 3, WorldCycle::Cycling), 3);
        assert_eq!(stage_for_level(0, 3, WorldCycle::Cycling), 1);
        assert_eq!(stage_for_level(2, 0, WorldCycle::Cycling), 2);
    }
}
