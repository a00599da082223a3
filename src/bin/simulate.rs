use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Parser;
use lennyrpg_rust_server::catalog::GuestCatalog;
use lennyrpg_rust_server::config::GameSettings;
use lennyrpg_rust_server::overworld::MoveResult;
use lennyrpg_rust_server::progress::ProgressStore;
use lennyrpg_rust_server::rng::Rng;
use lennyrpg_rust_server::session::GameContext;
use lennyrpg_rust_server::stages::StageTable;
use lennyrpg_rust_server::tilemap::{MapProvider, TileGrid};
use lennyrpg_rust_server::types::{Direction, OverworldEvent, Vec2};
use lennyrpg_rust_server::world::{WorldConfig, WorldMaps};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const STEP_LIMIT: u64 = 40_000;
const GENERATED_WORLDS: usize = 2;
const GENERATED_GUESTS_PER_STAGE: usize = 3;
const GENERATED_SEGMENT_HEIGHT: i32 = 16;
const GENERATED_MAP_WIDTH: i32 = 24;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Run one scenario with the given options instead of the default set.
    #[arg(long)]
    single: bool,
    #[arg(long)]
    seed: Option<u64>,
    /// Probability that the bot answers a question correctly.
    #[arg(long)]
    accuracy: Option<f32>,
    /// Share of floor tiles on generated maps.
    #[arg(long, default_value_t = 0.82)]
    open_rate: f32,
    /// Play real data files from this settings file instead of generated maps.
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long)]
    run_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    seed: u32,
    accuracy: f32,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    accuracy: f32,
    completed: bool,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(rename = "highestLevel")]
    highest_level: i32,
    #[serde(rename = "unlockedLevel")]
    unlocked_level: i32,
    captured: usize,
    #[serde(rename = "totalGuests")]
    total_guests: usize,
    #[serde(rename = "battlesWon")]
    battles_won: usize,
    #[serde(rename = "battlesLost")]
    battles_lost: usize,
    retries: usize,
    xp: u64,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    step: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
    steps: u64,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "completedCount")]
    completed_count: usize,
    #[serde(rename = "averageDurationMs")]
    average_duration_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Clone, Debug, Serialize)]
struct StructuredLogLine {
    #[serde(rename = "timestampMs")]
    timestamp_ms: u64,
    level: String,
    event: String,
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<u64>,
    details: Value,
}

#[derive(Default)]
struct AnomalyLog {
    messages: Vec<String>,
    records: Vec<AnomalyRecord>,
    seen: HashSet<String>,
}

impl AnomalyLog {
    fn push(&mut self, step: u64, message: String) {
        self.records.push(AnomalyRecord {
            step,
            message: message.clone(),
        });
        if self.seen.insert(message.clone()) {
            self.messages.push(message);
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lennyrpg_rust_server=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| default_run_id(seed_hint, run_started_at_ms));
    let settings = cli.settings.as_deref().map(GameSettings::load);

    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        emit_log(
            "info",
            "scenario_started",
            &run_id,
            Some(&scenario.name),
            Some(scenario.seed),
            None,
            json!({
                "accuracy": scenario.accuracy,
                "dataFiles": settings.is_some(),
            }),
        );
        let ctx = match settings.as_ref() {
            Some(settings) => loaded_context(settings, scenario.seed)?,
            None => generated_context(scenario.seed, cli.open_rate)?,
        };
        let scenario_run = run_scenario(&scenario, ctx);

        for anomaly in &scenario_run.anomaly_records {
            emit_log(
                "warn",
                "anomaly_detected",
                &run_id,
                Some(&scenario.name),
                Some(scenario.seed),
                Some(anomaly.step),
                json!({ "message": anomaly.message }),
            );
        }
        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();

        emit_log(
            "info",
            "scenario_finished",
            &run_id,
            Some(&scenario.name),
            Some(scenario.seed),
            Some(scenario_run.steps),
            json!({
                "completed": scenario_run.result.completed,
                "highestLevel": scenario_run.result.highest_level,
                "captured": scenario_run.result.captured,
                "anomalyCount": scenario_run.anomaly_records.len(),
            }),
        );

        println!("{}", serde_json::to_string(&scenario_run.result)?);
        scenario_results.push(scenario_run.result);
    }

    let summary = build_run_summary(
        run_id.clone(),
        run_started_at_ms,
        now_ms(),
        scenario_results,
        total_anomalies,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &run_id,
                None,
                None,
                None,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    emit_log(
        "info",
        "run_finished",
        &run_id,
        None,
        None,
        None,
        json!({
            "scenarioCount": summary.scenario_count,
            "completedCount": summary.completed_count,
            "anomalyCount": summary.anomaly_count,
            "summaryOut": summary_out_written,
        }),
    );

    if has_anomaly {
        std::process::exit(1);
    }
    Ok(())
}

fn loaded_context(settings: &GameSettings, seed: u32) -> anyhow::Result<GameContext> {
    let catalog = GuestCatalog::load(&settings.paths.catalog)
        .with_context(|| format!("loading {}", settings.paths.catalog.display()))?;
    let stages = StageTable::load(&settings.paths.stages)
        .with_context(|| format!("loading {}", settings.paths.stages.display()))?;
    let maps = WorldMaps::load(&settings.worlds, &settings.paths.maps_dir, settings.tile_size());
    Ok(GameContext::new(
        settings.clone(),
        catalog,
        stages,
        maps,
        ProgressStore::in_memory(),
        seed,
    ))
}

/// Random maps plus a synthetic catalog with one stage per segment.
fn generated_context(seed: u32, open_rate: f32) -> anyhow::Result<GameContext> {
    let mut settings = GameSettings::default();
    settings.world.segment_height = GENERATED_SEGMENT_HEIGHT;
    settings.worlds = (0..GENERATED_WORLDS)
        .map(|idx| {
            let mut world = WorldConfig::new(&format!("generated-{idx}"));
            world.music_track = format!("track-{idx}");
            world
        })
        .collect();

    let stage_count = GENERATED_WORLDS * settings.world.segments_per_world as usize;
    let mut episodes = Vec::new();
    let mut stages = Vec::new();
    for stage in 0..stage_count {
        let mut names = Vec::new();
        for slot in 0..GENERATED_GUESTS_PER_STAGE {
            let name = format!("Guest {}-{}", stage + 1, slot + 1);
            let questions: Vec<Value> = (0..3)
                .map(|q| {
                    json!({
                        "prompt": format!("{name} question {q}"),
                        "choices": ["a", "b", "c", "d"],
                        "correctAnswer": (stage + slot + q) % 4,
                        "isBonus": q == 2,
                    })
                })
                .collect();
            episodes.push(json!({ "guest": name, "title": format!("Episode of {name}"), "questions": questions }));
            names.push(name);
        }
        stages.push(names);
    }
    let catalog = GuestCatalog::from_json_str(&json!({ "episodes": episodes }).to_string())?;
    settings.battle.boss_name = stages
        .last()
        .and_then(|names| names.last())
        .cloned()
        .unwrap_or_default();

    let height = GENERATED_SEGMENT_HEIGHT * settings.world.segments_per_world;
    let start = settings.overworld.start_tile;
    let maps = (0..GENERATED_WORLDS)
        .map(|idx| {
            let map_seed = seed ^ (idx as u32 + 1).wrapping_mul(0x9e37_79b9);
            Some(TileGrid::generate(GENERATED_MAP_WIDTH, height, map_seed, open_rate, start))
        })
        .collect();

    Ok(GameContext::new(
        settings,
        catalog,
        StageTable::new(stages),
        WorldMaps::new(maps),
        ProgressStore::in_memory(),
        seed,
    ))
}

fn run_scenario(scenario: &Scenario, mut ctx: GameContext) -> ScenarioRunResult {
    let mut rng = Rng::derive(scenario.seed, "bot");
    let mut anomalies = AnomalyLog::default();
    let move_delay = ctx.settings().overworld.move_delay_ms;
    let mut now = 0u64;
    let mut step = 0u64;
    let mut highest_level = 1;
    let mut last_unlocked = ctx.overworld().unlocked_level();
    let mut battles_won = 0usize;
    let mut battles_lost = 0usize;
    let mut retries = 0usize;
    let mut completed = false;

    if !ctx.start() {
        anomalies.push(0, "no world map could be loaded".to_string());
    }

    while !completed && anomalies.messages.is_empty() {
        step += 1;
        now += move_delay;
        if step > STEP_LIMIT {
            anomalies.push(step, "step limit exceeded".to_string());
            break;
        }
        ctx.update(now);

        for event in ctx.drain_events() {
            if let OverworldEvent::NpcsSpawned {
                level,
                placed,
                expected,
            } = event
            {
                if placed < expected {
                    anomalies.push(step, format!("placement shortfall on level {level}: {placed}/{expected}"));
                }
            }
        }
        collect_world_anomalies(&ctx, step, &mut anomalies);

        let unlocked = ctx.overworld().unlocked_level();
        if unlocked < last_unlocked {
            anomalies.push(step, format!("unlock regression: {last_unlocked} -> {unlocked}"));
        }
        last_unlocked = unlocked;
        highest_level = highest_level.max(ctx.overworld().current_level());

        if ctx.battle().is_some() {
            play_battle(&mut ctx, &mut rng, scenario.accuracy, &mut retries);
            if let Some(resolution) = ctx.finish_battle() {
                if resolution.outcome.won {
                    battles_won += 1;
                } else {
                    battles_lost += 1;
                }
            }
            continue;
        }
        if ctx.overworld().is_input_suppressed() {
            continue;
        }
        if ctx.overworld().interactable_npc().is_some() {
            ctx.interact();
            continue;
        }
        match choose_move(&ctx) {
            BotMove::Step(dir) => {
                let (dx, dy) = dir.delta();
                if ctx.move_player(now, dx, dy) == MoveResult::Locked {
                    anomalies.push(step, format!("bot walked into a locked edge on level {}", ctx.overworld().current_level()));
                }
            }
            BotMove::Finished => completed = true,
            BotMove::Stuck => {
                anomalies.push(step, format!("no path on level {}", ctx.overworld().current_level()));
            }
        }
    }

    let progress = ctx.progress();
    ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            seed: scenario.seed,
            accuracy: scenario.accuracy,
            completed,
            duration_ms: now,
            highest_level,
            unlocked_level: progress.unlocked_level(),
            captured: progress.captured_count(),
            total_guests: ctx.catalog().len(),
            battles_won,
            battles_lost,
            retries,
            xp: progress.xp(),
            anomalies: anomalies.messages,
        },
        anomaly_records: anomalies.records,
        steps: step,
    }
}

/// Answers every question, retrying a lost battle at most once.
fn play_battle(ctx: &mut GameContext, rng: &mut Rng, accuracy: f32, retries: &mut usize) {
    let mut retried = false;
    loop {
        if ctx.battle().map(|battle| battle.is_ended()).unwrap_or(true) {
            return;
        }
        let Some(question) = ctx.battle().and_then(|battle| battle.current_question()) else {
            return;
        };
        let choices = question.choices.len().max(1);
        let choice = if rng.bool(accuracy) {
            question.correct_answer
        } else {
            (question.correct_answer + 1) % choices
        };
        ctx.answer(choice);
        let Some(outcome) = ctx.next_question() else {
            continue;
        };
        if outcome.won || retried || !rng.bool(0.5) {
            return;
        }
        if !ctx.retry_battle() {
            return;
        }
        retried = true;
        *retries += 1;
    }
}

fn collect_world_anomalies(ctx: &GameContext, step: u64, anomalies: &mut AnomalyLog) {
    let Some(map) = ctx.overworld().current_map() else {
        anomalies.push(step, "current world has no map".to_string());
        return;
    };
    for npc in ctx.overworld().npcs() {
        if !map.is_spawnable(npc.x, npc.y) {
            anomalies.push(step, format!("npc {} on non-spawnable tile ({}, {})", npc.guest_id, npc.x, npc.y));
        }
        if ctx.catalog().is_captured(&npc.guest_id) {
            anomalies.push(step, format!("captured guest {} respawned", npc.guest_id));
        }
    }
}

enum BotMove {
    Step(Direction),
    Finished,
    Stuck,
}

/// Walks toward the nearest NPC, or to the south edge once the next level
/// is open.
fn choose_move(ctx: &GameContext) -> BotMove {
    let overworld = ctx.overworld();
    let Some(band) = overworld.current_band() else {
        return BotMove::Stuck;
    };
    let player = Vec2::new(overworld.player().x, overworld.player().y);
    let range = ctx.settings().overworld.interaction_range;

    if !overworld.npcs().is_empty() {
        let targets: Vec<Vec2> = overworld
            .npcs()
            .iter()
            .map(|npc| Vec2::new(npc.x, npc.y))
            .collect();
        return match first_step(player, |tile| band.contains(tile.x, tile.y) && overworld.is_tile_free(tile), |tile| {
            targets.iter().any(|target| tile.manhattan(*target) <= range)
        }) {
            Some(dir) => BotMove::Step(dir),
            None => BotMove::Stuck,
        };
    }

    let next_level = overworld.current_level() + 1;
    if next_level > overworld.layout().available_level(overworld.unlocked_level()) {
        return BotMove::Finished;
    }
    if player.y == band.bottom {
        return BotMove::Step(Direction::Down);
    }
    match first_step(
        player,
        |tile| band.contains(tile.x, tile.y) && overworld.is_tile_free(tile),
        |tile| tile.y == band.bottom,
    ) {
        Some(dir) => BotMove::Step(dir),
        None => BotMove::Stuck,
    }
}

/// Breadth-first search; returns the first move of a shortest path to a
/// tile accepted by `goal`.
fn first_step<P, G>(start: Vec2, passable: P, goal: G) -> Option<Direction>
where
    P: Fn(Vec2) -> bool,
    G: Fn(Vec2) -> bool,
{
    let mut first: HashMap<Vec2, Option<Direction>> = HashMap::from([(start, None)]);
    let mut queue = VecDeque::from([start]);
    while let Some(tile) = queue.pop_front() {
        let via = first.get(&tile).copied().flatten();
        if goal(tile) && tile != start {
            return via;
        }
        for dir in Direction::ALL {
            let next = tile.offset(dir);
            if first.contains_key(&next) || !passable(next) {
                continue;
            }
            first.insert(next, Some(via.unwrap_or(dir)));
            queue.push_back(next);
        }
    }
    None
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = normalize_seed(cli.seed.unwrap_or_else(now_ms));
    let accuracy = cli.accuracy.unwrap_or(0.8).clamp(0.0, 1.0);

    if cli.single || cli.accuracy.is_some() {
        return vec![Scenario {
            name: format!("custom-acc{}", (accuracy * 100.0).round() as i32),
            seed,
            accuracy,
        }];
    }

    vec![
        Scenario {
            name: "strong-player".to_string(),
            seed,
            accuracy: 0.95,
        },
        Scenario {
            name: "struggling-player".to_string(),
            seed: normalize_seed(seed as u64 + 1),
            accuracy: 0.55,
        },
    ]
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn default_run_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    run_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    anomaly_count: usize,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let completed_count = scenarios.iter().filter(|scenario| scenario.completed).count();
    let total_duration_ms: u64 = scenarios.iter().map(|scenario| scenario.duration_ms).sum();
    let average_duration_ms = if scenario_count == 0 {
        0
    } else {
        total_duration_ms / scenario_count as u64
    };
    RunSummary {
        run_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        completed_count,
        average_duration_ms,
        scenarios,
    }
}

fn emit_log(
    level: &str,
    event: &str,
    run_id: &str,
    scenario: Option<&str>,
    seed: Option<u32>,
    step: Option<u64>,
    details: Value,
) {
    let log_line = StructuredLogLine {
        timestamp_ms: now_ms(),
        level: level.to_string(),
        event: event.to_string(),
        run_id: run_id.to_string(),
        scenario: scenario.map(|value| value.to_string()),
        seed,
        step,
        details,
    };
    match serde_json::to_string(&log_line) {
        Ok(text) => eprintln!("{text}"),
        Err(error) => tracing::error!(%error, "structured log line failed to serialize"),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_scenario_result(completed: bool, duration_ms: u64) -> ScenarioResultLine {
        ScenarioResultLine {
            scenario: "test".to_string(),
            seed: 42,
            accuracy: 0.9,
            completed,
            duration_ms,
            highest_level: 1,
            unlocked_level: 1,
            captured: 0,
            total_guests: 3,
            battles_won: 0,
            battles_lost: 0,
            retries: 0,
            xp: 0,
            anomalies: Vec::new(),
        }
    }

    #[test]
    fn default_run_id_contains_seed_and_timestamp() {
        assert_eq!(default_run_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn build_run_summary_counts_completed_runs() {
        let summary = build_run_summary(
            "sim-42-1".to_string(),
            1,
            2,
            vec![make_scenario_result(true, 60_000), make_scenario_result(false, 90_000)],
            1,
        );
        assert_eq!(summary.average_duration_ms, 75_000);
        assert_eq!(summary.scenario_count, 2);
        assert_eq!(summary.completed_count, 1);
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let target = std::env::temp_dir()
            .join(format!("lennyrpg-missing-{}-{}", std::process::id(), rand::random::<u64>()))
            .join("summary.json");
        let summary = build_run_summary("sim-1-1".to_string(), 1, 2, Vec::new(), 0);
        assert!(write_summary(&target, &summary).is_err());
    }

    #[test]
    fn anomaly_log_keeps_records_and_deduplicates_messages() {
        let mut log = AnomalyLog::default();
        log.push(10, "same anomaly".to_string());
        log.push(11, "same anomaly".to_string());
        assert_eq!(log.messages.len(), 1);
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.records[1].step, 11);
    }

    #[test]
    fn first_step_finds_path_around_wall() {
        let walls: HashSet<Vec2> = [Vec2::new(1, 0), Vec2::new(1, 1)].into_iter().collect();
        let passable = |tile: Vec2| {
            (0..3).contains(&tile.x) && (0..3).contains(&tile.y) && !walls.contains(&tile)
        };
        let dir = first_step(Vec2::new(0, 0), passable, |tile| tile == Vec2::new(2, 0));
        assert_eq!(dir, Some(Direction::Down));
        assert_eq!(first_step(Vec2::new(0, 0), |_| false, |_| true), None);
    }

    #[test]
    fn generated_playthrough_finishes_without_anomalies() {
        let scenario = Scenario {
            name: "test".to_string(),
            seed: 7,
            accuracy: 1.0,
        };
        let ctx = generated_context(scenario.seed, 1.0).expect("context");
        let run = run_scenario(&scenario, ctx);
        assert!(run.result.anomalies.is_empty(), "{:?}", run.result.anomalies);
        assert!(run.result.completed);
        assert_eq!(run.result.captured, run.result.total_guests);
        assert_eq!(run.result.highest_level, 6);
    }
}
