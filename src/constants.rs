pub const TILE_SIZE_PX: i32 = 32;

pub const SEGMENTS_PER_WORLD: i32 = 3;
pub const SEGMENT_HEIGHT_TILES: i32 = 40;
pub const SEGMENT_WIDTH_TILES: i32 = 40;

pub const MOVE_DELAY_MS: u64 = 200;
pub const MOVE_TWEEN_SLACK_MS: u64 = 50;
pub const FADE_DURATION_MS: u64 = 300;
pub const LOCKED_NOTICE_MS: u64 = 1_200;
pub const INTERACTION_RANGE: i32 = 2;
pub const SPAWN_EDGE_OFFSET: i32 = 1;
pub const DEFAULT_START_TILE: (i32, i32) = (6, 4);

pub const GUEST_MAX_HP: i32 = 100;
pub const PLAYER_BASE_HP: i32 = 100;
pub const PLAYER_HP_PER_LEVEL: i32 = 10;
pub const XP_PER_LEVEL: u64 = 100;
pub const QUESTIONS_PER_BATTLE: usize = 5;
pub const WIN_ACCURACY_PERCENT: f64 = 60.0;

pub const BOSS_XP_PER_CORRECT: u64 = 30;
pub const BASE_XP_PER_CORRECT: u64 = 10;
pub const XP_PER_LEVEL_STEP: u64 = 5;
pub const MAX_XP_PER_CORRECT: u64 = 50;
pub const BONUS_XP_MULTIPLIER: u64 = 2;
pub const PERFECT_XP_MULTIPLIER: u64 = 3;
pub const BONUS_QUESTION_HP: i32 = 10;
pub const PERFECT_BATTLE_HP: i32 = 20;
pub const BOSS_WRONG_PENALTY_HP: i32 = 20;
pub const WRONG_PENALTY_HP: i32 = 10;

pub const LEADERBOARD_CAPACITY: usize = 50;
pub const BATTLE_LOG_CAPACITY: usize = 200;
pub const MAX_PLAYER_NAME_CHARS: usize = 16;

pub const LOCKED_MESSAGE: &str = "Area locked. Level up to continue";
pub const COMING_SOON_MESSAGE: &str = "New map coming soon";

pub fn level_key(level: i32) -> String {
    format!("level-{level}")
}

/// XP granted per correct answer. Boss fights use a flat rate; otherwise it
/// scales with the player's level up to a cap.
pub fn xp_per_correct(boss: bool, player_level: i32) -> u64 {
    if boss {
        return BOSS_XP_PER_CORRECT;
    }
    let steps = player_level.max(1) as u64 - 1;
    (BASE_XP_PER_CORRECT + XP_PER_LEVEL_STEP * steps).min(MAX_XP_PER_CORRECT)
}

pub fn wrong_answer_penalty(boss: bool) -> i32 {
    if boss {
        BOSS_WRONG_PENALTY_HP
    } else {
        WRONG_PENALTY_HP
    }
}

/// Saturates at `i32::MAX`.
pub fn level_for_xp(xp: u64) -> i32 {
    i32::try_from(xp / XP_PER_LEVEL)
        .unwrap_or(i32::MAX)
        .saturating_add(1)
}

/// Saturates at `i32::MAX`.
pub fn max_hp_for_level(level: i32) -> i32 {
    PLAYER_HP_PER_LEVEL
        .saturating_mul(level.max(1) - 1)
        .saturating_add(PLAYER_BASE_HP)
}
