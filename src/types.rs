use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: i32,
    pub y: i32,
}

impl Vec2 {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(self, other: Vec2) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn offset(self, dir: Direction) -> Vec2 {
        let (dx, dy) = dir.delta();
        Vec2::new(self.x + dx, self.y + dy)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Only unit moves along one axis map to a direction.
    pub fn from_delta(dx: i32, dy: i32) -> Option<Self> {
        match (dx, dy) {
            (0, -1) => Some(Self::Up),
            (0, 1) => Some(Self::Down),
            (-1, 0) => Some(Self::Left),
            (1, 0) => Some(Self::Right),
            _ => None,
        }
    }

    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "up" | "north" => Some(Self::Up),
            "down" | "south" => Some(Self::Down),
            "left" | "west" => Some(Self::Left),
            "right" | "east" => Some(Self::Right),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn from_question_count(count: usize) -> Self {
        if count <= 3 {
            return Self::Easy;
        }
        if count <= 6 {
            return Self::Medium;
        }
        Self::Hard
    }
}

/// Resolved once at catalog load so battle logic branches on data rather
/// than on a guest's display name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "stage", rename_all = "snake_case")]
pub enum GuestTier {
    Boss,
    Ranked(u32),
    Unranked,
}

impl GuestTier {
    pub fn is_boss(self) -> bool {
        self == GuestTier::Boss
    }

    /// Opponent level shown in the battle header (tier + 4).
    pub fn opponent_level(self, difficulty: Difficulty) -> i32 {
        match self {
            GuestTier::Boss => 50,
            GuestTier::Ranked(stage) => stage as i32 + 4,
            GuestTier::Unranked => match difficulty {
                Difficulty::Hard => 40,
                Difficulty::Medium => 35,
                Difficulty::Easy => 30,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub prompt: String,
    pub choices: Vec<String>,
    #[serde(rename = "correctAnswer")]
    pub correct_answer: usize,
    #[serde(rename = "isBonus", default)]
    pub is_bonus: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct Guest {
    pub id: String,
    pub name: String,
    pub episode: String,
    #[serde(rename = "episodeUrl")]
    pub episode_url: String,
    pub questions: Vec<Question>,
    #[serde(rename = "avatarKey")]
    pub avatar_key: String,
    pub difficulty: Difficulty,
    pub tier: GuestTier,
    pub captured: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementTier {
    Cached,
    Scored,
    Random,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlacedNpc {
    #[serde(rename = "guestId")]
    pub guest_id: String,
    pub x: i32,
    pub y: i32,
    pub tier: PlacementTier,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPosition {
    #[serde(rename = "guestId")]
    pub guest_id: String,
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct NpcView {
    #[serde(rename = "guestId")]
    pub guest_id: String,
    pub x: i32,
    pub y: i32,
    pub dir: Direction,
    pub challenged: bool,
    pub defeated: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlayerView {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub dir: Direction,
    pub world: usize,
    pub segment: i32,
    pub level: i32,
    #[serde(rename = "unlockedLevel")]
    pub unlocked_level: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ViewBounds {
    #[serde(rename = "widthPx")]
    pub width_px: i32,
    #[serde(rename = "heightPx")]
    pub height_px: i32,
    #[serde(rename = "segmentsReachable")]
    pub segments_reachable: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BattleStats {
    #[serde(rename = "totalQuestions")]
    pub total_questions: usize,
    #[serde(rename = "correctAnswers")]
    pub correct_answers: usize,
    #[serde(rename = "wrongAnswers")]
    pub wrong_answers: usize,
    #[serde(rename = "xpGained")]
    pub xp_gained: u64,
    #[serde(rename = "hpGained")]
    pub hp_gained: i32,
    #[serde(rename = "perfectBattle")]
    pub perfect_battle: bool,
    #[serde(rename = "bonusCorrect")]
    pub bonus_correct: bool,
}

/// Everything the battle reports back across its single result boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BattleOutcome {
    #[serde(rename = "guestId")]
    pub guest_id: String,
    pub won: bool,
    pub stats: BattleStats,
    #[serde(rename = "playerHp")]
    pub player_hp: i32,
}

/// Presentation-facing notifications. The core never reads these back.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverworldEvent {
    MoveAccepted {
        x: i32,
        y: i32,
        dir: Direction,
        #[serde(rename = "tweenMs")]
        tween_ms: u64,
    },
    MoveBlocked {
        x: i32,
        y: i32,
        dir: Direction,
    },
    Locked {
        message: String,
        #[serde(rename = "untilMs")]
        until_ms: u64,
    },
    TransitionStarted {
        world: usize,
        segment: i32,
        level: i32,
    },
    WorldLoaded {
        world: usize,
        #[serde(rename = "musicTrack")]
        music_track: String,
    },
    NpcsSpawned {
        level: i32,
        placed: usize,
        expected: usize,
    },
    ViewChanged {
        bounds: ViewBounds,
        label: String,
    },
    TransitionFinished {
        world: usize,
        segment: i32,
        level: i32,
    },
    WorldFallback {
        requested: usize,
    },
    BattleStarted {
        #[serde(rename = "guestId")]
        guest_id: String,
    },
    BattleRejected {
        #[serde(rename = "guestId")]
        guest_id: String,
    },
    BattleEnded {
        #[serde(rename = "guestId")]
        guest_id: String,
        won: bool,
    },
    NpcRemoved {
        #[serde(rename = "guestId")]
        guest_id: String,
    },
    LevelUnlocked {
        level: i32,
    },
}
