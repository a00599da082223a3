//! Traversal controller: owns the player, the NPCs of the active segment and
//! the unlock level. Hosts feed it intents plus a millisecond clock and
//! drain [`OverworldEvent`]s for presentation.

use serde::{Deserialize, Serialize};

use crate::constants::{
    level_key, COMING_SOON_MESSAGE, DEFAULT_START_TILE, FADE_DURATION_MS, INTERACTION_RANGE,
    LOCKED_MESSAGE, LOCKED_NOTICE_MS, MOVE_DELAY_MS,
};
use crate::placement::{place_npcs, PlacementConfig, PlacementRequest, PositionCache};
use crate::rng::Rng;
use crate::tilemap::{MapProvider, TileGrid};
use crate::types::{BattleOutcome, Direction, NpcView, OverworldEvent, PlayerView, Vec2, ViewBounds};
use crate::world::{segment_label, SegmentBand, SegmentRef, SpawnEdge, WorldLayout, WorldMaps};

mod interaction;
mod movement;
mod spawn;
mod transition;
mod utils;

use self::utils::{nearest_npc_in_range, random_direction, tween_ms};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverworldConfig {
    pub move_delay_ms: u64,
    pub fade_ms: u64,
    pub interaction_range: i32,
    pub start_tile: Vec2,
}

impl Default for OverworldConfig {
    fn default() -> Self {
        Self {
            move_delay_ms: MOVE_DELAY_MS,
            fade_ms: FADE_DURATION_MS,
            interaction_range: INTERACTION_RANGE,
            start_tile: Vec2::new(DEFAULT_START_TILE.0, DEFAULT_START_TILE.1),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FadePhase {
    Out,
    In,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionTarget {
    pub world: usize,
    pub segment: i32,
    pub level: i32,
    pub edge: SpawnEdge,
    pub preferred_x: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Moving {
        until_ms: u64,
    },
    Transitioning {
        phase: FadePhase,
        until_ms: u64,
        target: TransitionTarget,
    },
    BattleActive {
        guest_id: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveResult {
    Moved,
    Blocked,
    Locked,
    TransitionStarted,
    /// Input arrived while the controller was busy.
    Ignored,
}

/// Opponents still to be fought on a level, in stage order.
pub trait Roster {
    fn opponents_for_level(&self, level: i32) -> Vec<String>;
}

/// Collaborators the controller needs whenever a segment is populated.
pub struct SpawnContext<'a> {
    pub roster: &'a dyn Roster,
    pub cache: &'a mut dyn PositionCache,
}

#[derive(Clone, Debug)]
pub struct OverworldController {
    layout: WorldLayout,
    maps: WorldMaps,
    placement: PlacementConfig,
    config: OverworldConfig,
    seed: u32,
    state: ControllerState,
    player: PlayerView,
    npcs: Vec<NpcView>,
    battle_npc: Option<String>,
    notice: Option<(String, u64)>,
    events: Vec<OverworldEvent>,
}

impl OverworldController {
    pub fn new(
        layout: WorldLayout,
        maps: WorldMaps,
        placement: PlacementConfig,
        config: OverworldConfig,
        seed: u32,
        player_name: &str,
        unlocked_level: i32,
    ) -> Self {
        let start = config.start_tile;
        Self {
            layout,
            maps,
            placement,
            config,
            seed,
            state: ControllerState::Idle,
            player: PlayerView {
                name: player_name.to_string(),
                x: start.x,
                y: start.y,
                dir: Direction::Down,
                world: 0,
                segment: 0,
                level: 1,
                unlocked_level: unlocked_level.max(1),
            },
            npcs: Vec::new(),
            battle_npc: None,
            notice: None,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn player(&self) -> &PlayerView {
        &self.player
    }

    pub fn npcs(&self) -> &[NpcView] {
        &self.npcs
    }

    pub fn layout(&self) -> &WorldLayout {
        &self.layout
    }

    pub fn current_level(&self) -> i32 {
        self.player.level
    }

    pub fn unlocked_level(&self) -> i32 {
        self.player.unlocked_level
    }

    pub fn set_player_name(&mut self, name: &str) {
        self.player.name = name.to_string();
    }

    pub fn current_map(&self) -> Option<&TileGrid> {
        self.maps.get(self.player.world)
    }

    pub fn current_band(&self) -> Option<SegmentBand> {
        let map = self.current_map()?;
        Some(self.layout.segment_band(self.player.world, self.player.segment, map))
    }

    pub fn view_bounds(&self) -> Option<ViewBounds> {
        let map = self.current_map()?;
        Some(self.layout.view_bounds(
            self.player.world,
            self.player.level,
            self.player.unlocked_level,
            map,
        ))
    }

    pub fn segment_label(&self) -> String {
        segment_label(self.player.level, self.player.unlocked_level)
    }

    /// The locked/coming-soon notice still on screen at `now_ms`.
    pub fn active_notice(&self, now_ms: u64) -> Option<&str> {
        match &self.notice {
            Some((message, until)) if now_ms < *until => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn is_input_suppressed(&self) -> bool {
        matches!(
            self.state,
            ControllerState::Transitioning { .. } | ControllerState::BattleActive { .. }
        )
    }

    /// NPC the player could challenge right now, if any.
    pub fn interactable_npc(&self) -> Option<&NpcView> {
        nearest_npc_in_range(&self.npcs, self.player_tile(), self.config.interaction_range)
    }

    pub fn drain_events(&mut self) -> Vec<OverworldEvent> {
        std::mem::take(&mut self.events)
    }

    /// Raises the unlock level. Lower values are ignored.
    pub fn unlock_level(&mut self, level: i32) -> bool {
        if level <= self.player.unlocked_level {
            return false;
        }
        self.player.unlocked_level = level;
        tracing::info!(level, "level unlocked");
        self.events.push(OverworldEvent::LevelUnlocked { level });
        self.emit_view_changed();
        true
    }

    fn player_tile(&self) -> Vec2 {
        Vec2::new(self.player.x, self.player.y)
    }

    fn show_notice(&mut self, now_ms: u64, message: &str) {
        let until_ms = now_ms + LOCKED_NOTICE_MS;
        self.notice = Some((message.to_string(), until_ms));
        self.events.push(OverworldEvent::Locked {
            message: message.to_string(),
            until_ms,
        });
    }

    fn emit_view_changed(&mut self) {
        let Some(bounds) = self.view_bounds() else {
            return;
        };
        let label = self.segment_label();
        self.events.push(OverworldEvent::ViewChanged { bounds, label });
    }

    fn placement_rng(&self, level: i32) -> Rng {
        Rng::derive(self.seed, &level_key(level))
    }
}
