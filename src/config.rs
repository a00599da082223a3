//! Game settings loaded from a TOML file.
//!
//! Every section and key is optional. A missing file means defaults, a
//! malformed one is logged and also means defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::constants::{
    GUEST_MAX_HP, QUESTIONS_PER_BATTLE, SEGMENTS_PER_WORLD, SEGMENT_HEIGHT_TILES, TILE_SIZE_PX,
};
use crate::overworld::OverworldConfig;
use crate::placement::PlacementConfig;
use crate::world::{default_worlds, WorldConfig, WorldCycle, WorldLayout};

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub world: WorldSettings,
    pub worlds: Vec<WorldConfig>,
    pub placement: PlacementConfig,
    pub overworld: OverworldConfig,
    pub battle: BattleSettings,
    pub paths: PathSettings,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    pub segments_per_world: i32,
    pub segment_height: i32,
    pub tile_width: i32,
    pub tile_height: i32,
    pub cycle: WorldCycle,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BattleSettings {
    /// Display name of the guest fought as the boss.
    pub boss_name: String,
    pub guest_max_hp: i32,
    pub questions_per_battle: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub catalog: PathBuf,
    pub stages: PathBuf,
    /// Base directory for world map paths.
    pub maps_dir: PathBuf,
    pub progress: PathBuf,
    pub leaderboard: PathBuf,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            world: WorldSettings::default(),
            worlds: default_worlds(),
            placement: PlacementConfig::default(),
            overworld: OverworldConfig::default(),
            battle: BattleSettings::default(),
            paths: PathSettings::default(),
        }
    }
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            segments_per_world: SEGMENTS_PER_WORLD,
            segment_height: SEGMENT_HEIGHT_TILES,
            tile_width: TILE_SIZE_PX,
            tile_height: TILE_SIZE_PX,
            cycle: WorldCycle::Finite,
        }
    }
}

impl Default for BattleSettings {
    fn default() -> Self {
        Self {
            boss_name: "Brian Balfour".to_string(),
            guest_max_hp: GUEST_MAX_HP,
            questions_per_battle: QUESTIONS_PER_BATTLE,
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            catalog: PathBuf::from("data/questions.json"),
            stages: PathBuf::from("data/stages.json"),
            maps_dir: PathBuf::from("assets"),
            progress: PathBuf::from("data/progress.json"),
            leaderboard: PathBuf::from("data/leaderboard.json"),
        }
    }
}

impl GameSettings {
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no settings file, using defaults");
                return Self::default();
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "failed to read settings, using defaults");
                return Self::default();
            }
        };
        match Self::from_toml_str(&text) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "invalid settings file, using defaults");
                Self::default()
            }
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let mut settings: Self = toml::from_str(text)?;
        if settings.worlds.is_empty() {
            tracing::warn!("settings list no worlds, using the built-in world list");
            settings.worlds = default_worlds();
        }
        if settings.placement.spacing_tiers.is_empty() {
            settings.placement.spacing_tiers = PlacementConfig::default().spacing_tiers;
        }
        Ok(settings)
    }

    /// Layout for these settings, capped at `total_stages` under the finite
    /// policy.
    pub fn layout(&self, total_stages: usize) -> WorldLayout {
        let layout = WorldLayout::new(
            self.worlds.clone(),
            self.world.segments_per_world,
            self.world.segment_height,
            self.world.cycle,
        );
        if total_stages == 0 {
            return layout;
        }
        layout.with_stage_limit(total_stages)
    }

    pub fn tile_size(&self) -> (i32, i32) {
        (self.world.tile_width, self.world.tile_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "lennyrpg-settings-{}-{}-{}.toml",
            name,
            std::process::id(),
            rand::random::<u64>()
        ))
    }

    #[test]
    fn empty_file_yields_defaults() {
        let settings = GameSettings::from_toml_str("").expect("parse");
        assert_eq!(settings, GameSettings::default());
        assert_eq!(settings.overworld.move_delay_ms, 200);
        assert_eq!(settings.placement.spacing_tiers, vec![6, 4, 3]);
        assert_eq!(settings.worlds.len(), 2);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let text = r#"
            [world]
            segments_per_world = 2
            cycle = "cycling"

            [placement]
            edge_buffer = 1

            [overworld]
            start_tile = { x = 3, y = 2 }

            [[worlds]]
            key = "meadow"
            map_path = "maps/meadow.json"
            segment_width = 30
            spawnable_tiles = [1, 2]
            music_track = "meadow"
            layers = { below = "Ground", world = "Walls" }
        "#;
        let settings = GameSettings::from_toml_str(text).expect("parse");
        assert_eq!(settings.world.segments_per_world, 2);
        assert_eq!(settings.world.segment_height, 40);
        assert_eq!(settings.world.cycle, WorldCycle::Cycling);
        assert_eq!(settings.placement.edge_buffer, 1);
        assert_eq!(settings.placement.sample_size, 24);
        assert_eq!(settings.overworld.start_tile.x, 3);
        assert_eq!(settings.overworld.fade_ms, 300);
        assert_eq!(settings.worlds.len(), 1);
        assert_eq!(settings.worlds[0].layers.above, None);
        assert_eq!(settings.worlds[0].spawnable_tiles, Some(vec![1, 2]));

        let layout = settings.layout(10);
        assert_eq!(layout.max_world_level(), None);
    }

    #[test]
    fn missing_or_malformed_files_fall_back() {
        let missing = temp_path("missing");
        assert_eq!(GameSettings::load(&missing), GameSettings::default());

        let broken = temp_path("broken");
        fs::write(&broken, "[world\nsegments_per_world = ").expect("write");
        assert_eq!(GameSettings::load(&broken), GameSettings::default());
        let _ = fs::remove_file(&broken);
    }

    #[test]
    fn finite_layout_is_capped_by_stage_count() {
        let settings = GameSettings::default();
        assert_eq!(settings.layout(4).max_world_level(), Some(4));
        assert_eq!(settings.layout(40).max_world_level(), Some(6));
    }
}
