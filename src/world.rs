use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{SEGMENTS_PER_WORLD, SEGMENT_HEIGHT_TILES, SEGMENT_WIDTH_TILES, SPAWN_EDGE_OFFSET};
use crate::tilemap::{LayerSelection, MapProvider, TileGrid};
use crate::types::{Vec2, ViewBounds};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldCycle {
    /// Content ends after the last segment of the last world.
    #[default]
    Finite,
    /// Levels keep going and wrap around the world list.
    Cycling,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerNames {
    pub below: String,
    pub world: String,
    #[serde(default)]
    pub above: Option<String>,
}

impl Default for LayerNames {
    fn default() -> Self {
        Self {
            below: "Below Player".to_string(),
            world: "World".to_string(),
            above: Some("Above Player".to_string()),
        }
    }
}

impl LayerNames {
    pub fn selection(&self) -> LayerSelection<'_> {
        LayerSelection {
            below: &self.below,
            world: &self.world,
            above: self.above.as_deref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig {
    pub key: String,
    #[serde(default)]
    pub tileset: String,
    #[serde(default)]
    pub map_path: Option<PathBuf>,
    #[serde(default)]
    pub layers: LayerNames,
    /// Tiles; `None` means the full map width.
    #[serde(default)]
    pub segment_width: Option<i32>,
    #[serde(default)]
    pub spawnable_tiles: Option<Vec<u32>>,
    #[serde(default)]
    pub music_track: String,
}

impl WorldConfig {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            tileset: String::new(),
            map_path: None,
            layers: LayerNames::default(),
            segment_width: None,
            spawnable_tiles: None,
            music_track: String::new(),
        }
    }
}

pub fn default_worlds() -> Vec<WorldConfig> {
    vec![
        WorldConfig {
            key: "large-map".to_string(),
            tileset: "tuxmon-sample-32px-extruded".to_string(),
            map_path: Some(PathBuf::from("maps/large-map.json")),
            layers: LayerNames::default(),
            segment_width: Some(SEGMENT_WIDTH_TILES),
            spawnable_tiles: None,
            music_track: "overworld".to_string(),
        },
        WorldConfig {
            key: "desert-map".to_string(),
            tileset: "Desert".to_string(),
            map_path: Some(PathBuf::from("maps/desert-map.json")),
            layers: LayerNames {
                below: "Ground".to_string(),
                world: "Ground".to_string(),
                above: None,
            },
            segment_width: None,
            spawnable_tiles: None,
            music_track: "desert".to_string(),
        },
    ]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SegmentRef {
    pub world: usize,
    pub segment: i32,
}

/// Vertical band of a world map holding one stage. `bottom` is inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentBand {
    pub top: i32,
    pub bottom: i32,
    pub width: i32,
}

impl SegmentBand {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.width && y >= self.top && y <= self.bottom
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top + 1
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.bottom < self.top
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpawnEdge {
    North,
    South,
}

#[derive(Clone, Debug)]
pub struct WorldLayout {
    worlds: Vec<WorldConfig>,
    segments_per_world: i32,
    segment_height: i32,
    cycle: WorldCycle,
    stage_limit: Option<i32>,
}

impl Default for WorldLayout {
    fn default() -> Self {
        Self::new(default_worlds(), SEGMENTS_PER_WORLD, SEGMENT_HEIGHT_TILES, WorldCycle::Finite)
    }
}

impl WorldLayout {
    pub fn new(
        worlds: Vec<WorldConfig>,
        segments_per_world: i32,
        segment_height: i32,
        cycle: WorldCycle,
    ) -> Self {
        let worlds = if worlds.is_empty() {
            tracing::warn!("no worlds configured, using the built-in world list");
            default_worlds()
        } else {
            worlds
        };
        Self {
            worlds,
            segments_per_world: segments_per_world.max(1),
            segment_height: segment_height.max(1),
            cycle,
            stage_limit: None,
        }
    }

    /// Finite layouts never offer more levels than there are stages.
    pub fn with_stage_limit(mut self, total_stages: usize) -> Self {
        self.stage_limit = Some(total_stages.max(1) as i32);
        self
    }

    pub fn worlds(&self) -> &[WorldConfig] {
        &self.worlds
    }

    pub fn world(&self, idx: usize) -> Option<&WorldConfig> {
        self.worlds.get(idx)
    }

    pub fn segments_per_world(&self) -> i32 {
        self.segments_per_world
    }

    pub fn segment_height(&self) -> i32 {
        self.segment_height
    }

    pub fn cycle(&self) -> WorldCycle {
        self.cycle
    }

    pub fn world_segment_for_level(&self, level: i32) -> SegmentRef {
        let zero_based = level.max(1) - 1;
        let segment = zero_based % self.segments_per_world;
        let world = (zero_based / self.segments_per_world) as usize % self.worlds.len();
        SegmentRef { world, segment }
    }

    /// Level of the first segment in the world span that contains `level`.
    pub fn world_base_level(&self, level: i32) -> i32 {
        let zero_based = level.max(1) - 1;
        (zero_based / self.segments_per_world) * self.segments_per_world
    }

    pub fn max_world_level(&self) -> Option<i32> {
        match self.cycle {
            WorldCycle::Cycling => None,
            WorldCycle::Finite => {
                let content = self.worlds.len() as i32 * self.segments_per_world;
                Some(match self.stage_limit {
                    Some(limit) => content.min(limit),
                    None => content,
                })
            }
        }
    }

    pub fn available_level(&self, unlocked_level: i32) -> i32 {
        match self.max_world_level() {
            Some(max) => unlocked_level.min(max),
            None => unlocked_level,
        }
    }

    pub fn segment_width<M: MapProvider + ?Sized>(&self, world: usize, map: &M) -> i32 {
        self.world(world)
            .and_then(|config| config.segment_width)
            .map(|width| width.min(map.width()))
            .unwrap_or_else(|| map.width())
    }

    pub fn segment_band<M: MapProvider + ?Sized>(&self, world: usize, segment: i32, map: &M) -> SegmentBand {
        let top = segment.max(0) * self.segment_height;
        let bottom = (top + self.segment_height).min(map.height()) - 1;
        SegmentBand {
            top,
            bottom,
            width: self.segment_width(world, map),
        }
    }

    /// Reachable view extent for the world holding `current_level`.
    pub fn view_bounds<M: MapProvider + ?Sized>(
        &self,
        world: usize,
        current_level: i32,
        unlocked_level: i32,
        map: &M,
    ) -> ViewBounds {
        let available = self.available_level(unlocked_level);
        let base = self.world_base_level(current_level);
        let segments_reachable = (available - base).clamp(1, self.segments_per_world);
        ViewBounds {
            width_px: self.segment_width(world, map) * map.tile_width(),
            height_px: segments_reachable * self.segment_height * map.tile_height(),
            segments_reachable,
        }
    }

    /// Where the player lands when entering a segment through `edge`.
    /// Prefers the column closest to `preferred_x` on the row one tile
    /// inside the edge, then moves further inward. Tiles in `occupied`
    /// are skipped unless nothing else is walkable.
    pub fn spawn_tile<M: MapProvider + ?Sized>(
        &self,
        band: SegmentBand,
        edge: SpawnEdge,
        preferred_x: i32,
        map: &M,
        occupied: &[Vec2],
    ) -> Option<Vec2> {
        if band.is_empty() {
            return None;
        }
        let rows: Vec<i32> = match edge {
            SpawnEdge::North => (band.top..=band.bottom).collect(),
            SpawnEdge::South => (band.top..=band.bottom).rev().collect(),
        };
        let offset = (SPAWN_EDGE_OFFSET as usize).min(rows.len() - 1);
        let preferred_x = preferred_x.clamp(0, band.width - 1);
        let mut blocked_fallback = None;
        for &y in rows.iter().skip(offset).chain(rows.iter().take(offset)) {
            for dist in 0..band.width {
                for x in [preferred_x - dist, preferred_x + dist] {
                    if !band.contains(x, y) || !map.is_walkable(x, y) {
                        continue;
                    }
                    let tile = Vec2::new(x, y);
                    if !occupied.contains(&tile) {
                        return Some(tile);
                    }
                    blocked_fallback.get_or_insert(tile);
                }
            }
        }
        blocked_fallback
    }
}

pub fn segment_label(current_level: i32, unlocked_level: i32) -> String {
    format!("Map {current_level} / {unlocked_level}")
}

/// Loaded map per configured world. A `None` slot is a configuration gap.
#[derive(Clone, Debug, Default)]
pub struct WorldMaps {
    maps: Vec<Option<TileGrid>>,
}

impl WorldMaps {
    pub fn new(maps: Vec<Option<TileGrid>>) -> Self {
        Self { maps }
    }

    /// Reads every world's map relative to `base_dir`; failures are logged
    /// and leave the slot empty.
    pub fn load(worlds: &[WorldConfig], base_dir: &Path, tile_size: (i32, i32)) -> Self {
        let maps = worlds
            .iter()
            .map(|world| {
                let Some(rel) = world.map_path.as_ref() else {
                    tracing::warn!(world = %world.key, "world has no map path");
                    return None;
                };
                let path = base_dir.join(rel);
                match TileGrid::load_tiled(&path, &world.layers.selection(), world.spawnable_tiles.as_deref()) {
                    Ok(grid) => {
                        tracing::info!(world = %world.key, path = %path.display(), "loaded world map");
                        Some(grid.with_tile_size(tile_size.0, tile_size.1))
                    }
                    Err(err) => {
                        tracing::warn!(world = %world.key, error = %err, "world map unavailable");
                        None
                    }
                }
            })
            .collect();
        Self { maps }
    }

    pub fn get(&self, world: usize) -> Option<&TileGrid> {
        self.maps.get(world).and_then(Option::as_ref)
    }

    pub fn is_loaded(&self, world: usize) -> bool {
        self.get(world).is_some()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}
