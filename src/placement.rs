//! NPC placement for one segment band.
//!
//! Tiers run in order until every guest has a tile: cached tiles from a
//! previous visit, score-based sampling over tiles reachable from the player
//! (with relaxing spacing), random attempts, and a final fallback that
//! stacks NPCs on any valid tile.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::rng::Rng;
use crate::tilemap::{flood_fill, MapProvider};
use crate::types::{CachedPosition, PlacedNpc, PlacementTier, Vec2};
use crate::world::SegmentBand;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Minimum Manhattan spacing per scored pass, loosest last.
    pub spacing_tiers: Vec<i32>,
    pub sample_size: usize,
    /// Rows kept clear at the top and bottom of a band.
    pub edge_buffer: i32,
    pub player_weight: f32,
    pub crowd_penalty: f32,
    pub random_attempts: usize,
    pub minimal_spacing: i32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            spacing_tiers: vec![6, 4, 3],
            sample_size: 24,
            edge_buffer: 2,
            player_weight: 0.35,
            crowd_penalty: 1.5,
            random_attempts: 400,
            minimal_spacing: 2,
        }
    }
}

/// Per-level NPC coordinates kept between visits.
pub trait PositionCache {
    fn positions_for_level(&self, level_key: &str) -> Vec<CachedPosition>;
    fn set_positions_for_level(&mut self, level_key: &str, positions: Vec<CachedPosition>);
    fn remove_position(&mut self, level_key: &str, guest_id: &str);
}

#[derive(Clone, Debug, Default)]
pub struct MemoryPositionCache {
    levels: HashMap<String, Vec<CachedPosition>>,
}

impl PositionCache for MemoryPositionCache {
    fn positions_for_level(&self, level_key: &str) -> Vec<CachedPosition> {
        self.levels.get(level_key).cloned().unwrap_or_default()
    }

    fn set_positions_for_level(&mut self, level_key: &str, positions: Vec<CachedPosition>) {
        self.levels.insert(level_key.to_string(), positions);
    }

    fn remove_position(&mut self, level_key: &str, guest_id: &str) {
        if let Some(positions) = self.levels.get_mut(level_key) {
            positions.retain(|pos| pos.guest_id != guest_id);
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PlacementRequest<'a> {
    pub level_key: &'a str,
    pub band: SegmentBand,
    pub guest_ids: &'a [String],
    pub player: Vec2,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlacementReport {
    pub placed: Vec<PlacedNpc>,
    pub unplaced: Vec<String>,
}

impl PlacementReport {
    pub fn count_by_tier(&self, tier: PlacementTier) -> usize {
        self.placed.iter().filter(|npc| npc.tier == tier).count()
    }
}

struct Layout<'a> {
    band: SegmentBand,
    player: Vec2,
    placed: Vec<PlacedNpc>,
    occupied: HashSet<Vec2>,
    config: &'a PlacementConfig,
}

impl Layout<'_> {
    fn push(&mut self, guest_id: &str, tile: Vec2, tier: PlacementTier, level_key: &str) {
        tracing::debug!(level_key, guest_id, x = tile.x, y = tile.y, ?tier, "placed npc");
        self.occupied.insert(tile);
        self.placed.push(PlacedNpc {
            guest_id: guest_id.to_string(),
            x: tile.x,
            y: tile.y,
            tier,
        });
    }

    /// The player's tile is never free, even for a cached replay. The
    /// controller lands the player off cached tiles so replays still match.
    fn is_free(&self, tile: Vec2) -> bool {
        tile != self.player && !self.occupied.contains(&tile)
    }

    fn nearest_npc(&self, tile: Vec2) -> Option<i32> {
        self.placed
            .iter()
            .map(|npc| tile.manhattan(Vec2::new(npc.x, npc.y)))
            .min()
    }

    fn spaced(&self, tile: Vec2, spacing: i32) -> bool {
        self.nearest_npc(tile).map(|dist| dist >= spacing).unwrap_or(true)
    }

    fn quadrant(&self, tile: Vec2) -> (bool, bool) {
        let mid_x = self.band.width / 2;
        let mid_y = self.band.top + self.band.height() / 2;
        (tile.x >= mid_x, tile.y >= mid_y)
    }

    fn crowding(&self, tile: Vec2) -> usize {
        let quadrant = self.quadrant(tile);
        self.placed
            .iter()
            .filter(|npc| self.quadrant(Vec2::new(npc.x, npc.y)) == quadrant)
            .count()
    }

    fn score(&self, tile: Vec2) -> f32 {
        let spread = self
            .nearest_npc(tile)
            .unwrap_or(self.band.width + self.band.height()) as f32;
        spread + self.config.player_weight * tile.manhattan(self.player) as f32
            - self.config.crowd_penalty * self.crowding(tile) as f32
    }
}

pub fn place_npcs(
    request: &PlacementRequest<'_>,
    map: &dyn MapProvider,
    cache: &mut dyn PositionCache,
    config: &PlacementConfig,
    rng: &mut Rng,
) -> PlacementReport {
    let band = request.band;
    let mut layout = Layout {
        band,
        player: request.player,
        placed: Vec::new(),
        occupied: HashSet::new(),
        config,
    };

    let cached: HashMap<String, Vec2> = cache
        .positions_for_level(request.level_key)
        .into_iter()
        .map(|pos| (pos.guest_id, Vec2::new(pos.x, pos.y)))
        .collect();

    let mut remaining: Vec<String> = Vec::new();
    for guest_id in request.guest_ids {
        let replay = cached.get(guest_id).copied().filter(|tile| {
            band.contains(tile.x, tile.y) && map.is_spawnable(tile.x, tile.y) && layout.is_free(*tile)
        });
        match replay {
            Some(tile) => layout.push(guest_id, tile, PlacementTier::Cached, request.level_key),
            None => remaining.push(guest_id.clone()),
        }
    }

    if !remaining.is_empty() {
        let candidates = candidate_tiles(map, band, request.player, config.edge_buffer);
        remaining = place_scored(&mut layout, remaining, &candidates, rng, request.level_key);
    }
    if !remaining.is_empty() {
        remaining = place_random(&mut layout, remaining, map, rng, request.level_key);
    }
    if !remaining.is_empty() {
        remaining = place_fallback(&mut layout, remaining, map, rng, request.level_key);
    }

    for guest_id in &remaining {
        tracing::warn!(level_key = request.level_key, guest_id = %guest_id, "no valid tile for npc");
    }

    cache.set_positions_for_level(
        request.level_key,
        layout
            .placed
            .iter()
            .map(|npc| CachedPosition {
                guest_id: npc.guest_id.clone(),
                x: npc.x,
                y: npc.y,
            })
            .collect(),
    );

    PlacementReport {
        placed: layout.placed,
        unplaced: remaining,
    }
}

/// Spawnable tiles reachable from the player inside the band, minus the
/// edge buffer. Falls back to every spawnable tile in the band when the
/// player's region has none.
fn candidate_tiles(map: &dyn MapProvider, band: SegmentBand, player: Vec2, edge_buffer: i32) -> Vec<Vec2> {
    let buffer = edge_buffer.max(0);
    let mut inner = SegmentBand {
        top: band.top + buffer,
        bottom: band.bottom - buffer,
        width: band.width,
    };
    if inner.is_empty() {
        inner = band;
    }

    let reachable = flood_fill(map, player, |x, y| band.contains(x, y));
    let mut tiles: Vec<Vec2> = reachable
        .into_iter()
        .filter(|tile| inner.contains(tile.x, tile.y) && map.is_spawnable(tile.x, tile.y))
        .collect();

    if tiles.is_empty() {
        tracing::debug!(top = band.top, "no reachable spawnable tiles, scanning whole band");
        tiles = band_tiles(inner)
            .filter(|tile| map.is_spawnable(tile.x, tile.y))
            .collect();
    }
    tiles.sort_by_key(|tile| (tile.y, tile.x));
    tiles
}

fn band_tiles(band: SegmentBand) -> impl Iterator<Item = Vec2> {
    (band.top..=band.bottom).flat_map(move |y| (0..band.width).map(move |x| Vec2::new(x, y)))
}

fn place_scored(
    layout: &mut Layout<'_>,
    remaining: Vec<String>,
    candidates: &[Vec2],
    rng: &mut Rng,
    level_key: &str,
) -> Vec<String> {
    let mut queue = remaining.into_iter();
    let mut current = queue.next();
    let tiers = layout.config.spacing_tiers.clone();

    for spacing in tiers {
        while let Some(guest_id) = current.as_ref() {
            let eligible: Vec<Vec2> = candidates
                .iter()
                .copied()
                .filter(|tile| layout.is_free(*tile) && layout.spaced(*tile, spacing))
                .collect();
            if eligible.is_empty() {
                break;
            }
            let samples = layout.config.sample_size.max(1).min(eligible.len());
            let mut best: Option<(Vec2, f32)> = None;
            for _ in 0..samples {
                let tile = eligible[rng.pick_index(eligible.len())];
                let score = layout.score(tile);
                if best.map(|(_, top)| score > top).unwrap_or(true) {
                    best = Some((tile, score));
                }
            }
            if let Some((tile, _)) = best {
                layout.push(guest_id, tile, PlacementTier::Scored, level_key);
            }
            current = queue.next();
        }
        if current.is_none() {
            break;
        }
    }

    current.into_iter().chain(queue).collect()
}

fn place_random(
    layout: &mut Layout<'_>,
    remaining: Vec<String>,
    map: &dyn MapProvider,
    rng: &mut Rng,
    level_key: &str,
) -> Vec<String> {
    let band = layout.band;
    if band.is_empty() {
        return remaining;
    }
    let mut left = Vec::new();
    let mut attempts = layout.config.random_attempts;
    for guest_id in remaining {
        let mut placed = false;
        while attempts > 0 {
            attempts -= 1;
            let tile = Vec2::new(rng.int(0, band.width - 1), rng.int(band.top, band.bottom));
            if map.is_spawnable(tile.x, tile.y)
                && layout.is_free(tile)
                && layout.spaced(tile, layout.config.minimal_spacing)
            {
                layout.push(&guest_id, tile, PlacementTier::Random, level_key);
                placed = true;
                break;
            }
        }
        if !placed {
            left.push(guest_id);
        }
    }
    left
}

fn place_fallback(
    layout: &mut Layout<'_>,
    remaining: Vec<String>,
    map: &dyn MapProvider,
    rng: &mut Rng,
    level_key: &str,
) -> Vec<String> {
    let band = layout.band;
    let player = layout.player;
    let pick_from = |accept: &dyn Fn(Vec2) -> bool| -> Vec<Vec2> {
        band_tiles(band).filter(|tile| accept(*tile)).collect()
    };

    let mut valid = pick_from(&|tile: Vec2| tile != player && map.is_spawnable(tile.x, tile.y));
    if valid.is_empty() {
        valid = pick_from(&|tile: Vec2| tile != player && map.is_walkable(tile.x, tile.y));
    }
    if valid.is_empty() {
        valid = pick_from(&|tile: Vec2| map.is_walkable(tile.x, tile.y));
    }
    if valid.is_empty() {
        return remaining;
    }

    for guest_id in remaining {
        let free: Vec<Vec2> = valid
            .iter()
            .copied()
            .filter(|tile| !layout.occupied.contains(tile))
            .collect();
        let pool = if free.is_empty() { &valid } else { &free };
        let tile = pool[rng.pick_index(pool.len())];
        layout.push(&guest_id, tile, PlacementTier::Fallback, level_key);
    }
    Vec::new()
}
