use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::constants::TILE_SIZE_PX;
use crate::rng::Rng;
use crate::types::Vec2;

const GID_MASK: u32 = 0x1fff_ffff;
const FLOOR_GID: u32 = 1;
const ALT_FLOOR_GID: u32 = 2;

/// Tile queries the placement engine and traversal controller depend on.
/// Coordinates are map tiles; anything out of bounds is neither walkable
/// nor spawnable.
pub trait MapProvider {
    fn width(&self) -> i32;
    fn height(&self) -> i32;
    fn tile_width(&self) -> i32;
    fn tile_height(&self) -> i32;
    fn is_walkable(&self, x: i32, y: i32) -> bool;
    /// Walkable, not hidden under an overhead layer and, when the world
    /// restricts spawn surfaces, standing on an allowed surface tile.
    fn is_spawnable(&self, x: i32, y: i32) -> bool;
}

#[derive(Debug, Error)]
pub enum TilemapError {
    #[error("failed to read map {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid map json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("map has no layer named '{0}'")]
    MissingLayer(String),
    #[error("layer '{name}' has {actual} tiles, expected {expected}")]
    LayerSize {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("map dimensions must be positive, got {width}x{height}")]
    EmptyMap { width: i32, height: i32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerSelection<'a> {
    pub below: &'a str,
    pub world: &'a str,
    pub above: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TiledMap {
    width: i32,
    height: i32,
    #[serde(default = "default_tile_size")]
    tilewidth: i32,
    #[serde(default = "default_tile_size")]
    tileheight: i32,
    #[serde(default)]
    layers: Vec<TiledLayer>,
    #[serde(default)]
    tilesets: Vec<TiledTileset>,
}

#[derive(Debug, Deserialize)]
struct TiledLayer {
    name: String,
    #[serde(default)]
    data: Option<Vec<u32>>,
}

#[derive(Debug, Deserialize)]
struct TiledTileset {
    firstgid: u32,
    #[serde(default)]
    tiles: Vec<TiledTile>,
}

#[derive(Debug, Deserialize)]
struct TiledTile {
    id: u32,
    #[serde(default)]
    properties: Vec<TiledProperty>,
}

#[derive(Debug, Deserialize)]
struct TiledProperty {
    name: String,
    #[serde(default)]
    value: Value,
}

fn default_tile_size() -> i32 {
    TILE_SIZE_PX
}

#[derive(Clone, Debug)]
pub struct TileGrid {
    width: i32,
    height: i32,
    tile_width: i32,
    tile_height: i32,
    blocked: Vec<bool>,
    occluded: Vec<bool>,
    surface: Vec<u32>,
    spawnable_ids: Option<HashSet<u32>>,
}

impl TileGrid {
    /// Builds a grid from text rows: `#` wall, `.` floor, `,` alternate
    /// floor surface, `^` floor hidden under the overhead layer. Short rows
    /// are padded with walls.
    pub fn from_rows(rows: &[&str]) -> Self {
        let height = rows.len() as i32;
        let width = rows.iter().map(|row| row.chars().count()).max().unwrap_or(0) as i32;
        let cells = (width * height) as usize;
        let mut grid = Self {
            width,
            height,
            tile_width: TILE_SIZE_PX,
            tile_height: TILE_SIZE_PX,
            blocked: vec![true; cells],
            occluded: vec![false; cells],
            surface: vec![0; cells],
            spawnable_ids: None,
        };
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                let idx = y * width as usize + x;
                match c {
                    '.' => {
                        grid.blocked[idx] = false;
                        grid.surface[idx] = FLOOR_GID;
                    }
                    ',' => {
                        grid.blocked[idx] = false;
                        grid.surface[idx] = ALT_FLOOR_GID;
                    }
                    '^' => {
                        grid.blocked[idx] = false;
                        grid.surface[idx] = FLOOR_GID;
                        grid.occluded[idx] = true;
                    }
                    _ => {}
                }
            }
        }
        grid
    }

    pub fn load_tiled(
        path: &Path,
        layers: &LayerSelection<'_>,
        spawnable_ids: Option<&[u32]>,
    ) -> Result<Self, TilemapError> {
        let text = fs::read_to_string(path).map_err(|source| TilemapError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_tiled_json(&text, layers, spawnable_ids)
    }

    /// Reads a Tiled JSON export. Collision comes from the boolean
    /// `collides` tile property on the world layer.
    pub fn from_tiled_json(
        text: &str,
        layers: &LayerSelection<'_>,
        spawnable_ids: Option<&[u32]>,
    ) -> Result<Self, TilemapError> {
        let map: TiledMap = serde_json::from_str(text)?;
        if map.width <= 0 || map.height <= 0 {
            return Err(TilemapError::EmptyMap {
                width: map.width,
                height: map.height,
            });
        }
        let cells = (map.width * map.height) as usize;

        let colliding: HashSet<u32> = map
            .tilesets
            .iter()
            .flat_map(|tileset| {
                tileset
                    .tiles
                    .iter()
                    .filter(|tile| {
                        tile.properties
                            .iter()
                            .any(|prop| prop.name == "collides" && prop.value == Value::Bool(true))
                    })
                    .map(move |tile| tileset.firstgid + tile.id)
            })
            .collect();

        let world = layer_data(&map, layers.world, cells)?
            .ok_or_else(|| TilemapError::MissingLayer(layers.world.to_string()))?;
        let below = layer_data(&map, layers.below, cells)?;
        let above = match layers.above {
            Some(name) => layer_data(&map, name, cells)?,
            None => None,
        };

        let blocked = world
            .iter()
            .map(|gid| {
                let gid = gid & GID_MASK;
                gid != 0 && colliding.contains(&gid)
            })
            .collect();
        let occluded = match above {
            Some(data) => data.iter().map(|gid| gid & GID_MASK != 0).collect(),
            None => vec![false; cells],
        };
        let surface = match below {
            Some(data) => data.iter().map(|gid| gid & GID_MASK).collect(),
            None => vec![0; cells],
        };

        Ok(Self {
            width: map.width,
            height: map.height,
            tile_width: map.tilewidth,
            tile_height: map.tileheight,
            blocked,
            occluded,
            surface,
            spawnable_ids: spawnable_ids.map(|ids| ids.iter().copied().collect()),
        })
    }

    /// Random open field with scattered obstacles. A three-tile corridor
    /// runs down the middle so vertically stacked segments stay connected,
    /// and every floor tile left over is reachable from `start`.
    pub fn generate(width: i32, height: i32, seed: u32, open_rate: f32, start: Vec2) -> Self {
        let mut rng = Rng::new(seed);
        let width = width.max(1);
        let height = height.max(1);
        let mut rows: Vec<Vec<char>> = vec![vec!['.'; width as usize]; height as usize];

        for (y, row) in rows.iter_mut().enumerate() {
            for (x, cell) in row.iter_mut().enumerate() {
                if !rng.bool(open_rate) {
                    *cell = '#';
                }
                if (x as i32 - width / 2).abs() <= 1 {
                    *cell = '.';
                }
                let near_start = (x as i32 - start.x).abs() <= 1 && (y as i32 - start.y).abs() <= 1;
                if near_start {
                    *cell = '.';
                }
            }
        }

        let text_rows: Vec<String> = rows.into_iter().map(|row| row.into_iter().collect()).collect();
        let borrowed: Vec<&str> = text_rows.iter().map(String::as_str).collect();
        let mut grid = Self::from_rows(&borrowed);

        let reachable = grid.reachable_from(start, |_, _| true);
        for y in 0..grid.height {
            for x in 0..grid.width {
                if !reachable.contains(&Vec2::new(x, y)) {
                    let idx = grid.index(x, y);
                    grid.blocked[idx] = true;
                }
            }
        }
        grid
    }

    pub fn with_tile_size(mut self, tile_width: i32, tile_height: i32) -> Self {
        self.tile_width = tile_width.max(1);
        self.tile_height = tile_height.max(1);
        self
    }

    pub fn with_spawnable_ids(mut self, ids: Option<&[u32]>) -> Self {
        self.spawnable_ids = ids.map(|ids| ids.iter().copied().collect());
        self
    }

    /// Walkable tiles 4-connected to `start`, limited to tiles accepted by
    /// `within`.
    pub fn reachable_from<F>(&self, start: Vec2, within: F) -> HashSet<Vec2>
    where
        F: Fn(i32, i32) -> bool,
    {
        flood_fill(self, start, within)
    }

    fn index(&self, x: i32, y: i32) -> usize {
        (y * self.width + x) as usize
    }

    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }
}

impl MapProvider for TileGrid {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn tile_width(&self) -> i32 {
        self.tile_width
    }

    fn tile_height(&self) -> i32 {
        self.tile_height
    }

    fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.in_bounds(x, y) && !self.blocked[self.index(x, y)]
    }

    fn is_spawnable(&self, x: i32, y: i32) -> bool {
        if !self.is_walkable(x, y) {
            return false;
        }
        let idx = self.index(x, y);
        if self.occluded[idx] {
            return false;
        }
        match &self.spawnable_ids {
            Some(ids) => ids.contains(&self.surface[idx]),
            None => true,
        }
    }
}

/// 4-directional flood fill over walkable tiles.
pub fn flood_fill<M, F>(map: &M, start: Vec2, within: F) -> HashSet<Vec2>
where
    M: MapProvider + ?Sized,
    F: Fn(i32, i32) -> bool,
{
    let mut out = HashSet::new();
    if !map.is_walkable(start.x, start.y) || !within(start.x, start.y) {
        return out;
    }
    let mut queue = VecDeque::new();
    out.insert(start);
    queue.push_back(start);

    while let Some(cell) = queue.pop_front() {
        for (nx, ny) in [
            (cell.x - 1, cell.y),
            (cell.x + 1, cell.y),
            (cell.x, cell.y - 1),
            (cell.x, cell.y + 1),
        ] {
            if !map.is_walkable(nx, ny) || !within(nx, ny) {
                continue;
            }
            let next = Vec2::new(nx, ny);
            if out.insert(next) {
                queue.push_back(next);
            }
        }
    }
    out
}

fn layer_data(map: &TiledMap, name: &str, cells: usize) -> Result<Option<Vec<u32>>, TilemapError> {
    let Some(layer) = map.layers.iter().find(|layer| layer.name == name) else {
        return Ok(None);
    };
    let Some(data) = layer.data.as_ref() else {
        return Ok(None);
    };
    if data.len() != cells {
        return Err(TilemapError::LayerSize {
            name: name.to_string(),
            expected: cells,
            actual: data.len(),
        });
    }
    Ok(Some(data.clone()))
}
