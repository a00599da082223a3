use super::*;

impl OverworldController {
    /// Places the player on `level` without a fade, falling back to the
    /// first world when the level's world has no map. Returns `false` only
    /// when not even the first world is available.
    pub fn enter(&mut self, level: i32, ctx: &mut SpawnContext<'_>) -> bool {
        let mut level = level.max(1);
        if let Some(max) = self.layout.max_world_level() {
            level = level.min(max);
        }
        let mut target = self.layout.world_segment_for_level(level);
        if !self.maps.is_loaded(target.world) {
            tracing::warn!(world = target.world, level, "world map unavailable, falling back to first world");
            self.events.push(OverworldEvent::WorldFallback {
                requested: target.world,
            });
            level = 1;
            target = SegmentRef { world: 0, segment: 0 };
        }
        if !self.maps.is_loaded(target.world) {
            tracing::warn!("first world map unavailable, overworld cannot start");
            return false;
        }

        self.state = ControllerState::Idle;
        self.battle_npc = None;
        self.player.world = target.world;
        self.player.segment = target.segment;
        self.player.level = level;

        let start = self.config.start_tile;
        let start_is_valid = level == 1
            && self
                .current_band()
                .map(|band| band.contains(start.x, start.y))
                .unwrap_or(false)
            && self.current_map().map(|map| map.is_walkable(start.x, start.y)).unwrap_or(false);
        if start_is_valid {
            self.player.x = start.x;
            self.player.y = start.y;
        } else {
            let occupied = cached_tiles(ctx, level);
            self.snap_player(SpawnEdge::North, start.x, &occupied);
        }

        if let Some(world) = self.layout.world(target.world) {
            self.events.push(OverworldEvent::WorldLoaded {
                world: target.world,
                music_track: world.music_track.clone(),
            });
        }
        self.respawn_npcs(ctx);
        self.emit_view_changed();
        true
    }

    /// Starts a fade-out toward `target`. Dropped while another transition
    /// is in flight.
    pub fn begin_transition(&mut self, now_ms: u64, target: TransitionTarget) -> bool {
        if matches!(self.state, ControllerState::Transitioning { .. }) {
            tracing::debug!(level = target.level, "transition already in flight, dropping request");
            return false;
        }
        tracing::debug!(from = self.player.level, to = target.level, "transition started");
        self.state = ControllerState::Transitioning {
            phase: FadePhase::Out,
            until_ms: now_ms + self.config.fade_ms,
            target,
        };
        self.events.push(OverworldEvent::TransitionStarted {
            world: target.world,
            segment: target.segment,
            level: target.level,
        });
        true
    }

    /// Advances timers: ends move windows and drives fades. NPCs for the
    /// destination are placed before the fade-in starts.
    pub fn update(&mut self, now_ms: u64, ctx: &mut SpawnContext<'_>) {
        match self.state.clone() {
            ControllerState::Moving { until_ms } if now_ms >= until_ms => {
                self.state = ControllerState::Idle;
            }
            ControllerState::Transitioning {
                phase: FadePhase::Out,
                until_ms,
                target,
            } if now_ms >= until_ms => {
                self.apply_transition(target, ctx);
                self.state = ControllerState::Transitioning {
                    phase: FadePhase::In,
                    until_ms: now_ms + self.config.fade_ms,
                    target,
                };
            }
            ControllerState::Transitioning {
                phase: FadePhase::In,
                until_ms,
                target,
            } if now_ms >= until_ms => {
                self.state = ControllerState::Idle;
                self.events.push(OverworldEvent::TransitionFinished {
                    world: self.player.world,
                    segment: self.player.segment,
                    level: self.player.level,
                });
                tracing::debug!(level = target.level, "transition finished");
            }
            _ => {}
        }
    }

    fn apply_transition(&mut self, target: TransitionTarget, ctx: &mut SpawnContext<'_>) {
        let world_changed = target.world != self.player.world;
        if world_changed && !self.maps.is_loaded(target.world) {
            tracing::warn!(world = target.world, "world map vanished mid-transition, staying put");
            return;
        }

        self.player.world = target.world;
        self.player.segment = target.segment;
        self.player.level = target.level;
        self.battle_npc = None;

        let occupied = cached_tiles(ctx, target.level);
        self.snap_player(target.edge, target.preferred_x, &occupied);
        if world_changed {
            if let Some(world) = self.layout.world(target.world) {
                self.events.push(OverworldEvent::WorldLoaded {
                    world: target.world,
                    music_track: world.music_track.clone(),
                });
            }
        }
        self.respawn_npcs(ctx);
        self.emit_view_changed();
    }

    fn snap_player(&mut self, edge: SpawnEdge, preferred_x: i32, occupied: &[Vec2]) {
        let Some(map) = self.current_map() else {
            return;
        };
        let band = self.layout.segment_band(self.player.world, self.player.segment, map);
        match self.layout.spawn_tile(band, edge, preferred_x, map, occupied) {
            Some(tile) => {
                self.player.x = tile.x;
                self.player.y = tile.y;
            }
            None => {
                tracing::warn!(level = self.player.level, "segment has no walkable spawn tile");
                self.player.x = preferred_x.clamp(0, (band.width - 1).max(0));
                self.player.y = match edge {
                    SpawnEdge::North => band.top,
                    SpawnEdge::South => band.bottom.max(band.top),
                };
            }
        }
    }
}

/// Tiles held by NPCs cached for `level`. The player lands beside them so a
/// revisit replays every cached NPC where it stood.
fn cached_tiles(ctx: &SpawnContext<'_>, level: i32) -> Vec<Vec2> {
    ctx.cache
        .positions_for_level(&level_key(level))
        .into_iter()
        .map(|pos| Vec2::new(pos.x, pos.y))
        .collect()
}
