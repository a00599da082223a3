use super::*;

impl OverworldController {
    /// One-tile move intent. `(dx, dy)` must be a unit step on one axis.
    pub fn attempt_move(&mut self, now_ms: u64, dx: i32, dy: i32) -> MoveResult {
        match self.state {
            ControllerState::BattleActive { .. } | ControllerState::Transitioning { .. } => {
                return MoveResult::Ignored;
            }
            ControllerState::Moving { until_ms } if now_ms < until_ms => return MoveResult::Ignored,
            ControllerState::Moving { .. } => self.state = ControllerState::Idle,
            ControllerState::Idle => {}
        }
        let Some(dir) = Direction::from_delta(dx, dy) else {
            return MoveResult::Ignored;
        };
        let Some(band) = self.current_band() else {
            tracing::warn!(world = self.player.world, "move without a loaded map");
            return MoveResult::Ignored;
        };

        self.player.dir = dir;
        let target = self.player_tile().offset(dir);

        if target.x < 0 || target.x >= band.width {
            self.show_notice(now_ms, LOCKED_MESSAGE);
            return MoveResult::Locked;
        }
        if target.y < band.top {
            return self.cross_north(now_ms);
        }
        if target.y > band.bottom {
            return self.cross_south(now_ms);
        }

        if !self.is_tile_free(target) {
            self.events.push(OverworldEvent::MoveBlocked {
                x: target.x,
                y: target.y,
                dir,
            });
            return MoveResult::Blocked;
        }

        self.player.x = target.x;
        self.player.y = target.y;
        self.state = ControllerState::Moving {
            until_ms: now_ms + self.config.move_delay_ms,
        };
        self.events.push(OverworldEvent::MoveAccepted {
            x: target.x,
            y: target.y,
            dir,
            tween_ms: tween_ms(self.config.move_delay_ms),
        });
        MoveResult::Moved
    }

    /// Walkable on the map and not occupied by an NPC.
    pub fn is_tile_free(&self, tile: Vec2) -> bool {
        let Some(map) = self.current_map() else {
            return false;
        };
        map.is_walkable(tile.x, tile.y)
            && !self.npcs.iter().any(|npc| npc.x == tile.x && npc.y == tile.y)
    }

    fn cross_north(&mut self, now_ms: u64) -> MoveResult {
        if self.player.level <= 1 {
            self.events.push(OverworldEvent::MoveBlocked {
                x: self.player.x,
                y: self.player.y - 1,
                dir: Direction::Up,
            });
            return MoveResult::Blocked;
        }
        let level = self.player.level - 1;
        self.request_transition(now_ms, level, SpawnEdge::South)
    }

    fn cross_south(&mut self, now_ms: u64) -> MoveResult {
        let level = self.player.level + 1;
        let available = self.layout.available_level(self.player.unlocked_level);
        if level > available {
            let at_content_end = self
                .layout
                .max_world_level()
                .map(|max| self.player.level >= max)
                .unwrap_or(false);
            let message = if at_content_end {
                COMING_SOON_MESSAGE
            } else {
                LOCKED_MESSAGE
            };
            self.show_notice(now_ms, message);
            return MoveResult::Locked;
        }
        self.request_transition(now_ms, level, SpawnEdge::North)
    }

    fn request_transition(&mut self, now_ms: u64, level: i32, edge: SpawnEdge) -> MoveResult {
        let SegmentRef { world, segment } = self.layout.world_segment_for_level(level);
        if world != self.player.world && !self.maps.is_loaded(world) {
            tracing::warn!(world, level, "destination world is not loaded");
            self.show_notice(now_ms, COMING_SOON_MESSAGE);
            return MoveResult::Locked;
        }
        let target = TransitionTarget {
            world,
            segment,
            level,
            edge,
            preferred_x: self.player.x,
        };
        if self.begin_transition(now_ms, target) {
            MoveResult::TransitionStarted
        } else {
            MoveResult::Ignored
        }
    }
}
