use super::*;

impl OverworldController {
    /// Clears the segment and places one NPC per remaining opponent.
    pub(super) fn respawn_npcs(&mut self, ctx: &mut SpawnContext<'_>) {
        self.npcs.clear();
        let level = self.player.level;
        let key = level_key(level);
        let guest_ids = ctx.roster.opponents_for_level(level);
        let Some(map) = self.maps.get(self.player.world) else {
            return;
        };
        let band = self.layout.segment_band(self.player.world, self.player.segment, map);

        let mut rng = self.placement_rng(level);
        let request = PlacementRequest {
            level_key: &key,
            band,
            guest_ids: &guest_ids,
            player: Vec2::new(self.player.x, self.player.y),
        };
        let report = place_npcs(&request, map, ctx.cache, &self.placement, &mut rng);

        self.npcs = report
            .placed
            .iter()
            .map(|npc| NpcView {
                guest_id: npc.guest_id.clone(),
                x: npc.x,
                y: npc.y,
                dir: random_direction(&mut rng),
                challenged: false,
                defeated: false,
            })
            .collect();

        if report.unplaced.is_empty() {
            tracing::debug!(level, placed = self.npcs.len(), "segment populated");
        } else {
            tracing::warn!(
                level,
                placed = self.npcs.len(),
                expected = guest_ids.len(),
                "segment populated with fewer npcs than opponents"
            );
        }
        self.events.push(OverworldEvent::NpcsSpawned {
            level,
            placed: self.npcs.len(),
            expected: guest_ids.len(),
        });
    }

    /// Drops a defeated guest's NPC and its cached tile.
    pub(super) fn remove_npc(&mut self, guest_id: &str, cache: &mut dyn PositionCache) -> bool {
        let before = self.npcs.len();
        self.npcs.retain(|npc| npc.guest_id != guest_id);
        cache.remove_position(&level_key(self.player.level), guest_id);
        let removed = self.npcs.len() != before;
        if removed {
            self.events.push(OverworldEvent::NpcRemoved {
                guest_id: guest_id.to_string(),
            });
        }
        removed
    }
}
