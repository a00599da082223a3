use crate::constants::MOVE_TWEEN_SLACK_MS;
use crate::rng::Rng;
use crate::types::{Direction, NpcView, Vec2};

pub(super) fn tween_ms(move_delay_ms: u64) -> u64 {
    move_delay_ms.saturating_sub(MOVE_TWEEN_SLACK_MS)
}

pub(super) fn random_direction(rng: &mut Rng) -> Direction {
    Direction::ALL[rng.pick_index(Direction::ALL.len())]
}

/// Closest NPC within `range` that is free to fight. Ties keep list order.
pub(super) fn nearest_npc_in_range(npcs: &[NpcView], player: Vec2, range: i32) -> Option<&NpcView> {
    npcs.iter()
        .filter(|npc| !npc.challenged && !npc.defeated)
        .map(|npc| (npc, player.manhattan(Vec2::new(npc.x, npc.y))))
        .filter(|(_, dist)| *dist <= range)
        .min_by_key(|(_, dist)| *dist)
        .map(|(npc, _)| npc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npc(id: &str, x: i32, y: i32) -> NpcView {
        NpcView {
            guest_id: id.to_string(),
            x,
            y,
            dir: Direction::Down,
            challenged: false,
            defeated: false,
        }
    }

    #[test]
    fn nearest_npc_skips_busy_and_far_npcs() {
        let mut npcs = vec![npc("a", 5, 5), npc("b", 1, 0), npc("c", 0, 2)];
        let found = nearest_npc_in_range(&npcs, Vec2::new(0, 0), 2).map(|npc| npc.guest_id.clone());
        assert_eq!(found.as_deref(), Some("b"));

        npcs[1].challenged = true;
        let found = nearest_npc_in_range(&npcs, Vec2::new(0, 0), 2).map(|npc| npc.guest_id.clone());
        assert_eq!(found.as_deref(), Some("c"));

        npcs[2].defeated = true;
        assert!(nearest_npc_in_range(&npcs, Vec2::new(0, 0), 2).is_none());
    }

    #[test]
    fn tween_leaves_slack_before_next_move() {
        assert_eq!(tween_ms(200), 150);
        assert_eq!(tween_ms(20), 0);
    }
}
