use super::*;

impl OverworldController {
    /// Challenges the nearest free NPC in range and hands control to the
    /// battle. Returns the guest id to fight.
    pub fn interact(&mut self) -> Option<String> {
        if self.is_input_suppressed() {
            return None;
        }
        let guest_id = self.interactable_npc()?.guest_id.clone();
        if let Some(npc) = self.npcs.iter_mut().find(|npc| npc.guest_id == guest_id) {
            npc.challenged = true;
        }
        self.battle_npc = Some(guest_id.clone());
        self.state = ControllerState::BattleActive {
            guest_id: guest_id.clone(),
        };
        self.events.push(OverworldEvent::BattleStarted {
            guest_id: guest_id.clone(),
        });
        Some(guest_id)
    }

    /// The player declined the encounter. Safe to call repeatedly.
    pub fn reject_battle(&mut self) {
        let Some(guest_id) = self.battle_npc.take() else {
            return;
        };
        if let Some(npc) = self.npcs.iter_mut().find(|npc| npc.guest_id == guest_id) {
            npc.challenged = false;
        }
        if matches!(self.state, ControllerState::BattleActive { .. }) {
            self.state = ControllerState::Idle;
        }
        self.events.push(OverworldEvent::BattleRejected { guest_id });
    }

    /// Takes the battle result back. A win removes the NPC for good; a loss
    /// leaves it free to be challenged again. Returns `true` when an NPC was
    /// removed.
    pub fn finish_battle(&mut self, outcome: &BattleOutcome, cache: &mut dyn PositionCache) -> bool {
        let matches_active = self.battle_npc.as_deref() == Some(outcome.guest_id.as_str());
        if !matches_active {
            tracing::warn!(guest_id = %outcome.guest_id, "battle result for a guest that is not in battle");
            return false;
        }
        self.battle_npc = None;
        self.state = ControllerState::Idle;
        self.events.push(OverworldEvent::BattleEnded {
            guest_id: outcome.guest_id.clone(),
            won: outcome.won,
        });

        if outcome.won {
            if let Some(npc) = self.npcs.iter_mut().find(|npc| npc.guest_id == outcome.guest_id) {
                npc.defeated = true;
            }
            return self.remove_npc(&outcome.guest_id, cache);
        }
        if let Some(npc) = self.npcs.iter_mut().find(|npc| npc.guest_id == outcome.guest_id) {
            npc.challenged = false;
        }
        false
    }
}
