use serde::Serialize;

use crate::constants::{
    wrong_answer_penalty, xp_per_correct, BONUS_QUESTION_HP, BONUS_XP_MULTIPLIER, GUEST_MAX_HP,
    PERFECT_BATTLE_HP, PERFECT_XP_MULTIPLIER, WIN_ACCURACY_PERCENT,
};
use crate::types::{BattleOutcome, BattleStats, Guest, GuestTier, Question};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BattleGuest {
    pub id: String,
    pub name: String,
    pub tier: GuestTier,
    #[serde(rename = "maxHp")]
    pub max_hp: i32,
}

impl BattleGuest {
    pub fn from_guest(guest: &Guest, max_hp: i32) -> Self {
        Self {
            id: guest.id.clone(),
            name: guest.name.clone(),
            tier: guest.tier,
            max_hp: if max_hp > 0 { max_hp } else { GUEST_MAX_HP },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PlayerStats {
    pub level: i32,
    pub hp: i32,
    #[serde(rename = "maxHp")]
    pub max_hp: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum BattlePhase {
    AwaitingAnswer,
    Answered { correct: bool },
    Ended { won: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AnswerFeedback {
    pub correct: bool,
    pub bonus: bool,
    #[serde(rename = "xpEarned")]
    pub xp_earned: u64,
    /// Signed change applied to the player's HP by this answer.
    #[serde(rename = "hpDelta")]
    pub hp_delta: i32,
}

/// One quiz encounter. Owns its own tallies and reports back only through
/// [`BattleOutcome`].
#[derive(Clone, Debug)]
pub struct BattleSession {
    guest: BattleGuest,
    questions: Vec<Question>,
    player: PlayerStats,
    player_hp: i32,
    guest_hp: f64,
    index: usize,
    phase: BattlePhase,
    stats: BattleStats,
}

impl BattleSession {
    pub fn new(guest: BattleGuest, questions: Vec<Question>, player: PlayerStats) -> Self {
        let player = PlayerStats {
            level: player.level.max(1),
            hp: player.hp.clamp(0, player.max_hp.max(1)),
            max_hp: player.max_hp.max(1),
        };
        if questions.is_empty() {
            tracing::warn!(guest_id = %guest.id, "battle started without questions");
        }
        let mut session = Self {
            guest_hp: guest.max_hp as f64,
            guest,
            questions,
            player_hp: player.hp,
            player,
            index: 0,
            phase: BattlePhase::AwaitingAnswer,
            stats: BattleStats::default(),
        };
        session.reset();
        session
    }

    pub fn guest(&self) -> &BattleGuest {
        &self.guest
    }

    pub fn is_boss(&self) -> bool {
        self.guest.tier.is_boss()
    }

    pub fn xp_per_correct(&self) -> u64 {
        xp_per_correct(self.is_boss(), self.player.level)
    }

    pub fn phase(&self) -> BattlePhase {
        self.phase
    }

    pub fn stats(&self) -> &BattleStats {
        &self.stats
    }

    pub fn question_index(&self) -> usize {
        self.index
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.index)
    }

    pub fn guest_hp(&self) -> f64 {
        self.guest_hp
    }

    pub fn player_hp(&self) -> i32 {
        self.player_hp
    }

    pub fn player_max_hp(&self) -> i32 {
        self.player.max_hp
    }

    /// True until the first answer is given.
    pub fn is_untouched(&self) -> bool {
        self.phase == BattlePhase::AwaitingAnswer && self.index == 0 && self.stats == BattleStats::default()
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.phase, BattlePhase::Ended { .. })
    }

    /// Scores the current question. Returns `None` when the question was
    /// already answered, the battle is over or there is no question.
    pub fn select_answer(&mut self, choice: usize) -> Option<AnswerFeedback> {
        if self.phase != BattlePhase::AwaitingAnswer {
            return None;
        }
        let question = self.questions.get(self.index)?;
        let correct = choice == question.correct_answer;
        let bonus = correct && question.is_bonus;
        let per_correct = self.xp_per_correct();

        let feedback = if correct {
            self.stats.correct_answers += 1;
            let mut earned = per_correct;
            let mut healed = 0;
            if bonus {
                earned += BONUS_XP_MULTIPLIER * per_correct;
                self.stats.bonus_correct = true;
                healed = self.heal(BONUS_QUESTION_HP);
            }
            self.stats.xp_gained += earned;

            let total = self.stats.total_questions.max(1) as f64;
            let max_hp = self.guest.max_hp as f64;
            self.guest_hp = (max_hp - self.stats.correct_answers as f64 * (max_hp / total)).max(0.0);
            AnswerFeedback {
                correct,
                bonus,
                xp_earned: earned,
                hp_delta: healed,
            }
        } else {
            self.stats.wrong_answers += 1;
            let before = self.player_hp;
            self.player_hp = (self.player_hp - wrong_answer_penalty(self.is_boss())).max(0);
            AnswerFeedback {
                correct,
                bonus: false,
                xp_earned: 0,
                hp_delta: self.player_hp - before,
            }
        };

        self.phase = BattlePhase::Answered { correct };
        Some(feedback)
    }

    /// Moves past an answered question. Returns the outcome once the last
    /// question has been answered.
    pub fn next_question(&mut self) -> Option<BattleOutcome> {
        match self.phase {
            BattlePhase::Ended { .. } => return None,
            BattlePhase::AwaitingAnswer if !self.questions.is_empty() => return None,
            _ => {}
        }
        if self.index + 1 < self.questions.len() {
            self.index += 1;
            self.phase = BattlePhase::AwaitingAnswer;
            return None;
        }
        let won = self.accuracy() >= WIN_ACCURACY_PERCENT;
        self.end_battle(won)
    }

    pub fn accuracy(&self) -> f64 {
        if self.stats.total_questions == 0 {
            return 0.0;
        }
        self.stats.correct_answers as f64 / self.stats.total_questions as f64 * 100.0
    }

    /// Terminal transition. A second call is a no-op.
    pub fn end_battle(&mut self, won: bool) -> Option<BattleOutcome> {
        if self.is_ended() {
            return None;
        }
        self.phase = BattlePhase::Ended { won };
        self.stats.perfect_battle = won && self.stats.wrong_answers == 0;
        if self.stats.perfect_battle {
            self.stats.xp_gained += PERFECT_XP_MULTIPLIER * self.xp_per_correct();
            self.heal(PERFECT_BATTLE_HP);
        }
        tracing::info!(
            guest_id = %self.guest.id,
            won,
            correct = self.stats.correct_answers,
            total = self.stats.total_questions,
            xp = self.stats.xp_gained,
            "battle ended"
        );
        self.outcome()
    }

    pub fn outcome(&self) -> Option<BattleOutcome> {
        let BattlePhase::Ended { won } = self.phase else {
            return None;
        };
        Some(BattleOutcome {
            guest_id: self.guest.id.clone(),
            won,
            stats: self.stats.clone(),
            player_hp: self.player_hp,
        })
    }

    /// Same guest and questions from the top. HP carries over; a knocked
    /// out player starts again at full HP.
    pub fn retry(&mut self) {
        if self.player_hp <= 0 {
            self.player_hp = self.player.max_hp;
        }
        self.player.hp = self.player_hp;
        self.reset();
    }

    fn reset(&mut self) {
        self.guest_hp = self.guest.max_hp as f64;
        self.player_hp = self.player.hp;
        self.index = 0;
        self.phase = BattlePhase::AwaitingAnswer;
        self.stats = BattleStats {
            total_questions: self.questions.len(),
            ..BattleStats::default()
        };
    }

    fn heal(&mut self, amount: i32) -> i32 {
        let next = (self.player_hp + amount).min(self.player.max_hp);
        let gained = (next - self.player_hp).max(0);
        self.player_hp += gained;
        self.stats.hp_gained += gained;
        gained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(correct: usize, bonus: bool) -> Question {
        Question {
            prompt: "q".to_string(),
            choices: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            correct_answer: correct,
            is_bonus: bonus,
        }
    }

    fn guest(tier: GuestTier) -> BattleGuest {
        BattleGuest {
            id: "007".to_string(),
            name: "Guest".to_string(),
            tier,
            max_hp: 100,
        }
    }

    fn player(level: i32, hp: i32) -> PlayerStats {
        PlayerStats {
            level,
            hp,
            max_hp: 100,
        }
    }

    fn play(session: &mut BattleSession, answers: &[usize]) -> Option<BattleOutcome> {
        let mut outcome = None;
        for answer in answers {
            session.select_answer(*answer);
            outcome = session.next_question();
        }
        outcome
    }

    #[test]
    fn four_of_five_wins_without_perfect_bonus() {
        let questions = (0..5).map(|_| question(0, false)).collect();
        let mut session = BattleSession::new(guest(GuestTier::Ranked(1)), questions, player(1, 100));
        let outcome = play(&mut session, &[0, 0, 1, 0, 0]).expect("battle ends");
        assert!(outcome.won);
        assert_eq!(outcome.stats.correct_answers, 4);
        assert_eq!(outcome.stats.wrong_answers, 1);
        assert!(!outcome.stats.perfect_battle);
        assert_eq!(outcome.stats.xp_gained, 40);
        assert_eq!(outcome.player_hp, 90);
    }

    #[test]
    fn perfect_battle_grants_bonus_xp_and_hp() {
        let questions = (0..3).map(|_| question(1, false)).collect();
        let mut session = BattleSession::new(guest(GuestTier::Ranked(1)), questions, player(1, 70));
        let outcome = play(&mut session, &[1, 1, 1]).expect("battle ends");
        assert!(outcome.won);
        assert!(outcome.stats.perfect_battle);
        assert_eq!(outcome.stats.xp_gained, 60);
        assert_eq!(outcome.stats.hp_gained, 20);
        assert_eq!(outcome.player_hp, 90);

        let questions = (0..3).map(|_| question(1, false)).collect();
        let mut full = BattleSession::new(guest(GuestTier::Ranked(1)), questions, player(1, 95));
        let outcome = play(&mut full, &[1, 1, 1]).expect("battle ends");
        assert_eq!(outcome.stats.hp_gained, 5);
        assert_eq!(outcome.player_hp, 100);
    }

    #[test]
    fn boss_battle_uses_boss_rates() {
        let questions = (0..5).map(|_| question(0, false)).collect();
        let mut session = BattleSession::new(guest(GuestTier::Boss), questions, player(9, 100));
        let feedback = session.select_answer(0).expect("first answer");
        assert_eq!(feedback.xp_earned, 30);
        assert!((session.guest_hp() - 80.0).abs() < f64::EPSILON);
        session.next_question();
        let feedback = session.select_answer(2).expect("second answer");
        assert_eq!(feedback.hp_delta, -20);
        assert_eq!(session.player_hp(), 80);

        let questions = (0..5).map(|_| question(0, false)).collect();
        let mut normal = BattleSession::new(guest(GuestTier::Unranked), questions, player(1, 100));
        normal.select_answer(2);
        assert_eq!(normal.player_hp(), 90);
    }

    #[test]
    fn bonus_question_triples_xp_and_heals() {
        let questions = vec![question(0, true), question(0, false)];
        let mut session = BattleSession::new(guest(GuestTier::Ranked(2)), questions, player(3, 50));
        let feedback = session.select_answer(0).expect("answer");
        assert!(feedback.bonus);
        assert_eq!(feedback.xp_earned, 60);
        assert_eq!(feedback.hp_delta, 10);
        assert_eq!(session.player_hp(), 60);
        assert!(session.stats().bonus_correct);
    }

    #[test]
    fn answering_twice_is_a_no_op() {
        let questions = vec![question(0, false), question(0, false)];
        let mut session = BattleSession::new(guest(GuestTier::Ranked(1)), questions, player(1, 100));
        assert!(session.select_answer(1).is_some());
        assert!(session.select_answer(0).is_none());
        assert_eq!(session.stats().wrong_answers, 1);
        assert_eq!(session.stats().correct_answers, 0);
    }

    #[test]
    fn next_question_waits_for_an_answer() {
        let questions = vec![question(0, false), question(0, false)];
        let mut session = BattleSession::new(guest(GuestTier::Ranked(1)), questions, player(1, 100));
        assert!(session.next_question().is_none());
        assert_eq!(session.question_index(), 0);
    }

    #[test]
    fn accuracy_thresholds_at_small_counts() {
        let one = vec![question(0, false)];
        let mut session = BattleSession::new(guest(GuestTier::Ranked(1)), one.clone(), player(1, 100));
        assert!(play(&mut session, &[0]).expect("ends").won);
        let mut session = BattleSession::new(guest(GuestTier::Ranked(1)), one, player(1, 100));
        assert!(!play(&mut session, &[1]).expect("ends").won);

        let two = vec![question(0, false), question(0, false)];
        let mut session = BattleSession::new(guest(GuestTier::Ranked(1)), two, player(1, 100));
        assert!(!play(&mut session, &[0, 1]).expect("ends").won);

        let three = vec![question(0, false), question(0, false), question(0, false)];
        let mut session = BattleSession::new(guest(GuestTier::Ranked(1)), three.clone(), player(1, 100));
        assert!(play(&mut session, &[0, 1, 0]).expect("ends").won);
        let mut session = BattleSession::new(guest(GuestTier::Ranked(1)), three, player(1, 100));
        assert!(!play(&mut session, &[1, 1, 0]).expect("ends").won);
    }

    #[test]
    fn penalties_floor_at_zero_and_retry_revives() {
        let questions = (0..5).map(|_| question(0, false)).collect();
        let mut session = BattleSession::new(guest(GuestTier::Boss), questions, player(1, 30));
        let outcome = play(&mut session, &[1, 1, 1, 1, 1]).expect("ends");
        assert!(!outcome.won);
        assert_eq!(outcome.player_hp, 0);
        assert!(session.end_battle(true).is_none());

        session.retry();
        assert_eq!(session.phase(), BattlePhase::AwaitingAnswer);
        assert_eq!(session.question_index(), 0);
        assert_eq!(session.stats().correct_answers, 0);
        assert_eq!(session.stats().total_questions, 5);
        assert_eq!(session.player_hp(), 100);
        assert_eq!(session.guest().id, "007");
        assert!((session.guest_hp() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn battle_without_questions_is_lost() {
        let mut session = BattleSession::new(guest(GuestTier::Ranked(1)), Vec::new(), player(1, 100));
        assert!(session.select_answer(0).is_none());
        let outcome = session.next_question().expect("ends immediately");
        assert!(!outcome.won);
        assert_eq!(outcome.stats.xp_gained, 0);
    }
}
