//! Authoritative match engine
//!
//! One engine owns one match. It applies admitted player actions, advances
//! phases when their deadlines expire, and records an immutable result for
//! every closed round. Callers serialize access (one writer per match); the
//! engine itself never looks at a clock, every operation takes `now_ms`.

use super::action::{check_phase, ActionErrorCode, PlayerAction};
use super::conundrum::{Conundrum, ConundrumProvider};
use super::letters::LetterGenerator;
use super::picker;
use super::plan::{MatchPlan, RoundPlan};
use super::validation::{ConundrumValidator, WordValidationResult, WordValidator};
use super::{LetterKind, MatchId, PlayerId, RoundType, Side, LETTERS_PER_ROUND};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

const LOG_TARGET: &str = "lettermatch::engine";

/// Points for solving the conundrum.
pub const CONUNDRUM_SCORE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    AwaitingLettersPick,
    LettersSolving,
    RoundResult,
    AwaitingConundrumStart,
    ConundrumSolving,
    Completed,
    Forfeited,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Forfeited)
    }

    /// Phases in which a round action (pick, word, guess) can be legal.
    pub fn accepts_round_actions(self) -> bool {
        matches!(
            self,
            Phase::AwaitingLettersPick | Phase::LettersSolving | Phase::ConundrumSolving
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::AwaitingLettersPick => "AWAITING_LETTERS_PICK",
            Phase::LettersSolving => "LETTERS_SOLVING",
            Phase::RoundResult => "ROUND_RESULT",
            Phase::AwaitingConundrumStart => "AWAITING_CONUNDRUM_START",
            Phase::ConundrumSolving => "CONUNDRUM_SOLVING",
            Phase::Completed => "COMPLETED",
            Phase::Forfeited => "FORFEITED",
        }
    }
}

/// Phase durations in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchTimings {
    pub letters_solving_ms: u64,
    pub conundrum_solving_ms: u64,
    pub round_result_ms: u64,
    pub conundrum_lead_in_ms: u64,
    /// Minimum gap after a wrong conundrum guess
    pub guess_cooldown_ms: u64,
}

impl Default for MatchTimings {
    fn default() -> Self {
        Self {
            letters_solving_ms: 30_000,
            conundrum_solving_ms: 30_000,
            round_result_ms: 5_000,
            conundrum_lead_in_ms: 3_000,
            guess_cooldown_ms: 1_000,
        }
    }
}

/// How a letters round settles when a player has not submitted by the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingSubmissionPolicy {
    /// The missing entry is an empty, invalid submission worth 0
    #[default]
    ScoreAsEmpty,
    /// With exactly one submission in, extend the deadline once, then score as empty
    ExtendOnce { grace_ms: u64 },
}

/// Everything an engine needs besides its players.
pub struct MatchRules {
    pub generator: LetterGenerator,
    pub validator: WordValidator,
    pub conundrums: Arc<dyn ConundrumProvider>,
    pub timings: MatchTimings,
    pub missing_submission: MissingSubmissionPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub player_id: PlayerId,
    pub display_name: String,
    pub connected: bool,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub player_id: PlayerId,
    pub submitted: bool,
    pub result: WordValidationResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundDetails {
    #[serde(rename_all = "camelCase")]
    Letters {
        letters: Vec<char>,
        submissions: Vec<SubmissionRecord>,
    },
    #[serde(rename_all = "camelCase")]
    Conundrum {
        scrambled: String,
        answer: String,
        solved_by: Option<PlayerId>,
        winning_guess: Option<String>,
    },
}

/// Outcome of a closed round. Never changes after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    pub round_number: u32,
    #[serde(rename = "type")]
    pub round_type: RoundType,
    pub awarded_scores: BTreeMap<PlayerId, u32>,
    pub details: RoundDetails,
}

/// Notable things that happened while applying an action or a deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    RoundClosed(RoundResult),
    MatchFinished {
        winner: Option<PlayerId>,
        forfeited: bool,
    },
}

#[derive(Clone)]
pub struct MatchEngine {
    match_id: MatchId,
    /// Index 0 is side A
    players: [Participant; 2],
    plan: MatchPlan,
    rules: Arc<MatchRules>,
    rng: StdRng,
    current_round: RoundPlan,
    phase: Phase,
    phase_ends_at_ms: Option<u64>,
    /// Bumped on every phase entry and deadline change
    phase_seq: u64,
    letters: Vec<char>,
    picks: Vec<LetterKind>,
    submissions: HashMap<PlayerId, String>,
    deadline_extended: bool,
    conundrum: Option<Conundrum>,
    last_wrong_guess_ms: HashMap<PlayerId, u64>,
    round_results: Vec<RoundResult>,
    winner: Option<PlayerId>,
}

impl MatchEngine {
    /// Start a match at round 1. `players[0]` sits on side A.
    pub fn new(
        match_id: MatchId,
        players: [(PlayerId, String); 2],
        starting_picker: Side,
        rules: Arc<MatchRules>,
        seed: u64,
        now_ms: u64,
    ) -> Self {
        let [(a_id, a_name), (b_id, b_name)] = players;
        let plan = MatchPlan::standard(starting_picker);
        let first = *plan.first();
        let mut engine = Self {
            match_id,
            players: [
                Participant {
                    player_id: a_id,
                    display_name: a_name,
                    connected: true,
                    score: 0,
                },
                Participant {
                    player_id: b_id,
                    display_name: b_name,
                    connected: true,
                    score: 0,
                },
            ],
            plan,
            rules,
            rng: StdRng::seed_from_u64(seed),
            current_round: first,
            phase: Phase::AwaitingLettersPick,
            phase_ends_at_ms: None,
            phase_seq: 0,
            letters: Vec::with_capacity(LETTERS_PER_ROUND),
            picks: Vec::with_capacity(LETTERS_PER_ROUND),
            submissions: HashMap::new(),
            deadline_extended: false,
            conundrum: None,
            last_wrong_guess_ms: HashMap::new(),
            round_results: Vec::new(),
            winner: None,
        };
        engine.enter_round(first, now_ms);
        info!(
            target: LOG_TARGET,
            match_id = %engine.match_id,
            starting_picker = ?starting_picker,
            "match started"
        );
        engine
    }

    // === Read access ===

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn phase_ends_at_ms(&self) -> Option<u64> {
        self.phase_ends_at_ms
    }

    pub fn phase_seq(&self) -> u64 {
        self.phase_seq
    }

    pub fn round_number(&self) -> u32 {
        self.current_round.round_number
    }

    pub fn round_type(&self) -> RoundType {
        self.current_round.round_type
    }

    pub fn participants(&self) -> &[Participant; 2] {
        &self.players
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    pub fn round_results(&self) -> &[RoundResult] {
        &self.round_results
    }

    pub fn letters(&self) -> &[char] {
        &self.letters
    }

    pub fn side_of(&self, player_id: &str) -> Option<Side> {
        if self.players[0].player_id == player_id {
            Some(Side::A)
        } else if self.players[1].player_id == player_id {
            Some(Side::B)
        } else {
            None
        }
    }

    pub fn participant(&self, side: Side) -> &Participant {
        &self.players[side.index()]
    }

    /// The picker of the current letters round, while picking is open.
    pub fn picker_player_id(&self) -> Option<&str> {
        match (self.phase, self.current_round.picker) {
            (Phase::AwaitingLettersPick, Some(side)) => Some(&self.players[side.index()].player_id),
            _ => None,
        }
    }

    /// Scramble on display while the conundrum is being solved.
    pub fn scrambled(&self) -> Option<&str> {
        match self.phase {
            Phase::ConundrumSolving => self.conundrum.as_ref().map(|c| c.scrambled.as_str()),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn has_submitted(&self, player_id: &str) -> bool {
        self.submissions.contains_key(player_id)
    }

    /// True once the current conundrum round closed with a winner.
    pub fn conundrum_solved(&self) -> bool {
        if self.current_round.round_type != RoundType::Conundrum {
            return false;
        }
        self.round_results
            .last()
            .filter(|r| r.round_number == self.current_round.round_number)
            .map(|r| matches!(r.details, RoundDetails::Conundrum { solved_by: Some(_), .. }))
            .unwrap_or(false)
    }

    /// Kinds the picker may choose now; empty outside picking.
    pub fn allowed_pick_kinds(&self) -> Vec<LetterKind> {
        if self.phase != Phase::AwaitingLettersPick {
            return Vec::new();
        }
        picker::allowed_kinds_for(&self.picks).into_iter().collect()
    }

    fn deadline_passed(&self, now_ms: u64) -> bool {
        self.phase_ends_at_ms.is_some_and(|ends| now_ms >= ends)
    }

    // === Validation ===

    /// Check an action against the current state without mutating anything.
    pub fn validate(
        &self,
        player_id: &str,
        action: &PlayerAction,
        now_ms: u64,
    ) -> Result<(), ActionErrorCode> {
        let side = self
            .side_of(player_id)
            .ok_or(ActionErrorCode::NotMatchParticipant)?;

        let round_action = match action.round_action() {
            Some(round_action) => round_action,
            None => {
                return if self.is_terminal() {
                    Err(ActionErrorCode::NotInActiveMatch)
                } else {
                    Ok(())
                };
            }
        };

        check_phase(
            self.phase,
            self.current_round.round_type,
            round_action,
            self.conundrum_solved(),
        )?;

        match action {
            PlayerAction::PickLetter { kind } => {
                if self.current_round.picker != Some(side) {
                    return Err(ActionErrorCode::NotPicker);
                }
                match kind {
                    Some(kind) if picker::is_allowed(&self.picks, *kind) => Ok(()),
                    _ => Err(ActionErrorCode::PickConstraintViolation),
                }
            }
            PlayerAction::SubmitWord { .. } => {
                if self.submissions.contains_key(player_id) {
                    return Err(ActionErrorCode::DuplicateSubmission);
                }
                if self.deadline_passed(now_ms) {
                    return Err(ActionErrorCode::LateSubmission);
                }
                Ok(())
            }
            PlayerAction::SubmitConundrumGuess { .. } => {
                if self.deadline_passed(now_ms) {
                    return Err(ActionErrorCode::LateSubmission);
                }
                let cooldown = self.rules.timings.guess_cooldown_ms;
                match self.last_wrong_guess_ms.get(player_id) {
                    Some(last) if now_ms < last.saturating_add(cooldown) => {
                        Err(ActionErrorCode::RateLimited)
                    }
                    _ => Ok(()),
                }
            }
            PlayerAction::Forfeit => Ok(()),
        }
    }

    // === Mutation ===

    /// Validate and apply an action. Rejected actions leave the state untouched.
    pub fn apply(
        &mut self,
        player_id: &str,
        action: PlayerAction,
        now_ms: u64,
    ) -> Result<Vec<EngineEvent>, ActionErrorCode> {
        self.validate(player_id, &action, now_ms)?;

        let events = match action {
            PlayerAction::PickLetter { kind } => match kind {
                Some(kind) => self.pick(kind, now_ms),
                None => return Err(ActionErrorCode::PickConstraintViolation),
            },
            PlayerAction::SubmitWord { word } => self.submit_word(player_id, word, now_ms),
            PlayerAction::SubmitConundrumGuess { guess } => self.guess(player_id, guess, now_ms),
            PlayerAction::Forfeit => self.forfeit(player_id),
        };
        Ok(events)
    }

    /// Handle expiry of the deadline armed for `seq`.
    ///
    /// Stale sequence numbers, early calls and repeated calls are no-ops.
    pub fn on_deadline(&mut self, seq: u64, now_ms: u64) -> Vec<EngineEvent> {
        if self.is_terminal() || seq != self.phase_seq || !self.deadline_passed(now_ms) {
            return Vec::new();
        }

        debug!(
            target: LOG_TARGET,
            match_id = %self.match_id,
            phase = self.phase.as_str(),
            "phase deadline expired"
        );

        match self.phase {
            Phase::LettersSolving => {
                if let MissingSubmissionPolicy::ExtendOnce { grace_ms } =
                    self.rules.missing_submission
                {
                    if !self.deadline_extended && self.submissions.len() == 1 {
                        self.deadline_extended = true;
                        self.phase_ends_at_ms = Some(now_ms + grace_ms);
                        self.phase_seq += 1;
                        return Vec::new();
                    }
                }
                self.settle_letters(now_ms)
            }
            Phase::AwaitingConundrumStart => self.start_conundrum(now_ms),
            Phase::ConundrumSolving => self.close_conundrum(None, now_ms),
            Phase::RoundResult => self.advance(now_ms),
            _ => Vec::new(),
        }
    }

    /// Mark a participant (dis)connected. Returns true if anything changed.
    pub fn set_connected(&mut self, player_id: &str, connected: bool) -> bool {
        match self.side_of(player_id) {
            Some(side) if self.players[side.index()].connected != connected => {
                self.players[side.index()].connected = connected;
                true
            }
            _ => false,
        }
    }

    fn set_phase(&mut self, phase: Phase, ends_at_ms: Option<u64>) {
        self.phase = phase;
        self.phase_ends_at_ms = ends_at_ms;
        self.phase_seq += 1;
    }

    fn enter_round(&mut self, round: RoundPlan, now_ms: u64) {
        self.current_round = round;
        self.letters.clear();
        self.picks.clear();
        self.submissions.clear();
        self.deadline_extended = false;
        self.conundrum = None;
        self.last_wrong_guess_ms.clear();

        match round.round_type {
            RoundType::Letters => self.set_phase(Phase::AwaitingLettersPick, None),
            RoundType::Conundrum => {
                self.conundrum = self.rules.conundrums.random_conundrum(&mut self.rng);
                let lead_in = self.rules.timings.conundrum_lead_in_ms;
                self.set_phase(Phase::AwaitingConundrumStart, Some(now_ms + lead_in));
            }
        }
        debug!(
            target: LOG_TARGET,
            match_id = %self.match_id,
            round = round.round_number,
            "round entered"
        );
    }

    fn pick(&mut self, kind: LetterKind, now_ms: u64) -> Vec<EngineEvent> {
        let letter = self.rules.generator.draw(kind, &mut self.rng);
        self.letters.push(letter);
        self.picks.push(kind);
        // Re-arming the same phase keeps snapshots ordered for observers
        self.phase_seq += 1;

        if self.letters.len() == LETTERS_PER_ROUND {
            let solving = self.rules.timings.letters_solving_ms;
            self.set_phase(Phase::LettersSolving, Some(now_ms + solving));
        }
        Vec::new()
    }

    fn submit_word(&mut self, player_id: &str, word: String, now_ms: u64) -> Vec<EngineEvent> {
        self.submissions.insert(player_id.to_string(), word);
        if self.submissions.len() == self.players.len() {
            self.settle_letters(now_ms)
        } else {
            Vec::new()
        }
    }

    fn settle_letters(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        let mut awarded = BTreeMap::new();
        let mut records = Vec::with_capacity(2);

        for participant in self.players.iter_mut() {
            let (submitted, result) = match self.submissions.get(&participant.player_id) {
                Some(word) => (true, self.rules.validator.validate(word, &self.letters)),
                None => (false, WordValidator::missing()),
            };
            participant.score += result.score;
            awarded.insert(participant.player_id.clone(), result.score);
            records.push(SubmissionRecord {
                player_id: participant.player_id.clone(),
                submitted,
                result,
            });
        }

        let result = RoundResult {
            round_number: self.current_round.round_number,
            round_type: RoundType::Letters,
            awarded_scores: awarded,
            details: RoundDetails::Letters {
                letters: self.letters.clone(),
                submissions: records,
            },
        };
        self.close_round(result, now_ms)
    }

    fn start_conundrum(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        if self.conundrum.is_none() {
            return self.close_conundrum(None, now_ms);
        }
        let solving = self.rules.timings.conundrum_solving_ms;
        self.set_phase(Phase::ConundrumSolving, Some(now_ms + solving));
        Vec::new()
    }

    fn guess(&mut self, player_id: &str, guess: String, now_ms: u64) -> Vec<EngineEvent> {
        let correct = self
            .conundrum
            .as_ref()
            .is_some_and(|c| ConundrumValidator::is_correct(&guess, &c.answer));

        if correct {
            self.close_conundrum(Some((player_id.to_string(), guess)), now_ms)
        } else {
            self.last_wrong_guess_ms.insert(player_id.to_string(), now_ms);
            Vec::new()
        }
    }

    fn close_conundrum(
        &mut self,
        solver: Option<(PlayerId, String)>,
        now_ms: u64,
    ) -> Vec<EngineEvent> {
        let mut awarded = BTreeMap::new();
        for participant in self.players.iter_mut() {
            let points = match &solver {
                Some((id, _)) if *id == participant.player_id => CONUNDRUM_SCORE,
                _ => 0,
            };
            participant.score += points;
            awarded.insert(participant.player_id.clone(), points);
        }

        let (scrambled, answer) = self
            .conundrum
            .as_ref()
            .map(|c| (c.scrambled.clone(), c.answer.clone()))
            .unwrap_or_default();
        let (solved_by, winning_guess) = match solver {
            Some((id, guess)) => (Some(id), Some(guess)),
            None => (None, None),
        };

        let result = RoundResult {
            round_number: self.current_round.round_number,
            round_type: RoundType::Conundrum,
            awarded_scores: awarded,
            details: RoundDetails::Conundrum {
                scrambled,
                answer,
                solved_by,
                winning_guess,
            },
        };
        self.close_round(result, now_ms)
    }

    fn close_round(&mut self, result: RoundResult, now_ms: u64) -> Vec<EngineEvent> {
        info!(
            target: LOG_TARGET,
            match_id = %self.match_id,
            round = result.round_number,
            scores = ?result.awarded_scores,
            "round closed"
        );
        self.round_results.push(result.clone());
        let settle = self.rules.timings.round_result_ms;
        self.set_phase(Phase::RoundResult, Some(now_ms + settle));
        vec![EngineEvent::RoundClosed(result)]
    }

    fn advance(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        match self.plan.next_round(self.current_round.round_number).copied() {
            Some(next) => {
                self.enter_round(next, now_ms);
                Vec::new()
            }
            None => self.finish(),
        }
    }

    fn finish(&mut self) -> Vec<EngineEvent> {
        let [a, b] = &self.players;
        self.winner = if a.score > b.score {
            Some(a.player_id.clone())
        } else if b.score > a.score {
            Some(b.player_id.clone())
        } else {
            None
        };
        self.set_phase(Phase::Completed, None);
        info!(
            target: LOG_TARGET,
            match_id = %self.match_id,
            winner = ?self.winner,
            "match completed"
        );
        vec![EngineEvent::MatchFinished {
            winner: self.winner.clone(),
            forfeited: false,
        }]
    }

    fn forfeit(&mut self, player_id: &str) -> Vec<EngineEvent> {
        let Some(side) = self.side_of(player_id) else {
            return Vec::new();
        };
        self.winner = Some(self.players[side.other().index()].player_id.clone());
        self.set_phase(Phase::Forfeited, None);
        info!(
            target: LOG_TARGET,
            match_id = %self.match_id,
            forfeited_by = player_id,
            "match forfeited"
        );
        vec![EngineEvent::MatchFinished {
            winner: self.winner.clone(),
            forfeited: true,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::conundrum::FixedConundrums;
    use crate::game::dictionary::WordListDictionary;
    use crate::game::letters::WeightedLetterPool;
    use crate::game::validation::FailureKind;

    const T0: u64 = 1_000_000;

    /// Vowels always draw O and consonants always draw N.
    fn rules_with(policy: MissingSubmissionPolicy) -> Arc<MatchRules> {
        let generator = LetterGenerator::new(
            WeightedLetterPool::new(&[('O', 1)]).unwrap(),
            WeightedLetterPool::new(&[('N', 1)]).unwrap(),
        );
        let dictionary = WordListDictionary::from_lines(["no", "on", "noon", "onion"]);
        Arc::new(MatchRules {
            generator,
            validator: WordValidator::new(Arc::new(dictionary)),
            conundrums: Arc::new(FixedConundrums::new(vec![Conundrum {
                scrambled: "NWODTNUOC".to_string(),
                answer: "COUNTDOWN".to_string(),
            }])),
            timings: MatchTimings::default(),
            missing_submission: policy,
        })
    }

    fn engine() -> MatchEngine {
        engine_with(MissingSubmissionPolicy::ScoreAsEmpty)
    }

    fn engine_with(policy: MissingSubmissionPolicy) -> MatchEngine {
        MatchEngine::new(
            "m1".to_string(),
            [
                ("p1".to_string(), "Alice".to_string()),
                ("p2".to_string(), "Bob".to_string()),
            ],
            Side::A,
            rules_with(policy),
            42,
            T0,
        )
    }

    fn pick(kind: LetterKind) -> PlayerAction {
        PlayerAction::PickLetter { kind: Some(kind) }
    }

    fn word(w: &str) -> PlayerAction {
        PlayerAction::SubmitWord { word: w.to_string() }
    }

    fn guess(g: &str) -> PlayerAction {
        PlayerAction::SubmitConundrumGuess { guess: g.to_string() }
    }

    /// Picker fills the bag with 4 vowels then 5 consonants: OOOONNNNN.
    fn fill_bag(engine: &mut MatchEngine, picker: &str, now: u64) {
        for _ in 0..4 {
            engine.apply(picker, pick(LetterKind::Vowel), now).unwrap();
        }
        for _ in 0..5 {
            engine.apply(picker, pick(LetterKind::Consonant), now).unwrap();
        }
    }

    fn expire(engine: &mut MatchEngine) -> Vec<EngineEvent> {
        let at = engine.phase_ends_at_ms().unwrap();
        engine.on_deadline(engine.phase_seq(), at)
    }

    /// Play a letters round where both players submit, then settle it.
    fn play_letters_round(engine: &mut MatchEngine, p1_word: &str, p2_word: &str) {
        let picker = engine.picker_player_id().unwrap().to_string();
        fill_bag(engine, &picker, T0);
        engine.apply("p1", word(p1_word), T0).unwrap();
        engine.apply("p2", word(p2_word), T0).unwrap();
        assert_eq!(engine.phase(), Phase::RoundResult);
        expire(engine);
    }

    #[test]
    fn test_starts_awaiting_first_pick() {
        let engine = engine();
        assert_eq!(engine.phase(), Phase::AwaitingLettersPick);
        assert_eq!(engine.round_number(), 1);
        assert_eq!(engine.round_type(), RoundType::Letters);
        assert_eq!(engine.picker_player_id(), Some("p1"));
        assert_eq!(engine.phase_ends_at_ms(), None);
        assert!(engine.participants().iter().all(|p| p.connected && p.score == 0));
    }

    #[test]
    fn test_non_picker_rejected_without_mutation() {
        let mut engine = engine();
        let seq = engine.phase_seq();
        assert_eq!(
            engine.apply("p2", pick(LetterKind::Vowel), T0),
            Err(ActionErrorCode::NotPicker)
        );
        assert!(engine.letters().is_empty());
        assert_eq!(engine.phase_seq(), seq);
    }

    #[test]
    fn test_outsider_rejected() {
        let mut engine = engine();
        assert_eq!(
            engine.apply("p9", pick(LetterKind::Vowel), T0),
            Err(ActionErrorCode::NotMatchParticipant)
        );
    }

    #[test]
    fn test_missing_kind_is_constraint_violation() {
        let mut engine = engine();
        assert_eq!(
            engine.apply("p1", PlayerAction::PickLetter { kind: None }, T0),
            Err(ActionErrorCode::PickConstraintViolation)
        );
    }

    #[test]
    fn test_ninth_consonant_rejected() {
        let mut engine = engine();
        for _ in 0..8 {
            engine.apply("p1", pick(LetterKind::Consonant), T0).unwrap();
        }
        assert_eq!(engine.allowed_pick_kinds(), vec![LetterKind::Vowel]);
        assert_eq!(
            engine.apply("p1", pick(LetterKind::Consonant), T0),
            Err(ActionErrorCode::PickConstraintViolation)
        );
        engine.apply("p1", pick(LetterKind::Vowel), T0).unwrap();
        assert_eq!(engine.phase(), Phase::LettersSolving);
    }

    #[test]
    fn test_full_bag_opens_solving_with_deadline() {
        let mut engine = engine();
        fill_bag(&mut engine, "p1", T0);
        assert_eq!(engine.letters().iter().collect::<String>(), "OOOONNNNN");
        assert_eq!(engine.phase(), Phase::LettersSolving);
        assert_eq!(engine.phase_ends_at_ms(), Some(T0 + 30_000));
        assert_eq!(engine.picker_player_id(), None);
    }

    #[test]
    fn test_wrong_phase_and_round() {
        let mut engine = engine();
        assert_eq!(engine.apply("p1", word("noon"), T0), Err(ActionErrorCode::InvalidPhase));
        assert_eq!(engine.apply("p1", guess("noon"), T0), Err(ActionErrorCode::InvalidRound));
        fill_bag(&mut engine, "p1", T0);
        assert_eq!(
            engine.apply("p1", pick(LetterKind::Vowel), T0),
            Err(ActionErrorCode::InvalidPhase)
        );
    }

    #[test]
    fn test_both_submissions_close_round() {
        let mut engine = engine();
        fill_bag(&mut engine, "p1", T0);
        assert!(engine.apply("p1", word("noon"), T0 + 10).unwrap().is_empty());
        let events = engine.apply("p2", word("nono"), T0 + 20).unwrap();

        assert_eq!(events.len(), 1);
        let EngineEvent::RoundClosed(result) = &events[0] else {
            panic!("expected round close, got {:?}", events);
        };
        assert_eq!(result.awarded_scores["p1"], 4);
        assert_eq!(result.awarded_scores["p2"], 0);
        let RoundDetails::Letters { submissions, .. } = &result.details else {
            panic!("expected letters details");
        };
        assert_eq!(
            submissions[1].result.failure_kind,
            Some(FailureKind::NotInDictionary)
        );

        assert_eq!(engine.phase(), Phase::RoundResult);
        assert_eq!(engine.phase_ends_at_ms(), Some(T0 + 20 + 5_000));
        assert_eq!(engine.participant(Side::A).score, 4);
    }

    #[test]
    fn test_duplicate_and_late_submissions() {
        let mut engine = engine();
        fill_bag(&mut engine, "p1", T0);
        engine.apply("p1", word("noon"), T0).unwrap();
        assert_eq!(
            engine.apply("p1", word("on"), T0 + 1),
            Err(ActionErrorCode::DuplicateSubmission)
        );
        let deadline = engine.phase_ends_at_ms().unwrap();
        assert_eq!(
            engine.apply("p2", word("on"), deadline),
            Err(ActionErrorCode::LateSubmission)
        );
        assert!(!engine.has_submitted("p2"));
    }

    #[test]
    fn test_deadline_scores_missing_as_empty() {
        let mut engine = engine();
        fill_bag(&mut engine, "p1", T0);
        engine.apply("p2", word("onion"), T0).unwrap();
        let events = expire(&mut engine);

        let EngineEvent::RoundClosed(result) = &events[0] else {
            panic!("expected round close");
        };
        assert_eq!(result.awarded_scores["p1"], 0);
        // "onion" needs an I
        assert_eq!(result.awarded_scores["p2"], 0);
        let RoundDetails::Letters { submissions, .. } = &result.details else {
            panic!("expected letters details");
        };
        assert!(!submissions[0].submitted);
        assert_eq!(submissions[0].result.failure_kind, Some(FailureKind::Empty));
        assert_eq!(
            submissions[1].result.failure_kind,
            Some(FailureKind::NotConstructable)
        );
        assert_eq!(
            engine.apply("p1", word("noon"), T0 + 40_000),
            Err(ActionErrorCode::LateSubmission)
        );
    }

    #[test]
    fn test_extend_once_policy() {
        let mut engine = engine_with(MissingSubmissionPolicy::ExtendOnce { grace_ms: 5_000 });
        fill_bag(&mut engine, "p1", T0);
        engine.apply("p1", word("noon"), T0).unwrap();

        let first_deadline = engine.phase_ends_at_ms().unwrap();
        assert!(expire(&mut engine).is_empty());
        assert_eq!(engine.phase(), Phase::LettersSolving);
        assert_eq!(engine.phase_ends_at_ms(), Some(first_deadline + 5_000));

        engine.apply("p2", word("on"), first_deadline + 1_000).unwrap();
        assert_eq!(engine.phase(), Phase::RoundResult);
        assert_eq!(engine.participant(Side::B).score, 2);
    }

    #[test]
    fn test_extend_once_only_extends_once() {
        let mut engine = engine_with(MissingSubmissionPolicy::ExtendOnce { grace_ms: 5_000 });
        fill_bag(&mut engine, "p1", T0);
        engine.apply("p1", word("noon"), T0).unwrap();
        expire(&mut engine);
        let events = expire(&mut engine);
        assert!(matches!(events[0], EngineEvent::RoundClosed(_)));
    }

    #[test]
    fn test_stale_and_early_deadlines_are_noops() {
        let mut engine = engine();
        fill_bag(&mut engine, "p1", T0);
        let seq = engine.phase_seq();
        let deadline = engine.phase_ends_at_ms().unwrap();

        assert!(engine.on_deadline(seq, deadline - 1).is_empty());
        assert!(engine.on_deadline(seq - 1, deadline).is_empty());
        assert_eq!(engine.phase(), Phase::LettersSolving);
    }

    #[test]
    fn test_deadline_replay_is_idempotent() {
        let mut engine = engine();
        fill_bag(&mut engine, "p1", T0);
        let seq = engine.phase_seq();
        let deadline = engine.phase_ends_at_ms().unwrap();

        let first = engine.on_deadline(seq, deadline);
        assert_eq!(first.len(), 1);
        let after_once = (
            engine.phase(),
            engine.phase_seq(),
            engine.phase_ends_at_ms(),
            engine.round_results().to_vec(),
            engine.participants().clone(),
        );

        assert!(engine.on_deadline(seq, deadline).is_empty());
        assert!(engine.on_deadline(seq, deadline + 60_000).is_empty());
        let after_twice = (
            engine.phase(),
            engine.phase_seq(),
            engine.phase_ends_at_ms(),
            engine.round_results().to_vec(),
            engine.participants().clone(),
        );
        assert_eq!(after_once, after_twice);
    }

    #[test]
    fn test_round_result_advances_with_alternating_picker() {
        let mut engine = engine();
        play_letters_round(&mut engine, "noon", "on");
        assert_eq!(engine.round_number(), 2);
        assert_eq!(engine.phase(), Phase::AwaitingLettersPick);
        assert_eq!(engine.picker_player_id(), Some("p2"));
        assert!(engine.letters().is_empty());
    }

    #[test]
    fn test_full_match_with_solved_conundrum() {
        let mut engine = engine();
        play_letters_round(&mut engine, "noon", "on"); // 4 - 2
        play_letters_round(&mut engine, "on", "noon"); // 6 - 6
        play_letters_round(&mut engine, "no", "no"); // 8 - 8
        play_letters_round(&mut engine, "", "zz"); // 8 - 8

        assert_eq!(engine.round_number(), 5);
        assert_eq!(engine.round_type(), RoundType::Conundrum);
        assert_eq!(engine.phase(), Phase::AwaitingConundrumStart);
        assert_eq!(engine.picker_player_id(), None);
        assert_eq!(engine.scrambled(), None);
        assert_eq!(engine.apply("p1", guess("countdown"), T0), Err(ActionErrorCode::InvalidPhase));

        expire(&mut engine);
        assert_eq!(engine.phase(), Phase::ConundrumSolving);
        assert_eq!(engine.scrambled(), Some("NWODTNUOC"));

        let now = T0 + 100;
        assert!(engine.apply("p1", guess("downcount"), now).unwrap().is_empty());
        assert_eq!(
            engine.apply("p1", guess("countdown"), now + 500),
            Err(ActionErrorCode::RateLimited)
        );

        let events = engine.apply("p2", guess(" CountDown "), now + 600).unwrap();
        let EngineEvent::RoundClosed(result) = &events[0] else {
            panic!("expected round close");
        };
        assert_eq!(result.awarded_scores["p2"], CONUNDRUM_SCORE);
        assert_eq!(engine.phase(), Phase::RoundResult);
        assert!(engine.conundrum_solved());
        assert_eq!(
            engine.apply("p1", guess("countdown"), now + 2_000),
            Err(ActionErrorCode::AlreadySolved)
        );

        let events = expire(&mut engine);
        assert_eq!(
            events,
            vec![EngineEvent::MatchFinished {
                winner: Some("p2".to_string()),
                forfeited: false
            }]
        );
        assert_eq!(engine.phase(), Phase::Completed);
        assert_eq!(engine.winner(), Some("p2"));
        assert_eq!(engine.round_results().len(), 5);
        assert_eq!(engine.phase_ends_at_ms(), None);
    }

    #[test]
    fn test_unsolved_conundrum_and_draw() {
        let mut engine = engine();
        for _ in 0..4 {
            play_letters_round(&mut engine, "no", "on");
        }
        expire(&mut engine); // lead-in over
        let events = expire(&mut engine); // nobody solved
        let EngineEvent::RoundClosed(result) = &events[0] else {
            panic!("expected round close");
        };
        assert!(matches!(
            &result.details,
            RoundDetails::Conundrum { solved_by: None, answer, .. } if answer == "COUNTDOWN"
        ));
        assert_eq!(
            engine.apply("p1", guess("countdown"), engine.phase_ends_at_ms().unwrap() - 1),
            Err(ActionErrorCode::LateSubmission)
        );

        expire(&mut engine);
        assert_eq!(engine.phase(), Phase::Completed);
        assert_eq!(engine.winner(), None);
    }

    #[test]
    fn test_forfeit_is_terminal() {
        let mut engine = engine();
        engine.apply("p1", pick(LetterKind::Vowel), T0).unwrap();
        let events = engine.apply("p1", PlayerAction::Forfeit, T0).unwrap();
        assert_eq!(
            events,
            vec![EngineEvent::MatchFinished {
                winner: Some("p2".to_string()),
                forfeited: true
            }]
        );
        assert_eq!(engine.phase(), Phase::Forfeited);
        assert_eq!(engine.winner(), Some("p2"));

        assert_eq!(
            engine.apply("p1", pick(LetterKind::Vowel), T0),
            Err(ActionErrorCode::InvalidPhase)
        );
        assert_eq!(
            engine.apply("p2", PlayerAction::Forfeit, T0),
            Err(ActionErrorCode::NotInActiveMatch)
        );
        assert!(engine.on_deadline(engine.phase_seq(), u64::MAX).is_empty());
    }

    #[test]
    fn test_connection_flag() {
        let mut engine = engine();
        assert!(engine.set_connected("p2", false));
        assert!(!engine.set_connected("p2", false));
        assert!(!engine.participant(Side::B).connected);
        assert!(!engine.set_connected("nobody", false));
        // Disconnects do not disturb the round
        assert_eq!(engine.phase(), Phase::AwaitingLettersPick);
    }
}
