//! Server-side lobby: sessions, matchmaking and running matches
//!
//! `Lobby` is the server's `ConnectionHandler`. It owns:
//! - the session registry (identity and presence)
//! - the casual and ranked matchmaking queues
//! - one `MatchRoom` per running match, each with its own engine lock
//! - the deadline scheduler that drives phase timeouts
//!
//! Every inbound action yields exactly one of a state change (published as
//! `match:state` to both participants) or an `action:error` to the sender.

pub mod auth;
pub mod broadcast;
pub mod gateway;
pub mod matchmaking;
pub mod room;
pub mod session;
pub mod timers;

use crate::game::action::{ActionErrorCode, PlayerAction};
use crate::game::engine::{EngineEvent, MatchEngine, MatchRules};
use crate::game::{MatchId, PlayerId};
use crate::network::peer::PeerSender;
use crate::network::protocol::{
    events, ActionErrorPayload, IdentifyRequest, MatchFound, MatchmakingStatus, QueueState,
    SessionIdentity,
};
use crate::network::{ClientMessage, ConnId, ConnectionHandler, ServerMessage};
use crate::stats::{MatchParticipantRecord, MatchRecord};
use crate::storage::MatchHistoryStore;
use auth::Authenticator;
use dashmap::DashMap;
use matchmaking::{MatchmakingQueue, Pairing};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use room::MatchRoom;
use session::{PresenceStore, Session, SessionRegistry};
use std::sync::{Arc, Weak};
use timers::{unix_now_ms, DeadlineScheduler};
use tracing::{debug, info, warn};
use uuid::Uuid;

const LOG_TARGET: &str = "lettermatch::lobby";

pub struct Lobby {
    rules: Arc<MatchRules>,
    sessions: SessionRegistry,
    queue: Mutex<MatchmakingQueue>,
    matches: DashMap<MatchId, Arc<MatchRoom>>,
    /// player -> the match they are seated in
    active: DashMap<PlayerId, MatchId>,
    history: Arc<dyn MatchHistoryStore>,
    authenticator: Arc<dyn Authenticator>,
    scheduler: DeadlineScheduler,
    /// Seeds match engines and picks starting pickers
    rng: Mutex<StdRng>,
}

impl Lobby {
    pub fn new(
        rules: Arc<MatchRules>,
        history: Arc<dyn MatchHistoryStore>,
        authenticator: Arc<dyn Authenticator>,
        seed: u64,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Lobby>| {
            let weak = weak.clone();
            let scheduler = DeadlineScheduler::spawn(move |match_id, seq| {
                if let Some(lobby) = weak.upgrade() {
                    lobby.on_deadline(&match_id, seq);
                }
            });
            Self {
                rules,
                sessions: SessionRegistry::new(),
                queue: Mutex::new(MatchmakingQueue::new()),
                matches: DashMap::new(),
                active: DashMap::new(),
                history,
                authenticator,
                scheduler,
                rng: Mutex::new(StdRng::seed_from_u64(seed)),
            }
        })
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn active_match_for(&self, player_id: &str) -> Option<MatchId> {
        self.active.get(player_id).map(|m| m.clone())
    }

    pub fn room(&self, match_id: &str) -> Option<Arc<MatchRoom>> {
        self.matches.get(match_id).map(|r| r.clone())
    }

    fn active_room(&self, player_id: &str) -> Option<Arc<MatchRoom>> {
        let match_id = self.active_match_for(player_id)?;
        self.room(&match_id)
    }

    /// Queue state for one player, including the current online count.
    pub fn status_for(&self, player_id: &str) -> MatchmakingStatus {
        let online_count = self.sessions.count();
        if let Some(room) = self.active_room(player_id) {
            return MatchmakingStatus {
                state: QueueState::InMatch,
                ranked: room.ranked(),
                online_count,
                match_id: Some(room.match_id().to_string()),
            };
        }
        match self.queue.lock().queued(player_id) {
            Some(ranked) => MatchmakingStatus {
                state: QueueState::Searching,
                ranked,
                online_count,
                match_id: None,
            },
            None => MatchmakingStatus {
                state: QueueState::Idle,
                ranked: false,
                online_count,
                match_id: None,
            },
        }
    }

    fn send_status(&self, player_id: &str) {
        let status = self.status_for(player_id);
        self.sessions
            .send_to_player(player_id, &ServerMessage::MatchmakingStatus(status));
    }

    /// Presence changed: every identified session gets its own status.
    fn broadcast_statuses(&self) {
        for session in self.sessions.identified() {
            let status = self.status_for(&session.player_id);
            self.sessions
                .send_to_conn(session.conn, &ServerMessage::MatchmakingStatus(status));
        }
    }

    fn send_error(&self, conn: ConnId, action: &str, code: ActionErrorCode) {
        debug!(target: LOG_TARGET, conn, action, code = code.as_str(), "action rejected");
        self.sessions.send_to_conn(
            conn,
            &ServerMessage::ActionError(ActionErrorPayload::new(action, code)),
        );
    }

    // === Inbound events ===

    fn handle_identify(&self, conn: ConnId, request: IdentifyRequest) {
        let session = match self
            .sessions
            .identify(conn, &request, self.authenticator.as_ref())
        {
            Ok(session) => session,
            Err(code) => return self.send_error(conn, events::SESSION_IDENTIFY, code),
        };

        self.sessions.send_to_conn(
            conn,
            &ServerMessage::SessionIdentified(SessionIdentity {
                player_id: session.player_id.clone(),
                display_name: session.display_name.clone(),
                resume_token: session.resume_token.clone(),
                server_now_ms: unix_now_ms(),
            }),
        );

        if let Some(room) = self.active_room(&session.player_id) {
            let mut engine = room.lock();
            let now = unix_now_ms();
            if engine.set_connected(&session.player_id, true) {
                info!(target: LOG_TARGET, player_id = %session.player_id, match_id = room.match_id(), "player reconnected");
                let snapshot = room.publish(&engine, now);
                broadcast::fan_out(&self.sessions, &snapshot);
            } else {
                self.send_snapshot(&room, conn, now);
            }
        }

        self.broadcast_statuses();
    }

    fn handle_join(&self, conn: ConnId, session: &Session, ranked: bool) {
        if self.active.contains_key(&session.player_id) {
            return self.send_error(conn, events::QUEUE_JOIN, ActionErrorCode::AlreadyInMatch);
        }
        if ranked && !session.authenticated {
            return self.send_error(conn, events::QUEUE_JOIN, ActionErrorCode::AuthRequiredRanked);
        }

        let pairing = {
            let mut rng = self.rng.lock();
            self.queue.lock().join(&session.player_id, ranked, &mut *rng)
        };
        match pairing {
            Some(pairing) => self.start_match(pairing),
            None => {
                debug!(target: LOG_TARGET, player_id = %session.player_id, ranked, "player queued");
                self.send_status(&session.player_id);
            }
        }
    }

    fn handle_leave(&self, session: &Session) {
        if self.queue.lock().leave(&session.player_id) {
            debug!(target: LOG_TARGET, player_id = %session.player_id, "player left queue");
        }
        self.send_status(&session.player_id);
    }

    fn handle_resume(&self, conn: ConnId, session: &Session, match_id: Option<&str>) {
        match self.resolve_room(&session.player_id, match_id) {
            Ok(room) => self.send_snapshot(&room, conn, unix_now_ms()),
            Err(code) => self.send_error(conn, events::MATCH_RESUME, code),
        }
    }

    fn handle_action(
        &self,
        conn: ConnId,
        session: &Session,
        match_id: Option<&str>,
        action: PlayerAction,
    ) {
        let event = action.event_name();
        let player_id = session.player_id.as_str();

        let room = match self.resolve_room(player_id, match_id) {
            Ok(room) => room,
            Err(code) => return self.send_error(conn, event, code),
        };
        if let Err(code) = gateway::precheck(&room.view(), player_id, &action) {
            return self.send_error(conn, event, code);
        }

        let mut engine = room.lock();
        let now = unix_now_ms();
        match engine.apply(player_id, action, now) {
            Ok(events) => self.after_mutation(&room, &engine, events, now),
            Err(code) => self.send_error(conn, event, code),
        }
    }

    /// Find the match an in-match event targets.
    fn resolve_room(
        &self,
        player_id: &str,
        match_id: Option<&str>,
    ) -> Result<Arc<MatchRoom>, ActionErrorCode> {
        let room = match match_id {
            Some(id) => self.room(id).ok_or(ActionErrorCode::MatchNotFound)?,
            None => self
                .active_room(player_id)
                .ok_or(ActionErrorCode::NotInActiveMatch)?,
        };
        if !room.is_participant(player_id) {
            return Err(ActionErrorCode::NotMatchParticipant);
        }
        if room.snapshot().phase.is_terminal() {
            return Err(ActionErrorCode::NotInActiveMatch);
        }
        Ok(room)
    }

    /// Latest snapshot stamped with the current server time, to one connection.
    fn send_snapshot(&self, room: &MatchRoom, conn: ConnId, now_ms: u64) {
        let mut snapshot = (*room.snapshot()).clone();
        snapshot.server_now_ms = now_ms;
        self.sessions
            .send_to_conn(conn, &ServerMessage::MatchState(snapshot));
    }

    // === Matches ===

    fn start_match(&self, pairing: Pairing) {
        let a = self.sessions.session_for_player(&pairing.player_a);
        let b = self.sessions.session_for_player(&pairing.player_b);
        let (a, b) = match (a, b) {
            (Some(a), Some(b)) => (a, b),
            (a, b) => {
                // One side vanished between queueing and pairing
                for survivor in [a, b].into_iter().flatten() {
                    self.queue
                        .lock()
                        .requeue_front(&survivor.player_id, pairing.ranked);
                    self.send_status(&survivor.player_id);
                }
                return;
            }
        };

        let match_id = Uuid::new_v4().to_string();
        let seed = self.rng.lock().random::<u64>();
        let now = unix_now_ms();
        let engine = MatchEngine::new(
            match_id.clone(),
            [
                (a.player_id.clone(), a.display_name.clone()),
                (b.player_id.clone(), b.display_name.clone()),
            ],
            pairing.starting_picker,
            self.rules.clone(),
            seed,
            now,
        );
        let room = Arc::new(MatchRoom::new(engine, pairing.ranked, now));

        self.matches.insert(match_id.clone(), room.clone());
        self.active.insert(a.player_id.clone(), match_id.clone());
        self.active.insert(b.player_id.clone(), match_id.clone());
        info!(
            target: LOG_TARGET,
            %match_id,
            player_a = %a.player_id,
            player_b = %b.player_id,
            ranked = pairing.ranked,
            "match created"
        );

        for (me, opponent) in [(&a, &b), (&b, &a)] {
            self.sessions.send_to_player(
                &me.player_id,
                &ServerMessage::MatchFound(MatchFound {
                    match_id: match_id.clone(),
                    ranked: pairing.ranked,
                    opponent_player_id: opponent.player_id.clone(),
                    opponent_display_name: opponent.display_name.clone(),
                }),
            );
            self.send_status(&me.player_id);
        }

        let engine = room.lock();
        self.after_mutation(&room, &engine, Vec::new(), now);
    }

    /// Record, publish and re-arm after the engine changed. Runs with the
    /// engine lock held.
    fn after_mutation(
        &self,
        room: &MatchRoom,
        engine: &MatchEngine,
        events: Vec<EngineEvent>,
        now_ms: u64,
    ) {
        for event in &events {
            self.record(room, engine, event, now_ms);
        }

        let snapshot = room.publish(engine, now_ms);
        broadcast::fan_out(&self.sessions, &snapshot);

        if engine.is_terminal() {
            self.scheduler.cancel(room.match_id());
            self.close_room(room);
            return;
        }
        match engine.phase_ends_at_ms() {
            Some(at) => self.scheduler.arm(room.match_id(), engine.phase_seq(), at),
            None => self.scheduler.cancel(room.match_id()),
        }
    }

    fn record(&self, room: &MatchRoom, engine: &MatchEngine, event: &EngineEvent, now_ms: u64) {
        let result = match event {
            EngineEvent::RoundClosed(result) => {
                self.history.record_round_result(room.match_id(), result)
            }
            EngineEvent::MatchFinished { winner, forfeited } => {
                let record = MatchRecord {
                    match_id: room.match_id().to_string(),
                    ranked: room.ranked(),
                    players: engine
                        .participants()
                        .iter()
                        .map(|p| MatchParticipantRecord {
                            player_id: p.player_id.clone(),
                            display_name: p.display_name.clone(),
                            score: p.score,
                        })
                        .collect(),
                    winner_player_id: winner.clone(),
                    forfeited: *forfeited,
                    finished_at_ms: now_ms,
                };
                self.history.record_match_result(&record)
            }
        };
        if let Err(err) = result {
            warn!(target: LOG_TARGET, match_id = room.match_id(), "failed to record history: {err}");
        }
    }

    fn close_room(&self, room: &MatchRoom) {
        self.matches.remove(room.match_id());
        for player_id in room.players() {
            self.active
                .remove_if(player_id, |_, match_id| match_id == room.match_id());
            self.send_status(player_id);
        }
        info!(target: LOG_TARGET, match_id = room.match_id(), "match closed");
    }

    /// Scheduler callback: the deadline armed for `seq` expired.
    fn on_deadline(&self, match_id: &str, seq: u64) {
        self.handle_deadline(match_id, seq, unix_now_ms());
    }

    fn handle_deadline(&self, match_id: &str, seq: u64, now_ms: u64) {
        let Some(room) = self.room(match_id) else {
            return;
        };
        let mut engine = room.lock();
        let before = engine.phase_seq();
        let events = engine.on_deadline(seq, now_ms);
        if engine.phase_seq() != before || !events.is_empty() {
            self.after_mutation(&room, &engine, events, now_ms);
            return;
        }
        // The scheduler has already dropped this entry; a firing ahead of the
        // engine's clock must not lose the deadline.
        if seq == engine.phase_seq() && !engine.is_terminal() {
            if let Some(at) = engine.phase_ends_at_ms() {
                debug!(target: LOG_TARGET, match_id, seq, at, now_ms, "deadline fired early, re-arming");
                self.scheduler.arm(match_id, seq, at);
            }
        }
    }
}

impl ConnectionHandler for Lobby {
    fn on_connect(&self, conn: ConnId, sender: PeerSender) {
        debug!(target: LOG_TARGET, conn, addr = %sender.addr(), "connection opened");
        self.sessions.connect(conn, sender);
    }

    fn on_message(&self, conn: ConnId, message: ClientMessage) {
        let event = message.event_name();
        let session = match message {
            ClientMessage::Identify(request) => return self.handle_identify(conn, request),
            _ => match self.sessions.session(conn) {
                Some(session) => session,
                None => return self.send_error(conn, event, ActionErrorCode::UnknownPlayer),
            },
        };

        match message {
            ClientMessage::Identify(_) => {}
            ClientMessage::JoinQueue { ranked } => self.handle_join(conn, &session, ranked),
            ClientMessage::LeaveQueue => self.handle_leave(&session),
            ClientMessage::Resume { match_id } => {
                self.handle_resume(conn, &session, match_id.as_deref())
            }
            ClientMessage::Action { match_id, action } => {
                self.handle_action(conn, &session, match_id.as_deref(), action)
            }
        }
    }

    fn on_disconnect(&self, conn: ConnId) {
        let Some(session) = self.sessions.disconnect(conn) else {
            debug!(target: LOG_TARGET, conn, "connection closed");
            return;
        };
        info!(target: LOG_TARGET, player_id = %session.player_id, "player disconnected");
        self.queue.lock().leave(&session.player_id);

        if let Some(room) = self.active_room(&session.player_id) {
            let mut engine = room.lock();
            if engine.set_connected(&session.player_id, false) {
                let snapshot = room.publish(&engine, unix_now_ms());
                broadcast::fan_out(&self.sessions, &snapshot);
            }
        }

        self.broadcast_statuses();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::game::conundrum::{Conundrum, FixedConundrums};
    use crate::game::dictionary::WordListDictionary;
    use crate::game::engine::{MatchTimings, MissingSubmissionPolicy, Phase};
    use crate::game::letters::{LetterGenerator, WeightedLetterPool};
    use crate::game::validation::WordValidator;
    use crate::game::LetterKind;
    use crate::lobby::auth::{DenyAll, StaticTokens};
    use crate::network::protocol::MatchStatePayload;
    use crate::network::{Client, Server};
    use crate::storage::MemoryHistoryStore;
    use std::time::{Duration, Instant};

    /// Vowels always draw O, consonants always draw N.
    pub(crate) fn rules_with_timings(timings: MatchTimings) -> Arc<MatchRules> {
        let generator = LetterGenerator::new(
            WeightedLetterPool::new(&[('O', 1)]).unwrap(),
            WeightedLetterPool::new(&[('N', 1)]).unwrap(),
        );
        rules_with(generator, timings)
    }

    pub(crate) fn rules_with(generator: LetterGenerator, timings: MatchTimings) -> Arc<MatchRules> {
        let dictionary = WordListDictionary::from_lines(["no", "on", "noon", "onion"]);
        Arc::new(MatchRules {
            generator,
            validator: WordValidator::new(Arc::new(dictionary)),
            conundrums: Arc::new(FixedConundrums::new(vec![Conundrum {
                scrambled: "NWODTNUOC".to_string(),
                answer: "COUNTDOWN".to_string(),
            }])),
            timings,
            missing_submission: MissingSubmissionPolicy::ScoreAsEmpty,
        })
    }

    pub(crate) fn test_rules() -> Arc<MatchRules> {
        rules_with_timings(MatchTimings::default())
    }

    fn fast_timings() -> MatchTimings {
        MatchTimings {
            letters_solving_ms: 1_500,
            conundrum_solving_ms: 1_500,
            round_result_ms: 50,
            conundrum_lead_in_ms: 50,
            guess_cooldown_ms: 100,
        }
    }

    struct Harness {
        lobby: Arc<Lobby>,
        history: Arc<MemoryHistoryStore>,
        server: Server,
    }

    fn harness(timings: MatchTimings) -> Harness {
        let history = Arc::new(MemoryHistoryStore::new());
        let lobby = Lobby::new(
            rules_with_timings(timings),
            history.clone(),
            Arc::new(StaticTokens::new(["ranked-token"])),
            42,
        );
        let server = Server::bind("127.0.0.1:0", lobby.clone()).unwrap();
        Harness {
            lobby,
            history,
            server,
        }
    }

    fn connect(h: &Harness) -> Client {
        Client::connect_addr(h.server.addr()).unwrap()
    }

    /// Wait for the first message matching `pred`, skipping others.
    fn wait_for<F>(client: &mut Client, mut pred: F) -> ServerMessage
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(msg) = client.recv_timeout(Duration::from_millis(50)) {
                if pred(&msg) {
                    return msg;
                }
            }
        }
        panic!("timed out waiting for message");
    }

    fn wait_state<F>(client: &mut Client, mut pred: F) -> MatchStatePayload
    where
        F: FnMut(&MatchStatePayload) -> bool,
    {
        match wait_for(client, |m| matches!(m, ServerMessage::MatchState(s) if pred(s))) {
            ServerMessage::MatchState(state) => state,
            _ => unreachable!(),
        }
    }

    fn wait_error(client: &mut Client) -> ActionErrorPayload {
        match wait_for(client, |m| matches!(m, ServerMessage::ActionError(_))) {
            ServerMessage::ActionError(err) => err,
            _ => unreachable!(),
        }
    }

    fn identify(client: &mut Client, name: &str, token: Option<&str>) -> SessionIdentity {
        client.identify(name, None, None, token.map(str::to_string)).unwrap();
        match wait_for(client, |m| matches!(m, ServerMessage::SessionIdentified(_))) {
            ServerMessage::SessionIdentified(identity) => identity,
            _ => unreachable!(),
        }
    }

    /// Two identified clients paired into a casual match.
    fn paired(h: &Harness) -> (Client, SessionIdentity, Client, SessionIdentity, MatchStatePayload) {
        let mut c1 = connect(h);
        let mut c2 = connect(h);
        let id1 = identify(&mut c1, "Ada", None);
        let id2 = identify(&mut c2, "Bea", None);
        c1.join_queue(false).unwrap();
        wait_for(&mut c1, |m| {
            matches!(m, ServerMessage::MatchmakingStatus(s) if s.state == QueueState::Searching)
        });
        c2.join_queue(false).unwrap();
        wait_for(&mut c1, |m| matches!(m, ServerMessage::MatchFound(_)));
        let state = wait_state(&mut c1, |_| true);
        wait_state(&mut c2, |_| true);
        (c1, id1, c2, id2, state)
    }

    fn picker_first(
        c1: Client,
        id1: SessionIdentity,
        c2: Client,
        id2: SessionIdentity,
        state: &MatchStatePayload,
    ) -> (Client, Client, SessionIdentity, SessionIdentity) {
        if state.picker_player_id.as_deref() == Some(id1.player_id.as_str()) {
            (c1, c2, id1, id2)
        } else {
            (c2, c1, id2, id1)
        }
    }

    #[test]
    fn test_unidentified_actions_rejected() {
        let h = harness(fast_timings());
        let mut client = connect(&h);
        client.join_queue(false).unwrap();
        let err = wait_error(&mut client);
        assert_eq!(err.action, events::QUEUE_JOIN);
        assert_eq!(err.code, "UNKNOWN_PLAYER");
    }

    #[test]
    fn test_identify_errors() {
        let h = harness(fast_timings());
        let mut c1 = connect(&h);
        let mut c2 = connect(&h);
        identify(&mut c1, "Ada", None);

        c2.identify("ada", None, None, None).unwrap();
        assert_eq!(wait_error(&mut c2).code, "DISPLAY_NAME_TAKEN");
        c2.identify("no!", None, None, None).unwrap();
        assert_eq!(wait_error(&mut c2).code, "INVALID_DISPLAY_NAME");
    }

    #[test]
    fn test_presence_in_status() {
        let h = harness(fast_timings());
        let mut c1 = connect(&h);
        identify(&mut c1, "Ada", None);
        let mut c2 = connect(&h);
        identify(&mut c2, "Bea", None);
        wait_for(&mut c1, |m| {
            matches!(m, ServerMessage::MatchmakingStatus(s) if s.online_count == 2 && s.state == QueueState::Idle)
        });
        assert_eq!(h.lobby.sessions().count(), 2);
    }

    #[test]
    fn test_ranked_requires_auth() {
        let h = harness(fast_timings());
        let mut guest = connect(&h);
        identify(&mut guest, "Guest", None);
        guest.join_queue(true).unwrap();
        assert_eq!(wait_error(&mut guest).code, "AUTH_REQUIRED_RANKED");

        let mut member = connect(&h);
        identify(&mut member, "Member", Some("ranked-token"));
        member.join_queue(true).unwrap();
        wait_for(&mut member, |m| {
            matches!(m, ServerMessage::MatchmakingStatus(s) if s.state == QueueState::Searching && s.ranked)
        });
    }

    #[test]
    fn test_pairing_and_initial_snapshot() {
        let h = harness(fast_timings());
        let (mut c1, id1, mut c2, id2, state) = paired(&h);
        assert_eq!(state.phase, Phase::AwaitingLettersPick);
        assert_eq!(state.round_number, 1);
        assert_eq!(state.players.len(), 2);
        assert!(state.picker_player_id.is_some());
        assert_eq!(h.lobby.match_count(), 1);
        assert_eq!(h.lobby.active_match_for(&id1.player_id), Some(state.match_id.clone()));
        assert_eq!(h.lobby.active_match_for(&id2.player_id), Some(state.match_id.clone()));

        // Already seated
        c2.join_queue(false).unwrap();
        assert_eq!(wait_error(&mut c2).code, "ALREADY_IN_MATCH");

        // Unknown match id
        c1.resume(Some("nope".to_string())).unwrap();
        assert_eq!(wait_error(&mut c1).code, "MATCH_NOT_FOUND");
    }

    #[test]
    fn test_outsider_cannot_act() {
        let h = harness(fast_timings());
        let (_c1, _id1, _c2, _id2, state) = paired(&h);
        let mut outsider = connect(&h);
        identify(&mut outsider, "Cy", None);
        outsider.forfeit(Some(state.match_id.clone())).unwrap();
        assert_eq!(wait_error(&mut outsider).code, "NOT_MATCH_PARTICIPANT");
        outsider.forfeit(None).unwrap();
        assert_eq!(wait_error(&mut outsider).code, "NOT_IN_ACTIVE_MATCH");
    }

    #[test]
    fn test_pick_flow_and_errors() {
        let h = harness(fast_timings());
        let (c1, id1, c2, id2, state) = paired(&h);
        let (mut picker, mut other, _picker_id, _other_id) = picker_first(c1, id1, c2, id2, &state);

        other.pick_letter(None, LetterKind::Vowel).unwrap();
        let err = wait_error(&mut other);
        assert_eq!(err.code, "NOT_PICKER");
        assert_eq!(err.action, events::ROUND_PICK_LETTER);

        other.submit_word(None, "NO").unwrap();
        assert_eq!(wait_error(&mut other).code, "INVALID_PHASE");

        picker.pick_letter(None, LetterKind::Vowel).unwrap();
        let next = wait_state(&mut other, |s| s.letters.len() == 1);
        assert_eq!(next.letters, vec!['O']);
    }

    #[test]
    fn test_full_letters_round_scores_and_records() {
        let h = harness(fast_timings());
        let (c1, id1, c2, id2, state) = paired(&h);
        let (mut picker, mut other, picker_id, other_id) = picker_first(c1, id1, c2, id2, &state);

        for kind in [
            LetterKind::Vowel,
            LetterKind::Consonant,
            LetterKind::Vowel,
            LetterKind::Consonant,
            LetterKind::Vowel,
            LetterKind::Consonant,
            LetterKind::Vowel,
            LetterKind::Consonant,
            LetterKind::Vowel,
        ] {
            picker.pick_letter(None, kind).unwrap();
        }
        let solving = wait_state(&mut other, |s| s.phase == Phase::LettersSolving);
        assert!(solving.phase_ends_at_ms.is_some());

        picker.submit_word(None, "noon").unwrap();
        picker.submit_word(None, "on").unwrap();
        assert_eq!(wait_error(&mut picker).code, "DUPLICATE_SUBMISSION");
        other.submit_word(None, "no").unwrap();

        let result = wait_state(&mut other, |s| s.phase == Phase::RoundResult);
        let round = &result.round_results[0];
        assert_eq!(round.awarded_scores[&picker_id.player_id], 4);
        assert_eq!(round.awarded_scores[&other_id.player_id], 2);

        other.submit_word(None, "on").unwrap();
        assert_eq!(wait_error(&mut other).code, "LATE_SUBMISSION");

        // Round 2 starts on its own once the result has been shown
        let next = wait_state(&mut picker, |s| s.round_number == 2);
        assert_eq!(next.phase, Phase::AwaitingLettersPick);
        assert_eq!(next.picker_player_id.as_deref(), Some(other_id.player_id.as_str()));
        assert_eq!(h.history.rounds_for(&state.match_id).len(), 1);
    }

    #[test]
    fn test_letters_deadline_scores_missing_as_empty() {
        let h = harness(fast_timings());
        let (c1, id1, c2, id2, state) = paired(&h);
        let (mut picker, mut other, picker_id, other_id) = picker_first(c1, id1, c2, id2, &state);
        for _ in 0..4 {
            picker.pick_letter(None, LetterKind::Vowel).unwrap();
            picker.pick_letter(None, LetterKind::Consonant).unwrap();
        }
        picker.pick_letter(None, LetterKind::Vowel).unwrap();
        wait_state(&mut picker, |s| s.phase == Phase::LettersSolving);
        picker.submit_word(None, "noon").unwrap();

        let result = wait_state(&mut other, |s| s.phase == Phase::RoundResult);
        assert_eq!(result.round_results[0].awarded_scores[&picker_id.player_id], 4);
        assert_eq!(result.round_results[0].awarded_scores[&other_id.player_id], 0);
    }

    #[test]
    fn test_early_deadline_firing_is_rearmed() {
        let h = harness(fast_timings());
        let (c1, id1, c2, id2, state) = paired(&h);
        let (mut picker, mut other, _picker_id, _other_id) = picker_first(c1, id1, c2, id2, &state);
        for _ in 0..4 {
            picker.pick_letter(None, LetterKind::Vowel).unwrap();
            picker.pick_letter(None, LetterKind::Consonant).unwrap();
        }
        picker.pick_letter(None, LetterKind::Vowel).unwrap();
        let solving = wait_state(&mut other, |s| s.phase == Phase::LettersSolving);
        let ends_at = solving.phase_ends_at_ms.unwrap();

        let room = h.lobby.room(&state.match_id).unwrap();
        let seq = room.lock().phase_seq();
        // Drop the pending entry the way a firing does, then fire ahead of the engine
        h.lobby.scheduler.cancel(&state.match_id);
        h.lobby.handle_deadline(&state.match_id, seq, ends_at - 1_000);
        assert_eq!(room.snapshot().phase, Phase::LettersSolving);

        let result = wait_state(&mut other, |s| s.phase == Phase::RoundResult);
        assert_eq!(result.round_results.len(), 1);
    }

    #[test]
    fn test_forfeit_ends_match_and_records() {
        let h = harness(fast_timings());
        let (mut c1, id1, mut c2, id2, state) = paired(&h);
        c1.forfeit(Some(state.match_id.clone())).unwrap();

        let end = wait_state(&mut c2, |s| s.phase == Phase::Forfeited);
        assert_eq!(end.winner_player_id.as_deref(), Some(id2.player_id.as_str()));
        wait_for(&mut c2, |m| {
            matches!(m, ServerMessage::MatchmakingStatus(s) if s.state == QueueState::Idle)
        });
        assert_eq!(h.lobby.match_count(), 0);
        assert_eq!(h.lobby.active_match_for(&id1.player_id), None);

        let records = h.history.matches();
        assert_eq!(records.len(), 1);
        assert!(records[0].forfeited);
        assert_eq!(records[0].winner_player_id.as_deref(), Some(id2.player_id.as_str()));

        // Finished matches no longer accept actions
        c1.forfeit(Some(state.match_id.clone())).unwrap();
        assert_eq!(wait_error(&mut c1).code, "MATCH_NOT_FOUND");
    }

    #[test]
    fn test_disconnect_and_resume() {
        let h = harness(fast_timings());
        let (mut c1, id1, mut c2, _id2, state) = paired(&h);
        c1.close();
        let seen = wait_state(&mut c2, |s| s.players.iter().any(|p| !p.connected));
        assert_eq!(seen.phase, state.phase);
        drop(c1);

        let mut back = connect(&h);
        back.identify(
            "Ada",
            Some(id1.player_id.clone()),
            Some(id1.resume_token.clone()),
            None,
        )
        .unwrap();
        let resumed = wait_state(&mut back, |s| s.players.iter().all(|p| p.connected));
        assert_eq!(resumed.match_id, state.match_id);

        back.resume(None).unwrap();
        let fresh = wait_state(&mut back, |_| true);
        assert_eq!(fresh.match_id, state.match_id);
        assert!(fresh.server_now_ms >= resumed.server_now_ms);
    }

    #[test]
    fn test_public_player_id_cannot_hijack_seat() {
        let h = harness(fast_timings());
        let (c1, id1, mut c2, id2, state) = paired(&h);

        // Player ids are in every snapshot; the resume token is not
        let mut intruder = connect(&h);
        intruder
            .identify("Mallory", Some(id1.player_id.clone()), None, None)
            .unwrap();
        let err = wait_error(&mut intruder);
        assert_eq!(err.action, events::SESSION_IDENTIFY);
        assert_eq!(err.code, "UNKNOWN_PLAYER");

        intruder.forfeit(Some(state.match_id.clone())).unwrap();
        assert_eq!(wait_error(&mut intruder).code, "UNKNOWN_PLAYER");
        assert_eq!(h.lobby.active_match_for(&id1.player_id), Some(state.match_id.clone()));

        // The real player still owns the seat
        c1.forfeit(None).unwrap();
        let done = wait_state(&mut c2, |s| s.phase == Phase::Forfeited);
        assert_eq!(done.winner_player_id.as_deref(), Some(id2.player_id.as_str()));
    }

    #[test]
    fn test_leave_queue() {
        let h = harness(fast_timings());
        let mut client = connect(&h);
        identify(&mut client, "Ada", None);
        client.join_queue(false).unwrap();
        wait_for(&mut client, |m| {
            matches!(m, ServerMessage::MatchmakingStatus(s) if s.state == QueueState::Searching)
        });
        client.leave_queue().unwrap();
        wait_for(&mut client, |m| {
            matches!(m, ServerMessage::MatchmakingStatus(s) if s.state == QueueState::Idle)
        });
    }

    #[test]
    fn test_deny_all_lobby() {
        let lobby = Lobby::new(test_rules(), Arc::new(MemoryHistoryStore::new()), Arc::new(DenyAll), 1);
        assert_eq!(lobby.status_for("nobody").state, QueueState::Idle);
        assert_eq!(lobby.match_count(), 0);
    }
}
