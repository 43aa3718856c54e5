//! Connection hub: the registry of live sessions and the only path by which
//! pushed messages reach clients.
//!
//! All membership changes and deliveries go through one actor task that
//! processes [`HubCommand`]s in order. The actor is the only writer of the
//! [`Registry`]; status queries read it through a shared lock without a round
//! trip to the actor.
//!
//! Delivery is best-effort and at-most-once. Each enqueue into a session's
//! mailbox is non-blocking; a full or closed mailbox means the session is
//! treated as dead and torn down, so one slow client never stalls a broadcast.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use parking_lot::RwLock;
use rym_core::{Envelope, SettingsPayload, UserId, UserJoinedPayload, VotePayload};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::{
    WS_BROADCAST_DROPS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_SESSIONS_TORN_DOWN_TOTAL,
};

/// One serialized frame, shared across every recipient of a broadcast.
pub type Frame = Arc<str>;

/// Sending half of a session mailbox. Only the hub holds it once registered.
pub type Mailbox = mpsc::Sender<Frame>;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate a fresh ID.
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

/// A session as handed to the hub at registration.
#[derive(Debug)]
pub struct SessionEntry {
    /// Connection ID.
    pub id: SessionId,
    /// Owning user.
    pub user_id: UserId,
    /// Display name, for logs.
    pub username: String,
    /// Outbound mailbox.
    pub mailbox: Mailbox,
}

/// Outcome of one delivery request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Sessions the frame was enqueued to.
    pub delivered: usize,
    /// Sessions torn down because their mailbox was full or closed.
    pub dropped: usize,
}

/// Registry state. Written only by the hub actor.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: HashMap<SessionId, SessionEntry>,
    by_user: HashMap<UserId, SessionId>,
}

impl Registry {
    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Whether `user` has a directly addressable session.
    pub fn is_user_connected(&self, user: UserId) -> bool {
        self.by_user.contains_key(&user)
    }

    fn insert(&mut self, entry: SessionEntry) -> bool {
        if self.sessions.contains_key(&entry.id) {
            return false;
        }
        // Last registration wins; a superseded session stays reachable by broadcast.
        let _ = self.by_user.insert(entry.user_id, entry.id);
        let _ = self.sessions.insert(entry.id, entry);
        true
    }

    fn remove(&mut self, id: SessionId) -> Option<SessionEntry> {
        let entry = self.sessions.remove(&id)?;
        if self.by_user.get(&entry.user_id) == Some(&id) {
            let _ = self.by_user.remove(&entry.user_id);
        }
        Some(entry)
    }
}

/// Commands processed by the hub actor.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a session. Replies `false` if the ID is already registered.
    Register {
        /// Session to add.
        entry: SessionEntry,
        /// Acknowledgement.
        respond_to: oneshot::Sender<bool>,
    },
    /// Remove a session and close its mailbox. Idempotent.
    Unregister {
        /// Session to remove.
        id: SessionId,
    },
    /// Enqueue a frame to every live session.
    Broadcast {
        /// Serialized envelope.
        frame: Frame,
        /// Optional delivery report.
        respond_to: Option<oneshot::Sender<DeliveryReport>>,
    },
    /// Enqueue a frame to the session mapped to a user.
    SendToUser {
        /// Recipient.
        user_id: UserId,
        /// Serialized envelope.
        frame: Frame,
        /// Optional delivery report.
        respond_to: Option<oneshot::Sender<DeliveryReport>>,
    },
}

/// Handle to the hub. Cheap to clone; the actor stops when every handle is
/// dropped or the cancellation token fires.
#[derive(Clone, Debug)]
pub struct Hub {
    commands: mpsc::Sender<HubCommand>,
    registry: Arc<RwLock<Registry>>,
}

impl Hub {
    /// Spawn the actor with a command queue of `queue` slots.
    pub fn spawn(queue: usize, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let registry = Arc::new(RwLock::new(Registry::default()));
        let actor = HubActor {
            commands: rx,
            registry: Arc::clone(&registry),
        };
        let task = tokio::spawn(actor.run(cancel));
        (
            Self {
                commands: tx,
                registry,
            },
            task,
        )
    }

    /// Register a session. Returns `false` if the hub is gone or the ID is taken.
    pub async fn register(&self, entry: SessionEntry) -> bool {
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(HubCommand::Register {
                entry,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            warn!("hub stopped, registration refused");
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Unregister a session. Safe to call more than once.
    pub async fn unregister(&self, id: SessionId) {
        if self.commands.send(HubCommand::Unregister { id }).await.is_err() {
            debug!(session_id = %id, "hub stopped before unregister");
        }
    }

    /// Deliver an envelope to every live session.
    pub async fn broadcast(&self, envelope: &Envelope) -> DeliveryReport {
        match envelope.to_json() {
            Ok(json) => self.broadcast_frame(Frame::from(json)).await,
            Err(e) => {
                warn!(kind = envelope.kind.as_str(), error = %e, "failed to serialize broadcast");
                DeliveryReport::default()
            }
        }
    }

    /// Deliver an envelope to the session mapped to `user`. No-op if none.
    pub async fn send_to_user(&self, user: UserId, envelope: &Envelope) -> DeliveryReport {
        match envelope.to_json() {
            Ok(json) => self.send_frame_to_user(user, Frame::from(json)).await,
            Err(e) => {
                warn!(kind = envelope.kind.as_str(), error = %e, "failed to serialize message");
                DeliveryReport::default()
            }
        }
    }

    /// Broadcast an already serialized frame.
    pub async fn broadcast_frame(&self, frame: Frame) -> DeliveryReport {
        let (tx, rx) = oneshot::channel();
        self.request(
            HubCommand::Broadcast {
                frame,
                respond_to: Some(tx),
            },
            rx,
        )
        .await
    }

    /// Send an already serialized frame to one user.
    pub async fn send_frame_to_user(&self, user_id: UserId, frame: Frame) -> DeliveryReport {
        let (tx, rx) = oneshot::channel();
        self.request(
            HubCommand::SendToUser {
                user_id,
                frame,
                respond_to: Some(tx),
            },
            rx,
        )
        .await
    }

    /// `new_vote` to everyone.
    pub async fn broadcast_vote(&self, payload: &VotePayload) -> DeliveryReport {
        self.broadcast_with(Envelope::new_vote(payload)).await
    }

    /// `vote_received` to the recipient only.
    pub async fn notify_vote_received(&self, payload: &VotePayload) -> DeliveryReport {
        match Envelope::vote_received(payload) {
            Ok(env) => self.send_to_user(payload.to_user_id, &env).await,
            Err(e) => {
                warn!(error = %e, "failed to build vote_received");
                DeliveryReport::default()
            }
        }
    }

    /// `settings_update` to everyone.
    pub async fn broadcast_settings(&self, payload: &SettingsPayload) -> DeliveryReport {
        let report = self.broadcast_with(Envelope::settings_update(payload)).await;
        info!(recipients = report.delivered, "broadcast settings update");
        report
    }

    /// `user_joined` to everyone.
    pub async fn broadcast_user_joined(&self, payload: &UserJoinedPayload) -> DeliveryReport {
        self.broadcast_with(Envelope::user_joined(payload)).await
    }

    /// `error` to one user.
    pub async fn send_error(&self, user: UserId, message: &str) -> DeliveryReport {
        self.send_to_user(user, &Envelope::error(message)).await
    }

    /// Live session count.
    pub fn connected_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Whether `user` has a directly addressable session.
    pub fn is_user_connected(&self, user: UserId) -> bool {
        self.registry.read().is_user_connected(user)
    }

    async fn broadcast_with(
        &self,
        envelope: Result<Envelope, serde_json::Error>,
    ) -> DeliveryReport {
        match envelope {
            Ok(env) => self.broadcast(&env).await,
            Err(e) => {
                warn!(error = %e, "failed to build broadcast");
                DeliveryReport::default()
            }
        }
    }

    async fn request(
        &self,
        command: HubCommand,
        reply: oneshot::Receiver<DeliveryReport>,
    ) -> DeliveryReport {
        if self.commands.send(command).await.is_err() {
            warn!("hub stopped, message dropped");
            return DeliveryReport::default();
        }
        reply.await.unwrap_or_default()
    }
}

struct HubActor {
    commands: mpsc::Receiver<HubCommand>,
    registry: Arc<RwLock<Registry>>,
}

impl HubActor {
    async fn run(mut self, cancel: CancellationToken) {
        info!("hub started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
            }
        }
        let closed = {
            let mut reg = self.registry.write();
            let n = reg.len();
            reg.sessions.clear();
            reg.by_user.clear();
            n
        };
        gauge!(WS_CONNECTIONS_ACTIVE).set(0.0);
        info!(closed, "hub stopped");
    }

    fn handle(&self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register { entry, respond_to } => {
                let _ = respond_to.send(self.register(entry));
            }
            HubCommand::Unregister { id } => {
                if let Some(entry) = self.registry.write().remove(id) {
                    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
                    info!(session_id = %id, user_id = %entry.user_id, username = %entry.username, "client disconnected");
                }
            }
            HubCommand::Broadcast { frame, respond_to } => {
                let report = self.broadcast(&frame);
                if let Some(tx) = respond_to {
                    let _ = tx.send(report);
                }
            }
            HubCommand::SendToUser {
                user_id,
                frame,
                respond_to,
            } => {
                let report = self.send_to_user(user_id, &frame);
                if let Some(tx) = respond_to {
                    let _ = tx.send(report);
                }
            }
        }
    }

    fn register(&self, entry: SessionEntry) -> bool {
        let (id, user_id) = (entry.id, entry.user_id);
        let username = entry.username.clone();
        if !self.registry.write().insert(entry) {
            debug!(session_id = %id, "session already registered");
            return false;
        }
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(session_id = %id, user_id = %user_id, username = %username, "client connected");
        true
    }

    fn broadcast(&self, frame: &Frame) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut dead = Vec::new();
        {
            let reg = self.registry.read();
            for (id, entry) in &reg.sessions {
                if entry.mailbox.try_send(Arc::clone(frame)).is_ok() {
                    report.delivered += 1;
                } else {
                    dead.push(*id);
                }
            }
        }
        report.dropped = self.tear_down(&dead);
        debug!(delivered = report.delivered, dropped = report.dropped, "broadcast");
        report
    }

    fn send_to_user(&self, user: UserId, frame: &Frame) -> DeliveryReport {
        let target = {
            let reg = self.registry.read();
            reg.by_user.get(&user).and_then(|id| {
                reg.sessions
                    .get(id)
                    .map(|entry| (*id, entry.mailbox.try_send(Arc::clone(frame)).is_ok()))
            })
        };
        match target {
            None => {
                debug!(user_id = %user, "no live session for user");
                DeliveryReport::default()
            }
            Some((_, true)) => DeliveryReport {
                delivered: 1,
                dropped: 0,
            },
            Some((id, false)) => DeliveryReport {
                delivered: 0,
                dropped: self.tear_down(&[id]),
            },
        }
    }

    /// Remove sessions whose mailbox rejected a frame. Dropping the entry
    /// drops the hub's sender, which closes the mailbox.
    #[allow(clippy::cast_precision_loss)]
    fn tear_down(&self, ids: &[SessionId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let mut reg = self.registry.write();
        let mut removed = 0;
        for id in ids {
            if let Some(entry) = reg.remove(*id) {
                removed += 1;
                warn!(session_id = %id, user_id = %entry.user_id, "mailbox full or closed, dropping client");
            }
        }
        drop(reg);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(removed as f64);
        counter!(WS_BROADCAST_DROPS_TOTAL).increment(removed as u64);
        counter!(WS_SESSIONS_TORN_DOWN_TOTAL).increment(removed as u64);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn entry(user: u64, capacity: usize) -> (SessionEntry, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            SessionEntry {
                id: SessionId::next(),
                user_id: UserId::new(user),
                username: format!("user{user}"),
                mailbox: tx,
            },
            rx,
        )
    }

    fn hub() -> (Hub, CancellationToken) {
        let cancel = CancellationToken::new();
        let (hub, _task) = Hub::spawn(64, cancel.clone());
        (hub, cancel)
    }

    fn frame(text: &str) -> Frame {
        Frame::from(text)
    }

    #[tokio::test]
    async fn register_and_unregister_track_count() {
        let (hub, _cancel) = hub();
        let (a, _ra) = entry(1, 4);
        let (b, _rb) = entry(2, 4);
        let a_id = a.id;

        assert!(hub.register(a).await);
        assert!(hub.register(b).await);
        assert_eq!(hub.connected_count(), 2);
        assert!(hub.is_user_connected(UserId::new(1)));

        hub.unregister(a_id).await;
        hub.unregister(a_id).await;
        // Unregister is fire-and-forget; a round trip orders it.
        let _ = hub.broadcast_frame(frame("sync")).await;
        assert_eq!(hub.connected_count(), 1);
        assert!(!hub.is_user_connected(UserId::new(1)));
        assert!(hub.is_user_connected(UserId::new(2)));
    }

    #[tokio::test]
    async fn duplicate_session_id_is_noop() {
        let (hub, _cancel) = hub();
        let (a, _ra) = entry(1, 4);
        let (tx, _rx2) = mpsc::channel(4);
        let dup = SessionEntry {
            id: a.id,
            user_id: UserId::new(1),
            username: "again".into(),
            mailbox: tx,
        };
        assert!(hub.register(a).await);
        assert!(!hub.register(dup).await);
        assert_eq!(hub.connected_count(), 1);
    }

    #[tokio::test]
    async fn unregister_closes_mailbox() {
        let (hub, _cancel) = hub();
        let (a, mut ra) = entry(1, 4);
        let id = a.id;
        assert!(hub.register(a).await);
        hub.unregister(id).await;
        assert_eq!(ra.recv().await, None);
    }

    #[tokio::test]
    async fn broadcast_reaches_everyone_in_order() {
        let (hub, _cancel) = hub();
        let (a, mut ra) = entry(1, 4);
        let (b, mut rb) = entry(2, 4);
        assert!(hub.register(a).await);
        assert!(hub.register(b).await);

        let r1 = hub.broadcast_frame(frame("one")).await;
        let r2 = hub.broadcast_frame(frame("two")).await;
        assert_eq!(r1, DeliveryReport { delivered: 2, dropped: 0 });
        assert_eq!(r2.delivered, 2);

        for rx in [&mut ra, &mut rb] {
            assert_eq!(&*rx.recv().await.unwrap(), "one");
            assert_eq!(&*rx.recv().await.unwrap(), "two");
        }
    }

    #[tokio::test]
    async fn saturated_mailbox_is_torn_down_not_awaited() {
        let (hub, _cancel) = hub();
        let (fast1, mut r1) = entry(1, 8);
        let (fast2, mut r2) = entry(2, 8);
        let (slow, mut rs) = entry(3, 1);
        for e in [fast1, fast2, slow] {
            assert!(hub.register(e).await);
        }

        // Fill the slow mailbox without draining it.
        assert_eq!(hub.broadcast_frame(frame("fill")).await.delivered, 3);
        let report = hub.broadcast_frame(frame("next")).await;

        assert_eq!(report, DeliveryReport { delivered: 2, dropped: 1 });
        assert_eq!(hub.connected_count(), 2);
        assert!(!hub.is_user_connected(UserId::new(3)));

        for rx in [&mut r1, &mut r2] {
            assert_eq!(&*rx.recv().await.unwrap(), "fill");
            assert_eq!(&*rx.recv().await.unwrap(), "next");
        }
        // The slow session keeps what it had, then sees its mailbox closed.
        assert_eq!(&*rs.recv().await.unwrap(), "fill");
        assert_eq!(rs.recv().await, None);
    }

    #[tokio::test]
    async fn send_to_user_targets_mapped_session() {
        let (hub, _cancel) = hub();
        let (a, mut ra) = entry(1, 4);
        let (b, mut rb) = entry(2, 4);
        assert!(hub.register(a).await);
        assert!(hub.register(b).await);

        let report = hub.send_frame_to_user(UserId::new(2), frame("hi")).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(&*rb.recv().await.unwrap(), "hi");
        assert_eq!(ra.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn send_to_absent_user_is_noop() {
        let (hub, _cancel) = hub();
        let report = hub.send_frame_to_user(UserId::new(42), frame("hi")).await;
        assert_eq!(report, DeliveryReport::default());
    }

    #[tokio::test]
    async fn send_to_full_user_mailbox_tears_down() {
        let (hub, _cancel) = hub();
        let (a, _ra) = entry(1, 1);
        assert!(hub.register(a).await);
        assert_eq!(hub.send_frame_to_user(UserId::new(1), frame("1")).await.delivered, 1);
        let report = hub.send_frame_to_user(UserId::new(1), frame("2")).await;
        assert_eq!(report, DeliveryReport { delivered: 0, dropped: 1 });
        assert_eq!(hub.connected_count(), 0);
    }

    #[tokio::test]
    async fn newer_session_supersedes_for_directed_send() {
        let (hub, _cancel) = hub();
        let (old, mut r_old) = entry(1, 4);
        let (new, mut r_new) = entry(1, 4);
        let old_id = old.id;
        assert!(hub.register(old).await);
        assert!(hub.register(new).await);
        assert_eq!(hub.connected_count(), 2);

        let _ = hub.send_frame_to_user(UserId::new(1), frame("direct")).await;
        assert_eq!(&*r_new.recv().await.unwrap(), "direct");
        assert_eq!(r_old.try_recv(), Err(TryRecvError::Empty));

        // The superseded session still receives broadcasts.
        assert_eq!(hub.broadcast_frame(frame("all")).await.delivered, 2);
        assert_eq!(&*r_old.recv().await.unwrap(), "all");

        // Removing the old session must not unmap the newer one.
        hub.unregister(old_id).await;
        let _ = hub.broadcast_frame(frame("sync")).await;
        assert!(hub.is_user_connected(UserId::new(1)));
    }

    #[tokio::test]
    async fn typed_senders_emit_envelopes() {
        let (hub, _cancel) = hub();
        let (a, mut ra) = entry(1, 8);
        assert!(hub.register(a).await);

        let _ = hub
            .broadcast_settings(&SettingsPayload {
                credit_interval_minutes: 5,
                credit_max: 3,
                voting_paused: true,
            })
            .await;
        let _ = hub.send_error(UserId::new(1), "boom").await;

        let settings: serde_json::Value = serde_json::from_str(&ra.recv().await.unwrap()).unwrap();
        assert_eq!(settings["type"], "settings_update");
        assert_eq!(settings["payload"]["credit_max"], 3);

        let err: serde_json::Value = serde_json::from_str(&ra.recv().await.unwrap()).unwrap();
        assert_eq!(err["type"], "error");
        assert_eq!(err["payload"]["message"], "boom");
    }

    #[tokio::test]
    async fn cancel_stops_actor_and_closes_mailboxes() {
        let cancel = CancellationToken::new();
        let (hub, task) = Hub::spawn(8, cancel.clone());
        let (a, mut ra) = entry(1, 4);
        assert!(hub.register(a).await);

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(ra.recv().await, None);
        assert_eq!(hub.connected_count(), 0);
        assert_eq!(hub.broadcast_frame(frame("late")).await, DeliveryReport::default());
        let (b, _rb) = entry(2, 4);
        assert!(!hub.register(b).await);
    }

    #[test]
    fn registry_count_matches_active_sessions() {
        let mut reg = Registry::default();
        let mut ids = Vec::new();
        let mut rxs = Vec::new();
        for user in [1, 2, 2, 3] {
            let (e, rx) = entry(user, 1);
            ids.push(e.id);
            rxs.push(rx);
            assert!(reg.insert(e));
        }
        assert_eq!(reg.len(), 4);
        assert!(reg.remove(ids[1]).is_some());
        assert!(reg.remove(ids[1]).is_none());
        assert_eq!(reg.len(), 3);
        assert!(reg.is_user_connected(UserId::new(2)));
        assert!(reg.remove(ids[2]).is_some());
        assert!(!reg.is_user_connected(UserId::new(2)));
        assert_eq!(reg.len(), 2);
    }
}
