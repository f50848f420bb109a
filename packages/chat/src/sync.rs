//! Realtime propagation: the subscription table, per-session signal queues,
//! and the driver task that turns the store's change feed into invalidation
//! signals.
//!
//! Signals carry no data. A consumer that receives one re-queries the
//! directory or the message service for the affected topic, which makes
//! duplicate and reordered signals harmless; a stale signal for a topic the
//! session already left costs nothing and any refetch it had in flight can
//! simply be dropped.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use huddle_entity::ChangeEvent;

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::repository::Repository;

/// Addressable unit of interest for a client session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A user's room directory, including unread counts
    RoomList { user_id: String },
    /// One room's messages and membership
    Room { room_id: String },
}

impl Topic {
    pub fn room_list(user_id: impl Into<String>) -> Self {
        Self::RoomList { user_id: user_id.into() }
    }

    pub fn room(room_id: impl Into<String>) -> Self {
        Self::Room { room_id: room_id.into() }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::RoomList { user_id } => write!(f, "room-list:{}", user_id),
            Topic::Room { room_id } => write!(f, "room:{}", room_id),
        }
    }
}

impl FromStr for Topic {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some(("room-list", user_id)) if !user_id.is_empty() => {
                Ok(Topic::room_list(user_id))
            }
            Some(("room", room_id)) if !room_id.is_empty() => Ok(Topic::room(room_id)),
            _ => Err(ChatError::invalid_argument(format!("malformed topic: {}", s))),
        }
    }
}

/// "This topic changed, refetch it." Nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub topic: Topic,
}

pub type SessionId = String;

struct SessionEntry {
    sender: mpsc::UnboundedSender<Invalidation>,
    topics: HashSet<Topic>,
}

#[derive(Default)]
struct SubscriptionTable {
    sessions: HashMap<SessionId, SessionEntry>,
    topics: HashMap<Topic, HashSet<SessionId>>,
}

impl SubscriptionTable {
    fn connect(&mut self, session_id: SessionId, sender: mpsc::UnboundedSender<Invalidation>) {
        self.sessions.insert(
            session_id,
            SessionEntry { sender, topics: HashSet::new() },
        );
    }

    fn subscribe(&mut self, session_id: &str, topic: Topic) -> Result<()> {
        let Some(entry) = self.sessions.get_mut(session_id) else {
            return Err(ChatError::invalid_argument("unknown session"));
        };
        entry.topics.insert(topic.clone());
        self.topics
            .entry(topic)
            .or_default()
            .insert(session_id.to_string());
        Ok(())
    }

    fn unsubscribe(&mut self, session_id: &str, topic: &Topic) -> Result<()> {
        let Some(entry) = self.sessions.get_mut(session_id) else {
            return Err(ChatError::invalid_argument("unknown session"));
        };
        entry.topics.remove(topic);
        if let Some(subscribers) = self.topics.get_mut(topic) {
            subscribers.remove(session_id);
            if subscribers.is_empty() {
                self.topics.remove(topic);
            }
        }
        Ok(())
    }

    fn remove_session(&mut self, session_id: &str) {
        let Some(entry) = self.sessions.remove(session_id) else {
            return;
        };
        for topic in entry.topics {
            if let Some(subscribers) = self.topics.get_mut(&topic) {
                subscribers.remove(session_id);
                if subscribers.is_empty() {
                    self.topics.remove(&topic);
                }
            }
        }
    }

    /// Push one signal to every subscriber of `topic`; sessions whose
    /// receiver is gone are pruned on the way.
    fn publish(&mut self, topic: &Topic) -> usize {
        let Some(subscribers) = self.topics.get(topic) else {
            return 0;
        };
        let mut delivered = 0;
        let mut dead: Vec<SessionId> = Vec::new();
        for session_id in subscribers.iter() {
            match self.sessions.get(session_id) {
                Some(entry) => {
                    let signal = Invalidation { topic: topic.clone() };
                    if entry.sender.send(signal).is_ok() {
                        delivered += 1;
                    } else {
                        dead.push(session_id.clone());
                    }
                }
                None => dead.push(session_id.clone()),
            }
        }
        for session_id in dead {
            self.remove_session(&session_id);
        }
        delivered
    }

    fn publish_all(&mut self) {
        let topics: Vec<Topic> = self.topics.keys().cloned().collect();
        for topic in topics {
            self.publish(&topic);
        }
    }

    fn room_list_topics(&self) -> Vec<Topic> {
        self.topics
            .keys()
            .filter(|t| matches!(t, Topic::RoomList { .. }))
            .cloned()
            .collect()
    }
}

/// A connected client session's end of the signal queue.
///
/// Dropping the handle disconnects the session and releases every
/// subscription it held.
pub struct SessionHandle {
    id: SessionId,
    receiver: mpsc::UnboundedReceiver<Invalidation>,
    controller: SyncController,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next invalidation signal; `None` once the controller is gone.
    pub async fn recv(&mut self) -> Option<Invalidation> {
        self.receiver.recv().await
    }

    /// Non-blocking variant for draining already-delivered signals.
    pub fn try_recv(&mut self) -> Option<Invalidation> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.controller.disconnect(&self.id);
    }
}

/// Fan-out hub between the store's change feed and connected sessions.
#[derive(Clone)]
pub struct SyncController {
    inner: Arc<Mutex<SubscriptionTable>>,
}

impl SyncController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SubscriptionTable::default())),
        }
    }

    /// Register a session and hand back its signal queue.
    pub fn connect(&self) -> SessionHandle {
        let id = Uuid::new_v4().to_string();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock_table().connect(id.clone(), sender);
        SessionHandle { id, receiver, controller: self.clone() }
    }

    pub fn subscribe(&self, session_id: &str, topic: Topic) -> Result<()> {
        self.lock_table().subscribe(session_id, topic)
    }

    /// Stop serving a topic to a session. Immediate: no store call is
    /// involved and signals already queued are simply stale.
    pub fn unsubscribe(&self, session_id: &str, topic: &Topic) -> Result<()> {
        self.lock_table().unsubscribe(session_id, topic)
    }

    pub fn disconnect(&self, session_id: &str) {
        self.lock_table().remove_session(session_id);
    }

    /// Number of sessions currently subscribed to `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.lock_table()
            .topics
            .get(topic)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Map one feed event onto topics and push signals.
    ///
    /// The room topic is exact. Room-list topics are all invalidated: the
    /// event does not say whose lists changed, membership and unread counts
    /// are list-visible, and a spurious refetch is harmless while a missed
    /// one is not.
    fn dispatch(&self, event: &ChangeEvent) {
        let mut table = self.lock_table();
        let delivered = table.publish(&Topic::room(event.room_id.clone()));
        let mut list_delivered = 0;
        for topic in table.room_list_topics() {
            list_delivered += table.publish(&topic);
        }
        debug!(
            entity = ?event.entity,
            operation = ?event.operation,
            room_id = %event.room_id,
            delivered = delivered + list_delivered,
            "dispatched invalidation"
        );
    }

    /// Signal every served topic. Used after (re)opening the change feed:
    /// anything that happened while the feed was down is invisible, so every
    /// consumer refreshes instead.
    fn invalidate_all(&self) {
        self.lock_table().publish_all();
    }

    /// Spawn the driver task that consumes the store's change feed until the
    /// returned handle is stopped or dropped.
    pub fn start(&self, repo: Arc<dyn Repository>, config: &ChatConfig) -> SyncDriver {
        let controller = self.clone();
        let resubscribe_delay = config.resubscribe_delay;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            loop {
                match repo.subscribe().await {
                    Ok(mut feed) => {
                        controller.invalidate_all();
                        loop {
                            tokio::select! {
                                changed = shutdown_rx.changed() => {
                                    if changed.is_err() || *shutdown_rx.borrow() {
                                        return;
                                    }
                                }
                                event = feed.next() => match event {
                                    Some(event) => controller.dispatch(&event),
                                    None => {
                                        warn!("change feed ended, resubscribing");
                                        break;
                                    }
                                },
                            }
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "change feed subscribe failed, retrying");
                    }
                }
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            return;
                        }
                    }
                    _ = tokio::time::sleep(resubscribe_delay) => {}
                }
            }
        });

        SyncDriver { shutdown: shutdown_tx, handle: Some(handle) }
    }

    fn lock_table(&self) -> MutexGuard<'_, SubscriptionTable> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for SyncController {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle on the background feed task; stops it on [`stop`](Self::stop) or
/// drop.
pub struct SyncDriver {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl SyncDriver {
    /// Signal shutdown and wait for the driver to wind down.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for SyncDriver {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
