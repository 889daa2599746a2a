//! Topic registry for broadcast fan-out.
//!
//! Topics are opaque strings (`sync:<scope>`); every session joined to
//! a topic receives fan-out from every other session on the same exact
//! string. Publishing snapshots the subscriber list and sends outside
//! the lock; sends to dead sessions are discarded silently.

use std::collections::HashMap;

use axum::extract::ws::Message;
use parking_lot::RwLock;
use quill_protocol::Broadcast;
use tokio::sync::mpsc::UnboundedSender;

pub type SessionId = u64;
pub type Outbound = UnboundedSender<Message>;

#[derive(Default)]
pub struct TopicRegistry {
    topics: RwLock<HashMap<String, HashMap<SessionId, Outbound>>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str, session_id: SessionId, sender: Outbound) {
        self.topics
            .write()
            .entry(topic.to_owned())
            .or_default()
            .insert(session_id, sender);
    }

    pub fn unsubscribe(&self, topic: &str, session_id: SessionId) {
        let mut topics = self.topics.write();
        if let Some(sessions) = topics.get_mut(topic) {
            sessions.remove(&session_id);
            if sessions.is_empty() {
                topics.remove(topic);
            }
        }
    }

    /// Fan out to every session on the topic except the originator.
    /// Returns how many queues accepted the message.
    pub fn publish(&self, topic: &str, origin: SessionId, broadcast: &Broadcast) -> usize {
        let recipients: Vec<Outbound> = {
            let topics = self.topics.read();
            match topics.get(topic) {
                Some(sessions) => sessions
                    .iter()
                    .filter(|(session_id, _)| **session_id != origin)
                    .map(|(_, sender)| sender.clone())
                    .collect(),
                None => Vec::new(),
            }
        };

        let text = broadcast.to_text();
        recipients
            .into_iter()
            .filter(|recipient| recipient.send(Message::Text(text.clone().into())).is_ok())
            .count()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map_or(0, |sessions| sessions.len())
    }
}
