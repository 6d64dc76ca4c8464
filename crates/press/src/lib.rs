//! Bilateral press: private two-party channels between powers.
//!
//! The transport (storage, delivery, any web surface) is an external
//! collaborator behind [`PressApi`]; [`InMemoryPress`] is the reference
//! implementation used for local games and tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use backchannel_game::{PhaseId, Power};

/// Canonical channel id for a pair of powers: `bilateral:POWER1:POWER2`
/// with POWER1 < POWER2 lexicographically.
pub fn channel_id(a: Power, b: Power) -> String {
    let (first, second) = if a.name() <= b.name() { (a, b) } else { (b, a) };
    format!("bilateral:{first}:{second}")
}

/// The other participant of a bilateral channel, from `me`'s point of view.
pub fn counterparty(channel: &str, me: Power) -> Option<Power> {
    let mut parts = channel.strip_prefix("bilateral:")?.splitn(2, ':');
    let a: Power = parts.next()?.parse().ok()?;
    let b: Power = parts.next()?.parse().ok()?;
    if a == me {
        Some(b)
    } else if b == me {
        Some(a)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressMessage {
    pub id: Uuid,
    pub from: Power,
    pub to: Power,
    pub phase: PhaseId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl PressMessage {
    pub fn channel(&self) -> String {
        channel_id(self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub id: String,
    pub counterparty: Power,
    pub unread_count: usize,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Inbox view for one power: per-channel summaries plus the most recent
/// messages across all channels (capped at [`RECENT_MESSAGE_LIMIT`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inbox {
    pub channels: Vec<ChannelSummary>,
    pub recent_messages: Vec<PressMessage>,
}

pub const RECENT_MESSAGE_LIMIT: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum PressError {
    #[error("cannot message self: {0}")]
    SelfMessage(Power),
}

#[async_trait]
pub trait PressApi: Send + Sync {
    /// Create and deliver a bilateral message.
    async fn send_to(
        &self,
        from: Power,
        to: Power,
        phase: PhaseId,
        content: &str,
    ) -> Result<PressMessage, PressError>;

    /// Read-only inbox snapshot; does not change read state.
    async fn inbox(&self, power: Power) -> Inbox;

    /// Return all unread messages addressed to `power` and mark them read.
    async fn drain_unread(&self, power: Power) -> Vec<PressMessage>;

    /// All messages sent during a phase, for reconciliation.
    async fn messages_for_phase(&self, phase: PhaseId) -> Vec<PressMessage>;
}

// ── In-memory reference implementation ───────────────────────────────────────

#[derive(Debug, Default)]
struct PressState {
    messages: Vec<PressMessage>,
    /// Ids already read by the addressee.
    read: std::collections::HashSet<Uuid>,
}

/// Reference [`PressApi`] backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryPress {
    state: RwLock<PressState>,
}

impl InMemoryPress {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PressApi for InMemoryPress {
    async fn send_to(
        &self,
        from: Power,
        to: Power,
        phase: PhaseId,
        content: &str,
    ) -> Result<PressMessage, PressError> {
        if from == to {
            return Err(PressError::SelfMessage(from));
        }
        let message = PressMessage {
            id: Uuid::new_v4(),
            from,
            to,
            phase,
            content: content.to_string(),
            sent_at: Utc::now(),
        };
        self.state.write().await.messages.push(message.clone());
        Ok(message)
    }

    async fn inbox(&self, power: Power) -> Inbox {
        let state = self.state.read().await;
        let mut channels: BTreeMap<String, ChannelSummary> = BTreeMap::new();

        for msg in state.messages.iter().filter(|m| m.from == power || m.to == power) {
            let id = msg.channel();
            let other = if msg.from == power { msg.to } else { msg.from };
            let entry = channels.entry(id.clone()).or_insert_with(|| ChannelSummary {
                id,
                counterparty: other,
                unread_count: 0,
                last_message_at: None,
            });
            if msg.to == power && !state.read.contains(&msg.id) {
                entry.unread_count += 1;
            }
            entry.last_message_at = Some(match entry.last_message_at {
                Some(prev) => prev.max(msg.sent_at),
                None => msg.sent_at,
            });
        }

        let mut recent: Vec<PressMessage> = state
            .messages
            .iter()
            .filter(|m| m.from == power || m.to == power)
            .cloned()
            .collect();
        recent.sort_by_key(|m| m.sent_at);
        if recent.len() > RECENT_MESSAGE_LIMIT {
            recent.drain(..recent.len() - RECENT_MESSAGE_LIMIT);
        }

        Inbox { channels: channels.into_values().collect(), recent_messages: recent }
    }

    async fn drain_unread(&self, power: Power) -> Vec<PressMessage> {
        let mut state = self.state.write().await;
        let unread: Vec<PressMessage> = state
            .messages
            .iter()
            .filter(|m| m.to == power && !state.read.contains(&m.id))
            .cloned()
            .collect();
        for msg in &unread {
            state.read.insert(msg.id);
        }
        unread
    }

    async fn messages_for_phase(&self, phase: PhaseId) -> Vec<PressMessage> {
        self.state
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.phase == phase)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backchannel_game::{PhaseKind, Season};

    fn phase() -> PhaseId {
        PhaseId::new(1901, Season::Spring, PhaseKind::Diplomacy)
    }

    #[test]
    fn channel_id_orders_lexicographically() {
        assert_eq!(channel_id(Power::France, Power::England), "bilateral:ENGLAND:FRANCE");
        assert_eq!(channel_id(Power::England, Power::France), "bilateral:ENGLAND:FRANCE");
        assert_eq!(channel_id(Power::Austria, Power::Turkey), "bilateral:AUSTRIA:TURKEY");
    }

    #[test]
    fn counterparty_resolution() {
        let id = channel_id(Power::France, Power::England);
        assert_eq!(counterparty(&id, Power::England), Some(Power::France));
        assert_eq!(counterparty(&id, Power::France), Some(Power::England));
        assert_eq!(counterparty(&id, Power::Italy), None);
        assert_eq!(counterparty("broadcast:all", Power::Italy), None);
    }

    #[tokio::test]
    async fn unread_lifecycle() {
        let press = InMemoryPress::new();
        press.send_to(Power::France, Power::England, phase(), "hello").await.unwrap();
        press.send_to(Power::Germany, Power::England, phase(), "hallo").await.unwrap();

        let inbox = press.inbox(Power::England).await;
        assert_eq!(inbox.channels.len(), 2);
        let total_unread: usize = inbox.channels.iter().map(|c| c.unread_count).sum();
        assert_eq!(total_unread, 2);

        let drained = press.drain_unread(Power::England).await;
        assert_eq!(drained.len(), 2);

        let inbox = press.inbox(Power::England).await;
        let total_unread: usize = inbox.channels.iter().map(|c| c.unread_count).sum();
        assert_eq!(total_unread, 0);
        assert!(press.drain_unread(Power::England).await.is_empty());
    }

    #[tokio::test]
    async fn own_sends_are_never_unread() {
        let press = InMemoryPress::new();
        press.send_to(Power::France, Power::England, phase(), "hello").await.unwrap();
        assert!(press.drain_unread(Power::France).await.is_empty());
    }

    #[tokio::test]
    async fn recent_messages_are_capped() {
        let press = InMemoryPress::new();
        for i in 0..25 {
            press
                .send_to(Power::France, Power::England, phase(), &format!("msg {i}"))
                .await
                .unwrap();
        }
        let inbox = press.inbox(Power::England).await;
        assert_eq!(inbox.recent_messages.len(), RECENT_MESSAGE_LIMIT);
        assert_eq!(inbox.recent_messages.last().unwrap().content, "msg 24");
    }

    #[tokio::test]
    async fn phase_filter() {
        let press = InMemoryPress::new();
        let spring = phase();
        let fall = PhaseId::new(1901, Season::Fall, PhaseKind::Diplomacy);
        press.send_to(Power::France, Power::England, spring, "s").await.unwrap();
        press.send_to(Power::France, Power::England, fall, "f").await.unwrap();

        let msgs = press.messages_for_phase(spring).await;
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "s");
    }

    #[tokio::test]
    async fn rejects_self_message() {
        let press = InMemoryPress::new();
        assert!(press.send_to(Power::France, Power::France, phase(), "hi").await.is_err());
    }
}
