//! Campaign event types and the in-process event bus
//!
//! Events fan out over a tokio broadcast channel to SSE observers and any
//! in-process listeners. Emission is lossy for progress-style events: if no
//! subscriber is listening, the event is dropped and the pipeline keeps
//! going.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{Channel, PipelineState};

/// Event published on the campaign event bus.
///
/// Serialized with a `type` tag so SSE clients can switch on the event name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CampaignEvent {
    /// Pipeline advanced (or failed) to a new state
    PipelineStateChanged {
        campaign_id: Uuid,
        old_state: PipelineState,
        new_state: PipelineState,
        timestamp: DateTime<Utc>,
    },
    /// Informational stage progress
    StageLog {
        campaign_id: Uuid,
        stage: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// A reviewer approved one channel's draft
    ChannelApproved {
        campaign_id: Uuid,
        channel: Channel,
        timestamp: DateTime<Utc>,
    },
    /// Every channel draft has been approved
    CampaignApproved {
        campaign_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    /// A channel draft was regenerated or edited
    ContentUpdated {
        campaign_id: Uuid,
        channel: Channel,
        timestamp: DateTime<Utc>,
    },
    /// Dispatch progress for one channel
    DispatchProgress {
        campaign_id: Uuid,
        channel: Channel,
        sent: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },
    /// Dispatch finished and the campaign completed
    CampaignCompleted {
        campaign_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    /// Pipeline failed; the campaign is marked FAILED
    CampaignFailed {
        campaign_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl CampaignEvent {
    /// Event name as used by SSE clients
    pub fn event_name(&self) -> &'static str {
        match self {
            CampaignEvent::PipelineStateChanged { .. } => "PipelineStateChanged",
            CampaignEvent::StageLog { .. } => "StageLog",
            CampaignEvent::ChannelApproved { .. } => "ChannelApproved",
            CampaignEvent::CampaignApproved { .. } => "CampaignApproved",
            CampaignEvent::ContentUpdated { .. } => "ContentUpdated",
            CampaignEvent::DispatchProgress { .. } => "DispatchProgress",
            CampaignEvent::CampaignCompleted { .. } => "CampaignCompleted",
            CampaignEvent::CampaignFailed { .. } => "CampaignFailed",
        }
    }
}

/// Broadcast bus for [`CampaignEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CampaignEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber before
    /// old events are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events. Events emitted before subscription
    /// are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CampaignEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Returns `Ok(subscriber_count)` when at least one
    /// subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CampaignEvent,
    ) -> Result<usize, broadcast::error::SendError<CampaignEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the case of no subscribers.
    pub fn emit_lossy(&self, event: CampaignEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let campaign_id = Uuid::new_v4();
        bus.emit_lossy(CampaignEvent::CampaignApproved {
            campaign_id,
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            CampaignEvent::CampaignApproved { campaign_id: id, .. } => {
                assert_eq!(id, campaign_id)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_is_lossy() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        // Does not error or panic
        bus.emit_lossy(CampaignEvent::CampaignCompleted {
            campaign_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        });
        assert!(bus
            .emit(CampaignEvent::CampaignCompleted {
                campaign_id: Uuid::new_v4(),
                timestamp: Utc::now(),
            })
            .is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = CampaignEvent::PipelineStateChanged {
            campaign_id: Uuid::new_v4(),
            old_state: PipelineState::Created,
            new_state: PipelineState::Classified,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PipelineStateChanged");
        assert_eq!(json["new_state"], "CLASSIFIED");
    }
}
