//! Events delivered to the recommendation consumer
//!
//! The session and the refresh worker publish through an [`EventBroadcaster`];
//! the HTTP surface forwards them as Server-Sent Events.

use crate::model::EmbeddingSource;
use crate::types::{ActiveResource, AssociatedResource, Intervention, RecordOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event type discriminant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventType {
    /// A recommendation request started computing
    LoadingStarted {
        sequence: u64,
        path: String,
        timestamp: DateTime<Utc>,
    },
    /// Ranked recommendations for the active resource
    RecommendationsReady {
        sequence: u64,
        active: ActiveResource,
        resources: Vec<AssociatedResource>,
        timestamp: DateTime<Utc>,
    },
    /// Nothing is active; the consumer hides its list
    NoActiveResource {
        sequence: u64,
        timestamp: DateTime<Utc>,
    },
    /// Recommendations are switched off in the user settings
    RecommendationsDisabled {
        sequence: u64,
        timestamp: DateTime<Utc>,
    },
    InterventionRecorded {
        active: String,
        associated: String,
        intervention: Intervention,
        outcome: RecordOutcome,
        timestamp: DateTime<Utc>,
    },
    /// A new model generation was installed
    ModelRefreshed {
        generation: u64,
        vocabulary_size: usize,
        embedding_source: EmbeddingSource,
        timestamp: DateTime<Utc>,
    },
    /// A refresh failed; the previous generation stays active
    RefreshFailed {
        error: String,
        timestamp: DateTime<Utc>,
    },
}

/// Event wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event ID (for deduplication)
    pub id: String,
    #[serde(flatten)]
    pub event_type: EventType,
}

impl Event {
    pub fn new(event_type: EventType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
        }
    }

    pub fn loading_started(sequence: u64, path: String) -> Self {
        Self::new(EventType::LoadingStarted {
            sequence,
            path,
            timestamp: Utc::now(),
        })
    }

    pub fn recommendations_ready(
        sequence: u64,
        active: ActiveResource,
        resources: Vec<AssociatedResource>,
    ) -> Self {
        Self::new(EventType::RecommendationsReady {
            sequence,
            active,
            resources,
            timestamp: Utc::now(),
        })
    }

    pub fn no_active_resource(sequence: u64) -> Self {
        Self::new(EventType::NoActiveResource {
            sequence,
            timestamp: Utc::now(),
        })
    }

    pub fn recommendations_disabled(sequence: u64) -> Self {
        Self::new(EventType::RecommendationsDisabled {
            sequence,
            timestamp: Utc::now(),
        })
    }

    pub fn intervention_recorded(
        active: String,
        associated: String,
        intervention: Intervention,
        outcome: RecordOutcome,
    ) -> Self {
        Self::new(EventType::InterventionRecorded {
            active,
            associated,
            intervention,
            outcome,
            timestamp: Utc::now(),
        })
    }

    pub fn model_refreshed(
        generation: u64,
        vocabulary_size: usize,
        embedding_source: EmbeddingSource,
    ) -> Self {
        Self::new(EventType::ModelRefreshed {
            generation,
            vocabulary_size,
            embedding_source,
            timestamp: Utc::now(),
        })
    }

    pub fn refresh_failed(error: String) -> Self {
        Self::new(EventType::RefreshFailed {
            error,
            timestamp: Utc::now(),
        })
    }

    /// Request sequence number, for session-scoped events
    pub fn sequence(&self) -> Option<u64> {
        match &self.event_type {
            EventType::LoadingStarted { sequence, .. }
            | EventType::RecommendationsReady { sequence, .. }
            | EventType::NoActiveResource { sequence, .. }
            | EventType::RecommendationsDisabled { sequence, .. } => Some(*sequence),
            _ => None,
        }
    }
}

/// Event broadcaster using tokio broadcast channel
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<Event>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Broadcast event to all subscribers
    ///
    /// Having no subscriber is not an error; the event is dropped.
    pub fn broadcast(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_is_flattened() {
        let event = Event::loading_started(4, "https://docs.rs".to_string());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["id"], event.id.as_str());
        assert_eq!(json["type"], "loading_started");
        assert_eq!(json["sequence"], 4);
    }

    #[test]
    fn test_sequence_only_on_session_events() {
        assert_eq!(Event::no_active_resource(9).sequence(), Some(9));
        assert_eq!(Event::refresh_failed("boom".to_string()).sequence(), None);
    }

    #[tokio::test]
    async fn test_broadcaster() {
        let broadcaster = EventBroadcaster::new(10);
        assert_eq!(broadcaster.broadcast(Event::no_active_resource(1)), 0);

        let mut rx = broadcaster.subscribe();
        let event = Event::model_refreshed(2, 10, EmbeddingSource::Cooccurrence);
        assert_eq!(broadcaster.broadcast(event.clone()), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, event.id);
        assert_eq!(received.event_type, event.event_type);
    }
}
