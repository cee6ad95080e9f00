//! Active-resource session
//!
//! Drives the Idle -> Loading -> Ready state machine for every
//! active-resource change. Each change gets a monotonically increasing
//! sequence number and its own worker task; results funnel into a single
//! delivery task, which is the only writer of the session state and the
//! only publisher of session events. A result whose sequence number is lower
//! than the last one delivered is discarded, so rapid switching never shows
//! an older list over a newer one.

use crate::config::UserSettings;
use crate::engine::{RecommendOptions, RecommendationEngine};
use crate::error::Result;
use crate::events::{Event, EventBroadcaster};
use crate::types::{ActiveResource, AssociatedResource, Intervention, RecordOutcome, ResourceVisit};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Loading {
        sequence: u64,
        path: String,
    },
    Ready {
        sequence: u64,
        active: ActiveResource,
        resources: Vec<AssociatedResource>,
    },
}

impl SessionState {
    pub fn sequence(&self) -> u64 {
        match self {
            SessionState::Idle => 0,
            SessionState::Loading { sequence, .. } | SessionState::Ready { sequence, .. } => {
                *sequence
            }
        }
    }
}

/// Transition requested by a worker
#[derive(Debug, Clone)]
pub enum Delivery {
    Loading {
        sequence: u64,
        path: String,
    },
    Ready {
        sequence: u64,
        active: ActiveResource,
        resources: Vec<AssociatedResource>,
    },
    /// Blank path: recommendations are hidden
    NoActiveResource { sequence: u64 },
    Disabled { sequence: u64 },
}

impl Delivery {
    pub fn sequence(&self) -> u64 {
        match self {
            Delivery::Loading { sequence, .. }
            | Delivery::Ready { sequence, .. }
            | Delivery::NoActiveResource { sequence }
            | Delivery::Disabled { sequence } => *sequence,
        }
    }
}

/// Spawn the delivery task
///
/// Returns the sender workers post to; the task exits once every sender is
/// dropped.
pub fn spawn_delivery(
    state: Arc<RwLock<SessionState>>,
    events: EventBroadcaster,
) -> (mpsc::UnboundedSender<Delivery>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();

    let handle = tokio::spawn(async move {
        let mut last_delivered = 0u64;

        while let Some(delivery) = rx.recv().await {
            let sequence = delivery.sequence();
            if sequence < last_delivered {
                debug!(
                    "Discarding stale result {} (last delivered {})",
                    sequence, last_delivered
                );
                continue;
            }
            last_delivered = sequence;

            let (next, event) = match delivery {
                Delivery::Loading { sequence, path } => (
                    SessionState::Loading {
                        sequence,
                        path: path.clone(),
                    },
                    Event::loading_started(sequence, path),
                ),
                Delivery::Ready {
                    sequence,
                    active,
                    resources,
                } => (
                    SessionState::Ready {
                        sequence,
                        active: active.clone(),
                        resources: resources.clone(),
                    },
                    Event::recommendations_ready(sequence, active, resources),
                ),
                Delivery::NoActiveResource { sequence } => {
                    (SessionState::Idle, Event::no_active_resource(sequence))
                }
                Delivery::Disabled { sequence } => {
                    (SessionState::Idle, Event::recommendations_disabled(sequence))
                }
            };

            *state.write().await = next;
            events.broadcast(event);
        }
    });

    (tx, handle)
}

pub struct Session {
    engine: Arc<RecommendationEngine>,
    events: EventBroadcaster,
    settings: RwLock<UserSettings>,
    state: Arc<RwLock<SessionState>>,
    sequence: AtomicU64,
    delivery: mpsc::UnboundedSender<Delivery>,
}

impl Session {
    /// Create a session; must be called inside a tokio runtime
    pub fn new(
        engine: Arc<RecommendationEngine>,
        events: EventBroadcaster,
        settings: UserSettings,
    ) -> Self {
        let state = Arc::new(RwLock::new(SessionState::Idle));
        let (delivery, _handle) = spawn_delivery(state.clone(), events.clone());

        Self {
            engine,
            events,
            settings: RwLock::new(settings),
            state,
            sequence: AtomicU64::new(0),
            delivery,
        }
    }

    pub fn engine(&self) -> &Arc<RecommendationEngine> {
        &self.engine
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn settings(&self) -> UserSettings {
        *self.settings.read().await
    }

    /// Replace and persist the user settings
    pub async fn update_settings(&self, settings: UserSettings) -> Result<()> {
        settings.save(&self.engine.config().settings_path())?;
        *self.settings.write().await = settings;
        Ok(())
    }

    /// Handle a foreground change reported by the active-resource notifier
    ///
    /// Every activation is stored as a visit. Activations of ignored
    /// applications stop there and return `None`; anything else starts a new
    /// request and returns its sequence number.
    pub async fn activate(&self, active: ActiveResource) -> Option<u64> {
        let mut visit = ResourceVisit::new(active.path.clone(), active.app_name.clone());
        if let Some(title) = &active.window_title {
            visit = visit.with_window(title.clone());
        }
        if let Err(e) = self.engine.record_visit(&visit).await {
            warn!("Failed to store visit for {}: {}", active.path, e);
        }

        if self.engine.config().is_ignored_app(&active.app_name) {
            debug!("Ignoring activation of {}", active.app_name);
            return None;
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let settings = self.settings().await;

        if active.is_empty() {
            self.deliver(Delivery::NoActiveResource { sequence });
            return Some(sequence);
        }
        if !settings.recommendations_enabled {
            self.deliver(Delivery::Disabled { sequence });
            return Some(sequence);
        }

        self.deliver(Delivery::Loading {
            sequence,
            path: active.path.clone(),
        });

        let engine = self.engine.clone();
        let delivery = self.delivery.clone();
        let options = RecommendOptions::from_settings(&settings);
        tokio::spawn(async move {
            let resources = engine.recommend(&active.path, options).await;
            let _ = delivery.send(Delivery::Ready {
                sequence,
                active,
                resources,
            });
        });

        Some(sequence)
    }

    /// Record an intervention and refresh the displayed statuses
    ///
    /// The refreshed list reuses the sequence of the list it updates, so it
    /// is dropped if a newer request has started in the meantime.
    pub async fn record_intervention(
        &self,
        active_path: &str,
        associated_path: &str,
        intervention: Intervention,
    ) -> Result<RecordOutcome> {
        let outcome = self
            .engine
            .record_intervention(active_path, associated_path, intervention)
            .await?;

        self.events.broadcast(Event::intervention_recorded(
            active_path.to_string(),
            associated_path.to_string(),
            intervention,
            outcome,
        ));

        if let SessionState::Ready {
            sequence,
            active,
            resources,
        } = self.state().await
        {
            if active.path == active_path {
                let options = RecommendOptions::from_settings(&self.settings().await);
                let resources = self
                    .engine
                    .refresh_statuses(active_path, resources, options)
                    .await;
                self.deliver(Delivery::Ready {
                    sequence,
                    active,
                    resources,
                });
            }
        }

        Ok(outcome)
    }

    fn deliver(&self, delivery: Delivery) {
        if self.delivery.send(delivery).is_err() {
            warn!("Delivery task stopped; dropping session update");
        }
    }
}
