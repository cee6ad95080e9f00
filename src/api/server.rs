//! HTTP API server with SSE support

use crate::config::UserSettings;
use crate::engine::{EngineStatus, RecommendOptions};
use crate::error::AnamnesisError;
use crate::events::{Event, EventBroadcaster};
use crate::interaction::Interaction;
use crate::scheduler::{JobRun, RefreshScheduler};
use crate::session::{Session, SessionState};
use crate::types::{ActiveResource, AssociatedResource, Intervention, RecordOutcome};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio_stream::{wrappers::BroadcastStream, StreamExt as _};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

const DEFAULT_RECENT_LIMIT: usize = 20;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server address
    pub addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            addr: ([127, 0, 0, 1], 3456).into(),
        }
    }
}

/// API server state
#[derive(Clone)]
pub(crate) struct AppState {
    session: Arc<Session>,
    events: EventBroadcaster,
    scheduler: Option<Arc<RefreshScheduler>>,
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(
        config: ApiServerConfig,
        session: Arc<Session>,
        events: EventBroadcaster,
        scheduler: Option<Arc<RefreshScheduler>>,
    ) -> Self {
        Self {
            config,
            state: AppState {
                session,
                events,
                scheduler,
            },
        }
    }

    /// Build router
    pub fn router(&self) -> Router {
        Self::build_router(self.state.clone())
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            // Recommendations
            .route("/contexts", post(contexts_handler))
            .route("/groups", get(groups_handler))
            // Notifications from the desktop collaborator
            .route("/active", post(active_handler))
            .route("/interventions", post(intervention_handler))
            .route("/interactions", post(interaction_handler))
            // Event streaming
            .route("/events", get(events_handler))
            // Settings
            .route("/settings", get(get_settings_handler).put(put_settings_handler))
            // Health check
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until the listener fails
    pub async fn serve(self) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.config.addr).await?;
        info!("API server listening on http://{}", self.config.addr);
        axum::serve(listener, router).await?;
        Ok(())
    }
}

/// Engine errors mapped onto HTTP status codes
pub(crate) struct ApiError(AnamnesisError);

impl From<AnamnesisError> for ApiError {
    fn from(err: AnamnesisError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AnamnesisError::UnknownResource(_) => StatusCode::NOT_FOUND,
            AnamnesisError::SelfPair(_) => StatusCode::BAD_REQUEST,
            AnamnesisError::RefreshInProgress => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ContextRequest {
    path: String,
}

/// Associated resources for an arbitrary path
async fn contexts_handler(
    State(state): State<AppState>,
    Json(req): Json<ContextRequest>,
) -> Json<Vec<AssociatedResource>> {
    let settings = state.session.settings().await;
    let resources = state
        .session
        .engine()
        .recommend(&req.path, RecommendOptions::from_settings(&settings))
        .await;
    Json(resources)
}

#[derive(Debug, Deserialize)]
struct GroupsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Artefact {
    path: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SmartGroup {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    created: DateTime<Utc>,
    artefacts: Vec<Artefact>,
}

/// The "Recently Used" smart group
async fn groups_handler(
    State(state): State<AppState>,
    Query(query): Query<GroupsQuery>,
) -> Result<Json<Vec<SmartGroup>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    let recent = state.session.engine().recently_used(limit).await?;

    Ok(Json(vec![SmartGroup {
        id: "recently-used".to_string(),
        name: "Recently Used".to_string(),
        kind: "smart".to_string(),
        created: Utc::now(),
        artefacts: recent.into_iter().map(|path| Artefact { path }).collect(),
    }]))
}

#[derive(Debug, Serialize, Deserialize)]
struct ActivateResponse {
    /// Request sequence; absent when the activation was ignored
    sequence: Option<u64>,
}

async fn active_handler(
    State(state): State<AppState>,
    Json(active): Json<ActiveResource>,
) -> (StatusCode, Json<ActivateResponse>) {
    let sequence = state.session.activate(active).await;
    (StatusCode::ACCEPTED, Json(ActivateResponse { sequence }))
}

#[derive(Debug, Deserialize)]
struct InterventionRequest {
    active: String,
    associated: String,
    intervention: Intervention,
}

async fn intervention_handler(
    State(state): State<AppState>,
    Json(req): Json<InterventionRequest>,
) -> Result<Json<RecordOutcome>, ApiError> {
    let outcome = state
        .session
        .record_intervention(&req.active, &req.associated, req.intervention)
        .await?;
    Ok(Json(outcome))
}

async fn interaction_handler(
    State(state): State<AppState>,
    Json(interaction): Json<Interaction>,
) -> StatusCode {
    if !interaction.is_client_event() {
        debug!("Rejected interaction from client: {}", interaction);
        return StatusCode::BAD_REQUEST;
    }
    state.session.engine().log_interaction(&interaction);
    StatusCode::ACCEPTED
}

/// SSE event stream handler
///
/// A client connecting while recommendations are displayed first receives
/// the current list, then live events.
async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    debug!("New SSE client connected");

    // Subscribe first so an event published during the snapshot read is not lost
    let rx = state.events.subscribe();
    let mut snapshot_events = Vec::new();
    if let SessionState::Ready {
        sequence,
        active,
        resources,
    } = state.session.state().await
    {
        let event = Event::recommendations_ready(sequence, active, resources);
        if let Ok(data) = serde_json::to_string(&event) {
            snapshot_events.push(Ok(SseEvent::default().data(data).id(event.id)));
        }
    }

    let live_stream = BroadcastStream::new(rx);

    let live_event_stream = live_stream.filter_map(|result| match result {
        Ok(event) => {
            let data = serde_json::to_string(&event).ok()?;
            Some(Ok(SseEvent::default().data(data).id(event.id)))
        }
        Err(_) => None, // Skip lagged messages
    });

    let snapshot_stream = tokio_stream::iter(snapshot_events);
    let combined_stream = snapshot_stream.chain(live_event_stream);

    Sse::new(combined_stream).keep_alive(KeepAlive::default())
}

async fn get_settings_handler(State(state): State<AppState>) -> Json<UserSettings> {
    Json(state.session.settings().await)
}

async fn put_settings_handler(
    State(state): State<AppState>,
    Json(settings): Json<UserSettings>,
) -> Result<Json<UserSettings>, ApiError> {
    state.session.update_settings(settings).await?;
    Ok(Json(settings))
}

/// Health check handler
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    subscribers: usize,
    engine: EngineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_refresh: Option<JobRun>,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let last_refresh = match &state.scheduler {
        Some(scheduler) => scheduler.last_run().await,
        None => None,
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subscribers: state.events.subscriber_count(),
        engine: state.session.engine().status().await,
        last_refresh,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssociationConfig;
    use crate::engine::RecommendationEngine;
    use crate::storage::InMemoryVisitLog;
    use crate::types::{InterventionStatus, ResourceVisit};
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Duration;
    use tempfile::TempDir;
    use tokio_stream::StreamExt;
    use tower::ServiceExt;

    async fn app_state(dir: &TempDir) -> AppState {
        let config = AssociationConfig::with_data_dir(dir.path());
        std::fs::write(config.embeddings_path(), "1,0\n0.9,0.1\n0,1\n").unwrap();

        let t0 = Utc::now() - Duration::hours(1);
        let visits = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, p)| ResourceVisit::new(*p, "Finder").at(t0 + Duration::seconds(i as i64)))
            .collect();
        let engine = Arc::new(RecommendationEngine::new(
            config,
            Arc::new(InMemoryVisitLog::with_visits(visits)),
        ));
        engine.refresh().await.unwrap();

        let events = EventBroadcaster::default();
        let session = Arc::new(Session::new(engine, events.clone(), UserSettings::default()));
        AppState {
            session,
            events,
            scheduler: None,
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = TempDir::new().unwrap();
        let state = app_state(&dir).await;

        let response = health_handler(State(state)).await;
        assert_eq!(response.0.status, "ok");
        assert_eq!(response.0.engine.generation, 1);
        assert_eq!(response.0.engine.vocabulary_size, 3);
        assert!(response.0.last_refresh.is_none());
    }

    #[tokio::test]
    async fn test_contexts_endpoint() {
        let dir = TempDir::new().unwrap();
        let state = app_state(&dir).await;

        let response = contexts_handler(
            State(state),
            Json(ContextRequest {
                path: "a".to_string(),
            }),
        )
        .await;
        assert_eq!(response.0.len(), 1);
        assert_eq!(response.0[0].path, "b");
        assert_eq!(response.0[0].status, InterventionStatus::Open);
    }

    #[tokio::test]
    async fn test_groups_endpoint() {
        let dir = TempDir::new().unwrap();
        let state = app_state(&dir).await;

        let response = groups_handler(State(state), Query(GroupsQuery { limit: Some(2) }))
            .await
            .ok()
            .unwrap();
        let group = &response.0[0];
        assert_eq!(group.name, "Recently Used");
        assert_eq!(group.kind, "smart");
        let paths: Vec<_> = group.artefacts.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_intervention_errors_map_to_status() {
        let dir = TempDir::new().unwrap();
        let router = ApiServer::build_router(app_state(&dir).await);

        let request = |body: &str| {
            Request::builder()
                .method("POST")
                .uri("/interventions")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        };

        let response = router
            .clone()
            .oneshot(request(
                r#"{"active":"a","associated":"c","intervention":"similar"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let outcome: RecordOutcome = serde_json::from_slice(&body).unwrap();
        assert_eq!(outcome, RecordOutcome::Recorded);

        let response = router
            .clone()
            .oneshot(request(
                r#"{"active":"a","associated":"missing","intervention":"dissimilar"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router
            .oneshot(request(
                r#"{"active":"a","associated":"a","intervention":"similar"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_interactions_endpoint() {
        let dir = TempDir::new().unwrap();
        let state = app_state(&dir).await;
        let log_path = state.session.engine().config().interaction_log_path();

        let status = interaction_handler(State(state.clone()), Json(Interaction::WindowOpened)).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let forged = Interaction::InterventionSet {
            active: "a".to_string(),
            associated: "b".to_string(),
            intervention: Intervention::Similar,
        };
        let status = interaction_handler(State(state), Json(forged)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let log = std::fs::read_to_string(log_path).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.ends_with("window opened\n"));
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let dir = TempDir::new().unwrap();
        let state = app_state(&dir).await;

        let settings = UserSettings {
            recommendations_enabled: false,
            show_dissimilar: true,
        };
        put_settings_handler(State(state.clone()), Json(settings))
            .await
            .ok()
            .unwrap();
        assert_eq!(get_settings_handler(State(state)).await.0, settings);
    }

    #[tokio::test]
    async fn test_active_endpoint_returns_sequence() {
        let dir = TempDir::new().unwrap();
        let state = app_state(&dir).await;

        let (status, body) = active_handler(
            State(state.clone()),
            Json(ActiveResource::new("a", "Finder")),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body.0.sequence, Some(1));

        let (_, body) = active_handler(State(state), Json(ActiveResource::new("a", "Anamnesis"))).await;
        assert_eq!(body.0.sequence, None);
    }

    #[tokio::test]
    async fn test_event_stream_starts_with_displayed_list() {
        let dir = TempDir::new().unwrap();
        let state = app_state(&dir).await;
        let session = state.session.clone();
        let router = ApiServer::build_router(state);

        session.activate(ActiveResource::new("a", "Finder")).await;
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !matches!(session.state().await, SessionState::Ready { .. }) {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let response = router
            .oneshot(Request::builder().uri("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mut body = response.into_body().into_data_stream();

        let first = body.next().await.unwrap().unwrap();
        let first = String::from_utf8_lossy(&first);
        assert!(first.contains("recommendations_ready"));
        assert!(first.contains("\"sequence\":1"));

        session.activate(ActiveResource::new("b", "Finder")).await;
        let loading = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                let frame = body.next().await.unwrap().unwrap();
                let frame = String::from_utf8_lossy(&frame).into_owned();
                if frame.contains("loading_started") {
                    return frame;
                }
            }
        })
        .await
        .unwrap();
        assert!(loading.contains("\"sequence\":2"));
    }
}
