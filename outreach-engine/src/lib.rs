//! outreach-engine library interface
//!
//! Exposes the application state, router, and service modules for
//! integration testing.

pub mod api;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use outreach_common::config::Settings;
use outreach_common::events::EventBus;
use outreach_common::models::VoiceSession;

use crate::pipeline::classification::SchemaSample;
use crate::services::email::EmailClient;
use crate::services::llm::LlmClient;
use crate::services::localization::Localizer;
use crate::services::telephony::TelephonyClient;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// External integration settings
    pub settings: Arc<Settings>,
    /// LLM generation client (retry-wrapped)
    pub llm: Arc<LlmClient>,
    /// Transactional email client (retry-wrapped)
    pub email: Arc<EmailClient>,
    /// Telephony client for outbound voice calls
    pub telephony: Arc<TelephonyClient>,
    /// Translation cache + client
    pub localizer: Arc<Localizer>,
    /// Campaigns with a pipeline run in flight (at most one per campaign)
    pub active_pipelines: Arc<RwLock<HashSet<Uuid>>>,
    /// Live voice-call sessions keyed by call SID
    pub voice_sessions: Arc<RwLock<HashMap<String, VoiceSession>>>,
    /// Cached contact column samples for the classification agent
    pub schema_sample: Arc<RwLock<Option<SchemaSample>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, settings: Settings) -> Self {
        let settings = Arc::new(settings);
        Self {
            db,
            event_bus,
            llm: Arc::new(LlmClient::new(&settings)),
            email: Arc::new(EmailClient::new(&settings)),
            telephony: Arc::new(TelephonyClient::new(&settings)),
            localizer: Arc::new(Localizer::new(&settings)),
            settings,
            active_pipelines: Arc::new(RwLock::new(HashSet::new())),
            voice_sessions: Arc::new(RwLock::new(HashMap::new())),
            schema_sample: Arc::new(RwLock::new(None)),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::campaigns::routes())
        .merge(api::contacts::routes())
        .merge(api::approval::routes())
        .merge(api::voice::routes())
        .merge(api::tracking::routes())
        .merge(api::analytics::routes())
        .merge(api::insights::routes())
        .merge(api::health::routes())
        .route("/events", get(api::events::event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
