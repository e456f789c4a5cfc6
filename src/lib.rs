//! Tretize Portal Library
//!
//! Shipment tracking, the worker portal and the public quote form.

use std::sync::Arc;

use anyhow::Result;

pub mod api;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
pub use middleware::{auth_middleware, AuthUser};

use services::{AuthService, Mailer, SessionManager, ShipmentEditor, TrackingFinder};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Database connection pool
    pub db: DbPool,
    pub sessions: Arc<SessionManager>,
    pub mailer: Arc<dyn Mailer>,
    pub auth: AuthService,
    pub editor: ShipmentEditor,
    pub finder: TrackingFinder,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool, mailer: Arc<dyn Mailer>) -> Result<Self> {
        let sessions = Arc::new(SessionManager::from_config(&config.auth)?);
        let workers_inbox = config
            .mail
            .workers_inbox
            .clone()
            .or_else(|| config.mail.main_inbox.clone());

        Ok(Self {
            auth: AuthService::new(db.clone()),
            editor: ShipmentEditor::new(db.clone(), mailer.clone(), workers_inbox),
            finder: TrackingFinder::new(db.clone()),
            config: Arc::new(config),
            db,
            sessions,
            mailer,
        })
    }
}
