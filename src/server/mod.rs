//! JSON web API.
//!
//! Routes are grouped by concern; each module registers its handlers under `/api`:
//!
//! | Module | Routes |
//! |---|---|
//! | [`account`] | `/api/login`, `/api/register`, `/api/logout`, `/api/settings` |
//! | [`instrument`] | `/api/status`, `/api/connection/reset`, `/api/configuration`, `/api/parameters`, `POST /api/measurements` |
//! | [`history`] | `/api/history`, `/api/measurements/{id}`, `/uploads/{file}` |
//! | [`admin`] | `/api/admin/...` |
//!
//! Requests authenticate with `Authorization: Bearer <token>`; see [`extract`].

pub mod account;
pub mod admin;
pub mod extract;
pub mod history;
pub mod instrument;

use crate::config::LabConfig;
use crate::data::CsvStore;
use crate::database::Store;
use crate::error::{AppResult, LabError};
use crate::session::SessionRegistry;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpResponse, HttpServer};
use serde::Serialize;
use tracing::info;

/// Shared state handed to every handler.
pub struct AppState {
    pub config: LabConfig,
    pub store: Store,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(config: LabConfig, store: Store, sessions: SessionRegistry) -> Self {
        Self {
            config,
            store,
            sessions,
        }
    }

    pub fn uploads(&self) -> &CsvStore {
        self.sessions.storage()
    }
}

/// Plain `{"status": "success", "message": ...}` body.
#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub status: &'static str,
    pub message: String,
}

pub(crate) fn success(message: impl Into<String>) -> HttpResponse {
    HttpResponse::Ok().json(ApiMessage {
        status: "success",
        message: message.into(),
    })
}

/// Register every route. Malformed JSON bodies come back as the usual error document.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        LabError::InvalidInput(err.to_string()).into()
    }))
    .service(
        web::scope("/api")
            .configure(account::routes)
            .configure(instrument::routes)
            .configure(history::routes)
            .configure(admin::routes),
    )
    .service(history::serve_upload);
}

/// Open the database, prepare the uploads directory and serve until shut down.
pub async fn run(config: LabConfig) -> AppResult<()> {
    let store = Store::connect(&config.storage.database_url).await?;
    store.init_db().await?;

    std::fs::create_dir_all(&config.storage.uploads_dir)?;
    let uploads = CsvStore::new(config.storage.uploads_dir.clone());
    let sessions = SessionRegistry::new(config.instrument.clone(), uploads);

    let bind = (config.server.host.clone(), config.server.port);
    let state = web::Data::new(AppState::new(config, store, sessions));

    info!(host = %bind.0, port = bind.1, "Starting HTTP API");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(configure)
    })
    .bind(bind)?
    .run()
    .await?;

    info!("HTTP API stopped");
    Ok(())
}
