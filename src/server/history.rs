//! Measurement history and stored CSV files.

use super::extract::AuthUser;
use super::{success, AppState};
use crate::data::{CsvStore, CsvTable};
use crate::database::entity::{measurements, users};
use crate::error::{AppResult, LabError};
use actix_web::{delete, get, web, HttpResponse};
use serde::Serialize;
use std::path::Path;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(history)
        .service(view_measurement)
        .service(delete_measurement);
}

#[get("/history")]
async fn history(data: web::Data<AppState>, user: AuthUser) -> AppResult<HttpResponse> {
    let measurements = data.store.get_measurements(Some(user.user.id)).await?;
    Ok(HttpResponse::Ok().json(measurements))
}

/// Owners and administrators may see or remove a measurement.
fn check_access(user: &users::Model, measurement: &measurements::Model) -> AppResult<()> {
    if measurement.user_id == user.id || user.is_admin {
        Ok(())
    } else {
        Err(LabError::Forbidden(
            "You do not have permission to access this measurement.".to_string(),
        ))
    }
}

#[derive(Debug, Serialize)]
pub struct MeasurementView {
    pub measurement: measurements::Model,
    pub csv_file_name: String,
    pub download_url: String,
    pub data: CsvTable,
}

#[get("/measurements/{id}")]
async fn view_measurement(
    data: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let measurement = data
        .store
        .get_measurement(path.into_inner())
        .await?
        .ok_or_else(|| LabError::NotFound("Measurement".to_string()))?;
    check_access(&user.user, &measurement)?;

    let csv_path = measurement
        .csv_file_path
        .as_deref()
        .map(|p| resolve_stored(data.uploads(), p))
        .filter(|p| p.is_file())
        .ok_or_else(|| LabError::NotFound("CSV file".to_string()))?;
    let csv_file_name = csv_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let table = CsvStore::read_table(&csv_path)?;

    Ok(HttpResponse::Ok().json(MeasurementView {
        download_url: format!("/uploads/{csv_file_name}"),
        csv_file_name,
        measurement,
        data: table,
    }))
}

/// Relative paths recorded in the database live under the uploads directory.
fn resolve_stored(uploads: &CsvStore, stored: &str) -> std::path::PathBuf {
    let path = Path::new(stored);
    if path.is_absolute() || path.starts_with(uploads.dir()) {
        path.to_path_buf()
    } else {
        uploads.dir().join(path)
    }
}

#[delete("/measurements/{id}")]
async fn delete_measurement(
    data: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let measurement = data
        .store
        .get_measurement(id)
        .await?
        .ok_or_else(|| LabError::NotFound("Measurement".to_string()))?;
    check_access(&user.user, &measurement)?;

    data.store.delete_measurement(id).await?;
    Ok(success("Measurement and associated file deleted successfully."))
}

/// Download a stored CSV file by name.
#[get("/uploads/{file}")]
pub async fn serve_upload(
    data: web::Data<AppState>,
    file: web::Path<String>,
) -> AppResult<HttpResponse> {
    let path = data.uploads().resolve(&file.into_inner())?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LabError::NotFound("File".to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    Ok(HttpResponse::Ok().content_type("text/csv").body(bytes))
}
