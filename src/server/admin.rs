//! Administrator routes: all measurements, CSV export and user management.

use super::extract::AdminUser;
use super::{success, AppState};
use crate::database::entity::users;
use crate::error::{AppResult, LabError};
use actix_web::http::header;
use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .service(all_measurements)
            .service(export_measurements)
            .service(list_users)
            .service(manage_user),
    );
}

#[get("/measurements")]
async fn all_measurements(data: web::Data<AppState>, _admin: AdminUser) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(data.store.admin_measurements().await?))
}

#[get("/measurements/export")]
async fn export_measurements(
    data: web::Data<AppState>,
    _admin: AdminUser,
) -> AppResult<HttpResponse> {
    let mut body = Vec::new();
    data.store.export_measurements_csv(&mut body).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/csv")
        .insert_header((
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"measurements.csv\"",
        ))
        .body(body))
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<users::Model>,
    pub logged_in_email: String,
}

#[get("/users")]
async fn list_users(data: web::Data<AppState>, admin: AdminUser) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(UserList {
        users: data.store.list_users().await?,
        logged_in_email: admin.0.user.email,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    Delete,
    GrantAdmin,
    RevokeAdmin,
}

#[derive(Debug, Deserialize)]
pub struct UserActionForm {
    pub action: UserAction,
}

#[post("/users/{id}")]
async fn manage_user(
    data: web::Data<AppState>,
    admin: AdminUser,
    path: web::Path<i32>,
    form: web::Json<UserActionForm>,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner();
    let target = data
        .store
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| LabError::NotFound(format!("User {user_id}")))?;

    let message = match form.action {
        UserAction::Delete => {
            data.store.delete_user_by_id(user_id).await?;
            data.sessions.close(&target.email).await;
            "User deleted successfully!"
        }
        UserAction::GrantAdmin => {
            data.store.set_admin(user_id, true).await?;
            "Admin access granted!"
        }
        UserAction::RevokeAdmin => {
            data.store.set_admin(user_id, false).await?;
            "Admin access revoked!"
        }
    };
    info!(admin = %admin.0.user.email, target = %target.email, action = ?form.action, "User updated");
    Ok(success(message))
}
