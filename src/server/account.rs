//! Login, registration, logout and account settings.

use super::extract::AuthUser;
use super::{success, AppState};
use crate::auth;
use crate::database::entity::users;
use crate::database::{NewUser, DEMO_EMAIL};
use crate::error::{AppResult, LabError};
use crate::session::ConnectionStatus;
use actix_web::{get, post, put, web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(login)
        .service(register)
        .service(logout)
        .service(get_settings)
        .service(update_settings);
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResult {
    pub status: &'static str,
    pub message: String,
    pub access_token: String,
    pub token_ttl: i64,
    pub user: users::Model,
    pub connection: ConnectionStatus,
    /// Informational notes, e.g. that a legacy password was re-hashed
    pub notices: Vec<String>,
}

#[post("/login")]
async fn login(data: web::Data<AppState>, form: web::Json<LoginData>) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    let email = form.email.trim();

    let Some(existing) = data.store.get_user_by_email(email).await? else {
        return Err(LabError::Auth("Email not found. Please register.".to_string()));
    };
    let was_plaintext = !auth::is_hashed(&existing.password);
    let user = data
        .store
        .verify_login(email, &form.password)
        .await?
        .ok_or_else(|| LabError::Auth("Incorrect password. Please try again.".to_string()))?;

    let mut notices = Vec::new();
    if was_plaintext {
        notices.push("Your password has been secured.".to_string());
    }

    let ttl = data.config.server.token_expire_seconds;
    let access_token = auth::encode_token(&user.email, &data.config.server.token_secret, ttl)?;
    data.sessions.open(&user.email).await;
    info!(email = %user.email, "User logged in");

    // A missing meter does not fail the login.
    let message = match data.sessions.get_or_connect(&user.email).await {
        Ok(_) => "Login successful! Device connection established.".to_string(),
        Err(e) => {
            warn!(email = %user.email, error = %e, "Device connection failed at login");
            format!("Login successful, but device connection failed: {e}")
        }
    };
    let connection = data.sessions.status(&user.email).await;

    Ok(HttpResponse::Ok()
        .append_header((
            auth::AUTHORIZATION_HEADER,
            format!("{}{}", auth::TOKEN_PREFIX, access_token),
        ))
        .json(LoginResult {
            status: "success",
            message,
            access_token,
            token_ttl: ttl,
            user,
            connection,
            notices,
        }))
}

#[derive(Debug, Deserialize)]
pub struct RegisterData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[post("/register")]
async fn register(
    data: web::Data<AppState>,
    form: web::Json<RegisterData>,
) -> AppResult<HttpResponse> {
    let form = form.into_inner();
    data.store
        .add_user(NewUser {
            first_name: form.first_name,
            last_name: form.last_name,
            email: form.email,
            password: form.password,
            is_admin: None,
        })
        .await?;

    Ok(HttpResponse::Created().json(super::ApiMessage {
        status: "success",
        message: "Registration successful! Please log in.".to_string(),
    }))
}

#[post("/logout")]
async fn logout(data: web::Data<AppState>, user: AuthUser) -> AppResult<HttpResponse> {
    data.sessions.close(user.email()).await;
    info!(email = %user.email(), "User logged out");
    Ok(success("You have been logged out."))
}

fn reject_demo(user: &AuthUser) -> AppResult<()> {
    if user.email() == DEMO_EMAIL {
        return Err(LabError::Forbidden(
            "Demo user cannot access the settings page.".to_string(),
        ));
    }
    Ok(())
}

#[get("/settings")]
async fn get_settings(user: AuthUser) -> AppResult<HttpResponse> {
    reject_demo(&user)?;
    Ok(HttpResponse::Ok().json(user.user))
}

#[derive(Debug, Deserialize)]
pub struct SettingsForm {
    pub current_password: String,
    #[serde(default)]
    pub new_password: Option<String>,
    #[serde(default)]
    pub confirm_password: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SettingsResult {
    pub status: &'static str,
    pub message: String,
    pub user: users::Model,
    /// Replacement token, issued when the email address changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

#[put("/settings")]
async fn update_settings(
    data: web::Data<AppState>,
    user: AuthUser,
    form: web::Json<SettingsForm>,
) -> AppResult<HttpResponse> {
    reject_demo(&user)?;
    let form = form.into_inner();

    let current_ok = if auth::is_hashed(&user.user.password) {
        auth::verify_password(&form.current_password, &user.user.password)?
    } else {
        form.current_password == user.user.password
    };
    if !current_ok {
        return Err(LabError::InvalidInput(
            "Current password is incorrect.".to_string(),
        ));
    }

    let new_password = form.new_password.as_deref().filter(|p| !p.is_empty());
    if let Some(password) = new_password {
        if form.confirm_password.as_deref() != Some(password) {
            return Err(LabError::InvalidInput(
                "New password and confirmation do not match.".to_string(),
            ));
        }
    }

    let old_email = user.user.email.clone();
    let updated = data
        .store
        .update_credentials(user.user.id, form.email.as_deref(), new_password)
        .await?;

    let access_token = if updated.email != old_email {
        data.sessions.rename(&old_email, &updated.email).await;
        info!(old = %old_email, new = %updated.email, "Email changed");
        Some(auth::encode_token(
            &updated.email,
            &data.config.server.token_secret,
            data.config.server.token_expire_seconds,
        )?)
    } else {
        None
    };

    Ok(HttpResponse::Ok().json(SettingsResult {
        status: "success",
        message: "Settings updated successfully!".to_string(),
        user: updated,
        access_token,
    }))
}
