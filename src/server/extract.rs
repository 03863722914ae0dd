//! Request guards for authenticated routes.
//!
//! A request is authenticated when it carries a valid bearer token *and* the token's user
//! still has an open session, so logging out invalidates tokens that have not expired yet.

use super::AppState;
use crate::auth;
use crate::database::entity::users;
use crate::error::LabError;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use std::future::Future;
use std::pin::Pin;

const PLEASE_LOG_IN: &str = "Please log in to access this page.";

/// The logged in user.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: users::Model,
}

impl AuthUser {
    pub fn email(&self) -> &str {
        &self.user.email
    }
}

/// A logged in user with the admin flag set.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

fn state(req: &HttpRequest) -> Result<web::Data<AppState>, LabError> {
    req.app_data::<web::Data<AppState>>()
        .cloned()
        .ok_or_else(|| LabError::Configuration("application state is not registered".to_string()))
}

async fn authenticate(req: HttpRequest) -> Result<AuthUser, LabError> {
    let state = state(&req)?;
    let header = req
        .headers()
        .get(auth::AUTHORIZATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| LabError::Auth(PLEASE_LOG_IN.to_string()))?;
    let token =
        auth::bearer_token(header).ok_or_else(|| LabError::Auth(PLEASE_LOG_IN.to_string()))?;
    let claims = auth::decode_token(token, &state.config.server.token_secret)?;

    if !state.sessions.is_open(&claims.sub).await {
        return Err(LabError::Auth(PLEASE_LOG_IN.to_string()));
    }
    let user = state
        .store
        .get_user_by_email(&claims.sub)
        .await?
        .ok_or_else(|| LabError::Auth("User not found. Please log in again.".to_string()))?;
    Ok(AuthUser { user })
}

impl FromRequest for AuthUser {
    type Error = LabError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        Box::pin(authenticate(req.clone()))
    }
}

impl FromRequest for AdminUser {
    type Error = LabError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let user = authenticate(req).await?;
            if !user.user.is_admin {
                return Err(LabError::Forbidden(
                    "You do not have permission to access this page.".to_string(),
                ));
            }
            Ok(AdminUser(user))
        })
    }
}
