use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;
use crate::error::ErrorClass;
use crate::persistence::CustomerStore;
use crate::registration::RegistrationRequest;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmEmailRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmEmailResponse {
    email_verified: bool,
    already_verified: bool,
}

/// Bearer header first, then the access-token cookie
pub fn access_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    from_header.or_else(|| req.cookie(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string()))
}

pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegistrationRequest>,
) -> Result<HttpResponse, ApiError> {
    let summary = state.registration.register(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(summary))
}

pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let token = state.auth.authenticate(&body.email, &body.password).await?;

    let max_age = (token.expires_at - Utc::now()).num_seconds().max(0);
    let cookie = Cookie::build(ACCESS_TOKEN_COOKIE, token.token.clone())
        .http_only(true)
        .secure(state.secure_cookies)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::seconds(max_age))
        .finish();

    Ok(HttpResponse::Ok().cookie(cookie).json(token))
}

pub async fn me(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let token = access_token(&req).ok_or_else(ApiError::unauthorized)?;
    let profile = state.auth.profile(&token).await?;
    Ok(HttpResponse::Ok().json(profile))
}

pub async fn request_email_verification(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let token = access_token(&req).ok_or_else(ApiError::unauthorized)?;
    let verification = state.email_verification.request(&token).await?;
    Ok(HttpResponse::Ok().json(verification))
}

pub async fn confirm_email_verification(
    state: web::Data<AppState>,
    body: web::Json<ConfirmEmailRequest>,
) -> Result<HttpResponse, ApiError> {
    let newly_verified = state.email_verification.confirm(&body.token).await?;
    Ok(HttpResponse::Ok().json(ConfirmEmailResponse {
        email_verified: true,
        already_verified: !newly_verified,
    }))
}

pub async fn customer_report(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let counts = state.store.counts().await.map_err(|e| {
        tracing::error!(error = %e, "Customer count query failed");
        ApiError::new(ErrorClass::System, "An internal error occurred, please try again later")
    })?;
    Ok(HttpResponse::Ok().json(counts))
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let report = state.health.check().await;
    if report.status.is_unhealthy() {
        HttpResponse::ServiceUnavailable().json(report)
    } else {
        HttpResponse::Ok().json(report)
    }
}

pub async fn metrics(state: web::Data<AppState>) -> HttpResponse {
    match state.metrics.render() {
        Ok(buffer) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(e) => {
            tracing::error!(error = %e, "Metrics encoding failed");
            HttpResponse::InternalServerError().finish()
        }
    }
}
