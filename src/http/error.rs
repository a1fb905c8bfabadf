use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::auth::AuthError;
use crate::error::{Classified, ErrorClass};
use crate::registration::RegistrationError;

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    locked_until: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct ApiError {
    class: ErrorClass,
    message: String,
    locked_until: Option<DateTime<Utc>>,
}

impl ApiError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            locked_until: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Validation, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorClass::Authentication, AuthError::InvalidToken.to_string())
    }

    pub fn class(&self) -> ErrorClass {
        self.class
    }

    fn code(&self) -> &'static str {
        match self.class {
            ErrorClass::Validation => "validation_error",
            ErrorClass::Conflict => "conflict",
            ErrorClass::Dependency => "service_unavailable",
            ErrorClass::Authentication => "unauthorized",
            ErrorClass::Locked => "account_locked",
            ErrorClass::System => "internal_error",
        }
    }

    fn from_classified<E: Classified>(err: &E) -> Self {
        Self::new(err.class(), err.public_message())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self.class {
            ErrorClass::Validation => StatusCode::BAD_REQUEST,
            ErrorClass::Conflict => StatusCode::CONFLICT,
            ErrorClass::Dependency => StatusCode::SERVICE_UNAVAILABLE,
            ErrorClass::Authentication => StatusCode::UNAUTHORIZED,
            ErrorClass::Locked => StatusCode::LOCKED,
            ErrorClass::System => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.code(),
            message: &self.message,
            locked_until: self.locked_until,
        })
    }
}

impl From<RegistrationError> for ApiError {
    fn from(err: RegistrationError) -> Self {
        Self::from_classified(&err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let mut api = Self::from_classified(&err);
        if let AuthError::AccountLocked { until } = err {
            api.locked_until = Some(until);
        }
        api
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::StoreError;

    #[test]
    fn test_status_per_class() {
        let locked: ApiError = AuthError::AccountLocked { until: Utc::now() }.into();
        assert_eq!(locked.status_code(), StatusCode::LOCKED);
        assert!(locked.locked_until.is_some());

        let duplicate: ApiError = RegistrationError::DuplicateEmail("a@b.co".to_string()).into();
        assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);
        assert_eq!(duplicate.to_string(), "Email a@b.co is already registered");

        let unavailable: ApiError = RegistrationError::RegistryUnavailable.into();
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_system_error_message_is_generic() {
        let err: ApiError = AuthError::Storage(StoreError::Database(sqlx::Error::PoolTimedOut)).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.to_string().contains("pool"));
    }
}
