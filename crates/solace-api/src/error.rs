use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use solace_chat::{DispatchError, QuotaExceeded, StoreError};

const INTERNAL_MESSAGE: &str = "Internal server error";

/// The cause of a 500, carried as a response extension. The body only
/// shows it once [`with_internal_detail`] has run.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<FieldError>,
    },
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("account locked until {0}")]
    Locked(DateTime<Utc>),
    #[error(transparent)]
    Quota(#[from] QuotaExceeded),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Validation {
            details: vec![FieldError::new(field, message.clone())],
            message,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Locked(_) => StatusCode::LOCKED,
            Self::Quota(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Locked(_) => "account_locked",
            Self::Quota(_) => "session_limit_reached",
            Self::Internal(_) => "internal_error",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<FieldError>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let mut internal = None;
        let (message, details) = match self {
            Self::Validation { message, details } => (message, details),
            Self::Internal(e) => {
                error!(error = ?e, "Request failed with internal error");
                internal = Some(InternalDetail(format!("{:#}", e)));
                (INTERNAL_MESSAGE.to_string(), Vec::new())
            }
            other => (other.to_string(), Vec::new()),
        };

        let mut response = (
            status,
            Json(ErrorBody {
                error: code,
                message,
                details,
            }),
        )
            .into_response();
        if let Some(detail) = internal {
            response.extensions_mut().insert(detail);
        }
        response
    }
}

/// Rebuild a 500 response so its body lists the internal cause.
/// Responses without an [`InternalDetail`] pass through untouched.
pub fn with_internal_detail(response: Response) -> Response {
    let Some(InternalDetail(detail)) = response.extensions().get::<InternalDetail>().cloned()
    else {
        return response;
    };

    (
        response.status(),
        Json(ErrorBody {
            error: "internal_error",
            message: INTERNAL_MESSAGE.to_string(),
            details: vec![FieldError::new("internal", detail)],
        }),
    )
        .into_response()
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation {
            message: "Invalid request body".into(),
            details: vec![FieldError::new("body", rejection.body_text())],
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation {
            message: "Invalid query string".into(),
            details: vec![FieldError::new("query", rejection.body_text())],
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Validation { field, message } => Self::invalid(field, message),
            DispatchError::Store(StoreError::NotFound) => Self::NotFound("Conversation not found"),
            DispatchError::Store(StoreError::Forbidden) => {
                Self::Forbidden("Conversation belongs to another user")
            }
        }
    }
}
