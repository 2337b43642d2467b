use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Error body returned by the HTTP boundary.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Structured detail a client can act on (e.g., requested/available stock)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Errors surfaced by the service layer.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Gateway error: {0}")]
    GatewayError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ServiceError::InvalidStateTransition(_) => StatusCode::CONFLICT,
            ServiceError::InsufficientStock { .. } => StatusCode::CONFLICT,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::GatewayError(_) => StatusCode::BAD_GATEWAY,
            ServiceError::DatabaseError(_)
            | ServiceError::EventError(_)
            | ServiceError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured detail exposed to clients. Internal errors expose nothing.
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ServiceError::InsufficientStock {
                product_id,
                requested,
                available,
            } => Some(json!({
                "product_id": product_id,
                "requested": requested,
                "available": available,
            })),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Never leak query or connection detail to the client.
        let message = match &self {
            ServiceError::DatabaseError(_)
            | ServiceError::EventError(_)
            | ServiceError::InternalError(_) => {
                tracing::error!(error = %self, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown")
                .to_string(),
            message,
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_carries_structured_detail() {
        let product_id = Uuid::new_v4();
        let err = ServiceError::InsufficientStock {
            product_id,
            requested: 3,
            available: 1,
        };
        let details = err.details().unwrap();
        assert_eq!(details["requested"], 3);
        assert_eq!(details["available"], 1);
        assert_eq!(details["product_id"], json!(product_id));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn internal_errors_expose_no_detail() {
        let err = ServiceError::InternalError("pool exhausted".into());
        assert!(err.details().is_none());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
