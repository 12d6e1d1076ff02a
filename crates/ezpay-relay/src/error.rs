use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use ezpay::{ApprovalInstructions, EzpayError};
use std::fmt;

/// HTTP face of an [`EzpayError`]: `{success: false, error, code}`.
#[derive(Debug)]
pub struct ApiError(pub EzpayError);

impl From<EzpayError> for ApiError {
    fn from(e: EzpayError) -> Self {
        ApiError(e)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl ApiError {
    /// Metrics label: `rejected` for client-side failures, `error` otherwise.
    pub fn outcome(&self) -> &'static str {
        if self.status_code().is_client_error() {
            "rejected"
        } else {
            "error"
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            EzpayError::BillNotFound => StatusCode::NOT_FOUND,
            EzpayError::BillAlreadyPaid | EzpayError::BillAlreadyExists => StatusCode::CONFLICT,
            EzpayError::TransactionFailed(_) | EzpayError::Chain(_) => StatusCode::BAD_GATEWAY,
            EzpayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EzpayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let code = self.0.code();
        let body = match &self.0 {
            EzpayError::InsufficientAllowance {
                token,
                spender,
                required,
                current,
            } => serde_json::json!({
                "success": false,
                "error": self.0.to_string(),
                "code": code,
                "instructions": ApprovalInstructions::approve(*token, *spender, *required, *current),
            }),
            EzpayError::Chain(msg) => {
                tracing::error!("Chain error: {}", msg);
                serde_json::json!({
                    "success": false,
                    "error": "Failed to reach the chain",
                    "code": code,
                })
            }
            EzpayError::Config(msg) => {
                tracing::error!("Internal error: {}", msg);
                serde_json::json!({
                    "success": false,
                    "error": "An internal error occurred",
                    "code": code,
                })
            }
            other => serde_json::json!({
                "success": false,
                "error": other.to_string(),
                "code": code,
            }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
