use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Error surface of the order API. Maps the lifecycle taxonomy onto HTTP:
/// validation 400, unknown merchant/order 404, bad webhook signature 401,
/// upstream gateway failure 502.
#[derive(Debug)]
pub enum ApiError {
    Validation { message: String },
    NotFound { code: &'static str },
    Unauthorized { code: &'static str },
    Gateway { message: String },
    Internal { message: Option<String> },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str) -> Self {
        Self::NotFound { code }
    }

    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway {
            message: message.into(),
        }
    }

    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        Self::Internal {
            message: Some(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body, error_code) = match self {
            ApiError::Validation { message } => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "validation_error".into(),
                    message: Some(message),
                },
                "validation_error",
            ),
            ApiError::NotFound { code } => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: code.into(),
                    message: None,
                },
                code,
            ),
            ApiError::Unauthorized { code } => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: code.into(),
                    message: None,
                },
                code,
            ),
            ApiError::Gateway { message } => (
                StatusCode::BAD_GATEWAY,
                ErrorBody {
                    code: "gateway_error".into(),
                    message: Some(message),
                },
                "gateway_error",
            ),
            ApiError::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    code: "internal_error".into(),
                    message,
                },
                "internal_error",
            ),
        };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
