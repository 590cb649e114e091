use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use paycode_engine::MonitorApiError;
use thiserror::Error;

use crate::data_objects::JsonResponse;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Could not read request: {0}")]
    InvalidRequestBody(String),
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Unknown merchant: {0}")]
    UnknownMerchant(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingField(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::UnknownMerchant(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Internal details stay in the logs
        let message = if status.is_server_error() {
            error!("💻️ Request failed. {self}");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        HttpResponse::build(status)
            .insert_header(ContentType::json())
            .body(serde_json::json!(JsonResponse::failure(message)).to_string())
    }
}

impl From<MonitorApiError> for ServerError {
    fn from(e: MonitorApiError) -> Self {
        match e {
            MonitorApiError::InvalidSignature => Self::InvalidSignature,
            MonitorApiError::UnknownMerchant(id) => Self::UnknownMerchant(id),
            MonitorApiError::InvalidKind(_) | MonitorApiError::InvalidPrice(_) => Self::InvalidRequestBody(e.to_string()),
            MonitorApiError::SecretNotConfigured(_) | MonitorApiError::DatabaseError(_) => {
                Self::BackendError(e.to_string())
            },
        }
    }
}
