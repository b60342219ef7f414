use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use crate::{
    codec::{DecodeError, EncodeError, Envelope, write_json},
    store::StoreError,
};

pub type AppResult<T> = Result<T, AppError>;

const NOT_FOUND_MESSAGE: &str = "the requested resource could not be found";
const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";
const UNAVAILABLE_MESSAGE: &str = "the service is temporarily unable to reach its data store";

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("{0}")]
    BadRequest(String),
    #[error("the requested resource could not be found")]
    NotFound,
    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(Method),
    #[error("store unavailable: {0}")]
    Unavailable(StoreError),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Decode(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::Store(StoreError::InvalidId | StoreError::RecordNotFound) => {
                StatusCode::NOT_FOUND
            }
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) | Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Server-side failures get a fixed text; their
    /// detail only goes to the log.
    fn public_message(&self) -> String {
        match self {
            Self::Decode(_) | Self::BadRequest(_) | Self::MethodNotAllowed(_) => self.to_string(),
            Self::NotFound | Self::Store(StoreError::InvalidId | StoreError::RecordNotFound) => {
                NOT_FOUND_MESSAGE.to_string()
            }
            Self::Unavailable(_) => UNAVAILABLE_MESSAGE.to_string(),
            Self::Store(_) | Self::Encode(_) => SERVER_ERROR_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "request rejected");
        }

        error_response(status, &self.public_message())
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    write_json(status, &Envelope::new("error", message), None)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
