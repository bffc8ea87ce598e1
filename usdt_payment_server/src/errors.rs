use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use thiserror::Error;
use usdt_payment_engine::{AgentError, LedgerError, RescanError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Admin token missing or invalid.")]
    Unauthorized,
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The request cannot be applied. {0}")]
    UnprocessableRequest(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::UnprocessableRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<LedgerError> for ServerError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::OrderNotFound(oid) => ServerError::NoRecordFound(format!("Order {oid}")),
            LedgerError::TransferNotFound(txid) => ServerError::NoRecordFound(format!("Transfer {txid}")),
            other => ServerError::BackendError(other.to_string()),
        }
    }
}

impl From<RescanError> for ServerError {
    fn from(e: RescanError) -> Self {
        match e {
            RescanError::OrderNotFound(oid) => ServerError::NoRecordFound(format!("Order {oid}")),
            RescanError::TransferNotFound(txid) => ServerError::NoRecordFound(format!("Transfer {txid}")),
            RescanError::Ledger(other) => ServerError::BackendError(other.to_string()),
        }
    }
}

impl From<AgentError> for ServerError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::AgentNotFound(id) => ServerError::NoRecordFound(format!("Agent {id}")),
            AgentError::WithdrawalNotFound(id) => ServerError::NoRecordFound(format!("Withdrawal request {id}")),
            e @ AgentError::InsufficientBalance { .. } => ServerError::UnprocessableRequest(e.to_string()),
            e @ AgentError::InvalidStateTransition { .. } => ServerError::UnprocessableRequest(e.to_string()),
            e @ AgentError::InvalidAmount(_) => ServerError::UnprocessableRequest(e.to_string()),
            AgentError::DatabaseError(e) => ServerError::BackendError(e),
        }
    }
}
