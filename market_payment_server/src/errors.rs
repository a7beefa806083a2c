use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use market_payment_engine::traits::PaymentGatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(#[from] PaymentGatewayError),
    #[error("Auth token signature invalid or not provided")]
    CouldNotDeserializeAuthToken,
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("Webhook signature is missing or invalid")]
    WebhookSignatureInvalid,
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BackendError(e) => backend_status_code(e),
            Self::CouldNotDeserializeAuthToken => StatusCode::BAD_REQUEST,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
                AuthError::ValidationError(_) => StatusCode::UNAUTHORIZED,
                AuthError::PoorlyFormattedToken(_) => StatusCode::BAD_REQUEST,
            },
            Self::WebhookSignatureInvalid => StatusCode::FORBIDDEN,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

/// The engine's taxonomy mapped onto HTTP:
/// validation failures are the client's fault (400), state-machine refusals
/// are conflicts (409), lookups that found nothing are 404.
fn backend_status_code(e: &PaymentGatewayError) -> StatusCode {
    use PaymentGatewayError::*;
    match e {
        AmountMismatch { .. } | InventoryConflict(_) | DiscountInvalid(_) | DriverRequired(_) => StatusCode::BAD_REQUEST,
        InvalidTransition { .. } | PaymentAlreadyTerminal { .. } | PaymentNotApproved(_) | DriverUnavailable { .. } => {
            StatusCode::CONFLICT
        },
        PaymentNotFound(_) | OrderNotFound(_) | StoreNotFound(_) | ProductNotFound(_) => StatusCode::NOT_FOUND,
        NotAuthorized(_) => StatusCode::FORBIDDEN,
        DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("Token signature is invalid. {0}")]
    ValidationError(String),
    #[error("Token is not in the correct format. {0}")]
    PoorlyFormattedToken(String),
}
