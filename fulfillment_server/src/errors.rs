use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use fulfillment_engine::{
    status::TransitionError,
    traits::InventoryError,
    CheckoutError,
    OrderFlowError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Invalid request. {0}")]
    ValidationError(String),
    #[error("{0}")]
    TransitionRejected(String),
    #[error("The write lost a race; please retry. {0}")]
    WriteConflict(String),
    #[error("Not enough stock. {0}")]
    OutOfStock(String),
    #[error("Too many requests from this address. Try again shortly.")]
    RateLimited,
    #[error("This endpoint is not configured and refuses to run. {0}")]
    FailClosed(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingApiKey => StatusCode::UNAUTHORIZED,
                AuthError::UnknownApiKey => StatusCode::UNAUTHORIZED,
                AuthError::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
                AuthError::InvalidSharedSecret => StatusCode::UNAUTHORIZED,
            },
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::TransitionRejected(_) => StatusCode::CONFLICT,
            Self::WriteConflict(_) => StatusCode::CONFLICT,
            Self::OutOfStock(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::FailClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
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

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No API key was provided.")]
    MissingApiKey,
    #[error("The API key is not recognised.")]
    UnknownApiKey,
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("The shared secret is missing or does not match.")]
    InvalidSharedSecret,
}

impl From<OrderFlowError> for ServerError {
    fn from(e: OrderFlowError) -> Self {
        match e {
            OrderFlowError::OrderNotFound(order_ref) => Self::NoRecordFound(format!("Order {order_ref}")),
            OrderFlowError::InvalidRequest(msg) => Self::ValidationError(msg),
            OrderFlowError::Transition(e) => Self::TransitionRejected(e.to_string()),
            OrderFlowError::Inventory(e) => ServerError::from(e),
            OrderFlowError::Database(e) => match e {
                fulfillment_engine::traits::FulfillmentDbError::StaleStatus { .. } => {
                    Self::WriteConflict(e.to_string())
                },
                fulfillment_engine::traits::FulfillmentDbError::OrderNotFound(order_ref) => {
                    Self::NoRecordFound(format!("Order {order_ref}"))
                },
                e => Self::BackendError(e.to_string()),
            },
        }
    }
}

impl From<InventoryError> for ServerError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::SkuNotFound(sku) => Self::NoRecordFound(format!("SKU {sku}")),
            InventoryError::Conflict { .. } => Self::WriteConflict(e.to_string()),
            InventoryError::Depleted { .. } => Self::OutOfStock(e.to_string()),
            InventoryError::DatabaseError(msg) => Self::BackendError(msg),
        }
    }
}

impl From<CheckoutError> for ServerError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::Validation(msg) => Self::ValidationError(msg),
            CheckoutError::InsufficientStock { .. } => Self::OutOfStock(e.to_string()),
            CheckoutError::BelowProcessorMinimum { .. } => Self::ValidationError(e.to_string()),
            CheckoutError::ProcessorUnavailable(msg) => Self::BackendError(msg),
            CheckoutError::Database(e) => Self::BackendError(e.to_string()),
            CheckoutError::Inventory(e) => ServerError::from(e),
        }
    }
}

impl From<TransitionError> for ServerError {
    fn from(e: TransitionError) -> Self {
        Self::TransitionRejected(e.to_string())
    }
}
