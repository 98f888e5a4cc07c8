use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

pub const INVALID_ORDER_DETAILS: &str = "Invalid orderDetails format. Must be a valid JSON object.";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidPayload(String),

    #[error("Missing required fields: customer_email, platform, items, or total_amount")]
    MissingFields,

    #[error("Unsupported platform '{0}'. Expected one of: fiverr, upwork.")]
    UnsupportedPlatform(String),

    #[error("Product with ID {0} does not exist.")]
    ProductNotFound(String),

    #[error("Not enough stock for product '{name}'. Available: {available}, Requested: {requested}.")]
    InsufficientStock {
        name: String,
        available: i64,
        requested: i64,
    },

    #[error("Invalid quantity for product '{0}'. Quantity must be greater than 0.")]
    InvalidQuantity(String),

    #[error("Cannot order more than {max} units of '{name}'.")]
    QuantityLimitExceeded { name: String, max: i64 },

    #[error("Category not found")]
    CategoryNotFound,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid input: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("newsletter with this email already exists.")]
    AlreadySubscribed,

    #[error("Database error: {0}")]
    Store(#[from] StoreError),

    #[error("File storage error: {0}")]
    Media(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn invalid_payload() -> Self {
        AppError::InvalidPayload(INVALID_ORDER_DETAILS.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::CategoryNotFound | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Store(_) | AppError::Media(_) | AppError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut response = HttpResponse::build(self.status_code());
        match self {
            AppError::Validation(errors) => response.json(errors),
            AppError::AlreadySubscribed => response.json(json!({ "email": [self.to_string()] })),
            AppError::Store(_) | AppError::Media(_) | AppError::Config(_) => {
                error!("Responding with server error: {}", self);
                response.json(json!({ "error": "An internal error occurred" }))
            }
            _ => response.json(json!({ "error": self.to_string() })),
        }
    }
}
