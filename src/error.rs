use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum MonitorError {
    /// A call to the backend failed (network, constraint or query error).
    #[error("Backend error: {0}")]
    Backend(#[from] sqlx::Error),

    /// User input rejected before reaching the backend.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Shipment not found: {0}")]
    ShipmentNotFound(Uuid),

    /// The change feed could not be established or was lost.
    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
