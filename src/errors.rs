use thiserror::Error;

use crate::firmware::GatewayError;

#[derive(Error, Debug)]
pub enum FanError {
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("value {value} out of range ({domain})")]
    OutOfRange { value: i64, domain: String },

    #[error("malformed firmware data: {0}")]
    MalformedData(String),

    #[error("firmware error: {0}")]
    Firmware(String),

    #[error("fan power state is unknown; set power explicitly to resolve it")]
    PowerStateUnknown,

    #[error("fan is powered off")]
    PoweredOff,

    #[error("endpoint '{0}' not found")]
    NoSuchEndpoint(String),

    #[error("endpoint '{0}' is read-only")]
    ReadOnly(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<GatewayError> for FanError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::NotFound(name) => {
                FanError::Unsupported(format!("firmware object {} not present", name))
            }
            GatewayError::Evaluation { object, diagnostic } => {
                FanError::Firmware(format!("{}: {}", object, diagnostic))
            }
            GatewayError::MalformedData(message) => FanError::MalformedData(message),
        }
    }
}
