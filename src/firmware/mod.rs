mod emulated;

pub use emulated::{EmulatedNamespace, NamespaceFixture};

use std::fmt;

use thiserror::Error;

/// Fan information object (revision, fine grain flag, step size, low speed notification).
pub const FIF: &str = "_FIF";
/// Fan performance states.
pub const FPS: &str = "_FPS";
/// Fan set level.
pub const FSL: &str = "_FSL";
/// Fan status.
pub const FST: &str = "_FST";
/// Power to D0 (fully on).
pub const PS0: &str = "_PS0";
/// Power to D3 (off).
pub const PS3: &str = "_PS3";
/// Current device power state.
pub const PSC: &str = "_PSC";

/// A value returned by (or passed to) a firmware object evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedResult {
    Integer(u64),
    Buffer(Vec<u8>),
    Package(Vec<TypedResult>),
}

impl TypedResult {
    fn kind(&self) -> &'static str {
        match self {
            TypedResult::Integer(_) => "integer",
            TypedResult::Buffer(_) => "buffer",
            TypedResult::Package(_) => "package",
        }
    }
}

impl fmt::Display for TypedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedResult::Integer(value) => write!(f, "{:#x}", value),
            TypedResult::Buffer(bytes) => write!(f, "buffer[{}]", bytes.len()),
            TypedResult::Package(items) => write!(f, "package[{}]", items.len()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("object {0} not found")]
    NotFound(String),

    #[error("evaluation of {object} failed: {diagnostic}")]
    Evaluation { object: String, diagnostic: String },

    #[error("malformed reply: {0}")]
    MalformedData(String),
}

/// Boundary through which named firmware objects of one device are evaluated.
///
/// Calls are synchronous; the caller may block for the duration of an
/// evaluation. Implementations must be shareable across threads because a
/// device context is.
#[cfg_attr(test, mockall::automock)]
pub trait FirmwareGateway: Send + Sync {
    /// Hardware id (`_HID`) of the device this gateway is scoped to.
    fn hardware_id(&self) -> String;

    /// Whether the named object exists in the device scope.
    fn has_object(&self, name: &str) -> bool;

    /// Evaluate the named object with the given arguments.
    fn evaluate(&self, name: &str, args: &[TypedResult]) -> Result<TypedResult, GatewayError>;
}

/// Decode a reply as exactly `count` 32-bit words.
///
/// Accepts either a package of integers or a buffer of little-endian
/// DWORDs. Anything else (wrong length, wrong element type, values wider
/// than 32 bits) is rejected.
pub fn decode_words(object: &str, reply: &TypedResult, count: usize) -> Result<Vec<u32>, GatewayError> {
    match reply {
        TypedResult::Package(items) => {
            if items.len() != count {
                return Err(GatewayError::MalformedData(format!(
                    "{}: expected {} elements, got {}",
                    object,
                    count,
                    items.len()
                )));
            }
            items
                .iter()
                .enumerate()
                .map(|(index, item)| match item {
                    TypedResult::Integer(value) => u32::try_from(*value).map_err(|_| {
                        GatewayError::MalformedData(format!(
                            "{}: element {} ({:#x}) exceeds 32 bits",
                            object, index, value
                        ))
                    }),
                    other => Err(GatewayError::MalformedData(format!(
                        "{}: element {} is a {}, expected integer",
                        object,
                        index,
                        other.kind()
                    ))),
                })
                .collect()
        }
        TypedResult::Buffer(bytes) => {
            if bytes.len() != count * 4 {
                return Err(GatewayError::MalformedData(format!(
                    "{}: expected {} byte buffer, got {}",
                    object,
                    count * 4,
                    bytes.len()
                )));
            }
            Ok(bytes
                .chunks_exact(4)
                .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect())
        }
        other => Err(GatewayError::MalformedData(format!(
            "{}: expected package or buffer, got {}",
            object,
            other.kind()
        ))),
    }
}

/// Decode a reply that must be a single integer.
pub fn decode_integer(object: &str, reply: &TypedResult) -> Result<u64, GatewayError> {
    match reply {
        TypedResult::Integer(value) => Ok(*value),
        other => Err(GatewayError::MalformedData(format!(
            "{}: expected integer, got {}",
            object,
            other.kind()
        ))),
    }
}
