//! Decoding and validation errors for privval frames.

use thiserror::Error;

/// A frame or message body that cannot be turned into a protocol value.
///
/// Always fatal to the frame being decoded; nothing is coerced into a
/// default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("empty envelope: no message variant populated")]
    EmptyEnvelope,

    #[error("unknown envelope variant tag {0}")]
    UnknownVariant(u32),

    #[error("envelope carries more than one message variant")]
    MultipleVariants,

    #[error("envelope field {tag} has wire type {wire_type}, expected length-delimited")]
    UnexpectedWireType { tag: u32, wire_type: u8 },

    #[error("truncated frame: field needs {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("malformed message body: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("public key algorithm with wire tag {0} is not supported")]
    UnsupportedKeyAlgorithm(u32),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("{0} request must not carry a signature")]
    SignatureInRequest(&'static str),
}
