//! Wire format of the privval remote signing protocol.
//!
//! A requester (the consensus node) and a responder (the key custodian)
//! exchange one [`Envelope`] per frame. Each envelope wraps exactly one
//! message, discriminated by a permanent numeric tag:
//!
//! ```text
//! PubKeyRequest         1    PubKeyResponse          2
//! SignVoteRequest       3    SignedVoteResponse      4
//! SignProposalRequest   5    SignedProposalResponse  6
//! PingRequest           7    PingResponse            8
//! ```
//!
//! Bodies are protobuf-encoded and deterministic: the same logical message
//! always produces the same bytes, so independently built peers agree
//! byte-for-byte. An empty `PingRequest` is the two bytes `3a00`.

pub mod envelope;
pub mod error;
pub mod messages;
pub mod proto;
pub mod types;

#[cfg(test)]
mod golden;

pub use envelope::{Envelope, MessageKind};
pub use error::FormatError;
pub use messages::{
    PingRequest, PingResponse, PubKeyRequest, PubKeyResponse, SignProposalRequest,
    SignVoteRequest, SignedProposalResponse, SignedVoteResponse,
};
pub use types::{
    BlockId, KeyAlgorithm, PartSetHeader, Proposal, PublicKey, RemoteSignerError, SignedMsgType,
    Timestamp, Vote,
};
