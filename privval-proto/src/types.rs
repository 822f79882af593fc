//! Consensus values carried end-to-end by the signing protocol.
//!
//! These are plain values: the wire layout lives in [`crate::proto`], and
//! the conversions here decide which nested fields are always written.
//! `BlockId`, `PartSetHeader` and `Timestamp` are never omitted from a vote
//! or proposal, even when zero-valued, so that the bytes match every other
//! implementation of the protocol.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::FormatError;
use crate::proto;

pub use crate::proto::SignedMsgType;

/// Number of bytes in a validator address.
pub const ADDRESS_LENGTH: usize = 20;

/// Seconds from the unix epoch back to 0001-01-01T00:00:00Z.
pub const ZERO_TIME_SECONDS: i64 = -62_135_596_800;

const NANOS_PER_SECOND: i32 = 1_000_000_000;

/// A UTC instant with nanosecond precision.
///
/// The default value is 0001-01-01T00:00:00Z, the zero time every peer
/// writes for an unset timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    seconds: i64,
    nanos: i32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp {
        seconds: ZERO_TIME_SECONDS,
        nanos: 0,
    };

    pub fn new(seconds: i64, nanos: i32) -> Result<Self, FormatError> {
        if !(0..NANOS_PER_SECOND).contains(&nanos) {
            return Err(FormatError::InvalidField {
                field: "timestamp.nanos",
                reason: format!("{nanos} is outside 0..{NANOS_PER_SECOND}"),
            });
        }
        Ok(Self { seconds, nanos })
    }

    /// Whole seconds since the unix epoch, no sub-second part.
    pub const fn from_unix_seconds(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn nanos(&self) -> i32 {
        self.nanos
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<Timestamp> for proto::Timestamp {
    fn from(ts: Timestamp) -> Self {
        proto::Timestamp {
            seconds: ts.seconds,
            nanos: ts.nanos,
        }
    }
}

impl TryFrom<proto::Timestamp> for Timestamp {
    type Error = FormatError;

    fn try_from(ts: proto::Timestamp) -> Result<Self, Self::Error> {
        Timestamp::new(ts.seconds, ts.nanos)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PartSetHeader {
    pub total: u32,
    pub hash: Vec<u8>,
}

/// Reference to a block: its hash plus the header of its part set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BlockId {
    pub hash: Vec<u8>,
    pub part_set_header: PartSetHeader,
}

impl BlockId {
    pub fn is_zero(&self) -> bool {
        self.hash.is_empty() && self.part_set_header == PartSetHeader::default()
    }
}

impl From<&BlockId> for proto::BlockId {
    fn from(id: &BlockId) -> Self {
        proto::BlockId {
            hash: id.hash.clone(),
            part_set_header: Some(proto::PartSetHeader {
                total: id.part_set_header.total,
                hash: id.part_set_header.hash.clone(),
            }),
        }
    }
}

impl From<proto::BlockId> for BlockId {
    fn from(id: proto::BlockId) -> Self {
        let part_set_header = id
            .part_set_header
            .map(|psh| PartSetHeader {
                total: psh.total,
                hash: psh.hash,
            })
            .unwrap_or_default();
        BlockId {
            hash: id.hash,
            part_set_header,
        }
    }
}

/// A prevote or precommit from a validator.
///
/// `signature` is empty in sign requests and filled by the responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub msg_type: SignedMsgType,
    pub height: i64,
    pub round: i32,
    pub block_id: BlockId,
    pub timestamp: Timestamp,
    pub validator_address: Vec<u8>,
    pub validator_index: i32,
    pub signature: Vec<u8>,
}

impl Default for Vote {
    fn default() -> Self {
        Self {
            msg_type: SignedMsgType::Unknown,
            height: 0,
            round: 0,
            block_id: BlockId::default(),
            timestamp: Timestamp::ZERO,
            validator_address: Vec::new(),
            validator_index: 0,
            signature: Vec::new(),
        }
    }
}

impl Vote {
    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }
}

impl From<&Vote> for proto::Vote {
    fn from(vote: &Vote) -> Self {
        proto::Vote {
            msg_type: vote.msg_type as i32,
            height: vote.height,
            round: vote.round,
            block_id: Some((&vote.block_id).into()),
            timestamp: Some(vote.timestamp.into()),
            validator_address: vote.validator_address.clone(),
            validator_index: vote.validator_index,
            signature: vote.signature.clone(),
        }
    }
}

impl TryFrom<proto::Vote> for Vote {
    type Error = FormatError;

    fn try_from(vote: proto::Vote) -> Result<Self, Self::Error> {
        Ok(Vote {
            msg_type: msg_type_from_wire("vote.type", vote.msg_type)?,
            height: vote.height,
            round: vote.round,
            block_id: vote.block_id.map(BlockId::from).unwrap_or_default(),
            timestamp: timestamp_from_wire(vote.timestamp)?,
            validator_address: vote.validator_address,
            validator_index: vote.validator_index,
            signature: vote.signature,
        })
    }
}

/// A block proposal for a height and round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub msg_type: SignedMsgType,
    pub height: i64,
    pub round: i32,
    pub pol_round: i32,
    pub block_id: BlockId,
    pub timestamp: Timestamp,
    pub signature: Vec<u8>,
}

impl Default for Proposal {
    fn default() -> Self {
        Self {
            msg_type: SignedMsgType::Unknown,
            height: 0,
            round: 0,
            pol_round: 0,
            block_id: BlockId::default(),
            timestamp: Timestamp::ZERO,
            signature: Vec::new(),
        }
    }
}

impl Proposal {
    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }
}

impl From<&Proposal> for proto::Proposal {
    fn from(proposal: &Proposal) -> Self {
        proto::Proposal {
            msg_type: proposal.msg_type as i32,
            height: proposal.height,
            round: proposal.round,
            pol_round: proposal.pol_round,
            block_id: Some((&proposal.block_id).into()),
            timestamp: Some(proposal.timestamp.into()),
            signature: proposal.signature.clone(),
        }
    }
}

impl TryFrom<proto::Proposal> for Proposal {
    type Error = FormatError;

    fn try_from(proposal: proto::Proposal) -> Result<Self, Self::Error> {
        Ok(Proposal {
            msg_type: msg_type_from_wire("proposal.type", proposal.msg_type)?,
            height: proposal.height,
            round: proposal.round,
            pol_round: proposal.pol_round,
            block_id: proposal.block_id.map(BlockId::from).unwrap_or_default(),
            timestamp: timestamp_from_wire(proposal.timestamp)?,
            signature: proposal.signature,
        })
    }
}

fn msg_type_from_wire(field: &'static str, value: i32) -> Result<SignedMsgType, FormatError> {
    SignedMsgType::from_i32(value).ok_or_else(|| FormatError::InvalidField {
        field,
        reason: format!("unknown signed message type {value}"),
    })
}

fn timestamp_from_wire(ts: Option<proto::Timestamp>) -> Result<Timestamp, FormatError> {
    match ts {
        Some(ts) => ts.try_into(),
        // a peer that treats the field as optional may leave it out
        None => Ok(Timestamp::ZERO),
    }
}

/// Signature algorithm of a [`PublicKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    Ed25519,
    Secp256k1,
    Dilithium,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyAlgorithm::Ed25519 => "ed25519",
            KeyAlgorithm::Secp256k1 => "secp256k1",
            KeyAlgorithm::Dilithium => "dilithium",
        };
        f.write_str(name)
    }
}

/// Raw public key bytes tagged with their algorithm.
///
/// New algorithms are added as new variants with new wire tags; existing
/// tags never change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PublicKey {
    Ed25519(Vec<u8>),
    Secp256k1(Vec<u8>),
    Dilithium(Vec<u8>),
}

impl PublicKey {
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            PublicKey::Ed25519(_) => KeyAlgorithm::Ed25519,
            PublicKey::Secp256k1(_) => KeyAlgorithm::Secp256k1,
            PublicKey::Dilithium(_) => KeyAlgorithm::Dilithium,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PublicKey::Ed25519(bytes) | PublicKey::Secp256k1(bytes) | PublicKey::Dilithium(bytes) => {
                bytes
            }
        }
    }

    /// Validator address: the first 20 bytes of SHA-256 over the key.
    pub fn address(&self) -> [u8; ADDRESS_LENGTH] {
        let digest = Sha256::digest(self.as_bytes());
        let mut address = [0u8; ADDRESS_LENGTH];
        address.copy_from_slice(&digest[..ADDRESS_LENGTH]);
        address
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:0x{}", self.algorithm(), hex::encode(self.as_bytes()))
    }
}

impl From<&PublicKey> for proto::PublicKey {
    fn from(key: &PublicKey) -> Self {
        use proto::public_key::Sum;

        let sum = match key {
            PublicKey::Ed25519(bytes) => Sum::Ed25519(bytes.clone()),
            PublicKey::Secp256k1(bytes) => Sum::Secp256k1(bytes.clone()),
            PublicKey::Dilithium(bytes) => Sum::Dilithium(bytes.clone()),
        };
        proto::PublicKey { sum: Some(sum) }
    }
}

/// Wire tags of the key algorithms this build understands.
const KNOWN_KEY_TAGS: [u32; 3] = [1, 2, 3];

/// Decode a raw `PublicKey` message. An empty message is no key; a key of an
/// algorithm this build does not know is an error.
pub(crate) fn public_key_from_wire(raw: &[u8]) -> Result<Option<PublicKey>, FormatError> {
    use prost::encoding::{decode_key, skip_field, DecodeContext};
    use prost::Message;
    use proto::public_key::Sum;

    let mut fields = raw;
    while !fields.is_empty() {
        let (tag, wire_type) = decode_key(&mut fields)?;
        if !KNOWN_KEY_TAGS.contains(&tag) {
            return Err(FormatError::UnsupportedKeyAlgorithm(tag));
        }
        skip_field(wire_type, tag, &mut fields, DecodeContext::default())?;
    }

    let key = proto::PublicKey::decode(raw)?;
    Ok(key.sum.map(|sum| match sum {
        Sum::Ed25519(bytes) => PublicKey::Ed25519(bytes),
        Sum::Secp256k1(bytes) => PublicKey::Secp256k1(bytes),
        Sum::Dilithium(bytes) => PublicKey::Dilithium(bytes),
    }))
}

/// A decline from the key custodian.
///
/// Carried as regular response content, never as a transport fault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, thiserror::Error)]
#[error("remote signer error {code}: {description}")]
pub struct RemoteSignerError {
    pub code: i32,
    pub description: String,
}

impl RemoteSignerError {
    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

impl From<&RemoteSignerError> for proto::RemoteSignerError {
    fn from(err: &RemoteSignerError) -> Self {
        proto::RemoteSignerError {
            code: err.code,
            description: err.description.clone(),
        }
    }
}

impl From<proto::RemoteSignerError> for RemoteSignerError {
    fn from(err: proto::RemoteSignerError) -> Self {
        RemoteSignerError {
            code: err.code,
            description: err.description,
        }
    }
}
