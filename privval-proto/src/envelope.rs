//! The envelope: exactly one protocol message per frame.
//!
//! On the wire an envelope is a single length-delimited protobuf field whose
//! field number is the message kind's tag. Decoding walks every top-level
//! field, so an envelope with zero, two or unknown variants is rejected
//! instead of letting the last field win.

use std::fmt;

use prost::encoding::{decode_varint, WireType};
use prost::Message;

use crate::error::FormatError;
use crate::messages::{
    PingRequest, PingResponse, PubKeyRequest, PubKeyResponse, SignProposalRequest,
    SignVoteRequest, SignedProposalResponse, SignedVoteResponse,
};
use crate::proto;
use crate::types::RemoteSignerError;

/// Message kinds and their permanent wire tags.
///
/// Tags are never reused or renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageKind {
    PubKeyRequest = 1,
    PubKeyResponse = 2,
    SignVoteRequest = 3,
    SignedVoteResponse = 4,
    SignProposalRequest = 5,
    SignedProposalResponse = 6,
    PingRequest = 7,
    PingResponse = 8,
}

impl MessageKind {
    pub const ALL: [MessageKind; 8] = [
        MessageKind::PubKeyRequest,
        MessageKind::PubKeyResponse,
        MessageKind::SignVoteRequest,
        MessageKind::SignedVoteResponse,
        MessageKind::SignProposalRequest,
        MessageKind::SignedProposalResponse,
        MessageKind::PingRequest,
        MessageKind::PingResponse,
    ];

    pub const fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub fn is_request(self) -> bool {
        self.response_kind().is_some()
    }

    /// The only kind a responder may answer this request with.
    pub fn response_kind(self) -> Option<MessageKind> {
        match self {
            MessageKind::PubKeyRequest => Some(MessageKind::PubKeyResponse),
            MessageKind::SignVoteRequest => Some(MessageKind::SignedVoteResponse),
            MessageKind::SignProposalRequest => Some(MessageKind::SignedProposalResponse),
            MessageKind::PingRequest => Some(MessageKind::PingResponse),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageKind::PubKeyRequest => "PubKeyRequest",
            MessageKind::PubKeyResponse => "PubKeyResponse",
            MessageKind::SignVoteRequest => "SignVoteRequest",
            MessageKind::SignedVoteResponse => "SignedVoteResponse",
            MessageKind::SignProposalRequest => "SignProposalRequest",
            MessageKind::SignedProposalResponse => "SignedProposalResponse",
            MessageKind::PingRequest => "PingRequest",
            MessageKind::PingResponse => "PingResponse",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One protocol message, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    PubKeyRequest(PubKeyRequest),
    PubKeyResponse(PubKeyResponse),
    SignVoteRequest(SignVoteRequest),
    SignedVoteResponse(SignedVoteResponse),
    SignProposalRequest(SignProposalRequest),
    SignedProposalResponse(SignedProposalResponse),
    PingRequest(PingRequest),
    PingResponse(PingResponse),
}

impl Envelope {
    pub fn kind(&self) -> MessageKind {
        match self {
            Envelope::PubKeyRequest(_) => MessageKind::PubKeyRequest,
            Envelope::PubKeyResponse(_) => MessageKind::PubKeyResponse,
            Envelope::SignVoteRequest(_) => MessageKind::SignVoteRequest,
            Envelope::SignedVoteResponse(_) => MessageKind::SignedVoteResponse,
            Envelope::SignProposalRequest(_) => MessageKind::SignProposalRequest,
            Envelope::SignedProposalResponse(_) => MessageKind::SignedProposalResponse,
            Envelope::PingRequest(_) => MessageKind::PingRequest,
            Envelope::PingResponse(_) => MessageKind::PingResponse,
        }
    }

    /// The decline carried by a response, if any.
    pub fn remote_error(&self) -> Option<&RemoteSignerError> {
        match self {
            Envelope::PubKeyResponse(resp) => resp.error.as_ref(),
            Envelope::SignedVoteResponse(resp) => resp.error.as_ref(),
            Envelope::SignedProposalResponse(resp) => resp.error.as_ref(),
            _ => None,
        }
    }

    /// Deterministic wire encoding of this envelope.
    pub fn encode(&self) -> Vec<u8> {
        let tag = self.kind().tag();
        match self {
            Envelope::PubKeyRequest(req) => encode_field(tag, &proto::PubKeyRequest::from(req)),
            Envelope::PubKeyResponse(resp) => {
                encode_field(tag, &proto::PubKeyResponse::from(resp))
            }
            Envelope::SignVoteRequest(req) => {
                encode_field(tag, &proto::SignVoteRequest::from(req))
            }
            Envelope::SignedVoteResponse(resp) => {
                encode_field(tag, &proto::SignedVoteResponse::from(resp))
            }
            Envelope::SignProposalRequest(req) => {
                encode_field(tag, &proto::SignProposalRequest::from(req))
            }
            Envelope::SignedProposalResponse(resp) => {
                encode_field(tag, &proto::SignedProposalResponse::from(resp))
            }
            Envelope::PingRequest(_) => encode_field(tag, &proto::PingRequest {}),
            Envelope::PingResponse(_) => encode_field(tag, &proto::PingResponse {}),
        }
    }

    pub fn decode(mut bytes: &[u8]) -> Result<Self, FormatError> {
        let mut decoded: Option<Envelope> = None;

        while !bytes.is_empty() {
            let (tag, wire_type) = decode_envelope_key(&mut bytes)?;
            let kind = MessageKind::from_tag(tag).ok_or(FormatError::UnknownVariant(tag))?;
            if wire_type != WireType::LengthDelimited {
                return Err(FormatError::UnexpectedWireType {
                    tag,
                    wire_type: wire_type as u8,
                });
            }

            let len = decode_varint(&mut bytes)?;
            let len = usize::try_from(len)
                .ok()
                .filter(|len| *len <= bytes.len())
                .ok_or(FormatError::Truncated {
                    needed: len.try_into().unwrap_or(usize::MAX),
                    available: bytes.len(),
                })?;
            let (body, rest) = bytes.split_at(len);
            bytes = rest;

            if decoded.is_some() {
                return Err(FormatError::MultipleVariants);
            }
            decoded = Some(decode_variant(kind, body)?);
        }

        decoded.ok_or(FormatError::EmptyEnvelope)
    }
}

/// Like `prost::encoding::decode_key`, but field number 0 is passed through
/// so it is reported as an unknown variant rather than a body error.
fn decode_envelope_key(bytes: &mut &[u8]) -> Result<(u32, WireType), FormatError> {
    let key = decode_varint(bytes)?;
    let wire_type = WireType::try_from(key & 0x07)?;
    let tag = u32::try_from(key >> 3).unwrap_or(u32::MAX);
    Ok((tag, wire_type))
}

fn encode_field<M: Message>(tag: u32, msg: &M) -> Vec<u8> {
    let mut buf = Vec::with_capacity(msg.encoded_len() + 6);
    prost::encoding::message::encode(tag, msg, &mut buf);
    buf
}

fn decode_variant(kind: MessageKind, body: &[u8]) -> Result<Envelope, FormatError> {
    let envelope = match kind {
        MessageKind::PubKeyRequest => {
            Envelope::PubKeyRequest(proto::PubKeyRequest::decode(body)?.into())
        }
        MessageKind::PubKeyResponse => {
            Envelope::PubKeyResponse(proto::RawPubKeyResponse::decode(body)?.try_into()?)
        }
        MessageKind::SignVoteRequest => {
            Envelope::SignVoteRequest(proto::SignVoteRequest::decode(body)?.try_into()?)
        }
        MessageKind::SignedVoteResponse => {
            Envelope::SignedVoteResponse(proto::SignedVoteResponse::decode(body)?.try_into()?)
        }
        MessageKind::SignProposalRequest => {
            Envelope::SignProposalRequest(proto::SignProposalRequest::decode(body)?.try_into()?)
        }
        MessageKind::SignedProposalResponse => Envelope::SignedProposalResponse(
            proto::SignedProposalResponse::decode(body)?.try_into()?,
        ),
        MessageKind::PingRequest => {
            proto::PingRequest::decode(body)?;
            Envelope::PingRequest(PingRequest)
        }
        MessageKind::PingResponse => {
            proto::PingResponse::decode(body)?;
            Envelope::PingResponse(PingResponse)
        }
    };
    Ok(envelope)
}

macro_rules! impl_wrap {
    ($($body:ident),* $(,)?) => {
        $(
            impl From<$body> for Envelope {
                fn from(body: $body) -> Self {
                    Envelope::$body(body)
                }
            }
        )*
    };
}

impl_wrap!(
    PubKeyRequest,
    PubKeyResponse,
    SignVoteRequest,
    SignedVoteResponse,
    SignProposalRequest,
    SignedProposalResponse,
    PingRequest,
    PingResponse,
);
