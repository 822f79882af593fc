//! Request and response bodies exchanged between requester and responder.

use crate::error::FormatError;
use crate::proto;
use crate::types::{public_key_from_wire, Proposal, PublicKey, RemoteSignerError, Vote};

/// Asks the custodian for the consensus public key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubKeyRequest {
    pub chain_id: String,
}

/// The consensus public key, or a decline.
///
/// `pub_key` is `None` when the custodian declined or when it answered with
/// an algorithm this build does not know.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubKeyResponse {
    pub pub_key: Option<PublicKey>,
    pub error: Option<RemoteSignerError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignVoteRequest {
    pub vote: Vote,
    pub chain_id: String,
}

/// A signed vote, or a decline. When `error` is set the vote is a
/// placeholder and must be ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedVoteResponse {
    pub vote: Vote,
    pub error: Option<RemoteSignerError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignProposalRequest {
    pub proposal: Proposal,
    pub chain_id: String,
}

/// A signed proposal, or a decline. When `error` is set the proposal is a
/// placeholder and must be ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedProposalResponse {
    pub proposal: Proposal,
    pub error: Option<RemoteSignerError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PingRequest;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PingResponse;

impl SignedVoteResponse {
    pub fn declined(error: RemoteSignerError) -> Self {
        Self {
            vote: Vote::default(),
            error: Some(error),
        }
    }
}

impl SignedProposalResponse {
    pub fn declined(error: RemoteSignerError) -> Self {
        Self {
            proposal: Proposal::default(),
            error: Some(error),
        }
    }
}

impl From<&PubKeyRequest> for proto::PubKeyRequest {
    fn from(req: &PubKeyRequest) -> Self {
        proto::PubKeyRequest {
            chain_id: req.chain_id.clone(),
        }
    }
}

impl From<proto::PubKeyRequest> for PubKeyRequest {
    fn from(req: proto::PubKeyRequest) -> Self {
        PubKeyRequest {
            chain_id: req.chain_id,
        }
    }
}

impl From<&PubKeyResponse> for proto::PubKeyResponse {
    fn from(resp: &PubKeyResponse) -> Self {
        // the key field is always written, empty when there is no key
        let pub_key = resp.pub_key.as_ref().map(proto::PublicKey::from).unwrap_or_default();
        proto::PubKeyResponse {
            pub_key: Some(pub_key),
            error: resp.error.as_ref().map(Into::into),
        }
    }
}

impl TryFrom<proto::RawPubKeyResponse> for PubKeyResponse {
    type Error = FormatError;

    fn try_from(resp: proto::RawPubKeyResponse) -> Result<Self, Self::Error> {
        let pub_key = match resp.pub_key {
            Some(raw) => public_key_from_wire(&raw)?,
            None => None,
        };
        Ok(PubKeyResponse {
            pub_key,
            error: resp.error.map(Into::into),
        })
    }
}

impl From<&SignVoteRequest> for proto::SignVoteRequest {
    fn from(req: &SignVoteRequest) -> Self {
        proto::SignVoteRequest {
            vote: Some((&req.vote).into()),
            chain_id: req.chain_id.clone(),
        }
    }
}

impl TryFrom<proto::SignVoteRequest> for SignVoteRequest {
    type Error = FormatError;

    fn try_from(req: proto::SignVoteRequest) -> Result<Self, Self::Error> {
        let vote = req.vote.ok_or(FormatError::MissingField("vote"))?;
        Ok(SignVoteRequest {
            vote: vote.try_into()?,
            chain_id: req.chain_id,
        })
    }
}

impl From<&SignedVoteResponse> for proto::SignedVoteResponse {
    fn from(resp: &SignedVoteResponse) -> Self {
        proto::SignedVoteResponse {
            vote: Some((&resp.vote).into()),
            error: resp.error.as_ref().map(Into::into),
        }
    }
}

impl TryFrom<proto::SignedVoteResponse> for SignedVoteResponse {
    type Error = FormatError;

    fn try_from(resp: proto::SignedVoteResponse) -> Result<Self, Self::Error> {
        let vote = match resp.vote {
            Some(vote) => vote.try_into()?,
            None => Vote::default(),
        };
        Ok(SignedVoteResponse {
            vote,
            error: resp.error.map(Into::into),
        })
    }
}

impl From<&SignProposalRequest> for proto::SignProposalRequest {
    fn from(req: &SignProposalRequest) -> Self {
        proto::SignProposalRequest {
            proposal: Some((&req.proposal).into()),
            chain_id: req.chain_id.clone(),
        }
    }
}

impl TryFrom<proto::SignProposalRequest> for SignProposalRequest {
    type Error = FormatError;

    fn try_from(req: proto::SignProposalRequest) -> Result<Self, Self::Error> {
        let proposal = req.proposal.ok_or(FormatError::MissingField("proposal"))?;
        Ok(SignProposalRequest {
            proposal: proposal.try_into()?,
            chain_id: req.chain_id,
        })
    }
}

impl From<&SignedProposalResponse> for proto::SignedProposalResponse {
    fn from(resp: &SignedProposalResponse) -> Self {
        proto::SignedProposalResponse {
            proposal: Some((&resp.proposal).into()),
            error: resp.error.as_ref().map(Into::into),
        }
    }
}

impl TryFrom<proto::SignedProposalResponse> for SignedProposalResponse {
    type Error = FormatError;

    fn try_from(resp: proto::SignedProposalResponse) -> Result<Self, Self::Error> {
        let proposal = match resp.proposal {
            Some(proposal) => proposal.try_into()?,
            None => Proposal::default(),
        };
        Ok(SignedProposalResponse {
            proposal,
            error: resp.error.map(Into::into),
        })
    }
}
