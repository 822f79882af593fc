//! Request/response state machine for a single exchange.
//!
//! ```text
//! Idle -> Sending -> AwaitingResponse -> Completed
//!            |              |
//!            +--------------+----------> TransportFailed
//!                           +----------> ProtocolError
//! ```
//!
//! The engine never retries. A failed exchange is reported to the
//! supervisor, which owns the channel and decides whether to rebuild it.

use std::io;
use std::time::Duration;

use privval_proto::{
    Envelope, FormatError, MessageKind, Proposal, PublicKey, RemoteSignerError, Vote,
};
use thiserror::Error;
use tracing::trace;

use crate::transport::FrameTransport;

/// Where the current (or last) exchange stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExchangeState {
    #[default]
    Idle,
    Sending,
    AwaitingResponse,
    Completed,
    TransportFailed,
    ProtocolError,
}

impl ExchangeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExchangeState::Completed | ExchangeState::TransportFailed | ExchangeState::ProtocolError
        )
    }
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("transport failed: {0}")]
    Transport(#[from] io::Error),

    #[error("malformed response: {0}")]
    Format(#[from] FormatError),

    #[error("{0} is not a request")]
    NotARequest(MessageKind),

    #[error("expected {expected} in reply, received {received}")]
    UnexpectedResponse {
        expected: MessageKind,
        received: MessageKind,
    },
}

impl ExchangeError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ExchangeError::Transport(_))
    }
}

/// Drives one envelope out and its matching reply back in.
///
/// Takes `&mut self`, so a second exchange cannot start on the same engine
/// before the first has reached a terminal state.
#[derive(Debug, Default)]
pub struct ProtocolEngine {
    state: ExchangeState,
}

impl ProtocolEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    fn transition(&mut self, next: ExchangeState) {
        trace!("Exchange state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Sends `request` and waits up to `timeout` for the reply.
    ///
    /// Only the reply kind paired with the request kind is accepted.
    pub fn exchange(
        &mut self,
        transport: &mut dyn FrameTransport,
        request: &Envelope,
        timeout: Option<Duration>,
    ) -> Result<Envelope, ExchangeError> {
        self.state = ExchangeState::Idle;

        let Some(expected) = request.kind().response_kind() else {
            self.transition(ExchangeState::ProtocolError);
            return Err(ExchangeError::NotARequest(request.kind()));
        };

        self.transition(ExchangeState::Sending);
        if let Err(e) = transport.send(&request.encode()) {
            self.transition(ExchangeState::TransportFailed);
            return Err(e.into());
        }

        self.transition(ExchangeState::AwaitingResponse);
        let frame = match transport
            .set_recv_timeout(timeout)
            .and_then(|()| transport.recv())
        {
            Ok(frame) => frame,
            Err(e) => {
                self.transition(ExchangeState::TransportFailed);
                return Err(e.into());
            }
        };

        let response = match Envelope::decode(&frame) {
            Ok(response) => response,
            Err(e) => {
                self.transition(ExchangeState::ProtocolError);
                return Err(e.into());
            }
        };
        if response.kind() != expected {
            self.transition(ExchangeState::ProtocolError);
            return Err(ExchangeError::UnexpectedResponse {
                expected,
                received: response.kind(),
            });
        }

        self.transition(ExchangeState::Completed);
        Ok(response)
    }
}

/// Result of a completed exchange, as seen by the requester.
///
/// A decline is a deliberate refusal by the custodian and must not be
/// retried blindly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    Declined(RemoteSignerError),
}

impl<T> Outcome<T> {
    pub fn is_declined(&self) -> bool {
        matches!(self, Outcome::Declined(_))
    }

    pub fn into_result(self) -> Result<T, RemoteSignerError> {
        match self {
            Outcome::Completed(value) => Ok(value),
            Outcome::Declined(err) => Err(err),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Completed(value) => Outcome::Completed(f(value)),
            Outcome::Declined(err) => Outcome::Declined(err),
        }
    }
}

// The error field wins over whatever placeholder payload came with it.

pub(crate) fn pub_key_outcome(response: Envelope) -> Result<Outcome<PublicKey>, ExchangeError> {
    match response {
        Envelope::PubKeyResponse(resp) => match (resp.error, resp.pub_key) {
            (Some(err), _) => Ok(Outcome::Declined(err)),
            (None, Some(key)) => Ok(Outcome::Completed(key)),
            (None, None) => Err(FormatError::MissingField("pub_key").into()),
        },
        other => Err(unexpected(MessageKind::PubKeyResponse, &other)),
    }
}

pub(crate) fn signed_vote_outcome(response: Envelope) -> Result<Outcome<Vote>, ExchangeError> {
    match response {
        Envelope::SignedVoteResponse(resp) => Ok(match resp.error {
            Some(err) => Outcome::Declined(err),
            None => Outcome::Completed(resp.vote),
        }),
        other => Err(unexpected(MessageKind::SignedVoteResponse, &other)),
    }
}

pub(crate) fn signed_proposal_outcome(
    response: Envelope,
) -> Result<Outcome<Proposal>, ExchangeError> {
    match response {
        Envelope::SignedProposalResponse(resp) => Ok(match resp.error {
            Some(err) => Outcome::Declined(err),
            None => Outcome::Completed(resp.proposal),
        }),
        other => Err(unexpected(MessageKind::SignedProposalResponse, &other)),
    }
}

fn unexpected(expected: MessageKind, received: &Envelope) -> ExchangeError {
    ExchangeError::UnexpectedResponse {
        expected,
        received: received.kind(),
    }
}
