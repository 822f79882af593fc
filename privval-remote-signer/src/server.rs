//! Responder side: answers envelopes on behalf of a key custodian.
//!
//! Listens on a Unix socket and serves one connection at a time. Signing
//! itself, and the decision whether a vote or proposal is safe to sign, is
//! delegated to a [`KeyCustodian`].

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use privval_proto::{
    Envelope, FormatError, PingResponse, Proposal, PubKeyResponse, PublicKey, RemoteSignerError,
    SignedProposalResponse, SignedVoteResponse, Vote,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::transport::{FrameTransport, StreamTransport};

/// Holder of the private key.
///
/// Implementations decide whether a request is safe to sign; returning an
/// error declines it and the error is passed to the requester verbatim.
pub trait KeyCustodian: Send {
    fn public_key(&self, chain_id: &str) -> Result<PublicKey, RemoteSignerError>;

    /// Fill in `vote.signature`. May also adjust the timestamp.
    fn sign_vote(&mut self, chain_id: &str, vote: &mut Vote) -> Result<(), RemoteSignerError>;

    /// Fill in `proposal.signature`. May also adjust the timestamp.
    fn sign_proposal(
        &mut self,
        chain_id: &str,
        proposal: &mut Proposal,
    ) -> Result<(), RemoteSignerError>;
}

/// Server configuration.
pub struct ServerConfig {
    /// Path to Unix socket
    pub socket_path: PathBuf,
}

/// Errors from the signer server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed request: {0}")]
    Format(#[from] FormatError),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Remote signer server.
pub struct SignerServer<K> {
    listener: UnixListener,
    custodian: Mutex<K>,
}

impl<K: KeyCustodian> SignerServer<K> {
    /// Create a new signer server.
    pub fn new(config: ServerConfig, custodian: K) -> Result<Self, ServerError> {
        // Remove existing socket file if it exists
        if config.socket_path.exists() {
            std::fs::remove_file(&config.socket_path)?;
        }

        if let Some(parent) = config.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&config.socket_path)?;
        info!("Signer server listening on {:?}", config.socket_path);

        // Owner only
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&config.socket_path, perms)?;
        }

        Ok(Self {
            listener,
            custodian: Mutex::new(custodian),
        })
    }

    /// Run the server (blocking).
    pub fn run(&self) -> Result<(), ServerError> {
        info!("Signer server starting...");

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    debug!("New connection");
                    if let Err(e) = self.handle_connection(stream) {
                        error!("Error handling connection: {}", e);
                    }
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }

        Ok(())
    }

    /// Accept and serve exactly one connection.
    pub fn serve_next(&self) -> Result<(), ServerError> {
        let (stream, _) = self.listener.accept()?;
        self.handle_connection(stream)
    }

    fn handle_connection(&self, stream: UnixStream) -> Result<(), ServerError> {
        let mut transport = StreamTransport::new(stream);
        self.serve(&mut transport)
    }

    /// Answer requests on `transport` until the requester hangs up.
    ///
    /// A frame that does not decode, or that is not a request, ends the
    /// connection: the requester must rebuild its channel.
    pub fn serve(&self, transport: &mut dyn FrameTransport) -> Result<(), ServerError> {
        loop {
            let frame = match transport.recv() {
                Ok(frame) => frame,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("Requester closed the connection");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            let request = Envelope::decode(&frame).map_err(|e| {
                warn!("Dropping connection after malformed frame: {}", e);
                e
            })?;
            let response = self.handle_request(request)?;
            transport.send(&response.encode())?;
        }
    }

    /// Produce the response envelope for one request.
    pub fn handle_request(&self, request: Envelope) -> Result<Envelope, ServerError> {
        let mut custodian = self.custodian.lock().unwrap_or_else(PoisonError::into_inner);

        let response = match request {
            Envelope::PingRequest(_) => PingResponse.into(),
            Envelope::PubKeyRequest(req) => match custodian.public_key(&req.chain_id) {
                Ok(pub_key) => PubKeyResponse {
                    pub_key: Some(pub_key),
                    error: None,
                }
                .into(),
                Err(err) => {
                    warn!("Public key request declined: {}", err);
                    PubKeyResponse {
                        pub_key: None,
                        error: Some(err),
                    }
                    .into()
                }
            },
            Envelope::SignVoteRequest(req) => {
                let mut vote = req.vote;
                debug!(
                    "Sign vote request: chain={}, height={}, round={}, type={:?}",
                    req.chain_id, vote.height, vote.round, vote.msg_type
                );
                match custodian.sign_vote(&req.chain_id, &mut vote) {
                    Ok(()) => SignedVoteResponse { vote, error: None }.into(),
                    Err(err) => {
                        warn!("Sign vote request rejected: {}", err);
                        SignedVoteResponse::declined(err).into()
                    }
                }
            }
            Envelope::SignProposalRequest(req) => {
                let mut proposal = req.proposal;
                debug!(
                    "Sign proposal request: chain={}, height={}, round={}",
                    req.chain_id, proposal.height, proposal.round
                );
                match custodian.sign_proposal(&req.chain_id, &mut proposal) {
                    Ok(()) => SignedProposalResponse {
                        proposal,
                        error: None,
                    }
                    .into(),
                    Err(err) => {
                        warn!("Sign proposal request rejected: {}", err);
                        SignedProposalResponse::declined(err).into()
                    }
                }
            }
            other => {
                return Err(ServerError::Protocol(format!(
                    "{} is not a request",
                    other.kind()
                )))
            }
        };

        Ok(response)
    }
}
