//! Requester-side API used by the consensus node.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use privval_proto::{
    Envelope, FormatError, PingRequest, Proposal, PubKeyRequest, PublicKey, SignProposalRequest,
    SignVoteRequest, Vote,
};
use tracing::{debug, warn};

use crate::config::{ConfigError, SignerConfig};
use crate::engine::{pub_key_outcome, signed_proposal_outcome, signed_vote_outcome, Outcome};
use crate::liveness::{LivenessConfig, LivenessMonitor};
use crate::supervisor::{ClientError, Supervisor};

/// Client for a remote signer.
///
/// Requests are serialized: concurrent callers (and the liveness monitor)
/// queue for the supervisor's exchange slot.
pub struct SignerClient {
    supervisor: Arc<Supervisor>,
    chain_id: String,
    request_timeout: Option<Duration>,
    liveness: Option<LivenessMonitor>,
}

impl SignerClient {
    pub fn new(supervisor: Arc<Supervisor>, chain_id: impl Into<String>) -> Self {
        Self {
            supervisor,
            chain_id: chain_id.into(),
            request_timeout: None,
            liveness: None,
        }
    }

    /// Build a client from config. The channel is opened lazily by the first
    /// request or ping.
    pub fn from_config(config: &SignerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let supervisor = Arc::new(Supervisor::new(config.connector(), config.retry_policy()));
        let client = SignerClient::new(supervisor, config.chain_id.clone())
            .with_request_timeout(config.request_timeout());
        match config.liveness() {
            Some(liveness) => Ok(client.with_liveness(liveness)?),
            None => Ok(client),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Start a keepalive thread for this client's channel.
    pub fn with_liveness(mut self, config: LivenessConfig) -> io::Result<Self> {
        self.liveness = Some(LivenessMonitor::spawn(Arc::clone(&self.supervisor), config)?);
        Ok(self)
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    pub fn is_monitoring_liveness(&self) -> bool {
        self.liveness
            .as_ref()
            .map(LivenessMonitor::is_running)
            .unwrap_or(false)
    }

    pub fn request_pub_key(&self) -> Result<Outcome<PublicKey>, ClientError> {
        let request = PubKeyRequest {
            chain_id: self.chain_id.clone(),
        };
        let response = self.call(request.into())?;
        let outcome = pub_key_outcome(response)?;
        if let Outcome::Declined(err) = &outcome {
            warn!("Signer declined public key request: {}", err);
        }
        Ok(outcome)
    }

    /// Ask the signer to sign `vote`, which must not carry a signature yet.
    ///
    /// A decline is returned as-is; whether to retry is the caller's call.
    pub fn request_sign_vote(&self, vote: Vote) -> Result<Outcome<Vote>, ClientError> {
        if vote.is_signed() {
            return Err(FormatError::SignatureInRequest("vote").into());
        }
        let (height, round) = (vote.height, vote.round);
        let request = SignVoteRequest {
            vote,
            chain_id: self.chain_id.clone(),
        };
        let response = self.call(request.into())?;
        let outcome = signed_vote_outcome(response)?;
        match &outcome {
            Outcome::Completed(_) => debug!("Vote signed: height={}, round={}", height, round),
            Outcome::Declined(err) => warn!(
                "Signer declined vote: height={}, round={}: {}",
                height, round, err
            ),
        }
        Ok(outcome)
    }

    /// Ask the signer to sign `proposal`, which must not carry a signature
    /// yet.
    pub fn request_sign_proposal(
        &self,
        proposal: Proposal,
    ) -> Result<Outcome<Proposal>, ClientError> {
        if proposal.is_signed() {
            return Err(FormatError::SignatureInRequest("proposal").into());
        }
        let (height, round) = (proposal.height, proposal.round);
        let request = SignProposalRequest {
            proposal,
            chain_id: self.chain_id.clone(),
        };
        let response = self.call(request.into())?;
        let outcome = signed_proposal_outcome(response)?;
        match &outcome {
            Outcome::Completed(_) => {
                debug!("Proposal signed: height={}, round={}", height, round)
            }
            Outcome::Declined(err) => warn!(
                "Signer declined proposal: height={}, round={}: {}",
                height, round, err
            ),
        }
        Ok(outcome)
    }

    /// Ping the signer now, regardless of idleness.
    pub fn ping(&self) -> Result<(), ClientError> {
        self.call(PingRequest.into())?;
        Ok(())
    }

    fn call(&self, request: Envelope) -> Result<Envelope, ClientError> {
        self.supervisor.exchange(&request, self.request_timeout)
    }
}
