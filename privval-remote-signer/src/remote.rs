// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Remote validator keys.
//!
//! [`RemotePrivValidator`] implements [`PrivValidator`] by delegating every
//! signature to the remote signer, so consensus code can use it anywhere a
//! local key would be used. Signatures are written into the caller's vote or
//! proposal, leaving artifacts identical to locally signed ones.
//!
//! ## Usage
//!
//! ```ignore
//! use privval_remote_signer::config::SignerConfig;
//! use privval_remote_signer::remote::{create_remote_validator, PrivValidator};
//!
//! let config = SignerConfig::load("/etc/node/signer.json")?;
//! let validator = create_remote_validator(&config)?;
//!
//! let mut vote = /* built by consensus */;
//! validator.sign_vote(&mut vote)?;
//! ```

use std::sync::OnceLock;

use privval_proto::{Proposal, PublicKey, RemoteSignerError, Vote};
use thiserror::Error;
use tracing::{debug, info};

use crate::client::SignerClient;
use crate::config::{ConfigError, SignerConfig};
use crate::engine::Outcome;
use crate::supervisor::ClientError;

/// A validator's signing key.
pub trait PrivValidator {
    type Error: std::error::Error;

    fn pub_key(&self) -> Result<PublicKey, Self::Error>;

    /// Sign `vote` in place.
    fn sign_vote(&self, vote: &mut Vote) -> Result<(), Self::Error>;

    /// Sign `proposal` in place.
    fn sign_proposal(&self, proposal: &mut Proposal) -> Result<(), Self::Error>;
}

/// Error from remote signing operations.
#[derive(Debug, Error)]
pub enum RemoteSignError {
    #[error("signer declined: {0}")]
    Declined(RemoteSignerError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("signer returned a different {0} than requested")]
    Mismatch(&'static str),
}

/// Validator key held by a remote signer.
pub struct RemotePrivValidator {
    client: SignerClient,
    pub_key: OnceLock<PublicKey>,
}

impl RemotePrivValidator {
    /// Wrap `client`. With `pub_key` set, the signer is never asked for it.
    pub fn new(client: SignerClient, pub_key: Option<PublicKey>) -> Self {
        Self {
            client,
            pub_key: pub_key.map(OnceLock::from).unwrap_or_default(),
        }
    }

    pub fn client(&self) -> &SignerClient {
        &self.client
    }
}

impl PrivValidator for RemotePrivValidator {
    type Error = RemoteSignError;

    fn pub_key(&self) -> Result<PublicKey, Self::Error> {
        if let Some(key) = self.pub_key.get() {
            return Ok(key.clone());
        }
        let key = completed(self.client.request_pub_key()?)?;
        info!(
            "Fetched signer public key {} (address {})",
            key,
            hex::encode(key.address())
        );
        Ok(self.pub_key.get_or_init(|| key).clone())
    }

    fn sign_vote(&self, vote: &mut Vote) -> Result<(), Self::Error> {
        let mut request = vote.clone();
        if request.is_signed() {
            debug!("Dropping stale signature before re-signing vote");
            request.signature.clear();
        }

        let signed = completed(self.client.request_sign_vote(request)?)?;
        if signed.msg_type != vote.msg_type
            || signed.height != vote.height
            || signed.round != vote.round
            || signed.block_id != vote.block_id
        {
            return Err(RemoteSignError::Mismatch("vote"));
        }

        vote.timestamp = signed.timestamp;
        vote.signature = signed.signature;
        Ok(())
    }

    fn sign_proposal(&self, proposal: &mut Proposal) -> Result<(), Self::Error> {
        let mut request = proposal.clone();
        if request.is_signed() {
            debug!("Dropping stale signature before re-signing proposal");
            request.signature.clear();
        }

        let signed = completed(self.client.request_sign_proposal(request)?)?;
        if signed.msg_type != proposal.msg_type
            || signed.height != proposal.height
            || signed.round != proposal.round
            || signed.pol_round != proposal.pol_round
            || signed.block_id != proposal.block_id
        {
            return Err(RemoteSignError::Mismatch("proposal"));
        }

        proposal.timestamp = signed.timestamp;
        proposal.signature = signed.signature;
        Ok(())
    }
}

fn completed<T>(outcome: Outcome<T>) -> Result<T, RemoteSignError> {
    outcome.into_result().map_err(RemoteSignError::Declined)
}

/// Create a remote validator from configuration.
///
/// Uses the cached public key from the config when present. The channel to
/// the signer is opened by the first request.
pub fn create_remote_validator(
    config: &SignerConfig,
) -> Result<RemotePrivValidator, RemoteSignError> {
    let pub_key = config.cached_pub_key()?;
    let client = SignerClient::from_config(config)?;
    Ok(RemotePrivValidator::new(client, pub_key))
}
