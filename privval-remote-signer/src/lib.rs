//! Remote signing for consensus validators.
//!
//! A consensus node keeps no private key. It asks a remote signer over a
//! persistent channel for its public key and for signatures over votes and
//! proposals, and pings the signer while idle so a dead channel is noticed
//! before the next signature is needed.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐   length-delimited   ┌─────────────────┐
//! │  Consensus Node │ ◄──────────────────► │  Remote Signer  │
//! │  SignerClient   │   Envelope frames    │  SignerServer   │
//! └─────────────────┘                      └─────────────────┘
//!         │
//!   Supervisor (one exchange slot, reconnects)
//!         │
//!   ProtocolEngine (one request, one response)
//! ```
//!
//! Requests are never replayed after a failure. The caller sees
//! `ClientError::TransportFailed` and decides whether to re-issue; when the
//! signer cannot be reached within the retry policy the client halts with
//! `ClientError::Fatal`.

pub mod client;
pub mod config;
pub mod engine;
pub mod liveness;
pub mod remote;
pub mod server;
pub mod supervisor;
pub mod transport;

pub use client::SignerClient;
pub use config::{CachedPubKey, ConfigError, RetryConfig, SignerAddress, SignerConfig};
pub use engine::{ExchangeError, ExchangeState, Outcome, ProtocolEngine};
pub use liveness::{LivenessConfig, LivenessMonitor};
pub use remote::{create_remote_validator, PrivValidator, RemotePrivValidator, RemoteSignError};
pub use server::{KeyCustodian, ServerConfig, ServerError, SignerServer};
pub use supervisor::{ClientError, RetryPolicy, Supervisor};
pub use transport::{
    Connector, FrameTransport, StreamTransport, TcpConnector, TimeoutStream, UnixConnector,
};
