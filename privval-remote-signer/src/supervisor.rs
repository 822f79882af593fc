//! Channel ownership and reconnection.
//!
//! The [`Supervisor`] is the only component that opens or closes the channel
//! to the signer. Every exchange, sign request or liveness ping, must first
//! take the single exchange slot, so at most one envelope is ever
//! outstanding on the wire.
//!
//! When an exchange fails on the transport (or the peer answers with
//! something that breaks request/response correlation) the channel is
//! dropped and rebuilt with bounded retries. The failed request is not
//! replayed. Running out of retries halts the supervisor for good: a
//! validator must stop rather than continue without its signer.

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use privval_proto::{Envelope, FormatError, PingRequest};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::engine::{ExchangeError, ExchangeState, ProtocolEngine};
use crate::transport::{Connector, FrameTransport};

/// Errors surfaced to callers of the signer client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport to signer failed: {0}")]
    TransportFailed(#[source] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[source] ExchangeError),

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] FormatError),

    #[error("signer unreachable after {attempts} connection attempts: {reason}")]
    Fatal { attempts: u32, reason: String },
}

impl ClientError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Fatal { .. })
    }
}

impl From<ExchangeError> for ClientError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Transport(e) => ClientError::TransportFailed(e),
            other => ClientError::Protocol(other),
        }
    }
}

/// Bounded retries with doubling backoff between connection attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone)]
struct Halt {
    attempts: u32,
    reason: String,
}

impl Halt {
    fn to_error(&self) -> ClientError {
        ClientError::Fatal {
            attempts: self.attempts,
            reason: self.reason.clone(),
        }
    }
}

/// The exchange slot: whoever holds it owns the channel.
struct Slot {
    channel: Option<Box<dyn FrameTransport>>,
    engine: ProtocolEngine,
    last_activity: Instant,
    reconnects: u64,
    halted: Option<Halt>,
}

pub struct Supervisor {
    connector: Box<dyn Connector>,
    policy: RetryPolicy,
    slot: Mutex<Slot>,
}

impl Supervisor {
    /// Create a supervisor. The channel is opened by the first exchange.
    pub fn new(connector: Box<dyn Connector>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            slot: Mutex::new(Slot {
                channel: None,
                engine: ProtocolEngine::new(),
                last_activity: Instant::now(),
                reconnects: 0,
                halted: None,
            }),
        }
    }

    /// Create a supervisor and open the channel right away.
    pub fn connect(connector: Box<dyn Connector>, policy: RetryPolicy) -> Result<Self, ClientError> {
        let supervisor = Self::new(connector, policy);
        {
            let mut slot = supervisor.lock_slot();
            let channel = supervisor.acquire(&mut slot)?;
            slot.channel = Some(channel);
        }
        Ok(supervisor)
    }

    pub fn peer(&self) -> String {
        self.connector.peer()
    }

    pub fn is_halted(&self) -> bool {
        self.lock_slot().halted.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.lock_slot().channel.is_some()
    }

    /// Number of times the channel was rebuilt after a failure.
    pub fn reconnects(&self) -> u64 {
        self.lock_slot().reconnects
    }

    /// State of the most recent exchange.
    pub fn last_exchange_state(&self) -> ExchangeState {
        self.lock_slot().engine.state()
    }

    /// Run one request/response exchange, waiting for the slot if another
    /// exchange is in flight.
    pub fn exchange(
        &self,
        request: &Envelope,
        timeout: Option<Duration>,
    ) -> Result<Envelope, ClientError> {
        let mut slot = self.lock_slot();
        self.exchange_locked(&mut slot, request, timeout)
    }

    /// Ping the signer unless the channel carried traffic within `idle_for`.
    ///
    /// Returns whether a ping was sent.
    pub fn ping_if_idle(&self, idle_for: Duration, timeout: Duration) -> Result<bool, ClientError> {
        let mut slot = self.lock_slot();
        if slot.halted.is_none() && slot.last_activity.elapsed() < idle_for {
            return Ok(false);
        }
        self.exchange_locked(&mut slot, &PingRequest.into(), Some(timeout))?;
        Ok(true)
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn exchange_locked(
        &self,
        slot: &mut Slot,
        request: &Envelope,
        timeout: Option<Duration>,
    ) -> Result<Envelope, ClientError> {
        if let Some(halt) = &slot.halted {
            return Err(halt.to_error());
        }

        let mut channel = match slot.channel.take() {
            Some(channel) => channel,
            None => self.acquire(slot)?,
        };

        let result = slot.engine.exchange(channel.as_mut(), request, timeout);
        slot.last_activity = Instant::now();

        match result {
            Ok(response) => {
                slot.channel = Some(channel);
                Ok(response)
            }
            Err(ExchangeError::NotARequest(kind)) => {
                // nothing was written, the channel is still in sync
                slot.channel = Some(channel);
                Err(ClientError::Protocol(ExchangeError::NotARequest(kind)))
            }
            Err(err) => {
                warn!(
                    "{} exchange with {} failed: {}; closing channel",
                    request.kind(),
                    self.connector.peer(),
                    err
                );
                drop(channel);

                let rebuilt = self.acquire(slot)?;
                slot.channel = Some(rebuilt);
                slot.reconnects += 1;
                Err(err.into())
            }
        }
    }

    /// Open a new channel, retrying with backoff. Exhaustion halts the
    /// supervisor.
    fn acquire(&self, slot: &mut Slot) -> Result<Box<dyn FrameTransport>, ClientError> {
        let attempts = self.policy.attempts();
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.policy.backoff(attempt - 1);
                debug!(
                    "Retrying connection to {} in {:?} (attempt {}/{})",
                    self.connector.peer(),
                    delay,
                    attempt + 1,
                    attempts
                );
                thread::sleep(delay);
            }

            match self.connector.connect() {
                Ok(channel) => {
                    info!("Connected to signer at {}", self.connector.peer());
                    slot.last_activity = Instant::now();
                    return Ok(channel);
                }
                Err(e) => {
                    warn!(
                        "Connection attempt {}/{} to {} failed: {}",
                        attempt + 1,
                        attempts,
                        self.connector.peer(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        let halt = Halt {
            attempts,
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no connection attempt made".to_string()),
        };
        error!(
            "Giving up on signer at {} after {} attempts: {}",
            self.connector.peer(),
            halt.attempts,
            halt.reason
        );
        let err = halt.to_error();
        slot.halted = Some(halt);
        Err(err)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::testing::{memory_pair, MemoryTransport};
    use privval_proto::{MessageKind, PingResponse, PubKeyRequest, PubKeyResponse, PublicKey};
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// What a scripted peer does with each request it receives.
    #[derive(Debug, Clone, Copy)]
    pub(crate) enum Step {
        /// Answer with the matching response kind
        Reply,
        /// Answer after a delay
        SlowReply(Duration),
        /// Hang up without answering
        Close,
        /// Answer with garbage
        Garbage,
    }

    /// Hands out in-memory channels whose far ends follow a script. Each
    /// entry is one connection; `None` refuses the connection.
    pub(crate) struct ScriptedConnector {
        script: Mutex<VecDeque<Option<Vec<Step>>>>,
        pub(crate) connects: Arc<Mutex<u32>>,
        /// Kinds received by all peers, in arrival order
        pub(crate) received: Arc<Mutex<Vec<MessageKind>>>,
    }

    impl ScriptedConnector {
        pub(crate) fn new(script: Vec<Option<Vec<Step>>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                connects: Arc::new(Mutex::new(0)),
                received: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    pub(crate) fn reply_to(request: &Envelope) -> Envelope {
        match request {
            Envelope::PubKeyRequest(_) => PubKeyResponse {
                pub_key: Some(PublicKey::Ed25519(vec![1; 32])),
                error: None,
            }
            .into(),
            Envelope::SignVoteRequest(req) => {
                let mut vote = req.vote.clone();
                vote.signature = vec![0x5a; 64];
                privval_proto::SignedVoteResponse { vote, error: None }.into()
            }
            Envelope::SignProposalRequest(req) => {
                let mut proposal = req.proposal.clone();
                proposal.signature = vec![0x5b; 64];
                privval_proto::SignedProposalResponse {
                    proposal,
                    error: None,
                }
                .into()
            }
            _ => PingResponse.into(),
        }
    }

    fn run_peer(
        mut peer: MemoryTransport,
        steps: Vec<Step>,
        received: Arc<Mutex<Vec<MessageKind>>>,
    ) {
        for step in steps {
            let Ok(frame) = peer.recv() else { return };
            let request = Envelope::decode(&frame).unwrap();
            received.lock().unwrap().push(request.kind());
            match step {
                Step::SlowReply(delay) => {
                    thread::sleep(delay);
                    if peer.send(&reply_to(&request).encode()).is_err() {
                        return;
                    }
                }
                Step::Reply => {
                    if peer.send(&reply_to(&request).encode()).is_err() {
                        return;
                    }
                }
                Step::Close => return,
                Step::Garbage => {
                    let _ = peer.send(&[0xff, 0xff]);
                }
            }
        }
    }

    impl Connector for ScriptedConnector {
        fn connect(&self) -> io::Result<Box<dyn FrameTransport>> {
            *self.connects.lock().unwrap() += 1;
            let next = self.script.lock().unwrap().pop_front().flatten();
            match next {
                Some(steps) => {
                    let (local, peer) = memory_pair();
                    let received = Arc::clone(&self.received);
                    thread::spawn(move || run_peer(peer, steps, received));
                    Ok(Box::new(local))
                }
                None => Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "scripted refusal",
                )),
            }
        }

        fn peer(&self) -> String {
            "memory://scripted".to_string()
        }
    }

    pub(crate) fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(700),
        };
        assert_eq!(policy.attempts(), 11);
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(700));
        assert_eq!(policy.backoff(40), Duration::from_millis(700));
    }

    #[test]
    fn test_first_exchange_opens_channel() {
        let connector = ScriptedConnector::new(vec![Some(vec![Step::Reply])]);
        let supervisor = Supervisor::new(Box::new(connector), fast_policy(0));
        assert!(!supervisor.is_connected());

        let response = supervisor
            .exchange(&PubKeyRequest::default().into(), None)
            .unwrap();
        assert!(matches!(response, Envelope::PubKeyResponse(_)));
        assert!(supervisor.is_connected());
        assert_eq!(supervisor.last_exchange_state(), ExchangeState::Completed);
    }

    #[test]
    fn test_transport_failure_rebuilds_channel_without_replay() {
        let connector = ScriptedConnector::new(vec![
            Some(vec![Step::Close]),
            Some(vec![Step::Reply]),
        ]);
        let connects = Arc::clone(&connector.connects);
        let supervisor = Supervisor::connect(Box::new(connector), fast_policy(2)).unwrap();

        let err = supervisor
            .exchange(&PingRequest.into(), None)
            .unwrap_err();
        assert!(matches!(err, ClientError::TransportFailed(_)));
        assert_eq!(supervisor.last_exchange_state(), ExchangeState::TransportFailed);
        // rebuilt eagerly, request not resent
        assert!(supervisor.is_connected());
        assert_eq!(supervisor.reconnects(), 1);
        assert_eq!(*connects.lock().unwrap(), 2);

        // the caller re-issues on the new channel
        let response = supervisor.exchange(&PingRequest.into(), None).unwrap();
        assert_eq!(response, Envelope::PingResponse(PingResponse));
    }

    #[test]
    fn test_retries_skip_refused_connections() {
        let connector = ScriptedConnector::new(vec![None, None, Some(vec![Step::Reply])]);
        let supervisor = Supervisor::new(Box::new(connector), fast_policy(2));

        supervisor.exchange(&PingRequest.into(), None).unwrap();
        assert!(!supervisor.is_halted());
    }

    #[test]
    fn test_exhausted_retries_are_fatal_and_sticky() {
        let connector = ScriptedConnector::new(vec![None, None, None, Some(vec![Step::Reply])]);
        let connects = Arc::clone(&connector.connects);
        let supervisor = Supervisor::new(Box::new(connector), fast_policy(2));

        let err = supervisor.exchange(&PingRequest.into(), None).unwrap_err();
        assert!(matches!(err, ClientError::Fatal { attempts: 3, .. }));
        assert!(supervisor.is_halted());

        // a halted supervisor never dials again
        let err = supervisor.exchange(&PingRequest.into(), None).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(*connects.lock().unwrap(), 3);
    }

    #[test]
    fn test_failure_then_exhausted_reconnect_is_fatal() {
        let connector = ScriptedConnector::new(vec![Some(vec![Step::Close]), None, None]);
        let supervisor = Supervisor::connect(Box::new(connector), fast_policy(1)).unwrap();

        let err = supervisor.exchange(&PingRequest.into(), None).unwrap_err();
        assert!(err.is_fatal());
        assert!(supervisor.is_halted());
    }

    #[test]
    fn test_garbage_reply_discards_channel() {
        let connector = ScriptedConnector::new(vec![
            Some(vec![Step::Garbage]),
            Some(vec![Step::Reply]),
        ]);
        let supervisor = Supervisor::connect(Box::new(connector), fast_policy(0)).unwrap();

        let err = supervisor.exchange(&PingRequest.into(), None).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ExchangeError::Format(_))));
        assert_eq!(supervisor.reconnects(), 1);
        supervisor.exchange(&PingRequest.into(), None).unwrap();
    }

    #[test]
    fn test_response_kind_request_keeps_channel() {
        let connector = ScriptedConnector::new(vec![Some(vec![Step::Reply])]);
        let supervisor = Supervisor::connect(Box::new(connector), fast_policy(0)).unwrap();

        let err = supervisor
            .exchange(&PingResponse.into(), None)
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ExchangeError::NotARequest(_))));
        assert_eq!(supervisor.reconnects(), 0);
        supervisor.exchange(&PingRequest.into(), None).unwrap();
    }

    #[test]
    fn test_ping_skipped_while_recently_active() {
        let connector = ScriptedConnector::new(vec![Some(vec![Step::Reply, Step::Reply])]);
        let supervisor = Supervisor::connect(Box::new(connector), fast_policy(0)).unwrap();

        let sent = supervisor
            .ping_if_idle(Duration::from_secs(60), Duration::from_secs(1))
            .unwrap();
        assert!(!sent);

        let sent = supervisor
            .ping_if_idle(Duration::ZERO, Duration::from_secs(1))
            .unwrap();
        assert!(sent);
    }
}
