//! HDCP 2.2 authentication and session-key-exchange engines.
//!
//! Two polled, sans-I/O state machines — [`ReceiverEngine`] and
//! [`TransmitterEngine`] — establish mutual trust over a narrow half-duplex
//! register channel before protected content flows. Each engine composes the
//! message codec from `hdcp-core`, a [`CryptoProvider`] from `hdcp-crypto`,
//! a channel port, a timing monitor, and (transmitter side) the pairing
//! cache and repeater topology handling.
//!
//! The engines share nothing but the wire: one instance per endpoint, no
//! internal locking, every wait expressed as "poll again".
//!
//! [`CryptoProvider`]: hdcp_crypto::CryptoProvider

pub mod channel;
pub mod error;
pub mod pairing;
pub mod receiver;
pub mod session;
pub mod timer;
pub mod topology;
pub mod transmitter;

pub use channel::{DdcMaster, DdcSlave, InMemoryDdc, RxStatusWord};
pub use error::ProtocolError;
pub use pairing::{PairingCache, PairingRecord};
pub use receiver::{ReceiverConfig, ReceiverEngine, ReceiverMode, RxAuthStatus, RxState};
pub use session::SessionParams;
pub use timer::{ManualClock, MonotonicClock, SystemClock, TimerFiring, TimingMonitor};
pub use topology::{Topology, TopologyState};
pub use transmitter::{
    TransmitterConfig, TransmitterEngine, TransmitterTimeouts, TxPollStatus, TxState,
};
