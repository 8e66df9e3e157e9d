//! The transmitter-side authentication engine.
//!
//! The upstream half of the protocol: probe the peer (H0/H1/A0), exchange
//! the master key (A1, with a pairing-cache fast path), run the locality
//! check (A2), deliver the session key (A3), and either finish (A5) or run
//! the repeater extension (A6 list validation, A7 ack, A9 content-stream
//! management).
//!
//! Every outbound message that expects a reply arms the timing monitor with
//! a message-specific deadline; expiry aborts the session and the host may
//! re-attempt with a fresh `authenticate()`. While authenticated the same
//! countdown runs in status-poll mode, sampling the peer's status word for
//! re-authentication requests and topology changes.

use core::time::Duration;

use tracing::{debug, info, warn};

use hdcp_core::constants::{RIV_SIZE, RN_SIZE, RRX_SIZE, RTX_SIZE, SEQ_NUM_MODULUS};
use hdcp_core::log::{ErrorFlags, EventLog, LogEntry, LogKind};
use hdcp_core::message::{
    AkeInit, AkeNoStoredKm, AkeSendCert, AkeStoredKm, LcInit, Message, MessageId, RepeaterAck,
    RxInfo, SkeSendEks, StreamIdType, StreamManage,
};
use hdcp_core::types::{ReceiverId, TxCaps};
use hdcp_crypto::{Certificate, CryptoProvider, TrustAnchor};

use crate::channel::{DdcMaster, HDCP2_VERSION};
use crate::error::ProtocolError;
use crate::pairing::{PairingCache, PairingRecord};
use crate::session::SessionParams;
use crate::timer::{MonotonicClock, TimerFiring, TimingMonitor};

/// Info-event payloads recorded in the event log.
pub const LOG_INFO_RESET: u16 = 1;
pub const LOG_INFO_ENABLE: u16 = 2;
pub const LOG_INFO_DISABLE: u16 = 3;
pub const LOG_INFO_REAUTH_REQUESTED: u16 = 4;
pub const LOG_INFO_ENCRYPTION_ENABLE: u16 = 5;
pub const LOG_INFO_TOPOLOGY_ACK_SENT: u16 = 6;
pub const LOG_INFO_STREAM_CONFIRMED: u16 = 7;

/// Reply-time budgets for each outbound message, plus the idle status-poll
/// cadence. The protocol defaults are conservative; hosts with confirmed
/// link budgets may tighten them.
#[derive(Debug, Clone)]
pub struct TransmitterTimeouts {
    pub cert: Duration,
    pub h_prime_no_stored: Duration,
    pub h_prime_stored: Duration,
    pub pairing_info: Duration,
    pub l_prime: Duration,
    pub receiver_id_list: Duration,
    pub stream_ready: Duration,
    pub status_poll: Duration,
}

impl Default for TransmitterTimeouts {
    fn default() -> Self {
        Self {
            cert: Duration::from_millis(100),
            h_prime_no_stored: Duration::from_secs(1),
            h_prime_stored: Duration::from_millis(200),
            pairing_info: Duration::from_millis(200),
            l_prime: Duration::from_millis(20),
            receiver_id_list: Duration::from_secs(3),
            stream_ready: Duration::from_millis(100),
            status_poll: Duration::from_millis(100),
        }
    }
}

/// Transmitter engine configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct TransmitterConfig {
    pub timeouts: TransmitterTimeouts,
    /// Pairing-cache capacity (clamped to 1..=32).
    pub pairing_capacity: usize,
    /// Locality-check rounds attempted before the session is abandoned.
    pub locality_retry_limit: u32,
    pub verbose_log: bool,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            timeouts: TransmitterTimeouts::default(),
            pairing_capacity: 2,
            locality_retry_limit: hdcp_core::constants::MAX_LC_INIT_ATTEMPTS,
            verbose_log: false,
        }
    }
}

/// Transmitter protocol states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TxState {
    H0NoPeer,
    H1PeerPresent,
    A0DetermineCapability,
    A1WaitCert,
    A1WaitHPrimeNoStored,
    A1WaitHPrimeStored,
    A1WaitPairingInfo,
    A2WaitLPrime,
    A5Authenticated,
    A6WaitReceiverIdList,
    A9WaitStreamReady,
}

/// The result of one `poll()`, reported to the host; not stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPollStatus {
    /// The peer does not speak this protocol version.
    Incompatible,
    /// Authentication is in progress.
    Busy,
    Authenticated,
    Unauthenticated,
    /// The peer raised REAUTH_REQ; a fresh handshake was started.
    ReauthRequested,
}

enum ReadOutcome {
    Empty,
    Got(Vec<u8>),
    Aborted,
}

/// The transmitter-side engine.
pub struct TransmitterEngine<C, P, K> {
    config: TransmitterConfig,
    channel: C,
    crypto: P,
    clock: K,
    timer: TimingMonitor,
    log: EventLog,

    state: TxState,
    params: SessionParams,
    trust_anchor: Option<TrustAnchor>,
    pairing: PairingCache,

    receiver_id: Option<ReceiverId>,
    peer_is_repeater: bool,
    incompatible: bool,
    session_authenticated: bool,
    enabled: bool,
    error_flags: ErrorFlags,

    lc_attempts: u32,
    expected_seq_num_v: u32,
    seq_num_m: u32,
    pending_stream: Option<(Vec<u8>, [u8; 3])>,
    downstream: Option<(RxInfo, Vec<ReceiverId>)>,
}

impl<C, P, K> TransmitterEngine<C, P, K>
where
    C: DdcMaster,
    P: CryptoProvider,
    K: MonotonicClock,
{
    pub fn new(config: TransmitterConfig, channel: C, crypto: P, clock: K) -> Self {
        let verbose = config.verbose_log;
        let pairing = PairingCache::new(config.pairing_capacity);
        Self {
            config,
            channel,
            crypto,
            clock,
            timer: TimingMonitor::new(),
            log: EventLog::new(verbose),
            state: TxState::H0NoPeer,
            params: SessionParams::default(),
            trust_anchor: None,
            pairing,
            receiver_id: None,
            peer_is_repeater: false,
            incompatible: false,
            session_authenticated: false,
            enabled: false,
            error_flags: ErrorFlags::NONE,
            lc_attempts: 0,
            expected_seq_num_v: 0,
            seq_num_m: 0,
            pending_stream: None,
            downstream: None,
        }
    }

    // -- host-visible operations -------------------------------------------

    /// Load the trust anchor all receiver certificates are verified against.
    pub fn load_trust_anchor(
        &mut self,
        modulus: &[u8],
        exponent: &[u8],
    ) -> Result<(), ProtocolError> {
        self.trust_anchor = Some(TrustAnchor::new(modulus, exponent)?);
        Ok(())
    }

    pub fn enable(&mut self) -> Result<(), ProtocolError> {
        if self.trust_anchor.is_none() {
            return Err(ProtocolError::NoTrustAnchor);
        }
        self.log_info(LOG_INFO_ENABLE);
        self.crypto.enable_cipher();
        self.enabled = true;
        Ok(())
    }

    pub fn disable(&mut self) {
        self.log_info(LOG_INFO_DISABLE);
        self.crypto.disable_cipher();
        self.enabled = false;
    }

    /// Return to the unauthenticated idle state, clearing all session
    /// material and armed timers. Safe at any time; idempotent.
    pub fn reset(&mut self) {
        self.log_info(LOG_INFO_RESET);
        self.clear_session();
        self.error_flags.clear();
        self.log.clear_sticky();
        self.state = if self.state == TxState::H0NoPeer {
            TxState::H0NoPeer
        } else {
            TxState::H1PeerPresent
        };
    }

    /// Report downstream hot-plug state. Losing the peer drops the session.
    pub fn set_peer_present(&mut self, present: bool) {
        match (self.state, present) {
            (TxState::H0NoPeer, true) => self.state = TxState::H1PeerPresent,
            (_, false) => {
                self.clear_session();
                self.state = TxState::H0NoPeer;
            }
            _ => {}
        }
    }

    /// Begin (or restart) authentication against the attached peer.
    pub fn authenticate(&mut self) -> Result<(), ProtocolError> {
        if !self.enabled {
            return Err(ProtocolError::NotEnabled);
        }
        if self.trust_anchor.is_none() {
            return Err(ProtocolError::NoTrustAnchor);
        }
        if self.state == TxState::H0NoPeer {
            return Err(ProtocolError::NoPeer);
        }
        self.incompatible = false;
        self.state = TxState::A0DetermineCapability;
        Ok(())
    }

    /// Renegotiate the content-stream type with a downstream repeater.
    pub fn manage_content_stream(&mut self, stream_type: u8) -> Result<(), ProtocolError> {
        if self.state != TxState::A5Authenticated || !self.peer_is_repeater {
            return Err(ProtocolError::InvalidState(
                "content stream management requires an authenticated repeater",
            ));
        }
        if self.seq_num_m >= SEQ_NUM_MODULUS {
            return Err(ProtocolError::SequenceExhausted);
        }

        let seq = self.seq_num_m;
        self.seq_num_m += 1;

        let stream_bytes = vec![0x00, stream_type];
        let msg = Message::StreamManage(StreamManage {
            seq_num_m: seq,
            streams: vec![StreamIdType {
                stream_id: 0,
                stream_type,
            }],
        });
        self.send_message(&msg);
        self.pending_stream = Some((stream_bytes, seq_num_bytes(seq)));
        self.timer
            .arm_deadline(self.clock.now(), self.config.timeouts.stream_ready);
        self.state = TxState::A9WaitStreamReady;
        Ok(())
    }

    /// Run the state machine for one tick.
    pub fn poll(&mut self) -> TxPollStatus {
        if !self.enabled {
            return TxPollStatus::Unauthenticated;
        }

        let previous = self.state;
        let status = match self.state {
            TxState::H0NoPeer => TxPollStatus::Unauthenticated,
            TxState::H1PeerPresent => {
                if self.incompatible {
                    TxPollStatus::Incompatible
                } else {
                    TxPollStatus::Unauthenticated
                }
            }
            TxState::A0DetermineCapability => self.state_a0(),
            TxState::A1WaitCert => self.state_a1_wait_cert(),
            TxState::A1WaitHPrimeNoStored => self.state_a1_wait_h_prime(false),
            TxState::A1WaitHPrimeStored => self.state_a1_wait_h_prime(true),
            TxState::A1WaitPairingInfo => self.state_a1_wait_pairing_info(),
            TxState::A2WaitLPrime => self.state_a2_wait_l_prime(),
            TxState::A5Authenticated => self.state_a5(),
            TxState::A6WaitReceiverIdList => self.state_a6(),
            TxState::A9WaitStreamReady => self.state_a9(),
        };

        if self.state != previous {
            debug!(from = ?previous, to = ?self.state, "transmitter state transition");
            let code = self.state as u16;
            self.log_write(LogKind::State, code);
        }
        status
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_authenticated(&self) -> bool {
        self.session_authenticated
            && matches!(
                self.state,
                TxState::A5Authenticated
                    | TxState::A6WaitReceiverIdList
                    | TxState::A9WaitStreamReady
            )
    }

    pub fn is_encryption_enabled(&self) -> bool {
        self.crypto.is_encryption_enabled()
    }

    pub fn is_error(&self) -> bool {
        !self.log.sticky_errors().is_empty()
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// The validated downstream topology, when the peer is a repeater.
    pub fn downstream_topology(&self) -> Option<(&RxInfo, &[ReceiverId])> {
        self.downstream
            .as_ref()
            .map(|(info, ids)| (info, ids.as_slice()))
    }

    pub fn error_flags(&self) -> ErrorFlags {
        self.error_flags
    }

    pub fn sticky_error_flags(&self) -> ErrorFlags {
        self.log.sticky_errors()
    }

    pub fn take_log_entry(&mut self) -> Option<LogEntry> {
        self.log.pop()
    }

    /// Drop every cached pairing record. An in-progress session is not
    /// affected; the engine keeps its own copy of the session material.
    pub fn clear_pairing_cache(&mut self) {
        self.pairing.clear();
    }

    pub fn pairing_count(&self) -> usize {
        self.pairing.len()
    }

    // -- state handlers ----------------------------------------------------

    fn state_a0(&mut self) -> TxPollStatus {
        let version = self.channel.read_version();
        if version != HDCP2_VERSION {
            warn!(version, "peer is not HDCP 2.2 capable");
            self.incompatible = true;
            self.state = TxState::H1PeerPresent;
            return TxPollStatus::Incompatible;
        }

        self.start_session();
        self.state = TxState::A1WaitCert;
        TxPollStatus::Busy
    }

    fn state_a1_wait_cert(&mut self) -> TxPollStatus {
        if self.reply_deadline_expired() {
            return TxPollStatus::Unauthenticated;
        }

        let bytes = match self.try_read_exact(AkeSendCert::LEN) {
            ReadOutcome::Empty => return TxPollStatus::Busy,
            ReadOutcome::Aborted => return TxPollStatus::Unauthenticated,
            ReadOutcome::Got(bytes) => bytes,
        };
        let msg = match Message::decode(&bytes) {
            Ok(Message::AkeSendCert(m)) => m,
            _ => {
                self.log_error(ErrorFlags::MESSAGE_SIZE);
                self.abort_session("malformed AKE_Send_Cert");
                return TxPollStatus::Unauthenticated;
            }
        };
        self.log_message(MessageId::AkeSendCert);

        let anchor = match self.trust_anchor.clone() {
            Some(anchor) => anchor,
            None => {
                self.abort_session("trust anchor missing");
                return TxPollStatus::Unauthenticated;
            }
        };

        let cert = Certificate::new(&msg.cert);
        if let Err(err) = self.crypto.verify_certificate(&cert, &anchor) {
            warn!(%err, "certificate verification failed");
            self.abort_session("certificate rejected");
            return TxPollStatus::Unauthenticated;
        }

        let receiver_id = cert.receiver_id();
        info!(%receiver_id, repeater = msg.rx_caps.is_repeater(), "certificate verified");
        self.receiver_id = Some(receiver_id);
        self.params.rrx = msg.rrx;
        self.params.rx_caps = msg.rx_caps.to_bytes();
        self.peer_is_repeater = msg.rx_caps.is_repeater();

        if let Some(record) = self.pairing.lookup(&receiver_id).cloned() {
            // Fast path: reuse the paired master key, shorter H' budget.
            self.params.km = record.km;
            let mut m = [0u8; RTX_SIZE + RRX_SIZE];
            m[..RTX_SIZE].copy_from_slice(&record.rtx);
            m[RTX_SIZE..].copy_from_slice(&record.rrx);

            self.send_message(&Message::AkeStoredKm(AkeStoredKm {
                ekh_km: record.ekh_km,
                m,
            }));
            self.timer
                .arm_deadline(self.clock.now(), self.config.timeouts.h_prime_stored);
            self.state = TxState::A1WaitHPrimeStored;
        } else {
            let mut km = [0u8; 16];
            self.crypto.random_bytes(&mut km);
            self.params.km = km;

            let ekpub_km = match self.crypto.encrypt_km(&cert, &km) {
                Ok(ct) => ct,
                Err(err) => {
                    warn!(%err, "master key encryption failed");
                    self.abort_session("master key encryption failed");
                    return TxPollStatus::Unauthenticated;
                }
            };

            self.send_message(&Message::AkeNoStoredKm(AkeNoStoredKm { ekpub_km }));
            self.timer
                .arm_deadline(self.clock.now(), self.config.timeouts.h_prime_no_stored);
            self.state = TxState::A1WaitHPrimeNoStored;
        }
        TxPollStatus::Busy
    }

    fn state_a1_wait_h_prime(&mut self, stored: bool) -> TxPollStatus {
        if self.reply_deadline_expired() {
            return TxPollStatus::Unauthenticated;
        }

        let bytes = match self.try_read_exact(hdcp_core::message::AkeSendHPrime::LEN) {
            ReadOutcome::Empty => return TxPollStatus::Busy,
            ReadOutcome::Aborted => return TxPollStatus::Unauthenticated,
            ReadOutcome::Got(bytes) => bytes,
        };
        let msg = match Message::decode(&bytes) {
            Ok(Message::AkeSendHPrime(m)) => m,
            _ => {
                self.log_error(ErrorFlags::MESSAGE_SIZE);
                self.abort_session("malformed AKE_Send_H_prime");
                return TxPollStatus::Unauthenticated;
            }
        };
        self.log_message(MessageId::AkeSendHPrime);

        let (kd, h) = self.crypto.compute_h_prime(
            &self.params.km,
            &self.params.rtx,
            &self.params.rrx,
            &self.params.rx_caps,
            &self.params.tx_caps,
        );
        self.params.kd = kd;
        self.params.h_prime = h;

        if msg.h_prime != h {
            warn!("H' verification failed");
            if stored {
                // A stale pairing must not wedge every future attempt.
                if let Some(id) = self.receiver_id {
                    self.pairing.invalidate(&id);
                }
            }
            self.abort_session("H' mismatch");
            return TxPollStatus::Unauthenticated;
        }

        if stored {
            self.send_lc_init();
            self.state = TxState::A2WaitLPrime;
        } else {
            self.timer
                .arm_deadline(self.clock.now(), self.config.timeouts.pairing_info);
            self.state = TxState::A1WaitPairingInfo;
        }
        TxPollStatus::Busy
    }

    fn state_a1_wait_pairing_info(&mut self) -> TxPollStatus {
        if self.reply_deadline_expired() {
            return TxPollStatus::Unauthenticated;
        }

        let bytes = match self.try_read_exact(hdcp_core::message::AkeSendPairingInfo::LEN) {
            ReadOutcome::Empty => return TxPollStatus::Busy,
            ReadOutcome::Aborted => return TxPollStatus::Unauthenticated,
            ReadOutcome::Got(bytes) => bytes,
        };
        let msg = match Message::decode(&bytes) {
            Ok(Message::AkeSendPairingInfo(m)) => m,
            _ => {
                self.log_error(ErrorFlags::MESSAGE_SIZE);
                self.abort_session("malformed AKE_Send_Pairing_Info");
                return TxPollStatus::Unauthenticated;
            }
        };
        self.log_message(MessageId::AkeSendPairingInfo);

        if let Some(receiver_id) = self.receiver_id {
            self.pairing.insert(PairingRecord {
                receiver_id,
                rx_caps: self.params.rx_caps,
                rtx: self.params.rtx,
                rrx: self.params.rrx,
                km: self.params.km,
                ekh_km: msg.ekh_km,
            });
            info!(%receiver_id, "pairing record stored");
        }

        self.send_lc_init();
        self.state = TxState::A2WaitLPrime;
        TxPollStatus::Busy
    }

    fn state_a2_wait_l_prime(&mut self) -> TxPollStatus {
        if self.timer.check(self.clock.now()) == TimerFiring::DeadlineExpired {
            return self.retry_locality_check("L' reply deadline expired");
        }

        let bytes = match self.try_read_exact(hdcp_core::message::LcSendLPrime::LEN) {
            ReadOutcome::Empty => return TxPollStatus::Busy,
            ReadOutcome::Aborted => return TxPollStatus::Unauthenticated,
            ReadOutcome::Got(bytes) => bytes,
        };
        let msg = match Message::decode(&bytes) {
            Ok(Message::LcSendLPrime(m)) => m,
            _ => {
                self.log_error(ErrorFlags::MESSAGE_SIZE);
                self.abort_session("malformed LC_Send_L_prime");
                return TxPollStatus::Unauthenticated;
            }
        };
        self.log_message(MessageId::LcSendLPrime);

        let expected =
            self.crypto
                .compute_l_prime(&self.params.kd, &self.params.rn, &self.params.rrx);
        if msg.l_prime != expected {
            return self.retry_locality_check("L' verification failed");
        }

        // Locality confirmed: exchange the session key.
        let mut ks = [0u8; 16];
        let mut riv = [0u8; RIV_SIZE];
        self.crypto.random_bytes(&mut ks);
        self.crypto.random_bytes(&mut riv);
        self.params.ks = ks;
        self.params.riv = riv;

        let edkey_ks = self.crypto.compute_edkey_ks(
            &ks,
            &self.params.km,
            &self.params.rtx,
            &self.params.rrx,
            &self.params.rn,
        );
        self.send_message(&Message::SkeSendEks(SkeSendEks { edkey_ks, riv }));

        self.crypto.load_cipher_session_key(&ks, &riv);
        self.log_info(LOG_INFO_ENCRYPTION_ENABLE);
        info!("transmitter session key delivered, encryption enabled");

        if self.peer_is_repeater {
            self.timer
                .arm_deadline(self.clock.now(), self.config.timeouts.receiver_id_list);
            self.state = TxState::A6WaitReceiverIdList;
        } else {
            self.session_authenticated = true;
            self.timer
                .arm_status_poll(self.clock.now(), self.config.timeouts.status_poll);
            self.state = TxState::A5Authenticated;
        }
        TxPollStatus::Busy
    }

    fn state_a5(&mut self) -> TxPollStatus {
        if self.timer.check(self.clock.now()) == TimerFiring::PollDue {
            let status = self.channel.read_rx_status();
            if status.reauth_req {
                info!("peer requested re-authentication");
                self.log_info(LOG_INFO_REAUTH_REQUESTED);
                self.start_session();
                self.state = TxState::A1WaitCert;
                return TxPollStatus::ReauthRequested;
            }
            // READY alone can be a leftover from a list the peer has not yet
            // retired; a fresh list always announces its size too.
            if status.ready && status.message_size > 0 && self.peer_is_repeater {
                self.timer
                    .arm_deadline(self.clock.now(), self.config.timeouts.receiver_id_list);
                self.state = TxState::A6WaitReceiverIdList;
                return TxPollStatus::Busy;
            }
        }
        TxPollStatus::Authenticated
    }

    fn state_a6(&mut self) -> TxPollStatus {
        if self.reply_deadline_expired() {
            return TxPollStatus::Unauthenticated;
        }

        let status = self.channel.read_rx_status();
        if !status.ready || status.message_size == 0 {
            return TxPollStatus::Busy;
        }

        let size = usize::from(status.message_size);
        let mut bytes = vec![0u8; size];
        if self.channel.read_message(size, &mut bytes) != size {
            self.log_error(ErrorFlags::MESSAGE_SIZE);
            self.abort_session("short receiver-ID-list read");
            return TxPollStatus::Unauthenticated;
        }
        let msg = match Message::decode(&bytes) {
            Ok(Message::ReceiverIdList(m)) => m,
            _ => {
                self.log_error(ErrorFlags::MESSAGE_SIZE);
                self.abort_session("malformed RepeaterAuth_Send_ReceiverID_List");
                return TxPollStatus::Unauthenticated;
            }
        };
        self.log_message(MessageId::RepeaterAuthSendReceiverIdList);

        if msg.rx_info.max_devices_exceeded || msg.rx_info.max_cascade_exceeded {
            warn!("downstream topology exceeds device or cascade limits");
            self.abort_session("topology limits exceeded");
            return TxPollStatus::Unauthenticated;
        }

        if msg.seq_num_v != self.expected_seq_num_v {
            warn!(
                got = msg.seq_num_v,
                expected = self.expected_seq_num_v,
                "unexpected seq_num_V"
            );
            self.abort_session("seq_num_V out of order");
            return TxPollStatus::Unauthenticated;
        }
        self.expected_seq_num_v = (self.expected_seq_num_v + 1) % SEQ_NUM_MODULUS;

        let mut id_bytes = Vec::with_capacity(msg.ids.len() * 5);
        for id in &msg.ids {
            id_bytes.extend_from_slice(id.as_ref());
        }
        let v = self.crypto.compute_v(
            &self.params.kd,
            &id_bytes,
            &msg.rx_info.to_bytes(),
            &seq_num_bytes(msg.seq_num_v),
        );

        if v[..16] != msg.v_prime {
            warn!("receiver-ID-list aggregate hash mismatch");
            self.abort_session("V' mismatch");
            return TxPollStatus::Unauthenticated;
        }

        let mut v_lsb = [0u8; 16];
        v_lsb.copy_from_slice(&v[16..]);
        self.send_message(&Message::RepeaterAck(RepeaterAck { v: v_lsb }));
        self.log_info(LOG_INFO_TOPOLOGY_ACK_SENT);
        info!(devices = msg.ids.len(), depth = msg.rx_info.depth, "downstream topology validated");

        self.downstream = Some((msg.rx_info, msg.ids));
        self.session_authenticated = true;
        self.timer
            .arm_status_poll(self.clock.now(), self.config.timeouts.status_poll);
        self.state = TxState::A5Authenticated;
        TxPollStatus::Busy
    }

    fn state_a9(&mut self) -> TxPollStatus {
        if self.reply_deadline_expired() {
            return TxPollStatus::Unauthenticated;
        }

        let bytes = match self.try_read_exact(hdcp_core::message::StreamReady::LEN) {
            ReadOutcome::Empty => return TxPollStatus::Busy,
            ReadOutcome::Aborted => return TxPollStatus::Unauthenticated,
            ReadOutcome::Got(bytes) => bytes,
        };
        let msg = match Message::decode(&bytes) {
            Ok(Message::StreamReady(m)) => m,
            _ => {
                self.log_error(ErrorFlags::MESSAGE_SIZE);
                self.abort_session("malformed RepeaterAuth_Stream_Ready");
                return TxPollStatus::Unauthenticated;
            }
        };
        self.log_message(MessageId::RepeaterAuthStreamReady);

        let Some((stream_bytes, seq)) = self.pending_stream.take() else {
            self.abort_session("unexpected Stream_Ready");
            return TxPollStatus::Unauthenticated;
        };
        let expected = self.crypto.compute_m(&self.params.kd, &stream_bytes, &seq);
        if msg.m_prime != expected {
            warn!("M' verification failed");
            self.abort_session("M' mismatch");
            return TxPollStatus::Unauthenticated;
        }

        self.log_info(LOG_INFO_STREAM_CONFIRMED);
        self.timer
            .arm_status_poll(self.clock.now(), self.config.timeouts.status_poll);
        self.state = TxState::A5Authenticated;
        TxPollStatus::Busy
    }

    // -- session helpers ---------------------------------------------------

    /// Start a fresh handshake: clear the previous session and send AKE_Init.
    fn start_session(&mut self) {
        self.clear_session();
        self.crypto.enable_cipher();
        self.crypto.set_cipher_mode(hdcp_crypto::CipherMode::Transmit);

        let mut rtx = [0u8; RTX_SIZE];
        self.crypto.random_bytes(&mut rtx);
        let tx_caps = TxCaps::new();
        self.params.rtx = rtx;
        self.params.tx_caps = tx_caps.to_bytes();

        self.send_message(&Message::AkeInit(AkeInit { rtx, tx_caps }));
        self.timer
            .arm_deadline(self.clock.now(), self.config.timeouts.cert);
    }

    /// Clear everything scoped to one authentication session.
    fn clear_session(&mut self) {
        self.params.clear();
        self.receiver_id = None;
        self.peer_is_repeater = false;
        self.lc_attempts = 0;
        self.expected_seq_num_v = 0;
        self.seq_num_m = 0;
        self.pending_stream = None;
        self.downstream = None;
        self.session_authenticated = false;
        self.timer.disarm();
        self.crypto.disable_cipher();
    }

    /// Abandon the session after an unrecoverable failure.
    fn abort_session(&mut self, reason: &str) {
        warn!(reason, "transmitter session aborted");
        self.log_error(ErrorFlags::FORCE_RESET);
        self.clear_session();
        self.state = TxState::H1PeerPresent;
    }

    /// Start one locality-check round trip.
    fn send_lc_init(&mut self) {
        let mut rn = [0u8; RN_SIZE];
        self.crypto.random_bytes(&mut rn);
        self.params.rn = rn;
        self.lc_attempts += 1;

        self.send_message(&Message::LcInit(LcInit { rn }));
        self.timer
            .arm_deadline(self.clock.now(), self.config.timeouts.l_prime);
    }

    /// Retry the locality check while attempts remain, otherwise abort.
    fn retry_locality_check(&mut self, reason: &str) -> TxPollStatus {
        if self.lc_attempts < self.config.locality_retry_limit {
            debug!(reason, attempt = self.lc_attempts, "retrying locality check");
            self.send_lc_init();
            self.state = TxState::A2WaitLPrime;
            TxPollStatus::Busy
        } else {
            self.log_error(ErrorFlags::MAX_LC_ATTEMPTS);
            self.abort_session("locality check attempts exhausted");
            TxPollStatus::Unauthenticated
        }
    }

    /// Abort if the armed reply deadline has passed.
    fn reply_deadline_expired(&mut self) -> bool {
        if self.timer.check(self.clock.now()) == TimerFiring::DeadlineExpired {
            self.abort_session("reply deadline expired");
            true
        } else {
            false
        }
    }

    // -- channel plumbing --------------------------------------------------

    fn send_message(&mut self, msg: &Message) {
        let bytes = msg.encode();
        self.channel.write_message(&bytes);
        self.log_message(msg.id());
        debug!(id = ?msg.id(), len = bytes.len(), "transmitter sent message");
    }

    /// Read the pending reply if its declared size matches the expectation.
    /// A non-matching size is "not yet": either the status word is stale or
    /// a foreign message will be caught by the reply deadline.
    fn try_read_exact(&mut self, expected: usize) -> ReadOutcome {
        let status = self.channel.read_rx_status();
        if usize::from(status.message_size) != expected {
            return ReadOutcome::Empty;
        }
        let mut bytes = vec![0u8; expected];
        if self.channel.read_message(expected, &mut bytes) != expected {
            self.log_error(ErrorFlags::MESSAGE_SIZE);
            self.abort_session("short message read");
            return ReadOutcome::Aborted;
        }
        ReadOutcome::Got(bytes)
    }

    // -- logging -----------------------------------------------------------

    fn now_us(&self) -> u64 {
        self.clock.now().as_micros() as u64
    }

    fn log_write(&mut self, kind: LogKind, data: u16) {
        let ts = self.now_us();
        self.log.write(kind, data, ts);
    }

    fn log_info(&mut self, code: u16) {
        self.log_write(LogKind::Info, code);
    }

    fn log_message(&mut self, id: MessageId) {
        self.log_write(LogKind::Message, id as u16);
    }

    fn log_error(&mut self, flag: ErrorFlags) {
        self.error_flags.insert(flag);
        let ts = self.now_us();
        self.log.write_error(flag, ts);
    }
}

/// The 24-bit big-endian wire encoding of a sequence number.
fn seq_num_bytes(seq: u32) -> [u8; 3] {
    [(seq >> 16) as u8, (seq >> 8) as u8, seq as u8]
}
