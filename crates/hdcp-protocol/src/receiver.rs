//! The receiver-side authentication engine.
//!
//! A polled, non-blocking state machine mirroring the downstream half of the
//! protocol: wait for AKE_Init (B0), exchange the master key and produce
//! `H'` (B1), answer locality checks (B2), derive the session key (B3), and
//! monitor the link while authenticated (B4). Every state may fail back to
//! B0; a well-formed AKE_Init restarts the handshake from any state with all
//! session parameters cleared.
//!
//! `poll()` performs at most one state transition and returns. Waits are
//! always expressed as "not yet; poll again" — nothing here blocks on the
//! peer.

use core::time::Duration;

use tracing::{debug, info, warn};

use hdcp_core::constants::{CERT_SIZE, MAX_MESSAGE_SIZE, RRX_SIZE, RTX_SIZE};
use hdcp_core::log::{ErrorFlags, EventLog, LogEntry, LogKind};
use hdcp_core::message::{
    AkeSendCert, AkeSendHPrime, AkeSendPairingInfo, LcSendLPrime, Message, MessageId,
    ReceiverIdList, SkeSendEks, StreamReady,
};
use hdcp_core::types::RxCaps;
use hdcp_crypto::CryptoProvider;

use crate::channel::{DdcSlave, RxStatusWord, DDC_READ_MSG_REG, DDC_RXSTATUS0_REG,
    DDC_RXSTATUS1_REG, DDC_VERSION_REG, DDC_WRITE_MSG_REG, HDCP2_VERSION};
use crate::error::ProtocolError;
use crate::session::SessionParams;
use crate::timer::{MonotonicClock, TimerFiring, TimingMonitor};
use crate::topology::{Topology, TopologyState};

/// Info-event payloads recorded in the event log.
pub const LOG_INFO_RESET: u16 = 1;
pub const LOG_INFO_ENABLE: u16 = 2;
pub const LOG_INFO_DISABLE: u16 = 3;
pub const LOG_INFO_REAUTH_REQ: u16 = 4;
pub const LOG_INFO_ENCRYPTION_ENABLE: u16 = 5;
pub const LOG_INFO_TOPOLOGY_SENT: u16 = 6;
pub const LOG_INFO_TOPOLOGY_ACKED: u16 = 7;

/// Whether this receiver forwards content downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverMode {
    Receiver,
    Repeater,
}

/// Receiver engine configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub mode: ReceiverMode,
    /// Locality-check initiations tolerated per session.
    pub max_lc_attempts: u32,
    /// Deadline for the upstream ack after propagating a topology update.
    pub topology_ack_timeout: Duration,
    /// Whether debug entries are recorded in the event log.
    pub verbose_log: bool,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            mode: ReceiverMode::Receiver,
            max_lc_attempts: hdcp_core::constants::MAX_LC_INIT_ATTEMPTS,
            topology_ack_timeout: Duration::from_secs(2),
            verbose_log: false,
        }
    }
}

/// Receiver protocol states, including the send/wait sub-states of B1/B2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RxState {
    B0WaitAkeInit,
    B1SendCert,
    B1WaitKm,
    B1SendHPrime,
    B1SendPairingInfo,
    B1WaitLcInit,
    B2SendLPrime,
    B2WaitSkeSendEks,
    B3ComputeKs,
    B4Authenticated,
}

/// Coarse authentication progress reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxAuthStatus {
    Unauthenticated,
    ComputeKm,
    ComputeLPrime,
    ComputeKs,
    Authenticated,
}

/// The receiver-side engine.
pub struct ReceiverEngine<C, P, K> {
    config: ReceiverConfig,
    channel: C,
    crypto: P,
    clock: K,
    timer: TimingMonitor,
    log: EventLog,

    state: RxState,
    status: RxAuthStatus,
    params: SessionParams,
    cert: Option<[u8; CERT_SIZE]>,

    msg_buf: [u8; MAX_MESSAGE_SIZE],
    msg_len: usize,
    pending_eks: Option<SkeSendEks>,

    write_msg_ready: bool,
    read_msg_ready: bool,
    clear_size_pending: bool,
    error_flags: ErrorFlags,

    lc_attempts: u32,
    is_no_stored_km: bool,
    enabled: bool,

    topology: TopologyState,
    awaiting_ack: bool,
    pending_v_lsb: [u8; 16],

    on_authenticated: Option<Box<dyn FnMut()>>,
}

impl<C, P, K> ReceiverEngine<C, P, K>
where
    C: DdcSlave,
    P: CryptoProvider,
    K: MonotonicClock,
{
    pub fn new(config: ReceiverConfig, channel: C, crypto: P, clock: K) -> Self {
        let verbose = config.verbose_log;
        Self {
            config,
            channel,
            crypto,
            clock,
            timer: TimingMonitor::new(),
            log: EventLog::new(verbose),
            state: RxState::B0WaitAkeInit,
            status: RxAuthStatus::Unauthenticated,
            params: SessionParams::default(),
            cert: None,
            msg_buf: [0; MAX_MESSAGE_SIZE],
            msg_len: 0,
            pending_eks: None,
            write_msg_ready: false,
            read_msg_ready: false,
            clear_size_pending: false,
            error_flags: ErrorFlags::NONE,
            lc_attempts: 0,
            is_no_stored_km: false,
            enabled: false,
            topology: TopologyState::new(),
            awaiting_ack: false,
            pending_v_lsb: [0; 16],
            on_authenticated: None,
        }
    }

    // -- host-visible operations -------------------------------------------

    /// Load this receiver's public certificate (raw 522 bytes).
    pub fn load_public_cert(&mut self, cert: [u8; CERT_SIZE]) {
        self.cert = Some(cert);
    }

    /// Install the hook run once authentication completes.
    pub fn set_on_authenticated(&mut self, hook: Box<dyn FnMut()>) {
        self.on_authenticated = Some(hook);
    }

    /// Enable the state machine. The certificate must be loaded first.
    pub fn enable(&mut self) -> Result<(), ProtocolError> {
        if self.cert.is_none() {
            return Err(ProtocolError::NoCertificate);
        }
        self.log_info(LOG_INFO_ENABLE);
        self.reset_ddc();
        self.crypto.enable_cipher();
        self.enabled = true;
        Ok(())
    }

    /// Disable the state machine and the cipher.
    pub fn disable(&mut self) {
        self.log_info(LOG_INFO_DISABLE);
        self.crypto.disable_cipher();
        self.enabled = false;
    }

    /// Return the engine to its initial state, clearing all session
    /// parameters, armed timers, and the channel's default register state.
    /// Safe to call at any time, including mid-message; idempotent.
    pub fn reset(&mut self) {
        self.log_info(LOG_INFO_RESET);
        self.msg_len = 0;
        self.pending_eks = None;
        self.state = RxState::B0WaitAkeInit;
        self.status = RxAuthStatus::Unauthenticated;
        self.is_no_stored_km = false;
        self.lc_attempts = 0;
        self.awaiting_ack = false;
        self.error_flags.clear();
        self.log.clear_sticky();
        self.timer.disarm();
        self.params.clear();
        self.topology.reset_session();
        self.crypto.disable_cipher();
        if self.enabled {
            self.crypto.enable_cipher();
        }
        self.reset_ddc();
    }

    /// Run the state machine for one tick.
    pub fn poll(&mut self) -> RxAuthStatus {
        if !self.enabled {
            return self.status;
        }

        // The peer consumed the pending message; retire its size announcement
        // before anything new is published this tick.
        if self.clear_size_pending {
            self.clear_size_pending = false;
            let mut status = self.read_status_word();
            status.message_size = 0;
            self.write_status_word(status);
        }

        let previous = self.state;
        let next = match self.state {
            RxState::B0WaitAkeInit => self.state_b0(),
            RxState::B1SendCert
            | RxState::B1WaitKm
            | RxState::B1SendHPrime
            | RxState::B1SendPairingInfo
            | RxState::B1WaitLcInit => self.state_b1(),
            RxState::B2SendLPrime | RxState::B2WaitSkeSendEks => self.state_b2(),
            RxState::B3ComputeKs => self.state_b3(),
            RxState::B4Authenticated => self.state_b4(),
        };
        self.state = next;

        if self.state != previous {
            debug!(from = ?previous, to = ?self.state, "receiver state transition");
            let code = self.state as u16;
            self.log_write(LogKind::State, code);
        }
        self.status
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == RxAuthStatus::Authenticated
    }

    /// Enabled but not (yet) authenticated.
    pub fn is_in_progress(&self) -> bool {
        self.enabled && self.status != RxAuthStatus::Authenticated
    }

    pub fn is_encryption_enabled(&self) -> bool {
        self.crypto.is_encryption_enabled()
    }

    /// Whether any sticky error has been recorded since the last reset.
    pub fn is_error(&self) -> bool {
        !self.log.sticky_errors().is_empty()
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    pub fn status(&self) -> RxAuthStatus {
        self.status
    }

    /// The transient error flags driving recovery decisions.
    pub fn error_flags(&self) -> ErrorFlags {
        self.error_flags
    }

    /// The sticky error flags accumulated since the last reset.
    pub fn sticky_error_flags(&self) -> ErrorFlags {
        self.log.sticky_errors()
    }

    /// Drain one entry from the diagnostic event log.
    pub fn take_log_entry(&mut self) -> Option<LogEntry> {
        self.log.pop()
    }

    // -- channel edge notifications ----------------------------------------

    /// A complete message landed in the write-message buffer.
    pub fn on_write_message_available(&mut self) {
        self.write_msg_ready = true;
    }

    /// The transmitter finished reading the pending read-buffer message.
    pub fn on_read_message_complete(&mut self) {
        self.read_msg_ready = true;
        self.clear_size_pending = true;
    }

    /// The transport reports a persistent link-integrity problem (e.g. N
    /// consecutive ECC failures). Takes effect in the authenticated state.
    pub fn set_link_error(&mut self) {
        self.log_error(ErrorFlags::LINK_INTEGRITY);
    }

    /// The transport reports a burst read/write that stopped mid-message.
    pub fn set_channel_burst_error(&mut self) {
        self.log_error(ErrorFlags::CHANNEL_BURST);
    }

    // -- repeater operations -----------------------------------------------

    /// Install a new downstream topology snapshot to be propagated upstream.
    pub fn update_topology(&mut self, topology: Topology) -> Result<(), ProtocolError> {
        if self.config.mode != ReceiverMode::Repeater {
            return Err(ProtocolError::InvalidState("not in repeater mode"));
        }
        if topology.ids.len() > hdcp_core::constants::MAX_DEVICE_COUNT {
            return Err(ProtocolError::TopologyTooLarge(topology.ids.len()));
        }
        self.topology.update(topology);
        Ok(())
    }

    // -- state handlers ----------------------------------------------------

    fn state_b0(&mut self) -> RxState {
        self.status = RxAuthStatus::Unauthenticated;

        if self.handle_burst_error() {
            return RxState::B0WaitAkeInit;
        }

        self.msg_len = self.poll_message();
        if self.msg_len == 0 {
            return RxState::B0WaitAkeInit;
        }

        match MessageId::from_u8(self.msg_buf[0]) {
            Ok(MessageId::AkeInit) => {
                if self.process_ake_init() {
                    RxState::B1SendCert
                } else {
                    self.log_error(ErrorFlags::PROCESSING_AKE_INIT);
                    self.reset_after_error();
                    RxState::B0WaitAkeInit
                }
            }
            _ => {
                self.reset_after_error();
                RxState::B0WaitAkeInit
            }
        }
    }

    fn state_b1(&mut self) -> RxState {
        self.status = RxAuthStatus::ComputeKm;

        if self.handle_burst_error() {
            return RxState::B0WaitAkeInit;
        }

        let mut state = self.state;
        self.msg_len = self.poll_message();
        if self.msg_len > 0 {
            match MessageId::from_u8(self.msg_buf[0]) {
                Ok(MessageId::AkeInit) => {
                    if self.process_ake_init() {
                        state = RxState::B1SendCert;
                    } else {
                        self.log_error(ErrorFlags::PROCESSING_AKE_INIT);
                        self.reset_after_error();
                        return RxState::B0WaitAkeInit;
                    }
                }
                Ok(MessageId::AkeNoStoredKm) => {
                    if state == RxState::B1WaitKm && self.process_no_stored_km() {
                        self.is_no_stored_km = true;
                        state = RxState::B1SendHPrime;
                    } else {
                        self.log_error(ErrorFlags::PROCESSING_NO_STORED_KM);
                        self.reset_after_error();
                        return RxState::B0WaitAkeInit;
                    }
                }
                Ok(MessageId::AkeStoredKm) => {
                    if state == RxState::B1WaitKm && self.process_stored_km() {
                        self.is_no_stored_km = false;
                        state = RxState::B1SendHPrime;
                    } else {
                        self.log_error(ErrorFlags::PROCESSING_STORED_KM);
                        self.reset_after_error();
                        return RxState::B0WaitAkeInit;
                    }
                }
                Ok(MessageId::LcInit) => {
                    if state == RxState::B1WaitLcInit && self.process_lc_init() {
                        return RxState::B2SendLPrime;
                    }
                    self.log_error(ErrorFlags::PROCESSING_LC_INIT);
                    self.reset_after_error();
                    return RxState::B0WaitAkeInit;
                }
                _ => {
                    self.reset_after_error();
                    return RxState::B0WaitAkeInit;
                }
            }
        }

        // Outbound side: each message goes out as soon as the transport has
        // consumed the previous one.
        match state {
            RxState::B1SendCert => {
                if self.take_read_ready() {
                    if self.send_cert() {
                        state = RxState::B1WaitKm;
                    } else {
                        self.reset_after_error();
                        return RxState::B0WaitAkeInit;
                    }
                }
            }
            RxState::B1SendHPrime => {
                if self.take_read_ready() {
                    self.send_h_prime();
                    state = if self.is_no_stored_km {
                        RxState::B1SendPairingInfo
                    } else {
                        RxState::B1WaitLcInit
                    };
                }
            }
            RxState::B1SendPairingInfo => {
                if self.take_read_ready() {
                    if self.send_pairing_info() {
                        state = RxState::B1WaitLcInit;
                    } else {
                        self.reset_after_error();
                        return RxState::B0WaitAkeInit;
                    }
                }
            }
            _ => {}
        }

        state
    }

    fn state_b2(&mut self) -> RxState {
        self.status = RxAuthStatus::ComputeLPrime;

        if self.handle_burst_error() {
            return RxState::B0WaitAkeInit;
        }

        let mut state = self.state;
        self.msg_len = self.poll_message();
        if self.msg_len > 0 {
            match MessageId::from_u8(self.msg_buf[0]) {
                Ok(MessageId::AkeInit) => {
                    if self.process_ake_init() {
                        return RxState::B1SendCert;
                    }
                    self.log_error(ErrorFlags::PROCESSING_AKE_INIT);
                    self.reset_after_error();
                    return RxState::B0WaitAkeInit;
                }
                Ok(MessageId::LcInit) => {
                    if self.lc_attempts >= self.config.max_lc_attempts {
                        self.log_error(ErrorFlags::MAX_LC_ATTEMPTS);
                        self.log_error(ErrorFlags::PROCESSING_LC_INIT);
                        self.reset_after_error();
                        return RxState::B0WaitAkeInit;
                    }
                    if self.process_lc_init() {
                        state = RxState::B2SendLPrime;
                    } else {
                        self.log_error(ErrorFlags::PROCESSING_LC_INIT);
                        self.reset_after_error();
                        return RxState::B0WaitAkeInit;
                    }
                }
                Ok(MessageId::SkeSendEks) => {
                    if state == RxState::B2WaitSkeSendEks && self.process_ske_send_eks() {
                        return RxState::B3ComputeKs;
                    }
                    self.log_error(ErrorFlags::PROCESSING_SKE_SEND_EKS);
                    self.reset_after_error();
                    return RxState::B0WaitAkeInit;
                }
                _ => {
                    self.reset_after_error();
                    return RxState::B0WaitAkeInit;
                }
            }
        }

        if state == RxState::B2SendLPrime && self.take_read_ready() {
            self.send_l_prime();
            state = RxState::B2WaitSkeSendEks;
        }

        state
    }

    fn state_b3(&mut self) -> RxState {
        self.status = RxAuthStatus::ComputeKs;

        if self.handle_burst_error() {
            return RxState::B0WaitAkeInit;
        }

        if let Some(eks) = self.pending_eks.take() {
            self.log_write(LogKind::Debug, MessageId::SkeSendEks as u16);
            let ks = self.crypto.compute_ks(
                &eks.edkey_ks,
                &self.params.km,
                &self.params.rtx,
                &self.params.rrx,
                &self.params.rn,
            );
            self.params.ks = ks;
            self.params.riv = eks.riv;
            self.crypto
                .load_cipher_session_key(&self.params.ks, &self.params.riv);
            self.log_info(LOG_INFO_ENCRYPTION_ENABLE);
            info!("receiver session key loaded, encryption enabled");
        }

        self.msg_len = self.poll_message();
        if self.msg_len > 0 {
            match MessageId::from_u8(self.msg_buf[0]) {
                Ok(MessageId::AkeInit) => {
                    if self.process_ake_init() {
                        return RxState::B1SendCert;
                    }
                    self.log_error(ErrorFlags::PROCESSING_AKE_INIT);
                    self.reset_after_error();
                    return RxState::B0WaitAkeInit;
                }
                _ => {
                    self.reset_after_error();
                    return RxState::B0WaitAkeInit;
                }
            }
        }

        if let Some(hook) = self.on_authenticated.as_mut() {
            hook();
        }

        RxState::B4Authenticated
    }

    fn state_b4(&mut self) -> RxState {
        self.status = RxAuthStatus::Authenticated;

        if self.handle_burst_error() {
            return RxState::B0WaitAkeInit;
        }

        if self.error_flags.contains(ErrorFlags::LINK_INTEGRITY) {
            self.set_ddc_reauth_req();
        }

        if self.awaiting_ack && self.timer.check(self.clock.now()) == TimerFiring::DeadlineExpired
        {
            warn!("topology ack deadline expired, requesting re-authentication");
            self.awaiting_ack = false;
            self.log_error(ErrorFlags::LINK_INTEGRITY);
            self.set_ddc_reauth_req();
        }

        self.msg_len = self.poll_message();
        if self.msg_len > 0 {
            match MessageId::from_u8(self.msg_buf[0]) {
                Ok(MessageId::AkeInit) => {
                    if self.process_ake_init() {
                        return RxState::B1SendCert;
                    }
                    self.log_error(ErrorFlags::PROCESSING_AKE_INIT);
                    self.reset_after_error();
                    return RxState::B0WaitAkeInit;
                }
                Ok(MessageId::RepeaterAuthSendAck)
                    if self.config.mode == ReceiverMode::Repeater =>
                {
                    if !self.process_repeater_ack() {
                        self.reset_after_error();
                        return RxState::B0WaitAkeInit;
                    }
                }
                Ok(MessageId::RepeaterAuthStreamManage)
                    if self.config.mode == ReceiverMode::Repeater =>
                {
                    if !self.process_stream_manage() {
                        self.reset_after_error();
                        return RxState::B0WaitAkeInit;
                    }
                }
                _ => {
                    self.reset_after_error();
                    return RxState::B0WaitAkeInit;
                }
            }
        }

        if self.config.mode == ReceiverMode::Repeater
            && !self.awaiting_ack
            && self.topology.changed()
            && self.read_msg_ready
        {
            self.propagate_topology();
        }

        RxState::B4Authenticated
    }

    // -- message processing ------------------------------------------------

    /// Handle AKE_Init: reset everything the previous session touched and
    /// record the transmitter's nonce and capabilities.
    fn process_ake_init(&mut self) -> bool {
        self.log_message(MessageId::AkeInit);

        self.crypto.disable_cipher();
        self.crypto.enable_cipher();
        self.timer.disarm();

        let msg = match Message::decode(&self.msg_buf[..self.msg_len]) {
            Ok(Message::AkeInit(m)) => m,
            _ => {
                self.log_error(ErrorFlags::MESSAGE_SIZE);
                return false;
            }
        };

        self.params.clear();
        self.reset_ddc();
        self.pending_eks = None;
        self.lc_attempts = 0;
        self.is_no_stored_km = false;
        self.awaiting_ack = false;
        self.topology.reset_session();

        self.params.rtx = msg.rtx;
        self.params.tx_caps = msg.tx_caps.to_bytes();
        true
    }

    fn process_no_stored_km(&mut self) -> bool {
        self.log_message(MessageId::AkeNoStoredKm);

        let msg = match Message::decode(&self.msg_buf[..self.msg_len]) {
            Ok(Message::AkeNoStoredKm(m)) => m,
            _ => {
                self.log_error(ErrorFlags::MESSAGE_SIZE);
                return false;
            }
        };

        match self.crypto.decrypt_km(&msg.ekpub_km) {
            Ok(km) => {
                self.params.km = km;
                true
            }
            Err(err) => {
                warn!(%err, "master key decryption failed");
                false
            }
        }
    }

    fn process_stored_km(&mut self) -> bool {
        self.log_message(MessageId::AkeStoredKm);

        let msg = match Message::decode(&self.msg_buf[..self.msg_len]) {
            Ok(Message::AkeStoredKm(m)) => m,
            _ => {
                self.log_error(ErrorFlags::MESSAGE_SIZE);
                return false;
            }
        };

        match self.crypto.compute_ekh(&msg.m, &msg.ekh_km) {
            Ok(km) => {
                self.params.km = km;
                true
            }
            Err(err) => {
                warn!(%err, "pairing blob recovery failed");
                false
            }
        }
    }

    fn process_lc_init(&mut self) -> bool {
        self.log_message(MessageId::LcInit);

        let msg = match Message::decode(&self.msg_buf[..self.msg_len]) {
            Ok(Message::LcInit(m)) => m,
            _ => {
                self.log_error(ErrorFlags::MESSAGE_SIZE);
                return false;
            }
        };

        self.lc_attempts += 1;
        self.params.rn = msg.rn;
        true
    }

    fn process_ske_send_eks(&mut self) -> bool {
        self.log_message(MessageId::SkeSendEks);

        match Message::decode(&self.msg_buf[..self.msg_len]) {
            Ok(Message::SkeSendEks(m)) => {
                self.pending_eks = Some(m);
                true
            }
            _ => {
                self.log_error(ErrorFlags::MESSAGE_SIZE);
                false
            }
        }
    }

    fn process_repeater_ack(&mut self) -> bool {
        self.log_message(MessageId::RepeaterAuthSendAck);

        let msg = match Message::decode(&self.msg_buf[..self.msg_len]) {
            Ok(Message::RepeaterAck(m)) => m,
            _ => {
                self.log_error(ErrorFlags::MESSAGE_SIZE);
                return false;
            }
        };

        if !self.awaiting_ack || msg.v != self.pending_v_lsb {
            warn!("unexpected or mismatching topology ack");
            return false;
        }

        self.awaiting_ack = false;
        self.timer.disarm();
        self.log_info(LOG_INFO_TOPOLOGY_ACKED);

        // Topology delivered; drop the READY signal.
        let mut status = self.read_status_word();
        status.ready = false;
        self.write_status_word(status);
        true
    }

    fn process_stream_manage(&mut self) -> bool {
        self.log_message(MessageId::RepeaterAuthStreamManage);

        let msg = match Message::decode(&self.msg_buf[..self.msg_len]) {
            Ok(Message::StreamManage(m)) => m,
            _ => {
                self.log_error(ErrorFlags::MESSAGE_SIZE);
                return false;
            }
        };

        if !self.topology.accept_seq_num_m(msg.seq_num_m) {
            warn!(seq = msg.seq_num_m, "replayed stream-manage sequence number");
            return false;
        }

        let mut stream_bytes = Vec::with_capacity(msg.streams.len() * 2);
        for s in &msg.streams {
            stream_bytes.push(s.stream_id);
            stream_bytes.push(s.stream_type);
        }
        let seq = seq_num_bytes(msg.seq_num_m);
        let m_prime = self.crypto.compute_m(&self.params.kd, &stream_bytes, &seq);

        self.take_read_ready();
        self.push_message(&Message::StreamReady(StreamReady { m_prime }), false);
        true
    }

    // -- message generation ------------------------------------------------

    fn send_cert(&mut self) -> bool {
        let cert = match self.cert {
            Some(cert) => cert,
            None => return false,
        };

        let mut rrx = [0u8; RRX_SIZE];
        self.crypto.random_bytes(&mut rrx);
        let rx_caps = RxCaps::new(self.config.mode == ReceiverMode::Repeater);

        self.push_message(
            &Message::AkeSendCert(AkeSendCert { cert, rrx, rx_caps }),
            false,
        );

        self.params.rrx = rrx;
        self.params.rx_caps = rx_caps.to_bytes();
        true
    }

    fn send_h_prime(&mut self) {
        let (kd, h_prime) = self.crypto.compute_h_prime(
            &self.params.km,
            &self.params.rtx,
            &self.params.rrx,
            &self.params.rx_caps,
            &self.params.tx_caps,
        );
        self.params.kd = kd;
        self.params.h_prime = h_prime;

        self.push_message(&Message::AkeSendHPrime(AkeSendHPrime { h_prime }), false);
    }

    fn send_pairing_info(&mut self) -> bool {
        let mut m = [0u8; RTX_SIZE + RRX_SIZE];
        m[..RTX_SIZE].copy_from_slice(&self.params.rtx);
        m[RTX_SIZE..].copy_from_slice(&self.params.rrx);

        let ekh_km = match self.crypto.compute_ekh(&m, &self.params.km) {
            Ok(ekh) => ekh,
            Err(err) => {
                warn!(%err, "pairing blob generation failed");
                return false;
            }
        };
        self.params.ekh_km = ekh_km;

        self.push_message(
            &Message::AkeSendPairingInfo(AkeSendPairingInfo { ekh_km }),
            false,
        );
        true
    }

    fn send_l_prime(&mut self) {
        let l_prime =
            self.crypto
                .compute_l_prime(&self.params.kd, &self.params.rn, &self.params.rrx);
        self.params.l_prime = l_prime;

        self.push_message(&Message::LcSendLPrime(LcSendLPrime { l_prime }), false);
    }

    /// Send the downstream receiver-ID list upstream and arm the ack
    /// deadline.
    fn propagate_topology(&mut self) {
        let Some(topology) = self.topology.current().cloned() else {
            return;
        };

        let seq_num_v = self.topology.next_seq_num_v();
        let rx_info = topology.rx_info();
        let v = self.crypto.compute_v(
            &self.params.kd,
            &topology.id_bytes(),
            &rx_info.to_bytes(),
            &seq_num_bytes(seq_num_v),
        );
        let mut v_prime = [0u8; 16];
        v_prime.copy_from_slice(&v[..16]);
        self.pending_v_lsb.copy_from_slice(&v[16..]);

        // Consume the edge and the channel slot together.
        let _ = self.topology.take_changed();
        self.take_read_ready();

        self.push_message(
            &Message::ReceiverIdList(ReceiverIdList {
                rx_info,
                seq_num_v,
                v_prime,
                ids: topology.ids,
            }),
            true,
        );
        self.timer
            .arm_deadline(self.clock.now(), self.config.topology_ack_timeout);
        self.awaiting_ack = true;
        self.log_info(LOG_INFO_TOPOLOGY_SENT);
    }

    // -- channel plumbing --------------------------------------------------

    /// Read a complete message out of the write buffer, if one is pending.
    fn poll_message(&mut self) -> usize {
        if !self.take_write_ready() {
            return 0;
        }
        let size = self.channel.write_buffer_size().min(MAX_MESSAGE_SIZE);
        self.channel.set_address(DDC_WRITE_MSG_REG);
        for slot in self.msg_buf.iter_mut().take(size) {
            *slot = self.channel.get_data();
        }
        size
    }

    /// Write a message into the read buffer and publish its size (and, for
    /// topology lists, the READY bit) in the status word.
    fn push_message(&mut self, msg: &Message, ready: bool) {
        let bytes = msg.encode();
        self.channel.set_address(DDC_READ_MSG_REG);
        for byte in &bytes {
            self.channel.set_data(*byte);
        }

        let mut status = self.read_status_word();
        status.message_size = bytes.len() as u16;
        status.ready = ready;
        self.write_status_word(status);

        self.log_message(msg.id());
    }

    fn read_status_word(&mut self) -> RxStatusWord {
        self.channel.set_address(DDC_RXSTATUS0_REG);
        let lo = self.channel.get_data();
        self.channel.set_address(DDC_RXSTATUS1_REG);
        let hi = self.channel.get_data();
        RxStatusWord::from_bytes([lo, hi])
    }

    fn write_status_word(&mut self, status: RxStatusWord) {
        let bytes = status.to_bytes();
        self.channel.set_address(DDC_RXSTATUS0_REG);
        self.channel.set_data(bytes[0]);
        self.channel.set_address(DDC_RXSTATUS1_REG);
        self.channel.set_data(bytes[1]);
    }

    /// Raise the REAUTH_REQ status bit and clear the transient
    /// link-integrity flag. The bit stays up until the next AKE_Init
    /// restores the channel defaults.
    fn set_ddc_reauth_req(&mut self) {
        self.log_info(LOG_INFO_REAUTH_REQ);
        let mut status = self.read_status_word();
        status.reauth_req = true;
        self.write_status_word(status);
        self.error_flags.remove(ErrorFlags::LINK_INTEGRITY);
    }

    /// Restore the channel's default register state and buffer flags.
    fn reset_ddc(&mut self) {
        self.channel.set_address(DDC_VERSION_REG);
        self.channel.set_data(HDCP2_VERSION);
        self.write_status_word(RxStatusWord::default());
        self.channel.clear_read_buffer();
        self.channel.clear_write_buffer();

        // The read buffer starts empty, so the first outbound message is
        // not gated on a prior read.
        self.read_msg_ready = true;
        self.write_msg_ready = false;
        self.clear_size_pending = false;
        self.error_flags.remove(ErrorFlags::CHANNEL_BURST);
    }

    /// Recover from an error condition by returning to the initial state.
    fn reset_after_error(&mut self) {
        self.log_error(ErrorFlags::FORCE_RESET);

        self.crypto.disable_cipher();
        self.crypto.enable_cipher();

        self.msg_len = 0;
        self.pending_eks = None;
        self.status = RxAuthStatus::Unauthenticated;
        self.is_no_stored_km = false;
        self.lc_attempts = 0;
        self.awaiting_ack = false;
        self.read_msg_ready = true;
        self.timer.disarm();
        self.params.clear();
    }

    /// A burst error forces a full channel reset and a return to B0.
    fn handle_burst_error(&mut self) -> bool {
        if !self.error_flags.contains(ErrorFlags::CHANNEL_BURST) {
            return false;
        }
        self.reset_ddc();
        self.reset_after_error();
        true
    }

    fn take_write_ready(&mut self) -> bool {
        std::mem::take(&mut self.write_msg_ready)
    }

    fn take_read_ready(&mut self) -> bool {
        std::mem::take(&mut self.read_msg_ready)
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
