//! Shared harness for the engine integration tests: vector-backed key
//! material, an in-memory link joining one real engine to another (or to a
//! hand-driven fake peer), and a tap that records wire traffic.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use hdcp_core::constants::CERT_SIZE;
use hdcp_crypto::{CountingRandom, RandomSource, ReceiverKey, SoftwareCrypto};
use hdcp_protocol::channel::{DdcMaster, MasterPort, SlavePort};
use hdcp_protocol::{
    InMemoryDdc, ManualClock, ReceiverConfig, ReceiverEngine, ReceiverMode, RxStatusWord,
    TransmitterConfig, TransmitterEngine, TxPollStatus,
};

pub type Rx = ReceiverEngine<SlavePort, SoftwareCrypto, ManualClock>;
pub type Tx<M> = TransmitterEngine<M, SoftwareCrypto, ManualClock>;

// ---------------------------------------------------------------------------
// Vector-backed key material
// ---------------------------------------------------------------------------

pub fn vector_cert() -> [u8; CERT_SIZE] {
    let ake = hdcp_test_vectors::ake::load();
    hex::decode(&ake.certificate).unwrap().try_into().unwrap()
}

pub fn vector_receiver_key() -> ReceiverKey {
    let ake = hdcp_test_vectors::ake::load();
    let k = &ake.receiver_private_key;
    let comp = |s: &str| -> [u8; 64] { hex::decode(s).unwrap().try_into().unwrap() };
    ReceiverKey::from_crt_components(
        &comp(&k.p),
        &comp(&k.q),
        &comp(&k.dp),
        &comp(&k.dq),
        &comp(&k.qinv),
    )
    .unwrap()
}

pub fn vector_anchor_parts() -> (Vec<u8>, Vec<u8>) {
    let ake = hdcp_test_vectors::ake::load();
    (
        hex::decode(&ake.trust_anchor.modulus).unwrap(),
        hex::decode(&ake.trust_anchor.exponent).unwrap(),
    )
}

// ---------------------------------------------------------------------------
// Wire tap
// ---------------------------------------------------------------------------

/// Messages observed on the link, in order.
#[derive(Debug, Default)]
pub struct Tap {
    /// Transmitter-to-receiver messages.
    pub writes: Vec<Vec<u8>>,
    /// Receiver-to-transmitter messages.
    pub reads: Vec<Vec<u8>>,
}

/// A [`DdcMaster`] that records every message crossing it.
pub struct TapMaster {
    inner: MasterPort,
    pub tap: Rc<RefCell<Tap>>,
}

impl TapMaster {
    pub fn new(inner: MasterPort) -> (Self, Rc<RefCell<Tap>>) {
        let tap = Rc::new(RefCell::new(Tap::default()));
        (
            Self {
                inner,
                tap: Rc::clone(&tap),
            },
            tap,
        )
    }
}

impl DdcMaster for TapMaster {
    fn read_version(&mut self) -> u8 {
        self.inner.read_version()
    }

    fn read_rx_status(&mut self) -> RxStatusWord {
        self.inner.read_rx_status()
    }

    fn write_message(&mut self, bytes: &[u8]) {
        self.tap.borrow_mut().writes.push(bytes.to_vec());
        self.inner.write_message(bytes);
    }

    fn read_message(&mut self, len: usize, out: &mut [u8]) -> usize {
        let n = self.inner.read_message(len, out);
        self.tap.borrow_mut().reads.push(out[..n].to_vec());
        n
    }
}

// ---------------------------------------------------------------------------
// Engine-to-engine link
// ---------------------------------------------------------------------------

/// Forward pending channel edge events to the receiver engine.
pub fn pump(bus: &InMemoryDdc, rx: &mut Rx) {
    let events = bus.take_events();
    if events.write_message_available {
        rx.on_write_message_available();
    }
    if events.read_message_complete {
        rx.on_read_message_complete();
    }
}

/// A transmitter engine and a receiver engine joined by one in-memory
/// register file, each with its own software crypto provider.
pub struct TestLink {
    pub bus: InMemoryDdc,
    pub clock: ManualClock,
    pub rx: Rx,
    pub tx: Tx<TapMaster>,
    pub tap: Rc<RefCell<Tap>>,
}

impl TestLink {
    pub fn new(rx_mode: ReceiverMode) -> Self {
        Self::with_random_sources(
            rx_mode,
            Box::new(CountingRandom::new()),
            Box::new(CountingRandom::new()),
        )
    }

    pub fn with_random_sources(
        rx_mode: ReceiverMode,
        tx_rng: Box<dyn RandomSource>,
        rx_rng: Box<dyn RandomSource>,
    ) -> Self {
        let bus = InMemoryDdc::new();
        let clock = ManualClock::new();

        let rx_crypto = SoftwareCrypto::with_receiver_key(rx_rng, vector_receiver_key());
        let mut rx = ReceiverEngine::new(
            ReceiverConfig {
                mode: rx_mode,
                ..ReceiverConfig::default()
            },
            bus.slave(),
            rx_crypto,
            clock.clone(),
        );
        rx.load_public_cert(vector_cert());
        rx.enable().unwrap();

        let (master, tap) = TapMaster::new(bus.master());
        let tx_crypto = SoftwareCrypto::new(tx_rng);
        let mut tx = TransmitterEngine::new(
            TransmitterConfig::default(),
            master,
            tx_crypto,
            clock.clone(),
        );
        let (modulus, exponent) = vector_anchor_parts();
        tx.load_trust_anchor(&modulus, &exponent).unwrap();
        tx.enable().unwrap();
        tx.set_peer_present(true);

        Self {
            bus,
            clock,
            rx,
            tx,
            tap,
        }
    }

    /// One scheduling round: transmitter tick, then receiver tick, with
    /// channel events forwarded in between.
    pub fn step(&mut self) -> TxPollStatus {
        let status = self.tx.poll();
        pump(&self.bus, &mut self.rx);
        self.rx.poll();
        pump(&self.bus, &mut self.rx);
        status
    }

    /// Step until both engines report authenticated (or the step budget runs
    /// out). Returns the number of rounds taken.
    pub fn run_until_authenticated(&mut self, max_steps: usize) -> Option<usize> {
        for round in 0..max_steps {
            self.step();
            if self.tx.is_authenticated() && self.rx.is_authenticated() {
                return Some(round + 1);
            }
        }
        None
    }
}
