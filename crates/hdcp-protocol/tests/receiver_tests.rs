//! Receiver-engine tests driven by a hand-operated transmitter on the
//! master port, with replies checked against the shared key-derivation
//! functions.

mod common;

use common::{pump, vector_cert, vector_receiver_key, Rx};
use hdcp_core::constants::MAX_LC_INIT_ATTEMPTS;
use hdcp_core::log::ErrorFlags;
use hdcp_core::message::{
    AkeInit, AkeNoStoredKm, AkeStoredKm, LcInit, Message, SkeSendEks,
};
use hdcp_core::types::TxCaps;
use hdcp_crypto::{cert, kdf, Certificate, CountingRandom, SoftwareCrypto};
use hdcp_protocol::channel::{DdcMaster, MasterPort};
use hdcp_protocol::{
    InMemoryDdc, ManualClock, ProtocolError, ReceiverConfig, ReceiverEngine, ReceiverMode,
    RxAuthStatus, RxState, Topology,
};

fn setup(mode: ReceiverMode) -> (InMemoryDdc, MasterPort, Rx) {
    let bus = InMemoryDdc::new();
    let crypto =
        SoftwareCrypto::with_receiver_key(Box::new(CountingRandom::new()), vector_receiver_key());
    let mut rx = ReceiverEngine::new(
        ReceiverConfig {
            mode,
            ..ReceiverConfig::default()
        },
        bus.slave(),
        crypto,
        ManualClock::new(),
    );
    rx.load_public_cert(vector_cert());
    rx.enable().unwrap();
    let master = bus.master();
    (bus, master, rx)
}

fn send(bus: &InMemoryDdc, master: &mut MasterPort, rx: &mut Rx, msg: &Message) {
    master.write_message(&msg.encode());
    pump(bus, rx);
}

/// Read the receiver's pending reply and deliver the read-complete edge.
fn read_reply(bus: &InMemoryDdc, master: &mut MasterPort, rx: &mut Rx) -> Vec<u8> {
    let size = usize::from(master.read_rx_status().message_size);
    assert!(size > 0, "no reply pending");
    let mut buf = vec![0u8; size];
    assert_eq!(master.read_message(size, &mut buf), size);
    pump(bus, rx);
    buf
}

const TEST_RTX: [u8; 8] = [0x18, 0xfa, 0xe4, 0x20, 0x6a, 0xfb, 0x51, 0x49];

fn ake_init() -> Message {
    Message::AkeInit(AkeInit {
        rtx: TEST_RTX,
        tx_caps: TxCaps::new(),
    })
}

/// Drive the receiver through AKE_Init -> cert -> no-stored-Km -> H' ->
/// pairing-info, returning `(km, rrx, rx_caps, kd)` for the session.
fn run_ake(
    bus: &InMemoryDdc,
    master: &mut MasterPort,
    rx: &mut Rx,
    km: [u8; 16],
) -> ([u8; 8], [u8; 3], [u8; 32], [u8; 16]) {
    send(bus, master, rx, &ake_init());
    rx.poll();
    assert_eq!(rx.state(), RxState::B1SendCert);
    rx.poll();
    let cert_msg = read_reply(bus, master, rx);
    assert_eq!(cert_msg.len(), 534);
    let rrx: [u8; 8] = cert_msg[523..531].try_into().unwrap();
    let rx_caps: [u8; 3] = cert_msg[531..534].try_into().unwrap();

    let cert_bytes = vector_cert();
    let cert_view = Certificate::new(&cert_bytes);
    let mut rng = CountingRandom::new();
    let ekpub_km = cert::encrypt_km(&cert_view, &km, &mut rng).unwrap();
    send(bus, master, rx, &Message::AkeNoStoredKm(AkeNoStoredKm { ekpub_km }));
    rx.poll(); // decrypt Km and push H' in the same tick

    let h_msg = read_reply(bus, master, rx);
    let kd = kdf::session_kd(&km, &TEST_RTX, &rrx);
    assert_eq!(
        &h_msg[1..],
        kdf::h_prime(&kd, &TEST_RTX, &rx_caps, &TxCaps::new().to_bytes()),
        "receiver H' must match the transmitter-side computation"
    );

    rx.poll(); // pairing info
    let pairing_msg = read_reply(bus, master, rx);
    assert_eq!(pairing_msg.len(), 17);
    let ekh_km: [u8; 16] = pairing_msg[1..].try_into().unwrap();
    assert_eq!(rx.state(), RxState::B1WaitLcInit);

    (rrx, rx_caps, kd, ekh_km)
}

// ---------------------------------------------------------------------------
// B0 behavior
// ---------------------------------------------------------------------------

#[test]
fn only_ake_init_leaves_b0() {
    let (bus, mut master, mut rx) = setup(ReceiverMode::Receiver);

    send(&bus, &mut master, &mut rx, &Message::LcInit(LcInit { rn: [0; 8] }));
    rx.poll();
    assert_eq!(rx.state(), RxState::B0WaitAkeInit);
    assert!(rx.sticky_error_flags().contains(ErrorFlags::FORCE_RESET));

    // An unknown message ID is equally rejected.
    master.write_message(&[0x3f, 0x00]);
    pump(&bus, &mut rx);
    rx.poll();
    assert_eq!(rx.state(), RxState::B0WaitAkeInit);
}

#[test]
fn undersized_ake_init_is_a_protocol_error() {
    let (bus, mut master, mut rx) = setup(ReceiverMode::Receiver);

    master.write_message(&ake_init().encode()[..11]);
    pump(&bus, &mut rx);
    rx.poll();

    assert_eq!(rx.state(), RxState::B0WaitAkeInit);
    let sticky = rx.sticky_error_flags();
    assert!(sticky.contains(ErrorFlags::MESSAGE_SIZE));
    assert!(sticky.contains(ErrorFlags::PROCESSING_AKE_INIT));
}

// ---------------------------------------------------------------------------
// Restart semantics
// ---------------------------------------------------------------------------

#[test]
fn ake_init_restarts_from_mid_handshake_with_fresh_parameters() {
    let (bus, mut master, mut rx) = setup(ReceiverMode::Receiver);

    send(&bus, &mut master, &mut rx, &ake_init());
    rx.poll();
    rx.poll();
    let first_cert = read_reply(&bus, &mut master, &mut rx);
    assert_eq!(rx.state(), RxState::B1WaitKm);

    send(&bus, &mut master, &mut rx, &ake_init());
    // The restart re-primes the channel, so the fresh certificate goes out
    // within the same tick.
    rx.poll();
    assert_eq!(rx.state(), RxState::B1WaitKm);
    assert_eq!(rx.status(), RxAuthStatus::ComputeKm);

    let second_cert = read_reply(&bus, &mut master, &mut rx);
    assert_ne!(
        first_cert[523..531],
        second_cert[523..531],
        "a restart must draw a fresh Rrx"
    );
}

#[test]
fn burst_error_forces_reset_and_restores_channel_defaults() {
    let (bus, mut master, mut rx) = setup(ReceiverMode::Receiver);

    send(&bus, &mut master, &mut rx, &ake_init());
    rx.poll();
    rx.poll();
    let _ = read_reply(&bus, &mut master, &mut rx);
    assert_eq!(rx.state(), RxState::B1WaitKm);

    rx.set_channel_burst_error();
    rx.poll();

    assert_eq!(rx.state(), RxState::B0WaitAkeInit);
    assert_eq!(rx.status(), RxAuthStatus::Unauthenticated);
    assert!(rx.sticky_error_flags().contains(ErrorFlags::CHANNEL_BURST));
    assert_eq!(bus.status(), hdcp_protocol::RxStatusWord::default());
}

// ---------------------------------------------------------------------------
// Stored-Km path
// ---------------------------------------------------------------------------

#[test]
fn harvested_pairing_info_supports_stored_km_reauthentication() {
    let (bus, mut master, mut rx) = setup(ReceiverMode::Receiver);

    let km = [0x5c; 16];
    let (rrx1, _, _, ekh_km) = run_ake(&bus, &mut master, &mut rx, km);

    // New session reusing the pairing blob and the original nonce pair.
    send(&bus, &mut master, &mut rx, &ake_init());
    rx.poll();
    rx.poll();
    let cert_msg = read_reply(&bus, &mut master, &mut rx);
    let rrx2: [u8; 8] = cert_msg[523..531].try_into().unwrap();
    let rx_caps: [u8; 3] = cert_msg[531..534].try_into().unwrap();

    let mut m = [0u8; 16];
    m[..8].copy_from_slice(&TEST_RTX);
    m[8..].copy_from_slice(&rrx1);
    send(
        &bus,
        &mut master,
        &mut rx,
        &Message::AkeStoredKm(AkeStoredKm { ekh_km, m }),
    );
    rx.poll();

    let h_msg = read_reply(&bus, &mut master, &mut rx);
    let kd2 = kdf::session_kd(&km, &TEST_RTX, &rrx2);
    assert_eq!(
        &h_msg[1..],
        kdf::h_prime(&kd2, &TEST_RTX, &rx_caps, &TxCaps::new().to_bytes())
    );
    // No pairing info on the stored path.
    assert_eq!(rx.state(), RxState::B1WaitLcInit);
}

// ---------------------------------------------------------------------------
// Locality check bound
// ---------------------------------------------------------------------------

#[test]
fn locality_check_is_bounded_at_1024_attempts() {
    let (bus, mut master, mut rx) = setup(ReceiverMode::Receiver);
    let km = [0x21; 16];
    let (rrx, _, kd, _) = run_ake(&bus, &mut master, &mut rx, km);

    for attempt in 0..MAX_LC_INIT_ATTEMPTS {
        let rn = [attempt as u8, (attempt >> 8) as u8, 0, 0, 0, 0, 0, 0];
        send(&bus, &mut master, &mut rx, &Message::LcInit(LcInit { rn }));
        rx.poll();
        if rx.state() == RxState::B2SendLPrime {
            // The first round lands in B1 and replies on the next tick;
            // later rounds answer within the same tick.
            rx.poll();
        }
        let l_msg = read_reply(&bus, &mut master, &mut rx);
        assert_eq!(l_msg[0], 10, "attempt {attempt}");
        if attempt == 0 {
            assert_eq!(&l_msg[1..], kdf::l_prime(&kd, &rn, &rrx));
        }
        assert_eq!(rx.state(), RxState::B2WaitSkeSendEks);
    }

    // Attempt 1025 is a hard failure back to B0.
    send(&bus, &mut master, &mut rx, &Message::LcInit(LcInit { rn: [0xff; 8] }));
    rx.poll();
    assert_eq!(rx.state(), RxState::B0WaitAkeInit);
    assert!(rx.sticky_error_flags().contains(ErrorFlags::MAX_LC_ATTEMPTS));

    // And a late session key cannot coax the engine into B3.
    send(
        &bus,
        &mut master,
        &mut rx,
        &Message::SkeSendEks(SkeSendEks {
            edkey_ks: [0; 16],
            riv: [0; 8],
        }),
    );
    rx.poll();
    assert_eq!(rx.state(), RxState::B0WaitAkeInit);
    assert!(!rx.is_authenticated());
}

// ---------------------------------------------------------------------------
// Host operations
// ---------------------------------------------------------------------------

#[test]
fn enable_requires_certificate() {
    let bus = InMemoryDdc::new();
    let crypto =
        SoftwareCrypto::with_receiver_key(Box::new(CountingRandom::new()), vector_receiver_key());
    let mut rx = ReceiverEngine::new(
        ReceiverConfig::default(),
        bus.slave(),
        crypto,
        ManualClock::new(),
    );
    assert!(matches!(rx.enable(), Err(ProtocolError::NoCertificate)));
    rx.load_public_cert(vector_cert());
    rx.enable().unwrap();
    assert!(rx.is_enabled());
}

#[test]
fn disabled_engine_ignores_traffic() {
    let (bus, mut master, mut rx) = setup(ReceiverMode::Receiver);
    rx.disable();

    send(&bus, &mut master, &mut rx, &ake_init());
    assert_eq!(rx.poll(), RxAuthStatus::Unauthenticated);
    assert_eq!(rx.state(), RxState::B0WaitAkeInit);
}

#[test]
fn topology_updates_require_repeater_mode() {
    let (_bus, _master, mut rx) = setup(ReceiverMode::Receiver);
    assert!(matches!(
        rx.update_topology(Topology::default()),
        Err(ProtocolError::InvalidState(_))
    ));

    let (_bus, _master, mut repeater) = setup(ReceiverMode::Repeater);
    let oversized = Topology {
        ids: (0..32)
            .map(|i| hdcp_core::types::ReceiverId::new([i, 0, 0, 0, 0]))
            .collect(),
        depth: 1,
        ..Topology::default()
    };
    assert!(matches!(
        repeater.update_topology(oversized),
        Err(ProtocolError::TopologyTooLarge(32))
    ));
    assert!(repeater
        .update_topology(Topology {
            ids: vec![hdcp_core::types::ReceiverId::new([1, 2, 3, 4, 5])],
            depth: 1,
            ..Topology::default()
        })
        .is_ok());
}
