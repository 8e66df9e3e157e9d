//! Repeater topology and content-stream sequence tracking.

use hdcp_core::constants::{
    MAX_CASCADE_DEPTH, MAX_DEVICE_COUNT, RECEIVER_ID_SIZE, SEQ_NUM_MODULUS,
};
use hdcp_core::message::RxInfo;
use hdcp_core::types::ReceiverId;

/// A snapshot of the downstream device tree as the host reports it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Topology {
    pub ids: Vec<ReceiverId>,
    pub depth: u8,
    pub max_devices_exceeded: bool,
    pub max_cascade_exceeded: bool,
    pub hdcp2_0_repeater_downstream: bool,
    pub hdcp1_x_device_downstream: bool,
}

impl Topology {
    /// Whether either hard limit is blown (directly or via flags).
    pub fn exceeds_limits(&self) -> bool {
        self.max_devices_exceeded
            || self.max_cascade_exceeded
            || self.ids.len() > MAX_DEVICE_COUNT
            || self.depth > MAX_CASCADE_DEPTH
    }

    /// The packed RxInfo field for this topology.
    pub fn rx_info(&self) -> RxInfo {
        RxInfo {
            depth: self.depth,
            device_count: self.ids.len() as u8,
            max_devices_exceeded: self.max_devices_exceeded,
            max_cascade_exceeded: self.max_cascade_exceeded,
            hdcp2_0_repeater_downstream: self.hdcp2_0_repeater_downstream,
            hdcp1_x_device_downstream: self.hdcp1_x_device_downstream,
        }
    }

    /// The concatenated receiver-ID bytes, as hashed into `V`.
    pub fn id_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.ids.len() * RECEIVER_ID_SIZE);
        for id in &self.ids {
            bytes.extend_from_slice(id.as_ref());
        }
        bytes
    }
}

/// Receiver-side topology state: the pending snapshot, the edge-triggered
/// changed flag, and both repeater sequence counters.
#[derive(Debug, Default)]
pub struct TopologyState {
    current: Option<Topology>,
    changed: bool,
    seq_num_v: u32,
    last_seq_num_m: Option<u32>,
}

impl TopologyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new downstream snapshot and raise the changed edge.
    pub fn update(&mut self, topology: Topology) {
        self.current = Some(topology);
        self.changed = true;
    }

    pub fn current(&self) -> Option<&Topology> {
        self.current.as_ref()
    }

    /// Whether an un-propagated topology change is pending.
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Consume the edge-triggered changed flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// The `seq_num_V` to send with the next list, advancing the counter
    /// (24-bit wrap).
    pub fn next_seq_num_v(&mut self) -> u32 {
        let seq = self.seq_num_v;
        self.seq_num_v = (self.seq_num_v + 1) % SEQ_NUM_MODULUS;
        seq
    }

    /// Accept a `seq_num_M` only if it is strictly greater than every one
    /// seen this session (replay protection against upstream retries of old
    /// stream-manage requests).
    pub fn accept_seq_num_m(&mut self, seq: u32) -> bool {
        let fresh = match self.last_seq_num_m {
            None => true,
            Some(last) => seq > last,
        };
        if fresh {
            self.last_seq_num_m = Some(seq);
        }
        fresh
    }

    /// Forget the session-scoped counters (new authentication session).
    pub fn reset_session(&mut self) {
        self.seq_num_v = 0;
        self.last_seq_num_m = None;
        // An installed topology survives re-authentication and must be
        // re-propagated once the new session reaches the authenticated state.
        if self.current.is_some() {
            self.changed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topo(n: usize, depth: u8) -> Topology {
        Topology {
            ids: (0..n as u8).map(|i| ReceiverId::new([i; 5])).collect(),
            depth,
            ..Topology::default()
        }
    }

    #[test]
    fn limits() {
        assert!(!topo(3, 2).exceeds_limits());
        assert!(topo(32, 2).exceeds_limits());
        assert!(topo(3, 5).exceeds_limits());
        let flagged = Topology {
            max_devices_exceeded: true,
            ..topo(1, 1)
        };
        assert!(flagged.exceeds_limits());
    }

    #[test]
    fn changed_edge_is_consumed_once() {
        let mut state = TopologyState::new();
        assert!(!state.take_changed());
        state.update(topo(2, 1));
        assert!(state.take_changed());
        assert!(!state.take_changed());
    }

    #[test]
    fn seq_num_v_increments_and_wraps() {
        let mut state = TopologyState::new();
        assert_eq!(state.next_seq_num_v(), 0);
        assert_eq!(state.next_seq_num_v(), 1);
        state.seq_num_v = SEQ_NUM_MODULUS - 1;
        assert_eq!(state.next_seq_num_v(), SEQ_NUM_MODULUS - 1);
        assert_eq!(state.next_seq_num_v(), 0);
    }

    #[test]
    fn seq_num_m_replay_rejected() {
        let mut state = TopologyState::new();
        assert!(state.accept_seq_num_m(0));
        assert!(state.accept_seq_num_m(1));
        assert!(!state.accept_seq_num_m(1));
        assert!(!state.accept_seq_num_m(0));
        assert!(state.accept_seq_num_m(7));
    }

    #[test]
    fn session_reset_rearms_propagation() {
        let mut state = TopologyState::new();
        state.update(topo(1, 1));
        let _ = state.take_changed();
        let _ = state.next_seq_num_v();
        assert!(state.accept_seq_num_m(5));

        state.reset_session();
        assert_eq!(state.next_seq_num_v(), 0);
        assert!(state.accept_seq_num_m(0));
        // Pending topology must be re-sent in the new session.
        assert!(state.take_changed());
    }

    #[test]
    fn id_bytes_concatenation() {
        let t = topo(2, 1);
        let bytes = t.id_bytes();
        assert_eq!(bytes.len(), 10);
        assert_eq!(&bytes[..5], &[0; 5]);
        assert_eq!(&bytes[5..], &[1; 5]);
    }

    #[test]
    fn rx_info_reflects_topology() {
        let t = topo(3, 2);
        let info = t.rx_info();
        assert_eq!(info.device_count, 3);
        assert_eq!(info.depth, 2);
    }
}
