//! Pairing cache: previously negotiated master keys, keyed by receiver ID.
//!
//! A hit lets the transmitter skip the RSA master-key exchange and take the
//! stored-Km fast path. The cache is bounded; records land in the first free
//! slot, and when none is free the oldest-inserted record is evicted.
//! Clearing the cache never disturbs an in-progress session: engines keep
//! their own copy of the session material.

use hdcp_core::constants::{EKH_SIZE, KM_SIZE, RRX_SIZE, RTX_SIZE, RXCAPS_SIZE};
use hdcp_core::types::ReceiverId;

/// Capacity bounds: at least one slot, at most one per addressable device.
pub const MIN_PAIRING_CAPACITY: usize = 1;
pub const MAX_PAIRING_CAPACITY: usize = 32;

/// One paired receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRecord {
    pub receiver_id: ReceiverId,
    pub rx_caps: [u8; RXCAPS_SIZE],
    pub rtx: [u8; RTX_SIZE],
    pub rrx: [u8; RRX_SIZE],
    pub km: [u8; KM_SIZE],
    pub ekh_km: [u8; EKH_SIZE],
}

/// Bounded associative store of pairing records.
#[derive(Debug)]
pub struct PairingCache {
    slots: Vec<Option<(u64, PairingRecord)>>,
    counter: u64,
}

impl PairingCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(MIN_PAIRING_CAPACITY, MAX_PAIRING_CAPACITY);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            counter: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a record by receiver ID.
    pub fn lookup(&self, id: &ReceiverId) -> Option<&PairingRecord> {
        self.slots
            .iter()
            .flatten()
            .find(|(_, r)| r.receiver_id == *id)
            .map(|(_, r)| r)
    }

    /// Insert a record: an existing record for the same receiver is
    /// replaced, otherwise the first free slot is used, otherwise the
    /// oldest-inserted record is evicted.
    pub fn insert(&mut self, record: PairingRecord) {
        self.counter += 1;
        let stamp = self.counter;

        if let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| matches!(s, Some((_, r)) if r.receiver_id == record.receiver_id))
        {
            *slot = Some((stamp, record));
            return;
        }

        if let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) {
            *slot = Some((stamp, record));
            return;
        }

        let oldest = self
            .slots
            .iter_mut()
            .min_by_key(|s| s.as_ref().map(|(stamp, _)| *stamp).unwrap_or(0))
            .expect("cache has at least one slot");
        *oldest = Some((stamp, record));
    }

    /// Drop the record for one receiver. Returns whether one existed.
    pub fn invalidate(&mut self, id: &ReceiverId) -> bool {
        for slot in &mut self.slots {
            if matches!(slot, Some((_, r)) if r.receiver_id == *id) {
                *slot = None;
                return true;
            }
        }
        false
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u8) -> PairingRecord {
        PairingRecord {
            receiver_id: ReceiverId::new([id, 0, 0, 0, 1]),
            rx_caps: [0x02, 0, 0],
            rtx: [id; 8],
            rrx: [id; 8],
            km: [id; 16],
            ekh_km: [id; 16],
        }
    }

    #[test]
    fn insert_and_lookup() {
        let mut cache = PairingCache::new(2);
        cache.insert(record(1));
        let found = cache.lookup(&ReceiverId::new([1, 0, 0, 0, 1])).unwrap();
        assert_eq!(found.km, [1; 16]);
        assert!(cache.lookup(&ReceiverId::new([9, 0, 0, 0, 1])).is_none());
    }

    #[test]
    fn same_receiver_replaces() {
        let mut cache = PairingCache::new(2);
        cache.insert(record(1));
        let mut updated = record(1);
        updated.km = [0xff; 16];
        cache.insert(updated);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.lookup(&ReceiverId::new([1, 0, 0, 0, 1])).unwrap().km,
            [0xff; 16]
        );
    }

    #[test]
    fn full_cache_evicts_oldest() {
        let mut cache = PairingCache::new(2);
        cache.insert(record(1));
        cache.insert(record(2));
        cache.insert(record(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(&record(1).receiver_id).is_none());
        assert!(cache.lookup(&record(2).receiver_id).is_some());
        assert!(cache.lookup(&record(3).receiver_id).is_some());
    }

    #[test]
    fn eviction_tracks_replacement_recency() {
        let mut cache = PairingCache::new(2);
        cache.insert(record(1));
        cache.insert(record(2));
        // Refresh record 1 so record 2 becomes the oldest.
        cache.insert(record(1));
        cache.insert(record(3));
        assert!(cache.lookup(&record(1).receiver_id).is_some());
        assert!(cache.lookup(&record(2).receiver_id).is_none());
    }

    #[test]
    fn invalidate_and_clear() {
        let mut cache = PairingCache::new(4);
        cache.insert(record(1));
        cache.insert(record(2));
        assert!(cache.invalidate(&record(1).receiver_id));
        assert!(!cache.invalidate(&record(1).receiver_id));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_is_clamped() {
        assert_eq!(PairingCache::new(0).capacity(), 1);
        assert_eq!(PairingCache::new(100).capacity(), 32);
    }
}
