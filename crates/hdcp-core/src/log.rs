//! Diagnostic event log and sticky error flags.
//!
//! [`EventLog`] is a fixed-capacity ring that overwrites its oldest entry
//! when full; writing never fails and never allocates. Error events OR their
//! payload into a sticky [`ErrorFlags`] accumulator so a host can tell
//! "recovered automatically" from "needs user-visible intervention" long
//! after the transient condition cleared.

use core::fmt;

/// Number of entries retained before the oldest is overwritten.
pub const LOG_CAPACITY: usize = 64;

/// Error condition bits. The transient set drives engine recovery decisions;
/// the sticky copy in [`EventLog`] is cleared only by explicit reset.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[must_use]
pub struct ErrorFlags(pub u16);

impl ErrorFlags {
    pub const NONE: Self = Self(0);
    /// Received message with an unexpected size.
    pub const MESSAGE_SIZE: Self = Self(1 << 0);
    /// Engine forced back to its initial state after an error.
    pub const FORCE_RESET: Self = Self(1 << 1);
    /// Failed processing AKE_Init.
    pub const PROCESSING_AKE_INIT: Self = Self(1 << 2);
    /// Failed processing AKE_No_Stored_km.
    pub const PROCESSING_NO_STORED_KM: Self = Self(1 << 3);
    /// Failed processing AKE_Stored_km.
    pub const PROCESSING_STORED_KM: Self = Self(1 << 4);
    /// Failed processing LC_Init.
    pub const PROCESSING_LC_INIT: Self = Self(1 << 5);
    /// Failed processing SKE_Send_Eks.
    pub const PROCESSING_SKE_SEND_EKS: Self = Self(1 << 6);
    /// Persistent link-integrity problem reported by the transport.
    pub const LINK_INTEGRITY: Self = Self(1 << 7);
    /// Channel burst interrupted mid-message.
    pub const CHANNEL_BURST: Self = Self(1 << 8);
    /// Exceeded the maximum locality-check attempts.
    pub const MAX_LC_ATTEMPTS: Self = Self(1 << 9);

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

impl fmt::Debug for ErrorFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(u16, &str); 10] = [
            (1 << 0, "MESSAGE_SIZE"),
            (1 << 1, "FORCE_RESET"),
            (1 << 2, "PROCESSING_AKE_INIT"),
            (1 << 3, "PROCESSING_NO_STORED_KM"),
            (1 << 4, "PROCESSING_STORED_KM"),
            (1 << 5, "PROCESSING_LC_INIT"),
            (1 << 6, "PROCESSING_SKE_SEND_EKS"),
            (1 << 7, "LINK_INTEGRITY"),
            (1 << 8, "CHANNEL_BURST"),
            (1 << 9, "MAX_LC_ATTEMPTS"),
        ];
        write!(f, "ErrorFlags(")?;
        let mut first = true;
        for (bit, name) in NAMES {
            if self.0 & bit != 0 {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        if first {
            write!(f, "NONE")?;
        }
        write!(f, ")")
    }
}

/// Classification of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// General lifecycle information (reset, enable, disable, reauth).
    Info,
    /// A state transition; payload is an engine-defined state code.
    State,
    /// A message sent or received; payload is the message ID.
    Message,
    /// Verbose computation tracing.
    Debug,
    /// An error; payload is an [`ErrorFlags`] bit.
    Error,
}

/// One log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry {
    pub kind: LogKind,
    pub data: u16,
    /// Microseconds since the owning engine started.
    pub timestamp_us: u64,
}

impl LogEntry {
    const EMPTY: Self = Self {
        kind: LogKind::Info,
        data: 0,
        timestamp_us: 0,
    };
}

/// Bounded append-only ring of log entries.
pub struct EventLog {
    entries: [LogEntry; LOG_CAPACITY],
    head: usize,
    tail: usize,
    /// Whether `Debug` entries are recorded at all.
    verbose: bool,
    sticky: ErrorFlags,
}

impl EventLog {
    pub fn new(verbose: bool) -> Self {
        Self {
            entries: [LogEntry::EMPTY; LOG_CAPACITY],
            head: 0,
            tail: 0,
            verbose,
            sticky: ErrorFlags::NONE,
        }
    }

    /// Append an entry, overwriting the oldest if the ring is full. Error
    /// entries also accumulate into the sticky flags.
    pub fn write(&mut self, kind: LogKind, data: u16, timestamp_us: u64) {
        if kind == LogKind::Debug && !self.verbose {
            return;
        }
        if kind == LogKind::Error {
            self.sticky.insert(ErrorFlags(data));
        }

        self.entries[self.head] = LogEntry {
            kind,
            data,
            timestamp_us,
        };
        self.head = (self.head + 1) % LOG_CAPACITY;
        if self.head == self.tail {
            // Full: drop the oldest entry.
            self.tail = (self.tail + 1) % LOG_CAPACITY;
        }
    }

    /// Record an error flag as both a log entry and sticky state.
    pub fn write_error(&mut self, flag: ErrorFlags, timestamp_us: u64) {
        self.write(LogKind::Error, flag.bits(), timestamp_us);
    }

    /// Pop the oldest retained entry.
    pub fn pop(&mut self) -> Option<LogEntry> {
        if self.head == self.tail {
            return None;
        }
        let entry = self.entries[self.tail];
        self.tail = (self.tail + 1) % LOG_CAPACITY;
        Some(entry)
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Number of entries currently retained.
    pub fn len(&self) -> usize {
        (self.head + LOG_CAPACITY - self.tail) % LOG_CAPACITY
    }

    /// The accumulated sticky error flags.
    pub fn sticky_errors(&self) -> ErrorFlags {
        self.sticky
    }

    /// Clear the sticky flags, keeping logged entries.
    pub fn clear_sticky(&mut self) {
        self.sticky.clear();
    }

    /// Drop all entries and clear the sticky flags.
    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.sticky.clear();
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .field("sticky", &self.sticky)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_and_pop_in_order() {
        let mut log = EventLog::new(false);
        log.write(LogKind::Info, 1, 100);
        log.write(LogKind::State, 2, 200);
        assert_eq!(log.len(), 2);
        assert_eq!(log.pop().unwrap().data, 1);
        assert_eq!(log.pop().unwrap().data, 2);
        assert!(log.pop().is_none());
    }

    #[test]
    fn overwrites_oldest_when_full() {
        let mut log = EventLog::new(false);
        for i in 0..(LOG_CAPACITY as u16 + 10) {
            log.write(LogKind::Info, i, u64::from(i));
        }
        // Capacity is LOG_CAPACITY slots with one reserved by the ring,
        // so the oldest retained entry is the overflow boundary + 1.
        assert_eq!(log.len(), LOG_CAPACITY - 1);
        assert_eq!(log.pop().unwrap().data, 11);
    }

    #[test]
    fn debug_entries_skipped_unless_verbose() {
        let mut quiet = EventLog::new(false);
        quiet.write(LogKind::Debug, 7, 0);
        assert!(quiet.is_empty());

        let mut verbose = EventLog::new(true);
        verbose.write(LogKind::Debug, 7, 0);
        assert_eq!(verbose.len(), 1);
    }

    #[test]
    fn error_entries_accumulate_sticky_flags() {
        let mut log = EventLog::new(false);
        log.write_error(ErrorFlags::MESSAGE_SIZE, 0);
        log.write_error(ErrorFlags::CHANNEL_BURST, 1);
        assert!(log.sticky_errors().contains(ErrorFlags::MESSAGE_SIZE));
        assert!(log.sticky_errors().contains(ErrorFlags::CHANNEL_BURST));

        // Draining the ring does not clear sticky state.
        while log.pop().is_some() {}
        assert!(!log.sticky_errors().is_empty());

        log.reset();
        assert!(log.sticky_errors().is_empty());
    }

    #[test]
    fn flags_insert_remove_contains() {
        let mut flags = ErrorFlags::NONE;
        flags.insert(ErrorFlags::LINK_INTEGRITY);
        assert!(flags.contains(ErrorFlags::LINK_INTEGRITY));
        assert!(!flags.contains(ErrorFlags::MAX_LC_ATTEMPTS));
        flags.remove(ErrorFlags::LINK_INTEGRITY);
        assert!(flags.is_empty());
    }
}
