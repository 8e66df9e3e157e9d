//! Core types, constants, and wire formats for the HDCP 2.2 authentication
//! protocol.
//!
//! This crate defines the handshake message set and its fixed-layout codec,
//! the newtype wrappers for protocol byte fields, the diagnostic event log,
//! and the sticky error-flag set shared by the receiver and transmitter
//! engines.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod constants;
pub mod error;
pub mod log;
pub mod message;
pub mod types;

pub use error::MessageError;
pub use log::{ErrorFlags, EventLog, LogEntry, LogKind};
pub use message::{Message, MessageId, RxInfo};
pub use types::{InvalidLength, ReceiverId, RxCaps, TxCaps};
