//! Common - Shared Wire Types for the IBC Callback Bridge
//!
//! This package provides the fungible token packet encoding, the
//! acknowledgement envelope and the voucher denomination scheme shared by
//! the bridge host and contract endpoints.

pub mod ack;
pub mod denom;
pub mod ics20;

pub use ack::Ack;
pub use denom::{keccak256, voucher_denom};
pub use ics20::Ics20Packet;
