//! Error types for the IBC callback bridge.
//!
//! Errors fall into two classes: fatal errors abort and roll back the
//! enclosing transaction, while application errors raised during packet
//! receive processing become failure acknowledgements (the packet stays
//! delivered). [`BridgeError::is_application`] encodes the split.

use cosmwasm_std::{StdError, Uint128};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum BridgeError {
    #[error("{0}")]
    Std(#[from] StdError),

    // ========================================================================
    // Ownership Errors
    // ========================================================================

    #[error("Port already bound: {port_id} is owned by {owner}")]
    PortAlreadyBound { port_id: String, owner: String },

    #[error("No such port: {port_id}")]
    NoSuchPort { port_id: String },

    #[error("Not owner: {actor} does not own port {port_id}")]
    NotOwner { port_id: String, actor: String },

    #[error("No contract instance registered for {address}")]
    UnknownContract { address: String },

    // ========================================================================
    // Channel & Packet Errors
    // ========================================================================

    #[error("Channel not found: {channel_id}")]
    ChannelNotFound { channel_id: String },

    #[error("Channel {channel_id} is not open (state: {state})")]
    ChannelNotOpen { channel_id: String, state: String },

    #[error("Invalid timeout: {reason}")]
    InvalidTimeout { reason: String },

    #[error("No pending packet for {channel_id} sequence {sequence}")]
    UnknownPacket { channel_id: String, sequence: u64 },

    #[error("Packet {channel_id}/{sequence} already received")]
    PacketAlreadyReceived { channel_id: String, sequence: u64 },

    #[error("Out of order packet on ordered channel {channel_id}: expected {expected}, got {got}")]
    OutOfOrderPacket {
        channel_id: String,
        expected: u64,
        got: u64,
    },

    // ========================================================================
    // Callback Outcomes
    // ========================================================================

    #[error("Contract rejected channel handshake: {reason}")]
    HandshakeRejected { reason: String },

    #[error("Contract callback failed: {msg}")]
    CallbackFailed { msg: String },

    #[error("Unsupported message emitted by contract: {kind}")]
    UnsupportedMessage { kind: String },

    // ========================================================================
    // Funds & Escrow Errors
    // ========================================================================

    #[error("Insufficient funds: {address} has {available}{denom}, needs {needed}{denom}")]
    InsufficientFunds {
        address: String,
        denom: String,
        available: Uint128,
        needed: Uint128,
    },

    #[error("Escrow for {channel_id}/{sequence} already settled")]
    AlreadySettled { channel_id: String, sequence: u64 },

    #[error("Invalid packet data: {reason}")]
    InvalidPacketData { reason: String },

    // ========================================================================
    // Gas Errors
    // ========================================================================

    #[error("Out of gas: limit {limit}, attempted {attempted}")]
    OutOfGas { limit: u64, attempted: u64 },
}

impl BridgeError {
    /// Errors that become failure acknowledgements when raised while a
    /// received packet is being processed.
    pub fn is_application(&self) -> bool {
        matches!(
            self,
            BridgeError::InsufficientFunds { .. }
                | BridgeError::AlreadySettled { .. }
                | BridgeError::InvalidPacketData { .. }
        )
    }

    /// Errors that abort and roll back the enclosing transaction.
    pub fn is_fatal(&self) -> bool {
        !self.is_application()
    }
}
