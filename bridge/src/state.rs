//! State definitions for the callback bridge.
//!
//! All storage tables live here: port ownership, channel bookkeeping,
//! pending sends, escrow entries, denomination traces and account balances.

use std::fmt;

use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Coin, IbcChannel, IbcPacket, Order, Storage, Timestamp, Uint128};
use cw_storage_plus::{Item, Map};

/// Host configuration set once at chain genesis.
#[cw_serde]
pub struct Config {
    /// Account holding escrowed transfer funds.
    pub escrow_address: Addr,
    /// Gas budget granted to each transaction.
    pub tx_gas_limit: u64,
}

/// A port and the single contract authorized to use it.
#[cw_serde]
pub struct PortBinding {
    pub port_id: String,
    pub owner: Addr,
}

/// Channel handshake states.
#[cw_serde]
pub enum ChannelState {
    Init,
    TryOpen,
    Open,
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Init => "init",
            ChannelState::TryOpen => "tryopen",
            ChannelState::Open => "open",
            ChannelState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A channel as tracked by the host, with its handshake state.
#[cw_serde]
pub struct ChannelInfo {
    pub channel: IbcChannel,
    pub state: ChannelState,
}

/// Funds held in custody for a sent packet.
#[cw_serde]
pub struct EscrowEntry {
    pub payer: Addr,
    pub coin: Coin,
    /// Returning vouchers are burned on send instead of escrowed; a refund
    /// re-mints them.
    pub burned: bool,
}

/// Latest counterparty height/time committed through the light client,
/// used to validate outgoing packet timeouts.
#[cw_serde]
pub struct ClientView {
    pub height: u64,
    pub timestamp: Timestamp,
}

/// Default per-transaction gas budget.
pub const DEFAULT_TX_GAS_LIMIT: u64 = 5_000_000;

/// Host configuration.
pub const CONFIG: Item<Config> = Item::new("config");

/// Port ownership registry.
/// Key: port ID, Value: PortBinding
pub const PORT_BINDINGS: Map<&str, PortBinding> = Map::new("port_bindings");

/// Channels by local channel ID.
pub const CHANNELS: Map<&str, ChannelInfo> = Map::new("channels");

/// Number of channels ever created, used to derive local channel IDs.
pub const CHANNEL_COUNT: Item<u64> = Item::new("channel_count");

/// Next send sequence per channel.
pub const NEXT_SEQUENCE_SEND: Map<&str, u64> = Map::new("next_sequence_send");

/// Next receive sequence per ordered channel.
pub const NEXT_SEQUENCE_RECV: Map<&str, u64> = Map::new("next_sequence_recv");

/// Packets sent but not yet acknowledged or timed out.
/// Key: (channel ID, sequence), Value: the sent packet
pub const PENDING_SENDS: Map<(&str, u64), IbcPacket> = Map::new("pending_sends");

/// Receipts for packets delivered on unordered channels.
/// Key: (channel ID, sequence)
pub const RECEIPTS: Map<(&str, u64), bool> = Map::new("receipts");

/// Escrow entries for in-flight transfers.
/// Key: (channel ID, sequence), Value: EscrowEntry
pub const ESCROW_ENTRIES: Map<(&str, u64), EscrowEntry> = Map::new("escrow_entries");

/// Hashed voucher denom -> full trace path.
pub const DENOM_TRACES: Map<&str, String> = Map::new("denom_traces");

/// Counterparty client view per channel.
pub const CLIENT_VIEWS: Map<&str, ClientView> = Map::new("client_views");

/// Account balances.
/// Key: (address, denom), Value: amount
pub const BALANCES: Map<(&Addr, &str), Uint128> = Map::new("balances");

/// Capture the full key space, for all-or-nothing rollback.
pub fn snapshot(storage: &dyn Storage) -> Vec<(Vec<u8>, Vec<u8>)> {
    storage.range(None, None, Order::Ascending).collect()
}

/// Restore a snapshot taken with [`snapshot`], discarding every write made
/// since.
pub fn restore(storage: &mut dyn Storage, snap: Vec<(Vec<u8>, Vec<u8>)>) {
    let current: Vec<Vec<u8>> = storage
        .range(None, None, Order::Ascending)
        .map(|(key, _)| key)
        .collect();
    for key in current {
        storage.remove(&key);
    }
    for (key, value) in snap {
        storage.set(&key, &value);
    }
}
