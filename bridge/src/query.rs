//! Read-only views over bridge state.
//!
//! The pending-send index is exposed here as a derived view keyed by
//! channel; nothing in this module mutates state.

use cosmwasm_std::{Addr, IbcPacket, Order, StdResult, Storage};

use crate::state::{
    ChannelInfo, EscrowEntry, CHANNELS, DENOM_TRACES, ESCROW_ENTRIES, PENDING_SENDS, PORT_BINDINGS,
};

/// Packets sent on `channel_id` still awaiting acknowledgement or timeout.
pub fn pending_packets(storage: &dyn Storage, channel_id: &str) -> StdResult<Vec<IbcPacket>> {
    PENDING_SENDS
        .prefix(channel_id)
        .range(storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, packet)| packet))
        .collect()
}

/// Every in-flight packet on this chain, ordered by channel and sequence.
pub fn all_pending_packets(storage: &dyn Storage) -> StdResult<Vec<IbcPacket>> {
    PENDING_SENDS
        .range(storage, None, None, Order::Ascending)
        .map(|item| item.map(|(_, packet)| packet))
        .collect()
}

/// Current owner of `port_id`, if bound.
pub fn port_owner(storage: &dyn Storage, port_id: &str) -> StdResult<Option<Addr>> {
    Ok(PORT_BINDINGS
        .may_load(storage, port_id)?
        .map(|binding| binding.owner))
}

/// Channel metadata and handshake state.
pub fn channel(storage: &dyn Storage, channel_id: &str) -> StdResult<Option<ChannelInfo>> {
    CHANNELS.may_load(storage, channel_id)
}

/// Escrow entry for a sent packet, if not yet settled.
pub fn escrow_entry(
    storage: &dyn Storage,
    channel_id: &str,
    sequence: u64,
) -> StdResult<Option<EscrowEntry>> {
    ESCROW_ENTRIES.may_load(storage, (channel_id, sequence))
}

/// Trace path behind a hashed voucher denom.
pub fn denom_trace(storage: &dyn Storage, voucher: &str) -> StdResult<Option<String>> {
    DENOM_TRACES.may_load(storage, voucher)
}
