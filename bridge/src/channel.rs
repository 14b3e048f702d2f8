//! Channel and packet bookkeeping: handshake states, sequences, the
//! pending-send index, receipts and timeout validation.
//!
//! Proof verification for relayed packets lives outside this crate; the
//! tables here enforce the ordering and exactly-once invariants the bridge
//! depends on.

use cosmwasm_std::{Binary, IbcChannel, IbcOrder, IbcPacket, IbcTimeout, Order, Storage, Timestamp};

use crate::error::BridgeError;
use crate::state::{
    ChannelInfo, ChannelState, ClientView, CHANNELS, CHANNEL_COUNT, CLIENT_VIEWS,
    NEXT_SEQUENCE_RECV, NEXT_SEQUENCE_SEND, PENDING_SENDS, RECEIPTS,
};

/// Derive the next local channel ID.
pub fn next_channel_id(storage: &mut dyn Storage) -> Result<String, BridgeError> {
    let count = CHANNEL_COUNT.may_load(storage)?.unwrap_or(0);
    CHANNEL_COUNT.save(storage, &(count + 1))?;
    Ok(format!("channel-{count}"))
}

pub fn save_channel(
    storage: &mut dyn Storage,
    channel: &IbcChannel,
    state: ChannelState,
) -> Result<(), BridgeError> {
    let info = ChannelInfo {
        channel: channel.clone(),
        state,
    };
    CHANNELS.save(storage, &channel.endpoint.channel_id, &info)?;
    Ok(())
}

pub fn load_channel(storage: &dyn Storage, channel_id: &str) -> Result<ChannelInfo, BridgeError> {
    CHANNELS
        .may_load(storage, channel_id)?
        .ok_or_else(|| BridgeError::ChannelNotFound {
            channel_id: channel_id.to_string(),
        })
}

pub fn set_channel_state(
    storage: &mut dyn Storage,
    channel_id: &str,
    state: ChannelState,
) -> Result<(), BridgeError> {
    let mut info = load_channel(storage, channel_id)?;
    info.state = state;
    CHANNELS.save(storage, channel_id, &info)?;
    Ok(())
}

/// Record the latest counterparty height/time committed for `channel_id`.
pub fn update_client_view(
    storage: &mut dyn Storage,
    channel_id: &str,
    view: &ClientView,
) -> Result<(), BridgeError> {
    CLIENT_VIEWS.save(storage, channel_id, view)?;
    Ok(())
}

/// True when `port_id` still has a channel that is not closed.
pub fn port_has_open_channels(storage: &dyn Storage, port_id: &str) -> Result<bool, BridgeError> {
    for item in CHANNELS.range(storage, None, None, Order::Ascending) {
        let (_, info) = item?;
        if info.channel.endpoint.port_id == port_id && info.state != ChannelState::Closed {
            return Ok(true);
        }
    }
    Ok(false)
}

/// A timeout must be set and strictly ahead of everything the counterparty
/// has already committed.
fn validate_timeout(timeout: &IbcTimeout, view: &ClientView) -> Result<(), BridgeError> {
    if timeout.block().is_none() && timeout.timestamp().is_none() {
        return Err(BridgeError::InvalidTimeout {
            reason: "no timeout height or timestamp set".to_string(),
        });
    }
    if let Some(timestamp) = timeout.timestamp() {
        if timestamp <= view.timestamp {
            return Err(BridgeError::InvalidTimeout {
                reason: format!(
                    "timeout timestamp {timestamp} is not after the counterparty time {}",
                    view.timestamp
                ),
            });
        }
    }
    if let Some(block) = timeout.block() {
        if block.height <= view.height {
            return Err(BridgeError::InvalidTimeout {
                reason: format!(
                    "timeout height {} is not after the counterparty height {}",
                    block.height, view.height
                ),
            });
        }
    }
    Ok(())
}

/// Assign the next sequence on an open channel and enqueue the packet as
/// pending.
pub fn send_packet(
    storage: &mut dyn Storage,
    channel_id: &str,
    data: Binary,
    timeout: IbcTimeout,
) -> Result<IbcPacket, BridgeError> {
    let info = load_channel(storage, channel_id)?;
    if info.state != ChannelState::Open {
        return Err(BridgeError::ChannelNotOpen {
            channel_id: channel_id.to_string(),
            state: info.state.to_string(),
        });
    }
    let view = CLIENT_VIEWS
        .may_load(storage, channel_id)?
        .unwrap_or(ClientView {
            height: 0,
            timestamp: Timestamp::from_nanos(0),
        });
    validate_timeout(&timeout, &view)?;

    let sequence = NEXT_SEQUENCE_SEND.may_load(storage, channel_id)?.unwrap_or(1);
    NEXT_SEQUENCE_SEND.save(storage, channel_id, &(sequence + 1))?;

    let packet = IbcPacket::new(
        data,
        info.channel.endpoint.clone(),
        info.channel.counterparty_endpoint.clone(),
        sequence,
        timeout,
    );
    PENDING_SENDS.save(storage, (channel_id, sequence), &packet)?;
    Ok(packet)
}

/// Record delivery of an inbound packet: exactly-once on unordered
/// channels, strictly in sequence order on ordered ones.
pub fn record_receipt(storage: &mut dyn Storage, packet: &IbcPacket) -> Result<(), BridgeError> {
    let channel_id = packet.dest.channel_id.as_str();
    let info = load_channel(storage, channel_id)?;
    if info.state != ChannelState::Open {
        return Err(BridgeError::ChannelNotOpen {
            channel_id: channel_id.to_string(),
            state: info.state.to_string(),
        });
    }
    match info.channel.order {
        IbcOrder::Ordered => {
            let expected = NEXT_SEQUENCE_RECV.may_load(storage, channel_id)?.unwrap_or(1);
            if packet.sequence != expected {
                return Err(BridgeError::OutOfOrderPacket {
                    channel_id: channel_id.to_string(),
                    expected,
                    got: packet.sequence,
                });
            }
            NEXT_SEQUENCE_RECV.save(storage, channel_id, &(expected + 1))?;
        }
        IbcOrder::Unordered => {
            if RECEIPTS.has(storage, (channel_id, packet.sequence)) {
                return Err(BridgeError::PacketAlreadyReceived {
                    channel_id: channel_id.to_string(),
                    sequence: packet.sequence,
                });
            }
            RECEIPTS.save(storage, (channel_id, packet.sequence), &true)?;
        }
    }
    Ok(())
}

/// Remove the pending entry for an acknowledged packet.
pub fn ack_packet(
    storage: &mut dyn Storage,
    channel_id: &str,
    sequence: u64,
) -> Result<IbcPacket, BridgeError> {
    take_pending(storage, channel_id, sequence)
}

/// Remove the pending entry for a timed-out packet. Ordered channels close
/// when a packet on them times out.
pub fn timeout_packet(
    storage: &mut dyn Storage,
    channel_id: &str,
    sequence: u64,
) -> Result<IbcPacket, BridgeError> {
    let packet = take_pending(storage, channel_id, sequence)?;
    let info = load_channel(storage, channel_id)?;
    if info.channel.order == IbcOrder::Ordered {
        set_channel_state(storage, channel_id, ChannelState::Closed)?;
    }
    Ok(packet)
}

fn take_pending(
    storage: &mut dyn Storage,
    channel_id: &str,
    sequence: u64,
) -> Result<IbcPacket, BridgeError> {
    let packet = PENDING_SENDS
        .may_load(storage, (channel_id, sequence))?
        .ok_or_else(|| BridgeError::UnknownPacket {
            channel_id: channel_id.to_string(),
            sequence,
        })?;
    PENDING_SENDS.remove(storage, (channel_id, sequence));
    Ok(packet)
}
