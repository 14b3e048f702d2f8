//! Token-transfer application: the module-backed endpoint on the transfer
//! port, and the handler behind contract-initiated transfer messages.
//!
//! Sends move the payer's coin into escrow (or burn a returning voucher)
//! and are settled exactly once through the escrow coordinator when the
//! acknowledgement or timeout arrives. Receives mint hashed vouchers for
//! new hops and release escrow when a coin returns to its origin.

use cosmwasm_std::{to_json_binary, Addr, Binary, Coin, IbcChannel, IbcOrder, IbcPacket, IbcTimeout, Storage};
use tracing::debug;

use common::denom;
use common::{Ack, Ics20Packet};

use crate::channel;
use crate::error::BridgeError;
use crate::escrow;
use crate::state::{self, CONFIG, DENOM_TRACES};
use crate::bank;

/// Port the transfer application is bound to.
pub const PORT_ID: &str = "transfer";

/// Channel version the application speaks.
pub const VERSION: &str = "ics20-1";

/// Validate a handshake step for a channel on the transfer port.
pub fn validate_channel(
    channel: &IbcChannel,
    counterparty_version: Option<&str>,
) -> Result<(), BridgeError> {
    if channel.order != IbcOrder::Unordered {
        return Err(BridgeError::HandshakeRejected {
            reason: "transfer channels must be unordered".to_string(),
        });
    }
    if channel.version != VERSION {
        return Err(BridgeError::HandshakeRejected {
            reason: format!("expected channel version {VERSION}, got {}", channel.version),
        });
    }
    if let Some(version) = counterparty_version {
        if version != VERSION {
            return Err(BridgeError::HandshakeRejected {
                reason: format!("expected counterparty version {VERSION}, got {version}"),
            });
        }
    }
    Ok(())
}

/// Escrow (or burn) the payer's coin and send a fungible token packet over
/// `channel_id`. Returns the assigned sequence.
pub fn send(
    storage: &mut dyn Storage,
    payer: &Addr,
    channel_id: &str,
    coin: Coin,
    receiver: &str,
    timeout: IbcTimeout,
) -> Result<u64, BridgeError> {
    let info = channel::load_channel(storage, channel_id)?;
    if info.channel.endpoint.port_id != PORT_ID {
        // the transfer application only speaks on its own port
        return Err(BridgeError::ChannelNotFound {
            channel_id: channel_id.to_string(),
        });
    }

    // a voucher leaving over the channel it arrived on returns home and is
    // burned; everything else stays in escrow on this chain
    let (packet_denom, burned) = match DENOM_TRACES.may_load(storage, &coin.denom)? {
        Some(trace) => {
            let returning = denom::strip_hop(&trace, PORT_ID, channel_id).is_some();
            (trace, returning)
        }
        None => (coin.denom.clone(), false),
    };

    let data = Ics20Packet::new(coin.amount, &packet_denom, payer.as_str(), receiver);
    data.validate()
        .map_err(|err| BridgeError::InvalidPacketData {
            reason: err.to_string(),
        })?;

    let packet = channel::send_packet(storage, channel_id, to_json_binary(&data)?, timeout)?;
    escrow::lock(storage, channel_id, packet.sequence, payer, coin, burned)?;

    debug!(
        channel = channel_id,
        sequence = packet.sequence,
        payer = %payer,
        "transfer packet sent"
    );
    Ok(packet.sequence)
}

/// Receive a packet addressed to the transfer port, producing the
/// acknowledgement to relay back. Application failures roll back the
/// receive's writes and become error acknowledgements; the transaction
/// itself stays intact.
pub fn on_packet_receive(
    storage: &mut dyn Storage,
    packet: &IbcPacket,
) -> Result<Binary, BridgeError> {
    let snap = state::snapshot(storage);
    match do_receive(storage, packet) {
        Ok(()) => Ok(Ack::success().to_binary()),
        Err(err) if err.is_application() => {
            state::restore(storage, snap);
            debug!(
                channel = %packet.dest.channel_id,
                sequence = packet.sequence,
                error = %err,
                "transfer receive failed, writing failure acknowledgement"
            );
            Ok(Ack::error(err.to_string()).to_binary())
        }
        Err(err) => Err(err),
    }
}

/// The receive application logic: credit the packet receiver by minting a
/// voucher for a new hop, or by releasing escrow when the coin returns to
/// its origin.
pub fn do_receive(storage: &mut dyn Storage, packet: &IbcPacket) -> Result<(), BridgeError> {
    let data: Ics20Packet =
        cosmwasm_std::from_json(&packet.data).map_err(|err| BridgeError::InvalidPacketData {
            reason: err.to_string(),
        })?;
    data.validate()
        .map_err(|err| BridgeError::InvalidPacketData {
            reason: err.to_string(),
        })?;
    let receiver = Addr::unchecked(&data.receiver);

    match denom::strip_hop(&data.denom, &packet.src.port_id, &packet.src.channel_id) {
        Some(rest) => {
            // this chain is the origin of the hop being unwound
            let local_denom = if rest.contains('/') {
                denom::hashed(rest)
            } else {
                rest.to_string()
            };
            let config = CONFIG.load(storage)?;
            bank::transfer(
                storage,
                &config.escrow_address,
                &receiver,
                &Coin {
                    denom: local_denom,
                    amount: data.amount,
                },
            )?;
        }
        None => {
            // new hop: mint a voucher under the extended trace
            let trace =
                denom::trace_path(&packet.dest.port_id, &packet.dest.channel_id, &data.denom);
            let voucher = denom::hashed(&trace);
            DENOM_TRACES.save(storage, &voucher, &trace)?;
            bank::mint(
                storage,
                &receiver,
                &Coin {
                    denom: voucher,
                    amount: data.amount,
                },
            )?;
        }
    }
    Ok(())
}

/// Settle a transfer the counterparty acknowledged.
pub fn on_packet_ack(
    storage: &mut dyn Storage,
    packet: &IbcPacket,
    ack: &Binary,
) -> Result<(), BridgeError> {
    let channel_id = packet.src.channel_id.as_str();
    let ack = Ack::from_binary(ack).map_err(|err| BridgeError::InvalidPacketData {
        reason: format!("malformed acknowledgement: {err}"),
    })?;
    match ack {
        Ack::Result(_) => {
            escrow::finalize(storage, channel_id, packet.sequence)?;
        }
        Ack::Error(reason) => {
            debug!(
                channel = channel_id,
                sequence = packet.sequence,
                reason = %reason,
                "transfer rejected by counterparty, refunding"
            );
            escrow::refund(storage, channel_id, packet.sequence)?;
        }
    }
    channel::ack_packet(storage, channel_id, packet.sequence)?;
    Ok(())
}

/// Refund a transfer whose packet timed out. Replays fail with
/// `AlreadySettled` before any state is touched.
pub fn on_packet_timeout(storage: &mut dyn Storage, packet: &IbcPacket) -> Result<(), BridgeError> {
    let channel_id = packet.src.channel_id.as_str();
    escrow::refund(storage, channel_id, packet.sequence)?;
    channel::timeout_packet(storage, channel_id, packet.sequence)?;
    Ok(())
}
