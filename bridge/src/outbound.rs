//! Outbound message translation: contract-emitted follow-on actions applied
//! in emission order against the ledger and the protocol core.
//!
//! Ownership is checked before any core or ledger call, so a contract
//! touching a channel it does not own fails the whole transaction without
//! side effects.

use cosmwasm_std::{Addr, BankMsg, CosmosMsg, IbcChannelCloseMsg, IbcMsg, ReplyOn, Storage, SubMsg};
use tracing::debug;

use crate::dispatch::{self, DispatchCtx};
use crate::error::BridgeError;
use crate::state::{ChannelInfo, ChannelState};
use crate::{bank, channel, registry, transfer};

/// Apply every follow-on message a contract emitted, in order. Any failure
/// aborts the enclosing transaction.
pub fn handle_messages(
    ctx: &mut DispatchCtx,
    actor: &Addr,
    messages: Vec<SubMsg>,
) -> Result<(), BridgeError> {
    for sub in messages {
        if sub.reply_on != ReplyOn::Never {
            return Err(BridgeError::UnsupportedMessage {
                kind: "reply".to_string(),
            });
        }
        handle_message(ctx, actor, sub.msg)?;
    }
    Ok(())
}

fn handle_message(
    ctx: &mut DispatchCtx,
    actor: &Addr,
    msg: CosmosMsg,
) -> Result<(), BridgeError> {
    match msg {
        CosmosMsg::Bank(BankMsg::Send { to_address, amount, .. }) => {
            let to = Addr::unchecked(to_address);
            for coin in amount {
                bank::transfer(&mut *ctx.storage, actor, &to, &coin)?;
            }
            Ok(())
        }
        CosmosMsg::Bank(BankMsg::Burn { amount, .. }) => {
            for coin in amount {
                bank::burn(&mut *ctx.storage, actor, &coin)?;
            }
            Ok(())
        }
        CosmosMsg::Ibc(IbcMsg::Transfer {
            channel_id,
            to_address,
            amount,
            timeout,
            ..
        }) => {
            transfer::send(
                &mut *ctx.storage,
                actor,
                &channel_id,
                amount,
                &to_address,
                timeout,
            )?;
            Ok(())
        }
        CosmosMsg::Ibc(IbcMsg::SendPacket {
            channel_id,
            data,
            timeout,
            ..
        }) => {
            assert_channel_owner(&*ctx.storage, &channel_id, actor)?;
            let packet = channel::send_packet(&mut *ctx.storage, &channel_id, data, timeout)?;
            debug!(
                actor = %actor,
                channel = %channel_id,
                sequence = packet.sequence,
                "contract packet sent"
            );
            Ok(())
        }
        CosmosMsg::Ibc(IbcMsg::CloseChannel { channel_id, .. }) => {
            let info = assert_channel_owner(&*ctx.storage, &channel_id, actor)?;
            channel::set_channel_state(&mut *ctx.storage, &channel_id, ChannelState::Closed)?;
            dispatch::on_channel_close(
                ctx,
                IbcChannelCloseMsg::CloseInit {
                    channel: info.channel,
                },
            )
        }
        other => Err(BridgeError::UnsupportedMessage {
            kind: kind_of(&other),
        }),
    }
}

/// The acting contract must own the port of the channel it touches.
fn assert_channel_owner(
    storage: &dyn Storage,
    channel_id: &str,
    actor: &Addr,
) -> Result<ChannelInfo, BridgeError> {
    let info = channel::load_channel(storage, channel_id)?;
    let port_id = &info.channel.endpoint.port_id;
    let owner = registry::owner_of(storage, port_id)?;
    if owner != *actor {
        return Err(BridgeError::NotOwner {
            port_id: port_id.clone(),
            actor: actor.to_string(),
        });
    }
    Ok(info)
}

fn kind_of(msg: &CosmosMsg) -> String {
    let kind = match msg {
        CosmosMsg::Bank(_) => "bank",
        CosmosMsg::Custom(_) => "custom",
        CosmosMsg::Staking(_) => "staking",
        CosmosMsg::Distribution(_) => "distribution",
        CosmosMsg::Ibc(_) => "ibc",
        CosmosMsg::Wasm(_) => "wasm",
        CosmosMsg::Gov(_) => "gov",
        _ => "unknown",
    };
    kind.to_string()
}
