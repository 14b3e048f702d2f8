//! Callback dispatch: protocol lifecycle events routed to the owning
//! endpoint, with the endpoint's result folded back into protocol state.
//!
//! Every entry point resolves the local port through the ownership
//! registry: the transfer port routes to the built-in transfer
//! application, every other port to the contract the registry names.
//! Result handling follows the lifecycle stage: handshake rejections
//! abort, receive-path application failures become failure
//! acknowledgements, and errors after the counterparty has committed
//! (acknowledgement and timeout callbacks) revert the transaction.

use cosmwasm_std::{
    Addr, Attribute, Binary, BlockInfo, Coin, ContractInfo, ContractResult, Env, Event,
    IbcChannelCloseMsg, IbcChannelConnectMsg, IbcChannelOpenMsg, IbcPacketAckMsg,
    IbcPacketReceiveMsg, IbcPacketTimeoutMsg, MessageInfo, Storage, TransactionInfo,
};
use tracing::{debug, warn};

use common::Ack;

use crate::error::BridgeError;
use crate::gas::GasMeter;
use crate::vm::{ContractHost, ContractVm};
use crate::{bank, channel, outbound, registry, state, transfer};

/// Everything one transaction's dispatching needs: chain state, the live
/// contract table, the shared gas meter and the current block.
pub struct DispatchCtx<'a> {
    pub storage: &'a mut dyn Storage,
    pub vm: &'a mut ContractVm,
    pub gas: &'a mut GasMeter,
    pub block: BlockInfo,
    /// Events emitted by endpoint responses during this transaction.
    pub events: Vec<Event>,
}

impl<'a> DispatchCtx<'a> {
    pub fn new(
        storage: &'a mut dyn Storage,
        vm: &'a mut ContractVm,
        gas: &'a mut GasMeter,
        block: BlockInfo,
    ) -> Self {
        DispatchCtx {
            storage,
            vm,
            gas,
            block,
            events: Vec::new(),
        }
    }

    /// The immutable environment a callback sees.
    fn env(&self, contract: &Addr) -> Env {
        Env {
            block: self.block.clone(),
            transaction: Some(TransactionInfo { index: 0 }),
            contract: ContractInfo {
                address: contract.clone(),
            },
        }
    }

    fn record_response(&mut self, attributes: Vec<Attribute>, events: Vec<Event>) {
        if !attributes.is_empty() {
            self.events.push(Event::new("wasm").add_attributes(attributes));
        }
        self.events.extend(events);
    }
}

/// Channel handshake step one (init or try). Returns the version the
/// endpoint wants on this channel, or `None` to accept the proposal.
pub fn on_channel_open(
    ctx: &mut DispatchCtx,
    msg: IbcChannelOpenMsg,
) -> Result<Option<String>, BridgeError> {
    let (ch, counterparty_version) = match &msg {
        IbcChannelOpenMsg::OpenInit { channel } => (channel.clone(), None),
        IbcChannelOpenMsg::OpenTry {
            channel,
            counterparty_version,
        } => (channel.clone(), Some(counterparty_version.clone())),
    };
    let port_id = ch.endpoint.port_id.clone();
    debug!(port = %port_id, channel = %ch.endpoint.channel_id, "dispatching channel open");

    if port_id == transfer::PORT_ID {
        transfer::validate_channel(&ch, counterparty_version.as_deref())?;
        return Ok(Some(transfer::VERSION.to_string()));
    }

    let owner = registry::owner_of(&*ctx.storage, &port_id)?;
    let env = ctx.env(&owner);
    let allowance = ctx.gas.remaining();
    let DispatchCtx {
        storage, vm, gas, ..
    } = ctx;
    let instance = vm.get_mut(&owner)?;
    let mut host = ContractHost::new(&mut **storage, &mut **gas, &owner);
    let (result, gas_used) = instance.ibc_channel_open(&mut host, env, msg, allowance)?;
    gas.consume(gas_used)?;

    match result {
        ContractResult::Ok(response) => Ok(response.map(|r| r.version)),
        ContractResult::Err(reason) => Err(BridgeError::HandshakeRejected { reason }),
    }
}

/// Handshake completion (ack or confirm): the channel is now open on this
/// side.
pub fn on_channel_connect(
    ctx: &mut DispatchCtx,
    msg: IbcChannelConnectMsg,
) -> Result<(), BridgeError> {
    let ch = match &msg {
        IbcChannelConnectMsg::OpenAck { channel, .. } => channel.clone(),
        IbcChannelConnectMsg::OpenConfirm { channel } => channel.clone(),
    };
    let port_id = ch.endpoint.port_id.clone();
    debug!(port = %port_id, channel = %ch.endpoint.channel_id, "dispatching channel connect");

    if port_id == transfer::PORT_ID {
        return Ok(());
    }

    let owner = registry::owner_of(&*ctx.storage, &port_id)?;
    let env = ctx.env(&owner);
    let allowance = ctx.gas.remaining();
    let result = {
        let DispatchCtx {
            storage, vm, gas, ..
        } = &mut *ctx;
        let instance = vm.get_mut(&owner)?;
        let mut host = ContractHost::new(&mut **storage, &mut **gas, &owner);
        let (result, gas_used) = instance.ibc_channel_connect(&mut host, env, msg, allowance)?;
        gas.consume(gas_used)?;
        result
    };

    match result {
        ContractResult::Ok(response) => {
            ctx.record_response(response.attributes, response.events);
            outbound::handle_messages(ctx, &owner, response.messages)
        }
        ContractResult::Err(reason) => Err(BridgeError::HandshakeRejected { reason }),
    }
}

/// Channel close, either initiated locally (`CloseInit`, contract
/// failures abort) or delivered by the counterparty (`CloseConfirm`,
/// vetoes are logged and closure proceeds). Callers transition the
/// channel state before dispatching; this releases the port binding once
/// its last channel is closed.
pub fn on_channel_close(ctx: &mut DispatchCtx, msg: IbcChannelCloseMsg) -> Result<(), BridgeError> {
    let (ch, initiated_locally) = match &msg {
        IbcChannelCloseMsg::CloseInit { channel } => (channel.clone(), true),
        IbcChannelCloseMsg::CloseConfirm { channel } => (channel.clone(), false),
    };
    let port_id = ch.endpoint.port_id.clone();
    debug!(port = %port_id, channel = %ch.endpoint.channel_id, initiated_locally, "dispatching channel close");

    if port_id == transfer::PORT_ID {
        return Ok(());
    }

    let owner = registry::owner_of(&*ctx.storage, &port_id)?;
    let env = ctx.env(&owner);
    let allowance = ctx.gas.remaining();
    let result = {
        let DispatchCtx {
            storage, vm, gas, ..
        } = &mut *ctx;
        let instance = vm.get_mut(&owner)?;
        let mut host = ContractHost::new(&mut **storage, &mut **gas, &owner);
        let (result, gas_used) = instance.ibc_channel_close(&mut host, env, msg, allowance)?;
        gas.consume(gas_used)?;
        result
    };

    match result {
        ContractResult::Ok(response) => {
            ctx.record_response(response.attributes, response.events);
            outbound::handle_messages(ctx, &owner, response.messages)?;
        }
        ContractResult::Err(reason) if initiated_locally => {
            return Err(BridgeError::CallbackFailed { msg: reason });
        }
        ContractResult::Err(reason) => {
            // counterparty-initiated closes are not contract-vetoable
            warn!(
                port = %port_id,
                channel = %ch.endpoint.channel_id,
                reason = %reason,
                "contract veto ignored, closing channel"
            );
        }
    }

    if !channel::port_has_open_channels(&*ctx.storage, &port_id)? {
        registry::release(&mut *ctx.storage, &port_id, &owner)?;
        debug!(port = %port_id, "port binding released");
    }
    Ok(())
}

enum ReceiveOutcome {
    Ack(Binary),
    Nack(String),
}

/// Deliver an inbound packet to the destination endpoint and produce the
/// acknowledgement to relay back. A contract rejection or an application
/// failure while its follow-on actions run rolls the callback's writes
/// back and becomes a failure acknowledgement; the packet itself stays
/// delivered. Hard contract errors and gas exhaustion abort the
/// transaction, leaving the packet undelivered.
pub fn on_packet_receive(
    ctx: &mut DispatchCtx,
    msg: IbcPacketReceiveMsg,
) -> Result<Binary, BridgeError> {
    let packet = msg.packet.clone();
    let port_id = packet.dest.port_id.clone();
    debug!(
        port = %port_id,
        channel = %packet.dest.channel_id,
        sequence = packet.sequence,
        "dispatching packet receive"
    );

    if port_id == transfer::PORT_ID {
        return transfer::on_packet_receive(&mut *ctx.storage, &packet);
    }
    let owner = registry::owner_of(&*ctx.storage, &port_id)?;

    let snap = state::snapshot(&*ctx.storage);
    let events_mark = ctx.events.len();
    match invoke_receive(ctx, &owner, msg) {
        Ok(ReceiveOutcome::Ack(ack)) => Ok(ack),
        Ok(ReceiveOutcome::Nack(reason)) => {
            state::restore(&mut *ctx.storage, snap);
            ctx.events.truncate(events_mark);
            debug!(reason = %reason, "packet rejected by contract, writing failure acknowledgement");
            Ok(Ack::error(reason).to_binary())
        }
        Err(err) if err.is_application() => {
            state::restore(&mut *ctx.storage, snap);
            ctx.events.truncate(events_mark);
            debug!(error = %err, "receive processing failed, writing failure acknowledgement");
            Ok(Ack::error(err.to_string()).to_binary())
        }
        Err(err) => Err(err),
    }
}

fn invoke_receive(
    ctx: &mut DispatchCtx,
    owner: &Addr,
    msg: IbcPacketReceiveMsg,
) -> Result<ReceiveOutcome, BridgeError> {
    let env = ctx.env(owner);
    let allowance = ctx.gas.remaining();
    let result = {
        let DispatchCtx {
            storage, vm, gas, ..
        } = &mut *ctx;
        let instance = vm.get_mut(owner)?;
        let mut host = ContractHost::new(&mut **storage, &mut **gas, owner);
        let (result, gas_used) = instance.ibc_packet_receive(&mut host, env, msg, allowance)?;
        gas.consume(gas_used)?;
        result
    };

    match result {
        ContractResult::Ok(response) => {
            let ack = response.acknowledgement.clone();
            ctx.record_response(response.attributes, response.events);
            outbound::handle_messages(ctx, owner, response.messages)?;
            Ok(ReceiveOutcome::Ack(ack))
        }
        ContractResult::Err(reason) => Ok(ReceiveOutcome::Nack(reason)),
    }
}

/// Deliver an acknowledgement for a previously sent packet. Runs after the
/// counterparty committed the outcome, so any endpoint failure reverts the
/// transaction.
pub fn on_packet_ack(ctx: &mut DispatchCtx, msg: IbcPacketAckMsg) -> Result<(), BridgeError> {
    let packet = msg.original_packet.clone();
    let port_id = packet.src.port_id.clone();
    debug!(
        port = %port_id,
        channel = %packet.src.channel_id,
        sequence = packet.sequence,
        "dispatching packet acknowledgement"
    );

    if port_id == transfer::PORT_ID {
        return transfer::on_packet_ack(&mut *ctx.storage, &packet, &msg.acknowledgement.data);
    }

    let owner = registry::owner_of(&*ctx.storage, &port_id)?;
    let env = ctx.env(&owner);
    let allowance = ctx.gas.remaining();
    let result = {
        let DispatchCtx {
            storage, vm, gas, ..
        } = &mut *ctx;
        let instance = vm.get_mut(&owner)?;
        let mut host = ContractHost::new(&mut **storage, &mut **gas, &owner);
        let (result, gas_used) = instance.ibc_packet_ack(&mut host, env, msg, allowance)?;
        gas.consume(gas_used)?;
        result
    };

    match result {
        ContractResult::Ok(response) => {
            ctx.record_response(response.attributes, response.events);
            outbound::handle_messages(ctx, &owner, response.messages)?;
        }
        ContractResult::Err(reason) => {
            return Err(BridgeError::CallbackFailed { msg: reason });
        }
    }
    channel::ack_packet(&mut *ctx.storage, &packet.src.channel_id, packet.sequence)?;
    Ok(())
}

/// Deliver a timeout for a previously sent packet. Like acknowledgements,
/// endpoint failures revert; the event is not retried.
pub fn on_packet_timeout(
    ctx: &mut DispatchCtx,
    msg: IbcPacketTimeoutMsg,
) -> Result<(), BridgeError> {
    let packet = msg.packet.clone();
    let port_id = packet.src.port_id.clone();
    debug!(
        port = %port_id,
        channel = %packet.src.channel_id,
        sequence = packet.sequence,
        "dispatching packet timeout"
    );

    if port_id == transfer::PORT_ID {
        return transfer::on_packet_timeout(&mut *ctx.storage, &packet);
    }

    let owner = registry::owner_of(&*ctx.storage, &port_id)?;
    let env = ctx.env(&owner);
    let allowance = ctx.gas.remaining();
    let result = {
        let DispatchCtx {
            storage, vm, gas, ..
        } = &mut *ctx;
        let instance = vm.get_mut(&owner)?;
        let mut host = ContractHost::new(&mut **storage, &mut **gas, &owner);
        let (result, gas_used) = instance.ibc_packet_timeout(&mut host, env, msg, allowance)?;
        gas.consume(gas_used)?;
        result
    };

    match result {
        ContractResult::Ok(response) => {
            ctx.record_response(response.attributes, response.events);
            outbound::handle_messages(ctx, &owner, response.messages)?;
        }
        ContractResult::Err(reason) => {
            return Err(BridgeError::CallbackFailed { msg: reason });
        }
    }
    channel::timeout_packet(&mut *ctx.storage, &packet.src.channel_id, packet.sequence)?;
    Ok(())
}

/// Execute a contract with a user-provided payload, applying any follow-on
/// actions it emits. Funds travel from the sender to the contract before
/// the callback runs.
pub fn execute(
    ctx: &mut DispatchCtx,
    contract: Addr,
    sender: Addr,
    funds: Vec<Coin>,
    msg: &[u8],
) -> Result<(), BridgeError> {
    debug!(contract = %contract, sender = %sender, "executing contract");
    for coin in &funds {
        bank::transfer(&mut *ctx.storage, &sender, &contract, coin)?;
    }
    let env = ctx.env(&contract);
    let info = MessageInfo { sender, funds };
    let allowance = ctx.gas.remaining();
    let result = {
        let DispatchCtx {
            storage, vm, gas, ..
        } = &mut *ctx;
        let instance = vm.get_mut(&contract)?;
        let mut host = ContractHost::new(&mut **storage, &mut **gas, &contract);
        let (result, gas_used) = instance.execute(&mut host, env, info, msg, allowance)?;
        gas.consume(gas_used)?;
        result
    };

    match result {
        ContractResult::Ok(response) => {
            ctx.record_response(response.attributes, response.events);
            outbound::handle_messages(ctx, &contract, response.messages)
        }
        ContractResult::Err(reason) => Err(BridgeError::CallbackFailed { msg: reason }),
    }
}
