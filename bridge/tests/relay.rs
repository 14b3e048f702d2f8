//! End-to-end relay scenarios across two chains: module-to-contract
//! transfers with ack/nack/error receivers, contract-initiated and
//! contract-emulated transfers, timeouts, channel closes and ownership
//! violations.

use cosmwasm_schema::cw_serde;
use cosmwasm_std::{
    coin, from_json, to_json_binary, Addr, BankMsg, Coin, ContractResult, Env, IbcBasicResponse,
    IbcChannelCloseMsg, IbcChannelOpenMsg, IbcChannelOpenResponse, IbcMsg, IbcOrder,
    IbcPacketReceiveMsg, IbcPacketTimeoutMsg, IbcReceiveResponse, IbcTimeout, MessageInfo,
    Response, StdError, Timestamp,
};

use bridge::testing::{ChannelPair, Coordinator};
use bridge::{transfer, BridgeError, ContractCallbacks, ContractHost, VmResult};
use common::{denom, Ack, Ics20Packet};

const STAKE: &str = "ustake";

fn alice() -> Addr {
    Addr::unchecked("alice")
}

fn bob() -> Addr {
    Addr::unchecked("bob")
}

fn escrow() -> Addr {
    Addr::unchecked("escrow")
}

// ============================================================================
// Contract Payloads
// ============================================================================

#[cw_serde]
struct StartTransfer {
    channel_id: String,
    coin: Coin,
    receiver: String,
    /// Timeout timestamp in nanoseconds.
    timeout_timestamp: u64,
}

#[cw_serde]
struct CloseChannelPayload {
    channel_id: String,
}

#[cw_serde]
struct Noop {}

// ============================================================================
// Mock Contracts
// ============================================================================

/// Receiving side of a token transfer: credits the receiver through the
/// host transfer hook and acks success. A transfer failure is escalated as
/// a hard error, like an unexpected failure inside the contract would be.
struct AckReceiverContract;

impl ContractCallbacks for AckReceiverContract {
    fn ibc_packet_receive(
        &mut self,
        host: &mut ContractHost,
        _env: Env,
        msg: IbcPacketReceiveMsg,
        _gas_limit: u64,
    ) -> VmResult<IbcReceiveResponse> {
        let data: Ics20Packet = from_json(&msg.packet.data)?;
        data.validate()?;
        host.receive_transfer(&msg.packet)
            .map_err(|err| StdError::generic_err(format!("within this contract: {err}")))?;
        Ok((
            ContractResult::Ok(IbcReceiveResponse::new().set_ack(Ack::success().to_binary())),
            45_000,
        ))
    }
}

/// Receiving side that always rejects the packet with an application nack.
struct NackReceiverContract;

impl ContractCallbacks for NackReceiverContract {
    fn ibc_packet_receive(
        &mut self,
        _host: &mut ContractHost,
        _env: Env,
        msg: IbcPacketReceiveMsg,
        _gas_limit: u64,
    ) -> VmResult<IbcReceiveResponse> {
        let data: Ics20Packet = from_json(&msg.packet.data)?;
        data.validate()?;
        Ok((ContractResult::Err("transfer rejected".to_string()), 25_000))
    }
}

/// Receiving side that fails hard, reverting the delivery transaction.
struct ErrorReceiverContract;

impl ContractCallbacks for ErrorReceiverContract {
    fn ibc_packet_receive(
        &mut self,
        _host: &mut ContractHost,
        _env: Env,
        msg: IbcPacketReceiveMsg,
        _gas_limit: u64,
    ) -> VmResult<IbcReceiveResponse> {
        let data: Ics20Packet = from_json(&msg.packet.data)?;
        data.validate()?;
        Err(StdError::generic_err("receive failed").into())
    }
}

/// Starts a transfer through the chain's transfer application.
struct SendViaTransferContract;

impl ContractCallbacks for SendViaTransferContract {
    fn execute(
        &mut self,
        _host: &mut ContractHost,
        _env: Env,
        _info: MessageInfo,
        msg: &[u8],
        _gas_limit: u64,
    ) -> VmResult<Response> {
        let start: StartTransfer = from_json(msg)?;
        let transfer = IbcMsg::Transfer {
            channel_id: start.channel_id,
            to_address: start.receiver,
            amount: start.coin,
            timeout: IbcTimeout::with_timestamp(Timestamp::from_nanos(start.timeout_timestamp)),
        };
        Ok((
            ContractResult::Ok(Response::new().add_message(transfer)),
            30_000,
        ))
    }
}

/// Emulates the transfer application on the contract's own port: keeps the
/// funds in its own custody and refunds the sender when the packet times
/// out.
struct SendEmulatedTransferContract;

impl ContractCallbacks for SendEmulatedTransferContract {
    fn execute(
        &mut self,
        _host: &mut ContractHost,
        _env: Env,
        info: MessageInfo,
        msg: &[u8],
        _gas_limit: u64,
    ) -> VmResult<Response> {
        let start: StartTransfer = from_json(msg)?;
        if info.funds != vec![start.coin.clone()] {
            return Err(StdError::generic_err("transfer funds must accompany the message").into());
        }
        let data = Ics20Packet::new(
            start.coin.amount,
            &start.coin.denom,
            info.sender.as_str(),
            &start.receiver,
        );
        data.validate()?;
        let send = IbcMsg::SendPacket {
            channel_id: start.channel_id,
            data: to_json_binary(&data)?,
            timeout: IbcTimeout::with_timestamp(Timestamp::from_nanos(start.timeout_timestamp)),
        };
        Ok((ContractResult::Ok(Response::new().add_message(send)), 40_000))
    }

    fn ibc_packet_timeout(
        &mut self,
        _host: &mut ContractHost,
        _env: Env,
        msg: IbcPacketTimeoutMsg,
        _gas_limit: u64,
    ) -> VmResult<IbcBasicResponse> {
        let data: Ics20Packet = from_json(&msg.packet.data)?;
        data.validate()?;
        let refund = BankMsg::Send {
            to_address: data.sender.clone(),
            amount: vec![Coin {
                denom: data.denom.clone(),
                amount: data.amount,
            }],
        };
        Ok((
            ContractResult::Ok(IbcBasicResponse::new().add_message(refund)),
            20_000,
        ))
    }
}

/// Flags channel closure in its own storage.
struct CaptureCloseContract;

impl ContractCallbacks for CaptureCloseContract {
    fn ibc_channel_close(
        &mut self,
        host: &mut ContractHost,
        _env: Env,
        _msg: IbcChannelCloseMsg,
        _gas_limit: u64,
    ) -> VmResult<IbcBasicResponse> {
        host.storage_set(b"close_called", b"1")?;
        Ok((ContractResult::Ok(IbcBasicResponse::new()), 5_000))
    }
}

/// Closes a channel on request.
struct CloseChannelContract;

impl ContractCallbacks for CloseChannelContract {
    fn execute(
        &mut self,
        _host: &mut ContractHost,
        _env: Env,
        _info: MessageInfo,
        msg: &[u8],
        _gas_limit: u64,
    ) -> VmResult<Response> {
        let close: CloseChannelPayload = from_json(msg)?;
        let close = IbcMsg::CloseChannel {
            channel_id: close.channel_id,
        };
        Ok((ContractResult::Ok(Response::new().add_message(close)), 10_000))
    }
}

/// Reports more gas than any transaction budget allows.
struct GasHungryContract;

impl ContractCallbacks for GasHungryContract {
    fn execute(
        &mut self,
        _host: &mut ContractHost,
        _env: Env,
        _info: MessageInfo,
        _msg: &[u8],
        gas_limit: u64,
    ) -> VmResult<Response> {
        Ok((ContractResult::Ok(Response::new()), gas_limit + 1))
    }
}

/// Rejects every channel handshake.
struct RejectOpenContract;

impl ContractCallbacks for RejectOpenContract {
    fn ibc_channel_open(
        &mut self,
        _host: &mut ContractHost,
        _env: Env,
        _msg: IbcChannelOpenMsg,
        _gas_limit: u64,
    ) -> VmResult<IbcChannelOpenResponse> {
        Ok((
            ContractResult::Err("unsupported channel version".to_string()),
            0,
        ))
    }
}

// ============================================================================
// Test Setup
// ============================================================================

/// Transfer module on chain A, a receiver contract on chain B; send one
/// token across and relay.
fn run_transfer_to_contract(
    receiver: Box<dyn ContractCallbacks>,
) -> (Coordinator, ChannelPair, Result<(), BridgeError>) {
    let mut coord = Coordinator::new();
    coord.chain_a.init_balance(&alice(), vec![coin(1_000, STAKE)]);
    let contract = coord.chain_b.seed_contract_instance(receiver);
    let port_b = coord.chain_b.contract_port(&contract);
    let pair = coord
        .create_channel(transfer::PORT_ID, &port_b, transfer::VERSION, IbcOrder::Unordered)
        .unwrap();
    coord.commit_block();

    let timeout = IbcTimeout::with_timestamp(coord.chain_b.block.time.plus_seconds(3_600));
    coord
        .chain_a
        .send_transfer(&alice(), &pair.a.channel_id, coin(1, STAKE), bob().as_str(), timeout)
        .unwrap();
    assert_eq!(coord.chain_a.pending_send_packets().len(), 1);
    assert_eq!(coord.chain_b.pending_send_packets().len(), 0);

    let relayed = coord.relay_and_ack_pending_packets(&pair);
    (coord, pair, relayed)
}

// ============================================================================
// Transfer Module -> Contract
// ============================================================================

#[test]
fn transfer_to_contract_with_ack() {
    // receiver acks: sender pays, receiver holds the voucher
    let (coord, pair, relayed) = run_transfer_to_contract(Box::new(AckReceiverContract));
    relayed.unwrap();

    assert_eq!(coord.chain_a.pending_send_packets().len(), 0);
    assert_eq!(coord.chain_b.pending_send_packets().len(), 0);
    assert_eq!(coord.chain_a.balance(&alice(), STAKE).u128(), 999);
    assert_eq!(coord.chain_a.balance(&escrow(), STAKE).u128(), 1);

    let voucher = denom::voucher_denom(&pair.b.port_id, &pair.b.channel_id, STAKE);
    assert_eq!(coord.chain_b.balance(&bob(), &voucher).u128(), 1);
}

#[test]
fn transfer_to_contract_with_nack() {
    // receiver nacks: packet resolved, escrow refunded, nobody paid
    let (coord, pair, relayed) = run_transfer_to_contract(Box::new(NackReceiverContract));
    relayed.unwrap();

    assert_eq!(coord.chain_a.pending_send_packets().len(), 0);
    assert_eq!(coord.chain_b.pending_send_packets().len(), 0);
    assert_eq!(coord.chain_a.balance(&alice(), STAKE).u128(), 1_000);
    assert_eq!(coord.chain_a.balance(&escrow(), STAKE).u128(), 0);

    let voucher = denom::voucher_denom(&pair.b.port_id, &pair.b.channel_id, STAKE);
    assert_eq!(coord.chain_b.balance(&bob(), &voucher).u128(), 0);
}

#[test]
fn transfer_to_contract_with_hard_error() {
    // receiver fails hard: delivery reverts, the packet stays pending and
    // the escrow stays held
    let (coord, pair, relayed) = run_transfer_to_contract(Box::new(ErrorReceiverContract));
    let err = relayed.unwrap_err();
    assert!(err.is_fatal());

    assert_eq!(coord.chain_a.pending_send_packets().len(), 1);
    assert_eq!(coord.chain_b.pending_send_packets().len(), 0);
    assert_eq!(coord.chain_a.balance(&alice(), STAKE).u128(), 999);
    assert_eq!(coord.chain_a.balance(&escrow(), STAKE).u128(), 1);

    let voucher = denom::voucher_denom(&pair.b.port_id, &pair.b.channel_id, STAKE);
    assert_eq!(coord.chain_b.balance(&bob(), &voucher).u128(), 0);
}

// ============================================================================
// Contract-Initiated Transfers
// ============================================================================

#[test]
fn contract_can_initiate_transfer() {
    // a contract on chain A starts a transfer through the chain's transfer
    // application; chain B's transfer module mints the voucher
    let mut coord = Coordinator::new();
    coord.chain_a.init_balance(&alice(), vec![coin(1_000, STAKE)]);
    let contract = coord
        .chain_a
        .seed_contract_instance(Box::new(SendViaTransferContract));
    let pair = coord
        .create_channel(
            transfer::PORT_ID,
            transfer::PORT_ID,
            transfer::VERSION,
            IbcOrder::Unordered,
        )
        .unwrap();
    coord.commit_block();

    let start = StartTransfer {
        channel_id: pair.a.channel_id.clone(),
        coin: coin(100, STAKE),
        receiver: bob().to_string(),
        timeout_timestamp: coord.chain_b.block.time.plus_seconds(3_600).nanos(),
    };
    coord
        .chain_a
        .execute_contract(&alice(), &contract, &start, vec![coin(100, STAKE)])
        .unwrap();
    assert_eq!(coord.chain_a.pending_send_packets().len(), 1);
    assert_eq!(coord.chain_b.pending_send_packets().len(), 0);

    coord.relay_and_ack_pending_packets(&pair).unwrap();
    assert_eq!(coord.chain_a.pending_send_packets().len(), 0);
    assert_eq!(coord.chain_b.pending_send_packets().len(), 0);

    assert_eq!(coord.chain_a.balance(&alice(), STAKE).u128(), 900);
    assert_eq!(coord.chain_a.balance(&contract, STAKE).u128(), 0);
    assert_eq!(coord.chain_a.balance(&escrow(), STAKE).u128(), 100);

    let voucher = denom::voucher_denom(&pair.b.port_id, &pair.b.channel_id, STAKE);
    assert_eq!(coord.chain_b.balance(&bob(), &voucher).u128(), 100);
}

#[test]
fn contract_can_emulate_transfer() {
    // a contract on its own port emulates the transfer application; chain
    // B's transfer module receives the packet
    let mut coord = Coordinator::new();
    coord.chain_a.init_balance(&alice(), vec![coin(1_000, STAKE)]);
    let contract = coord
        .chain_a
        .seed_contract_instance(Box::new(SendEmulatedTransferContract));
    let port_a = coord.chain_a.contract_port(&contract);
    let pair = coord
        .create_channel(&port_a, transfer::PORT_ID, transfer::VERSION, IbcOrder::Unordered)
        .unwrap();
    coord.commit_block();

    let start = StartTransfer {
        channel_id: pair.a.channel_id.clone(),
        coin: coin(100, STAKE),
        receiver: bob().to_string(),
        timeout_timestamp: coord.chain_b.block.time.plus_seconds(3_600).nanos(),
    };
    coord
        .chain_a
        .execute_contract(&alice(), &contract, &start, vec![coin(100, STAKE)])
        .unwrap();
    assert_eq!(coord.chain_a.pending_send_packets().len(), 1);

    coord.relay_and_ack_pending_packets(&pair).unwrap();
    assert_eq!(coord.chain_a.pending_send_packets().len(), 0);
    assert_eq!(coord.chain_b.pending_send_packets().len(), 0);

    // the contract keeps custody of the sent funds
    assert_eq!(coord.chain_a.balance(&alice(), STAKE).u128(), 900);
    assert_eq!(coord.chain_a.balance(&contract, STAKE).u128(), 100);

    let voucher = denom::voucher_denom(&pair.b.port_id, &pair.b.channel_id, STAKE);
    assert_eq!(coord.chain_b.balance(&bob(), &voucher).u128(), 100);
}

#[test]
fn contract_emulated_transfer_times_out() {
    // the packet is never relayed; the timeout callback returns the funds
    // from contract custody to the original sender
    let mut coord = Coordinator::new();
    coord.chain_a.init_balance(&alice(), vec![coin(1_000, STAKE)]);
    let contract = coord
        .chain_a
        .seed_contract_instance(Box::new(SendEmulatedTransferContract));
    let port_a = coord.chain_a.contract_port(&contract);
    let pair = coord
        .create_channel(&port_a, transfer::PORT_ID, transfer::VERSION, IbcOrder::Unordered)
        .unwrap();
    coord.commit_block();

    let start = StartTransfer {
        channel_id: pair.a.channel_id.clone(),
        coin: coin(100, STAKE),
        receiver: bob().to_string(),
        timeout_timestamp: coord.chain_b.block.time.plus_seconds(1).nanos(),
    };
    coord
        .chain_a
        .execute_contract(&alice(), &contract, &start, vec![coin(100, STAKE)])
        .unwrap();
    assert_eq!(coord.chain_a.balance(&contract, STAKE).u128(), 100);

    coord.timeout_pending_packets(&pair).unwrap();
    assert_eq!(coord.chain_a.pending_send_packets().len(), 0);
    assert_eq!(coord.chain_b.pending_send_packets().len(), 0);

    // balances fully restored
    assert_eq!(coord.chain_a.balance(&alice(), STAKE).u128(), 1_000);
    assert_eq!(coord.chain_a.balance(&contract, STAKE).u128(), 0);
}

#[test]
fn transfer_module_send_times_out_and_refunds_once() {
    // module-level send, timed out: escrow refunded exactly once and a
    // replayed timeout is rejected without touching balances
    let mut coord = Coordinator::new();
    coord.chain_a.init_balance(&alice(), vec![coin(1_000, STAKE)]);
    let pair = coord
        .create_channel(
            transfer::PORT_ID,
            transfer::PORT_ID,
            transfer::VERSION,
            IbcOrder::Unordered,
        )
        .unwrap();
    coord.commit_block();

    let timeout = IbcTimeout::with_timestamp(coord.chain_b.block.time.plus_seconds(1));
    coord
        .chain_a
        .send_transfer(&alice(), &pair.a.channel_id, coin(7, STAKE), bob().as_str(), timeout)
        .unwrap();
    assert_eq!(coord.chain_a.balance(&alice(), STAKE).u128(), 993);
    let packet = coord.chain_a.pending_send_packets()[0].clone();

    coord.timeout_pending_packets(&pair).unwrap();
    assert_eq!(coord.chain_a.pending_send_packets().len(), 0);
    assert_eq!(coord.chain_a.balance(&alice(), STAKE).u128(), 1_000);
    assert_eq!(coord.chain_a.balance(&escrow(), STAKE).u128(), 0);

    // duplicate timeout delivery is a no-op rejection, never a double refund
    let err = coord.chain_a.deliver_timeout(&packet).unwrap_err();
    assert!(matches!(err, BridgeError::AlreadySettled { .. }));
    assert_eq!(coord.chain_a.balance(&alice(), STAKE).u128(), 1_000);
}

// ============================================================================
// Ownership Violations
// ============================================================================

#[test]
fn contract_cannot_send_on_foreign_channel() {
    // contract A2 tries to send over the channel bound to A1's port: the
    // whole transaction fails and nothing moves
    let mut coord = Coordinator::new();
    coord.chain_a.init_balance(&alice(), vec![coin(1_000, STAKE)]);
    let owner_contract = coord
        .chain_a
        .seed_contract_instance(Box::new(SendEmulatedTransferContract));
    let intruder_contract = coord
        .chain_a
        .seed_contract_instance(Box::new(SendEmulatedTransferContract));
    let port_a = coord.chain_a.contract_port(&owner_contract);
    let pair = coord
        .create_channel(&port_a, transfer::PORT_ID, transfer::VERSION, IbcOrder::Unordered)
        .unwrap();
    coord.commit_block();

    let start = StartTransfer {
        channel_id: pair.a.channel_id.clone(),
        coin: coin(100, STAKE),
        receiver: bob().to_string(),
        timeout_timestamp: coord.chain_b.block.time.plus_seconds(3_600).nanos(),
    };
    let err = coord
        .chain_a
        .execute_contract(&alice(), &intruder_contract, &start, vec![coin(100, STAKE)])
        .unwrap_err();
    assert!(matches!(err, BridgeError::NotOwner { .. }));

    // no packet was sent and the funds transfer rolled back with the tx
    assert_eq!(coord.chain_a.pending_send_packets().len(), 0);
    assert_eq!(coord.chain_a.balance(&alice(), STAKE).u128(), 1_000);
    assert_eq!(coord.chain_a.balance(&intruder_contract, STAKE).u128(), 0);
}

#[test]
fn contract_cannot_close_foreign_channel() {
    let mut coord = Coordinator::new();
    coord.chain_a.init_balance(&alice(), vec![coin(10, STAKE)]);
    let owner_contract = coord
        .chain_a
        .seed_contract_instance(Box::new(CloseChannelContract));
    let intruder_contract = coord
        .chain_a
        .seed_contract_instance(Box::new(CloseChannelContract));
    let receiver_contract = coord
        .chain_b
        .seed_contract_instance(Box::new(CloseChannelContract));
    let port_a = coord.chain_a.contract_port(&owner_contract);
    let port_b = coord.chain_b.contract_port(&receiver_contract);
    let pair = coord
        .create_channel(&port_a, &port_b, transfer::VERSION, IbcOrder::Unordered)
        .unwrap();

    let payload = CloseChannelPayload {
        channel_id: pair.a.channel_id.clone(),
    };
    let err = coord
        .chain_a
        .execute_contract(&alice(), &intruder_contract, &payload, vec![])
        .unwrap_err();
    assert!(matches!(err, BridgeError::NotOwner { .. }));

    // the channel stays open and both ports stay bound
    let info = coord.chain_a.channel_info(&pair.a.channel_id).unwrap();
    assert_eq!(info.state.to_string(), "open");
    assert_eq!(coord.chain_a.port_owner(&port_a), Some(owner_contract));
}

// ============================================================================
// Channel Close
// ============================================================================

#[test]
fn contracts_observe_channel_close() {
    let mut coord = Coordinator::new();
    let contract_a = coord
        .chain_a
        .seed_contract_instance(Box::new(CaptureCloseContract));
    let contract_b = coord
        .chain_b
        .seed_contract_instance(Box::new(CaptureCloseContract));
    let port_a = coord.chain_a.contract_port(&contract_a);
    let port_b = coord.chain_b.contract_port(&contract_b);
    let pair = coord
        .create_channel(&port_a, &port_b, transfer::VERSION, IbcOrder::Unordered)
        .unwrap();

    coord.close_channel(&pair).unwrap();

    // both sides saw their close callback
    assert_eq!(
        coord.chain_a.contract_state(&contract_a, b"close_called"),
        Some(b"1".to_vec())
    );
    assert_eq!(
        coord.chain_b.contract_state(&contract_b, b"close_called"),
        Some(b"1".to_vec())
    );
    // the last channel on each port released its binding
    assert_eq!(coord.chain_a.port_owner(&port_a), None);
    assert_eq!(coord.chain_b.port_owner(&port_b), None);
    let info = coord.chain_a.channel_info(&pair.a.channel_id).unwrap();
    assert_eq!(info.state.to_string(), "closed");
}

// ============================================================================
// Handshake & Gas Failures
// ============================================================================

#[test]
fn handshake_aborts_when_contract_rejects() {
    let mut coord = Coordinator::new();
    let contract = coord
        .chain_b
        .seed_contract_instance(Box::new(RejectOpenContract));
    let port_b = coord.chain_b.contract_port(&contract);

    let err = coord
        .create_channel(transfer::PORT_ID, &port_b, transfer::VERSION, IbcOrder::Unordered)
        .unwrap_err();
    assert!(matches!(err, BridgeError::HandshakeRejected { .. }));
    // the try step reverted on chain B: no channel recorded there
    assert!(coord.chain_b.channel_info("channel-0").is_none());
}

#[test]
fn gas_exhaustion_reverts_the_transaction() {
    let mut coord = Coordinator::new();
    coord.chain_a.init_balance(&alice(), vec![coin(50, STAKE)]);
    let contract = coord
        .chain_a
        .seed_contract_instance(Box::new(GasHungryContract));

    let err = coord
        .chain_a
        .execute_contract(&alice(), &contract, &Noop {}, vec![coin(50, STAKE)])
        .unwrap_err();
    assert!(matches!(err, BridgeError::OutOfGas { .. }));

    // the funds shipped with the execute rolled back with everything else
    assert_eq!(coord.chain_a.balance(&alice(), STAKE).u128(), 50);
    assert_eq!(coord.chain_a.balance(&contract, STAKE).u128(), 0);
}
