//! A single chain instance: committed state, live contract instances and
//! the current block, with all-or-nothing transaction semantics.

use cosmwasm_std::testing::MockStorage;
use cosmwasm_std::{
    to_json_vec, Addr, Binary, BlockInfo, Coin, Event, IbcAcknowledgement, IbcChannel,
    IbcChannelCloseMsg, IbcChannelConnectMsg, IbcChannelOpenMsg, IbcEndpoint, IbcOrder, IbcPacket,
    IbcPacketAckMsg, IbcPacketReceiveMsg, IbcPacketTimeoutMsg, IbcTimeout, Storage, Timestamp,
    Uint128,
};
use serde::Serialize;

use crate::dispatch::{self, DispatchCtx};
use crate::error::BridgeError;
use crate::gas::GasMeter;
use crate::state::{self, ChannelInfo, ChannelState, ClientView, Config, CONFIG};
use crate::vm::{contract_state_key, ContractCallbacks, ContractVm};
use crate::{bank, channel, query, registry, transfer};

pub struct Chain {
    pub chain_id: String,
    pub block: BlockInfo,
    storage: MockStorage,
    vm: ContractVm,
    instances: u64,
    relayer: Addr,
}

impl Chain {
    pub fn new(chain_id: &str) -> Self {
        let mut storage = MockStorage::new();
        CONFIG
            .save(
                &mut storage,
                &Config {
                    escrow_address: Addr::unchecked("escrow"),
                    tx_gas_limit: state::DEFAULT_TX_GAS_LIMIT,
                },
            )
            .expect("chain genesis");
        Chain {
            chain_id: chain_id.to_string(),
            block: BlockInfo {
                height: 1,
                time: Timestamp::from_seconds(1_700_000_000),
                chain_id: chain_id.to_string(),
            },
            storage,
            vm: ContractVm::new(),
            instances: 0,
            relayer: Addr::unchecked("relayer"),
        }
    }

    /// Advance to the next block.
    pub fn next_block(&mut self) {
        self.block.height += 1;
        self.block.time = self.block.time.plus_seconds(5);
    }

    pub fn advance_time(&mut self, seconds: u64) {
        self.block.time = self.block.time.plus_seconds(seconds);
    }

    /// Register a contract instance and bind its derived port.
    pub fn seed_contract_instance(&mut self, instance: Box<dyn ContractCallbacks>) -> Addr {
        self.instances += 1;
        let address = Addr::unchecked(format!("contract-{}", self.instances));
        let port_id = registry::contract_port_id(&address);
        registry::bind(&mut self.storage, &port_id, &address).expect("port bind");
        self.vm.register(address.clone(), instance);
        address
    }

    /// The port a contract instance is bound to.
    pub fn contract_port(&self, contract: &Addr) -> String {
        registry::contract_port_id(contract)
    }

    /// Fund an account at genesis.
    pub fn init_balance(&mut self, address: &Addr, coins: Vec<Coin>) {
        for coin in coins {
            bank::set_balance(&mut self.storage, address, &coin).expect("init balance");
        }
    }

    pub fn balance(&self, address: &Addr, denom: &str) -> Uint128 {
        bank::balance(&self.storage, address, denom).unwrap_or_default()
    }

    pub fn all_balances(&self, address: &Addr) -> Vec<Coin> {
        bank::all_balances(&self.storage, address).unwrap_or_default()
    }

    /// Every in-flight packet sent from this chain.
    pub fn pending_send_packets(&self) -> Vec<IbcPacket> {
        query::all_pending_packets(&self.storage).expect("pending packets")
    }

    pub fn port_owner(&self, port_id: &str) -> Option<Addr> {
        query::port_owner(&self.storage, port_id).expect("port owner")
    }

    pub fn channel_info(&self, channel_id: &str) -> Option<ChannelInfo> {
        query::channel(&self.storage, channel_id).expect("channel info")
    }

    /// Raw read of a contract's namespaced storage, for test assertions.
    pub fn contract_state(&self, contract: &Addr, key: &[u8]) -> Option<Vec<u8>> {
        self.storage.get(&contract_state_key(contract, key))
    }

    /// Run `f` as one transaction: every state change commits together or
    /// not at all.
    pub fn run_tx<T>(
        &mut self,
        f: impl FnOnce(&mut DispatchCtx) -> Result<T, BridgeError>,
    ) -> Result<(T, Vec<Event>), BridgeError> {
        let gas_limit = CONFIG
            .load(&self.storage)
            .map(|config| config.tx_gas_limit)
            .unwrap_or(state::DEFAULT_TX_GAS_LIMIT);
        let snap = state::snapshot(&self.storage);
        let mut gas = GasMeter::new(gas_limit);
        let mut ctx = DispatchCtx::new(&mut self.storage, &mut self.vm, &mut gas, self.block.clone());
        match f(&mut ctx) {
            Ok(value) => {
                let events = std::mem::take(&mut ctx.events);
                Ok((value, events))
            }
            Err(err) => {
                drop(ctx);
                state::restore(&mut self.storage, snap);
                Err(err)
            }
        }
    }

    /// Execute a contract as `sender`, shipping `funds` along.
    pub fn execute_contract(
        &mut self,
        sender: &Addr,
        contract: &Addr,
        msg: &impl Serialize,
        funds: Vec<Coin>,
    ) -> Result<Vec<Event>, BridgeError> {
        let payload = to_json_vec(msg)?;
        let sender = sender.clone();
        let contract = contract.clone();
        self.run_tx(move |ctx| dispatch::execute(ctx, contract, sender, funds, &payload))
            .map(|((), events)| events)
    }

    /// Module-level transfer send, the chain-native transfer entry point.
    pub fn send_transfer(
        &mut self,
        sender: &Addr,
        channel_id: &str,
        coin: Coin,
        receiver: &str,
        timeout: IbcTimeout,
    ) -> Result<u64, BridgeError> {
        let sender = sender.clone();
        let channel_id = channel_id.to_string();
        let receiver = receiver.to_string();
        self.run_tx(move |ctx| {
            transfer::send(&mut *ctx.storage, &sender, &channel_id, coin, &receiver, timeout)
        })
        .map(|(sequence, _)| sequence)
    }

    /// Deliver an inbound packet, returning the acknowledgement to relay
    /// back to the sender.
    pub fn deliver_packet(&mut self, packet: &IbcPacket) -> Result<Binary, BridgeError> {
        let msg = IbcPacketReceiveMsg::new(packet.clone(), self.relayer.clone());
        self.run_tx(move |ctx| {
            channel::record_receipt(&mut *ctx.storage, &msg.packet)?;
            dispatch::on_packet_receive(ctx, msg)
        })
        .map(|(ack, _)| ack)
    }

    /// Deliver an acknowledgement for a packet this chain sent.
    pub fn deliver_ack(&mut self, packet: &IbcPacket, ack: Binary) -> Result<(), BridgeError> {
        let msg = IbcPacketAckMsg::new(
            IbcAcknowledgement::new(ack),
            packet.clone(),
            self.relayer.clone(),
        );
        self.run_tx(move |ctx| dispatch::on_packet_ack(ctx, msg))
            .map(|((), _)| ())
    }

    /// Deliver a timeout for a packet this chain sent.
    pub fn deliver_timeout(&mut self, packet: &IbcPacket) -> Result<(), BridgeError> {
        let msg = IbcPacketTimeoutMsg::new(packet.clone(), self.relayer.clone());
        self.run_tx(move |ctx| dispatch::on_packet_timeout(ctx, msg))
            .map(|((), _)| ())
    }

    /// Record what the counterparty has committed, for timeout validation.
    pub fn update_client(&mut self, channel_id: &str, view: ClientView) -> Result<(), BridgeError> {
        let channel_id = channel_id.to_string();
        self.run_tx(move |ctx| channel::update_client_view(&mut *ctx.storage, &channel_id, &view))
            .map(|((), _)| ())
    }

    pub(crate) fn channel_open_init(
        &mut self,
        port_id: &str,
        counterparty_port_id: &str,
        order: IbcOrder,
        version: &str,
        counterparty_view: ClientView,
    ) -> Result<(String, Option<String>), BridgeError> {
        let port_id = port_id.to_string();
        let counterparty_port_id = counterparty_port_id.to_string();
        let version = version.to_string();
        self.run_tx(move |ctx| {
            let channel_id = channel::next_channel_id(&mut *ctx.storage)?;
            let ch = IbcChannel::new(
                IbcEndpoint {
                    port_id,
                    channel_id: channel_id.clone(),
                },
                IbcEndpoint {
                    port_id: counterparty_port_id,
                    channel_id: String::new(),
                },
                order,
                version,
                "connection-0",
            );
            channel::save_channel(&mut *ctx.storage, &ch, ChannelState::Init)?;
            channel::update_client_view(&mut *ctx.storage, &channel_id, &counterparty_view)?;
            let negotiated =
                dispatch::on_channel_open(ctx, IbcChannelOpenMsg::OpenInit { channel: ch })?;
            Ok((channel_id, negotiated))
        })
        .map(|(value, _)| value)
    }

    pub(crate) fn channel_open_try(
        &mut self,
        port_id: &str,
        counterparty: IbcEndpoint,
        order: IbcOrder,
        version: &str,
        counterparty_version: &str,
        counterparty_view: ClientView,
    ) -> Result<(String, Option<String>), BridgeError> {
        let port_id = port_id.to_string();
        let version = version.to_string();
        let counterparty_version = counterparty_version.to_string();
        self.run_tx(move |ctx| {
            let channel_id = channel::next_channel_id(&mut *ctx.storage)?;
            let ch = IbcChannel::new(
                IbcEndpoint {
                    port_id,
                    channel_id: channel_id.clone(),
                },
                counterparty,
                order,
                version,
                "connection-0",
            );
            channel::save_channel(&mut *ctx.storage, &ch, ChannelState::TryOpen)?;
            channel::update_client_view(&mut *ctx.storage, &channel_id, &counterparty_view)?;
            let negotiated = dispatch::on_channel_open(
                ctx,
                IbcChannelOpenMsg::OpenTry {
                    channel: ch,
                    counterparty_version,
                },
            )?;
            Ok((channel_id, negotiated))
        })
        .map(|(value, _)| value)
    }

    pub(crate) fn channel_open_ack(
        &mut self,
        channel_id: &str,
        counterparty_channel_id: &str,
        counterparty_version: &str,
    ) -> Result<(), BridgeError> {
        let channel_id = channel_id.to_string();
        let counterparty_channel_id = counterparty_channel_id.to_string();
        let counterparty_version = counterparty_version.to_string();
        self.run_tx(move |ctx| {
            let mut info = channel::load_channel(&*ctx.storage, &channel_id)?;
            info.channel.counterparty_endpoint.channel_id = counterparty_channel_id;
            info.channel.version = counterparty_version.clone();
            channel::save_channel(&mut *ctx.storage, &info.channel, ChannelState::Open)?;
            dispatch::on_channel_connect(
                ctx,
                IbcChannelConnectMsg::OpenAck {
                    channel: info.channel,
                    counterparty_version,
                },
            )
        })
        .map(|((), _)| ())
    }

    pub(crate) fn channel_open_confirm(&mut self, channel_id: &str) -> Result<(), BridgeError> {
        let channel_id = channel_id.to_string();
        self.run_tx(move |ctx| {
            let info = channel::load_channel(&*ctx.storage, &channel_id)?;
            channel::save_channel(&mut *ctx.storage, &info.channel, ChannelState::Open)?;
            dispatch::on_channel_connect(
                ctx,
                IbcChannelConnectMsg::OpenConfirm {
                    channel: info.channel,
                },
            )
        })
        .map(|((), _)| ())
    }

    pub(crate) fn channel_close(
        &mut self,
        channel_id: &str,
        initiated_locally: bool,
    ) -> Result<(), BridgeError> {
        let channel_id = channel_id.to_string();
        self.run_tx(move |ctx| {
            let info = channel::load_channel(&*ctx.storage, &channel_id)?;
            channel::set_channel_state(&mut *ctx.storage, &channel_id, ChannelState::Closed)?;
            let msg = if initiated_locally {
                IbcChannelCloseMsg::CloseInit {
                    channel: info.channel,
                }
            } else {
                IbcChannelCloseMsg::CloseConfirm {
                    channel: info.channel,
                }
            };
            dispatch::on_channel_close(ctx, msg)
        })
        .map(|((), _)| ())
    }
}
