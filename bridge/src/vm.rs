//! The VM boundary: the callback interface contracts implement, the table
//! of live instances, and the host handle passed into every callback.

use std::collections::BTreeMap;

use cosmwasm_std::{
    Addr, Coin, ContractResult, Env, IbcBasicResponse, IbcChannelCloseMsg, IbcChannelConnectMsg,
    IbcChannelOpenMsg, IbcChannelOpenResponse, IbcPacket, IbcPacketAckMsg, IbcPacketReceiveMsg,
    IbcPacketTimeoutMsg, IbcReceiveResponse, MessageInfo, Response, StdError, Storage,
};

use crate::error::BridgeError;
use crate::gas::{
    GasMeter, GAS_COST_PER_BYTE_READ, GAS_COST_PER_BYTE_WRITE, GAS_COST_STORAGE_READ,
    GAS_COST_STORAGE_WRITE,
};
use crate::state::ChannelInfo;
use crate::{bank, state, transfer};

/// Outcome of one VM call: the contract's result plus the gas it consumed.
/// A hard `Err` aborts the enclosing transaction; application failures are
/// reported through [`ContractResult::Err`].
pub type VmResult<T> = Result<(ContractResult<T>, u64), BridgeError>;

/// Callback interface implemented by every contract endpoint. Defaults
/// accept handshakes and acknowledgements; packet handling must be
/// provided by contracts that claim to speak a channel protocol.
pub trait ContractCallbacks {
    fn execute(
        &mut self,
        _host: &mut ContractHost,
        _env: Env,
        _info: MessageInfo,
        _msg: &[u8],
        _gas_limit: u64,
    ) -> VmResult<Response> {
        Err(StdError::generic_err("execute not supported by this contract").into())
    }

    fn ibc_channel_open(
        &mut self,
        _host: &mut ContractHost,
        _env: Env,
        _msg: IbcChannelOpenMsg,
        _gas_limit: u64,
    ) -> VmResult<IbcChannelOpenResponse> {
        Ok((ContractResult::Ok(None), 0))
    }

    fn ibc_channel_connect(
        &mut self,
        _host: &mut ContractHost,
        _env: Env,
        _msg: IbcChannelConnectMsg,
        _gas_limit: u64,
    ) -> VmResult<IbcBasicResponse> {
        Ok((ContractResult::Ok(IbcBasicResponse::new()), 0))
    }

    fn ibc_channel_close(
        &mut self,
        _host: &mut ContractHost,
        _env: Env,
        _msg: IbcChannelCloseMsg,
        _gas_limit: u64,
    ) -> VmResult<IbcBasicResponse> {
        Ok((ContractResult::Ok(IbcBasicResponse::new()), 0))
    }

    fn ibc_packet_receive(
        &mut self,
        _host: &mut ContractHost,
        _env: Env,
        _msg: IbcPacketReceiveMsg,
        _gas_limit: u64,
    ) -> VmResult<IbcReceiveResponse> {
        Err(StdError::generic_err("packet receive not supported by this contract").into())
    }

    fn ibc_packet_ack(
        &mut self,
        _host: &mut ContractHost,
        _env: Env,
        _msg: IbcPacketAckMsg,
        _gas_limit: u64,
    ) -> VmResult<IbcBasicResponse> {
        Ok((ContractResult::Ok(IbcBasicResponse::new()), 0))
    }

    fn ibc_packet_timeout(
        &mut self,
        _host: &mut ContractHost,
        _env: Env,
        _msg: IbcPacketTimeoutMsg,
        _gas_limit: u64,
    ) -> VmResult<IbcBasicResponse> {
        Err(StdError::generic_err("packet timeout not supported by this contract").into())
    }
}

/// Live contract instances, looked up by address after the ownership
/// registry has resolved a port.
#[derive(Default)]
pub struct ContractVm {
    instances: BTreeMap<Addr, Box<dyn ContractCallbacks>>,
}

impl ContractVm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, address: Addr, instance: Box<dyn ContractCallbacks>) {
        self.instances.insert(address, instance);
    }

    pub fn contains(&self, address: &Addr) -> bool {
        self.instances.contains_key(address)
    }

    pub fn get_mut<'a>(
        &'a mut self,
        address: &Addr,
    ) -> Result<&'a mut (dyn ContractCallbacks + 'static), BridgeError> {
        self.instances
            .get_mut(address)
            .map(|instance| instance.as_mut())
            .ok_or_else(|| BridgeError::UnknownContract {
                address: address.to_string(),
            })
    }
}

/// Storage key prefix isolating one contract's state.
pub fn contract_state_key(contract: &Addr, key: &[u8]) -> Vec<u8> {
    [b"contract_state/", contract.as_bytes(), b"/", key].concat()
}

/// Host capabilities handed to a contract for the duration of one callback:
/// gas-metered access to its own storage namespace plus read-only chain
/// queries.
pub struct ContractHost<'a> {
    storage: &'a mut dyn Storage,
    gas: &'a mut GasMeter,
    contract: Addr,
}

impl<'a> ContractHost<'a> {
    pub fn new(storage: &'a mut dyn Storage, gas: &'a mut GasMeter, contract: &Addr) -> Self {
        ContractHost {
            storage,
            gas,
            contract: contract.clone(),
        }
    }

    fn key(&self, key: &[u8]) -> Vec<u8> {
        contract_state_key(&self.contract, key)
    }

    /// Read from the contract's own namespace.
    pub fn storage_get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, BridgeError> {
        let value = self.storage.get(&self.key(key));
        let bytes = value.as_ref().map(|v| v.len() as u64).unwrap_or(0);
        self.gas
            .consume(GAS_COST_STORAGE_READ + bytes * GAS_COST_PER_BYTE_READ)?;
        Ok(value)
    }

    /// Write into the contract's own namespace.
    pub fn storage_set(&mut self, key: &[u8], value: &[u8]) -> Result<(), BridgeError> {
        self.gas
            .consume(GAS_COST_STORAGE_WRITE + value.len() as u64 * GAS_COST_PER_BYTE_WRITE)?;
        self.storage.set(&self.key(key), value);
        Ok(())
    }

    /// Delete from the contract's own namespace.
    pub fn storage_remove(&mut self, key: &[u8]) -> Result<(), BridgeError> {
        self.gas.consume(GAS_COST_STORAGE_WRITE)?;
        self.storage.remove(&self.key(key));
        Ok(())
    }

    /// Read-only ledger query.
    pub fn query_balance(&self, address: &Addr, denom: &str) -> Result<Coin, BridgeError> {
        let amount = bank::balance(&*self.storage, address, denom)?;
        Ok(Coin {
            denom: denom.to_string(),
            amount,
        })
    }

    /// Read-only channel query.
    pub fn query_channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>, BridgeError> {
        Ok(state::CHANNELS.may_load(&*self.storage, channel_id)?)
    }

    /// Run the token-transfer receive logic for a packet addressed to this
    /// contract's port. Module-grade endpoints use this to credit the
    /// packet receiver without duplicating the transfer application.
    pub fn receive_transfer(&mut self, packet: &IbcPacket) -> Result<(), BridgeError> {
        transfer::do_receive(&mut *self.storage, packet)
    }
}
