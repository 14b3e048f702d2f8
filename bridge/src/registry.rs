//! Port ownership registry.
//!
//! Every channel-affecting action resolves the acting contract through this
//! table. A port has at most one owner at any time, so channel lifecycle
//! actions are always attributable to exactly one contract.

use cosmwasm_std::{Addr, Storage};

use crate::error::BridgeError;
use crate::state::{PortBinding, PORT_BINDINGS};

/// Port ID prefix for contract-bound ports.
pub const CONTRACT_PORT_PREFIX: &str = "wasm.";

/// The port a contract instance is entitled to bind.
pub fn contract_port_id(contract: &Addr) -> String {
    format!("{CONTRACT_PORT_PREFIX}{contract}")
}

/// Bind `port_id` to `owner`. Fails when the port already has an owner.
pub fn bind(
    storage: &mut dyn Storage,
    port_id: &str,
    owner: &Addr,
) -> Result<PortBinding, BridgeError> {
    if let Some(existing) = PORT_BINDINGS.may_load(storage, port_id)? {
        return Err(BridgeError::PortAlreadyBound {
            port_id: port_id.to_string(),
            owner: existing.owner.to_string(),
        });
    }
    let binding = PortBinding {
        port_id: port_id.to_string(),
        owner: owner.clone(),
    };
    PORT_BINDINGS.save(storage, port_id, &binding)?;
    Ok(binding)
}

/// Resolve the contract owning `port_id`.
pub fn owner_of(storage: &dyn Storage, port_id: &str) -> Result<Addr, BridgeError> {
    PORT_BINDINGS
        .may_load(storage, port_id)?
        .map(|binding| binding.owner)
        .ok_or_else(|| BridgeError::NoSuchPort {
            port_id: port_id.to_string(),
        })
}

/// Release `port_id`. Only the current owner may release.
pub fn release(
    storage: &mut dyn Storage,
    port_id: &str,
    requester: &Addr,
) -> Result<(), BridgeError> {
    let owner = owner_of(storage, port_id)?;
    if owner != *requester {
        return Err(BridgeError::NotOwner {
            port_id: port_id.to_string(),
            actor: requester.to_string(),
        });
    }
    PORT_BINDINGS.remove(storage, port_id);
    Ok(())
}
