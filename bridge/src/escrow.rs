//! Escrow coordinator: custody for in-flight transfers, settled exactly
//! once by acknowledgement or timeout.

use cosmwasm_std::{Addr, Coin, Storage};

use crate::bank;
use crate::error::BridgeError;
use crate::state::{EscrowEntry, CONFIG, ESCROW_ENTRIES};

/// Move `coin` from `payer` into custody for the packet at
/// (`channel_id`, `sequence`). Returning vouchers are burned instead of
/// escrowed; the entry records which reversal applies.
pub fn lock(
    storage: &mut dyn Storage,
    channel_id: &str,
    sequence: u64,
    payer: &Addr,
    coin: Coin,
    burned: bool,
) -> Result<(), BridgeError> {
    if burned {
        bank::burn(storage, payer, &coin)?;
    } else {
        let config = CONFIG.load(storage)?;
        bank::transfer(storage, payer, &config.escrow_address, &coin)?;
    }
    let entry = EscrowEntry {
        payer: payer.clone(),
        coin,
        burned,
    };
    ESCROW_ENTRIES.save(storage, (channel_id, sequence), &entry)?;
    Ok(())
}

/// Settle after a successful acknowledgement: the value has moved, the
/// entry is simply retired.
pub fn finalize(
    storage: &mut dyn Storage,
    channel_id: &str,
    sequence: u64,
) -> Result<EscrowEntry, BridgeError> {
    take(storage, channel_id, sequence)
}

/// Settle after a failed acknowledgement or a timeout, returning custody to
/// the payer.
pub fn refund(
    storage: &mut dyn Storage,
    channel_id: &str,
    sequence: u64,
) -> Result<EscrowEntry, BridgeError> {
    let entry = take(storage, channel_id, sequence)?;
    if entry.burned {
        bank::mint(storage, &entry.payer, &entry.coin)?;
    } else {
        let config = CONFIG.load(storage)?;
        bank::transfer(storage, &config.escrow_address, &entry.payer, &entry.coin)?;
    }
    Ok(entry)
}

fn take(
    storage: &mut dyn Storage,
    channel_id: &str,
    sequence: u64,
) -> Result<EscrowEntry, BridgeError> {
    let entry = ESCROW_ENTRIES
        .may_load(storage, (channel_id, sequence))?
        .ok_or(BridgeError::AlreadySettled {
            channel_id: channel_id.to_string(),
            sequence,
        })?;
    ESCROW_ENTRIES.remove(storage, (channel_id, sequence));
    Ok(entry)
}
