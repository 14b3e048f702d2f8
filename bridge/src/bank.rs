//! Minimal ledger collaborator: account balances and the transfer, mint
//! and burn operations the bridge needs.

use cosmwasm_std::{Addr, Coin, Order, Storage, Uint128};

use crate::error::BridgeError;
use crate::state::BALANCES;

pub fn balance(
    storage: &dyn Storage,
    address: &Addr,
    denom: &str,
) -> Result<Uint128, BridgeError> {
    Ok(BALANCES
        .may_load(storage, (address, denom))?
        .unwrap_or_default())
}

pub fn all_balances(storage: &dyn Storage, address: &Addr) -> Result<Vec<Coin>, BridgeError> {
    BALANCES
        .prefix(address)
        .range(storage, None, None, Order::Ascending)
        .map(|item| {
            let (denom, amount) = item?;
            Ok(Coin { denom, amount })
        })
        .collect()
}

/// Overwrite an account's balance for one denom. Genesis funding only.
pub fn set_balance(
    storage: &mut dyn Storage,
    address: &Addr,
    coin: &Coin,
) -> Result<(), BridgeError> {
    BALANCES.save(storage, (address, &coin.denom), &coin.amount)?;
    Ok(())
}

/// Move `coin` between two accounts.
pub fn transfer(
    storage: &mut dyn Storage,
    from: &Addr,
    to: &Addr,
    coin: &Coin,
) -> Result<(), BridgeError> {
    deduct(storage, from, coin)?;
    credit(storage, to, coin)?;
    Ok(())
}

/// Create `coin` out of thin air on `to`. Voucher issuance only.
pub fn mint(storage: &mut dyn Storage, to: &Addr, coin: &Coin) -> Result<(), BridgeError> {
    credit(storage, to, coin)
}

/// Destroy `coin` held by `from`.
pub fn burn(storage: &mut dyn Storage, from: &Addr, coin: &Coin) -> Result<(), BridgeError> {
    deduct(storage, from, coin)
}

fn credit(storage: &mut dyn Storage, to: &Addr, coin: &Coin) -> Result<(), BridgeError> {
    let current = balance(storage, to, &coin.denom)?;
    BALANCES.save(storage, (to, &coin.denom), &(current + coin.amount))?;
    Ok(())
}

fn deduct(storage: &mut dyn Storage, from: &Addr, coin: &Coin) -> Result<(), BridgeError> {
    let current = balance(storage, from, &coin.denom)?;
    if current < coin.amount {
        return Err(BridgeError::InsufficientFunds {
            address: from.to_string(),
            denom: coin.denom.clone(),
            available: current,
            needed: coin.amount,
        });
    }
    let rest = current - coin.amount;
    if rest.is_zero() {
        BALANCES.remove(storage, (from, &coin.denom));
    } else {
        BALANCES.save(storage, (from, &coin.denom), &rest)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::coin;
    use cosmwasm_std::testing::MockStorage;

    #[test]
    fn transfers_between_accounts() {
        let mut storage = MockStorage::new();
        let alice = Addr::unchecked("alice");
        let bob = Addr::unchecked("bob");
        set_balance(&mut storage, &alice, &coin(100, "ustake")).unwrap();

        transfer(&mut storage, &alice, &bob, &coin(30, "ustake")).unwrap();
        assert_eq!(balance(&storage, &alice, "ustake").unwrap().u128(), 70);
        assert_eq!(balance(&storage, &bob, "ustake").unwrap().u128(), 30);
    }

    #[test]
    fn rejects_overdraft_without_touching_state() {
        let mut storage = MockStorage::new();
        let alice = Addr::unchecked("alice");
        let bob = Addr::unchecked("bob");
        set_balance(&mut storage, &alice, &coin(10, "ustake")).unwrap();

        let err = transfer(&mut storage, &alice, &bob, &coin(11, "ustake")).unwrap_err();
        assert!(matches!(err, BridgeError::InsufficientFunds { .. }));
        assert_eq!(balance(&storage, &alice, "ustake").unwrap().u128(), 10);
        assert_eq!(balance(&storage, &bob, "ustake").unwrap().u128(), 0);
    }

    #[test]
    fn mint_and_burn_adjust_supply() {
        let mut storage = MockStorage::new();
        let alice = Addr::unchecked("alice");

        mint(&mut storage, &alice, &coin(5, "ibc/ABCD")).unwrap();
        mint(&mut storage, &alice, &coin(7, "ibc/ABCD")).unwrap();
        assert_eq!(balance(&storage, &alice, "ibc/ABCD").unwrap().u128(), 12);

        burn(&mut storage, &alice, &coin(12, "ibc/ABCD")).unwrap();
        assert_eq!(balance(&storage, &alice, "ibc/ABCD").unwrap().u128(), 0);
        // zero balances drop out of the table entirely
        assert_eq!(all_balances(&storage, &alice).unwrap(), vec![]);
    }
}
