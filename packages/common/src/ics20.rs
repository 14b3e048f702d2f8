//! Fungible token packet data, the only application payload the bridge
//! itself constructs and parses.

use cosmwasm_schema::cw_serde;
use cosmwasm_std::{StdError, StdResult, Uint128};

/// Payload of a fungible token transfer packet.
///
/// The amount is carried as a decimal string on the wire; `Uint128`
/// serializes that way out of the box.
#[cw_serde]
pub struct Ics20Packet {
    /// Amount of tokens to transfer.
    pub amount: Uint128,
    /// Denomination as known on the sending chain: the base denom when the
    /// sender chain is the token's origin, the full trace path otherwise.
    pub denom: String,
    /// Receiver address on the destination chain.
    pub receiver: String,
    /// Sender address on the source chain; refunds go back here.
    pub sender: String,
    /// Optional application memo, passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl Ics20Packet {
    pub fn new(amount: Uint128, denom: &str, sender: &str, receiver: &str) -> Self {
        Ics20Packet {
            amount,
            denom: denom.to_string(),
            receiver: receiver.to_string(),
            sender: sender.to_string(),
            memo: None,
        }
    }

    pub fn validate(&self) -> StdResult<()> {
        if self.amount.is_zero() {
            return Err(StdError::generic_err("transfer amount must be positive"));
        }
        if self.denom.is_empty() {
            return Err(StdError::generic_err("transfer denom must not be empty"));
        }
        if self.sender.is_empty() || self.receiver.is_empty() {
            return Err(StdError::generic_err(
                "transfer sender and receiver must not be empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::{from_json, to_json_binary};

    #[test]
    fn amount_travels_as_string() {
        let packet = Ics20Packet::new(Uint128::new(12345), "ustake", "alice", "bob");
        let bin = to_json_binary(&packet).unwrap();
        let json = String::from_utf8(bin.to_vec()).unwrap();
        assert!(json.contains(r#""amount":"12345""#), "got: {json}");

        let parsed: Ics20Packet = from_json(&bin).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn validate_rejects_bad_packets() {
        let packet = Ics20Packet::new(Uint128::zero(), "ustake", "alice", "bob");
        assert!(packet.validate().is_err());

        let packet = Ics20Packet::new(Uint128::new(1), "", "alice", "bob");
        assert!(packet.validate().is_err());

        let packet = Ics20Packet::new(Uint128::new(1), "ustake", "alice", "");
        assert!(packet.validate().is_err());

        let packet = Ics20Packet::new(Uint128::new(1), "ustake", "alice", "bob");
        assert!(packet.validate().is_ok());
    }
}
