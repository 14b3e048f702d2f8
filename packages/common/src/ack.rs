//! Acknowledgement envelope written back to the sending chain for every
//! delivered packet.

use cosmwasm_schema::cw_serde;
use cosmwasm_std::{from_json, to_json_binary, Binary, StdResult};

/// JSON acknowledgement envelope: `{"result": <b64>}` on success,
/// `{"error": "<reason>"}` when the receiving endpoint rejected the packet.
#[cw_serde]
pub enum Ack {
    Result(Binary),
    Error(String),
}

impl Ack {
    /// The conventional one-byte success acknowledgement.
    pub fn success() -> Self {
        Ack::Result(Binary::from([1u8]))
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Ack::Error(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Ack::Result(_))
    }

    pub fn to_binary(&self) -> Binary {
        // serializing this enum cannot fail
        to_json_binary(self).unwrap()
    }

    pub fn from_binary(bin: &Binary) -> StdResult<Self> {
        from_json(bin)
    }
}
