//! Voucher denomination scheme.
//!
//! Tokens arriving over a channel are represented by a hashed voucher denom
//! `ibc/<KECCAK256(port/channel/denom)>`. The full trace path stays
//! resolvable through the host's trace table so returning transfers can be
//! recognized and unwound.

use tiny_keccak::{Hasher, Keccak};

/// Prefix of hashed voucher denominations.
pub const VOUCHER_PREFIX: &str = "ibc/";

/// Compute keccak256 hash of arbitrary data.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// The trace path recording one hop: `port/channel/denom`.
pub fn trace_path(port_id: &str, channel_id: &str, denom: &str) -> String {
    format!("{port_id}/{channel_id}/{denom}")
}

/// Hashed voucher denomination for a full trace path.
pub fn hashed(trace: &str) -> String {
    format!("{VOUCHER_PREFIX}{}", hex::encode_upper(keccak256(trace.as_bytes())))
}

/// Voucher denomination minted when `base_denom` arrives through
/// `port_id`/`channel_id`.
pub fn voucher_denom(port_id: &str, channel_id: &str, base_denom: &str) -> String {
    hashed(&trace_path(port_id, channel_id, base_denom))
}

/// Whether a denomination is a hashed voucher.
pub fn is_voucher(denom: &str) -> bool {
    denom.starts_with(VOUCHER_PREFIX)
}

/// Strip the leading `port/channel/` hop from a trace when it matches.
pub fn strip_hop<'a>(trace: &'a str, port_id: &str, channel_id: &str) -> Option<&'a str> {
    let prefix = format!("{port_id}/{channel_id}/");
    trace.strip_prefix(prefix.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test keccak256 produces expected output for known input
    #[test]
    fn test_keccak256_basic() {
        // keccak256("hello") = 0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8
        let result = keccak256(b"hello");
        assert_eq!(
            hex::encode(result),
            "1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn voucher_denom_is_stable_and_prefixed() {
        let denom = voucher_denom("transfer", "channel-0", "ustake");
        assert!(is_voucher(&denom));
        assert_eq!(denom.len(), VOUCHER_PREFIX.len() + 64);
        // same trace, same voucher
        assert_eq!(denom, hashed("transfer/channel-0/ustake"));
        // a different channel yields a different voucher
        assert_ne!(denom, voucher_denom("transfer", "channel-1", "ustake"));
    }

    #[test]
    fn strip_hop_only_matches_the_first_hop() {
        let trace = "transfer/channel-0/ustake";
        assert_eq!(strip_hop(trace, "transfer", "channel-0"), Some("ustake"));
        assert_eq!(strip_hop(trace, "transfer", "channel-1"), None);
        assert_eq!(strip_hop(trace, "wasm.contract-1", "channel-0"), None);

        // multi-hop traces strip one hop at a time
        let trace = "transfer/channel-3/transfer/channel-0/ustake";
        assert_eq!(
            strip_hop(trace, "transfer", "channel-3"),
            Some("transfer/channel-0/ustake")
        );
    }
}
