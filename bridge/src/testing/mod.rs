//! Two-chain test harness.
//!
//! Each [`Chain`] is an independent state machine with its own storage,
//! contract table and block clock; the [`Coordinator`] wires two of them
//! together and moves packets between them the way a relayer would.
//! Cross-chain interaction happens only through explicit packet values,
//! never shared state.

mod chain;
mod coordinator;

pub use chain::Chain;
pub use coordinator::{ChannelPair, Coordinator};
