//! IBC Callback Bridge - Contract Endpoints for Channel and Packet Lifecycles
//!
//! This crate lets contracts running in a deterministic VM act as
//! first-class endpoints of a cross-chain packet protocol:
//!
//! # Inbound Flow (Dispatch)
//! 1. The protocol core delivers a lifecycle event (handshake step, packet,
//!    acknowledgement, timeout)
//! 2. The dispatcher resolves the owning endpoint through the port registry
//! 3. The contract's callback runs under the transaction's gas meter
//! 4. Its result is folded back into protocol state (negotiated versions,
//!    acknowledgements, escrow settlement)
//!
//! # Outbound Flow (Translation)
//! 1. A contract emits follow-on actions from a callback or execute call
//! 2. The translator checks port ownership and timeout validity
//! 3. Valid actions become ledger transfers, sent packets or channel closes
//!
//! # Custody
//! Transfer sends move funds into escrow (or burn returning vouchers) and
//! are settled exactly once by acknowledgement or timeout; a failed
//! dispatch rolls back every bridge-local mutation with the transaction.
//!
//! The [`testing`] module wires two independent chain instances together
//! for end-to-end relay scenarios.

pub mod bank;
pub mod channel;
pub mod dispatch;
pub mod error;
pub mod escrow;
pub mod gas;
pub mod outbound;
pub mod query;
pub mod registry;
pub mod state;
pub mod testing;
pub mod transfer;
pub mod vm;

pub use crate::dispatch::DispatchCtx;
pub use crate::error::BridgeError;
pub use crate::gas::GasMeter;
pub use crate::vm::{ContractCallbacks, ContractHost, ContractVm, VmResult};
