//! Construction of pledge transactions.
//!
//! Everything here is pure and synchronous: inputs are selected, transactions
//! assembled and signed, and every result is checked against libbitcoinconsensus
//! before it is handed back.

pub mod aggregate;
pub mod error;
pub mod funding;
pub mod partial;
pub mod refund;
pub mod select;
mod signing;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_utils;

pub use aggregate::{compile, CompileOutcome};
pub use error::{SelectionError, TxError};
pub use funding::{craft_locked_output, LockedOutput, LockedOutputParams};
pub use partial::{craft_partial, pledge_input_from_partial};
pub use refund::{craft_refund, RefundParams};
pub use select::choose_inputs;
pub use verify::{check_value_balance, verify_scripts};
