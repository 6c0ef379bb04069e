//! The pledge contract: a script-hash output that either the project claims by
//! revealing its secret, or the pledger reclaims once the lock time passes.

mod error;
mod kind;
mod script;
mod spend;

pub use error::ContractError;
pub use kind::InputKind;
pub use script::ContractScript;
pub use spend::{ContractSpend, ParsedSpend};
