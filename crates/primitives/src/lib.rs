//! Collection of shared data types used across the crowdfunding crates.

pub mod errors;
pub mod ids;
pub mod pledge;
pub mod roles;
pub mod secret;
pub mod time;
pub mod utxo;

pub mod prelude {
    pub use crate::{
        ids::{ProjectId, UserId},
        pledge::PledgeInput,
        roles::DerivationRole,
        secret::SecretToken,
        time::{Clock, SystemClock},
        utxo::UnspentOutput,
    };
}
