//! Crowdfunding campaigns: project creation, the three-stage pledge exchange
//! and aggregation of pledges into funding transactions.

pub mod aggregator;
pub mod errors;
pub mod messages;
pub mod params;
pub mod projects;
pub mod service;
pub mod state;
pub mod validate;
pub mod wallet;

#[cfg(test)]
pub(crate) mod test_utils;

pub use aggregator::{Aggregator, FundingStatus, ProjectGuard};
pub use errors::{PledgeError, PledgeResult};
pub use messages::{
    InitialResponse, PartialStatus, PledgeRequest, PledgeResponse, TransmitExactAmountResponse,
};
pub use params::PledgeParams;
pub use projects::{
    create_project, get_project_info, parse_deadline, register_user, NewProject, ProjectInfo,
};
pub use service::PledgeService;
pub use state::PledgeState;
pub use wallet::{PledgeDraft, PledgerWallet};
