//! Utilities shared by the crowdfunding service binaries.

pub mod logging;
