//! Configuration for the crowdfunding service.

mod config;

pub use config::*;
