//! Input-output with Bitcoin: chain queries, transaction broadcast and the
//! refund scheduler.

pub mod client;
pub mod error;
pub mod http;
pub mod refund;

pub use client::{BroadcastResponse, Broadcaster, ChainQuery};
pub use error::{ClientError, ClientResult};
pub use http::HttpChainClient;
pub use refund::{RefundScheduler, RefundSchedulerConfig};
