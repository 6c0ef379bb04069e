//! Database entry types and traits for the crowdfunding service.

pub mod errors;
pub mod traits;
pub mod types;

pub use errors::DbError;

pub type DbResult<T> = Result<T, DbError>;
