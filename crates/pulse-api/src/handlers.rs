//! Request handlers.

pub mod admin;
pub mod health;
pub mod reactions;
pub mod reports;
pub mod search;
pub mod gifts;
pub mod stories;
pub mod streams;
pub mod subscriptions;
pub mod users;
pub mod wallet;

pub use health::*;

use validator::Validate;

use crate::error::ApiResult;

/// Run `validator` rules; failures become 400 before any DB access.
pub(crate) fn validate<T: Validate>(request: &T) -> ApiResult<()> {
    request.validate()?;
    Ok(())
}
