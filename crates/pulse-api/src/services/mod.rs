//! Business logic services.

pub mod renewal;
pub mod search;
pub mod user;

pub use renewal::SubscriptionRenewalTask;
pub use search::SearchService;
pub use user::UserService;
