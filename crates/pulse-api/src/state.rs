//! Application state.

use std::sync::Arc;

use pulse_db::{
    Database, FundingRepository, GiftRepository, ReactionRepository, ReportRepository,
    SearchRepository, StoryRepository, StreamRepository, SubscriptionRepository, UserRepository,
    WalletRepository,
};

use crate::auth::JwtVerifier;
use crate::config::ApiConfig;
use crate::services::{SearchService, SubscriptionRenewalTask, UserService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub db: Database,
    pub jwt: Arc<JwtVerifier>,
    pub users: UserService,
    pub wallets: WalletRepository,
    pub funding: FundingRepository,
    pub subscriptions: SubscriptionRepository,
    pub streams: StreamRepository,
    pub reactions: ReactionRepository,
    pub stories: StoryRepository,
    pub gifts: GiftRepository,
    pub reports: ReportRepository,
    pub search: SearchService,
}

impl AppState {
    /// Create new application state over an existing pool.
    pub fn new(config: ApiConfig, db: Database) -> Self {
        let jwt = JwtVerifier::new(&config.jwt_secret, config.jwt_issuer.as_deref());

        Self {
            jwt: Arc::new(jwt),
            users: UserService::new(UserRepository::new(db.clone())),
            wallets: WalletRepository::new(db.clone()),
            funding: FundingRepository::new(db.clone()),
            subscriptions: SubscriptionRepository::new(db.clone()),
            streams: StreamRepository::new(db.clone()),
            reactions: ReactionRepository::new(db.clone()),
            stories: StoryRepository::new(db.clone(), config.story_ttl_hours),
            gifts: GiftRepository::new(db.clone(), config.gift_platform_fee_bps),
            reports: ReportRepository::new(db.clone()),
            search: SearchService::new(
                SearchRepository::new(db.clone()),
                config.search_candidate_limit,
                config.search_min_score,
            ),
            db,
            config: Arc::new(config),
        }
    }

    /// Build the renewal task from this state's settings.
    pub fn renewal_task(&self) -> SubscriptionRenewalTask {
        SubscriptionRenewalTask::new(
            self.subscriptions.clone(),
            self.config.subscription_renewal_interval,
            self.config.enable_subscription_renewal,
        )
    }
}
