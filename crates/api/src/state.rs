//! Shared application state

use std::sync::Arc;

use grantscout_billing::{BillingService, PriceTable, StripeClient, SubscriptionSource};
use sqlx::PgPool;

use crate::auth::{AuthState, JwtManager, ServiceAuthState};
use crate::config::Config;
use crate::grants::{ChatClient, ChatModel, GrantMatcher};

/// Session token lifetime
const ACCESS_TOKEN_EXPIRY_HOURS: i64 = 24;

/// Handles shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub billing: BillingService,
    pub matcher: GrantMatcher,
    pub jwt_manager: JwtManager,
}

impl AppState {
    /// Wire services from configuration.
    ///
    /// Stripe and the chat provider are optional; without them subscription
    /// lookups degrade to stored values and recommendations are skipped.
    pub fn new(pool: PgPool, config: Config) -> Self {
        let (source, prices): (Option<Arc<dyn SubscriptionSource>>, PriceTable) =
            match StripeClient::from_env() {
                Ok(client) => {
                    let prices = client.config().price_table.clone();
                    (Some(Arc::new(client) as Arc<dyn SubscriptionSource>), prices)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Live subscription lookups disabled");
                    (None, PriceTable::from_env())
                }
            };

        let model: Option<Arc<dyn ChatModel>> =
            ChatClient::from_config(&config).map(|client| Arc::new(client) as Arc<dyn ChatModel>);
        if model.is_none() {
            tracing::warn!("CHAT_API_KEY not set - grant recommendations disabled");
        }

        Self::with_services(pool, config, source, prices, model)
    }

    /// Wire services around explicitly provided clients
    pub fn with_services(
        pool: PgPool,
        config: Config,
        source: Option<Arc<dyn SubscriptionSource>>,
        prices: PriceTable,
        model: Option<Arc<dyn ChatModel>>,
    ) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret, ACCESS_TOKEN_EXPIRY_HOURS);

        Self {
            billing: BillingService::new(pool.clone(), source, prices),
            matcher: GrantMatcher::new(pool.clone(), model),
            pool,
            config: Arc::new(config),
            jwt_manager,
        }
    }

    /// State for the authentication middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
        }
    }

    /// State for the internal service-secret middleware
    pub fn service_auth_state(&self) -> ServiceAuthState {
        ServiceAuthState {
            secret: self.config.billing_events_secret.as_deref().map(Arc::from),
        }
    }
}
