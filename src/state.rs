use std::sync::Arc;

use crate::config::Config;
use crate::engine::commit::RetryPolicy;
use crate::gateways::bills::BillsAggregator;
use crate::gateways::payment::PaymentGateway;
use crate::observability::metrics::Metrics;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct DomainSettings {
    pub retry: RetryPolicy,
    pub bidding_window_minutes: u32,
    pub currency: String,
}

impl DomainSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: RetryPolicy::from_config(config),
            bidding_window_minutes: config.bidding_window_minutes,
            currency: config.currency.clone(),
        }
    }
}

impl Default for DomainSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            bidding_window_minutes: 30,
            currency: "NGN".to_string(),
        }
    }
}

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub payments: Arc<dyn PaymentGateway>,
    pub bills: Arc<dyn BillsAggregator>,
    pub metrics: Metrics,
    pub settings: DomainSettings,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        payments: Arc<dyn PaymentGateway>,
        bills: Arc<dyn BillsAggregator>,
        settings: DomainSettings,
    ) -> Self {
        Self {
            store,
            payments,
            bills,
            metrics: Metrics::new(),
            settings,
        }
    }
}
