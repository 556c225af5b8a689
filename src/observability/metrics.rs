use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub orders_created_total: IntCounter,
    pub bids_total: IntCounterVec,
    pub order_transitions_total: IntCounterVec,
    pub commit_retries_total: IntCounter,
    pub gateway_requests_total: IntCounterVec,
    pub chat_messages_total: IntCounter,
    pub operation_latency_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_created_total =
            IntCounter::new("orders_created_total", "Total delivery orders created")
                .expect("valid orders_created_total metric");

        let bids_total = IntCounterVec::new(
            Opts::new("bids_total", "Bid state changes by outcome"),
            &["outcome"],
        )
        .expect("valid bids_total metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Order lifecycle transitions by target status"),
            &["status"],
        )
        .expect("valid order_transitions_total metric");

        let commit_retries_total = IntCounter::new(
            "commit_retries_total",
            "Store commits retried after a transient failure",
        )
        .expect("valid commit_retries_total metric");

        let gateway_requests_total = IntCounterVec::new(
            Opts::new("gateway_requests_total", "Third-party gateway calls by outcome"),
            &["gateway", "outcome"],
        )
        .expect("valid gateway_requests_total metric");

        let chat_messages_total =
            IntCounter::new("chat_messages_total", "Chat messages sent on orders")
                .expect("valid chat_messages_total metric");

        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Latency of order-mutating operations in seconds",
            ),
            &["operation"],
        )
        .expect("valid operation_latency_seconds metric");

        registry
            .register(Box::new(orders_created_total.clone()))
            .expect("register orders_created_total");
        registry
            .register(Box::new(bids_total.clone()))
            .expect("register bids_total");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(commit_retries_total.clone()))
            .expect("register commit_retries_total");
        registry
            .register(Box::new(gateway_requests_total.clone()))
            .expect("register gateway_requests_total");
        registry
            .register(Box::new(chat_messages_total.clone()))
            .expect("register chat_messages_total");
        registry
            .register(Box::new(operation_latency_seconds.clone()))
            .expect("register operation_latency_seconds");

        Self {
            registry,
            orders_created_total,
            bids_total,
            order_transitions_total,
            commit_retries_total,
            gateway_requests_total,
            chat_messages_total,
            operation_latency_seconds,
        }
    }

    pub fn record_gateway(&self, gateway: &str, success: bool) {
        let outcome = if success { "success" } else { "error" };
        self.gateway_requests_total
            .with_label_values(&[gateway, outcome])
            .inc();
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
