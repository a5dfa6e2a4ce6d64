//! Query instrumentation.
//!
//! With the `metrics` feature, statements are counted and timed through the
//! global OpenTelemetry meter; installing an exporter is left to the
//! application. With the `tracing` feature, statements, transactions and
//! relation loads run inside spans built by [`tracing_helpers`].

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
    KeyValue,
};

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<OrmMetrics> = Lazy::new(OrmMetrics::init);

#[cfg(feature = "metrics")]
pub struct OrmMetrics {
    pub queries_total: Counter<u64>,
    pub query_errors_total: Counter<u64>,
    pub query_duration: Histogram<f64>,
    pub relation_loads_total: Counter<u64>,
}

#[cfg(feature = "metrics")]
impl OrmMetrics {
    pub fn init() -> Self {
        let meter = global::meter("rowbound");

        let queries_total = meter
            .u64_counter("rowbound_queries_total")
            .with_description("Total statements executed")
            .build();

        let query_errors_total = meter
            .u64_counter("rowbound_query_errors_total")
            .with_description("Statements that failed in the driver")
            .build();

        let query_duration = meter
            .f64_histogram("rowbound_query_duration_seconds")
            .with_description("Duration of statements")
            .build();

        let relation_loads_total = meter
            .u64_counter("rowbound_relation_loads_total")
            .with_description("Relation loads that reached the database")
            .build();

        Self {
            queries_total,
            query_errors_total,
            query_duration,
            relation_loads_total,
        }
    }

    pub fn record_query(&self, elapsed: std::time::Duration) {
        self.queries_total.add(1, &[]);
        self.query_duration.record(elapsed.as_secs_f64(), &[]);
    }

    pub fn record_query_error(&self) {
        self.query_errors_total.add(1, &[]);
    }

    pub fn record_relation_load(&self, kind: &'static str) {
        self.relation_loads_total.add(1, &[KeyValue::new("kind", kind)]);
    }
}

/// Span constructors used around database work
#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    pub fn execute_query_span(sql: &str) -> Span {
        tracing::debug_span!("rowbound.query", db.statement = %sql)
    }

    pub fn connect_span(backend: &'static str) -> Span {
        tracing::info_span!("rowbound.connect", db.system = backend)
    }

    pub fn begin_transaction_span(depth: u32) -> Span {
        tracing::debug_span!("rowbound.transaction.begin", depth)
    }

    pub fn commit_transaction_span(depth: u32) -> Span {
        tracing::debug_span!("rowbound.transaction.commit", depth)
    }

    pub fn rollback_transaction_span(depth: u32) -> Span {
        tracing::debug_span!("rowbound.transaction.rollback", depth)
    }

    pub fn load_relation_span(entity: &str, relation: &str, kind: &'static str) -> Span {
        tracing::debug_span!("rowbound.relation.load", entity = %entity, relation = %relation, kind)
    }

    pub fn eager_load_span(entity: &str, relation: &str, owners: usize) -> Span {
        tracing::debug_span!("rowbound.relation.eager", entity = %entity, relation = %relation, owners)
    }
}
