//! Ingestion side of logsync: the filter/enrichment policy and the
//! consumer loop that applies it to every message on the `logs` topic.

pub mod consumer;
pub mod policy;

pub use consumer::{ConsumerSummary, IngestConsumer, MessageOutcome};
pub use policy::{
    Condition, CorrelationIdEnricher, Enricher, FilterRule, GeoEnricher, GeoResolver, LogField,
    Policy, StaticGeoResolver,
};
