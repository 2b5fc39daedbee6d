use common::config::PolicyConfig;
use common::model::rule::default_rules;
use common::model::{CORRELATION_ID_KEY, GEO_DATA_KEY, LogEntry, MetadataValue};
use uuid::Uuid;

pub use common::model::{Condition, FilterRule, LogField};

/// A step that adds derived metadata to an accepted entry.
pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;

    fn enrich(&self, entry: &mut LogEntry);
}

/// Tags entries that arrive without a correlation id with a fresh one.
///
/// Ids are `corr-` followed by a UUID v7, so they sort by creation time and
/// stay unique across concurrent callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct CorrelationIdEnricher;

impl CorrelationIdEnricher {
    pub fn generate() -> String {
        format!("corr-{}", Uuid::now_v7())
    }
}

impl Enricher for CorrelationIdEnricher {
    fn name(&self) -> &'static str {
        "correlation_id"
    }

    fn enrich(&self, entry: &mut LogEntry) {
        entry
            .metadata
            .entry(CORRELATION_ID_KEY.to_string())
            .or_insert_with(|| MetadataValue::from(Self::generate()));
    }
}

/// Source of geolocation data for an entry.
pub trait GeoResolver: Send + Sync {
    fn resolve(&self, entry: &LogEntry) -> Option<String>;
}

/// Resolver that knows nothing and says so.
#[derive(Debug, Clone)]
pub struct StaticGeoResolver {
    marker: String,
}

impl StaticGeoResolver {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl Default for StaticGeoResolver {
    fn default() -> Self {
        Self::new("unknown")
    }
}

impl GeoResolver for StaticGeoResolver {
    fn resolve(&self, _entry: &LogEntry) -> Option<String> {
        Some(self.marker.clone())
    }
}

pub struct GeoEnricher<R> {
    resolver: R,
}

impl<R: GeoResolver> GeoEnricher<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }
}

impl<R: GeoResolver> Enricher for GeoEnricher<R> {
    fn name(&self) -> &'static str {
        "geo_data"
    }

    fn enrich(&self, entry: &mut LogEntry) {
        if entry.metadata.contains_key(GEO_DATA_KEY) {
            return;
        }
        if let Some(geo) = self.resolver.resolve(entry) {
            entry
                .metadata
                .insert(GEO_DATA_KEY.to_string(), MetadataValue::from(geo));
        }
    }
}

/// Filter rules plus the ordered enrichment chain.
pub struct Policy {
    rules: Vec<FilterRule>,
    enrichers: Vec<Box<dyn Enricher>>,
}

impl Policy {
    /// Policy with the given rules and the default enrichers
    /// (correlation id, then geo data).
    pub fn new(rules: Vec<FilterRule>) -> Self {
        Self::with_enrichers(
            rules,
            vec![
                Box::new(CorrelationIdEnricher),
                Box::new(GeoEnricher::new(StaticGeoResolver::default())),
            ],
        )
    }

    pub fn with_enrichers(rules: Vec<FilterRule>, enrichers: Vec<Box<dyn Enricher>>) -> Self {
        Self { rules, enrichers }
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self::new(config.rules.clone())
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    /// First rule that matches, in configuration order.
    pub fn matching_rule(&self, entry: &LogEntry) -> Option<&FilterRule> {
        self.rules.iter().find(|rule| rule.matches(entry))
    }

    pub fn should_filter(&self, entry: &LogEntry) -> bool {
        self.matching_rule(entry).is_some()
    }

    pub fn enrich(&self, mut entry: LogEntry) -> LogEntry {
        for enricher in &self.enrichers {
            enricher.enrich(&mut entry);
        }
        entry
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(default_rules())
    }
}
