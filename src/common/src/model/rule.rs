use serde::{Deserialize, Serialize};

use super::LogEntry;

/// Entry fields a filter condition can inspect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogField {
    Level,
    Service,
    Host,
    Environment,
}

impl LogField {
    pub fn value<'a>(&self, entry: &'a LogEntry) -> &'a str {
        match self {
            LogField::Level => &entry.level,
            LogField::Service => &entry.service,
            LogField::Host => &entry.host,
            LogField::Environment => &entry.environment,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: LogField,
    pub equals: String,
}

impl Condition {
    pub fn new(field: LogField, equals: impl Into<String>) -> Self {
        Self {
            field,
            equals: equals.into(),
        }
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        self.field.value(entry) == self.equals
    }
}

/// A named drop rule. It matches an entry when every condition matches;
/// a rule without conditions matches nothing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl FilterRule {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        !self.conditions.is_empty() && self.conditions.iter().all(|c| c.matches(entry))
    }

    /// Debug output from production never reaches the store.
    pub fn drop_production_debug() -> Self {
        Self {
            name: "drop-production-debug".to_string(),
            conditions: vec![
                Condition::new(LogField::Environment, "production"),
                Condition::new(LogField::Level, "DEBUG"),
            ],
        }
    }
}

pub fn default_rules() -> Vec<FilterRule> {
    vec![FilterRule::drop_production_debug()]
}
