pub mod entry;
pub mod metadata;
pub mod rule;

pub use entry::{
    CORRELATION_ID_KEY, DecodeError, GEO_DATA_KEY, LogEntry, RawLogEntry, ValidationError,
};
pub use metadata::{Metadata, MetadataValue};
pub use rule::{Condition, FilterRule, LogField};
