//! Domain types.

pub mod change;
pub mod snapshot;
pub mod source;

pub use change::{aggregate_priority, Change, ChangeEvent, ChangeKind, DetectionResult, Priority};
pub use snapshot::{DiscoveredLink, PageLink, PageResult, PageSnapshot};
pub use source::{
    ChangeRecord, CheckUpdate, MonitoredSource, ReviewStatus, SourceKind, SourceStatus, Sublink,
    SublinkStatus, SublinkUpsert,
};
