//! SQLite-backed persistence.
//!
//! One [`Database`] handle serves the whole application. Repositories are
//! grouped per aggregate:
//! - `news`: content posts
//! - `sources`: discovery targets (sources and manufacturers)
//! - `config`: search configurations (single-active invariant)
//! - `runs`: the discovery run/call ledger

mod config;
mod db;
mod news;
mod runs;
mod sources;

pub use config::{
    ConfigInput, ConfigSnapshot, ModelTable, Price, PricingTable, SearchConfiguration,
};
pub use db::Database;
pub use news::{NewPost, NewsPost, PostFilter, PostStatus};
pub use runs::{ApiCallRecord, CallInput, DiscoveryRun, ProviderStat, TargetRef};
pub use sources::{Manufacturer, NewManufacturer, NewSource, Source, SourceKind};
