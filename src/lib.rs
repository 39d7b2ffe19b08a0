//! orderpulse - Live Analytics Dashboard Core
//!
//! orderpulse keeps a near-real-time view of an e-commerce order stream. It
//! periodically pulls the latest orders and a handful of pre-aggregated
//! preference views from a warehouse, caches them with short TTLs, computes
//! business metrics, and hands a complete frame to a presenter.
//!
//! # Components
//!
//! - **[`ResultCache`]**: TTL-keyed query results that survive failed fetches
//! - **[`RefreshLoop`]**: the fetch / aggregate / present / wait state machine
//! - **[`metrics`]**: pure aggregations over the raw order table
//! - **[`filter`]**: category / location filtering of the detail table
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use orderpulse::{
//!     ChannelTriggers, ConfigResolver, ConsolePresenter, CsvWarehouse, OutputFormat,
//!     RefreshLoop, Result, ResultCache,
//! };
//!
//! fn main() -> Result<()> {
//!     let cache = ResultCache::new();
//!     let resolver = ConfigResolver::standard();
//!     let warehouse = CsvWarehouse::new("data");
//!     let presenter = ConsolePresenter::stdout(OutputFormat::Table);
//!
//!     let (_tx, mut triggers) = ChannelTriggers::channel();
//!     let mut refresh = RefreshLoop::new(&cache, warehouse, &resolver, presenter);
//!     refresh.run(&mut triggers)?;
//!     Ok(())
//! }
//! ```
//!
//! # Computing Metrics Directly
//!
//! ```rust
//! use orderpulse::metrics::{headline, vip_premium};
//! use orderpulse::{OrderRecord, OrderTable};
//!
//! let table = OrderTable::from_records(&[OrderRecord {
//!     purchase_amount_usd: 42.0,
//!     customer_segment: Some("VIP".into()),
//!     amount_category: Some("Premium".into()),
//!     ..Default::default()
//! }])
//! .unwrap();
//!
//! assert_eq!(headline(&table).unwrap().total_revenue, 42.0);
//! assert!(vip_premium(&table).unwrap().is_available());
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod frame;
pub mod metrics;
pub mod output;
pub mod refresh;
pub mod types;
pub mod warehouse;

// Re-export commonly used types
pub use cache::{CacheLookup, CacheOutcome, CacheStats, ResultCache};
pub use crate::config::{
    ConfigKey, ConfigResolver, ConfigSource, DashboardConfig, EnvSource, FileSource, MapSource,
    WarehouseTarget,
};
pub use error::{DashboardError, Result};
pub use filter::{DisplayView, FilterOptions, FilterSelection};
pub use frame::{DashboardFrame, Warning};
pub use metrics::{Derived, DerivedMetrics, HeadlineMetrics};
pub use output::{ConsolePresenter, OutputFormat, Presenter};
pub use refresh::{ChannelTriggers, LoopState, LoopSummary, RefreshLoop, Trigger, TriggerSource};
pub use types::{OrderField, OrderRecord, OrderTable};
pub use warehouse::{CsvWarehouse, MemoryWarehouse, PreferenceView, QueryDescriptor, QueryExecutor};
