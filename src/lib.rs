pub mod config;
pub mod database;
pub mod error;
pub mod index;
pub mod schema;
pub mod search;
pub mod test_utils;

pub use config::{Config, DatabaseConfig, DebugOptions, SearchMode};
pub use database::{AssetSelection, DatabaseId, PoseSearchDatabase, search_databases};
pub use error::{MatchError, Result};
pub use index::{BuildStatus, SearchIndex, SearchIndexAsset, SearchIndexParts};
pub use schema::{DataChannel, FeatureChannel, Schema, ToleranceFilterChannel};
pub use search::{
    ContinuingPose, PoseCost, PoseIndicesHistory, PoseSearchEvent, SearchContext, SearchResult,
    SearchScratch,
};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
