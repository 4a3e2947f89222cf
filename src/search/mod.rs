//! Search-time building blocks shared by every strategy.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                 SearchContext (query, history, ...)            │
//! └────────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌────────────────────────────────────────────────────────────────┐
//! │   PoseSearchDatabase::search                                   │
//! │   BruteForce | PcaKdTree | VpTree | Event | ContinuingPose     │
//! └────────────────────────────────────────────────────────────────┘
//!                     │                          │
//!                     ▼                          ▼
//! ┌──────────────────────────────┐  ┌──────────────────────────────┐
//! │   FilterChain (filters.rs)   │  │   Comparators (compare.rs)   │
//! │   cheap index checks first   │  │   generic / 4-lane SIMD      │
//! └──────────────────────────────┘  └──────────────────────────────┘
//!                     │                          │
//!                     └──────────┬───────────────┘
//!                                ▼
//!                ┌───────────────────────────────┐
//!                │   PoseCost → SearchResult     │
//!                └───────────────────────────────┘
//! ```

pub mod compare;
pub mod context;
pub mod cost;
pub mod filters;
pub mod result;

// Re-export main types
pub use compare::{ComparatorPath, compare_aligned_feature_vectors, compare_feature_vectors};
pub use context::{
    ContinuingPose, PoseIndicesHistory, PoseSearchEvent, QueryBuilder, SearchContext, SearchScratch,
    SearchStats,
};
pub use cost::PoseCost;
pub use filters::{FilterChain, PoseFilter};
pub use result::SearchResult;
