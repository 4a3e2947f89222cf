use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};

/// Strategy used by [`crate::PoseSearchDatabase::search`] for non-event queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Exhaustive scan of every selectable pose
    BruteForce,
    /// KD-tree over PCA-projected vectors, then full-dimensional re-score
    #[default]
    PcaKdTree,
    /// Vantage-point tree over raw vectors, then re-score
    VpTree,
    /// Only event queries are answered
    EventOnly,
}

impl SearchMode {
    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "brute_force" | "bruteforce" => Some(Self::BruteForce),
            "pca_kd_tree" | "pcakdtree" | "kd_tree" => Some(Self::PcaKdTree),
            "vp_tree" | "vptree" => Some(Self::VpTree),
            "event_only" | "eventonly" => Some(Self::EventOnly),
            _ => None,
        }
    }

    /// Convert to string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BruteForce => "brute_force",
            Self::PcaKdTree => "pca_kd_tree",
            Self::VpTree => "vp_tree",
            Self::EventOnly => "event_only",
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub debug: DebugOptions,
}

impl Config {
    /// Load config: explicit path (or `POSEMATCH_CONFIG`) wins, otherwise the
    /// global file then `<project_root>/config.toml`; env overrides last.
    pub fn load(explicit_path: Option<&Path>, project_root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("POSEMATCH_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            if let Some(patch) = Self::load_patch(&path)? {
                config.merge_patch(patch);
            }
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_project(project_root)? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        let Some(dir) = dirs::config_dir() else {
            return Ok(None);
        };
        Self::load_patch(&dir.join("posematch/config.toml"))
    }

    fn load_project(project_root: &Path) -> Result<Option<ConfigPatch>> {
        Self::load_patch(&project_root.join("config.toml"))
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| MatchError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| MatchError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.database {
            self.database.merge(patch);
        }
        if let Some(patch) = patch.debug {
            self.debug.merge(patch);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_string("POSEMATCH_DATABASE_MODE") {
            self.database.mode = SearchMode::parse(&value).ok_or_else(|| {
                MatchError::Config(format!(
                    "invalid POSEMATCH_DATABASE_MODE value {value} \
                     (expected brute_force|pca_kd_tree|vp_tree|event_only)"
                ))
            })?;
        }
        if let Some(value) = env_u32("POSEMATCH_DATABASE_KD_TREE_QUERY_NUM_NEIGHBORS")? {
            self.database.kd_tree_query_num_neighbors = value;
        }
        if let Some(value) =
            env_u32("POSEMATCH_DATABASE_KD_TREE_QUERY_NUM_NEIGHBORS_WITH_DUPLICATES")?
        {
            self.database.kd_tree_query_num_neighbors_with_duplicates = value;
        }
        if let Some(value) = env_f32("POSEMATCH_DATABASE_CONTINUING_POSE_COST_BIAS")? {
            self.database.continuing_pose_cost_bias = value;
        }
        if let Some(value) = env_f32("POSEMATCH_DATABASE_CONTINUING_INTERACTION_COST_BIAS")? {
            self.database.continuing_interaction_cost_bias = value;
        }

        if let Some(value) = env_bool("POSEMATCH_DEBUG_COMPARE_AGAINST_BRUTE_FORCE") {
            self.debug.compare_against_brute_force = value;
        }
        if let Some(value) = env_bool("POSEMATCH_DEBUG_VALIDATE_KNN_SEARCH") {
            self.debug.validate_knn_search = value;
        }
        if let Some(value) = env_bool("POSEMATCH_DEBUG_DISABLE_SEARCH_SKIPPING") {
            self.debug.disable_search_skipping = value;
        }
        if let Some(value) = env_i32("POSEMATCH_DEBUG_WEIGHT_GROUP_ID")? {
            self.debug.debug_weight_group_id = value;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.database.kd_tree_query_num_neighbors == 0 {
            return Err(MatchError::Config(
                "database.kd_tree_query_num_neighbors must be greater than 0".to_string(),
            ));
        }
        if !self.database.continuing_pose_cost_bias.is_finite()
            || !self.database.continuing_interaction_cost_bias.is_finite()
        {
            return Err(MatchError::Config(
                "database cost biases must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-database search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub mode: SearchMode,
    /// Neighbours requested from the KD-tree / VP-tree before re-scoring
    pub kd_tree_query_num_neighbors: u32,
    /// Cap on re-scored poses when tree points map to duplicate poses (0 = no cap)
    pub kd_tree_query_num_neighbors_with_duplicates: u32,
    /// Added to the continuing pose cost; negative values favour staying put
    pub continuing_pose_cost_bias: f32,
    /// Added to every candidate while a multi-actor interaction continues
    pub continuing_interaction_cost_bias: f32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            mode: SearchMode::PcaKdTree,
            kd_tree_query_num_neighbors: 200,
            kd_tree_query_num_neighbors_with_duplicates: 0,
            continuing_pose_cost_bias: -0.01,
            continuing_interaction_cost_bias: 0.0,
        }
    }
}

impl DatabaseConfig {
    fn merge(&mut self, patch: DatabasePatch) {
        if let Some(value) = patch.mode {
            self.mode = value;
        }
        if let Some(value) = patch.kd_tree_query_num_neighbors {
            self.kd_tree_query_num_neighbors = value;
        }
        if let Some(value) = patch.kd_tree_query_num_neighbors_with_duplicates {
            self.kd_tree_query_num_neighbors_with_duplicates = value;
        }
        if let Some(value) = patch.continuing_pose_cost_bias {
            self.continuing_pose_cost_bias = value;
        }
        if let Some(value) = patch.continuing_interaction_cost_bias {
            self.continuing_interaction_cost_bias = value;
        }
    }

    /// Maximum number of poses re-scored across duplicate tree points.
    pub fn max_evaluations_with_duplicates(&self) -> usize {
        match self.kd_tree_query_num_neighbors_with_duplicates {
            0 => usize::MAX,
            n => n as usize,
        }
    }
}

/// Debug switches passed into every search through the [`crate::SearchContext`].
///
/// Everything defaults to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugOptions {
    /// Also run brute force for tree strategies and report its cost
    pub compare_against_brute_force: bool,
    /// Cross-check KD-tree neighbours against an exhaustive PCA-space ranking
    pub validate_knn_search: bool,
    /// Never skip a search on the `min_cost_addend` bound
    pub disable_search_skipping: bool,
    /// Channels tagged with a different weight group get zero weight
    pub debug_weight_group_id: i32,
}

impl DebugOptions {
    /// Whether the cost-bound early-outs may skip work.
    pub const fn skip_search_if_possible(&self) -> bool {
        !(self.compare_against_brute_force || self.disable_search_skipping)
    }

    fn merge(&mut self, patch: DebugPatch) {
        if let Some(value) = patch.compare_against_brute_force {
            self.compare_against_brute_force = value;
        }
        if let Some(value) = patch.validate_knn_search {
            self.validate_knn_search = value;
        }
        if let Some(value) = patch.disable_search_skipping {
            self.disable_search_skipping = value;
        }
        if let Some(value) = patch.debug_weight_group_id {
            self.debug_weight_group_id = value;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub database: Option<DatabasePatch>,
    pub debug: Option<DebugPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DatabasePatch {
    pub mode: Option<SearchMode>,
    pub kd_tree_query_num_neighbors: Option<u32>,
    pub kd_tree_query_num_neighbors_with_duplicates: Option<u32>,
    pub continuing_pose_cost_bias: Option<f32>,
    pub continuing_interaction_cost_bias: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DebugPatch {
    pub compare_against_brute_force: Option<bool>,
    pub validate_knn_search: Option<bool>,
    pub disable_search_skipping: Option<bool>,
    pub debug_weight_group_id: Option<i32>,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|value| {
        matches!(
            value.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u32(key: &str) -> Result<Option<u32>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<u32>().map(Some).map_err(|err| {
            MatchError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_i32(key: &str) -> Result<Option<i32>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<i32>().map(Some).map_err(|err| {
            MatchError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_f32(key: &str) -> Result<Option<f32>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<f32>().map(Some).map_err(|err| {
            MatchError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}
