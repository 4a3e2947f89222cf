//! Feature schema: the channels that make up a pose vector.
//!
//! The schema is owned by the caller; the search core only reads channel
//! layout (for dynamic weights) and channel filters (for the filter chain).

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::{MatchError, Result};
use crate::index::PoseMetadata;

/// One named contributor to the feature vector.
pub trait FeatureChannel: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// First float of this channel inside the feature vector.
    fn channel_data_offset(&self) -> usize;

    fn channel_cardinality(&self) -> usize;

    /// Channels with a debug group lose their weight when a different group
    /// is being inspected.
    fn debug_weight_group_id(&self) -> Option<i32> {
        None
    }

    fn is_filter_active(&self) -> bool {
        false
    }

    /// Only called when [`Self::is_filter_active`] is true.
    fn is_filter_valid(
        &self,
        _pose_values: &[f32],
        _query_values: &[f32],
        _pose_index: usize,
        _metadata: &PoseMetadata,
    ) -> bool {
        true
    }
}

/// Plain data channel without a filter.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChannel {
    name: String,
    offset: usize,
    cardinality: usize,
    debug_weight_group: Option<i32>,
}

impl DataChannel {
    pub fn new(name: impl Into<String>, offset: usize, cardinality: usize) -> Self {
        Self {
            name: name.into(),
            offset,
            cardinality,
            debug_weight_group: None,
        }
    }

    #[must_use]
    pub const fn with_debug_weight_group(mut self, group: i32) -> Self {
        self.debug_weight_group = Some(group);
        self
    }
}

impl FeatureChannel for DataChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_data_offset(&self) -> usize {
        self.offset
    }

    fn channel_cardinality(&self) -> usize {
        self.cardinality
    }

    fn debug_weight_group_id(&self) -> Option<i32> {
        self.debug_weight_group
    }
}

/// Rejects poses whose channel values stray more than `max_delta` from the
/// query.
#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceFilterChannel {
    name: String,
    offset: usize,
    cardinality: usize,
    max_delta: f32,
    debug_weight_group: Option<i32>,
}

impl ToleranceFilterChannel {
    pub fn new(name: impl Into<String>, offset: usize, cardinality: usize, max_delta: f32) -> Self {
        Self {
            name: name.into(),
            offset,
            cardinality,
            max_delta,
            debug_weight_group: None,
        }
    }

    #[must_use]
    pub const fn with_debug_weight_group(mut self, group: i32) -> Self {
        self.debug_weight_group = Some(group);
        self
    }

    pub const fn max_delta(&self) -> f32 {
        self.max_delta
    }
}

impl FeatureChannel for ToleranceFilterChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_data_offset(&self) -> usize {
        self.offset
    }

    fn channel_cardinality(&self) -> usize {
        self.cardinality
    }

    fn debug_weight_group_id(&self) -> Option<i32> {
        self.debug_weight_group
    }

    fn is_filter_active(&self) -> bool {
        self.max_delta.is_finite()
    }

    fn is_filter_valid(
        &self,
        pose_values: &[f32],
        query_values: &[f32],
        _pose_index: usize,
        _metadata: &PoseMetadata,
    ) -> bool {
        let range = self.offset..self.offset + self.cardinality;
        pose_values[range.clone()]
            .iter()
            .zip(&query_values[range])
            .all(|(pose, query)| (pose - query).abs() <= self.max_delta)
    }
}

/// Ordered channel list plus sampling rate.
#[derive(Debug, Clone)]
pub struct Schema {
    sample_rate: f32,
    cardinality: usize,
    channels: Vec<Arc<dyn FeatureChannel>>,
}

impl Schema {
    /// Channels must tile the feature vector in order without gaps.
    pub fn new(sample_rate: f32, channels: Vec<Arc<dyn FeatureChannel>>) -> Result<Self> {
        if !(sample_rate > 0.0 && sample_rate.is_finite()) {
            return Err(MatchError::InvalidSchema(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }

        let mut cardinality = 0;
        for channel in &channels {
            if channel.channel_cardinality() == 0 {
                return Err(MatchError::InvalidSchema(format!(
                    "channel {} has zero cardinality",
                    channel.name()
                )));
            }
            if channel.channel_data_offset() != cardinality {
                return Err(MatchError::InvalidSchema(format!(
                    "channel {} starts at {}, expected {cardinality}",
                    channel.name(),
                    channel.channel_data_offset()
                )));
            }
            cardinality += channel.channel_cardinality();
        }
        if cardinality == 0 {
            return Err(MatchError::InvalidSchema("schema has no channels".to_string()));
        }

        Ok(Self {
            sample_rate,
            cardinality,
            channels,
        })
    }

    /// Single unfiltered channel covering `cardinality` floats.
    pub fn single_channel(sample_rate: f32, cardinality: usize) -> Result<Self> {
        Self::new(
            sample_rate,
            vec![Arc::new(DataChannel::new("features", 0, cardinality))],
        )
    }

    pub const fn cardinality(&self) -> usize {
        self.cardinality
    }

    pub const fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn channels(&self) -> &[Arc<dyn FeatureChannel>] {
        &self.channels
    }
}
