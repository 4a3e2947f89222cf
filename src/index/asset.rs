//! One contiguous run of poses sampled from a single animation asset.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Contiguous run of pose indices belonging to one sampled animation asset.
///
/// Pose `first_pose_index + i` sits at `i / sample_rate` seconds of the
/// asset's real time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchIndexAsset {
    source_asset_index: usize,
    first_pose_index: usize,
    num_poses: usize,
    #[serde(default)]
    blend_parameters: [f32; 3],
    #[serde(default)]
    is_mirrored: bool,
    #[serde(default)]
    is_looping: bool,
    #[serde(default)]
    disable_reselection: bool,
    #[serde(default = "default_to_real_time_factor")]
    to_real_time_factor: f32,
}

const fn default_to_real_time_factor() -> f32 {
    1.0
}

impl SearchIndexAsset {
    pub const fn new(source_asset_index: usize, first_pose_index: usize, num_poses: usize) -> Self {
        Self {
            source_asset_index,
            first_pose_index,
            num_poses,
            blend_parameters: [0.0; 3],
            is_mirrored: false,
            is_looping: false,
            disable_reselection: false,
            to_real_time_factor: 1.0,
        }
    }

    #[must_use]
    pub const fn with_looping(mut self, is_looping: bool) -> Self {
        self.is_looping = is_looping;
        self
    }

    #[must_use]
    pub const fn with_mirrored(mut self, is_mirrored: bool) -> Self {
        self.is_mirrored = is_mirrored;
        self
    }

    #[must_use]
    pub const fn with_disable_reselection(mut self, disable_reselection: bool) -> Self {
        self.disable_reselection = disable_reselection;
        self
    }

    #[must_use]
    pub const fn with_blend_parameters(mut self, blend_parameters: [f32; 3]) -> Self {
        self.blend_parameters = blend_parameters;
        self
    }

    /// Ratio between the asset's real time and the caller-facing time.
    #[must_use]
    pub const fn with_to_real_time_factor(mut self, to_real_time_factor: f32) -> Self {
        self.to_real_time_factor = to_real_time_factor;
        self
    }

    pub const fn source_asset_index(&self) -> usize {
        self.source_asset_index
    }

    pub const fn first_pose_index(&self) -> usize {
        self.first_pose_index
    }

    pub const fn num_poses(&self) -> usize {
        self.num_poses
    }

    /// One past the last pose index of this asset.
    pub const fn end_pose_index(&self) -> usize {
        self.first_pose_index + self.num_poses
    }

    pub const fn pose_range(&self) -> Range<usize> {
        self.first_pose_index..self.end_pose_index()
    }

    pub const fn is_pose_in_range(&self, pose_index: usize) -> bool {
        pose_index >= self.first_pose_index && pose_index < self.end_pose_index()
    }

    pub const fn blend_parameters(&self) -> [f32; 3] {
        self.blend_parameters
    }

    pub const fn is_mirrored(&self) -> bool {
        self.is_mirrored
    }

    pub const fn is_looping(&self) -> bool {
        self.is_looping
    }

    pub const fn is_disable_reselection(&self) -> bool {
        self.disable_reselection
    }

    pub const fn to_real_time_factor(&self) -> f32 {
        self.to_real_time_factor
    }

    /// Real time in seconds of `pose_index` within this asset.
    ///
    /// # Panics
    ///
    /// Panics if the pose does not belong to this asset.
    pub fn time_from_pose_index(&self, pose_index: usize, sample_rate: f32) -> f32 {
        assert!(
            self.is_pose_in_range(pose_index),
            "pose {pose_index} outside asset range {:?}",
            self.pose_range()
        );
        debug_assert!(sample_rate > 0.0);
        (pose_index - self.first_pose_index) as f32 / sample_rate
    }

    /// Pose sampled closest to `time` seconds: wrapped for looping assets,
    /// clamped to the asset otherwise.
    pub fn pose_index_from_time(&self, time: f32, sample_rate: f32) -> usize {
        debug_assert!(self.num_poses > 0);
        let sample = (time * sample_rate).round() as i64;
        self.first_pose_index + self.wrap_or_clamp(sample)
    }

    /// Every pose index whose sample time falls in `[start_time, end_time]`.
    ///
    /// Samples past either end wrap for looping assets and are skipped for
    /// non-looping ones.
    pub fn pose_indices_over_time(
        &self,
        start_time: f32,
        end_time: f32,
        sample_rate: f32,
    ) -> impl Iterator<Item = usize> + '_ {
        let first_sample = (start_time * sample_rate).ceil() as i64;
        let last_sample = (end_time * sample_rate).floor() as i64;
        let num_poses = self.num_poses as i64;

        (first_sample..=last_sample).filter_map(move |sample| {
            if self.is_looping {
                Some(self.first_pose_index + self.wrap_or_clamp(sample))
            } else if (0..num_poses).contains(&sample) {
                Some(self.first_pose_index + sample as usize)
            } else {
                None
            }
        })
    }

    fn wrap_or_clamp(&self, sample: i64) -> usize {
        let num_poses = self.num_poses as i64;
        let local = if self.is_looping {
            sample.rem_euclid(num_poses)
        } else {
            sample.clamp(0, num_poses - 1)
        };
        local as usize
    }
}
