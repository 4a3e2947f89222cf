//! End-to-end search tests over published databases.


mod continuing_pose_tests;
mod event_tests;
mod readiness_tests;
mod selection_tests;
