//! Core data model for multi-camera extrinsic calibration.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...),
//! - the camera model (pinhole intrinsics + Brown-Conrady distortion),
//! - cameras and calibration targets that are either static or moving,
//! - scenes, observation commands and the point observations a capture
//!   device reports back.
//!
//! Projection chain used throughout the workspace:
//! `pixel = K ∘ distortion ∘ normalize(extrinsics ∘ target_pose(point))`

/// Linear algebra type aliases.
pub mod math;
/// Cameras, targets, scenes and observations.
pub mod models;

pub use math::*;
pub use models::*;
