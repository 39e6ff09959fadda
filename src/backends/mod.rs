// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for frame capture
//!
//! - [`camera`]: the [`camera::VideoSource`] trait, V4L2 capture and torch control
//! - [`file_source`]: image sequences played back as a camera

pub mod camera;
pub mod file_source;
