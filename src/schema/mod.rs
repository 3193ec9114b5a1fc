//! gaze.frame.v1 input schema
//!
//! This module defines the per-frame annotation records accepted by the engine
//! and the adapter that validates, classifies and groups them into trials.

mod adapter;
mod frame_record;

pub use adapter::*;
pub use frame_record::*;
