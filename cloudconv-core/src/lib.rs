//! Core data structures for cloudconv
//!
//! This crate provides the canonical point cloud model every codec reads into
//! and writes from, the typed scalar arrays backing it, the range conversion
//! rules between numeric representations, and the field-name resolution used
//! to map format-specific attribute names onto canonical roles.

pub mod config;
pub mod convert;
pub mod error;
pub mod fields;
pub mod model;
pub mod progress;
pub mod scalar;

pub use config::*;
pub use convert::convert;
pub use error::*;
pub use fields::*;
pub use model::*;
pub use progress::*;
pub use scalar::*;

/// Re-export of the point type used for bounds
pub use nalgebra::Point3;
