//! Default attribute types used when a format does not dictate them

use crate::scalar::ScalarType;
use serde::{Deserialize, Serialize};

/// Scalar types a decoder produces for canonical attributes, and the types
/// used to fill attributes a source file does not provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultTypes {
    pub points: ScalarType,
    pub colors: ScalarType,
    pub intensities: ScalarType,
}

impl Default for DefaultTypes {
    fn default() -> Self {
        Self {
            points: ScalarType::F32,
            colors: ScalarType::U8,
            intensities: ScalarType::F32,
        }
    }
}

impl DefaultTypes {
    pub fn with_points(mut self, ty: ScalarType) -> Self {
        self.points = ty;
        self
    }

    pub fn with_colors(mut self, ty: ScalarType) -> Self {
        self.colors = ty;
        self
    }

    pub fn with_intensities(mut self, ty: ScalarType) -> Self {
        self.intensities = ty;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_types() {
        let defaults = DefaultTypes::default();
        assert_eq!(defaults.points, ScalarType::F32);
        assert_eq!(defaults.colors, ScalarType::U8);
        assert_eq!(defaults.intensities, ScalarType::F32);
    }

    #[test]
    fn test_builders() {
        let defaults = DefaultTypes::default()
            .with_points(ScalarType::F64)
            .with_colors(ScalarType::U16);
        assert_eq!(defaults.points, ScalarType::F64);
        assert_eq!(defaults.colors, ScalarType::U16);
        assert_eq!(defaults.intensities, ScalarType::F32);
    }
}
