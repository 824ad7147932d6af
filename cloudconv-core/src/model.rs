//! Canonical in-memory point cloud

use crate::config::DefaultTypes;
use crate::convert::convert;
use crate::scalar::{ScalarArray, ScalarType};
use crate::{Error, Result};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Bounds {
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Compute the bounds of interleaved `[x0, y0, z0, x1, ...]` coordinates
    pub fn from_interleaved(points: &ScalarArray) -> Option<Self> {
        let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        let mut seen = false;

        for i in 0..points.len() / 3 {
            for axis in 0..3 {
                let value = points.get_f64(i * 3 + axis)?;
                if value.is_nan() {
                    continue;
                }
                min[axis] = min[axis].min(value);
                max[axis] = max[axis].max(value);
                seen = true;
            }
        }

        seen.then_some(Self { min, max })
    }

    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn contains(&self, point: &Point3<f64>) -> bool {
        (0..3).all(|axis| point[axis] >= self.min[axis] && point[axis] <= self.max[axis])
    }
}

/// A point cloud held as three index-aligned attribute arrays.
///
/// `points` and `colors` are interleaved triples (`3 * N` elements),
/// `intensities` has `N` elements. The lengths are checked on construction
/// and every mutation replaces a whole array, so they always agree.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloudModel {
    points: ScalarArray,
    colors: ScalarArray,
    intensities: ScalarArray,
    bounds: Option<Bounds>,
}

impl PointCloudModel {
    /// Build a model from complete attribute arrays
    pub fn new(points: ScalarArray, colors: ScalarArray, intensities: ScalarArray) -> Result<Self> {
        if points.len() % 3 != 0 {
            return Err(Error::InvalidData(format!(
                "point coordinates must come in triples, got {} values",
                points.len()
            )));
        }
        let n = points.len() / 3;
        if colors.len() != n * 3 {
            return Err(Error::LengthMismatch {
                attribute: "colors",
                expected: n * 3,
                actual: colors.len(),
            });
        }
        if intensities.len() != n {
            return Err(Error::LengthMismatch {
                attribute: "intensities",
                expected: n,
                actual: intensities.len(),
            });
        }

        Ok(Self {
            points,
            colors,
            intensities,
            bounds: None,
        })
    }

    /// Build a model, substituting zero-filled arrays of the default types
    /// for attributes the source does not provide
    pub fn with_defaults(
        points: ScalarArray,
        colors: Option<ScalarArray>,
        intensities: Option<ScalarArray>,
        defaults: &DefaultTypes,
    ) -> Result<Self> {
        let n = points.len() / 3;
        let colors = colors.unwrap_or_else(|| {
            log::debug!("no color attribute, filling {} points with zero {}", n, defaults.colors);
            ScalarArray::zeros(defaults.colors, n * 3)
        });
        let intensities = intensities.unwrap_or_else(|| {
            log::debug!("no intensity attribute, filling {} points with zero {}", n, defaults.intensities);
            ScalarArray::zeros(defaults.intensities, n)
        });
        Self::new(points, colors, intensities)
    }

    /// An empty cloud of the default types
    pub fn empty(defaults: &DefaultTypes) -> Self {
        Self {
            points: ScalarArray::zeros(defaults.points, 0),
            colors: ScalarArray::zeros(defaults.colors, 0),
            intensities: ScalarArray::zeros(defaults.intensities, 0),
            bounds: None,
        }
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn points(&self) -> &ScalarArray {
        &self.points
    }

    pub fn colors(&self) -> &ScalarArray {
        &self.colors
    }

    pub fn intensities(&self) -> &ScalarArray {
        &self.intensities
    }

    /// Bounds supplied by the source format, if any
    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: Option<Bounds>) {
        self.bounds = bounds;
    }

    pub fn with_bounds(mut self, bounds: Option<Bounds>) -> Self {
        self.bounds = bounds;
        self
    }

    /// Bounds computed from the coordinates
    pub fn computed_bounds(&self) -> Option<Bounds> {
        Bounds::from_interleaved(&self.points)
    }

    /// Source bounds, falling back to computed ones
    pub fn bounds_or_computed(&self) -> Option<Bounds> {
        self.bounds.or_else(|| self.computed_bounds())
    }

    /// Coordinates of point `index` widened to f64
    pub fn point(&self, index: usize) -> Option<Point3<f64>> {
        Some(Point3::new(
            self.points.get_f64(index * 3)?,
            self.points.get_f64(index * 3 + 1)?,
            self.points.get_f64(index * 3 + 2)?,
        ))
    }

    /// Color of point `index` widened to f64
    pub fn color(&self, index: usize) -> Option<[f64; 3]> {
        Some([
            self.colors.get_f64(index * 3)?,
            self.colors.get_f64(index * 3 + 1)?,
            self.colors.get_f64(index * 3 + 2)?,
        ])
    }

    /// Rescale colors into `target` (see [`convert`])
    pub fn convert_colors(&mut self, target: ScalarType, float_max_is_one: bool) {
        rewrite(&mut self.colors, |colors| convert(colors, target, float_max_is_one));
    }

    /// Rescale intensities into `target` (see [`convert`])
    pub fn convert_intensities(&mut self, target: ScalarType, float_max_is_one: bool) {
        rewrite(&mut self.intensities, |values| convert(values, target, float_max_is_one));
    }

    /// Change the coordinate type without rescaling values
    pub fn cast_points(&mut self, target: ScalarType) {
        rewrite(&mut self.points, |points| points.cast(target));
    }

    pub fn into_parts(self) -> (ScalarArray, ScalarArray, ScalarArray, Option<Bounds>) {
        (self.points, self.colors, self.intensities, self.bounds)
    }
}

fn rewrite<F>(slot: &mut ScalarArray, f: F)
where
    F: FnOnce(ScalarArray) -> ScalarArray,
{
    let current = std::mem::replace(slot, ScalarArray::U8(Vec::new()));
    *slot = f(current);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PointCloudModel {
        PointCloudModel::new(
            ScalarArray::from(vec![0.0f32, 1.0, 2.0, -3.0, 4.0, 5.0]),
            ScalarArray::from(vec![255u8, 0, 0, 0, 128, 255]),
            ScalarArray::from(vec![0.5f32, 1.0]),
        )
        .unwrap()
    }

    #[test]
    fn test_new_validates_lengths() {
        let result = PointCloudModel::new(
            ScalarArray::from(vec![0.0f32; 6]),
            ScalarArray::from(vec![0u8; 3]),
            ScalarArray::from(vec![0.0f32; 2]),
        );
        assert!(matches!(
            result,
            Err(Error::LengthMismatch { attribute: "colors", expected: 6, actual: 3 })
        ));

        let result = PointCloudModel::new(
            ScalarArray::from(vec![0.0f32; 6]),
            ScalarArray::from(vec![0u8; 6]),
            ScalarArray::from(vec![0.0f32; 3]),
        );
        assert!(matches!(result, Err(Error::LengthMismatch { attribute: "intensities", .. })));

        let result = PointCloudModel::new(
            ScalarArray::from(vec![0.0f32; 5]),
            ScalarArray::from(vec![0u8; 5]),
            ScalarArray::from(vec![0.0f32; 1]),
        );
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_missing_attributes_are_zero_filled() {
        let defaults = DefaultTypes::default();
        let model = PointCloudModel::with_defaults(
            ScalarArray::from(vec![1.0f32; 12]),
            None,
            None,
            &defaults,
        )
        .unwrap();

        assert_eq!(model.len(), 4);
        assert_eq!(model.colors(), &ScalarArray::U8(vec![0; 12]));
        assert_eq!(model.intensities(), &ScalarArray::F32(vec![0.0; 4]));
    }

    #[test]
    fn test_conversions_keep_lengths() {
        let mut model = sample();
        model.convert_colors(ScalarType::U16, true);
        model.convert_intensities(ScalarType::U16, true);
        model.cast_points(ScalarType::F64);

        assert_eq!(model.colors(), &ScalarArray::U16(vec![65280, 0, 0, 0, 32768, 65280]));
        assert_eq!(model.intensities(), &ScalarArray::U16(vec![32767, 65535]));
        assert_eq!(model.points().scalar_type(), ScalarType::F64);
        assert_eq!(model.len(), 2);
        assert_eq!(model.colors().len(), model.points().len());
    }

    #[test]
    fn test_bounds() {
        let model = sample();
        assert_eq!(model.bounds(), None);

        let bounds = model.computed_bounds().unwrap();
        assert_eq!(bounds.min, Point3::new(-3.0, 1.0, 2.0));
        assert_eq!(bounds.max, Point3::new(0.0, 4.0, 5.0));
        assert_eq!(model.bounds_or_computed(), Some(bounds));
        assert!(bounds.contains(&Point3::new(-1.0, 2.0, 3.0)));

        let supplied = Bounds::new(Point3::new(-10.0, -10.0, -10.0), Point3::new(10.0, 10.0, 10.0));
        let model = model.with_bounds(Some(supplied));
        assert_eq!(model.bounds_or_computed(), Some(supplied));
    }

    #[test]
    fn test_point_accessors() {
        let model = sample();
        assert_eq!(model.point(1), Some(Point3::new(-3.0, 4.0, 5.0)));
        assert_eq!(model.color(0), Some([255.0, 0.0, 0.0]));
        assert_eq!(model.point(2), None);
    }
}
