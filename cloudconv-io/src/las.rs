//! LAS and LAZ support
//!
//! Points are stored as scaled 32-bit integers. On write the per-axis offset
//! is the minimum coordinate and the scale spreads the extent over the full
//! positive `i32` range. Colors and intensities are always 16-bit unsigned.

use crate::error::{CodecError, Result};
use crate::registry::{capacity_hint, CodecContext, PointCloudCodec};
use cloudconv_core::{
    resolve_fields, Bounds, Point3, PointCloudModel, Role, ScalarArray, ScalarType, Stage,
};
use las::point::Format;
use las::{Builder, Color, Reader, Transform, Vector, Writer};
use std::path::Path;

/// Scale used for an axis without extent
const FALLBACK_SCALE: f64 = 0.001;

/// Codec for `.las` and `.laz` files
#[derive(Debug, Clone, Copy, Default)]
pub struct LasCodec;

/// Dimension names a point of `format` exposes
fn dimension_names(format: &Format) -> Vec<&'static str> {
    let mut names = vec![
        "X",
        "Y",
        "Z",
        "Intensity",
        "ReturnNumber",
        "NumberOfReturns",
        "ScanDirectionFlag",
        "EdgeOfFlightLine",
        "Classification",
        "ScanAngleRank",
        "UserData",
        "PointSourceId",
    ];
    if format.has_gps_time {
        names.push("GpsTime");
    }
    if format.has_color {
        names.extend(["Red", "Green", "Blue"]);
    }
    if format.has_nir {
        names.push("Nir");
    }
    names
}

/// Offset and scale for one axis spanning `[min, max]`
fn axis_transform(min: f64, max: f64) -> Transform {
    let extent = max - min;
    let scale = if extent > 0.0 && extent.is_finite() {
        extent / i32::MAX as f64
    } else {
        FALLBACK_SCALE
    };
    Transform { scale, offset: min }
}

/// Clamp a coordinate into the range representable by `transform`
fn clamp_to_transform(value: f64, transform: &Transform) -> f64 {
    let min_allowed = transform.offset + transform.scale * i32::MIN as f64;
    let max_allowed = transform.offset + transform.scale * i32::MAX as f64;
    value.clamp(min_allowed, max_allowed)
}

impl PointCloudCodec for LasCodec {
    fn format_name(&self) -> &'static str {
        "las"
    }

    fn extensions(&self) -> &[&'static str] {
        &[".las", ".laz"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(b"LASF")
    }

    fn decode(&self, path: &Path, ctx: &mut CodecContext<'_>) -> Result<PointCloudModel> {
        let defaults = ctx.defaults;
        let mut reader = Reader::from_path(path)?;

        let header = reader.header().clone();
        let total = header.number_of_points();
        let mapping = resolve_fields(&dimension_names(header.point_format()));
        if !mapping.has_all(&Role::COORDINATES) {
            return Err(CodecError::malformed("las", "point format has no coordinates"));
        }
        let has_color = mapping.has_all(&Role::COLORS);
        let has_intensity = mapping.is_resolved(Role::Intensity);

        log::debug!(
            "LAS {}.{}, {} points, color: {}",
            header.version().major,
            header.version().minor,
            total,
            has_color
        );

        // LAZ records compress well below their nominal size
        let capacity = capacity_hint(total, std::fs::metadata(path)?.len(), 1);
        let mut xyz = Vec::with_capacity(capacity * 3);
        let mut colors = Vec::with_capacity(if has_color { capacity * 3 } else { 0 });
        let mut intensities = Vec::with_capacity(capacity);

        let mut tracker = ctx.tracker(Stage::Read, total);
        for (index, point) in reader.points().enumerate() {
            let point = point?;
            xyz.extend([point.x, point.y, point.z]);
            intensities.push(point.intensity);
            if has_color {
                match point.color {
                    Some(color) => colors.extend([color.red, color.green, color.blue]),
                    None => colors.extend([0, 0, 0]),
                }
            }
            tracker.update(index as u64 + 1);
        }
        tracker.finish();

        let n = intensities.len();
        let points = ScalarArray::from(xyz).cast(defaults.points);
        let colors = has_color.then(|| ScalarArray::from(colors));
        let intensities = has_intensity.then(|| ScalarArray::from(intensities));

        let bounds = header.bounds();
        let bounds = Bounds::new(
            Point3::new(bounds.min.x, bounds.min.y, bounds.min.z),
            Point3::new(bounds.max.x, bounds.max.y, bounds.max.z),
        );

        log::info!("read {} points from {}", n, path.display());
        Ok(PointCloudModel::with_defaults(points, colors, intensities, &defaults)?
            .with_bounds((n > 0).then_some(bounds)))
    }

    fn encode(&self, mut model: PointCloudModel, path: &Path, ctx: &mut CodecContext<'_>) -> Result<()> {
        let n = model.len();

        model.convert_colors(ScalarType::U16, true);
        model.convert_intensities(ScalarType::U16, true);

        let transforms = match model.computed_bounds() {
            Some(bounds) => Vector {
                x: axis_transform(bounds.min.x, bounds.max.x),
                y: axis_transform(bounds.min.y, bounds.max.y),
                z: axis_transform(bounds.min.z, bounds.max.z),
            },
            None => Vector {
                x: axis_transform(0.0, 0.0),
                y: axis_transform(0.0, 0.0),
                z: axis_transform(0.0, 0.0),
            },
        };
        log::debug!(
            "LAS offsets ({}, {}, {}), scales ({}, {}, {})",
            transforms.x.offset,
            transforms.y.offset,
            transforms.z.offset,
            transforms.x.scale,
            transforms.y.scale,
            transforms.z.scale
        );

        let mut builder = Builder::from((1, 2));
        builder.point_format = Format::new(3)?;
        builder.transforms = transforms;
        let header = builder.into_header()?;

        let points = model.points().to_f64_vec();
        let colors = model
            .colors()
            .as_slice::<u16>()
            .ok_or_else(|| CodecError::Unsupported("LAS colors must be uint16".to_string()))?;
        let intensities = model
            .intensities()
            .as_slice::<u16>()
            .ok_or_else(|| CodecError::Unsupported("LAS intensities must be uint16".to_string()))?;

        let mut writer = Writer::from_path(path, header)?;
        let mut tracker = ctx.tracker(Stage::Write, n as u64);
        for i in 0..n {
            let point = las::Point {
                x: clamp_to_transform(points[i * 3], &transforms.x),
                y: clamp_to_transform(points[i * 3 + 1], &transforms.y),
                z: clamp_to_transform(points[i * 3 + 2], &transforms.z),
                intensity: intensities[i],
                color: Some(Color::new(colors[i * 3], colors[i * 3 + 1], colors[i * 3 + 2])),
                gps_time: Some(0.0),
                ..Default::default()
            };
            writer.write_point(point)?;
            tracker.update(i as u64 + 1);
        }
        writer.close()?;
        tracker.finish();

        log::info!("wrote {} points to {}", n, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cloudconv_core::{DefaultTypes, NoProgress};

    fn sample_model() -> PointCloudModel {
        PointCloudModel::new(
            ScalarArray::from(vec![0.0f32, 0.0, 0.0, 10.0, 5.0, 2.5, 4.0, 1.0, 1.0]),
            ScalarArray::from(vec![255u8, 0, 0, 0, 255, 0, 0, 0, 255]),
            ScalarArray::from(vec![0.0f32, 0.5, 1.0]),
        )
        .unwrap()
    }

    #[test]
    fn test_axis_transform() {
        let transform = axis_transform(-5.0, 5.0);
        assert_eq!(transform.offset, -5.0);
        assert_relative_eq!(transform.scale * i32::MAX as f64, 10.0, max_relative = 1e-12);

        let flat = axis_transform(3.0, 3.0);
        assert_eq!(flat.offset, 3.0);
        assert_eq!(flat.scale, FALLBACK_SCALE);
    }

    #[test]
    fn test_clamp_to_transform() {
        let transform = axis_transform(0.0, 1.0);
        assert_eq!(clamp_to_transform(0.5, &transform), 0.5);
        assert!(clamp_to_transform(2.0, &transform) <= 1.0 + 1e-9);
    }

    #[test]
    fn test_dimension_names_follow_format() {
        let names = dimension_names(&Format::new(3).unwrap());
        assert!(names.contains(&"GpsTime"));
        assert!(names.ends_with(&["Red", "Green", "Blue"]));

        let names = dimension_names(&Format::new(0).unwrap());
        assert!(!names.contains(&"Red"));
    }

    #[test]
    fn test_las_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.las");
        let mut sink = NoProgress;
        let mut ctx = CodecContext::new(DefaultTypes::default(), &mut sink);

        LasCodec.encode(sample_model(), &path, &mut ctx).unwrap();
        let model = LasCodec.decode(&path, &mut ctx).unwrap();

        assert_eq!(model.len(), 3);
        assert_eq!(model.points().scalar_type(), ScalarType::F32);
        assert_eq!(
            model.colors(),
            &ScalarArray::U16(vec![65280, 0, 0, 0, 65280, 0, 0, 0, 65280])
        );
        assert_eq!(model.intensities(), &ScalarArray::U16(vec![0, 32767, 65535]));

        let point = model.point(1).unwrap();
        assert_relative_eq!(point.x, 10.0, epsilon = 1e-5);
        assert_relative_eq!(point.y, 5.0, epsilon = 1e-5);
        assert_relative_eq!(point.z, 2.5, epsilon = 1e-5);

        let bounds = model.bounds().unwrap();
        assert_relative_eq!(bounds.max.x, 10.0, epsilon = 1e-5);
        assert_relative_eq!(bounds.min.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_las_without_color_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.las");

        let mut builder = Builder::from((1, 2));
        builder.point_format = Format::new(0).unwrap();
        let header = builder.into_header().unwrap();
        let mut writer = Writer::from_path(&path, header).unwrap();
        for i in 0..4 {
            writer
                .write_point(las::Point {
                    x: i as f64,
                    y: 1.0,
                    z: 2.0,
                    intensity: 100,
                    ..Default::default()
                })
                .unwrap();
        }
        writer.close().unwrap();

        let mut sink = NoProgress;
        let mut ctx = CodecContext::new(DefaultTypes::default(), &mut sink);
        let model = LasCodec.decode(&path, &mut ctx).unwrap();

        assert_eq!(model.len(), 4);
        assert_eq!(model.colors(), &ScalarArray::U8(vec![0; 12]));
        assert_eq!(model.intensities(), &ScalarArray::U16(vec![100; 4]));
    }

    #[test]
    fn test_oversized_point_count_fails_without_reserving() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lying.las");
        let mut sink = NoProgress;
        let mut ctx = CodecContext::new(DefaultTypes::default(), &mut sink);
        LasCodec.encode(sample_model(), &path, &mut ctx).unwrap();

        // Legacy point count of a LAS 1.2 header
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[107..111].copy_from_slice(&u32::MAX.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        assert!(LasCodec.decode(&path, &mut ctx).is_err());
    }
}
