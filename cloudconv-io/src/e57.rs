//! E57 support
//!
//! Only the first scan of a file is read. Colors and intensities come out of
//! the reader normalized to `[0, 1]` by their record limits and are rescaled
//! to the configured default types. Records without valid Cartesian
//! coordinates are kept at the origin so the point count matches the scan.

use crate::error::{CodecError, Result};
use crate::registry::{capacity_hint, CodecContext, PointCloudCodec};
use ::e57::{
    CartesianCoordinate, E57Reader, E57Writer, Record, RecordDataType, RecordName, RecordValue,
};
use cloudconv_core::{
    convert, resolve_fields, Bounds, Point3, PointCloudModel, Role, ScalarArray, ScalarType, Stage,
};
use std::path::Path;
use uuid::Uuid;

/// Codec for `.e57` files
#[derive(Debug, Clone, Copy, Default)]
pub struct E57Codec;

fn scan_bounds(bounds: &::e57::CartesianBounds) -> Option<Bounds> {
    Some(Bounds::new(
        Point3::new(bounds.x_min?, bounds.y_min?, bounds.z_min?),
        Point3::new(bounds.x_max?, bounds.y_max?, bounds.z_max?),
    ))
}

fn record(name: RecordName, data_type: RecordDataType) -> Record {
    Record { name, data_type }
}

impl PointCloudCodec for E57Codec {
    fn format_name(&self) -> &'static str {
        "e57"
    }

    fn extensions(&self) -> &[&'static str] {
        &[".e57"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(b"ASTM-E57")
    }

    fn decode(&self, path: &Path, ctx: &mut CodecContext<'_>) -> Result<PointCloudModel> {
        let defaults = ctx.defaults;
        let mut reader = E57Reader::from_file(path)?;

        let pointclouds = reader.pointclouds();
        if pointclouds.len() > 1 {
            log::warn!(
                "{} contains {} scans, only the first is converted",
                path.display(),
                pointclouds.len()
            );
        }
        let pc = pointclouds
            .into_iter()
            .next()
            .ok_or_else(|| CodecError::malformed("e57", "file contains no point cloud"))?;

        let names: Vec<String> = pc.prototype.iter().map(|r| format!("{:?}", r.name)).collect();
        let mapping = resolve_fields(&names);
        let has_color = mapping.has_all(&Role::COLORS);
        let has_intensity = mapping.is_resolved(Role::Intensity);
        log::debug!("E57 scan with {} records, fields: {}", pc.records, names.join(", "));

        let capacity = capacity_hint(pc.records, std::fs::metadata(path)?.len(), 1);
        let mut xyz = Vec::with_capacity(capacity * 3);
        let mut colors: Vec<f32> = Vec::with_capacity(if has_color { capacity * 3 } else { 0 });
        let mut intensities: Vec<f32> = Vec::with_capacity(if has_intensity { capacity } else { 0 });
        let mut invalid = 0u64;

        let mut iter = reader.pointcloud_simple(&pc)?;
        iter.spherical_to_cartesian(true);
        iter.cartesian_to_spherical(false);
        iter.intensity_to_color(false);
        iter.apply_pose(true);

        let mut tracker = ctx.tracker(Stage::Read, pc.records);
        for (index, point) in iter.enumerate() {
            let point = point?;
            tracker.update(index as u64 + 1);

            match point.cartesian {
                CartesianCoordinate::Valid { x, y, z } => xyz.extend([x, y, z]),
                _ => {
                    invalid += 1;
                    xyz.extend([0.0, 0.0, 0.0]);
                }
            }
            if has_color {
                match point.color {
                    Some(color) => colors.extend([color.red, color.green, color.blue]),
                    None => colors.extend([0.0, 0.0, 0.0]),
                }
            }
            if has_intensity {
                intensities.push(point.intensity.unwrap_or(0.0));
            }
        }
        tracker.finish();

        if invalid > 0 {
            log::warn!("{} points without valid coordinates were placed at the origin", invalid);
        }

        let n = xyz.len() / 3;
        let points = ScalarArray::from(xyz).cast(defaults.points);
        let colors = has_color.then(|| {
            let colors = ScalarArray::from(colors);
            if defaults.colors.is_integer() {
                let max = defaults.colors.max_value();
                colors.map_into(defaults.colors, |v| (v * max).round())
            } else {
                convert(colors, defaults.colors, true)
            }
        });
        let intensities =
            has_intensity.then(|| convert(ScalarArray::from(intensities), defaults.intensities, true));

        log::info!("read {} points from {}", n, path.display());
        Ok(PointCloudModel::with_defaults(points, colors, intensities, &defaults)?
            .with_bounds(pc.cartesian_bounds.as_ref().and_then(scan_bounds)))
    }

    fn encode(&self, mut model: PointCloudModel, path: &Path, ctx: &mut CodecContext<'_>) -> Result<()> {
        let n = model.len();
        let double = model.points().scalar_type() == ScalarType::F64;

        model.convert_colors(ScalarType::U8, true);
        model.convert_intensities(ScalarType::F32, true);

        // Readers normalize by these limits, an empty range would yield NaN
        let (intensity_min, intensity_max) = model.intensities().min_max().unwrap_or((0.0, 1.0));
        let intensity_min = intensity_min as f32;
        let mut intensity_max = intensity_max as f32;
        if intensity_max <= intensity_min {
            intensity_max = intensity_min + intensity_min.abs().max(1.0);
        }

        let coordinate_type = if double {
            RecordDataType::Double { min: None, max: None }
        } else {
            RecordDataType::Single { min: None, max: None }
        };
        let color_type = RecordDataType::Integer { min: 0, max: 255 };
        let prototype = vec![
            record(RecordName::CartesianX, coordinate_type.clone()),
            record(RecordName::CartesianY, coordinate_type.clone()),
            record(RecordName::CartesianZ, coordinate_type),
            record(
                RecordName::Intensity,
                RecordDataType::Single {
                    min: Some(intensity_min),
                    max: Some(intensity_max),
                },
            ),
            record(RecordName::ColorRed, color_type.clone()),
            record(RecordName::ColorGreen, color_type.clone()),
            record(RecordName::ColorBlue, color_type),
        ];

        let points = model.points().to_f64_vec();
        let colors = model
            .colors()
            .as_slice::<u8>()
            .ok_or_else(|| CodecError::Unsupported("E57 colors must be uint8".to_string()))?;
        let intensities = model
            .intensities()
            .as_slice::<f32>()
            .ok_or_else(|| CodecError::Unsupported("E57 intensities must be float32".to_string()))?;

        let file_guid = Uuid::new_v4().to_string();
        let mut writer = E57Writer::from_file(path, &file_guid)?;
        let scan_guid = Uuid::new_v4().to_string();
        let mut pc_writer = writer.add_pointcloud(&scan_guid, prototype)?;

        let coordinate = |v: f64| {
            if double {
                RecordValue::Double(v)
            } else {
                RecordValue::Single(v as f32)
            }
        };

        let mut tracker = ctx.tracker(Stage::Write, n as u64);
        for i in 0..n {
            // Same order as the prototype
            pc_writer.add_point(vec![
                coordinate(points[i * 3]),
                coordinate(points[i * 3 + 1]),
                coordinate(points[i * 3 + 2]),
                RecordValue::Single(intensities[i]),
                RecordValue::Integer(i64::from(colors[i * 3])),
                RecordValue::Integer(i64::from(colors[i * 3 + 1])),
                RecordValue::Integer(i64::from(colors[i * 3 + 2])),
            ])?;
            tracker.update(i as u64 + 1);
        }
        pc_writer.finalize()?;
        writer.finalize()?;
        tracker.finish();

        log::info!("wrote {} points to {}", n, path.display());
        Ok(())
    }
}
