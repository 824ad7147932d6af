//! PTS (ASCII) format support
//!
//! Columns are fixed: `X Y Z Intensity R G B`. A file may start with
//! comment lines (`//`), a line with the point count and a column-name line;
//! the first line with several numeric tokens starts the data.

use crate::error::{CodecError, Result};
use crate::registry::{capacity_hint, CodecContext, PointCloudCodec};
use cloudconv_core::{PointCloudModel, ScalarArray, ScalarType, Stage};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// PTS write options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PtsWriteOptions {
    /// Rows written between progress reports
    pub chunk_size: usize,
}

impl Default for PtsWriteOptions {
    fn default() -> Self {
        Self { chunk_size: 1024 }
    }
}

impl PtsWriteOptions {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

/// Codec for `.pts` files
#[derive(Debug, Clone, Default)]
pub struct PtsCodec {
    options: PtsWriteOptions,
}

impl PtsCodec {
    pub fn new(options: PtsWriteOptions) -> Self {
        Self { options }
    }
}

fn is_number(token: &str) -> bool {
    token.parse::<f64>().is_ok()
}

/// Whether a line belongs to the header rather than the point data
fn is_header_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with("//") {
        return true;
    }
    let mut tokens = trimmed.split_whitespace();
    match (tokens.next(), tokens.next()) {
        // Lone number: the point count
        (Some(token), None) => is_number(token),
        // Column names
        (Some(token), Some(_)) => !is_number(token),
        (None, _) => true,
    }
}

/// Number of header lines before the first data row
pub fn header_line_count<R: BufRead>(reader: R) -> Result<usize> {
    let mut count = 0;
    for line in reader.lines() {
        if !is_header_line(&line?) {
            break;
        }
        count += 1;
    }
    Ok(count)
}

/// Whether color tokens are plain unsigned integers
fn is_digit_only(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

fn parse_token(token: &str, line_number: usize) -> Result<f64> {
    token.parse::<f64>().map_err(|_| {
        CodecError::malformed("pts", format!("line {}: invalid number '{}'", line_number, token))
    })
}

impl PointCloudCodec for PtsCodec {
    fn format_name(&self) -> &'static str {
        "pts"
    }

    fn extensions(&self) -> &[&'static str] {
        &[".pts"]
    }

    fn decode(&self, path: &Path, ctx: &mut CodecContext<'_>) -> Result<PointCloudModel> {
        let defaults = ctx.defaults;
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let reader = BufReader::new(file);

        let mut xyz: Vec<f64> = Vec::new();
        let mut intensities: Vec<f64> = Vec::new();
        let mut colors: Vec<f64> = Vec::new();
        let mut color_type: Option<ScalarType> = None;
        let mut has_intensity = false;
        let mut in_header = true;
        let mut bytes_read = 0u64;

        let mut tracker = ctx.tracker(Stage::Read, file_size);
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            bytes_read += line.len() as u64 + 1;
            let line_number = index + 1;

            if in_header {
                if is_header_line(&line) {
                    let trimmed = line.trim();
                    if let Ok(count) = trimmed.parse::<u64>() {
                        // Shortest possible row is "0 0 0\n"
                        let capacity = capacity_hint(count, file_size, 6);
                        xyz.reserve(capacity * 3);
                        intensities.reserve(capacity);
                    }
                    continue;
                }
                in_header = false;

                let tokens: Vec<&str> = line.split_whitespace().collect();
                has_intensity = tokens.len() >= 4;
                if tokens.len() >= 7 {
                    color_type = Some(if tokens[4..7].iter().all(|t| is_digit_only(t)) {
                        ScalarType::U8
                    } else {
                        ScalarType::F32
                    });
                }
                log::debug!(
                    "PTS data starts at line {}, intensity: {}, colors: {:?}",
                    line_number,
                    has_intensity,
                    color_type
                );
            }

            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            if tokens.len() < 3 {
                return Err(CodecError::malformed(
                    "pts",
                    format!("line {}: expected at least 3 columns, found {}", line_number, tokens.len()),
                ));
            }

            for token in &tokens[..3] {
                xyz.push(parse_token(token, line_number)?);
            }
            intensities.push(match tokens.get(3) {
                Some(token) => parse_token(token, line_number)?,
                None => 0.0,
            });
            if color_type.is_some() {
                if tokens.len() >= 7 {
                    for token in &tokens[4..7] {
                        colors.push(parse_token(token, line_number)?);
                    }
                } else {
                    colors.extend([0.0, 0.0, 0.0]);
                }
            }

            tracker.update(bytes_read);
        }
        tracker.finish();

        let n = xyz.len() / 3;
        let points = ScalarArray::from_f64_values(defaults.points, &xyz);
        let intensities =
            has_intensity.then(|| ScalarArray::from_f64_values(defaults.intensities, &intensities));
        let colors = color_type.map(|ty| ScalarArray::from_f64_values(ty, &colors));

        log::info!("read {} points from {}", n, path.display());
        Ok(PointCloudModel::with_defaults(points, colors, intensities, &defaults)?)
    }

    fn encode(&self, model: PointCloudModel, path: &Path, ctx: &mut CodecContext<'_>) -> Result<()> {
        let n = model.len();
        let float_colors = model.colors().scalar_type().is_float();

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        if float_colors {
            writeln!(writer, "X Y Z Intensity Rf Gf Bf")?;
        } else {
            writeln!(writer, "X Y Z Intensity R G B")?;
        }
        writeln!(writer, "{}", n)?;

        let points = model.points();
        let colors = model.colors();
        let intensities = model.intensities();
        let missing = || CodecError::Core(cloudconv_core::Error::InvalidData("point index out of range".to_string()));

        let mut tracker = ctx.tracker(Stage::Write, n as u64);
        for i in 0..n {
            writeln!(
                writer,
                "{} {} {} {} {} {} {}",
                points.get(i * 3).ok_or_else(missing)?,
                points.get(i * 3 + 1).ok_or_else(missing)?,
                points.get(i * 3 + 2).ok_or_else(missing)?,
                intensities.get(i).ok_or_else(missing)?,
                colors.get(i * 3).ok_or_else(missing)?,
                colors.get(i * 3 + 1).ok_or_else(missing)?,
                colors.get(i * 3 + 2).ok_or_else(missing)?,
            )?;
            if (i + 1) % self.options.chunk_size.max(1) == 0 {
                tracker.update(i as u64 + 1);
            }
        }
        writer.flush()?;
        tracker.finish();

        log::info!("wrote {} points to {}", n, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudconv_core::{DefaultTypes, NoProgress};
    use std::fs;
    use std::io::Cursor;

    fn decode_str(content: &str) -> Result<PointCloudModel> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.pts");
        fs::write(&path, content).unwrap();
        let mut sink = NoProgress;
        let mut ctx = CodecContext::new(DefaultTypes::default(), &mut sink);
        PtsCodec::default().decode(&path, &mut ctx)
    }

    #[test]
    fn test_header_line_count() {
        let content = "// exported scan\n// second comment\n3\n1 2 3 4 5 6 7\n";
        assert_eq!(header_line_count(Cursor::new(content)).unwrap(), 3);

        let content = "X Y Z Intensity R G B\n2\n1 2 3 4 5 6 7\n";
        assert_eq!(header_line_count(Cursor::new(content)).unwrap(), 2);

        let content = "1 2 3 4 5 6 7\n";
        assert_eq!(header_line_count(Cursor::new(content)).unwrap(), 0);
    }

    #[test]
    fn test_decode_integer_colors() {
        let model = decode_str("2\n0.5 1.5 2.5 -100 255 128 0\n1 2 3 20 10 20 30\n").unwrap();
        assert_eq!(model.len(), 2);
        assert_eq!(model.points(), &ScalarArray::F32(vec![0.5, 1.5, 2.5, 1.0, 2.0, 3.0]));
        assert_eq!(model.intensities(), &ScalarArray::F32(vec![-100.0, 20.0]));
        assert_eq!(model.colors(), &ScalarArray::U8(vec![255, 128, 0, 10, 20, 30]));
    }

    #[test]
    fn test_decode_float_colors() {
        let model = decode_str("1\n0 0 0 0.5 1.0 0.5 0.25\n").unwrap();
        assert_eq!(model.colors(), &ScalarArray::F32(vec![1.0, 0.5, 0.25]));
    }

    #[test]
    fn test_decode_xyz_only() {
        let model = decode_str("1 2 3\n4 5 6\n").unwrap();
        assert_eq!(model.len(), 2);
        assert_eq!(model.colors(), &ScalarArray::U8(vec![0; 6]));
        assert_eq!(model.intensities(), &ScalarArray::F32(vec![0.0; 2]));
    }

    #[test]
    fn test_short_rows_leave_defaults() {
        let model = decode_str("1 1 1 7 10 20 30\n2 2 2\n").unwrap();
        assert_eq!(model.intensities(), &ScalarArray::F32(vec![7.0, 0.0]));
        assert_eq!(model.colors(), &ScalarArray::U8(vec![10, 20, 30, 0, 0, 0]));
    }

    #[test]
    fn test_oversized_point_count_is_only_a_hint() {
        let model = decode_str("6148914691236517206\n1 2 3\n").unwrap();
        assert_eq!(model.len(), 1);

        let model = decode_str("1000000000000000\n1 2 3\n").unwrap();
        assert_eq!(model.points(), &ScalarArray::F32(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_decode_malformed_row() {
        let result = decode_str("1 2 3\n4 five 6\n");
        assert!(matches!(result, Err(CodecError::Malformed { format: "pts", .. })));
    }

    #[test]
    fn test_encode_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pts");
        let model = PointCloudModel::new(
            ScalarArray::from(vec![1.5f32, 2.0, 3.0]),
            ScalarArray::from(vec![0.5f32, 0.25, 1.0]),
            ScalarArray::from(vec![0.75f32]),
        )
        .unwrap();

        let mut sink = NoProgress;
        let mut ctx = CodecContext::new(DefaultTypes::default(), &mut sink);
        PtsCodec::default().encode(model, &path, &mut ctx).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "X Y Z Intensity Rf Gf Bf\n1\n1.5 2 3 0.75 0.5 0.25 1\n");

        // Files written by the encoder read back
        let model = PtsCodec::default().decode(&path, &mut ctx).unwrap();
        assert_eq!(model.len(), 1);
        assert_eq!(model.colors(), &ScalarArray::F32(vec![0.5, 0.25, 1.0]));
    }
}
