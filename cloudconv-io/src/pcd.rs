//! PCD (Point Cloud Data) format support
//!
//! Reads ASCII and binary payloads. Colors are stored either as a single
//! packed `rgb`/`rgba` field (`0x00RRGGBB` in a float or unsigned int) or as
//! separate channel fields. `binary_compressed` payloads are rejected.

use crate::error::{CodecError, Result};
use crate::registry::{capacity_hint, CodecContext, PointCloudCodec};
use byteorder::{ByteOrder, LittleEndian};
use cloudconv_core::{
    resolve_fields, PointCloudModel, Role, ScalarArray, ScalarType, ScalarValue, Stage,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

/// PCD data format variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PcdDataFormat {
    Ascii,
    Binary,
    BinaryCompressed,
}

impl PcdDataFormat {
    fn keyword(self) -> &'static str {
        match self {
            PcdDataFormat::Ascii => "ascii",
            PcdDataFormat::Binary => "binary",
            PcdDataFormat::BinaryCompressed => "binary_compressed",
        }
    }
}

/// How colors are laid out in the written fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PcdColorLayout {
    /// One float `rgb` field holding `0x00RRGGBB`
    Packed,
    /// Separate `r`, `g`, `b` fields of the model's color type
    Split,
}

/// PCD field definition
#[derive(Debug, Clone, PartialEq)]
pub struct PcdField {
    pub name: String,
    pub field_type: ScalarType,
    pub count: usize,
}

/// PCD header information
#[derive(Debug, Clone)]
pub struct PcdHeader {
    pub version: String,
    pub fields: Vec<PcdField>,
    pub width: usize,
    pub height: usize,
    pub viewpoint: [f64; 7],
    pub data_format: PcdDataFormat,
}

impl PcdHeader {
    pub fn point_count(&self) -> usize {
        self.width * self.height
    }

    /// Size of one binary point record in bytes
    pub fn record_size(&self) -> usize {
        self.fields
            .iter()
            .map(|field| field.field_type.size_bytes() * field.count)
            .sum()
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }
}

/// PCD write options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcdWriteOptions {
    pub data_format: PcdDataFormat,
    pub color_layout: PcdColorLayout,
    pub version: String,
    pub viewpoint: Option<[f64; 7]>,
}

impl Default for PcdWriteOptions {
    fn default() -> Self {
        Self {
            data_format: PcdDataFormat::Binary,
            color_layout: PcdColorLayout::Packed,
            version: "0.7".to_string(),
            viewpoint: None,
        }
    }
}

impl PcdWriteOptions {
    pub fn ascii() -> Self {
        Self::default().with_data_format(PcdDataFormat::Ascii)
    }

    pub fn with_data_format(mut self, data_format: PcdDataFormat) -> Self {
        self.data_format = data_format;
        self
    }

    pub fn with_color_layout(mut self, color_layout: PcdColorLayout) -> Self {
        self.color_layout = color_layout;
        self
    }

    pub fn with_viewpoint(mut self, viewpoint: [f64; 7]) -> Self {
        self.viewpoint = Some(viewpoint);
        self
    }
}

/// Codec for `.pcd` files
#[derive(Debug, Clone, Default)]
pub struct PcdCodec {
    options: PcdWriteOptions,
}

impl PcdCodec {
    pub fn new(options: PcdWriteOptions) -> Self {
        Self { options }
    }
}

fn invalid(message: impl Into<String>) -> CodecError {
    CodecError::malformed("pcd", message)
}

/// Map a PCD `TYPE`/`SIZE` pair onto a scalar type
fn field_type(type_code: &str, size: usize) -> Result<ScalarType> {
    let ty = match (type_code, size) {
        ("I", 1) => ScalarType::I8,
        ("I", 2) => ScalarType::I16,
        ("I", 4) => ScalarType::I32,
        ("I", 8) => ScalarType::I64,
        ("U", 1) => ScalarType::U8,
        ("U", 2) => ScalarType::U16,
        ("U", 4) => ScalarType::U32,
        ("U", 8) => ScalarType::U64,
        ("F", 4) => ScalarType::F32,
        ("F", 8) => ScalarType::F64,
        _ => {
            return Err(cloudconv_core::Error::UnsupportedType(format!(
                "PCD field type {}{}",
                type_code, size
            ))
            .into())
        }
    };
    Ok(ty)
}

/// `TYPE` letter of a scalar type
fn type_code(ty: ScalarType) -> char {
    if ty.is_float() {
        'F'
    } else if ty.is_signed() {
        'I'
    } else {
        'U'
    }
}

fn parse_values<T: std::str::FromStr>(keyword: &str, parts: &[&str]) -> Result<Vec<T>> {
    parts
        .iter()
        .map(|part| {
            part.parse::<T>()
                .map_err(|_| invalid(format!("invalid {} value: {}", keyword, part)))
        })
        .collect()
}

/// Parse the header up to and including the `DATA` line
pub fn read_header<R: BufRead>(reader: &mut R) -> Result<PcdHeader> {
    let mut version = None;
    let mut names: Vec<String> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut types: Vec<String> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut width = None;
    let mut height = None;
    let mut viewpoint = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
    let mut points = None;

    let mut line = String::new();
    let data_format = loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(invalid("unexpected end of file in header"));
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        let values = &parts[1..];
        match parts[0] {
            "VERSION" => version = values.first().map(|v| v.to_string()),
            "FIELDS" => names = values.iter().map(|v| v.to_string()).collect(),
            "SIZE" => sizes = parse_values("SIZE", values)?,
            "TYPE" => types = values.iter().map(|v| v.to_string()).collect(),
            "COUNT" => counts = parse_values("COUNT", values)?,
            "WIDTH" => width = parse_values::<usize>("WIDTH", values)?.first().copied(),
            "HEIGHT" => height = parse_values::<usize>("HEIGHT", values)?.first().copied(),
            "POINTS" => points = parse_values::<usize>("POINTS", values)?.first().copied(),
            "VIEWPOINT" => {
                let parsed = parse_values::<f64>("VIEWPOINT", values)?;
                if parsed.len() == 7 {
                    viewpoint.copy_from_slice(&parsed);
                }
            }
            "DATA" => {
                break match values.first().copied() {
                    Some("ascii") => PcdDataFormat::Ascii,
                    Some("binary") => PcdDataFormat::Binary,
                    Some("binary_compressed") => PcdDataFormat::BinaryCompressed,
                    other => return Err(invalid(format!("unknown DATA format {:?}", other))),
                };
            }
            other => log::debug!("ignoring PCD header entry {}", other),
        }
    };

    if counts.is_empty() {
        counts = vec![1; names.len()];
    }
    if names.len() != sizes.len() || names.len() != types.len() || names.len() != counts.len() {
        return Err(invalid("mismatch between FIELDS, SIZE, TYPE and COUNT declarations"));
    }

    let fields = names
        .into_iter()
        .zip(sizes)
        .zip(types)
        .zip(counts)
        .map(|(((name, size), ty), count)| {
            Ok(PcdField {
                name,
                field_type: field_type(&ty, size)?,
                count,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let width = width.or(points).ok_or_else(|| invalid("missing WIDTH"))?;
    let height = height.unwrap_or(1);
    let point_count = width
        .checked_mul(height)
        .ok_or_else(|| invalid(format!("WIDTH {} * HEIGHT {} overflows", width, height)))?;
    if let Some(points) = points {
        if points != point_count {
            return Err(invalid(format!(
                "POINTS ({}) doesn't match WIDTH * HEIGHT ({})",
                points, point_count
            )));
        }
    }
    fields
        .iter()
        .try_fold(0usize, |total, field| {
            field
                .field_type
                .size_bytes()
                .checked_mul(field.count)
                .and_then(|size| total.checked_add(size))
        })
        .ok_or_else(|| invalid("field sizes overflow the record size"))?;

    Ok(PcdHeader {
        version: version.unwrap_or_else(|| "0.7".to_string()),
        fields,
        width,
        height,
        viewpoint,
        data_format,
    })
}

/// Decode one little-endian value of `ty`
fn decode_le(ty: ScalarType, bytes: &[u8]) -> f64 {
    match ty {
        ScalarType::I8 => bytes[0] as i8 as f64,
        ScalarType::U8 => bytes[0] as f64,
        ScalarType::I16 => LittleEndian::read_i16(bytes) as f64,
        ScalarType::U16 => LittleEndian::read_u16(bytes) as f64,
        ScalarType::I32 => LittleEndian::read_i32(bytes) as f64,
        ScalarType::U32 => LittleEndian::read_u32(bytes) as f64,
        ScalarType::I64 => LittleEndian::read_i64(bytes) as f64,
        ScalarType::U64 => LittleEndian::read_u64(bytes) as f64,
        ScalarType::F32 => LittleEndian::read_f32(bytes) as f64,
        ScalarType::F64 => LittleEndian::read_f64(bytes),
    }
}

/// Raw 32 bits of a packed color value
fn packed_bits(ty: ScalarType, bytes: &[u8]) -> u32 {
    match ty {
        ScalarType::F32 | ScalarType::U32 | ScalarType::I32 => LittleEndian::read_u32(bytes),
        other => decode_le(other, bytes) as u32,
    }
}

/// Split `0x00RRGGBB` into channels
pub fn unpack_rgb(packed: u32) -> [u8; 3] {
    [
        ((packed >> 16) & 0xff) as u8,
        ((packed >> 8) & 0xff) as u8,
        (packed & 0xff) as u8,
    ]
}

/// Combine channels into `0x00RRGGBB`
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// A field read into a column
struct Column {
    field: usize,
    values: Vec<f64>,
}

impl PointCloudCodec for PcdCodec {
    fn format_name(&self) -> &'static str {
        "pcd"
    }

    fn extensions(&self) -> &[&'static str] {
        &[".pcd"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(b"# .PCD")
    }

    fn decode(&self, path: &Path, ctx: &mut CodecContext<'_>) -> Result<PointCloudModel> {
        let defaults = ctx.defaults;
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let header = read_header(&mut reader)?;
        let n = header.point_count();
        let payload_bytes = file_size.saturating_sub(reader.stream_position()?);
        log::debug!(
            "PCD v{} {} points, {} payload, fields: {}",
            header.version,
            n,
            header.data_format.keyword(),
            header.fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(" ")
        );

        if header.data_format == PcdDataFormat::BinaryCompressed {
            return Err(CodecError::Unsupported(
                "binary_compressed PCD payloads are not supported".to_string(),
            ));
        }

        let names: Vec<&str> = header.fields.iter().map(|f| f.name.as_str()).collect();
        let mapping = resolve_fields(&names);
        if !mapping.has_all(&Role::COORDINATES) {
            return Err(invalid("no x/y/z fields"));
        }
        let split_colors = mapping.has_all(&Role::COLORS);
        let packed_field = if split_colors {
            None
        } else {
            header
                .field_index("rgb")
                .or_else(|| header.field_index("rgba"))
        };

        // Columns in role order: x y z [r g b] [intensity] [packed]
        let mut wanted: Vec<usize> = Vec::new();
        for role in Role::ALL {
            if Role::COLORS.contains(&role) && !split_colors {
                continue;
            }
            if let Some(index) = mapping.get(role).and_then(|name| header.field_index(name)) {
                wanted.push(index);
            }
        }
        wanted.extend(packed_field);

        if header.data_format == PcdDataFormat::Binary {
            let required = (header.record_size() as u64).checked_mul(n as u64);
            if required.map_or(true, |required| required > payload_bytes) {
                return Err(invalid(format!(
                    "{} points of {} bytes don't fit in the {} byte payload",
                    n,
                    header.record_size(),
                    payload_bytes
                )));
            }
        }
        // Shortest ascii point is one digit and a separator
        let capacity = capacity_hint(n as u64, payload_bytes, 2);
        let mut columns: Vec<Column> = wanted
            .iter()
            .map(|&field| Column {
                field,
                values: Vec::with_capacity(capacity),
            })
            .collect();

        let offsets: Vec<usize> = header
            .fields
            .iter()
            .scan(0, |offset, field| {
                let start = *offset;
                *offset += field.field_type.size_bytes() * field.count;
                Some(start)
            })
            .collect();
        let token_offsets: Vec<usize> = header
            .fields
            .iter()
            .scan(0, |offset, field| {
                let start = *offset;
                *offset += field.count;
                Some(start)
            })
            .collect();

        let mut tracker = ctx.tracker(Stage::Read, n as u64);
        match header.data_format {
            PcdDataFormat::Ascii => {
                let mut line = String::new();
                let mut read = 0;
                while read < n {
                    line.clear();
                    if reader.read_line(&mut line)? == 0 {
                        return Err(invalid(format!("expected {} points, found {}", n, read)));
                    }
                    let tokens: Vec<&str> = line.split_whitespace().collect();
                    if tokens.is_empty() {
                        continue;
                    }
                    for column in &mut columns {
                        let field = &header.fields[column.field];
                        let token = tokens
                            .get(token_offsets[column.field])
                            .ok_or_else(|| invalid("not enough values in ASCII PCD line"))?;
                        let value = if Some(column.field) == packed_field {
                            match field.field_type {
                                ScalarType::F32 => token
                                    .parse::<f32>()
                                    .map(|v| v.to_bits() as f64)
                                    .map_err(|_| invalid(format!("invalid rgb value: {}", token)))?,
                                _ => token
                                    .parse::<u32>()
                                    .map(|v| v as f64)
                                    .map_err(|_| invalid(format!("invalid rgb value: {}", token)))?,
                            }
                        } else {
                            token
                                .parse::<f64>()
                                .map_err(|_| invalid(format!("invalid {} value: {}", field.name, token)))?
                        };
                        column.values.push(value);
                    }
                    read += 1;
                    tracker.update(read as u64);
                }
            }
            PcdDataFormat::Binary | PcdDataFormat::BinaryCompressed => {
                let mut record = vec![0u8; header.record_size()];
                for read in 0..n {
                    reader.read_exact(&mut record)?;
                    for column in &mut columns {
                        let field = &header.fields[column.field];
                        let bytes = &record[offsets[column.field]..];
                        let value = if Some(column.field) == packed_field {
                            packed_bits(field.field_type, bytes) as f64
                        } else {
                            decode_le(field.field_type, bytes)
                        };
                        column.values.push(value);
                    }
                    tracker.update(read as u64 + 1);
                }
            }
        }
        tracker.finish();

        let typed = |column: &Column| {
            ScalarArray::from_f64_values(header.fields[column.field].field_type, &column.values)
        };
        let mut columns = columns.iter();
        let mut next = || columns.next();

        let (x, y, z) = match (next(), next(), next()) {
            (Some(x), Some(y), Some(z)) => (typed(x), typed(y), typed(z)),
            _ => return Err(invalid("no x/y/z fields")),
        };
        let points = ScalarArray::stack3(x, y, z)?;

        let colors = if split_colors {
            match (next(), next(), next()) {
                (Some(r), Some(g), Some(b)) => Some(ScalarArray::stack3(typed(r), typed(g), typed(b))?),
                _ => None,
            }
        } else {
            None
        };
        let intensities = if mapping.is_resolved(Role::Intensity) {
            next().map(typed)
        } else {
            None
        };
        let colors = match (colors, packed_field) {
            (Some(colors), _) => Some(colors),
            (None, Some(_)) => next().map(|column| {
                let channels: Vec<u8> = column
                    .values
                    .iter()
                    .flat_map(|&bits| unpack_rgb(bits as u32))
                    .collect();
                ScalarArray::from(channels)
            }),
            (None, None) => None,
        };

        log::info!("read {} points from {}", n, path.display());
        Ok(PointCloudModel::with_defaults(points, colors, intensities, &defaults)?)
    }

    fn encode(&self, mut model: PointCloudModel, path: &Path, ctx: &mut CodecContext<'_>) -> Result<()> {
        let options = &self.options;
        if options.data_format == PcdDataFormat::BinaryCompressed {
            return Err(CodecError::Unsupported(
                "writing binary_compressed PCD payloads is not supported".to_string(),
            ));
        }

        let n = model.len();
        let packed = options.color_layout == PcdColorLayout::Packed;
        if packed {
            model.convert_colors(ScalarType::U8, true);
        }

        let point_type = model.points().scalar_type();
        let color_type = model.colors().scalar_type();
        let intensity_type = model.intensities().scalar_type();

        let mut fields: Vec<(&str, ScalarType)> =
            vec![("x", point_type), ("y", point_type), ("z", point_type)];
        if packed {
            fields.push(("rgb", ScalarType::F32));
        } else {
            fields.extend([("r", color_type), ("g", color_type), ("b", color_type)]);
        }
        fields.push(("intensity", intensity_type));

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let viewpoint = options.viewpoint.unwrap_or([0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
        let join = |values: Vec<String>| values.join(" ");
        writeln!(writer, "# .PCD v{} - Point Cloud Data file format", options.version)?;
        writeln!(writer, "VERSION {}", options.version)?;
        writeln!(writer, "FIELDS {}", join(fields.iter().map(|(name, _)| name.to_string()).collect()))?;
        writeln!(writer, "SIZE {}", join(fields.iter().map(|(_, ty)| ty.size_bytes().to_string()).collect()))?;
        writeln!(writer, "TYPE {}", join(fields.iter().map(|(_, ty)| type_code(*ty).to_string()).collect()))?;
        writeln!(writer, "COUNT {}", join(fields.iter().map(|_| "1".to_string()).collect()))?;
        writeln!(writer, "WIDTH {}", n)?;
        writeln!(writer, "HEIGHT 1")?;
        writeln!(writer, "VIEWPOINT {}", join(viewpoint.iter().map(|v| v.to_string()).collect()))?;
        writeln!(writer, "POINTS {}", n)?;
        writeln!(writer, "DATA {}", options.data_format.keyword())?;

        let missing = || CodecError::Core(cloudconv_core::Error::InvalidData("point index out of range".to_string()));
        let mut tracker = ctx.tracker(Stage::Write, n as u64);
        for i in 0..n {
            let mut values: Vec<ScalarValue> = Vec::with_capacity(fields.len());
            for axis in 0..3 {
                values.push(model.points().get(i * 3 + axis).ok_or_else(missing)?);
            }
            if packed {
                let channel = |c: usize| -> Result<u8> {
                    Ok(model.colors().get_f64(i * 3 + c).ok_or_else(missing)? as u8)
                };
                let bits = pack_rgb(channel(0)?, channel(1)?, channel(2)?);
                values.push(ScalarValue::F32(f32::from_bits(bits)));
            } else {
                for c in 0..3 {
                    values.push(model.colors().get(i * 3 + c).ok_or_else(missing)?);
                }
            }
            values.push(model.intensities().get(i).ok_or_else(missing)?);

            match options.data_format {
                PcdDataFormat::Ascii => {
                    let tokens: Vec<String> = values
                        .iter()
                        .map(|value| match value {
                            // Packed colors are tiny denormals, keep them exact
                            ScalarValue::F32(v) if packed && v.to_bits() <= 0x00ff_ffff => format!("{:e}", v),
                            other => other.to_string(),
                        })
                        .collect();
                    writeln!(writer, "{}", tokens.join(" "))?;
                }
                _ => {
                    for value in &values {
                        value.write_le(&mut writer)?;
                    }
                }
            }
            tracker.update(i as u64 + 1);
        }
        writer.flush()?;
        tracker.finish();

        log::info!("wrote {} points to {}", n, path.display());
        Ok(())
    }
}
