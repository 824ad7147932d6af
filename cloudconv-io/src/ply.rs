//! PLY format support
//!
//! Coordinates keep the numeric type they have in the file. Integer color
//! and intensity properties are normalized to float `[0, 1]` on read.

use crate::error::{CodecError, Result};
use crate::registry::{CodecContext, PointCloudCodec};
use cloudconv_core::{
    convert, resolve_fields, PointCloudModel, Role, ScalarArray, ScalarType, ScalarValue, Stage,
};
use ply_rs::{
    parser::Parser,
    ply::{
        Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
        ScalarType as PlyScalarType,
    },
    writer::Writer,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Element written by the encoder
const VERTEX_ELEMENT: &str = "vertex";

/// Property names written by the encoder, in order
const PROPERTY_NAMES: [&str; 7] = ["x", "y", "z", "red", "green", "blue", "scalar_Intensity"];

/// PLY payload encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlyEncoding {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

impl From<PlyEncoding> for Encoding {
    fn from(encoding: PlyEncoding) -> Self {
        match encoding {
            PlyEncoding::Ascii => Encoding::Ascii,
            PlyEncoding::BinaryLittleEndian => Encoding::BinaryLittleEndian,
            PlyEncoding::BinaryBigEndian => Encoding::BinaryBigEndian,
        }
    }
}

/// PLY write options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlyWriteOptions {
    pub encoding: PlyEncoding,
    pub comments: Vec<String>,
}

impl Default for PlyWriteOptions {
    fn default() -> Self {
        Self {
            encoding: PlyEncoding::BinaryLittleEndian,
            comments: Vec::new(),
        }
    }
}

impl PlyWriteOptions {
    pub fn ascii() -> Self {
        Self::default().with_encoding(PlyEncoding::Ascii)
    }

    pub fn with_encoding(mut self, encoding: PlyEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comments.push(comment.into());
        self
    }
}

/// Codec for `.ply` files
#[derive(Debug, Clone, Default)]
pub struct PlyCodec {
    options: PlyWriteOptions,
}

impl PlyCodec {
    pub fn new(options: PlyWriteOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PlyWriteOptions {
        &self.options
    }
}

/// Scalar type of a PLY property definition. List properties have no
/// scalar equivalent.
fn property_scalar_type(name: &str, data_type: &PropertyType) -> Result<ScalarType> {
    match data_type {
        PropertyType::Scalar(scalar) => Ok(match scalar {
            PlyScalarType::Char => ScalarType::I8,
            PlyScalarType::UChar => ScalarType::U8,
            PlyScalarType::Short => ScalarType::I16,
            PlyScalarType::UShort => ScalarType::U16,
            PlyScalarType::Int => ScalarType::I32,
            PlyScalarType::UInt => ScalarType::U32,
            PlyScalarType::Float => ScalarType::F32,
            PlyScalarType::Double => ScalarType::F64,
        }),
        PropertyType::List(_, _) => Err(cloudconv_core::Error::UnsupportedType(format!(
            "list property '{}'",
            name
        ))
        .into()),
    }
}

/// PLY scalar type used to store `ty`. PLY has no 64-bit integers, those are
/// stored as doubles.
fn ply_scalar_type(ty: ScalarType) -> PlyScalarType {
    match ty {
        ScalarType::I8 => PlyScalarType::Char,
        ScalarType::U8 => PlyScalarType::UChar,
        ScalarType::I16 => PlyScalarType::Short,
        ScalarType::U16 => PlyScalarType::UShort,
        ScalarType::I32 => PlyScalarType::Int,
        ScalarType::U32 => PlyScalarType::UInt,
        ScalarType::F32 => PlyScalarType::Float,
        ScalarType::I64 | ScalarType::U64 | ScalarType::F64 => PlyScalarType::Double,
    }
}

fn to_property(value: ScalarValue) -> Property {
    match value {
        ScalarValue::I8(v) => Property::Char(v),
        ScalarValue::U8(v) => Property::UChar(v),
        ScalarValue::I16(v) => Property::Short(v),
        ScalarValue::U16(v) => Property::UShort(v),
        ScalarValue::I32(v) => Property::Int(v),
        ScalarValue::U32(v) => Property::UInt(v),
        ScalarValue::F32(v) => Property::Float(v),
        ScalarValue::I64(v) => Property::Double(v as f64),
        ScalarValue::U64(v) => Property::Double(v as f64),
        ScalarValue::F64(v) => Property::Double(v),
    }
}

fn property_to_f64(name: &str, property: &Property) -> Result<f64> {
    match *property {
        Property::Char(v) => Ok(v as f64),
        Property::UChar(v) => Ok(v as f64),
        Property::Short(v) => Ok(v as f64),
        Property::UShort(v) => Ok(v as f64),
        Property::Int(v) => Ok(v as f64),
        Property::UInt(v) => Ok(v as f64),
        Property::Float(v) => Ok(v as f64),
        Property::Double(v) => Ok(v),
        _ => Err(cloudconv_core::Error::UnsupportedType(format!("list property '{}'", name)).into()),
    }
}

/// Extract one property of every element as a typed column
fn column(elements: &[DefaultElement], name: &str, ty: ScalarType) -> Result<ScalarArray> {
    let values = elements
        .iter()
        .map(|element| {
            element
                .get(name)
                .ok_or_else(|| CodecError::malformed("ply", format!("element without property '{}'", name)))
                .and_then(|property| property_to_f64(name, property))
        })
        .collect::<Result<Vec<f64>>>()?;
    Ok(ScalarArray::from_f64_values(ty, &values))
}

/// Normalize integer attributes to float `[0, 1]`, keep float ones
fn normalize_attribute(array: ScalarArray) -> ScalarArray {
    if array.scalar_type().is_integer() {
        convert(array, ScalarType::F32, true)
    } else {
        array
    }
}

impl PointCloudCodec for PlyCodec {
    fn format_name(&self) -> &'static str {
        "ply"
    }

    fn extensions(&self) -> &[&'static str] {
        &[".ply"]
    }

    fn magic_bytes(&self) -> Option<&'static [u8]> {
        Some(b"ply")
    }

    fn decode(&self, path: &Path, ctx: &mut CodecContext<'_>) -> Result<PointCloudModel> {
        let defaults = ctx.defaults;
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let parser = Parser::<DefaultElement>::new();
        let ply = parser.read_ply(&mut reader)?;

        let element = ply
            .header
            .elements
            .get(VERTEX_ELEMENT)
            .or_else(|| ply.header.elements.values().next())
            .ok_or_else(|| CodecError::malformed("ply", "file declares no elements"))?;
        let elements = ply
            .payload
            .get(&element.name)
            .map(|elements| elements.as_slice())
            .unwrap_or(&[]);

        let names: Vec<&str> = element.properties.keys().map(|name| name.as_str()).collect();
        let mapping = resolve_fields(&names);
        if !mapping.has_all(&Role::COORDINATES) {
            return Err(CodecError::malformed(
                "ply",
                format!("element '{}' has no x/y/z properties", element.name),
            ));
        }

        let role_column = |role: Role| -> Result<Option<ScalarArray>> {
            let Some(name) = mapping.get(role) else {
                return Ok(None);
            };
            let data_type = element
                .properties
                .get(name)
                .map(|property| &property.data_type)
                .ok_or_else(|| CodecError::malformed("ply", format!("unknown property '{}'", name)))?;
            let ty = property_scalar_type(name, data_type)?;
            column(elements, name, ty).map(Some)
        };

        let mut tracker = ctx.tracker(Stage::Read, 7);
        let mut columns = Vec::with_capacity(7);
        for (done, role) in Role::ALL.iter().enumerate() {
            columns.push(role_column(*role)?);
            tracker.update(done as u64 + 1);
        }
        let mut columns = columns.into_iter();
        let mut next = || columns.next().flatten();
        let (x, y, z) = (next(), next(), next());
        let (r, g, b) = (next(), next(), next());
        let intensity = next();

        let points = match (x, y, z) {
            (Some(x), Some(y), Some(z)) => ScalarArray::stack3(x, y, z)?,
            _ => return Err(CodecError::malformed("ply", "missing coordinate column")),
        };
        let colors = match (r, g, b) {
            (Some(r), Some(g), Some(b)) => Some(normalize_attribute(ScalarArray::stack3(r, g, b)?)),
            _ => None,
        };
        let intensities = intensity.map(normalize_attribute);

        log::info!("read {} points from {}", elements.len(), path.display());
        Ok(PointCloudModel::with_defaults(points, colors, intensities, &defaults)?)
    }

    fn encode(&self, model: PointCloudModel, path: &Path, ctx: &mut CodecContext<'_>) -> Result<()> {
        let n = model.len();
        let types = [
            model.points().scalar_type(),
            model.colors().scalar_type(),
            model.intensities().scalar_type(),
        ];

        let mut ply = Ply::<DefaultElement>::new();
        ply.header.encoding = self.options.encoding.into();
        for comment in &self.options.comments {
            ply.header.comments.push(comment.clone());
        }

        let mut vertex_element = ElementDef::new(VERTEX_ELEMENT.to_string());
        vertex_element.count = n;
        for (index, name) in PROPERTY_NAMES.iter().enumerate() {
            let ty = types[(index / 3).min(2)];
            vertex_element.properties.add(PropertyDef::new(
                name.to_string(),
                PropertyType::Scalar(ply_scalar_type(ty)),
            ));
        }
        ply.header.elements.add(vertex_element);

        let mut tracker = ctx.tracker(Stage::Write, n as u64);
        let mut vertices = Vec::with_capacity(n);
        for i in 0..n {
            let values = [
                model.points().get(i * 3),
                model.points().get(i * 3 + 1),
                model.points().get(i * 3 + 2),
                model.colors().get(i * 3),
                model.colors().get(i * 3 + 1),
                model.colors().get(i * 3 + 2),
                model.intensities().get(i),
            ];

            let mut vertex = DefaultElement::new();
            for (name, value) in PROPERTY_NAMES.iter().zip(values) {
                let value = value.ok_or_else(|| {
                    CodecError::Core(cloudconv_core::Error::InvalidData(format!("point {} out of range", i)))
                })?;
                vertex.insert(name.to_string(), to_property(value));
            }
            vertices.push(vertex);
            tracker.update(i as u64 + 1);
        }
        ply.payload.insert(VERTEX_ELEMENT.to_string(), vertices);

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let writer_instance = Writer::new();
        writer_instance.write_ply(&mut writer, &mut ply)?;
        writer.flush()?;
        tracker.finish();

        log::info!("wrote {} points to {}", n, path.display());
        Ok(())
    }
}
