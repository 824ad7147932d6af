//! Codec trait and extension-keyed codec registry
//!
//! Every supported format implements [`PointCloudCodec`]. The
//! [`CodecRegistry`] owns one instance per format and dispatches on the
//! lowercased file extension, so downstream code never needs to know which
//! codec handles a path.

use crate::error::{CodecError, Result};
use crate::{E57Codec, LasCodec, PcdCodec, PlyCodec, PtsCodec};
use cloudconv_core::{DefaultTypes, PointCloudModel, ProgressSink, ProgressTracker, Stage};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Per-call settings handed to a codec
pub struct CodecContext<'a> {
    /// Types produced for canonical attributes and used for missing ones
    pub defaults: DefaultTypes,
    pub progress: &'a mut dyn ProgressSink,
}

impl<'a> CodecContext<'a> {
    pub fn new(defaults: DefaultTypes, progress: &'a mut dyn ProgressSink) -> Self {
        Self { defaults, progress }
    }

    /// Whole-percent progress tracker for `total` items of `stage`
    pub fn tracker(&mut self, stage: Stage, total: u64) -> ProgressTracker<'_> {
        ProgressTracker::new(&mut *self.progress, stage, total)
    }
}

/// Decoder and encoder for one on-disk format
pub trait PointCloudCodec: Send + Sync {
    /// Short format name, e.g. `las`
    fn format_name(&self) -> &'static str;

    /// File extensions handled, with leading dot
    fn extensions(&self) -> &[&'static str];

    /// Signature at the start of a file of this format
    fn magic_bytes(&self) -> Option<&'static [u8]> {
        None
    }

    /// Read the file at `path` into a model
    fn decode(&self, path: &Path, ctx: &mut CodecContext<'_>) -> Result<PointCloudModel>;

    /// Write `model` to `path`. The model is consumed since encoders rewrite
    /// attribute types in place.
    fn encode(&self, model: PointCloudModel, path: &Path, ctx: &mut CodecContext<'_>) -> Result<()>;
}

/// Lowercase an extension and make sure it starts with a dot
pub fn normalize_extension(extension: &str) -> String {
    let lowered = extension.trim().to_lowercase();
    if lowered.starts_with('.') {
        lowered
    } else {
        format!(".{}", lowered)
    }
}

/// Normalized extension of `path`, if it has one
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(normalize_extension)
}

/// Largest number of items reserved up front from a count declared in a file
const MAX_RESERVED_ITEMS: u64 = 1 << 24;

/// Capacity to reserve for `declared` items stored in `available_bytes`,
/// each taking at least `min_item_bytes`. Header counts are untrusted, so the
/// hint never exceeds what the remaining bytes could hold.
pub(crate) fn capacity_hint(declared: u64, available_bytes: u64, min_item_bytes: u64) -> usize {
    let storable = available_bytes / min_item_bytes.max(1);
    usize::try_from(declared.min(storable).min(MAX_RESERVED_ITEMS)).unwrap_or(0)
}

/// Read up to 16 leading bytes of a file
fn read_signature(path: &Path) -> Option<Vec<u8>> {
    let mut file = File::open(path).ok()?;
    let mut header = [0u8; 16];
    let bytes_read = file.read(&mut header).ok()?;
    Some(header[..bytes_read].to_vec())
}

/// Static dispatch table from file extension to codec
pub struct CodecRegistry {
    codecs: Vec<Box<dyn PointCloudCodec>>,
    by_extension: HashMap<String, usize>,
}

impl CodecRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            codecs: Vec::new(),
            by_extension: HashMap::new(),
        }
    }

    /// Registry with every built-in codec
    pub fn with_default_codecs() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(E57Codec));
        registry.register(Box::new(LasCodec));
        registry.register(Box::new(PlyCodec::default()));
        registry.register(Box::new(PtsCodec::default()));
        registry.register(Box::new(PcdCodec::default()));
        registry
    }

    /// Register a codec for all of its extensions, replacing earlier
    /// registrations of the same extension
    pub fn register(&mut self, codec: Box<dyn PointCloudCodec>) {
        let index = self.codecs.len();
        for extension in codec.extensions() {
            self.by_extension.insert(normalize_extension(extension), index);
        }
        self.codecs.push(codec);
    }

    /// Codec registered for an extension (with or without leading dot)
    pub fn codec_for_extension(&self, extension: &str) -> Option<&dyn PointCloudCodec> {
        self.by_extension
            .get(&normalize_extension(extension))
            .and_then(|&index| self.codecs.get(index))
            .map(|codec| codec.as_ref())
    }

    /// Codec for a path, chosen by its extension
    pub fn codec_for_path(&self, path: &Path) -> Result<&dyn PointCloudCodec> {
        let extension = extension_of(path).ok_or_else(|| {
            CodecError::UnsupportedFormat(format!("{} has no file extension", path.display()))
        })?;

        self.codec_for_extension(&extension).ok_or_else(|| {
            let hint = self
                .detect_format(path)
                .map(|format| format!(" (content looks like {})", format))
                .unwrap_or_default();
            CodecError::UnsupportedFormat(format!("no codec for {}{}", extension, hint))
        })
    }

    /// Name of the format whose signature the file starts with
    pub fn detect_format(&self, path: &Path) -> Option<&'static str> {
        let signature = read_signature(path)?;
        self.codecs
            .iter()
            .find(|codec| {
                codec
                    .magic_bytes()
                    .is_some_and(|magic| signature.starts_with(magic))
            })
            .map(|codec| codec.format_name())
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.by_extension.contains_key(&normalize_extension(extension))
    }

    /// All registered extensions, sorted
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.by_extension.keys().cloned().collect();
        extensions.sort();
        extensions
    }

    /// Decode `path` with the codec matching its extension
    pub fn decode(&self, path: &Path, ctx: &mut CodecContext<'_>) -> Result<PointCloudModel> {
        let codec = self.codec_for_path(path)?;
        log::debug!("decoding {} as {}", path.display(), codec.format_name());
        codec.decode(path, ctx)
    }

    /// Encode `model` to `path` with the codec matching its extension
    pub fn encode(&self, model: PointCloudModel, path: &Path, ctx: &mut CodecContext<'_>) -> Result<()> {
        let codec = self.codec_for_path(path)?;
        log::debug!("encoding {} as {}", path.display(), codec.format_name());
        codec.encode(model, path, ctx)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_default_codecs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("LAS"), ".las");
        assert_eq!(normalize_extension(".Ply"), ".ply");
        assert_eq!(normalize_extension(" .e57 "), ".e57");
        assert_eq!(extension_of(Path::new("/data/Scan.PTS")), Some(".pts".to_string()));
        assert_eq!(extension_of(Path::new("/data/scan")), None);
    }

    #[test]
    fn test_default_registry_dispatch() {
        let registry = CodecRegistry::with_default_codecs();
        assert_eq!(registry.codec_for_extension(".las").unwrap().format_name(), "las");
        assert_eq!(registry.codec_for_extension("LAZ").unwrap().format_name(), "las");
        assert_eq!(registry.codec_for_extension(".e57").unwrap().format_name(), "e57");
        assert_eq!(registry.codec_for_extension(".ply").unwrap().format_name(), "ply");
        assert_eq!(registry.codec_for_extension(".pts").unwrap().format_name(), "pts");
        assert_eq!(registry.codec_for_extension(".pcd").unwrap().format_name(), "pcd");
        assert!(registry.codec_for_extension(".obj").is_none());

        assert_eq!(
            registry.supported_extensions(),
            vec![".e57", ".las", ".laz", ".pcd", ".ply", ".pts"]
        );
    }

    #[test]
    fn test_codec_for_path_errors() {
        let registry = CodecRegistry::with_default_codecs();
        assert!(matches!(
            registry.codec_for_path(Path::new("cloud.xyz")),
            Err(CodecError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            registry.codec_for_path(Path::new("cloud")),
            Err(CodecError::UnsupportedFormat(_))
        ));
        assert!(registry.codec_for_path(Path::new("CLOUD.PLY")).is_ok());
    }

    #[test]
    fn test_capacity_hint_is_bounded() {
        assert_eq!(capacity_hint(100, 10_000, 20), 100);
        assert_eq!(capacity_hint(u64::MAX, 600, 6), 100);
        assert_eq!(capacity_hint(1_000_000_000_000_000, 24, 1), 24);
        assert_eq!(capacity_hint(u64::MAX, u64::MAX, 1), MAX_RESERVED_ITEMS as usize);
        assert_eq!(capacity_hint(5, 100, 0), 5);
    }

    #[test]
    fn test_detect_format() {
        let registry = CodecRegistry::with_default_codecs();
        let dir = tempfile::tempdir().unwrap();
        let cases: [(&str, &[u8], Option<&str>); 5] = [
            ("a.bin", b"ply\nformat ascii 1.0\n", Some("ply")),
            ("b.bin", b"LASF\x00\x00\x00\x00", Some("las")),
            ("c.bin", b"ASTM-E57\x00\x00", Some("e57")),
            ("d.bin", b"# .PCD v0.7\n", Some("pcd")),
            ("e.bin", b"1 2 3\n", None),
        ];

        for (name, content, expected) in cases {
            let path = dir.path().join(name);
            fs::write(&path, content).unwrap();
            assert_eq!(registry.detect_format(&path), expected);
        }
    }
}
