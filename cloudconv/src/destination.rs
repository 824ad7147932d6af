//! Output path resolution from command-line arguments

use crate::error::{ConvertError, Result};
use cloudconv_io::{extension_of, normalize_extension, CodecRegistry};
use std::path::{Path, PathBuf};

/// Target name selecting Potree tree output
pub const POTREE_TARGET: &str = "potree";

/// Extension used when none is requested
pub const DEFAULT_EXTENSION: &str = ".las";

/// Where a conversion writes its result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A single file, encoded by the codec matching its extension
    File(PathBuf),
    /// A Potree output directory built by PotreeConverter
    Potree(PathBuf),
}

impl Destination {
    pub fn path(&self) -> &Path {
        match self {
            Destination::File(path) | Destination::Potree(path) => path,
        }
    }

    pub fn is_potree(&self) -> bool {
        matches!(self, Destination::Potree(_))
    }
}

/// Requested output target
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Extension(String),
    Potree,
}

fn parse_target(extension: Option<&str>, registry: &CodecRegistry) -> Result<Target> {
    let Some(extension) = extension else {
        log::info!("no target extension given, using {}", DEFAULT_EXTENSION);
        return Ok(Target::Extension(DEFAULT_EXTENSION.to_string()));
    };

    if extension.trim().eq_ignore_ascii_case(POTREE_TARGET) {
        return Ok(Target::Potree);
    }
    let normalized = normalize_extension(extension);
    if registry.supports(&normalized) {
        Ok(Target::Extension(normalized))
    } else {
        Err(ConvertError::UnsupportedDestination(format!(
            "unknown target extension {}, expected one of {:?} or {}",
            extension,
            registry.supported_extensions(),
            POTREE_TARGET
        )))
    }
}

fn has_supported_extension(path: &Path, registry: &CodecRegistry) -> bool {
    extension_of(path).is_some_and(|ext| registry.supports(&ext))
}

/// Resolve the output of converting `origin`.
///
/// - an existing destination file with a supported extension is used as is
///   and `extension` is ignored
/// - an existing destination directory receives `<stem><extension>`
/// - a destination that does not exist yet but has a supported extension is
///   used as is
/// - without a destination the output goes next to `origin`
///
/// A Potree target becomes the directory `<parent>/<stem>_potree`. Unless
/// `allow_overwrite` is set, an existing output path is an error.
pub fn resolve_destination(
    origin: &Path,
    destination: Option<&Path>,
    extension: Option<&str>,
    allow_overwrite: bool,
    registry: &CodecRegistry,
) -> Result<Destination> {
    if !origin.is_file() {
        return Err(ConvertError::InvalidArguments(format!(
            "origin {} is not a file",
            origin.display()
        )));
    }
    if !has_supported_extension(origin, registry) {
        return Err(ConvertError::InvalidArguments(format!(
            "origin {} does not have one of the extensions {:?}",
            origin.display(),
            registry.supported_extensions()
        )));
    }

    let stem = origin
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ConvertError::InvalidArguments(format!("origin {} has no file name", origin.display())))?;
    let origin_directory = origin.parent().unwrap_or_else(|| Path::new(""));

    let target = parse_target(extension, registry)?;
    let file_name = match &target {
        Target::Extension(ext) => format!("{}{}", stem, ext),
        Target::Potree => format!("{}_{}", stem, POTREE_TARGET),
    };

    let path = match destination {
        Some(dest) if dest.is_file() => {
            if !has_supported_extension(dest, registry) {
                return Err(ConvertError::UnsupportedDestination(format!(
                    "destination file {} has an unsupported extension",
                    dest.display()
                )));
            }
            if extension.is_some() {
                log::warn!(
                    "ignoring target extension, destination {} already names the format",
                    dest.display()
                );
            }
            dest.to_path_buf()
        }
        Some(dest) if dest.is_dir() => dest.join(&file_name),
        Some(dest) if has_supported_extension(dest, registry) => dest.to_path_buf(),
        Some(dest) => {
            return Err(ConvertError::UnsupportedDestination(format!(
                "{} is neither a directory nor a file with a supported extension",
                dest.display()
            )))
        }
        None => origin_directory.join(&file_name),
    };

    let resolved = match target {
        Target::Potree => {
            let parent = path.parent().unwrap_or_else(|| Path::new(""));
            Destination::Potree(parent.join(format!("{}_{}", stem, POTREE_TARGET)))
        }
        Target::Extension(_) => Destination::File(path),
    };

    if !allow_overwrite && resolved.path().exists() {
        return Err(ConvertError::InvalidArguments(format!(
            "{} already exists, pass --unsafe to overwrite",
            resolved.path().display()
        )));
    }

    log::debug!("resolved destination {:?}", resolved);
    Ok(resolved)
}
