//! Decode-then-encode conversion pipeline

use crate::destination::Destination;
use crate::error::Result;
use crate::potree::PotreeConverter;
use cloudconv_core::{DefaultTypes, PointCloudModel, ProgressSink};
use cloudconv_io::{extension_of, CodecContext, CodecRegistry};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Outcome of one conversion
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionReport {
    /// Points decoded, `None` when the source went to PotreeConverter as is
    pub points: Option<usize>,
    pub read_elapsed: Duration,
    pub write_elapsed: Duration,
}

/// Converts a point cloud file into a [`Destination`]
pub struct ConversionDriver {
    registry: CodecRegistry,
    defaults: DefaultTypes,
    potree_path: Option<PathBuf>,
}

impl ConversionDriver {
    pub fn new(registry: CodecRegistry, defaults: DefaultTypes) -> Self {
        Self {
            registry,
            defaults,
            potree_path: None,
        }
    }

    /// Executable or directory to search for PotreeConverter
    pub fn with_potree_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.potree_path = Some(path.into());
        self
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    pub fn defaults(&self) -> &DefaultTypes {
        &self.defaults
    }

    /// Decode `source` with the codec matching its extension
    pub fn read(&self, source: &Path, progress: &mut dyn ProgressSink) -> Result<PointCloudModel> {
        let mut ctx = CodecContext::new(self.defaults, progress);
        Ok(self.registry.decode(source, &mut ctx)?)
    }

    /// Encode `model` to the file `target`
    pub fn write(&self, model: PointCloudModel, target: &Path, progress: &mut dyn ProgressSink) -> Result<()> {
        let mut ctx = CodecContext::new(self.defaults, progress);
        Ok(self.registry.encode(model, target, &mut ctx)?)
    }

    /// Convert `source` into `destination`
    pub fn convert(
        &self,
        source: &Path,
        destination: &Destination,
        progress: &mut dyn ProgressSink,
    ) -> Result<ConversionReport> {
        match destination {
            Destination::File(target) => self.convert_to_file(source, target, progress),
            Destination::Potree(target) => self.convert_to_potree(source, target, progress),
        }
    }

    fn convert_to_file(
        &self,
        source: &Path,
        target: &Path,
        progress: &mut dyn ProgressSink,
    ) -> Result<ConversionReport> {
        // Fail on an unknown target before spending time on the read
        self.registry.codec_for_path(target)?;

        let start = Instant::now();
        let model = self.read(source, progress)?;
        let read_elapsed = start.elapsed();
        let points = model.len();
        log::info!(
            "read {} points from {} in {:.3}s",
            points,
            source.display(),
            read_elapsed.as_secs_f64()
        );

        let start = Instant::now();
        self.write(model, target, progress)?;
        let write_elapsed = start.elapsed();
        log::info!("wrote {} in {:.3}s", target.display(), write_elapsed.as_secs_f64());

        Ok(ConversionReport {
            points: Some(points),
            read_elapsed,
            write_elapsed,
        })
    }

    fn convert_to_potree(
        &self,
        source: &Path,
        target: &Path,
        progress: &mut dyn ProgressSink,
    ) -> Result<ConversionReport> {
        let converter = PotreeConverter::locate(self.potree_path.as_deref())?;

        let is_las = matches!(extension_of(source).as_deref(), Some(".las") | Some(".laz"));
        if is_las {
            log::info!("passing {} to PotreeConverter directly", source.display());
            let start = Instant::now();
            converter.run(source, target, progress)?;
            return Ok(ConversionReport {
                points: None,
                read_elapsed: Duration::ZERO,
                write_elapsed: start.elapsed(),
            });
        }

        let start = Instant::now();
        let model = self.read(source, progress)?;
        let read_elapsed = start.elapsed();
        let points = model.len();
        log::info!("read {} points from {}", points, source.display());

        let start = Instant::now();
        // Removed when dropped, whichever way this function exits
        let intermediate = tempfile::Builder::new()
            .prefix("cloudconv-")
            .suffix(".las")
            .tempfile()?
            .into_temp_path();
        log::debug!("writing intermediate LAS {}", intermediate.display());
        self.write(model, &intermediate, progress)?;

        let outcome = converter.run(&intermediate, target, progress);
        if let Err(e) = intermediate.close() {
            log::warn!("could not remove intermediate LAS file: {}", e);
        }
        outcome?;

        let write_elapsed = start.elapsed();
        log::info!("wrote Potree tree {} in {:.3}s", target.display(), write_elapsed.as_secs_f64());

        Ok(ConversionReport {
            points: Some(points),
            read_elapsed,
            write_elapsed,
        })
    }
}

impl Default for ConversionDriver {
    fn default() -> Self {
        Self::new(CodecRegistry::with_default_codecs(), DefaultTypes::default())
    }
}
