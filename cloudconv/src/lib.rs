//! Point cloud conversion driver
//!
//! Ties the codecs of [`cloudconv_io`] together: resolves where a conversion
//! writes to, decodes the source, encodes the destination and, for Potree
//! output, hands an intermediate LAS file to PotreeConverter.

pub mod destination;
pub mod driver;
pub mod error;
pub mod potree;
pub mod render;

pub use destination::{resolve_destination, Destination, DEFAULT_EXTENSION, POTREE_TARGET};
pub use driver::{ConversionDriver, ConversionReport};
pub use error::{ConvertError, Result};
pub use potree::{parse_progress_percent, PotreeConverter};
pub use render::{progress_for_verbosity, BarProgress, RawProgress};
