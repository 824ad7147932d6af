//! Point cloud codecs
//!
//! One codec per supported file format, each decoding into and encoding from
//! [`cloudconv_core::PointCloudModel`]. Codecs are looked up by file
//! extension through a [`CodecRegistry`].

pub mod e57;
pub mod error;
pub mod las;
pub mod pcd;
pub mod ply;
pub mod pts;
pub mod registry;

pub use crate::e57::E57Codec;
pub use crate::error::*;
pub use crate::las::LasCodec;
pub use crate::pcd::{PcdCodec, PcdColorLayout, PcdDataFormat, PcdWriteOptions};
pub use crate::ply::{PlyCodec, PlyEncoding, PlyWriteOptions};
pub use crate::pts::{PtsCodec, PtsWriteOptions};
pub use crate::registry::{
    extension_of, normalize_extension, CodecContext, CodecRegistry, PointCloudCodec,
};
