//! Compression method vocabulary.

use std::str::FromStr;

use derive_more::Display;
use thiserror::Error;

/// The compression method recorded on a stored row and selected for new
/// writes through the `compression` metadata key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Default)]
pub enum Compression {
    #[default]
    #[display("none")]
    None,
    #[display("zlib")]
    Zlib,
    #[display("zstd")]
    Zstd,
}

impl Compression {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Zlib => "zlib",
            Compression::Zstd => "zstd",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[error("unsupported compression method '{0}'")]
pub struct UnknownCompression(pub String);

impl FromStr for Compression {
    type Err = UnknownCompression;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Compression::None),
            "zlib" => Ok(Compression::Zlib),
            "zstd" => Ok(Compression::Zstd),
            _ => Err(UnknownCompression(s.to_owned())),
        }
    }
}
