//! SPM binary container.
//!
//! Version 2 layout, all values little-endian:
//!
//! ```text
//! magic "SPM\x1a" | version u16 | flags u16
//! body (zlib when flags bit 0 is set):
//!   mesh bounds 6 x f32
//!   materials section | skeleton section | sub-mesh section | animation section
//! ```
//!
//! Every section starts with its byte length (u32) followed by an element
//! count. See [`format`] for the constants and [`writer`] / [`reader`] for
//! the record layouts.

pub mod compression;
pub mod format;
pub mod reader;
pub mod writer;

pub use reader::{decode, read_file, DecodeStage, Decoder};
pub use writer::{encode, write_file, EncodeOptions};
