//! Utility types and functions for SPM.
//!
//! This module contains fundamental types used throughout the library:
//! - [`Error`] / [`Result`] - Fatal error handling
//! - [`Diagnostic`] / [`Diagnostics`] - Non-fatal warnings
//! - [`BBox3f`] / [`Transform`] - Math types, plus re-exports from glam

mod error;
mod diagnostics;
mod math;

pub use error::*;
pub use diagnostics::*;
pub use math::*;
