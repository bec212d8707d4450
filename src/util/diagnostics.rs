//! Non-fatal diagnostics collected while importing or exporting.
//!
//! Stages running on the rayon pool report into a shared [`Diagnostics`]
//! sink; the caller receives the list with the successful result and decides
//! whether any of it should be treated as a failure.

use std::fmt;
use std::path::PathBuf;

use parking_lot::Mutex;

/// A recoverable problem encountered by the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    /// A material texture could not be found by the texture resolver.
    MissingTexture {
        material: usize,
        texture: String,
        searched: Vec<PathBuf>,
    },
    /// A vertex received no tangent contribution; an arbitrary tangent
    /// orthogonal to its normal was used instead.
    DegenerateTangentBasis { sub_mesh: usize, vertex: usize },
}

impl Diagnostic {
    /// Short machine-friendly kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingTexture { .. } => "missing-texture",
            Self::DegenerateTangentBasis { .. } => "degenerate-tangent-basis",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTexture { material, texture, searched } => {
                write!(f, "material {material}: texture '{texture}' not found")?;
                if !searched.is_empty() {
                    write!(f, " (searched {} location(s))", searched.len())?;
                }
                Ok(())
            }
            Self::DegenerateTangentBasis { sub_mesh, vertex } => {
                write!(f, "sub-mesh {sub_mesh}: vertex {vertex} has no tangent basis, using fallback")
            }
        }
    }
}

/// Thread-safe diagnostics sink.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one diagnostic and log it as a warning.
    pub fn push(&self, diagnostic: Diagnostic) {
        tracing::warn!(kind = diagnostic.kind(), "{diagnostic}");
        self.items.lock().push(diagnostic);
    }

    /// Record several diagnostics at once.
    pub fn extend(&self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for d in diagnostics {
            self.push(d);
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Consume the sink and return the diagnostics in insertion order.
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items.into_inner()
    }
}
