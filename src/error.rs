use std::fmt;

/// Coarse failure category, matching the taxonomy every entity parser and
/// the type-encoding engine report against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiErrorKind {
    /// The target file could not be opened or isn't a Mach-O/fat-Mach-O image at all.
    Open,
    /// A seek/read against the content stream failed or landed outside the image.
    Read,
    /// A read ran past a list's declared bounds or a string had no terminator in range.
    Truncation,
    /// A type-encoding string did not match the expected grammar.
    EncodingSyntax,
    /// A parsed record violated a structural invariant (e.g. a masked pointer pointed outside any segment).
    Invariant,
}

/// Error type shared across the crate, in the single-struct-with-detail
/// shape the rest of this codebase uses for its own Mach-O errors.
#[derive(Debug, Clone)]
pub struct AbiError {
    pub kind: AbiErrorKind,
    pub detail: String,
}

impl AbiError {
    pub fn new(kind: AbiErrorKind, detail: impl Into<String>) -> Self {
        AbiError {
            kind,
            detail: detail.into(),
        }
    }

    pub fn open(detail: impl Into<String>) -> Self {
        Self::new(AbiErrorKind::Open, detail)
    }

    pub fn read(detail: impl Into<String>) -> Self {
        Self::new(AbiErrorKind::Read, detail)
    }

    pub fn truncation(detail: impl Into<String>) -> Self {
        Self::new(AbiErrorKind::Truncation, detail)
    }

    pub fn encoding_syntax(detail: impl Into<String>) -> Self {
        Self::new(AbiErrorKind::EncodingSyntax, detail)
    }

    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::new(AbiErrorKind::Invariant, detail)
    }
}

impl fmt::Display for AbiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for AbiError {}

impl From<std::io::Error> for AbiError {
    fn from(err: std::io::Error) -> Self {
        AbiError::read(err.to_string())
    }
}

pub type AbiResult<T> = Result<T, AbiError>;
