use thiserror::Error;

/// Failures of the band catalog. The public mutation path absorbs these and
/// logs them; they are only returned from the checked variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BandError {
    #[error("band index {index} out of range (catalog has {len} bands)")]
    OutOfRangeIndex { index: usize, len: usize },
}

/// Status returned by an effect unit instead of throwing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EffectError {
    #[error("effect hardware unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied attaching effect to session {session}")]
    PermissionDenied { session: i32 },
    #[error("effect has no band {0}")]
    InvalidBand(usize),
    #[error("effect already released")]
    Released,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("permission denied attaching capture to session {session}")]
    PermissionDenied { session: i32 },
    #[error("invalid capture session {0}")]
    InvalidSession(i32),
    #[error("capture unsupported: {0}")]
    Unsupported(String),
    #[error("capture source released")]
    Released,
}

/// Degraded analyzer paths. Never surfaced as `Err`; used to describe what
/// was substituted when logging.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisIssue {
    #[error("sub-bass bin window is degenerate, using fallback bins")]
    DegenerateFrequencyWindow,
    #[error("malformed capture buffer ({len} bytes), emitting zeros")]
    MalformedBuffer { len: usize },
}

pub type EffectResult<T> = Result<T, EffectError>;
