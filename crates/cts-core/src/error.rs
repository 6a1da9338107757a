/// Coarse classification of a [`CtsError`], used by the runner to decide
/// whether a case was skipped, failed, or hit an internal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotSupported,
    VerificationFailed,
    QualityWarning,
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum CtsError {
    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("quality warning: {0}")]
    QualityWarning(String),

    #[error("internal error: {0}")]
    Fatal(String),

    #[error("{call} failed: {result}")]
    Vulkan { call: &'static str, result: String },

    #[error("shader \"{name}\" failed to compile: {message}")]
    Shader { name: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CtsError {
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CtsError::NotSupported(_) => ErrorKind::NotSupported,
            CtsError::VerificationFailed(_) => ErrorKind::VerificationFailed,
            CtsError::QualityWarning(_) => ErrorKind::QualityWarning,
            CtsError::Fatal(_)
            | CtsError::Vulkan { .. }
            | CtsError::Shader { .. }
            | CtsError::Config(_)
            | CtsError::Io(_) => ErrorKind::Fatal,
        }
    }

    /// The bare message without the category prefix.
    pub fn message(&self) -> String {
        match self {
            CtsError::NotSupported(m)
            | CtsError::VerificationFailed(m)
            | CtsError::QualityWarning(m)
            | CtsError::Fatal(m)
            | CtsError::Config(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

/// Return `NotSupported` with the given message unless `cond` holds.
#[macro_export]
macro_rules! require {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::CtsError::NotSupported(format!($($arg)+)));
        }
    };
}
