//! PDFR-prefixed error types with structured error codes.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, RedactError>;

/// Coarse failure class, deciding how far an error propagates.
///
/// Configuration errors stop a run before any page is touched, detection
/// errors skip one page, backend errors fail one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or unreadable configuration.
    Configuration,
    /// Per-page analysis failure.
    Detection,
    /// Opening, editing or writing a document.
    Backend,
    /// Threads, channels and panics.
    Runtime,
}

/// Top-level error type for the redactor.
#[derive(Debug, Error)]
pub enum RedactError {
    /// A value is out of range or inconsistent.
    #[error("[PDFR-1001] invalid configuration: {details}")]
    InvalidConfig {
        /// What is wrong.
        details: String,
    },

    /// An explicitly named config file does not exist.
    #[error("[PDFR-1002] missing configuration file: {path}")]
    MissingConfig {
        /// The path that was asked for.
        path: PathBuf,
    },

    /// The config file is not valid TOML for this model.
    #[error("[PDFR-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        /// Parser or source that failed.
        context: &'static str,
        /// Parser message.
        details: String,
    },

    /// A text pattern does not compile.
    #[error("[PDFR-1004] invalid pattern {pattern_id:?}: {details}")]
    InvalidPattern {
        /// Id of the offending rule.
        pattern_id: String,
        /// Compiler message.
        details: String,
    },

    /// A logo template image is missing, unreadable or uniform.
    #[error("[PDFR-1005] template {name:?} could not be loaded from {path}: {details}")]
    TemplateLoad {
        /// Template name.
        name: String,
        /// Image path.
        path: PathBuf,
        /// Why loading failed.
        details: String,
    },

    /// Detection could not run on one page.
    #[error("[PDFR-2001] detection failure on page {page}: {details}")]
    Detection {
        /// Zero-based page index.
        page: usize,
        /// What went wrong.
        details: String,
    },

    /// The document backend refused an operation.
    #[error("[PDFR-3001] document backend failure in {operation}: {details}")]
    Backend {
        /// Backend operation, e.g. `save`.
        operation: &'static str,
        /// What went wrong.
        details: String,
        /// Whether a retry may succeed.
        transient: bool,
    },

    /// Filesystem failure.
    #[error("[PDFR-3002] IO failure at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failed.
    #[error("[PDFR-3003] serialization failure in {context}: {details}")]
    Serialization {
        /// Serializer that failed.
        context: &'static str,
        /// Serializer message.
        details: String,
    },

    /// A worker or logger channel disconnected.
    #[error("[PDFR-3004] channel closed in component {component}")]
    ChannelClosed {
        /// Component that lost its peer.
        component: &'static str,
    },

    /// Anything else, including worker panics.
    #[error("[PDFR-3900] runtime failure: {details}")]
    Runtime {
        /// What went wrong.
        details: String,
    },
}

impl RedactError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "PDFR-1001",
            Self::MissingConfig { .. } => "PDFR-1002",
            Self::ConfigParse { .. } => "PDFR-1003",
            Self::InvalidPattern { .. } => "PDFR-1004",
            Self::TemplateLoad { .. } => "PDFR-1005",
            Self::Detection { .. } => "PDFR-2001",
            Self::Backend { .. } => "PDFR-3001",
            Self::Io { .. } => "PDFR-3002",
            Self::Serialization { .. } => "PDFR-3003",
            Self::ChannelClosed { .. } => "PDFR-3004",
            Self::Runtime { .. } => "PDFR-3900",
        }
    }

    /// Broad category used for routing and exit codes.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig { .. }
            | Self::MissingConfig { .. }
            | Self::ConfigParse { .. }
            | Self::InvalidPattern { .. }
            | Self::TemplateLoad { .. } => ErrorKind::Configuration,
            Self::Detection { .. } => ErrorKind::Detection,
            Self::Backend { .. } | Self::Io { .. } | Self::Serialization { .. } => {
                ErrorKind::Backend
            }
            Self::ChannelClosed { .. } | Self::Runtime { .. } => ErrorKind::Runtime,
        }
    }

    /// Whether a single retry might resolve the failure.
    ///
    /// Detection is deterministic, so only backend IO qualifies.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Backend {
                    transient: true,
                    ..
                }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for a non-transient backend failure.
    #[must_use]
    pub fn backend(operation: &'static str, details: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            details: details.into(),
            transient: false,
        }
    }

    /// Detection failure on `page`.
    #[must_use]
    pub fn detection(page: usize, details: impl Into<String>) -> Self {
        Self::Detection {
            page,
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for RedactError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for RedactError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<RedactError> {
        vec![
            RedactError::InvalidConfig {
                details: String::new(),
            },
            RedactError::MissingConfig {
                path: PathBuf::new(),
            },
            RedactError::ConfigParse {
                context: "",
                details: String::new(),
            },
            RedactError::InvalidPattern {
                pattern_id: String::new(),
                details: String::new(),
            },
            RedactError::TemplateLoad {
                name: String::new(),
                path: PathBuf::new(),
                details: String::new(),
            },
            RedactError::Detection {
                page: 0,
                details: String::new(),
            },
            RedactError::Backend {
                operation: "",
                details: String::new(),
                transient: false,
            },
            RedactError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            RedactError::Serialization {
                context: "",
                details: String::new(),
            },
            RedactError::ChannelClosed { component: "" },
            RedactError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = all_variants();
        let codes: Vec<&str> = errors.iter().map(RedactError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn display_includes_code() {
        for err in all_variants() {
            let msg = err.to_string();
            assert!(
                msg.contains(err.code()),
                "display should contain error code: {msg}"
            );
        }
    }

    #[test]
    fn kinds_follow_code_families() {
        for err in all_variants() {
            let expected = match &err.code()[5..6] {
                "1" => ErrorKind::Configuration,
                "2" => ErrorKind::Detection,
                _ => match err {
                    RedactError::ChannelClosed { .. } | RedactError::Runtime { .. } => {
                        ErrorKind::Runtime
                    }
                    _ => ErrorKind::Backend,
                },
            };
            assert_eq!(err.kind(), expected, "{}", err.code());
        }
    }

    #[test]
    fn only_transient_backend_and_io_are_retryable() {
        assert!(
            RedactError::Backend {
                operation: "apply_redaction",
                details: String::new(),
                transient: true,
            }
            .is_retryable()
        );
        assert!(RedactError::io("/tmp/x.json", std::io::Error::other("busy")).is_retryable());
        assert!(!RedactError::backend("open", "corrupt xref").is_retryable());
        assert!(!RedactError::detection(3, "empty raster").is_retryable());
        assert!(
            !RedactError::InvalidPattern {
                pattern_id: "p".to_string(),
                details: String::new(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: RedactError = toml_err.into();
        assert_eq!(err.code(), "PDFR-1003");
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: RedactError = json_err.into();
        assert_eq!(err.code(), "PDFR-3003");
    }
}
