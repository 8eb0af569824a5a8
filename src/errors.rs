use std::fmt;

/// Custom error types for the heatmap engine
#[derive(Debug, Clone)]
pub enum HeatmapError {
    /// File I/O operation failed
    IoError(String),
    /// PGN text could not be parsed at all
    ParseError(String),
    /// Configuration error (bad depth, zero threads, ...)
    ConfigurationError(String),
    /// Resource exhausted (disk space, temp directory, ...)
    ResourceExhausted(String),
    /// A cache file is structurally invalid
    CorruptCache {
        offset: u64,
        detail: String,
    },
    /// An ingestion run finished without a single usable game
    NoGamesIngested(String),
    /// Chained error with context
    ChainedError {
        source: Box<HeatmapError>,
        context: String,
    },
}

impl fmt::Display for HeatmapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeatmapError::IoError(msg) => write!(f, "I/O error: {}", msg),
            HeatmapError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            HeatmapError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            HeatmapError::ResourceExhausted(msg) => write!(f, "Resource exhausted: {}", msg),
            HeatmapError::CorruptCache { offset, detail } => {
                write!(f, "Corrupt cache file at byte {}: {}", offset, detail)
            }
            HeatmapError::NoGamesIngested(msg) => {
                write!(f, "No games ingested: {}", msg)
            }
            HeatmapError::ChainedError { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for HeatmapError {}

// Convenience type alias
pub type Result<T> = std::result::Result<T, HeatmapError>;

// Convert from common error types
impl From<std::io::Error> for HeatmapError {
    fn from(error: std::io::Error) -> Self {
        HeatmapError::IoError(error.to_string())
    }
}

impl From<serde_json::Error> for HeatmapError {
    fn from(error: serde_json::Error) -> Self {
        HeatmapError::IoError(format!("JSON serialization error: {}", error))
    }
}

// Helper macros for error creation
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::errors::HeatmapError::ConfigurationError($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::HeatmapError::ConfigurationError(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! resource_exhausted {
    ($msg:expr) => {
        $crate::errors::HeatmapError::ResourceExhausted($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::HeatmapError::ResourceExhausted(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! add_context {
    ($result:expr, $context:expr) => {
        $result.map_err(|e| $crate::errors::HeatmapError::ChainedError {
            source: Box::new(e),
            context: $context.to_string(),
        })
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = HeatmapError::ParseError("unterminated tag pair".to_string());
        assert_eq!(error.to_string(), "Parse error: unterminated tag pair");

        let error = HeatmapError::CorruptCache {
            offset: 128,
            detail: "negative child count".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Corrupt cache file at byte 128: negative child count"
        );
    }

    #[test]
    fn test_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let heatmap_error: HeatmapError = io_error.into();

        match heatmap_error {
            HeatmapError::IoError(msg) => assert!(msg.contains("file not found")),
            _ => panic!("Expected IoError"),
        }
    }

    #[test]
    fn test_error_macros() {
        let error = config_error!("max depth must be positive, got {}", 0);
        match error {
            HeatmapError::ConfigurationError(msg) => assert!(msg.contains("max depth")),
            _ => panic!("Expected ConfigurationError"),
        }
    }

    #[test]
    fn test_error_chaining() {
        let base: Result<()> = Err(resource_exhausted!("temp directory unavailable"));
        let chained = add_context!(base, "During chunked ingestion");

        match chained {
            Err(HeatmapError::ChainedError { source, context }) => {
                assert_eq!(context, "During chunked ingestion");
                match *source {
                    HeatmapError::ResourceExhausted(ref msg) => {
                        assert_eq!(msg, "temp directory unavailable")
                    }
                    _ => panic!("Expected ResourceExhausted in chain"),
                }
            }
            _ => panic!("Expected ChainedError"),
        }
    }
}
