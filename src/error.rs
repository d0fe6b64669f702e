use std::path::PathBuf;
use thiserror::Error;

/// Main player error type
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Container error: {0}")]
    Parse(#[from] ParseError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Command parse error: {0}")]
    Cli(#[from] crate::cli::CommandParseError),
}

impl PlayerError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            PlayerError::Parse(err) => err.user_message(),
            PlayerError::Decode(err) => format!("Playback read failed: {}", err),
            PlayerError::Audio(err) => err.user_message(),
            PlayerError::Config(err) => format!("Configuration problem: {}", err),
            PlayerError::File(err) => format!("File system error: {}", err),
            PlayerError::Cli(err) => format!("Command error: {}", err),
        }
    }

    /// Get error severity level for logging
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // A bad file is never fatal to the process; playlists skip it
            PlayerError::Parse(_) => ErrorSeverity::Warning,
            PlayerError::Decode(_) => ErrorSeverity::Error,
            PlayerError::Audio(AudioError::SinkUnavailable(_)) => ErrorSeverity::Critical,
            PlayerError::Audio(_) => ErrorSeverity::Error,
            PlayerError::Config(_) => ErrorSeverity::Warning,
            PlayerError::File(_) => ErrorSeverity::Error,
            PlayerError::Cli(_) => ErrorSeverity::Info,
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error | ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Container parsing errors. All of these are fatal to the file being
/// opened, never to the process; the open path guarantees the file handle
/// is released before the error is returned.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed container: {reason}")]
    Format { reason: &'static str },

    #[error("Reference out of bounds: {field}")]
    Bounds { field: &'static str },

    #[error("Unsupported encoding code: {code}")]
    UnsupportedEncoding { code: u8 },

    #[error("Declared size of {field} is unreasonably large: {size} bytes")]
    Oversized { field: &'static str, size: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    pub fn user_message(&self) -> String {
        match self {
            ParseError::Format { reason } => {
                format!("The file is not a valid CWAV/HWAV container ({})", reason)
            }
            ParseError::Bounds { field } => {
                format!("The file is corrupt: {} points outside the file", field)
            }
            ParseError::UnsupportedEncoding { code } => {
                format!("The file uses an unsupported sample encoding (code {})", code)
            }
            ParseError::Oversized { field, size } => {
                format!("The file declares an oversized {} ({} bytes)", field, size)
            }
            ParseError::Io(err) => format!("Could not read the file: {}", err),
        }
    }
}

/// Errors produced while pulling decoded samples from an open container
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("I/O error in sample region: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio output and playback-engine errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Audio initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl AudioError {
    pub fn user_message(&self) -> String {
        match self {
            AudioError::SinkUnavailable(msg) => {
                format!("The audio output device is not available: {}", msg)
            }
            AudioError::StreamError(msg) => format!("Audio playback interrupted: {}", msg),
            AudioError::InitializationFailed(msg) => {
                format!("Failed to initialize audio output: {}", msg)
            }
            AudioError::Decode(err) => format!("Playback read failed: {}", err),
        }
    }
}

/// Audio configuration file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config directory could not be determined")]
    ConfigDirNotFound,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Syntax error on line {line}: {reason}")]
    Syntax { line: usize, reason: String },

    #[error("Playlist \"{name}\" could not be populated ({path})")]
    Playlist { name: String, path: PathBuf },
}
