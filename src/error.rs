use std::fmt;

/// Main error type for the rumor gossip membership library
#[derive(Debug)]
pub enum RumorError {
    /// Configuration, address, or CLI argument errors
    Config(String),

    /// Symmetric key has a length AES-GCM does not accept
    InvalidKey(usize),

    /// Transport layer errors
    Transport(String),

    /// Wire encoding/decoding errors
    Codec(CodecError),

    /// Sealing or opening an encrypted frame failed
    Crypto(String),

    /// Gossip engine lifecycle errors
    Gossip(String),

    /// System I/O errors
    Io(std::io::Error),
}

/// Wire codec errors
#[derive(Debug)]
pub enum CodecError {
    /// Binary encoding failed
    Encode(bincode::error::EncodeError),

    /// Bytes are not a well-formed message
    Decode(bincode::error::DecodeError),

    /// A well-formed message was followed by extra bytes
    TrailingBytes(usize),

    /// A node record carried an address that is not `ip:port`
    InvalidAddress(String),
}

impl fmt::Display for RumorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RumorError::Config(msg) => write!(f, "Configuration error: {}", msg),
            RumorError::InvalidKey(len) => write!(
                f,
                "Invalid key: {} bytes (expected 16, 24, or 32)",
                len
            ),
            RumorError::Transport(msg) => write!(f, "Transport error: {}", msg),
            RumorError::Codec(err) => write!(f, "Codec error: {}", err),
            RumorError::Crypto(msg) => write!(f, "Crypto error: {}", msg),
            RumorError::Gossip(msg) => write!(f, "Gossip error: {}", msg),
            RumorError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encode(err) => write!(f, "Encode: {}", err),
            CodecError::Decode(err) => write!(f, "Decode: {}", err),
            CodecError::TrailingBytes(count) => {
                write!(f, "Decode: {} trailing bytes after message", count)
            }
            CodecError::InvalidAddress(addr) => write!(f, "Invalid node address: {}", addr),
        }
    }
}

impl std::error::Error for RumorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RumorError::Io(err) => Some(err),
            RumorError::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Encode(err) => Some(err),
            CodecError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, RumorError>;

impl RumorError {
    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            RumorError::Config(_) => "configuration_error",
            RumorError::InvalidKey(_) => "invalid_key",
            RumorError::Transport(_) => "transport_error",
            RumorError::Codec(_) => "codec_error",
            RumorError::Crypto(_) => "crypto_error",
            RumorError::Gossip(_) => "gossip_error",
            RumorError::Io(_) => "io_error",
        }
    }
}

// Conversions from common error types
impl From<std::io::Error> for RumorError {
    fn from(err: std::io::Error) -> Self {
        RumorError::Io(err)
    }
}

impl From<CodecError> for RumorError {
    fn from(err: CodecError) -> Self {
        RumorError::Codec(err)
    }
}

impl From<bincode::error::EncodeError> for RumorError {
    fn from(err: bincode::error::EncodeError) -> Self {
        RumorError::Codec(CodecError::Encode(err))
    }
}

impl From<bincode::error::DecodeError> for RumorError {
    fn from(err: bincode::error::DecodeError) -> Self {
        RumorError::Codec(CodecError::Decode(err))
    }
}

impl From<aes_gcm::Error> for RumorError {
    fn from(_err: aes_gcm::Error) -> Self {
        // aead errors are opaque on purpose
        RumorError::Crypto("authentication failed".to_string())
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::RumorError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RumorError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::error::RumorError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RumorError::Transport(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! gossip_error {
    ($msg:expr) => {
        $crate::error::RumorError::Gossip($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RumorError::Gossip(format!($fmt, $($arg)*))
    };
}
