use core::fmt::{self, Display};

use crate::protocol::MAX_COUNT;

use super::Encoder;

/// An error which may occur when building an [`Encoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderBuilderError {
    /// `max_units` must be at least 1.
    ZeroMaxUnits,
}

impl Display for EncoderBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::EncoderBuilderError::*;
        match self {
            ZeroMaxUnits => write!(f, "`max_units` must be at least 1."),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EncoderBuilderError {}

#[cfg(all(feature = "core_error", not(feature = "std")))]
impl core::error::Error for EncoderBuilderError {}

/// Helper to construct and customize an [`Encoder`].
#[derive(Debug, Clone)]
pub struct EncoderBuilder {
    max_units: Option<usize>,
    terminate: bool,
}

impl EncoderBuilder {
    /// Create a new `EncoderBuilder` with default settings.
    pub fn new() -> EncoderBuilder {
        EncoderBuilder {
            max_units: None,
            terminate: true,
        }
    }

    /// Maximum number of units (bytes, words or instruction pairs) per
    /// command. Defaults to 1024.
    ///
    /// The loader's command buffer must hold the largest command in the
    /// stream, so this should be picked with the loader's buffer size in mind.
    /// Values above the wire format's limit of 65535 are clamped.
    pub fn max_units(mut self, max_units: usize) -> Self {
        self.max_units = Some(max_units);
        self
    }

    /// Whether to end the stream with an `'E'` record. Defaults to `true`.
    ///
    /// The end marker may be left out if the loader knows the stream's length
    /// by other means.
    pub fn terminate(mut self, terminate: bool) -> Self {
        self.terminate = terminate;
        self
    }

    /// Build the Encoder, returning an error if something went wrong.
    pub fn build(self) -> Result<Encoder, EncoderBuilderError> {
        let max_units = match self.max_units {
            Some(0) => return Err(EncoderBuilderError::ZeroMaxUnits),
            Some(n) => n.min(MAX_COUNT),
            None => 1024,
        };

        Ok(Encoder {
            max_units,
            terminate: self.terminate,
        })
    }
}

impl Default for EncoderBuilder {
    fn default() -> Self {
        EncoderBuilder::new()
    }
}
