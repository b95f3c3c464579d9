use core::fmt::{self, Display};

use managed::ManagedSlice;

use crate::protocol::CommandSet;

use super::Applier;

/// Default command buffer size when none is given. Fits the largest command a
/// default [`Encoder`](crate::Encoder) emits: 1024 split-immediate pairs.
pub const DEFAULT_COMMAND_BUFFER_SIZE: usize = 8192;

/// An error which may occur when building an [`Applier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplierBuilderError {
    /// Must provide buffer using `with_command_buffer` in `#![no_std]` mode.
    MissingCommandBuffer,
    /// Custom command buffer size is larger than the provided buffer's length.
    CommandBufferSizeMismatch,
}

impl Display for ApplierBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::ApplierBuilderError::*;
        match self {
            MissingCommandBuffer => write!(
                f,
                "Must provide buffer using `with_command_buffer` in `#![no_std]` mode."
            ),
            CommandBufferSizeMismatch => write!(
                f,
                "`command_buffer_size` is larger than `with_command_buffer`'s size."
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ApplierBuilderError {}

#[cfg(all(feature = "core_error", not(feature = "std")))]
impl core::error::Error for ApplierBuilderError {}

/// Helper to construct and customize an [`Applier`].
pub struct ApplierBuilder<'a> {
    offset: u32,
    command_buffer: Option<&'a mut [u8]>,
    command_buffer_size: Option<usize>,
    accept: CommandSet,
    require_end: bool,
}

impl<'a> ApplierBuilder<'a> {
    /// Create a new `ApplierBuilder` which relocates by `offset`.
    pub fn new(offset: u32) -> ApplierBuilder<'static> {
        ApplierBuilder {
            offset,
            command_buffer: None,
            command_buffer_size: None,
            accept: CommandSet::default(),
            require_end: false,
        }
    }

    /// Use a pre-allocated command buffer (instead of heap-allocating).
    ///
    /// The buffer must hold the largest command payload in the stream.
    ///
    /// _Note:_ This method is _required_ when the `alloc` feature is disabled!
    pub fn with_command_buffer<'b>(self, command_buffer: &'b mut [u8]) -> ApplierBuilder<'b> {
        ApplierBuilder {
            offset: self.offset,
            command_buffer: Some(command_buffer),
            command_buffer_size: self.command_buffer_size,
            accept: self.accept,
            require_end: self.require_end,
        }
    }

    /// Specify a custom size for the command buffer. Defaults to [`DEFAULT_COMMAND_BUFFER_SIZE`].
    ///
    /// When used alongside `with_command_buffer`, the provided `size` must be
    /// less than or equal to the length of the command buffer.
    pub fn command_buffer_size(mut self, size: usize) -> Self {
        self.command_buffer_size = Some(size);
        self
    }

    /// Restrict which optional commands are accepted. Defaults to all of them.
    pub fn accept(mut self, commands: CommandSet) -> Self {
        self.accept = commands;
        self
    }

    /// Reject streams which end without an `'E'` record. Defaults to `false`.
    pub fn require_end(mut self, require_end: bool) -> Self {
        self.require_end = require_end;
        self
    }

    /// Build the Applier, returning an error if something went wrong.
    pub fn build(self) -> Result<Applier<'a>, ApplierBuilderError> {
        let command_buffer = match self.command_buffer {
            Some(buf) => {
                let buf = match self.command_buffer_size {
                    Some(custom_len) => {
                        if custom_len > buf.len() {
                            return Err(ApplierBuilderError::CommandBufferSizeMismatch);
                        } else {
                            &mut buf[..custom_len]
                        }
                    }
                    None => buf,
                };
                ManagedSlice::Borrowed(buf)
            }
            None => {
                cfg_if::cfg_if! {
                    if #[cfg(feature = "alloc")] {
                        use alloc::vec;
                        let len = self
                            .command_buffer_size
                            .unwrap_or(DEFAULT_COMMAND_BUFFER_SIZE);
                        ManagedSlice::Owned(vec![0; len])
                    } else {
                        return Err(ApplierBuilderError::MissingCommandBuffer);
                    }
                }
            }
        };

        Ok(Applier::from_parts(
            self.offset,
            command_buffer,
            self.accept,
            self.require_end,
        ))
    }
}
