use core::fmt::{self, Debug, Display};

/// An error which may occur while applying a patch stream.
///
/// All errors are fatal: the applier refuses any further input (see
/// [`ApplyError::Poisoned`]), and whatever was already written to the target
/// must not be treated as a usable image. Stream offsets count bytes from the
/// start of the stream, and point at the first byte of the offending record.
///
/// A record's length is checked against the command buffer as soon as its
/// header is complete, before any of its payload is read. A record whose
/// declared payload is larger than the buffer is therefore always reported as
/// [`ApplyError::CommandBufferOverflow`], even if the stream would later have
/// ended short of it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ApplyError<T> {
    /// Unknown (or disabled) record tag, or the stream ended inside a record
    /// header.
    MalformedCommand {
        /// Stream offset of the record.
        offset: usize,
        /// The record's tag byte.
        tag: u8,
    },
    /// The stream ended before the record's declared payload did. Only
    /// reported for records which fit in the command buffer.
    StreamLengthMismatch {
        /// Stream offset of the record.
        offset: usize,
        /// Declared payload length, in bytes.
        declared: usize,
        /// Payload bytes actually received.
        received: usize,
    },
    /// The record's payload doesn't fit in the command buffer. Takes
    /// precedence over [`ApplyError::StreamLengthMismatch`].
    CommandBufferOverflow {
        /// Stream offset of the record.
        offset: usize,
        /// Declared payload length, in bytes.
        needed: usize,
        /// Size of the command buffer.
        capacity: usize,
    },
    /// A split-immediate record holds something other than `MOVW`/`MOVT`
    /// pairs.
    InvalidSplitImmediate {
        /// Stream offset of the record.
        offset: usize,
        /// Image offset of the offending pair.
        image_offset: usize,
    },
    /// The stream ended without an `'E'` record, which the applier was
    /// configured to require.
    MissingEnd {
        /// Total length of the stream.
        offset: usize,
    },
    /// More bytes arrived after the `'E'` record.
    DataAfterEnd {
        /// Stream offset of the first trailing byte.
        offset: usize,
    },
    /// A previous error aborted the stream.
    Poisoned,
    /// The target returned an error while writing.
    TargetError(T),
}

impl<T> ApplyError<T> {
    /// The stream offset associated with the error, if any.
    pub fn offset(&self) -> Option<usize> {
        use self::ApplyError::*;
        match *self {
            MalformedCommand { offset, .. }
            | StreamLengthMismatch { offset, .. }
            | CommandBufferOverflow { offset, .. }
            | InvalidSplitImmediate { offset, .. }
            | MissingEnd { offset }
            | DataAfterEnd { offset } => Some(offset),
            Poisoned | TargetError(_) => None,
        }
    }
}

impl<T> Display for ApplyError<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::ApplyError::*;
        match self {
            MalformedCommand { offset, tag } => write!(f, "Malformed command {:#04x} at stream offset {}.", tag, offset),
            StreamLengthMismatch { offset, declared, received } => write!(f, "Command at stream offset {} declares {} bytes, but the stream ended after {}.", offset, declared, received),
            CommandBufferOverflow { offset, needed, capacity } => write!(f, "Command at stream offset {} needs {} bytes, but the command buffer only holds {}.", offset, needed, capacity),
            InvalidSplitImmediate { offset, image_offset } => write!(f, "Command at stream offset {} holds a bad MOVW/MOVT pair at image offset {:#x}.", offset, image_offset),
            MissingEnd { offset } => write!(f, "Stream ended at offset {} without an end marker.", offset),
            DataAfterEnd { offset } => write!(f, "Unexpected data after the end marker at stream offset {}.", offset),
            Poisoned => write!(f, "Stream was already aborted by a previous error."),
            TargetError(e) => write!(f, "Target threw a fatal error: {:?}", e),
        }
    }
}

#[cfg(feature = "std")]
impl<T> std::error::Error for ApplyError<T> where T: Debug {}

#[cfg(all(feature = "core_error", not(feature = "std")))]
impl<T> core::error::Error for ApplyError<T> where T: Debug {}

/// An error which may occur while applying a patch stream pulled from a
/// [`Connection`](crate::conn::Connection).
#[derive(Debug)]
pub enum LoadError<T, C> {
    /// Connection error while reading the stream.
    ConnectionRead(C),
    /// The stream itself was rejected.
    Apply(ApplyError<T>),
}

impl<T, C> From<ApplyError<T>> for LoadError<T, C> {
    fn from(e: ApplyError<T>) -> Self {
        LoadError::Apply(e)
    }
}

impl<T, C> Display for LoadError<T, C>
where
    T: Debug,
    C: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::ConnectionRead(e) => write!(f, "Connection error while reading stream: {:?}", e),
            LoadError::Apply(e) => Display::fmt(e, f),
        }
    }
}

#[cfg(feature = "std")]
impl<T, C> std::error::Error for LoadError<T, C>
where
    T: Debug,
    C: Debug,
{
}

#[cfg(all(feature = "core_error", not(feature = "std")))]
impl<T, C> core::error::Error for LoadError<T, C>
where
    T: Debug,
    C: Debug,
{
}
