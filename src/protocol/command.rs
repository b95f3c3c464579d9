use core::fmt::{self, Debug, Display};

use crate::reloc::SiteKind;
use crate::target::Target;

/// Length of a record header: a tag byte followed by a LE `u16` unit count.
pub const HEADER_LEN: usize = 3;

/// Largest unit count a single record can carry.
pub const MAX_COUNT: usize = u16::MAX as usize;

/// The different kinds of records in a patch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `'D'`: literal bytes, copied verbatim.
    Data,
    /// `'A'`: 32-bit words, each adjusted by the runtime offset.
    Address,
    /// `'S'`: 8-byte Thumb-2 `MOVW`/`MOVT` pairs, whose combined immediate is
    /// adjusted by the runtime offset.
    SplitImmediate,
    /// `'O'`: 32-bit words, each replaced by the runtime offset.
    InjectOffset,
    /// `'E'`: end of stream. Carries no count and no payload.
    End,
}

impl CommandKind {
    /// The record's discriminator byte.
    pub fn tag(self) -> u8 {
        match self {
            CommandKind::Data => b'D',
            CommandKind::Address => b'A',
            CommandKind::SplitImmediate => b'S',
            CommandKind::InjectOffset => b'O',
            CommandKind::End => b'E',
        }
    }

    /// Look up a record kind by its discriminator byte.
    pub fn from_tag(tag: u8) -> Option<CommandKind> {
        let kind = match tag {
            b'D' => CommandKind::Data,
            b'A' => CommandKind::Address,
            b'S' => CommandKind::SplitImmediate,
            b'O' => CommandKind::InjectOffset,
            b'E' => CommandKind::End,
            _ => return None,
        };
        Some(kind)
    }

    /// Number of payload bytes per counted unit.
    pub fn unit_size(self) -> usize {
        match self {
            CommandKind::Data => 1,
            CommandKind::End => 0,
            _ => self.site_kind().map(SiteKind::width).unwrap_or(0),
        }
    }

    /// The relocation site kind carried by this record, if any.
    pub fn site_kind(self) -> Option<SiteKind> {
        match self {
            CommandKind::Address => Some(SiteKind::DirectWord),
            CommandKind::SplitImmediate => Some(SiteKind::SplitImmediate),
            CommandKind::InjectOffset => Some(SiteKind::InjectOffset),
            CommandKind::Data | CommandKind::End => None,
        }
    }
}

impl From<SiteKind> for CommandKind {
    fn from(kind: SiteKind) -> CommandKind {
        match kind {
            SiteKind::DirectWord => CommandKind::Address,
            SiteKind::SplitImmediate => CommandKind::SplitImmediate,
            SiteKind::InjectOffset => CommandKind::InjectOffset,
        }
    }
}

/// A single patch stream command.
///
/// Payloads borrow the image bytes they cover, so a command's payload length
/// is also the number of image bytes it spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Emit `bytes` unchanged.
    Data(&'a [u8]),
    /// Add the runtime offset to each LE word.
    Address(&'a [u8]),
    /// Add the runtime offset to each `MOVW`/`MOVT` pair.
    SplitImmediate(&'a [u8]),
    /// Replace each LE word with the runtime offset.
    InjectOffset(&'a [u8]),
    /// End of stream.
    End,
}

impl<'a> Command<'a> {
    /// Build a command of the given kind around `payload`.
    ///
    /// Returns `None` if the payload isn't a whole number of units, or holds
    /// more than [`MAX_COUNT`] units.
    pub fn new(kind: CommandKind, payload: &'a [u8]) -> Option<Command<'a>> {
        if kind == CommandKind::End {
            return if payload.is_empty() {
                Some(Command::End)
            } else {
                None
            };
        }

        if !payload_fits(kind, payload.len()) {
            return None;
        }

        let cmd = match kind {
            CommandKind::Data => Command::Data(payload),
            CommandKind::Address => Command::Address(payload),
            CommandKind::SplitImmediate => Command::SplitImmediate(payload),
            CommandKind::InjectOffset => Command::InjectOffset(payload),
            CommandKind::End => Command::End,
        };
        Some(cmd)
    }

    /// The command's kind.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Data(_) => CommandKind::Data,
            Command::Address(_) => CommandKind::Address,
            Command::SplitImmediate(_) => CommandKind::SplitImmediate,
            Command::InjectOffset(_) => CommandKind::InjectOffset,
            Command::End => CommandKind::End,
        }
    }

    /// The raw payload bytes.
    pub fn payload(&self) -> &'a [u8] {
        match *self {
            Command::Data(p)
            | Command::Address(p)
            | Command::SplitImmediate(p)
            | Command::InjectOffset(p) => p,
            Command::End => &[],
        }
    }

    /// Number of units (bytes, words or instruction pairs) in the payload.
    pub fn count(&self) -> usize {
        match self.kind().unit_size() {
            0 => 0,
            unit => self.payload().len() / unit,
        }
    }

    /// Number of image bytes covered by this command.
    pub fn span(&self) -> usize {
        self.payload().len()
    }

    /// Number of bytes this command occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        match self {
            Command::End => 1,
            _ => HEADER_LEN + self.span(),
        }
    }

    /// Serialize the command into `target`.
    ///
    /// Nothing is written if the payload isn't a whole number of units, or
    /// holds more than [`MAX_COUNT`] units.
    pub fn write_to<T: Target>(&self, target: &mut T) -> Result<(), WriteError<T::Error>> {
        let kind = self.kind();
        let len = self.payload().len();
        if !payload_fits(kind, len) {
            return Err(WriteError::InvalidPayload { kind, len });
        }
        self.write_unchecked(target).map_err(WriteError::Target)
    }

    /// Serialize a command whose payload is known to fit its header.
    pub(crate) fn write_unchecked<T: Target>(&self, target: &mut T) -> Result<(), T::Error> {
        target.write(self.kind().tag())?;
        if let Command::End = self {
            return Ok(());
        }

        target.write_all(&(self.count() as u16).to_le_bytes())?;
        target.write_all(self.payload())
    }
}

fn payload_fits(kind: CommandKind, len: usize) -> bool {
    match kind.unit_size() {
        0 => len == 0,
        unit => len % unit == 0 && len / unit <= MAX_COUNT,
    }
}

/// An error which may occur in [`Command::write_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError<E> {
    /// The payload can't be described by a record header.
    InvalidPayload {
        /// The command's kind.
        kind: CommandKind,
        /// Payload length, in bytes.
        len: usize,
    },
    /// The target returned an error while writing.
    Target(E),
}

impl<E> Display for WriteError<E>
where
    E: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::InvalidPayload { kind, len } => write!(
                f,
                "{} byte payload is not a valid {:?} record (at most {} units of {} bytes).",
                len,
                kind,
                MAX_COUNT,
                kind.unit_size()
            ),
            WriteError::Target(e) => write!(f, "Target error while writing record: {:?}", e),
        }
    }
}

#[cfg(feature = "std")]
impl<E> std::error::Error for WriteError<E> where E: Debug {}

#[cfg(all(feature = "core_error", not(feature = "std")))]
impl<E> core::error::Error for WriteError<E> where E: Debug {}
