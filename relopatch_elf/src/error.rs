use std::convert::Infallible;
use std::fmt::{self, Display};

use relopatch::extract::ExtractError;
use relopatch::EncodeError;

/// An error which may occur while turning an ELF file into a patch stream.
#[derive(Debug)]
#[non_exhaustive]
pub enum ElfError {
    /// goblin couldn't parse the file.
    Parse(goblin::error::Error),
    /// A section's contents aren't present in the file.
    MissingSectionData {
        /// Section name.
        name: String,
    },
    /// A section doesn't fit in the 32-bit address space.
    AddressOutOfRange {
        /// Section name.
        name: String,
    },
    /// The loadable sections span more than 4 GiB.
    ImageTooLarge {
        /// Distance between the lowest and highest load address.
        size: u64,
    },
    /// Marker sections couldn't be resolved.
    Extract(ExtractError),
    /// The image couldn't be encoded.
    Encode(EncodeError<Infallible>),
}

impl From<goblin::error::Error> for ElfError {
    fn from(e: goblin::error::Error) -> Self {
        ElfError::Parse(e)
    }
}

impl From<ExtractError> for ElfError {
    fn from(e: ExtractError) -> Self {
        ElfError::Extract(e)
    }
}

impl From<EncodeError<Infallible>> for ElfError {
    fn from(e: EncodeError<Infallible>) -> Self {
        ElfError::Encode(e)
    }
}

impl Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::ElfError::*;
        match self {
            Parse(e) => write!(f, "Failed to parse ELF file: {}", e),
            MissingSectionData { name } => write!(f, "Contents of section {:?} are missing from the file.", name),
            AddressOutOfRange { name } => write!(f, "Section {:?} lies outside the 32-bit address space.", name),
            ImageTooLarge { size } => write!(f, "Loadable sections span {:#x} bytes, which is too large for an image.", size),
            Extract(e) => write!(f, "{}", e),
            Encode(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ElfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ElfError::Parse(e) => Some(e),
            ElfError::Extract(e) => Some(e),
            ElfError::Encode(e) => Some(e),
            _ => None,
        }
    }
}
