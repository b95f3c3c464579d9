use core::fmt::{self, Debug, Display};

/// An error which may occur while encoding a patch stream.
///
/// Every variant except `Sink` names the image offset of the offending site.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EncodeError<E> {
    /// A site's bytes extend past the end of the image.
    SiteOutOfBounds {
        /// Offset of the site.
        offset: u32,
        /// Length of the image.
        image_len: usize,
    },
    /// Sites must be provided in ascending offset order.
    UnsortedSites {
        /// Offset of the first site which breaks the ordering.
        offset: u32,
    },
    /// A site starts inside the previous site.
    OverlappingSites {
        /// Offset of the second of the two overlapping sites.
        offset: u32,
    },
    /// A `SplitImmediate` site doesn't hold a `MOVW` / `MOVT` pair.
    InvalidSplitImmediate {
        /// Offset of the site.
        offset: u32,
    },
    /// An image may only contain a single `InjectOffset` site.
    DuplicateOffsetSite {
        /// Offset of the second `InjectOffset` site.
        offset: u32,
    },
    /// The output sink returned an error.
    Sink(E),
}

impl<E> EncodeError<E> {
    /// The image offset of the offending site, if the error concerns one.
    pub fn offset(&self) -> Option<u32> {
        use self::EncodeError::*;
        match *self {
            SiteOutOfBounds { offset, .. }
            | UnsortedSites { offset }
            | OverlappingSites { offset }
            | InvalidSplitImmediate { offset }
            | DuplicateOffsetSite { offset } => Some(offset),
            Sink(_) => None,
        }
    }
}

impl<E> Display for EncodeError<E>
where
    E: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::EncodeError::*;
        match self {
            SiteOutOfBounds { offset, image_len } => write!(f, "Relocation site at {:#x} extends past the end of the {} byte image.", offset, image_len),
            UnsortedSites { offset } => write!(f, "Relocation site at {:#x} is out of order.", offset),
            OverlappingSites { offset } => write!(f, "Relocation site at {:#x} overlaps the previous site.", offset),
            InvalidSplitImmediate { offset } => write!(f, "Relocation site at {:#x} is not a MOVW/MOVT instruction pair.", offset),
            DuplicateOffsetSite { offset } => write!(f, "Second offset injection site at {:#x}.", offset),
            Sink(e) => write!(f, "Output sink threw a fatal error: {:?}", e),
        }
    }
}

#[cfg(feature = "std")]
impl<E> std::error::Error for EncodeError<E> where E: Debug {}

#[cfg(all(feature = "core_error", not(feature = "std")))]
impl<E> core::error::Error for EncodeError<E> where E: Debug {}
