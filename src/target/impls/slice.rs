use core::fmt::{self, Display};

use crate::target::Target;

/// The image doesn't fit in the memory window given to a [`SliceTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceTargetError {
    /// Size of the memory window.
    pub capacity: usize,
}

impl Display for SliceTargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image overflows {} byte memory window", self.capacity)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SliceTargetError {}

#[cfg(all(feature = "core_error", not(feature = "std")))]
impl core::error::Error for SliceTargetError {}

/// Writes into a fixed memory window, e.g: the RAM a bootloader has set aside
/// for the image.
#[derive(Debug)]
pub struct SliceTarget<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> SliceTarget<'a> {
    /// Write into `buf`, starting at its first byte.
    pub fn new(buf: &'a mut [u8]) -> Self {
        SliceTarget { buf, pos: 0 }
    }

    /// Number of bytes written so far.
    pub fn written(&self) -> usize {
        self.pos
    }

    /// The portion of the window which has been written.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}

impl Target for SliceTarget<'_> {
    type Error = SliceTargetError;

    fn write(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.write_all(&[byte])
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        let capacity = self.buf.len();
        let dst = self
            .buf
            .get_mut(self.pos..self.pos + buf.len())
            .ok_or(SliceTargetError { capacity })?;
        dst.copy_from_slice(buf);
        self.pos += buf.len();
        Ok(())
    }
}
