use std::io::{self, Write};

use crate::target::Target;

/// Adapts any [`std::io::Write`] into a [`Target`].
#[derive(Debug)]
pub struct WriteTarget<W> {
    inner: W,
}

impl<W: Write> WriteTarget<W> {
    /// Wrap `inner`.
    pub fn new(inner: W) -> Self {
        WriteTarget { inner }
    }

    /// Unwrap the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Target for WriteTarget<W> {
    type Error = io::Error;

    fn write(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.inner.write_all(&[byte])
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        self.inner.write_all(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.inner.flush()
    }
}
