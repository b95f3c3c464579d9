//! Where relocated image bytes end up.
//!
//! The applier writes each command's output to a [`Target`] as soon as that
//! command has been fully received and relocated. Targets are written
//! strictly sequentially, starting at image offset 0.

mod impls;

pub use impls::SliceTarget;
pub use impls::SliceTargetError;
#[cfg(feature = "std")]
pub use impls::WriteTarget;

/// A sequential byte sink, typically backed by target memory or flash.
///
/// When the `alloc` feature is enabled, this trait is implemented for
/// `Vec<u8>`. [`SliceTarget`] covers fixed memory windows in `no_std`
/// loaders, and [`WriteTarget`] (`std` only) adapts any `std::io::Write`.
pub trait Target {
    /// Target-specific fatal error.
    type Error;

    /// Write a single byte.
    fn write(&mut self, byte: u8) -> Result<(), Self::Error>;

    /// Write the entire buffer.
    ///
    /// This method's default implementation calls `self.write()` on each byte
    /// in the buffer. This can be quite inefficient, so if a more efficient
    /// implementation exists (such as a `memcpy` into a memory window), this
    /// method should be overwritten.
    fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        for b in buf {
            self.write(*b)?;
        }
        Ok(())
    }

    /// Flush any intermediately buffered output.
    ///
    /// _Note:_ Not all targets buffer (e.g: writing directly to RAM). In these
    /// cases, it's fine to simply return `Ok(())`, which is what the default
    /// implementation does.
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
