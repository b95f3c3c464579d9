//! Traits to perform in-order, serial, byte-wise input.

mod impls;

/// A source of patch stream bytes.
///
/// A loader only ever needs to pull one byte at a time from the stream, so
/// this can be backed by anything from a UART RX register to a file.
///
/// When the `std` feature is enabled, this trait is automatically implemented
/// for [`TcpStream`](std::net::TcpStream) and
/// [`BufReader`](std::io::BufReader). It is always implemented for `&[u8]`.
pub trait Connection {
    /// Transport-specific error type.
    type Error;

    /// Read a single byte, blocking if necessary.
    ///
    /// Returns `Ok(None)` once the stream is exhausted. Sources which can't
    /// tell where the stream ends (e.g: a serial line) should simply never
    /// return `None`, and rely on the stream's `'E'` record instead.
    fn read(&mut self) -> Result<Option<u8>, Self::Error>;

    /// Called once before the first byte is read.
    ///
    /// This method's default implementation is a no-op.
    fn on_stream_start(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
