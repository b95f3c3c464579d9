use alloc::vec::Vec;
use core::convert::Infallible;

use crate::target::Target;

impl Target for Vec<u8> {
    type Error = Infallible;

    fn write(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.push(byte);
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        self.extend_from_slice(buf);
        Ok(())
    }
}
