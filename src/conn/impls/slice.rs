use core::convert::Infallible;

use crate::conn::Connection;

impl Connection for &[u8] {
    type Error = Infallible;

    fn read(&mut self) -> Result<Option<u8>, Self::Error> {
        match self.split_first() {
            Some((&byte, rest)) => {
                *self = rest;
                Ok(Some(byte))
            }
            None => Ok(None),
        }
    }
}
