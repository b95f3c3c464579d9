use std::io::{self, BufRead, BufReader, Read};

use crate::conn::Connection;

impl<R: Read> Connection for BufReader<R> {
    type Error = io::Error;

    fn read(&mut self) -> Result<Option<u8>, Self::Error> {
        let byte = match self.fill_buf()? {
            [] => return Ok(None),
            [byte, ..] => *byte,
        };
        self.consume(1);
        Ok(Some(byte))
    }
}
