use std::net::TcpStream;

use crate::conn::Connection;

impl Connection for TcpStream {
    type Error = std::io::Error;

    fn read(&mut self) -> Result<Option<u8>, Self::Error> {
        use std::io::Read;

        let mut buf = [0u8];
        loop {
            match Read::read(self, &mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn on_stream_start(&mut self) -> Result<(), Self::Error> {
        self.set_nonblocking(false)
    }
}
