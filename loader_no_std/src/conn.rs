use relopatch::conn::Connection;

/// Reads the patch stream off a raw file descriptor, one byte at a time.
pub struct FdConnection {
    fd: i32,
}

impl FdConnection {
    pub fn stdin() -> FdConnection {
        FdConnection { fd: 0 }
    }
}

impl Connection for FdConnection {
    type Error = &'static str;

    fn read(&mut self) -> Result<Option<u8>, &'static str> {
        let mut buf = [0];
        let ret = unsafe { libc::read(self.fd, buf.as_mut_ptr() as _, 1) };
        match ret {
            1 => Ok(Some(buf[0])),
            0 => Ok(None),
            _ => Err("read failed"),
        }
    }
}
