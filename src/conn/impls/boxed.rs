use alloc::boxed::Box;

use crate::conn::Connection;

impl<E> Connection for Box<dyn Connection<Error = E>> {
    type Error = E;

    fn read(&mut self) -> Result<Option<u8>, Self::Error> {
        (**self).read()
    }

    fn on_stream_start(&mut self) -> Result<(), Self::Error> {
        (**self).on_stream_start()
    }
}
