use managed::ManagedSlice;

/// Error value indicating insufficient capacity.
#[derive(Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub struct CapacityError<Element>(pub Element);

/// Wraps a ManagedSlice in a fixed-capacity vec-like interface.
///
/// Unlike a `Vec`, an owned backing buffer is never grown: its length at
/// construction time is the capacity.
pub struct ManagedVec<'a, 'b, T: 'a> {
    buf: &'b mut ManagedSlice<'a, T>,
    len: usize,
}

impl<'a, 'b, T> ManagedVec<'a, 'b, T> {
    /// Resume filling `buf`, treating the first `len` elements as already
    /// pushed.
    pub fn new_with_idx(buf: &'b mut ManagedSlice<'a, T>, len: usize) -> Self {
        let len = len.min(buf.len());
        ManagedVec { buf, len }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn push(&mut self, value: T) -> Result<(), CapacityError<T>> {
        if self.len < self.buf.len() {
            self.buf[self.len] = value;
            self.len += 1;
            Ok(())
        } else {
            Err(CapacityError(value))
        }
    }
}
