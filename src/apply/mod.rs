//! Apply a patch stream with a fixed runtime offset.
//!
//! [`Applier`] is a byte-wise state machine: bytes are fed in with
//! [`Applier::pump`], and each command is relocated and written to the
//! [`Target`] once its payload has been received in full. Memory use is
//! bounded by the command buffer, regardless of the size of the image.
//!
//! Because output is only ever produced for complete commands, a stream which
//! turns out to be malformed never leaves bytes on the target past the end of
//! the last command that was applied successfully.
//!
//! For the common cases, [`Applier::apply_slice`] and
//! [`Applier::run_blocking`] drive the state machine to completion.

#[cfg(feature = "alloc")]
use core::convert::Infallible;

use managed::ManagedSlice;

use crate::conn::Connection;
use crate::protocol::{CommandKind, CommandSet};
use crate::target::Target;
use crate::util::managed_vec::ManagedVec;

mod builder;
mod error;

pub use builder::{ApplierBuilder, ApplierBuilderError, DEFAULT_COMMAND_BUFFER_SIZE};
pub use error::{ApplyError, LoadError};

enum State {
    Tag,
    Count { kind: CommandKind, lo: Option<u8> },
    Payload { kind: CommandKind, len: usize },
    Finished,
    Poisoned,
}

/// Result of feeding a single byte to the [`Applier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The current record needs more bytes.
    Pending,
    /// A command was relocated and written to the target.
    Applied(AppliedCommand),
    /// The `'E'` record was received.
    Finished,
}

/// Describes a command which has just been written to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedCommand {
    /// The command's kind.
    pub kind: CommandKind,
    /// Number of units in the command.
    pub count: usize,
    /// Image offset of the command's first byte.
    pub image_offset: usize,
    /// Stream offset of the command's record.
    pub stream_offset: usize,
}

/// Totals reported once a stream has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplySummary {
    /// Number of commands applied, not counting the end marker.
    pub commands: usize,
    /// Number of relocation sites adjusted.
    pub sites: usize,
    /// Number of image bytes written to the target.
    pub bytes_written: usize,
    /// Number of stream bytes consumed.
    pub stream_len: usize,
}

/// Streaming patch applier.
pub struct Applier<'a> {
    offset: u32,
    command_buffer: ManagedSlice<'a, u8>,
    accept: CommandSet,
    require_end: bool,

    state: State,
    idx: usize,
    record_start: usize,
    summary: ApplySummary,
}

impl<'a> Applier<'a> {
    /// Create an [`ApplierBuilder`] which relocates by `offset`.
    pub fn builder(offset: u32) -> ApplierBuilder<'a> {
        ApplierBuilder::new(offset)
    }

    /// Create a new `Applier` which relocates by `offset`.
    ///
    /// _Note:_ `new` is only available when the `alloc` feature is enabled, as
    /// it will use a dynamically allocated `Vec` as a command buffer.
    ///
    /// For fine-grained control over various `Applier` options, including the
    /// ability to specify a fixed-size buffer, use the [`Applier::builder`]
    /// method instead.
    #[cfg(feature = "alloc")]
    pub fn new(offset: u32) -> Applier<'a> {
        Applier::from_parts(
            offset,
            ManagedSlice::Owned(alloc::vec![0; DEFAULT_COMMAND_BUFFER_SIZE]),
            CommandSet::default(),
            false,
        )
    }

    fn from_parts(
        offset: u32,
        command_buffer: ManagedSlice<'a, u8>,
        accept: CommandSet,
        require_end: bool,
    ) -> Applier<'a> {
        Applier {
            offset,
            command_buffer,
            accept,
            require_end,

            state: State::Tag,
            idx: 0,
            record_start: 0,
            summary: ApplySummary::default(),
        }
    }

    /// The runtime offset applied to every address.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Totals for the stream so far.
    pub fn summary(&self) -> ApplySummary {
        self.summary
    }

    /// Forget all progress, and get ready for a new stream.
    pub fn reset(&mut self) {
        self.state = State::Tag;
        self.idx = 0;
        self.record_start = 0;
        self.summary = ApplySummary::default();
    }

    /// Feed a single stream byte to the applier.
    ///
    /// Any error poisons the applier: every subsequent call returns
    /// [`ApplyError::Poisoned`] until [`reset`](Applier::reset) is called.
    pub fn pump<T: Target>(
        &mut self,
        target: &mut T,
        byte: u8,
    ) -> Result<Progress, ApplyError<T::Error>> {
        let res = self.pump_inner(target, byte);
        match res {
            Err(ApplyError::Poisoned) => {}
            Err(ref e) => {
                error!("aborting patch stream (stream offset {:?})", e.offset());
                self.state = State::Poisoned;
            }
            Ok(_) => self.summary.stream_len += 1,
        }
        res
    }

    fn pump_inner<T: Target>(
        &mut self,
        target: &mut T,
        byte: u8,
    ) -> Result<Progress, ApplyError<T::Error>> {
        let pos = self.summary.stream_len;

        match self.state {
            State::Poisoned => Err(ApplyError::Poisoned),
            State::Finished => Err(ApplyError::DataAfterEnd { offset: pos }),
            State::Tag => {
                self.record_start = pos;
                let kind = match CommandKind::from_tag(byte) {
                    Some(kind) if self.accept.accepts(kind) => kind,
                    _ => {
                        return Err(ApplyError::MalformedCommand {
                            offset: pos,
                            tag: byte,
                        })
                    }
                };

                if kind == CommandKind::End {
                    self.state = State::Finished;
                    return Ok(Progress::Finished);
                }

                self.state = State::Count { kind, lo: None };
                Ok(Progress::Pending)
            }
            State::Count { kind, lo: None } => {
                self.state = State::Count {
                    kind,
                    lo: Some(byte),
                };
                Ok(Progress::Pending)
            }
            State::Count { kind, lo: Some(lo) } => {
                let count = u16::from_le_bytes([lo, byte]);
                let len = count as usize * kind.unit_size();

                // checked before the payload arrives, so an oversized record
                // is an overflow even if the stream is also truncated
                let capacity = self.command_buffer.len();
                if len > capacity {
                    return Err(ApplyError::CommandBufferOverflow {
                        offset: self.record_start,
                        needed: len,
                        capacity,
                    });
                }

                self.idx = 0;
                if len == 0 {
                    return self.complete(target, kind, 0);
                }

                self.state = State::Payload { kind, len };
                Ok(Progress::Pending)
            }
            State::Payload { kind, len } => {
                let mut buf = ManagedVec::new_with_idx(&mut self.command_buffer, self.idx);
                // capacity was checked against `len` when the header arrived
                if buf.push(byte).is_err() {
                    return Err(ApplyError::CommandBufferOverflow {
                        offset: self.record_start,
                        needed: len,
                        capacity: buf.capacity(),
                    });
                }
                self.idx += 1;

                if self.idx < len {
                    Ok(Progress::Pending)
                } else {
                    self.complete(target, kind, len)
                }
            }
        }
    }

    /// Relocate the buffered payload, and hand it to the target.
    fn complete<T: Target>(
        &mut self,
        target: &mut T,
        kind: CommandKind,
        len: usize,
    ) -> Result<Progress, ApplyError<T::Error>> {
        let image_offset = self.summary.bytes_written;
        let record_start = self.record_start;
        let payload = &mut self.command_buffer[..len];

        let mut count = len;
        if let Some(site_kind) = kind.site_kind() {
            let width = site_kind.width();
            count = len / width;
            for (i, slot) in payload.chunks_exact_mut(width).enumerate() {
                if site_kind.relocate(slot, self.offset).is_err() {
                    return Err(ApplyError::InvalidSplitImmediate {
                        offset: record_start,
                        image_offset: image_offset + i * width,
                    });
                }
            }
            self.summary.sites += count;
        }

        target.write_all(payload).map_err(ApplyError::TargetError)?;

        self.state = State::Tag;
        self.idx = 0;
        self.summary.commands += 1;
        self.summary.bytes_written += len;

        let applied = AppliedCommand {
            kind,
            count,
            image_offset,
            stream_offset: self.record_start,
        };

        #[cfg(feature = "trace-cmd")]
        trace!(
            "<-- {:?} x{} @ {:#x}",
            applied.kind,
            applied.count,
            applied.image_offset
        );

        Ok(Progress::Applied(applied))
    }

    /// Signal the end of input, and flush the target.
    ///
    /// Fails if the stream stopped in the middle of a record, or without an
    /// end marker when one is required.
    pub fn finish<T: Target>(&mut self, target: &mut T) -> Result<ApplySummary, ApplyError<T::Error>> {
        let res: Result<(), ApplyError<T::Error>> = match self.state {
            State::Poisoned => return Err(ApplyError::Poisoned),
            State::Finished => Ok(()),
            State::Tag if self.require_end => Err(ApplyError::MissingEnd {
                offset: self.summary.stream_len,
            }),
            State::Tag => Ok(()),
            State::Count { kind, .. } => Err(ApplyError::MalformedCommand {
                offset: self.record_start,
                tag: kind.tag(),
            }),
            State::Payload { len, .. } => Err(ApplyError::StreamLengthMismatch {
                offset: self.record_start,
                declared: len,
                received: self.idx,
            }),
        };

        if let Err(e) = res {
            error!("aborting patch stream (stream offset {:?})", e.offset());
            self.state = State::Poisoned;
            return Err(e);
        }

        target.flush().map_err(ApplyError::TargetError)?;

        debug!(
            "applied {} commands ({} sites) at offset {:#x}: {} bytes written",
            self.summary.commands, self.summary.sites, self.offset, self.summary.bytes_written
        );

        Ok(self.summary)
    }

    /// Apply an entire stream held in memory.
    pub fn apply_slice<T: Target>(
        &mut self,
        target: &mut T,
        stream: &[u8],
    ) -> Result<ApplySummary, ApplyError<T::Error>> {
        for &byte in stream {
            self.pump(target, byte)?;
        }
        self.finish(target)
    }

    /// Pull a stream from `conn` until its end marker (or until `conn` runs
    /// dry), applying commands as they arrive.
    pub fn run_blocking<T, C>(
        &mut self,
        target: &mut T,
        conn: &mut C,
    ) -> Result<ApplySummary, LoadError<T::Error, C::Error>>
    where
        T: Target,
        C: Connection,
    {
        if let Err(e) = conn.on_stream_start() {
            return Err(LoadError::ConnectionRead(e));
        }

        loop {
            let byte = match conn.read() {
                Ok(Some(byte)) => byte,
                Ok(None) => break,
                Err(e) => return Err(LoadError::ConnectionRead(e)),
            };
            if let Progress::Finished = self.pump(target, byte)? {
                break;
            }
        }

        Ok(self.finish(target)?)
    }
}

/// Apply `stream` with `offset`, returning the relocated image.
///
/// Nothing is returned on failure: partial output is never usable.
#[cfg(feature = "alloc")]
pub fn apply_to_vec(stream: &[u8], offset: u32) -> Result<alloc::vec::Vec<u8>, ApplyError<Infallible>> {
    let mut image = alloc::vec::Vec::new();
    Applier::new(offset).apply_slice(&mut image, stream)?;
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::reloc::{decode_split_immediate, encode_split_immediate};
    use crate::target::SliceTarget;

    fn record(tag: u8, payload: &[u8], count: u16) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn data_then_address() {
        let mut stream = record(b'D', &[0x62, 0x54, 0x86, 0x12], 4);
        let mut words = Vec::new();
        words.extend_from_slice(&0x1000u32.to_le_bytes());
        words.extend_from_slice(&0x1008u32.to_le_bytes());
        stream.extend(record(b'A', &words, 2));
        stream.push(b'E');

        let image = apply_to_vec(&stream, 0x4000).unwrap();
        let mut expected = vec![0x62, 0x54, 0x86, 0x12];
        expected.extend_from_slice(&0x5000u32.to_le_bytes());
        expected.extend_from_slice(&0x5008u32.to_le_bytes());
        assert_eq!(image, expected);
    }

    #[test]
    fn pump_reports_progress() {
        let stream = record(b'D', &[1], 1);
        let mut out = Vec::new();
        let mut applier = Applier::new(0);
        assert_eq!(applier.pump(&mut out, stream[0]), Ok(Progress::Pending));
        assert_eq!(applier.pump(&mut out, stream[1]), Ok(Progress::Pending));
        assert_eq!(applier.pump(&mut out, stream[2]), Ok(Progress::Pending));
        assert!(out.is_empty());
        assert_eq!(
            applier.pump(&mut out, stream[3]),
            Ok(Progress::Applied(AppliedCommand {
                kind: CommandKind::Data,
                count: 1,
                image_offset: 0,
                stream_offset: 0,
            }))
        );
        assert_eq!(out, [1]);
        assert_eq!(applier.pump(&mut out, b'E'), Ok(Progress::Finished));
    }

    #[test]
    fn unknown_tag_keeps_previous_output() {
        let mut stream = record(b'D', &[1, 2, 3], 3);
        stream.push(b'Z');
        stream.extend(record(b'D', &[4], 1));

        let mut out = Vec::new();
        let err = Applier::new(0).apply_slice(&mut out, &stream).unwrap_err();
        assert_eq!(err, ApplyError::MalformedCommand { offset: 6, tag: b'Z' });
        assert_eq!(out, [1, 2, 3]);
    }

    #[test]
    fn poisoned_after_error() {
        let mut out = Vec::new();
        let mut applier = Applier::new(0);
        assert!(applier.pump(&mut out, b'Z').is_err());
        assert_eq!(applier.pump(&mut out, b'E'), Err(ApplyError::Poisoned));
        assert_eq!(applier.finish(&mut out), Err(ApplyError::Poisoned));

        applier.reset();
        assert_eq!(applier.pump(&mut out, b'E'), Ok(Progress::Finished));
    }

    #[test]
    fn truncated_payload() {
        let mut stream = record(b'D', &[1, 2], 2);
        stream.extend(record(b'A', &[0, 0], 1));

        let mut out = Vec::new();
        let err = Applier::new(0).apply_slice(&mut out, &stream).unwrap_err();
        assert_eq!(
            err,
            ApplyError::StreamLengthMismatch {
                offset: 5,
                declared: 4,
                received: 2,
            }
        );
        assert_eq!(out, [1, 2]);
    }

    #[test]
    fn truncated_header() {
        let stream = [b'D', 1];
        let mut out = Vec::new();
        let err = Applier::new(0).apply_slice(&mut out, &stream).unwrap_err();
        assert_eq!(err, ApplyError::MalformedCommand { offset: 0, tag: b'D' });
    }

    #[test]
    fn data_after_end() {
        let stream = [b'E', b'D'];
        let mut out = Vec::new();
        let err = Applier::new(0).apply_slice(&mut out, &stream).unwrap_err();
        assert_eq!(err, ApplyError::DataAfterEnd { offset: 1 });
    }

    #[test]
    fn require_end() {
        let stream = record(b'D', &[1], 1);
        let mut out = Vec::new();
        let mut applier = Applier::builder(0).require_end(true).build().unwrap();
        let err = applier.apply_slice(&mut out, &stream).unwrap_err();
        assert_eq!(err, ApplyError::MissingEnd { offset: 4 });
    }

    #[test]
    fn bounded_command_buffer() {
        let mut cmd_buf = [0u8; 4];
        let mut applier = Applier::builder(0)
            .with_command_buffer(&mut cmd_buf)
            .build()
            .unwrap();

        let mut out = Vec::new();
        let stream = record(b'D', &[0; 5], 5);
        let err = applier.apply_slice(&mut out, &stream).unwrap_err();
        assert_eq!(
            err,
            ApplyError::CommandBufferOverflow {
                offset: 0,
                needed: 5,
                capacity: 4,
            }
        );
        assert!(out.is_empty());
    }

    #[test]
    fn overflow_wins_over_truncation() {
        let mut cmd_buf = [0u8; 4];
        let mut applier = Applier::builder(0)
            .with_command_buffer(&mut cmd_buf)
            .build()
            .unwrap();

        // declares 5 bytes, but the stream stops after 2
        let stream = record(b'D', &[1, 2], 5);
        let mut out = Vec::new();
        let err = applier.apply_slice(&mut out, &stream).unwrap_err();
        assert_eq!(
            err,
            ApplyError::CommandBufferOverflow {
                offset: 0,
                needed: 5,
                capacity: 4,
            }
        );
        assert!(out.is_empty());

        // the same record is a length mismatch once it fits
        let stream = record(b'D', &[1, 2], 3);
        let err = Applier::new(0).apply_slice(&mut out, &stream).unwrap_err();
        assert_eq!(
            err,
            ApplyError::StreamLengthMismatch {
                offset: 0,
                declared: 3,
                received: 2,
            }
        );
    }

    #[test]
    fn builder_size_mismatch() {
        let mut cmd_buf = [0u8; 4];
        let res = Applier::builder(0)
            .with_command_buffer(&mut cmd_buf)
            .command_buffer_size(8)
            .build();
        assert_eq!(res.err(), Some(ApplierBuilderError::CommandBufferSizeMismatch));
    }

    #[test]
    fn no_std_style_loader() {
        let mut cmd_buf = [0u8; 8];
        let mut mem = [0u8; 8];

        let mut stream = record(b'O', &[0xff; 4], 1);
        stream.extend(record(b'A', &0x2000u32.to_le_bytes(), 1));

        let mut applier = Applier::builder(0x100)
            .with_command_buffer(&mut cmd_buf)
            .build()
            .unwrap();
        let mut target = SliceTarget::new(&mut mem);
        let summary = applier.apply_slice(&mut target, &stream).unwrap();
        assert_eq!(summary.sites, 2);
        assert_eq!(summary.bytes_written, 8);
        assert_eq!(&mem[..4], &0x100u32.to_le_bytes());
        assert_eq!(&mem[4..], &0x2100u32.to_le_bytes());
    }

    #[test]
    fn target_overflow() {
        let mut mem = [0u8; 2];
        let stream = record(b'D', &[1, 2, 3], 3);
        let mut target = SliceTarget::new(&mut mem);
        let err = Applier::new(0).apply_slice(&mut target, &stream).unwrap_err();
        assert!(matches!(err, ApplyError::TargetError(_)));
    }

    #[test]
    fn split_immediate_record() {
        let pair = encode_split_immediate(2, 0x0000_fffc);
        let stream = record(b'S', &pair, 1);
        let image = apply_to_vec(&stream, 8).unwrap();
        assert_eq!(decode_split_immediate(&image), Ok(0x0001_0004));
    }

    #[test]
    fn bad_split_immediate() {
        let mut stream = record(b'D', &[9], 1);
        stream.extend(record(b'S', &[0; 8], 1));
        let mut out = Vec::new();
        let err = Applier::new(0).apply_slice(&mut out, &stream).unwrap_err();
        assert_eq!(
            err,
            ApplyError::InvalidSplitImmediate {
                offset: 4,
                image_offset: 1,
            }
        );
        assert_eq!(out, [9]);
    }

    #[test]
    fn disabled_command_is_malformed() {
        let stream = record(b'O', &[0; 4], 1);
        let mut out = Vec::new();
        let mut applier = Applier::builder(0)
            .accept(CommandSet::SPLIT_IMMEDIATE)
            .build()
            .unwrap();
        let err = applier.apply_slice(&mut out, &stream).unwrap_err();
        assert_eq!(err, ApplyError::MalformedCommand { offset: 0, tag: b'O' });
    }

    #[test]
    fn zero_count_record() {
        let stream = record(b'A', &[], 0);
        let mut out = Vec::new();
        let summary = Applier::new(0).apply_slice(&mut out, &stream).unwrap();
        assert_eq!(summary.commands, 1);
        assert!(out.is_empty());
    }

    #[test]
    fn run_blocking_stops_at_end() {
        let mut stream = record(b'D', &[5], 1);
        stream.push(b'E');
        stream.extend_from_slice(b"trailing garbage the loader never reads");

        let mut conn: &[u8] = &stream;
        let mut out = Vec::new();
        let summary = Applier::new(0).run_blocking(&mut out, &mut conn).unwrap();
        assert_eq!(summary.stream_len, 5);
        assert_eq!(out, [5]);
        assert_eq!(conn.len(), b"trailing garbage the loader never reads".len());
    }
}
