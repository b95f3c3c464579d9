//! Relocation patch streams for position-independent Cortex-M firmware.
//!
//! A linked firmware image is only correct at the address it was linked for.
//! `relopatch` lets a loader place it somewhere else: at build time the image
//! and the list of its relocation sites are turned into a compact stream of
//! commands, and at load time that stream is replayed together with the
//! runtime offset, producing the relocated image one command at a time.
//!
//! The pieces, in the order they run:
//!
//! - [`extract`]: resolve the link-time addresses recorded in the firmware's
//!   marker sections into image offsets ([`Site`]s).
//! - [`encoder`]: turn an image plus its sites into a command stream.
//! - [`apply`]: consume a command stream with a fixed runtime offset and write
//!   the relocated image to a [`Target`](target::Target).
//!
//! The applier never needs more memory than a single command, so it can run
//! inside a bootloader with a small static buffer.
//!
//! ## Wire format
//!
//! A stream is a sequence of records: a one-byte tag, a 16-bit little-endian
//! unit count, and the payload. See [`protocol::CommandKind`] for the full
//! list of tags.
//!
//! ## Features
//!
//! - `alloc`
//!     - Heap-allocated command buffers, `impl Target for Vec<u8>`
//!     - [`extract`], and the `*_to_vec` helpers
//! - `std` (implies `alloc`)
//!     - `impl Connection` for `TcpStream` and `BufReader`
//!     - `impl std::error::Error` for all error types
//! - `trace-cmd`
//!     - Logs every encoded / applied command via `trace!`
//! - `core_error`
//!     - `impl core::error::Error` for all error types in `no_std` builds

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[macro_use]
extern crate log;

mod util;

pub mod apply;
pub mod conn;
pub mod encoder;
#[cfg(feature = "alloc")]
pub mod extract;
pub mod protocol;
pub mod reloc;
pub mod target;

pub use apply::{Applier, ApplyError};
pub use encoder::{EncodeError, Encoder};
pub use reloc::{Site, SiteKind};
