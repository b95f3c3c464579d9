//! Turn an image and its relocation sites into a patch stream.
//!
//! The encoder walks the image once, in ascending offset order. Literal bytes
//! accumulate into `Data` commands; each run of adjacent, same-kind sites
//! becomes a single relocating command. Long runs are split so no command
//! carries more than [`EncoderBuilder::max_units`] units.

use core::convert::Infallible;

use crate::protocol::Command;
use crate::reloc::{Site, SiteKind};
use crate::target::Target;

mod builder;
mod error;

pub use builder::{EncoderBuilder, EncoderBuilderError};
pub use error::EncodeError;

/// Patch stream encoder.
#[derive(Debug, Clone)]
pub struct Encoder {
    max_units: usize,
    terminate: bool,
}

/// Totals reported by [`Encoder::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodeSummary {
    /// Number of commands written, not counting the end marker.
    pub commands: usize,
    /// Number of relocation sites covered.
    pub sites: usize,
    /// Total number of bytes written to the sink.
    pub stream_len: usize,
}

impl Encoder {
    /// Create an [`EncoderBuilder`].
    pub fn builder() -> EncoderBuilder {
        EncoderBuilder::new()
    }

    /// Create an `Encoder` with default settings.
    pub fn new() -> Encoder {
        Encoder {
            max_units: 1024,
            terminate: true,
        }
    }

    /// Validate `sites` against `image`, and return an iterator over the
    /// commands which reconstruct it. The end marker is not included.
    pub fn commands<'a, 's>(
        &self,
        image: &'a [u8],
        sites: &'s [Site],
    ) -> Result<Commands<'a, 's>, EncodeError<Infallible>> {
        validate_sites::<Infallible>(image, sites)?;
        Ok(Commands::new(image, sites, self.max_units))
    }

    /// Encode `image` into `target`.
    pub fn encode<T: Target>(
        &self,
        image: &[u8],
        sites: &[Site],
        target: &mut T,
    ) -> Result<EncodeSummary, EncodeError<T::Error>> {
        validate_sites::<T::Error>(image, sites)?;

        let mut summary = EncodeSummary {
            sites: sites.len(),
            ..EncodeSummary::default()
        };

        let mut image_offset = 0;
        for cmd in Commands::new(image, sites, self.max_units) {
            #[cfg(feature = "trace-cmd")]
            trace!(
                "--> {:?} x{} @ {:#x}",
                cmd.kind(),
                cmd.count(),
                image_offset
            );

            cmd.write_unchecked(target).map_err(EncodeError::Sink)?;
            summary.commands += 1;
            summary.stream_len += cmd.encoded_len();
            image_offset += cmd.span();
        }

        if self.terminate {
            Command::End.write_unchecked(target).map_err(EncodeError::Sink)?;
            summary.stream_len += Command::End.encoded_len();
        }
        target.flush().map_err(EncodeError::Sink)?;

        debug!(
            "encoded {} byte image with {} sites into {} commands ({} bytes)",
            image_offset, summary.sites, summary.commands, summary.stream_len
        );

        Ok(summary)
    }

    /// Encode `image` into a freshly allocated buffer.
    #[cfg(feature = "alloc")]
    pub fn encode_to_vec(
        &self,
        image: &[u8],
        sites: &[Site],
    ) -> Result<alloc::vec::Vec<u8>, EncodeError<Infallible>> {
        let mut out = alloc::vec::Vec::with_capacity(image.len() + image.len() / 64 + 8);
        self.encode(image, sites, &mut out)?;
        Ok(out)
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Encoder::new()
    }
}

/// Check that `sites` are in bounds, sorted, non-overlapping and well formed.
fn validate_sites<E>(image: &[u8], sites: &[Site]) -> Result<(), EncodeError<E>> {
    let mut prev: Option<&Site> = None;
    let mut seen_offset_site = false;

    for site in sites {
        let slot = match image.get(site.offset as usize..site.end()) {
            Some(slot) => slot,
            None => {
                return Err(EncodeError::SiteOutOfBounds {
                    offset: site.offset,
                    image_len: image.len(),
                })
            }
        };

        if let Some(prev) = prev {
            if site.offset < prev.offset {
                return Err(EncodeError::UnsortedSites {
                    offset: site.offset,
                });
            }
            if (site.offset as usize) < prev.end() {
                return Err(EncodeError::OverlappingSites {
                    offset: site.offset,
                });
            }
        }

        if site.kind == SiteKind::InjectOffset {
            if seen_offset_site {
                return Err(EncodeError::DuplicateOffsetSite {
                    offset: site.offset,
                });
            }
            seen_offset_site = true;
        }

        if site.kind.validate(slot).is_err() {
            return Err(EncodeError::InvalidSplitImmediate {
                offset: site.offset,
            });
        }

        prev = Some(site);
    }

    Ok(())
}

/// Iterator over the commands reconstructing an image.
///
/// Returned by [`Encoder::commands`].
#[derive(Debug, Clone)]
pub struct Commands<'a, 's> {
    image: &'a [u8],
    sites: &'s [Site],
    pos: usize,
    max_units: usize,
}

impl<'a, 's> Commands<'a, 's> {
    fn new(image: &'a [u8], sites: &'s [Site], max_units: usize) -> Self {
        Commands {
            image,
            sites,
            pos: 0,
            max_units,
        }
    }

    /// Number of sites at the front of `self.sites` which form a single run
    /// starting at `self.pos`.
    fn run_len(&self, kind: SiteKind) -> usize {
        let width = kind.width();
        let mut n = 1;
        while n < self.max_units {
            match self.sites.get(n) {
                Some(s) if s.kind == kind && s.offset as usize == self.pos + n * width => n += 1,
                _ => break,
            }
        }
        n
    }
}

impl<'a, 's> Iterator for Commands<'a, 's> {
    type Item = Command<'a>;

    fn next(&mut self) -> Option<Command<'a>> {
        if self.pos >= self.image.len() {
            return None;
        }

        let cmd = match self.sites.first() {
            Some(&site) if site.offset as usize == self.pos => {
                let n = self.run_len(site.kind);
                let end = self.pos + n * site.kind.width();
                let payload = &self.image[self.pos..end];
                self.sites = &self.sites[n..];
                self.pos = end;
                match site.kind {
                    SiteKind::DirectWord => Command::Address(payload),
                    SiteKind::SplitImmediate => Command::SplitImmediate(payload),
                    SiteKind::InjectOffset => Command::InjectOffset(payload),
                }
            }
            next_site => {
                let literal_end = next_site
                    .map(|s| s.offset as usize)
                    .unwrap_or_else(|| self.image.len());
                let end = literal_end.min(self.pos + self.max_units);
                let payload = &self.image[self.pos..end];
                self.pos = end;
                Command::Data(payload)
            }
        };

        Some(cmd)
    }
}

impl core::iter::FusedIterator for Commands<'_, '_> {}
