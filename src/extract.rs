//! Find the relocation sites of a linked image.
//!
//! The compiler drops a label at every address that needs fixing up at load
//! time, and collects those labels into dedicated marker sections which the
//! linker is told to keep. Each marker section is a plain array of
//! little-endian link-time addresses, one per site, and all sites in a section
//! share the same [`SiteKind`].
//!
//! Link-time addresses don't map 1:1 to image offsets: a pointer living in
//! initialized RAM (`.data`) has a RAM address, but its initial value is stored
//! in the ROM image, in the initializer block the startup code copies from.
//! A [`Layout`] describes these translations as a list of [`RegionRule`]s.

use alloc::vec::Vec;
use core::fmt::{self, Display};

use crate::reloc::{Site, SiteKind};

/// A resolved link-time address, relative to the base of the region rule it
/// falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemRef {
    /// Offset into a ROM region (code and constants).
    Rom(u32),
    /// Offset into a RAM region (mutable data).
    Ram(u32),
}

/// Maps a range of link-time addresses onto the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionRule {
    /// A ROM region, stored verbatim in the image.
    Rom {
        /// Link-time address of the region's first byte.
        link_base: u32,
        /// Size of the region, in bytes.
        size: u32,
        /// Image offset of the region's first byte.
        image_offset: u32,
    },
    /// A RAM region. If the region has initial values, they are stored in
    /// the image starting at `initializer`.
    Ram {
        /// Link-time address of the region's first byte.
        link_base: u32,
        /// Size of the region, in bytes.
        size: u32,
        /// Image offset of the region's initializer block, if any.
        initializer: Option<u32>,
    },
}

impl RegionRule {
    fn bounds(&self) -> (u32, u32) {
        match *self {
            RegionRule::Rom {
                link_base, size, ..
            }
            | RegionRule::Ram {
                link_base, size, ..
            } => (link_base, size),
        }
    }

    /// Check whether `addr` falls inside this region.
    pub fn contains(&self, addr: u32) -> bool {
        let (base, size) = self.bounds();
        addr >= base && u64::from(addr) < u64::from(base) + u64::from(size)
    }

    /// Resolve `addr` relative to this region.
    pub fn mem_ref(&self, addr: u32) -> Option<MemRef> {
        if !self.contains(addr) {
            return None;
        }
        let (base, _) = self.bounds();
        let offset = addr - base;
        Some(match self {
            RegionRule::Rom { .. } => MemRef::Rom(offset),
            RegionRule::Ram { .. } => MemRef::Ram(offset),
        })
    }

    /// Number of bytes left in the region past `mem`.
    fn remaining(&self, mem: MemRef) -> u32 {
        let (_, size) = self.bounds();
        match mem {
            MemRef::Rom(offset) | MemRef::Ram(offset) => size.saturating_sub(offset),
        }
    }

    /// Translate a reference into this region to an image offset.
    ///
    /// Returns `None` for RAM regions without an initializer block.
    pub fn image_offset(&self, mem: MemRef) -> Option<u32> {
        match (self, mem) {
            (RegionRule::Rom { image_offset, .. }, MemRef::Rom(offset)) => {
                image_offset.checked_add(offset)
            }
            (RegionRule::Ram { initializer, .. }, MemRef::Ram(offset)) => {
                initializer.and_then(|init| init.checked_add(offset))
            }
            _ => None,
        }
    }
}

/// The set of region rules describing an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    rules: Vec<RegionRule>,
}

impl Layout {
    /// Create an empty layout.
    pub fn new() -> Layout {
        Layout { rules: Vec::new() }
    }

    /// Add a rule.
    pub fn push(&mut self, rule: RegionRule) {
        self.rules.push(rule)
    }

    /// Add a rule, builder style.
    pub fn with_rule(mut self, rule: RegionRule) -> Layout {
        self.push(rule);
        self
    }

    /// All rules, in the order they were added.
    pub fn rules(&self) -> &[RegionRule] {
        &self.rules
    }

    /// Find the rule covering `addr`. The first matching rule wins.
    pub fn resolve(&self, addr: u32) -> Option<(&RegionRule, MemRef)> {
        self.rules
            .iter()
            .find_map(|rule| rule.mem_ref(addr).map(|mem| (rule, mem)))
    }
}

/// The contents of a single marker section.
#[derive(Debug, Clone, Copy)]
pub struct MarkerSection<'a> {
    /// Kind shared by every site listed in the section.
    pub kind: SiteKind,
    /// Raw section contents: little-endian `u32` link-time addresses.
    pub data: &'a [u8],
}

impl<'a> MarkerSection<'a> {
    /// Wrap the raw contents of a marker section.
    pub fn new(kind: SiteKind, data: &'a [u8]) -> Self {
        MarkerSection { kind, data }
    }

    /// Number of markers in the section (rounded down).
    pub fn len(&self) -> usize {
        self.data.len() / 4
    }

    /// Check if the section is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An error which may occur while extracting relocation sites.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExtractError {
    /// A marked address falls outside every region, or the site it marks
    /// extends past the end of its region or of the image.
    SiteOutOfBounds {
        /// Link-time address of the site.
        addr: u32,
        /// Image offset of the site, if it could be resolved.
        offset: Option<u32>,
    },
    /// A marked address lies in a RAM region which has no initializer block in
    /// the image.
    UnpairedRamInitializer {
        /// Link-time address of the site.
        addr: u32,
    },
    /// A marker section's length isn't a multiple of 4.
    MalformedMarkerSection {
        /// Kind of the offending section.
        kind: SiteKind,
        /// Length of the section, in bytes.
        len: usize,
    },
    /// Two different sites overlap.
    OverlappingSites {
        /// Image offset of the second site.
        offset: u32,
    },
    /// More than one `InjectOffset` site was marked.
    DuplicateOffsetSite {
        /// Image offset of the second site.
        offset: u32,
    },
}

impl Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::ExtractError::*;
        match self {
            SiteOutOfBounds { addr, offset: Some(offset) } => write!(f, "Relocation site {:#010x} (image offset {:#x}) is out of bounds.", addr, offset),
            SiteOutOfBounds { addr, offset: None } => write!(f, "Relocation site {:#010x} is outside every known region.", addr),
            UnpairedRamInitializer { addr } => write!(f, "Relocation site {:#010x} is in a RAM region without an initializer block.", addr),
            MalformedMarkerSection { kind, len } => write!(f, "{:?} marker section is {} bytes long, which is not a multiple of 4.", kind, len),
            OverlappingSites { offset } => write!(f, "Relocation site at image offset {:#x} overlaps another site.", offset),
            DuplicateOffsetSite { offset } => write!(f, "Second offset injection site at image offset {:#x}.", offset),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ExtractError {}

#[cfg(all(feature = "core_error", not(feature = "std")))]
impl core::error::Error for ExtractError {}

/// Resolve a single marked address into a site.
fn resolve_site(
    image: &[u8],
    layout: &Layout,
    kind: SiteKind,
    addr: u32,
) -> Result<Site, ExtractError> {
    let (rule, mem) = layout
        .resolve(addr)
        .ok_or(ExtractError::SiteOutOfBounds { addr, offset: None })?;

    let offset = match (rule.image_offset(mem), mem) {
        (Some(offset), _) => offset,
        (None, MemRef::Ram(_)) => return Err(ExtractError::UnpairedRamInitializer { addr }),
        (None, MemRef::Rom(_)) => return Err(ExtractError::SiteOutOfBounds { addr, offset: None }),
    };

    let width = kind.width();
    if (rule.remaining(mem) as usize) < width || offset as usize + width > image.len() {
        return Err(ExtractError::SiteOutOfBounds {
            addr,
            offset: Some(offset),
        });
    }

    Ok(Site { offset, kind })
}

/// Extract the sorted list of relocation sites of `image`.
///
/// Markers may be listed in any order, and the same site may be marked more
/// than once. The returned sites are sorted by offset and free of duplicates.
pub fn extract(
    image: &[u8],
    layout: &Layout,
    markers: &[MarkerSection<'_>],
) -> Result<Vec<Site>, ExtractError> {
    let mut sites = Vec::with_capacity(markers.iter().map(MarkerSection::len).sum());

    for section in markers {
        if section.data.len() % 4 != 0 {
            return Err(ExtractError::MalformedMarkerSection {
                kind: section.kind,
                len: section.data.len(),
            });
        }

        for marker in section.data.chunks_exact(4) {
            let addr = u32::from_le_bytes([marker[0], marker[1], marker[2], marker[3]]);
            sites.push(resolve_site(image, layout, section.kind, addr)?);
        }
    }

    let marked = sites.len();
    sites.sort_unstable();
    sites.dedup();

    let mut seen_offset_site = false;
    for pair in sites.windows(2) {
        if (pair[1].offset as usize) < pair[0].end() {
            return Err(ExtractError::OverlappingSites {
                offset: pair[1].offset,
            });
        }
    }
    for site in sites.iter().filter(|s| s.kind == SiteKind::InjectOffset) {
        if seen_offset_site {
            return Err(ExtractError::DuplicateOffsetSite {
                offset: site.offset,
            });
        }
        seen_offset_site = true;
    }

    debug!(
        "extracted {} relocation sites ({} markers) from {} byte image",
        sites.len(),
        marked,
        image.len()
    );

    Ok(sites)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers(addrs: &[u32]) -> Vec<u8> {
        addrs.iter().flat_map(|a| a.to_le_bytes().to_vec()).collect()
    }

    fn layout() -> Layout {
        Layout::new()
            .with_rule(RegionRule::Rom {
                link_base: 0x0800_0000,
                size: 0x100,
                image_offset: 0,
            })
            .with_rule(RegionRule::Ram {
                link_base: 0x2000_0000,
                size: 0x40,
                initializer: Some(0xc0),
            })
            .with_rule(RegionRule::Ram {
                link_base: 0x2000_0040,
                size: 0x40,
                initializer: None,
            })
    }

    #[test]
    fn rom_and_ram_sites() {
        let image = [0u8; 0x100];
        let words = markers(&[0x2000_0004, 0x0800_0010, 0x0800_0010]);
        let sites = extract(
            &image,
            &layout(),
            &[MarkerSection::new(SiteKind::DirectWord, &words)],
        )
        .unwrap();
        assert_eq!(sites, [Site::word(0x10), Site::word(0xc4)]);
    }

    #[test]
    fn mem_ref_is_tagged() {
        let layout = layout();
        assert_eq!(layout.resolve(0x0800_0008).map(|r| r.1), Some(MemRef::Rom(8)));
        assert_eq!(layout.resolve(0x2000_0008).map(|r| r.1), Some(MemRef::Ram(8)));
        assert!(layout.resolve(0x1000_0000).is_none());
    }

    #[test]
    fn unpaired_ram() {
        let image = [0u8; 0x100];
        let words = markers(&[0x2000_0044]);
        let err = extract(
            &image,
            &layout(),
            &[MarkerSection::new(SiteKind::DirectWord, &words)],
        )
        .unwrap_err();
        assert_eq!(err, ExtractError::UnpairedRamInitializer { addr: 0x2000_0044 });
    }

    #[test]
    fn outside_every_region() {
        let image = [0u8; 0x100];
        let words = markers(&[0x4000_0000]);
        let err = extract(
            &image,
            &layout(),
            &[MarkerSection::new(SiteKind::DirectWord, &words)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ExtractError::SiteOutOfBounds {
                addr: 0x4000_0000,
                offset: None
            }
        );
    }

    #[test]
    fn past_end_of_image() {
        // region claims more than the image actually holds
        let image = [0u8; 0x80];
        let words = markers(&[0x0800_007e]);
        let err = extract(
            &image,
            &layout(),
            &[MarkerSection::new(SiteKind::DirectWord, &words)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ExtractError::SiteOutOfBounds {
                addr: 0x0800_007e,
                offset: Some(0x7e)
            }
        );
    }

    #[test]
    fn straddles_region_end() {
        let image = [0u8; 0x200];
        let split = markers(&[0x0800_00fc]);
        let err = extract(
            &image,
            &layout(),
            &[MarkerSection::new(SiteKind::SplitImmediate, &split)],
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::SiteOutOfBounds { .. }));
    }

    #[test]
    fn malformed_section() {
        let image = [0u8; 0x100];
        let err = extract(
            &image,
            &layout(),
            &[MarkerSection::new(SiteKind::DirectWord, &[0, 0, 0])],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ExtractError::MalformedMarkerSection {
                kind: SiteKind::DirectWord,
                len: 3
            }
        );
    }

    #[test]
    fn overlapping_kinds() {
        let image = [0u8; 0x100];
        let words = markers(&[0x0800_0014]);
        let split = markers(&[0x0800_0010]);
        let err = extract(
            &image,
            &layout(),
            &[
                MarkerSection::new(SiteKind::DirectWord, &words),
                MarkerSection::new(SiteKind::SplitImmediate, &split),
            ],
        )
        .unwrap_err();
        assert_eq!(err, ExtractError::OverlappingSites { offset: 0x14 });
    }

    #[test]
    fn single_offset_site() {
        let image = [0u8; 0x100];
        let offsets = markers(&[0x0800_0000, 0x0800_0008]);
        let err = extract(
            &image,
            &layout(),
            &[MarkerSection::new(SiteKind::InjectOffset, &offsets)],
        )
        .unwrap_err();
        assert_eq!(err, ExtractError::DuplicateOffsetSite { offset: 8 });
    }
}
