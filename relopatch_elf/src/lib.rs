//! Build [`relopatch`] streams straight from linked ELF firmware images.
//!
//! [`FirmwareImage::from_elf`] flattens the loadable sections of an ELF file
//! into the image a flash programmer would write, derives the region
//! [`Layout`] from the section headers, and resolves the marker sections the
//! toolchain emitted into relocation [`Site`]s.
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use relopatch::Encoder;
//! use relopatch_elf::{ElfConfig, FirmwareImage};
//!
//! let elf = std::fs::read("firmware.elf")?;
//! let firmware = FirmwareImage::from_elf(&elf, &ElfConfig::default())?;
//! let stream = firmware.encode(&Encoder::new())?;
//! std::fs::write("firmware.patch", stream)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

use std::convert::TryFrom;

use goblin::elf::program_header::{ProgramHeader, PT_LOAD};
use goblin::elf::section_header::{SectionHeader, SHT_NOBITS, SHT_PROGBITS};
use goblin::elf::Elf;
use log::{debug, trace};

use relopatch::extract::{self, Layout, MarkerSection, RegionRule};
use relopatch::{Encoder, Site, SiteKind};

mod config;
mod error;

pub use config::{ElfConfig, OFFSET_SECTION, SPLIT_SECTION, WORDS_SECTION};
pub use error::ElfError;

/// A flattened firmware image, along with its layout and relocation sites.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    load_base: u32,
    image: Vec<u8>,
    layout: Layout,
    sites: Vec<Site>,
}

/// A loadable section with contents.
struct Placed<'a> {
    name: &'a str,
    vma: u32,
    lma: u32,
    data: &'a [u8],
}

fn section_name<'a>(elf: &'a Elf<'_>, h: &SectionHeader) -> &'a str {
    elf.shdr_strtab.get_at(h.sh_name).unwrap_or("<unnamed>")
}

fn section_data<'a>(bytes: &'a [u8], h: &SectionHeader, name: &str) -> Result<&'a [u8], ElfError> {
    h.file_range()
        .and_then(|range| bytes.get(range))
        .ok_or_else(|| ElfError::MissingSectionData { name: name.into() })
}

fn to_u32(val: u64, name: &str) -> Result<u32, ElfError> {
    u32::try_from(val).map_err(|_| ElfError::AddressOutOfRange { name: name.into() })
}

/// Load address of a section, found through the `PT_LOAD` segment whose file
/// contents cover it. Sections outside every segment load where they run.
fn load_address(phdrs: &[ProgramHeader], h: &SectionHeader) -> u64 {
    phdrs
        .iter()
        .filter(|p| p.p_type == PT_LOAD)
        .find(|p| {
            h.sh_offset >= p.p_offset
                && h.sh_offset.saturating_add(h.sh_size) <= p.p_offset.saturating_add(p.p_filesz)
        })
        .map(|p| p.p_paddr.saturating_add(h.sh_offset - p.p_offset))
        .unwrap_or(h.sh_addr)
}

impl FirmwareImage {
    /// Parse a linked ELF file.
    pub fn from_elf(bytes: &[u8], config: &ElfConfig) -> Result<FirmwareImage, ElfError> {
        let elf = Elf::parse(bytes)?;

        let mut placed = Vec::new();
        let mut zeroed = Vec::new();
        let mut markers = Vec::new();

        for h in &elf.section_headers {
            let name = section_name(&elf, h);

            if let Some(kind) = config.marker_kind(name) {
                let data = section_data(bytes, h, name)?;
                trace!("marker section {:?}: {} entries", name, data.len() / 4);
                markers.push(MarkerSection::new(kind, data));
                continue;
            }

            if !h.is_alloc() || h.sh_size == 0 {
                continue;
            }

            match h.sh_type {
                SHT_NOBITS => zeroed.push(RegionRule::Ram {
                    link_base: to_u32(h.sh_addr, name)?,
                    size: to_u32(h.sh_size, name)?,
                    initializer: None,
                }),
                SHT_PROGBITS => placed.push(Placed {
                    name,
                    vma: to_u32(h.sh_addr, name)?,
                    lma: to_u32(load_address(&elf.program_headers, h), name)?,
                    data: section_data(bytes, h, name)?,
                }),
                _ => {}
            }
        }

        let load_base = placed.iter().map(|s| s.lma).min().unwrap_or(0);
        let load_end = placed
            .iter()
            .map(|s| u64::from(s.lma) + s.data.len() as u64)
            .max()
            .unwrap_or(0);
        let size = load_end.saturating_sub(u64::from(load_base));
        if size > u64::from(u32::MAX) {
            return Err(ElfError::ImageTooLarge { size });
        }

        let mut image = vec![config.fill; size as usize];
        let mut layout = Layout::new();

        for s in &placed {
            let image_offset = s.lma - load_base;
            debug!(
                "loading section {:?} into image at {:#x} (vma {:#010x}, lma {:#010x}, {} bytes)",
                s.name,
                image_offset,
                s.vma,
                s.lma,
                s.data.len()
            );

            let start = image_offset as usize;
            image[start..start + s.data.len()].copy_from_slice(s.data);

            let size = s.data.len() as u32;
            layout.push(if s.vma == s.lma {
                RegionRule::Rom {
                    link_base: s.vma,
                    size,
                    image_offset,
                }
            } else {
                RegionRule::Ram {
                    link_base: s.vma,
                    size,
                    initializer: Some(image_offset),
                }
            });
        }
        for rule in zeroed {
            layout.push(rule);
        }

        let sites = extract::extract(&image, &layout, &markers)?;

        Ok(FirmwareImage {
            load_base,
            image,
            layout,
            sites,
        })
    }

    /// Load address of the first byte of the image.
    pub fn load_base(&self) -> u32 {
        self.load_base
    }

    /// The flat image, as it would be written to flash at
    /// [`load_base`](FirmwareImage::load_base).
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Region rules derived from the section headers.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Relocation sites, sorted by image offset.
    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    /// Number of sites of each kind, as `(direct word, split immediate,
    /// inject offset)`.
    pub fn site_counts(&self) -> (usize, usize, usize) {
        self.sites
            .iter()
            .fold((0, 0, 0), |(w, s, o), site| match site.kind {
                SiteKind::DirectWord => (w + 1, s, o),
                SiteKind::SplitImmediate => (w, s + 1, o),
                SiteKind::InjectOffset => (w, s, o + 1),
            })
    }

    /// Encode the image into a patch stream.
    pub fn encode(&self, encoder: &Encoder) -> Result<Vec<u8>, ElfError> {
        Ok(encoder.encode_to_vec(&self.image, &self.sites)?)
    }
}
