//! Relocation sites, and how each kind of site is adjusted.
//!
//! All multi-byte values are little-endian, matching Cortex-M.

use core::fmt::{self, Display};

/// The different encodings an address can take inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SiteKind {
    /// A 32-bit word holding an absolute address.
    DirectWord,
    /// An address materialized by a Thumb-2 `MOVW` (low half) immediately
    /// followed by a `MOVT` (high half).
    SplitImmediate,
    /// A 32-bit word which receives the runtime offset itself, letting the
    /// running program learn where it was loaded.
    InjectOffset,
}

/// A slot which can't be relocated as the requested kind of site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidSlot {
    /// The slot is shorter than the site it should hold.
    TooShort {
        /// Width of the site, in bytes.
        width: usize,
        /// Length of the slot, in bytes.
        len: usize,
    },
    /// A Thumb-2 instruction pair didn't decode as `MOVW` followed by `MOVT`.
    NotMovwMovt,
}

impl Display for InvalidSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidSlot::TooShort { width, len } => write!(f, "slot is {} bytes long, site needs {}", len, width),
            InvalidSlot::NotMovwMovt => write!(f, "expected a Thumb-2 MOVW/MOVT instruction pair"),
        }
    }
}

impl SiteKind {
    /// Number of image bytes covered by a single site of this kind.
    pub fn width(self) -> usize {
        match self {
            SiteKind::DirectWord | SiteKind::InjectOffset => 4,
            SiteKind::SplitImmediate => 8,
        }
    }

    /// Check that `slot` holds something this kind of site can relocate.
    pub fn validate(self, slot: &[u8]) -> Result<(), InvalidSlot> {
        let width = self.width();
        if slot.len() < width {
            return Err(InvalidSlot::TooShort {
                width,
                len: slot.len(),
            });
        }
        match self {
            SiteKind::DirectWord | SiteKind::InjectOffset => Ok(()),
            SiteKind::SplitImmediate => {
                let (movw, movt) = split_pair(slot);
                if is_movw(movw) && is_movt(movt) {
                    Ok(())
                } else {
                    Err(InvalidSlot::NotMovwMovt)
                }
            }
        }
    }

    /// Relocate a single site in place. Only the first
    /// [`width`](SiteKind::width) bytes of `slot` are touched, and shorter
    /// slots are rejected.
    ///
    /// Address arithmetic wraps modulo 2^32.
    pub fn relocate(self, slot: &mut [u8], offset: u32) -> Result<(), InvalidSlot> {
        self.validate(slot)?;
        match self {
            SiteKind::DirectWord => {
                let val = read_u32(slot).wrapping_add(offset);
                slot[..4].copy_from_slice(&val.to_le_bytes());
            }
            SiteKind::InjectOffset => slot[..4].copy_from_slice(&offset.to_le_bytes()),
            SiteKind::SplitImmediate => {
                let (movw, movt) = split_pair(slot);
                let addr = (decode_imm16(movt) << 16) | decode_imm16(movw);
                let addr = addr.wrapping_add(offset);
                let movw = encode_imm16(movw, addr & 0xffff);
                let movt = encode_imm16(movt, addr >> 16);
                slot[..4].copy_from_slice(&movw.to_le_bytes());
                slot[4..8].copy_from_slice(&movt.to_le_bytes());
            }
        }
        Ok(())
    }
}

/// A location in an image which must be adjusted at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Site {
    /// Byte offset of the site within the image.
    pub offset: u32,
    /// How the address at `offset` is encoded.
    pub kind: SiteKind,
}

impl Site {
    /// Create a new `DirectWord` site.
    pub fn word(offset: u32) -> Site {
        Site {
            offset,
            kind: SiteKind::DirectWord,
        }
    }

    /// Create a new `SplitImmediate` site.
    pub fn split(offset: u32) -> Site {
        Site {
            offset,
            kind: SiteKind::SplitImmediate,
        }
    }

    /// Create a new `InjectOffset` site.
    pub fn inject_offset(offset: u32) -> Site {
        Site {
            offset,
            kind: SiteKind::InjectOffset,
        }
    }

    /// One-past-the-end image offset of this site.
    pub fn end(&self) -> usize {
        self.offset as usize + self.kind.width()
    }
}

fn read_u32(slot: &[u8]) -> u32 {
    let mut b = [0; 4];
    b.copy_from_slice(&slot[..4]);
    u32::from_le_bytes(b)
}

fn split_pair(slot: &[u8]) -> (u32, u32) {
    (read_u32(&slot[..4]), read_u32(&slot[4..8]))
}

// A 32-bit Thumb-2 instruction is stored as two little-endian halfwords, the
// first of which ends up in the low 16 bits of `insn`.

const MOV_IMM16_MASK: u32 = 0x8000_fbf0;
const MOVW_T3: u32 = 0x0000_f240;
const MOVT_T1: u32 = 0x0000_f2c0;

fn is_movw(insn: u32) -> bool {
    insn & MOV_IMM16_MASK == MOVW_T3
}

fn is_movt(insn: u32) -> bool {
    insn & MOV_IMM16_MASK == MOVT_T1
}

/// imm16 = imm4:i:imm3:imm8
fn decode_imm16(insn: u32) -> u32 {
    let upper = insn & 0xffff;
    let lower = insn >> 16;
    let imm4 = upper & 0xf;
    let i = (upper >> 10) & 1;
    let imm3 = (lower >> 12) & 0x7;
    let imm8 = lower & 0xff;
    (imm4 << 12) | (i << 11) | (imm3 << 8) | imm8
}

fn encode_imm16(insn: u32, val: u32) -> u32 {
    let upper = insn & 0xffff;
    let lower = insn >> 16;

    let imm8 = val & 0xff;
    let imm3 = (val >> 8) & 0x7;
    let i = (val >> 11) & 1;
    let imm4 = (val >> 12) & 0xf;

    let upper = (upper & !0x040f) | (i << 10) | imm4;
    let lower = (lower & !0x70ff) | (imm3 << 12) | imm8;
    (lower << 16) | upper
}

/// Encode a `MOVW rd, #imm16` / `MOVT rd, #imm16` pair loading `addr` into
/// register `rd`. Handy for building test images.
pub fn encode_split_immediate(rd: u8, addr: u32) -> [u8; 8] {
    let rd = u32::from(rd & 0xf) << 24;
    let movw = encode_imm16(MOVW_T3 | rd, addr & 0xffff);
    let movt = encode_imm16(MOVT_T1 | rd, addr >> 16);
    let mut out = [0; 8];
    out[..4].copy_from_slice(&movw.to_le_bytes());
    out[4..].copy_from_slice(&movt.to_le_bytes());
    out
}

/// Decode the address loaded by a `MOVW` / `MOVT` pair.
pub fn decode_split_immediate(slot: &[u8]) -> Result<u32, InvalidSlot> {
    SiteKind::SplitImmediate.validate(slot)?;
    let (movw, movt) = split_pair(slot);
    Ok((decode_imm16(movt) << 16) | decode_imm16(movw))
}
