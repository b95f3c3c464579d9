use relopatch::SiteKind;

/// Names of the marker sections emitted by the toolchain.
pub const WORDS_SECTION: &str = ".relopatch.words";
/// See [`WORDS_SECTION`].
pub const SPLIT_SECTION: &str = ".relopatch.split";
/// See [`WORDS_SECTION`].
pub const OFFSET_SECTION: &str = ".relopatch.offset";

/// Knobs for [`FirmwareImage::from_elf`](crate::FirmwareImage::from_elf).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfConfig {
    /// Section listing `DirectWord` sites.
    pub words_section: String,
    /// Section listing `SplitImmediate` sites.
    pub split_section: String,
    /// Section listing the `InjectOffset` site.
    pub offset_section: String,
    /// Byte used to fill gaps between sections in the flat image.
    pub fill: u8,
}

impl Default for ElfConfig {
    fn default() -> ElfConfig {
        ElfConfig {
            words_section: WORDS_SECTION.into(),
            split_section: SPLIT_SECTION.into(),
            offset_section: OFFSET_SECTION.into(),
            // erased flash
            fill: 0xff,
        }
    }
}

impl ElfConfig {
    /// Site kind listed by the section called `name`, if it is a marker
    /// section.
    pub fn marker_kind(&self, name: &str) -> Option<SiteKind> {
        if name == self.words_section {
            Some(SiteKind::DirectWord)
        } else if name == self.split_section {
            Some(SiteKind::SplitImmediate)
        } else if name == self.offset_section {
            Some(SiteKind::InjectOffset)
        } else {
            None
        }
    }
}
