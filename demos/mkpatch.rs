//! Build-time half: turn a linked firmware ELF into a patch stream.
//!
//! ```text
//! cargo run --example mkpatch -- firmware.elf firmware.patch [max-units]
//! ```
//!
//! `max-units` caps the number of units per command, for loaders whose command
//! buffer is smaller than the default.

use relopatch::Encoder;
use relopatch_elf::{ElfConfig, FirmwareImage};

pub type DynResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> DynResult<()> {
    pretty_env_logger::init();

    let mut args = std::env::args().skip(1);
    let (elf_path, out_path) = match (args.next(), args.next()) {
        (Some(elf), Some(out)) => (elf, out),
        _ => return Err("usage: mkpatch <firmware.elf> <out.patch> [max-units]".into()),
    };

    let mut builder = Encoder::builder();
    if let Some(max_units) = args.next() {
        builder = builder.max_units(max_units.parse()?);
    }
    let encoder = builder.build()?;

    let elf = std::fs::read(&elf_path)?;
    let firmware = FirmwareImage::from_elf(&elf, &ElfConfig::default())?;

    let (words, splits, offsets) = firmware.site_counts();
    eprintln!(
        "{}: {} byte image linked at {:#010x}",
        elf_path,
        firmware.image().len(),
        firmware.load_base()
    );
    eprintln!(
        "relocation sites: {} words, {} movw/movt pairs, {} offset slots",
        words, splits, offsets
    );

    let stream = firmware.encode(&encoder)?;
    std::fs::write(&out_path, &stream)?;
    eprintln!("wrote {} byte patch stream to {}", stream.len(), out_path);

    Ok(())
}
