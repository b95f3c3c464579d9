//! Load-time half: replay a patch stream at a runtime offset.
//!
//! The stream is pulled through a `BufReader` one byte at a time, the same way
//! a bootloader would pull it off a serial line, and the relocated image is
//! written straight to the output file.
//!
//! ```text
//! cargo run --example loadpatch -- firmware.patch 0x8000 firmware.bin
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter};

use relopatch::target::WriteTarget;
use relopatch::Applier;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error>>;

fn parse_offset(s: &str) -> DynResult<u32> {
    let offset = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16)?,
        None => s.parse()?,
    };
    Ok(offset)
}

fn main() -> DynResult<()> {
    pretty_env_logger::init();

    let mut args = std::env::args().skip(1);
    let (in_path, offset, out_path) = match (args.next(), args.next(), args.next()) {
        (Some(input), Some(offset), Some(out)) => (input, parse_offset(&offset)?, out),
        _ => return Err("usage: loadpatch <in.patch> <offset> <out.bin>".into()),
    };

    let mut conn = BufReader::new(File::open(&in_path)?);
    let mut target = WriteTarget::new(BufWriter::new(File::create(&out_path)?));

    let mut applier = Applier::builder(offset).require_end(true).build()?;
    let summary = applier.run_blocking(&mut target, &mut conn)?;

    eprintln!(
        "applied {} commands ({} sites) at offset {:#x}: {} bytes written to {}",
        summary.commands, summary.sites, offset, summary.bytes_written, out_path
    );

    Ok(())
}
