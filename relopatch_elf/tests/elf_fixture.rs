use relopatch::apply::apply_to_vec;
use relopatch::extract::{ExtractError, RegionRule};
use relopatch::reloc::{decode_split_immediate, encode_split_immediate};
use relopatch::{Encoder, Site};
use relopatch_elf::{ElfConfig, ElfError, FirmwareImage};

const SHT_PROGBITS: u32 = 1;
const SHT_STRTAB: u32 = 3;
const SHT_NOBITS: u32 = 8;

const SHF_WRITE: u32 = 0x1;
const SHF_ALLOC: u32 = 0x2;
const SHF_EXECINSTR: u32 = 0x4;

const PT_LOAD: u32 = 1;

const EHDR_SIZE: usize = 52;
const PHDR_SIZE: usize = 32;
const SHDR_SIZE: usize = 40;

struct Section {
    name: &'static str,
    sh_type: u32,
    flags: u32,
    addr: u32,
    data: Vec<u8>,
    /// Size of a NOBITS section.
    nobits: u32,
}

impl Section {
    fn progbits(name: &'static str, flags: u32, addr: u32, data: Vec<u8>) -> Section {
        Section {
            name,
            sh_type: SHT_PROGBITS,
            flags,
            addr,
            data,
            nobits: 0,
        }
    }

    fn nobits(name: &'static str, addr: u32, size: u32) -> Section {
        Section {
            name,
            sh_type: SHT_NOBITS,
            flags: SHF_ALLOC | SHF_WRITE,
            addr,
            data: Vec::new(),
            nobits: size,
        }
    }

    fn markers(name: &'static str, addrs: &[u32]) -> Section {
        Section::progbits(name, 0, 0, words(addrs))
    }

    fn size(&self) -> u32 {
        if self.sh_type == SHT_NOBITS {
            self.nobits
        } else {
            self.data.len() as u32
        }
    }
}

/// A `PT_LOAD` segment covering a single section.
struct Segment {
    section: usize,
    paddr: u32,
    extra_mem: u32,
}

fn words(vals: &[u32]) -> Vec<u8> {
    vals.iter().flat_map(|v| v.to_le_bytes().to_vec()).collect()
}

fn put16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes())
}

fn put32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes())
}

/// Assemble a little-endian ELF32 ARM executable.
fn build_elf(sections: &[Section], segments: &[Segment]) -> Vec<u8> {
    let mut shstrtab = vec![0u8];
    let mut name_offsets = Vec::new();
    for s in sections.iter().map(|s| s.name).chain(Some(".shstrtab")) {
        name_offsets.push(shstrtab.len() as u32);
        shstrtab.extend_from_slice(s.as_bytes());
        shstrtab.push(0);
    }

    let data_start = EHDR_SIZE + PHDR_SIZE * segments.len();
    let mut file_offsets = Vec::new();
    let mut body = Vec::new();
    for s in sections {
        file_offsets.push((data_start + body.len()) as u32);
        body.extend_from_slice(&s.data);
    }
    let shstrtab_offset = (data_start + body.len()) as u32;
    body.extend_from_slice(&shstrtab);
    while body.len() % 4 != 0 {
        body.push(0);
    }
    let shoff = (data_start + body.len()) as u32;

    let mut out = Vec::new();
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1, 0]);
    out.extend_from_slice(&[0; 8]);
    put16(&mut out, 2); // ET_EXEC
    put16(&mut out, 40); // EM_ARM
    put32(&mut out, 1);
    put32(&mut out, sections.first().map(|s| s.addr).unwrap_or(0));
    put32(&mut out, if segments.is_empty() { 0 } else { EHDR_SIZE as u32 });
    put32(&mut out, shoff);
    put32(&mut out, 0x0500_0000);
    put16(&mut out, EHDR_SIZE as u16);
    put16(&mut out, PHDR_SIZE as u16);
    put16(&mut out, segments.len() as u16);
    put16(&mut out, SHDR_SIZE as u16);
    put16(&mut out, sections.len() as u16 + 2);
    put16(&mut out, sections.len() as u16 + 1);
    assert_eq!(out.len(), EHDR_SIZE);

    for seg in segments {
        let s = &sections[seg.section];
        put32(&mut out, PT_LOAD);
        put32(&mut out, file_offsets[seg.section]);
        put32(&mut out, s.addr);
        put32(&mut out, seg.paddr);
        put32(&mut out, s.data.len() as u32);
        put32(&mut out, s.data.len() as u32 + seg.extra_mem);
        put32(&mut out, 0x6);
        put32(&mut out, 4);
    }

    out.extend_from_slice(&body);

    let shdr = |out: &mut Vec<u8>, name: u32, ty: u32, flags: u32, addr: u32, offset: u32, size: u32| {
        for v in &[name, ty, flags, addr, offset, size, 0, 0, 4, 0] {
            put32(out, *v);
        }
    };
    shdr(&mut out, 0, 0, 0, 0, 0, 0);
    for (i, s) in sections.iter().enumerate() {
        shdr(&mut out, name_offsets[i], s.sh_type, s.flags, s.addr, file_offsets[i], s.size());
    }
    shdr(
        &mut out,
        name_offsets[sections.len()],
        SHT_STRTAB,
        0,
        0,
        shstrtab_offset,
        shstrtab.len() as u32,
    );

    out
}

/// `.text` in flash at 0x0800_0000, `.data` linked at 0x2000_0000 with its
/// initializer right after `.text`, `.bss` following `.data`.
fn firmware_elf() -> Vec<u8> {
    let mut text = words(&[0x0800_0008, 0xdead_beef]);
    text.extend_from_slice(&encode_split_immediate(3, 0x2000_0000));
    let data = words(&[0x0800_0004, 0]);

    let sections = [
        Section::progbits(".text", SHF_ALLOC | SHF_EXECINSTR, 0x0800_0000, text),
        Section::progbits(".data", SHF_ALLOC | SHF_WRITE, 0x2000_0000, data),
        Section::nobits(".bss", 0x2000_0008, 16),
        Section::markers(".relopatch.words", &[0x2000_0000, 0x0800_0000]),
        Section::markers(".relopatch.split", &[0x0800_0008]),
        Section::markers(".relopatch.offset", &[0x2000_0004]),
    ];
    let segments = [
        Segment {
            section: 0,
            paddr: 0x0800_0000,
            extra_mem: 0,
        },
        Segment {
            section: 1,
            paddr: 0x0800_0010,
            extra_mem: 16,
        },
    ];
    build_elf(&sections, &segments)
}

#[test]
fn flattens_sections_at_load_address() {
    let _ = pretty_env_logger::try_init();

    let fw = FirmwareImage::from_elf(&firmware_elf(), &ElfConfig::default()).unwrap();
    assert_eq!(fw.load_base(), 0x0800_0000);
    assert_eq!(fw.image().len(), 24);
    assert_eq!(&fw.image()[16..20], &0x0800_0004u32.to_le_bytes());

    assert_eq!(
        fw.layout().rules(),
        [
            RegionRule::Rom {
                link_base: 0x0800_0000,
                size: 16,
                image_offset: 0,
            },
            RegionRule::Ram {
                link_base: 0x2000_0000,
                size: 8,
                initializer: Some(16),
            },
            RegionRule::Ram {
                link_base: 0x2000_0008,
                size: 16,
                initializer: None,
            },
        ]
    );
}

#[test]
fn resolves_marker_sections() {
    let fw = FirmwareImage::from_elf(&firmware_elf(), &ElfConfig::default()).unwrap();
    assert_eq!(
        fw.sites(),
        [
            Site::word(0),
            Site::split(8),
            Site::word(16),
            Site::inject_offset(20),
        ]
    );
    assert_eq!(fw.site_counts(), (2, 1, 1));
}

#[test]
fn encode_and_relocate() {
    let fw = FirmwareImage::from_elf(&firmware_elf(), &ElfConfig::default()).unwrap();
    let stream = fw.encode(&Encoder::new()).unwrap();

    let same = apply_to_vec(&stream, 0).unwrap();
    assert_eq!(same, fw.image());

    let moved = apply_to_vec(&stream, 0x1000).unwrap();
    assert_eq!(&moved[0..4], &0x0800_1008u32.to_le_bytes());
    assert_eq!(&moved[4..8], &0xdead_beefu32.to_le_bytes());
    assert_eq!(decode_split_immediate(&moved[8..16]), Ok(0x2000_1000));
    assert_eq!(&moved[16..20], &0x0800_1004u32.to_le_bytes());
    assert_eq!(&moved[20..24], &0x1000u32.to_le_bytes());
}

#[test]
fn custom_marker_names() {
    let config = ElfConfig {
        words_section: ".fixups".into(),
        ..ElfConfig::default()
    };
    // the default words section is now just an unallocated blob
    let fw = FirmwareImage::from_elf(&firmware_elf(), &config).unwrap();
    assert_eq!(fw.site_counts(), (0, 1, 1));
}

#[test]
fn marker_in_bss_is_unpaired() {
    let sections = [
        Section::progbits(".text", SHF_ALLOC | SHF_EXECINSTR, 0x0800_0000, vec![0; 8]),
        Section::nobits(".bss", 0x2000_0000, 8),
        Section::markers(".relopatch.words", &[0x2000_0004]),
    ];
    let elf = build_elf(&sections, &[]);
    match FirmwareImage::from_elf(&elf, &ElfConfig::default()) {
        Err(ElfError::Extract(ExtractError::UnpairedRamInitializer { addr })) => {
            assert_eq!(addr, 0x2000_0004)
        }
        other => panic!("unexpected result: {:?}", other.map(|fw| fw.sites().to_vec())),
    }
}

#[test]
fn gaps_use_fill_byte() {
    let sections = [
        Section::progbits(".vectors", SHF_ALLOC, 0x0800_0000, vec![1; 4]),
        Section::progbits(".text", SHF_ALLOC | SHF_EXECINSTR, 0x0800_0008, vec![2; 4]),
    ];
    let elf = build_elf(&sections, &[]);
    let config = ElfConfig {
        fill: 0xaa,
        ..ElfConfig::default()
    };
    let fw = FirmwareImage::from_elf(&elf, &config).unwrap();
    assert_eq!(fw.image(), [1, 1, 1, 1, 0xaa, 0xaa, 0xaa, 0xaa, 2, 2, 2, 2]);
    assert!(fw.sites().is_empty());
}

#[test]
fn rejects_garbage() {
    let err = FirmwareImage::from_elf(b"definitely not an elf file", &ElfConfig::default())
        .unwrap_err();
    assert!(matches!(err, ElfError::Parse(_)));
}
