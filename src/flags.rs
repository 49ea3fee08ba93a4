#![allow(dead_code)]

use nom_derive::Nom;

/// Mach-O magic numbers. Only the 64-bit little-endian magic is expected in
/// practice (the Objective-C runtime this crate targets is LP64-only), but
/// both magics are recognised so `container::open` can fail with a precise
/// diagnostic rather than a generic parse error.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Nom)]
pub enum MHMagic {
    MhMagic = 0xfeedface,
    MhMagic64 = 0xfeedfacf,
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Nom)]
pub enum MHFileType {
    Object = 0x1,
    Execute = 0x2,
    FvmLib = 0x3,
    Core = 0x4,
    Preload = 0x5,
    Dylib = 0x6,
    Dylinker = 0x7,
    Bundle = 0x8,
    DylibStub = 0x9,
    Dsym = 0xa,
    KextBundle = 0xb,
    FileSet = 0xc,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MHFlags: u32 {
        const NOUNDEFS = 0x1;
        const INCRLINK = 0x2;
        const DYLDLINK = 0x4;
        const BINDATLOAD = 0x8;
        const PREBOUND = 0x10;
        const SPLIT_SEGS = 0x20;
        const TWOLEVEL = 0x80;
        const FORCE_FLAT = 0x100;
        const NOMULTIDEFS = 0x200;
        const APP_EXTENSION_SAFE = 0x02000000;
        const PIE = 0x200000;
    }
}

impl MHFlags {
    pub fn parse(bytes: &[u8]) -> nom::IResult<&[u8], MHFlags> {
        let (bytes, bits) = nom::number::complete::le_u32(bytes)?;
        Ok((bytes, MHFlags::from_bits_truncate(bits)))
    }
}

/// Load-command identifiers this crate actually dispatches on. Everything
/// else is walked past by `cmdsize` -- full load-command enumeration is
/// an external collaborator's job, not this crate's.
pub mod lc {
    pub const LC_SEGMENT: u32 = 0x1;
    pub const LC_SEGMENT_64: u32 = 0x19;
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Nom)]
pub enum FatMagic {
    Fat = 0xcafebabe,
    Fat64 = 0xcafebabf,
}
