#![allow(dead_code)]

use nom::IResult;

use crate::flags::{MHFileType, MHFlags, MHMagic};
use crate::machine::CpuType;

/// The fixed-size 64-bit Mach-O header. Only LP64 images are supported; a
/// 32-bit `MhMagic` header is rejected by `container::open` before this type
/// is ever constructed, since no LP32 Objective-C runtime exists in
/// practice.
#[derive(Debug, Clone, Copy)]
pub struct MachHeader64 {
    pub magic: MHMagic,
    pub cputype: CpuType,
    pub cpusubtype: i32,
    pub filetype: MHFileType,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: MHFlags,
    pub reserved: u32,
}

impl MachHeader64 {
    pub fn parse(bytes: &[u8]) -> IResult<&[u8], MachHeader64> {
        let (bytes, magic) = MHMagic::parse(bytes)?;
        let (bytes, cputype) = CpuType::parse(bytes)?;
        let (bytes, cpusubtype) = nom::number::complete::le_i32(bytes)?;
        let (bytes, filetype) = MHFileType::parse(bytes)?;
        let (bytes, ncmds) = nom::number::complete::le_u32(bytes)?;
        let (bytes, sizeofcmds) = nom::number::complete::le_u32(bytes)?;
        let (bytes, flags) = MHFlags::parse(bytes)?;
        let (bytes, reserved) = nom::number::complete::le_u32(bytes)?;

        Ok((
            bytes,
            MachHeader64 {
                magic,
                cputype,
                cpusubtype,
                filetype,
                ncmds,
                sizeofcmds,
                flags,
                reserved,
            },
        ))
    }
}
