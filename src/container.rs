//! Minimal Mach-O container reader: header + `LC_SEGMENT_64` enumeration,
//! and fat-binary arch slicing. Full load-command coverage belongs to an
//! external, general-purpose Mach-O reader; this module is the thin
//! stand-in that gives the addressing layer (stream.rs) what it needs -- a
//! segment/section table and an image base -- without modeling every load
//! command a complete reader would.

use std::io::{Read, Seek};

use crate::error::{AbiError, AbiResult};
use crate::fat::{FatArch, FatHeader};
use crate::flags::{lc, FatMagic, MHMagic};
use crate::header::MachHeader64;
use crate::segment::SegmentCommand64;

/// A thin (single-architecture) Mach-O image: header plus every
/// `LC_SEGMENT_64` command found in the load-command table. Other load
/// commands are skipped by `cmdsize`.
#[derive(Debug)]
pub struct MachO {
    pub header: MachHeader64,
    pub segments: Vec<SegmentCommand64>,
}

impl MachO {
    pub fn is_macho_magic(bytes: &[u8]) -> bool {
        bytes.len() >= 4
            && matches!(
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                x if x == MHMagic::MhMagic as u32 || x == MHMagic::MhMagic64 as u32
            )
    }

    pub fn parse(bytes: &[u8]) -> AbiResult<MachO> {
        let (mut cursor, header) = MachHeader64::parse(bytes)
            .map_err(|e| AbiError::open(format!("invalid Mach-O header: {e}")))?;

        if header.magic != MHMagic::MhMagic64 {
            return Err(AbiError::open(
                "only 64-bit Mach-O images are supported".to_string(),
            ));
        }

        let mut segments = Vec::new();
        for _ in 0..header.ncmds {
            if cursor.len() < 8 {
                break;
            }
            let cmd = u32::from_le_bytes([cursor[0], cursor[1], cursor[2], cursor[3]]);
            let cmdsize = u32::from_le_bytes([cursor[4], cursor[5], cursor[6], cursor[7]]);
            if cmdsize == 0 || cmdsize as usize > cursor.len() {
                return Err(AbiError::truncation(
                    "load command size runs past the end of the command area".to_string(),
                ));
            }

            if cmd == lc::LC_SEGMENT_64 {
                let (_, segment) = SegmentCommand64::parse(cursor, cmdsize)
                    .map_err(|e| AbiError::open(format!("invalid segment command: {e}")))?;
                segments.push(segment);
            }

            cursor = &cursor[cmdsize as usize..];
        }

        Ok(MachO { header, segments })
    }

    /// Every `section_64` across every segment, in file order.
    pub fn sections(&self) -> impl Iterator<Item = &crate::segment::Section64> {
        self.segments.iter().flat_map(|seg| seg.sections.iter())
    }

    pub fn section_named(&self, name: &str) -> Option<&crate::segment::Section64> {
        self.sections().find(|s| s.sectname == name)
    }

    /// The load address of the first mapped byte: the lowest `vmaddr` among
    /// `__TEXT`-like segments, used as `Image::image_base` for the
    /// tagged-pointer fixup in `stream::fix_pointer`.
    pub fn image_base(&self) -> u64 {
        self.segments
            .iter()
            .map(|s| s.vmaddr)
            .min()
            .unwrap_or(0)
    }
}

pub struct FatMachO<'a> {
    pub header: FatHeader,
    pub archs: Vec<FatArch>,
    bytes: &'a [u8],
}

impl<'a> FatMachO<'a> {
    pub fn is_fat_magic(bytes: &[u8]) -> bool {
        bytes.len() >= 4
            && matches!(
                u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                x if x == FatMagic::Fat as u32 || x == FatMagic::Fat64 as u32
            )
    }

    pub fn parse(bytes: &'a [u8]) -> AbiResult<Self> {
        let (mut cursor, header) =
            FatHeader::parse(bytes).map_err(|e| AbiError::open(format!("invalid fat header: {e}")))?;
        let mut archs = Vec::new();
        for _ in 0..header.nfat_arch {
            let (next, arch) = FatArch::parse(cursor, header.magic)
                .map_err(|e| AbiError::open(format!("invalid fat arch entry: {e}")))?;
            archs.push(arch);
            cursor = next;
        }
        Ok(FatMachO {
            header,
            archs,
            bytes,
        })
    }

    /// The byte range for a given architecture, sliced out of the fat
    /// container and handed to `MachO::parse` directly (no `FileSubset`
    /// needed: a fat binary is read fully into memory up front by
    /// `crate::parse_path`, so a plain sub-slice suffices here).
    pub fn slice(&self, cputype: crate::machine::CpuType) -> AbiResult<&'a [u8]> {
        let arch = self
            .archs
            .iter()
            .find(|a| a.cputype() == cputype)
            .ok_or_else(|| AbiError::open("no slice for the requested architecture".to_string()))?;
        let start = arch.offset() as usize;
        let end = start + arch.size() as usize;
        self.bytes
            .get(start..end)
            .ok_or_else(|| AbiError::truncation("fat arch range runs past end of file".to_string()))
    }
}

#[allow(dead_code)]
fn _assert_read_seek<T: Read + Seek>() {}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_header(ncmds: u32, sizeofcmds: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0xfeedfacfu32.to_le_bytes()); // MH_MAGIC_64
        bytes.extend_from_slice(&(12u32 | 0x01000000).to_le_bytes()); // CPU_TYPE_ARM64
        bytes.extend_from_slice(&0u32.to_le_bytes()); // cpusubtype
        bytes.extend_from_slice(&0x6u32.to_le_bytes()); // MH_DYLIB
        bytes.extend_from_slice(&ncmds.to_le_bytes());
        bytes.extend_from_slice(&sizeofcmds.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes()); // flags
        bytes.extend_from_slice(&0u32.to_le_bytes()); // reserved
        bytes
    }

    #[test]
    fn parses_header_with_no_load_commands() {
        let bytes = le_header(0, 0);
        let macho = MachO::parse(&bytes).expect("valid header");
        assert_eq!(macho.segments.len(), 0);
        assert_eq!(macho.image_base(), 0);
    }

    #[test]
    fn skips_unknown_load_commands_by_cmdsize() {
        let mut bytes = le_header(1, 16);
        bytes.extend_from_slice(&0x1bu32.to_le_bytes()); // LC_UUID
        bytes.extend_from_slice(&16u32.to_le_bytes()); // cmdsize
        bytes.extend_from_slice(&[0u8; 8]);

        let macho = MachO::parse(&bytes).expect("skips unrecognised command");
        assert_eq!(macho.segments.len(), 0);
    }
}
