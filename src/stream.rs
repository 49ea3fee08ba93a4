//! Component A: addressing and bounded random-access reads.
//!
//! `ContentStream` wraps any `Read + Seek` source (typically a
//! `Cursor<Vec<u8>>` over an already-sliced architecture image, or a
//! `FileSubset` over a fat binary's arch range) and layers on:
//!
//! - virtual-address → file-offset translation via the segment table,
//! - Objective-C's tagged-pointer "fix" used by every on-disk pointer field,
//! - relative-offset arithmetic used by "small" method records,
//! - a scoped-seek guard so a recursive parse can wander off and restore the
//!   caller's position on return.

use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::error::{AbiError, AbiResult};
use crate::segment::Section64;

/// One `vmaddr..vmaddr+vmsize -> fileoff` mapping, built once from a
/// parsed image's segment table.
#[derive(Debug, Clone, Copy)]
struct Mapping {
    vmaddr: u64,
    vmsize: u64,
    fileoff: u64,
}

/// Virtual-address space of one architecture slice: the mappings needed to
/// translate a pointer found in the Objective-C sections back to a file
/// offset, plus the image's load address for `fix_pointer`.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    mappings: Vec<Mapping>,
    pub image_base: u64,
}

impl AddressSpace {
    pub fn from_segments<'a>(segments: impl Iterator<Item = &'a crate::segment::SegmentCommand64>, image_base: u64) -> Self {
        let mappings = segments
            .map(|s| Mapping {
                vmaddr: s.vmaddr,
                vmsize: s.vmsize,
                fileoff: s.fileoff,
            })
            .collect();
        AddressSpace {
            mappings,
            image_base,
        }
    }

    /// Translate a virtual address to a file offset by locating the segment
    /// that covers it.
    pub fn to_file_offset(&self, va: u64) -> AbiResult<u64> {
        for m in &self.mappings {
            if va >= m.vmaddr && va < m.vmaddr + m.vmsize {
                return Ok(m.fileoff + (va - m.vmaddr));
            }
        }
        Err(AbiError::invariant(format!(
            "virtual address 0x{va:x} is not covered by any segment"
        )))
    }

    /// Apply the chained-fixup tagged-pointer patch: mask
    /// off the tag bits, then rebase against the image's load address if the
    /// masked value looks like a link-time-relative offset rather than an
    /// absolute VA.
    pub fn fix_pointer(&self, raw: u64) -> u64 {
        let patched = raw & ((1u64 << 51) - 1);
        if self.image_base > 0 && patched < self.image_base {
            patched + self.image_base
        } else {
            patched
        }
    }
}

/// A RAII guard returned by `ContentStream::scoped_seek`: restores the
/// stream's prior position when dropped, so a recursive parse can seek
/// anywhere and the caller resumes exactly where it left off.
pub struct ScopedSeek<'a, T: Read + Seek> {
    stream: &'a mut ContentStream<T>,
    restore_to: u64,
}

impl<'a, T: Read + Seek> Drop for ScopedSeek<'a, T> {
    fn drop(&mut self) {
        let _ = self.stream.seek(self.restore_to);
    }
}

impl<'a, T: Read + Seek> std::ops::Deref for ScopedSeek<'a, T> {
    type Target = ContentStream<T>;
    fn deref(&self) -> &Self::Target {
        self.stream
    }
}

impl<'a, T: Read + Seek> std::ops::DerefMut for ScopedSeek<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.stream
    }
}

/// The bounded, seekable view over one architecture's raw bytes that every
/// entity parser reads through.
pub struct ContentStream<T: Read + Seek> {
    inner: T,
    pub space: AddressSpace,
}

impl ContentStream<Cursor<Vec<u8>>> {
    pub fn from_bytes(bytes: Vec<u8>, space: AddressSpace) -> Self {
        ContentStream {
            inner: Cursor::new(bytes),
            space,
        }
    }
}

impl<T: Read + Seek> ContentStream<T> {
    pub fn new(inner: T, space: AddressSpace) -> Self {
        ContentStream { inner, space }
    }

    pub fn pos(&mut self) -> AbiResult<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek(&mut self, offset: u64) -> AbiResult<u64> {
        Ok(self.inner.seek(SeekFrom::Start(offset))?)
    }

    /// Seek to `offset`, returning a guard that restores the current
    /// position on drop.
    pub fn scoped_seek(&mut self, offset: u64) -> AbiResult<ScopedSeek<'_, T>> {
        let restore_to = self.pos()?;
        self.seek(offset)?;
        Ok(ScopedSeek {
            stream: self,
            restore_to,
        })
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> AbiResult<()> {
        self.inner
            .read_exact(buf)
            .map_err(|e| AbiError::truncation(e.to_string()))
    }

    pub fn read_u8(&mut self) -> AbiResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u32(&mut self) -> AbiResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_i32(&mut self) -> AbiResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> AbiResult<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Peek a u64 at `offset` without disturbing the current position.
    pub fn peek_u64_at(&mut self, offset: u64) -> AbiResult<u64> {
        let guard_pos = self.pos()?;
        self.seek(offset)?;
        let val = self.read_u64();
        self.seek(guard_pos)?;
        val
    }

    /// Read a NUL-terminated string starting at a *file offset* (not a VA).
    pub fn read_cstr_at_offset(&mut self, offset: u64) -> AbiResult<String> {
        let guard_pos = self.pos()?;
        self.seek(offset)?;
        let mut bytes = Vec::new();
        loop {
            let b = self.read_u8()?;
            if b == 0 {
                break;
            }
            bytes.push(b);
            if bytes.len() > 4096 {
                return Err(AbiError::truncation(
                    "string exceeds the 4096-byte sanity bound without a terminator".to_string(),
                ));
            }
        }
        self.seek(guard_pos)?;
        String::from_utf8(bytes).map_err(|e| AbiError::truncation(e.to_string()))
    }

    /// Read a NUL-terminated string located at virtual address `va`
    /// (translates then delegates to `read_cstr_at_offset`).
    pub fn read_cstr_at_va(&mut self, va: u64) -> AbiResult<String> {
        let offset = self.space.to_file_offset(va)?;
        self.read_cstr_at_offset(offset)
    }

    pub fn fix_pointer(&self, raw: u64) -> u64 {
        self.space.fix_pointer(raw)
    }

    pub fn va_to_offset(&self, va: u64) -> AbiResult<u64> {
        self.space.to_file_offset(va)
    }
}

/// Relative-offset arithmetic used by "small" method records: a 32-bit
/// signed offset is applied relative to the *address of the field itself*,
/// not the start of the enclosing record.
pub fn apply_relative_offset(field_address: u64, offset: i32) -> u64 {
    (field_address as i64 + offset as i64) as u64
}

pub fn section_file_range(section: &Section64) -> (u64, u64) {
    (section.offset as u64, section.size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space_with_one_segment(vmaddr: u64, fileoff: u64, size: u64, image_base: u64) -> AddressSpace {
        AddressSpace {
            mappings: vec![Mapping {
                vmaddr,
                vmsize: size,
                fileoff,
            }],
            image_base,
        }
    }

    #[test]
    fn translates_va_within_segment() {
        let space = space_with_one_segment(0x1000, 0x400, 0x200, 0);
        assert_eq!(space.to_file_offset(0x1010).unwrap(), 0x410);
    }

    #[test]
    fn rejects_va_outside_any_segment() {
        let space = space_with_one_segment(0x1000, 0x400, 0x200, 0);
        assert!(space.to_file_offset(0x5000).is_err());
    }

    #[test]
    fn fix_pointer_masks_tag_bits_and_rebases_relative_offsets() {
        let space = space_with_one_segment(0x1000, 0x400, 0x200, 0x1_0000_0000);
        // A small link-time-relative offset under the image base gets rebased.
        assert_eq!(space.fix_pointer(0x1000), 0x1_0000_1000);
        // An already-absolute VA above the base is passed through unchanged
        // once the tag bits (top 13) are masked off.
        let tagged = 0x1_0000_2000u64 | (0x1u64 << 60);
        assert_eq!(space.fix_pointer(tagged), 0x1_0000_2000);
    }

    #[test]
    fn apply_relative_offset_is_relative_to_field_address() {
        assert_eq!(apply_relative_offset(0x2000, -8), 0x1ff8);
        assert_eq!(apply_relative_offset(0x2000, 0x100), 0x2100);
    }

    #[test]
    fn scoped_seek_restores_position_on_drop() {
        let bytes = vec![0u8; 64];
        let space = space_with_one_segment(0, 0, 64, 0);
        let mut stream = ContentStream::from_bytes(bytes, space);
        stream.seek(10).unwrap();
        {
            let mut guard = stream.scoped_seek(40).unwrap();
            assert_eq!(guard.pos().unwrap(), 40);
        }
        assert_eq!(stream.pos().unwrap(), 10);
    }
}
