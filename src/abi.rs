//! Component F: assembling parsed entities into one image-wide view.
//!
//! Walks the fixed `__objc_classlist`/`__objc_catlist`/`__objc_protolist`
//! pointer tables, parsing every entry through `entities::ParseContext`, and
//! additionally surfaces the `__objc_imageinfo` record and the four
//! reference tables (`__objc_selrefs`/`__objc_classrefs`/
//! `__objc_superrefs`/`__objc_protorefs`) a complete reader exposes
//! alongside the three owned entity sequences.

use std::collections::HashMap;
use std::io::{Read, Seek};
use std::sync::Arc;

use crate::container::MachO;
use crate::entities::{Category, Class, ParseContext, Protocol};
use crate::error::AbiResult;
use crate::stream::ContentStream;

/// `objc_image_info`: a version word (always 0 in every image this crate
/// has seen) and a flags word whose low bits record the Swift ABI version
/// and whether the image was compiled with ARC.
#[derive(Debug, Clone, Copy)]
pub struct ObjCImageInfo {
    pub version: u32,
    pub flags: u32,
}

impl ObjCImageInfo {
    const SUPPORTS_GC: u32 = 1 << 1;
    const REQUIRES_GC: u32 = 1 << 2;
    const IS_SIMULATED: u32 = 1 << 5;
    const HAS_CATEGORY_CLASS_PROPERTIES: u32 = 1 << 6;

    pub fn supports_gc(&self) -> bool {
        self.flags & Self::SUPPORTS_GC != 0
    }

    pub fn requires_gc(&self) -> bool {
        self.flags & Self::REQUIRES_GC != 0
    }

    pub fn is_simulated(&self) -> bool {
        self.flags & Self::IS_SIMULATED != 0
    }

    pub fn has_category_class_properties(&self) -> bool {
        self.flags & Self::HAS_CATEGORY_CLASS_PROPERTIES != 0
    }

    pub fn swift_version(&self) -> u8 {
        ((self.flags >> 8) & 0xff) as u8
    }
}

/// The fully assembled Objective-C metadata for one architecture slice.
#[derive(Debug)]
pub struct Abi {
    pub classes: Vec<Arc<Class>>,
    pub categories: Vec<Category>,
    pub protocols: Vec<Arc<Protocol>>,
    pub image_info: Option<ObjCImageInfo>,
    pub selector_references: Vec<String>,
    pub class_references: Vec<Arc<Class>>,
    pub superclass_references: Vec<Arc<Class>>,
    pub protocol_references: Vec<Arc<Protocol>>,
    classes_by_name: HashMap<String, Arc<Class>>,
    protocols_by_name: HashMap<String, Arc<Protocol>>,
}

impl Abi {
    pub fn get_class(&self, name: &str) -> Option<&Arc<Class>> {
        self.classes_by_name.get(name)
    }

    pub fn get_protocol(&self, name: &str) -> Option<&Arc<Protocol>> {
        self.protocols_by_name.get(name)
    }

    pub fn get_category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }
}

/// Read a pointer table section as a flat list of (fixed) virtual
/// addresses. Every `__objc_*list`/`__objc_*refs` section this crate reads
/// is a dense array of pointer-sized words, so this one reader serves all
/// of them.
fn read_pointer_table<T: Read + Seek>(
    stream: &mut ContentStream<T>,
    section: &crate::segment::Section64,
) -> AbiResult<Vec<u64>> {
    let count = section.size / 8;
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count {
        let offset = section.offset as u64 + i * 8;
        let raw = {
            let _g = stream.scoped_seek(offset)?;
            stream.read_u64()?
        };
        if raw != 0 {
            out.push(stream.fix_pointer(raw));
        }
    }
    Ok(out)
}

fn read_image_info<T: Read + Seek>(
    stream: &mut ContentStream<T>,
    section: &crate::segment::Section64,
) -> AbiResult<ObjCImageInfo> {
    let _g = stream.scoped_seek(section.offset as u64)?;
    Ok(ObjCImageInfo {
        version: stream.read_u32()?,
        flags: stream.read_u32()?,
    })
}

/// Assemble an `Abi` from a parsed container and the bytes it was parsed
/// from. `stream` must already cover the same architecture slice as `macho`.
pub fn build<T: Read + Seek>(macho: &MachO, stream: &mut ContentStream<T>) -> AbiResult<Abi> {
    let classlist = macho
        .section_named("__objc_classlist")
        .map(|s| read_pointer_table(stream, s))
        .transpose()?
        .unwrap_or_default();
    let catlist = macho
        .section_named("__objc_catlist")
        .map(|s| read_pointer_table(stream, s))
        .transpose()?
        .unwrap_or_default();
    let protolist = macho
        .section_named("__objc_protolist")
        .map(|s| read_pointer_table(stream, s))
        .transpose()?
        .unwrap_or_default();
    let selrefs = macho
        .section_named("__objc_selrefs")
        .map(|s| read_pointer_table(stream, s))
        .transpose()?
        .unwrap_or_default();
    let classrefs = macho
        .section_named("__objc_classrefs")
        .map(|s| read_pointer_table(stream, s))
        .transpose()?
        .unwrap_or_default();
    let superrefs = macho
        .section_named("__objc_superrefs")
        .map(|s| read_pointer_table(stream, s))
        .transpose()?
        .unwrap_or_default();
    let protorefs = macho
        .section_named("__objc_protorefs")
        .map(|s| read_pointer_table(stream, s))
        .transpose()?
        .unwrap_or_default();
    let image_info = macho
        .section_named("__objc_imageinfo")
        .map(|s| read_image_info(stream, s))
        .transpose()?;

    let mut ctx = ParseContext::new(stream);

    let mut classes = Vec::with_capacity(classlist.len());
    for va in &classlist {
        classes.push(ctx.parse_class(*va)?);
    }

    let mut protocols = Vec::with_capacity(protolist.len());
    for va in &protolist {
        protocols.push(ctx.parse_protocol(*va)?);
    }

    let mut categories = Vec::with_capacity(catlist.len());
    for va in &catlist {
        categories.push(ctx.parse_category(*va)?);
    }

    let mut selector_references = Vec::with_capacity(selrefs.len());
    for va in &selrefs {
        selector_references.push(ctx.stream.read_cstr_at_va(*va)?);
    }

    let mut class_references = Vec::with_capacity(classrefs.len());
    for va in &classrefs {
        class_references.push(ctx.parse_class(*va)?);
    }

    let mut superclass_references = Vec::with_capacity(superrefs.len());
    for va in &superrefs {
        superclass_references.push(ctx.parse_class(*va)?);
    }

    let mut protocol_references = Vec::with_capacity(protorefs.len());
    for va in &protorefs {
        protocol_references.push(ctx.parse_protocol(*va)?);
    }

    let classes_by_name = classes
        .iter()
        .map(|c| (c.name.clone(), c.clone()))
        .collect();
    let protocols_by_name = protocols
        .iter()
        .map(|p| (p.name.clone(), p.clone()))
        .collect();

    Ok(Abi {
        classes,
        categories,
        protocols,
        image_info,
        selector_references,
        class_references,
        superclass_references,
        protocol_references,
        classes_by_name,
        protocols_by_name,
    })
}

#[cfg(test)]
mod tests {
    use crate::render::Declaration;

    /// Builds the raw bytes of one `__DATA` segment in-order, patching
    /// forward references (a pointer field is reserved as zero, then
    /// overwritten once the value it points at has actually been written)
    /// rather than hand-computing offsets up front.
    struct SegmentBuilder {
        vmaddr_base: u64,
        buf: Vec<u8>,
    }

    impl SegmentBuilder {
        fn new(vmaddr_base: u64) -> Self {
            SegmentBuilder {
                vmaddr_base,
                buf: Vec::new(),
            }
        }

        fn here(&self) -> u64 {
            self.vmaddr_base + self.buf.len() as u64
        }

        fn align8(&mut self) {
            while self.buf.len() % 8 != 0 {
                self.buf.push(0);
            }
        }

        fn u32(&mut self, v: u32) {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }

        fn i32(&mut self, v: i32) {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }

        /// Reserve a pointer-sized field, returning its byte position for a
        /// later `patch`.
        fn u64_placeholder(&mut self) -> usize {
            let at = self.buf.len();
            self.buf.extend_from_slice(&0u64.to_le_bytes());
            at
        }

        fn u64(&mut self, v: u64) {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }

        fn patch(&mut self, at: usize, v: u64) {
            self.buf[at..at + 8].copy_from_slice(&v.to_le_bytes());
        }

        fn cstr(&mut self, s: &str) -> u64 {
            let va = self.here();
            self.buf.extend_from_slice(s.as_bytes());
            self.buf.push(0);
            va
        }
    }

    /// Assembles a minimal thin Mach-O carrying one `__objc_classlist` entry
    /// for `Foo : NSObject <NSCopying>` with ivar `_x` (`i`) and method
    /// `-init`. `NSObject` is reachable only via
    /// `Foo`'s superclass pointer, not listed itself, matching the expected
    /// `ABI.classes.len == 1`.
    fn foo_nsobject_ncopying_fixture() -> Vec<u8> {
        let vmaddr_base = 0x4000u64;
        let fileoff_base = 0x1000u64;

        let mut seg = SegmentBuilder::new(vmaddr_base);

        // NSObject: a root class_t/class_ro_t with a name and nothing else.
        seg.align8();
        let nsobject_class_t_va = seg.here();
        seg.u64(0); // isa
        seg.u64(0); // superclass
        seg.u64(0); // cache
        seg.u64(0); // vtable
        let nsobject_bits_patch = seg.u64_placeholder();

        seg.align8();
        let nsobject_ro_va = seg.here();
        seg.patch(nsobject_bits_patch, nsobject_ro_va);
        seg.u32(0); // flags
        seg.u32(0); // instance_start
        seg.u32(0); // instance_size
        seg.u32(0); // reserved
        seg.u64(0); // ivar_layout
        let nsobject_name_patch = seg.u64_placeholder();
        seg.u64(0); // base_methods
        seg.u64(0); // base_protocols
        seg.u64(0); // ivars
        seg.u64(0); // weak_ivar_layout
        seg.u64(0); // base_properties

        let nsobject_name_va = seg.cstr("NSObject");
        seg.patch(nsobject_name_patch, nsobject_name_va);

        // classlist: a single entry pointing at Foo's class_t (patched once
        // Foo's address is known).
        seg.align8();
        let classlist_va = seg.here();
        let foo_class_t_patch = seg.u64_placeholder();

        seg.align8();
        let foo_class_t_va = seg.here();
        seg.u64(0); // isa (no metaclass needed for this fixture)
        seg.patch(foo_class_t_patch, foo_class_t_va);
        seg.u64(nsobject_class_t_va); // superclass
        seg.u64(0); // cache
        seg.u64(0); // vtable
        let foo_bits_patch = seg.u64_placeholder();

        seg.align8();
        let foo_ro_va = seg.here();
        seg.patch(foo_bits_patch, foo_ro_va);
        seg.u32(0); // flags
        seg.u32(0); // instance_start
        seg.u32(8); // instance_size
        seg.u32(0); // reserved
        seg.u64(0); // ivar_layout
        let foo_name_patch = seg.u64_placeholder();
        let foo_methods_patch = seg.u64_placeholder();
        let foo_protocols_patch = seg.u64_placeholder();
        let foo_ivars_patch = seg.u64_placeholder();
        seg.u64(0); // weak_ivar_layout
        seg.u64(0); // base_properties

        let foo_name_va = seg.cstr("Foo");
        seg.patch(foo_name_patch, foo_name_va);

        // method list: one big (non-small) method, `-init`.
        seg.align8();
        let methods_va = seg.here();
        seg.patch(foo_methods_patch, methods_va);
        seg.u32(24); // entsize (big_method_t, 3 pointers)
        seg.u32(1); // count
        let sel_patch = seg.u64_placeholder();
        let types_patch = seg.u64_placeholder();
        seg.u64(0x1000); // imp

        let sel_va = seg.cstr("init");
        seg.patch(sel_patch, sel_va);
        let types_va = seg.cstr("v16@0:8");
        seg.patch(types_patch, types_va);

        // protocol list: a single conformance to NSCopying.
        seg.align8();
        let protolist_va = seg.here();
        seg.patch(foo_protocols_patch, protolist_va);
        seg.u64(1); // count
        let proto_ptr_patch = seg.u64_placeholder();

        seg.align8();
        let protocol_va = seg.here();
        seg.patch(proto_ptr_patch, protocol_va);
        seg.u64(0); // isa
        let protoname_patch = seg.u64_placeholder();
        seg.u64(0); // protocols
        seg.u64(0); // instance_methods
        seg.u64(0); // class_methods
        seg.u64(0); // optional_instance_methods
        seg.u64(0); // optional_class_methods
        seg.u64(0); // instance_properties
        seg.u32(0); // size
        seg.u32(0); // flags
        seg.u64(0); // extended_method_types

        let protoname_va = seg.cstr("NSCopying");
        seg.patch(protoname_patch, protoname_va);

        // ivar list: one ivar, `_x` of type `i`.
        seg.align8();
        let ivarlist_va = seg.here();
        seg.patch(foo_ivars_patch, ivarlist_va);
        seg.u32(32); // entsize (ivar_t)
        seg.u32(1); // count
        let offsetptr_patch = seg.u64_placeholder();
        let ivarname_patch = seg.u64_placeholder();
        let ivartype_patch = seg.u64_placeholder();
        seg.i32(4); // alignment
        seg.i32(4); // size

        let offset_cell_va = seg.here();
        seg.i32(0);
        seg.patch(offsetptr_patch, offset_cell_va);

        let ivarname_va = seg.cstr("_x");
        seg.patch(ivarname_patch, ivarname_va);
        let ivartype_va = seg.cstr("i");
        seg.patch(ivartype_patch, ivartype_va);

        seg.align8();
        let seg_len = seg.buf.len() as u64;

        let mut classlist_segname = [0u8; 16];
        classlist_segname[..6].copy_from_slice(b"__DATA");
        let mut classlist_sectname = [0u8; 16];
        classlist_sectname.copy_from_slice(b"__objc_classlist");

        const SECTION_SIZE: u32 = 80;
        let cmdsize = 72u32 + SECTION_SIZE;

        let mut file = Vec::new();
        // mach_header_64
        file.extend_from_slice(&0xfeedfacfu32.to_le_bytes()); // MH_MAGIC_64
        file.extend_from_slice(&(12u32 | 0x0100_0000).to_le_bytes()); // CPU_TYPE_ARM64
        file.extend_from_slice(&0u32.to_le_bytes()); // cpusubtype
        file.extend_from_slice(&0x6u32.to_le_bytes()); // MH_DYLIB
        file.extend_from_slice(&1u32.to_le_bytes()); // ncmds
        file.extend_from_slice(&cmdsize.to_le_bytes()); // sizeofcmds
        file.extend_from_slice(&0u32.to_le_bytes()); // flags
        file.extend_from_slice(&0u32.to_le_bytes()); // reserved

        // LC_SEGMENT_64
        file.extend_from_slice(&0x19u32.to_le_bytes()); // cmd
        file.extend_from_slice(&cmdsize.to_le_bytes());
        file.extend_from_slice(&classlist_segname);
        file.extend_from_slice(&vmaddr_base.to_le_bytes());
        file.extend_from_slice(&seg_len.to_le_bytes()); // vmsize
        file.extend_from_slice(&fileoff_base.to_le_bytes());
        file.extend_from_slice(&seg_len.to_le_bytes()); // filesize
        file.extend_from_slice(&7u32.to_le_bytes()); // maxprot (rwx)
        file.extend_from_slice(&7u32.to_le_bytes()); // initprot
        file.extend_from_slice(&1u32.to_le_bytes()); // nsects
        file.extend_from_slice(&0u32.to_le_bytes()); // flags

        // section_64 __objc_classlist
        file.extend_from_slice(&classlist_sectname);
        file.extend_from_slice(&classlist_segname);
        file.extend_from_slice(&classlist_va.to_le_bytes()); // addr
        file.extend_from_slice(&8u64.to_le_bytes()); // size: one entry
        file.extend_from_slice(&(fileoff_base as u32 + (classlist_va - vmaddr_base) as u32).to_le_bytes()); // offset
        file.extend_from_slice(&0u32.to_le_bytes()); // align
        file.extend_from_slice(&0u32.to_le_bytes()); // reloff
        file.extend_from_slice(&0u32.to_le_bytes()); // nreloc
        file.extend_from_slice(&0u32.to_le_bytes()); // flags (sectype/secattrs)
        file.extend_from_slice(&0u32.to_le_bytes()); // reserved1
        file.extend_from_slice(&0u32.to_le_bytes()); // reserved2
        file.extend_from_slice(&0u32.to_le_bytes()); // reserved3

        while file.len() < fileoff_base as usize {
            file.push(0);
        }
        file.extend_from_slice(&seg.buf);

        file
    }

    #[test]
    fn end_to_end_class_with_superclass_protocol_ivar_and_method() {
        let bytes = foo_nsobject_ncopying_fixture();
        let abi = crate::parse(&bytes).expect("fixture parses");

        assert_eq!(abi.classes.len(), 1);
        let foo = &abi.classes[0];
        assert_eq!(foo.name, "Foo");
        assert_eq!(
            foo.super_class.as_ref().map(|c| c.name.as_str()),
            Some("NSObject")
        );
        assert_eq!(foo.ivars[0].name, "_x");
        assert_eq!(foo.methods[0].selector, "init");
        assert_eq!(foo.protocols[0].name, "NSCopying");

        let decl = foo.declaration();
        assert!(decl.starts_with("@interface Foo: NSObject <NSCopying>\n"));
        assert!(decl.contains("int _x;"));
        assert!(decl.contains("- (void)init // 0x1000"));
    }
}
