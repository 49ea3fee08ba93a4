//! Component B: bit-exact on-disk record layouts for the Objective-C
//! runtime ABI. Every `read` function reads sequentially from the stream's
//! current position and leaves the stream positioned immediately after the
//! record -- callers `scoped_seek` to the record's address first.

use std::io::{Read, Seek};

use crate::error::AbiResult;
use crate::stream::ContentStream;

/// `class_data_bits_t`: the `class_t.bits` field. The low 3 bits are flags
/// (`FAST_IS_SWIFT_LEGACY`, `FAST_IS_SWIFT_STABLE`, `FAST_HAS_DEFAULT_RR`);
/// masking them off yields the `class_ro_t` (or, for realized classes, a
/// `class_rw_t`, which this crate does not distinguish -- it treats the
/// masked address as directly addressing `class_ro_t`, matching a
/// from-disk, never-realized image).
pub const CLASS_DATA_BITS_MASK: u64 = 0x00007ffffffffff8;

#[derive(Debug, Clone, Copy)]
pub struct ClassT {
    pub isa: u64,
    pub superclass: u64,
    pub cache: u64,
    pub vtable: u64,
    pub bits: u64,
}

impl ClassT {
    pub fn read<T: Read + Seek>(s: &mut ContentStream<T>) -> AbiResult<Self> {
        Ok(ClassT {
            isa: s.read_u64()?,
            superclass: s.read_u64()?,
            cache: s.read_u64()?,
            vtable: s.read_u64()?,
            bits: s.read_u64()?,
        })
    }

    pub fn class_ro_addr(&self) -> u64 {
        self.bits & CLASS_DATA_BITS_MASK
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClassRoT {
    pub flags: u32,
    pub instance_start: u32,
    pub instance_size: u32,
    pub reserved: u32,
    pub ivar_layout: u64,
    pub name: u64,
    pub base_methods: u64,
    pub base_protocols: u64,
    pub ivars: u64,
    pub weak_ivar_layout: u64,
    pub base_properties: u64,
}

impl ClassRoT {
    pub const META_CLASS: u32 = 1 << 0;
    pub const ROOT_CLASS: u32 = 1 << 1;

    pub fn read<T: Read + Seek>(s: &mut ContentStream<T>) -> AbiResult<Self> {
        Ok(ClassRoT {
            flags: s.read_u32()?,
            instance_start: s.read_u32()?,
            instance_size: s.read_u32()?,
            reserved: s.read_u32()?,
            ivar_layout: s.read_u64()?,
            name: s.read_u64()?,
            base_methods: s.read_u64()?,
            base_protocols: s.read_u64()?,
            ivars: s.read_u64()?,
            weak_ivar_layout: s.read_u64()?,
            base_properties: s.read_u64()?,
        })
    }

    pub fn is_metaclass(&self) -> bool {
        self.flags & Self::META_CLASS != 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CategoryT {
    pub name: u64,
    pub cls: u64,
    pub instance_methods: u64,
    pub class_methods: u64,
    pub protocols: u64,
    pub instance_properties: u64,
}

impl CategoryT {
    pub fn read<T: Read + Seek>(s: &mut ContentStream<T>) -> AbiResult<Self> {
        Ok(CategoryT {
            name: s.read_u64()?,
            cls: s.read_u64()?,
            instance_methods: s.read_u64()?,
            class_methods: s.read_u64()?,
            protocols: s.read_u64()?,
            instance_properties: s.read_u64()?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProtocolT {
    pub isa: u64,
    pub name: u64,
    pub protocols: u64,
    pub instance_methods: u64,
    pub class_methods: u64,
    pub optional_instance_methods: u64,
    pub optional_class_methods: u64,
    pub instance_properties: u64,
    pub size: u32,
    pub flags: u32,
    pub extended_method_types: u64,
}

impl ProtocolT {
    pub fn read<T: Read + Seek>(s: &mut ContentStream<T>) -> AbiResult<Self> {
        Ok(ProtocolT {
            isa: s.read_u64()?,
            name: s.read_u64()?,
            protocols: s.read_u64()?,
            instance_methods: s.read_u64()?,
            class_methods: s.read_u64()?,
            optional_instance_methods: s.read_u64()?,
            optional_class_methods: s.read_u64()?,
            instance_properties: s.read_u64()?,
            size: s.read_u32()?,
            flags: s.read_u32()?,
            extended_method_types: s.read_u64()?,
        })
    }
}

/// `ivar_t`. `offset_ptr` points *at* the `int32_t` offset cell rather than
/// holding the offset directly -- the runtime needs that indirection so it
/// can slide ivar offsets at load time without rewriting the metadata.
#[derive(Debug, Clone, Copy)]
pub struct IVarT {
    pub offset_ptr: u64,
    pub name: u64,
    pub type_: u64,
    pub alignment: u32,
    pub size: u32,
}

impl IVarT {
    pub fn read<T: Read + Seek>(s: &mut ContentStream<T>) -> AbiResult<Self> {
        Ok(IVarT {
            offset_ptr: s.read_u64()?,
            name: s.read_u64()?,
            type_: s.read_u64()?,
            alignment: s.read_u32()?,
            size: s.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PropertyT {
    pub name: u64,
    pub attributes: u64,
}

impl PropertyT {
    pub fn read<T: Read + Seek>(s: &mut ContentStream<T>) -> AbiResult<Self> {
        Ok(PropertyT {
            name: s.read_u64()?,
            attributes: s.read_u64()?,
        })
    }
}

/// Header shared by `method_list_t`/`ivar_list_t`/`property_list_t`: an
/// entry stride (`entsize`, with `method_list_t` additionally packing flags
/// into the same word) followed by a count. Entries must be walked at
/// `base + i * entsize`, not `base + i * sizeof(the decoded Rust struct)` --
/// `entsize` may legitimately be larger than what this crate decodes from
/// each entry, and the low bits of a method list's field double as flags.
#[derive(Debug, Clone, Copy)]
pub struct ListHeader {
    pub entsize: u32,
    pub count: u32,
    pub is_small_method_list: bool,
}

impl ListHeader {
    const METHOD_LIST_SIZE_MASK: u32 = 0x0000_fffc;
    const METHOD_LIST_FLAGS_MASK: u32 = 0xffff_0003;
    const METHOD_LIST_IS_SMALL: u32 = 0x8000_0000;

    pub fn read<T: Read + Seek>(s: &mut ContentStream<T>) -> AbiResult<Self> {
        let raw = s.read_u32()?;
        let count = s.read_u32()?;
        let flags = raw & Self::METHOD_LIST_FLAGS_MASK;
        Ok(ListHeader {
            entsize: raw & Self::METHOD_LIST_SIZE_MASK,
            count,
            is_small_method_list: flags & Self::METHOD_LIST_IS_SMALL != 0,
        })
    }

    /// Plain `ivar_list_t`/`property_list_t` headers carry no flags -- the
    /// whole first word is the entry size.
    pub fn read_plain<T: Read + Seek>(s: &mut ContentStream<T>) -> AbiResult<Self> {
        let entsize = s.read_u32()?;
        let count = s.read_u32()?;
        Ok(ListHeader {
            entsize,
            count,
            is_small_method_list: false,
        })
    }
}

/// `protocol_list_t`: pointer-sized count, followed by that many
/// pointer-sized entries (not entsize-driven -- protocol lists predate the
/// entsize convention and are always `uintptr_t`-stride).
pub struct ProtocolListHeader {
    pub count: u64,
}

impl ProtocolListHeader {
    pub fn read<T: Read + Seek>(s: &mut ContentStream<T>) -> AbiResult<Self> {
        Ok(ProtocolListHeader {
            count: s.read_u64()?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BigMethodT {
    pub name: u64,
    pub types: u64,
    pub imp: u64,
}

impl BigMethodT {
    pub fn read<T: Read + Seek>(s: &mut ContentStream<T>) -> AbiResult<Self> {
        Ok(BigMethodT {
            name: s.read_u64()?,
            types: s.read_u64()?,
            imp: s.read_u64()?,
        })
    }
}

/// `small_method_t`: three `i32` offsets, each relative to *that field's own
/// address*. `name` resolves to a selector-reference cell
/// (one further pointer dereference); `types`/`imp` resolve directly.
#[derive(Debug, Clone, Copy)]
pub struct SmallMethodT {
    pub name_rel: i32,
    pub types_rel: i32,
    pub imp_rel: i32,
}

impl SmallMethodT {
    pub fn read<T: Read + Seek>(s: &mut ContentStream<T>) -> AbiResult<Self> {
        Ok(SmallMethodT {
            name_rel: s.read_i32()?,
            types_rel: s.read_i32()?,
            imp_rel: s.read_i32()?,
        })
    }
}
