//! Component E: entity parsers. Each `parse_*` function takes a
//! `ParseContext` positioned anywhere and a *virtual address*, seeks there
//! (restoring the caller's position on return), reads the raw record
//! (Component B), resolves referenced strings and sub-lists through
//! further recursive calls, and returns an owned entity.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek};
use std::sync::Arc;

use crate::error::AbiResult;
use crate::records::{
    BigMethodT, CategoryT, ClassRoT, ClassT, IVarT, ListHeader, ProtocolListHeader, ProtocolT,
    PropertyT, SmallMethodT,
};
use crate::stream::{apply_relative_offset, ContentStream};

#[derive(Debug, Clone)]
pub struct Method {
    pub locator: u64,
    pub selector: String,
    pub type_encoding: String,
    /// For a big method this is the resolved implementation VA
    /// (`big_method_t.imp`); for a small method it is `small_method_t.imp_rel`
    /// kept as-is, sign-extended into `i64` rather than resolved against the
    /// entry's address.
    pub imp: i64,
    pub is_small: bool,
    pub is_class_method: bool,
}

#[derive(Debug, Clone)]
pub struct IVar {
    pub locator: u64,
    pub name: String,
    pub type_encoding: String,
    pub offset: i32,
    pub alignment: u32,
    pub size: u32,
}

#[derive(Debug, Clone)]
pub struct Property {
    pub locator: u64,
    pub name: String,
    pub attributes: String,
}

#[derive(Debug, Clone)]
pub struct Protocol {
    pub locator: u64,
    pub name: String,
    pub protocols: Vec<Arc<Protocol>>,
    pub instance_methods: Vec<Method>,
    pub class_methods: Vec<Method>,
    pub optional_instance_methods: Vec<Method>,
    pub optional_class_methods: Vec<Method>,
    pub instance_properties: Vec<Property>,
}

#[derive(Debug, Clone)]
pub struct Class {
    pub locator: u64,
    pub name: String,
    pub flags: u32,
    pub is_metaclass: bool,
    pub super_class: Option<Arc<Class>>,
    pub meta_class: Option<Arc<Class>>,
    pub methods: Vec<Method>,
    pub ivars: Vec<IVar>,
    pub protocols: Vec<Arc<Protocol>>,
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone)]
pub struct Category {
    pub locator: u64,
    pub name: String,
    pub base_class: Option<Arc<Class>>,
    pub instance_methods: Vec<Method>,
    pub class_methods: Vec<Method>,
    pub protocols: Vec<Arc<Protocol>>,
    pub instance_properties: Vec<Property>,
}

/// Per-parse memoization and cycle-breaking state. Deliberately *not* a
/// process-global cache keyed only by virtual address: two independent
/// parses running concurrently against different images can share an
/// address, which would alias unrelated entities together. Scoping the
/// cache to one `ParseContext` keeps the memoization win (classes and
/// protocols referenced from many places are parsed once) without that
/// hazard.
pub struct ParseContext<'s, T: Read + Seek> {
    pub stream: &'s mut ContentStream<T>,
    classes: HashMap<u64, Arc<Class>>,
    protocols: HashMap<u64, Arc<Protocol>>,
    classes_in_progress: HashSet<u64>,
    protocols_in_progress: HashSet<u64>,
}

impl<'s, T: Read + Seek> ParseContext<'s, T> {
    pub fn new(stream: &'s mut ContentStream<T>) -> Self {
        ParseContext {
            stream,
            classes: HashMap::new(),
            protocols: HashMap::new(),
            classes_in_progress: HashSet::new(),
            protocols_in_progress: HashSet::new(),
        }
    }

    fn read_name_at(&mut self, va: u64) -> AbiResult<String> {
        self.stream.read_cstr_at_va(self.stream.fix_pointer(va))
    }

    /// Read a `method_list_t`/`ivar_list_t`/`property_list_t` header at
    /// `list_va`, returning the fixed list VA and the header. Entries live
    /// at `fixed_list_va + 8 + i * entsize` -- relative-offset math (small
    /// methods) needs that *virtual* address, not a file offset, since the
    /// linker computed the offsets against VAs.
    fn read_list_header(
        &mut self,
        list_va: u64,
        read: impl FnOnce(&mut ContentStream<T>) -> AbiResult<ListHeader>,
    ) -> AbiResult<(u64, ListHeader)> {
        let fixed = self.stream.fix_pointer(list_va);
        let offset = self.stream.va_to_offset(fixed)?;
        let header = {
            let _guard = self.stream.scoped_seek(offset)?;
            read(self.stream)?
        };
        Ok((fixed, header))
    }

    fn parse_method_list(&mut self, list_va: u64, is_class_method: bool) -> AbiResult<Vec<Method>> {
        if list_va == 0 {
            return Ok(Vec::new());
        }
        let (fixed, header) = self.read_list_header(list_va, ListHeader::read)?;

        let mut out = Vec::with_capacity(header.count as usize);
        for i in 0..header.count as u64 {
            let entry_va = fixed + 8 + i * header.entsize as u64;
            let entry_offset = self.stream.va_to_offset(entry_va)?;
            if header.is_small_method_list {
                let raw = {
                    let _g = self.stream.scoped_seek(entry_offset)?;
                    SmallMethodT::read(self.stream)?
                };
                let name_cell = apply_relative_offset(entry_va, raw.name_rel);
                // The small-method `name` offset lands on a selector
                // reference cell, one further pointer indirection away
                // from the C string itself.
                let name_cell_offset = self.stream.va_to_offset(name_cell)?;
                let name_ptr = self.stream.peek_u64_at(name_cell_offset)?;
                let selector = self.read_name_at(name_ptr)?;
                let types_addr = apply_relative_offset(entry_va + 4, raw.types_rel);
                let type_encoding = self.stream.read_cstr_at_va(types_addr)?;
                out.push(Method {
                    locator: entry_va,
                    selector,
                    type_encoding,
                    imp: raw.imp_rel as i64,
                    is_small: true,
                    is_class_method,
                });
            } else {
                let raw = {
                    let _g = self.stream.scoped_seek(entry_offset)?;
                    BigMethodT::read(self.stream)?
                };
                let selector = self.read_name_at(raw.name)?;
                let type_encoding = self.read_name_at(raw.types)?;
                out.push(Method {
                    locator: entry_va,
                    selector,
                    type_encoding,
                    imp: raw.imp as i64,
                    is_small: false,
                    is_class_method,
                });
            }
        }
        Ok(out)
    }

    fn parse_ivar_list(&mut self, list_va: u64) -> AbiResult<Vec<IVar>> {
        if list_va == 0 {
            return Ok(Vec::new());
        }
        let (fixed, header) = self.read_list_header(list_va, ListHeader::read_plain)?;

        let mut out = Vec::with_capacity(header.count as usize);
        for i in 0..header.count as u64 {
            let entry_va = fixed + 8 + i * header.entsize as u64;
            let entry_offset = self.stream.va_to_offset(entry_va)?;
            let raw = {
                let _g = self.stream.scoped_seek(entry_offset)?;
                IVarT::read(self.stream)?
            };
            let offset_file = self.stream.va_to_offset(self.stream.fix_pointer(raw.offset_ptr))?;
            let offset = {
                let _g = self.stream.scoped_seek(offset_file)?;
                self.stream.read_i32()?
            };
            let mut name = self.read_name_at(raw.name).unwrap_or_default();
            let mut type_encoding = self.read_name_at(raw.type_).unwrap_or_default();
            // Sometimes the name/type fields are swapped in the record.
            if !type_encoding.is_empty() && !name.is_empty() {
                let looks_swapped =
                    type_encoding.starts_with('_') || name.starts_with('T') || name.len() <= 2;
                if looks_swapped {
                    std::mem::swap(&mut name, &mut type_encoding);
                }
            }
            out.push(IVar {
                locator: entry_va,
                name,
                type_encoding,
                offset,
                alignment: raw.alignment,
                size: raw.size,
            });
        }
        Ok(out)
    }

    fn parse_property_list(&mut self, list_va: u64) -> AbiResult<Vec<Property>> {
        if list_va == 0 {
            return Ok(Vec::new());
        }
        let (fixed, header) = self.read_list_header(list_va, ListHeader::read_plain)?;

        let mut out = Vec::with_capacity(header.count as usize);
        for i in 0..header.count as u64 {
            let entry_va = fixed + 8 + i * header.entsize as u64;
            let entry_offset = self.stream.va_to_offset(entry_va)?;
            let raw = {
                let _g = self.stream.scoped_seek(entry_offset)?;
                PropertyT::read(self.stream)?
            };
            let name = self.read_name_at(raw.name)?;
            let attributes = self.read_name_at(raw.attributes)?;
            out.push(Property {
                locator: entry_va,
                name,
                attributes,
            });
        }
        Ok(out)
    }

    fn parse_protocol_list(&mut self, list_va: u64) -> AbiResult<Vec<Arc<Protocol>>> {
        if list_va == 0 {
            return Ok(Vec::new());
        }
        let offset = self.stream.va_to_offset(self.stream.fix_pointer(list_va))?;
        let count = {
            let _g = self.stream.scoped_seek(offset)?;
            ProtocolListHeader::read(self.stream)?.count
        };
        let base = offset + 8;
        let mut out = Vec::new();
        for i in 0..count {
            let entry_offset = base + i * 8;
            let proto_va = {
                let _g = self.stream.scoped_seek(entry_offset)?;
                self.stream.read_u64()?
            };
            if proto_va == 0 {
                continue;
            }
            out.push(self.parse_protocol(self.stream.fix_pointer(proto_va))?);
        }
        Ok(out)
    }

    pub fn parse_protocol(&mut self, va: u64) -> AbiResult<Arc<Protocol>> {
        if let Some(existing) = self.protocols.get(&va) {
            return Ok(existing.clone());
        }
        if self.protocols_in_progress.contains(&va) {
            // Cycle: a protocol conforms (directly or transitively) to
            // itself. Register a stub now so the caller gets a sentinel
            // instead of recursing forever; it is replaced once the real
            // parse completes below.
            return Ok(Arc::new(Protocol {
                locator: va,
                name: String::new(),
                protocols: Vec::new(),
                instance_methods: Vec::new(),
                class_methods: Vec::new(),
                optional_instance_methods: Vec::new(),
                optional_class_methods: Vec::new(),
                instance_properties: Vec::new(),
            }));
        }
        self.protocols_in_progress.insert(va);

        let offset = self.stream.va_to_offset(va)?;
        let raw = {
            let _g = self.stream.scoped_seek(offset)?;
            ProtocolT::read(self.stream)?
        };
        let name = self.read_name_at(raw.name)?;
        let protocol = Protocol {
            locator: va,
            name,
            protocols: self.parse_protocol_list(raw.protocols)?,
            instance_methods: self.parse_method_list(raw.instance_methods, false)?,
            class_methods: self.parse_method_list(raw.class_methods, true)?,
            optional_instance_methods: self.parse_method_list(raw.optional_instance_methods, false)?,
            optional_class_methods: self.parse_method_list(raw.optional_class_methods, true)?,
            instance_properties: self.parse_property_list(raw.instance_properties)?,
        };

        self.protocols_in_progress.remove(&va);
        let protocol = Arc::new(protocol);
        self.protocols.insert(va, protocol.clone());
        Ok(protocol)
    }

    pub fn parse_class(&mut self, va: u64) -> AbiResult<Arc<Class>> {
        if let Some(existing) = self.classes.get(&va) {
            return Ok(existing.clone());
        }
        if self.classes_in_progress.contains(&va) {
            return Ok(Arc::new(Class {
                locator: va,
                name: String::new(),
                flags: 0,
                is_metaclass: false,
                super_class: None,
                meta_class: None,
                methods: Vec::new(),
                ivars: Vec::new(),
                protocols: Vec::new(),
                properties: Vec::new(),
            }));
        }
        self.classes_in_progress.insert(va);

        let offset = self.stream.va_to_offset(va)?;
        let raw = {
            let _g = self.stream.scoped_seek(offset)?;
            ClassT::read(self.stream)?
        };

        // Superclass and metaclass are resolved before class_ro so a cycle
        // through them re-enters `parse_class` while `va` is still marked
        // in-progress.
        let super_class = if raw.superclass != 0 {
            Some(self.parse_class(self.stream.fix_pointer(raw.superclass))?)
        } else {
            None
        };
        let meta_class = if raw.isa != 0 && self.stream.fix_pointer(raw.isa) != va {
            Some(self.parse_class(self.stream.fix_pointer(raw.isa))?)
        } else {
            None
        };

        let ro_addr = raw.class_ro_addr();
        let ro_offset = self.stream.va_to_offset(ro_addr)?;
        let ro = {
            let _g = self.stream.scoped_seek(ro_offset)?;
            ClassRoT::read(self.stream)?
        };
        let name = self.read_name_at(ro.name)?;

        let class = Class {
            locator: va,
            name,
            flags: ro.flags,
            is_metaclass: ro.is_metaclass(),
            super_class,
            meta_class,
            methods: self.parse_method_list(ro.base_methods, ro.is_metaclass())?,
            ivars: self.parse_ivar_list(ro.ivars)?,
            protocols: self.parse_protocol_list(ro.base_protocols)?,
            properties: self.parse_property_list(ro.base_properties)?,
        };

        self.classes_in_progress.remove(&va);
        let class = Arc::new(class);
        self.classes.insert(va, class.clone());
        Ok(class)
    }

    pub fn parse_category(&mut self, va: u64) -> AbiResult<Category> {
        let offset = self.stream.va_to_offset(va)?;
        let raw = {
            let _g = self.stream.scoped_seek(offset)?;
            CategoryT::read(self.stream)?
        };
        let name = self.read_name_at(raw.name)?;
        let base_class = if raw.cls != 0 {
            Some(self.parse_class(self.stream.fix_pointer(raw.cls))?)
        } else {
            None
        };

        Ok(Category {
            locator: va,
            name,
            base_class,
            instance_methods: self.parse_method_list(raw.instance_methods, false)?,
            class_methods: self.parse_method_list(raw.class_methods, true)?,
            protocols: self.parse_protocol_list(raw.protocols)?,
            instance_properties: self.parse_property_list(raw.instance_properties)?,
        })
    }
}
