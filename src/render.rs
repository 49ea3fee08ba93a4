//! Component G: rendering parsed entities as Objective-C declaration text.
//! Each `Declaration` impl is independent of parse order --
//! entities already hold owned strings and an `Arc` graph of sub-entities,
//! so rendering never touches the stream.

use std::sync::Arc;

use crate::entities::{Category, Class, IVar, Method, Protocol, Property};
use crate::typeenc::{self, parse_property_attributes, TypeKind};

/// Types that render to Objective-C declaration text.
pub trait Declaration {
    fn declaration(&self) -> String;
}

fn decode_single(encoding: &str) -> Result<String, crate::error::AbiError> {
    let root = typeenc::typedesc(encoding)?;
    Ok(match root.kind {
        TypeKind::Seq(mut children) if children.len() == 1 => typeenc::decode(&children.remove(0)),
        _ => typeenc::decode(&root),
    })
}

fn render_method(m: &Method, prefix: char) -> String {
    let signature = match typeenc::signature(&m.selector, &m.type_encoding) {
        Ok(sig) => sig,
        Err(_) => m.selector.clone(),
    };
    format!("{prefix} {signature} // 0x{:x}", m.imp as u64)
}

impl Declaration for Method {
    /// Generic fallback for contexts with no instance/class distinction at
    /// hand. `render_method` is used instead wherever that distinction is
    /// known (class/category/protocol method lists).
    fn declaration(&self) -> String {
        render_method(self, '-')
    }
}

impl Declaration for IVar {
    fn declaration(&self) -> String {
        let name_printable = self
            .name
            .chars()
            .next()
            .map(|c| c.is_ascii_graphic())
            .unwrap_or(false);
        let display_name = if name_printable {
            self.name.clone()
        } else {
            "_$remapped_name".to_string()
        };

        match (name_printable, decode_single(&self.type_encoding)) {
            (true, Ok(decoded_type)) => format!("{decoded_type} {display_name};"),
            (false, Ok(_)) => format!("// 0x{:x} <remapped>", self.locator),
            (true, Err(_)) => format!(
                "// 0x{:x} <invalid type> '{}'",
                self.locator, self.type_encoding
            ),
            (false, Err(_)) => format!("// 0x{:x} <remapped, invalid type>", self.locator),
        }
    }
}

impl Declaration for Property {
    fn declaration(&self) -> String {
        let decoded = match parse_property_attributes(&self.attributes) {
            Ok(node) => typeenc::decode(&node),
            Err(_) => format!("@property {}", self.name),
        };
        if decoded.contains(self.name.as_str()) {
            format!("{decoded};")
        } else {
            format!("{decoded} {};", self.name)
        }
    }
}

/// Render a named sublist of declarations, preceded by a banner comment --
/// omitted entirely when the list is empty.
fn render_section<D: Declaration>(banner: &str, items: &[D], out: &mut String) {
    if items.is_empty() {
        return;
    }
    out.push_str("// ");
    out.push_str(banner);
    out.push('\n');
    for item in items {
        out.push_str(&item.declaration());
        out.push('\n');
    }
    out.push('\n');
}

fn render_method_section(banner: &str, items: &[Method], prefix: char, out: &mut String) {
    if items.is_empty() {
        return;
    }
    out.push_str("// ");
    out.push_str(banner);
    out.push('\n');
    for item in items {
        out.push_str(&render_method(item, prefix));
        out.push('\n');
    }
    out.push('\n');
}

fn conformance_suffix(protocols: &[Arc<Protocol>]) -> String {
    if protocols.is_empty() {
        String::new()
    } else {
        let names = protocols
            .iter()
            .map(|p| p.name.clone())
            .collect::<Vec<_>>()
            .join(", ");
        format!(" <{names}>")
    }
}

impl Declaration for Protocol {
    fn declaration(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "@protocol {}{}\n\n",
            self.name,
            conformance_suffix(&self.protocols)
        ));
        render_section("Properties", &self.instance_properties, &mut out);

        out.push_str("@optional\n\n");
        render_method_section(
            "Instance methods",
            &self.optional_instance_methods,
            '-',
            &mut out,
        );
        render_method_section("Class methods", &self.optional_class_methods, '+', &mut out);

        out.push_str("@required\n\n");
        render_method_section("Instance methods", &self.instance_methods, '-', &mut out);
        render_method_section("Class methods", &self.class_methods, '+', &mut out);

        out.push_str("@end\n");
        out
    }
}

impl Declaration for Class {
    fn declaration(&self) -> String {
        let super_name = self
            .super_class
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "NSObject".to_string());

        let mut out = String::new();
        out.push_str(&format!(
            "@interface {}: {}{}\n",
            self.name,
            super_name,
            conformance_suffix(&self.protocols)
        ));

        let empty: Vec<IVar> = Vec::new();
        let meta_ivars = self.meta_class.as_ref().map(|m| &m.ivars).unwrap_or(&empty);
        if !self.ivars.is_empty() || !meta_ivars.is_empty() {
            out.push_str("{\n");
            render_section("Ivars", &self.ivars, &mut out);
            render_section("Class ivars", meta_ivars, &mut out);
            out.push_str("}\n");
        }

        render_section("Properties", &self.properties, &mut out);
        if let Some(meta) = &self.meta_class {
            render_section("Class properties", &meta.properties, &mut out);
        }
        render_method_section("Methods", &self.methods, '-', &mut out);
        if let Some(meta) = &self.meta_class {
            render_method_section("Class methods", &meta.methods, '+', &mut out);
        }

        out.push_str("@end\n");
        out
    }
}

impl Declaration for Category {
    fn declaration(&self) -> String {
        let base_name = self
            .base_class
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "?".to_string());

        // An unnamed category is a class extension: rendered
        // `@interface Base ()` rather than `@interface Base (Name)`.
        let header = if self.name.is_empty() {
            format!("@interface {base_name} ()")
        } else {
            format!("@interface {base_name} ({})", self.name)
        };

        let mut out = String::new();
        out.push_str(&header);
        out.push_str(&conformance_suffix(&self.protocols));
        out.push('\n');
        render_section("Properties", &self.instance_properties, &mut out);
        render_method_section("Instance methods", &self.instance_methods, '-', &mut out);
        render_method_section("Class methods", &self.class_methods, '+', &mut out);
        out.push_str("@end\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_declaration_includes_impl_address() {
        let m = Method {
            locator: 0,
            selector: "doThing".to_string(),
            type_encoding: "v16@0:8".to_string(),
            imp: 0x4000,
            is_small: false,
            is_class_method: false,
        };
        assert_eq!(render_method(&m, '-'), "- (void)doThing // 0x4000");
    }

    #[test]
    fn property_declaration_renders_attributes() {
        let p = Property {
            locator: 0,
            name: "name".to_string(),
            attributes: "T@\"NSString\",R,N,V_name".to_string(),
        };
        assert_eq!(
            p.declaration(),
            "@property (readonly, nonatomic) NSString name;"
        );
    }

    #[test]
    fn ivar_declaration_falls_back_on_invalid_type() {
        let iv = IVar {
            locator: 0x20,
            name: "_x".to_string(),
            type_encoding: "{Bogus=".to_string(),
            offset: 0,
            alignment: 0,
            size: 0,
        };
        assert_eq!(iv.declaration(), "// 0x20 <invalid type> '{Bogus='");
    }

    #[test]
    fn ivar_declaration_remaps_non_printable_name() {
        let iv = IVar {
            locator: 0x30,
            name: "\u{0}bad".to_string(),
            type_encoding: "i".to_string(),
            offset: 0,
            alignment: 0,
            size: 0,
        };
        assert_eq!(iv.declaration(), "// 0x30 <remapped>");
    }

    #[test]
    fn class_declaration_defaults_superclass_to_nsobject() {
        let c = Class {
            locator: 0,
            name: "Foo".to_string(),
            flags: 0,
            is_metaclass: false,
            super_class: None,
            meta_class: None,
            methods: Vec::new(),
            ivars: Vec::new(),
            protocols: Vec::new(),
            properties: Vec::new(),
        };
        let decl = c.declaration();
        assert!(decl.starts_with("@interface Foo: NSObject"));
        assert!(decl.trim_end().ends_with("@end"));
    }

    #[test]
    fn category_without_a_name_renders_as_an_extension() {
        let cat = Category {
            locator: 0,
            name: String::new(),
            base_class: None,
            instance_methods: Vec::new(),
            class_methods: Vec::new(),
            protocols: Vec::new(),
            instance_properties: Vec::new(),
        };
        assert!(cat.declaration().starts_with("@interface ? ()"));
    }
}
