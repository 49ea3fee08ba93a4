//! Components C+D: the Objective-C type-encoding parser, its back-formatter
//! ("decoder"), and the selector+signature formatter.
//!
//! `typedesc` parses an `@encode`-style string into a tree of `TypeNode`s;
//! `decode` renders a node back to C/Objective-C type syntax; `signature`
//! combines a selector string with a full method-encoding string.

use crate::error::{AbiError, AbiResult};

/// A type qualifier token (`r`, `n`, `N`, `o`, `O`, `R`, `V`, `A`, `j`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    Const,
    In,
    Inout,
    Out,
    Bycopy,
    Byref,
    Oneway,
    Atomic,
    Complex,
}

impl Qualifier {
    fn from_char(c: char) -> Option<Qualifier> {
        Some(match c {
            'r' => Qualifier::Const,
            'n' => Qualifier::In,
            'N' => Qualifier::Inout,
            'o' => Qualifier::Out,
            'O' => Qualifier::Bycopy,
            'R' => Qualifier::Byref,
            'V' => Qualifier::Oneway,
            'A' => Qualifier::Atomic,
            'j' => Qualifier::Complex,
            _ => return None,
        })
    }

    fn text(self) -> &'static str {
        match self {
            Qualifier::Const => "const",
            Qualifier::In => "in",
            Qualifier::Inout => "inout",
            Qualifier::Out => "out",
            Qualifier::Bycopy => "bycopy",
            Qualifier::Byref => "byref",
            Qualifier::Oneway => "oneway",
            Qualifier::Atomic => "atomic",
            Qualifier::Complex => "_Complex",
        }
    }
}

/// One property-attribute token (`R`, `C`, `&`, `N`, `D`, `W`, `P`, `G<ident>`, `S<ident>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyAttr {
    ReadOnly,
    Copy,
    Retain,
    NonAtomic,
    Dynamic,
    Weak,
    Garbage,
    Getter(String),
    Setter(String),
}

/// The kind-specific payload of a parsed type node. A sum type rather than
/// one wide struct: a `Pointer`/`Array` variant
/// can only ever hold exactly one inner node by construction, which removes
/// the "wrong child arity" invariant-violation class entirely rather than
/// detecting it at decode time.
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// The root returned by `typedesc`: every top-level type parsed from the
    /// encoding string, in order (return type, self, `_cmd`, arguments for a
    /// method signature; a single element for a lone type like `"i"`).
    Seq(Vec<TypeNode>),
    Primitive {
        name: &'static str,
    },
    Pointer(Box<TypeNode>),
    Array {
        len: u32,
        element: Box<TypeNode>,
    },
    Struct {
        tag: String,
        members: Vec<TypeNode>,
    },
    Union {
        tag: String,
        members: Vec<TypeNode>,
    },
    BitField {
        width: u32,
    },
    /// `@` or `@"ClassName"`. `None` for anonymous `id`.
    Object {
        class_name: Option<String>,
    },
    /// `#` -- `Class`/`Class<Proto>`.
    MetaClass {
        class_name: Option<String>,
    },
    /// `:` -- `SEL`.
    Selector,
    Void,
    /// `@?` or `@?<...>` -- a block pointer, optionally with its own
    /// signature encoded between angle brackets.
    Block {
        signature: Option<Vec<TypeNode>>,
    },
    /// A property's full attribute string (`typedesc` called on a
    /// `T@"NSString",R,N,V_name`-style blob from `property_t.attributes`).
    Attributes {
        type_node: Box<TypeNode>,
        attrs: Vec<PropertyAttr>,
        ivar_name: Option<String>,
    },
}

/// One parsed node: the kind-specific payload plus the qualifiers, stack
/// offset ("natural", the digits trailing a type char), and member name
/// that every kind can carry. No parent back-edge is modelled -- nothing in
/// `decode`/`signature` (purely recursive-descent over owned children) ever
/// needs to walk upward, so a non-owning parent pointer would add real
/// complexity for zero call sites.
#[derive(Debug, Clone)]
pub struct TypeNode {
    pub kind: TypeKind,
    pub qualifiers: Vec<Qualifier>,
    pub stack_size: u32,
    pub member_name: Option<String>,
}

impl TypeNode {
    fn simple(kind: TypeKind) -> TypeNode {
        TypeNode {
            kind,
            qualifiers: Vec::new(),
            stack_size: 0,
            member_name: None,
        }
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Cursor {
            bytes: s.as_bytes(),
            pos: 0,
        }
    }

    fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn next(&mut self) -> AbiResult<u8> {
        let b = self
            .peek()
            .ok_or_else(|| AbiError::encoding_syntax("unexpected end of type encoding"))?;
        self.pos += 1;
        Ok(b)
    }

    fn expect(&mut self, want: u8) -> AbiResult<()> {
        let got = self.next()?;
        if got != want {
            return Err(AbiError::encoding_syntax(format!(
                "expected '{}', found '{}'",
                want as char, got as char
            )));
        }
        Ok(())
    }

    /// Read digits as a natural number (stack offset, array length, bitfield
    /// width). Absent digits yield 0.
    fn parse_natural(&mut self) -> u32 {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    /// Read a `"..."`-delimited identifier (struct/union tag, class name,
    /// struct member label).
    fn parse_quoted(&mut self) -> AbiResult<String> {
        self.expect(b'"')?;
        let start = self.pos;
        while self.peek() != Some(b'"') {
            if self.eof() {
                return Err(AbiError::encoding_syntax("unterminated quoted identifier"));
            }
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|e| AbiError::encoding_syntax(e.to_string()))?
            .to_string();
        self.pos += 1; // closing quote
        Ok(text)
    }

    fn rest(&self) -> &'a str {
        std::str::from_utf8(&self.bytes[self.pos..]).unwrap_or("")
    }
}

fn primitive_name(c: u8) -> Option<&'static str> {
    Some(match c {
        b'c' => "char",
        b'i' => "int",
        b's' => "short",
        b'l' => "long",
        b'q' => "long long",
        b'C' => "unsigned char",
        b'I' => "unsigned int",
        b'S' => "unsigned short",
        b'L' => "unsigned long",
        b'Q' => "unsigned long long",
        b'f' => "float",
        b'd' => "double",
        b'D' => "long double",
        b'B' => "BOOL",
        b'v' => "void",
        b'*' => "char *",
        _ => return None,
    })
}

fn parse_one(cur: &mut Cursor) -> AbiResult<TypeNode> {
    let mut qualifiers = Vec::new();
    while let Some(c) = cur.peek() {
        match Qualifier::from_char(c as char) {
            Some(q) => {
                qualifiers.push(q);
                cur.pos += 1;
            }
            None => break,
        }
    }

    let mut node = parse_base(cur)?;
    node.qualifiers = qualifiers;
    node.stack_size = cur.parse_natural();
    Ok(node)
}

fn parse_base(cur: &mut Cursor) -> AbiResult<TypeNode> {
    let c = cur
        .peek()
        .ok_or_else(|| AbiError::encoding_syntax("unexpected end of type encoding"))?;

    match c {
        b'"' => {
            // A struct-member label: the label belongs to the following
            // type, not to a node of its own.
            let label = cur.parse_quoted()?;
            let mut inner = parse_one(cur)?;
            inner.member_name = Some(label);
            Ok(inner)
        }
        b'^' => {
            cur.pos += 1;
            let inner = parse_one(cur)?;
            Ok(TypeNode::simple(TypeKind::Pointer(Box::new(inner))))
        }
        b'[' => {
            cur.pos += 1;
            let len = cur.parse_natural();
            let element = parse_one(cur)?;
            cur.expect(b']')?;
            Ok(TypeNode::simple(TypeKind::Array {
                len,
                element: Box::new(element),
            }))
        }
        b'{' => {
            cur.pos += 1;
            parse_compound(cur, b'}').map(|(tag, members)| {
                TypeNode::simple(TypeKind::Struct { tag, members })
            })
        }
        b'(' => {
            cur.pos += 1;
            parse_compound(cur, b')').map(|(tag, members)| {
                TypeNode::simple(TypeKind::Union { tag, members })
            })
        }
        b'b' => {
            cur.pos += 1;
            let width = cur.parse_natural();
            Ok(TypeNode::simple(TypeKind::BitField { width }))
        }
        b'@' => {
            cur.pos += 1;
            if cur.peek() == Some(b'?') {
                cur.pos += 1;
                if cur.peek() == Some(b'<') {
                    cur.pos += 1;
                    let mut children = Vec::new();
                    while cur.peek() != Some(b'>') {
                        if cur.eof() {
                            return Err(AbiError::encoding_syntax("unterminated block signature"));
                        }
                        children.push(parse_one(cur)?);
                    }
                    cur.pos += 1; // '>'
                    Ok(TypeNode::simple(TypeKind::Block {
                        signature: Some(children),
                    }))
                } else {
                    Ok(TypeNode::simple(TypeKind::Block { signature: None }))
                }
            } else if cur.peek() == Some(b'"') {
                let name = cur.parse_quoted()?;
                Ok(TypeNode::simple(TypeKind::Object {
                    class_name: Some(name),
                }))
            } else {
                Ok(TypeNode::simple(TypeKind::Object { class_name: None }))
            }
        }
        b'#' => {
            cur.pos += 1;
            if cur.peek() == Some(b'"') {
                let name = cur.parse_quoted()?;
                Ok(TypeNode::simple(TypeKind::MetaClass {
                    class_name: Some(name),
                }))
            } else {
                Ok(TypeNode::simple(TypeKind::MetaClass { class_name: None }))
            }
        }
        b':' => {
            cur.pos += 1;
            Ok(TypeNode::simple(TypeKind::Selector))
        }
        _ => {
            if let Some(name) = primitive_name(c) {
                cur.pos += 1;
                Ok(TypeNode::simple(TypeKind::Primitive { name }))
            } else {
                Err(AbiError::encoding_syntax(format!(
                    "unrecognised type character '{}'",
                    c as char
                )))
            }
        }
    }
}

fn parse_compound(cur: &mut Cursor, close: u8) -> AbiResult<(String, Vec<TypeNode>)> {
    let tag = if cur.peek() == Some(b'"') {
        cur.parse_quoted()?
    } else {
        // Anonymous tag: scan up to '=' or the closing delimiter.
        let start = cur.pos;
        while cur.peek() != Some(b'=') && cur.peek() != Some(close) {
            if cur.eof() {
                return Err(AbiError::encoding_syntax("unterminated struct/union"));
            }
            cur.pos += 1;
        }
        std::str::from_utf8(&cur.bytes[start..cur.pos])
            .unwrap_or("?")
            .to_string()
    };

    let mut members = Vec::new();
    if cur.peek() == Some(b'=') {
        cur.pos += 1;
        while cur.peek() != Some(close) {
            if cur.eof() {
                return Err(AbiError::encoding_syntax("unterminated struct/union body"));
            }
            members.push(parse_one(cur)?);
        }
    }
    cur.expect(close)?;
    Ok((tag, members))
}

/// Parse a whole encoding string (a single type, or a concatenated method
/// signature) into a `Seq` root node.
pub fn typedesc(encoding: &str) -> AbiResult<TypeNode> {
    if encoding.is_empty() {
        return Err(AbiError::encoding_syntax("empty type encoding"));
    }
    let mut cur = Cursor::new(encoding);
    let mut children = Vec::new();
    while !cur.eof() {
        children.push(parse_one(&mut cur)?);
    }
    Ok(TypeNode::simple(TypeKind::Seq(children)))
}

/// Parse a property's `attributes` blob (`property_t.attributes`, e.g.
/// `T@"NSString",R,N,V_name`) into an `Attributes` node wrapping the
/// leading type.
pub fn parse_property_attributes(attributes: &str) -> AbiResult<TypeNode> {
    let mut parts = attributes.splitn(2, ',');
    let type_part = parts.next().unwrap_or("");
    let type_part = type_part.strip_prefix('T').unwrap_or(type_part);
    let type_node = typedesc(type_part)?;
    let type_node = match type_node.kind {
        TypeKind::Seq(mut children) if children.len() == 1 => children.remove(0),
        TypeKind::Seq(_) => {
            return Err(AbiError::encoding_syntax(
                "property type encoding must describe exactly one type",
            ))
        }
        _ => type_node,
    };

    let mut attrs = Vec::new();
    let mut ivar_name = None;
    if let Some(rest) = parts.next() {
        for token in rest.split(',') {
            if token.is_empty() {
                continue;
            }
            let mut chars = token.chars();
            match chars.next() {
                Some('R') => attrs.push(PropertyAttr::ReadOnly),
                Some('C') => attrs.push(PropertyAttr::Copy),
                Some('&') => attrs.push(PropertyAttr::Retain),
                Some('N') => attrs.push(PropertyAttr::NonAtomic),
                Some('D') => attrs.push(PropertyAttr::Dynamic),
                Some('W') => attrs.push(PropertyAttr::Weak),
                Some('P') => attrs.push(PropertyAttr::Garbage),
                Some('G') => attrs.push(PropertyAttr::Getter(chars.as_str().to_string())),
                Some('S') => attrs.push(PropertyAttr::Setter(chars.as_str().to_string())),
                // An unrecognised attribute token is the backing ivar name
                // (conventionally "V<name>", but any unmatched token
                // degrades the same way).
                _ => ivar_name = Some(token.strip_prefix("V_").unwrap_or(token).to_string()),
            }
        }
    }

    Ok(TypeNode::simple(TypeKind::Attributes {
        type_node: Box::new(type_node),
        attrs,
        ivar_name,
    }))
}

fn qualifier_prefix(node: &TypeNode) -> String {
    node.qualifiers
        .iter()
        .map(|q| format!("{} ", q.text()))
        .collect()
}

/// Render a parsed node tree back to C/Objective-C type syntax.
/// Infallible: the typed `TypeKind` variants make every previously
/// possible "wrong arity" invariant violation unrepresentable.
pub fn decode(node: &TypeNode) -> String {
    let qualifiers = qualifier_prefix(node);
    let body = match &node.kind {
        TypeKind::Seq(children) => children
            .iter()
            .map(decode)
            .collect::<Vec<_>>()
            .join(" "),
        TypeKind::Primitive { name } => name.to_string(),
        TypeKind::Pointer(inner) => {
            let inner_text = decode(inner);
            if inner_text.ends_with('*') {
                format!("{inner_text}*")
            } else {
                format!("{inner_text} *")
            }
        }
        TypeKind::Array { len, element } => {
            if *len == 0 {
                format!("{}[]", decode(element))
            } else {
                format!("{}[{}]", decode(element), len)
            }
        }
        TypeKind::Struct { tag, .. } => format!("struct {tag}"),
        TypeKind::Union { tag, .. } => format!("union {tag}"),
        TypeKind::BitField { width } => format!("BitField<{width}>"),
        TypeKind::Object { class_name } => match class_name {
            Some(name) => name.clone(),
            None => "id".to_string(),
        },
        TypeKind::MetaClass { class_name } => match class_name {
            Some(name) => format!("Class<{name}>"),
            None => "Class".to_string(),
        },
        TypeKind::Selector => "SEL".to_string(),
        TypeKind::Void => "void".to_string(),
        TypeKind::Block { signature } => match signature {
            None => "void *".to_string(),
            Some(children) if children.is_empty() => "void (^_)(void)".to_string(),
            Some(children) => {
                let return_type = decode(&children[0]);
                let args = children
                    .iter()
                    .skip(2)
                    .map(decode)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{return_type} (^_)({args})")
            }
        },
        TypeKind::Attributes {
            type_node,
            attrs,
            ivar_name,
        } => return decode_property(type_node, attrs, ivar_name.as_deref()),
    };

    if qualifiers.is_empty() {
        body
    } else {
        format!("{qualifiers}{body}")
    }
}

fn decode_property(type_node: &TypeNode, attrs: &[PropertyAttr], ivar_name: Option<&str>) -> String {
    let mut out = String::new();
    let is_dynamic = attrs.iter().any(|a| *a == PropertyAttr::Dynamic);
    if is_dynamic {
        out.push_str("@dynamic ");
    }

    let mut rendered_attrs = Vec::new();
    for attr in attrs {
        match attr {
            PropertyAttr::ReadOnly => rendered_attrs.push("readonly".to_string()),
            PropertyAttr::Copy => rendered_attrs.push("copy".to_string()),
            PropertyAttr::Retain => rendered_attrs.push("retain".to_string()),
            PropertyAttr::NonAtomic => rendered_attrs.push("nonatomic".to_string()),
            PropertyAttr::Dynamic => {}
            PropertyAttr::Weak => rendered_attrs.push("weak".to_string()),
            PropertyAttr::Garbage => rendered_attrs.push("GC".to_string()),
            PropertyAttr::Getter(name) => rendered_attrs.push(format!("getter={name}")),
            PropertyAttr::Setter(name) => rendered_attrs.push(format!("setter={name}")),
        }
    }

    if !rendered_attrs.is_empty() {
        out.push_str(&format!("@property ({}) ", rendered_attrs.join(", ")));
    } else if !is_dynamic {
        out.push_str("@property ");
    }

    out.push_str(&decode(type_node));
    if let Some(name) = ivar_name {
        out.push(' ');
        out.push_str(name);
    }
    out
}

/// Combine a selector string with a method-encoding string into a full
/// declaration-style signature.
pub fn signature(selector: &str, encoding: &str) -> AbiResult<String> {
    let root = typedesc(encoding)?;
    let children = match root.kind {
        TypeKind::Seq(children) => children,
        _ => unreachable!("typedesc always returns a Seq root"),
    };

    if children.is_empty() {
        return Err(AbiError::encoding_syntax("method encoding has no return type"));
    }

    let mut out = format!("({})", decode(&children[0]));
    if children.len() <= 3 {
        out.push_str(selector);
        return Ok(out);
    }

    let mut start = 0usize;
    let mut index = 3usize;
    loop {
        if index >= children.len() {
            break;
        }
        let colon_pos = selector[start..].find(':').map(|p| start + p);
        let token = match colon_pos {
            Some(p) => &selector[start..p],
            None => &selector[start..],
        };
        if !token.is_empty() {
            out.push_str(token);
            out.push_str(&format!(":({})", decode(&children[index])));
            if index < children.len() - 1 {
                out.push(' ');
            }
        }
        match colon_pos {
            Some(p) => start = p + 1,
            None => break,
        }
        index += 1;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_primitive() {
        let node = typedesc("i").unwrap();
        assert_eq!(decode(&node), "int");
    }

    #[test]
    fn formats_method_signature_with_two_arguments() {
        let out = signature("foo:bar:", "q32@0:8@16q24").unwrap();
        assert_eq!(out, "(long long)foo:(id) bar:(long long)");
    }

    #[test]
    fn formats_selector_without_arguments() {
        let out = signature("doThing", "v16@0:8").unwrap();
        assert_eq!(out, "(void)doThing");
    }

    #[test]
    fn decodes_pointer_to_object() {
        let node = typedesc("^@").unwrap();
        assert_eq!(decode(&node), "id *");
    }

    #[test]
    fn decodes_double_pointer_to_primitive() {
        let node = typedesc("^*").unwrap();
        assert_eq!(decode(&node), "char **");
    }

    #[test]
    fn decodes_struct_without_expanding_members() {
        let node = typedesc("{CGPoint=\"x\"d\"y\"d}").unwrap();
        assert_eq!(decode(&node), "struct CGPoint");
    }

    #[test]
    fn decodes_property_attributes_with_backing_ivar() {
        let node = parse_property_attributes("T@\"NSString\",R,N,V_name").unwrap();
        assert_eq!(decode(&node), "@property (readonly, nonatomic) NSString name");
    }

    #[test]
    fn rejects_malformed_encoding() {
        assert!(typedesc("{Foo=").is_err());
    }

    #[test]
    fn reparsing_a_substring_yields_an_equivalent_subtree() {
        let whole = typedesc("{CGPoint=dd}").unwrap();
        let members = match &whole.kind {
            TypeKind::Seq(children) => match &children[0].kind {
                TypeKind::Struct { members, .. } => members.clone(),
                _ => panic!("expected struct"),
            },
            _ => panic!("expected seq"),
        };
        let reparsed = typedesc("d").unwrap();
        let reparsed_member = match reparsed.kind {
            TypeKind::Seq(children) => children.into_iter().next().unwrap(),
            _ => unreachable!(),
        };
        assert_eq!(decode(&members[0]), decode(&reparsed_member));
    }
}
