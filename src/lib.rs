//! This crate parses a C++ "mangled" linker symbol name into a value
//! describing what the name refers to: a variable, a function, a virtual
//! table, a thunk, etc. Formatting the value produces human-readable text
//! describing the mangled name. Debuggers, linkers, profilers and
//! crash-reporting pipelines can use this crate to give meaning to the
//! symbols they only know in encoded form.
//!
//! C++ requires the compiler to choose names for linker symbols
//! consistently across compilation units, so that two compilation units
//! that have seen the same declarations can pair up definitions in one
//! unit with references in another. Almost all platforms other than
//! Microsoft Windows follow the [Itanium C++ ABI][itanium]'s rules for
//! this.
//!
//! [itanium]: https://itanium-cxx-abi.github.io/cxx-abi/abi.html#mangling
//!
//! For example, suppose a C++ compilation unit has the definition:
//!
//! ```c++
//! namespace space {
//!   int foo(int x, int y) { return x+y; }
//! }
//! ```
//!
//! The Itanium C++ ABI specifies that the linker symbol for that function
//! must be named `_ZN5space3fooEii`. This crate parses that name back into
//! a [`Symbol`]:
//!
//! ```
//! use itanium_demangler::Symbol;
//!
//! let sym = Symbol::new("_ZN5space3fooEii").expect("well-formed symbol");
//! assert_eq!(sym.demangle(), "space::foo(int, int)");
//! ```
//!
//! Special symbols demangle to a description rather than a declaration:
//!
//! ```
//! use itanium_demangler::demangle;
//!
//! let text = demangle("_ZTVN10__cxxabiv117__class_type_infoE").unwrap();
//! assert_eq!(text, "vtable for __cxxabiv1::__class_type_info");
//! ```

mod arena;
mod ast;
mod error;
mod index_str;
mod output;
mod parse;
mod subs;
mod tests;

pub use error::{Error, Result};

use arena::{Arena, NodeId};
use ast::{FunctionRefQual, NodeKind, Qualifiers};
use output::OutputBuffer;
use parse::Demangler;
use std::fmt;

/// Demangle a symbol in one call.
///
/// Accepts `_Z…`/`__Z…` encodings, the Objective-C block-invoke
/// trampolines `___Z…_block_invoke`/`____Z…_block_invoke`, and a bare
/// `<type>` encoding with no prefix. A single `.suffix` tail
/// (`.clone.2`, `.cold`, …) is rendered after the declaration.
pub fn demangle(mangled: &str) -> Result<String> {
    Symbol::new(mangled).map(|sym| sym.demangle())
}

/// A mangled symbol that has been parsed into an AST.
///
/// Parsing happens once, in [`Symbol::new`]; the accessors then print the
/// whole tree ([`Symbol::demangle`]) or just parts of it. The symbol
/// borrows the input string, so identifiers are never copied during the
/// parse.
pub struct Symbol<'a> {
    raw: &'a str,
    arena: Arena<'a>,
    root: NodeId,
}

impl<'a> Symbol<'a> {
    /// Parse a mangled symbol.
    ///
    /// ```
    /// use itanium_demangler::Symbol;
    ///
    /// let sym = Symbol::new("_Z1fPFvvE").unwrap();
    /// assert_eq!(sym.demangle(), "f(void (*)())");
    /// ```
    pub fn new(raw: &'a str) -> Result<Symbol<'a>> {
        match Demangler::new(raw.as_bytes()).parse() {
            Ok((arena, root)) => {
                log::trace!("parsed {:?} into {} nodes", raw, arena.len());
                Ok(Symbol { raw, arena, root })
            }
            Err(err) => {
                log::trace!("failed to demangle {:?}: {}", raw, err);
                Err(err)
            }
        }
    }

    /// The raw mangled input this symbol was parsed from.
    pub fn mangled(&self) -> &'a str {
        self.raw
    }

    /// Render the whole symbol as a source-like declaration.
    pub fn demangle(&self) -> String {
        let mut ob = OutputBuffer::new();
        self.arena.print(self.root, &mut ob);
        ob.into_string()
    }

    fn print_node(&self, id: NodeId) -> String {
        let mut ob = OutputBuffer::new();
        self.arena.print(id, &mut ob);
        ob.into_string()
    }

    fn function_encoding(&self) -> Option<(Option<NodeId>, NodeId, arena::NodeArray)> {
        match &self.arena.node(self.root).kind {
            NodeKind::FunctionEncoding {
                ret, name, params, ..
            } => Some((*ret, *name, *params)),
            _ => None,
        }
    }

    /// True if the symbol describes a function (as opposed to data or a
    /// special name).
    pub fn is_function(&self) -> bool {
        matches!(
            self.arena.node(self.root).kind,
            NodeKind::FunctionEncoding { .. }
        )
    }

    /// True for vtables, typeinfo, thunks and the other special symbols.
    pub fn is_special_name(&self) -> bool {
        matches!(
            self.arena.node(self.root).kind,
            NodeKind::SpecialName { .. } | NodeKind::CtorVtableSpecialName { .. }
        )
    }

    /// True if the symbol is a plain data object.
    pub fn is_data(&self) -> bool {
        !self.is_function() && !self.is_special_name()
    }

    /// True if the symbol names a constructor or destructor.
    pub fn is_ctor_or_dtor(&self) -> bool {
        let mut id = self.root;
        loop {
            match &self.arena.node(id).kind {
                NodeKind::CtorDtorName { .. } => return true,
                NodeKind::AbiTagAttr { base, .. } => id = *base,
                NodeKind::FunctionEncoding { name, .. } => id = *name,
                NodeKind::LocalName { entity, .. } => id = *entity,
                NodeKind::NameWithTemplateArgs { name, .. } => id = *name,
                NodeKind::NestedName { name, .. } => id = *name,
                NodeKind::ModuleEntity { name, .. } => id = *name,
                _ => return false,
            }
        }
    }

    /// True if the function carries CV- or ref-qualifiers.
    pub fn has_function_qualifiers(&self) -> bool {
        match &self.arena.node(self.root).kind {
            NodeKind::FunctionEncoding { cv, ref_qual, .. } => {
                *cv != Qualifiers::empty() || *ref_qual != FunctionRefQual::None
            }
            _ => false,
        }
    }

    /// The unqualified base name of the function, without any scope,
    /// template arguments, or parameters: `foo` for
    /// `ns::foo<int>(char)`. `None` if the symbol is not a function.
    pub fn function_base_name(&self) -> Option<String> {
        let (_, mut name, _) = self.function_encoding()?;
        loop {
            match &self.arena.node(name).kind {
                NodeKind::AbiTagAttr { base, .. } => name = *base,
                NodeKind::ModuleEntity { name: n, .. } => name = *n,
                NodeKind::NestedName { name: n, .. } => name = *n,
                NodeKind::LocalName { entity, .. } => name = *entity,
                NodeKind::NameWithTemplateArgs { name: n, .. } => name = *n,
                _ => return Some(self.print_node(name)),
            }
        }
    }

    /// The scope the function is declared in: `ns` for
    /// `ns::foo<int>(char)`, empty for a free function. `None` if the
    /// symbol is not a function.
    pub fn function_decl_context_name(&self) -> Option<String> {
        let (_, mut name, _) = self.function_encoding()?;
        let mut ob = OutputBuffer::new();

        loop {
            loop {
                match &self.arena.node(name).kind {
                    NodeKind::AbiTagAttr { base, .. } => name = *base,
                    NodeKind::NameWithTemplateArgs { name: n, .. } => name = *n,
                    _ => break,
                }
            }

            if let NodeKind::ModuleEntity { name: n, .. } = &self.arena.node(name).kind {
                name = *n;
            }

            match &self.arena.node(name).kind {
                NodeKind::NestedName { qual, .. } => {
                    self.arena.print(*qual, &mut ob);
                }
                NodeKind::LocalName { encoding, entity } => {
                    self.arena.print(*encoding, &mut ob);
                    ob.write_str("::");
                    name = *entity;
                    continue;
                }
                _ => {}
            }
            return Some(ob.into_string());
        }
    }

    /// The full (possibly qualified and templated) function name, without
    /// parameters. `None` if the symbol is not a function.
    pub fn function_name(&self) -> Option<String> {
        let (_, name, _) = self.function_encoding()?;
        Some(self.print_node(name))
    }

    /// The parenthesized parameter list: `(int, char)`. `None` if the
    /// symbol is not a function.
    pub fn function_parameters(&self) -> Option<String> {
        let (_, _, params) = self.function_encoding()?;
        let mut ob = OutputBuffer::new();
        ob.write_str("(");
        self.arena.print_with_comma(params, &mut ob);
        ob.write_str(")");
        Some(ob.into_string())
    }

    /// The return type, when the encoding spells one (template functions
    /// do); empty otherwise. `None` if the symbol is not a function.
    pub fn function_return_type(&self) -> Option<String> {
        let (ret, _, _) = self.function_encoding()?;
        let mut ob = OutputBuffer::new();
        if let Some(ret) = ret {
            self.arena.print(ret, &mut ob);
        }
        Some(ob.into_string())
    }
}

impl fmt::Display for Symbol<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut ob = OutputBuffer::new();
        self.arena.print(self.root, &mut ob);
        f.write_str(ob.as_str())
    }
}

impl fmt::Debug for Symbol<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Symbol").field("raw", &self.raw).finish()
    }
}
