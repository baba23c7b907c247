//! The demangler's abstract syntax tree and its printer.
//!
//! Parsing builds a tree of [`Node`]s in the arena; printing walks it with
//! a visitor dispatch on [`NodeKind`]. Every node renders in two halves,
//! `print_left` and `print_right`, because C++ declarator syntax wraps the
//! declared entity: `int (*f)[5]` is the left part `int (*`, the entity,
//! then the right part `)[5]`. Containers (pointers, references, arrays,
//! functions, pointers to member) override both halves so the composition
//! comes out in source order; everything else only has a left half.

use core::cell::Cell;
use core::mem;

use crate::arena::{Arena, NodeArray, NodeId};
use crate::output::{OutputBuffer, NO_PACK};

/// Three-way bool to track a cached value. `Unknown` is possible if the
/// node has an unexpanded parameter pack below it that may affect the
/// answer, in which case the query is re-evaluated against the active pack
/// element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cache {
    Yes,
    No,
    Unknown,
}

/// Operator precedence for expression nodes. Used to determine required
/// parentheses in expression emission; the discriminants are compared
/// numerically, so order matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Prec {
    Primary,
    Postfix,
    Unary,
    Cast,
    PtrMem,
    Multiplicative,
    Additive,
    Shift,
    Spaceship,
    Relational,
    Equality,
    And,
    Xor,
    Ior,
    AndIf,
    OrIf,
    Conditional,
    Assign,
    Comma,
    Default,
}

bitflags::bitflags! {
    /// CV-qualifier set on types, nested names and function encodings.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Qualifiers: u8 {
        const CONST = 1 << 0;
        const VOLATILE = 1 << 1;
        const RESTRICT = 1 << 2;
    }
}

/// Function reference qualifier (`void f() &`, `void f() &&`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionRefQual {
    None,
    LValue,
    RValue,
}

/// Reference flavor. `LValue` sorts before `RValue` so reference
/// collapsing is `min` over the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReferenceKind {
    LValue,
    RValue,
}

/// Which kind of synthetic template parameter a `<template-param-decl>`
/// introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateParamKind {
    Type,
    NonType,
    Template,
}

/// The six single-letter `std::` substitutions. Order matters:
/// `String` and later are instantiations of their `basic_` templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SpecialSubKind {
    Allocator,
    BasicString,
    String,
    Istream,
    Ostream,
    Iostream,
}

impl SpecialSubKind {
    fn is_instantiation(self) -> bool {
        self >= SpecialSubKind::String
    }

    /// The `std::` member the substitution expands to.
    fn expanded_name(self) -> &'static str {
        match self {
            SpecialSubKind::Allocator => "allocator",
            SpecialSubKind::BasicString | SpecialSubKind::String => "basic_string",
            SpecialSubKind::Istream => "basic_istream",
            SpecialSubKind::Ostream => "basic_ostream",
            SpecialSubKind::Iostream => "basic_iostream",
        }
    }

    /// The typedef name; instantiations drop the `basic_` prefix.
    fn abbreviated_name(self) -> &'static str {
        match self {
            SpecialSubKind::String => "string",
            SpecialSubKind::Istream => "istream",
            SpecialSubKind::Ostream => "ostream",
            SpecialSubKind::Iostream => "iostream",
            other => other.expanded_name(),
        }
    }
}

/// The closed set of node kinds.
///
/// Text payloads are either spans of the mangled input or static spellings
/// from the grammar tables; both are byte slices so that arbitrary bytes
/// in identifiers survive until the (lossy) conversion at print time.
#[derive(Debug)]
pub enum NodeKind<'a> {
    // -- Types and names --
    /// A builtin type, source name or other bare identifier.
    NameType { name: &'a [u8] },
    /// `encoding (.suffix)` for compiler-generated `.clone.N` / `.cold`
    /// tails.
    DotSuffix { prefix: NodeId, suffix: &'a [u8] },
    VendorExtQualType {
        ty: NodeId,
        ext: &'a [u8],
        args: Option<NodeId>,
    },
    QualType { child: NodeId, quals: Qualifiers },
    ConversionOperatorType { ty: NodeId },
    /// ` complex` / ` imaginary` suffix types.
    PostfixQualifiedType { ty: NodeId, postfix: &'static str },
    BitIntType { size: NodeId, signed: bool },
    /// `struct` / `union` / `enum` elaborated type specifier.
    ElaboratedTypeSpef { kind: &'static str, child: NodeId },
    AbiTagAttr { base: NodeId, tag: &'a [u8] },
    EnableIfAttr { conditions: NodeArray },
    ObjCProtoName { ty: NodeId, protocol: &'a [u8] },
    PointerType { pointee: NodeId },
    ReferenceType {
        pointee: NodeId,
        kind: ReferenceKind,
        /// Re-entry guard: an ill-formed mangling can tie the collapse
        /// chain into a cycle through a forward reference.
        printing: Cell<bool>,
    },
    PointerToMemberType { class_ty: NodeId, member_ty: NodeId },
    ArrayType {
        base: NodeId,
        dimension: Option<NodeId>,
    },
    FunctionType {
        ret: NodeId,
        params: NodeArray,
        cv: Qualifiers,
        ref_qual: FunctionRefQual,
        exception_spec: Option<NodeId>,
    },
    NoexceptSpec { expr: NodeId },
    DynamicExceptionSpec { types: NodeArray },
    FunctionEncoding {
        ret: Option<NodeId>,
        name: NodeId,
        params: NodeArray,
        attrs: Option<NodeId>,
        cv: Qualifiers,
        ref_qual: FunctionRefQual,
    },
    LiteralOperator { op: NodeId },
    /// `vtable for `, `guard variable for `, thunks, and friends.
    SpecialName {
        special: &'static str,
        child: NodeId,
    },
    CtorVtableSpecialName { first_ty: NodeId, second_ty: NodeId },
    NestedName { qual: NodeId, name: NodeId },
    ModuleName {
        parent: Option<NodeId>,
        name: NodeId,
        is_partition: bool,
    },
    ModuleEntity { module: NodeId, name: NodeId },
    LocalName { encoding: NodeId, entity: NodeId },
    QualifiedName { qualifier: NodeId, name: NodeId },
    VectorType {
        base: NodeId,
        dimension: Option<NodeId>,
    },
    PixelVectorType { dimension: NodeId },

    // -- Templates --
    /// An invented name for a template parameter for which there is no
    /// corresponding template argument (explicit lambda template heads).
    SyntheticTemplateParamName {
        kind: TemplateParamKind,
        index: u32,
    },
    TypeTemplateParamDecl { name: NodeId },
    NonTypeTemplateParamDecl { name: NodeId, ty: NodeId },
    TemplateTemplateParamDecl { name: NodeId, params: NodeArray },
    TemplateParamPackDecl { param: NodeId },
    /// An unexpanded parameter pack; stands in for the whole
    /// multi-element template argument when referenced via `T_`.
    ParameterPack { data: NodeArray },
    /// `J…E` in some `<template-args>`.
    TemplateArgumentPack { elements: NodeArray },
    ParameterPackExpansion { child: NodeId },
    TemplateArgs { params: NodeArray },
    /// A `<template-param>` that was parsed before its argument list
    /// (conversion operator types); the target is patched in once the
    /// enclosing encoding's arguments are known.
    ForwardTemplateReference {
        index: usize,
        target: Cell<Option<NodeId>>,
        printing: Cell<bool>,
    },
    NameWithTemplateArgs { name: NodeId, args: NodeId },
    GlobalQualifiedName { child: NodeId },
    ExpandedSpecialSubstitution { kind: SpecialSubKind },
    SpecialSubstitution { kind: SpecialSubKind },
    CtorDtorName {
        basename: NodeId,
        is_dtor: bool,
        variant: i32,
    },
    DtorName { base: NodeId },
    UnnamedTypeName { count: &'a [u8] },
    ClosureTypeName {
        template_params: NodeArray,
        params: NodeArray,
        count: &'a [u8],
    },
    StructuredBindingName { bindings: NodeArray },

    // -- Expressions --
    BinaryExpr {
        lhs: NodeId,
        op: &'static str,
        rhs: NodeId,
    },
    ArraySubscriptExpr { base: NodeId, index: NodeId },
    PostfixExpr { child: NodeId, op: &'static str },
    ConditionalExpr {
        cond: NodeId,
        then: NodeId,
        else_: NodeId,
    },
    MemberExpr {
        lhs: NodeId,
        kind: &'static str,
        rhs: NodeId,
    },
    SubobjectExpr {
        ty: NodeId,
        sub_expr: NodeId,
        offset: &'a [u8],
        union_selectors: NodeArray,
        one_past_the_end: bool,
    },
    /// `prefix(infix)`: decltype, noexcept, sizeof, alignof, typeid, and
    /// `sizeof...` over a function parameter pack.
    EnclosingExpr {
        prefix: &'static str,
        infix: NodeId,
    },
    /// `static_cast<to>(from)` and the other named casts.
    CastExpr {
        cast_kind: &'static str,
        to: NodeId,
        from: NodeId,
    },
    SizeofParamPackExpr { pack: NodeId },
    CallExpr { callee: NodeId, args: NodeArray },
    NewExpr {
        expr_list: NodeArray,
        ty: NodeId,
        init_list: NodeArray,
        is_global: bool,
        is_array: bool,
    },
    DeleteExpr {
        op: NodeId,
        is_global: bool,
        is_array: bool,
    },
    PrefixExpr { prefix: &'static str, child: NodeId },
    FunctionParam { number: &'a [u8] },
    /// `(ty)(expressions…)`, the C cast.
    ConversionExpr { ty: NodeId, expressions: NodeArray },
    PointerToMemberConversionExpr {
        ty: NodeId,
        sub_expr: NodeId,
        offset: &'a [u8],
    },
    InitListExpr {
        ty: Option<NodeId>,
        inits: NodeArray,
    },
    BracedExpr {
        elem: NodeId,
        init: NodeId,
        is_array: bool,
    },
    BracedRangeExpr {
        first: NodeId,
        last: NodeId,
        init: NodeId,
    },
    FoldExpr {
        is_left_fold: bool,
        op: &'static str,
        pack: NodeId,
        init: Option<NodeId>,
    },
    ThrowExpr { op: NodeId },
    BoolExpr { value: bool },
    StringLiteral { ty: NodeId },
    LambdaExpr { ty: NodeId },
    EnumLiteral { ty: NodeId, integer: &'a [u8] },
    IntegerLiteral {
        ty: &'static str,
        value: &'a [u8],
    },
    /// A bare comma-printed list (captured packs in `sizeof...`).
    NodeArrayNode { array: NodeArray },
}

/// An AST node: a kind plus the per-node printer metadata.
#[derive(Debug)]
pub struct Node<'a> {
    pub(crate) kind: NodeKind<'a>,
    pub(crate) prec: Prec,
    /// Whether this node has a component on its right side, in which case
    /// `print` must call `print_right`.
    pub(crate) rhs_cache: Cache,
    /// Whether this node is a (possibly qualified) array type.
    pub(crate) array_cache: Cache,
    /// Whether this node is a (possibly qualified) function type.
    pub(crate) function_cache: Cache,
}

#[cfg(test)]
impl<'a> NodeKind<'a> {
    /// Wrap a leaf kind without consulting an arena. Container kinds get
    /// their caches from [`Node::with_caches`].
    pub(crate) fn into_node(self) -> Node<'a> {
        Node {
            kind: self,
            prec: Prec::Primary,
            rhs_cache: Cache::No,
            array_cache: Cache::No,
            function_cache: Cache::No,
        }
    }
}

impl<'a> Node<'a> {
    /// Build a node, deriving the tri-state caches from the kind. The
    /// caches are fixed here; `Unknown` answers are recomputed per query
    /// against the active pack element.
    pub(crate) fn with_caches(kind: NodeKind<'a>, prec: Prec, arena: &Arena<'a>) -> Node<'a> {
        let (rhs, array, function) = match &kind {
            NodeKind::QualType { child, .. } => {
                let c = arena.node(*child);
                (c.rhs_cache, c.array_cache, c.function_cache)
            }
            NodeKind::AbiTagAttr { base, .. } => {
                let b = arena.node(*base);
                (b.rhs_cache, b.array_cache, b.function_cache)
            }
            NodeKind::PointerType { pointee } | NodeKind::ReferenceType { pointee, .. } => {
                (arena.node(*pointee).rhs_cache, Cache::No, Cache::No)
            }
            NodeKind::PointerToMemberType { member_ty, .. } => {
                (arena.node(*member_ty).rhs_cache, Cache::No, Cache::No)
            }
            NodeKind::ArrayType { .. } => (Cache::Yes, Cache::Yes, Cache::No),
            NodeKind::FunctionType { .. } | NodeKind::FunctionEncoding { .. } => {
                (Cache::Yes, Cache::No, Cache::Yes)
            }
            NodeKind::TypeTemplateParamDecl { .. }
            | NodeKind::NonTypeTemplateParamDecl { .. }
            | NodeKind::TemplateTemplateParamDecl { .. }
            | NodeKind::TemplateParamPackDecl { .. } => (Cache::Yes, Cache::No, Cache::No),
            NodeKind::ParameterPack { data } => {
                let mut rhs = Cache::Unknown;
                let mut array = Cache::Unknown;
                let mut function = Cache::Unknown;
                if arena
                    .array(*data)
                    .iter()
                    .all(|&e| arena.node(e).rhs_cache == Cache::No)
                {
                    rhs = Cache::No;
                }
                if arena
                    .array(*data)
                    .iter()
                    .all(|&e| arena.node(e).array_cache == Cache::No)
                {
                    array = Cache::No;
                }
                if arena
                    .array(*data)
                    .iter()
                    .all(|&e| arena.node(e).function_cache == Cache::No)
                {
                    function = Cache::No;
                }
                (rhs, array, function)
            }
            NodeKind::ForwardTemplateReference { .. } => {
                (Cache::Unknown, Cache::Unknown, Cache::Unknown)
            }
            _ => (Cache::No, Cache::No, Cache::No),
        };
        Node {
            kind,
            prec,
            rhs_cache: rhs,
            array_cache: array,
            function_cache: function,
        }
    }
}

fn write_quals(quals: Qualifiers, ob: &mut OutputBuffer) {
    if quals.contains(Qualifiers::CONST) {
        ob.write_str(" const");
    }
    if quals.contains(Qualifiers::VOLATILE) {
        ob.write_str(" volatile");
    }
    if quals.contains(Qualifiers::RESTRICT) {
        ob.write_str(" restrict");
    }
}

/// Numbers in manglings spell their sign as a leading `n`.
fn write_maybe_negative(value: &[u8], ob: &mut OutputBuffer) {
    match value.split_first() {
        Some((b'n', rest)) => {
            ob.write_str("-");
            ob.write_lossy(rest);
        }
        _ => ob.write_lossy(value),
    }
}

impl<'a> Arena<'a> {
    /// Print a whole subtree: the left half, then the right half when the
    /// node has one. Depth-guarded because substitution back-references
    /// can chain nodes far deeper than the parser's own recursion.
    pub fn print(&self, id: NodeId, ob: &mut OutputBuffer) {
        if !ob.enter() {
            return;
        }
        self.print_left(id, ob);
        if self.node(id).rhs_cache != Cache::No {
            self.print_right(id, ob);
        }
        ob.exit();
    }

    /// Print this node as an expression operand, parenthesizing it if its
    /// precedence is (strictly) weaker than `prec`.
    pub(crate) fn print_as_operand(
        &self,
        id: NodeId,
        ob: &mut OutputBuffer,
        prec: Prec,
        strictly_worse: bool,
    ) {
        let paren = self.node(id).prec as u32 >= prec as u32 + strictly_worse as u32;
        if paren {
            ob.print_open('(');
        }
        self.print(id, ob);
        if paren {
            ob.print_close(')');
        }
    }

    /// Comma-separated printing. An element that is an empty pack
    /// expansion prints nothing; the comma written ahead of it is erased.
    pub(crate) fn print_with_comma(&self, array: NodeArray, ob: &mut OutputBuffer) {
        let mut first = true;
        for idx in 0..array.len() {
            let id = self.array(array)[idx];
            let before_comma = ob.position();
            if !first {
                ob.write_str(", ");
            }
            let after_comma = ob.position();
            self.print_as_operand(id, ob, Prec::Comma, false);

            if after_comma == ob.position() {
                ob.truncate_to(before_comma);
                continue;
            }
            first = false;
        }
    }

    pub(crate) fn has_rhs_component(&self, id: NodeId, ob: &mut OutputBuffer) -> bool {
        let node = self.node(id);
        if node.rhs_cache != Cache::Unknown {
            return node.rhs_cache == Cache::Yes;
        }
        match &node.kind {
            NodeKind::QualType { child, .. } => self.has_rhs_component(*child, ob),
            NodeKind::AbiTagAttr { base, .. } => self.has_rhs_component(*base, ob),
            NodeKind::PointerType { pointee } | NodeKind::ReferenceType { pointee, .. } => {
                self.has_rhs_component(*pointee, ob)
            }
            NodeKind::PointerToMemberType { member_ty, .. } => {
                self.has_rhs_component(*member_ty, ob)
            }
            NodeKind::ParameterPack { data } => {
                self.initialize_pack_expansion(*data, ob);
                let idx = ob.pack_index as usize;
                idx < data.len() && self.has_rhs_component(self.array(*data)[idx], ob)
            }
            NodeKind::ForwardTemplateReference {
                target, printing, ..
            } => {
                if printing.get() {
                    return false;
                }
                printing.set(true);
                let result = match target.get() {
                    Some(t) => self.has_rhs_component(t, ob),
                    None => false,
                };
                printing.set(false);
                result
            }
            _ => false,
        }
    }

    pub(crate) fn has_array(&self, id: NodeId, ob: &mut OutputBuffer) -> bool {
        let node = self.node(id);
        if node.array_cache != Cache::Unknown {
            return node.array_cache == Cache::Yes;
        }
        match &node.kind {
            NodeKind::QualType { child, .. } => self.has_array(*child, ob),
            NodeKind::AbiTagAttr { base, .. } => self.has_array(*base, ob),
            NodeKind::ParameterPack { data } => {
                self.initialize_pack_expansion(*data, ob);
                let idx = ob.pack_index as usize;
                idx < data.len() && self.has_array(self.array(*data)[idx], ob)
            }
            NodeKind::ForwardTemplateReference {
                target, printing, ..
            } => {
                if printing.get() {
                    return false;
                }
                printing.set(true);
                let result = match target.get() {
                    Some(t) => self.has_array(t, ob),
                    None => false,
                };
                printing.set(false);
                result
            }
            _ => false,
        }
    }

    pub(crate) fn has_function(&self, id: NodeId, ob: &mut OutputBuffer) -> bool {
        let node = self.node(id);
        if node.function_cache != Cache::Unknown {
            return node.function_cache == Cache::Yes;
        }
        match &node.kind {
            NodeKind::QualType { child, .. } => self.has_function(*child, ob),
            NodeKind::AbiTagAttr { base, .. } => self.has_function(*base, ob),
            NodeKind::ParameterPack { data } => {
                self.initialize_pack_expansion(*data, ob);
                let idx = ob.pack_index as usize;
                idx < data.len() && self.has_function(self.array(*data)[idx], ob)
            }
            NodeKind::ForwardTemplateReference {
                target, printing, ..
            } => {
                if printing.get() {
                    return false;
                }
                printing.set(true);
                let result = match target.get() {
                    Some(t) => self.has_function(t, ob),
                    None => false,
                };
                printing.set(false);
                result
            }
            _ => false,
        }
    }

    /// Dig through glue nodes (parameter packs, forward references) to the
    /// node that carries concrete syntax for the active pack element.
    fn syntax_node(&self, id: NodeId, ob: &mut OutputBuffer) -> NodeId {
        match &self.node(id).kind {
            NodeKind::ParameterPack { data } => {
                self.initialize_pack_expansion(*data, ob);
                let idx = ob.pack_index as usize;
                if idx < data.len() {
                    self.syntax_node(self.array(*data)[idx], ob)
                } else {
                    id
                }
            }
            NodeKind::ForwardTemplateReference {
                target, printing, ..
            } => {
                if printing.get() {
                    return id;
                }
                printing.set(true);
                let result = match target.get() {
                    Some(t) => self.syntax_node(t, ob),
                    None => id,
                };
                printing.set(false);
                result
            }
            _ => id,
        }
    }

    /// Strip decorations down to the unqualified identifier, for
    /// constructor/destructor spelling and the partial API.
    pub(crate) fn base_name(&self, id: NodeId) -> &'a [u8] {
        match &self.node(id).kind {
            NodeKind::NameType { name } => *name,
            NodeKind::NestedName { name, .. }
            | NodeKind::QualifiedName { name, .. }
            | NodeKind::NameWithTemplateArgs { name, .. }
            | NodeKind::ModuleEntity { name, .. } => self.base_name(*name),
            NodeKind::GlobalQualifiedName { child } => self.base_name(*child),
            NodeKind::ExpandedSpecialSubstitution { kind } => kind.expanded_name().as_bytes(),
            NodeKind::SpecialSubstitution { kind } => kind.abbreviated_name().as_bytes(),
            _ => b"",
        }
    }

    /// Start a pack expansion at this pack, unless one is already active.
    fn initialize_pack_expansion(&self, data: NodeArray, ob: &mut OutputBuffer) {
        if ob.pack_max == NO_PACK {
            ob.pack_max = data.len() as u32;
            ob.pack_index = 0;
        }
    }

    /// Print `child` once per pack element, comma-separated. If no pack
    /// was found below `child` the expansion was over a function parameter
    /// and prints as `...`; an empty pack erases what the probe printed.
    fn print_pack_expansion(&self, child: NodeId, ob: &mut OutputBuffer) {
        let saved_index = mem::replace(&mut ob.pack_index, NO_PACK);
        let saved_max = mem::replace(&mut ob.pack_max, NO_PACK);
        let stream_pos = ob.position();

        // Print the first element. If a pack lives below `child`, this
        // also discovers its cardinality.
        self.print(child, ob);

        if ob.pack_max == NO_PACK {
            ob.write_str("...");
        } else if ob.pack_max == 0 {
            ob.truncate_to(stream_pos);
        } else {
            for i in 1..ob.pack_max {
                ob.write_str(", ");
                ob.pack_index = i;
                self.print(child, ob);
            }
        }

        ob.pack_index = saved_index;
        ob.pack_max = saved_max;
    }

    /// If `id` is the Objective-C `objc_object<Protocol>` node, return the
    /// protocol so a pointer to it can be rewritten as `id<Protocol>`.
    fn objc_object_protocol(&self, id: NodeId) -> Option<&'a [u8]> {
        match &self.node(id).kind {
            NodeKind::ObjCProtoName { ty, protocol } => match &self.node(*ty).kind {
                NodeKind::NameType { name } if name[..] == b"objc_object"[..] => Some(*protocol),
                _ => None,
            },
            _ => None,
        }
    }

    /// Dig through references to references, collapsing as we go: rvalue
    /// over rvalue stays rvalue, anything else collapses to lvalue.
    /// A forward reference resolved through a back-reference can tie this
    /// chain into a cycle; Floyd's tortoise-and-hare detects it (the
    /// "slow" pointer sits at half the trail) and the caller abandons the
    /// subtree.
    fn collapse_references(
        &self,
        kind: ReferenceKind,
        pointee: NodeId,
        ob: &mut OutputBuffer,
    ) -> Option<(ReferenceKind, NodeId)> {
        let mut so_far = (kind, pointee);
        let mut trail: Vec<NodeId> = Vec::new();
        loop {
            let sn = self.syntax_node(so_far.1, ob);
            let (inner, rk) = match &self.node(sn).kind {
                NodeKind::ReferenceType { pointee, kind, .. } => (*pointee, *kind),
                _ => break,
            };
            so_far = (so_far.0.min(rk), inner);

            trail.push(so_far.1);
            if trail.len() > 1 && so_far.1 == trail[(trail.len() - 1) / 2] {
                return None;
            }
        }
        Some(so_far)
    }

    fn print_closure_declarator(
        &self,
        template_params: NodeArray,
        params: NodeArray,
        ob: &mut OutputBuffer,
    ) {
        if !template_params.is_empty() {
            let saved = mem::replace(&mut ob.gt_is_gt, 0);
            ob.write_str("<");
            self.print_with_comma(template_params, ob);
            ob.write_str(">");
            ob.gt_is_gt = saved;
        }
        ob.print_open('(');
        self.print_with_comma(params, ob);
        ob.print_close(')');
    }

    fn print_left(&self, id: NodeId, ob: &mut OutputBuffer) {
        let node = self.node(id);
        let prec = node.prec;
        match &node.kind {
            NodeKind::NameType { name } => ob.write_lossy(name),

            NodeKind::DotSuffix { prefix, suffix } => {
                self.print(*prefix, ob);
                ob.write_str(" (");
                ob.write_lossy(suffix);
                ob.write_str(")");
            }

            NodeKind::VendorExtQualType { ty, ext, args } => {
                self.print(*ty, ob);
                ob.write_str(" ");
                ob.write_lossy(ext);
                if let Some(args) = args {
                    self.print(*args, ob);
                }
            }

            NodeKind::QualType { child, quals } => {
                self.print_left(*child, ob);
                write_quals(*quals, ob);
            }

            NodeKind::ConversionOperatorType { ty } => {
                ob.write_str("operator ");
                self.print(*ty, ob);
            }

            NodeKind::PostfixQualifiedType { ty, postfix } => {
                self.print_left(*ty, ob);
                ob.write_str(postfix);
            }

            NodeKind::BitIntType { size, signed } => {
                if !signed {
                    ob.write_str("unsigned ");
                }
                ob.write_str("_BitInt");
                ob.print_open('(');
                self.print_as_operand(*size, ob, Prec::Default, false);
                ob.print_close(')');
            }

            NodeKind::ElaboratedTypeSpef { kind, child } => {
                ob.write_str(kind);
                ob.write_str(" ");
                self.print(*child, ob);
            }

            NodeKind::AbiTagAttr { base, tag } => {
                self.print_left(*base, ob);
                ob.write_str("[abi:");
                ob.write_lossy(tag);
                ob.write_str("]");
            }

            NodeKind::EnableIfAttr { conditions } => {
                ob.write_str(" [enable_if:");
                self.print_with_comma(*conditions, ob);
                ob.write_str("]");
            }

            NodeKind::ObjCProtoName { ty, protocol } => {
                self.print(*ty, ob);
                ob.write_str("<");
                ob.write_lossy(protocol);
                ob.write_str(">");
            }

            NodeKind::PointerType { pointee } => {
                // objc_object<SomeProtocol>* is rewritten to
                // id<SomeProtocol>.
                if let Some(protocol) = self.objc_object_protocol(*pointee) {
                    ob.write_str("id<");
                    ob.write_lossy(protocol);
                    ob.write_str(">");
                } else {
                    self.print_left(*pointee, ob);
                    if self.has_array(*pointee, ob) {
                        ob.write_str(" ");
                    }
                    if self.has_array(*pointee, ob) || self.has_function(*pointee, ob) {
                        ob.write_str("(");
                    }
                    ob.write_str("*");
                }
            }

            NodeKind::ReferenceType {
                pointee,
                kind,
                printing,
            } => {
                if printing.get() {
                    return;
                }
                printing.set(true);
                if let Some((rk, inner)) = self.collapse_references(*kind, *pointee, ob) {
                    self.print_left(inner, ob);
                    if self.has_array(inner, ob) {
                        ob.write_str(" ");
                    }
                    if self.has_array(inner, ob) || self.has_function(inner, ob) {
                        ob.write_str("(");
                    }
                    ob.write_str(if rk == ReferenceKind::LValue { "&" } else { "&&" });
                }
                printing.set(false);
            }

            NodeKind::PointerToMemberType {
                class_ty,
                member_ty,
            } => {
                self.print_left(*member_ty, ob);
                if self.has_array(*member_ty, ob) || self.has_function(*member_ty, ob) {
                    ob.write_str("(");
                } else {
                    ob.write_str(" ");
                }
                self.print(*class_ty, ob);
                ob.write_str("::*");
            }

            NodeKind::ArrayType { base, .. } => {
                self.print_left(*base, ob);
            }

            NodeKind::FunctionType { ret, .. } => {
                self.print_left(*ret, ob);
                ob.write_str(" ");
            }

            NodeKind::NoexceptSpec { expr } => {
                ob.write_str("noexcept");
                ob.print_open('(');
                self.print_as_operand(*expr, ob, Prec::Default, false);
                ob.print_close(')');
            }

            NodeKind::DynamicExceptionSpec { types } => {
                ob.write_str("throw");
                ob.print_open('(');
                self.print_with_comma(*types, ob);
                ob.print_close(')');
            }

            NodeKind::FunctionEncoding { ret, name, .. } => {
                if let Some(ret) = ret {
                    self.print_left(*ret, ob);
                    if !self.has_rhs_component(*ret, ob) {
                        ob.write_str(" ");
                    }
                }
                self.print(*name, ob);
            }

            NodeKind::LiteralOperator { op } => {
                ob.write_str("operator\"\" ");
                self.print(*op, ob);
            }

            NodeKind::SpecialName { special, child } => {
                ob.write_str(special);
                self.print(*child, ob);
            }

            NodeKind::CtorVtableSpecialName {
                first_ty,
                second_ty,
            } => {
                ob.write_str("construction vtable for ");
                self.print(*first_ty, ob);
                ob.write_str("-in-");
                self.print(*second_ty, ob);
            }

            NodeKind::NestedName { qual, name } => {
                self.print(*qual, ob);
                ob.write_str("::");
                self.print(*name, ob);
            }

            NodeKind::ModuleName {
                parent,
                name,
                is_partition,
            } => {
                if let Some(parent) = parent {
                    self.print(*parent, ob);
                }
                if parent.is_some() || *is_partition {
                    ob.write_str(if *is_partition { ":" } else { "." });
                }
                self.print(*name, ob);
            }

            NodeKind::ModuleEntity { module, name } => {
                self.print(*name, ob);
                ob.write_str("@");
                self.print(*module, ob);
            }

            NodeKind::LocalName { encoding, entity } => {
                self.print(*encoding, ob);
                ob.write_str("::");
                self.print(*entity, ob);
            }

            NodeKind::QualifiedName { qualifier, name } => {
                self.print(*qualifier, ob);
                ob.write_str("::");
                self.print(*name, ob);
            }

            NodeKind::VectorType { base, dimension } => {
                self.print(*base, ob);
                ob.write_str(" vector[");
                if let Some(dimension) = dimension {
                    self.print(*dimension, ob);
                }
                ob.write_str("]");
            }

            NodeKind::PixelVectorType { dimension } => {
                ob.write_str("pixel vector[");
                self.print(*dimension, ob);
                ob.write_str("]");
            }

            NodeKind::SyntheticTemplateParamName { kind, index } => {
                ob.write_str(match kind {
                    TemplateParamKind::Type => "$T",
                    TemplateParamKind::NonType => "$N",
                    TemplateParamKind::Template => "$TT",
                });
                if *index > 0 {
                    use core::fmt::Write;
                    let _ = write!(ob, "{}", index - 1);
                }
            }

            NodeKind::TypeTemplateParamDecl { .. } => ob.write_str("typename "),

            NodeKind::NonTypeTemplateParamDecl { ty, .. } => {
                self.print_left(*ty, ob);
                if !self.has_rhs_component(*ty, ob) {
                    ob.write_str(" ");
                }
            }

            NodeKind::TemplateTemplateParamDecl { params, .. } => {
                let saved = mem::replace(&mut ob.gt_is_gt, 0);
                ob.write_str("template<");
                self.print_with_comma(*params, ob);
                ob.write_str("> typename ");
                ob.gt_is_gt = saved;
            }

            NodeKind::TemplateParamPackDecl { param } => {
                self.print_left(*param, ob);
                ob.write_str("...");
            }

            NodeKind::ParameterPack { data } => {
                self.initialize_pack_expansion(*data, ob);
                let idx = ob.pack_index as usize;
                if idx < data.len() {
                    self.print_left(self.array(*data)[idx], ob);
                }
            }

            NodeKind::TemplateArgumentPack { elements } => {
                self.print_with_comma(*elements, ob);
            }

            NodeKind::ParameterPackExpansion { child } => {
                self.print_pack_expansion(*child, ob);
            }

            NodeKind::TemplateArgs { params } => {
                let saved = mem::replace(&mut ob.gt_is_gt, 0);
                ob.write_str("<");
                self.print_with_comma(*params, ob);
                ob.write_str(">");
                ob.gt_is_gt = saved;
            }

            NodeKind::ForwardTemplateReference {
                target, printing, ..
            } => {
                if printing.get() {
                    return;
                }
                printing.set(true);
                if let Some(target) = target.get() {
                    self.print_left(target, ob);
                }
                printing.set(false);
            }

            NodeKind::NameWithTemplateArgs { name, args } => {
                self.print(*name, ob);
                self.print(*args, ob);
            }

            NodeKind::GlobalQualifiedName { child } => {
                ob.write_str("::");
                self.print(*child, ob);
            }

            NodeKind::ExpandedSpecialSubstitution { kind } => {
                ob.write_str("std::");
                ob.write_str(kind.expanded_name());
                if kind.is_instantiation() {
                    ob.write_str("<char, std::char_traits<char>");
                    if *kind == SpecialSubKind::String {
                        ob.write_str(", std::allocator<char>");
                    }
                    ob.write_str(">");
                }
            }

            NodeKind::SpecialSubstitution { kind } => {
                ob.write_str("std::");
                ob.write_str(kind.abbreviated_name());
            }

            NodeKind::CtorDtorName {
                basename, is_dtor, ..
            } => {
                if *is_dtor {
                    ob.write_str("~");
                }
                let name = self.base_name(*basename);
                ob.write_lossy(name);
            }

            NodeKind::DtorName { base } => {
                ob.write_str("~");
                self.print_left(*base, ob);
            }

            NodeKind::UnnamedTypeName { count } => {
                ob.write_str("'unnamed");
                ob.write_lossy(count);
                ob.write_str("'");
            }

            NodeKind::ClosureTypeName {
                template_params,
                params,
                count,
            } => {
                ob.write_str("'lambda");
                ob.write_lossy(count);
                ob.write_str("'");
                self.print_closure_declarator(*template_params, *params, ob);
            }

            NodeKind::StructuredBindingName { bindings } => {
                ob.print_open('[');
                self.print_with_comma(*bindings, ob);
                ob.print_close(']');
            }

            NodeKind::BinaryExpr { lhs, op, rhs } => {
                let paren_all =
                    ob.is_gt_inside_template_args() && (*op == ">" || *op == ">>");
                if paren_all {
                    ob.print_open('(');
                }
                // Assignment is right associative, with special LHS
                // precedence.
                let is_assign = prec == Prec::Assign;
                self.print_as_operand(
                    *lhs,
                    ob,
                    if is_assign { Prec::OrIf } else { prec },
                    !is_assign,
                );
                if *op != "," {
                    ob.write_str(" ");
                }
                ob.write_str(op);
                ob.write_str(" ");
                self.print_as_operand(*rhs, ob, prec, is_assign);
                if paren_all {
                    ob.print_close(')');
                }
            }

            NodeKind::ArraySubscriptExpr { base, index } => {
                self.print_as_operand(*base, ob, prec, false);
                ob.print_open('[');
                self.print_as_operand(*index, ob, Prec::Default, false);
                ob.print_close(']');
            }

            NodeKind::PostfixExpr { child, op } => {
                self.print_as_operand(*child, ob, prec, true);
                ob.write_str(op);
            }

            NodeKind::ConditionalExpr { cond, then, else_ } => {
                self.print_as_operand(*cond, ob, prec, false);
                ob.write_str(" ? ");
                self.print_as_operand(*then, ob, Prec::Default, false);
                ob.write_str(" : ");
                self.print_as_operand(*else_, ob, Prec::Assign, true);
            }

            NodeKind::MemberExpr { lhs, kind, rhs } => {
                self.print_as_operand(*lhs, ob, prec, true);
                ob.write_str(kind);
                self.print_as_operand(*rhs, ob, prec, false);
            }

            NodeKind::SubobjectExpr {
                ty,
                sub_expr,
                offset,
                ..
            } => {
                self.print(*sub_expr, ob);
                ob.write_str(".<");
                self.print(*ty, ob);
                ob.write_str(" at offset ");
                if offset.is_empty() {
                    ob.write_str("0");
                } else {
                    write_maybe_negative(offset, ob);
                }
                ob.write_str(">");
            }

            NodeKind::EnclosingExpr { prefix, infix } => {
                ob.write_str(prefix);
                ob.print_open('(');
                self.print(*infix, ob);
                ob.print_close(')');
            }

            NodeKind::CastExpr {
                cast_kind,
                to,
                from,
            } => {
                ob.write_str(cast_kind);
                {
                    let saved = mem::replace(&mut ob.gt_is_gt, 0);
                    ob.write_str("<");
                    self.print_left(*to, ob);
                    ob.write_str(">");
                    ob.gt_is_gt = saved;
                }
                ob.print_open('(');
                self.print_as_operand(*from, ob, Prec::Default, false);
                ob.print_close(')');
            }

            NodeKind::SizeofParamPackExpr { pack } => {
                ob.write_str("sizeof...");
                ob.print_open('(');
                self.print_pack_expansion(*pack, ob);
                ob.print_close(')');
            }

            NodeKind::CallExpr { callee, args } => {
                self.print(*callee, ob);
                ob.print_open('(');
                self.print_with_comma(*args, ob);
                ob.print_close(')');
            }

            NodeKind::NewExpr {
                expr_list,
                ty,
                init_list,
                is_global,
                is_array,
            } => {
                if *is_global {
                    ob.write_str("::");
                }
                ob.write_str("new");
                if *is_array {
                    ob.write_str("[]");
                }
                if !expr_list.is_empty() {
                    ob.print_open('(');
                    self.print_with_comma(*expr_list, ob);
                    ob.print_close(')');
                }
                ob.write_str(" ");
                self.print(*ty, ob);
                if !init_list.is_empty() {
                    ob.print_open('(');
                    self.print_with_comma(*init_list, ob);
                    ob.print_close(')');
                }
            }

            NodeKind::DeleteExpr {
                op,
                is_global,
                is_array,
            } => {
                if *is_global {
                    ob.write_str("::");
                }
                ob.write_str("delete");
                if *is_array {
                    ob.write_str("[]");
                }
                ob.write_str(" ");
                self.print(*op, ob);
            }

            NodeKind::PrefixExpr { prefix, child } => {
                ob.write_str(prefix);
                self.print_as_operand(*child, ob, prec, false);
            }

            NodeKind::FunctionParam { number } => {
                ob.write_str("fp");
                ob.write_lossy(number);
            }

            NodeKind::ConversionExpr { ty, expressions } => {
                ob.print_open('(');
                self.print(*ty, ob);
                ob.print_close(')');
                ob.print_open('(');
                self.print_with_comma(*expressions, ob);
                ob.print_close(')');
            }

            NodeKind::PointerToMemberConversionExpr { ty, sub_expr, .. } => {
                ob.print_open('(');
                self.print(*ty, ob);
                ob.print_close(')');
                ob.print_open('(');
                self.print(*sub_expr, ob);
                ob.print_close(')');
            }

            NodeKind::InitListExpr { ty, inits } => {
                if let Some(ty) = ty {
                    self.print(*ty, ob);
                }
                ob.write_str("{");
                self.print_with_comma(*inits, ob);
                ob.write_str("}");
            }

            NodeKind::BracedExpr {
                elem,
                init,
                is_array,
            } => {
                if *is_array {
                    ob.write_str("[");
                    self.print(*elem, ob);
                    ob.write_str("]");
                } else {
                    ob.write_str(".");
                    self.print(*elem, ob);
                }
                if !matches!(
                    self.node(*init).kind,
                    NodeKind::BracedExpr { .. } | NodeKind::BracedRangeExpr { .. }
                ) {
                    ob.write_str(" = ");
                }
                self.print(*init, ob);
            }

            NodeKind::BracedRangeExpr { first, last, init } => {
                ob.write_str("[");
                self.print(*first, ob);
                ob.write_str(" ... ");
                self.print(*last, ob);
                ob.write_str("]");
                if !matches!(
                    self.node(*init).kind,
                    NodeKind::BracedExpr { .. } | NodeKind::BracedRangeExpr { .. }
                ) {
                    ob.write_str(" = ");
                }
                self.print(*init, ob);
            }

            NodeKind::FoldExpr {
                is_left_fold,
                op,
                pack,
                init,
            } => {
                // Either '[init op ]... op pack' or 'pack op ...[ op init]'
                // where fold operands are cast-expressions.
                ob.print_open('(');
                if !is_left_fold || init.is_some() {
                    if *is_left_fold {
                        if let Some(init) = init {
                            self.print_as_operand(*init, ob, Prec::Cast, true);
                        }
                    } else {
                        ob.print_open('(');
                        self.print_pack_expansion(*pack, ob);
                        ob.print_close(')');
                    }
                    ob.write_str(" ");
                    ob.write_str(op);
                    ob.write_str(" ");
                }
                ob.write_str("...");
                if *is_left_fold || init.is_some() {
                    ob.write_str(" ");
                    ob.write_str(op);
                    ob.write_str(" ");
                    if *is_left_fold {
                        ob.print_open('(');
                        self.print_pack_expansion(*pack, ob);
                        ob.print_close(')');
                    } else if let Some(init) = init {
                        self.print_as_operand(*init, ob, Prec::Cast, true);
                    }
                }
                ob.print_close(')');
            }

            NodeKind::ThrowExpr { op } => {
                ob.write_str("throw ");
                self.print(*op, ob);
            }

            NodeKind::BoolExpr { value } => {
                ob.write_str(if *value { "true" } else { "false" });
            }

            NodeKind::StringLiteral { ty } => {
                ob.write_str("\"<");
                self.print(*ty, ob);
                ob.write_str(">\"");
            }

            NodeKind::LambdaExpr { ty } => {
                ob.write_str("[]");
                if let NodeKind::ClosureTypeName {
                    template_params,
                    params,
                    ..
                } = &self.node(*ty).kind
                {
                    self.print_closure_declarator(*template_params, *params, ob);
                }
                ob.write_str("{...}");
            }

            NodeKind::EnumLiteral { ty, integer } => {
                ob.print_open('(');
                self.print(*ty, ob);
                ob.print_close(')');
                write_maybe_negative(integer, ob);
            }

            NodeKind::IntegerLiteral { ty, value } => {
                if ty.len() > 3 {
                    ob.print_open('(');
                    ob.write_str(ty);
                    ob.print_close(')');
                }
                write_maybe_negative(value, ob);
                if ty.len() <= 3 {
                    ob.write_str(ty);
                }
            }

            NodeKind::NodeArrayNode { array } => {
                self.print_with_comma(*array, ob);
            }
        }
    }

    fn print_right(&self, id: NodeId, ob: &mut OutputBuffer) {
        let node = self.node(id);
        match &node.kind {
            NodeKind::QualType { child, .. } => self.print_right(*child, ob),

            NodeKind::PointerType { pointee } => {
                if self.objc_object_protocol(*pointee).is_none() {
                    if self.has_array(*pointee, ob) || self.has_function(*pointee, ob) {
                        ob.write_str(")");
                    }
                    self.print_right(*pointee, ob);
                }
            }

            NodeKind::ReferenceType {
                pointee,
                kind,
                printing,
            } => {
                if printing.get() {
                    return;
                }
                printing.set(true);
                if let Some((_, inner)) = self.collapse_references(*kind, *pointee, ob) {
                    if self.has_array(inner, ob) || self.has_function(inner, ob) {
                        ob.write_str(")");
                    }
                    self.print_right(inner, ob);
                }
                printing.set(false);
            }

            NodeKind::PointerToMemberType { member_ty, .. } => {
                if self.has_array(*member_ty, ob) || self.has_function(*member_ty, ob) {
                    ob.write_str(")");
                }
                self.print_right(*member_ty, ob);
            }

            NodeKind::ArrayType { base, dimension } => {
                if ob.back() != b']' {
                    ob.write_str(" ");
                }
                ob.write_str("[");
                if let Some(dimension) = dimension {
                    self.print(*dimension, ob);
                }
                ob.write_str("]");
                self.print_right(*base, ob);
            }

            NodeKind::FunctionType {
                ret,
                params,
                cv,
                ref_qual,
                exception_spec,
            } => {
                ob.print_open('(');
                self.print_with_comma(*params, ob);
                ob.print_close(')');
                self.print_right(*ret, ob);
                write_quals(*cv, ob);
                match ref_qual {
                    FunctionRefQual::LValue => ob.write_str(" &"),
                    FunctionRefQual::RValue => ob.write_str(" &&"),
                    FunctionRefQual::None => {}
                }
                if let Some(spec) = exception_spec {
                    ob.write_str(" ");
                    self.print(*spec, ob);
                }
            }

            NodeKind::FunctionEncoding {
                ret,
                params,
                attrs,
                cv,
                ref_qual,
                ..
            } => {
                ob.print_open('(');
                self.print_with_comma(*params, ob);
                ob.print_close(')');
                if let Some(ret) = ret {
                    self.print_right(*ret, ob);
                }
                write_quals(*cv, ob);
                match ref_qual {
                    FunctionRefQual::LValue => ob.write_str(" &"),
                    FunctionRefQual::RValue => ob.write_str(" &&"),
                    FunctionRefQual::None => {}
                }
                if let Some(attrs) = attrs {
                    self.print(*attrs, ob);
                }
            }

            NodeKind::TypeTemplateParamDecl { name } => self.print(*name, ob),

            NodeKind::NonTypeTemplateParamDecl { name, ty } => {
                self.print(*name, ob);
                self.print_right(*ty, ob);
            }

            NodeKind::TemplateTemplateParamDecl { name, .. } => self.print(*name, ob),

            NodeKind::TemplateParamPackDecl { param } => self.print_right(*param, ob),

            NodeKind::ParameterPack { data } => {
                self.initialize_pack_expansion(*data, ob);
                let idx = ob.pack_index as usize;
                if idx < data.len() {
                    self.print_right(self.array(*data)[idx], ob);
                }
            }

            NodeKind::ForwardTemplateReference {
                target, printing, ..
            } => {
                if printing.get() {
                    return;
                }
                printing.set(true);
                if let Some(target) = target.get() {
                    self.print_right(target, ob);
                }
                printing.set(false);
            }

            // Most nodes have no right-hand component.
            _ => {}
        }
    }
}
