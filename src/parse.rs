//! Recursive-descent parser over the Itanium C++ ABI mangling grammar.
//!
//! Every production routine returns `Result<NodeId>`; failure propagates
//! with `?` and there is no resumption. The parser owns the input cursor,
//! the arena, the substitution table, the template-parameter frames and
//! the queue of forward template references, all created together and
//! discarded together.

use core::cell::Cell;
use core::mem;

use crate::arena::{Arena, NodeArray, NodeId};
use crate::ast::{
    FunctionRefQual, Node, NodeKind, Prec, Qualifiers, ReferenceKind, SpecialSubKind,
    TemplateParamKind,
};
use crate::error::{Error, Result};
use crate::index_str::IndexStr;
use crate::subs::{SubstitutionTable, TemplateParamTable};

/// Maximum depth of recursive productions. Deeply nested but legitimate
/// symbols stay far below this; crossing it means the input is hostile.
const MAX_RECURSION: u32 = 96;

/// How an operator encoding participates in names and expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum OperatorKind {
    /// Prefix unary: `@ expr`.
    Prefix,
    /// Postfix unary: `expr @`.
    Postfix,
    /// Binary: `lhs @ rhs`.
    Binary,
    /// Array index: `lhs [ rhs ]`.
    Array,
    /// Member access: `lhs @ rhs`.
    Member,
    New,
    Del,
    /// Function call: `expr (expr*)`.
    Call,
    /// C cast: `(type)expr`.
    CCast,
    /// Conditional: `expr ? expr : expr`.
    Conditional,
    /// Overload name only, not allowed in expressions.
    NameOnly,
    // The kinds below do not have operator names.
    /// Named cast: `@<type>(expr)`.
    NamedCast,
    /// alignof, sizeof, typeid.
    OfIdOp,
}

impl OperatorKind {
    fn is_nameable(self) -> bool {
        self < OperatorKind::NamedCast
    }
}

/// One row of the operator table.
pub(crate) struct OperatorInfo {
    enc: [u8; 2],
    kind: OperatorKind,
    /// Entry-specific flag: array-new/delete vs plain, arrow member vs
    /// dot, of-a-type vs of-an-expression.
    flag: bool,
    prec: Prec,
    name: &'static str,
}

impl OperatorInfo {
    const fn new(enc: &[u8; 2], kind: OperatorKind, flag: bool, prec: Prec, name: &'static str) -> Self {
        OperatorInfo {
            enc: *enc,
            kind,
            flag,
            prec,
            name,
        }
    }

    /// The bare symbol, without the `operator` prefix.
    fn symbol(&self) -> &'static str {
        if self.kind.is_nameable() {
            let sym = self.name.strip_prefix("operator").unwrap_or(self.name);
            sym.strip_prefix(' ').unwrap_or(sym)
        } else {
            self.name
        }
    }
}

/// The operator table, ordered by encoding for binary search. Adding an
/// operator means one row.
static OPERATORS: &[OperatorInfo] = &[
    OperatorInfo::new(b"aN", OperatorKind::Binary, false, Prec::Assign, "operator&="),
    OperatorInfo::new(b"aS", OperatorKind::Binary, false, Prec::Assign, "operator="),
    OperatorInfo::new(b"aa", OperatorKind::Binary, false, Prec::AndIf, "operator&&"),
    OperatorInfo::new(b"ad", OperatorKind::Prefix, false, Prec::Unary, "operator&"),
    OperatorInfo::new(b"an", OperatorKind::Binary, false, Prec::And, "operator&"),
    OperatorInfo::new(b"at", OperatorKind::OfIdOp, true, Prec::Unary, "alignof "),
    OperatorInfo::new(b"aw", OperatorKind::NameOnly, false, Prec::Primary, "operator co_await"),
    OperatorInfo::new(b"az", OperatorKind::OfIdOp, false, Prec::Unary, "alignof "),
    OperatorInfo::new(b"cc", OperatorKind::NamedCast, false, Prec::Postfix, "const_cast"),
    OperatorInfo::new(b"cl", OperatorKind::Call, false, Prec::Postfix, "operator()"),
    OperatorInfo::new(b"cm", OperatorKind::Binary, false, Prec::Comma, "operator,"),
    OperatorInfo::new(b"co", OperatorKind::Prefix, false, Prec::Unary, "operator~"),
    OperatorInfo::new(b"cv", OperatorKind::CCast, false, Prec::Cast, "operator"),
    OperatorInfo::new(b"dV", OperatorKind::Binary, false, Prec::Assign, "operator/="),
    OperatorInfo::new(b"da", OperatorKind::Del, true, Prec::Unary, "operator delete[]"),
    OperatorInfo::new(b"dc", OperatorKind::NamedCast, false, Prec::Postfix, "dynamic_cast"),
    OperatorInfo::new(b"de", OperatorKind::Prefix, false, Prec::Unary, "operator*"),
    OperatorInfo::new(b"dl", OperatorKind::Del, false, Prec::Unary, "operator delete"),
    OperatorInfo::new(b"ds", OperatorKind::Member, false, Prec::PtrMem, "operator.*"),
    OperatorInfo::new(b"dt", OperatorKind::Member, false, Prec::Postfix, "operator."),
    OperatorInfo::new(b"dv", OperatorKind::Binary, false, Prec::Assign, "operator/"),
    OperatorInfo::new(b"eO", OperatorKind::Binary, false, Prec::Assign, "operator^="),
    OperatorInfo::new(b"eo", OperatorKind::Binary, false, Prec::Xor, "operator^"),
    OperatorInfo::new(b"eq", OperatorKind::Binary, false, Prec::Equality, "operator=="),
    OperatorInfo::new(b"ge", OperatorKind::Binary, false, Prec::Relational, "operator>="),
    OperatorInfo::new(b"gt", OperatorKind::Binary, false, Prec::Relational, "operator>"),
    OperatorInfo::new(b"ix", OperatorKind::Array, false, Prec::Postfix, "operator[]"),
    OperatorInfo::new(b"lS", OperatorKind::Binary, false, Prec::Assign, "operator<<="),
    OperatorInfo::new(b"le", OperatorKind::Binary, false, Prec::Relational, "operator<="),
    OperatorInfo::new(b"ls", OperatorKind::Binary, false, Prec::Shift, "operator<<"),
    OperatorInfo::new(b"lt", OperatorKind::Binary, false, Prec::Relational, "operator<"),
    OperatorInfo::new(b"mI", OperatorKind::Binary, false, Prec::Assign, "operator-="),
    OperatorInfo::new(b"mL", OperatorKind::Binary, false, Prec::Assign, "operator*="),
    OperatorInfo::new(b"mi", OperatorKind::Binary, false, Prec::Additive, "operator-"),
    OperatorInfo::new(b"ml", OperatorKind::Binary, false, Prec::Multiplicative, "operator*"),
    OperatorInfo::new(b"mm", OperatorKind::Postfix, false, Prec::Postfix, "operator--"),
    OperatorInfo::new(b"na", OperatorKind::New, true, Prec::Unary, "operator new[]"),
    OperatorInfo::new(b"ne", OperatorKind::Binary, false, Prec::Equality, "operator!="),
    OperatorInfo::new(b"ng", OperatorKind::Prefix, false, Prec::Unary, "operator-"),
    OperatorInfo::new(b"nt", OperatorKind::Prefix, false, Prec::Unary, "operator!"),
    OperatorInfo::new(b"nw", OperatorKind::New, false, Prec::Unary, "operator new"),
    OperatorInfo::new(b"oR", OperatorKind::Binary, false, Prec::Assign, "operator|="),
    OperatorInfo::new(b"oo", OperatorKind::Binary, false, Prec::OrIf, "operator||"),
    OperatorInfo::new(b"or", OperatorKind::Binary, false, Prec::Ior, "operator|"),
    OperatorInfo::new(b"pL", OperatorKind::Binary, false, Prec::Assign, "operator+="),
    OperatorInfo::new(b"pl", OperatorKind::Binary, false, Prec::Additive, "operator+"),
    OperatorInfo::new(b"pm", OperatorKind::Member, false, Prec::PtrMem, "operator->*"),
    OperatorInfo::new(b"pp", OperatorKind::Postfix, false, Prec::Postfix, "operator++"),
    OperatorInfo::new(b"ps", OperatorKind::Prefix, false, Prec::Unary, "operator+"),
    OperatorInfo::new(b"pt", OperatorKind::Member, true, Prec::Postfix, "operator->"),
    OperatorInfo::new(b"qu", OperatorKind::Conditional, false, Prec::Conditional, "operator?"),
    OperatorInfo::new(b"rM", OperatorKind::Binary, false, Prec::Assign, "operator%="),
    OperatorInfo::new(b"rS", OperatorKind::Binary, false, Prec::Assign, "operator>>="),
    OperatorInfo::new(b"rc", OperatorKind::NamedCast, false, Prec::Postfix, "reinterpret_cast"),
    OperatorInfo::new(b"rm", OperatorKind::Binary, false, Prec::Multiplicative, "operator%"),
    OperatorInfo::new(b"rs", OperatorKind::Binary, false, Prec::Shift, "operator>>"),
    OperatorInfo::new(b"sc", OperatorKind::NamedCast, false, Prec::Postfix, "static_cast"),
    OperatorInfo::new(b"ss", OperatorKind::Binary, false, Prec::Spaceship, "operator<=>"),
    OperatorInfo::new(b"st", OperatorKind::OfIdOp, true, Prec::Unary, "sizeof "),
    OperatorInfo::new(b"sz", OperatorKind::OfIdOp, false, Prec::Unary, "sizeof "),
    OperatorInfo::new(b"te", OperatorKind::OfIdOp, false, Prec::Postfix, "typeid "),
    OperatorInfo::new(b"ti", OperatorKind::OfIdOp, true, Prec::Postfix, "typeid "),
];

/// Extra information about a `<name>` being parsed, pertinent when the
/// name belongs to an `<encoding>`.
struct NameState {
    ctor_dtor_conversion: bool,
    ends_with_template_args: bool,
    cv_qualifiers: Qualifiers,
    reference_qualifier: FunctionRefQual,
    forward_refs_begin: usize,
}

pub(crate) struct Demangler<'a> {
    input: IndexStr<'a>,
    arena: Arena<'a>,

    /// Temporary stack of parsed names; productions with trailing lists
    /// push here and pop a `NodeArray` when the list closes.
    names: Vec<NodeId>,

    subs: SubstitutionTable,
    template_params: TemplateParamTable,

    /// Unresolved `<template-param>` references from a conversion
    /// operator's type, resolved at the close of the enclosing encoding.
    forward_refs: Vec<NodeId>,

    try_to_parse_template_args: bool,
    permit_forward_template_references: bool,
    parsing_lambda_params_at_level: Option<usize>,
    synthetic_template_params: [u32; 3],

    recursion: u32,
}

impl<'a> Demangler<'a> {
    pub(crate) fn new(input: &'a [u8]) -> Demangler<'a> {
        Demangler {
            input: IndexStr::new(input),
            arena: Arena::new(),
            names: Vec::new(),
            subs: SubstitutionTable::new(),
            template_params: TemplateParamTable::new(),
            forward_refs: Vec::new(),
            try_to_parse_template_args: true,
            permit_forward_template_references: false,
            parsing_lambda_params_at_level: None,
            synthetic_template_params: [0; 3],
            recursion: 0,
        }
    }

    /// Rebind the cursor and drop all parse state, invalidating every
    /// previously returned id.
    #[allow(dead_code)]
    pub(crate) fn reset(&mut self, input: &'a [u8]) {
        self.input = IndexStr::new(input);
        self.names.clear();
        self.subs.clear();
        self.template_params.clear();
        self.forward_refs.clear();
        self.try_to_parse_template_args = true;
        self.permit_forward_template_references = false;
        self.parsing_lambda_params_at_level = None;
        self.synthetic_template_params = [0; 3];
        self.recursion = 0;
        self.arena.reset();
    }

    /// Top-level entry point. Consumes the whole input or fails.
    ///
    /// `<mangled-name> ::= _Z <encoding>`
    /// `              ::= <type>`
    /// extension: `__Z <encoding>`, `___Z <encoding> _block_invoke...`
    pub(crate) fn parse(mut self) -> Result<(Arena<'a>, NodeId)> {
        let root = self.parse_mangled_name()?;
        debug_assert!(self.forward_refs.is_empty());
        Ok((self.arena, root))
    }

    fn parse_mangled_name(&mut self) -> Result<NodeId> {
        if self.input.consume_if(b"_Z") || self.input.consume_if(b"__Z") {
            let encoding = self.parse_encoding()?;
            let mut result = encoding;
            if self.input.peek(0) == b'.' {
                let suffix = self.input.take_rest();
                result = self.make(NodeKind::DotSuffix {
                    prefix: encoding,
                    suffix,
                });
            }
            if !self.input.is_empty() {
                return Err(Error::UnexpectedText);
            }
            return Ok(result);
        }

        if self.input.consume_if(b"___Z") || self.input.consume_if(b"____Z") {
            let encoding = self.parse_encoding()?;
            if !self.input.consume_if(b"_block_invoke") {
                return Err(Error::UnexpectedText);
            }
            let require_number = self.input.consume_if(b"_");
            if self.parse_number(false).is_empty() && require_number {
                return Err(Error::UnexpectedText);
            }
            if self.input.peek(0) == b'.' {
                self.input.take_rest();
            }
            if !self.input.is_empty() {
                return Err(Error::UnexpectedText);
            }
            return Ok(self.make(NodeKind::SpecialName {
                special: "invocation function for block in ",
                child: encoding,
            }));
        }

        let ty = self.parse_type()?;
        if !self.input.is_empty() {
            return Err(Error::UnexpectedText);
        }
        Ok(ty)
    }

    // -- Small helpers ---------------------------------------------------

    fn make(&mut self, kind: NodeKind<'a>) -> NodeId {
        let node = Node::with_caches(kind, Prec::Primary, &self.arena);
        self.arena.push(node)
    }

    fn make_with_prec(&mut self, kind: NodeKind<'a>, prec: Prec) -> NodeId {
        let node = Node::with_caches(kind, prec, &self.arena);
        self.arena.push(node)
    }

    fn pop_trailing_node_array(&mut self, from: usize) -> NodeArray {
        debug_assert!(from <= self.names.len());
        let array = self.arena.push_array(&self.names[from..]);
        self.names.truncate(from);
        array
    }

    fn enter_recursion(&mut self) -> Result<()> {
        if self.recursion >= MAX_RECURSION {
            return Err(Error::TooMuchRecursion);
        }
        self.recursion += 1;
        Ok(())
    }

    fn exit_recursion(&mut self) {
        debug_assert!(self.recursion > 0);
        self.recursion -= 1;
    }

    /// `<number> ::= [n] <non-negative decimal integer>`
    ///
    /// Returns the matched span, empty if there is no number. A lone `n`
    /// stays consumed even then.
    fn parse_number(&mut self, allow_negative: bool) -> &'a [u8] {
        let start = self.input.as_bytes();
        let mut len = 0;
        if allow_negative && self.input.peek(0) == b'n' {
            self.input.advance(1);
            len += 1;
        }
        if !self.input.peek(0).is_ascii_digit() {
            return &start[..0];
        }
        while self.input.peek(0).is_ascii_digit() {
            self.input.advance(1);
            len += 1;
        }
        &start[..len]
    }

    /// `<positive length number> ::= [0-9]*`
    fn parse_positive_integer(&mut self) -> Result<usize> {
        if !self.input.peek(0).is_ascii_digit() {
            return Err(Error::UnexpectedText);
        }
        let mut out: usize = 0;
        while self.input.peek(0).is_ascii_digit() {
            let digit = (self.input.peek(0) - b'0') as usize;
            out = out
                .checked_mul(10)
                .and_then(|v| v.checked_add(digit))
                .ok_or(Error::Overflow)?;
            self.input.advance(1);
        }
        Ok(out)
    }

    fn parse_bare_source_name(&mut self) -> Result<&'a [u8]> {
        let len = self.parse_positive_integer()?;
        self.input.take(len).ok_or(Error::UnexpectedEnd)
    }

    /// `<CV-Qualifiers> ::= [r] [V] [K]`
    fn parse_cv_qualifiers(&mut self) -> Qualifiers {
        let mut quals = Qualifiers::empty();
        if self.input.consume_if(b"r") {
            quals |= Qualifiers::RESTRICT;
        }
        if self.input.consume_if(b"V") {
            quals |= Qualifiers::VOLATILE;
        }
        if self.input.consume_if(b"K") {
            quals |= Qualifiers::CONST;
        }
        quals
    }

    /// `<seq-id> ::= <0-9A-Z>+` (base 36)
    fn parse_seq_id(&mut self) -> Result<usize> {
        let mut seen = false;
        let mut id: usize = 0;
        loop {
            let digit = match self.input.peek(0) {
                c @ b'0'..=b'9' => (c - b'0') as usize,
                c @ b'A'..=b'Z' => (c - b'A') as usize + 10,
                _ => break,
            };
            id = id
                .checked_mul(36)
                .and_then(|v| v.checked_add(digit))
                .ok_or(Error::Overflow)?;
            seen = true;
            self.input.advance(1);
        }
        if seen {
            Ok(id)
        } else {
            Err(Error::UnexpectedText)
        }
    }

    /// `<discriminator>` is parsed but ignored.
    ///
    /// `:= _ <digit>` when the number is below 10,
    /// `:= __ <number> _` otherwise, and as an extension a bare run of
    /// digits at the very end of the string.
    fn parse_discriminator(&mut self) {
        if self.input.is_empty() {
            return;
        }
        if self.input.peek(0) == b'_' {
            if self.input.peek(1).is_ascii_digit() {
                self.input.advance(2);
            } else if self.input.peek(1) == b'_' {
                let mut k = 2;
                while self.input.peek(k).is_ascii_digit() {
                    k += 1;
                }
                if self.input.peek(k) == b'_' {
                    self.input.advance(k + 1);
                }
            }
        } else if self.input.peek(0).is_ascii_digit() {
            let mut k = 1;
            while self.input.peek(k).is_ascii_digit() {
                k += 1;
            }
            if k == self.input.remaining() {
                self.input.advance(k);
            }
        }
    }

    // -- Encodings and special names ------------------------------------

    fn new_name_state(&self) -> NameState {
        NameState {
            ctor_dtor_conversion: false,
            ends_with_template_args: false,
            cv_qualifiers: Qualifiers::empty(),
            reference_qualifier: FunctionRefQual::None,
            forward_refs_begin: self.forward_refs.len(),
        }
    }

    fn resolve_forward_template_refs(&mut self, state: &NameState) -> Result<()> {
        for i in state.forward_refs_begin..self.forward_refs.len() {
            let id = self.forward_refs[i];
            let NodeKind::ForwardTemplateReference { index, target, .. } =
                &self.arena.node(id).kind
            else {
                continue;
            };
            let resolved = self
                .template_params
                .outermost()
                .and_then(|frame| frame.get(*index).copied());
            match resolved {
                Some(node) => target.set(Some(node)),
                None => return Err(Error::UnresolvedForwardReference),
            }
        }
        self.forward_refs.truncate(state.forward_refs_begin);
        Ok(())
    }

    /// The set of chars that can potentially follow an `<encoding>` (none
    /// of which can start a `<type>`). Enumerating these avoids
    /// speculative parsing.
    fn is_end_of_encoding(&self) -> bool {
        self.input.is_empty() || matches!(self.input.peek(0), b'E' | b'.' | b'_')
    }

    /// `<encoding> ::= <function name> <bare-function-type>`
    /// `           ::= <data name>`
    /// `           ::= <special-name>`
    fn parse_encoding(&mut self) -> Result<NodeId> {
        self.enter_recursion()?;
        // The template parameters of an encoding are unrelated to those of
        // the enclosing context.
        let saved_params = mem::take(&mut self.template_params);
        let result = self.parse_encoding_impl();
        self.template_params = saved_params;
        self.exit_recursion();
        result
    }

    fn parse_encoding_impl(&mut self) -> Result<NodeId> {
        if matches!(self.input.peek(0), b'G' | b'T') {
            return self.parse_special_name();
        }

        let mut name_info = self.new_name_state();
        let name = self.parse_name(Some(&mut name_info))?;

        self.resolve_forward_template_refs(&name_info)?;

        if self.is_end_of_encoding() {
            return Ok(name);
        }

        let mut attrs = None;
        if self.input.consume_if(b"Ua9enable_ifI") {
            let begin = self.names.len();
            while !self.input.consume_if(b"E") {
                let arg = self.parse_template_arg()?;
                self.names.push(arg);
            }
            let conditions = self.pop_trailing_node_array(begin);
            attrs = Some(self.make(NodeKind::EnableIfAttr { conditions }));
        }

        let mut ret = None;
        if !name_info.ctor_dtor_conversion && name_info.ends_with_template_args {
            ret = Some(self.parse_type()?);
        }

        if self.input.consume_if(b"v") {
            return Ok(self.make(NodeKind::FunctionEncoding {
                ret,
                name,
                params: NodeArray::EMPTY,
                attrs,
                cv: name_info.cv_qualifiers,
                ref_qual: name_info.reference_qualifier,
            }));
        }

        let begin = self.names.len();
        loop {
            let ty = self.parse_type()?;
            self.names.push(ty);
            if self.is_end_of_encoding() {
                break;
            }
        }
        let params = self.pop_trailing_node_array(begin);
        Ok(self.make(NodeKind::FunctionEncoding {
            ret,
            name,
            params,
            attrs,
            cv: name_info.cv_qualifiers,
            ref_qual: name_info.reference_qualifier,
        }))
    }

    /// `<call-offset> ::= h <nv-offset> _`
    /// `              ::= v <v-offset> _`
    ///
    /// Scanned through; the offsets never appear in the output.
    fn parse_call_offset(&mut self) -> Result<()> {
        if self.input.consume_if(b"h") {
            if self.parse_number(true).is_empty() || !self.input.consume_if(b"_") {
                return Err(Error::UnexpectedText);
            }
            return Ok(());
        }
        if self.input.consume_if(b"v") {
            if self.parse_number(true).is_empty() || !self.input.consume_if(b"_") {
                return Err(Error::UnexpectedText);
            }
            if self.parse_number(true).is_empty() || !self.input.consume_if(b"_") {
                return Err(Error::UnexpectedText);
            }
            return Ok(());
        }
        Err(Error::UnexpectedText)
    }

    /// `<special-name>`: vtables, typeinfo, thunks, guard variables,
    /// thread-local helpers, module initializers.
    fn parse_special_name(&mut self) -> Result<NodeId> {
        match (self.input.peek(0), self.input.peek(1)) {
            // TA <template-arg>   # template parameter object
            (b'T', b'A') => {
                self.input.advance(2);
                let arg = self.parse_template_arg()?;
                Ok(self.make(NodeKind::SpecialName {
                    special: "template parameter object for ",
                    child: arg,
                }))
            }
            // TV <type>   # virtual table
            (b'T', b'V') => {
                self.input.advance(2);
                let ty = self.parse_type()?;
                Ok(self.make(NodeKind::SpecialName {
                    special: "vtable for ",
                    child: ty,
                }))
            }
            // TT <type>   # VTT structure
            (b'T', b'T') => {
                self.input.advance(2);
                let ty = self.parse_type()?;
                Ok(self.make(NodeKind::SpecialName {
                    special: "VTT for ",
                    child: ty,
                }))
            }
            // TI <type>   # typeinfo structure
            (b'T', b'I') => {
                self.input.advance(2);
                let ty = self.parse_type()?;
                Ok(self.make(NodeKind::SpecialName {
                    special: "typeinfo for ",
                    child: ty,
                }))
            }
            // TS <type>   # typeinfo name
            (b'T', b'S') => {
                self.input.advance(2);
                let ty = self.parse_type()?;
                Ok(self.make(NodeKind::SpecialName {
                    special: "typeinfo name for ",
                    child: ty,
                }))
            }
            // Tc <call-offset> <call-offset> <base encoding>
            (b'T', b'c') => {
                self.input.advance(2);
                self.parse_call_offset()?;
                self.parse_call_offset()?;
                let encoding = self.parse_encoding()?;
                Ok(self.make(NodeKind::SpecialName {
                    special: "covariant return thunk to ",
                    child: encoding,
                }))
            }
            // TC <first type> <number> _ <second type>
            //   # construction vtable for second-in-first
            (b'T', b'C') => {
                self.input.advance(2);
                let first_ty = self.parse_type()?;
                if self.parse_number(true).is_empty() || !self.input.consume_if(b"_") {
                    return Err(Error::UnexpectedText);
                }
                let second_ty = self.parse_type()?;
                Ok(self.make(NodeKind::CtorVtableSpecialName {
                    first_ty: second_ty,
                    second_ty: first_ty,
                }))
            }
            // TW <object name>   # thread-local wrapper
            (b'T', b'W') => {
                self.input.advance(2);
                let name = self.parse_name(None)?;
                Ok(self.make(NodeKind::SpecialName {
                    special: "thread-local wrapper routine for ",
                    child: name,
                }))
            }
            // TH <object name>   # thread-local initialization
            (b'T', b'H') => {
                self.input.advance(2);
                let name = self.parse_name(None)?;
                Ok(self.make(NodeKind::SpecialName {
                    special: "thread-local initialization routine for ",
                    child: name,
                }))
            }
            // T <call-offset> <base encoding>   # thunk
            (b'T', _) => {
                self.input.advance(1);
                let is_virtual = self.input.peek(0) == b'v';
                self.parse_call_offset()?;
                let encoding = self.parse_encoding()?;
                Ok(self.make(NodeKind::SpecialName {
                    special: if is_virtual {
                        "virtual thunk to "
                    } else {
                        "non-virtual thunk to "
                    },
                    child: encoding,
                }))
            }
            // GV <object name>   # guard variable
            (b'G', b'V') => {
                self.input.advance(2);
                let name = self.parse_name(None)?;
                Ok(self.make(NodeKind::SpecialName {
                    special: "guard variable for ",
                    child: name,
                }))
            }
            // GR <object name> [<seq-id>] _   # reference temporary
            (b'G', b'R') => {
                self.input.advance(2);
                let name = self.parse_name(None)?;
                let parsed_seq_id = self.parse_seq_id().is_ok();
                if !self.input.consume_if(b"_") && parsed_seq_id {
                    return Err(Error::UnexpectedText);
                }
                Ok(self.make(NodeKind::SpecialName {
                    special: "reference temporary for ",
                    child: name,
                }))
            }
            // GI <module-name>   # module initializer
            (b'G', b'I') => {
                self.input.advance(2);
                let mut module = None;
                self.parse_module_name_opt(&mut module)?;
                let module = module.ok_or(Error::UnexpectedText)?;
                Ok(self.make(NodeKind::SpecialName {
                    special: "initializer for module ",
                    child: module,
                }))
            }
            _ => Err(Error::UnexpectedText),
        }
    }

    // -- Names -----------------------------------------------------------

    /// `<name> ::= <nested-name>`
    /// `       ::= <local-name>`
    /// `       ::= <unscoped-template-name> <template-args>`
    /// `       ::= <unscoped-name>`
    fn parse_name(&mut self, mut state: Option<&mut NameState>) -> Result<NodeId> {
        self.enter_recursion()?;
        let result = self.parse_name_impl(state.as_deref_mut());
        self.exit_recursion();
        result
    }

    fn parse_name_impl(&mut self, mut state: Option<&mut NameState>) -> Result<NodeId> {
        if self.input.peek(0) == b'N' {
            return self.parse_nested_name(state);
        }
        if self.input.peek(0) == b'Z' {
            return self.parse_local_name(state);
        }

        let mut is_subst = false;
        let result = self.parse_unscoped_name(state.as_deref_mut(), Some(&mut is_subst))?;

        if self.input.peek(0) == b'I' {
            // ::= <unscoped-template-name> <template-args>
            if !is_subst {
                // An unscoped-template-name is substitutable.
                self.subs.push(result);
            }
            let args = self.parse_template_args(state.is_some())?;
            if let Some(state) = state {
                state.ends_with_template_args = true;
            }
            return Ok(self.make(NodeKind::NameWithTemplateArgs { name: result, args }));
        }

        if is_subst {
            // The substitution case must be followed by <template-args>.
            return Err(Error::UnexpectedText);
        }
        Ok(result)
    }

    /// `<local-name> ::= Z <function encoding> E <entity name> [<discriminator>]`
    /// `             ::= Z <function encoding> E s [<discriminator>]`
    /// `             ::= Z <function encoding> Ed [<parameter number>] _ <entity name>`
    fn parse_local_name(&mut self, state: Option<&mut NameState>) -> Result<NodeId> {
        if !self.input.consume_if(b"Z") {
            return Err(Error::UnexpectedText);
        }
        let encoding = self.parse_encoding()?;
        if !self.input.consume_if(b"E") {
            return Err(Error::UnexpectedText);
        }

        if self.input.consume_if(b"s") {
            self.parse_discriminator();
            let entity = self.make(NodeKind::NameType {
                name: b"string literal",
            });
            return Ok(self.make(NodeKind::LocalName { encoding, entity }));
        }

        if self.input.consume_if(b"d") {
            self.parse_number(true);
            if !self.input.consume_if(b"_") {
                return Err(Error::UnexpectedText);
            }
            let entity = self.parse_name(state)?;
            return Ok(self.make(NodeKind::LocalName { encoding, entity }));
        }

        let entity = self.parse_name(state)?;
        self.parse_discriminator();
        Ok(self.make(NodeKind::LocalName { encoding, entity }))
    }

    /// `<unscoped-name> ::= <unqualified-name>`
    /// `                ::= St <unqualified-name>   # ::std::`
    fn parse_unscoped_name(
        &mut self,
        state: Option<&mut NameState>,
        mut is_subst: Option<&mut bool>,
    ) -> Result<NodeId> {
        let mut std_node = None;
        if self.input.consume_if(b"St") {
            std_node = Some(self.make(NodeKind::NameType { name: b"std" }));
        }

        let mut result = None;
        let mut module = None;
        if self.input.peek(0) == b'S' {
            let sub = self.parse_substitution()?;
            if matches!(self.arena.node(sub).kind, NodeKind::ModuleName { .. }) {
                module = Some(sub);
            } else if let (Some(flag), None) = (is_subst.as_deref_mut(), std_node) {
                *flag = true;
                result = Some(sub);
            } else {
                return Err(Error::UnexpectedText);
            }
        }

        if result.is_none() || std_node.is_some() {
            result = Some(self.parse_unqualified_name(state, std_node, module)?);
        }

        Ok(result.unwrap())
    }

    /// `<unqualified-name> ::= [<module-name>] L? <operator-name> [<abi-tags>]`
    /// `                   ::= [<module-name>] <ctor-dtor-name> [<abi-tags>]`
    /// `                   ::= [<module-name>] L? <source-name> [<abi-tags>]`
    /// `                   ::= [<module-name>] L? <unnamed-type-name> [<abi-tags>]`
    /// `                   ::= [<module-name>] L? DC <source-name>+ E   # structured binding`
    fn parse_unqualified_name(
        &mut self,
        mut state: Option<&mut NameState>,
        mut scope: Option<NodeId>,
        module: Option<NodeId>,
    ) -> Result<NodeId> {
        let mut module = module;
        self.parse_module_name_opt(&mut module)?;

        self.input.consume_if(b"L");

        let mut result = if self.input.peek(0).is_ascii_digit() {
            self.parse_source_name()?
        } else if self.input.peek(0) == b'U' {
            self.parse_unnamed_type_name(state.as_deref_mut())?
        } else if self.input.consume_if(b"DC") {
            let begin = self.names.len();
            loop {
                let binding = self.parse_source_name()?;
                self.names.push(binding);
                if self.input.consume_if(b"E") {
                    break;
                }
            }
            let bindings = self.pop_trailing_node_array(begin);
            self.make(NodeKind::StructuredBindingName { bindings })
        } else if matches!(self.input.peek(0), b'C' | b'D') {
            // A <ctor-dtor-name>.
            let Some(mut so_far) = scope else {
                return Err(Error::UnexpectedText);
            };
            if module.is_some() {
                return Err(Error::UnexpectedText);
            }
            let ctor = self.parse_ctor_dtor_name(&mut so_far, state.as_deref_mut())?;
            scope = Some(so_far);
            ctor
        } else {
            self.parse_operator_name(state.as_deref_mut())?
        };

        if let Some(module) = module {
            result = self.make(NodeKind::ModuleEntity {
                module,
                name: result,
            });
        }
        result = self.parse_abi_tags(result)?;
        if let Some(scope) = scope {
            result = self.make(NodeKind::NestedName {
                qual: scope,
                name: result,
            });
        }
        Ok(result)
    }

    /// `<module-name> ::= <module-subname>+`
    /// `<module-subname> ::= W [P] <source-name>`
    fn parse_module_name_opt(&mut self, module: &mut Option<NodeId>) -> Result<()> {
        while self.input.consume_if(b"W") {
            let is_partition = self.input.consume_if(b"P");
            let name = self.parse_source_name()?;
            let node = self.make(NodeKind::ModuleName {
                parent: *module,
                name,
                is_partition,
            });
            self.subs.push(node);
            *module = Some(node);
        }
        Ok(())
    }

    /// `<unnamed-type-name> ::= Ut [<number>] _`
    /// `                    ::= <closure-type-name>`
    /// `<closure-type-name> ::= Ul <lambda-sig> E [<number>] _`
    fn parse_unnamed_type_name(&mut self, state: Option<&mut NameState>) -> Result<NodeId> {
        // <template-params> refer to the innermost <template-args>. Clear
        // out any outer args that we may have inserted into the table.
        if state.is_some() {
            self.template_params.clear();
        }

        if self.input.consume_if(b"Ut") {
            let count = self.parse_number(false);
            if !self.input.consume_if(b"_") {
                return Err(Error::UnexpectedText);
            }
            return Ok(self.make(NodeKind::UnnamedTypeName { count }));
        }

        if self.input.consume_if(b"Ul") {
            let saved_level = mem::replace(
                &mut self.parsing_lambda_params_at_level,
                Some(self.template_params.depth()),
            );
            let old_depth = self.template_params.depth();
            self.template_params.push_frame(Some(Vec::new()));

            let result = self.parse_closure_sig();

            self.template_params.truncate(old_depth);
            self.parsing_lambda_params_at_level = saved_level;
            return result;
        }

        if self.input.consume_if(b"Ub") {
            self.parse_number(false);
            if !self.input.consume_if(b"_") {
                return Err(Error::UnexpectedText);
            }
            return Ok(self.make(NodeKind::NameType {
                name: b"'block-literal'",
            }));
        }

        Err(Error::UnexpectedText)
    }

    /// `<lambda-sig> ::= <template-param-decl>* <parameter type>+`
    /// (or `v` when the lambda has no parameters).
    fn parse_closure_sig(&mut self) -> Result<NodeId> {
        let begin = self.names.len();
        while self.input.peek(0) == b'T'
            && matches!(self.input.peek(1), b'y' | b'p' | b't' | b'n')
        {
            let decl = self.parse_template_param_decl()?;
            self.names.push(decl);
        }
        let template_params = self.pop_trailing_node_array(begin);

        // An explicit empty template head was not spelled; drop the frame
        // so `auto` recovery can reinvent it at the right level.
        if template_params.is_empty() {
            self.template_params.pop_frame();
        }

        if !self.input.consume_if(b"vE") {
            loop {
                let param = self.parse_type()?;
                self.names.push(param);
                if self.input.consume_if(b"E") {
                    break;
                }
            }
        }
        let params = self.pop_trailing_node_array(begin);

        let count = self.parse_number(false);
        if !self.input.consume_if(b"_") {
            return Err(Error::UnexpectedText);
        }
        Ok(self.make(NodeKind::ClosureTypeName {
            template_params,
            params,
            count,
        }))
    }

    /// `<source-name> ::= <positive length number> <identifier>`
    fn parse_source_name(&mut self) -> Result<NodeId> {
        let len = self.parse_positive_integer()?;
        if len == 0 {
            return Err(Error::UnexpectedText);
        }
        let name = self.input.take(len).ok_or(Error::UnexpectedEnd)?;
        if name.starts_with(b"_GLOBAL__N") {
            return Ok(self.make(NodeKind::NameType {
                name: b"(anonymous namespace)",
            }));
        }
        Ok(self.make(NodeKind::NameType { name }))
    }

    /// If the next two chars are an operator encoding, consume them and
    /// return the table row.
    fn parse_operator_encoding(&mut self) -> Option<&'static OperatorInfo> {
        if self.input.remaining() < 2 {
            return None;
        }
        let enc = [self.input.peek(0), self.input.peek(1)];
        let idx = OPERATORS.binary_search_by(|op| op.enc.cmp(&enc)).ok()?;
        self.input.advance(2);
        Some(&OPERATORS[idx])
    }

    /// `<operator-name> ::= <see the table>`
    /// `                ::= li <source-name>          # operator ""`
    /// `                ::= v <digit> <source-name>   # vendor extended`
    fn parse_operator_name(&mut self, state: Option<&mut NameState>) -> Result<NodeId> {
        if let Some(op) = self.parse_operator_encoding() {
            if op.kind == OperatorKind::CCast {
                // ::= cv <type>   # (cast)
                let saved_try = mem::replace(&mut self.try_to_parse_template_args, false);
                // If we're parsing an encoding, the conversion operator's
                // <type> could hold a <template-param> that refers to
                // <template-arg>s further ahead in the mangled name.
                let saved_permit = self.permit_forward_template_references;
                self.permit_forward_template_references = saved_permit || state.is_some();

                let ty = self.parse_type();

                self.try_to_parse_template_args = saved_try;
                self.permit_forward_template_references = saved_permit;

                let ty = ty?;
                if let Some(state) = state {
                    state.ctor_dtor_conversion = true;
                }
                return Ok(self.make(NodeKind::ConversionOperatorType { ty }));
            }

            if !op.kind.is_nameable() {
                return Err(Error::UnexpectedText);
            }
            if op.kind == OperatorKind::Member && !op.flag {
                // `.` and `.*` have no overloadable name.
                return Err(Error::UnexpectedText);
            }
            return Ok(self.make(NodeKind::NameType {
                name: op.name.as_bytes(),
            }));
        }

        if self.input.consume_if(b"li") {
            let op = self.parse_source_name()?;
            return Ok(self.make(NodeKind::LiteralOperator { op }));
        }

        if self.input.consume_if(b"v") {
            if self.input.peek(0).is_ascii_digit() {
                self.input.advance(1);
                let name = self.parse_source_name()?;
                return Ok(self.make(NodeKind::ConversionOperatorType { ty: name }));
            }
            return Err(Error::UnexpectedText);
        }

        Err(Error::UnexpectedText)
    }

    /// `<ctor-dtor-name> ::= C1 | C2 | C3 | CI1.. | D0 | D1 | D2`
    /// (plus the gcc `C4`/`C5`/`D4`/`D5` extensions).
    fn parse_ctor_dtor_name(
        &mut self,
        so_far: &mut NodeId,
        state: Option<&mut NameState>,
    ) -> Result<NodeId> {
        let special = match &self.arena.node(*so_far).kind {
            NodeKind::SpecialSubstitution { kind } => Some(*kind),
            _ => None,
        };
        if let Some(kind) = special {
            // Expand the special substitution.
            *so_far = self.make(NodeKind::ExpandedSpecialSubstitution { kind });
        }

        if self.input.consume_if(b"C") {
            let is_inherited = self.input.consume_if(b"I");
            let variant = match self.input.peek(0) {
                c @ b'1'..=b'5' => (c - b'0') as i32,
                _ => return Err(Error::UnexpectedText),
            };
            self.input.advance(1);
            let mut state = state;
            if let Some(state) = state.as_deref_mut() {
                state.ctor_dtor_conversion = true;
            }
            if is_inherited {
                // The inherited-ctor variant names the base class; it is
                // parsed but does not appear in the output.
                self.parse_name(state)?;
            }
            return Ok(self.make(NodeKind::CtorDtorName {
                basename: *so_far,
                is_dtor: false,
                variant,
            }));
        }

        if self.input.peek(0) == b'D'
            && matches!(self.input.peek(1), b'0' | b'1' | b'2' | b'4' | b'5')
        {
            let variant = (self.input.peek(1) - b'0') as i32;
            self.input.advance(2);
            if let Some(state) = state {
                state.ctor_dtor_conversion = true;
            }
            return Ok(self.make(NodeKind::CtorDtorName {
                basename: *so_far,
                is_dtor: true,
                variant,
            }));
        }

        Err(Error::UnexpectedText)
    }

    /// `<nested-name> ::= N [<CV-Qualifiers>] [<ref-qualifier>] <prefix>
    ///                    <unqualified-name> E`
    /// `              ::= N [<CV-Qualifiers>] [<ref-qualifier>]
    ///                    <template-prefix> <template-args> E`
    fn parse_nested_name(&mut self, mut state: Option<&mut NameState>) -> Result<NodeId> {
        if !self.input.consume_if(b"N") {
            return Err(Error::UnexpectedText);
        }

        let cv = self.parse_cv_qualifiers();
        if let Some(state) = state.as_deref_mut() {
            state.cv_qualifiers = cv;
        }

        let ref_qual = if self.input.consume_if(b"O") {
            FunctionRefQual::RValue
        } else if self.input.consume_if(b"R") {
            FunctionRefQual::LValue
        } else {
            FunctionRefQual::None
        };
        if let Some(state) = state.as_deref_mut() {
            state.reference_qualifier = ref_qual;
        }

        let mut so_far: Option<NodeId> = None;
        while !self.input.consume_if(b"E") {
            if let Some(state) = state.as_deref_mut() {
                // Only the template-args arm may leave this set.
                state.ends_with_template_args = false;
            }

            if self.input.peek(0) == b'T' {
                // ::= <template-param>
                if so_far.is_some() {
                    return Err(Error::UnexpectedText); // Cannot have a prefix.
                }
                so_far = Some(self.parse_template_param()?);
            } else if self.input.peek(0) == b'I' {
                // ::= <template-prefix> <template-args>
                let Some(prefix) = so_far else {
                    return Err(Error::UnexpectedText); // Must have a prefix.
                };
                if matches!(
                    self.arena.node(prefix).kind,
                    NodeKind::NameWithTemplateArgs { .. }
                ) {
                    // <template-args> <template-args> cannot be mangled
                    // from a C++ entity; there is always a name between.
                    return Err(Error::UnexpectedText);
                }
                let args = self.parse_template_args(state.is_some())?;
                if let Some(state) = state.as_deref_mut() {
                    state.ends_with_template_args = true;
                }
                so_far = Some(self.make(NodeKind::NameWithTemplateArgs { name: prefix, args }));
            } else if self.input.peek(0) == b'D'
                && matches!(self.input.peek(1), b't' | b'T')
            {
                // ::= <decltype>
                if so_far.is_some() {
                    return Err(Error::UnexpectedText); // Cannot have a prefix.
                }
                so_far = Some(self.parse_decltype()?);
            } else {
                let mut module = None;

                if self.input.peek(0) == b'S' {
                    // ::= <substitution>
                    let sub = if self.input.peek(1) == b't' {
                        self.input.advance(2);
                        self.make(NodeKind::NameType { name: b"std" })
                    } else {
                        self.parse_substitution()?
                    };
                    if matches!(self.arena.node(sub).kind, NodeKind::ModuleName { .. }) {
                        module = Some(sub);
                    } else if so_far.is_some() {
                        return Err(Error::UnexpectedText); // Cannot have a prefix.
                    } else {
                        so_far = Some(sub);
                        continue; // Do not push a new substitution.
                    }
                }

                // ::= [<prefix>] <unqualified-name>
                so_far =
                    Some(self.parse_unqualified_name(state.as_deref_mut(), so_far, module)?);
            }

            self.subs.push(so_far.unwrap());

            // <data-member-prefix> := <member source-name> [<template-args>] M
            self.input.consume_if(b"M");
        }

        let result = so_far.ok_or(Error::UnexpectedText)?;
        if self.subs.is_empty() {
            return Err(Error::UnexpectedText);
        }
        // The whole name is the entity itself, not a substitution
        // candidate.
        self.subs.pop();
        Ok(result)
    }

    /// `<abi-tags> ::= <abi-tag>*`, `<abi-tag> ::= B <source-name>`
    fn parse_abi_tags(&mut self, node: NodeId) -> Result<NodeId> {
        let mut node = node;
        while self.input.consume_if(b"B") {
            let tag = self.parse_bare_source_name()?;
            node = self.make(NodeKind::AbiTagAttr { base: node, tag });
        }
        Ok(node)
    }

    // -- Substitutions and template parameters ---------------------------

    /// `<substitution> ::= S <seq-id> _ | S_ | Sa | Sb | Ss | Si | So | Sd`
    fn parse_substitution(&mut self) -> Result<NodeId> {
        if !self.input.consume_if(b"S") {
            return Err(Error::UnexpectedText);
        }

        if self.input.peek(0).is_ascii_lowercase() {
            let kind = match self.input.peek(0) {
                b'a' => SpecialSubKind::Allocator,
                b'b' => SpecialSubKind::BasicString,
                b'd' => SpecialSubKind::Iostream,
                b'i' => SpecialSubKind::Istream,
                b'o' => SpecialSubKind::Ostream,
                b's' => SpecialSubKind::String,
                _ => return Err(Error::UnexpectedText),
            };
            self.input.advance(1);
            let special = self.make(NodeKind::SpecialSubstitution { kind });
            // If a name that would use a built-in substitution has ABI
            // tags, the tagged result is itself substitutable.
            let with_tags = self.parse_abi_tags(special)?;
            if with_tags != special {
                self.subs.push(with_tags);
                return Ok(with_tags);
            }
            return Ok(special);
        }

        // ::= S_
        if self.input.consume_if(b"_") {
            return self.subs.get(0).ok_or(Error::BadBackReference);
        }

        // ::= S <seq-id> _
        let index = self
            .parse_seq_id()?
            .checked_add(1)
            .ok_or(Error::Overflow)?;
        if !self.input.consume_if(b"_") {
            return Err(Error::UnexpectedText);
        }
        self.subs.get(index).ok_or(Error::BadBackReference)
    }

    /// `<template-param> ::= T_ | T <number> _ | TL <level> __ |
    ///                       TL <level> _ <number> _`
    fn parse_template_param(&mut self) -> Result<NodeId> {
        if !self.input.consume_if(b"T") {
            return Err(Error::UnexpectedText);
        }

        let mut level = 0;
        if self.input.consume_if(b"L") {
            level = self
                .parse_positive_integer()?
                .checked_add(1)
                .ok_or(Error::Overflow)?;
            if !self.input.consume_if(b"_") {
                return Err(Error::UnexpectedText);
            }
        }

        let mut index = 0;
        if !self.input.consume_if(b"_") {
            index = self
                .parse_positive_integer()?
                .checked_add(1)
                .ok_or(Error::Overflow)?;
            if !self.input.consume_if(b"_") {
                return Err(Error::UnexpectedText);
            }
        }

        // If this <template-param> refers to a <template-arg> further
        // ahead in the mangled name (currently just conversion operator
        // types), it can only be resolved later. Only the outermost level
        // can do this.
        if self.permit_forward_template_references && level == 0 {
            let fref = self.make(NodeKind::ForwardTemplateReference {
                index,
                target: Cell::new(None),
                printing: Cell::new(false),
            });
            self.forward_refs.push(fref);
            return Ok(fref);
        }

        match self.template_params.lookup(level, index) {
            Some(id) => Ok(id),
            None => {
                // In a generic lambda, uses of auto in the parameter list
                // are mangled as the corresponding artificial template
                // type parameter.
                if self.parsing_lambda_params_at_level == Some(level)
                    && level <= self.template_params.depth()
                {
                    if level == self.template_params.depth() {
                        // Popped again by the closure signature scope.
                        self.template_params.push_frame(None);
                    }
                    return Ok(self.make(NodeKind::NameType { name: b"auto" }));
                }
                Err(Error::BadTemplateParamReference)
            }
        }
    }

    /// `<template-param-decl> ::= Ty | Tn <type> | Tt <decl>* E | Tp <decl>`
    fn parse_template_param_decl(&mut self) -> Result<NodeId> {
        self.enter_recursion()?;
        let result = self.parse_template_param_decl_impl();
        self.exit_recursion();
        result
    }

    fn invent_template_param_name(&mut self, kind: TemplateParamKind) -> NodeId {
        let index = self.synthetic_template_params[kind as usize];
        self.synthetic_template_params[kind as usize] += 1;
        let name = self.make(NodeKind::SyntheticTemplateParamName { kind, index });
        self.template_params.record(name);
        name
    }

    fn parse_template_param_decl_impl(&mut self) -> Result<NodeId> {
        if self.input.consume_if(b"Ty") {
            let name = self.invent_template_param_name(TemplateParamKind::Type);
            return Ok(self.make(NodeKind::TypeTemplateParamDecl { name }));
        }

        if self.input.consume_if(b"Tn") {
            let name = self.invent_template_param_name(TemplateParamKind::NonType);
            let ty = self.parse_type()?;
            return Ok(self.make(NodeKind::NonTypeTemplateParamDecl { name, ty }));
        }

        if self.input.consume_if(b"Tt") {
            let name = self.invent_template_param_name(TemplateParamKind::Template);
            let begin = self.names.len();
            let old_depth = self.template_params.depth();
            self.template_params.push_frame(Some(Vec::new()));
            let params = loop {
                if self.input.consume_if(b"E") {
                    break Ok(());
                }
                match self.parse_template_param_decl() {
                    Ok(decl) => self.names.push(decl),
                    Err(e) => break Err(e),
                }
            };
            self.template_params.truncate(old_depth);
            params?;
            let params = self.pop_trailing_node_array(begin);
            return Ok(self.make(NodeKind::TemplateTemplateParamDecl { name, params }));
        }

        if self.input.consume_if(b"Tp") {
            let param = self.parse_template_param_decl()?;
            return Ok(self.make(NodeKind::TemplateParamPackDecl { param }));
        }

        Err(Error::UnexpectedText)
    }

    /// `<template-arg> ::= <type> | X <expression> E | <expr-primary> |
    ///                     J <template-arg>* E | LZ <encoding> E`
    fn parse_template_arg(&mut self) -> Result<NodeId> {
        match self.input.peek(0) {
            b'X' => {
                self.input.advance(1);
                let arg = self.parse_expr()?;
                if !self.input.consume_if(b"E") {
                    return Err(Error::UnexpectedText);
                }
                Ok(arg)
            }
            b'J' => {
                self.input.advance(1);
                let begin = self.names.len();
                while !self.input.consume_if(b"E") {
                    let arg = self.parse_template_arg()?;
                    self.names.push(arg);
                }
                let elements = self.pop_trailing_node_array(begin);
                Ok(self.make(NodeKind::TemplateArgumentPack { elements }))
            }
            b'L' => {
                if self.input.peek(1) == b'Z' {
                    // ::= LZ <encoding> E
                    self.input.advance(2);
                    let arg = self.parse_encoding()?;
                    if !self.input.consume_if(b"E") {
                        return Err(Error::UnexpectedText);
                    }
                    return Ok(arg);
                }
                self.parse_expr_primary()
            }
            _ => self.parse_type(),
        }
    }

    /// `<template-args> ::= I <template-arg>* E`
    ///
    /// When `tag_templates` is set, the args belong to the encoding being
    /// parsed and are recorded into a fresh outermost frame so later
    /// `T<i>_` references resolve.
    fn parse_template_args(&mut self, tag_templates: bool) -> Result<NodeId> {
        if !self.input.consume_if(b"I") {
            return Err(Error::UnexpectedText);
        }

        // <template-param>s refer to the innermost <template-args>.
        if tag_templates {
            self.template_params.clear();
            self.template_params.push_frame(Some(Vec::new()));
        }

        let begin = self.names.len();
        while !self.input.consume_if(b"E") {
            if tag_templates {
                // The argument itself must not see the in-progress frame.
                let old_params = mem::take(&mut self.template_params);
                let arg = self.parse_template_arg();
                self.template_params = old_params;
                let arg = arg?;
                self.names.push(arg);

                let pack_elements = match &self.arena.node(arg).kind {
                    NodeKind::TemplateArgumentPack { elements } => Some(*elements),
                    _ => None,
                };
                let table_entry = match pack_elements {
                    Some(elements) => self.make(NodeKind::ParameterPack { data: elements }),
                    None => arg,
                };
                self.template_params.record(table_entry);
            } else {
                let arg = self.parse_template_arg()?;
                self.names.push(arg);
            }
        }
        let params = self.pop_trailing_node_array(begin);
        Ok(self.make(NodeKind::TemplateArgs { params }))
    }

    // -- Types -----------------------------------------------------------

    /// `<type>`: the branchiest production; see the arm comments.
    fn parse_type(&mut self) -> Result<NodeId> {
        self.enter_recursion()?;
        let result = self.parse_type_impl();
        self.exit_recursion();
        result
    }

    fn parse_type_impl(&mut self) -> Result<NodeId> {
        let result = match self.input.peek(0) {
            // ::= <qualified-type>
            b'r' | b'V' | b'K' => {
                let mut after_quals = 0;
                if self.input.peek(after_quals) == b'r' {
                    after_quals += 1;
                }
                if self.input.peek(after_quals) == b'V' {
                    after_quals += 1;
                }
                if self.input.peek(after_quals) == b'K' {
                    after_quals += 1;
                }
                let next = self.input.peek(after_quals);
                if next == b'F'
                    || (next == b'D'
                        && matches!(
                            self.input.peek(after_quals + 1),
                            b'o' | b'O' | b'w' | b'x'
                        ))
                {
                    // CV-qualified function type.
                    self.parse_function_type()?
                } else {
                    self.parse_qualified_type()?
                }
            }
            b'U' => self.parse_qualified_type()?,

            // <builtin-type>; builtins are not substitution candidates.
            b'v' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType { name: b"void" }));
            }
            b'w' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType { name: b"wchar_t" }));
            }
            b'b' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType { name: b"bool" }));
            }
            b'c' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType { name: b"char" }));
            }
            b'a' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType {
                    name: b"signed char",
                }));
            }
            b'h' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType {
                    name: b"unsigned char",
                }));
            }
            b's' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType { name: b"short" }));
            }
            b't' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType {
                    name: b"unsigned short",
                }));
            }
            b'i' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType { name: b"int" }));
            }
            b'j' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType {
                    name: b"unsigned int",
                }));
            }
            b'l' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType { name: b"long" }));
            }
            b'm' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType {
                    name: b"unsigned long",
                }));
            }
            b'x' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType { name: b"long long" }));
            }
            b'y' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType {
                    name: b"unsigned long long",
                }));
            }
            b'n' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType { name: b"__int128" }));
            }
            b'o' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType {
                    name: b"unsigned __int128",
                }));
            }
            b'z' => {
                self.input.advance(1);
                return Ok(self.make(NodeKind::NameType { name: b"..." }));
            }

            // ::= u <source-name>   # vendor extended type
            // Unlike other builtins, these are substitution candidates.
            b'u' => {
                self.input.advance(1);
                let name = self.parse_bare_source_name()?;
                self.make(NodeKind::NameType { name })
            }

            b'D' => match self.input.peek(1) {
                // ::= DB <number|expr> _   # signed _BitInt
                // ::= DU <number|expr> _   # unsigned _BitInt
                b'B' | b'U' => {
                    let signed = self.input.peek(1) == b'B';
                    self.input.advance(2);
                    let size = if self.input.peek(0).is_ascii_digit() {
                        let n = self.parse_number(false);
                        self.make(NodeKind::NameType { name: n })
                    } else {
                        self.parse_expr()?
                    };
                    if !self.input.consume_if(b"_") {
                        return Err(Error::UnexpectedText);
                    }
                    return Ok(self.make(NodeKind::BitIntType { size, signed }));
                }
                // ::= Di   # char32_t
                b'i' => {
                    self.input.advance(2);
                    return Ok(self.make(NodeKind::NameType { name: b"char32_t" }));
                }
                // ::= Ds   # char16_t
                b's' => {
                    self.input.advance(2);
                    return Ok(self.make(NodeKind::NameType { name: b"char16_t" }));
                }
                // ::= Du   # char8_t
                b'u' => {
                    self.input.advance(2);
                    return Ok(self.make(NodeKind::NameType { name: b"char8_t" }));
                }
                // ::= Da   # auto
                b'a' => {
                    self.input.advance(2);
                    return Ok(self.make(NodeKind::NameType { name: b"auto" }));
                }
                // ::= Dc   # decltype(auto)
                b'c' => {
                    self.input.advance(2);
                    return Ok(self.make(NodeKind::NameType {
                        name: b"decltype(auto)",
                    }));
                }
                // ::= Dn   # std::nullptr_t
                b'n' => {
                    self.input.advance(2);
                    return Ok(self.make(NodeKind::NameType {
                        name: b"std::nullptr_t",
                    }));
                }
                // ::= <decltype>
                b't' | b'T' => self.parse_decltype()?,
                // ::= Dv ...   # vector type
                b'v' => self.parse_vector_type()?,
                // ::= Dp <type>   # pack expansion
                b'p' => {
                    self.input.advance(2);
                    let child = self.parse_type()?;
                    self.make(NodeKind::ParameterPackExpansion { child })
                }
                // Exception specifier or transaction-safe function type.
                b'o' | b'O' | b'w' | b'x' => self.parse_function_type()?,
                _ => return Err(Error::UnexpectedText),
            },

            // ::= <function-type>
            b'F' => self.parse_function_type()?,
            // ::= <array-type>
            b'A' => self.parse_array_type()?,
            // ::= <pointer-to-member-type>
            b'M' => self.parse_pointer_to_member_type()?,

            // ::= <template-param>, possibly a <template-template-param>
            //     followed by <template-args>
            b'T' => {
                // This could be an elaborated type specifier on a
                // <class-enum-type>.
                if matches!(self.input.peek(1), b's' | b'u' | b'e') {
                    self.parse_class_enum_type()?
                } else {
                    let mut result = self.parse_template_param()?;
                    if self.try_to_parse_template_args && self.input.peek(0) == b'I' {
                        let args = self.parse_template_args(false)?;
                        result = self.make(NodeKind::NameWithTemplateArgs {
                            name: result,
                            args,
                        });
                    }
                    result
                }
            }

            // ::= P <type>   # pointer
            b'P' => {
                self.input.advance(1);
                let pointee = self.parse_type()?;
                self.make(NodeKind::PointerType { pointee })
            }
            // ::= R <type>   # l-value reference
            b'R' => {
                self.input.advance(1);
                let pointee = self.parse_type()?;
                self.make(NodeKind::ReferenceType {
                    pointee,
                    kind: ReferenceKind::LValue,
                    printing: Cell::new(false),
                })
            }
            // ::= O <type>   # r-value reference
            b'O' => {
                self.input.advance(1);
                let pointee = self.parse_type()?;
                self.make(NodeKind::ReferenceType {
                    pointee,
                    kind: ReferenceKind::RValue,
                    printing: Cell::new(false),
                })
            }
            // ::= C <type>   # complex pair (C99)
            b'C' => {
                self.input.advance(1);
                let ty = self.parse_type()?;
                self.make(NodeKind::PostfixQualifiedType {
                    ty,
                    postfix: " complex",
                })
            }
            // ::= G <type>   # imaginary (C99)
            b'G' => {
                self.input.advance(1);
                let ty = self.parse_type()?;
                self.make(NodeKind::PostfixQualifiedType {
                    ty,
                    postfix: " imaginary",
                })
            }

            // ::= <substitution>
            b'S' if self.input.peek(1) != b't' => {
                let mut is_subst = false;
                let result = self.parse_unscoped_name(None, Some(&mut is_subst))?;

                // A substitution could be a <template-template-param>;
                // if followed by <template-args>, take that production.
                if self.input.peek(0) == b'I' && (!is_subst || self.try_to_parse_template_args)
                {
                    if !is_subst {
                        self.subs.push(result);
                    }
                    let args = self.parse_template_args(false)?;
                    self.make(NodeKind::NameWithTemplateArgs { name: result, args })
                } else if is_subst {
                    // A bare substitution is not re-inserted into the
                    // table.
                    return Ok(result);
                } else {
                    result
                }
            }

            // ::= <class-enum-type>
            _ => self.parse_class_enum_type()?,
        };

        // Everything that did not bail out above is a substitution
        // candidate.
        self.subs.push(result);
        Ok(result)
    }

    /// `<qualified-type> ::= <extended-qualifier>* <CV-qualifiers> <type>`
    /// `<extended-qualifier> ::= U <source-name> [<template-args>]`
    fn parse_qualified_type(&mut self) -> Result<NodeId> {
        self.enter_recursion()?;
        let result = self.parse_qualified_type_impl();
        self.exit_recursion();
        result
    }

    fn parse_qualified_type_impl(&mut self) -> Result<NodeId> {
        if self.input.consume_if(b"U") {
            let qual = self.parse_bare_source_name()?;

            // ::= U <objc-name> <objc-type>   # id<protocol-name>
            if let Some(proto_span) = qual.strip_prefix(b"objcproto") {
                let mut proto_cursor = IndexStr::new(proto_span);
                let proto = bare_source_name_at(&mut proto_cursor)?;
                let ty = self.parse_qualified_type()?;
                return Ok(self.make(NodeKind::ObjCProtoName {
                    ty,
                    protocol: proto,
                }));
            }

            let args = if self.input.peek(0) == b'I' {
                Some(self.parse_template_args(false)?)
            } else {
                None
            };
            let ty = self.parse_qualified_type()?;
            return Ok(self.make(NodeKind::VendorExtQualType {
                ty,
                ext: qual,
                args,
            }));
        }

        let quals = self.parse_cv_qualifiers();
        let ty = self.parse_type()?;
        if !quals.is_empty() {
            return Ok(self.make(NodeKind::QualType { child: ty, quals }));
        }
        Ok(ty)
    }

    /// `<function-type> ::= [<CV-qualifiers>] [<exception-spec>] [Dx] F [Y]
    ///                      <bare-function-type> [<ref-qualifier>] E`
    fn parse_function_type(&mut self) -> Result<NodeId> {
        let cv = self.parse_cv_qualifiers();

        let mut exception_spec = None;
        if self.input.consume_if(b"Do") {
            exception_spec = Some(self.make(NodeKind::NameType { name: b"noexcept" }));
        } else if self.input.consume_if(b"DO") {
            let expr = self.parse_expr()?;
            if !self.input.consume_if(b"E") {
                return Err(Error::UnexpectedText);
            }
            exception_spec = Some(self.make(NodeKind::NoexceptSpec { expr }));
        } else if self.input.consume_if(b"Dw") {
            let begin = self.names.len();
            while !self.input.consume_if(b"E") {
                let ty = self.parse_type()?;
                self.names.push(ty);
            }
            let types = self.pop_trailing_node_array(begin);
            exception_spec = Some(self.make(NodeKind::DynamicExceptionSpec { types }));
        }

        self.input.consume_if(b"Dx"); // transaction safe

        if !self.input.consume_if(b"F") {
            return Err(Error::UnexpectedText);
        }
        self.input.consume_if(b"Y"); // extern "C"

        let ret = self.parse_type()?;

        let mut ref_qual = FunctionRefQual::None;
        let begin = self.names.len();
        loop {
            if self.input.consume_if(b"E") {
                break;
            }
            if self.input.consume_if(b"v") {
                continue;
            }
            if self.input.consume_if(b"RE") {
                ref_qual = FunctionRefQual::LValue;
                break;
            }
            if self.input.consume_if(b"OE") {
                ref_qual = FunctionRefQual::RValue;
                break;
            }
            let ty = self.parse_type()?;
            self.names.push(ty);
        }
        let params = self.pop_trailing_node_array(begin);

        Ok(self.make(NodeKind::FunctionType {
            ret,
            params,
            cv,
            ref_qual,
            exception_spec,
        }))
    }

    /// `<vector-type> ::= Dv <number> _ <element type>`
    /// `              ::= Dv [<dimension expression>] _ <element type>`
    fn parse_vector_type(&mut self) -> Result<NodeId> {
        if !self.input.consume_if(b"Dv") {
            return Err(Error::UnexpectedText);
        }
        if matches!(self.input.peek(0), b'1'..=b'9') {
            let n = self.parse_number(false);
            let dimension = self.make(NodeKind::NameType { name: n });
            if !self.input.consume_if(b"_") {
                return Err(Error::UnexpectedText);
            }
            if self.input.consume_if(b"p") {
                return Ok(self.make(NodeKind::PixelVectorType { dimension }));
            }
            let base = self.parse_type()?;
            return Ok(self.make(NodeKind::VectorType {
                base,
                dimension: Some(dimension),
            }));
        }

        if !self.input.consume_if(b"_") {
            let dimension = self.parse_expr()?;
            if !self.input.consume_if(b"_") {
                return Err(Error::UnexpectedText);
            }
            let base = self.parse_type()?;
            return Ok(self.make(NodeKind::VectorType {
                base,
                dimension: Some(dimension),
            }));
        }

        let base = self.parse_type()?;
        Ok(self.make(NodeKind::VectorType {
            base,
            dimension: None,
        }))
    }

    /// `<decltype> ::= Dt <expression> E | DT <expression> E`
    fn parse_decltype(&mut self) -> Result<NodeId> {
        if !self.input.consume_if(b"D") {
            return Err(Error::UnexpectedText);
        }
        if !self.input.consume_if(b"t") && !self.input.consume_if(b"T") {
            return Err(Error::UnexpectedText);
        }
        let expr = self.parse_expr()?;
        if !self.input.consume_if(b"E") {
            return Err(Error::UnexpectedText);
        }
        Ok(self.make(NodeKind::EnclosingExpr {
            prefix: "decltype",
            infix: expr,
        }))
    }

    /// `<array-type> ::= A <positive dimension number> _ <element type>`
    /// `             ::= A [<dimension expression>] _ <element type>`
    fn parse_array_type(&mut self) -> Result<NodeId> {
        if !self.input.consume_if(b"A") {
            return Err(Error::UnexpectedText);
        }

        let mut dimension = None;
        if self.input.peek(0).is_ascii_digit() {
            let n = self.parse_number(false);
            dimension = Some(self.make(NodeKind::NameType { name: n }));
            if !self.input.consume_if(b"_") {
                return Err(Error::UnexpectedText);
            }
        } else if !self.input.consume_if(b"_") {
            let expr = self.parse_expr()?;
            if !self.input.consume_if(b"_") {
                return Err(Error::UnexpectedText);
            }
            dimension = Some(expr);
        }

        let base = self.parse_type()?;
        Ok(self.make(NodeKind::ArrayType { base, dimension }))
    }

    /// `<pointer-to-member-type> ::= M <class type> <member type>`
    fn parse_pointer_to_member_type(&mut self) -> Result<NodeId> {
        if !self.input.consume_if(b"M") {
            return Err(Error::UnexpectedText);
        }
        let class_ty = self.parse_type()?;
        let member_ty = self.parse_type()?;
        Ok(self.make(NodeKind::PointerToMemberType {
            class_ty,
            member_ty,
        }))
    }

    /// `<class-enum-type> ::= <name> | Ts <name> | Tu <name> | Te <name>`
    fn parse_class_enum_type(&mut self) -> Result<NodeId> {
        let elab_spef = if self.input.consume_if(b"Ts") {
            Some("struct")
        } else if self.input.consume_if(b"Tu") {
            Some("union")
        } else if self.input.consume_if(b"Te") {
            Some("enum")
        } else {
            None
        };

        let name = self.parse_name(None)?;

        if let Some(kind) = elab_spef {
            return Ok(self.make(NodeKind::ElaboratedTypeSpef { kind, child: name }));
        }
        Ok(name)
    }

    // -- Expressions -----------------------------------------------------

    fn parse_prefix_expr(&mut self, prefix: &'static str, prec: Prec) -> Result<NodeId> {
        let child = self.parse_expr()?;
        Ok(self.make_with_prec(NodeKind::PrefixExpr { prefix, child }, prec))
    }

    fn parse_binary_expr(&mut self, op: &'static str, prec: Prec) -> Result<NodeId> {
        let lhs = self.parse_expr()?;
        let rhs = self.parse_expr()?;
        Ok(self.make_with_prec(NodeKind::BinaryExpr { lhs, op, rhs }, prec))
    }

    fn parse_integer_literal(&mut self, ty: &'static str) -> Result<NodeId> {
        let value = self.parse_number(true);
        if !value.is_empty() && self.input.consume_if(b"E") {
            return Ok(self.make(NodeKind::IntegerLiteral { ty, value }));
        }
        Err(Error::UnexpectedText)
    }

    /// `<function-param> ::= fp <top-level CV-Qualifiers> [<number>] _`
    /// `                 ::= fL <number> p <CV-Qualifiers> [<number>] _`
    /// `                 ::= fpT   # 'this'`
    fn parse_function_param(&mut self) -> Result<NodeId> {
        if self.input.consume_if(b"fpT") {
            return Ok(self.make(NodeKind::NameType { name: b"this" }));
        }
        if self.input.consume_if(b"fp") {
            self.parse_cv_qualifiers();
            let number = self.parse_number(false);
            if !self.input.consume_if(b"_") {
                return Err(Error::UnexpectedText);
            }
            return Ok(self.make(NodeKind::FunctionParam { number }));
        }
        if self.input.consume_if(b"fL") {
            if self.parse_number(false).is_empty() {
                return Err(Error::UnexpectedText);
            }
            if !self.input.consume_if(b"p") {
                return Err(Error::UnexpectedText);
            }
            self.parse_cv_qualifiers();
            let number = self.parse_number(false);
            if !self.input.consume_if(b"_") {
                return Err(Error::UnexpectedText);
            }
            return Ok(self.make(NodeKind::FunctionParam { number }));
        }
        Err(Error::UnexpectedText)
    }

    /// `<expr-primary> ::= L <type> <value number> E | L <mangled-name> E | …`
    fn parse_expr_primary(&mut self) -> Result<NodeId> {
        if !self.input.consume_if(b"L") {
            return Err(Error::UnexpectedText);
        }
        match self.input.peek(0) {
            b'w' => {
                self.input.advance(1);
                self.parse_integer_literal("wchar_t")
            }
            b'b' => {
                if self.input.consume_if(b"b0E") {
                    return Ok(self.make(NodeKind::BoolExpr { value: false }));
                }
                if self.input.consume_if(b"b1E") {
                    return Ok(self.make(NodeKind::BoolExpr { value: true }));
                }
                Err(Error::UnexpectedText)
            }
            b'c' => {
                self.input.advance(1);
                self.parse_integer_literal("char")
            }
            b'a' => {
                self.input.advance(1);
                self.parse_integer_literal("signed char")
            }
            b'h' => {
                self.input.advance(1);
                self.parse_integer_literal("unsigned char")
            }
            b's' => {
                self.input.advance(1);
                self.parse_integer_literal("short")
            }
            b't' => {
                self.input.advance(1);
                self.parse_integer_literal("unsigned short")
            }
            b'i' => {
                self.input.advance(1);
                self.parse_integer_literal("")
            }
            b'j' => {
                self.input.advance(1);
                self.parse_integer_literal("u")
            }
            b'l' => {
                self.input.advance(1);
                self.parse_integer_literal("l")
            }
            b'm' => {
                self.input.advance(1);
                self.parse_integer_literal("ul")
            }
            b'x' => {
                self.input.advance(1);
                self.parse_integer_literal("ll")
            }
            b'y' => {
                self.input.advance(1);
                self.parse_integer_literal("ull")
            }
            b'n' => {
                self.input.advance(1);
                self.parse_integer_literal("__int128")
            }
            b'o' => {
                self.input.advance(1);
                self.parse_integer_literal("unsigned __int128")
            }
            b'_' => {
                // ::= L <mangled-name> E   # external name
                if self.input.consume_if(b"_Z") {
                    let encoding = self.parse_encoding()?;
                    if self.input.consume_if(b"E") {
                        return Ok(encoding);
                    }
                }
                Err(Error::UnexpectedText)
            }
            b'A' => {
                let ty = self.parse_type()?;
                // The string contents are not part of the mangling.
                if self.input.consume_if(b"E") {
                    return Ok(self.make(NodeKind::StringLiteral { ty }));
                }
                Err(Error::UnexpectedText)
            }
            b'D' => {
                if self.input.consume_if(b"Dn") {
                    self.input.consume_if(b"0");
                    if self.input.consume_if(b"E") {
                        return Ok(self.make(NodeKind::NameType { name: b"nullptr" }));
                    }
                }
                Err(Error::UnexpectedText)
            }
            // LT... is not a valid mangling.
            b'T' => Err(Error::UnexpectedText),
            b'U' => {
                // ::= L <lambda type> E
                if self.input.peek(1) != b'l' {
                    return Err(Error::UnexpectedText);
                }
                let ty = self.parse_unnamed_type_name(None)?;
                if !self.input.consume_if(b"E") {
                    return Err(Error::UnexpectedText);
                }
                Ok(self.make(NodeKind::LambdaExpr { ty }))
            }
            _ => {
                // Might be an enum literal: (type)value.
                let ty = self.parse_type()?;
                let integer = self.parse_number(true);
                if integer.is_empty() {
                    return Err(Error::UnexpectedText);
                }
                if !self.input.consume_if(b"E") {
                    return Err(Error::UnexpectedText);
                }
                Ok(self.make(NodeKind::EnumLiteral { ty, integer }))
            }
        }
    }

    /// `<braced-expression> ::= <expression>`
    /// `                    ::= di <field source-name> <braced-expression>`
    /// `                    ::= dx <index expression> <braced-expression>`
    /// `                    ::= dX <range begin> <range end> <braced-expression>`
    fn parse_braced_expr(&mut self) -> Result<NodeId> {
        self.enter_recursion()?;
        let result = self.parse_braced_expr_impl();
        self.exit_recursion();
        result
    }

    fn parse_braced_expr_impl(&mut self) -> Result<NodeId> {
        if self.input.peek(0) == b'd' {
            match self.input.peek(1) {
                b'i' => {
                    self.input.advance(2);
                    let field = self.parse_source_name()?;
                    let init = self.parse_braced_expr()?;
                    return Ok(self.make(NodeKind::BracedExpr {
                        elem: field,
                        init,
                        is_array: false,
                    }));
                }
                b'x' => {
                    self.input.advance(2);
                    let index = self.parse_expr()?;
                    let init = self.parse_braced_expr()?;
                    return Ok(self.make(NodeKind::BracedExpr {
                        elem: index,
                        init,
                        is_array: true,
                    }));
                }
                b'X' => {
                    self.input.advance(2);
                    let first = self.parse_expr()?;
                    let last = self.parse_expr()?;
                    let init = self.parse_braced_expr()?;
                    return Ok(self.make(NodeKind::BracedRangeExpr { first, last, init }));
                }
                _ => {}
            }
        }
        self.parse_expr()
    }

    /// `<fold-expr> ::= f (L|R|l|r) <binary operator> <expression> [<expression>]`
    fn parse_fold_expr(&mut self) -> Result<NodeId> {
        if !self.input.consume_if(b"f") {
            return Err(Error::UnexpectedText);
        }

        let (is_left_fold, has_initializer) = match self.input.peek(0) {
            b'L' => (true, true),
            b'R' => (false, true),
            b'l' => (true, false),
            b'r' => (false, false),
            _ => return Err(Error::UnexpectedText),
        };
        self.input.advance(1);

        let op = self.parse_operator_encoding().ok_or(Error::UnexpectedText)?;
        let foldable = op.kind == OperatorKind::Binary
            || (op.kind == OperatorKind::Member && op.name.ends_with('*'));
        if !foldable {
            return Err(Error::UnexpectedText);
        }

        let mut pack = self.parse_expr()?;
        let mut init = None;
        if has_initializer {
            init = Some(self.parse_expr()?);
        }

        if is_left_fold {
            if let Some(init_expr) = init {
                init = Some(pack);
                pack = init_expr;
            }
        }

        Ok(self.make(NodeKind::FoldExpr {
            is_left_fold,
            op: op.symbol(),
            pack,
            init,
        }))
    }

    /// `<expression> ::= mc <parameter type> <expr> [<offset number>] E`
    fn parse_pointer_to_member_conversion_expr(&mut self, prec: Prec) -> Result<NodeId> {
        let ty = self.parse_type()?;
        let sub_expr = self.parse_expr()?;
        let offset = self.parse_number(true);
        if !self.input.consume_if(b"E") {
            return Err(Error::UnexpectedText);
        }
        Ok(self.make_with_prec(
            NodeKind::PointerToMemberConversionExpr {
                ty,
                sub_expr,
                offset,
            },
            prec,
        ))
    }

    /// `<expression> ::= so <referent type> <expr> [<offset number>]
    ///                   <union-selector>* [p] E`
    fn parse_subobject_expr(&mut self) -> Result<NodeId> {
        let ty = self.parse_type()?;
        let sub_expr = self.parse_expr()?;
        let offset = self.parse_number(true);
        let begin = self.names.len();
        while self.input.consume_if(b"_") {
            let n = self.parse_number(false);
            let selector = self.make(NodeKind::NameType { name: n });
            self.names.push(selector);
        }
        let one_past_the_end = self.input.consume_if(b"p");
        if !self.input.consume_if(b"E") {
            return Err(Error::UnexpectedText);
        }
        let union_selectors = self.pop_trailing_node_array(begin);
        Ok(self.make(NodeKind::SubobjectExpr {
            ty,
            sub_expr,
            offset,
            union_selectors,
            one_past_the_end,
        }))
    }

    /// `<expression>`: operator dispatch first, then the enumerated
    /// prefixed forms, finally an unresolved name.
    fn parse_expr(&mut self) -> Result<NodeId> {
        self.enter_recursion()?;
        let result = self.parse_expr_impl();
        self.exit_recursion();
        result
    }

    fn parse_expr_impl(&mut self) -> Result<NodeId> {
        let global = self.input.consume_if(b"gs");

        if let Some(op) = self.parse_operator_encoding() {
            let sym = op.symbol();
            let prec = op.prec;
            match op.kind {
                OperatorKind::Binary => return self.parse_binary_expr(sym, prec),
                OperatorKind::Prefix => return self.parse_prefix_expr(sym, prec),
                OperatorKind::Postfix => {
                    if self.input.consume_if(b"_") {
                        // pp_ / mm_ are the prefix flavors.
                        return self.parse_prefix_expr(sym, prec);
                    }
                    let child = self.parse_expr()?;
                    return Ok(self.make_with_prec(
                        NodeKind::PostfixExpr { child, op: sym },
                        prec,
                    ));
                }
                OperatorKind::Array => {
                    let base = self.parse_expr()?;
                    let index = self.parse_expr()?;
                    return Ok(self.make_with_prec(
                        NodeKind::ArraySubscriptExpr { base, index },
                        prec,
                    ));
                }
                OperatorKind::Member => {
                    let lhs = self.parse_expr()?;
                    let rhs = self.parse_expr()?;
                    return Ok(self.make_with_prec(
                        NodeKind::MemberExpr {
                            lhs,
                            kind: sym,
                            rhs,
                        },
                        prec,
                    ));
                }
                OperatorKind::New => {
                    // [gs] nw|na <expression>* _ <type> [pi <expression>*] E
                    let exprs_begin = self.names.len();
                    while !self.input.consume_if(b"_") {
                        let expr = self.parse_expr()?;
                        self.names.push(expr);
                    }
                    let expr_list = self.pop_trailing_node_array(exprs_begin);
                    let ty = self.parse_type()?;
                    let have_inits = self.input.consume_if(b"pi");
                    let inits_begin = self.names.len();
                    while !self.input.consume_if(b"E") {
                        if !have_inits {
                            return Err(Error::UnexpectedText);
                        }
                        let init = self.parse_expr()?;
                        self.names.push(init);
                    }
                    let init_list = self.pop_trailing_node_array(inits_begin);
                    return Ok(self.make_with_prec(
                        NodeKind::NewExpr {
                            expr_list,
                            ty,
                            init_list,
                            is_global: global,
                            is_array: op.flag,
                        },
                        prec,
                    ));
                }
                OperatorKind::Del => {
                    let expr = self.parse_expr()?;
                    return Ok(self.make_with_prec(
                        NodeKind::DeleteExpr {
                            op: expr,
                            is_global: global,
                            is_array: op.flag,
                        },
                        prec,
                    ));
                }
                OperatorKind::Call => {
                    let callee = self.parse_expr()?;
                    let begin = self.names.len();
                    while !self.input.consume_if(b"E") {
                        let arg = self.parse_expr()?;
                        self.names.push(arg);
                    }
                    let args = self.pop_trailing_node_array(begin);
                    return Ok(self.make_with_prec(NodeKind::CallExpr { callee, args }, prec));
                }
                OperatorKind::CCast => {
                    // (type)expr or (type)(expr-list)
                    let saved = mem::replace(&mut self.try_to_parse_template_args, false);
                    let ty = self.parse_type();
                    self.try_to_parse_template_args = saved;
                    let ty = ty?;

                    let begin = self.names.len();
                    let is_many = self.input.consume_if(b"_");
                    while !self.input.consume_if(b"E") {
                        let expr = self.parse_expr()?;
                        self.names.push(expr);
                        if !is_many {
                            break;
                        }
                    }
                    let count = self.names.len() - begin;
                    if !is_many && count != 1 {
                        return Err(Error::UnexpectedText);
                    }
                    let expressions = self.pop_trailing_node_array(begin);
                    return Ok(self.make_with_prec(
                        NodeKind::ConversionExpr { ty, expressions },
                        prec,
                    ));
                }
                OperatorKind::Conditional => {
                    let cond = self.parse_expr()?;
                    let then = self.parse_expr()?;
                    let else_ = self.parse_expr()?;
                    return Ok(self.make_with_prec(
                        NodeKind::ConditionalExpr { cond, then, else_ },
                        prec,
                    ));
                }
                OperatorKind::NamedCast => {
                    let to = self.parse_type()?;
                    let from = self.parse_expr()?;
                    return Ok(self.make_with_prec(
                        NodeKind::CastExpr {
                            cast_kind: sym,
                            to,
                            from,
                        },
                        prec,
                    ));
                }
                OperatorKind::OfIdOp => {
                    // [sizeof/alignof/typeid] ( <type>|<expr> )
                    let arg = if op.flag {
                        self.parse_type()?
                    } else {
                        self.parse_expr()?
                    };
                    return Ok(self.make_with_prec(
                        NodeKind::EnclosingExpr {
                            prefix: sym,
                            infix: arg,
                        },
                        prec,
                    ));
                }
                OperatorKind::NameOnly => {
                    // Not valid as an expression operand.
                    return Err(Error::UnexpectedText);
                }
            }
        }

        if self.input.remaining() < 2 {
            return Err(Error::UnexpectedEnd);
        }

        if self.input.peek(0) == b'L' {
            return self.parse_expr_primary();
        }
        if self.input.peek(0) == b'T' {
            return self.parse_template_param();
        }
        if self.input.peek(0) == b'f' {
            // Disambiguate a fold expression from a <function-param>.
            if self.input.peek(1) == b'p'
                || (self.input.peek(1) == b'L' && self.input.peek(2).is_ascii_digit())
            {
                return self.parse_function_param();
            }
            return self.parse_fold_expr();
        }

        if self.input.consume_if(b"il") {
            let begin = self.names.len();
            while !self.input.consume_if(b"E") {
                let init = self.parse_braced_expr()?;
                self.names.push(init);
            }
            let inits = self.pop_trailing_node_array(begin);
            return Ok(self.make(NodeKind::InitListExpr { ty: None, inits }));
        }
        if self.input.consume_if(b"mc") {
            return self.parse_pointer_to_member_conversion_expr(Prec::Unary);
        }
        if self.input.consume_if(b"nx") {
            let expr = self.parse_expr()?;
            return Ok(self.make_with_prec(
                NodeKind::EnclosingExpr {
                    prefix: "noexcept ",
                    infix: expr,
                },
                Prec::Unary,
            ));
        }
        if self.input.consume_if(b"so") {
            return self.parse_subobject_expr();
        }
        if self.input.consume_if(b"sp") {
            let child = self.parse_expr()?;
            return Ok(self.make(NodeKind::ParameterPackExpansion { child }));
        }
        if self.input.consume_if(b"sZ") {
            if self.input.peek(0) == b'T' {
                let pack = self.parse_template_param()?;
                return Ok(self.make(NodeKind::SizeofParamPackExpr { pack }));
            }
            let param = self.parse_function_param()?;
            return Ok(self.make(NodeKind::EnclosingExpr {
                prefix: "sizeof... ",
                infix: param,
            }));
        }
        if self.input.consume_if(b"sP") {
            let begin = self.names.len();
            while !self.input.consume_if(b"E") {
                let arg = self.parse_template_arg()?;
                self.names.push(arg);
            }
            let array = self.pop_trailing_node_array(begin);
            let pack = self.make(NodeKind::NodeArrayNode { array });
            return Ok(self.make(NodeKind::EnclosingExpr {
                prefix: "sizeof... ",
                infix: pack,
            }));
        }
        if self.input.consume_if(b"tl") {
            let ty = self.parse_type()?;
            let begin = self.names.len();
            while !self.input.consume_if(b"E") {
                let init = self.parse_braced_expr()?;
                self.names.push(init);
            }
            let inits = self.pop_trailing_node_array(begin);
            return Ok(self.make(NodeKind::InitListExpr {
                ty: Some(ty),
                inits,
            }));
        }
        if self.input.consume_if(b"tr") {
            return Ok(self.make(NodeKind::NameType { name: b"throw" }));
        }
        if self.input.consume_if(b"tw") {
            let op = self.parse_expr()?;
            return Ok(self.make(NodeKind::ThrowExpr { op }));
        }
        if self.input.consume_if(b"u") {
            let name = self.parse_source_name()?;
            // Special case legacy __uuidof mangling. The 't' and 'z'
            // appear where the standard encoding expects a
            // <template-arg>; neither __uuidof(short) nor __uuidof(...)
            // can actually occur, so there is no conflict.
            let mut uuid = None;
            if self.arena.base_name(name)[..] == b"__uuidof"[..] {
                if self.input.consume_if(b"t") {
                    uuid = Some(self.parse_type()?);
                } else if self.input.consume_if(b"z") {
                    uuid = Some(self.parse_expr()?);
                }
            }
            let begin = self.names.len();
            if let Some(uuid) = uuid {
                self.names.push(uuid);
            } else {
                while !self.input.consume_if(b"E") {
                    let arg = self.parse_template_arg()?;
                    self.names.push(arg);
                }
            }
            let args = self.pop_trailing_node_array(begin);
            return Ok(self.make_with_prec(
                NodeKind::CallExpr { callee: name, args },
                Prec::Postfix,
            ));
        }

        // Only unresolved names remain.
        self.parse_unresolved_name(global)
    }

    // -- Unresolved names ------------------------------------------------

    /// `<simple-id> ::= <source-name> [<template-args>]`
    fn parse_simple_id(&mut self) -> Result<NodeId> {
        let name = self.parse_source_name()?;
        if self.input.peek(0) == b'I' {
            let args = self.parse_template_args(false)?;
            return Ok(self.make(NodeKind::NameWithTemplateArgs { name, args }));
        }
        Ok(name)
    }

    /// `<destructor-name> ::= <unresolved-type> | <simple-id>`
    fn parse_destructor_name(&mut self) -> Result<NodeId> {
        let base = if self.input.peek(0).is_ascii_digit() {
            self.parse_simple_id()?
        } else {
            self.parse_unresolved_type()?
        };
        Ok(self.make(NodeKind::DtorName { base }))
    }

    /// `<unresolved-type> ::= <template-param> | <decltype> | <substitution>`
    fn parse_unresolved_type(&mut self) -> Result<NodeId> {
        if self.input.peek(0) == b'T' {
            let param = self.parse_template_param()?;
            self.subs.push(param);
            return Ok(param);
        }
        if self.input.peek(0) == b'D' {
            let decltype = self.parse_decltype()?;
            self.subs.push(decltype);
            return Ok(decltype);
        }
        self.parse_substitution()
    }

    /// `<base-unresolved-name> ::= <simple-id>`
    /// `                       ::= [on] <operator-name> [<template-args>]`
    /// `                       ::= dn <destructor-name>`
    fn parse_base_unresolved_name(&mut self) -> Result<NodeId> {
        if self.input.peek(0).is_ascii_digit() {
            return self.parse_simple_id();
        }

        if self.input.consume_if(b"dn") {
            return self.parse_destructor_name();
        }

        self.input.consume_if(b"on");

        let oper = self.parse_operator_name(None)?;
        if self.input.peek(0) == b'I' {
            let args = self.parse_template_args(false)?;
            return Ok(self.make(NodeKind::NameWithTemplateArgs { name: oper, args }));
        }
        Ok(oper)
    }

    /// `<unresolved-name>`; `global` reflects a leading `gs` already
    /// consumed by the caller.
    fn parse_unresolved_name(&mut self, global: bool) -> Result<NodeId> {
        // srN <unresolved-type> [<template-args>]
        //     <unresolved-qualifier-level>* E <base-unresolved-name>
        if self.input.consume_if(b"srN") {
            let mut so_far = self.parse_unresolved_type()?;

            if self.input.peek(0) == b'I' {
                let args = self.parse_template_args(false)?;
                so_far = self.make(NodeKind::NameWithTemplateArgs { name: so_far, args });
            }

            while !self.input.consume_if(b"E") {
                let qual = self.parse_simple_id()?;
                so_far = self.make(NodeKind::QualifiedName {
                    qualifier: so_far,
                    name: qual,
                });
            }

            let base = self.parse_base_unresolved_name()?;
            return Ok(self.make(NodeKind::QualifiedName {
                qualifier: so_far,
                name: base,
            }));
        }

        // [gs] <base-unresolved-name>
        if !self.input.consume_if(b"sr") {
            let mut so_far = self.parse_base_unresolved_name()?;
            if global {
                so_far = self.make(NodeKind::GlobalQualifiedName { child: so_far });
            }
            return Ok(so_far);
        }

        let mut so_far: Option<NodeId> = None;
        if self.input.peek(0).is_ascii_digit() {
            // [gs] sr <unresolved-qualifier-level>+ E <base-unresolved-name>
            loop {
                let qual = self.parse_simple_id()?;
                so_far = Some(match so_far {
                    Some(prev) => self.make(NodeKind::QualifiedName {
                        qualifier: prev,
                        name: qual,
                    }),
                    None if global => self.make(NodeKind::GlobalQualifiedName { child: qual }),
                    None => qual,
                });
                if self.input.consume_if(b"E") {
                    break;
                }
            }
        } else {
            // sr <unresolved-type> [<template-args>] <base-unresolved-name>
            let mut ty = self.parse_unresolved_type()?;
            if self.input.peek(0) == b'I' {
                let args = self.parse_template_args(false)?;
                ty = self.make(NodeKind::NameWithTemplateArgs { name: ty, args });
            }
            so_far = Some(ty);
        }

        let so_far = so_far.expect("qualifier parsed above");
        let base = self.parse_base_unresolved_name()?;
        Ok(self.make(NodeKind::QualifiedName {
            qualifier: so_far,
            name: base,
        }))
    }
}

/// `<source-name>` parsed against an arbitrary cursor; used for the
/// protocol name embedded in `objcproto` qualifiers.
fn bare_source_name_at<'a>(cursor: &mut IndexStr<'a>) -> Result<&'a [u8]> {
    if !cursor.peek(0).is_ascii_digit() {
        return Err(Error::UnexpectedText);
    }
    let mut len: usize = 0;
    while cursor.peek(0).is_ascii_digit() {
        let digit = (cursor.peek(0) - b'0') as usize;
        len = len
            .checked_mul(10)
            .and_then(|v| v.checked_add(digit))
            .ok_or(Error::Overflow)?;
        cursor.advance(1);
    }
    cursor.take(len).ok_or(Error::UnexpectedEnd)
}

#[cfg(test)]
mod tests {
    use super::Demangler;

    #[test]
    fn reset_reuses_the_session() {
        let mut parser = Demangler::new(b"_Z3foov");
        parser.reset(b"_Z3barv");
        let (arena, root) = parser.parse().expect("well-formed symbol");
        let mut ob = crate::output::OutputBuffer::new();
        arena.print(root, &mut ob);
        assert_eq!(ob.as_str(), "bar()");
    }
}
