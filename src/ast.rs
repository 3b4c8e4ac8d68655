//! AST for the gunk subset of Go syntax.
//!
//! Nodes that later phases need to key side tables on (identifiers, types,
//! expressions) live in typed arenas and are referenced by `Idx` IDs; the
//! arena index plays the role pointer identity plays in `go/ast`, giving the
//! type checker stable keys for its occurrence maps. Structural nodes
//! (declarations, specs, fields) nest directly.

use la_arena::{Arena, Idx};
use smallvec::SmallVec;

use crate::error::{LineMap, Span};

pub type IdentId = Idx<Spanned<Ident>>;
pub type ExprId = Idx<Spanned<Expr>>;
pub type TypeId = Idx<Spanned<TypeExpr>>;

/// Wrapper that associates an AST node with its source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

/// An identifier occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
}

/// Central arena owning identifier, expression and type nodes for all files
/// of one package.
#[derive(Debug, Default)]
pub struct AstArena {
    pub idents: Arena<Spanned<Ident>>,
    pub exprs: Arena<Spanned<Expr>>,
    pub types: Arena<Spanned<TypeExpr>>,
}

impl AstArena {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_ident(&mut self, name: String, span: Span) -> IdentId {
        self.idents.alloc(Spanned {
            node: Ident { name },
            span,
        })
    }

    #[inline]
    pub fn alloc_expr(&mut self, expr: Expr, span: Span) -> ExprId {
        self.exprs.alloc(Spanned { node: expr, span })
    }

    #[inline]
    pub fn alloc_type(&mut self, typ: TypeExpr, span: Span) -> TypeId {
        self.types.alloc(Spanned { node: typ, span })
    }

    #[inline]
    pub fn ident(&self, id: IdentId) -> &str {
        &self.idents[id].node.name
    }

    #[inline]
    pub fn ident_span(&self, id: IdentId) -> Span {
        self.idents[id].span
    }

    #[inline]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id].node
    }

    #[inline]
    pub fn expr_span(&self, id: ExprId) -> Span {
        self.exprs[id].span
    }

    #[inline]
    pub fn typ(&self, id: TypeId) -> &TypeExpr {
        &self.types[id].node
    }

    #[inline]
    pub fn type_span(&self, id: TypeId) -> Span {
        self.types[id].span
    }
}

/// A single `//` or `/* */` comment, text kept verbatim with markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    pub span: Span,
}

/// A run of comments with no blank line or code between them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommentGroup {
    pub list: Vec<Comment>,
}

impl CommentGroup {
    /// The group's text with comment markers stripped, lines joined with
    /// newlines, and surrounding blank lines removed.
    pub fn text(&self) -> String {
        let mut lines: Vec<String> = Vec::new();
        for c in &self.list {
            if let Some(rest) = c.text.strip_prefix("//") {
                lines.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            } else {
                let body = c
                    .text
                    .strip_prefix("/*")
                    .and_then(|s| s.strip_suffix("*/"))
                    .unwrap_or(&c.text);
                for line in body.lines() {
                    lines.push(line.trim().to_string());
                }
            }
        }
        while lines.first().is_some_and(|l| l.is_empty()) {
            lines.remove(0);
        }
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines.join("\n")
    }
}

/// A parsed `.gunk` source file.
#[derive(Debug)]
pub struct File {
    /// Stable relative name (`<pkgPath>/<basename>`) used in diagnostics and
    /// as the descriptor name.
    pub name: String,
    /// Doc comment of the `package` clause.
    pub doc: Option<CommentGroup>,
    pub package: Spanned<String>,
    pub decls: Vec<GenDecl>,
    pub line_map: LineMap,
}

impl File {
    /// Import specs of this file, in source order.
    pub fn imports(&self) -> impl Iterator<Item = &ImportSpec> {
        self.decls
            .iter()
            .filter(|d| d.kind == GenDeclKind::Import)
            .flat_map(|d| d.specs.iter())
            .filter_map(|s| match s {
                Spec::Import(i) => Some(i),
                _ => None,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenDeclKind {
    Import,
    Const,
    Type,
}

/// Declaration group: `import (...)`, `const (...)` or `type (...)`, or
/// their single-spec forms.
#[derive(Debug)]
pub struct GenDecl {
    pub kind: GenDeclKind,
    pub doc: Option<CommentGroup>,
    pub specs: Vec<Spec>,
    pub span: Span,
}

#[derive(Debug)]
pub enum Spec {
    Import(ImportSpec),
    Value(ValueSpec),
    Type(TypeSpec),
}

#[derive(Debug)]
pub struct ImportSpec {
    pub doc: Option<CommentGroup>,
    /// Optional local name; `_` makes the import blank.
    pub name: Option<IdentId>,
    /// Unquoted import path.
    pub path: Spanned<String>,
}

impl ImportSpec {
    pub fn is_blank(&self, arena: &AstArena) -> bool {
        self.name.is_some_and(|id| arena.ident(id) == "_")
    }
}

/// Constant spec: `Red Color = iota` or a bare `Green`.
#[derive(Debug)]
pub struct ValueSpec {
    pub doc: Option<CommentGroup>,
    pub names: SmallVec<[IdentId; 2]>,
    pub typ: Option<TypeId>,
    pub values: SmallVec<[ExprId; 2]>,
}

/// Type spec: `Name <type>`.
#[derive(Debug)]
pub struct TypeSpec {
    pub doc: Option<CommentGroup>,
    pub name: IdentId,
    pub typ: TypeId,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TypeExpr {
    /// Bare identifier: a basic type or a package-local named type.
    Name(IdentId),
    /// Qualified identifier `pkg.Name`.
    Selector { pkg: IdentId, name: IdentId },
    /// Slice `[]T`.
    Slice { elem: TypeId },
    /// Fixed-length array `[N]T`; parsed, rejected by the translator.
    Array { len: ExprId, elem: TypeId },
    Struct(StructType),
    Interface(InterfaceType),
}

#[derive(Debug, PartialEq, Eq)]
pub struct StructType {
    pub fields: Vec<Field>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Field {
    pub doc: Option<CommentGroup>,
    pub names: SmallVec<[IdentId; 2]>,
    pub typ: TypeId,
    /// Unquoted struct tag content, e.g. `pb:"1"`.
    pub tag: Option<Spanned<String>>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct InterfaceType {
    pub methods: Vec<Method>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Method {
    pub doc: Option<CommentGroup>,
    pub name: IdentId,
    pub params: Vec<TypeId>,
    pub results: Vec<TypeId>,
    pub span: Span,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Expr {
    /// Identifier in expression position (`iota`, a constant name).
    Ident(String),
    /// Integer literal, raw text; validated when evaluated.
    Int(String),
    /// String literal, unquoted value.
    Str(String),
    /// Keyed composite literal, e.g. `http.Match{Method: "POST"}`.
    Composite { typ: TypeId, elts: Vec<KeyedElt> },
    Unary { op: UnaryOp, expr: ExprId },
    Binary { lhs: ExprId, op: BinOp, rhs: ExprId },
    Paren(ExprId),
}

#[derive(Debug, PartialEq, Eq)]
pub struct KeyedElt {
    pub key: Spanned<String>,
    pub value: ExprId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_group_text_strips_markers() {
        let g = CommentGroup {
            list: vec![
                Comment {
                    text: "// Ping pings.".into(),
                    span: Span::default(),
                },
                Comment {
                    text: "//".into(),
                    span: Span::default(),
                },
                Comment {
                    text: "// Twice.".into(),
                    span: Span::default(),
                },
            ],
        };
        assert_eq!(g.text(), "Ping pings.\n\nTwice.");
    }

    #[test]
    fn comment_group_text_trims_blank_edges() {
        let g = CommentGroup {
            list: vec![
                Comment {
                    text: "//".into(),
                    span: Span::default(),
                },
                Comment {
                    text: "// middle".into(),
                    span: Span::default(),
                },
                Comment {
                    text: "//".into(),
                    span: Span::default(),
                },
            ],
        };
        assert_eq!(g.text(), "middle");
    }
}
