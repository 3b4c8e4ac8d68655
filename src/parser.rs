//! Recursive-descent parser for the gunk subset.
//!
//! The token stream comes from [`crate::lexer`] with semicolons already
//! inserted. Comments ride along in the stream; a pre-pass folds them into
//! groups (adjacent lines, no code between) so declarations, specs, fields
//! and methods can pick up the group ending on the line directly above them
//! as their doc comment, matching `go/ast` behavior.

use smallvec::SmallVec;

use crate::ast::*;
use crate::error::{Error, LineMap, Result, Span};
use crate::lexer::{unquote_raw_string, unquote_string, Lexer, Tok};

/// Parses a single `.gunk` file into `arena`, returning the file tree.
/// `name` is the stable relative name used in diagnostics.
pub fn parse_file(arena: &mut AstArena, name: &str, src: &str) -> Result<File> {
    let mut p = Parser::new(arena, name, src);
    p.file()
}

/// Parses a standalone expression (the body of a gunk tag).
pub fn parse_expr(arena: &mut AstArena, name: &str, src: &str) -> Result<ExprId> {
    let mut p = Parser::new(arena, name, src);
    let expr = p.expr()?;
    // A trailing inserted semicolon is fine; anything else is not.
    if matches!(p.peek(), Some(Tok::Semi)) {
        p.bump();
    }
    if let Some(tok) = p.peek() {
        return Err(p.err_here(format!("unexpected {} after expression", tok.describe())));
    }
    Ok(expr)
}

struct Group {
    group: CommentGroup,
    end_line: u32,
    own_line: bool,
    taken: bool,
}

struct Parser<'a, 's> {
    arena: &'a mut AstArena,
    file: &'s str,
    src_len: usize,
    line_map: LineMap,
    toks: Vec<(usize, Tok<'s>, usize)>,
    groups: Vec<Group>,
    i: usize,
}

impl<'a, 's> Parser<'a, 's> {
    fn new(arena: &'a mut AstArena, file: &'s str, src: &'s str) -> Self {
        let line_map = LineMap::new(src);
        let mut toks = Vec::new();
        let mut groups: Vec<Group> = Vec::new();
        let mut open: Option<Group> = None;
        let mut last_code_line = 0u32;

        for (s, tok, e) in Lexer::new(src) {
            if let Tok::Comment(text) = tok {
                let start_line = line_map.line(s as u32);
                let end_line = line_map.line(e.saturating_sub(1) as u32);
                let comment = Comment {
                    text: text.to_string(),
                    span: Span::new(s, e),
                };
                match open.as_mut() {
                    Some(g) if start_line <= g.end_line + 1 => {
                        g.group.list.push(comment);
                        g.end_line = end_line;
                    }
                    _ => {
                        if let Some(g) = open.take() {
                            groups.push(g);
                        }
                        open = Some(Group {
                            group: CommentGroup {
                                list: vec![comment],
                            },
                            end_line,
                            own_line: start_line != last_code_line,
                            taken: false,
                        });
                    }
                }
            } else {
                if let Some(g) = open.take() {
                    groups.push(g);
                }
                last_code_line = line_map.line(s as u32);
                toks.push((s, tok, e));
            }
        }
        if let Some(g) = open.take() {
            groups.push(g);
        }

        Self {
            arena,
            file,
            src_len: src.len(),
            line_map,
            toks,
            groups,
            i: 0,
        }
    }

    // --- token plumbing ---

    #[inline]
    fn peek(&self) -> Option<Tok<'s>> {
        self.toks.get(self.i).map(|t| t.1)
    }

    #[inline]
    fn peek2(&self) -> Option<Tok<'s>> {
        self.toks.get(self.i + 1).map(|t| t.1)
    }

    #[inline]
    fn bump(&mut self) -> (usize, Tok<'s>, usize) {
        let t = self.toks[self.i];
        self.i += 1;
        t
    }

    #[inline]
    fn here(&self) -> usize {
        self.toks
            .get(self.i)
            .map(|t| t.0)
            .unwrap_or(self.src_len)
    }

    fn err_at(&self, offset: usize, message: impl Into<String>) -> Error {
        Error::Parse {
            pos: self.line_map.pos(self.file, offset as u32),
            message: message.into(),
        }
    }

    fn err_here(&self, message: impl Into<String>) -> Error {
        self.err_at(self.here(), message)
    }

    fn expect(&mut self, want: Tok<'static>, what: &str) -> Result<(usize, Tok<'s>, usize)> {
        match self.peek() {
            Some(tok) if tok == want => Ok(self.bump()),
            Some(tok) => Err(self.err_here(format!("expected {what}, found {}", tok.describe()))),
            None => Err(self.err_here(format!("expected {what}, found end of file"))),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<IdentId> {
        match self.peek() {
            Some(Tok::Ident(name)) => {
                let (s, _, e) = self.bump();
                Ok(self.arena.alloc_ident(name.to_string(), Span::new(s, e)))
            }
            Some(tok) => Err(self.err_here(format!("expected {what}, found {}", tok.describe()))),
            None => Err(self.err_here(format!("expected {what}, found end of file"))),
        }
    }

    /// Consumes a terminating semicolon; Go permits omitting it before a
    /// closing `)` or `}`.
    fn expect_semi(&mut self) -> Result<()> {
        match self.peek() {
            Some(Tok::Semi) => {
                self.bump();
                Ok(())
            }
            Some(Tok::RParen) | Some(Tok::RBrace) | None => Ok(()),
            Some(tok) => Err(self.err_here(format!("expected ';', found {}", tok.describe()))),
        }
    }

    /// Doc comment for a construct starting on `line`: the comment group on
    /// its own line(s) ending directly above.
    fn take_doc(&mut self, line: u32) -> Option<CommentGroup> {
        for g in &mut self.groups {
            if !g.taken && g.own_line && g.end_line + 1 == line {
                g.taken = true;
                return Some(g.group.clone());
            }
        }
        None
    }

    fn line_here(&self) -> u32 {
        self.line_map.line(self.here() as u32)
    }

    // --- grammar ---

    fn file(&mut self) -> Result<File> {
        let doc = self.take_doc(self.line_here());
        self.expect(Tok::KwPackage, "keyword \"package\"")?;
        let (s, tok, e) = match self.peek() {
            Some(Tok::Ident(_)) => self.bump(),
            _ => return Err(self.err_here("expected package name")),
        };
        let pkg_name = match tok {
            Tok::Ident(n) => n.to_string(),
            _ => unreachable!(),
        };
        self.expect_semi()?;

        let mut decls = Vec::new();
        while let Some(tok) = self.peek() {
            match tok {
                Tok::KwImport => decls.push(self.gen_decl(GenDeclKind::Import)?),
                Tok::KwConst => decls.push(self.gen_decl(GenDeclKind::Const)?),
                Tok::KwType => decls.push(self.gen_decl(GenDeclKind::Type)?),
                Tok::Semi => {
                    self.bump();
                }
                Tok::KwFunc => {
                    return Err(self.err_here("func declarations are not supported"));
                }
                Tok::KwVar => {
                    return Err(self.err_here("var declarations are not supported"));
                }
                _ => {
                    return Err(
                        self.err_here(format!("unexpected {} at top level", tok.describe()))
                    );
                }
            }
        }

        Ok(File {
            name: self.file.to_string(),
            doc,
            package: Spanned {
                node: pkg_name,
                span: Span::new(s, e),
            },
            decls,
            line_map: self.line_map.clone(),
        })
    }

    fn gen_decl(&mut self, kind: GenDeclKind) -> Result<GenDecl> {
        let doc = self.take_doc(self.line_here());
        let (start, _, _) = self.bump(); // the keyword
        let mut specs = Vec::new();
        let end;
        if matches!(self.peek(), Some(Tok::LParen)) {
            self.bump();
            loop {
                match self.peek() {
                    Some(Tok::RParen) => {
                        let (_, _, e) = self.bump();
                        end = e;
                        break;
                    }
                    Some(Tok::Semi) => {
                        self.bump();
                    }
                    Some(_) => {
                        specs.push(self.spec(kind)?);
                        self.expect_semi()?;
                    }
                    None => return Err(self.err_here("expected ')', found end of file")),
                }
            }
        } else {
            specs.push(self.spec(kind)?);
            end = self.toks.get(self.i.saturating_sub(1)).map(|t| t.2).unwrap_or(start);
            self.expect_semi()?;
        }
        Ok(GenDecl {
            kind,
            doc,
            specs,
            span: Span::new(start, end),
        })
    }

    fn spec(&mut self, kind: GenDeclKind) -> Result<Spec> {
        let doc = self.take_doc(self.line_here());
        match kind {
            GenDeclKind::Import => self.import_spec(doc).map(Spec::Import),
            GenDeclKind::Const => self.value_spec(doc).map(Spec::Value),
            GenDeclKind::Type => self.type_spec(doc).map(Spec::Type),
        }
    }

    fn import_spec(&mut self, doc: Option<CommentGroup>) -> Result<ImportSpec> {
        let name = match self.peek() {
            Some(Tok::Ident(_)) => Some(self.expect_ident("import name")?),
            Some(Tok::Dot) => {
                return Err(self.err_here("dot imports are not supported"));
            }
            _ => None,
        };
        let (s, tok, e) = match self.peek() {
            Some(Tok::Str(_)) => self.bump(),
            Some(tok) => {
                return Err(
                    self.err_here(format!("expected import path, found {}", tok.describe()))
                );
            }
            None => return Err(self.err_here("expected import path, found end of file")),
        };
        let lit = match tok {
            Tok::Str(lit) => lit,
            _ => unreachable!(),
        };
        let path = unquote_string(lit).map_err(|m| self.err_at(s, m))?;
        Ok(ImportSpec {
            doc,
            name,
            path: Spanned {
                node: path,
                span: Span::new(s, e),
            },
        })
    }

    fn value_spec(&mut self, doc: Option<CommentGroup>) -> Result<ValueSpec> {
        let mut names = SmallVec::new();
        names.push(self.expect_ident("constant name")?);
        while matches!(self.peek(), Some(Tok::Comma)) {
            self.bump();
            names.push(self.expect_ident("constant name")?);
        }
        let typ = match self.peek() {
            Some(Tok::Assign) | Some(Tok::Semi) | Some(Tok::RParen) | None => None,
            _ => Some(self.typ()?),
        };
        let mut values = SmallVec::new();
        if matches!(self.peek(), Some(Tok::Assign)) {
            self.bump();
            values.push(self.expr()?);
            while matches!(self.peek(), Some(Tok::Comma)) {
                self.bump();
                values.push(self.expr()?);
            }
        }
        Ok(ValueSpec {
            doc,
            names,
            typ,
            values,
        })
    }

    fn type_spec(&mut self, doc: Option<CommentGroup>) -> Result<TypeSpec> {
        let name = self.expect_ident("type name")?;
        if matches!(self.peek(), Some(Tok::Assign)) {
            return Err(self.err_here("type aliases are not supported"));
        }
        let typ = self.typ()?;
        Ok(TypeSpec { doc, name, typ })
    }

    fn typ(&mut self) -> Result<TypeId> {
        match self.peek() {
            Some(Tok::Ident(_)) => {
                let start = self.here();
                let id = self.expect_ident("type name")?;
                if matches!(self.peek(), Some(Tok::Dot)) {
                    self.bump();
                    let sel = self.expect_ident("type name after '.'")?;
                    let end = self.arena.ident_span(sel).end as usize;
                    Ok(self
                        .arena
                        .alloc_type(TypeExpr::Selector { pkg: id, name: sel }, Span::new(start, end)))
                } else {
                    let span = self.arena.ident_span(id);
                    Ok(self.arena.alloc_type(TypeExpr::Name(id), span))
                }
            }
            Some(Tok::LBrack) => {
                let (start, _, _) = self.bump();
                if matches!(self.peek(), Some(Tok::RBrack)) {
                    self.bump();
                    let elem = self.typ()?;
                    let end = self.arena.type_span(elem).end as usize;
                    Ok(self
                        .arena
                        .alloc_type(TypeExpr::Slice { elem }, Span::new(start, end)))
                } else {
                    let len = self.expr()?;
                    self.expect(Tok::RBrack, "']'")?;
                    let elem = self.typ()?;
                    let end = self.arena.type_span(elem).end as usize;
                    Ok(self
                        .arena
                        .alloc_type(TypeExpr::Array { len, elem }, Span::new(start, end)))
                }
            }
            Some(Tok::KwStruct) => self.struct_type(),
            Some(Tok::KwInterface) => self.interface_type(),
            Some(Tok::KwMap) => Err(self.err_here("map types are not supported")),
            Some(Tok::KwChan) => Err(self.err_here("channel types are not supported")),
            Some(Tok::KwFunc) => Err(self.err_here("func types are not supported")),
            Some(Tok::Star) => Err(self.err_here("pointer types are not supported")),
            Some(tok) => Err(self.err_here(format!("expected type, found {}", tok.describe()))),
            None => Err(self.err_here("expected type, found end of file")),
        }
    }

    fn struct_type(&mut self) -> Result<TypeId> {
        let (start, _, _) = self.bump(); // struct
        self.expect(Tok::LBrace, "'{'")?;
        let mut fields = Vec::new();
        let end;
        loop {
            match self.peek() {
                Some(Tok::RBrace) => {
                    let (_, _, e) = self.bump();
                    end = e;
                    break;
                }
                Some(Tok::Semi) => {
                    self.bump();
                }
                Some(Tok::Ident(_)) => {
                    fields.push(self.field()?);
                    self.expect_semi()?;
                }
                Some(tok) => {
                    return Err(
                        self.err_here(format!("expected field name, found {}", tok.describe()))
                    );
                }
                None => return Err(self.err_here("expected '}', found end of file")),
            }
        }
        Ok(self
            .arena
            .alloc_type(TypeExpr::Struct(StructType { fields }), Span::new(start, end)))
    }

    fn field(&mut self) -> Result<Field> {
        let doc = self.take_doc(self.line_here());
        let mut names: SmallVec<[IdentId; 2]> = SmallVec::new();
        names.push(self.expect_ident("field name")?);
        while matches!(self.peek(), Some(Tok::Comma)) {
            self.bump();
            names.push(self.expect_ident("field name")?);
        }
        // An embedded field is a lone type identifier; the translator rejects
        // it, but it must parse the way Go parses it.
        let typ = match self.peek() {
            Some(Tok::Semi) | Some(Tok::RBrace) | Some(Tok::RawStr(_)) | Some(Tok::Str(_))
                if names.len() == 1 =>
            {
                let id = names[0];
                names.clear();
                let span = self.arena.ident_span(id);
                self.arena.alloc_type(TypeExpr::Name(id), span)
            }
            _ => self.typ()?,
        };
        let tag = match self.peek() {
            Some(Tok::RawStr(lit)) => {
                let (s, _, e) = self.bump();
                let content = unquote_raw_string(lit).map_err(|m| self.err_at(s, m))?;
                Some(Spanned {
                    node: content,
                    span: Span::new(s, e),
                })
            }
            Some(Tok::Str(lit)) => {
                let (s, _, e) = self.bump();
                let content = unquote_string(lit).map_err(|m| self.err_at(s, m))?;
                Some(Spanned {
                    node: content,
                    span: Span::new(s, e),
                })
            }
            _ => None,
        };
        Ok(Field {
            doc,
            names,
            typ,
            tag,
        })
    }

    fn interface_type(&mut self) -> Result<TypeId> {
        let (start, _, _) = self.bump(); // interface
        self.expect(Tok::LBrace, "'{'")?;
        let mut methods = Vec::new();
        let end;
        loop {
            match self.peek() {
                Some(Tok::RBrace) => {
                    let (_, _, e) = self.bump();
                    end = e;
                    break;
                }
                Some(Tok::Semi) => {
                    self.bump();
                }
                Some(Tok::Ident(_)) => {
                    methods.push(self.method()?);
                    self.expect_semi()?;
                }
                Some(tok) => {
                    return Err(
                        self.err_here(format!("expected method name, found {}", tok.describe()))
                    );
                }
                None => return Err(self.err_here("expected '}', found end of file")),
            }
        }
        Ok(self.arena.alloc_type(
            TypeExpr::Interface(InterfaceType { methods }),
            Span::new(start, end),
        ))
    }

    fn method(&mut self) -> Result<Method> {
        let doc = self.take_doc(self.line_here());
        let start = self.here();
        let name = self.expect_ident("method name")?;
        if !matches!(self.peek(), Some(Tok::LParen)) {
            return Err(self.err_here("embedded interfaces are not supported"));
        }
        self.bump();
        let mut params = Vec::new();
        loop {
            match self.peek() {
                Some(Tok::RParen) => {
                    self.bump();
                    break;
                }
                Some(Tok::Comma) => {
                    self.bump();
                }
                Some(_) => params.push(self.param_type()?),
                None => return Err(self.err_here("expected ')', found end of file")),
            }
        }
        let mut results = Vec::new();
        match self.peek() {
            Some(Tok::LParen) => {
                self.bump();
                loop {
                    match self.peek() {
                        Some(Tok::RParen) => {
                            self.bump();
                            break;
                        }
                        Some(Tok::Comma) => {
                            self.bump();
                        }
                        Some(_) => results.push(self.param_type()?),
                        None => return Err(self.err_here("expected ')', found end of file")),
                    }
                }
            }
            Some(Tok::Semi) | Some(Tok::RBrace) | None => {}
            Some(_) => results.push(self.typ()?),
        }
        let end = self
            .toks
            .get(self.i.saturating_sub(1))
            .map(|t| t.2)
            .unwrap_or(start);
        Ok(Method {
            doc,
            name,
            params,
            results,
            span: Span::new(start, end),
        })
    }

    /// A parameter or result entry: `name Type` or a bare `Type`. Only the
    /// type matters to translation, so a leading name is consumed and
    /// dropped.
    fn param_type(&mut self) -> Result<TypeId> {
        if let (Some(Tok::Ident(_)), Some(next)) = (self.peek(), self.peek2()) {
            let named = matches!(
                next,
                Tok::Ident(_)
                    | Tok::LBrack
                    | Tok::KwStruct
                    | Tok::KwInterface
                    | Tok::KwMap
                    | Tok::KwChan
                    | Tok::KwFunc
                    | Tok::Star
            );
            if named {
                self.bump(); // the parameter name
            }
        }
        self.typ()
    }

    // --- expressions ---

    fn expr(&mut self) -> Result<ExprId> {
        self.binary_expr(4)
    }

    fn binary_expr(&mut self, prec: u8) -> Result<ExprId> {
        if prec > 5 {
            return self.unary_expr();
        }
        let mut lhs = self.binary_expr(prec + 1)?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) if prec == 4 => BinOp::Add,
                Some(Tok::Minus) if prec == 4 => BinOp::Sub,
                Some(Tok::Pipe) if prec == 4 => BinOp::Or,
                Some(Tok::Caret) if prec == 4 => BinOp::Xor,
                Some(Tok::Star) if prec == 5 => BinOp::Mul,
                Some(Tok::Slash) if prec == 5 => BinOp::Div,
                Some(Tok::Percent) if prec == 5 => BinOp::Rem,
                Some(Tok::Shl) if prec == 5 => BinOp::Shl,
                Some(Tok::Shr) if prec == 5 => BinOp::Shr,
                Some(Tok::Amp) if prec == 5 => BinOp::And,
                _ => break,
            };
            self.bump();
            let rhs = self.binary_expr(prec + 1)?;
            let span = Span::new(
                self.arena.expr_span(lhs).start as usize,
                self.arena.expr_span(rhs).end as usize,
            );
            lhs = self.arena.alloc_expr(Expr::Binary { lhs, op, rhs }, span);
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<ExprId> {
        let op = match self.peek() {
            Some(Tok::Plus) => Some(UnaryOp::Plus),
            Some(Tok::Minus) => Some(UnaryOp::Minus),
            _ => None,
        };
        if let Some(op) = op {
            let (start, _, _) = self.bump();
            let expr = self.unary_expr()?;
            let span = Span::new(start, self.arena.expr_span(expr).end as usize);
            return Ok(self.arena.alloc_expr(Expr::Unary { op, expr }, span));
        }
        self.primary_expr()
    }

    fn primary_expr(&mut self) -> Result<ExprId> {
        match self.peek() {
            Some(Tok::Int(raw)) => {
                let (s, _, e) = self.bump();
                Ok(self
                    .arena
                    .alloc_expr(Expr::Int(raw.to_string()), Span::new(s, e)))
            }
            Some(Tok::Str(lit)) => {
                let (s, _, e) = self.bump();
                let value = unquote_string(lit).map_err(|m| self.err_at(s, m))?;
                Ok(self.arena.alloc_expr(Expr::Str(value), Span::new(s, e)))
            }
            Some(Tok::LParen) => {
                let (start, _, _) = self.bump();
                let inner = self.expr()?;
                let (_, _, end) = self.expect(Tok::RParen, "')'")?;
                Ok(self
                    .arena
                    .alloc_expr(Expr::Paren(inner), Span::new(start, end)))
            }
            Some(Tok::Ident(name)) => {
                let (s, _, e) = self.bump();
                match self.peek() {
                    Some(Tok::Dot) => {
                        // Qualified composite literal: pkg.Name{...}
                        self.bump();
                        let pkg = self.arena.alloc_ident(name.to_string(), Span::new(s, e));
                        let sel = self.expect_ident("identifier after '.'")?;
                        if !matches!(self.peek(), Some(Tok::LBrace)) {
                            return Err(self.err_here(
                                "qualified identifiers are only supported in composite literals",
                            ));
                        }
                        let end = self.arena.ident_span(sel).end as usize;
                        let typ = self
                            .arena
                            .alloc_type(TypeExpr::Selector { pkg, name: sel }, Span::new(s, end));
                        self.composite_lit(typ, s)
                    }
                    Some(Tok::LBrace) => {
                        let id = self.arena.alloc_ident(name.to_string(), Span::new(s, e));
                        let typ = self.arena.alloc_type(TypeExpr::Name(id), Span::new(s, e));
                        self.composite_lit(typ, s)
                    }
                    _ => Ok(self
                        .arena
                        .alloc_expr(Expr::Ident(name.to_string()), Span::new(s, e))),
                }
            }
            Some(tok) => Err(self.err_here(format!(
                "expected expression, found {}",
                tok.describe()
            ))),
            None => Err(self.err_here("expected expression, found end of file")),
        }
    }

    fn composite_lit(&mut self, typ: TypeId, start: usize) -> Result<ExprId> {
        self.expect(Tok::LBrace, "'{'")?;
        let mut elts = Vec::new();
        let end;
        loop {
            match self.peek() {
                Some(Tok::RBrace) => {
                    let (_, _, e) = self.bump();
                    end = e;
                    break;
                }
                Some(Tok::Ident(key)) if matches!(self.peek2(), Some(Tok::Colon)) => {
                    let (ks, _, ke) = self.bump();
                    self.bump(); // ':'
                    let value = self.expr()?;
                    elts.push(KeyedElt {
                        key: Spanned {
                            node: key.to_string(),
                            span: Span::new(ks, ke),
                        },
                        value,
                    });
                    if matches!(self.peek(), Some(Tok::Comma)) {
                        self.bump();
                    }
                }
                Some(tok) => {
                    return Err(self.err_here(format!(
                        "expected key: value element, found {}",
                        tok.describe()
                    )));
                }
                None => return Err(self.err_here("expected '}', found end of file")),
            }
        }
        Ok(self
            .arena
            .alloc_expr(Expr::Composite { typ, elts }, Span::new(start, end)))
    }
}
