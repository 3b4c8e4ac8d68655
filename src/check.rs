//! Name resolution and type checking for the gunk subset.
//!
//! Plays the role `go/types` plays for the original tool: it builds a
//! package scope from type declarations, binds file-scoped imports through
//! the loader (the importer oracle), resolves every type reference, and
//! evaluates constant declarations with `iota` semantics. The results land
//! in side tables keyed by arena IDs, mirroring the `types.Info` maps.
//!
//! Unused imports are never flagged: descriptor-only code imports packages
//! purely for type references, sometimes only from inside gunk tags.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use smallvec::SmallVec;

use crate::ast::{
    AstArena, BinOp, Expr, ExprId, File, GenDeclKind, IdentId, Spec, TypeExpr, TypeId, UnaryOp,
};
use crate::error::{Error, Result, Span};

/// Go basic types known to the universe scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basic {
    Bool,
    String,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    UntypedInt,
}

impl Basic {
    pub fn from_name(name: &str) -> Option<Basic> {
        Some(match name {
            "bool" => Basic::Bool,
            "string" => Basic::String,
            "int" => Basic::Int,
            "int8" => Basic::Int8,
            "int16" => Basic::Int16,
            "int32" | "rune" => Basic::Int32,
            "int64" => Basic::Int64,
            "uint" => Basic::Uint,
            "uint8" | "byte" => Basic::Uint8,
            "uint16" => Basic::Uint16,
            "uint32" => Basic::Uint32,
            "uint64" => Basic::Uint64,
            "float32" => Basic::Float32,
            "float64" => Basic::Float64,
            _ => return None,
        })
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, Basic::Bool | Basic::String | Basic::Float32 | Basic::Float64)
    }
}

/// What a package-level type declaration turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// Struct type.
    Message,
    /// Interface type.
    Service,
    /// Named integer type.
    Enum,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Invalid,
    Basic(Basic),
    Named {
        pkg: String,
        name: String,
        kind: DeclKind,
    },
    Slice(Box<Type>),
    Array(Box<Type>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjKind {
    TypeName,
    Const { value: i64 },
    PkgName { path: String },
}

/// A declared or referenced entity, the analogue of `types.Object`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub kind: ObjKind,
    pub typ: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAndValue {
    pub typ: Type,
    pub value: Option<i64>,
}

/// Side tables produced by checking one package.
#[derive(Debug, Default)]
pub struct TypeInfo {
    /// Identifier declaration -> object.
    pub defs: HashMap<IdentId, Object>,
    /// Identifier occurrence -> resolved object.
    pub uses: HashMap<IdentId, Object>,
    /// Constant expression -> evaluated type and value.
    pub types: HashMap<ExprId, TypeAndValue>,
}

/// A fully checked package.
#[derive(Debug)]
pub struct TypedPackage {
    pub path: String,
    pub name: String,
    pub scope: HashMap<String, Object>,
    /// Short type name -> declaration kind; built once so type references
    /// resolve without rescanning declarations.
    pub decl_kinds: HashMap<String, DeclKind>,
    pub info: TypeInfo,
    /// File relative name -> local package name -> import path.
    pub file_imports: BTreeMap<String, HashMap<String, String>>,
}

/// The import oracle handed to the checker. Backed by the loader's cache;
/// by the time a package is checked its imports are fully loaded.
pub trait Importer {
    fn import(&self, path: &str) -> Option<Rc<TypedPackage>>;
}

/// Checks all files of one package.
pub fn check_package(
    path: &str,
    name: &str,
    arena: &AstArena,
    files: &BTreeMap<String, File>,
    importer: &dyn Importer,
) -> Result<TypedPackage> {
    let mut c = Checker {
        path,
        arena,
        importer,
        scope: HashMap::new(),
        decl_kinds: HashMap::new(),
        info: TypeInfo::default(),
        file_imports: BTreeMap::new(),
    };

    for (rel, file) in files {
        c.bind_imports(rel, file)?;
    }
    for file in files.values() {
        c.collect_types(file)?;
    }
    for (rel, file) in files {
        c.resolve_decls(rel, file)?;
    }
    for (rel, file) in files {
        c.check_consts(rel, file)?;
    }

    Ok(TypedPackage {
        path: path.to_string(),
        name: name.to_string(),
        scope: c.scope,
        decl_kinds: c.decl_kinds,
        info: c.info,
        file_imports: c.file_imports,
    })
}

struct Checker<'a> {
    path: &'a str,
    arena: &'a AstArena,
    importer: &'a dyn Importer,
    scope: HashMap<String, Object>,
    decl_kinds: HashMap<String, DeclKind>,
    info: TypeInfo,
    file_imports: BTreeMap<String, HashMap<String, String>>,
}

impl<'a> Checker<'a> {
    fn err(&self, file: &File, span: Span, message: impl Into<String>) -> Error {
        Error::Check {
            pos: file.line_map.pos(&file.name, span.start),
            message: message.into(),
        }
    }

    fn bind_imports(&mut self, rel: &str, file: &File) -> Result<()> {
        let mut bindings = HashMap::new();
        for spec in file.imports() {
            if spec.is_blank(self.arena) {
                continue;
            }
            let path = &spec.path.node;
            let Some(imported) = self.importer.import(path) else {
                return Err(self.err(
                    file,
                    spec.path.span,
                    format!("could not import {path:?}"),
                ));
            };
            let local = match spec.name {
                Some(id) => {
                    let obj = Object {
                        kind: ObjKind::PkgName { path: path.clone() },
                        typ: Type::Invalid,
                    };
                    self.info.defs.insert(id, obj);
                    self.arena.ident(id).to_string()
                }
                None => imported.name.clone(),
            };
            bindings.insert(local, path.clone());
        }
        self.file_imports.insert(rel.to_string(), bindings);
        Ok(())
    }

    fn collect_types(&mut self, file: &File) -> Result<()> {
        for decl in &file.decls {
            if decl.kind != GenDeclKind::Type {
                continue;
            }
            for spec in &decl.specs {
                let Spec::Type(ts) = spec else { continue };
                let name = self.arena.ident(ts.name);
                let kind = match self.arena.typ(ts.typ) {
                    TypeExpr::Struct(_) => DeclKind::Message,
                    TypeExpr::Interface(_) => DeclKind::Service,
                    TypeExpr::Name(base) => {
                        let base_name = self.arena.ident(*base);
                        match Basic::from_name(base_name) {
                            Some(b) if b.is_integer() => DeclKind::Enum,
                            Some(_) => {
                                return Err(Error::Subset {
                                    pos: file
                                        .line_map
                                        .pos(&file.name, self.arena.ident_span(*base).start),
                                    message: format!(
                                        "enum base type must be an integer type, not {base_name}"
                                    ),
                                });
                            }
                            None => {
                                return Err(self.err(
                                    file,
                                    self.arena.ident_span(*base),
                                    format!("undefined: {base_name}"),
                                ));
                            }
                        }
                    }
                    _ => {
                        return Err(Error::Subset {
                            pos: file
                                .line_map
                                .pos(&file.name, self.arena.ident_span(ts.name).start),
                            message: format!("unsupported type declaration {name}"),
                        });
                    }
                };
                let obj = Object {
                    kind: ObjKind::TypeName,
                    typ: Type::Named {
                        pkg: self.path.to_string(),
                        name: name.to_string(),
                        kind,
                    },
                };
                if self.scope.insert(name.to_string(), obj.clone()).is_some() {
                    return Err(self.err(
                        file,
                        self.arena.ident_span(ts.name),
                        format!("{name} redeclared in this package"),
                    ));
                }
                self.decl_kinds.insert(name.to_string(), kind);
                self.info.defs.insert(ts.name, obj);
            }
        }
        Ok(())
    }

    fn resolve_decls(&mut self, rel: &str, file: &File) -> Result<()> {
        for decl in &file.decls {
            if decl.kind != GenDeclKind::Type {
                continue;
            }
            for spec in &decl.specs {
                let Spec::Type(ts) = spec else { continue };
                match self.arena.typ(ts.typ) {
                    TypeExpr::Struct(st) => {
                        for field in &st.fields {
                            self.resolve_type(rel, file, field.typ)?;
                        }
                    }
                    TypeExpr::Interface(it) => {
                        for m in &it.methods {
                            for &p in &m.params {
                                self.resolve_type(rel, file, p)?;
                            }
                            for &r in &m.results {
                                self.resolve_type(rel, file, r)?;
                            }
                        }
                    }
                    TypeExpr::Name(base) => {
                        // Validated in collect_types; record the use.
                        if let Some(b) = Basic::from_name(self.arena.ident(*base)) {
                            self.info.uses.insert(
                                *base,
                                Object {
                                    kind: ObjKind::TypeName,
                                    typ: Type::Basic(b),
                                },
                            );
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn resolve_type(&mut self, rel: &str, file: &File, id: TypeId) -> Result<Type> {
        match self.arena.typ(id) {
            TypeExpr::Name(ident) => {
                let name = self.arena.ident(*ident);
                if let Some(b) = Basic::from_name(name) {
                    let obj = Object {
                        kind: ObjKind::TypeName,
                        typ: Type::Basic(b),
                    };
                    self.info.uses.insert(*ident, obj.clone());
                    return Ok(obj.typ);
                }
                match self.scope.get(name).cloned() {
                    Some(obj) => {
                        self.info.uses.insert(*ident, obj.clone());
                        Ok(obj.typ)
                    }
                    None => Err(self.err(
                        file,
                        self.arena.ident_span(*ident),
                        format!("undefined: {name}"),
                    )),
                }
            }
            TypeExpr::Selector { pkg, name } => {
                let local = self.arena.ident(*pkg);
                let Some(path) = self
                    .file_imports
                    .get(rel)
                    .and_then(|m| m.get(local))
                    .cloned()
                else {
                    return Err(self.err(
                        file,
                        self.arena.ident_span(*pkg),
                        format!("undefined: {local}"),
                    ));
                };
                self.info.uses.insert(
                    *pkg,
                    Object {
                        kind: ObjKind::PkgName { path: path.clone() },
                        typ: Type::Invalid,
                    },
                );
                let Some(imported) = self.importer.import(&path) else {
                    return Err(self.err(
                        file,
                        self.arena.ident_span(*pkg),
                        format!("could not import {path:?}"),
                    ));
                };
                let sel = self.arena.ident(*name);
                match imported.scope.get(sel).cloned() {
                    Some(obj) => {
                        self.info.uses.insert(*name, obj.clone());
                        Ok(obj.typ)
                    }
                    None => Err(self.err(
                        file,
                        self.arena.ident_span(*name),
                        format!("undefined: {local}.{sel}"),
                    )),
                }
            }
            TypeExpr::Slice { elem } => {
                let elem = self.resolve_type(rel, file, *elem)?;
                Ok(Type::Slice(Box::new(elem)))
            }
            TypeExpr::Array { elem, .. } => {
                let elem = self.resolve_type(rel, file, *elem)?;
                Ok(Type::Array(Box::new(elem)))
            }
            // Anonymous composite forms type-check in Go; the translator is
            // the one that rejects them.
            TypeExpr::Struct(_) | TypeExpr::Interface(_) => Ok(Type::Invalid),
        }
    }

    fn check_consts(&mut self, rel: &str, file: &File) -> Result<()> {
        for decl in &file.decls {
            if decl.kind != GenDeclKind::Const {
                continue;
            }
            let mut cur_type: Option<Type> = None;
            let mut cur_exprs: SmallVec<[ExprId; 2]> = SmallVec::new();
            for (iota, spec) in decl.specs.iter().enumerate() {
                let Spec::Value(vs) = spec else { continue };

                let (typ, exprs, inherited) = if vs.values.is_empty() {
                    if vs.typ.is_some() {
                        let name = self.arena.ident(vs.names[0]);
                        return Err(self.err(
                            file,
                            self.arena.ident_span(vs.names[0]),
                            format!("missing init expr for {name}"),
                        ));
                    }
                    if cur_exprs.is_empty() {
                        let name = self.arena.ident(vs.names[0]);
                        return Err(self.err(
                            file,
                            self.arena.ident_span(vs.names[0]),
                            format!("missing init expr for {name}"),
                        ));
                    }
                    (cur_type.clone(), cur_exprs.clone(), true)
                } else {
                    let typ = match vs.typ {
                        Some(t) => Some(self.resolve_type(rel, file, t)?),
                        None => None,
                    };
                    cur_type = typ.clone();
                    cur_exprs = vs.values.clone();
                    (typ, vs.values.clone(), false)
                };

                if vs.names.len() != exprs.len() {
                    return Err(self.err(
                        file,
                        self.arena.ident_span(vs.names[0]),
                        "wrong number of initializers",
                    ));
                }

                for (&name_id, &expr_id) in vs.names.iter().zip(exprs.iter()) {
                    let value = self.eval_const(file, expr_id, iota as i64)?;
                    let obj_typ = typ.clone().unwrap_or(Type::Basic(Basic::UntypedInt));
                    if !inherited {
                        self.info.types.insert(
                            expr_id,
                            TypeAndValue {
                                typ: obj_typ.clone(),
                                value: Some(value),
                            },
                        );
                    }
                    let obj = Object {
                        kind: ObjKind::Const { value },
                        typ: obj_typ,
                    };
                    let name = self.arena.ident(name_id).to_string();
                    if name != "_" && self.scope.insert(name.clone(), obj.clone()).is_some() {
                        return Err(self.err(
                            file,
                            self.arena.ident_span(name_id),
                            format!("{name} redeclared in this package"),
                        ));
                    }
                    self.info.defs.insert(name_id, obj);
                }
            }
        }
        Ok(())
    }

    fn eval_const(&self, file: &File, id: ExprId, iota: i64) -> Result<i64> {
        let span = self.arena.expr_span(id);
        match self.arena.expr(id) {
            Expr::Int(raw) => {
                parse_int(raw).map_err(|m| self.err(file, span, m))
            }
            Expr::Ident(name) => {
                if name == "iota" {
                    return Ok(iota);
                }
                match self.scope.get(name) {
                    Some(Object {
                        kind: ObjKind::Const { value },
                        ..
                    }) => Ok(*value),
                    Some(_) => Err(self.err(
                        file,
                        span,
                        format!("{name} is not an integer constant"),
                    )),
                    None => Err(self.err(file, span, format!("undefined: {name}"))),
                }
            }
            Expr::Unary { op, expr } => {
                let v = self.eval_const(file, *expr, iota)?;
                Ok(match op {
                    UnaryOp::Plus => v,
                    UnaryOp::Minus => -v,
                })
            }
            Expr::Binary { lhs, op, rhs } => {
                let l = self.eval_const(file, *lhs, iota)?;
                let r = self.eval_const(file, *rhs, iota)?;
                let overflow = || self.err(file, span, "constant overflow");
                match op {
                    BinOp::Add => l.checked_add(r).ok_or_else(overflow),
                    BinOp::Sub => l.checked_sub(r).ok_or_else(overflow),
                    BinOp::Mul => l.checked_mul(r).ok_or_else(overflow),
                    BinOp::Div => {
                        if r == 0 {
                            return Err(self.err(file, span, "division by zero"));
                        }
                        Ok(l / r)
                    }
                    BinOp::Rem => {
                        if r == 0 {
                            return Err(self.err(file, span, "division by zero"));
                        }
                        Ok(l % r)
                    }
                    BinOp::Shl => {
                        let shift =
                            u32::try_from(r).map_err(|_| self.err(file, span, "invalid shift"))?;
                        l.checked_shl(shift).ok_or_else(overflow)
                    }
                    BinOp::Shr => {
                        let shift =
                            u32::try_from(r).map_err(|_| self.err(file, span, "invalid shift"))?;
                        l.checked_shr(shift).ok_or_else(overflow)
                    }
                    BinOp::And => Ok(l & r),
                    BinOp::Or => Ok(l | r),
                    BinOp::Xor => Ok(l ^ r),
                }
            }
            Expr::Paren(inner) => self.eval_const(file, *inner, iota),
            Expr::Str(_) | Expr::Composite { .. } => {
                Err(self.err(file, span, "integer constant expression expected"))
            }
        }
    }
}

/// Parses a Go integer literal in any base, with underscores.
pub fn parse_int(raw: &str) -> std::result::Result<i64, String> {
    let digits: String = raw.chars().filter(|&c| c != '_').collect();
    let bad = || format!("invalid integer literal {raw:?}");
    let parse = |s: &str, radix: u32| i64::from_str_radix(s, radix).map_err(|_| bad());
    if let Some(rest) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        parse(rest, 16)
    } else if let Some(rest) = digits.strip_prefix("0o").or_else(|| digits.strip_prefix("0O")) {
        parse(rest, 8)
    } else if let Some(rest) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        parse(rest, 2)
    } else if digits.len() > 1 && digits.starts_with('0') {
        // Legacy octal.
        parse(&digits[1..], 8)
    } else {
        parse(&digits, 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    struct NoImports;
    impl Importer for NoImports {
        fn import(&self, _path: &str) -> Option<Rc<TypedPackage>> {
            None
        }
    }

    fn check(src: &str) -> Result<(AstArena, BTreeMap<String, File>, TypedPackage)> {
        let mut arena = AstArena::new();
        let file = parser::parse_file(&mut arena, "util/u.gunk", src).expect("parse ok");
        let name = file.package.node.clone();
        let mut files = BTreeMap::new();
        files.insert("util/u.gunk".to_string(), file);
        let typed = check_package("util", &name, &arena, &files, &NoImports)?;
        Ok((arena, files, typed))
    }

    #[test]
    fn iota_enum_values() {
        let (_, _, typed) = check(
            "package util\n\ntype Color int\n\nconst (\n\tRed Color = iota\n\tGreen\n\tBlue\n)\n",
        )
        .unwrap();
        let want = [("Red", 0), ("Green", 1), ("Blue", 2)];
        for (name, value) in want {
            let obj = typed.scope.get(name).expect(name);
            assert_eq!(obj.kind, ObjKind::Const { value });
            assert_eq!(
                obj.typ,
                Type::Named {
                    pkg: "util".into(),
                    name: "Color".into(),
                    kind: DeclKind::Enum,
                }
            );
        }
        assert_eq!(typed.decl_kinds.get("Color"), Some(&DeclKind::Enum));
    }

    #[test]
    fn iota_arithmetic() {
        let (_, _, typed) = check(
            "package util\n\ntype Flag int\n\nconst (\n\tA Flag = 1 << iota\n\tB\n\tC\n)\n",
        )
        .unwrap();
        assert_eq!(typed.scope["A"].kind, ObjKind::Const { value: 1 });
        assert_eq!(typed.scope["B"].kind, ObjKind::Const { value: 2 });
        assert_eq!(typed.scope["C"].kind, ObjKind::Const { value: 4 });
    }

    #[test]
    fn explicit_const_values() {
        let (_, _, typed) =
            check("package util\n\ntype E int\n\nconst (\n\tX E = 3\n\tY E = 0x10\n)\n").unwrap();
        assert_eq!(typed.scope["X"].kind, ObjKind::Const { value: 3 });
        assert_eq!(typed.scope["Y"].kind, ObjKind::Const { value: 16 });
    }

    #[test]
    fn undefined_field_type() {
        let err = check("package util\n\ntype M struct { X Missing `pb:\"1\"` }\n").unwrap_err();
        assert!(err.to_string().contains("undefined: Missing"), "got {err}");
    }

    #[test]
    fn undefined_selector_package() {
        let err =
            check("package util\n\ntype M struct { X other.T `pb:\"1\"` }\n").unwrap_err();
        assert!(err.to_string().contains("undefined: other"), "got {err}");
    }

    #[test]
    fn missing_import_is_an_error() {
        let err = check("package util\n\nimport \"no/such/pkg\"\n\ntype M struct {}\n")
            .unwrap_err();
        assert!(err.to_string().contains("could not import"), "got {err}");
    }

    #[test]
    fn duplicate_type_rejected() {
        let err = check("package util\n\ntype M struct {}\ntype M struct {}\n").unwrap_err();
        assert!(err.to_string().contains("redeclared"), "got {err}");
    }

    #[test]
    fn non_integer_enum_base_rejected() {
        let err = check("package util\n\ntype S string\n").unwrap_err();
        assert!(
            err.to_string().contains("enum base type must be an integer"),
            "got {err}"
        );
    }

    #[test]
    fn struct_and_interface_kinds() {
        let (_, _, typed) = check(
            "package util\n\ntype M struct {}\n\ntype S interface {}\n\ntype E int\n",
        )
        .unwrap();
        assert_eq!(typed.decl_kinds["M"], DeclKind::Message);
        assert_eq!(typed.decl_kinds["S"], DeclKind::Service);
        assert_eq!(typed.decl_kinds["E"], DeclKind::Enum);
    }

    #[test]
    fn parse_int_bases() {
        assert_eq!(parse_int("42").unwrap(), 42);
        assert_eq!(parse_int("0x2A").unwrap(), 42);
        assert_eq!(parse_int("0o52").unwrap(), 42);
        assert_eq!(parse_int("0b101010").unwrap(), 42);
        assert_eq!(parse_int("052").unwrap(), 42);
        assert_eq!(parse_int("1_000").unwrap(), 1000);
        assert!(parse_int("0xZZ").is_err());
    }
}
