//! Translation of typed gunk ASTs into `FileDescriptorProto`s.
//!
//! One file translates to one descriptor: struct types become messages,
//! interfaces become services, named integer types become enums, and const
//! declarations feed enum values. Doc comments land in source-code-info
//! locations keyed by the descriptor paths code generators expect.

use crate::annotations::{self, MethodTag};
use crate::ast::{
    AstArena, CommentGroup, Field, File, GenDecl, GenDeclKind, InterfaceType, Method, Spec,
    StructType, TypeId, TypeSpec,
};
use crate::check::{Importer, ObjKind, TypedPackage};
use crate::descriptor::{
    field_descriptor_proto::{Label, Type as FieldType},
    source_code_info, DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto,
    FieldDescriptorProto, FileDescriptorProto, FileOptions, MethodDescriptorProto, MethodOptions,
    ServiceDescriptorProto, SourceCodeInfo,
};
use crate::error::{Error, Result, Span};
use crate::tags;

// Descriptor field numbers used as source-code-info paths.
const PACKAGE_PATH: i32 = 2; // FileDescriptorProto.package
const MESSAGE_PATH: i32 = 4; // FileDescriptorProto.message_type
const ENUM_PATH: i32 = 5; // FileDescriptorProto.enum_type
const SERVICE_PATH: i32 = 6; // FileDescriptorProto.service
const MESSAGE_FIELD_PATH: i32 = 2; // DescriptorProto.field
const SERVICE_METHOD_PATH: i32 = 2; // ServiceDescriptorProto.method
const ENUM_VALUE_PATH: i32 = 2; // EnumDescriptorProto.value

/// The well-known empty message, used for parameterless and resultless
/// methods.
pub const EMPTY_TYPE: &str = ".google.protobuf.Empty";
pub const EMPTY_PROTO: &str = "google/protobuf/empty.proto";

/// Translates a single gunk file of a checked package into a descriptor.
pub fn translate_file(
    arena: &AstArena,
    typed: &TypedPackage,
    importer: &dyn Importer,
    file: &File,
) -> Result<FileDescriptorProto> {
    let mut t = Translator {
        arena,
        typed,
        importer,
        file,
        pfile: FileDescriptorProto {
            syntax: Some("proto3".to_string()),
            name: Some(file.name.clone()),
            package: Some(typed.path.clone()),
            options: Some(FileOptions {
                go_package: Some(typed.name.clone()),
                ..Default::default()
            }),
            ..Default::default()
        },
        msg_index: 0,
        srv_index: 0,
        enum_index: 0,
    };
    t.add_doc(file.doc.as_ref(), None, vec![PACKAGE_PATH]);
    for decl in &file.decls {
        t.decl(decl)?;
    }
    Ok(t.pfile)
}

struct Translator<'a> {
    arena: &'a AstArena,
    typed: &'a TypedPackage,
    importer: &'a dyn Importer,
    file: &'a File,
    pfile: FileDescriptorProto,
    msg_index: i32,
    srv_index: i32,
    enum_index: i32,
}

/// Result of mapping a gunk type expression to a proto wire type.
struct ProtoType {
    typ: FieldType,
    repeated: bool,
    name: String,
}

impl<'a> Translator<'a> {
    fn subset_err(&self, span: Span, message: impl Into<String>) -> Error {
        Error::Subset {
            pos: self.file.line_map.pos(&self.file.name, span.start),
            message: message.into(),
        }
    }

    fn add_doc(
        &mut self,
        doc: Option<&CommentGroup>,
        transform: Option<&dyn Fn(String) -> String>,
        path: Vec<i32>,
    ) {
        let Some(doc) = doc else { return };
        let mut text = doc.text();
        if let Some(f) = transform {
            text = f(text);
        }
        self.add_doc_text(text, path);
    }

    fn add_doc_text(&mut self, text: String, path: Vec<i32>) {
        let info = self
            .pfile
            .source_code_info
            .get_or_insert_with(SourceCodeInfo::default);
        info.location.push(source_code_info::Location {
            path,
            leading_comments: Some(text),
            ..Default::default()
        });
    }

    /// Records a well-known proto file dependency, once.
    fn add_proto_dep(&mut self, proto_path: &str) {
        if !self.pfile.dependency.iter().any(|d| d == proto_path) {
            self.pfile.dependency.push(proto_path.to_string());
        }
    }

    /// Translates one top-level declaration. Only type declarations produce
    /// output; const declarations are consumed by enum translation and
    /// imports by the dependency post-pass.
    fn decl(&mut self, decl: &GenDecl) -> Result<()> {
        match decl.kind {
            GenDeclKind::Const | GenDeclKind::Import => return Ok(()),
            GenDeclKind::Type => {}
        }
        let arena = self.arena;
        for spec in &decl.specs {
            let Spec::Type(ts) = spec else { continue };
            // A spec without its own doc inherits the declaration's.
            let doc = ts.doc.as_ref().or(decl.doc.as_ref()).cloned();
            match arena.typ(ts.typ) {
                crate::ast::TypeExpr::Struct(st) => {
                    let msg = self.proto_message(ts, st, doc)?;
                    self.pfile.message_type.push(msg);
                }
                crate::ast::TypeExpr::Interface(it) => {
                    let srv = self.proto_service(ts, it)?;
                    self.pfile.service.push(srv);
                }
                crate::ast::TypeExpr::Name(_) => {
                    let enm = self.proto_enum(ts, doc)?;
                    self.pfile.enum_type.push(enm);
                }
                _ => {
                    return Err(self.subset_err(
                        arena.ident_span(ts.name),
                        format!("unsupported declaration type for {}", arena.ident(ts.name)),
                    ));
                }
            }
        }
        Ok(())
    }

    fn proto_message(
        &mut self,
        ts: &TypeSpec,
        st: &StructType,
        doc: Option<CommentGroup>,
    ) -> Result<DescriptorProto> {
        let arena = self.arena;
        let file = self.file;
        self.add_doc(doc.as_ref(), None, vec![MESSAGE_PATH, self.msg_index]);
        let mut msg = DescriptorProto {
            name: Some(arena.ident(ts.name).to_string()),
            ..Default::default()
        };
        for (i, field) in st.fields.iter().enumerate() {
            let span = self.field_span(field);
            if field.names.len() != 1 {
                return Err(self.subset_err(span, "need all fields to have one name"));
            }
            self.add_doc(
                field.doc.as_ref(),
                None,
                vec![
                    MESSAGE_PATH,
                    self.msg_index,
                    MESSAGE_FIELD_PATH,
                    i as i32,
                ],
            );
            let fname = arena.ident(field.names[0]).to_string();
            let number = tags::proto_number(file, &fname, field.tag.as_ref(), span)?;
            let Some(pt) = self.proto_type(field.typ, None) else {
                return Err(self.subset_err(
                    arena.type_span(field.typ),
                    format!("unsupported field type for {fname}"),
                ));
            };
            let mut pfield = FieldDescriptorProto {
                name: Some(fname),
                number: Some(number),
                r#type: Some(pt.typ as i32),
                ..Default::default()
            };
            if matches!(pt.typ, FieldType::Message | FieldType::Enum) {
                pfield.type_name = Some(pt.name);
            }
            if pt.repeated {
                pfield.label = Some(Label::Repeated as i32);
            }
            msg.field.push(pfield);
        }
        self.msg_index += 1;
        Ok(msg)
    }

    fn proto_service(&mut self, ts: &TypeSpec, it: &InterfaceType) -> Result<ServiceDescriptorProto> {
        let arena = self.arena;
        let file = self.file;
        let mut srv = ServiceDescriptorProto {
            name: Some(arena.ident(ts.name).to_string()),
            ..Default::default()
        };
        for (i, method) in it.methods.iter().enumerate() {
            let mut tag = None;
            if let Some(doc) = &method.doc {
                let (prose, parsed) = tags::split_gunk_tag(file, doc)?;
                tag = parsed;
                self.add_doc_text(
                    prose,
                    vec![
                        SERVICE_PATH,
                        self.srv_index,
                        SERVICE_METHOD_PATH,
                        i as i32,
                    ],
                );
            }
            let mut pmethod = MethodDescriptorProto {
                name: Some(arena.ident(method.name).to_string()),
                ..Default::default()
            };
            pmethod.input_type = Some(self.proto_param_type(method, &method.params, "parameter")?);
            pmethod.output_type = Some(self.proto_param_type(method, &method.results, "result")?);
            if let Some(tag) = tag {
                let imports = self
                    .typed
                    .file_imports
                    .get(&file.name)
                    .cloned()
                    .unwrap_or_default();
                let MethodTag::Http(rule) =
                    annotations::interpret(&tag, &self.typed.path, &imports, self.importer)?;
                pmethod.options = Some(MethodOptions {
                    http: Some(rule),
                    ..Default::default()
                });
            }
            srv.method.push(pmethod);
        }
        self.srv_index += 1;
        Ok(srv)
    }

    /// Maps a method parameter or result list to a proto type name. An empty
    /// list maps to the well-known empty message and registers its proto
    /// dependency.
    fn proto_param_type(
        &mut self,
        method: &Method,
        types: &[TypeId],
        what: &str,
    ) -> Result<String> {
        if types.is_empty() {
            self.add_proto_dep(EMPTY_PROTO);
            return Ok(EMPTY_TYPE.to_string());
        }
        if types.len() > 1 {
            return Err(self.subset_err(
                method.span,
                format!("methods must have at most one {what}"),
            ));
        }
        match self.proto_type(types[0], None) {
            Some(pt) => Ok(pt.name),
            None => Err(self.subset_err(
                self.arena.type_span(types[0]),
                format!("could not get type for method {what}"),
            )),
        }
    }

    fn proto_enum(&mut self, ts: &TypeSpec, doc: Option<CommentGroup>) -> Result<EnumDescriptorProto> {
        let arena = self.arena;
        let file = self.file;
        let typed = self.typed;
        self.add_doc(doc.as_ref(), None, vec![ENUM_PATH, self.enum_index]);
        let enum_name = arena.ident(ts.name).to_string();
        let mut enm = EnumDescriptorProto {
            name: Some(enum_name.clone()),
            ..Default::default()
        };
        let enum_type = typed.info.defs.get(&ts.name).map(|o| o.typ.clone());
        for decl in &file.decls {
            if decl.kind != GenDeclKind::Const {
                continue;
            }
            for (i, spec) in decl.specs.iter().enumerate() {
                let Spec::Value(vs) = spec else { continue };
                // Like .proto files, one name per value; it also allows
                // per-value docs.
                if vs.names.len() != 1 {
                    return Err(self.subset_err(
                        arena.ident_span(vs.names[0]),
                        "need all value specs to define one name",
                    ));
                }
                let name_id = vs.names[0];
                let Some(obj) = typed.info.defs.get(&name_id) else {
                    continue;
                };
                if enum_type.as_ref() != Some(&obj.typ) {
                    continue;
                }
                // SomeVal is exported by generators as SomeType_SomeVal.
                let prefix = enum_name.clone();
                self.add_doc(
                    vs.doc.as_ref(),
                    Some(&|text: String| format!("{prefix}_{text}")),
                    vec![ENUM_PATH, self.enum_index, ENUM_VALUE_PATH, i as i32],
                );
                let ObjKind::Const { value } = &obj.kind else {
                    continue;
                };
                let number = i32::try_from(*value).map_err(|_| {
                    self.subset_err(
                        arena.ident_span(name_id),
                        format!("enum value {value} out of int32 range"),
                    )
                })?;
                enm.value.push(EnumValueDescriptorProto {
                    name: Some(arena.ident(name_id).to_string()),
                    number: Some(number),
                    options: None,
                });
            }
        }
        self.enum_index += 1;
        Ok(enm)
    }

    fn field_span(&self, field: &Field) -> Span {
        field
            .names
            .first()
            .map(|&id| self.arena.ident_span(id))
            .unwrap_or_else(|| self.arena.type_span(field.typ))
    }

    /// Maps a type expression to a proto wire type, following the scalar
    /// table and the declaration index of the package in scope. Returns
    /// `None` for anything outside the subset.
    fn proto_type(&self, id: TypeId, scope: Option<&TypedPackage>) -> Option<ProtoType> {
        let scope = scope.unwrap_or(self.typed);
        match self.arena.typ(id) {
            crate::ast::TypeExpr::Name(ident) => {
                self.named_proto_type(self.arena.ident(*ident), scope)
            }
            crate::ast::TypeExpr::Selector { pkg, name } => {
                let obj = self.typed.info.uses.get(pkg)?;
                let ObjKind::PkgName { path } = &obj.kind else {
                    return None;
                };
                let imported = self.importer.import(path)?;
                self.named_proto_type(self.arena.ident(*name), &imported)
            }
            crate::ast::TypeExpr::Slice { elem } => {
                let inner = self.proto_type(*elem, Some(scope))?;
                Some(ProtoType {
                    repeated: true,
                    ..inner
                })
            }
            // Only slices are supported, not fixed-length arrays.
            crate::ast::TypeExpr::Array { .. } => None,
            crate::ast::TypeExpr::Struct(_) | crate::ast::TypeExpr::Interface(_) => None,
        }
    }

    fn named_proto_type(&self, name: &str, scope: &TypedPackage) -> Option<ProtoType> {
        // Scalar mapping per the proto3 table.
        let scalar = match name {
            "string" => Some(FieldType::String),
            "int" | "int32" => Some(FieldType::Int32),
            "bool" => Some(FieldType::Bool),
            _ => None,
        };
        if let Some(typ) = scalar {
            return Some(ProtoType {
                typ,
                repeated: false,
                name: name.to_string(),
            });
        }
        let full_name = format!(".{}.{}", scope.path, name);
        match scope.decl_kinds.get(name)? {
            crate::check::DeclKind::Message => Some(ProtoType {
                typ: FieldType::Message,
                repeated: false,
                name: full_name,
            }),
            crate::check::DeclKind::Enum => Some(ProtoType {
                typ: FieldType::Enum,
                repeated: false,
                name: full_name,
            }),
            crate::check::DeclKind::Service => None,
        }
    }
}
