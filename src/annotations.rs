//! Interpretation of `+gunk` tag expressions into typed method options.
//!
//! The tag expression is evaluated in the scope of the enclosing package:
//! its composite literal type is resolved through the file's imports to a
//! fully-qualified `<import-path>.<TypeName>`, and dispatch happens on that
//! name. The base implementation recognizes a single option type, the HTTP
//! binding `github.com/gunk/opt/http.Match`.

use std::collections::HashMap;

use crate::ast::{Expr, KeyedElt, TypeExpr};
use crate::check::Importer;
use crate::descriptor::{http_rule, HttpRule};
use crate::error::{Error, Result};
use crate::tags::ParsedTag;

/// Fully-qualified name of the HTTP option type.
const HTTP_MATCH: &str = "github.com/gunk/opt/http.Match";

/// A typed option extension ready to be attached to method options.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodTag {
    Http(HttpRule),
}

/// Evaluates a tag expression. `pkg_path` is the enclosing package's import
/// path and `imports` the enclosing file's local-name-to-path bindings.
pub fn interpret(
    tag: &ParsedTag,
    pkg_path: &str,
    imports: &HashMap<String, String>,
    importer: &dyn Importer,
) -> Result<MethodTag> {
    let err = |message: String| Error::Annotation {
        pos: tag.pos.clone(),
        message,
    };

    let Expr::Composite { typ, elts } = tag.arena.expr(tag.root) else {
        return Err(err("gunk tag must be a composite literal".to_string()));
    };

    let full_name = match tag.arena.typ(*typ) {
        TypeExpr::Selector { pkg, name } => {
            let local = tag.arena.ident(*pkg);
            let Some(path) = imports.get(local) else {
                return Err(err(format!("undefined: {local}")));
            };
            let type_name = tag.arena.ident(*name);
            let defined = importer
                .import(path)
                .is_some_and(|p| p.scope.contains_key(type_name));
            if !defined {
                return Err(err(format!("undefined: {local}.{type_name}")));
            }
            format!("{path}.{type_name}")
        }
        TypeExpr::Name(id) => format!("{pkg_path}.{}", tag.arena.ident(*id)),
        _ => return Err(err("gunk tag has no option type".to_string())),
    };

    match full_name.as_str() {
        HTTP_MATCH => http_match(tag, elts).map(MethodTag::Http),
        _ => Err(err(format!("unknown option type: {full_name}"))),
    }
}

/// Builds an `HttpRule` from an `http.Match` literal. All fields are read
/// before the rule is assembled, so field order in the literal is
/// irrelevant.
fn http_match(tag: &ParsedTag, elts: &[KeyedElt]) -> Result<HttpRule> {
    let err = |message: String| Error::Annotation {
        pos: tag.pos.clone(),
        message,
    };

    let mut method: Option<&str> = None;
    let mut path: Option<&str> = None;
    let mut body: Option<&str> = None;
    for elt in elts {
        let Expr::Str(value) = tag.arena.expr(elt.value) else {
            return Err(err(format!(
                "http.Match field {} must be a string literal",
                elt.key.node
            )));
        };
        match elt.key.node.as_str() {
            "Method" => method = Some(value.as_str()),
            "Path" => path = Some(value.as_str()),
            "Body" => body = Some(value.as_str()),
            other => return Err(err(format!("unknown http.Match field {other}"))),
        }
    }

    let mut rule = HttpRule::default();
    if let Some(body) = body {
        rule.body = body.to_string();
    }
    if let Some(path) = path {
        rule.pattern = Some(match method.unwrap_or("GET") {
            "GET" => http_rule::Pattern::Get(path.to_string()),
            "POST" => http_rule::Pattern::Post(path.to_string()),
            other => {
                return Err(err(format!("unsupported http method {other:?}")));
            }
        });
    }
    Ok(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstArena, File};
    use crate::check::{check_package, TypedPackage};
    use crate::parser;
    use crate::tags::split_gunk_tag;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    struct Cache(HashMap<String, Rc<TypedPackage>>);
    impl Importer for Cache {
        fn import(&self, path: &str) -> Option<Rc<TypedPackage>> {
            self.0.get(path).cloned()
        }
    }

    fn http_pkg() -> Rc<TypedPackage> {
        let mut arena = AstArena::new();
        let src = "package http\n\ntype Match struct {\n\tMethod string `pb:\"1\"`\n\tPath string `pb:\"2\"`\n\tBody string `pb:\"3\"`\n}\n\ntype Other struct {}\n";
        let file =
            parser::parse_file(&mut arena, "github.com/gunk/opt/http/http.gunk", src).unwrap();
        let mut files: BTreeMap<String, File> = BTreeMap::new();
        files.insert("github.com/gunk/opt/http/http.gunk".into(), file);
        let typed = check_package(
            "github.com/gunk/opt/http",
            "http",
            &arena,
            &files,
            &Cache(HashMap::new()),
        )
        .unwrap();
        Rc::new(typed)
    }

    fn tag_for(src_tag: &str) -> (crate::tags::ParsedTag, HashMap<String, String>, Cache) {
        let src = format!(
            "package svc\n\nimport \"github.com/gunk/opt/http\"\n\ntype S interface {{\n\t// {src_tag}\n\tPing()\n}}\n"
        );
        let mut arena = AstArena::new();
        let file = parser::parse_file(&mut arena, "svc/svc.gunk", &src).unwrap();
        let crate::ast::Spec::Type(ts) = &file.decls[1].specs[0] else {
            panic!();
        };
        let crate::ast::TypeExpr::Interface(it) = arena.typ(ts.typ) else {
            panic!();
        };
        let doc = it.methods[0].doc.clone().unwrap();
        let (_, tag) = split_gunk_tag(&file, &doc).unwrap();
        let mut imports = HashMap::new();
        imports.insert("http".to_string(), "github.com/gunk/opt/http".to_string());
        let mut cache = HashMap::new();
        cache.insert("github.com/gunk/opt/http".to_string(), http_pkg());
        (tag.unwrap(), imports, Cache(cache))
    }

    #[test]
    fn builds_post_rule() {
        let (tag, imports, cache) =
            tag_for("+gunk http.Match{Method: \"POST\", Path: \"/ping\", Body: \"*\"}");
        let MethodTag::Http(rule) = interpret(&tag, "svc", &imports, &cache).unwrap();
        assert_eq!(rule.body, "*");
        assert_eq!(rule.pattern, Some(http_rule::Pattern::Post("/ping".into())));
    }

    #[test]
    fn method_defaults_to_get() {
        let (tag, imports, cache) = tag_for("+gunk http.Match{Path: \"/ping\"}");
        let MethodTag::Http(rule) = interpret(&tag, "svc", &imports, &cache).unwrap();
        assert_eq!(rule.pattern, Some(http_rule::Pattern::Get("/ping".into())));
    }

    #[test]
    fn field_order_is_irrelevant() {
        let (tag, imports, cache) =
            tag_for("+gunk http.Match{Path: \"/ping\", Method: \"POST\"}");
        let MethodTag::Http(rule) = interpret(&tag, "svc", &imports, &cache).unwrap();
        assert_eq!(rule.pattern, Some(http_rule::Pattern::Post("/ping".into())));
    }

    #[test]
    fn unknown_option_type_rejected() {
        let (tag, imports, cache) = tag_for("+gunk http.Other{}");
        let err = interpret(&tag, "svc", &imports, &cache).unwrap_err();
        assert!(
            err.to_string()
                .contains("unknown option type: github.com/gunk/opt/http.Other"),
            "got {err}"
        );
    }

    #[test]
    fn undefined_option_type_rejected() {
        let (tag, imports, cache) = tag_for("+gunk http.Missing{}");
        let err = interpret(&tag, "svc", &imports, &cache).unwrap_err();
        assert!(
            err.to_string().contains("undefined: http.Missing"),
            "got {err}"
        );
    }

    #[test]
    fn unsupported_http_method_rejected() {
        let (tag, imports, cache) =
            tag_for("+gunk http.Match{Method: \"BREW\", Path: \"/tea\"}");
        let err = interpret(&tag, "svc", &imports, &cache).unwrap_err();
        assert!(err.to_string().contains("unsupported http method"), "got {err}");
    }
}
