use std::fs;
use std::path::Path;

use gunk::descriptor::field_descriptor_proto::{Label, Type as FieldType};
use gunk::descriptor::http_rule;
use gunk::loader::{resolve_patterns, Loader};
use gunk::Error;
use tempfile::TempDir;

fn write_pkg(root: &Path, pkg_dir: &str, files: &[(&str, &str)]) {
    let dir = root.join(pkg_dir);
    fs::create_dir_all(&dir).unwrap();
    for (name, src) in files {
        fs::write(dir.join(name), src).unwrap();
    }
}

const HTTP_MATCH_GUNK: &str = "\
package http

type Match struct {
\tMethod string `pb:\"1\"`
\tPath string `pb:\"2\"`
\tBody string `pb:\"3\"`
}
";

#[test]
fn empty_package_loads_with_no_files() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("empty")).unwrap();
    let paths = resolve_patterns(tmp.path(), &["./empty".to_string()]).unwrap();
    assert_eq!(paths, vec!["empty".to_string()]);
    let l = Loader::new(tmp.path(), &paths).unwrap();
    assert!(l.to_generate("empty").unwrap().is_empty());
    assert!(l.all_proto().is_empty());
}

#[test]
fn no_packages_matched_is_surfaced_by_run() {
    let tmp = TempDir::new().unwrap();
    let err = gunk::run(tmp.path(), &["./...".to_string()]).unwrap_err();
    assert!(matches!(err, Error::NoPackages));
}

#[test]
fn single_struct_with_one_int_field() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "svc",
        &[("m.gunk", "package svc\n\ntype M struct { X int `pb:\"1\"` }\n")],
    );
    let l = Loader::new(tmp.path(), &["svc".to_string()]).unwrap();
    let pfile = &l.all_proto()["svc/m.gunk"];
    assert_eq!(pfile.syntax.as_deref(), Some("proto3"));
    assert_eq!(pfile.name.as_deref(), Some("svc/m.gunk"));
    assert_eq!(pfile.package.as_deref(), Some("svc"));
    assert!(pfile.dependency.is_empty());
    let msg = &pfile.message_type[0];
    assert_eq!(msg.name.as_deref(), Some("M"));
    assert_eq!(msg.field[0].name.as_deref(), Some("X"));
    assert_eq!(msg.field[0].number, Some(1));
    assert_eq!(msg.field[0].r#type, Some(FieldType::Int32 as i32));
}

#[test]
fn interface_maps_to_service_with_empty() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "svc",
        &[("s.gunk", "package svc\n\ntype S interface { Ping() }\n")],
    );
    let l = Loader::new(tmp.path(), &["svc".to_string()]).unwrap();
    let pfile = &l.all_proto()["svc/s.gunk"];
    let srv = &pfile.service[0];
    assert_eq!(srv.name.as_deref(), Some("S"));
    let m = &srv.method[0];
    assert_eq!(m.name.as_deref(), Some("Ping"));
    assert_eq!(m.input_type.as_deref(), Some(".google.protobuf.Empty"));
    assert_eq!(m.output_type.as_deref(), Some(".google.protobuf.Empty"));
    assert!(pfile
        .dependency
        .contains(&"google/protobuf/empty.proto".to_string()));
}

#[test]
fn scalar_method_parameter_translates() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "svc",
        &[("s.gunk", "package svc\n\ntype S interface { Ping(x int) }\n")],
    );
    let l = Loader::new(tmp.path(), &["svc".to_string()]).unwrap();
    let pfile = &l.all_proto()["svc/s.gunk"];
    let m = &pfile.service[0].method[0];
    assert_eq!(m.input_type.as_deref(), Some("int"));
    assert_eq!(m.output_type.as_deref(), Some(".google.protobuf.Empty"));
}

#[test]
fn enum_with_three_values() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "paint",
        &[(
            "color.gunk",
            "package paint\n\ntype Color int\n\nconst (\n\tRed Color = iota\n\tGreen\n\tBlue\n)\n",
        )],
    );
    let l = Loader::new(tmp.path(), &["paint".to_string()]).unwrap();
    let pfile = &l.all_proto()["paint/color.gunk"];
    let enm = &pfile.enum_type[0];
    assert_eq!(enm.name.as_deref(), Some("Color"));
    let values: Vec<(Option<&str>, Option<i32>)> = enm
        .value
        .iter()
        .map(|v| (v.name.as_deref(), v.number))
        .collect();
    assert_eq!(
        values,
        vec![
            (Some("Red"), Some(0)),
            (Some("Green"), Some(1)),
            (Some("Blue"), Some(2)),
        ]
    );
}

#[test]
fn http_annotation_sets_method_options() {
    let tmp = TempDir::new().unwrap();
    write_pkg(tmp.path(), "github.com/gunk/opt/http", &[("http.gunk", HTTP_MATCH_GUNK)]);
    write_pkg(
        tmp.path(),
        "svc",
        &[(
            "s.gunk",
            "\
package svc

import \"github.com/gunk/opt/http\"

type Req struct {}

type Resp struct {}

type S interface {
\t// Ping pings.
\t//
\t// +gunk http.Match{Method: \"POST\", Path: \"/ping\", Body: \"*\"}
\tPing(Req) Resp
}
",
        )],
    );
    let l = Loader::new(tmp.path(), &["svc".to_string()]).unwrap();
    let pfile = &l.all_proto()["svc/s.gunk"];
    let m = &pfile.service[0].method[0];
    assert_eq!(m.input_type.as_deref(), Some(".svc.Req"));
    assert_eq!(m.output_type.as_deref(), Some(".svc.Resp"));
    let rule = m.options.as_ref().unwrap().http.as_ref().unwrap();
    assert_eq!(rule.body, "*");
    assert_eq!(rule.pattern, Some(http_rule::Pattern::Post("/ping".into())));

    // Only the prose lands in source-code-info.
    let info = pfile.source_code_info.as_ref().unwrap();
    let loc = info
        .location
        .iter()
        .find(|l| l.path == vec![6, 0, 2, 0])
        .unwrap();
    assert_eq!(loc.leading_comments.as_deref(), Some("Ping pings."));

    // The non-blank import contributes its files to the dependency list.
    assert!(pfile
        .dependency
        .contains(&"github.com/gunk/opt/http/http.gunk".to_string()));
}

#[test]
fn cross_package_reference() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "models",
        &[("t.gunk", "package models\n\ntype T struct { Id int `pb:\"1\"` }\n")],
    );
    write_pkg(
        tmp.path(),
        "api",
        &[(
            "api.gunk",
            "package api\n\nimport \"models\"\n\ntype Wrap struct { Inner models.T `pb:\"1\"` }\n",
        )],
    );
    let l = Loader::new(tmp.path(), &["api".to_string()]).unwrap();
    let pfile = &l.all_proto()["api/api.gunk"];
    let field = &pfile.message_type[0].field[0];
    assert_eq!(field.r#type, Some(FieldType::Message as i32));
    assert_eq!(field.type_name.as_deref(), Some(".models.T"));
    assert!(pfile.dependency.contains(&"models/t.gunk".to_string()));
    // The imported package was translated before the importer finished.
    assert!(l.all_proto().contains_key("models/t.gunk"));
}

#[test]
fn sibling_files_depend_on_each_other() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "multi",
        &[
            ("a.gunk", "package multi\n\ntype A struct { X int `pb:\"1\"` }\n"),
            ("b.gunk", "package multi\n\ntype B struct { A A `pb:\"1\"` }\n"),
        ],
    );
    let l = Loader::new(tmp.path(), &["multi".to_string()]).unwrap();
    assert!(l.all_proto()["multi/a.gunk"]
        .dependency
        .contains(&"multi/b.gunk".to_string()));
    assert!(l.all_proto()["multi/b.gunk"]
        .dependency
        .contains(&"multi/a.gunk".to_string()));
}

#[test]
fn blank_imports_add_no_dependencies() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "models",
        &[("t.gunk", "package models\n\ntype T struct {}\n")],
    );
    write_pkg(
        tmp.path(),
        "api",
        &[(
            "api.gunk",
            "package api\n\nimport _ \"models\"\n\ntype W struct {}\n",
        )],
    );
    let l = Loader::new(tmp.path(), &["api".to_string()]).unwrap();
    assert!(l.all_proto()["api/api.gunk"].dependency.is_empty());
}

#[test]
fn repeated_field_from_slice() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "svc",
        &[(
            "m.gunk",
            "package svc\n\ntype M struct { Names []string `pb:\"1\"` }\n",
        )],
    );
    let l = Loader::new(tmp.path(), &["svc".to_string()]).unwrap();
    let field = &l.all_proto()["svc/m.gunk"].message_type[0].field[0];
    assert_eq!(field.label, Some(Label::Repeated as i32));
    assert_eq!(field.r#type, Some(FieldType::String as i32));
}

#[test]
fn translation_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    write_pkg(tmp.path(), "github.com/gunk/opt/http", &[("http.gunk", HTTP_MATCH_GUNK)]);
    write_pkg(
        tmp.path(),
        "svc",
        &[
            (
                "a.gunk",
                "package svc\n\ntype Color int\n\nconst (\n\tRed Color = iota\n\tGreen\n)\n",
            ),
            (
                "b.gunk",
                "\
package svc

import \"github.com/gunk/opt/http\"

type Req struct {}

type S interface {
\t// +gunk http.Match{Path: \"/go\"}
\tGo(Req)
}
",
            ),
        ],
    );
    let paths = vec!["svc".to_string()];
    let first = Loader::new(tmp.path(), &paths).unwrap();
    let second = Loader::new(tmp.path(), &paths).unwrap();
    assert_eq!(first.all_proto(), second.all_proto());

    use prost::Message;
    let a = first.request_for_pkg("plugins=grpc", "svc").encode_to_vec();
    let b = second.request_for_pkg("plugins=grpc", "svc").encode_to_vec();
    assert_eq!(a, b);
}

#[test]
fn request_files_are_sorted() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "svc",
        &[
            ("z.gunk", "package svc\n\ntype Z struct {}\n"),
            ("a.gunk", "package svc\n\ntype A struct {}\n"),
        ],
    );
    let l = Loader::new(tmp.path(), &["svc".to_string()]).unwrap();
    let req = l.request_for_pkg("plugins=grpc", "svc");
    assert_eq!(
        req.file_to_generate,
        vec!["svc/a.gunk".to_string(), "svc/z.gunk".to_string()]
    );
    assert_eq!(req.parameter.as_deref(), Some("plugins=grpc"));
    assert_eq!(req.proto_file.len(), 2);
}

#[test]
fn fixed_length_array_is_rejected() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "svc",
        &[("m.gunk", "package svc\n\ntype M struct { X [4]int `pb:\"1\"` }\n")],
    );
    let err = Loader::new(tmp.path(), &["svc".to_string()]).unwrap_err();
    assert!(
        err.to_string().contains("unsupported field type"),
        "got {err}"
    );
}

#[test]
fn two_results_are_rejected() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "svc",
        &[(
            "s.gunk",
            "package svc\n\ntype R struct {}\n\ntype S interface { Get() (R, R) }\n",
        )],
    );
    let err = Loader::new(tmp.path(), &["svc".to_string()]).unwrap_err();
    assert!(err.to_string().contains("at most one result"), "got {err}");
}

#[test]
fn unknown_selector_type_is_rejected() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "models",
        &[("t.gunk", "package models\n\ntype T struct {}\n")],
    );
    write_pkg(
        tmp.path(),
        "api",
        &[(
            "api.gunk",
            "package api\n\nimport \"models\"\n\ntype W struct { X models.Missing `pb:\"1\"` }\n",
        )],
    );
    let err = Loader::new(tmp.path(), &["api".to_string()]).unwrap_err();
    assert!(
        err.to_string().contains("undefined: models.Missing"),
        "got {err}"
    );
}

#[test]
fn unparseable_tag_is_a_parse_error() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "svc",
        &[(
            "s.gunk",
            "package svc\n\ntype S interface {\n\t// +gunk http.Match{Method:\n\tPing()\n}\n",
        )],
    );
    let err = Loader::new(tmp.path(), &["svc".to_string()]).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("invalid gunk tag"), "got {msg}");
    assert!(msg.contains("svc/s.gunk:4:"), "got {msg}");
}

#[test]
fn import_cycles_are_reported() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "a",
        &[("a.gunk", "package a\n\nimport \"b\"\n\ntype A struct { X b.B `pb:\"1\"` }\n")],
    );
    write_pkg(
        tmp.path(),
        "b",
        &[("b.gunk", "package b\n\nimport \"a\"\n\ntype B struct { X a.A `pb:\"1\"` }\n")],
    );
    let err = Loader::new(tmp.path(), &["a".to_string()]).unwrap_err();
    assert!(matches!(err, Error::ImportCycle { .. }), "got {err}");
}

#[test]
fn package_name_mismatch_is_rejected() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "svc",
        &[
            ("a.gunk", "package svc\n\ntype A struct {}\n"),
            ("b.gunk", "package other\n\ntype B struct {}\n"),
        ],
    );
    let err = Loader::new(tmp.path(), &["svc".to_string()]).unwrap_err();
    assert!(matches!(err, Error::PackageNameMismatch { .. }), "got {err}");
}

#[test]
fn missing_directory_is_an_io_error() {
    let tmp = TempDir::new().unwrap();
    let err = Loader::new(tmp.path(), &["nope".to_string()]).unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "got {err}");
}

#[test]
fn wildcard_patterns_find_nested_packages() {
    let tmp = TempDir::new().unwrap();
    write_pkg(tmp.path(), "a", &[("a.gunk", "package a\n")]);
    write_pkg(tmp.path(), "a/b", &[("b.gunk", "package b\n")]);
    write_pkg(tmp.path(), "c", &[("notes.txt", "not gunk")]);
    let paths = resolve_patterns(tmp.path(), &["./...".to_string()]).unwrap();
    assert_eq!(paths, vec!["a".to_string(), "a/b".to_string()]);
}

#[test]
fn import_is_a_cache_hit_the_second_time() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "models",
        &[("t.gunk", "package models\n\ntype T struct {}\n")],
    );
    let mut l = Loader::new(tmp.path(), &[]).unwrap();
    let first = l.import("models").unwrap();
    let second = l.import("models").unwrap();
    assert!(std::rc::Rc::ptr_eq(&first, &second));
}

// Requires a protoc binary; skipped otherwise, so the suite runs in
// minimal environments.
#[test]
fn protoc_materializes_well_known_imports() {
    if std::process::Command::new("protoc")
        .arg("--version")
        .output()
        .is_err()
    {
        eprintln!("protoc not found; skipping well-known import test");
        return;
    }
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "svc",
        &[("s.gunk", "package svc\n\ntype S interface { Ping() }\n")],
    );
    let mut l = Loader::new(tmp.path(), &["svc".to_string()]).unwrap();
    l.load_proto_deps().unwrap();
    let empty = &l.all_proto()["google/protobuf/empty.proto"];
    assert_eq!(empty.package.as_deref(), Some("google.protobuf"));
    assert!(empty
        .message_type
        .iter()
        .any(|m| m.name.as_deref() == Some("Empty")));
    // The synthetic stub is removed on the way out.
    assert!(!tmp.path().join("gunk-proto").exists());
}
