//! Generator driver tests using a stub plugin process.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use gunk::descriptor::{code_generator_response, CodeGeneratorResponse};
use gunk::{Generator, Loader};
use prost::Message;
use tempfile::TempDir;

fn write_pkg(root: &Path, pkg_dir: &str, files: &[(&str, &str)]) {
    let dir = root.join(pkg_dir);
    fs::create_dir_all(&dir).unwrap();
    for (name, src) in files {
        fs::write(dir.join(name), src).unwrap();
    }
}

/// Creates an executable that ignores its stdin and emits a canned
/// CodeGeneratorResponse, standing in for protoc-gen-go.
fn stub_plugin(dir: &Path, resp: &CodeGeneratorResponse) -> String {
    let resp_path = dir.join("resp.bin");
    fs::write(&resp_path, resp.encode_to_vec()).unwrap();
    let script_path = dir.join("stub-gen");
    fs::write(
        &script_path,
        format!("#!/bin/sh\nexec cat {}\n", resp_path.display()),
    )
    .unwrap();
    fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755)).unwrap();
    script_path.to_string_lossy().into_owned()
}

#[test]
fn generated_files_land_next_to_sources() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "svc",
        &[("echo.gunk", "package svc\n\ntype M struct { X int `pb:\"1\"` }\n")],
    );
    let loader = Loader::new(tmp.path(), &["svc".to_string()]).unwrap();

    let resp = CodeGeneratorResponse {
        error: None,
        file: vec![code_generator_response::File {
            name: Some("svc/echo.gunk.pb.go".to_string()),
            insertion_point: None,
            content: Some("// Code generated by stub-gen. DO NOT EDIT.\n".to_string()),
        }],
    };
    let generator = Generator {
        command: stub_plugin(tmp.path(), &resp),
        parameter: "plugins=grpc".to_string(),
    };
    generator.generate_pkg(&loader, "svc").unwrap();

    let out_path = tmp.path().join("svc/echo.pb.go");
    let content = fs::read_to_string(&out_path).unwrap();
    assert!(content.contains("stub-gen"));
    let mode = fs::metadata(&out_path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o644);
}

#[test]
fn plugin_reported_error_aborts_the_run() {
    let tmp = TempDir::new().unwrap();
    write_pkg(
        tmp.path(),
        "svc",
        &[("echo.gunk", "package svc\n\ntype M struct { X int `pb:\"1\"` }\n")],
    );
    let loader = Loader::new(tmp.path(), &["svc".to_string()]).unwrap();

    let resp = CodeGeneratorResponse {
        error: Some("boom".to_string()),
        file: Vec::new(),
    };
    let generator = Generator {
        command: stub_plugin(tmp.path(), &resp),
        parameter: String::new(),
    };
    let err = generator.generate_pkg(&loader, "svc").unwrap_err();
    assert!(err.to_string().contains("boom"), "got {err}");
}

#[test]
fn empty_package_spawns_no_plugin() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("empty")).unwrap();
    let loader = Loader::new(tmp.path(), &["empty".to_string()]).unwrap();
    // The command does not exist; the driver must not try to spawn it.
    let generator = Generator {
        command: "definitely-not-a-plugin".to_string(),
        parameter: String::new(),
    };
    generator.generate_pkg(&loader, "empty").unwrap();
}
