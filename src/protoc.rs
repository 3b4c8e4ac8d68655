//! Materialization of well-known proto dependencies.
//!
//! Translation can reference proto files nobody wrote, such as
//! `google/protobuf/empty.proto`. Rather than bundling their descriptors,
//! a synthetic stub importing each missing file is fed to `protoc
//! --include_imports`, which locates the files and hands back a
//! `FileDescriptorSet` to merge into the registry.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use prost::Message;
use tracing::debug;

use crate::descriptor::{FileDescriptorProto, FileDescriptorSet};
use crate::error::{Error, Result};

/// Name of the synthetic stub file written to the working directory. It is
/// removed again on every exit path.
const STUB_NAME: &str = "gunk-proto";

/// Resolves every dependency referenced by a registry descriptor but not
/// present in the registry. A run with nothing missing never invokes
/// `protoc`.
pub fn load_missing(
    wd: &Path,
    all_proto: &mut BTreeMap<String, FileDescriptorProto>,
) -> Result<()> {
    let mut missing: BTreeSet<String> = BTreeSet::new();
    for pfile in all_proto.values() {
        for dep in &pfile.dependency {
            if !all_proto.contains_key(dep) {
                missing.insert(dep.clone());
            }
        }
    }
    if missing.is_empty() {
        return Ok(());
    }
    debug!(count = missing.len(), "resolving well-known proto imports");

    let stub_path = wd.join(STUB_NAME);
    let mut stub = String::from("syntax = \"proto3\";\n\n");
    for dep in &missing {
        stub.push_str("import \"");
        stub.push_str(dep);
        stub.push_str("\";\n");
    }
    fs::write(&stub_path, stub).map_err(|e| Error::io(&stub_path, e))?;
    let _stub_guard = RemoveOnDrop(stub_path);

    // protoc writes the descriptor set to a file; a temp file is the
    // portable stand-in for /dev/stdout.
    let out_file = tempfile::NamedTempFile::new().map_err(|e| Error::io("descriptor-set", e))?;
    let output = Command::new("protoc")
        .current_dir(wd)
        .arg("--include_imports")
        .arg(format!("-o{}", out_file.path().display()))
        .arg(STUB_NAME)
        .output()
        .map_err(|e| Error::External {
            program: "protoc".to_string(),
            message: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(Error::External {
            program: "protoc".to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let bytes = fs::read(out_file.path()).map_err(|e| Error::io(out_file.path(), e))?;
    let fset = FileDescriptorSet::decode(bytes.as_slice())?;
    for pfile in fset.file {
        let Some(name) = pfile.name.clone() else {
            continue;
        };
        if name == STUB_NAME {
            continue;
        }
        all_proto.insert(name, pfile);
    }
    Ok(())
}

struct RemoveOnDrop(PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_missing_deps_is_a_no_op() {
        let mut all = BTreeMap::new();
        all.insert(
            "a/a.gunk".to_string(),
            FileDescriptorProto {
                name: Some("a/a.gunk".into()),
                dependency: vec!["a/b.gunk".into()],
                ..Default::default()
            },
        );
        all.insert(
            "a/b.gunk".to_string(),
            FileDescriptorProto {
                name: Some("a/b.gunk".into()),
                ..Default::default()
            },
        );
        // Both dependencies resolve inside the registry, so no stub is
        // written and protoc is never spawned.
        load_missing(Path::new("/nonexistent-dir"), &mut all).unwrap();
        assert_eq!(all.len(), 2);
    }
}
