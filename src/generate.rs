//! Driving generator plugins over translated packages.
//!
//! A generator plugin speaks the standard `CodeGeneratorRequest` /
//! `CodeGeneratorResponse` protobuf protocol on its stdio. For each
//! requested package the driver marshals a request, spawns the plugin,
//! and writes the returned files next to their gunk sources.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use prost::Message;
use tracing::{debug, info};

use crate::descriptor::CodeGeneratorResponse;
use crate::error::{Error, Result};
use crate::loader::{resolve_patterns, Loader};

/// A code generator plugin invocation: the child command and the parameter
/// string passed through the request.
#[derive(Debug, Clone)]
pub struct Generator {
    pub command: String,
    pub parameter: String,
}

impl Default for Generator {
    fn default() -> Self {
        Generator {
            command: "protoc-gen-go".to_string(),
            parameter: "plugins=grpc".to_string(),
        }
    }
}

/// Loads the gunk packages matched by `patterns` under `wd` and generates
/// code for them with the default generator. Generated files are written
/// to the same directory, next to the source gunk files.
pub fn run(wd: impl AsRef<Path>, patterns: &[String]) -> Result<()> {
    let wd = wd.as_ref();
    let paths = resolve_patterns(wd, patterns)?;
    if paths.is_empty() {
        return Err(Error::NoPackages);
    }
    let mut loader = Loader::new(wd, &paths)?;
    loader.load_proto_deps()?;
    let generator = Generator::default();
    for path in &paths {
        generator.generate_pkg(&loader, path)?;
    }
    Ok(())
}

impl Generator {
    /// Runs the plugin over one package. The child's stderr is forwarded;
    /// a non-zero exit or a populated response error aborts the run.
    pub fn generate_pkg(&self, loader: &Loader, path: &str) -> Result<()> {
        let req = loader.request_for_pkg(&self.parameter, path);
        if req.file_to_generate.is_empty() {
            debug!(path, "package has no files to generate");
            return Ok(());
        }
        info!(path, command = %self.command, "generating package");

        let external = |message: String| Error::External {
            program: self.command.clone(),
            message,
        };

        let bytes = req.encode_to_vec();
        let mut child = Command::new(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| external(e.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&bytes)
                .map_err(|e| external(e.to_string()))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| external(e.to_string()))?;
        if !output.status.success() {
            return Err(external(format!("exit status {}", output.status)));
        }

        let resp = CodeGeneratorResponse::decode(output.stdout.as_slice())?;
        if let Some(message) = resp.error.filter(|e| !e.is_empty()) {
            return Err(external(message));
        }
        for rf in &resp.file {
            let Some(name) = rf.name.as_deref() else {
                continue;
            };
            let out_path = self.output_path(loader, name)?;
            let content = rf.content.as_deref().unwrap_or("");
            debug!(name, out = %out_path.display(), "writing generated file");
            fs::write(&out_path, content).map_err(|e| Error::io(&out_path, e))?;
            set_mode_0644(&out_path)?;
        }
        Ok(())
    }

    /// Maps a generated file name like `util/echo.gunk.pb.go` back to a
    /// path next to the original source, with the `.gunk` infix stripped:
    /// `<dir>/echo.pb.go`.
    fn output_path(&self, loader: &Loader, name: &str) -> Result<PathBuf> {
        let external = |message: String| Error::External {
            program: self.command.clone(),
            message,
        };
        let idx = name
            .find(".gunk")
            .ok_or_else(|| external(format!("unexpected generated file name {name:?}")))?;
        let in_name = &name[..idx + ".gunk".len()];
        let suffix = &name[idx + ".gunk".len()..];
        let orig = loader
            .orig_path(in_name)
            .ok_or_else(|| external(format!("no gunk source for generated file {name:?}")))?;
        let base = orig
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let new_base = match base.strip_suffix(".gunk") {
            Some(stem) => format!("{stem}{suffix}"),
            None => format!("{base}{suffix}"),
        };
        Ok(orig.with_file_name(new_base))
    }
}

#[cfg(unix)]
fn set_mode_0644(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
        .map_err(|e| Error::io(path, e))
}

#[cfg(not(unix))]
fn set_mode_0644(_path: &Path) -> Result<()> {
    Ok(())
}
