//! Package loading and caching.
//!
//! The loader resolves patterns to import paths, reads the `.gunk` files of
//! each package, parses and type-checks them, and drives translation so
//! that a package's descriptors exist before any importer's translation
//! needs them. It is also the import oracle handed to the type checker:
//! importing a package loads and translates it depth-first, with a cache
//! keyed by import path so every package is processed exactly once.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;
use walkdir::WalkDir;

use crate::ast::{AstArena, File};
use crate::check::{self, Importer, TypedPackage};
use crate::descriptor::{CodeGeneratorRequest, FileDescriptorProto};
use crate::error::{Error, Result};
use crate::parser;
use crate::protoc;
use crate::translate;

/// A parsed (but not yet type-checked) gunk package.
#[derive(Debug)]
pub struct ParsedPackage {
    /// Import path, slash-separated, relative to the loader root.
    pub path: String,
    /// Short package name from the files' `package` clauses.
    pub name: String,
    /// Resolved filesystem directory.
    pub dir: PathBuf,
    /// Arena owning every AST node of every file in the package.
    pub arena: AstArena,
    /// Stable relative name (`<path>/<basename>`) -> parsed file.
    pub files: BTreeMap<String, File>,
}

/// Expands patterns to canonical package import paths, sorted and
/// deduplicated. `./`-prefixed patterns name directories under `wd`;
/// patterns ending in `...` walk the tree for directories holding `.gunk`
/// files; anything else is taken as a bare import path.
pub fn resolve_patterns(wd: &Path, patterns: &[String]) -> Result<Vec<String>> {
    let mut out = BTreeSet::new();
    for pattern in patterns {
        if let Some(prefix) = pattern.strip_suffix("...") {
            let base = normalize(prefix);
            let base_dir = if base.is_empty() {
                wd.to_path_buf()
            } else {
                wd.join(&base)
            };
            for entry in WalkDir::new(&base_dir).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                if entry.path().extension().and_then(|e| e.to_str()) != Some("gunk") {
                    continue;
                }
                let Some(dir) = entry.path().parent() else {
                    continue;
                };
                let Ok(rel) = dir.strip_prefix(wd) else {
                    continue;
                };
                let path = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if !path.is_empty() {
                    out.insert(path);
                }
            }
        } else {
            let path = normalize(pattern);
            if path.is_empty() {
                return Err(Error::Pattern {
                    pattern: pattern.clone(),
                });
            }
            out.insert(path);
        }
    }
    Ok(out.into_iter().collect())
}

fn normalize(pattern: &str) -> String {
    let p = pattern.strip_prefix("./").unwrap_or(pattern);
    p.trim_start_matches('/')
        .trim_end_matches('/')
        .trim_end_matches('.')
        .trim_end_matches('/')
        .to_string()
}

/// Loads gunk packages and owns all per-run state: the parsed and typed
/// package caches, the to-generate sets, the descriptor registry and the
/// reverse lookup from descriptor names to on-disk sources.
#[derive(Debug)]
pub struct Loader {
    wd: PathBuf,
    parsed: HashMap<String, Rc<ParsedPackage>>,
    typed: HashMap<String, Rc<TypedPackage>>,
    translated: BTreeSet<String>,
    to_gen: BTreeMap<String, BTreeSet<String>>,
    all_proto: BTreeMap<String, FileDescriptorProto>,
    orig_paths: HashMap<String, PathBuf>,
    // Packages currently being added, for import cycle detection.
    loading: Vec<String>,
}

struct TypedCache<'a>(&'a HashMap<String, Rc<TypedPackage>>);

impl Importer for TypedCache<'_> {
    fn import(&self, path: &str) -> Option<Rc<TypedPackage>> {
        self.0.get(path).cloned()
    }
}

impl Loader {
    /// Creates a loader rooted at `wd` and loads and translates every
    /// package in `paths`, plus their transitive imports.
    pub fn new(wd: impl Into<PathBuf>, paths: &[String]) -> Result<Loader> {
        let mut l = Loader {
            wd: wd.into(),
            parsed: HashMap::new(),
            typed: HashMap::new(),
            translated: BTreeSet::new(),
            to_gen: BTreeMap::new(),
            all_proto: BTreeMap::new(),
            orig_paths: HashMap::new(),
            loading: Vec::new(),
        };
        for path in paths {
            l.add_pkg(path)?;
            l.translate_pkg(path)?;
        }
        Ok(l)
    }

    /// Materializes well-known proto dependencies (e.g.
    /// `google/protobuf/empty.proto`) into the registry via `protoc`.
    pub fn load_proto_deps(&mut self) -> Result<()> {
        protoc::load_missing(&self.wd, &mut self.all_proto)
    }

    /// The import oracle: loads and translates `path` if needed, then
    /// returns its typed package. A second call for the same path is a
    /// cache hit.
    pub fn import(&mut self, path: &str) -> Result<Rc<TypedPackage>> {
        if let Some(typed) = self.typed.get(path).cloned() {
            if !self.translated.contains(path) {
                self.translate_pkg(path)?;
            }
            return Ok(typed);
        }
        self.add_pkg(path)?;
        self.translate_pkg(path)?;
        match self.typed.get(path) {
            Some(typed) => Ok(typed.clone()),
            None => Err(Error::ImportCycle {
                path: path.to_string(),
            }),
        }
    }

    /// Loads and type-checks one package: reads `*.gunk` from its directory,
    /// parses every file, enforces the single-package-name invariant,
    /// recursively imports its dependencies and runs the checker.
    /// Idempotent per import path.
    fn add_pkg(&mut self, path: &str) -> Result<()> {
        if self.loading.iter().any(|p| p == path) {
            return Err(Error::ImportCycle {
                path: path.to_string(),
            });
        }
        if self.parsed.contains_key(path) {
            return Ok(());
        }
        self.loading.push(path.to_string());
        let result = self.add_pkg_inner(path);
        self.loading.pop();
        result
    }

    fn add_pkg_inner(&mut self, path: &str) -> Result<()> {
        let dir = self.wd.join(path);
        debug!(path, "loading gunk package");

        let entries = fs::read_dir(&dir).map_err(|e| Error::io(&dir, e))?;
        let mut matches: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&dir, e))?;
            let p = entry.path();
            if p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("gunk") {
                matches.push(p);
            }
        }
        matches.sort();

        let mut arena = AstArena::new();
        let mut files: BTreeMap<String, File> = BTreeMap::new();
        let mut pkg_name: Option<String> = None;
        for abs in matches {
            let src = fs::read_to_string(&abs).map_err(|e| Error::io(&abs, e))?;
            let base = abs
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            // The relative name keeps descriptors independent of the
            // working directory the tool runs from.
            let rel = format!("{path}/{base}");
            let file = parser::parse_file(&mut arena, &rel, &src)?;
            match &pkg_name {
                None => pkg_name = Some(file.package.node.clone()),
                Some(want) if *want != file.package.node => {
                    return Err(Error::PackageNameMismatch {
                        path: path.to_string(),
                        want: want.clone(),
                        got: file.package.node.clone(),
                    });
                }
                Some(_) => {}
            }
            self.orig_paths.insert(rel.clone(), abs);
            files.insert(rel, file);
        }
        let name = pkg_name.unwrap_or_else(|| "default".to_string());

        let imports: BTreeSet<String> = files
            .values()
            .flat_map(|f| f.imports().map(|i| i.path.node.clone()))
            .collect();

        let pkg = Rc::new(ParsedPackage {
            path: path.to_string(),
            name: name.clone(),
            dir,
            arena,
            files,
        });
        self.parsed.insert(path.to_string(), pkg.clone());

        // Depth-first: every import is fully loaded and translated before
        // this package is checked against it.
        for q in &imports {
            self.import(q)?;
        }

        let typed = check::check_package(
            path,
            &name,
            &pkg.arena,
            &pkg.files,
            &TypedCache(&self.typed),
        )?;
        self.typed.insert(path.to_string(), Rc::new(typed));
        self.to_gen.entry(path.to_string()).or_default();
        Ok(())
    }

    /// Translates every file of a loaded package into the descriptor
    /// registry, then runs the dependency post-pass: each file depends on
    /// the other files of its package and on every file of every non-blank
    /// imported package.
    fn translate_pkg(&mut self, path: &str) -> Result<()> {
        let Some(pkg) = self.parsed.get(path).cloned() else {
            return Ok(());
        };
        let Some(typed) = self.typed.get(path).cloned() else {
            return Ok(());
        };

        let to_gen = self.to_gen.entry(path.to_string()).or_default();
        for rel in pkg.files.keys() {
            to_gen.insert(rel.clone());
        }
        if !self.translated.insert(path.to_string()) {
            return Ok(());
        }
        debug!(path, files = pkg.files.len(), "translating gunk package");

        for (rel, file) in &pkg.files {
            if self.all_proto.contains_key(rel) {
                continue;
            }
            let pfile =
                translate::translate_file(&pkg.arena, &typed, &TypedCache(&self.typed), file)?;
            self.all_proto.insert(rel.clone(), pfile);
        }

        for (rel, file) in &pkg.files {
            let mut deps: Vec<String> = Vec::new();
            for oname in pkg.files.keys() {
                if oname != rel {
                    deps.push(oname.clone());
                }
            }
            for imp in file.imports() {
                if imp.is_blank(&pkg.arena) {
                    continue;
                }
                if let Some(other) = self.parsed.get(&imp.path.node) {
                    for oname in other.files.keys() {
                        deps.push(oname.clone());
                    }
                }
            }
            if let Some(pfile) = self.all_proto.get_mut(rel) {
                for dep in deps {
                    if !pfile.dependency.contains(&dep) {
                        pfile.dependency.push(dep);
                    }
                }
            }
        }
        Ok(())
    }

    /// Builds the code generator request for one package: its sorted file
    /// names plus every descriptor known to the registry.
    pub fn request_for_pkg(&self, parameter: &str, path: &str) -> CodeGeneratorRequest {
        let mut req = CodeGeneratorRequest {
            parameter: Some(parameter.to_string()),
            ..Default::default()
        };
        if let Some(files) = self.to_gen.get(path) {
            // BTreeSet iteration is already sorted, which keeps the output
            // deterministic: the first file in lexical order receives the
            // package-level doc comments.
            req.file_to_generate = files.iter().cloned().collect();
        }
        for pfile in self.all_proto.values() {
            req.proto_file.push(pfile.clone());
        }
        req
    }

    pub fn wd(&self) -> &Path {
        &self.wd
    }

    /// The descriptor registry, keyed by stable relative name.
    pub fn all_proto(&self) -> &BTreeMap<String, FileDescriptorProto> {
        &self.all_proto
    }

    /// Reverse lookup from a descriptor name to the on-disk source file.
    pub fn orig_path(&self, rel: &str) -> Option<&Path> {
        self.orig_paths.get(rel).map(|p| p.as_path())
    }

    /// Files scheduled for generation in one package.
    pub fn to_generate(&self, path: &str) -> Option<&BTreeSet<String>> {
        self.to_gen.get(path)
    }

    pub fn typed_package(&self, path: &str) -> Option<Rc<TypedPackage>> {
        self.typed.get(path).cloned()
    }
}
