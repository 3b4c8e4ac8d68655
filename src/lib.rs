//! Gunk is a frontend syntax for Protocol Buffers: service, message and
//! enum definitions are written in a strict subset of Go syntax and
//! compiled into `FileDescriptorProto`s, which are then driven through
//! standard protobuf code generators.
//!
//! The pipeline: [`loader::resolve_patterns`] expands patterns to package
//! import paths; [`loader::Loader`] parses ([`parser`]), type-checks
//! ([`check`]) and translates ([`translate`]) each package and its
//! transitive imports, depth-first and cached; well-known proto
//! dependencies are materialized through an external `protoc` invocation
//! ([`Loader::load_proto_deps`]); and [`generate`] marshals per-package
//! requests to generator plugins.

pub mod annotations;
pub mod ast;
pub mod check;
pub mod descriptor;
pub mod error;
pub mod generate;
pub mod lexer;
pub mod loader;
pub mod parser;
mod protoc;
pub mod tags;
pub mod translate;

pub use error::{Error, Result};
pub use generate::{run, Generator};
pub use loader::Loader;
