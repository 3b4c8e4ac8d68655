use std::path::PathBuf;

use thiserror::Error;

/// Compact byte-span used across the front end.
///
/// The lexer and parser work with `usize` offsets; spans store `u32` for
/// compactness. Inputs larger than 4GiB are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32, // exclusive
}

impl Span {
    #[inline]
    pub const fn new(start: usize, end: usize) -> Self {
        let s = if start > u32::MAX as usize {
            u32::MAX
        } else {
            start as u32
        };
        let e = if end > u32::MAX as usize {
            u32::MAX
        } else {
            end as u32
        };
        Self { start: s, end: e }
    }

    pub const fn from_range(range: std::ops::Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// A resolved source position, rendered as `file:line:col`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pos {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// Byte-offset to line/column translation for one source file.
///
/// Lines and columns are 1-based; columns count bytes, like `go/token`.
#[derive(Debug, Clone, Default)]
pub struct LineMap {
    // Byte offset of the start of each line.
    starts: Vec<u32>,
}

impl LineMap {
    pub fn new(src: &str) -> Self {
        let mut starts = vec![0u32];
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i as u32 + 1);
            }
        }
        Self { starts }
    }

    /// 1-based line number of a byte offset.
    pub fn line(&self, offset: u32) -> u32 {
        match self.starts.binary_search(&offset) {
            Ok(i) => i as u32 + 1,
            Err(i) => i as u32,
        }
    }

    /// 1-based (line, column) of a byte offset.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let line = self.line(offset);
        let start = self.starts[line as usize - 1];
        (line, offset - start + 1)
    }

    pub fn pos(&self, file: &str, offset: u32) -> Pos {
        let (line, col) = self.line_col(offset);
        Pos {
            file: file.to_string(),
            line,
            col,
        }
    }
}

/// All the ways a run can fail. Every variant is fatal; the first error
/// detected aborts the run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed source or malformed gunk tag expression.
    #[error("{pos}: {message}")]
    Parse { pos: Pos, message: String },

    /// Name resolution or type-check failure.
    #[error("{pos}: {message}")]
    Check { pos: Pos, message: String },

    /// Declarations outside the accepted language subset.
    #[error("{pos}: {message}")]
    Subset { pos: Pos, message: String },

    /// Unknown option types and malformed tag literals.
    #[error("{pos}: {message}")]
    Annotation { pos: Pos, message: String },

    #[error("import cycle through {path:?}")]
    ImportCycle { path: String },

    #[error("package {path:?}: files declare different package names: {want:?} and {got:?}")]
    PackageNameMismatch {
        path: String,
        want: String,
        got: String,
    },

    #[error("no Gunk packages to generate")]
    NoPackages,

    #[error("invalid pattern {pattern:?}")]
    Pattern { pattern: String },

    /// A child process (protoc or a generator plugin) failed; the message
    /// carries the child's stderr.
    #[error("error executing {program:?}: {message}")]
    External { program: String, message: String },

    #[error(transparent)]
    Decode(#[from] prost::DecodeError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_map_positions() {
        let lm = LineMap::new("ab\ncd\n\nef");
        assert_eq!(lm.line_col(0), (1, 1));
        assert_eq!(lm.line_col(1), (1, 2));
        assert_eq!(lm.line_col(3), (2, 1));
        assert_eq!(lm.line_col(6), (3, 1));
        assert_eq!(lm.line_col(7), (4, 1));
        assert_eq!(lm.line_col(8), (4, 2));
    }

    #[test]
    fn pos_display() {
        let lm = LineMap::new("x\ny\n");
        let pos = lm.pos("svc/svc.gunk", 2);
        assert_eq!(pos.to_string(), "svc/svc.gunk:2:1");
    }
}
