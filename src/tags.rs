//! Gunk tag extraction and struct-tag parsing.
//!
//! A doc comment group splits into prose and, if a line starting with
//! `+gunk` is present, a trailing expression covering the rest of the group.
//! Struct tags are backtick literals holding space-separated `key:"value"`
//! pairs; the `pb` key carries the proto field number.

use crate::ast::{AstArena, CommentGroup, ExprId, File, Spanned};
use crate::error::{Error, Pos, Result, Span};
use crate::parser;

/// The marker introducing a gunk tag inside a doc comment.
const GUNK_TAG_MARKER: &str = "+gunk";

/// A parsed `+gunk` expression, self-contained in its own arena.
#[derive(Debug)]
pub struct ParsedTag {
    pub arena: AstArena,
    pub root: ExprId,
    /// Position of the marker line in the enclosing file.
    pub pos: Pos,
}

/// Splits a doc comment group into its prose part and, when the `+gunk`
/// marker is present, the parsed tag expression. Without a marker this never
/// fails.
pub fn split_gunk_tag(file: &File, group: &CommentGroup) -> Result<(String, Option<ParsedTag>)> {
    // Flatten the group into (text, byte offset) lines so the marker can be
    // located back in the file.
    let mut lines: Vec<(String, u32)> = Vec::new();
    for c in &group.list {
        if let Some(rest) = c.text.strip_prefix("//") {
            let text = rest.strip_prefix(' ').unwrap_or(rest);
            lines.push((text.to_string(), c.span.start));
        } else {
            let body = c
                .text
                .strip_prefix("/*")
                .and_then(|s| s.strip_suffix("*/"))
                .unwrap_or(&c.text);
            let mut offset = c.span.start + 2;
            for line in body.split('\n') {
                lines.push((line.trim().to_string(), offset));
                offset += line.len() as u32 + 1;
            }
        }
    }

    let marker = lines
        .iter()
        .position(|(text, _)| text.trim_start().starts_with(GUNK_TAG_MARKER));
    let Some(idx) = marker else {
        return Ok((join_prose(&lines), None));
    };

    let prose = join_prose(&lines[..idx]);
    let (first, offset) = &lines[idx];
    let mut tag_src = first
        .trim_start()
        .strip_prefix(GUNK_TAG_MARKER)
        .unwrap_or("")
        .to_string();
    for (text, _) in &lines[idx + 1..] {
        tag_src.push('\n');
        tag_src.push_str(text);
    }

    let pos = file.line_map.pos(&file.name, *offset);
    let mut arena = AstArena::new();
    let root = match parser::parse_expr(&mut arena, &file.name, &tag_src) {
        Ok(root) => root,
        Err(err) => {
            // Re-key the error to the marker line of the original file.
            let message = match err {
                Error::Parse { message, .. } => message,
                other => other.to_string(),
            };
            return Err(Error::Parse {
                pos,
                message: format!("invalid gunk tag: {message}"),
            });
        }
    };
    Ok((prose, Some(ParsedTag { arena, root, pos })))
}

fn join_prose(lines: &[(String, u32)]) -> String {
    let mut texts: Vec<&str> = lines.iter().map(|(t, _)| t.as_str()).collect();
    while texts.first().is_some_and(|l| l.is_empty()) {
        texts.remove(0);
    }
    while texts.last().is_some_and(|l| l.is_empty()) {
        texts.pop();
    }
    texts.join("\n")
}

/// Looks up `key` in a struct-tag literal, following the `reflect.StructTag`
/// grammar: space-separated `name:"value"` pairs with interpreted-string
/// values.
pub fn tag_lookup(tag: &str, key: &str) -> Option<String> {
    let mut rest = tag;
    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            return None;
        }
        let colon = rest.find(':')?;
        let name = &rest[..colon];
        if name.is_empty() || name.contains(' ') || name.contains('"') {
            return None;
        }
        rest = &rest[colon + 1..];
        if !rest.starts_with('"') {
            return None;
        }
        // Find the closing quote, skipping escapes.
        let bytes = rest.as_bytes();
        let mut i = 1;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'"' => break,
                _ => i += 1,
            }
        }
        if i >= bytes.len() {
            return None;
        }
        let quoted = &rest[..=i];
        rest = &rest[i + 1..];
        if name == key {
            return crate::lexer::unquote_string(quoted).ok();
        }
    }
}

/// Extracts the proto field number from a struct field's tag.
pub fn proto_number(
    file: &File,
    field_name: &str,
    tag: Option<&Spanned<String>>,
    field_span: Span,
) -> Result<i32> {
    let err = |span: Span, message: String| Error::Subset {
        pos: file.line_map.pos(&file.name, span.start),
        message,
    };
    let Some(tag) = tag else {
        return Err(err(
            field_span,
            format!("field {field_name} is missing a pb:\"<num>\" tag"),
        ));
    };
    let Some(value) = tag_lookup(&tag.node, "pb") else {
        return Err(err(
            tag.span,
            format!("field {field_name} tag has no pb:\"<num>\" key"),
        ));
    };
    value.parse::<i32>().map_err(|_| {
        err(
            tag.span,
            format!("field {field_name} has invalid proto number {value:?}"),
        )
    })
}
