//! Lexer for the gunk subset of Go syntax.
//!
//! Built on Logos, with a wrapper iterator that performs Go semicolon
//! insertion. Unlike a general-purpose Go lexer, comments are emitted as
//! ordinary tokens: the parser needs them to build doc-comment groups.

use logos::{Lexer as LogosLexer, Logos};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    #[error("invalid token")]
    InvalidToken,
    #[error("unterminated comment")]
    UnterminatedComment,
}

impl Default for LexErrorKind {
    #[inline]
    fn default() -> Self {
        LexErrorKind::InvalidToken
    }
}

#[inline]
fn lex_block_comment(lex: &mut LogosLexer<'_, RawTok>) -> Result<(), LexErrorKind> {
    let rem = lex.remainder().as_bytes();
    match rem.windows(2).position(|w| w == b"*/") {
        Some(pos) => {
            lex.bump(pos + 2);
            Ok(())
        }
        None => {
            lex.bump(rem.len());
            Err(LexErrorKind::UnterminatedComment)
        }
    }
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(error = LexErrorKind)]
#[logos(skip r"[\t\x0C\v ]+")]
enum RawTok {
    #[regex(r"\r\n|\n|\r")]
    Newline,

    #[regex(r"//[^\n\r]*")]
    LineComment,
    #[token("/*", lex_block_comment)]
    BlockComment,

    // Keywords must come before Ident.
    #[token("package")]
    KwPackage,
    #[token("import")]
    KwImport,
    #[token("type")]
    KwType,
    #[token("struct")]
    KwStruct,
    #[token("interface")]
    KwInterface,
    #[token("const")]
    KwConst,
    #[token("func")]
    KwFunc,
    #[token("var")]
    KwVar,
    #[token("map")]
    KwMap,
    #[token("chan")]
    KwChan,

    // letter = '_' or Unicode letter; digit = Unicode Nd
    #[regex(r"[_\p{L}][_\p{L}\p{Nd}]*")]
    Ident,

    // Maximal munch over alphanumerics; the literal is validated when its
    // value is needed, so `0xZZ` fails there with a position instead of
    // splitting into two surprising tokens here.
    #[regex(r"[0-9][0-9a-zA-Z_]*")]
    Int,

    #[regex(r"`[^`]*`")]
    RawString,
    #[regex(r#""([^"\\\n\r]|\\.)*""#)]
    String,

    #[token("=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBrack,
    #[token("]")]
    RBrack,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,

    // Catch-all so Logos never has an ambiguity hole.
    #[regex(r".", priority = 0)]
    Error,
}

/// Public token type handed to the parser. Literal tokens borrow the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tok<'src> {
    Ident(&'src str),
    Int(&'src str),
    Str(&'src str),
    RawStr(&'src str),
    /// Comment text including its `//` or `/* */` markers.
    Comment(&'src str),

    KwPackage,
    KwImport,
    KwType,
    KwStruct,
    KwInterface,
    KwConst,
    KwFunc,
    KwVar,
    KwMap,
    KwChan,

    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,
    Amp,
    Pipe,
    Caret,

    LParen,
    RParen,
    LBrack,
    RBrack,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Colon,
    Dot,

    Error(LexErrorKind),
}

impl<'src> Tok<'src> {
    /// Short human-readable form for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => format!("identifier {s:?}"),
            Tok::Int(s) => format!("integer literal {s}"),
            Tok::Str(_) | Tok::RawStr(_) => "string literal".to_string(),
            Tok::Comment(_) => "comment".to_string(),
            Tok::KwPackage => "keyword \"package\"".to_string(),
            Tok::KwImport => "keyword \"import\"".to_string(),
            Tok::KwType => "keyword \"type\"".to_string(),
            Tok::KwStruct => "keyword \"struct\"".to_string(),
            Tok::KwInterface => "keyword \"interface\"".to_string(),
            Tok::KwConst => "keyword \"const\"".to_string(),
            Tok::KwFunc => "keyword \"func\"".to_string(),
            Tok::KwVar => "keyword \"var\"".to_string(),
            Tok::KwMap => "keyword \"map\"".to_string(),
            Tok::KwChan => "keyword \"chan\"".to_string(),
            Tok::Assign => "'='".to_string(),
            Tok::Plus => "'+'".to_string(),
            Tok::Minus => "'-'".to_string(),
            Tok::Star => "'*'".to_string(),
            Tok::Slash => "'/'".to_string(),
            Tok::Percent => "'%'".to_string(),
            Tok::Shl => "'<<'".to_string(),
            Tok::Shr => "'>>'".to_string(),
            Tok::Amp => "'&'".to_string(),
            Tok::Pipe => "'|'".to_string(),
            Tok::Caret => "'^'".to_string(),
            Tok::LParen => "'('".to_string(),
            Tok::RParen => "')'".to_string(),
            Tok::LBrack => "'['".to_string(),
            Tok::RBrack => "']'".to_string(),
            Tok::LBrace => "'{'".to_string(),
            Tok::RBrace => "'}'".to_string(),
            Tok::Comma => "','".to_string(),
            Tok::Semi => "';'".to_string(),
            Tok::Colon => "':'".to_string(),
            Tok::Dot => "'.'".to_string(),
            Tok::Error(kind) => kind.to_string(),
        }
    }
}

impl RawTok {
    #[inline]
    const fn can_insert_semicolon(self) -> bool {
        matches!(
            self,
            RawTok::Ident
                | RawTok::Int
                | RawTok::String
                | RawTok::RawString
                | RawTok::RParen
                | RawTok::RBrack
                | RawTok::RBrace
        )
    }
}

#[inline]
const fn first_newline_offset(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' || bytes[i] == b'\r' {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Lexer wrapper implementing Go semicolon insertion.
///
/// Yields `(start, token, end)` triples. A zero-width `Tok::Semi` is
/// inserted at every newline (or end of input) that follows a token after
/// which Go would insert one.
pub struct Lexer<'src> {
    logos: LogosLexer<'src, RawTok>,
    pending: Vec<(usize, Tok<'src>, usize)>,
    last_can_insert_semi: bool,
    src_len: usize,
    eof_done: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(input: &'src str) -> Self {
        Self {
            logos: RawTok::lexer(input),
            pending: Vec::new(),
            last_can_insert_semi: false,
            src_len: input.len(),
            eof_done: false,
        }
    }

    #[inline]
    fn emit_semi_at(&mut self, pos: usize) {
        self.pending.push((pos, Tok::Semi, pos));
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = (usize, Tok<'src>, usize);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.pending.is_empty() {
                return Some(self.pending.remove(0));
            }
            if self.eof_done {
                return None;
            }

            match self.logos.next() {
                None => {
                    self.eof_done = true;
                    if self.last_can_insert_semi {
                        self.last_can_insert_semi = false;
                        self.emit_semi_at(self.src_len);
                        continue;
                    }
                    return None;
                }

                Some(Err(kind)) => {
                    let span = self.logos.span();
                    self.last_can_insert_semi = false;
                    return Some((span.start, Tok::Error(kind), span.end));
                }

                Some(Ok(raw)) => {
                    let span = self.logos.span();
                    let slice = self.logos.slice();

                    match raw {
                        RawTok::Newline => {
                            if self.last_can_insert_semi {
                                self.last_can_insert_semi = false;
                                self.emit_semi_at(span.start);
                            }
                            continue;
                        }
                        RawTok::LineComment => {
                            // The newline that terminates the comment still
                            // follows in the stream, so the insertion flag is
                            // left untouched.
                            return Some((span.start, Tok::Comment(slice), span.end));
                        }
                        RawTok::BlockComment => {
                            if self.last_can_insert_semi {
                                if let Some(off) = first_newline_offset(slice) {
                                    self.last_can_insert_semi = false;
                                    self.emit_semi_at(span.start + off);
                                }
                            }
                            self.pending.push((span.start, Tok::Comment(slice), span.end));
                            continue;
                        }
                        _ => {}
                    }

                    self.last_can_insert_semi = raw.can_insert_semicolon();

                    let tok = match raw {
                        RawTok::Ident => Tok::Ident(slice),
                        RawTok::Int => Tok::Int(slice),
                        RawTok::String => Tok::Str(slice),
                        RawTok::RawString => Tok::RawStr(slice),
                        RawTok::KwPackage => Tok::KwPackage,
                        RawTok::KwImport => Tok::KwImport,
                        RawTok::KwType => Tok::KwType,
                        RawTok::KwStruct => Tok::KwStruct,
                        RawTok::KwInterface => Tok::KwInterface,
                        RawTok::KwConst => Tok::KwConst,
                        RawTok::KwFunc => Tok::KwFunc,
                        RawTok::KwVar => Tok::KwVar,
                        RawTok::KwMap => Tok::KwMap,
                        RawTok::KwChan => Tok::KwChan,
                        RawTok::Assign => Tok::Assign,
                        RawTok::Plus => Tok::Plus,
                        RawTok::Minus => Tok::Minus,
                        RawTok::Star => Tok::Star,
                        RawTok::Slash => Tok::Slash,
                        RawTok::Percent => Tok::Percent,
                        RawTok::Shl => Tok::Shl,
                        RawTok::Shr => Tok::Shr,
                        RawTok::Amp => Tok::Amp,
                        RawTok::Pipe => Tok::Pipe,
                        RawTok::Caret => Tok::Caret,
                        RawTok::LParen => Tok::LParen,
                        RawTok::RParen => Tok::RParen,
                        RawTok::LBrack => Tok::LBrack,
                        RawTok::RBrack => Tok::RBrack,
                        RawTok::LBrace => Tok::LBrace,
                        RawTok::RBrace => Tok::RBrace,
                        RawTok::Comma => Tok::Comma,
                        RawTok::Semi => Tok::Semi,
                        RawTok::Colon => Tok::Colon,
                        RawTok::Dot => Tok::Dot,
                        RawTok::Error => Tok::Error(LexErrorKind::InvalidToken),
                        RawTok::Newline | RawTok::LineComment | RawTok::BlockComment => {
                            unreachable!()
                        }
                    };

                    return Some((span.start, tok, span.end));
                }
            }
        }
    }
}

/// Unquotes an interpreted string literal (including its quotes), resolving
/// the Go escape sequences the subset needs.
pub fn unquote_string(lit: &str) -> Result<String, String> {
    let body = lit
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| "invalid string literal".to_string())?;
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let esc = chars
            .next()
            .ok_or_else(|| "invalid escape at end of string".to_string())?;
        match esc {
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0C'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0B'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            'x' | 'u' | 'U' => {
                let n = match esc {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut v: u32 = 0;
                for _ in 0..n {
                    let d = chars
                        .next()
                        .and_then(|c| c.to_digit(16))
                        .ok_or_else(|| format!("invalid \\{esc} escape"))?;
                    v = v << 4 | d;
                }
                let c =
                    char::from_u32(v).ok_or_else(|| format!("invalid \\{esc} escape value"))?;
                out.push(c);
            }
            '0'..='7' => {
                let mut v: u32 = esc.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    let d = chars
                        .next()
                        .and_then(|c| c.to_digit(8))
                        .ok_or_else(|| "invalid octal escape".to_string())?;
                    v = v << 3 | d;
                }
                if v > 255 {
                    return Err("octal escape value > 255".to_string());
                }
                out.push(v as u8 as char);
            }
            _ => return Err(format!("unknown escape \\{esc}")),
        }
    }
    Ok(out)
}

/// Unquotes a raw string literal (backticks).
pub fn unquote_raw_string(lit: &str) -> Result<String, String> {
    lit.strip_prefix('`')
        .and_then(|s| s.strip_suffix('`'))
        .map(|s| s.to_string())
        .ok_or_else(|| "invalid raw string literal".to_string())
}
