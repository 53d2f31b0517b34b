//! Module for extracting Lisp tokens from an input stream.

use crate::data::Fixnum;
use crate::reader::{ReadErr, ReadResult};

/// A Lisp token.
///
/// Whitespace and comments are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    LParen,
    RParen,
    Dot,
    /// `#(`
    VectorStart,
    Quote,
    Quasiquote,
    Unquote,
    UnquoteSplicing,
    /// `#'`
    Function,
    String(Vec<u8>),
    Char(u8),
    Integer(Fixnum),
    /// Unescaped `nil`.
    Nil,
    Symbol(Vec<u8>),
}

/// A token along with its starting position in the input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenOffset {
    pub token: Token,
    pub line: usize,
    pub column: usize,
    /// Byte offset of the token's first byte.
    pub offset: usize,
}

/// Tokens pulled from an input buffer on demand.
///
/// A malformed token only fails the read that reaches it; the tokens
/// before it are still available.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    input: &'a [u8],
    rest: &'a [u8],
    // Position info for debug messages, counted from 0.
    line: usize,
    column: usize,
}

impl<'a> Tokens<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Tokens {
            input,
            rest: input,
            line: 0,
            column: 0,
        }
    }

    /// Byte offset of the first input not yet consumed.
    pub fn offset(&self) -> usize {
        self.input.len() - self.rest.len()
    }

    /// The next token, skipping whitespace and comments; `None` at the end.
    pub fn next_token(&mut self) -> ReadResult<Option<TokenOffset>> {
        while !self.rest.is_empty() {
            let offset = self.offset();
            let next = get_next_token(self.rest).map_err(|err| {
                err.annotate(format!("at line {} column {}", self.line + 1, self.column + 1))
            })?;
            let token = next
                .token
                .map(|token| TokenOffset::new(self.line, self.column, offset, token));
            self.line += next.lines;
            if next.lines > 0 {
                self.column = next.columns
            } else {
                self.column += next.columns;
            }
            self.rest = next.remainder;
            if token.is_some() {
                return Ok(token);
            }
        }
        Ok(None)
    }
}

/// Split the input into its constituent tokens.
pub fn tokenize(input: &[u8]) -> ReadResult<Vec<TokenOffset>> {
    let mut tokens = Tokens::new(input);
    let mut result = Vec::new();
    while let Some(token) = tokens.next_token()? {
        result.push(token);
    }
    Ok(result)
}

impl TokenOffset {
    fn new(line: usize, column: usize, offset: usize, token: Token) -> Self {
        // In useful output, lines and columns are 1-indexed
        TokenOffset {
            token,
            line: line + 1,
            column: column + 1,
            offset,
        }
    }
}

impl From<TokenOffset> for Token {
    fn from(value: TokenOffset) -> Self {
        value.token
    }
}

struct NextToken<'a> {
    // Token retrieved, if any.
    // May be None if only whitespace or a comment was consumed.
    token: Option<Token>,
    // Lines traversed in finding the token.
    lines: usize,
    // Columns in the final line traversed in finding the token.
    columns: usize,

    // Remaining input.
    remainder: &'a [u8],
}

impl<'a> NextToken<'a> {
    fn consumed(input: &'a [u8], len: usize, token: Option<Token>) -> Self {
        let (lines, columns) = cursor_distance(&input[..len]);
        NextToken {
            token,
            lines,
            columns,
            remainder: &input[len..],
        }
    }
}

mod regex {
    use regex::bytes::Regex;
    use std::sync::OnceLock;

    pub(super) fn space() -> &'static Regex {
        static SPACE: OnceLock<Regex> = OnceLock::new();
        SPACE.get_or_init(|| {
            Regex::new("\\A[[:space:]]+").expect("could not compile regex for empty space")
        })
    }

    pub(super) fn string() -> &'static Regex {
        static STRING: OnceLock<Regex> = OnceLock::new();
        STRING.get_or_init(|| {
            // Quote, followed by escaped bytes or anything other than a
            // quote or backslash. The closing quote is checked separately,
            // so a missing one reads as incomplete input.
            Regex::new(r#"(?s-u)\A"(?:\\.|[^"\\])*"#).expect("could not compile regex for string")
        })
    }

    pub(super) fn integer() -> &'static Regex {
        static MATCH: OnceLock<Regex> = OnceLock::new();
        MATCH.get_or_init(|| {
            Regex::new(r#"\A[+-]?[0-9]+\z"#).expect("could not compile regex for integer")
        })
    }

    pub(super) fn radix_integer() -> &'static Regex {
        static MATCH: OnceLock<Regex> = OnceLock::new();
        MATCH.get_or_init(|| {
            Regex::new(r#"\A([+-]?)#([bBoOxX])([0-9a-zA-Z]+)\z"#)
                .expect("could not compile regex for radix integer")
        })
    }

    pub(super) fn hex_char() -> &'static Regex {
        static MATCH: OnceLock<Regex> = OnceLock::new();
        MATCH.get_or_init(|| {
            Regex::new(r#"\A[xX]([0-9a-fA-F]{2})\z"#)
                .expect("could not compile regex for character code")
        })
    }

    pub(super) fn comment() -> &'static Regex {
        static MATCH: OnceLock<Regex> = OnceLock::new();
        MATCH.get_or_init(|| Regex::new(r#"(?-u)\A;[^\n]*"#).expect("could not compile regex for comment"))
    }
}

/// Named characters. The first name listed for a byte is the one printed.
const CHAR_NAMES: &[(&str, u8)] = &[
    ("Newline", b'\n'),
    ("Space", b' '),
    ("Tab", b'\t'),
    ("Return", b'\r'),
    ("Page", 0x0c),
    ("Backspace", 0x08),
    ("Delete", 0x7f),
    ("Nul", 0),
    ("Linefeed", b'\n'),
    ("Formfeed", 0x0c),
    ("Rubout", 0x7f),
    ("Null", 0),
];

/// The printed name of a character, if it has one.
pub fn char_name(c: u8) -> Option<&'static str> {
    CHAR_NAMES.iter().find(|(_, b)| *b == c).map(|(n, _)| *n)
}

/// The character with this name; names are case-insensitive.
pub fn char_from_name(name: &[u8]) -> Option<u8> {
    CHAR_NAMES
        .iter()
        .find(|(n, _)| n.as_bytes().eq_ignore_ascii_case(name))
        .map(|(_, b)| *b)
}

/// Bytes that end a bare token.
pub fn is_terminator(c: u8) -> bool {
    c.is_ascii_whitespace() || matches!(c, b'"' | b'\'' | b'(' | b')' | b',' | b';' | b'`')
}

/// Returns the (line, column) that the cursor ends at, after following the given path,
/// assuming it started at (0, 0).
/// Tabs still count as a single column.
fn cursor_distance(s: &[u8]) -> (usize, usize) {
    let line_count = s.iter().filter(|&&c| c == b'\n').count();
    let last_line_start = s
        .iter()
        .rposition(|&c| c == b'\n')
        .map(|x| x + 1)
        .unwrap_or(0);
    (line_count, s.len() - last_line_start)
}

/// Length of the bare token at the start of `input`, and its bytes with
/// escapes removed. The flag reports whether any byte was escaped.
fn bare_token(input: &[u8]) -> ReadResult<(usize, Vec<u8>, bool)> {
    let mut text = Vec::new();
    let mut escaped = false;
    let mut i = 0;
    while i < input.len() && !is_terminator(input[i]) {
        if input[i] == b'\\' {
            let Some(&c) = input.get(i + 1) else {
                return Err(ReadErr::Incomplete("escape at end of input".to_owned()));
            };
            text.push(c);
            escaped = true;
            i += 2;
        } else {
            text.push(input[i]);
            i += 1;
        }
    }
    Ok((i, text, escaped))
}

fn parse_integer(text: &str, radix: u32) -> ReadResult<Fixnum> {
    Fixnum::from_str_radix(text, radix).map_err(|e| match e.kind() {
        std::num::IntErrorKind::PosOverflow | std::num::IntErrorKind::NegOverflow => {
            ReadErr::Error(format!("integer overflow in {text:?}"))
        }
        _ => ReadErr::Error(format!("invalid integer {text:?}: {e}")),
    })
}

/// The integer a token spells, if it is one: optionally signed decimal,
/// or `#b`/`#o`/`#x` with the sign before the `#`.
///
/// Overflow is an error rather than `None`.
pub fn read_integer(text: &[u8]) -> ReadResult<Option<Fixnum>> {
    if regex::integer().is_match(text) {
        // The regex admits only ASCII.
        let s = String::from_utf8_lossy(text);
        let s = s.strip_prefix('+').unwrap_or(&s);
        return parse_integer(s, 10).map(Some);
    }
    if let Some(caps) = regex::radix_integer().captures(text) {
        let radix = match caps[2].to_ascii_lowercase().as_slice() {
            b"b" => 2,
            b"o" => 8,
            _ => 16,
        };
        let sign = if &caps[1] == b"-" { "-" } else { "" };
        let digits = String::from_utf8_lossy(&caps[3]);
        return parse_integer(&format!("{sign}{digits}"), radix).map(Some);
    }
    Ok(None)
}

/// Classify a bare token: number, dot, or symbol.
fn classify(text: Vec<u8>, escaped: bool) -> ReadResult<Token> {
    if escaped {
        return Ok(Token::Symbol(text));
    }
    if text == b"." {
        return Ok(Token::Dot);
    }
    if text == b"nil" {
        return Ok(Token::Nil);
    }
    if let Some(n) = read_integer(&text)? {
        return Ok(Token::Integer(n));
    }
    if text.first() == Some(&b'#') {
        return Err(ReadErr::Error(format!(
            "reserved symbol {:?}",
            String::from_utf8_lossy(&text)
        )));
    }
    Ok(Token::Symbol(text))
}

/// Whether these bytes, written out unescaped, read back as a symbol
/// with the same name.
pub fn reads_as_symbol(name: &[u8]) -> bool {
    !name.is_empty()
        && !name.iter().any(|&c| is_terminator(c) || c == b'\\')
        && classifies_as_symbol(name)
}

/// Whether a bare token with these bytes is a symbol rather than a number,
/// a dot, `nil`, or a reserved `#` token.
pub fn classifies_as_symbol(name: &[u8]) -> bool {
    matches!(classify(name.to_vec(), false), Ok(Token::Symbol(_)))
}

/// Read a character literal; `input` starts just after `#\`.
fn character(input: &[u8]) -> ReadResult<(usize, u8)> {
    let Some(&first) = input.first() else {
        return Err(ReadErr::Incomplete("character literal at end of input".to_owned()));
    };
    let rest = input[1..]
        .iter()
        .position(|&c| is_terminator(c))
        .unwrap_or(input.len() - 1);
    let name = &input[..1 + rest];
    if name.len() == 1 {
        return Ok((1, first));
    }
    if let Some(c) = char_from_name(name) {
        return Ok((name.len(), c));
    }
    if let Some(caps) = regex::hex_char().captures(name) {
        let digits = String::from_utf8_lossy(&caps[1]);
        let c = u8::from_str_radix(&digits, 16)
            .map_err(|e| ReadErr::Error(format!("invalid character code {digits}: {e}")))?;
        return Ok((name.len(), c));
    }
    Err(ReadErr::Error(format!(
        "unknown character name {:?}",
        String::from_utf8_lossy(name)
    )))
}

/// Get the next token from the input, and return the remainder of the input.
fn get_next_token(input: &[u8]) -> ReadResult<NextToken<'_>> {
    // Single-character matchers:
    if let Some(token) = match input.first() {
        Some(b'(') => Some(Token::LParen),
        Some(b')') => Some(Token::RParen),
        Some(b'\'') => Some(Token::Quote),
        Some(b'`') => Some(Token::Quasiquote),
        _ => None,
    } {
        return Ok(NextToken::consumed(input, 1, Some(token)));
    };

    if input.starts_with(b",@") {
        return Ok(NextToken::consumed(input, 2, Some(Token::UnquoteSplicing)));
    }
    if input.starts_with(b",") {
        return Ok(NextToken::consumed(input, 1, Some(Token::Unquote)));
    }

    // Regex matchers:
    if let Some(space) = regex::space().find(input) {
        return Ok(NextToken::consumed(input, space.len(), None));
    }
    if let Some(comment) = regex::comment().find(input) {
        return Ok(NextToken::consumed(input, comment.len(), None));
    }
    if let Some(s) = regex::string().find(input) {
        let len = s.len();
        if input.get(len) != Some(&b'"') {
            // No closing quote; consider this a premature end.
            return Err(ReadErr::Incomplete("unterminated string".to_owned()));
        }
        let mut text = Vec::with_capacity(len);
        let mut bytes = input[1..len].iter();
        while let Some(&c) = bytes.next() {
            if c == b'\\' {
                if let Some(&escaped) = bytes.next() {
                    text.push(escaped);
                }
            } else {
                text.push(c);
            }
        }
        return Ok(NextToken::consumed(input, len + 1, Some(Token::String(text))));
    }

    // Dispatch macros:
    match input {
        [b'#', b'(', ..] => return Ok(NextToken::consumed(input, 2, Some(Token::VectorStart))),
        [b'#', b'\'', ..] => return Ok(NextToken::consumed(input, 2, Some(Token::Function))),
        [b'#', b'\\', rest @ ..] => {
            let (len, c) = character(rest)?;
            return Ok(NextToken::consumed(input, 2 + len, Some(Token::Char(c))));
        }
        [b'#'] => return Err(ReadErr::Incomplete("dispatch character at end of input".to_owned())),
        _ => (),
    }

    let (len, text, escaped) = bare_token(input)?;
    if len == 0 {
        return Err(ReadErr::Error(format!(
            "unexpected character {:?}",
            input[0] as char
        )));
    }
    let token = classify(text, escaped)?;
    Ok(NextToken::consumed(input, len, Some(token)))
}
