//! Recursive-descent parser: tokens to Lisp values.

use super::token::{Token, TokenOffset, Tokens};
use super::{ReadErr, ReadResult};
use crate::data::{Storage, Value};

/// Lists and vectors nested deeper than this are rejected. The compiler
/// applies the same limit to code built at run time.
pub const MAX_NESTING: usize = 256;

/// Reads forms from an input buffer, one at a time.
///
/// Input is tokenized as the forms are read, so an error further on does
/// not stop the forms before it from reading.
///
/// Values under construction are kept on the store's operand stack,
/// so a collection in the middle of a read does not lose them.
/// A returned form is not rooted; the caller must root it before
/// allocating again.
pub struct Reader<'a> {
    store: &'a Storage,
    tokens: Tokens<'a>,
    /// Byte offset where the current (or last) top-level form begins.
    position: usize,
}

impl<'a> Reader<'a> {
    pub fn new(store: &'a Storage, input: &'a [u8]) -> Self {
        Reader {
            store,
            tokens: Tokens::new(input),
            position: 0,
        }
    }

    /// Byte offset of the start of the form most recently begun.
    ///
    /// After an `Incomplete` error, input before this offset has been
    /// consumed by complete forms.
    pub fn position(&self) -> usize {
        self.position
    }

    /// The next top-level form; `None` at the end of input.
    pub fn read(&mut self) -> ReadResult<Option<Value>> {
        self.position = self.tokens.offset();
        let token = self.tokens.next_token()?;
        self.position = token
            .as_ref()
            .map(|t| t.offset)
            .unwrap_or_else(|| self.tokens.offset());
        match token {
            None => Ok(None),
            Some(token) => self.parse_form(token, 0).map(Some),
        }
    }

    /// Read every remaining form.
    ///
    /// The forms are returned as a Lisp list, so they stay a single value
    /// for the caller to root.
    pub fn read_all(&mut self) -> ReadResult<Value> {
        let base = self.store.stack_len();
        let result = self.read_all_onto_stack(base);
        self.store.truncate(base);
        result
    }

    fn read_all_onto_stack(&mut self, base: usize) -> ReadResult<Value> {
        while let Some(form) = self.read()? {
            self.store.push(form);
        }
        Ok(self.store.list(&self.store.stack_from(base))?)
    }

    /// A form that must be present; `context` explains why.
    fn expect_form(&mut self, context: &str, depth: usize) -> ReadResult<Value> {
        match self.tokens.next_token()? {
            None => Err(ReadErr::Incomplete(format!(
                "end of input where a form was expected {context}"
            ))),
            Some(token) => self.parse_form(token, depth),
        }
    }

    fn parse_form(&mut self, token: TokenOffset, depth: usize) -> ReadResult<Value> {
        let at = format!("at line {} column {}", token.line, token.column);
        match token.token {
            Token::LParen => self.parse_sequence(&at, depth + 1, false),
            Token::VectorStart => self.parse_sequence(&at, depth + 1, true),
            Token::RParen => Err(ReadErr::Error(format!("unexpected ')' {at}"))),
            Token::Dot => Err(ReadErr::Error(format!("unexpected '.' {at}"))),
            Token::Quote => self.wrap("quote", &at, depth),
            Token::Quasiquote => self.wrap("quasiquote", &at, depth),
            Token::Unquote => self.wrap("unquote", &at, depth),
            Token::UnquoteSplicing => self.wrap("unquote-splicing", &at, depth),
            Token::Function => self.wrap("function", &at, depth),
            Token::String(s) => Ok(self.store.put_string(&s)?),
            Token::Char(c) => Ok(Value::Char(c)),
            Token::Integer(n) => Ok(Value::Fixnum(n)),
            Token::Nil => Ok(Value::Nil),
            Token::Symbol(name) => Ok(self.store.intern(&name)?),
        }
    }

    /// `'x` and friends: `(quote x)`.
    fn wrap(&mut self, head: &str, at: &str, depth: usize) -> ReadResult<Value> {
        let inner = self.expect_form(&format!("after {head} prefix {at}"), depth)?;
        let inner = self.store.root(inner);
        let head = self.store.intern_str(head)?;
        Ok(self.store.list(&[head, inner.get()])?)
    }

    /// A list or vector; the opening token has been consumed.
    fn parse_sequence(&mut self, at: &str, depth: usize, vector: bool) -> ReadResult<Value> {
        if depth > MAX_NESTING {
            return Err(ReadErr::Error(format!(
                "forms nested more than {MAX_NESTING} deep {at}"
            )));
        }
        let base = self.store.stack_len();
        let result = self.sequence_items(at, depth, vector, base);
        self.store.truncate(base);
        result
    }

    fn sequence_items(
        &mut self,
        at: &str,
        depth: usize,
        vector: bool,
        base: usize,
    ) -> ReadResult<Value> {
        let what = if vector { "vector" } else { "list" };
        loop {
            let Some(token) = self.tokens.next_token()? else {
                return Err(ReadErr::Incomplete(format!("{what} starting {at} is not closed")));
            };
            match token.token {
                Token::RParen => {
                    let items = self.store.stack_from(base);
                    return Ok(if vector {
                        self.store.put_vector(&items)?
                    } else {
                        self.store.list(&items)?
                    });
                }
                Token::Dot if vector => {
                    return Err(ReadErr::Error(format!(
                        "dotted tail in vector at line {} column {}",
                        token.line, token.column
                    )))
                }
                Token::Dot => return self.dotted_tail(at, depth, base, &token),
                _ => {
                    let v = self.parse_form(token, depth)?;
                    self.store.push(v);
                }
            }
        }
    }

    /// `. x)` at the end of a list.
    fn dotted_tail(
        &mut self,
        at: &str,
        depth: usize,
        base: usize,
        dot: &TokenOffset,
    ) -> ReadResult<Value> {
        if self.store.stack_len() == base {
            return Err(ReadErr::Error(format!(
                "dot before any list element at line {} column {}",
                dot.line, dot.column
            )));
        }
        let tail = self.expect_form(&format!("after dot in list starting {at}"), depth)?;
        self.store.push(tail);
        match self.tokens.next_token()? {
            Some(TokenOffset {
                token: Token::RParen,
                ..
            }) => {
                let items = self.store.stack_from(base);
                match items.split_last() {
                    Some((tail, items)) => Ok(self.store.list_with_tail(items, *tail)?),
                    None => Err(ReadErr::Error(format!("empty dotted list {at}"))),
                }
            }
            Some(other) => Err(ReadErr::Error(format!(
                "expected ')' after dotted tail, got {:?} at line {} column {}",
                other.token, other.line, other.column
            ))),
            None => Err(ReadErr::Incomplete(format!("list starting {at} is not closed"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use rstest::rstest;

    fn read_one(store: &Storage, input: &str) -> ReadResult<Value> {
        let mut reader = Reader::new(store, input.as_bytes());
        match reader.read()? {
            Some(v) => Ok(v),
            None => panic!("no form in {input:?}"),
        }
    }

    #[test]
    fn atoms() -> Result<(), ReadErr> {
        let store = Storage::default();
        assert_eq!(read_one(&store, "42")?, Value::Fixnum(42));
        assert_eq!(read_one(&store, "-#x10")?, Value::Fixnum(-16));
        assert_eq!(read_one(&store, r"#\Space")?, Value::Char(b' '));
        assert_eq!(read_one(&store, "nil")?, Value::Nil);
        assert_eq!(read_one(&store, "foo")?, store.intern(b"foo")?);
        assert_eq!(read_one(&store, r"\nil")?, store.intern(b"nil")?);
        let s = read_one(&store, r#""a\"b""#)?;
        assert_eq!(store.string_bytes(s)?, b"a\"b");
        Ok(())
    }

    #[test]
    fn empty_input_is_end_of_file() -> Result<(), ReadErr> {
        let store = Storage::default();
        let mut reader = Reader::new(&store, b"  ; only a comment\n");
        assert_eq!(reader.read()?, None);
        assert_eq!(reader.position(), 19);
        Ok(())
    }

    #[test]
    fn dotted_list() -> Result<(), ReadErr> {
        let store = Storage::default();
        let v = read_one(&store, "(1 . 2)")?;
        assert_eq!(store.uncons(v)?, (Value::Fixnum(1), Value::Fixnum(2)));

        let v = store.root(read_one(&store, "(1 2 . 3)")?);
        let (one, rest) = store.uncons(v.get())?;
        assert_eq!(one, Value::Fixnum(1));
        assert_eq!(store.uncons(rest)?, (Value::Fixnum(2), Value::Fixnum(3)));
        Ok(())
    }

    #[test]
    fn empty_list_is_nil() -> Result<(), ReadErr> {
        let store = Storage::default();
        assert_eq!(read_one(&store, "()")?, Value::Nil);
        assert_eq!(read_one(&store, "( ; nothing\n )")?, Value::Nil);
        Ok(())
    }

    #[test]
    fn quote_sugar() -> Result<(), ReadErr> {
        let store = Storage::default();
        let v = read_one(&store, "'(a b)")?;
        let items = store.list_to_vec(v)?;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], store.intern(b"quote")?);
        let inner = store.list_to_vec(items[1])?;
        assert_eq!(inner, vec![store.intern(b"a")?, store.intern(b"b")?]);

        for (input, head) in [
            ("`x", "quasiquote"),
            (",x", "unquote"),
            (",@x", "unquote-splicing"),
            ("#'x", "function"),
        ] {
            let v = read_one(&store, input)?;
            let items = store.list_to_vec(v)?;
            assert_eq!(items, vec![store.intern_str(head)?, store.intern(b"x")?]);
        }
        Ok(())
    }

    #[test]
    fn vectors() -> Result<(), ReadErr> {
        let store = Storage::default();
        let v = read_one(&store, "#(1 #\\a (2))")?;
        let items = store.vector_items(v)?;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Value::Fixnum(1));
        assert_eq!(items[1], Value::Char(b'a'));
        assert_eq!(store.list_to_vec(items[2])?, vec![Value::Fixnum(2)]);
        Ok(())
    }

    #[test]
    fn several_forms() -> Result<(), ReadErr> {
        let store = Storage::default();
        let mut reader = Reader::new(&store, b"1 (2) three");
        let all = reader.read_all()?;
        assert_eq!(store.list_to_vec(all)?.len(), 3);
        assert_eq!(store.stack_len(), 0);
        Ok(())
    }

    #[test]
    fn survives_collection_mid_read() -> Result<(), ReadErr> {
        let store = Storage::default();
        let input: String = format!(
            "({})",
            (0..5_000)
                .map(|i| format!("(\"s{i}\" . {i})"))
                .collect::<Vec<_>>()
                .join(" ")
        );
        let v = store.root(read_one(&store, &input)?);
        assert!(store.current_stats().collections > 0);
        let items = store.list_to_vec(v.get())?;
        assert_eq!(items.len(), 5_000);
        let (s, n) = store.uncons(items[1234])?;
        assert_eq!(store.string_bytes(s)?, b"s1234");
        assert_eq!(n, Value::Fixnum(1234));
        store.verify()?;
        Ok(())
    }

    #[rstest]
    #[case("(1 2")]
    #[case("(1 . ")]
    #[case("'")]
    #[case("#(1")]
    #[case("(a \"b")]
    fn incomplete(#[case] input: &str) {
        let store = Storage::default();
        match read_one(&store, input) {
            Err(ReadErr::Incomplete(_)) => (),
            v => panic!("expected incomplete input, got {v:?}"),
        }
    }

    #[rstest]
    #[case(")")]
    #[case("(. 1)")]
    #[case("(1 . 2 3)")]
    #[case("#(1 . 2)")]
    #[case("#gensym")]
    fn malformed(#[case] input: &str) {
        let store = Storage::default();
        match read_one(&store, input) {
            Err(ReadErr::Error(_)) => (),
            v => panic!("expected a syntax error, got {v:?}"),
        }
    }

    #[test]
    fn nesting_limit() {
        let store = Storage::default();
        let deep = "(".repeat(MAX_NESTING + 1) + &")".repeat(MAX_NESTING + 1);
        match read_one(&store, &deep) {
            Err(ReadErr::Error(e)) => assert!(e.contains("nested"), "{e}"),
            v => panic!("expected a nesting error, got {v:?}"),
        }
        let ok = "(".repeat(MAX_NESTING) + &")".repeat(MAX_NESTING);
        assert!(read_one(&store, &ok).is_ok());
    }

    #[test]
    fn forms_before_a_bad_token_still_read() -> Result<(), ReadErr> {
        let store = Storage::default();
        let mut reader = Reader::new(&store, b"1 2 #foo 3");
        assert_eq!(reader.read()?, Some(Value::Fixnum(1)));
        assert_eq!(reader.read()?, Some(Value::Fixnum(2)));
        match reader.read() {
            Err(ReadErr::Error(e)) => assert!(e.contains("reserved"), "{e}"),
            v => panic!("expected a syntax error, got {v:?}"),
        }
        Ok(())
    }

    #[test]
    fn unterminated_string_after_a_form() -> Result<(), ReadErr> {
        let store = Storage::default();
        let mut reader = Reader::new(&store, b"1 \"abc");
        assert_eq!(reader.read()?, Some(Value::Fixnum(1)));
        match reader.read() {
            Err(ReadErr::Incomplete(_)) => assert_eq!(reader.position(), 1),
            v => panic!("expected incomplete input, got {v:?}"),
        }
        Ok(())
    }

    #[test]
    fn position_after_incomplete() -> Result<(), ReadErr> {
        let store = Storage::default();
        let input = b"(a) (b";
        let mut reader = Reader::new(&store, input);
        assert!(reader.read()?.is_some());
        match reader.read() {
            Err(ReadErr::Incomplete(_)) => assert_eq!(reader.position(), 4),
            v => panic!("expected incomplete input, got {v:?}"),
        }
        Ok(())
    }
}
