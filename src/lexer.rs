use std::fmt;
use std::io::{self, Read};

use lazy_static::lazy_static;
use log::{error, trace};
use regex::Regex;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Eof,
    Def,
    Extern,
    Ident(String),
    Number(f64),
    Char(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => write!(f, "end of input"),
            Token::Def => write!(f, "def"),
            Token::Extern => write!(f, "extern"),
            Token::Ident(name) => write!(f, "{}", name),
            Token::Number(value) => write!(f, "{}", value),
            Token::Char(c) => write!(f, "'{}'", c),
        }
    }
}

/// 1-based line and column of a character in the source
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum LexError {
    #[error("malformed number literal `{text}` at {position}")]
    MalformedNumber { text: String, position: Position },
}

lazy_static! {
    // digits with at most one dot, and at least one digit somewhere
    static ref NUMBER_RE: Regex = Regex::new(r"^(\d+\.?\d*|\.\d+)$").unwrap();
}

/// Adapts a blocking reader (stdin, a file) into a byte source for the lexer.
///
/// A read error is logged and treated as the end of input.
pub struct ReaderSource<R> {
    bytes: io::Bytes<R>,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            bytes: reader.bytes(),
        }
    }
}

impl<R: Read> Iterator for ReaderSource<R> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        match self.bytes.next()? {
            Ok(byte) => Some(byte),
            Err(err) => {
                error!("failed to read source: {}", err);
                None
            }
        }
    }
}

/// Pull-based tokenizer: every call to [`Lexer::next_token`] reads just
/// enough characters to produce one token, keeping one character of
/// lookahead between calls.
pub struct Lexer<I> {
    source: I,
    // `None` once the source is exhausted
    last_char: Option<u8>,
    line: usize,
    column: usize,
    token_start: Position,
}

impl<'a> Lexer<std::str::Bytes<'a>> {
    pub fn from_source(input: &'a str) -> Self {
        Lexer::new(input.bytes())
    }
}

impl<I: Iterator<Item = u8>> Lexer<I> {
    pub fn new(source: I) -> Self {
        Self {
            source,
            // a pending blank makes the first call pull the first real character
            last_char: Some(b' '),
            line: 1,
            column: 0,
            token_start: Position::new(1, 1),
        }
    }

    /// Position of the first character of the most recently produced token.
    pub fn position(&self) -> Position {
        self.token_start
    }

    fn bump(&mut self) {
        if self.last_char == Some(b'\n') {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.last_char = self.source.next();
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        loop {
            // `is_ascii_whitespace` leaves out vertical tab
            while matches!(self.last_char, Some(c) if c.is_ascii_whitespace() || c == 0x0B) {
                self.bump();
            }

            self.token_start = Position::new(self.line, self.column);

            let c = match self.last_char {
                Some(c) => c,
                None => return Ok(Token::Eof),
            };

            if c == b'#' {
                self.skip_comment();
                continue;
            }

            let token = if c.is_ascii_alphabetic() {
                self.lex_identifier()
            } else if c.is_ascii_digit() || c == b'.' {
                self.lex_number()?
            } else {
                self.bump();
                Token::Char(c as char)
            };

            trace!("lexed {:?} at {}", token, self.token_start);
            return Ok(token);
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.last_char {
            self.bump();
            if c == b'\n' || c == b'\r' {
                break;
            }
        }
    }

    fn lex_identifier(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(c) = self.last_char {
            if !c.is_ascii_alphanumeric() {
                break;
            }
            ident.push(c as char);
            self.bump();
        }

        match ident.as_str() {
            "def" => Token::Def,
            "extern" => Token::Extern,
            _ => Token::Ident(ident),
        }
    }

    fn lex_number(&mut self) -> Result<Token, LexError> {
        let mut text = String::new();
        while let Some(c) = self.last_char {
            if !(c.is_ascii_digit() || c == b'.') {
                break;
            }
            text.push(c as char);
            self.bump();
        }

        if !NUMBER_RE.is_match(&text) {
            return Err(LexError::MalformedNumber {
                text,
                position: self.token_start,
            });
        }

        match text.parse() {
            Ok(value) => Ok(Token::Number(value)),
            Err(_) => Err(LexError::MalformedNumber {
                text,
                position: self.token_start,
            }),
        }
    }
}

/// lex the whole input, stopping before the end-of-input token
pub fn lex(input: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::from_source(input);
    let mut res = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::Eof => break,
            token => res.push(token),
        }
    }
    Ok(res)
}
