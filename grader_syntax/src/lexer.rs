use logos::Logos;

use crate::tokens::{Token, TokenType, IGNORE_NEWLINE};

/// Line and column of a byte offset, both starting at 1.
/// Columns count characters, not bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// Offsets at which the lines of a source start.
///
/// Filled in by the [`Lexer`] as it passes new line tokens, so it only
/// covers the part of the source lexed so far.
#[derive(Clone, Debug)]
pub struct LineMap<'source> {
    source: &'source str,
    line_starts: Vec<usize>,
}

impl<'source> LineMap<'source> {
    fn empty(source: &'source str) -> Self {
        Self {
            source,
            line_starts: vec![0],
        }
    }

    /// Lexes the whole source to find where its lines start.
    pub fn of(source: &'source str) -> Self {
        Lexer::new(source).into_line_map()
    }

    fn line_break(&mut self, next_line_start: usize) {
        if self.line_starts.last().map_or(true, |&last| last < next_line_start) {
            self.line_starts.push(next_line_start);
        }
    }

    pub fn location(&self, offset: usize) -> Location {
        let offset = offset.min(self.source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = self
            .source
            .get(line_start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - line_start);
        Location {
            line: line + 1,
            column: column + 1,
        }
    }

    pub fn line(&self, offset: usize) -> usize {
        self.location(offset).line
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

/// Token stream with one token of lookahead.
///
/// New lines end statements: unless the previous token is one after which
/// an expression has to continue, a new line becomes a semicolon, and so
/// does the end of input.
#[derive(Clone)]
pub struct Lexer<'source> {
    tokens: logos::Lexer<'source, TokenType>,
    lines: LineMap<'source>,
    curr_token: Token,
    peek_token: Token,
    inserted_semicolon_on_eof: bool,
}

impl<'source> Lexer<'source> {
    const DUMMY: Token = Token {
        typ: TokenType::Eof,
        span: 0..0,
    };

    pub fn new(source: &'source str) -> Self {
        let mut lex = Self {
            tokens: TokenType::lexer(source),
            lines: LineMap::empty(source),
            curr_token: Self::DUMMY,
            peek_token: Self::DUMMY,
            inserted_semicolon_on_eof: false,
        };
        lex.advance();
        lex.advance();
        lex
    }

    pub fn advance(&mut self) -> Token {
        let insert_semicolon =
            !IGNORE_NEWLINE.contains(&std::mem::discriminant(&self.peek_token.typ));
        let new_peek = self.bump(insert_semicolon);
        let peek = std::mem::replace(&mut self.peek_token, new_peek);
        std::mem::replace(&mut self.curr_token, peek)
    }

    pub fn current(&self) -> &Token {
        &self.curr_token
    }

    pub fn peek(&self) -> &Token {
        &self.peek_token
    }

    /// Location of an offset the lexer has already passed.
    pub fn location(&self, offset: usize) -> Location {
        self.lines.location(offset)
    }

    /// Lexes the rest of the input and returns the lines of the whole source.
    pub fn into_line_map(mut self) -> LineMap<'source> {
        while let Some(typ) = self.tokens.next() {
            if typ == TokenType::NewLine {
                self.lines.line_break(self.tokens.span().end);
            }
        }
        self.lines
    }

    fn next_raw(&mut self) -> Option<TokenType> {
        let typ = self.tokens.next()?;
        if typ == TokenType::NewLine {
            self.lines.line_break(self.tokens.span().end);
        }
        Some(typ)
    }

    fn token(&self, typ: TokenType) -> Token {
        Token {
            typ,
            span: self.tokens.span(),
        }
    }

    fn bump(&mut self, insert_semicolon: bool) -> Token {
        use TokenType::*;
        match self.next_raw() {
            Some(NewLine) if insert_semicolon => self.token(Semicolon),
            Some(NewLine) => self.skip_new_lines(),
            Some(typ) => self.token(typ),
            None if self.inserted_semicolon_on_eof || !insert_semicolon => self.token(Eof),
            None => {
                self.inserted_semicolon_on_eof = true;
                self.token(Semicolon)
            }
        }
    }

    fn skip_new_lines(&mut self) -> Token {
        loop {
            match self.next_raw() {
                Some(TokenType::NewLine) => continue,
                Some(typ) => return self.token(typ),
                None => return self.token(TokenType::Eof),
            }
        }
    }
}
