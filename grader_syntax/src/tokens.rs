use std::collections::HashSet;
use std::{
    mem::{discriminant, Discriminant},
    ops::Range,
};

use lazy_static::lazy_static;
use logos::Logos;

#[derive(Clone, Debug)]
pub struct Token {
    pub typ: TokenType,
    pub span: Range<usize>,
}

#[derive(Logos, Debug, PartialEq, Clone)]
pub enum TokenType {
    // Keywords
    #[token("package")]
    Package,
    #[token("class")]
    Class,
    #[token("implements")]
    Implements,
    #[token("let")]
    Let,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("return")]
    Return,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Literals
    #[regex(r"[_a-zA-Z][_a-zA-Z0-9]*", |lex| lex.slice().to_owned())]
    Identifier(String),
    #[regex(r"[0-9]+", |lex| lex.slice().parse())]
    Integer(i64),
    #[regex(r"'([^'\\\n]|\\.)'", |lex| parse_char(lex.slice()))]
    Char(char),
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(&lex.slice()[1..lex.slice().len() - 1]))]
    String(String),

    // Grouping
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    // Operators
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
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEq,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEq,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Not,
    #[token("=")]
    Assignment,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("%=")]
    PercentAssign,
    #[token("->")]
    Arrow,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,

    // Others
    #[regex(r"//[^\n]*", logos::skip)]
    Comment,
    #[regex(r"[ \t\f]+", logos::skip)]
    Whitespace,
    #[regex(r"(\r)?\n")]
    NewLine,

    #[error]
    Error,

    Eof,
}

lazy_static! {
    /// List of tokens after which the lexer should not insert a semicolon
    /// in case there is a newline following them;
    pub static ref IGNORE_NEWLINE: HashSet<Discriminant<TokenType>> = {
        use TokenType::*;
        let mut set = HashSet::new();
        macro_rules! add_tokens {
            [$($name:ident),*$(,)?] => {
                $(set.insert(discriminant(&$name)));*
            };
        }
        add_tokens![
            // Special
            NewLine, Eof,
            // Operators
            Semicolon, Comma, Dot, Colon, Arrow,
            Plus, Minus, Star, Slash, Percent,
            EqEq, NotEq, Less, LessEq, Greater, GreaterEq,
            AndAnd, OrOr, Not,
            Assignment, PlusAssign, MinusAssign, StarAssign, SlashAssign, PercentAssign,
            // Grouping
            LBrace, LParen,
            // Keywords
            Else, Implements,
        ];
        set
    };
}

fn parse_char(slice: &str) -> Option<char> {
    let inner = unescape(&slice[1..slice.len() - 1])?;
    let mut chars = inner.chars();
    let c = chars.next()?;
    match chars.next() {
        Some(_) => None,
        None => Some(c),
    }
}

fn unescape(raw: &str) -> Option<String> {
    let mut res = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            res.push(c);
            continue;
        }
        let escaped = match chars.next()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            _ => return None,
        };
        res.push(escaped);
    }
    Some(res)
}
