use std::ops::Range;

use thiserror::Error;

use crate::{
    ast::{self, BinOp, Expr, ExprKind, UnOp},
    lexer::{Lexer, LineMap, Location},
    tokens::{Token, TokenType},
};

/// How deeply blocks and expressions may nest. Every level of the
/// syntax tree is walked recursively by the later passes.
pub const MAX_NESTING: usize = 64;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Syntax error [{}:{}] {msg}", location.line, location.column)]
pub struct SyntaxError {
    pub span: Range<usize>,
    pub location: Location,
    pub msg: String,
}

enum ParseErr {
    /// The rule matched but ended with an error.
    /// The error has already been reported.
    Err(SyntaxError),
    /// Rule could not match.
    WrongRule,
}

type ParseRes<T> = Result<T, ParseErr>;

trait SyntaxContext
where
    Self: Sized,
{
    fn error(self, parser: &mut Parser, beg: usize, msg: &str) -> Self {
        self.error_with_span(parser, beg..parser.curr_pos(), msg)
    }

    fn error_with_span(self, parser: &mut Parser, range: Range<usize>, msg: &str) -> Self;
}

impl<T> SyntaxContext for ParseRes<T> {
    fn error_with_span(self, parser: &mut Parser, span: Range<usize>, msg: &str) -> Self {
        self.map_err(|e| match e {
            // already reported, do not stack errors
            e @ ParseErr::Err(_) => e,
            ParseErr::WrongRule => parser.error(span, msg),
        })
    }
}

pub struct Parser<'source> {
    lexer: Lexer<'source>,
    errors: Vec<SyntaxError>,
    last_end: usize,
    depth: usize,
}

impl<'source> Parser<'source> {
    pub fn parse(&mut self) -> Result<ast::SourceFile, Vec<SyntaxError>> {
        self.skip_semicolons();
        let package = match self.match_token(TokenType::Package) {
            Ok(_) => {
                let beg = self.curr_pos();
                match self.parse_path().error(self, beg, "Expected a package name") {
                    Ok(path) => {
                        let _ = self.expect_token(TokenType::Semicolon);
                        Some(path)
                    }
                    Err(_) => return Err(self.errors.clone()),
                }
            }
            Err(_) => None,
        };
        let mut classes = Vec::new();
        loop {
            self.skip_semicolons();
            if self.eof() {
                if !self.errors.is_empty() {
                    return Err(self.errors.clone());
                }
                return Ok(ast::SourceFile { package, classes });
            }
            match self.parse_class_definition() {
                Ok(class) => classes.push(class),
                Err(ParseErr::WrongRule) => {
                    self.error(
                        self.lexer.current().span.clone(),
                        format!(
                            "Expected a class definition got {:?}",
                            &self.lexer.current().typ
                        ),
                    );
                    // no recovery on the top level
                    return Err(self.errors.clone());
                }
                Err(ParseErr::Err(_)) => return Err(self.errors.clone()),
            }
        }
    }

    fn parse_class_definition(&mut self) -> ParseRes<ast::ClassDefinition> {
        let beg = self.curr_pos();
        self.match_token(TokenType::Class)?;
        let name = self
            .parse_identifier()
            .error(self, beg, "Expected a name after the class keyword")?;
        let implements = if self.match_token(TokenType::Implements).is_ok() {
            let implements = self.parse_delimited(Self::parse_path, TokenType::Comma);
            if implements.is_empty() {
                return Err(self.error(
                    beg..self.curr_pos(),
                    "Expected at least one interface after implements",
                ));
            }
            implements
        } else {
            Vec::new()
        };
        self.skip_semicolons();
        self.expect_token(TokenType::LBrace)?;
        let mut methods = Vec::new();
        loop {
            self.skip_semicolons();
            match self.lexer.current().typ.clone() {
                TokenType::RBrace => break,
                TokenType::Eof => {
                    return Err(self.error(beg..self.curr_pos(), "Unclosed class body"));
                }
                _ => {}
            }
            let method = self
                .parse_method_definition()
                .error(self, beg, "Expected a method definition")?;
            methods.push(method);
        }
        self.expect_token(TokenType::RBrace)?;
        Ok(ast::ClassDefinition {
            name,
            implements,
            methods,
            span: beg..self.last_end,
        })
    }

    fn parse_method_definition(&mut self) -> ParseRes<ast::MethodDefinition> {
        let beg = self.curr_pos();
        let name = self.parse_identifier()?;
        self.expect_token(TokenType::LParen)?;
        let parameters = self.parse_delimited(Self::parse_typed_identifier, TokenType::Comma);
        self.expect_token(TokenType::RParen)?;
        let ret = if self.match_token(TokenType::Arrow).is_ok() {
            self.parse_type()
                .error(self, beg, "Expected a return type after ->")?
        } else {
            ast::Typ::Unit
        };
        let body = self
            .parse_block()
            .error(self, beg, "Expected the method's body")?;
        Ok(ast::MethodDefinition {
            name,
            parameters,
            ret,
            body,
            span: beg..self.last_end,
        })
    }

    fn parse_typed_identifier(&mut self) -> ParseRes<ast::TypedName> {
        let beg = self.curr_pos();
        let name = self.parse_identifier()?;
        let msg = self.expected_err_msg("a colon");
        let _colon = self.match_token(TokenType::Colon).error(self, beg, &msg);
        let msg = self.expected_err_msg("a type");
        let typ = self.parse_type().error(self, beg, &msg)?;
        Ok(ast::TypedName {
            name,
            typ,
            span: beg..self.last_end,
        })
    }

    fn parse_identifier(&mut self) -> ParseRes<String> {
        if let Token {
            typ: TokenType::Identifier(_),
            ..
        } = self.lexer.current()
        {
            let id = self.advance();
            match id.typ {
                TokenType::Identifier(id) => Ok(id),
                _ => unreachable!("we already checked that this token is an identifier"),
            }
        } else {
            wrong_rule()
        }
    }

    fn parse_path(&mut self) -> ParseRes<ast::Path> {
        let beg = self.curr_pos();
        let mut segments = vec![self.parse_identifier()?];
        while self.match_token(TokenType::Dot).is_ok() {
            let segment = self
                .parse_identifier()
                .error(self, beg, "Expected a name after the dot")?;
            segments.push(segment);
        }
        Ok(ast::Path {
            segments,
            span: beg..self.last_end,
        })
    }

    fn parse_type(&mut self) -> ParseRes<ast::Typ> {
        if self.match_token(TokenType::LParen).is_ok() {
            self.expect_token(TokenType::RParen)?;
            return Ok(ast::Typ::Unit);
        }
        let name = self.parse_identifier()?;
        Ok(ast::Typ::Name(name))
    }

    fn parse_delimited<T>(
        &mut self,
        parser: impl Fn(&mut Self) -> ParseRes<T>,
        delimiter: TokenType,
    ) -> Vec<T> {
        let mut items = Vec::new();
        while let Ok(item) = parser(self) {
            items.push(item);
            if self.lexer.current().typ != delimiter {
                break;
            }
            self.advance();
        }
        items
    }

    fn parse_block(&mut self) -> ParseRes<Expr> {
        self.nested(Self::parse_block_body)
    }

    fn parse_block_body(&mut self) -> ParseRes<Expr> {
        self.skip_semicolons();
        let beg = self.curr_pos();
        self.match_token(TokenType::LBrace)?;
        let mut statements = Vec::new();
        loop {
            self.skip_semicolons();
            match self.lexer.current().typ.clone() {
                TokenType::RBrace => break,
                TokenType::Eof => {
                    return Err(self.error(beg..self.curr_pos(), "Missing closing brace"));
                }
                _ => {}
            }
            let stmt_beg = self.curr_pos();
            match self.parse_statement() {
                Ok(stmt) => {
                    statements.push(stmt);
                    match self.lexer.current().typ.clone() {
                        TokenType::Semicolon | TokenType::RBrace => {}
                        _ => {
                            let msg = self.expected_err_msg("a new line or ; after a statement");
                            self.error(self.lexer.current().span.clone(), msg);
                            self.synchronize();
                        }
                    }
                }
                Err(ParseErr::WrongRule) => {
                    let msg = format!("Expected a statement got {:?}", self.lexer.current().typ);
                    self.error(stmt_beg..self.lexer.current().span.end, msg);
                    self.synchronize();
                }
                Err(ParseErr::Err(_)) => self.synchronize(),
            }
        }
        self.expect_token(TokenType::RBrace)?;
        Ok(mk_expr(ExprKind::Sequence(statements), beg..self.last_end))
    }

    /// Skips tokens until the end of the current statement so that
    /// parsing can continue and report more than one error.
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.lexer.current().typ.clone() {
                TokenType::Eof => return,
                TokenType::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenType::RBrace if depth == 0 => return,
                TokenType::RBrace => depth -= 1,
                TokenType::LBrace => depth += 1,
                _ => {}
            }
            self.advance();
        }
    }

    fn parse_statement(&mut self) -> ParseRes<Expr> {
        let beg = self.curr_pos();
        match self.lexer.current().typ.clone() {
            TokenType::Let => self.parse_let(),
            TokenType::If => self.parse_if(),
            TokenType::While => self.parse_while(),
            TokenType::For => self.parse_for(),
            TokenType::Return => self.parse_return(),
            TokenType::Break => {
                self.advance();
                Ok(mk_expr(ExprKind::Break, beg..self.last_end))
            }
            TokenType::Continue => {
                self.advance();
                Ok(mk_expr(ExprKind::Continue, beg..self.last_end))
            }
            _ => self.parse_assignment(),
        }
    }

    fn parse_let(&mut self) -> ParseRes<Expr> {
        let beg = self.curr_pos();
        self.match_token(TokenType::Let)?;
        let name = self
            .parse_identifier()
            .error(self, beg, "Expected a variable name after let")?;
        let typ = if self.match_token(TokenType::Colon).is_ok() {
            Some(
                self.parse_type()
                    .error(self, beg, "Expected a type after the colon")?,
            )
        } else {
            None
        };
        self.expect_token(TokenType::Assignment)?;
        let init = self
            .parse_expr()
            .error(self, beg, "Expected an initializer expression")?;
        Ok(mk_expr(
            ExprKind::Let {
                name,
                typ,
                init: Box::new(init),
            },
            beg..self.last_end,
        ))
    }

    fn parse_if(&mut self) -> ParseRes<Expr> {
        let beg = self.curr_pos();
        self.match_token(TokenType::If)?;
        self.expect_token(TokenType::LParen)?;
        let cond = self
            .parse_expr()
            .error(self, beg, "Expected a condition")?;
        self.expect_token(TokenType::RParen)?;
        let body = self
            .parse_block()
            .error(self, beg, "Expected a block after the condition")?;
        // `}` followed by a new line and then `else`
        if self.lexer.current().typ == TokenType::Semicolon
            && self.lexer.peek().typ == TokenType::Else
        {
            self.advance();
        }
        let else_body = self
            .match_token(TokenType::Else)
            .ok()
            .map(|_| match self.lexer.current().typ.clone() {
                TokenType::If => self.nested(Self::parse_if),
                _ => self.parse_block().error(
                    self,
                    beg,
                    "else has to be followed by either the if or a block",
                ),
            })
            .transpose()?
            .map(Box::new);
        Ok(mk_expr(
            ExprKind::If {
                cond: Box::new(cond),
                body: Box::new(body),
                else_body,
            },
            beg..self.last_end,
        ))
    }

    fn parse_while(&mut self) -> ParseRes<Expr> {
        let beg = self.curr_pos();
        self.match_token(TokenType::While)?;
        self.expect_token(TokenType::LParen)?;
        let cond = self
            .parse_expr()
            .error(self, beg, "Expected a condition")?;
        self.expect_token(TokenType::RParen)?;
        let body = self
            .parse_block()
            .error(self, beg, "Expected the loop's body")?;
        Ok(mk_expr(
            ExprKind::While {
                cond: Box::new(cond),
                body: Box::new(body),
            },
            beg..self.last_end,
        ))
    }

    fn parse_for(&mut self) -> ParseRes<Expr> {
        let beg = self.curr_pos();
        self.match_token(TokenType::For)?;
        self.expect_token(TokenType::LParen)?;
        let binding = self
            .parse_identifier()
            .error(self, beg, "Expected a loop variable")?;
        self.expect_token(TokenType::In)?;
        let iterable = self
            .parse_expr()
            .error(self, beg, "Expected an expression to iterate over")?;
        self.expect_token(TokenType::RParen)?;
        let body = self
            .parse_block()
            .error(self, beg, "Expected the loop's body")?;
        Ok(mk_expr(
            ExprKind::For {
                binding,
                iterable: Box::new(iterable),
                body: Box::new(body),
            },
            beg..self.last_end,
        ))
    }

    fn parse_return(&mut self) -> ParseRes<Expr> {
        let beg = self.curr_pos();
        self.match_token(TokenType::Return)?;
        let expr = match self.lexer.current().typ.clone() {
            TokenType::Semicolon | TokenType::RBrace => {
                mk_expr(ExprKind::Unit, self.last_end..self.last_end)
            }
            _ => self
                .parse_expr()
                .error(self, beg, "Expected an expression to return")?,
        };
        Ok(mk_expr(
            ExprKind::Return(Box::new(expr)),
            beg..self.last_end,
        ))
    }

    fn parse_assignment(&mut self) -> ParseRes<Expr> {
        let beg = self.curr_pos();
        let lhs = self.parse_expr()?;
        let op = match self.lexer.current().typ.clone() {
            TokenType::Assignment => None,
            TokenType::PlusAssign => Some(BinOp::Add),
            TokenType::MinusAssign => Some(BinOp::Sub),
            TokenType::StarAssign => Some(BinOp::Mul),
            TokenType::SlashAssign => Some(BinOp::Div),
            TokenType::PercentAssign => Some(BinOp::Rem),
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self
            .parse_expr()
            .error(self, beg, "Expected an expression after the assignment")?;
        let rval = match op {
            None => rhs,
            // a += b is a = a + b
            Some(op) => mk_expr(
                ExprKind::BinOp {
                    op,
                    lhs: Box::new(lhs.clone()),
                    rhs: Box::new(rhs),
                },
                beg..self.last_end,
            ),
        };
        Ok(mk_expr(
            ExprKind::Assignment {
                lval: Box::new(lhs),
                rval: Box::new(rval),
            },
            beg..self.last_end,
        ))
    }

    pub(crate) fn parse_expr(&mut self) -> ParseRes<Expr> {
        self.nested(Self::parse_or)
    }

    fn parse_binary(
        &mut self,
        next: fn(&mut Self) -> ParseRes<Expr>,
        operators: &[(TokenType, BinOp)],
    ) -> ParseRes<Expr> {
        let depth = self.depth;
        let res = self.parse_binary_chain(next, operators);
        self.depth = depth;
        res
    }

    /// Each operator of a chain adds a level to the left leaning tree.
    fn parse_binary_chain(
        &mut self,
        next: fn(&mut Self) -> ParseRes<Expr>,
        operators: &[(TokenType, BinOp)],
    ) -> ParseRes<Expr> {
        let beg = self.curr_pos();
        let mut lhs = next(self)?;
        loop {
            let current = &self.lexer.current().typ;
            let Some(op) = operators
                .iter()
                .find(|(tok, _)| tok == current)
                .map(|(_, op)| *op)
            else {
                return Ok(lhs);
            };
            self.advance();
            self.deeper()?;
            let msg = format!("Expected an expression after {}", op.symbol());
            let rhs = next(self).error(self, beg, &msg)?;
            lhs = mk_expr(
                ExprKind::BinOp {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                beg..self.last_end,
            );
        }
    }

    fn parse_or(&mut self) -> ParseRes<Expr> {
        self.parse_binary(Self::parse_and, &[(TokenType::OrOr, BinOp::Or)])
    }

    fn parse_and(&mut self) -> ParseRes<Expr> {
        self.parse_binary(Self::parse_equality, &[(TokenType::AndAnd, BinOp::And)])
    }

    fn parse_equality(&mut self) -> ParseRes<Expr> {
        self.parse_binary(
            Self::parse_comparison,
            &[(TokenType::EqEq, BinOp::Eq), (TokenType::NotEq, BinOp::NotEq)],
        )
    }

    fn parse_comparison(&mut self) -> ParseRes<Expr> {
        self.parse_binary(
            Self::parse_additive,
            &[
                (TokenType::Less, BinOp::Less),
                (TokenType::LessEq, BinOp::LessEq),
                (TokenType::Greater, BinOp::Greater),
                (TokenType::GreaterEq, BinOp::GreaterEq),
            ],
        )
    }

    fn parse_additive(&mut self) -> ParseRes<Expr> {
        self.parse_binary(
            Self::parse_multiplicative,
            &[(TokenType::Plus, BinOp::Add), (TokenType::Minus, BinOp::Sub)],
        )
    }

    fn parse_multiplicative(&mut self) -> ParseRes<Expr> {
        self.parse_binary(
            Self::parse_unary,
            &[
                (TokenType::Star, BinOp::Mul),
                (TokenType::Slash, BinOp::Div),
                (TokenType::Percent, BinOp::Rem),
            ],
        )
    }

    fn parse_unary(&mut self) -> ParseRes<Expr> {
        let beg = self.curr_pos();
        let op = match self.lexer.current().typ.clone() {
            TokenType::Minus => UnOp::Neg,
            TokenType::Not => UnOp::Not,
            _ => return self.parse_postfix_operators(),
        };
        self.advance();
        let expr = self
            .nested(Self::parse_unary)
            .error(self, beg, "Expected an operand")?;
        Ok(mk_expr(
            ExprKind::UnOp {
                op,
                expr: Box::new(expr),
            },
            beg..self.last_end,
        ))
    }

    fn parse_postfix_operators(&mut self) -> ParseRes<Expr> {
        let depth = self.depth;
        let res = self.parse_postfix_chain();
        self.depth = depth;
        res
    }

    fn parse_postfix_chain(&mut self) -> ParseRes<Expr> {
        let beg = self.curr_pos();
        let mut lhs = self.parse_term()?;
        loop {
            if self.match_token(TokenType::Dot).is_ok() {
                self.deeper()?;
                let field = self
                    .parse_identifier()
                    .error(self, beg, "A member has to be an identifier")?;
                if self.match_token(TokenType::LParen).is_ok() {
                    let args = self.parse_call_arguments(beg)?;
                    lhs = mk_expr(
                        ExprKind::MethodCall {
                            receiver: Box::new(lhs),
                            method: field,
                            args,
                        },
                        beg..self.last_end,
                    );
                } else {
                    lhs = mk_expr(
                        ExprKind::Access {
                            val: Box::new(lhs),
                            field,
                        },
                        beg..self.last_end,
                    );
                }
                continue;
            }
            if self.lexer.current().typ == TokenType::LParen {
                let ExprKind::Name(func) = &lhs.kind else {
                    return Err(self.error(
                        beg..self.lexer.current().span.end,
                        "Only methods can be called",
                    ));
                };
                let func = func.clone();
                self.advance();
                self.deeper()?;
                let args = self.parse_call_arguments(beg)?;
                lhs = mk_expr(ExprKind::FunctionCall { func, args }, beg..self.last_end);
                continue;
            }
            break;
        }
        Ok(lhs)
    }

    /// Parses arguments after the opening parenthesis.
    fn parse_call_arguments(&mut self, beg: usize) -> ParseRes<Vec<Expr>> {
        let args = self.parse_delimited(Self::parse_expr, TokenType::Comma);
        self.match_token(TokenType::RParen)
            .error(self, beg, "Missing closing parenthesis")?;
        Ok(args)
    }

    fn parse_term(&mut self) -> ParseRes<Expr> {
        let beg = self.curr_pos();
        let tok = self.lexer.current().typ.clone();
        let kind = match tok {
            TokenType::Integer(val) => ExprKind::IntConst(val),
            TokenType::True => ExprKind::BoolConst(true),
            TokenType::False => ExprKind::BoolConst(false),
            TokenType::Char(c) => ExprKind::CharConst(c),
            TokenType::String(s) => ExprKind::StringConst(s),
            TokenType::Identifier(name) => ExprKind::Name(name),
            TokenType::LParen => {
                self.advance();
                let inner = self
                    .parse_expr()
                    .error(self, beg, "Expected an expression in parentheses")?;
                self.match_token(TokenType::RParen)
                    .error(self, beg, "Missing closing parenthesis")?;
                return Ok(mk_expr(inner.kind, beg..self.last_end));
            }
            TokenType::Error => {
                let span = self.lexer.current().span.clone();
                self.advance();
                return Err(self.error(span, "Illegal token"));
            }
            _ => return wrong_rule(),
        };
        self.advance();
        Ok(mk_expr(kind, beg..self.last_end))
    }
}

fn wrong_rule<T>() -> ParseRes<T> {
    Err(ParseErr::WrongRule)
}

impl<'source> Parser<'source> {
    pub fn new(lexer: Lexer<'source>) -> Self {
        Self {
            lexer,
            errors: Vec::new(),
            last_end: 0,
            depth: 0,
        }
    }

    /// Lines of the whole source, for locating spans after parsing.
    pub fn into_line_map(self) -> LineMap<'source> {
        self.lexer.into_line_map()
    }

    fn nested<T>(&mut self, rule: impl FnOnce(&mut Self) -> ParseRes<T>) -> ParseRes<T> {
        self.deeper()?;
        let res = rule(self);
        self.depth -= 1;
        res
    }

    fn deeper(&mut self) -> ParseRes<()> {
        if self.depth >= MAX_NESTING {
            let span = self.lexer.current().span.clone();
            return Err(self.error(
                span,
                format!("Code is nested more than {MAX_NESTING} levels deep"),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.lexer.current().typ == TokenType::Eof
    }

    #[inline(always)]
    fn curr_pos(&self) -> usize {
        self.lexer.current().span.start
    }

    pub fn errors(&self) -> &[SyntaxError] {
        &self.errors[..]
    }

    fn advance(&mut self) -> Token {
        let tok = self.lexer.advance();
        self.last_end = tok.span.end;
        tok
    }

    fn skip_semicolons(&mut self) {
        while self.lexer.current().typ == TokenType::Semicolon {
            self.advance();
        }
    }

    fn error(&mut self, span: Range<usize>, msg: impl Into<String>) -> ParseErr {
        let err = SyntaxError {
            location: self.lexer.location(span.start),
            span,
            msg: msg.into(),
        };
        self.errors.push(err.clone());
        ParseErr::Err(err)
    }

    fn expected_err_msg(&self, item: &str) -> String {
        format!("Expected {} got {:?}", item, self.lexer.current().typ)
    }

    fn expect_token(&mut self, typ: TokenType) -> ParseRes<Token> {
        if self.lexer.current().typ == typ {
            Ok(self.advance())
        } else {
            let span = self.lexer.current().span.clone();
            let msg = format!("Expected token {:?} got {:?}", typ, self.lexer.current().typ);
            Err(self.error(span, msg))
        }
    }

    fn match_token(&mut self, typ: TokenType) -> ParseRes<Token> {
        if self.lexer.current().typ == typ {
            Ok(self.advance())
        } else {
            wrong_rule()
        }
    }
}

fn mk_expr(kind: ExprKind, span: ast::Span) -> Expr {
    Expr::new(kind, span)
}

/// Parses a whole compilation unit.
pub fn parse_source(source: &str) -> Result<ast::SourceFile, Vec<SyntaxError>> {
    Parser::new(Lexer::new(source)).parse()
}
