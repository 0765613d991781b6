use crate::ast::{
    BinaryOp, Block, DeclKind, ExprKind, Expression, Location, Param, Program, Statement, UnaryOp,
};
use crate::diag::Diagnostics;
use crate::token::{Span, Token, TokenKind};
use crate::types::Type;

/// Marker for a syntax error that has already been reported; recovery
/// happens at statement granularity by skipping to the next `;` or `}`.
struct Recover;

type ParseResult<T> = Result<T, Recover>;

pub struct Parser<'a, 'd> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    in_function: bool,
    diags: &'d mut Diagnostics,
}

impl<'a, 'd> Parser<'a, 'd> {
    pub fn new(mut tokens: Vec<Token<'a>>, diags: &'d mut Diagnostics) -> Self {
        if tokens.is_empty() {
            tokens.push(Token::new(TokenKind::Eof, Span::default()));
        }
        Self {
            tokens,
            pos: 0,
            in_function: false,
            diags,
        }
    }

    pub fn parse_program(mut self) -> Program {
        let mut statements = Vec::new();
        while !matches!(self.current().kind, TokenKind::Eof) {
            match self.parse_statement(true) {
                Ok(statement) => statements.push(statement),
                Err(Recover) => self.synchronize(),
            }
        }
        Program { statements }
    }

    fn parse_statement(&mut self, top_level: bool) -> ParseResult<Statement> {
        let span = self.current().span;
        match self.current().kind {
            TokenKind::Var | TokenKind::Const => self.parse_var_decl(),
            TokenKind::Import | TokenKind::Func => {
                if !top_level {
                    self.diags.error(
                        span,
                        "nested function declarations are not allowed; functions may only be declared at top level",
                    );
                }
                self.parse_func_decl()
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Break => {
                self.advance();
                self.expect_semi();
                Ok(Statement::Break { span })
            }
            TokenKind::Continue => {
                self.advance();
                self.expect_semi();
                Ok(Statement::Continue { span })
            }
            TokenKind::Return => {
                if !self.in_function {
                    self.diags.error(span, "'return' outside of a function");
                }
                self.advance();
                let value = self.parse_expression()?;
                self.expect_semi();
                Ok(Statement::Return { value, span })
            }
            TokenKind::Print => {
                self.advance();
                let value = self.parse_expression()?;
                self.expect_semi();
                Ok(Statement::Print { value, span })
            }
            TokenKind::Name(_) if matches!(self.peek_kind(), TokenKind::Assign) => {
                let name = self.expect_name()?;
                self.advance(); // =
                let value = self.parse_expression()?;
                self.expect_semi();
                Ok(Statement::Assign {
                    target: Location::Name { name, span },
                    value,
                    span,
                })
            }
            TokenKind::Backtick => {
                // A store location is parsed by the ordinary expression
                // machinery, then validated once `=` is seen.
                let location = self.parse_expression()?;
                self.expect(TokenKind::Assign, "'='")?;
                let value = self.parse_expression()?;
                self.expect_semi();
                let target = match location.kind {
                    ExprKind::Unary {
                        op: UnaryOp::Load,
                        operand,
                    } => Location::Mem {
                        addr: *operand,
                        span,
                    },
                    _ => {
                        self.diags.error(span, "invalid assignment target");
                        return Err(Recover);
                    }
                };
                Ok(Statement::Assign {
                    target,
                    value,
                    span,
                })
            }
            TokenKind::Name(_) => {
                let expr = self.parse_expression()?;
                if !matches!(expr.kind, ExprKind::Call { .. }) {
                    self.diags
                        .error(span, "only function calls may be used as statements");
                    return Err(Recover);
                }
                self.expect_semi();
                Ok(Statement::ExprStmt { expr, span })
            }
            _ => {
                self.diags.error(
                    span,
                    format!("unexpected token {}", describe(&self.current().kind)),
                );
                // Consume the offender so recovery always makes progress.
                self.advance();
                Err(Recover)
            }
        }
    }

    fn parse_var_decl(&mut self) -> ParseResult<Statement> {
        let span = self.current().span;
        let kind = match self.current().kind {
            TokenKind::Const => DeclKind::Const,
            _ => DeclKind::Var,
        };
        self.advance();
        let name = self.expect_name()?;
        let declared_type = match self.current().kind {
            TokenKind::TypeName(ty) => {
                self.advance();
                Some(ty)
            }
            _ => None,
        };
        let init = if matches!(self.current().kind, TokenKind::Assign) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect_semi();
        Ok(Statement::VarDecl {
            kind,
            name,
            declared_type,
            init,
            span,
        })
    }

    fn parse_func_decl(&mut self) -> ParseResult<Statement> {
        let span = self.current().span;
        let imported = if matches!(self.current().kind, TokenKind::Import) {
            self.advance();
            true
        } else {
            false
        };
        self.expect(TokenKind::Func, "'func'")?;
        let name = self.expect_name()?;
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while !matches!(self.current().kind, TokenKind::RParen | TokenKind::Eof) {
            if !params.is_empty() {
                self.expect(TokenKind::Comma, "','")?;
            }
            let param_span = self.current().span;
            let param_name = self.expect_name()?;
            let param_type = self.expect_type()?;
            params.push(Param {
                name: param_name,
                ty: param_type,
                span: param_span,
            });
        }
        self.expect(TokenKind::RParen, "')'")?;
        let return_type = self.expect_type()?;

        let body = if imported {
            self.expect_semi();
            None
        } else {
            let was_in_function = self.in_function;
            self.in_function = true;
            let body = self.parse_block();
            self.in_function = was_in_function;
            Some(body?)
        };
        Ok(Statement::FuncDecl {
            imported,
            name,
            params,
            return_type,
            body,
            span,
        })
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        let span = self.current().span;
        self.advance();
        let cond = self.parse_expression()?;
        let then_block = self.parse_block()?;
        let else_block = if matches!(self.current().kind, TokenKind::Else) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Statement::If {
            cond,
            then_block,
            else_block,
            span,
        })
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        let span = self.current().span;
        self.advance();
        let cond = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Statement::While { cond, body, span })
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while !matches!(self.current().kind, TokenKind::RBrace | TokenKind::Eof) {
            match self.parse_statement(false) {
                Ok(statement) => statements.push(statement),
                Err(Recover) => self.synchronize_in_block(),
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(statements)
    }

    // Expressions, lowest precedence first: `||`, `&&`, relational,
    // additive, multiplicative, unary. All binary operators are
    // left-associative; relational operators do not chain.

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_and()?;
        while matches!(self.current().kind, TokenKind::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            expr = binary(BinaryOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_relational()?;
        while matches!(self.current().kind, TokenKind::AndAnd) {
            self.advance();
            let right = self.parse_relational()?;
            expr = binary(BinaryOp::And, expr, right);
        }
        Ok(expr)
    }

    fn parse_relational(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_additive()?;
        if let Some(op) = self.relational_op() {
            self.advance();
            let right = self.parse_additive()?;
            expr = binary(op, expr, right);
            if self.relational_op().is_some() {
                self.diags
                    .error(self.current().span, "relational operators may not be chained");
                return Err(Recover);
            }
        }
        Ok(expr)
    }

    fn relational_op(&self) -> Option<BinaryOp> {
        let op = match self.current().kind {
            TokenKind::Less => BinaryOp::Lt,
            TokenKind::LessEqual => BinaryOp::Le,
            TokenKind::Greater => BinaryOp::Gt,
            TokenKind::GreaterEqual => BinaryOp::Ge,
            TokenKind::EqualEqual => BinaryOp::Eq,
            TokenKind::NotEqual => BinaryOp::Ne,
            _ => return None,
        };
        Some(op)
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> ParseResult<Expression> {
        let span = self.current().span;
        match self.current().kind {
            TokenKind::Integer(value) => {
                self.advance();
                Ok(Expression::new(ExprKind::Integer(value), span))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expression::new(ExprKind::Float(value), span))
            }
            TokenKind::Char(value) => {
                self.advance();
                Ok(Expression::new(ExprKind::Char(value), span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::new(ExprKind::Bool(true), span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::new(ExprKind::Bool(false), span))
            }
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Not
            | TokenKind::Caret
            | TokenKind::Backtick => {
                let op = match self.current().kind {
                    TokenKind::Plus => UnaryOp::Pos,
                    TokenKind::Minus => UnaryOp::Neg,
                    TokenKind::Not => UnaryOp::Not,
                    TokenKind::Caret => UnaryOp::Grow,
                    _ => UnaryOp::Load,
                };
                self.advance();
                // Per the grammar, a unary operand is a whole expression,
                // so unary operators bind looser than binary ones.
                let operand = self.parse_expression()?;
                let span = join(span, operand.span);
                Ok(Expression::new(
                    ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::TypeName(target) => {
                self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                let value = self.parse_expression()?;
                let close = self.expect(TokenKind::RParen, "')'")?;
                Ok(Expression::new(
                    ExprKind::Cast {
                        target,
                        value: Box::new(value),
                    },
                    join(span, close),
                ))
            }
            TokenKind::Name(_) if matches!(self.peek_kind(), TokenKind::LParen) => {
                let name = self.expect_name()?;
                self.advance(); // (
                let mut args = Vec::new();
                while !matches!(self.current().kind, TokenKind::RParen | TokenKind::Eof) {
                    if !args.is_empty() {
                        self.expect(TokenKind::Comma, "','")?;
                    }
                    args.push(self.parse_expression()?);
                }
                let close = self.expect(TokenKind::RParen, "')'")?;
                Ok(Expression::new(
                    ExprKind::Call { name, args },
                    join(span, close),
                ))
            }
            TokenKind::Name(name) => {
                self.advance();
                Ok(Expression::new(ExprKind::Name(name.to_string()), span))
            }
            _ => {
                self.diags.error(
                    span,
                    format!("unexpected token {}", describe(&self.current().kind)),
                );
                Err(Recover)
            }
        }
    }

    /// Skip to the next `;` (consumed) or `}`/end of input (left in place).
    fn synchronize(&mut self) {
        loop {
            match self.current().kind {
                TokenKind::Semi => {
                    self.advance();
                    return;
                }
                TokenKind::RBrace | TokenKind::Eof => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn synchronize_in_block(&mut self) {
        self.synchronize();
    }

    fn expect(&mut self, kind: TokenKind<'static>, what: &str) -> ParseResult<Span> {
        if self.current().kind == kind {
            let span = self.current().span;
            self.advance();
            Ok(span)
        } else {
            self.diags.error(
                self.current().span,
                format!(
                    "unexpected token {}, expected {what}",
                    describe(&self.current().kind)
                ),
            );
            Err(Recover)
        }
    }

    fn expect_name(&mut self) -> ParseResult<String> {
        if let TokenKind::Name(name) = self.current().kind {
            self.advance();
            Ok(name.to_string())
        } else {
            self.diags.error(
                self.current().span,
                format!(
                    "unexpected token {}, expected a name",
                    describe(&self.current().kind)
                ),
            );
            Err(Recover)
        }
    }

    fn expect_type(&mut self) -> ParseResult<Type> {
        if let TokenKind::TypeName(ty) = self.current().kind {
            self.advance();
            Ok(ty)
        } else {
            self.diags.error(
                self.current().span,
                format!(
                    "unexpected token {}, expected a type name",
                    describe(&self.current().kind)
                ),
            );
            Err(Recover)
        }
    }

    /// Missing `;` is recoverable: report it and resume at whatever comes
    /// next, which is usually a statement starter.
    fn expect_semi(&mut self) {
        if matches!(self.current().kind, TokenKind::Semi) {
            self.advance();
        } else {
            self.diags
                .error(self.current().span, "missing ';' after statement");
        }
    }

    fn current(&self) -> &Token<'a> {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> TokenKind<'a> {
        self.tokens
            .get(self.pos + 1)
            .map(|token| token.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }
}

fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
    let span = join(left.span, right.span);
    Expression::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

fn join(start: Span, end: Span) -> Span {
    Span {
        start: start.start,
        end: end.end,
        line: start.line,
        column: start.column,
    }
}

fn describe(kind: &TokenKind<'_>) -> String {
    match kind {
        TokenKind::Name(name) => format!("'{name}'"),
        TokenKind::Integer(value) => format!("'{value}'"),
        TokenKind::Float(value) => format!("'{value:?}'"),
        TokenKind::Char(value) => format!("character literal {value}"),
        TokenKind::True => "'true'".to_string(),
        TokenKind::False => "'false'".to_string(),
        TokenKind::Var => "'var'".to_string(),
        TokenKind::Const => "'const'".to_string(),
        TokenKind::Func => "'func'".to_string(),
        TokenKind::Import => "'import'".to_string(),
        TokenKind::If => "'if'".to_string(),
        TokenKind::Else => "'else'".to_string(),
        TokenKind::While => "'while'".to_string(),
        TokenKind::Break => "'break'".to_string(),
        TokenKind::Continue => "'continue'".to_string(),
        TokenKind::Return => "'return'".to_string(),
        TokenKind::Print => "'print'".to_string(),
        TokenKind::TypeName(ty) => format!("'{ty}'"),
        TokenKind::Plus => "'+'".to_string(),
        TokenKind::Minus => "'-'".to_string(),
        TokenKind::Star => "'*'".to_string(),
        TokenKind::Slash => "'/'".to_string(),
        TokenKind::Less => "'<'".to_string(),
        TokenKind::LessEqual => "'<='".to_string(),
        TokenKind::Greater => "'>'".to_string(),
        TokenKind::GreaterEqual => "'>='".to_string(),
        TokenKind::EqualEqual => "'=='".to_string(),
        TokenKind::NotEqual => "'!='".to_string(),
        TokenKind::Not => "'!'".to_string(),
        TokenKind::AndAnd => "'&&'".to_string(),
        TokenKind::OrOr => "'||'".to_string(),
        TokenKind::Backtick => "'`'".to_string(),
        TokenKind::Caret => "'^'".to_string(),
        TokenKind::Assign => "'='".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::LBrace => "'{'".to_string(),
        TokenKind::RBrace => "'}'".to_string(),
        TokenKind::Semi => "';'".to_string(),
        TokenKind::Eof => "end of input".to_string(),
    }
}

/// Parses a whole token stream into a program, reporting syntax errors to
/// the sink. Always returns the (possibly partial) tree; the caller gates
/// on `diags.has_errors()`.
pub fn parse_tokens<'a>(tokens: Vec<Token<'a>>, diags: &mut Diagnostics) -> Program {
    Parser::new(tokens, diags).parse_program()
}
