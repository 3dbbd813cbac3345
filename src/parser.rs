use std::collections::HashMap;
use std::fmt;

use crate::{
    ast::{BinaryOp, Decl, Expr, ExprId, ExprKind, FunctionDecl, Param, Program, Stmt, UnaryOp,
        VarDecl},
    token::{Token, TokenKind},
    types::Type,
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Recursive-descent parser over a lexed token buffer.
///
/// Raises on the first failure: an AST past a parse error is meaningless to
/// the later passes, so there is nothing to accumulate into.
pub struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    next_expr_id: u32,
    /// Lexical name-to-declared-type frames, used only for the early
    /// literal-mismatch check. Real scope analysis happens in the resolver.
    scopes: Vec<HashMap<String, Type>>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Parser {
        Parser {
            tokens,
            cursor: 0,
            next_expr_id: 0,
            scopes: Vec::with_capacity(8),
        }
    }

    pub fn parse(mut self) -> Result<Program> {
        self.push_scope();
        let mut decls = Vec::with_capacity(4);
        while !self.at_end() {
            decls.push(self.top_level()?);
        }
        self.pop_scope();
        Ok(Program { decls })
    }

    fn top_level(&mut self) -> Result<Decl> {
        if self.check(TokenKind::Fn) {
            return Ok(Decl::Function(self.function()?));
        }
        if self.check_type_token() {
            let decl = self.var_decl()?;
            self.expect(TokenKind::Semicolon, ErrorKind::FailedToFindToken, "';'")?;
            return Ok(Decl::Var(decl));
        }
        let tok = self.peek()?.clone();
        Err(Error {
            kind: ErrorKind::UnexpectedToken,
            message: format!("Unexpected token at top-level: {tok}"),
            offending: Some(tok),
        })
    }

    fn function(&mut self) -> Result<FunctionDecl> {
        let fn_tok = self.expect(TokenKind::Fn, ErrorKind::FailedToFindToken, "'fn'")?;
        let name = self.expect(
            TokenKind::Identifier,
            ErrorKind::ExpectedIdentifier,
            "function name",
        )?;
        self.expect(TokenKind::ParenL, ErrorKind::FailedToFindToken, "'('")?;
        let params = if self.check(TokenKind::ParenR) {
            Vec::new()
        } else {
            self.params()?
        };
        self.expect(TokenKind::ParenR, ErrorKind::FailedToFindToken, "')'")?;
        self.push_scope();
        for param in &params {
            self.declare(&param.name, param.ty);
        }
        let body = self.block()?;
        self.pop_scope();
        Ok(FunctionDecl {
            name: name.lexeme,
            params,
            ret_type: None,
            body,
            pos: fn_tok.pos,
        })
    }

    fn params(&mut self) -> Result<Vec<Param>> {
        let mut params = vec![self.param()?];
        while self.eat(TokenKind::Comma) {
            params.push(self.param()?);
        }
        Ok(params)
    }

    fn param(&mut self) -> Result<Param> {
        let ty = self.type_name()?;
        let name = self.expect(
            TokenKind::Identifier,
            ErrorKind::ExpectedIdentifier,
            "parameter name",
        )?;
        Ok(Param {
            ty,
            name: name.lexeme,
        })
    }

    fn type_name(&mut self) -> Result<Type> {
        let ty = match self.peek()?.kind {
            TokenKind::Int => Type::Int,
            TokenKind::Float => Type::Float,
            TokenKind::Bool => Type::Bool,
            TokenKind::String => Type::String,
            TokenKind::Char => Type::Char,
            _ => {
                let tok = self.peek()?.clone();
                return Err(Error {
                    kind: ErrorKind::ExpectedTypeToken,
                    message: "Expected a type token (int|float|bool|string|char)".into(),
                    offending: Some(tok),
                });
            }
        };
        self.cursor += 1;
        Ok(ty)
    }

    /// The statements between `{` and `}`. The surrounding construct decides
    /// whether they get their own coherence frame.
    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(TokenKind::BraceL, ErrorKind::FailedToFindToken, "'{'")?;
        self.push_scope();
        let mut stmts = Vec::with_capacity(4);
        while !self.check(TokenKind::BraceR) {
            stmts.push(self.stmt()?);
        }
        self.expect(TokenKind::BraceR, ErrorKind::FailedToFindToken, "'}'")?;
        self.pop_scope();
        Ok(stmts)
    }

    fn stmt(&mut self) -> Result<Stmt> {
        if self.check(TokenKind::BraceL) {
            return Ok(Stmt::Block(self.block()?));
        }
        if self.eat(TokenKind::If) {
            return self.if_stmt();
        }
        if self.eat(TokenKind::While) {
            return self.while_stmt();
        }
        if self.eat(TokenKind::For) {
            return self.for_stmt();
        }
        if self.check(TokenKind::Return) {
            return self.return_stmt();
        }
        if self.check_type_token() {
            let decl = self.var_decl()?;
            self.expect(TokenKind::Semicolon, ErrorKind::FailedToFindToken, "';'")?;
            return Ok(Stmt::VarDecl(decl));
        }
        let expr = self.expr()?;
        self.expect(
            TokenKind::Semicolon,
            ErrorKind::FailedToFindToken,
            "';' after expression",
        )?;
        Ok(Stmt::Expr(expr))
    }

    fn if_stmt(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::ParenL, ErrorKind::FailedToFindToken, "'(' after if")?;
        let cond = self.expr()?;
        self.expect(
            TokenKind::ParenR,
            ErrorKind::FailedToFindToken,
            "')' after if condition",
        )?;
        let then_branch = Box::new(self.stmt()?);
        let else_branch = if self.eat(TokenKind::Else) {
            Some(Box::new(self.stmt()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn while_stmt(&mut self) -> Result<Stmt> {
        self.expect(
            TokenKind::ParenL,
            ErrorKind::FailedToFindToken,
            "'(' after while",
        )?;
        let cond = self.expr()?;
        self.expect(
            TokenKind::ParenR,
            ErrorKind::FailedToFindToken,
            "')' after while condition",
        )?;
        let body = Box::new(self.stmt()?);
        Ok(Stmt::While { cond, body })
    }

    /// `for` gets its own coherence frame so an init declaration is visible
    /// in cond and incr.
    fn for_stmt(&mut self) -> Result<Stmt> {
        self.expect(
            TokenKind::ParenL,
            ErrorKind::FailedToFindToken,
            "'(' after for",
        )?;
        self.push_scope();
        let init = if self.check(TokenKind::Semicolon) {
            None
        } else if self.check_type_token() {
            Some(Box::new(Stmt::VarDecl(self.var_decl()?)))
        } else {
            Some(Box::new(Stmt::Expr(self.expr()?)))
        };
        self.expect(
            TokenKind::Semicolon,
            ErrorKind::FailedToFindToken,
            "';' after for init",
        )?;
        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect(
            TokenKind::Semicolon,
            ErrorKind::FailedToFindToken,
            "';' after for condition",
        )?;
        let incr = if self.check(TokenKind::ParenR) {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect(
            TokenKind::ParenR,
            ErrorKind::FailedToFindToken,
            "')' after for increment",
        )?;
        let body = Box::new(self.stmt()?);
        self.pop_scope();
        Ok(Stmt::For {
            init,
            cond,
            incr,
            body,
        })
    }

    fn return_stmt(&mut self) -> Result<Stmt> {
        let ret = self.expect(TokenKind::Return, ErrorKind::FailedToFindToken, "'return'")?;
        if self.check(TokenKind::Semicolon) {
            self.cursor += 1;
            return Ok(Stmt::Return {
                value: None,
                pos: ret.pos,
            });
        }
        let value = self.expr()?;
        self.expect(
            TokenKind::Semicolon,
            ErrorKind::FailedToFindToken,
            "';' after return expr",
        )?;
        Ok(Stmt::Return {
            value: Some(value),
            pos: ret.pos,
        })
    }

    fn var_decl(&mut self) -> Result<VarDecl> {
        let pos = self.peek()?.pos;
        let ty = self.type_name()?;
        let name = self.expect(
            TokenKind::Identifier,
            ErrorKind::ExpectedIdentifier,
            "variable name",
        )?;
        // Array declarators parse but carry no representation; the declared
        // name stays a scalar.
        while self.eat(TokenKind::BracketL) {
            if !self.check(TokenKind::BracketR) {
                self.expr()?;
            }
            self.expect(
                TokenKind::BracketR,
                ErrorKind::FailedToFindToken,
                "']' after array declarator",
            )?;
        }
        let init = if self.eat(TokenKind::Assign) {
            let rhs = self.expr()?;
            self.check_literal_against(ty, &rhs, "Variable initialization")?;
            Some(rhs)
        } else {
            None
        };
        self.declare(&name.lexeme, ty);
        Ok(VarDecl {
            ty,
            name: name.lexeme,
            init,
            pos,
        })
    }

    fn expr(&mut self) -> Result<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr> {
        let left = self.logical_or()?;
        if self.eat(TokenKind::Assign) {
            let rhs = self.assignment()?;
            if let ExprKind::Ident(name) = &left.kind {
                if let Some(declared) = self.lookup(name) {
                    self.check_literal_against(declared, &rhs, "Assignment")?;
                }
            }
            let pos = left.pos;
            return Ok(self.mk(
                pos,
                ExprKind::Binary {
                    op: BinaryOp::Assign,
                    lhs: Box::new(left),
                    rhs: Box::new(rhs),
                },
            ));
        }
        Ok(left)
    }

    fn logical_or(&mut self) -> Result<Expr> {
        let mut expr = self.logical_and()?;
        while self.eat(TokenKind::OrOr) {
            let rhs = self.logical_and()?;
            expr = self.binary(BinaryOp::Or, expr, rhs);
        }
        Ok(expr)
    }

    fn logical_and(&mut self) -> Result<Expr> {
        let mut expr = self.bit_or()?;
        while self.eat(TokenKind::AndAnd) {
            let rhs = self.bit_or()?;
            expr = self.binary(BinaryOp::And, expr, rhs);
        }
        Ok(expr)
    }

    fn bit_or(&mut self) -> Result<Expr> {
        let mut expr = self.bit_xor()?;
        while self.eat(TokenKind::Pipe) {
            let rhs = self.bit_xor()?;
            expr = self.binary(BinaryOp::BitOr, expr, rhs);
        }
        Ok(expr)
    }

    fn bit_xor(&mut self) -> Result<Expr> {
        let mut expr = self.bit_and()?;
        while self.eat(TokenKind::Caret) {
            let rhs = self.bit_and()?;
            expr = self.binary(BinaryOp::BitXor, expr, rhs);
        }
        Ok(expr)
    }

    fn bit_and(&mut self) -> Result<Expr> {
        let mut expr = self.equality()?;
        while self.eat(TokenKind::Amp) {
            let rhs = self.equality()?;
            expr = self.binary(BinaryOp::BitAnd, expr, rhs);
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut expr = self.relational()?;
        while let Some(kind) = self.eat_any(&[TokenKind::EqEq, TokenKind::NotEq]) {
            let op = if kind == TokenKind::EqEq {
                BinaryOp::Eq
            } else {
                BinaryOp::Ne
            };
            let rhs = self.relational()?;
            expr = self.binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn relational(&mut self) -> Result<Expr> {
        let mut expr = self.shift()?;
        while let Some(kind) = self.eat_any(&[
            TokenKind::Lt,
            TokenKind::Le,
            TokenKind::Gt,
            TokenKind::Ge,
        ]) {
            let op = match kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                _ => BinaryOp::Ge,
            };
            let rhs = self.shift()?;
            expr = self.binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn shift(&mut self) -> Result<Expr> {
        let mut expr = self.additive()?;
        while let Some(kind) = self.eat_any(&[TokenKind::Shl, TokenKind::Shr]) {
            let op = if kind == TokenKind::Shl {
                BinaryOp::Shl
            } else {
                BinaryOp::Shr
            };
            let rhs = self.additive()?;
            expr = self.binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut expr = self.multiplicative()?;
        while let Some(kind) = self.eat_any(&[TokenKind::Plus, TokenKind::Minus]) {
            let op = if kind == TokenKind::Plus {
                BinaryOp::Add
            } else {
                BinaryOp::Sub
            };
            let rhs = self.multiplicative()?;
            expr = self.binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut expr = self.unary()?;
        while let Some(kind) =
            self.eat_any(&[TokenKind::Star, TokenKind::Slash, TokenKind::Percent])
        {
            let op = match kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => BinaryOp::Rem,
            };
            let rhs = self.unary()?;
            expr = self.binary(op, expr, rhs);
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek_kind() {
            Some(TokenKind::Not) => UnaryOp::Not,
            Some(TokenKind::Tilde) => UnaryOp::BitNot,
            Some(TokenKind::Minus) => UnaryOp::Neg,
            Some(TokenKind::Plus) => UnaryOp::Pos,
            _ => return self.postfix(),
        };
        let pos = self.peek()?.pos;
        self.cursor += 1;
        let operand = Box::new(self.unary()?);
        Ok(self.mk(pos, ExprKind::Unary { op, operand }))
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(TokenKind::ParenL) {
                let mut args = Vec::new();
                if !self.check(TokenKind::ParenR) {
                    args.push(self.expr()?);
                    while self.eat(TokenKind::Comma) {
                        args.push(self.expr()?);
                    }
                }
                self.expect(
                    TokenKind::ParenR,
                    ErrorKind::FailedToFindToken,
                    "')' after call args",
                )?;
                let pos = expr.pos;
                expr = self.mk(
                    pos,
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                );
            } else if self.eat(TokenKind::BracketL) {
                let index = self.expr()?;
                self.expect(
                    TokenKind::BracketR,
                    ErrorKind::FailedToFindToken,
                    "']' after index",
                )?;
                let pos = expr.pos;
                expr = self.mk(
                    pos,
                    ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        if let Some(tok) = self.eat_token(TokenKind::IntLit) {
            let value = tok.value.parse().unwrap_or(i64::MAX);
            return Ok(self.mk(tok.pos, ExprKind::IntLit { raw: tok.value, value }));
        }
        if let Some(tok) = self.eat_token(TokenKind::FloatLit) {
            let value = tok.value.parse().unwrap_or(f64::MAX);
            return Ok(self.mk(tok.pos, ExprKind::FloatLit { raw: tok.value, value }));
        }
        if let Some(tok) = self.eat_token(TokenKind::StringLit) {
            return Ok(self.mk(tok.pos, ExprKind::StringLit(tok.value)));
        }
        if let Some(tok) = self.eat_token(TokenKind::CharLit) {
            return Ok(self.mk(tok.pos, ExprKind::CharLit(tok.value)));
        }
        // `true` and `false` are not keywords; they arrive as identifiers.
        if self.check_bool_ident() {
            let tok = self.tokens[self.cursor].clone();
            self.cursor += 1;
            return Ok(self.mk(tok.pos, ExprKind::BoolLit(tok.lexeme == "true")));
        }
        if let Some(tok) = self.eat_token(TokenKind::Identifier) {
            return Ok(self.mk(tok.pos, ExprKind::Ident(tok.lexeme)));
        }
        if self.eat(TokenKind::ParenL) {
            // Grouping produces no node of its own.
            let expr = self.expr()?;
            self.expect(
                TokenKind::ParenR,
                ErrorKind::FailedToFindToken,
                "')' to close grouping",
            )?;
            return Ok(expr);
        }
        if self.at_end() {
            return Err(Error {
                kind: ErrorKind::UnexpectedEof,
                message: "Expected expression, found EOF".into(),
                offending: None,
            });
        }
        let tok = self.tokens[self.cursor].clone();
        Err(Error {
            kind: ErrorKind::ExpectedExpr,
            message: format!("Expected expression, got {tok}"),
            offending: Some(tok),
        })
    }
}

// Token-buffer and coherence-frame plumbing.
impl Parser {
    fn at_end(&self) -> bool {
        self.cursor >= self.tokens.len()
    }

    fn peek(&self) -> Result<&Token> {
        self.tokens.get(self.cursor).ok_or_else(|| Error {
            kind: ErrorKind::UnexpectedEof,
            message: "Unexpected end of input".into(),
            offending: None,
        })
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.cursor).map(|t| t.kind)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn check_type_token(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(
                TokenKind::Int
                    | TokenKind::Float
                    | TokenKind::Bool
                    | TokenKind::String
                    | TokenKind::Char
            )
        )
    }

    fn check_bool_ident(&self) -> bool {
        match self.tokens.get(self.cursor) {
            Some(t) => {
                t.kind == TokenKind::Identifier && (t.lexeme == "true" || t.lexeme == "false")
            }
            None => false,
        }
    }

    /// Advances past `kind` if it is next.
    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Advances past `kind` and yields the token if it is next.
    fn eat_token(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            let tok = self.tokens[self.cursor].clone();
            self.cursor += 1;
            Some(tok)
        } else {
            None
        }
    }

    fn eat_any(&mut self, kinds: &[TokenKind]) -> Option<TokenKind> {
        let next = self.peek_kind()?;
        if kinds.contains(&next) {
            self.cursor += 1;
            Some(next)
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind, err: ErrorKind, what: &str) -> Result<Token> {
        if let Some(tok) = self.eat_token(kind) {
            return Ok(tok);
        }
        if self.at_end() {
            return Err(Error {
                kind: ErrorKind::UnexpectedEof,
                message: format!("Expected {what} before EOF"),
                offending: None,
            });
        }
        let tok = self.tokens[self.cursor].clone();
        Err(Error {
            kind: err,
            message: format!("Expected {what}, got {tok}"),
            offending: Some(tok),
        })
    }

    fn mk(&mut self, pos: usize, kind: ExprKind) -> Expr {
        let id = ExprId(self.next_expr_id);
        self.next_expr_id += 1;
        Expr { id, pos, kind }
    }

    fn binary(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        let pos = lhs.pos;
        self.mk(
            pos,
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, ty: Type) {
        if self.scopes.is_empty() {
            self.push_scope();
        }
        self.scopes
            .last_mut()
            .expect("scope stack is non-empty")
            .insert(name.to_string(), ty);
    }

    fn lookup(&self, name: &str) -> Option<Type> {
        self.scopes
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).copied())
    }

    /// When the right-hand side is a pure literal whose kind contradicts the
    /// declared type, fail early with the matching `ExpectedXxxLit` kind.
    /// This duplicates a strictly stronger type-checker rule, but fires
    /// before resolution runs.
    fn check_literal_against(&self, expected: Type, rhs: &Expr, context: &str) -> Result<()> {
        let Some(got) = rhs.literal_type() else {
            return Ok(());
        };
        if got == expected {
            return Ok(());
        }
        let kind = match expected {
            Type::Bool => ErrorKind::ExpectedBoolLit,
            Type::Int => ErrorKind::ExpectedIntLit,
            Type::Float => ErrorKind::ExpectedFloatLit,
            Type::String => ErrorKind::ExpectedStringLit,
            _ => ErrorKind::ExpectedExpr,
        };
        Err(Error {
            kind,
            message: format!("{context}: initializer/assignment literal does not match declared type"),
            offending: None,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    UnexpectedEof,
    FailedToFindToken,
    ExpectedTypeToken,
    ExpectedIdentifier,
    UnexpectedToken,
    ExpectedFloatLit,
    ExpectedIntLit,
    ExpectedStringLit,
    ExpectedBoolLit,
    ExpectedExpr,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::UnexpectedEof => "UnexpectedEOF",
            ErrorKind::FailedToFindToken => "FailedToFindToken",
            ErrorKind::ExpectedTypeToken => "ExpectedTypeToken",
            ErrorKind::ExpectedIdentifier => "ExpectedIdentifier",
            ErrorKind::UnexpectedToken => "UnexpectedToken",
            ErrorKind::ExpectedFloatLit => "ExpectedFloatLit",
            ErrorKind::ExpectedIntLit => "ExpectedIntLit",
            ErrorKind::ExpectedStringLit => "ExpectedStringLit",
            ErrorKind::ExpectedBoolLit => "ExpectedBoolLit",
            ErrorKind::ExpectedExpr => "ExpectedExpr",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub offending: Option<Token>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.name(), self.message)
    }
}
