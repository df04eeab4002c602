//! C3: Pratt-style precedence parser producing the typed AST.
//!
//! Follows the query-engine parser's overall shape (a `Parser` struct holding
//! a token vector and cursor, `parse_expr(min_prec)` doing the precedence
//! climbing) but drives a full imperative statement grammar — if/while/
//! foreach/switch/function/local/return/assignment — rather than jq's
//! pipe-expression grammar.

mod precedence;

use crate::ast::{Expr, InfixOp, PostfixOp, PrefixOp, Program, Stmt, SwitchCase};
use crate::error::{ParseError, Position};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::value::Value;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
    in_function_depth: u32,
    in_ternary_branch: bool,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(source: &str) -> Self {
        Self {
            tokens: Lexer::new(source).tokenize(),
            pos: 0,
            errors: Vec::new(),
            in_function_depth: 0,
            in_ternary_branch: false,
        }
    }

    /// Parses the whole program. Returns the first accumulated error, if
    /// any; use [`Parser::errors`] for the complete list.
    pub fn parse(&mut self) -> PResult<Program> {
        let program = self.parse_program();
        match self.errors.first() {
            Some(e) => Err(e.clone()),
            None => Ok(program),
        }
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    // ---- token cursor -------------------------------------------------

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.current_kind() == kind
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected {what}, found {:?}",
                self.current_kind()
            )))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.current().pos)
    }

    fn fatal_if_illegal_or_eof(&self) -> Option<ParseError> {
        match self.current_kind() {
            TokenKind::Illegal(msg) => Some(self.error(format!("illegal token: {msg}"))),
            TokenKind::Eof => Some(self.error("unexpected end of input")),
            _ => None,
        }
    }

    /// Resync after a non-fatal parse error: skip to the next `;` or a
    /// brace boundary, so a trailing statement doesn't cascade into dozens
    /// of spurious diagnostics.
    fn recover(&mut self) {
        loop {
            match self.current_kind() {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::RBrace | TokenKind::Eof => return,
                TokenKind::Illegal(_) => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ---- program / statements ------------------------------------------

    fn parse_program(&mut self) -> Program {
        let mut statements = Vec::new();
        while !self.at_eof() {
            if let Some(fatal) = self.fatal_if_illegal_or_eof() {
                self.errors.push(fatal);
                break;
            }
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(e) => {
                    self.errors.push(e);
                    if self.fatal_if_illegal_or_eof().is_some() {
                        break;
                    }
                    self.recover();
                }
            }
        }
        Program { statements }
    }

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if let Some(fatal) = self.fatal_if_illegal_or_eof() {
                return Err(fatal);
            }
            statements.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(statements)
    }

    fn parse_statement(&mut self) -> PResult<Stmt> {
        match self.current_kind().clone() {
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Foreach => self.parse_foreach(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Function => self.parse_function_def(),
            TokenKind::Local => self.parse_local(),
            TokenKind::Return => self.parse_return(),
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Block(Vec::new()))
            }
            _ => {
                let pos = self.current().pos;
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semicolon, "';'")?;
                let _ = pos;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos; // `if`
        self.expect(TokenKind::LParen, "'(' after 'if'")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')' after if condition")?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.check(&TokenKind::Else) {
            self.advance();
            if self.check(&TokenKind::If) {
                Some(vec![self.parse_if()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If { cond, then_branch, else_branch, pos })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        self.expect(TokenKind::LParen, "'(' after 'while'")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')' after while condition")?;
        let body = self.parse_block()?;
        Ok(Stmt::While { cond, body, pos })
    }

    fn parse_foreach(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let first = self.parse_ident_name("foreach binding")?;
        let (index_binding, value_binding) = if self.check(&TokenKind::Comma) {
            self.advance();
            let second = self.parse_ident_name("foreach value binding")?;
            (Some(first), second)
        } else {
            (None, first)
        };
        self.expect(TokenKind::In, "'in'")?;
        let iterable = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Stmt::Foreach { index_binding, value_binding, iterable, body, pos })
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        self.expect(TokenKind::LParen, "'(' after 'switch'")?;
        let subject = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')' after switch subject")?;
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut cases = Vec::new();
        let mut default = None;
        while !self.check(&TokenKind::RBrace) {
            if let Some(fatal) = self.fatal_if_illegal_or_eof() {
                return Err(fatal);
            }
            if self.check(&TokenKind::Case) {
                self.advance();
                let mut matches = vec![self.parse_expression()?];
                while self.check(&TokenKind::Comma) {
                    self.advance();
                    matches.push(self.parse_expression()?);
                }
                let body = self.parse_block()?;
                cases.push(SwitchCase { matches, body });
            } else if self.check(&TokenKind::Default) {
                self.advance();
                if default.is_some() {
                    return Err(self.error("duplicate 'default' case in switch"));
                }
                default = Some(self.parse_block()?);
            } else {
                return Err(self.error("expected 'case' or 'default' in switch body"));
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Stmt::Switch { subject, cases, default, pos })
    }

    fn parse_function_def(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let name = self.parse_ident_name("function name")?;
        self.expect(TokenKind::LParen, "'(' after function name")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            params.push(self.parse_ident_name("parameter name")?);
            while self.check(&TokenKind::Comma) {
                self.advance();
                params.push(self.parse_ident_name("parameter name")?);
            }
        }
        self.expect(TokenKind::RParen, "')' after parameters")?;
        self.in_function_depth += 1;
        let body = self.parse_block();
        self.in_function_depth -= 1;
        Ok(Stmt::FunctionDef { name, params, body: body?, pos })
    }

    fn parse_local(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        if self.in_function_depth == 0 {
            return Err(ParseError::new("'local' is only legal inside a function body", pos));
        }
        let name = self.parse_ident_name("local variable name")?;
        self.expect(TokenKind::Semicolon, "';' after local declaration")?;
        Ok(Stmt::Local { name, pos })
    }

    fn parse_return(&mut self) -> PResult<Stmt> {
        let pos = self.advance().pos;
        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "';' after return")?;
        Ok(Stmt::Return { value, pos })
    }

    fn parse_ident_name(&mut self, what: &str) -> PResult<String> {
        match self.current_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(format!("expected {what}, found {:?}", self.current_kind()))),
        }
    }

    // ---- expressions ----------------------------------------------------

    pub fn parse_expression(&mut self) -> PResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        let lhs = self.parse_ternary()?;
        let compound = match self.current_kind() {
            TokenKind::Assign => Some(None),
            TokenKind::PlusAssign => Some(Some(InfixOp::Add)),
            TokenKind::MinusAssign => Some(Some(InfixOp::Sub)),
            TokenKind::StarAssign => Some(Some(InfixOp::Mul)),
            TokenKind::SlashAssign => Some(Some(InfixOp::Div)),
            _ => None,
        };
        let Some(op) = compound else { return Ok(lhs) };
        let pos = self.advance().pos;
        if let Expr::Index { base, index, .. } = lhs {
            let rhs = self.parse_assignment()?;
            let value = match op {
                None => rhs,
                Some(op) => Expr::Infix {
                    op,
                    left: Box::new(Expr::Index { base: base.clone(), index: index.clone(), pos }),
                    right: Box::new(rhs),
                    pos,
                },
            };
            return Ok(Expr::IndexAssign { base, index, value: Box::new(value), pos });
        }
        let name = match &lhs {
            Expr::Ident { name, .. } => name.clone(),
            _ => return Err(ParseError::new("assignment requires an identifier on the left-hand side", pos)),
        };
        let rhs = self.parse_assignment()?;
        let value = match op {
            None => rhs,
            Some(op) => Expr::Infix {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
                pos,
            },
        };
        Ok(Expr::Assign { name, value: Box::new(value), pos })
    }

    fn parse_ternary(&mut self) -> PResult<Expr> {
        let cond = self.parse_binary(precedence::LOGICAL)?;
        if !self.check(&TokenKind::Question) {
            return Ok(cond);
        }
        let pos = self.advance().pos;
        if self.in_ternary_branch {
            return Err(ParseError::new("nested ternary expressions are not allowed", pos));
        }
        self.in_ternary_branch = true;
        let then_branch = match self.parse_binary(precedence::LOGICAL) {
            Ok(e) => e,
            Err(e) => {
                self.in_ternary_branch = false;
                return Err(e);
            }
        };
        if let Err(e) = self.expect(TokenKind::Colon, "':' in ternary expression") {
            self.in_ternary_branch = false;
            return Err(e);
        }
        let else_branch = self.parse_binary(precedence::LOGICAL);
        self.in_ternary_branch = false;
        let else_branch = else_branch?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
            pos,
        })
    }

    /// Precedence-climbing parse of binary operators from `min_prec` up
    /// through `MODULO`; falls through to prefix/primary parsing at the top.
    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut left = self.parse_prefix()?;
        loop {
            let Some((prec, op, right_assoc)) = precedence::infix(self.current_kind()) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            let pos = self.advance().pos;
            let next_min = if right_assoc { prec } else { prec + 1 };
            let right = self.parse_binary(next_min)?;
            left = Expr::Infix { op, left: Box::new(left), right: Box::new(right), pos };
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> PResult<Expr> {
        match self.current_kind().clone() {
            TokenKind::Minus => {
                let pos = self.advance().pos;
                let expr = self.parse_prefix()?;
                Ok(Expr::Prefix { op: PrefixOp::Neg, expr: Box::new(expr), pos })
            }
            TokenKind::Bang => {
                let pos = self.advance().pos;
                let expr = self.parse_prefix()?;
                Ok(Expr::Prefix { op: PrefixOp::Not, expr: Box::new(expr), pos })
            }
            TokenKind::Root => {
                let pos = self.advance().pos;
                let expr = self.parse_prefix()?;
                Ok(Expr::Prefix { op: PrefixOp::Root, expr: Box::new(expr), pos })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_call_index()?;
        loop {
            match self.current_kind() {
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let op = if matches!(self.current_kind(), TokenKind::PlusPlus) {
                        PostfixOp::Inc
                    } else {
                        PostfixOp::Dec
                    };
                    let pos = self.advance().pos;
                    match &expr {
                        Expr::Ident { name, .. } => {
                            expr = Expr::Postfix { op, target: name.clone(), pos };
                        }
                        _ => {
                            return Err(ParseError::new(
                                "'++'/'--' require an identifier operand",
                                pos,
                            ));
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_index(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current_kind() {
                TokenKind::LBracket => {
                    let pos = self.advance().pos;
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::Index { base: Box::new(expr), index: Box::new(index), pos };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr::Literal { value: Value::Integer(n), pos: tok.pos })
            }
            TokenKind::Float(n) => {
                self.advance();
                Ok(Expr::Literal { value: Value::Float(n), pos: tok.pos })
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Literal { value: Value::string(s), pos: tok.pos })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal { value: Value::Boolean(true), pos: tok.pos })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal { value: Value::Boolean(false), pos: tok.pos })
            }
            TokenKind::Regexp { pattern, flags } => {
                self.advance();
                Ok(Expr::Literal { value: Value::regexp(pattern, flags), pos: tok.pos })
            }
            TokenKind::HostVar(name) => {
                self.advance();
                Ok(Expr::HostVar { name, pos: tok.pos })
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RParen) {
                        args.push(self.parse_expression()?);
                        while self.check(&TokenKind::Comma) {
                            self.advance();
                            args.push(self.parse_expression()?);
                        }
                    }
                    self.expect(TokenKind::RParen, "')' after call arguments")?;
                    Ok(Expr::Call { name, args, pos: tok.pos })
                } else {
                    Ok(Expr::Ident { name, pos: tok.pos })
                }
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                let pos = self.advance().pos;
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    elements.push(self.parse_expression()?);
                    while self.check(&TokenKind::Comma) {
                        self.advance();
                        elements.push(self.parse_expression()?);
                    }
                }
                self.expect(TokenKind::RBracket, "']'")?;
                Ok(Expr::Array { elements, pos })
            }
            TokenKind::LBrace => {
                let pos = self.advance().pos;
                let mut entries = Vec::new();
                if !self.check(&TokenKind::RBrace) {
                    entries.push(self.parse_hash_entry()?);
                    while self.check(&TokenKind::Comma) {
                        self.advance();
                        entries.push(self.parse_hash_entry()?);
                    }
                }
                self.expect(TokenKind::RBrace, "'}'")?;
                Ok(Expr::HashLit { entries, pos })
            }
            other => Err(ParseError::new(format!("unexpected token {other:?}"), tok.pos)),
        }
    }

    fn parse_hash_entry(&mut self) -> PResult<(Expr, Expr)> {
        let key = self.parse_expression()?;
        self.expect(TokenKind::Colon, "':' in hash literal")?;
        let value = self.parse_expression()?;
        Ok((key, value))
    }
}

/// Convenience wrapper around constructing a `Parser` and parsing once.
pub fn parse(source: &str) -> Result<Program, ParseError> {
    Parser::new(source).parse()
}

pub fn position_of(_: &str) -> Position {
    Position::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        parse(src).unwrap_or_else(|e| panic!("parse error on {src:?}: {e}"))
    }

    #[test]
    fn return_arithmetic() {
        let p = parse_ok("return 1 + 2 * 3;");
        assert_eq!(p.statements.len(), 1);
    }

    #[test]
    fn if_else() {
        parse_ok("if (1) { return true; } else { return false; }");
    }

    #[test]
    fn foreach_with_index() {
        parse_ok("foreach k, v in h { print(k); }");
    }

    #[test]
    fn switch_with_default() {
        parse_ok("switch (x) { case 1, 2 { return 1; } default { return 2; } }");
    }

    #[test]
    fn duplicate_default_is_error() {
        let err = parse("switch (x) { default { return 1; } default { return 2; } }").unwrap_err();
        assert!(err.message.contains("duplicate"));
    }

    #[test]
    fn local_outside_function_is_error() {
        let err = parse("local x;").unwrap_err();
        assert!(err.message.contains("function body"));
    }

    #[test]
    fn function_definition_with_local() {
        parse_ok("function dbl(n) { local r; r = n * 2; return r; }");
    }

    #[test]
    fn nested_ternary_is_error() {
        let err = parse("return a ? b ? c : d : e;").unwrap_err();
        assert!(err.message.contains("nested ternary"));
    }

    #[test]
    fn assignment_requires_identifier() {
        let err = parse("1 = 2;").unwrap_err();
        assert!(err.message.contains("identifier"));
    }

    #[test]
    fn postfix_increment() {
        parse_ok("x++;");
    }

    #[test]
    fn return_requires_semicolon() {
        let err = parse("return 1").unwrap_err();
        assert!(err.message.contains("';'") || err.message.contains("end of input"));
    }

    #[test]
    fn host_var_reference() {
        parse_ok("return $time;");
    }

    #[test]
    fn index_and_hash_literal() {
        parse_ok(r#"return {"a": 1}["a"];"#);
    }
}
