use crate::script::ast::{Arg, BinaryOp, Call, Expr, Stmt};
use crate::script::error::ScriptError;
use crate::script::lexer::{Span, Token, TokenKind, lex};

/// Deepest allowed chain of parentheses, unary signs and call arguments.
pub(crate) const MAX_NESTING: usize = 64;
/// Deepest allowed expression tree, counting operator chains like `a + b + c`.
pub(crate) const MAX_EXPR_DEPTH: usize = 256;

/// Parse a whole step program into statements.
pub(crate) fn parse_program(src: &str) -> Result<Vec<Stmt>, ScriptError> {
    let tokens = lex(src)?;
    let mut p = Parser {
        tokens,
        pos: 0,
        nesting: 0,
    };
    let mut stmts = Vec::new();
    loop {
        while p.consume(TokenKind::Newline) || p.consume(TokenKind::Semi) {}
        if p.peek().kind == TokenKind::Eof {
            return Ok(stmts);
        }
        stmts.push(p.parse_stmt()?);
        if !(p.consume(TokenKind::Newline) || p.consume(TokenKind::Semi)) {
            p.expect(TokenKind::Eof)?;
            return Ok(stmts);
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
}

/// An expression with the depth of its tree.
type Parsed = (Expr, usize);

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn bump(&mut self) -> &Token {
        let t = &self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn span(&self) -> Span {
        self.peek().span
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ScriptError> {
        if self.peek().kind == kind {
            self.bump();
            Ok(())
        } else {
            Err(ScriptError::new(
                self.span().start,
                format!(
                    "expected {}, found {}",
                    describe(&kind),
                    describe(&self.peek().kind)
                ),
            ))
        }
    }

    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(
        &mut self,
        offset: usize,
        f: impl FnOnce(&mut Self) -> Result<T, ScriptError>,
    ) -> Result<T, ScriptError> {
        if self.nesting >= MAX_NESTING {
            return Err(ScriptError::new(offset, "expression nested too deeply"));
        }
        self.nesting += 1;
        let out = f(self);
        self.nesting -= 1;
        out
    }

    fn check_depth(depth: usize, offset: usize) -> Result<usize, ScriptError> {
        if depth > MAX_EXPR_DEPTH {
            return Err(ScriptError::new(offset, "expression nested too deeply"));
        }
        Ok(depth)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ScriptError> {
        let start = self.span().start;
        if self.consume(TokenKind::Let) {
            let t = self.bump().clone();
            let TokenKind::Ident(name) = t.kind else {
                return Err(ScriptError::new(
                    t.span.start,
                    format!("expected a name after 'let', found {}", describe(&t.kind)),
                ));
            };
            self.expect(TokenKind::Eq)?;
            let value = self.parse_expr()?;
            return Ok(Stmt::Let {
                name,
                value,
                offset: start,
            });
        }

        match self.parse_expr()? {
            Expr::Call(call) => Ok(Stmt::Draw(call)),
            _ => Err(ScriptError::new(
                start,
                "expected a drawing call or a let binding",
            )),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ScriptError> {
        self.parse_nested_expr().map(|(e, _)| e)
    }

    fn parse_nested_expr(&mut self) -> Result<Parsed, ScriptError> {
        let offset = self.span().start;
        self.nested(offset, Self::parse_term)
    }

    fn parse_term(&mut self) -> Result<Parsed, ScriptError> {
        let (mut e, mut depth) = self.parse_factor()?;
        loop {
            let offset = self.span().start;
            let op = if self.consume(TokenKind::Plus) {
                BinaryOp::Add
            } else if self.consume(TokenKind::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let (r, rd) = self.parse_factor()?;
            depth = Self::check_depth(depth.max(rd) + 1, offset)?;
            e = Expr::Binary {
                op,
                left: Box::new(e),
                right: Box::new(r),
                offset,
            };
        }
        Ok((e, depth))
    }

    fn parse_factor(&mut self) -> Result<Parsed, ScriptError> {
        let (mut e, mut depth) = self.parse_unary()?;
        loop {
            let offset = self.span().start;
            let op = if self.consume(TokenKind::Star) {
                BinaryOp::Mul
            } else if self.consume(TokenKind::Slash) {
                BinaryOp::Div
            } else if self.consume(TokenKind::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };
            let (r, rd) = self.parse_unary()?;
            depth = Self::check_depth(depth.max(rd) + 1, offset)?;
            e = Expr::Binary {
                op,
                left: Box::new(e),
                right: Box::new(r),
                offset,
            };
        }
        Ok((e, depth))
    }

    fn parse_unary(&mut self) -> Result<Parsed, ScriptError> {
        let offset = self.span().start;
        if self.consume(TokenKind::Minus) {
            let (e, depth) = self.nested(offset, Self::parse_unary)?;
            let depth = Self::check_depth(depth + 1, offset)?;
            return Ok((
                Expr::Neg {
                    expr: Box::new(e),
                    offset,
                },
                depth,
            ));
        }
        if self.consume(TokenKind::Plus) {
            return self.nested(offset, Self::parse_unary);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Parsed, ScriptError> {
        let t = self.bump().clone();
        match t.kind {
            TokenKind::Number(v) => Ok((Expr::Num(v), 1)),
            TokenKind::Str(s) => Ok((Expr::Str(s), 1)),
            TokenKind::Ident(name) => {
                if self.consume(TokenKind::LParen) {
                    let (args, depth) = self.parse_args()?;
                    let depth = Self::check_depth(depth + 1, t.span.start)?;
                    Ok((
                        Expr::Call(Call {
                            func: name,
                            args,
                            offset: t.span.start,
                        }),
                        depth,
                    ))
                } else {
                    Ok((
                        Expr::Var {
                            name,
                            offset: t.span.start,
                        },
                        1,
                    ))
                }
            }
            TokenKind::LParen => {
                let e = self.parse_nested_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(e)
            }
            other => Err(ScriptError::new(
                t.span.start,
                format!("unexpected {}", describe(&other)),
            )),
        }
    }

    /// Arguments up to the closing `)`, with the depth of the deepest one.
    fn parse_args(&mut self) -> Result<(Vec<Arg>, usize), ScriptError> {
        let mut args = Vec::new();
        let mut depth = 0;
        if self.consume(TokenKind::RParen) {
            return Ok((args, depth));
        }
        loop {
            let offset = self.span().start;
            let name = match (self.peek().kind.clone(), self.peek_at(1)) {
                (TokenKind::Ident(name), TokenKind::Colon) => {
                    self.bump();
                    self.bump();
                    Some(name)
                }
                _ => None,
            };
            let (value, d) = self.parse_nested_expr()?;
            depth = depth.max(d);
            args.push(Arg {
                name,
                value,
                offset,
            });
            if self.consume(TokenKind::Comma) {
                // Trailing comma before ')'.
                if self.consume(TokenKind::RParen) {
                    return Ok((args, depth));
                }
                continue;
            }
            self.expect(TokenKind::RParen)?;
            return Ok((args, depth));
        }
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(s) => format!("identifier '{s}'"),
        TokenKind::Number(v) => format!("number {v}"),
        TokenKind::Str(_) => "string".to_owned(),
        TokenKind::Let => "'let'".to_owned(),
        TokenKind::LParen => "'('".to_owned(),
        TokenKind::RParen => "')'".to_owned(),
        TokenKind::Comma => "','".to_owned(),
        TokenKind::Colon => "':'".to_owned(),
        TokenKind::Eq => "'='".to_owned(),
        TokenKind::Plus => "'+'".to_owned(),
        TokenKind::Minus => "'-'".to_owned(),
        TokenKind::Star => "'*'".to_owned(),
        TokenKind::Slash => "'/'".to_owned(),
        TokenKind::Percent => "'%'".to_owned(),
        TokenKind::Newline => "end of line".to_owned(),
        TokenKind::Semi => "';'".to_owned(),
        TokenKind::Eof => "end of input".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_precedence() {
        let stmts = parse_program("let a = 1 + 2 * 3").unwrap();
        match &stmts[0] {
            Stmt::Let {
                value: Expr::Binary {
                    op: BinaryOp::Add, ..
                },
                ..
            } => {}
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn parses_named_args_and_separators() {
        let stmts = parse_program("rect(1, 2, 3, 4, fill: \"red\"); line(0,0,1,1)\n\n").unwrap();
        assert_eq!(stmts.len(), 2);
        let Stmt::Draw(call) = &stmts[0] else {
            panic!("expected draw");
        };
        assert_eq!(call.func, "rect");
        assert_eq!(call.args.len(), 5);
        assert_eq!(call.args[4].name.as_deref(), Some("fill"));
    }

    #[test]
    fn bare_expression_statement_is_rejected() {
        let err = parse_program("1 + 2").unwrap_err();
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn two_statements_on_one_line_need_a_separator() {
        let err = parse_program("rect(0,0,1,1) line(0,0,1,1)").unwrap_err();
        assert_eq!(err.offset, 14);
    }

    #[test]
    fn missing_paren_points_at_end() {
        let src = "rect(1, 2";
        let err = parse_program(src).unwrap_err();
        assert_eq!(err.offset, src.len());
    }
}
