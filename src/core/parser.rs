// src/core/parser.rs

use crate::{
    constants::MAX_NESTING_DEPTH,
    core::{
        compiler,
        lexer::{Keyword, Lexer, SyntaxError, Token, TokenKind},
    },
    models::{Argument, BinaryOp, Expr, ExprKind, Literal, Stmt, StmtKind, UnaryOp},
};

/// Tokenizes and parses script source into its top-level statements.
pub(crate) fn parse_script(source: &str) -> Result<Vec<Stmt>, SyntaxError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_statements_until_eof()
}

struct Parser {
    tokens: Vec<Token>,
    current: usize,
    /// Statements and expressions currently being parsed, innermost last.
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            depth: 0,
        }
    }

    /// Runs `parse` one nesting level deeper, failing once the limit is reached.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error_here(&format!(
                "nesting deeper than {} levels",
                MAX_NESTING_DEPTH
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_statements_until_eof(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::Eof) {
            if self.matches(&TokenKind::Semicolon) {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.consume(&TokenKind::LBrace, "expected '{' to start block")?;
        self.parse_block_body()
    }

    /// Parses statements up to and including the closing `}`.
    fn parse_block_body(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(self.error_here("expected '}' before end of script"));
            }
            if self.matches(&TokenKind::Semicolon) {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        self.consume(&TokenKind::RBrace, "expected '}'")?;
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Stmt, SyntaxError> {
        self.nested(Self::parse_statement_inner)
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.peek().line;
        let kind = match self.peek().kind {
            TokenKind::Keyword(Keyword::Def) => self.parse_def()?,
            TokenKind::Keyword(Keyword::If) => self.parse_if()?,
            TokenKind::Keyword(Keyword::For) => self.parse_for()?,
            TokenKind::Keyword(Keyword::Return) => self.parse_return()?,
            TokenKind::Identifier if self.peek_nth(1).kind == TokenKind::Assign => {
                let name = self.advance().lexeme;
                self.advance();
                StmtKind::Assign {
                    name,
                    value: self.parse_expression()?,
                }
            }
            _ => StmtKind::Expr(self.parse_expression()?),
        };
        self.matches(&TokenKind::Semicolon);
        Ok(Stmt { kind, line })
    }

    fn parse_def(&mut self) -> Result<StmtKind, SyntaxError> {
        self.advance();
        let name = self.consume_identifier("expected variable name after 'def'")?;
        let value = if self.matches(&TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(StmtKind::Def { name, value })
    }

    fn parse_if(&mut self) -> Result<StmtKind, SyntaxError> {
        self.advance();
        self.consume(&TokenKind::LParen, "expected '(' after 'if'")?;
        let condition = self.parse_expression()?;
        self.consume(&TokenKind::RParen, "expected ')' after condition")?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.matches_keyword(Keyword::Else) {
            if self.check(&TokenKind::Keyword(Keyword::If)) {
                let line = self.peek().line;
                let nested = self.parse_if()?;
                Some(vec![Stmt { kind: nested, line }])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(StmtKind::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_for(&mut self) -> Result<StmtKind, SyntaxError> {
        self.advance();
        self.consume(&TokenKind::LParen, "expected '(' after 'for'")?;
        let binding = self.consume_identifier("expected loop variable")?;
        if !self.matches_keyword(Keyword::In) {
            return Err(self.error_here("expected 'in' after loop variable"));
        }
        let iterable = self.parse_expression()?;
        self.consume(&TokenKind::RParen, "expected ')' after loop header")?;
        let body = self.parse_block()?;
        Ok(StmtKind::For {
            binding,
            iterable,
            body,
        })
    }

    fn parse_return(&mut self) -> Result<StmtKind, SyntaxError> {
        let keyword = self.advance();
        let next = self.peek();
        let ends_here = next.line != keyword.line
            || matches!(
                next.kind,
                TokenKind::RBrace | TokenKind::Semicolon | TokenKind::Eof
            );
        if ends_here {
            Ok(StmtKind::Return(None))
        } else {
            Ok(StmtKind::Return(Some(self.parse_expression()?)))
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, SyntaxError> {
        self.nested(Self::parse_or)
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_and()?;
        while self.matches(&TokenKind::DoublePipe) {
            let right = self.parse_and()?;
            expr = binary(BinaryOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_equality()?;
        while self.matches(&TokenKind::DoubleAmpersand) {
            let right = self.parse_equality()?;
            expr = binary(BinaryOp::And, expr, right);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_comparison()?;
        loop {
            let op = if self.matches(&TokenKind::EqualEqual) {
                BinaryOp::Equal
            } else if self.matches(&TokenKind::BangEqual) {
                BinaryOp::NotEqual
            } else {
                break;
            };
            let right = self.parse_comparison()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_term()?;
        loop {
            let op = if self.matches(&TokenKind::LessEqual) {
                BinaryOp::LessEqual
            } else if self.matches(&TokenKind::GreaterEqual) {
                BinaryOp::GreaterEqual
            } else if self.matches(&TokenKind::Less) {
                BinaryOp::Less
            } else if self.matches(&TokenKind::Greater) {
                BinaryOp::Greater
            } else {
                break;
            };
            let right = self.parse_term()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = if self.matches(&TokenKind::Plus) {
                BinaryOp::Add
            } else if self.matches(&TokenKind::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_factor()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = if self.matches(&TokenKind::Star) {
                BinaryOp::Mul
            } else if self.matches(&TokenKind::Slash) {
                BinaryOp::Div
            } else if self.matches(&TokenKind::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.parse_unary()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.peek().line;
        let op = if self.matches(&TokenKind::Minus) {
            UnaryOp::Negate
        } else if self.matches(&TokenKind::Bang) {
            UnaryOp::Not
        } else {
            return self.parse_postfix();
        };
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr {
            kind: ExprKind::Unary {
                op,
                expr: Box::new(operand),
            },
            line,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary()?;
        loop {
            let line = self.peek().line;
            if self.matches(&TokenKind::LParen) {
                let mut args = self.parse_arguments()?;
                if self.check(&TokenKind::LBrace) {
                    args.push(Argument::Positional(self.parse_closure()?));
                }
                expr = make_call(expr, args, line);
            } else if self.matches(&TokenKind::Dot) {
                let field = self.consume_identifier("expected name after '.'")?;
                if self.check(&TokenKind::LBrace) {
                    let closure = self.parse_closure()?;
                    expr = Expr {
                        kind: ExprKind::MethodCall {
                            receiver: Box::new(expr),
                            method: field,
                            args: vec![Argument::Positional(closure)],
                        },
                        line,
                    };
                } else {
                    expr = Expr {
                        kind: ExprKind::Field {
                            target: Box::new(expr),
                            field,
                        },
                        line,
                    };
                }
            } else if self.matches(&TokenKind::LBracket) {
                let index = self.parse_expression()?;
                self.consume(&TokenKind::RBracket, "expected ']' after index")?;
                expr = Expr {
                    kind: ExprKind::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                    line,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Parses call arguments after `(` up to and including `)`.
    fn parse_arguments(&mut self) -> Result<Vec<Argument>, SyntaxError> {
        let mut args = Vec::new();
        if self.matches(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            if let Some(name) = self.named_key() {
                self.advance();
                self.advance();
                args.push(Argument::Named(name, self.parse_expression()?));
            } else {
                args.push(Argument::Positional(self.parse_expression()?));
            }
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(&TokenKind::RParen, "expected ')' after arguments")?;
        Ok(args)
    }

    /// Returns the key when the next two tokens are `key :`.
    fn named_key(&self) -> Option<String> {
        if self.peek_nth(1).kind != TokenKind::Colon {
            return None;
        }
        let token = self.peek();
        match token.kind {
            TokenKind::Identifier | TokenKind::String | TokenKind::Template | TokenKind::Int => {
                Some(token.lexeme.clone())
            }
            TokenKind::Keyword(_) => Some(token.lexeme.clone()),
            _ => None,
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.peek().clone();
        let line = token.line;
        let kind = match token.kind {
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                ExprKind::Literal(Literal::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                ExprKind::Literal(Literal::Bool(false))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                ExprKind::Literal(Literal::Null)
            }
            TokenKind::Int => {
                self.advance();
                let value = token
                    .lexeme
                    .parse::<i64>()
                    .map_err(|_| SyntaxError::new(line, "integer literal out of range"))?;
                ExprKind::Literal(Literal::Int(value))
            }
            TokenKind::String => {
                self.advance();
                ExprKind::Literal(Literal::String(token.lexeme))
            }
            TokenKind::Template => {
                self.advance();
                let components = compiler::tokenize_string(&token.lexeme)
                    .map_err(|e| SyntaxError::new(line, e.to_string()))?;
                compiler::template_expr_kind(components)
            }
            TokenKind::Identifier => {
                self.advance();
                ExprKind::Variable(token.lexeme)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.consume(&TokenKind::RParen, "expected ')' after expression")?;
                return Ok(inner);
            }
            TokenKind::LBracket => {
                self.advance();
                return self.parse_list_or_map(line);
            }
            TokenKind::LBrace => return self.parse_closure(),
            _ => {
                return Err(SyntaxError::new(
                    line,
                    format!("unexpected token '{}'", describe(&token)),
                ));
            }
        };
        Ok(Expr { kind, line })
    }

    /// Parses the body of `[...]` after the opening bracket.
    fn parse_list_or_map(&mut self, line: u32) -> Result<Expr, SyntaxError> {
        if self.check(&TokenKind::Colon) {
            self.advance();
            self.consume(&TokenKind::RBracket, "expected ']' after '[:'")?;
            return Ok(Expr {
                kind: ExprKind::Map(Vec::new()),
                line,
            });
        }
        if self.matches(&TokenKind::RBracket) {
            return Ok(Expr {
                kind: ExprKind::List(Vec::new()),
                line,
            });
        }
        if self.named_key().is_some() {
            let mut entries = Vec::new();
            loop {
                let key = self
                    .named_key()
                    .ok_or_else(|| self.error_here("expected 'key: value' entry in map"))?;
                self.advance();
                self.advance();
                entries.push((key, self.parse_expression()?));
                if !self.matches(&TokenKind::Comma) || self.check(&TokenKind::RBracket) {
                    break;
                }
            }
            self.consume(&TokenKind::RBracket, "expected ']' after map entries")?;
            return Ok(Expr {
                kind: ExprKind::Map(entries),
                line,
            });
        }
        let mut elements = Vec::new();
        loop {
            elements.push(self.parse_expression()?);
            if !self.matches(&TokenKind::Comma) || self.check(&TokenKind::RBracket) {
                break;
            }
        }
        self.consume(&TokenKind::RBracket, "expected ']' after list elements")?;
        Ok(Expr {
            kind: ExprKind::List(elements),
            line,
        })
    }

    fn parse_closure(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.consume(&TokenKind::LBrace, "expected '{' to start closure")?.line;
        let params = self.closure_params();
        let body = self.parse_block_body()?;
        Ok(Expr {
            kind: ExprKind::Closure { params, body },
            line,
        })
    }

    /// Consumes `a, b ->` (or a bare `->`) at the start of a closure, if present.
    fn closure_params(&mut self) -> Vec<String> {
        let mut offset = 0;
        let mut names = Vec::new();
        loop {
            let token = self.peek_nth(offset);
            match token.kind {
                TokenKind::Arrow => {
                    self.current += offset + 1;
                    return names;
                }
                TokenKind::Identifier => {
                    names.push(token.lexeme.clone());
                    offset += 1;
                    match self.peek_nth(offset).kind {
                        TokenKind::Comma => offset += 1,
                        TokenKind::Arrow => {}
                        _ => return Vec::new(),
                    }
                }
                _ => return Vec::new(),
            }
        }
    }

    // --- Token helpers ---

    fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    fn peek_nth(&self, n: usize) -> &Token {
        self.tokens
            .get(self.current + n)
            .or_else(|| self.tokens.last())
            .unwrap_or(&EOF_TOKEN)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.current += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        self.matches(&TokenKind::Keyword(keyword))
    }

    fn consume(&mut self, kind: &TokenKind, message: &str) -> Result<Token, SyntaxError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(message))
        }
    }

    fn consume_identifier(&mut self, message: &str) -> Result<String, SyntaxError> {
        Ok(self.consume(&TokenKind::Identifier, message)?.lexeme)
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        let token = self.peek();
        SyntaxError::new(
            token.line,
            format!("{}, found '{}'", message, describe(token)),
        )
    }
}

static EOF_TOKEN: Token = Token {
    kind: TokenKind::Eof,
    lexeme: String::new(),
    line: 0,
};

fn describe(token: &Token) -> &str {
    if token.kind == TokenKind::Eof {
        "end of script"
    } else {
        &token.lexeme
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let line = left.line;
    Expr {
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        line,
    }
}

/// `a.b(...)` becomes a method call on `a`; anything else is a plain call.
fn make_call(callee: Expr, args: Vec<Argument>, line: u32) -> Expr {
    let kind = match callee.kind {
        ExprKind::Field { target, field } => ExprKind::MethodCall {
            receiver: target,
            method: field,
            args,
        },
        other => ExprKind::Call {
            callee: Box::new(Expr {
                kind: other,
                line: callee.line,
            }),
            args,
        },
    };
    Expr { kind, line }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TemplateComponent;

    fn single_expr(source: &str) -> ExprKind {
        let mut stmts = parse_script(source).unwrap();
        assert_eq!(stmts.len(), 1);
        match stmts.remove(0).kind {
            StmtKind::Expr(expr) => expr.kind,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_target_call_with_named_arg_and_trailing_closure() {
        let kind = single_expr("target(clean: 'Remove build') {\n  println('x')\n}");
        let ExprKind::Call { callee, args } = kind else {
            panic!("expected call");
        };
        assert!(matches!(callee.kind, ExprKind::Variable(ref n) if n == "target"));
        assert_eq!(args.len(), 2);
        assert!(matches!(&args[0], Argument::Named(n, _) if n == "clean"));
        let Argument::Positional(closure) = &args[1] else {
            panic!("expected positional closure");
        };
        let ExprKind::Closure { params, body } = &closure.kind else {
            panic!("expected closure");
        };
        assert!(params.is_empty());
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].line, 2);
    }

    #[test]
    fn test_string_keys_allow_hyphenated_names() {
        let kind = single_expr("target('clean-all': 'Everything') { }");
        let ExprKind::Call { args, .. } = kind else {
            panic!("expected call");
        };
        assert!(matches!(&args[0], Argument::Named(n, _) if n == "clean-all"));
    }

    #[test]
    fn test_method_call_and_field_access() {
        let kind = single_expr("ant.mkdir(dir: 'build')");
        assert!(
            matches!(kind, ExprKind::MethodCall { ref method, ref args, .. } if method == "mkdir" && args.len() == 1)
        );
        let kind = single_expr("env.HOME");
        assert!(matches!(kind, ExprKind::Field { ref field, .. } if field == "HOME"));
    }

    #[test]
    fn test_each_with_closure_params() {
        let kind = single_expr("dirs.each { d -> println(d) }");
        let ExprKind::MethodCall { method, args, .. } = kind else {
            panic!("expected method call");
        };
        assert_eq!(method, "each");
        let Argument::Positional(Expr {
            kind: ExprKind::Closure { params, .. },
            ..
        }) = &args[0]
        else {
            panic!("expected closure");
        };
        assert_eq!(params, &vec!["d".to_string()]);
    }

    #[test]
    fn test_assignment_def_if_for_return() {
        let source = r#"
            def x = 1
            y = x + 2 * 3
            if (y > 5) { println("big") } else if (y == 0) { println('zero') } else { }
            for (d in ['a', 'b']) { println(d) }
            def f = { -> return y }
        "#;
        let stmts = parse_script(source).unwrap();
        assert_eq!(stmts.len(), 5);
        assert!(matches!(stmts[0].kind, StmtKind::Def { ref name, .. } if name == "x"));
        let StmtKind::Assign { value, .. } = &stmts[1].kind else {
            panic!("expected assignment");
        };
        // Multiplication binds tighter than addition.
        assert!(matches!(
            value.kind,
            ExprKind::Binary {
                op: BinaryOp::Add,
                ..
            }
        ));
        assert!(matches!(
            stmts[2].kind,
            StmtKind::If {
                else_branch: Some(_),
                ..
            }
        ));
        assert!(matches!(stmts[3].kind, StmtKind::For { ref binding, .. } if binding == "d"));
    }

    #[test]
    fn test_map_and_list_literals() {
        assert!(matches!(single_expr("[:]"), ExprKind::Map(ref e) if e.is_empty()));
        assert!(matches!(single_expr("[]"), ExprKind::List(ref e) if e.is_empty()));
        assert!(matches!(single_expr("[a: 1, b: 2]"), ExprKind::Map(ref e) if e.len() == 2));
        assert!(matches!(single_expr("[1, 2, 3,]"), ExprKind::List(ref e) if e.len() == 3));
    }

    #[test]
    fn test_interpolated_string_becomes_template() {
        let kind = single_expr(r#""Hello ${user.name}!""#);
        let ExprKind::Template(parts) = kind else {
            panic!("expected template");
        };
        assert_eq!(
            parts,
            vec![
                TemplateComponent::Literal("Hello ".to_string()),
                TemplateComponent::Path(vec!["user".to_string(), "name".to_string()]),
                TemplateComponent::Literal("!".to_string()),
            ]
        );
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = parse_script("target(a: 'b') {\n  println('x'\n}").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("expected ')'"));
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_error() {
        // Debug builds use large frames; give the parser room to reach the limit.
        let (deep, shallow) = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let nested = |levels: usize| {
                    format!("def x = {}1{}", "[".repeat(levels), "]".repeat(levels))
                };
                (
                    parse_script(&nested(5000)),
                    parse_script(&nested(MAX_NESTING_DEPTH / 2)),
                )
            })
            .unwrap()
            .join()
            .unwrap();

        let err = deep.unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("nesting deeper than"));
        assert!(shallow.is_ok());

        let err = parse_script(&format!("def x = {}1", "-".repeat(5000))).unwrap_err();
        assert!(err.message.contains("nesting deeper than"));
    }

    #[test]
    fn test_unclosed_block_is_an_error() {
        let err = parse_script("target(a: 'b') {").unwrap_err();
        assert!(err.message.contains("end of script"));
    }
}
