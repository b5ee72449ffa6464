// src/core/lexer.rs

use thiserror::Error;

/// A lexing or parsing failure, located by line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub(crate) struct SyntaxError {
    pub(crate) line: u32,
    pub(crate) message: String,
}

impl SyntaxError {
    pub(crate) fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    Def,
    If,
    Else,
    For,
    In,
    Return,
    True,
    False,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Identifier,
    Int,
    /// Single-quoted string; the lexeme is the unescaped value.
    String,
    /// Double-quoted string; the lexeme is the raw body, escapes and `${}`
    /// interpolation are resolved by the compiler.
    Template,
    Keyword(Keyword),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Arrow,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    BangEqual,
    EqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    DoubleAmpersand,
    DoublePipe,
    Eof,
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) lexeme: String,
    pub(crate) line: u32,
}

pub(crate) struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, '\n')) = next {
            self.line += 1;
        }
        next
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, ch)| *ch)
    }

    /// Looks one character past the peeked one without consuming anything.
    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next().map(|(_, ch)| ch)
    }

    fn match_next(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_shebang(&mut self) {
        if self.source.starts_with("#!") {
            while let Some(ch) = self.peek_char() {
                if ch == '\n' {
                    break;
                }
                self.bump();
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), SyntaxError> {
        loop {
            match (self.peek_char(), self.peek_second()) {
                (Some(ch), _) if ch.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(ch) = self.peek_char() {
                        if ch == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start_line = self.line;
                    self.bump();
                    self.bump();
                    let mut closed = false;
                    while let Some((_, ch)) = self.bump() {
                        if ch == '*' && self.peek_char() == Some('/') {
                            self.bump();
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        return Err(SyntaxError::new(start_line, "unterminated block comment"));
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn identifier_or_keyword(&mut self, start: usize) -> Token {
        let mut end = start + 1;
        while let Some(&(idx, ch)) = self.chars.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.bump();
                end = idx + ch.len_utf8();
            } else {
                break;
            }
        }
        let lexeme = self.source.get(start..end).unwrap_or_default().to_string();
        let kind = keyword_for(&lexeme).unwrap_or(TokenKind::Identifier);
        Token {
            kind,
            lexeme,
            line: self.line,
        }
    }

    fn int_literal(&mut self, first: char) -> Token {
        let mut lexeme = String::from(first);
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                lexeme.push(ch);
                self.bump();
            } else if ch == '_' {
                self.bump();
            } else {
                break;
            }
        }
        Token {
            kind: TokenKind::Int,
            lexeme,
            line: self.line,
        }
    }

    fn single_quoted(&mut self) -> Result<Token, SyntaxError> {
        let line = self.line;
        let mut value = String::new();
        while let Some((_, ch)) = self.bump() {
            match ch {
                '\'' => {
                    return Ok(Token {
                        kind: TokenKind::String,
                        lexeme: value,
                        line,
                    });
                }
                '\\' => match self.bump() {
                    Some((_, esc)) => value.push(unescape_char(esc)),
                    None => break,
                },
                _ => value.push(ch),
            }
        }
        Err(SyntaxError::new(line, "unterminated string literal"))
    }

    fn double_quoted(&mut self) -> Result<Token, SyntaxError> {
        let line = self.line;
        let mut raw = String::new();
        while let Some((_, ch)) = self.bump() {
            match ch {
                '"' => {
                    return Ok(Token {
                        kind: TokenKind::Template,
                        lexeme: raw,
                        line,
                    });
                }
                '\\' => {
                    // Keep the escape for the compiler, but never let `\"` end the string.
                    raw.push('\\');
                    match self.bump() {
                        Some((_, esc)) => raw.push(esc),
                        None => break,
                    }
                }
                _ => raw.push(ch),
            }
        }
        Err(SyntaxError::new(line, "unterminated string literal"))
    }

    fn simple_token(&self, kind: TokenKind, lexeme: &str) -> Token {
        Token {
            kind,
            lexeme: lexeme.to_string(),
            line: self.line,
        }
    }

    pub(crate) fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        self.skip_shebang();
        loop {
            self.skip_whitespace_and_comments()?;
            let line = self.line;
            let (start, ch) = match self.bump() {
                Some(pair) => pair,
                None => {
                    tokens.push(Token {
                        kind: TokenKind::Eof,
                        lexeme: String::new(),
                        line,
                    });
                    break;
                }
            };

            let token = match ch {
                'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(start),
                '0'..='9' => self.int_literal(ch),
                '\'' => self.single_quoted()?,
                '"' => self.double_quoted()?,
                '(' => self.simple_token(TokenKind::LParen, "("),
                ')' => self.simple_token(TokenKind::RParen, ")"),
                '{' => self.simple_token(TokenKind::LBrace, "{"),
                '}' => self.simple_token(TokenKind::RBrace, "}"),
                '[' => self.simple_token(TokenKind::LBracket, "["),
                ']' => self.simple_token(TokenKind::RBracket, "]"),
                ',' => self.simple_token(TokenKind::Comma, ","),
                '.' => self.simple_token(TokenKind::Dot, "."),
                ':' => self.simple_token(TokenKind::Colon, ":"),
                ';' => self.simple_token(TokenKind::Semicolon, ";"),
                '+' => self.simple_token(TokenKind::Plus, "+"),
                '*' => self.simple_token(TokenKind::Star, "*"),
                '/' => self.simple_token(TokenKind::Slash, "/"),
                '%' => self.simple_token(TokenKind::Percent, "%"),
                '-' => {
                    if self.match_next('>') {
                        self.simple_token(TokenKind::Arrow, "->")
                    } else {
                        self.simple_token(TokenKind::Minus, "-")
                    }
                }
                '=' => {
                    if self.match_next('=') {
                        self.simple_token(TokenKind::EqualEqual, "==")
                    } else {
                        self.simple_token(TokenKind::Assign, "=")
                    }
                }
                '!' => {
                    if self.match_next('=') {
                        self.simple_token(TokenKind::BangEqual, "!=")
                    } else {
                        self.simple_token(TokenKind::Bang, "!")
                    }
                }
                '<' => {
                    if self.match_next('=') {
                        self.simple_token(TokenKind::LessEqual, "<=")
                    } else {
                        self.simple_token(TokenKind::Less, "<")
                    }
                }
                '>' => {
                    if self.match_next('=') {
                        self.simple_token(TokenKind::GreaterEqual, ">=")
                    } else {
                        self.simple_token(TokenKind::Greater, ">")
                    }
                }
                '&' if self.match_next('&') => self.simple_token(TokenKind::DoubleAmpersand, "&&"),
                '|' if self.match_next('|') => self.simple_token(TokenKind::DoublePipe, "||"),
                other => {
                    return Err(SyntaxError::new(
                        line,
                        format!("unexpected character '{}'", other),
                    ));
                }
            };
            tokens.push(token);
        }
        Ok(tokens)
    }
}

/// Maps the character following a backslash to the character it stands for.
pub(crate) fn unescape_char(esc: char) -> char {
    match esc {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        '0' => '\0',
        other => other,
    }
}

fn keyword_for(ident: &str) -> Option<TokenKind> {
    let keyword = match ident {
        "def" => Keyword::Def,
        "if" => Keyword::If,
        "else" => Keyword::Else,
        "for" => Keyword::For,
        "in" => Keyword::In,
        "return" => Keyword::Return,
        "true" => Keyword::True,
        "false" => Keyword::False,
        "null" => Keyword::Null,
        _ => return None,
    };
    Some(TokenKind::Keyword(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_target_declaration_tokens() {
        let tokens = kinds("target(clean: 'Remove') { }");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Identifier,
                TokenKind::LParen,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::String,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_shebang_are_skipped_and_lines_tracked() {
        let source = "#!/usr/bin/env gantlet\n// comment\n/* block\n comment */ x = 1";
        let tokens = Lexer::new(source).tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].lexeme, "x");
        assert_eq!(tokens[0].line, 4);
    }

    #[test]
    fn test_double_quoted_keeps_raw_escapes() {
        let tokens = Lexer::new(r#""a \"b\" ${c}""#).tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Template);
        assert_eq!(tokens[0].lexeme, r#"a \"b\" ${c}"#);
    }

    #[test]
    fn test_single_quoted_is_unescaped() {
        let tokens = Lexer::new(r"'it\'s\n'").tokenize().unwrap();
        assert_eq!(tokens[0].lexeme, "it's\n");
    }

    #[test]
    fn test_operators_and_arrow() {
        let tokens = kinds("a -> b == c != d <= e && f || !g");
        assert!(tokens.contains(&TokenKind::Arrow));
        assert!(tokens.contains(&TokenKind::EqualEqual));
        assert!(tokens.contains(&TokenKind::BangEqual));
        assert!(tokens.contains(&TokenKind::LessEqual));
        assert!(tokens.contains(&TokenKind::DoubleAmpersand));
        assert!(tokens.contains(&TokenKind::DoublePipe));
        assert!(tokens.contains(&TokenKind::Bang));
    }

    #[test]
    fn test_unterminated_string_reports_line() {
        let err = Lexer::new("\n\nx = 'oops").tokenize().unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = Lexer::new("x = @").tokenize().unwrap_err();
        assert!(err.message.contains("'@'"));
    }
}
