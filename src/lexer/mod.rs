//! C2: source text → restartable token stream.
//!
//! Structured like `commands/query_engine/lexer.rs`: a single `tokenize`
//! pass over a `Vec<char>`, building tokens by hand-rolled lookahead rather
//! than a generated scanner. Failure handling differs from that module's
//! abort-on-error style: an unterminated string yields one `Illegal` token
//! and lexing continues, emitting `Eof` thereafter, instead of returning
//! `Err`.

mod token;

pub use token::{Token, TokenKind};

use crate::error::Position;

fn keyword(ident: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match ident {
        "if" => If,
        "else" => Else,
        "return" => Return,
        "true" => True,
        "false" => False,
        "while" => While,
        "for" => For,
        "foreach" => Foreach,
        "in" => In,
        "function" => Function,
        "local" => Local,
        "switch" => Switch,
        "case" => Case,
        "default" => Default,
        "contains" => Contains,
        "missing" => Missing,
        _ => return None,
    })
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_cont(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    /// Previous significant token kind; used to disambiguate `/` as divide
    /// vs. the start of a regexp literal.
    prev_kind: Option<TokenKind>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            prev_kind: None,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if let Some(c) = c {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    fn here(&self) -> Position {
        Position::new(self.line, self.column)
    }

    /// Whether a `/` at this position should start a regexp literal rather
    /// than be read as the divide operator: regexps follow positions where a
    /// value cannot have just ended (start of input, after an operator,
    /// `(`, `,`, `=`, keywords, etc.), the same heuristic `commands/awk/lexer.rs`
    /// uses for the same ambiguity.
    fn regexp_allowed(&self) -> bool {
        use TokenKind::*;
        match &self.prev_kind {
            None => true,
            Some(
                Ident(_) | Int(_) | Float(_) | Str(_) | True | False | RParen | RBracket
                | PlusPlus | MinusMinus | HostVar(_),
            ) => false,
            _ => true,
        }
    }

    /// Produce the full token stream, terminated by a single `Eof`. Never
    /// fails: lex errors become `Illegal` tokens in the stream.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = matches!(tok.kind, TokenKind::Eof);
            self.prev_kind = Some(tok.kind.clone());
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn next_token(&mut self) -> Token {
        self.skip_trivia();
        let pos = self.here();
        let c = match self.bump() {
            Some(c) => c,
            None => return Token::new(TokenKind::Eof, pos),
        };

        use TokenKind::*;
        let kind = match c {
            '+' => {
                if self.peek(0) == Some('+') {
                    self.bump();
                    PlusPlus
                } else if self.peek(0) == Some('=') {
                    self.bump();
                    PlusAssign
                } else {
                    Plus
                }
            }
            '-' => {
                if self.peek(0) == Some('-') {
                    self.bump();
                    MinusMinus
                } else if self.peek(0) == Some('=') {
                    self.bump();
                    MinusAssign
                } else {
                    Minus
                }
            }
            '*' => {
                if self.peek(0) == Some('*') {
                    self.bump();
                    Pow
                } else if self.peek(0) == Some('=') {
                    self.bump();
                    StarAssign
                } else {
                    Star
                }
            }
            '/' => {
                if self.regexp_allowed() {
                    return self.read_regexp(pos);
                }
                if self.peek(0) == Some('=') {
                    self.bump();
                    SlashAssign
                } else {
                    Slash
                }
            }
            '%' => Percent,
            '√' => Root,
            '=' => {
                if self.peek(0) == Some('=') {
                    self.bump();
                    Eq
                } else {
                    Assign
                }
            }
            '!' => {
                if self.peek(0) == Some('=') {
                    self.bump();
                    Ne
                } else if self.peek(0) == Some('~') {
                    self.bump();
                    NotMatches
                } else {
                    Bang
                }
            }
            '<' => {
                if self.peek(0) == Some('=') {
                    self.bump();
                    Le
                } else {
                    Lt
                }
            }
            '>' => {
                if self.peek(0) == Some('=') {
                    self.bump();
                    Ge
                } else {
                    Gt
                }
            }
            '~' => {
                if self.peek(0) == Some('=') {
                    self.bump();
                    Matches
                } else {
                    return Token::new(Illegal(format!("stray '~' at {}", pos)), pos);
                }
            }
            '&' => {
                if self.peek(0) == Some('&') {
                    self.bump();
                    AndAnd
                } else {
                    Illegal(format!("stray '&' at {}", pos))
                }
            }
            '|' => {
                if self.peek(0) == Some('|') {
                    self.bump();
                    OrOr
                } else {
                    Illegal(format!("stray '|' at {}", pos))
                }
            }
            '?' => Question,
            ':' => Colon,
            ',' => Comma,
            ';' => Semicolon,
            '(' => LParen,
            ')' => RParen,
            '[' => LBracket,
            ']' => RBracket,
            '{' => LBrace,
            '}' => RBrace,
            '.' => {
                if self.peek(0) == Some('.') {
                    self.bump();
                    DotDot
                } else {
                    Dot
                }
            }
            '$' => {
                if self.peek(0).is_some_and(is_ident_start) {
                    let name = self.read_ident();
                    HostVar(name)
                } else {
                    Dollar
                }
            }
            '"' => return self.read_string(pos),
            _ if c.is_ascii_digit() => return self.read_number(c, pos),
            _ if is_ident_start(c) => {
                let mut ident = String::from(c);
                ident.push_str(&self.read_ident());
                keyword(&ident).unwrap_or(Ident(ident))
            }
            other => Illegal(format!("unexpected character '{other}'")),
        };
        Token::new(kind, pos)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek(0) {
                Some(' ') | Some('\t') | Some('\r') | Some('\n') => {
                    self.bump();
                }
                Some('/') if self.peek(1) == Some('/') => {
                    while let Some(c) = self.peek(0) {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_ident(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek(0) {
            if is_ident_cont(c) {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn read_number(&mut self, first: char, pos: Position) -> Token {
        let mut text = String::from(first);
        while let Some(c) = self.peek(0) {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let mut is_float = false;
        if self.peek(0) == Some('.') && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            self.bump();
            while let Some(c) = self.peek(0) {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if is_float {
            match text.parse::<f64>() {
                Ok(v) => Token::new(TokenKind::Float(v), pos),
                Err(_) => Token::new(TokenKind::Illegal(format!("malformed float '{text}'")), pos),
            }
        } else {
            match text.parse::<i64>() {
                Ok(v) => Token::new(TokenKind::Int(v), pos),
                Err(_) => Token::new(TokenKind::Illegal(format!("malformed integer '{text}'")), pos),
            }
        }
    }

    fn read_string(&mut self, pos: Position) -> Token {
        let mut s = String::new();
        loop {
            match self.bump() {
                None => {
                    return Token::new(
                        TokenKind::Illegal("unterminated string literal".to_string()),
                        pos,
                    );
                }
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('\\') => s.push('\\'),
                    Some('"') => s.push('"'),
                    Some('\n') => {} // line continuation: discard "\\\n"
                    Some(other) => {
                        s.push('\\');
                        s.push(other);
                    }
                    None => {
                        return Token::new(
                            TokenKind::Illegal("unterminated string literal".to_string()),
                            pos,
                        );
                    }
                },
                Some(c) => s.push(c),
            }
        }
        Token::new(TokenKind::Str(s), pos)
    }

    fn read_regexp(&mut self, pos: Position) -> Token {
        let mut body = String::new();
        loop {
            match self.bump() {
                None => {
                    return Token::new(
                        TokenKind::Illegal("unterminated regexp literal".to_string()),
                        pos,
                    );
                }
                Some('/') => break,
                Some('\\') => {
                    if let Some(c) = self.bump() {
                        body.push('\\');
                        body.push(c);
                    }
                }
                Some(c) => body.push(c),
            }
        }
        let mut flags = String::new();
        while let Some(c) = self.peek(0) {
            if c.is_ascii_alphabetic() {
                flags.push(c);
                self.bump();
            } else {
                break;
            }
        }
        // `(?flags)` prefix form: the parser extracts it, but lift it here
        // into the flags set too since it is purely lexical sugar.
        let (pattern, mut extra_flags) = extract_inline_flags(&body);
        extra_flags.push_str(&flags);
        Token::new(
            TokenKind::Regexp { pattern, flags: extra_flags },
            pos,
        )
    }
}

fn extract_inline_flags(body: &str) -> (String, String) {
    if let Some(rest) = body.strip_prefix("(?") {
        if let Some(end) = rest.find(')') {
            let flags = &rest[..end];
            if flags.chars().all(|c| c.is_ascii_alphabetic()) && !flags.is_empty() {
                return (rest[end + 1..].to_string(), flags.to_string());
            }
        }
    }
    (body.to_string(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn basic_arithmetic() {
        assert_eq!(
            kinds("1 + 2 * 3"),
            vec![
                TokenKind::Int(1),
                TokenKind::Plus,
                TokenKind::Int(2),
                TokenKind::Star,
                TokenKind::Int(3),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("if (x) { return true; }"),
            vec![
                TokenKind::If,
                TokenKind::LParen,
                TokenKind::Ident("x".into()),
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Return,
                TokenKind::True,
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        let toks = kinds(r#""a\nb\tc""#);
        assert_eq!(toks[0], TokenKind::Str("a\nb\tc".to_string()));
    }

    #[test]
    fn unterminated_string_becomes_illegal_then_eof() {
        let toks = kinds("\"abc");
        assert!(matches!(toks[0], TokenKind::Illegal(_)));
        assert_eq!(toks[1], TokenKind::Eof);
    }

    #[test]
    fn host_var_sigil() {
        assert_eq!(kinds("$time"), vec![TokenKind::HostVar("time".into()), TokenKind::Eof]);
    }

    #[test]
    fn regexp_literal_with_flags() {
        let toks = kinds("/foo.*/i");
        assert_eq!(
            toks[0],
            TokenKind::Regexp { pattern: "foo.*".into(), flags: "i".into() }
        );
    }

    #[test]
    fn regexp_inline_flags_prefix() {
        let toks = kinds("/(?i)foo/");
        assert_eq!(toks[0], TokenKind::Regexp { pattern: "foo".into(), flags: "i".into() });
    }

    #[test]
    fn division_after_value_is_not_regexp() {
        let toks = kinds("a / b");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Slash,
                TokenKind::Ident("b".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn line_continuation_in_string() {
        let toks = kinds("\"a\\\nb\"");
        assert_eq!(toks[0], TokenKind::Str("ab".to_string()));
    }

    #[test]
    fn comment_to_end_of_line() {
        assert_eq!(
            kinds("1 // comment\n+ 2"),
            vec![TokenKind::Int(1), TokenKind::Plus, TokenKind::Int(2), TokenKind::Eof]
        );
    }

    #[test]
    fn compound_assignment_and_increment() {
        assert_eq!(
            kinds("x += 1; x++"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::PlusAssign,
                TokenKind::Int(1),
                TokenKind::Semicolon,
                TokenKind::Ident("x".into()),
                TokenKind::PlusPlus,
                TokenKind::Eof,
            ]
        );
    }
}
