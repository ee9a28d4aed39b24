//! Tokenizer for the script language.

use super::ScriptError;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Num(f64),
    Str(Rc<str>),
    Template(Vec<TemplatePart>),
    Ident(Rc<str>),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Str(Rc<str>),
    Expr(Vec<Token>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: u32,
    /// A line terminator separates this token from the previous one.
    pub newline_before: bool,
}

/// Longest first so that greedy matching picks `===` over `==`.
const PUNCTUATORS: &[&str] = &[
    "...", "===", "!==", "**=", "??=", "||=", "&&=", "=>", "==", "!=", "<=", ">=", "&&", "||",
    "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "**", "{", "}", "(", ")", "[", "]",
    ";", ",", "<", ">", "+", "-", "*", "/", "%", "!", "?", ":", "=", ".",
];

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0, line: 1 }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ScriptError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.tok == Tok::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            message: message.into(),
            line: self.line,
        }
    }

    fn rest(&self) -> &'a str {
        self.src.get(self.pos..).unwrap_or_default()
    }

    /// Source text from `start` up to the cursor.
    fn since(&self, start: usize) -> &'a str {
        self.src.get(start..self.pos).unwrap_or_default()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.rest().chars().nth(offset)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Skips whitespace and comments; reports whether a newline was crossed.
    fn skip_trivia(&mut self) -> Result<bool, ScriptError> {
        let mut newline = false;
        loop {
            match self.peek() {
                Some('\n') => {
                    newline = true;
                    self.bump();
                }
                Some(c) if c.is_whitespace() || c == '\u{feff}' => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start_line = self.line;
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some('\n') => newline = true,
                            Some(_) => {}
                            None => {
                                return Err(ScriptError::Syntax {
                                    message: "Unterminated comment".to_string(),
                                    line: start_line,
                                });
                            }
                        }
                    }
                }
                _ => return Ok(newline),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ScriptError> {
        let newline_before = self.skip_trivia()?;
        let line = self.line;
        let make = |tok| Token {
            tok,
            line,
            newline_before,
        };

        let Some(c) = self.peek() else {
            return Ok(make(Tok::Eof));
        };

        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            return Ok(make(Tok::Num(self.number()?)));
        }
        if c == '"' || c == '\'' {
            self.bump();
            return Ok(make(Tok::Str(self.string(c)?.into())));
        }
        if c == '`' {
            self.bump();
            return Ok(make(Tok::Template(self.template()?)));
        }
        if is_ident_start(c) {
            let start = self.pos;
            while self.peek().is_some_and(is_ident_part) {
                self.bump();
            }
            return Ok(make(Tok::Ident(self.since(start).into())));
        }

        let rest = self.rest();
        for punct in PUNCTUATORS {
            if rest.starts_with(punct) {
                // `a?.5:1` is a conditional, not optional chaining
                if *punct == "?." && rest.get(2..).is_some_and(|after| after.starts_with(|d: char| d.is_ascii_digit())) {
                    continue;
                }
                self.pos += punct.len();
                return Ok(make(Tok::Punct(punct)));
            }
        }

        match c {
            '&' | '|' | '^' | '~' => Err(self.error(format!("Bitwise operator '{c}' is not supported"))),
            _ => Err(self.error(format!("Unexpected character '{c}'"))),
        }
    }

    fn number(&mut self) -> Result<f64, ScriptError> {
        let start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')) {
            self.bump();
            let radix = match self.bump() {
                Some('x' | 'X') => 16,
                Some('o' | 'O') => 8,
                _ => 2,
            };
            let digits_start = self.pos;
            while self.peek().is_some_and(|d| d.is_digit(radix) || d == '_') {
                self.bump();
            }
            let digits: String = self.since(digits_start).chars().filter(|d| *d != '_').collect();
            return u64::from_str_radix(&digits, radix)
                .map(|value| value as f64)
                .map_err(|_| self.error("Invalid numeric literal"));
        }

        while self.peek().is_some_and(|d| d.is_ascii_digit() || d == '_') {
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_none_or(|d| !is_ident_start(d)) {
            self.bump();
            while self.peek().is_some_and(|d| d.is_ascii_digit() || d == '_') {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = self.peek_at(1);
            let digit_at = if matches!(sign, Some('+' | '-')) { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|d| d.is_ascii_digit()) {
                for _ in 0..digit_at {
                    self.bump();
                }
                while self.peek().is_some_and(|d| d.is_ascii_digit()) {
                    self.bump();
                }
            }
        }
        if self.peek().is_some_and(is_ident_start) {
            return Err(self.error("Identifier directly after number"));
        }
        let text: String = self.since(start).chars().filter(|d| *d != '_').collect();
        text.parse::<f64>()
            .map_err(|_| self.error(format!("Invalid numeric literal '{text}'")))
    }

    fn escape(&mut self) -> Result<Option<char>, ScriptError> {
        let Some(c) = self.bump() else {
            return Err(self.error("Unterminated escape sequence"));
        };
        let decoded = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0' => '\0',
            'x' => self.hex_escape(2)?,
            'u' => {
                if self.peek() == Some('{') {
                    self.bump();
                    let start = self.pos;
                    while self.peek().is_some_and(|d| d.is_ascii_hexdigit()) {
                        self.bump();
                    }
                    let digits = self.since(start);
                    if self.bump() != Some('}') {
                        return Err(self.error("Invalid Unicode escape"));
                    }
                    u32::from_str_radix(digits, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| self.error("Invalid Unicode escape"))?
                } else {
                    self.hex_escape(4)?
                }
            }
            // line continuation
            '\n' => return Ok(None),
            other => other,
        };
        Ok(Some(decoded))
    }

    fn hex_escape(&mut self, len: usize) -> Result<char, ScriptError> {
        let start = self.pos;
        for _ in 0..len {
            if !self.peek().is_some_and(|d| d.is_ascii_hexdigit()) {
                return Err(self.error("Invalid hexadecimal escape"));
            }
            self.bump();
        }
        let code = u32::from_str_radix(self.since(start), 16)
            .map_err(|_| self.error("Invalid hexadecimal escape"))?;
        Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn string(&mut self, quote: char) -> Result<String, ScriptError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error("Unterminated string literal")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    if let Some(decoded) = self.escape()? {
                        out.push(decoded);
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn template(&mut self) -> Result<Vec<TemplatePart>, ScriptError> {
        let mut parts = Vec::new();
        let mut current = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("Unterminated template literal")),
                Some('`') => break,
                Some('\\') => {
                    if let Some(decoded) = self.escape()? {
                        current.push(decoded);
                    }
                }
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    if !current.is_empty() {
                        parts.push(TemplatePart::Str(std::mem::take(&mut current).into()));
                    }
                    parts.push(TemplatePart::Expr(self.template_expression()?));
                }
                Some(c) => current.push(c),
            }
        }
        if !current.is_empty() || parts.is_empty() {
            parts.push(TemplatePart::Str(current.into()));
        }
        Ok(parts)
    }

    /// Tokens of one `${ ... }` substitution, terminated by an Eof token.
    fn template_expression(&mut self) -> Result<Vec<Token>, ScriptError> {
        let mut tokens = Vec::new();
        let mut depth = 0usize;
        loop {
            let token = self.next_token()?;
            match token.tok {
                Tok::Eof => return Err(self.error("Unterminated template substitution")),
                Tok::Punct("{") => depth += 1,
                Tok::Punct("}") if depth == 0 => {
                    tokens.push(Token {
                        tok: Tok::Eof,
                        line: token.line,
                        newline_before: false,
                    });
                    return Ok(tokens);
                }
                Tok::Punct("}") => depth -= 1,
                _ => {}
            }
            tokens.push(token);
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphabetic()
}

fn is_ident_part(c: char) -> bool {
    is_ident_start(c) || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Tok> {
        Lexer::new(src)
            .tokenize()
            .expect("tokenize")
            .into_iter()
            .map(|token| token.tok)
            .collect()
    }

    #[test]
    fn lexes_operators_greedily() {
        assert_eq!(
            kinds("a === b ?? c?.d"),
            vec![
                Tok::Ident("a".into()),
                Tok::Punct("==="),
                Tok::Ident("b".into()),
                Tok::Punct("??"),
                Tok::Ident("c".into()),
                Tok::Punct("?."),
                Tok::Ident("d".into()),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn conditional_with_decimal_is_not_optional_chain() {
        let toks = kinds("a?.5:1");
        assert_eq!(toks[1], Tok::Punct("?"));
        assert_eq!(toks[2], Tok::Num(0.5));
    }

    #[test]
    fn lexes_numbers() {
        assert_eq!(kinds("0xff 1_000 2.5e3 .5")[..4], [
            Tok::Num(255.0),
            Tok::Num(1000.0),
            Tok::Num(2500.0),
            Tok::Num(0.5)
        ]);
    }

    #[test]
    fn lexes_strings_with_escapes() {
        assert_eq!(kinds(r#"'a\'b' "A\n""#)[..2], [
            Tok::Str("a'b".into()),
            Tok::Str("A\n".into())
        ]);
    }

    #[test]
    fn lexes_nested_templates() {
        let toks = kinds("`x${ {a: `y${1}`}.a }z`");
        let Tok::Template(parts) = &toks[0] else {
            panic!("expected template");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], TemplatePart::Str("x".into()));
        assert_eq!(parts[2], TemplatePart::Str("z".into()));
    }

    #[test]
    fn tracks_lines_and_newlines() {
        let tokens = Lexer::new("a\n// c\nb").tokenize().expect("tokenize");
        assert_eq!(tokens[1].line, 3);
        assert!(tokens[1].newline_before);
    }

    #[test]
    fn rejects_bitwise_operators() {
        assert!(Lexer::new("a & b").tokenize().is_err());
        assert!(Lexer::new("'unterminated").tokenize().is_err());
    }
}
