//! Recursive descent parser producing [`Program`].

use super::ScriptError;
use super::ast::*;
use super::lexer::{Lexer, TemplatePart, Tok, Token};
use super::value::number_to_string;
use std::rc::Rc;

/// Deepest expression or statement nesting accepted.
pub const MAX_NESTING: usize = 100;

const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "export", "extends", "finally", "for", "function", "if", "import", "in", "instanceof",
    "let", "new", "return", "super", "switch", "this", "throw", "try", "typeof", "var", "void",
    "while", "with", "yield", "null", "true", "false",
];

pub fn parse_program(source: &str) -> Result<Program, ScriptError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens, 0);
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(Program { body })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth,
        }
    }

    // ---- token helpers -------------------------------------------------

    /// Token `offset` places ahead, clamped to the trailing `Eof`.
    // The lexer always emits `Eof`, so `tokens` is never empty.
    #[allow(clippy::indexing_slicing)]
    fn token_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn current(&self) -> &Token {
        self.token_at(0)
    }

    fn peek_tok(&self, offset: usize) -> &Tok {
        &self.token_at(offset).tok
    }

    fn line(&self) -> u32 {
        self.current().line
    }

    fn at_eof(&self) -> bool {
        matches!(self.current().tok, Tok::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(&self.current().tok, Tok::Punct(p) if *p == punct)
    }

    fn is_word(&self, word: &str) -> bool {
        matches!(&self.current().tok, Tok::Ident(name) if &**name == word)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.is_word(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error_at(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            message: message.into(),
            line: self.line(),
        }
    }

    fn unexpected(&self) -> ScriptError {
        let found = match &self.current().tok {
            Tok::Eof => "end of input".to_string(),
            Tok::Num(n) => format!("number {}", number_to_string(*n)),
            Tok::Str(_) => "string".to_string(),
            Tok::Template(_) => "template literal".to_string(),
            Tok::Ident(name) => format!("'{name}'"),
            Tok::Punct(p) => format!("'{p}'"),
        };
        self.error_at(format!("Unexpected {found}"))
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), ScriptError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn ident_name(&mut self) -> Result<Name, ScriptError> {
        match &self.current().tok {
            Tok::Ident(name) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn binding_name(&mut self) -> Result<Name, ScriptError> {
        if let Tok::Ident(name) = &self.current().tok
            && RESERVED.contains(&&**name)
        {
            return Err(self.error_at(format!("Unexpected reserved word '{name}'")));
        }
        self.ident_name()
    }

    fn consume_semicolon(&mut self) -> Result<(), ScriptError> {
        if self.eat_punct(";") || self.is_punct("}") || self.at_eof() || self.current().newline_before {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            Err(self.error_at("Code is nested too deeply"))
        } else {
            Ok(())
        }
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ---- statements ----------------------------------------------------

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        self.enter()?;
        let result = self.statement_inner();
        self.leave();
        result
    }

    fn statement_inner(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.line();
        let stmt = |kind| Stmt { kind, line };

        if self.eat_punct(";") {
            return Ok(stmt(StmtKind::Empty));
        }
        if self.is_punct("{") {
            return Ok(stmt(StmtKind::Block(self.block()?)));
        }

        let word = match &self.current().tok {
            Tok::Ident(name) => Some(name.clone()),
            _ => None,
        };
        let Some(word) = word else {
            return self.expression_statement(line);
        };

        match &*word {
            "var" | "let" | "const" => {
                let declaration = self.declaration()?;
                self.consume_semicolon()?;
                Ok(stmt(declaration))
            }
            "function" => {
                self.pos += 1;
                Ok(stmt(StmtKind::Function(self.function_rest(true)?)))
            }
            "async" if matches!(self.peek_tok(1), Tok::Ident(next) if &**next == "function") => {
                self.pos += 2;
                Ok(stmt(StmtKind::Function(self.function_rest(true)?)))
            }
            "if" => {
                self.pos += 1;
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                let consequent = Box::new(self.statement()?);
                let alternate = if self.eat_word("else") {
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                Ok(stmt(StmtKind::If(test, consequent, alternate)))
            }
            "while" => {
                self.pos += 1;
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                Ok(stmt(StmtKind::While(test, Box::new(self.statement()?))))
            }
            "do" => {
                self.pos += 1;
                let body = Box::new(self.statement()?);
                if !self.eat_word("while") {
                    return Err(self.unexpected());
                }
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                self.eat_punct(";");
                Ok(stmt(StmtKind::DoWhile(body, test)))
            }
            "for" => {
                self.pos += 1;
                self.for_statement(line)
            }
            "return" => {
                self.pos += 1;
                let value = if self.is_punct(";")
                    || self.is_punct("}")
                    || self.at_eof()
                    || self.current().newline_before
                {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.consume_semicolon()?;
                Ok(stmt(StmtKind::Return(value)))
            }
            "break" | "continue" => {
                self.pos += 1;
                if matches!(self.current().tok, Tok::Ident(_)) && !self.current().newline_before {
                    return Err(self.error_at("Labeled statements are not supported"));
                }
                self.consume_semicolon()?;
                Ok(stmt(if &*word == "break" {
                    StmtKind::Break
                } else {
                    StmtKind::Continue
                }))
            }
            "throw" => {
                self.pos += 1;
                if self.current().newline_before {
                    return Err(self.error_at("Illegal newline after throw"));
                }
                let value = self.expression()?;
                self.consume_semicolon()?;
                Ok(stmt(StmtKind::Throw(value)))
            }
            "try" => {
                self.pos += 1;
                self.try_statement(line)
            }
            "switch" => {
                self.pos += 1;
                self.switch_statement(line)
            }
            "class" => Err(self.error_at("Class declarations are not supported")),
            "import" | "export" => Err(self.error_at("Modules are not supported")),
            "with" | "debugger" => Err(self.error_at(format!("'{word}' is not supported"))),
            _ => self.expression_statement(line),
        }
    }

    fn expression_statement(&mut self, line: u32) -> Result<Stmt, ScriptError> {
        let expr = self.expression()?;
        self.consume_semicolon()?;
        Ok(Stmt {
            kind: StmtKind::Expr(expr),
            line,
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.is_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            body.push(self.statement()?);
        }
        self.pos += 1;
        Ok(body)
    }

    fn decl_kind(&mut self) -> Option<DeclKind> {
        let kind = if self.is_word("var") {
            DeclKind::Var
        } else if self.is_word("let") {
            DeclKind::Let
        } else if self.is_word("const") {
            DeclKind::Const
        } else {
            return None;
        };
        self.pos += 1;
        Some(kind)
    }

    fn declaration(&mut self) -> Result<StmtKind, ScriptError> {
        let kind = self.decl_kind().ok_or_else(|| self.unexpected())?;
        let declarators = self.declarators(kind, false)?;
        Ok(StmtKind::Declare(kind, declarators))
    }

    fn declarators(
        &mut self,
        kind: DeclKind,
        no_in: bool,
    ) -> Result<Vec<(Pattern, Option<Expr>)>, ScriptError> {
        let mut declarators = Vec::new();
        loop {
            let target = self.binding_pattern()?;
            let init = if self.eat_punct("=") {
                Some(self.assignment(no_in)?)
            } else {
                if kind == DeclKind::Const || !matches!(target, Pattern::Ident(_)) {
                    return Err(self.error_at("Missing initializer in declaration"));
                }
                None
            };
            declarators.push((target, init));
            if !self.eat_punct(",") {
                return Ok(declarators);
            }
        }
    }

    fn for_statement(&mut self, line: u32) -> Result<Stmt, ScriptError> {
        self.eat_word("await");
        self.expect_punct("(")?;

        let init = if self.is_punct(";") {
            None
        } else if let Some(kind) = self.decl_kind() {
            let target = self.binding_pattern()?;
            if self.is_word("of") || self.is_word("in") {
                return self.for_in_rest(Some(kind), target, line);
            }
            let mut declarators = Vec::new();
            let init = if self.eat_punct("=") {
                Some(self.assignment(true)?)
            } else {
                None
            };
            declarators.push((target, init));
            if self.eat_punct(",") {
                declarators.extend(self.declarators(kind, true)?);
            }
            Some(Box::new(Stmt {
                kind: StmtKind::Declare(kind, declarators),
                line,
            }))
        } else {
            let expr = self.expression_with(true)?;
            if self.is_word("of") || self.is_word("in") {
                let target = expr_to_pattern(expr).map_err(|message| self.error_at(message))?;
                return self.for_in_rest(None, target, line);
            }
            Some(Box::new(Stmt {
                kind: StmtKind::Expr(expr),
                line,
            }))
        };

        self.expect_punct(";")?;
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt {
            kind: StmtKind::For {
                init,
                test,
                update,
                body,
            },
            line,
        })
    }

    fn for_in_rest(
        &mut self,
        decl: Option<DeclKind>,
        target: Pattern,
        line: u32,
    ) -> Result<Stmt, ScriptError> {
        let of = self.is_word("of");
        self.pos += 1;
        let iterable = if of {
            self.assignment(false)?
        } else {
            self.expression()?
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt {
            kind: StmtKind::ForIn {
                decl,
                target,
                iterable,
                body,
                of,
            },
            line,
        })
    }

    fn try_statement(&mut self, line: u32) -> Result<Stmt, ScriptError> {
        let block = self.block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat_word("catch") {
            if self.eat_punct("(") {
                param = Some(self.binding_pattern()?);
                self.expect_punct(")")?;
            }
            handler = Some(self.block()?);
        }
        let finalizer = if self.eat_word("finally") {
            Some(self.block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error_at("Missing catch or finally after try"));
        }
        Ok(Stmt {
            kind: StmtKind::Try {
                block,
                param,
                handler,
                finalizer,
            },
            line,
        })
    }

    fn switch_statement(&mut self, line: u32) -> Result<Stmt, ScriptError> {
        self.expect_punct("(")?;
        let discriminant = self.expression()?;
        self.expect_punct(")")?;
        self.expect_punct("{")?;
        let mut cases = Vec::new();
        while !self.eat_punct("}") {
            let test = if self.eat_word("case") {
                Some(self.expression()?)
            } else if self.eat_word("default") {
                None
            } else {
                return Err(self.unexpected());
            };
            self.expect_punct(":")?;
            let mut body = Vec::new();
            while !self.is_word("case") && !self.is_word("default") && !self.is_punct("}") {
                if self.at_eof() {
                    return Err(self.unexpected());
                }
                body.push(self.statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        Ok(Stmt {
            kind: StmtKind::Switch(discriminant, cases),
            line,
        })
    }

    // ---- functions and patterns ------------------------------------------

    /// Parses after the `function` keyword.
    fn function_rest(&mut self, require_name: bool) -> Result<Rc<FunctionDef>, ScriptError> {
        if self.eat_punct("*") {
            return Err(self.error_at("Generators are not supported"));
        }
        let name = if matches!(self.current().tok, Tok::Ident(_)) {
            Some(self.binding_name()?)
        } else if require_name {
            return Err(self.unexpected());
        } else {
            None
        };
        let (params, rest) = self.parameters()?;
        let body = FunctionBody::Block(self.block()?);
        Ok(Rc::new(FunctionDef {
            name,
            params,
            rest,
            body,
            is_arrow: false,
        }))
    }

    fn parameters(&mut self) -> Result<(Vec<Pattern>, Option<Pattern>), ScriptError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        let mut rest = None;
        while !self.eat_punct(")") {
            if self.eat_punct("...") {
                rest = Some(self.binding_pattern()?);
                self.eat_punct(",");
                self.expect_punct(")")?;
                break;
            }
            params.push(self.binding_element()?);
            if !self.is_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok((params, rest))
    }

    fn binding_element(&mut self) -> Result<Pattern, ScriptError> {
        let target = self.binding_pattern()?;
        if self.eat_punct("=") {
            let default = self.assignment(false)?;
            Ok(Pattern::Default(Box::new(target), Box::new(default)))
        } else {
            Ok(target)
        }
    }

    fn binding_pattern(&mut self) -> Result<Pattern, ScriptError> {
        self.enter()?;
        let result = self.binding_pattern_inner();
        self.leave();
        result
    }

    fn binding_pattern_inner(&mut self) -> Result<Pattern, ScriptError> {
        if self.eat_punct("[") {
            let mut items = Vec::new();
            let mut rest = None;
            while !self.eat_punct("]") {
                if self.eat_punct(",") {
                    items.push(None);
                    continue;
                }
                if self.eat_punct("...") {
                    rest = Some(Box::new(self.binding_pattern()?));
                    self.expect_punct("]")?;
                    break;
                }
                items.push(Some(self.binding_element()?));
                if !self.is_punct("]") {
                    self.expect_punct(",")?;
                }
            }
            return Ok(Pattern::Array(items, rest));
        }

        if self.eat_punct("{") {
            let mut props = Vec::new();
            let mut rest = None;
            while !self.eat_punct("}") {
                if self.eat_punct("...") {
                    rest = Some(Box::new(Pattern::Ident(self.binding_name()?)));
                    self.eat_punct(",");
                    self.expect_punct("}")?;
                    break;
                }
                let (key, shorthand) = self.property_key()?;
                let value = if self.eat_punct(":") {
                    self.binding_element()?
                } else {
                    let Some(name) = shorthand else {
                        return Err(self.unexpected());
                    };
                    if RESERVED.contains(&&*name) {
                        return Err(self.error_at(format!("Unexpected reserved word '{name}'")));
                    }
                    let target = Pattern::Ident(name);
                    if self.eat_punct("=") {
                        Pattern::Default(Box::new(target), Box::new(self.assignment(false)?))
                    } else {
                        target
                    }
                };
                props.push((key, value));
                if !self.is_punct("}") {
                    self.expect_punct(",")?;
                }
            }
            return Ok(Pattern::Object(props, rest));
        }

        Ok(Pattern::Ident(self.binding_name()?))
    }

    /// Returns the key and, for plain identifiers, the name usable as shorthand.
    fn property_key(&mut self) -> Result<(PropKey, Option<Name>), ScriptError> {
        let token = self.advance();
        match token.tok {
            Tok::Ident(name) => Ok((PropKey::Static(name.clone()), Some(name))),
            Tok::Str(value) => Ok((PropKey::Static(value), None)),
            Tok::Num(value) => Ok((PropKey::Static(number_to_string(value).into()), None)),
            Tok::Punct("[") => {
                let key = self.assignment(false)?;
                self.expect_punct("]")?;
                Ok((PropKey::Computed(Box::new(key)), None))
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }

    // ---- expressions -----------------------------------------------------

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.expression_with(false)
    }

    fn expression_with(&mut self, no_in: bool) -> Result<Expr, ScriptError> {
        let first = self.assignment(no_in)?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            items.push(self.assignment(no_in)?);
        }
        Ok(Expr::Sequence(items))
    }

    fn assignment(&mut self, no_in: bool) -> Result<Expr, ScriptError> {
        self.enter()?;
        let result = self.assignment_inner(no_in);
        self.leave();
        result
    }

    fn assignment_inner(&mut self, no_in: bool) -> Result<Expr, ScriptError> {
        if let Some(arrow) = self.try_arrow()? {
            return Ok(arrow);
        }

        let line = self.line();
        let target = self.conditional(no_in)?;
        let op = match &self.current().tok {
            Tok::Punct("=") => AssignOp::Assign,
            Tok::Punct("+=") => AssignOp::Arith(BinOp::Add),
            Tok::Punct("-=") => AssignOp::Arith(BinOp::Sub),
            Tok::Punct("*=") => AssignOp::Arith(BinOp::Mul),
            Tok::Punct("/=") => AssignOp::Arith(BinOp::Div),
            Tok::Punct("%=") => AssignOp::Arith(BinOp::Rem),
            Tok::Punct("**=") => AssignOp::Arith(BinOp::Pow),
            Tok::Punct("&&=") => AssignOp::Logical(LogicalOp::And),
            Tok::Punct("||=") => AssignOp::Logical(LogicalOp::Or),
            Tok::Punct("??=") => AssignOp::Logical(LogicalOp::Nullish),
            _ => return Ok(target),
        };
        self.pos += 1;

        let pattern = if op == AssignOp::Assign {
            expr_to_pattern(target)
        } else {
            match target {
                Expr::Ident(name) => Ok(Pattern::Ident(name)),
                member @ Expr::Member { .. } => Ok(Pattern::Member(Box::new(member))),
                _ => Err("Invalid left-hand side in assignment".to_string()),
            }
        }
        .map_err(|message| ScriptError::Syntax { message, line })?;

        let value = self.assignment(no_in)?;
        Ok(Expr::Assign(op, Box::new(pattern), Box::new(value)))
    }

    /// Index of the `)` matching the `(` at `self.pos + offset`.
    fn matching_paren(&self, offset: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (index, token) in self.tokens.iter().enumerate().skip(self.pos + offset) {
            match &token.tok {
                Tok::Punct("(" | "[" | "{") => depth += 1,
                Tok::Punct(")" | "]" | "}") => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(index);
                    }
                }
                Tok::Eof => return None,
                _ => {}
            }
        }
        None
    }

    fn arrow_after(&self, offset: usize) -> bool {
        match self.peek_tok(offset) {
            Tok::Ident(_) => matches!(self.peek_tok(offset + 1), Tok::Punct("=>")),
            Tok::Punct("(") => self.matching_paren(offset).is_some_and(|close| {
                matches!(
                    self.tokens.get(close + 1).map(|token| &token.tok),
                    Some(Tok::Punct("=>"))
                )
            }),
            _ => false,
        }
    }

    fn try_arrow(&mut self) -> Result<Option<Expr>, ScriptError> {
        let is_async = self.is_word("async") && !self.peek_is_newline(1) && self.arrow_after(1);
        if !is_async && !self.arrow_after(0) {
            return Ok(None);
        }
        if is_async {
            self.pos += 1;
        }

        let (params, rest) = if self.is_punct("(") {
            self.parameters()?
        } else {
            (vec![Pattern::Ident(self.binding_name()?)], None)
        };
        if self.current().newline_before {
            return Err(self.error_at("Line break before '=>'"));
        }
        self.expect_punct("=>")?;
        let body = if self.is_punct("{") {
            FunctionBody::Block(self.block()?)
        } else {
            FunctionBody::Expr(Box::new(self.assignment(false)?))
        };
        Ok(Some(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            rest,
            body,
            is_arrow: true,
        }))))
    }

    fn peek_is_newline(&self, offset: usize) -> bool {
        self.token_at(offset).newline_before
    }

    fn conditional(&mut self, no_in: bool) -> Result<Expr, ScriptError> {
        let test = self.binary(0, no_in)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.assignment(false)?;
        self.expect_punct(":")?;
        let alternate = self.assignment(no_in)?;
        Ok(Expr::Conditional(
            Box::new(test),
            Box::new(consequent),
            Box::new(alternate),
        ))
    }

    fn binary_op(&self, no_in: bool) -> Option<(u8, Result<BinOp, LogicalOp>)> {
        let op = match &self.current().tok {
            Tok::Punct("??") => (1, Err(LogicalOp::Nullish)),
            Tok::Punct("||") => (2, Err(LogicalOp::Or)),
            Tok::Punct("&&") => (3, Err(LogicalOp::And)),
            Tok::Punct("==") => (7, Ok(BinOp::Eq)),
            Tok::Punct("!=") => (7, Ok(BinOp::NotEq)),
            Tok::Punct("===") => (7, Ok(BinOp::StrictEq)),
            Tok::Punct("!==") => (7, Ok(BinOp::StrictNotEq)),
            Tok::Punct("<") => (8, Ok(BinOp::Lt)),
            Tok::Punct(">") => (8, Ok(BinOp::Gt)),
            Tok::Punct("<=") => (8, Ok(BinOp::LtEq)),
            Tok::Punct(">=") => (8, Ok(BinOp::GtEq)),
            Tok::Ident(word) if &**word == "instanceof" => (8, Ok(BinOp::InstanceOf)),
            Tok::Ident(word) if &**word == "in" && !no_in => (8, Ok(BinOp::In)),
            Tok::Punct("+") => (10, Ok(BinOp::Add)),
            Tok::Punct("-") => (10, Ok(BinOp::Sub)),
            Tok::Punct("*") => (11, Ok(BinOp::Mul)),
            Tok::Punct("/") => (11, Ok(BinOp::Div)),
            Tok::Punct("%") => (11, Ok(BinOp::Rem)),
            Tok::Punct("**") => (12, Ok(BinOp::Pow)),
            _ => return None,
        };
        Some(op)
    }

    fn binary(&mut self, min_precedence: u8, no_in: bool) -> Result<Expr, ScriptError> {
        let mut left = self.unary()?;
        while let Some((precedence, op)) = self.binary_op(no_in) {
            if precedence <= min_precedence {
                break;
            }
            self.pos += 1;
            self.enter()?;
            // `**` is right-associative
            let next_min = if op == Ok(BinOp::Pow) {
                precedence - 1
            } else {
                precedence
            };
            let right = self.binary(next_min, no_in);
            self.leave();
            let right = right?;
            left = match op {
                Ok(op) => Expr::Binary(op, Box::new(left), Box::new(right)),
                Err(op) => Expr::Logical(op, Box::new(left), Box::new(right)),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        self.enter()?;
        let result = self.unary_inner();
        self.leave();
        result
    }

    fn unary_inner(&mut self) -> Result<Expr, ScriptError> {
        let op = match &self.current().tok {
            Tok::Punct("!") => Some(UnaryOp::Not),
            Tok::Punct("-") => Some(UnaryOp::Neg),
            Tok::Punct("+") => Some(UnaryOp::Plus),
            Tok::Ident(word) if &**word == "typeof" => Some(UnaryOp::TypeOf),
            Tok::Ident(word) if &**word == "void" => Some(UnaryOp::Void),
            Tok::Ident(word) if &**word == "delete" => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.unary()?;
            if self.is_punct("**") {
                return Err(self.error_at("Unary operator before '**' needs parentheses"));
            }
            return Ok(Expr::Unary(op, Box::new(operand)));
        }
        if self.is_word("await") {
            self.pos += 1;
            return Ok(Expr::Await(Box::new(self.unary()?)));
        }
        if self.is_punct("++") || self.is_punct("--") {
            let increment = self.is_punct("++");
            self.pos += 1;
            let target = self.unary()?;
            check_update_target(&target).map_err(|message| self.error_at(message))?;
            return Ok(Expr::Update {
                increment,
                prefix: true,
                target: Box::new(target),
            });
        }

        let expr = self.left_hand_side()?;
        if (self.is_punct("++") || self.is_punct("--")) && !self.current().newline_before {
            let increment = self.is_punct("++");
            check_update_target(&expr).map_err(|message| self.error_at(message))?;
            self.pos += 1;
            return Ok(Expr::Update {
                increment,
                prefix: false,
                target: Box::new(expr),
            });
        }
        Ok(expr)
    }

    fn arguments(&mut self) -> Result<Vec<Arg>, ScriptError> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            if self.eat_punct("...") {
                args.push(Arg::Spread(self.assignment(false)?));
            } else {
                args.push(Arg::Item(self.assignment(false)?));
            }
            if !self.is_punct(")") {
                self.expect_punct(",")?;
            }
        }
        Ok(args)
    }

    fn member_name(&mut self) -> Result<Name, ScriptError> {
        self.ident_name()
    }

    fn left_hand_side(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = if self.is_word("new") {
            self.new_expression()?
        } else {
            self.primary()?
        };
        let mut optional_chain = false;
        loop {
            if self.eat_punct(".") {
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberProp::Static(self.member_name()?),
                    optional: false,
                };
            } else if self.eat_punct("?.") {
                optional_chain = true;
                expr = if self.is_punct("(") {
                    Expr::Call {
                        callee: Box::new(expr),
                        args: self.arguments()?,
                        optional: true,
                    }
                } else if self.eat_punct("[") {
                    let property = self.expression()?;
                    self.expect_punct("]")?;
                    Expr::Member {
                        object: Box::new(expr),
                        property: MemberProp::Computed(Box::new(property)),
                        optional: true,
                    }
                } else {
                    Expr::Member {
                        object: Box::new(expr),
                        property: MemberProp::Static(self.member_name()?),
                        optional: true,
                    }
                };
            } else if self.eat_punct("[") {
                let property = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberProp::Computed(Box::new(property)),
                    optional: false,
                };
            } else if self.is_punct("(") {
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args: self.arguments()?,
                    optional: false,
                };
            } else if matches!(self.current().tok, Tok::Template(_)) && !self.current().newline_before {
                return Err(self.error_at("Tagged templates are not supported"));
            } else {
                break;
            }
        }
        if optional_chain {
            expr = Expr::OptionalChain(Box::new(expr));
        }
        Ok(expr)
    }

    fn new_expression(&mut self) -> Result<Expr, ScriptError> {
        self.pos += 1;
        let mut callee = if self.is_word("new") {
            self.new_expression()?
        } else {
            self.primary()?
        };
        loop {
            if self.eat_punct(".") {
                callee = Expr::Member {
                    object: Box::new(callee),
                    property: MemberProp::Static(self.member_name()?),
                    optional: false,
                };
            } else if self.eat_punct("[") {
                let property = self.expression()?;
                self.expect_punct("]")?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property: MemberProp::Computed(Box::new(property)),
                    optional: false,
                };
            } else {
                break;
            }
        }
        let args = if self.is_punct("(") {
            self.arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::New(Box::new(callee), args))
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let token = self.advance();
        match token.tok {
            Tok::Num(value) => Ok(Expr::Num(value)),
            Tok::Str(value) => Ok(Expr::Str(value)),
            Tok::Template(parts) => self.template(parts),
            Tok::Punct("(") => {
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Tok::Punct("[") => self.array_literal(),
            Tok::Punct("{") => self.object_literal(),
            Tok::Ident(name) => match &*name {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "undefined" => Ok(Expr::Undefined),
                "this" => Ok(Expr::This),
                "function" => Ok(Expr::Function(self.function_rest(false)?)),
                "async" if self.is_word("function") => {
                    self.pos += 1;
                    Ok(Expr::Function(self.function_rest(false)?))
                }
                "class" => Err(self.error_at("Classes are not supported")),
                "import" => Err(self.error_at("Modules are not supported")),
                "super" | "yield" => Err(self.error_at(format!("'{name}' is not supported"))),
                word if RESERVED.contains(&word) => {
                    self.pos -= 1;
                    Err(self.unexpected())
                }
                _ => Ok(Expr::Ident(name)),
            },
            Tok::Punct("/") | Tok::Punct("/=") => {
                self.pos -= 1;
                Err(self.error_at("Regular expression literals are not supported"))
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn template(&mut self, parts: Vec<TemplatePart>) -> Result<Expr, ScriptError> {
        let mut chunks = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                TemplatePart::Str(text) => chunks.push(TemplateChunk::Str(text)),
                TemplatePart::Expr(tokens) => {
                    let mut inner = Parser::new(tokens, self.depth);
                    let expr = inner.expression()?;
                    if !inner.at_eof() {
                        return Err(inner.unexpected());
                    }
                    chunks.push(TemplateChunk::Expr(expr));
                }
            }
        }
        Ok(Expr::Template(chunks))
    }

    fn array_literal(&mut self) -> Result<Expr, ScriptError> {
        let mut items = Vec::new();
        while !self.eat_punct("]") {
            if self.eat_punct(",") {
                items.push(ArrayItem::Hole);
                continue;
            }
            if self.eat_punct("...") {
                items.push(ArrayItem::Spread(self.assignment(false)?));
            } else {
                items.push(ArrayItem::Item(self.assignment(false)?));
            }
            if !self.is_punct("]") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Array(items))
    }

    fn object_literal(&mut self) -> Result<Expr, ScriptError> {
        let mut props = Vec::new();
        while !self.eat_punct("}") {
            if self.eat_punct("...") {
                props.push(PropDef::Spread(self.assignment(false)?));
            } else {
                let is_async = self.is_word("async")
                    && !matches!(self.peek_tok(1), Tok::Punct("," | ":" | "(" | "}"));
                if is_async {
                    self.pos += 1;
                }
                if (self.is_word("get") || self.is_word("set"))
                    && matches!(self.peek_tok(1), Tok::Ident(_) | Tok::Str(_))
                {
                    return Err(self.error_at("Getters and setters are not supported"));
                }
                let (key, shorthand) = self.property_key()?;
                if self.is_punct("(") {
                    let (params, rest) = self.parameters()?;
                    let body = FunctionBody::Block(self.block()?);
                    let name = match &key {
                        PropKey::Static(name) => Some(name.clone()),
                        PropKey::Computed(_) => None,
                    };
                    props.push(PropDef::KeyValue(
                        key,
                        Expr::Function(Rc::new(FunctionDef {
                            name,
                            params,
                            rest,
                            body,
                            is_arrow: false,
                        })),
                    ));
                } else if self.eat_punct(":") {
                    props.push(PropDef::KeyValue(key, self.assignment(false)?));
                } else {
                    let Some(name) = shorthand else {
                        return Err(self.unexpected());
                    };
                    let value = if self.eat_punct("=") {
                        // Only meaningful when the literal becomes a pattern.
                        Expr::Assign(
                            AssignOp::Assign,
                            Box::new(Pattern::Ident(name.clone())),
                            Box::new(self.assignment(false)?),
                        )
                    } else {
                        Expr::Ident(name)
                    };
                    props.push(PropDef::KeyValue(key, value));
                }
            }
            if !self.is_punct("}") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Object(props))
    }
}

fn check_update_target(expr: &Expr) -> Result<(), String> {
    match expr {
        Expr::Ident(_) | Expr::Member { .. } => Ok(()),
        _ => Err("Invalid left-hand side expression in update operation".to_string()),
    }
}

/// Reinterpret an already parsed expression as an assignment target.
fn expr_to_pattern(expr: Expr) -> Result<Pattern, String> {
    match expr {
        Expr::Ident(name) => Ok(Pattern::Ident(name)),
        member @ Expr::Member { .. } => Ok(Pattern::Member(Box::new(member))),
        Expr::Assign(AssignOp::Assign, target, default) => Ok(Pattern::Default(target, default)),
        Expr::Array(items) => {
            let mut elements = Vec::new();
            let mut rest = None;
            let count = items.len();
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    ArrayItem::Hole => elements.push(None),
                    ArrayItem::Item(expr) => elements.push(Some(expr_to_pattern(expr)?)),
                    ArrayItem::Spread(expr) if index + 1 == count => {
                        rest = Some(Box::new(expr_to_pattern(expr)?));
                    }
                    ArrayItem::Spread(_) => {
                        return Err("Rest element must be last element".to_string());
                    }
                }
            }
            Ok(Pattern::Array(elements, rest))
        }
        Expr::Object(props) => {
            let mut entries = Vec::new();
            let mut rest = None;
            for prop in props {
                match prop {
                    PropDef::KeyValue(key, value) => entries.push((key, expr_to_pattern(value)?)),
                    PropDef::Spread(expr) => rest = Some(Box::new(expr_to_pattern(expr)?)),
                }
            }
            Ok(Pattern::Object(entries, rest))
        }
        _ => Err("Invalid left-hand side in assignment".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        parse_program(src).expect("parse")
    }

    fn syntax_error(src: &str) -> String {
        match parse_program(src) {
            Err(ScriptError::Syntax { message, .. }) => message,
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn parses_statements_with_and_without_semicolons() {
        let program = parse("const a = 1\nlet b = 2; a + b\nreturn a");
        assert_eq!(program.body.len(), 4);
        assert!(matches!(program.body[3].kind, StmtKind::Return(Some(_))));
        assert_eq!(program.body[3].line, 3);
    }

    #[test]
    fn return_followed_by_newline_returns_nothing() {
        let program = parse("return\n42");
        assert!(matches!(program.body[0].kind, StmtKind::Return(None)));
    }

    #[test]
    fn parses_arrows_and_destructuring() {
        let program = parse(
            "const f = async ({ a, b: [c, ...d] = [] }, e = 1) => a + c;\nconst g = x => x * 2;",
        );
        assert_eq!(program.body.len(), 2);
        let StmtKind::Declare(DeclKind::Const, decls) = &program.body[0].kind else {
            panic!("expected declaration");
        };
        let Some(Expr::Function(def)) = &decls[0].1 else {
            panic!("expected arrow");
        };
        assert!(def.is_arrow);
        assert_eq!(def.params.len(), 2);
    }

    #[test]
    fn parenthesized_expression_is_not_an_arrow() {
        let program = parse("const x = (1 + 2) * 3");
        let StmtKind::Declare(_, decls) = &program.body[0].kind else {
            panic!("expected declaration");
        };
        assert!(matches!(decls[0].1, Some(Expr::Binary(BinOp::Mul, _, _))));
    }

    #[test]
    fn exponent_is_right_associative() {
        let program = parse("2 ** 3 ** 2");
        let StmtKind::Expr(Expr::Binary(BinOp::Pow, left, right)) = &program.body[0].kind else {
            panic!("expected pow");
        };
        assert!(matches!(**left, Expr::Num(n) if n == 2.0));
        assert!(matches!(**right, Expr::Binary(BinOp::Pow, _, _)));
    }

    #[test]
    fn subtraction_is_left_associative() {
        let program = parse("10 - 4 - 3");
        let StmtKind::Expr(Expr::Binary(BinOp::Sub, left, right)) = &program.body[0].kind else {
            panic!("expected sub");
        };
        assert!(matches!(**left, Expr::Binary(BinOp::Sub, _, _)));
        assert!(matches!(**right, Expr::Num(n) if n == 3.0));
    }

    #[test]
    fn parses_for_variants() {
        parse("for (let i = 0; i < 3; i++) {}");
        parse("for (const [k, v] of Object.entries(o)) {}");
        parse("for (const k in o) {}");
        parse("for (;;) { break }");
        parse("let x; for (x of [1]) {}");
    }

    #[test]
    fn optional_chain_wraps_whole_chain() {
        let program = parse("a?.b.c()");
        assert!(matches!(
            program.body[0].kind,
            StmtKind::Expr(Expr::OptionalChain(_))
        ));
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(syntax_error("class A {}").contains("not supported"));
        assert!(syntax_error("const r = /abc/").contains("Regular expression"));
        assert!(syntax_error("function* g() {}").contains("Generators"));
        assert!(syntax_error("const = 1").contains("reserved"));
    }

    #[test]
    fn limits_nesting() {
        let deep = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        assert!(syntax_error(&deep).contains("nested too deeply"));
    }

    #[test]
    fn parses_template_substitutions() {
        let program = parse("`a ${1 + 2} b ${`c${3}`}`");
        let StmtKind::Expr(Expr::Template(chunks)) = &program.body[0].kind else {
            panic!("expected template");
        };
        assert_eq!(chunks.len(), 4);
    }
}
