//! Tree-walking evaluator.

use super::ScriptError;
use super::ast::*;
use super::builtins;
use super::heap;
use super::scope::{self, AssignError, Scope, ScopeRef};
use super::value::*;
use crate::sdk::{Namespace, SdkError, SdkFunction, SdkHost};
use std::rc::Rc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deepest script call stack before a `RangeError` is thrown.
pub const MAX_CALL_DEPTH: usize = 128;

const TICKS_PER_CLOCK_CHECK: u32 = 1024;

/// Non-local control flow.
pub(super) enum Ctrl {
    Break,
    Continue,
    Return(Value),
    /// A `?.` link hit a nullish base; caught by the enclosing chain.
    ShortCircuit,
    Throw(Thrown),
    /// Uncatchable termination: timeout, cancellation, memory.
    Abort(ScriptError),
}

pub(super) struct Thrown {
    pub value: Value,
    pub line: u32,
    /// Set for failures raised by `ctx` calls: whether a path was refused.
    pub sdk_path_rejected: Option<bool>,
}

pub(super) type Flow<T> = Result<T, Ctrl>;

impl From<ScriptError> for Ctrl {
    fn from(error: ScriptError) -> Self {
        Ctrl::Abort(error)
    }
}

/// Property key after conversion.
pub(super) enum Key {
    Index(usize),
    Name(Name),
}

impl Key {
    pub fn name(&self) -> Name {
        match self {
            Key::Index(index) => Name::from(index.to_string()),
            Key::Name(name) => name.clone(),
        }
    }
}

pub(super) struct Interpreter<'h> {
    host: &'h dyn SdkHost,
    deadline: Instant,
    cancel: CancellationToken,
    memory_limit: usize,
    global: ScopeRef,
    ticks: u32,
    depth: usize,
    line: u32,
    rng: u64,
}

enum Binder {
    Declare { mutable: bool, var: bool },
    Assign,
}

impl<'h> Interpreter<'h> {
    pub fn new(
        host: &'h dyn SdkHost,
        deadline: Instant,
        cancel: CancellationToken,
        memory_limit: usize,
    ) -> Self {
        let global = Scope::new_ref(None, true, Some(Value::Undefined));
        builtins::install_globals(&mut global.borrow_mut());
        global.borrow_mut().declare("ctx".into(), Value::Host(HostObject::Ctx), false);
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0x9e37_79b9_7f4a_7c15);
        Self {
            host,
            deadline,
            cancel,
            memory_limit,
            global,
            ticks: 0,
            depth: 0,
            line: 1,
            rng: seed | 1,
        }
    }

    /// Run a whole program. The result is the returned value or, without a
    /// top-level `return`, the value of the last top-level expression statement.
    pub fn run(&mut self, program: &Program) -> Result<Value, ScriptError> {
        let global = self.global.clone();
        let mut last = Value::Undefined;
        let outcome = (|| -> Flow<()> {
            self.hoist(&program.body, &global);
            for stmt in &program.body {
                if let StmtKind::Expr(expr) = &stmt.kind {
                    self.line = stmt.line;
                    self.tick()?;
                    last = self.eval(expr, &global)?;
                } else {
                    self.exec(stmt, &global)?;
                }
            }
            Ok(())
        })();
        match outcome {
            Ok(()) => Ok(last),
            Err(Ctrl::Return(value)) => Ok(value),
            Err(ctrl) => Err(self.uncaught(ctrl)),
        }
    }

    fn uncaught(&self, ctrl: Ctrl) -> ScriptError {
        match ctrl {
            Ctrl::Abort(error) => error,
            Ctrl::Throw(thrown) => {
                if let Some(path_rejected) = thrown.sdk_path_rejected {
                    let message = match &thrown.value {
                        Value::Object(object) => error_parts(object)
                            .map(|(_, message)| message)
                            .unwrap_or_default(),
                        other => primitive_to_string(other).unwrap_or_default(),
                    };
                    return ScriptError::Sdk {
                        message,
                        path_rejected,
                    };
                }
                match &thrown.value {
                    Value::Object(object) => match error_parts(object) {
                        Some((name, message)) => ScriptError::Runtime {
                            name,
                            message,
                            line: thrown.line,
                        },
                        None => ScriptError::Thrown(
                            to_display(&thrown.value, 1024).unwrap_or_default(),
                        ),
                    },
                    other => ScriptError::Thrown(to_display(other, 1024).unwrap_or_default()),
                }
            }
            Ctrl::Break | Ctrl::Continue => ScriptError::Syntax {
                message: "Illegal break or continue statement".to_string(),
                line: self.line,
            },
            Ctrl::Return(_) | Ctrl::ShortCircuit => ScriptError::Runtime {
                name: "Error".to_string(),
                message: "Unexpected control flow".to_string(),
                line: self.line,
            },
        }
    }

    // ---- budgets -----------------------------------------------------------

    pub fn tick(&mut self) -> Flow<()> {
        self.check_heap()?;
        self.ticks = self.ticks.wrapping_add(1);
        if self.ticks % TICKS_PER_CLOCK_CHECK == 0 {
            if self.cancel.is_cancelled() {
                return Err(Ctrl::Abort(ScriptError::Cancelled));
            }
            if Instant::now() >= self.deadline {
                return Err(Ctrl::Abort(ScriptError::Timeout));
            }
        }
        Ok(())
    }

    pub fn check_heap(&self) -> Flow<()> {
        self.reserve(0)
    }

    /// Fail before an allocation of `bytes` would cross the memory limit.
    pub fn reserve(&self, bytes: usize) -> Flow<()> {
        if heap::live().saturating_add(bytes) > self.memory_limit {
            Err(Ctrl::Abort(ScriptError::MemoryLimit {
                limit: self.memory_limit,
            }))
        } else {
            Ok(())
        }
    }

    /// Room left under the memory limit.
    pub fn headroom(&self) -> usize {
        self.memory_limit.saturating_sub(heap::live())
    }

    pub fn next_random(&mut self) -> f64 {
        // xorshift64*
        let mut x = self.rng;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng = x;
        (x.wrapping_mul(0x2545_f491_4f6c_dd1d) >> 11) as f64 / (1u64 << 53) as f64
    }

    // ---- errors --------------------------------------------------------------

    pub fn throw(&self, name: &str, message: impl Into<String>) -> Ctrl {
        Ctrl::Throw(Thrown {
            value: builtins::make_error(name, &message.into()),
            line: self.line,
            sdk_path_rejected: None,
        })
    }

    pub fn throw_value(&self, value: Value) -> Ctrl {
        Ctrl::Throw(Thrown {
            value,
            line: self.line,
            sdk_path_rejected: None,
        })
    }

    pub fn type_error(&self, message: impl Into<String>) -> Ctrl {
        self.throw("TypeError", message)
    }

    pub fn range_error(&self, message: impl Into<String>) -> Ctrl {
        self.throw("RangeError", message)
    }

    fn reference_error(&self, name: &str) -> Ctrl {
        self.throw("ReferenceError", format!("{name} is not defined"))
    }

    /// ToString bounded by the remaining memory budget.
    pub fn display(&self, value: &Value) -> Flow<String> {
        if let Some(text) = primitive_to_string(value) {
            return Ok(text);
        }
        to_display(value, self.headroom()).ok_or(Ctrl::Abort(ScriptError::MemoryLimit {
            limit: self.memory_limit,
        }))
    }

    pub fn to_json(&self, value: &Value) -> Flow<Option<serde_json::Value>> {
        match to_json(value, self.headroom()) {
            Ok(json) => Ok(json),
            Err(JsonError::TooLarge) => Err(Ctrl::Abort(ScriptError::MemoryLimit {
                limit: self.memory_limit,
            })),
            Err(error) => Err(self.type_error(error.to_string())),
        }
    }

    // ---- statements ------------------------------------------------------------

    fn hoist(&mut self, body: &[Stmt], scope: &ScopeRef) {
        let mut names = Vec::new();
        collect_var_names(body, &mut names);
        {
            let mut target = scope.borrow_mut();
            for name in names {
                if !target.has_local(&name) {
                    target.declare(name, Value::Undefined, true);
                }
            }
        }
        self.hoist_functions(body, scope);
    }

    fn hoist_functions(&mut self, body: &[Stmt], scope: &ScopeRef) {
        for stmt in body {
            if let StmtKind::Function(def) = &stmt.kind
                && let Some(name) = &def.name
            {
                let closure = self.make_closure(def, scope);
                scope.borrow_mut().declare(name.clone(), closure, true);
            }
        }
    }

    fn make_closure(&self, def: &Rc<FunctionDef>, scope: &ScopeRef) -> Value {
        Value::Function(Rc::new(Closure {
            def: def.clone(),
            scope: scope.clone(),
        }))
    }

    fn exec_list(&mut self, body: &[Stmt], scope: &ScopeRef) -> Flow<()> {
        for stmt in body {
            self.exec(stmt, scope)?;
        }
        Ok(())
    }

    /// Run a block, giving it its own scope when it declares anything.
    fn exec_block(&mut self, body: &[Stmt], scope: &ScopeRef) -> Flow<()> {
        if !needs_scope(body) {
            return self.exec_list(body, scope);
        }
        let inner = Scope::new_ref(Some(scope.clone()), false, None);
        self.hoist_functions(body, &inner);
        let result = self.exec_list(body, &inner);
        scope::release_if_unshared(inner);
        result
    }

    fn exec(&mut self, stmt: &Stmt, scope: &ScopeRef) -> Flow<()> {
        self.line = stmt.line;
        self.tick()?;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            StmtKind::Declare(kind, declarators) => {
                for (pattern, init) in declarators {
                    let value = match init {
                        Some(init) => self.eval(init, scope)?,
                        // `var x;` keeps the hoisted value
                        None if *kind == DeclKind::Var => continue,
                        None => Value::Undefined,
                    };
                    let binder = Binder::Declare {
                        mutable: *kind != DeclKind::Const,
                        var: *kind == DeclKind::Var,
                    };
                    self.bind(pattern, value, scope, &binder)?;
                }
            }
            StmtKind::Function(_) | StmtKind::Empty => {}
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                return Err(Ctrl::Return(value));
            }
            StmtKind::If(test, consequent, alternate) => {
                if truthy(&self.eval(test, scope)?) {
                    self.exec_nested(consequent, scope)?;
                } else if let Some(alternate) = alternate {
                    self.exec_nested(alternate, scope)?;
                }
            }
            StmtKind::Block(body) => self.exec_block(body, scope)?,
            StmtKind::While(test, body) => loop {
                self.tick()?;
                if !truthy(&self.eval(test, scope)?) {
                    break;
                }
                match self.exec_nested(body, scope) {
                    Ok(()) | Err(Ctrl::Continue) => {}
                    Err(Ctrl::Break) => break,
                    Err(other) => return Err(other),
                }
            },
            StmtKind::DoWhile(body, test) => loop {
                self.tick()?;
                match self.exec_nested(body, scope) {
                    Ok(()) | Err(Ctrl::Continue) => {}
                    Err(Ctrl::Break) => break,
                    Err(other) => return Err(other),
                }
                if !truthy(&self.eval(test, scope)?) {
                    break;
                }
            },
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => self.exec_for(init.as_deref(), test.as_ref(), update.as_ref(), body, scope)?,
            StmtKind::ForIn {
                decl,
                target,
                iterable,
                body,
                of,
            } => self.exec_for_in(*decl, target, iterable, body, *of, scope)?,
            StmtKind::Break => return Err(Ctrl::Break),
            StmtKind::Continue => return Err(Ctrl::Continue),
            StmtKind::Throw(expr) => {
                let value = self.eval(expr, scope)?;
                return Err(Ctrl::Throw(Thrown {
                    value,
                    line: stmt.line,
                    sdk_path_rejected: None,
                }));
            }
            StmtKind::Try {
                block,
                param,
                handler,
                finalizer,
            } => self.exec_try(block, param.as_ref(), handler.as_deref(), finalizer.as_deref(), scope)?,
            StmtKind::Switch(discriminant, cases) => self.exec_switch(discriminant, cases, scope)?,
        }
        Ok(())
    }

    /// Statement in a position that may be a lone declaration (`if (x) let y`).
    fn exec_nested(&mut self, stmt: &Stmt, scope: &ScopeRef) -> Flow<()> {
        match &stmt.kind {
            StmtKind::Declare(DeclKind::Let | DeclKind::Const, _) | StmtKind::Function(_) => {
                self.exec_block(std::slice::from_ref(stmt), scope)
            }
            _ => self.exec(stmt, scope),
        }
    }

    fn exec_for(
        &mut self,
        init: Option<&Stmt>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        scope: &ScopeRef,
    ) -> Flow<()> {
        // `let` bindings get a fresh copy per iteration so closures capture
        // the value of that iteration.
        let per_iteration: Vec<Name> = match init.map(|stmt| &stmt.kind) {
            Some(StmtKind::Declare(DeclKind::Let | DeclKind::Const, declarators)) => {
                let mut names = Vec::new();
                for (pattern, _) in declarators {
                    pattern_names(pattern, &mut names);
                }
                names
            }
            _ => Vec::new(),
        };

        let mut iteration = if per_iteration.is_empty() {
            scope.clone()
        } else {
            Scope::new_ref(Some(scope.clone()), false, None)
        };
        if let Some(init) = init {
            self.exec(init, &iteration)?;
        }

        loop {
            self.tick()?;
            if let Some(test) = test
                && !truthy(&self.eval(test, &iteration)?)
            {
                break;
            }
            match self.exec_nested(body, &iteration) {
                Ok(()) | Err(Ctrl::Continue) => {}
                Err(Ctrl::Break) => break,
                Err(other) => return Err(other),
            }
            if !per_iteration.is_empty() {
                let next = Scope::new_ref(Some(scope.clone()), false, None);
                for name in &per_iteration {
                    if let Some(value) = scope::lookup(&iteration, name) {
                        next.borrow_mut().declare(name.clone(), value, true);
                    }
                }
                let previous = std::mem::replace(&mut iteration, next);
                scope::release_if_unshared(previous);
            }
            if let Some(update) = update {
                self.eval(update, &iteration)?;
            }
        }
        if !per_iteration.is_empty() {
            scope::release_if_unshared(iteration);
        }
        Ok(())
    }

    fn exec_for_in(
        &mut self,
        decl: Option<DeclKind>,
        target: &Pattern,
        iterable: &Expr,
        body: &Stmt,
        of: bool,
        scope: &ScopeRef,
    ) -> Flow<()> {
        let source = self.eval(iterable, scope)?;
        let items = if of {
            self.iterate(&source)?
        } else {
            self.enumerable_keys(&source)?
        };
        drop(source);

        for item in items {
            self.tick()?;
            let iteration = match decl {
                Some(DeclKind::Let | DeclKind::Const) => {
                    Scope::new_ref(Some(scope.clone()), false, None)
                }
                _ => scope.clone(),
            };
            let binder = match decl {
                Some(kind) => Binder::Declare {
                    mutable: kind != DeclKind::Const,
                    var: kind == DeclKind::Var,
                },
                None => Binder::Assign,
            };
            self.bind(target, item, &iteration, &binder)?;
            let outcome = self.exec_nested(body, &iteration);
            if !Rc::ptr_eq(&iteration, scope) {
                scope::release_if_unshared(iteration);
            }
            match outcome {
                Ok(()) | Err(Ctrl::Continue) => {}
                Err(Ctrl::Break) => break,
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        param: Option<&Pattern>,
        handler: Option<&[Stmt]>,
        finalizer: Option<&[Stmt]>,
        scope: &ScopeRef,
    ) -> Flow<()> {
        let outcome = match (self.exec_block(block, scope), handler) {
            (Err(Ctrl::Throw(thrown)), Some(handler)) => {
                let catch_scope = Scope::new_ref(Some(scope.clone()), false, None);
                let declare = Binder::Declare {
                    mutable: true,
                    var: false,
                };
                let outcome = match param {
                    Some(param) => self
                        .bind(param, thrown.value, &catch_scope, &declare)
                        .and_then(|()| self.exec_block(handler, &catch_scope)),
                    None => self.exec_block(handler, &catch_scope),
                };
                scope::release_if_unshared(catch_scope);
                outcome
            }
            (outcome, _) => outcome,
        };
        if matches!(outcome, Err(Ctrl::Abort(_))) {
            return outcome;
        }
        if let Some(finalizer) = finalizer {
            self.exec_block(finalizer, scope)?;
        }
        outcome
    }

    fn exec_switch(&mut self, discriminant: &Expr, cases: &[SwitchCase], scope: &ScopeRef) -> Flow<()> {
        let value = self.eval(discriminant, scope)?;
        let inner = Scope::new_ref(Some(scope.clone()), false, None);
        let mut start = None;
        for (index, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test
                && strict_equals(&value, &self.eval(test, &inner)?)
            {
                start = Some(index);
                break;
            }
        }
        let start = start.or_else(|| cases.iter().position(|case| case.test.is_none()));
        let mut outcome = Ok(());
        if let Some(start) = start {
            for case in cases.iter().skip(start) {
                self.hoist_functions(&case.body, &inner);
                match self.exec_list(&case.body, &inner) {
                    Ok(()) => {}
                    Err(Ctrl::Break) => break,
                    Err(other) => {
                        outcome = Err(other);
                        break;
                    }
                }
            }
        }
        scope::release_if_unshared(inner);
        outcome
    }

    // ---- bindings ------------------------------------------------------------------

    fn bind(&mut self, pattern: &Pattern, value: Value, scope: &ScopeRef, binder: &Binder) -> Flow<()> {
        match pattern {
            Pattern::Ident(name) => match binder {
                Binder::Declare { mutable, var } => {
                    let target = if *var { scope::function_scope(scope) } else { scope.clone() };
                    target.borrow_mut().declare(name.clone(), value, *mutable);
                    Ok(())
                }
                Binder::Assign => self.assign_name(name, value, scope),
            },
            Pattern::Member(expr) => self.assign_member(expr, value, scope),
            Pattern::Default(inner, default) => {
                let value = if matches!(value, Value::Undefined) {
                    self.eval(default, scope)?
                } else {
                    value
                };
                self.bind(inner, value, scope, binder)
            }
            Pattern::Array(items, rest) => {
                let values = self.iterate(&value)?;
                let mut values = values.into_iter();
                for item in items {
                    let next = values.next().unwrap_or(Value::Undefined);
                    if let Some(item) = item {
                        self.bind(item, next, scope, binder)?;
                    }
                }
                if let Some(rest) = rest {
                    let remaining = JsArray::new_value(values.collect());
                    self.bind(rest, remaining, scope, binder)?;
                }
                Ok(())
            }
            Pattern::Object(props, rest) => {
                if value.is_nullish() {
                    let kind = primitive_to_string(&value).unwrap_or_default();
                    return Err(self.type_error(format!(
                        "Cannot destructure '{kind}' as it is {kind}."
                    )));
                }
                let mut used = Vec::new();
                for (key, target) in props {
                    let key = match key {
                        PropKey::Static(name) => Key::Name(name.clone()),
                        PropKey::Computed(expr) => {
                            let key = self.eval(expr, scope)?;
                            self.to_key(&key)?
                        }
                    };
                    let item = self.get_property(&value, &key)?;
                    used.push(key.name());
                    self.bind(target, item, scope, binder)?;
                }
                if let Some(rest) = rest {
                    let remaining = JsObject::new_rc();
                    if let Value::Object(object) = &value {
                        for (key, item) in object.entries() {
                            if !used.iter().any(|used| **used == *key) {
                                remaining.set(key, item);
                            }
                        }
                    }
                    self.bind(rest, Value::Object(remaining), scope, binder)?;
                }
                Ok(())
            }
        }
    }

    fn assign_name(&mut self, name: &Name, value: Value, scope: &ScopeRef) -> Flow<()> {
        match scope::assign(scope, name, value) {
            Ok(previous) => {
                drop(previous);
                Ok(())
            }
            Err(AssignError::NotDefined) => Err(self.reference_error(name)),
            Err(AssignError::Constant) => {
                Err(self.type_error("Assignment to constant variable."))
            }
        }
    }

    fn assign_member(&mut self, expr: &Expr, value: Value, scope: &ScopeRef) -> Flow<()> {
        let Expr::Member {
            object, property, ..
        } = expr
        else {
            return Err(self.throw("SyntaxError", "Invalid assignment target"));
        };
        let target = self.eval(object, scope)?;
        let key = self.member_key(property, scope)?;
        self.set_property(&target, key, value)
    }

    // ---- expressions ------------------------------------------------------------------

    pub fn eval(&mut self, expr: &Expr, scope: &ScopeRef) -> Flow<Value> {
        match expr {
            Expr::Num(value) => Ok(Value::Number(*value)),
            Expr::Str(text) => Ok(Value::str(&**text)),
            Expr::Bool(value) => Ok(Value::Bool(*value)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::This => Ok(scope::lookup_this(scope)),
            Expr::Ident(name) => {
                scope::lookup(scope, name).ok_or_else(|| self.reference_error(name))
            }
            Expr::Template(chunks) => {
                let mut out = String::new();
                for chunk in chunks {
                    match chunk {
                        TemplateChunk::Str(text) => out.push_str(text),
                        TemplateChunk::Expr(expr) => {
                            let value = self.eval(expr, scope)?;
                            let text = self.display(&value)?;
                            self.reserve(out.len() + text.len())?;
                            out.push_str(&text);
                        }
                    }
                }
                Ok(Value::str(out))
            }
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        ArrayItem::Item(expr) => values.push(self.eval(expr, scope)?),
                        ArrayItem::Spread(expr) => {
                            let source = self.eval(expr, scope)?;
                            let spread = self.iterate(&source)?;
                            self.reserve(spread.len() * heap::SLOT)?;
                            values.extend(spread);
                        }
                        ArrayItem::Hole => values.push(Value::Undefined),
                    }
                }
                Ok(JsArray::new_value(values))
            }
            Expr::Object(props) => {
                let object = JsObject::new_rc();
                for prop in props {
                    match prop {
                        PropDef::KeyValue(key, value) => {
                            let key = match key {
                                PropKey::Static(name) => name.clone(),
                                PropKey::Computed(expr) => {
                                    let key = self.eval(expr, scope)?;
                                    self.to_key(&key)?.name()
                                }
                            };
                            let value = self.eval(value, scope)?;
                            object.set(key, value);
                        }
                        PropDef::Spread(expr) => {
                            let source = self.eval(expr, scope)?;
                            self.spread_into(&object, &source)?;
                        }
                    }
                }
                Ok(Value::Object(object))
            }
            Expr::Function(def) => Ok(self.make_closure(def, scope)),
            Expr::Unary(op, operand) => self.eval_unary(*op, operand, scope),
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let old = to_number(&self.eval(target, scope)?);
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.store(target, Value::Number(new), scope)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.binary(*op, &left, &right)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left, scope)?;
                let short = match op {
                    LogicalOp::And => !truthy(&left),
                    LogicalOp::Or => truthy(&left),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short { Ok(left) } else { self.eval(right, scope) }
            }
            Expr::Assign(op, target, value) => self.eval_assign(*op, target, value, scope),
            Expr::Conditional(test, consequent, alternate) => {
                if truthy(&self.eval(test, scope)?) {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let base = self.eval(object, scope)?;
                if *optional && base.is_nullish() {
                    return Err(Ctrl::ShortCircuit);
                }
                let key = self.member_key(property, scope)?;
                self.get_property(&base, &key)
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => self.eval_call(callee, args, *optional, scope),
            Expr::New(callee, args) => {
                let constructor = self.eval(callee, scope)?;
                let args = self.eval_args(args, scope)?;
                builtins::construct(self, &constructor, args, &describe(callee))
            }
            Expr::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = self.eval(item, scope)?;
                }
                Ok(last)
            }
            Expr::Await(inner) => self.eval(inner, scope),
            Expr::OptionalChain(inner) => match self.eval(inner, scope) {
                Err(Ctrl::ShortCircuit) => Ok(Value::Undefined),
                other => other,
            },
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, scope: &ScopeRef) -> Flow<Value> {
        match op {
            UnaryOp::TypeOf => {
                let value = match operand {
                    Expr::Ident(name) => scope::lookup(scope, name).unwrap_or(Value::Undefined),
                    other => self.eval(other, scope)?,
                };
                Ok(Value::str(type_of(&value)))
            }
            UnaryOp::Delete => match operand {
                Expr::Member {
                    object, property, ..
                } => {
                    let target = self.eval(object, scope)?;
                    let key = self.member_key(property, scope)?;
                    self.delete_property(&target, &key)
                }
                _ => Ok(Value::Bool(true)),
            },
            UnaryOp::Not => Ok(Value::Bool(!truthy(&self.eval(operand, scope)?))),
            UnaryOp::Neg => Ok(Value::Number(-to_number(&self.eval(operand, scope)?))),
            UnaryOp::Plus => Ok(Value::Number(to_number(&self.eval(operand, scope)?))),
            UnaryOp::Void => {
                self.eval(operand, scope)?;
                Ok(Value::Undefined)
            }
        }
    }

    fn eval_assign(&mut self, op: AssignOp, target: &Pattern, value: &Expr, scope: &ScopeRef) -> Flow<Value> {
        match op {
            AssignOp::Assign => {
                let value = self.eval(value, scope)?;
                self.bind(target, value.clone(), scope, &Binder::Assign)?;
                Ok(value)
            }
            AssignOp::Arith(op) => {
                let current = self.read_target(target, scope)?;
                let rhs = self.eval(value, scope)?;
                let result = self.binary(op, &current, &rhs)?;
                drop(current);
                self.bind(target, result.clone(), scope, &Binder::Assign)?;
                Ok(result)
            }
            AssignOp::Logical(op) => {
                let current = self.read_target(target, scope)?;
                let keep = match op {
                    LogicalOp::And => !truthy(&current),
                    LogicalOp::Or => truthy(&current),
                    LogicalOp::Nullish => !current.is_nullish(),
                };
                if keep {
                    return Ok(current);
                }
                let value = self.eval(value, scope)?;
                self.bind(target, value.clone(), scope, &Binder::Assign)?;
                Ok(value)
            }
        }
    }

    fn read_target(&mut self, target: &Pattern, scope: &ScopeRef) -> Flow<Value> {
        match target {
            Pattern::Ident(name) => scope::lookup(scope, name).ok_or_else(|| self.reference_error(name)),
            Pattern::Member(expr) => self.eval(expr, scope),
            _ => Err(self.throw("SyntaxError", "Invalid compound assignment target")),
        }
    }

    /// Write to an identifier or member expression (used by `++`/`--`).
    fn store(&mut self, target: &Expr, value: Value, scope: &ScopeRef) -> Flow<()> {
        match target {
            Expr::Ident(name) => self.assign_name(name, value, scope),
            member @ Expr::Member { .. } => self.assign_member(member, value, scope),
            _ => Err(self.throw("SyntaxError", "Invalid update target")),
        }
    }

    fn member_key(&mut self, property: &MemberProp, scope: &ScopeRef) -> Flow<Key> {
        match property {
            MemberProp::Static(name) => Ok(Key::Name(name.clone())),
            MemberProp::Computed(expr) => {
                let key = self.eval(expr, scope)?;
                self.to_key(&key)
            }
        }
    }

    pub fn to_key(&self, value: &Value) -> Flow<Key> {
        Ok(match value {
            Value::Number(number)
                if number.fract() == 0.0 && *number >= 0.0 && *number < 4_294_967_295.0 =>
            {
                Key::Index(*number as usize)
            }
            Value::Str(text) => match array_index(text) {
                Some(index) => Key::Index(index),
                None => Key::Name(Name::from(text.as_str())),
            },
            other => Key::Name(Name::from(self.display(other)?)),
        })
    }

    fn eval_args(&mut self, args: &[Arg], scope: &ScopeRef) -> Flow<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Arg::Item(expr) => values.push(self.eval(expr, scope)?),
                Arg::Spread(expr) => {
                    let source = self.eval(expr, scope)?;
                    values.extend(self.iterate(&source)?);
                }
            }
        }
        Ok(values)
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Arg], optional: bool, scope: &ScopeRef) -> Flow<Value> {
        let (function, this) = match callee {
            Expr::Member {
                object,
                property,
                optional: member_optional,
            } => {
                let base = self.eval(object, scope)?;
                if *member_optional && base.is_nullish() {
                    return Err(Ctrl::ShortCircuit);
                }
                let key = self.member_key(property, scope)?;
                let function = self.get_property(&base, &key)?;
                (function, base)
            }
            other => (self.eval(other, scope)?, Value::Undefined),
        };
        if optional && function.is_nullish() {
            return Err(Ctrl::ShortCircuit);
        }
        if !function.is_callable() {
            return Err(self.type_error(format!("{} is not a function", describe(callee))));
        }
        let args = self.eval_args(args, scope)?;
        self.call(&function, this, args)
    }

    /// Call any callable value.
    pub fn call(&mut self, function: &Value, this: Value, args: Vec<Value>) -> Flow<Value> {
        match function {
            Value::Function(closure) => self.call_closure(closure, this, args),
            Value::Native(native) => {
                self.tick()?;
                builtins::call_native(self, native, args)
            }
            Value::Host(HostObject::Function(function)) => self.call_host(*function, args),
            Value::Host(HostObject::Namespace(namespace)) => match namespace.call_target() {
                Some(function) => self.call_host(function, args),
                None => Err(self.type_error(format!("ctx.{namespace} is not a function"))),
            },
            _ => Err(self.type_error("value is not a function")),
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, this: Value, args: Vec<Value>) -> Flow<Value> {
        self.tick()?;
        if self.depth >= MAX_CALL_DEPTH {
            return Err(self.range_error("Maximum call stack size exceeded"));
        }
        self.depth += 1;
        let line = self.line;
        let result = self.invoke(closure, this, args);
        self.line = line;
        self.depth -= 1;
        result
    }

    fn invoke(&mut self, closure: &Rc<Closure>, this: Value, args: Vec<Value>) -> Flow<Value> {
        let def = closure.def.clone();
        let this = if def.is_arrow { None } else { Some(this) };
        let scope = Scope::new_ref(Some(closure.scope.clone()), true, this);
        let result = self.invoke_in(&def, closure, args, &scope);
        scope::release_if_unshared(scope);
        result
    }

    fn invoke_in(
        &mut self,
        def: &Rc<FunctionDef>,
        closure: &Rc<Closure>,
        args: Vec<Value>,
        scope: &ScopeRef,
    ) -> Flow<Value> {
        let declare = Binder::Declare {
            mutable: true,
            var: false,
        };
        if !def.is_arrow
            && let Some(name) = &def.name
        {
            scope
                .borrow_mut()
                .declare(name.clone(), Value::Function(closure.clone()), true);
        }
        let mut args = args.into_iter();
        for param in &def.params {
            let value = args.next().unwrap_or(Value::Undefined);
            self.bind(param, value, scope, &declare)?;
        }
        if let Some(rest) = &def.rest {
            let remaining = JsArray::new_value(args.collect());
            self.bind(rest, remaining, scope, &declare)?;
        }

        match &def.body {
            FunctionBody::Expr(expr) => self.eval(expr, scope),
            FunctionBody::Block(body) => {
                self.hoist(body, scope);
                match self.exec_list(body, scope) {
                    Ok(()) => Ok(Value::Undefined),
                    Err(Ctrl::Return(value)) => Ok(value),
                    Err(Ctrl::Break | Ctrl::Continue) => Err(self.throw(
                        "SyntaxError",
                        "Illegal break or continue statement",
                    )),
                    Err(other) => Err(other),
                }
            }
        }
    }

    fn call_host(&mut self, function: SdkFunction, args: Vec<Value>) -> Flow<Value> {
        self.tick()?;
        let mut json_args = Vec::with_capacity(args.len());
        for arg in &args {
            json_args.push(self.to_json(arg)?.unwrap_or(serde_json::Value::Null));
        }
        drop(args);
        match self.host.call(function, json_args) {
            Ok(result) => {
                let value = from_json(&result);
                drop(result);
                self.check_heap()?;
                Ok(value)
            }
            Err(SdkError::Cancelled) => Err(Ctrl::Abort(ScriptError::Cancelled)),
            Err(error) => {
                let path_rejected = error.is_path_rejection();
                Err(Ctrl::Throw(Thrown {
                    value: builtins::make_error("Error", &error.to_string()),
                    line: self.line,
                    sdk_path_rejected: Some(path_rejected),
                }))
            }
        }
    }

    // ---- operators --------------------------------------------------------------------

    pub fn binary(&mut self, op: BinOp, left: &Value, right: &Value) -> Flow<Value> {
        let number = |value: f64| -> Flow<Value> { Ok(Value::Number(value)) };
        match op {
            BinOp::Add => {
                let numeric = |value: &Value| {
                    matches!(
                        value,
                        Value::Number(_) | Value::Bool(_) | Value::Null | Value::Undefined
                    )
                };
                if numeric(left) && numeric(right) {
                    return number(to_number(left) + to_number(right));
                }
                let left = self.display(left)?;
                let right = self.display(right)?;
                self.reserve(left.len() + right.len())?;
                Ok(Value::str(left + &right))
            }
            BinOp::Sub => number(to_number(left) - to_number(right)),
            BinOp::Mul => number(to_number(left) * to_number(right)),
            BinOp::Div => number(to_number(left) / to_number(right)),
            BinOp::Rem => number(to_number(left) % to_number(right)),
            BinOp::Pow => number(to_number(left).powf(to_number(right))),
            BinOp::Eq => Ok(Value::Bool(self.loose_eq(left, right)?)),
            BinOp::NotEq => Ok(Value::Bool(!self.loose_eq(left, right)?)),
            BinOp::StrictEq => Ok(Value::Bool(strict_equals(left, right))),
            BinOp::StrictNotEq => Ok(Value::Bool(!strict_equals(left, right))),
            BinOp::Lt => self.compare(left, right, |ordering| ordering.is_lt()),
            BinOp::Gt => self.compare(left, right, |ordering| ordering.is_gt()),
            BinOp::LtEq => self.compare(left, right, |ordering| ordering.is_le()),
            BinOp::GtEq => self.compare(left, right, |ordering| ordering.is_ge()),
            BinOp::In => {
                let key = self.to_key(left)?;
                let found = match right {
                    Value::Object(object) => object.contains(&key.name()),
                    Value::Array(array) => match &key {
                        Key::Index(index) => *index < array.len(),
                        Key::Name(name) => &**name == "length",
                    },
                    Value::Host(host) => host_member(*host, &key.name()).is_some(),
                    _ => {
                        return Err(self.type_error(
                            "Cannot use 'in' operator to search for a key in a primitive",
                        ));
                    }
                };
                Ok(Value::Bool(found))
            }
            BinOp::InstanceOf => Ok(Value::Bool(builtins::instance_of(self, left, right)?)),
        }
    }

    fn loose_eq(&self, left: &Value, right: &Value) -> Flow<bool> {
        // Containers compared with primitives go through their string form.
        let container = |value: &Value| matches!(value, Value::Array(_) | Value::Object(_));
        let primitive = |value: &Value| {
            matches!(value, Value::Number(_) | Value::Str(_) | Value::Bool(_))
        };
        if container(left) && primitive(right) {
            let left = Value::str(self.display(left)?);
            return Ok(loose_equals(&left, right));
        }
        if primitive(left) && container(right) {
            let right = Value::str(self.display(right)?);
            return Ok(loose_equals(left, &right));
        }
        Ok(loose_equals(left, right))
    }

    fn compare(
        &self,
        left: &Value,
        right: &Value,
        accept: impl Fn(std::cmp::Ordering) -> bool,
    ) -> Flow<Value> {
        let to_primitive = |value: &Value| -> Flow<Value> {
            Ok(match value {
                Value::Array(_) | Value::Object(_) => Value::str(self.display(value)?),
                other => other.clone(),
            })
        };
        let left = to_primitive(left)?;
        let right = to_primitive(right)?;
        let ordering = match (&left, &right) {
            (Value::Str(a), Value::Str(b)) => Some(a.as_str().cmp(b.as_str())),
            _ => to_number(&left).partial_cmp(&to_number(&right)),
        };
        Ok(Value::Bool(ordering.is_some_and(accept)))
    }

    // ---- properties -------------------------------------------------------------------

    pub fn get_property(&mut self, base: &Value, key: &Key) -> Flow<Value> {
        match base {
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                primitive_to_string(base).unwrap_or_default(),
                key.name()
            ))),
            Value::Array(array) => Ok(match key {
                Key::Index(index) => array.get(*index).unwrap_or(Value::Undefined),
                Key::Name(name) if &**name == "length" => Value::Number(array.len() as f64),
                Key::Name(name) => builtins::method(base, name).unwrap_or(Value::Undefined),
            }),
            Value::Str(text) => Ok(match key {
                Key::Index(index) => builtins::char_at(text, *index)
                    .map(|c| Value::str(c.to_string()))
                    .unwrap_or(Value::Undefined),
                Key::Name(name) if &**name == "length" => {
                    Value::Number(builtins::char_len(text) as f64)
                }
                Key::Name(name) => builtins::method(base, name).unwrap_or(Value::Undefined),
            }),
            Value::Object(object) => {
                let name = key.name();
                match object.get(&name) {
                    Some(value) => Ok(value),
                    None => Ok(builtins::method(base, &name).unwrap_or(Value::Undefined)),
                }
            }
            Value::Number(_) | Value::Bool(_) => {
                Ok(builtins::method(base, &key.name()).unwrap_or(Value::Undefined))
            }
            Value::Function(closure) => Ok(match &*key.name() {
                "name" => Value::str(closure.def.name.as_deref().unwrap_or("")),
                "length" => Value::Number(closure.def.params.len() as f64),
                _ => Value::Undefined,
            }),
            Value::Native(native) => Ok(match &**native {
                Native::Namespace(namespace) => {
                    builtins::namespace_member(namespace, &key.name()).unwrap_or(Value::Undefined)
                }
                Native::Function(name) | Native::Method(_, name) if &*key.name() == "name" => {
                    Value::str(*name)
                }
                _ => Value::Undefined,
            }),
            Value::Host(host) => Ok(host_member(*host, &key.name()).unwrap_or(Value::Undefined)),
        }
    }

    pub fn set_property(&mut self, base: &Value, key: Key, value: Value) -> Flow<()> {
        match base {
            Value::Object(object) => {
                if object.is_frozen() {
                    return Err(self.type_error(format!(
                        "Cannot assign to read only property '{}' of object",
                        key.name()
                    )));
                }
                object.set(key.name(), value);
                Ok(())
            }
            Value::Array(array) => {
                if array.is_frozen() {
                    return Err(self.type_error(format!(
                        "Cannot assign to read only property '{}' of array",
                        key.name()
                    )));
                }
                match key {
                    Key::Index(index) => {
                        let len = array.len();
                        if index >= len {
                            self.reserve((index + 1 - len).saturating_mul(heap::SLOT))?;
                        }
                        array.with_mut(|items| {
                            if index >= items.len() {
                                items.resize(index + 1, Value::Undefined);
                            }
                            if let Some(slot) = items.get_mut(index) {
                                *slot = value;
                            }
                        });
                        Ok(())
                    }
                    Key::Name(name) if &*name == "length" => {
                        let length = to_number(&value);
                        if length < 0.0 || length.fract() != 0.0 || length > 4_294_967_295.0 {
                            return Err(self.range_error("Invalid array length"));
                        }
                        let length = length as usize;
                        let len = array.len();
                        if length > len {
                            self.reserve((length - len).saturating_mul(heap::SLOT))?;
                        }
                        array.with_mut(|items| items.resize(length, Value::Undefined));
                        Ok(())
                    }
                    Key::Name(name) => Err(self.type_error(format!(
                        "Cannot set property '{name}' on an array"
                    ))),
                }
            }
            Value::Host(host) => Err(self.type_error(format!(
                "Cannot assign to read-only property '{}' of {}",
                key.name(),
                host_label(*host)
            ))),
            Value::Undefined | Value::Null => Err(self.type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                primitive_to_string(base).unwrap_or_default(),
                key.name()
            ))),
            Value::Native(_) | Value::Function(_) => Err(self.type_error(format!(
                "Cannot assign to read-only property '{}' of function",
                key.name()
            ))),
            _ => Err(self.type_error(format!(
                "Cannot create property '{}' on {}",
                key.name(),
                type_of(base)
            ))),
        }
    }

    fn delete_property(&mut self, base: &Value, key: &Key) -> Flow<Value> {
        match base {
            Value::Object(object) if !object.is_frozen() => {
                object.remove(&key.name());
                Ok(Value::Bool(true))
            }
            Value::Array(array) if !array.is_frozen() => {
                if let Key::Index(index) = key {
                    array.with_mut(|items| {
                        if let Some(slot) = items.get_mut(*index) {
                            *slot = Value::Undefined;
                        }
                    });
                }
                Ok(Value::Bool(true))
            }
            Value::Host(host) => Err(self.type_error(format!(
                "Cannot delete property '{}' of {}",
                key.name(),
                host_label(*host)
            ))),
            Value::Undefined | Value::Null => Err(self.type_error("Cannot convert undefined or null to object")),
            _ => Err(self.type_error(format!("Cannot delete property '{}'", key.name()))),
        }
    }

    fn spread_into(&mut self, object: &JsObject, source: &Value) -> Flow<()> {
        match source {
            Value::Object(source) => {
                for (key, value) in source.entries() {
                    object.set(key, value);
                }
            }
            Value::Array(array) => {
                for (index, value) in array.to_vec().into_iter().enumerate() {
                    object.set(Name::from(index.to_string()), value);
                }
            }
            Value::Str(text) => {
                self.reserve(text.len() * (heap::ENTRY_OVERHEAD + heap::STRING_OVERHEAD))?;
                for (index, c) in text.chars().enumerate() {
                    object.set(Name::from(index.to_string()), Value::str(c.to_string()));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Values produced by `for...of`, spread and array destructuring.
    pub fn iterate(&mut self, value: &Value) -> Flow<Vec<Value>> {
        match value {
            Value::Array(array) => Ok(array.to_vec()),
            Value::Str(text) => {
                self.reserve(text.len() * (heap::STRING_OVERHEAD + heap::SLOT))?;
                Ok(text.chars().map(|c| Value::str(c.to_string())).collect())
            }
            other => Err(self.type_error(format!("{} is not iterable", type_of(other)))),
        }
    }

    fn enumerable_keys(&mut self, value: &Value) -> Flow<Vec<Value>> {
        Ok(match value {
            Value::Object(object) => object
                .keys()
                .into_iter()
                .map(|key| Value::str(&*key))
                .collect(),
            Value::Array(array) => (0..array.len()).map(|index| Value::str(index.to_string())).collect(),
            Value::Str(text) => {
                self.reserve(text.len() * (heap::STRING_OVERHEAD + heap::SLOT))?;
                (0..text.chars().count())
                    .map(|index| Value::str(index.to_string()))
                    .collect()
            }
            _ => Vec::new(),
        })
    }
}

impl Drop for Interpreter<'_> {
    fn drop(&mut self) {
        heap::teardown();
    }
}

fn host_label(host: HostObject) -> String {
    match host {
        HostObject::Ctx => "ctx".to_string(),
        HostObject::Namespace(namespace) => format!("ctx.{namespace}"),
        HostObject::Function(function) => format!("ctx.{function}"),
    }
}

/// Member lookup on the `ctx` object graph.
pub(super) fn host_member(host: HostObject, name: &str) -> Option<Value> {
    match host {
        HostObject::Ctx => Namespace::from_name(name).map(|ns| Value::Host(HostObject::Namespace(ns))),
        HostObject::Namespace(namespace) => SdkFunction::resolve(namespace, name)
            .map(|function| Value::Host(HostObject::Function(function))),
        HostObject::Function(_) => None,
    }
}

/// Source-ish description of a callee for error messages.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.to_string(),
        Expr::This => "this".to_string(),
        Expr::Member {
            object, property, ..
        } => match property {
            MemberProp::Static(name) => format!("{}.{name}", describe(object)),
            MemberProp::Computed(_) => format!("{}[...]", describe(object)),
        },
        Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
        Expr::OptionalChain(inner) => describe(inner),
        _ => "expression".to_string(),
    }
}

fn needs_scope(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| {
        matches!(
            stmt.kind,
            StmtKind::Declare(DeclKind::Let | DeclKind::Const, _) | StmtKind::Function(_)
        )
    })
}

fn collect_var_names(body: &[Stmt], out: &mut Vec<Name>) {
    for stmt in body {
        collect_in_stmt(stmt, out);
    }
}

fn collect_in_stmt(stmt: &Stmt, out: &mut Vec<Name>) {
    match &stmt.kind {
        StmtKind::Declare(DeclKind::Var, declarators) => {
            for (pattern, _) in declarators {
                pattern_names(pattern, out);
            }
        }
        StmtKind::If(_, consequent, alternate) => {
            collect_in_stmt(consequent, out);
            if let Some(alternate) = alternate {
                collect_in_stmt(alternate, out);
            }
        }
        StmtKind::Block(body) => collect_var_names(body, out),
        StmtKind::While(_, body) | StmtKind::DoWhile(body, _) => collect_in_stmt(body, out),
        StmtKind::For { init, body, .. } => {
            if let Some(init) = init {
                collect_in_stmt(init, out);
            }
            collect_in_stmt(body, out);
        }
        StmtKind::ForIn {
            decl, target, body, ..
        } => {
            if *decl == Some(DeclKind::Var) {
                pattern_names(target, out);
            }
            collect_in_stmt(body, out);
        }
        StmtKind::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            collect_var_names(block, out);
            if let Some(handler) = handler {
                collect_var_names(handler, out);
            }
            if let Some(finalizer) = finalizer {
                collect_var_names(finalizer, out);
            }
        }
        StmtKind::Switch(_, cases) => {
            for case in cases {
                collect_var_names(&case.body, out);
            }
        }
        _ => {}
    }
}

fn pattern_names(pattern: &Pattern, out: &mut Vec<Name>) {
    match pattern {
        Pattern::Ident(name) => out.push(name.clone()),
        Pattern::Member(_) => {}
        Pattern::Default(inner, _) => pattern_names(inner, out),
        Pattern::Array(items, rest) => {
            for item in items.iter().flatten() {
                pattern_names(item, out);
            }
            if let Some(rest) = rest {
                pattern_names(rest, out);
            }
        }
        Pattern::Object(props, rest) => {
            for (_, value) in props {
                pattern_names(value, out);
            }
            if let Some(rest) = rest {
                pattern_names(rest, out);
            }
        }
    }
}
