//! Syntax tree for the script language.

use std::rc::Rc;

pub type Name = Rc<str>;

#[derive(Debug)]
pub struct Program {
    pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug)]
pub enum StmtKind {
    Expr(Expr),
    Declare(DeclKind, Vec<(Pattern, Option<Expr>)>),
    Function(Rc<FunctionDef>),
    Return(Option<Expr>),
    If(Expr, Box<Stmt>, Option<Box<Stmt>>),
    Block(Vec<Stmt>),
    While(Expr, Box<Stmt>),
    DoWhile(Box<Stmt>, Expr),
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForIn {
        decl: Option<DeclKind>,
        target: Pattern,
        iterable: Expr,
        body: Box<Stmt>,
        of: bool,
    },
    Break,
    Continue,
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        param: Option<Pattern>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Switch(Expr, Vec<SwitchCase>),
    Empty,
}

#[derive(Debug)]
pub struct SwitchCase {
    /// `None` for `default:`.
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

#[derive(Debug)]
pub struct FunctionDef {
    pub name: Option<Name>,
    pub params: Vec<Pattern>,
    pub rest: Option<Pattern>,
    pub body: FunctionBody,
    pub is_arrow: bool,
}

#[derive(Debug)]
pub enum Pattern {
    Ident(Name),
    /// Only valid as an assignment target.
    Member(Box<Expr>),
    Array(Vec<Option<Pattern>>, Option<Box<Pattern>>),
    Object(Vec<(PropKey, Pattern)>, Option<Box<Pattern>>),
    Default(Box<Pattern>, Box<Expr>),
}

#[derive(Debug)]
pub enum PropKey {
    Static(Name),
    Computed(Box<Expr>),
}

#[derive(Debug)]
pub enum PropDef {
    KeyValue(PropKey, Expr),
    Spread(Expr),
}

#[derive(Debug)]
pub enum ArrayItem {
    Item(Expr),
    Spread(Expr),
    Hole,
}

#[derive(Debug)]
pub enum TemplateChunk {
    Str(Name),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Arith(BinOp),
    Logical(LogicalOp),
}

#[derive(Debug)]
pub enum MemberProp {
    Static(Name),
    Computed(Box<Expr>),
}

#[derive(Debug)]
pub enum Arg {
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug)]
pub enum Expr {
    Num(f64),
    Str(Name),
    Template(Vec<TemplateChunk>),
    Bool(bool),
    Null,
    Undefined,
    This,
    Ident(Name),
    Array(Vec<ArrayItem>),
    Object(Vec<PropDef>),
    Function(Rc<FunctionDef>),
    Unary(UnaryOp, Box<Expr>),
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Assign(AssignOp, Box<Pattern>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Member {
        object: Box<Expr>,
        property: MemberProp,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
        optional: bool,
    },
    New(Box<Expr>, Vec<Arg>),
    Sequence(Vec<Expr>),
    Await(Box<Expr>),
    /// Bounds the short-circuit of `?.` links inside it.
    OptionalChain(Box<Expr>),
}
