//! Expression-level AST types.
//!
//! The evaluator consumes a pre-parsed tree; these types are the input
//! contract for the expression half of it. Statement nodes live in
//! [`crate::nodes`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Source position of a node, used for error reporting.
///
/// Lines and columns are 1-based, matching what parsers conventionally emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeRange {
    pub line: u32,
    pub column: u32,
}

impl CodeRange {
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for CodeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// An expression with its source location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExprLoc {
    pub position: CodeRange,
    pub expr: Expr,
}

impl ExprLoc {
    #[must_use]
    pub fn new(position: CodeRange, expr: Expr) -> Self {
        Self { position, expr }
    }

    /// Convenience constructor for trees built in code (tests, embedders):
    /// the position defaults to 0:0.
    #[must_use]
    pub fn at_origin(expr: Expr) -> Self {
        Self::new(CodeRange::default(), expr)
    }
}

/// A literal constant in the template source.
///
/// Literals are detached from the runtime [`Value`] type so the AST stays a
/// plain serializable data structure; conversion happens in one place via
/// the `From` impl below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        match literal {
            Literal::None => Self::None,
            Literal::Bool(b) => Self::Bool(b),
            Literal::Int(v) => Self::Int(v),
            Literal::Float(v) => Self::Float(v),
            Literal::Str(s) => Self::String(s),
        }
    }
}

/// Binary arithmetic and string operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    /// String concatenation (`~`): both operands are coerced to string.
    Concat,
}

/// Comparison and membership operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
}

/// Logical connectives. Both short-circuit: the right operand is not
/// evaluated when the left already determines the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicOperator {
    And,
    Or,
}

/// Argument expressions for a call site, in source order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallArgs {
    pub positional: Vec<ExprLoc>,
    pub named: Vec<(String, ExprLoc)>,
}

impl CallArgs {
    #[must_use]
    pub fn positional(args: Vec<ExprLoc>) -> Self {
        Self {
            positional: args,
            named: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// Target of a for-loop or comprehension binding.
///
/// Templates only ever destructure one level deep (`{% for k, v in m %}`),
/// so tuple targets are a flat name list rather than a recursive structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UnpackTarget {
    /// Single identifier: the item binds as-is.
    Name(String),
    /// Multiple identifiers: the item must be iterable with matching length.
    Tuple {
        targets: Vec<String>,
        /// Position covering all targets, for unpack-error reporting.
        position: CodeRange,
    },
}

impl UnpackTarget {
    /// Number of variables this target binds.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Self::Name(_) => 1,
            Self::Tuple { targets, .. } => targets.len(),
        }
    }
}

/// An expression in the AST.
///
/// Boxed children keep the enum itself small; the evaluator dispatches with
/// one match arm per variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    /// Identifier lookup in the active context.
    Name(String),
    /// List display: `[a, b, c]`.
    List(Vec<ExprLoc>),
    /// Dict display: `{k: v, ...}`. Keys are coerced to string at evaluation.
    Dict(Vec<(ExprLoc, ExprLoc)>),
    /// Binary arithmetic / concatenation.
    Op {
        left: Box<ExprLoc>,
        op: Operator,
        right: Box<ExprLoc>,
    },
    /// Comparison or membership.
    CmpOp {
        left: Box<ExprLoc>,
        op: CmpOperator,
        right: Box<ExprLoc>,
    },
    /// `and` / `or` with short-circuit semantics.
    Logic {
        left: Box<ExprLoc>,
        op: LogicOperator,
        right: Box<ExprLoc>,
    },
    /// Unary `not` - boolean negation of the operand's truthiness.
    Not(Box<ExprLoc>),
    /// Unary minus - negates a numeric value.
    Neg(Box<ExprLoc>),
    /// Attribute access: `obj.attr`.
    AttrGet {
        object: Box<ExprLoc>,
        attr: String,
    },
    /// Item access: `obj[key]`.
    Subscript {
        object: Box<ExprLoc>,
        index: Box<ExprLoc>,
    },
    /// Slice: `obj[start:end:step]`, Python rules.
    ///
    /// Each bound is optional (None means the default for that position with
    /// respect to the step's sign).
    Slice {
        object: Box<ExprLoc>,
        lower: Option<Box<ExprLoc>>,
        upper: Option<Box<ExprLoc>>,
        step: Option<Box<ExprLoc>>,
    },
    /// Call of an arbitrary callable expression: macros, host functions,
    /// namespace members, `super()`, `loop.cycle(...)`.
    Call {
        callable: Box<ExprLoc>,
        args: Box<CallArgs>,
    },
    /// Filter application: `value | name(args)`.
    ///
    /// Chains nest through `value`: `x | trim | upper` parses as
    /// `Filter(Filter(x, trim), upper)`. The evaluator flattens the chain and
    /// evaluates the innermost input exactly once.
    Filter {
        value: Box<ExprLoc>,
        name: String,
        args: Box<CallArgs>,
    },
    /// Test application: `value is name(args)` / `value is not name`.
    Test {
        value: Box<ExprLoc>,
        name: String,
        args: Box<CallArgs>,
        negated: bool,
    },
    /// Conditional expression: `body if test else orelse`.
    ///
    /// Only the selected branch is evaluated.
    IfElse {
        test: Box<ExprLoc>,
        body: Box<ExprLoc>,
        orelse: Box<ExprLoc>,
    },
    /// List comprehension: `[elt for target in iter if cond]`.
    ///
    /// Loop variables bind in a child context and do not leak out.
    ListComp {
        elt: Box<ExprLoc>,
        target: UnpackTarget,
        iter: Box<ExprLoc>,
        cond: Option<Box<ExprLoc>>,
    },
    /// Dict comprehension: `{key: value for target in iter if cond}`.
    ///
    /// Keys are coerced to string; later keys overwrite earlier ones.
    DictComp {
        key: Box<ExprLoc>,
        value: Box<ExprLoc>,
        target: UnpackTarget,
        iter: Box<ExprLoc>,
        cond: Option<Box<ExprLoc>>,
    },
}

impl Expr {
    /// True for expressions whose evaluation cannot touch the context.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}
