//! Path-constraint expressions
//!
//! A small bit-vector language: constants, byte reads from symbolic arrays,
//! comparisons, boolean connectives, addition and `select`. Nodes are shared
//! through [`ExprRef`] and compared structurally, so equal expressions built
//! on different paths are interchangeable keys.
//!
//! Constructors fold constants and canonicalize `Eq` with the constant on the
//! left, which is the shape [`ConstraintManager`] relies on to learn
//! equalities.
//!
//! [`ConstraintManager`]: crate::features::execution_state::ConstraintManager

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type ExprRef = Arc<Expr>;
pub type ArrayRef = Arc<Array>;

/// Bit width of a boolean expression
pub const BOOL: u32 = 1;
/// Bit width of one byte read
pub const BYTE: u32 = 8;

/// Symbolic input backing a memory object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Array {
    pub name: String,
    pub size: u32,
}

impl Array {
    pub fn new(name: impl Into<String>, size: u32) -> ArrayRef {
        Arc::new(Self {
            name: name.into(),
            size,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Expr {
    Constant { value: u64, width: u32 },
    Read { array: ArrayRef, index: u32 },
    Eq(ExprRef, ExprRef),
    Ult(ExprRef, ExprRef),
    And(ExprRef, ExprRef),
    Or(ExprRef, ExprRef),
    Not(ExprRef),
    Add(ExprRef, ExprRef),
    Select {
        cond: ExprRef,
        then: ExprRef,
        els: ExprRef,
    },
}

fn mask(value: u64, width: u32) -> u64 {
    if width >= 64 {
        value
    } else {
        value & ((1u64 << width) - 1)
    }
}

impl Expr {
    pub fn constant(value: u64, width: u32) -> ExprRef {
        Arc::new(Expr::Constant {
            value: mask(value, width),
            width,
        })
    }

    pub fn bool(b: bool) -> ExprRef {
        Self::constant(b as u64, BOOL)
    }

    pub fn read(array: &ArrayRef, index: u32) -> ExprRef {
        Arc::new(Expr::Read {
            array: Arc::clone(array),
            index,
        })
    }

    pub fn width(&self) -> u32 {
        match self {
            Expr::Constant { width, .. } => *width,
            Expr::Read { .. } => BYTE,
            Expr::Eq(..) | Expr::Ult(..) | Expr::And(..) | Expr::Or(..) | Expr::Not(_) => BOOL,
            Expr::Add(a, _) => a.width(),
            Expr::Select { then, .. } => then.width(),
        }
    }

    pub fn as_constant(&self) -> Option<u64> {
        match self {
            Expr::Constant { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Expr::Constant { value: 1, width: BOOL })
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Expr::Constant { value: 0, width: BOOL })
    }

    pub fn eq(a: ExprRef, b: ExprRef) -> ExprRef {
        match (a.as_constant(), b.as_constant()) {
            (Some(x), Some(y)) => return Self::bool(x == y),
            (None, Some(_)) => return Self::eq(b, a),
            _ => {}
        }
        if a == b {
            return Self::bool(true);
        }
        if b.width() == BOOL {
            if a.is_true() {
                return b;
            }
            if a.is_false() {
                return Self::not(b);
            }
        }
        Arc::new(Expr::Eq(a, b))
    }

    pub fn ult(a: ExprRef, b: ExprRef) -> ExprRef {
        match (a.as_constant(), b.as_constant()) {
            (Some(x), Some(y)) => Self::bool(x < y),
            (_, Some(0)) => Self::bool(false),
            _ if a == b => Self::bool(false),
            _ => Arc::new(Expr::Ult(a, b)),
        }
    }

    fn complementary(a: &ExprRef, b: &ExprRef) -> bool {
        matches!(a.as_ref(), Expr::Not(x) if x == b) || matches!(b.as_ref(), Expr::Not(x) if x == a)
    }

    pub fn and(a: ExprRef, b: ExprRef) -> ExprRef {
        if a.is_false() || b.is_false() || Self::complementary(&a, &b) {
            return Self::bool(false);
        }
        if a.is_true() {
            return b;
        }
        if b.is_true() || a == b {
            return a;
        }
        Arc::new(Expr::And(a, b))
    }

    pub fn or(a: ExprRef, b: ExprRef) -> ExprRef {
        if a.is_true() || b.is_true() || Self::complementary(&a, &b) {
            return Self::bool(true);
        }
        if a.is_false() {
            return b;
        }
        if b.is_false() || a == b {
            return a;
        }
        Arc::new(Expr::Or(a, b))
    }

    pub fn not(a: ExprRef) -> ExprRef {
        if let Some(v) = a.as_constant() {
            return Self::bool(v == 0);
        }
        if let Expr::Not(inner) = a.as_ref() {
            return Arc::clone(inner);
        }
        Arc::new(Expr::Not(a))
    }

    pub fn add(a: ExprRef, b: ExprRef) -> ExprRef {
        let width = a.width();
        match (a.as_constant(), b.as_constant()) {
            (Some(x), Some(y)) => Self::constant(x.wrapping_add(y), width),
            (Some(0), None) => b,
            (None, Some(0)) => a,
            (None, Some(_)) => Arc::new(Expr::Add(b, a)),
            _ => Arc::new(Expr::Add(a, b)),
        }
    }

    pub fn select(cond: ExprRef, then: ExprRef, els: ExprRef) -> ExprRef {
        if cond.is_true() {
            return then;
        }
        if cond.is_false() || then == els {
            return els;
        }
        Arc::new(Expr::Select { cond, then, els })
    }

    /// Direct sub-expressions
    pub fn children(&self) -> Vec<&ExprRef> {
        match self {
            Expr::Constant { .. } | Expr::Read { .. } => Vec::new(),
            Expr::Not(a) => vec![a],
            Expr::Eq(a, b) | Expr::Ult(a, b) | Expr::And(a, b) | Expr::Or(a, b) | Expr::Add(a, b) => {
                vec![a, b]
            }
            Expr::Select { cond, then, els } => vec![cond, then, els],
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant { value, width: BOOL } => write!(f, "{}", *value != 0),
            Expr::Constant { value, .. } => write!(f, "{}", value),
            Expr::Read { array, index } => write!(f, "(Read w8 {} {})", index, array.name),
            Expr::Eq(a, b) => write!(f, "(Eq {} {})", a, b),
            Expr::Ult(a, b) => write!(f, "(Ult {} {})", a, b),
            Expr::And(a, b) => write!(f, "(And {} {})", a, b),
            Expr::Or(a, b) => write!(f, "(Or {} {})", a, b),
            Expr::Not(a) => write!(f, "(Not {})", a),
            Expr::Add(a, b) => write!(f, "(Add w{} {} {})", self.width(), a, b),
            Expr::Select { cond, then, els } => write!(f, "(Select {} {} {})", cond, then, els),
        }
    }
}

/// Rewrites expressions top-down
pub trait ExprVisitor {
    /// Replacement for `e`, or `None` to rewrite its children instead
    fn visit(&mut self, e: &ExprRef) -> Option<ExprRef>;
}

/// Apply `visitor` to `e`, rebuilding parents through the folding
/// constructors. Returns `e` itself when nothing changed.
pub fn rewrite(e: &ExprRef, visitor: &mut dyn ExprVisitor) -> ExprRef {
    if let Some(replacement) = visitor.visit(e) {
        return replacement;
    }
    let mut changed = false;
    let mut sub = |x: &ExprRef| {
        let r = rewrite(x, visitor);
        changed |= !Arc::ptr_eq(&r, x);
        r
    };
    let rebuilt = match e.as_ref() {
        Expr::Constant { .. } | Expr::Read { .. } => return Arc::clone(e),
        Expr::Not(a) => {
            let a = sub(a);
            Expr::not(a)
        }
        Expr::Eq(a, b) => {
            let (a, b) = (sub(a), sub(b));
            Expr::eq(a, b)
        }
        Expr::Ult(a, b) => {
            let (a, b) = (sub(a), sub(b));
            Expr::ult(a, b)
        }
        Expr::And(a, b) => {
            let (a, b) = (sub(a), sub(b));
            Expr::and(a, b)
        }
        Expr::Or(a, b) => {
            let (a, b) = (sub(a), sub(b));
            Expr::or(a, b)
        }
        Expr::Add(a, b) => {
            let (a, b) = (sub(a), sub(b));
            Expr::add(a, b)
        }
        Expr::Select { cond, then, els } => {
            let (c, t, f) = (sub(cond), sub(then), sub(els));
            Expr::select(c, t, f)
        }
    };
    if changed {
        rebuilt
    } else {
        Arc::clone(e)
    }
}

/// Replaces whole sub-expressions by value
#[derive(Debug, Default, Clone)]
pub struct ExprReplaceVisitor {
    replacements: BTreeMap<ExprRef, ExprRef>,
}

impl ExprReplaceVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(from: ExprRef, to: ExprRef) -> Self {
        let mut v = Self::new();
        v.insert(from, to);
        v
    }

    pub fn insert(&mut self, from: ExprRef, to: ExprRef) {
        self.replacements.insert(from, to);
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }
}

impl ExprVisitor for ExprReplaceVisitor {
    fn visit(&mut self, e: &ExprRef) -> Option<ExprRef> {
        self.replacements.get(e).cloned()
    }
}
