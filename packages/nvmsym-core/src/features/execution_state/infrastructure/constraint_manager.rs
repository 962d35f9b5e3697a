//! Path constraint set
//!
//! Constraints are kept simplified against each other: adding `c == x`
//! rewrites every existing constraint with `x := c`, and conjunctions are
//! split so each member can be used for rewriting on its own.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::features::execution_state::domain::expr::{
    rewrite, Expr, ExprRef, ExprReplaceVisitor, ExprVisitor,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintManager {
    constraints: BTreeSet<ExprRef>,
}

impl ConstraintManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from constraints without simplifying them
    pub fn from_constraints(constraints: impl IntoIterator<Item = ExprRef>) -> Self {
        Self {
            constraints: constraints.into_iter().collect(),
        }
    }

    pub fn empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExprRef> {
        self.constraints.iter()
    }

    pub fn contains(&self, e: &ExprRef) -> bool {
        self.constraints.contains(e)
    }

    /// Learned facts as a replacement map: `c == x` maps `x` to `c`, any other
    /// constraint maps to `true`
    fn equalities(&self) -> ExprReplaceVisitor {
        let mut visitor = ExprReplaceVisitor::new();
        for c in &self.constraints {
            match c.as_ref() {
                Expr::Eq(l, r) if l.as_constant().is_some() => {
                    visitor.insert(Arc::clone(r), Arc::clone(l));
                }
                _ => visitor.insert(Arc::clone(c), Expr::bool(true)),
            }
        }
        visitor
    }

    pub fn simplify_expr(&self, e: &ExprRef) -> ExprRef {
        if e.as_constant().is_some() || self.constraints.is_empty() {
            return Arc::clone(e);
        }
        rewrite(e, &mut self.equalities())
    }

    /// Rewrite every constraint with `visitor`; returns whether any changed
    fn rewrite_constraints(&mut self, visitor: &mut dyn ExprVisitor) -> bool {
        let old = std::mem::take(&mut self.constraints);
        let mut changed = false;
        for c in old {
            let e = rewrite(&c, visitor);
            if e != c {
                self.add_constraint_internal(e);
                changed = true;
            } else {
                self.constraints.insert(c);
            }
        }
        changed
    }

    fn add_constraint_internal(&mut self, e: ExprRef) {
        match e.as_ref() {
            Expr::Constant { value, .. } => {
                assert!(*value != 0, "attempt to add invalid (false) constraint");
            }
            Expr::And(a, b) => {
                let (a, b) = (Arc::clone(a), Arc::clone(b));
                self.add_constraint_internal(a);
                self.add_constraint_internal(b);
            }
            Expr::Eq(l, r) if l.as_constant().is_some() => {
                let mut visitor = ExprReplaceVisitor::single(Arc::clone(r), Arc::clone(l));
                self.rewrite_constraints(&mut visitor);
                self.constraints.insert(e);
            }
            _ => {
                self.constraints.insert(e);
            }
        }
    }

    /// Add `e` to the path condition
    ///
    /// # Panics
    /// If `e` simplifies to `false` under the current constraints.
    pub fn add_constraint(&mut self, e: ExprRef) {
        let e = self.simplify_expr(&e);
        self.add_constraint_internal(e);
    }

    /// Use `e`, known to hold, to simplify the existing constraints without
    /// recording it
    pub fn simplify_for_valid_constraint(&mut self, e: &ExprRef) {
        let mut visitor = match e.as_ref() {
            Expr::Eq(l, r) if l.as_constant().is_some() => {
                ExprReplaceVisitor::single(Arc::clone(r), Arc::clone(l))
            }
            _ => ExprReplaceVisitor::single(Arc::clone(e), Expr::bool(true)),
        };
        self.rewrite_constraints(&mut visitor);
    }

    pub fn remove_constraint(&mut self, e: &ExprRef) -> bool {
        self.constraints.remove(e)
    }
}

impl<'a> IntoIterator for &'a ConstraintManager {
    type Item = &'a ExprRef;
    type IntoIter = std::collections::btree_set::Iter<'a, ExprRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.constraints.iter()
    }
}

impl fmt::Display for ConstraintManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.constraints {
            writeln!(f, "{}", c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::execution_state::domain::expr::Array;

    fn sym(i: u32) -> ExprRef {
        Expr::read(&Array::new("in", 4), i)
    }

    #[test]
    fn test_conjunction_is_split() {
        let mut cm = ConstraintManager::new();
        let a = Expr::ult(sym(0), sym(1));
        let b = Expr::ult(sym(1), sym(2));
        cm.add_constraint(Expr::and(Arc::clone(&a), Arc::clone(&b)));
        assert_eq!(cm.len(), 2);
        assert!(cm.contains(&a) && cm.contains(&b));
    }

    #[test]
    fn test_equality_rewrites_existing() {
        let mut cm = ConstraintManager::new();
        cm.add_constraint(Expr::ult(sym(0), sym(1)));
        cm.add_constraint(Expr::eq(Expr::constant(4, 8), sym(0)));
        let expected = Expr::ult(Expr::constant(4, 8), sym(1));
        assert!(cm.contains(&expected));
        assert_eq!(cm.len(), 2);
    }

    #[test]
    fn test_satisfied_constraint_is_dropped() {
        let mut cm = ConstraintManager::new();
        cm.add_constraint(Expr::ult(sym(0), Expr::constant(10, 8)));
        cm.add_constraint(Expr::eq(Expr::constant(3, 8), sym(0)));
        assert_eq!(cm.len(), 1);
    }

    #[test]
    fn test_simplify_expr_uses_constraints() {
        let mut cm = ConstraintManager::new();
        let c = Expr::ult(sym(0), sym(1));
        cm.add_constraint(Arc::clone(&c));
        assert!(cm.simplify_expr(&c).is_true());
        assert!(cm.simplify_expr(&Expr::not(c)).is_false());
    }

    #[test]
    fn test_simplify_for_valid_constraint() {
        let mut cm = ConstraintManager::new();
        cm.add_constraint(Expr::ult(sym(0), sym(1)));
        cm.simplify_for_valid_constraint(&Expr::eq(Expr::constant(5, 8), sym(1)));
        assert!(cm.contains(&Expr::ult(sym(0), Expr::constant(5, 8))));
        assert!(!cm.contains(&Expr::ult(sym(0), sym(1))));
        assert_eq!(cm.len(), 1);
    }

    #[test]
    fn test_remove_and_equality() {
        let c = Expr::ult(sym(0), sym(1));
        let mut a = ConstraintManager::new();
        a.add_constraint(Arc::clone(&c));
        let b = ConstraintManager::from_constraints([Arc::clone(&c)]);
        assert_eq!(a, b);
        assert!(a.remove_constraint(&c));
        assert!(a.empty());
        assert_ne!(a, b);
    }

    #[test]
    #[should_panic(expected = "invalid (false) constraint")]
    fn test_false_constraint_panics() {
        let mut cm = ConstraintManager::new();
        cm.add_constraint(Expr::eq(Expr::constant(1, 8), sym(0)));
        cm.add_constraint(Expr::eq(Expr::constant(2, 8), sym(0)));
    }
}
