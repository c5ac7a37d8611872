//! Predicate evaluation.
//!
//! A [`PredicateEvaluator`] walks a predicate once per candidate solver. Every
//! field it touches is intercepted through the [`ConstructionScope`], which
//! attaches the field to the constraint under construction and asks the
//! solver for an external variable. Operations on solver-aware operands
//! become [`Term`]s; everything else is evaluated natively.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use keepforge_core::ops::{apply_binary, apply_unary, in_domain};
use keepforge_core::{
    ConstraintId, Expr, ExtVarHandle, KeepForgeError, ObjectId, Op, Predicate, PrimitiveHandle,
    Result, SolverId, Term, TypeTag, Value, VarId,
};

use crate::engine::Engine;
use crate::options::ConstraintOptions;

/// Top-level result of evaluating a predicate for one solver.
#[derive(Debug, Clone, PartialEq)]
pub enum Compiled {
    /// A relation compiled into a (disabled) solver primitive.
    Primitive(PrimitiveHandle),
    /// The predicate folded to a boolean without touching the solver.
    Native(bool),
    /// The predicate is a plain expression, not a relation.
    Value(Value),
}

/// Result of the capability dry run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inspection {
    /// Types of every leaf field the predicate reads.
    pub types: BTreeSet<TypeTag>,
    pub finite_domain: bool,
}

/// Turns predicates into solver primitives.
pub trait PredicateEvaluator {
    /// Evaluates `predicate` for the scope's solver.
    fn evaluate(&self, scope: &mut ConstructionScope<'_>, predicate: &Predicate) -> Result<Compiled>;

    /// Reports what the predicate touches without intercepting anything.
    fn inspect(
        &self,
        engine: &Engine,
        predicate: &Predicate,
        ctx: &BTreeMap<String, Value>,
    ) -> Result<Inspection>;
}

/// The engine as seen by an evaluator while one constraint is built.
pub struct ConstructionScope<'a> {
    engine: &'a mut Engine,
    constraint: ConstraintId,
    solver: SolverId,
    options: Rc<ConstraintOptions>,
}

impl<'a> ConstructionScope<'a> {
    pub(crate) fn new(
        engine: &'a mut Engine,
        constraint: ConstraintId,
        solver: SolverId,
        options: Rc<ConstraintOptions>,
    ) -> Self {
        Self {
            engine,
            constraint,
            solver,
            options,
        }
    }

    pub fn solver_name(&self) -> String {
        self.engine.solver_name(self.solver)
    }

    pub fn supports_operation(&self, op: Op) -> bool {
        self.engine
            .solver(self.solver)
            .is_ok_and(|s| s.supports_operation(op))
    }

    pub fn alternative_operation_for(&self, op: Op) -> Option<Op> {
        self.engine
            .solver(self.solver)
            .ok()
            .and_then(|s| s.alternative_operation_for(op))
    }

    /// Looks up a name bound in the request context.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.options.ctx.get(name).cloned()
    }

    pub fn allow_unsolvable_operations(&self) -> bool {
        self.options.allow_unsolvable_operations
    }

    /// Intercepts `obj.name` and attaches it to the constraint.
    pub fn field(&mut self, obj: ObjectId, name: &str, parent: Option<VarId>) -> Result<VarId> {
        let var = self.engine.field_variable(obj, name, parent)?;
        self.attach(var)?;
        Ok(var)
    }

    /// Intercepts one part of a value-class variable.
    pub fn part(&mut self, parent: VarId, part: &str) -> Result<VarId> {
        let var = self.engine.part_variable(parent, part)?;
        self.attach(var)?;
        Ok(var)
    }

    fn attach(&mut self, var: VarId) -> Result<()> {
        let constraint = self.constraint;
        if let Some(v) = self.engine.variable_mut(var) {
            v.constraints.insert(constraint);
        }
        let c = self.engine.constraint_mut(constraint)?;
        if !c.variables.contains(&var) {
            c.variables.push(var);
        }
        self.engine.ensure_external(var, self.solver)?;
        Ok(())
    }

    /// Current value of a variable as the scope's solver sees it.
    pub fn read(&self, var: VarId) -> Value {
        self.engine.read_var(var)
    }

    /// The variable's handle in the scope's solver.
    pub fn external(&self, var: VarId) -> Option<ExtVarHandle> {
        self.engine.binding(var, self.solver)
    }

    /// Tells the solver it may read but never assign `var`.
    pub fn pin_readonly(&mut self, var: VarId) -> Result<()> {
        if let Some(ext) = self.external(var) {
            self.engine.solver_mut(self.solver)?.set_readonly(ext, true);
        }
        Ok(())
    }

    pub fn field_names(&self, obj: ObjectId) -> Result<Vec<String>> {
        self.engine.field_names(obj)
    }

    /// Compiles a relation term with the scope's solver.
    pub fn compile(&mut self, term: &Term) -> Result<PrimitiveHandle> {
        let name = self.solver_name();
        self.engine
            .solver_mut(self.solver)?
            .compile(term)
            .map_err(|e| KeepForgeError::construction(name, e))
    }
}

/// An evaluated sub-expression.
#[derive(Debug, Clone)]
struct Operand {
    /// Solver-side term, present for solver-aware operands.
    term: Option<Term>,
    /// Current native value.
    value: Value,
    /// Variable the operand was read from.
    var: Option<VarId>,
}

impl Operand {
    fn native(value: Value) -> Self {
        Self {
            term: None,
            value,
            var: None,
        }
    }

    fn symbolic(term: Term, value: Value) -> Self {
        Self {
            term: Some(term),
            value,
            var: None,
        }
    }

    fn into_term(self) -> Term {
        self.term.unwrap_or(Term::Const(self.value))
    }

    fn native_bool(&self) -> Option<bool> {
        match (&self.term, &self.value) {
            (None, Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }
}

/// Evaluator for [`Expr`] predicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprEvaluator;

impl ExprEvaluator {
    fn eval(&self, scope: &mut ConstructionScope<'_>, expr: &Expr) -> Result<Operand> {
        match expr {
            Expr::Const(value) => Ok(Operand::native(value.clone())),
            Expr::Name(name) => scope
                .lookup(name)
                .map(Operand::native)
                .ok_or_else(|| KeepForgeError::UnboundName(name.clone())),
            Expr::Member { base, name } => {
                let base = self.eval(scope, base)?;
                self.member(scope, base, name)
            }
            Expr::Readonly(inner) => {
                let operand = self.eval(scope, inner)?;
                match (&operand.value, operand.var) {
                    (Value::Object(obj), _) => {
                        let obj = *obj;
                        for field in scope.field_names(obj)? {
                            let var = scope.field(obj, &field, operand.var)?;
                            scope.pin_readonly(var)?;
                        }
                    }
                    (_, Some(var)) => scope.pin_readonly(var)?,
                    _ => {}
                }
                Ok(operand)
            }
            Expr::Unary(op, inner) => {
                let operand = self.eval(scope, inner)?;
                let value = apply_unary(*op, &operand.value);
                match operand.term {
                    Some(term) if scope.supports_operation(*op) => {
                        Ok(Operand::symbolic(Term::unary(*op, term), value))
                    }
                    Some(_) => unsolvable(scope, *op, value),
                    None => Ok(Operand::native(value)),
                }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(scope, left)?;
                let right = self.eval(scope, right)?;
                self.binary(scope, *op, left, right)
            }
            Expr::InDomain(inner, domain) => {
                let operand = self.eval(scope, inner)?;
                let value = in_domain(&operand.value, domain);
                match operand.term {
                    Some(term) if scope.supports_operation(Op::InDomain) => Ok(Operand::symbolic(
                        Term::InDomain(Box::new(term), domain.clone()),
                        value,
                    )),
                    Some(_) => unsolvable(scope, Op::InDomain, value),
                    None => Ok(Operand::native(value)),
                }
            }
        }
    }

    fn member(
        &self,
        scope: &mut ConstructionScope<'_>,
        base: Operand,
        name: &str,
    ) -> Result<Operand> {
        if let Value::Object(obj) = base.value {
            let var = scope.field(obj, name, base.var)?;
            return Ok(variable_operand(scope, var));
        }
        if let Some(parts) = base.value.as_decomposable() {
            return match base.var {
                Some(parent) => {
                    let var = scope.part(parent, name)?;
                    Ok(variable_operand(scope, var))
                }
                None => parts.part(name).map(|n| Operand::native(Value::Number(n))).ok_or_else(
                    || KeepForgeError::TypeMismatch(format!("{} has no part `{name}`", base.value)),
                ),
            };
        }
        Err(KeepForgeError::TypeMismatch(format!(
            "cannot read `{name}` from {}",
            base.value
        )))
    }

    fn binary(
        &self,
        scope: &mut ConstructionScope<'_>,
        op: Op,
        left: Operand,
        right: Operand,
    ) -> Result<Operand> {
        match op {
            Op::And => {
                for (this, other) in [(&left, &right), (&right, &left)] {
                    match this.native_bool() {
                        Some(false) => return Ok(Operand::native(Value::Bool(false))),
                        Some(true) => return Ok(other.clone()),
                        None => {}
                    }
                }
            }
            Op::Or => {
                for (this, other) in [(&left, &right), (&right, &left)] {
                    match this.native_bool() {
                        Some(true) => return Ok(Operand::native(Value::Bool(true))),
                        Some(false) => return Ok(other.clone()),
                        None => {}
                    }
                }
            }
            _ => {}
        }

        let value = apply_binary(op, &left.value, &right.value);
        if left.term.is_none() && right.term.is_none() {
            return Ok(Operand::native(value));
        }
        if !scope.supports_operation(op) {
            return unsolvable(scope, op, value);
        }
        let term = Term::binary(op, left.into_term(), right.into_term());
        Ok(Operand::symbolic(term, value))
    }

    fn inspect_expr(
        &self,
        engine: &Engine,
        ctx: &BTreeMap<String, Value>,
        expr: &Expr,
        leaf: bool,
        out: &mut Inspection,
    ) -> Result<Value> {
        let value = match expr {
            Expr::Const(value) => value.clone(),
            Expr::Name(name) => ctx
                .get(name)
                .cloned()
                .ok_or_else(|| KeepForgeError::UnboundName(name.clone()))?,
            Expr::Member { base, name } => {
                let base = self.inspect_expr(engine, ctx, base, false, out)?;
                let value = match &base {
                    Value::Object(obj) => engine.get(*obj, name)?,
                    other => other
                        .as_decomposable()
                        .and_then(|d| d.part(name))
                        .map(Value::Number)
                        .ok_or_else(|| {
                            KeepForgeError::TypeMismatch(format!("cannot read `{name}` from {other}"))
                        })?,
                };
                if leaf && !value.is_none() {
                    out.types.insert(value.type_tag());
                }
                value
            }
            Expr::Readonly(inner) => self.inspect_expr(engine, ctx, inner, leaf, out)?,
            Expr::Unary(op, inner) => {
                apply_unary(*op, &self.inspect_expr(engine, ctx, inner, true, out)?)
            }
            Expr::Binary(op, left, right) => {
                let left = self.inspect_expr(engine, ctx, left, true, out)?;
                let right = self.inspect_expr(engine, ctx, right, true, out)?;
                apply_binary(*op, &left, &right)
            }
            Expr::InDomain(inner, domain) => {
                out.finite_domain = true;
                in_domain(&self.inspect_expr(engine, ctx, inner, true, out)?, domain)
            }
        };
        Ok(value)
    }
}

impl PredicateEvaluator for ExprEvaluator {
    fn evaluate(&self, scope: &mut ConstructionScope<'_>, predicate: &Predicate) -> Result<Compiled> {
        let top = self.eval(scope, predicate.expr())?;
        match top.term {
            Some(term) if is_relation(&term) => Ok(Compiled::Primitive(scope.compile(&term)?)),
            Some(_) => Ok(Compiled::Value(top.value)),
            None => match top.value {
                Value::Bool(b) => Ok(Compiled::Native(b)),
                other => Ok(Compiled::Value(other)),
            },
        }
    }

    fn inspect(
        &self,
        engine: &Engine,
        predicate: &Predicate,
        ctx: &BTreeMap<String, Value>,
    ) -> Result<Inspection> {
        let mut out = Inspection::default();
        self.inspect_expr(engine, ctx, predicate.expr(), true, &mut out)?;
        Ok(out)
    }
}

fn variable_operand(scope: &ConstructionScope<'_>, var: VarId) -> Operand {
    Operand {
        term: scope.external(var).map(Term::Var),
        value: scope.read(var),
        var: Some(var),
    }
}

fn unsolvable(scope: &ConstructionScope<'_>, op: Op, folded: Value) -> Result<Operand> {
    if scope.allow_unsolvable_operations() {
        return Ok(Operand::native(folded));
    }
    Err(KeepForgeError::UnsolvableOperation {
        op,
        solver: scope.solver_name(),
        hint: scope.alternative_operation_for(op),
    })
}

fn is_relation(term: &Term) -> bool {
    match term {
        Term::Binary(op, ..) => op.is_relation() || op.is_logical(),
        Term::Unary(Op::Not, _) | Term::InDomain(..) => true,
        _ => false,
    }
}

#[cfg(test)]
#[path = "evaluator_tests.rs"]
mod tests;
