//! Expression trees for the nonlinear parts of an optimization problem
//!
//! Variables are referenced by their index in the owning [`Problem`](crate::optimize::problem::Problem).
//! Expressions can be evaluated at a point, differentiated symbolically (solvers for nonlinear
//! programs need gradients), and reduced to a [`LinearExpr`] when they happen to be linear so
//! that linear solvers can consume them.
//!
//! The arithmetic operators fold constants as they build the tree, so `x * 1.0 + 0.0` stays `x`.
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// An expression tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant value
    Const(f64),
    /// The variable with this index
    Var(usize),
    /// A weighted sum of variables plus a constant
    Linear(LinearExpr),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Exp(Box<Expr>),
    Ln(Box<Expr>),
}

/// Σ coefficient·x\[index\] + constant
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinearExpr {
    pub terms: Vec<(usize, f64)>,
    pub constant: f64,
}

impl LinearExpr {
    pub fn new(terms: Vec<(usize, f64)>, constant: f64) -> Self {
        LinearExpr { terms, constant }
    }

    /// Add `coefficient` to the term for `variable`, creating it if needed
    pub fn add_term(&mut self, variable: usize, coefficient: f64) {
        match self.terms.iter_mut().find(|(v, _)| *v == variable) {
            Some((_, c)) => *c += coefficient,
            None => self.terms.push((variable, coefficient)),
        }
    }

    /// Merge duplicate variables and drop zero coefficients
    pub fn compact(mut self) -> Self {
        let mut merged = LinearExpr::new(Vec::with_capacity(self.terms.len()), self.constant);
        for (v, c) in self.terms.drain(..) {
            merged.add_term(v, c);
        }
        merged.terms.retain(|(_, c)| *c != 0.);
        merged
    }

    fn scaled(mut self, factor: f64) -> Self {
        self.terms.iter_mut().for_each(|(_, c)| *c *= factor);
        self.constant *= factor;
        self
    }

    fn plus(mut self, other: LinearExpr) -> Self {
        for (v, c) in other.terms {
            self.add_term(v, c);
        }
        self.constant += other.constant;
        self
    }

    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(v, c)| c * value_of(values, *v))
            .sum::<f64>()
            + self.constant
    }
}

fn value_of(values: &[f64], index: usize) -> f64 {
    values.get(index).copied().unwrap_or(f64::NAN)
}

impl Expr {
    /// Σ terms
    pub fn sum<I: IntoIterator<Item = Expr>>(terms: I) -> Expr {
        terms.into_iter().fold(Expr::Const(0.), |acc, t| acc + t)
    }

    pub fn exp(self) -> Expr {
        match self {
            Expr::Const(c) => Expr::Const(c.exp()),
            other => Expr::Exp(Box::new(other)),
        }
    }

    pub fn ln(self) -> Expr {
        match self {
            Expr::Const(c) => Expr::Const(c.ln()),
            other => Expr::Ln(Box::new(other)),
        }
    }

    /// Evaluate the expression with `values[i]` substituted for variable `i`
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        match self {
            Expr::Const(c) => *c,
            Expr::Var(i) => value_of(values, *i),
            Expr::Linear(linear) => linear.evaluate(values),
            Expr::Add(l, r) => l.evaluate(values) + r.evaluate(values),
            Expr::Sub(l, r) => l.evaluate(values) - r.evaluate(values),
            Expr::Mul(l, r) => l.evaluate(values) * r.evaluate(values),
            Expr::Div(l, r) => l.evaluate(values) / r.evaluate(values),
            Expr::Neg(e) => -e.evaluate(values),
            Expr::Exp(e) => e.evaluate(values).exp(),
            Expr::Ln(e) => e.evaluate(values).ln(),
        }
    }

    /// Indices of every variable the expression depends on
    pub fn variables(&self) -> BTreeSet<usize> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, vars: &mut BTreeSet<usize>) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(i) => {
                vars.insert(*i);
            }
            Expr::Linear(linear) => vars.extend(linear.terms.iter().map(|(v, _)| *v)),
            Expr::Add(l, r) | Expr::Sub(l, r) | Expr::Mul(l, r) | Expr::Div(l, r) => {
                l.collect_variables(vars);
                r.collect_variables(vars);
            }
            Expr::Neg(e) | Expr::Exp(e) | Expr::Ln(e) => e.collect_variables(vars),
        }
    }

    /// The expression as a weighted sum, or None if it is nonlinear
    pub fn linear_form(&self) -> Option<LinearExpr> {
        let form = match self {
            Expr::Const(c) => Some(LinearExpr::new(vec![], *c)),
            Expr::Var(i) => Some(LinearExpr::new(vec![(*i, 1.)], 0.)),
            Expr::Linear(linear) => Some(linear.clone()),
            Expr::Add(l, r) => Some(l.linear_form()?.plus(r.linear_form()?)),
            Expr::Sub(l, r) => Some(l.linear_form()?.plus(r.linear_form()?.scaled(-1.))),
            Expr::Neg(e) => Some(e.linear_form()?.scaled(-1.)),
            Expr::Mul(l, r) => match (l.constant_value(), r.constant_value()) {
                (Some(c), _) => Some(r.linear_form()?.scaled(c)),
                (_, Some(c)) => Some(l.linear_form()?.scaled(c)),
                _ => None,
            },
            Expr::Div(l, r) => match r.constant_value() {
                Some(c) if c != 0. => Some(l.linear_form()?.scaled(1. / c)),
                _ => None,
            },
            Expr::Exp(_) | Expr::Ln(_) => self.constant_value().map(|c| LinearExpr::new(vec![], c)),
        };
        form.map(LinearExpr::compact)
    }

    pub fn is_linear(&self) -> bool {
        self.linear_form().is_some()
    }

    /// The value of the expression if it doesn't depend on any variable
    pub fn constant_value(&self) -> Option<f64> {
        if self.variables().is_empty() {
            Some(self.evaluate(&[]))
        } else {
            None
        }
    }

    /// Symbolic partial derivative with respect to variable `with_respect_to`
    pub fn derivative(&self, with_respect_to: usize) -> Expr {
        match self {
            Expr::Const(_) => Expr::Const(0.),
            Expr::Var(i) => Expr::Const(if *i == with_respect_to { 1. } else { 0. }),
            Expr::Linear(linear) => Expr::Const(
                linear
                    .terms
                    .iter()
                    .filter(|(v, _)| *v == with_respect_to)
                    .map(|(_, c)| c)
                    .sum(),
            ),
            Expr::Add(l, r) => l.derivative(with_respect_to) + r.derivative(with_respect_to),
            Expr::Sub(l, r) => l.derivative(with_respect_to) - r.derivative(with_respect_to),
            // d(fg) = f dg + g df
            Expr::Mul(l, r) => {
                (**l).clone() * r.derivative(with_respect_to)
                    + (**r).clone() * l.derivative(with_respect_to)
            }
            // d(f/g) = (g df - f dg) / g^2
            Expr::Div(l, r) => {
                ((**r).clone() * l.derivative(with_respect_to)
                    - (**l).clone() * r.derivative(with_respect_to))
                    / ((**r).clone() * (**r).clone())
            }
            Expr::Neg(e) => -e.derivative(with_respect_to),
            Expr::Exp(e) => self.clone() * e.derivative(with_respect_to),
            Expr::Ln(e) => e.derivative(with_respect_to) / (**e).clone(),
        }
    }
}

impl From<LinearExpr> for Expr {
    fn from(linear: LinearExpr) -> Self {
        if linear.terms.is_empty() {
            Expr::Const(linear.constant)
        } else {
            Expr::Linear(linear)
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

// region Operators
impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        match (self, rhs) {
            (Expr::Const(a), Expr::Const(b)) => Expr::Const(a + b),
            (Expr::Const(z), e) | (e, Expr::Const(z)) if z == 0. => e,
            (l, r) => Expr::Add(Box::new(l), Box::new(r)),
        }
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        match (self, rhs) {
            (Expr::Const(a), Expr::Const(b)) => Expr::Const(a - b),
            (e, Expr::Const(z)) if z == 0. => e,
            (Expr::Const(z), e) if z == 0. => -e,
            (l, r) => Expr::Sub(Box::new(l), Box::new(r)),
        }
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        match (self, rhs) {
            (Expr::Const(a), Expr::Const(b)) => Expr::Const(a * b),
            (Expr::Const(z), _) | (_, Expr::Const(z)) if z == 0. => Expr::Const(0.),
            (Expr::Const(o), e) | (e, Expr::Const(o)) if o == 1. => e,
            (l, r) => Expr::Mul(Box::new(l), Box::new(r)),
        }
    }
}

impl Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        match (self, rhs) {
            (Expr::Const(a), Expr::Const(b)) => Expr::Const(a / b),
            (e, Expr::Const(o)) if o == 1. => e,
            (l, r) => Expr::Div(Box::new(l), Box::new(r)),
        }
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        match self {
            Expr::Const(c) => Expr::Const(-c),
            Expr::Neg(e) => *e,
            e => Expr::Neg(Box::new(e)),
        }
    }
}
// endregion Operators

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{c}"),
            Expr::Var(i) => write!(f, "x[{i}]"),
            Expr::Linear(linear) => {
                write!(f, "(")?;
                for (n, (v, c)) in linear.terms.iter().enumerate() {
                    if n > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{c}*x[{v}]")?;
                }
                if linear.constant != 0. || linear.terms.is_empty() {
                    if !linear.terms.is_empty() {
                        write!(f, " + ")?;
                    }
                    write!(f, "{}", linear.constant)?;
                }
                write!(f, ")")
            }
            Expr::Add(l, r) => write!(f, "({l} + {r})"),
            Expr::Sub(l, r) => write!(f, "({l} - {r})"),
            Expr::Mul(l, r) => write!(f, "({l} * {r})"),
            Expr::Div(l, r) => write!(f, "({l} / {r})"),
            Expr::Neg(e) => write!(f, "-({e})"),
            Expr::Exp(e) => write!(f, "exp({e})"),
            Expr::Ln(e) => write!(f, "ln({e})"),
        }
    }
}
