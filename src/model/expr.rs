// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Algebraic expressions used as constraint bodies.

use std::collections::BTreeSet;

use super::ids::VarId;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Var(VarId),
    Add(Vec<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Vec<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Pow(Box<Expr>, f64),
    Exp(Box<Expr>),
    Log(Box<Expr>),
    Sqrt(Box<Expr>),
}

impl Expr {
    pub fn constant(value: f64) -> Self {
        Self::Const(value)
    }

    pub fn var(id: VarId) -> Self {
        Self::Var(id)
    }

    pub fn add(terms: Vec<Expr>) -> Self {
        Self::Add(terms)
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Self::Sub(Box::new(lhs), Box::new(rhs))
    }

    pub fn mul(factors: Vec<Expr>) -> Self {
        Self::Mul(factors)
    }

    pub fn div(numerator: Expr, denominator: Expr) -> Self {
        Self::Div(Box::new(numerator), Box::new(denominator))
    }

    pub fn neg(inner: Expr) -> Self {
        Self::Neg(Box::new(inner))
    }

    pub fn pow(base: Expr, exponent: f64) -> Self {
        Self::Pow(Box::new(base), exponent)
    }

    pub fn exp(inner: Expr) -> Self {
        Self::Exp(Box::new(inner))
    }

    pub fn log(inner: Expr) -> Self {
        Self::Log(Box::new(inner))
    }

    pub fn sqrt(inner: Expr) -> Self {
        Self::Sqrt(Box::new(inner))
    }

    /// Evaluates the expression; `None` when a variable has no value or the result is not finite
    /// (division by zero, log of a non-positive number, overflow).
    pub fn eval(&self, value_of: &dyn Fn(VarId) -> Option<f64>) -> Option<f64> {
        let value = match self {
            Self::Const(value) => *value,
            Self::Var(id) => value_of(*id)?,
            Self::Add(terms) => {
                let mut sum = 0.0;
                for term in terms {
                    sum += term.eval(value_of)?;
                }
                sum
            }
            Self::Sub(lhs, rhs) => lhs.eval(value_of)? - rhs.eval(value_of)?,
            Self::Mul(factors) => {
                let mut product = 1.0;
                for factor in factors {
                    product *= factor.eval(value_of)?;
                }
                product
            }
            Self::Div(numerator, denominator) => {
                let denominator = denominator.eval(value_of)?;
                if denominator == 0.0 {
                    return None;
                }
                numerator.eval(value_of)? / denominator
            }
            Self::Neg(inner) => -inner.eval(value_of)?,
            Self::Pow(base, exponent) => base.eval(value_of)?.powf(*exponent),
            Self::Exp(inner) => inner.eval(value_of)?.exp(),
            Self::Log(inner) => {
                let inner = inner.eval(value_of)?;
                if inner <= 0.0 {
                    return None;
                }
                inner.ln()
            }
            Self::Sqrt(inner) => {
                let inner = inner.eval(value_of)?;
                if inner < 0.0 {
                    return None;
                }
                inner.sqrt()
            }
        };
        value.is_finite().then_some(value)
    }

    pub fn variables(&self) -> BTreeSet<VarId> {
        let mut vars = BTreeSet::new();
        self.visit(&mut |expr| {
            if let Self::Var(id) = expr {
                vars.insert(*id);
            }
        });
        vars
    }

    /// Pre-order walk over every node.
    pub fn visit(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Self::Const(_) | Self::Var(_) => {}
            Self::Add(children) | Self::Mul(children) => {
                for child in children {
                    child.visit(f);
                }
            }
            Self::Sub(lhs, rhs) | Self::Div(lhs, rhs) => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Self::Neg(inner)
            | Self::Pow(inner, _)
            | Self::Exp(inner)
            | Self::Log(inner)
            | Self::Sqrt(inner) => inner.visit(f),
        }
    }

    /// Signed additive terms of a sum node (`a - b` yields `a` and `b` with sign -1).
    pub fn additive_terms(&self) -> Option<Vec<(f64, &Expr)>> {
        match self {
            Self::Add(terms) => Some(terms.iter().map(|term| (1.0, term)).collect()),
            Self::Sub(lhs, rhs) => Some(vec![(1.0, lhs.as_ref()), (-1.0, rhs.as_ref())]),
            _ => None,
        }
    }
}
