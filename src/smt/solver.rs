//! The solver contract consumed by the refinement checker.
//!
//! The checker is generic over a [`Backend`] that can mint one throwaway
//! [`Solver`] per query. A backend is typically a thin binding over an SMT
//! library or process; none is bundled here. After a `Sat` answer the
//! solver must be able to evaluate expressions in its model, completing
//! unconstrained symbols to arbitrary values, so counterexample reports can
//! print every input.

use crate::smt::ast::Expr;
use core::fmt;

/// Outcome of a satisfiability check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SatResult {
    /// The assertions are satisfiable.
    Sat,
    /// The assertions are unsatisfiable.
    Unsat,
    /// The solver gave up.
    Unknown,
}

/// A concrete value read back from a solver model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    /// A bit-vector value.
    Bv {
        /// Width in bits.
        width: u32,
        /// The bits, zero-extended to 64.
        bits: u64,
    },
    /// A floating-point value, widened to double.
    Fp(f64),
    /// A propositional value.
    Bool(bool),
}

impl Value {
    /// The unsigned reading of a bit-vector value.
    pub fn unsigned(&self) -> Option<u64> {
        match *self {
            Value::Bv { bits, .. } => Some(bits),
            _ => None,
        }
    }

    /// The signed reading of a bit-vector value.
    pub fn signed(&self) -> Option<i64> {
        match *self {
            Value::Bv { width, bits } => {
                let shift = 64 - width.min(64);
                Some(((bits << shift) as i64) >> shift)
            }
            _ => None,
        }
    }
}

/// Bit-vector values print as hex with their decimal reading, adding the
/// signed reading when it differs; floats and booleans print plainly.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Value::Bv { width, bits } => {
                let digits = ((width + 3) / 4) as usize;
                let signed = self.signed().unwrap();
                if signed < 0 {
                    write!(f, "0x{bits:0digits$X} ({bits}, {signed})")
                } else {
                    write!(f, "0x{bits:0digits$X} ({bits})")
                }
            }
            Value::Fp(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// One satisfiability query in flight.
pub trait Solver {
    /// Assert an expression.
    fn add(&mut self, expr: &Expr);

    /// Decide the asserted conjunction.
    fn check(&mut self) -> SatResult;

    /// Evaluate `expr` in the current model. Only meaningful after
    /// [`check`] returned [`SatResult::Sat`]; implementations should
    /// model-complete rather than return `None` for unconstrained symbols.
    ///
    /// [`check`]: Solver::check
    fn eval(&self, expr: &Expr) -> Option<Value>;
}

/// A factory for solvers, one per query.
pub trait Backend {
    /// The solver type this backend mints.
    type Solver: Solver;

    /// Create a fresh solver with no assertions.
    fn solver(&mut self) -> Self::Solver;
}
