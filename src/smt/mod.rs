//! Solver-facing half of the checker: the expression language, the
//! backend contract, and the IR-to-expression translator.

pub mod ast;
pub mod solver;
pub mod translate;

pub use self::ast::{BinOp, Expr, ExprKind, Sort};
pub use self::solver::{Backend, SatResult, Solver, Value};
pub use self::translate::{ty_sort, Translation, Translator};
