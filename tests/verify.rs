//! End-to-end checks of the public API: well-known rewrites flow through
//! constraint gathering, enumeration, translation, and the three-query
//! check against a scripted solver backend.

use peepcheck::constraints::{TypeConstraints, TypeVisitor, WidthLo};
use peepcheck::ir::{BinaryOp, Flags, IntCC, PredOp, TermPool};
use peepcheck::smt::{Backend, Expr, SatResult, Solver, Sort, Value};
use peepcheck::{check_refinement, Settings, TypeError};

/// A backend whose solvers answer from a fixed script, defaulting to
/// `Unsat` when the script runs out.
struct ScriptBackend {
    plan: Vec<SatResult>,
    queries: usize,
}

impl ScriptBackend {
    fn new(plan: &[SatResult]) -> Self {
        Self {
            plan: plan.to_vec(),
            queries: 0,
        }
    }

    fn unsat() -> Self {
        Self::new(&[])
    }
}

struct ScriptSolver {
    result: SatResult,
}

impl Solver for ScriptSolver {
    fn add(&mut self, _expr: &Expr) {}

    fn check(&mut self) -> SatResult {
        self.result
    }

    fn eval(&self, expr: &Expr) -> Option<Value> {
        Some(match expr.sort() {
            Sort::Bv(w) => Value::Bv { width: w, bits: 0 },
            Sort::Fp { .. } => Value::Fp(0.0),
            Sort::Bool => Value::Bool(false),
        })
    }
}

impl Backend for ScriptBackend {
    type Solver = ScriptSolver;

    fn solver(&mut self) -> ScriptSolver {
        let result = self
            .plan
            .get(self.queries)
            .copied()
            .unwrap_or(SatResult::Unsat);
        self.queries += 1;
        ScriptSolver { result }
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn ult_zero_is_always_false() {
    init_logging();
    // icmp ult %x, 0  ==>  0
    let mut pool = TermPool::new();
    let x = pool.input("%x");
    let zero = pool.literal(0);
    let src = pool.icmp(IntCC::UnsignedLessThan, x, zero);
    let tgt = pool.literal(0);

    let mut backend = ScriptBackend::unsat();
    let settings = Settings {
        int_limit: 5,
        ..Settings::default()
    };
    let outcome = check_refinement(&mut backend, &pool, src, tgt, None, &settings).unwrap();
    assert!(outcome.is_none(), "refinement holds");
    // %x ranges over widths 4, 1, 2, 3; three queries per vector.
    assert_eq!(backend.queries, 12);
}

#[test]
fn ashr_shl_collapses_under_slt_precondition() {
    init_logging();
    // Pre: C1 <s C2
    // %op0 = ashr exact %x, C1
    // %r = shl %op0, C2        ==>  %r = shl %x, C2 - C1
    let mut pool = TermPool::new();
    let x = pool.input("%x");
    let c1 = pool.input("C1");
    let c2 = pool.input("C2");
    let op0 = pool.binary(BinaryOp::Ashr, Flags::new().with_exact(), x, c1);
    let src = pool.binary(BinaryOp::Shl, Flags::new(), op0, c2);
    let delta = pool.binary_cnxp(BinaryOp::Sub, c2, c1);
    let tgt = pool.binary(BinaryOp::Shl, Flags::new(), x, delta);
    let pre = pool.comparison(IntCC::SignedLessThan, c1, c2);

    let mut backend = ScriptBackend::unsat();
    let settings = Settings {
        int_limit: 5,
        ..Settings::default()
    };
    let outcome = check_refinement(&mut backend, &pool, src, tgt, Some(pre), &settings).unwrap();
    assert!(outcome.is_none(), "refinement holds at every width");
    assert_eq!(backend.queries, 12);
}

#[test]
fn xor_add_folds_under_int_min_precondition() {
    // Pre: IntMin(C1)
    // %r = add (xor %x, C1), C2  ==>  %r = add %x, (xor C1, C2)
    let mut pool = TermPool::new();
    let x = pool.input("%x");
    let c1 = pool.input("C1");
    let c2 = pool.input("C2");
    let xor = pool.binary(BinaryOp::Xor, Flags::new(), x, c1);
    let src = pool.binary(BinaryOp::Add, Flags::new(), xor, c2);
    let folded = pool.binary_cnxp(BinaryOp::Xor, c1, c2);
    let tgt = pool.binary(BinaryOp::Add, Flags::new(), x, folded);
    let pre = pool.fun_pred(PredOp::IntMin, &[c1]);

    let mut backend = ScriptBackend::unsat();
    let settings = Settings {
        int_limit: 4,
        ..Settings::default()
    };
    let outcome = check_refinement(&mut backend, &pool, src, tgt, Some(pre), &settings).unwrap();
    assert!(outcome.is_none());
    assert_eq!(backend.queries, 9);
}

#[test]
fn counterexamples_stop_the_enumeration() {
    let mut pool = TermPool::new();
    let x = pool.input("%x");
    let y = pool.input("%y");
    let src = pool.binary(BinaryOp::Add, Flags::new(), x, y);
    let tgt = pool.binary(BinaryOp::Sub, Flags::new(), x, y);

    // Verified at the first two vectors, refuted at the third.
    let mut backend = ScriptBackend::new(&[
        SatResult::Unsat,
        SatResult::Unsat,
        SatResult::Unsat,
        SatResult::Unsat,
        SatResult::Unsat,
        SatResult::Unsat,
        SatResult::Unsat,
        SatResult::Unsat,
        SatResult::Sat,
    ]);
    let settings = Settings::default();
    let err = check_refinement(&mut backend, &pool, src, tgt, None, &settings)
        .unwrap()
        .expect("counterexample");
    assert_eq!(err.cause, peepcheck::Cause::Unequal);
    // The failing vector ends the run.
    assert_eq!(backend.queries, 9);
    let report = err.to_string();
    assert!(report.contains("%x ="));
    assert!(report.contains("%y ="));
    assert!(report.contains("source: "));
}

#[test]
fn model_extension_reuses_type_variables() {
    let mut pool = TermPool::new();
    let x = pool.input("%x");
    let y = pool.input("%y");
    let add = pool.binary(BinaryOp::Add, Flags::new(), x, y);
    let mut tc = TypeConstraints::new(&pool);
    tc.collect(add).unwrap();
    let mut model = tc.finalize().unwrap();

    let mul = pool.binary(BinaryOp::Mul, Flags::new(), x, y);
    model.extend(&pool, mul).unwrap();
    assert_eq!(model.tyvar_of(mul), model.tyvar_of(add));
    assert!(model.tyvar_of(mul).is_some());
}

#[test]
fn cyclic_width_ordering_is_rejected() {
    let mut pool = TermPool::new();
    let a = pool.input("%a");
    let b = pool.input("%b");
    let mut tc = TypeConstraints::new(&pool);
    tc.width_order(WidthLo::Term(a), b).unwrap();
    tc.width_order(WidthLo::Term(b), a).unwrap();
    let err = tc.finalize().unwrap_err();
    assert!(matches!(err, TypeError::CircularOrdering { .. }));
    assert!(err.to_string().contains("circular ordering"));
}

#[test]
fn incompatible_constraints_fail_at_the_second_call() {
    let mut pool = TermPool::new();
    let t = pool.input("%t");
    let mut tc = TypeConstraints::new(&pool);
    tc.float(t).unwrap();
    let err = tc.pointer(t).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Incompatible constraints for %t: pointer and floating-point"
    );
}

#[test]
fn validator_agrees_with_the_enumerator() {
    let mut pool = TermPool::new();
    let x = pool.input("%x");
    let c = pool.input("C1");
    let shifted = pool.binary(BinaryOp::Shl, Flags::new().with_nuw(), x, c);
    let mut tc = TypeConstraints::new(&pool);
    tc.collect(shifted).unwrap();
    let model = tc.finalize().unwrap();
    let mut count = 0;
    for vector in model.type_vectors(6) {
        model.validate(&pool, shifted, &vector).unwrap();
        count += 1;
    }
    assert_eq!(count, 5);
}
