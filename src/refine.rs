//! Refinement checking.
//!
//! A rewrite is correct when the target *refines* the source: wherever the
//! source is defined, the target is defined too, and wherever the source is
//! additionally non-poison, the target agrees with it. Each enumerated
//! type vector gets three solver queries, each asserting the negation of
//! one obligation; a satisfying model is a counterexample and stops the
//! enumeration. Queries run in a fixed order, so the reported cause is the
//! strongest violation: undefined behavior before poison before a plain
//! value mismatch.
//!
//! The `undef` variables of the source are universally quantified in every
//! query; the target's are left free, so the counterexample search may
//! pick them.

use crate::constraints::{TypeConstraints, TypeVisitor};
use crate::ir::{Term, TermData, TermPool, Type};
use crate::model::{TypeModel, TypeVector};
use crate::result::Error;
use crate::settings::Settings;
use crate::smt::ast::Expr;
use crate::smt::solver::{Backend, SatResult, Solver, Value};
use crate::smt::translate::Translator;
use core::fmt;
use log::{debug, trace};

/// Why a rewrite failed to verify.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cause {
    /// The target can be undefined where the source is defined.
    UndefinedBehavior,
    /// The target can be poison where the source is poison-free.
    Poison,
    /// The values can disagree.
    Unequal,
}

impl Cause {
    fn describe(self) -> &'static str {
        match self {
            Cause::UndefinedBehavior => "Target introduces undefined behavior",
            Cause::Poison => "Target introduces poison",
            Cause::Unequal => "Mismatch in values",
        }
    }
}

/// A refinement counterexample: one type vector and one assignment of the
/// inputs under which the target fails to refine the source.
///
/// This is an ordinary value, not an error; the first one found stops
/// further enumeration.
#[derive(Clone, Debug)]
pub struct RefinementError {
    /// Which obligation failed.
    pub cause: Cause,
    /// The type vector the failure was found under.
    pub types: TypeVector,
    /// Printable name of the source root.
    pub src: String,
    /// Concrete type of the source root.
    pub src_type: Type,
    /// Value of the source under the model.
    pub srcv: Value,
    /// Value of the target under the model; absent unless the cause is a
    /// value mismatch.
    pub tgtv: Option<Value>,
    /// Name, type, and value of every input of the source.
    pub inputs: Vec<(String, Type, Value)>,
}

impl fmt::Display for RefinementError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "ERROR: {} for {} {}",
            self.cause.describe(),
            self.src_type,
            self.src
        )?;
        for (name, ty, value) in &self.inputs {
            writeln!(f, "{name} = {ty} {value}")?;
        }
        writeln!(f)?;
        writeln!(f, "source: {}", self.srcv)?;
        match (self.cause, &self.tgtv) {
            (Cause::UndefinedBehavior, _) => write!(f, "target: undefined"),
            (Cause::Poison, _) => write!(f, "target: poison"),
            (Cause::Unequal, Some(v)) => write!(f, "target: {v}"),
            (Cause::Unequal, None) => write!(f, "target: ?"),
        }
    }
}

/// Run one query: assert the conjunction of `asserts` (universally
/// quantified over `qvars` when any exist) on a fresh solver. `Sat` hands
/// the solver back for counterexample extraction.
fn query<B: Backend>(
    backend: &mut B,
    qvars: &[Expr],
    asserts: Vec<Expr>,
    name: &'static str,
) -> Result<Option<B::Solver>, Error> {
    let goal = Expr::and(asserts);
    let goal = if qvars.is_empty() {
        goal
    } else {
        Expr::forall(qvars.to_vec(), goal)
    };
    let mut solver = backend.solver();
    solver.add(&goal);
    trace!("{name} query");
    match solver.check() {
        SatResult::Unsat => Ok(None),
        SatResult::Sat => Ok(Some(solver)),
        SatResult::Unknown => Err(Error::SolverUnknown { query: name }),
    }
}

#[allow(clippy::too_many_arguments)]
fn report<S: Solver>(
    cause: Cause,
    solver: &S,
    smt: &mut Translator,
    pool: &TermPool,
    model: &TypeModel,
    vector: &TypeVector,
    src: Term,
    srcv: &Expr,
    tgtv: Option<&Expr>,
) -> RefinementError {
    let mut inputs = Vec::new();
    for t in pool.subterms(src) {
        if let TermData::Input { name } = &pool[t] {
            let expr = smt.eval(t);
            let value = solver.eval(&expr).expect("model evaluates source inputs");
            inputs.push((name.clone(), model.type_of(vector, t), value));
        }
    }
    RefinementError {
        cause,
        types: vector.clone(),
        src: pool.display(src).to_string(),
        src_type: model.type_of(vector, src),
        srcv: solver.eval(srcv).expect("model evaluates the source root"),
        tgtv: tgtv.map(|e| solver.eval(e).expect("model evaluates the target root")),
        inputs,
    }
}

/// Check refinement under one concrete type vector. Returns the first
/// counterexample found, `None` when all three queries are unsatisfiable.
#[allow(clippy::too_many_arguments)]
pub fn check_refinement_at<B: Backend>(
    backend: &mut B,
    pool: &TermPool,
    model: &TypeModel,
    vector: &TypeVector,
    src: Term,
    tgt: Term,
    pre: Option<Term>,
    settings: &Settings,
) -> Result<Option<RefinementError>, Error> {
    let mut smt = Translator::new(pool, model, vector);
    let s = smt.call(src);
    let t = smt.call(tgt);

    let mut sd = s.defs;
    let sp = s.nops;
    let qvars = s.qvars;
    if let Some(p) = pre {
        let pt = smt.call(p);
        sd.push(pt.value);
        sd.extend(pt.defs);
    }
    let td = Expr::and(t.defs);
    let tp = Expr::and(t.nops);

    let mut asserts = sd.clone();
    if settings.poison_undef {
        asserts.extend(sp.iter().cloned());
    }
    asserts.push(td.not_());
    if let Some(solver) = query(backend, &qvars, asserts, "undefined-behavior")? {
        return Ok(Some(report(
            Cause::UndefinedBehavior,
            &solver,
            &mut smt,
            pool,
            model,
            vector,
            src,
            &s.value,
            None,
        )));
    }

    let mut asserts = sd.clone();
    asserts.extend(sp.iter().cloned());
    asserts.push(tp.not_());
    if let Some(solver) = query(backend, &qvars, asserts, "poison")? {
        return Ok(Some(report(
            Cause::Poison,
            &solver,
            &mut smt,
            pool,
            model,
            vector,
            src,
            &s.value,
            None,
        )));
    }

    let mut asserts = sd;
    asserts.extend(sp.iter().cloned());
    asserts.push(s.value.clone().ne(t.value.clone()));
    if model.type_of(vector, src).is_float() {
        // Both sides evaluating to NaN counts as agreement.
        asserts.push(Expr::and(vec![s.value.clone().is_nan(), t.value.clone().is_nan()]).not_());
    }
    if let Some(solver) = query(backend, &qvars, asserts, "equality")? {
        return Ok(Some(report(
            Cause::Unequal,
            &solver,
            &mut smt,
            pool,
            model,
            vector,
            src,
            &s.value,
            Some(&t.value),
        )));
    }

    Ok(None)
}

/// Decide whether `tgt` refines `src` under the optional precondition
/// `pre`, across every type vector their constraints admit.
///
/// `Ok(None)` means verified. `Ok(Some(_))` is a counterexample from the
/// first failing vector; later vectors are not tried. `Err(_)` means the
/// rewrite could not be judged at all: it does not type-check, or the
/// solver gave up.
pub fn check_refinement<B: Backend>(
    backend: &mut B,
    pool: &TermPool,
    src: Term,
    tgt: Term,
    pre: Option<Term>,
    settings: &Settings,
) -> Result<Option<RefinementError>, Error> {
    let mut tc = TypeConstraints::new(pool);
    tc.collect(src)?;
    tc.collect(tgt)?;
    tc.eq_types(&[src, tgt])?;
    if let Some(p) = pre {
        tc.collect(p)?;
    }
    let model = tc.finalize()?;

    for vector in model.type_vectors(settings.int_limit) {
        debug!("checking type vector {:?}", vector.types());
        if let Some(err) =
            check_refinement_at(backend, pool, &model, &vector, src, tgt, pre, settings)?
        {
            return Ok(Some(err));
        }
    }
    Ok(None)
}

/// Translate `term` under the first type vector of its own model; a
/// convenience for drivers that want an expression without a refinement
/// question attached.
pub fn interp(pool: &TermPool, term: Term, settings: &Settings) -> Result<Expr, Error> {
    let mut tc = TypeConstraints::new(pool);
    tc.collect(term)?;
    let model = tc.finalize()?;
    let Some(vector) = model.type_vectors(settings.int_limit).next() else {
        return Err(Error::NoTyping {
            term: pool.display(term).to_string(),
        });
    };
    let mut smt = Translator::new(pool, &model, &vector);
    Ok(smt.call(term).value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, Flags, IntCC, PredOp};
    use crate::smt::ast::{ExprKind, Sort};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// A backend that replays a fixed script of answers and records every
    /// asserted goal.
    struct ScriptBackend {
        plan: VecDeque<SatResult>,
        goals: Rc<RefCell<Vec<Expr>>>,
        queries: usize,
    }

    impl ScriptBackend {
        fn new(plan: &[SatResult]) -> Self {
            Self {
                plan: plan.iter().copied().collect(),
                goals: Rc::new(RefCell::new(Vec::new())),
                queries: 0,
            }
        }

        /// Answer every query with `result`, forever.
        fn always(result: SatResult) -> Self {
            let mut b = Self::new(&[]);
            b.plan = core::iter::repeat(result).take(4096).collect();
            b
        }
    }

    struct ScriptSolver {
        result: SatResult,
        goals: Rc<RefCell<Vec<Expr>>>,
    }

    impl Solver for ScriptSolver {
        fn add(&mut self, expr: &Expr) {
            self.goals.borrow_mut().push(expr.clone());
        }

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
            self.queries += 1;
            ScriptSolver {
                result: self.plan.pop_front().unwrap_or(SatResult::Unsat),
                goals: Rc::clone(&self.goals),
            }
        }
    }

    /// `icmp ult %x, 0` rewritten to the literal 0.
    fn tautology(pool: &mut TermPool) -> (Term, Term) {
        let x = pool.input("%x");
        let zero = pool.literal(0);
        let src = pool.icmp(IntCC::UnsignedLessThan, x, zero);
        let tgt = pool.literal(0);
        (src, tgt)
    }

    #[test]
    fn verified_when_every_query_is_unsat() {
        let mut pool = TermPool::new();
        let (src, tgt) = tautology(&mut pool);
        let mut backend = ScriptBackend::always(SatResult::Unsat);
        let settings = Settings {
            int_limit: 4,
            ..Settings::default()
        };
        let r = check_refinement(&mut backend, &pool, src, tgt, None, &settings).unwrap();
        assert!(r.is_none());
        // Widths 1..3 for %x, three queries each.
        assert_eq!(backend.queries, 9);
    }

    #[test]
    fn first_sat_is_reported_as_undefined_behavior() {
        let mut pool = TermPool::new();
        let (src, tgt) = tautology(&mut pool);
        let mut backend = ScriptBackend::new(&[SatResult::Sat]);
        let settings = Settings {
            int_limit: 4,
            ..Settings::default()
        };
        let err = check_refinement(&mut backend, &pool, src, tgt, None, &settings)
            .unwrap()
            .expect("counterexample");
        assert_eq!(err.cause, Cause::UndefinedBehavior);
        assert_eq!(backend.queries, 1);
        assert_eq!(err.src_type, Type::Int(1));
        let text = err.to_string();
        assert!(text.starts_with("ERROR: Target introduces undefined behavior for i1"));
        assert!(text.contains("%x = i1 0x0 (0)"));
        assert!(text.ends_with("target: undefined"));
    }

    #[test]
    fn later_sats_map_to_poison_and_mismatch() {
        let mut pool = TermPool::new();
        let (src, tgt) = tautology(&mut pool);
        let settings = Settings {
            int_limit: 4,
            ..Settings::default()
        };

        let mut backend = ScriptBackend::new(&[SatResult::Unsat, SatResult::Sat]);
        let err = check_refinement(&mut backend, &pool, src, tgt, None, &settings)
            .unwrap()
            .unwrap();
        assert_eq!(err.cause, Cause::Poison);
        assert!(err.tgtv.is_none());
        assert!(err.to_string().ends_with("target: poison"));

        let mut backend =
            ScriptBackend::new(&[SatResult::Unsat, SatResult::Unsat, SatResult::Sat]);
        let err = check_refinement(&mut backend, &pool, src, tgt, None, &settings)
            .unwrap()
            .unwrap();
        assert_eq!(err.cause, Cause::Unequal);
        assert!(err.tgtv.is_some());
        assert!(err.to_string().contains("target: 0x0 (0)"));
    }

    #[test]
    fn unknown_is_not_a_verification() {
        let mut pool = TermPool::new();
        let (src, tgt) = tautology(&mut pool);
        let mut backend = ScriptBackend::new(&[SatResult::Unknown]);
        let settings = Settings::default();
        let err = check_refinement(&mut backend, &pool, src, tgt, None, &settings).unwrap_err();
        assert_eq!(
            err,
            Error::SolverUnknown {
                query: "undefined-behavior"
            }
        );
    }

    #[test]
    fn poison_undef_controls_the_first_query() {
        let mut pool = TermPool::new();
        let x = pool.input("%x");
        let y = pool.input("%y");
        let src = pool.binary(BinaryOp::Add, Flags::new().with_nsw(), x, y);
        let tgt = pool.binary(BinaryOp::Add, Flags::new(), x, y);
        let settings = Settings {
            int_limit: 2,
            poison_undef: true,
        };
        let mut backend = ScriptBackend::always(SatResult::Unsat);
        check_refinement(&mut backend, &pool, src, tgt, None, &settings).unwrap();
        let with = match backend.goals.borrow()[0].kind() {
            ExprKind::And(args) => args.len(),
            k => panic!("unexpected goal {k:?}"),
        };

        let settings = Settings {
            int_limit: 2,
            poison_undef: false,
        };
        let mut backend = ScriptBackend::always(SatResult::Unsat);
        check_refinement(&mut backend, &pool, src, tgt, None, &settings).unwrap();
        let without = match backend.goals.borrow()[0].kind() {
            ExprKind::And(args) => args.len(),
            k => panic!("unexpected goal {k:?}"),
        };

        // The source's nsw condition drops out of the first query when
        // poison no longer discharges target UB.
        assert_eq!(with, without + 1);
    }

    #[test]
    fn source_undef_is_universally_quantified() {
        let mut pool = TermPool::new();
        let u = pool.undef();
        let x = pool.input("%x");
        let src = pool.binary(BinaryOp::And, Flags::new(), x, u);
        let tgt = pool.input("%x");
        let settings = Settings {
            int_limit: 2,
            ..Settings::default()
        };
        let mut backend = ScriptBackend::always(SatResult::Unsat);
        check_refinement(&mut backend, &pool, src, tgt, None, &settings).unwrap();
        let goals = backend.goals.borrow();
        assert!(matches!(goals[0].kind(), ExprKind::Forall { .. }));
    }

    #[test]
    fn precondition_joins_source_definedness() {
        let mut pool = TermPool::new();
        let x = pool.input("%x");
        let c1 = pool.input("C1");
        let c2 = pool.input("C2");
        let xor = pool.binary(BinaryOp::Xor, Flags::new(), x, c1);
        let src = pool.binary(BinaryOp::Add, Flags::new(), xor, c2);
        let cx = pool.binary_cnxp(BinaryOp::Xor, c1, c2);
        let tgt = pool.binary(BinaryOp::Add, Flags::new(), x, cx);
        let pre = pool.fun_pred(PredOp::IntMin, &[c1]);

        let settings = Settings {
            int_limit: 3,
            ..Settings::default()
        };
        let mut backend = ScriptBackend::always(SatResult::Unsat);
        let r = check_refinement(&mut backend, &pool, src, tgt, Some(pre), &settings).unwrap();
        assert!(r.is_none());
        // Two widths, three queries each.
        assert_eq!(backend.queries, 6);
        // The precondition lands in every query's conjunction.
        let goals = backend.goals.borrow();
        for goal in goals.iter() {
            match goal.kind() {
                ExprKind::And(args) => assert!(!args.is_empty()),
                k => panic!("unexpected goal {k:?}"),
            }
        }
    }

    #[test]
    fn interp_translates_under_the_first_vector() {
        let mut pool = TermPool::new();
        let x = pool.input("%x");
        let y = pool.input("%y");
        let add = pool.binary(BinaryOp::Add, Flags::new(), x, y);
        let e = interp(&pool, add, &Settings::default()).unwrap();
        assert_eq!(e.sort(), Sort::Bv(4));
        assert!(matches!(
            e.kind(),
            ExprKind::BinOp {
                op: crate::smt::ast::BinOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn interp_reports_untypable_terms() {
        let mut pool = TermPool::new();
        let big = pool.literal(5);
        let x = pool.input("%x");
        let y = pool.input("%y");
        let sel = pool.select(big, x, y);
        let err = interp(&pool, sel, &Settings::default()).unwrap_err();
        assert!(matches!(err, Error::NoTyping { .. }));
    }
}
