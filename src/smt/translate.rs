//! Translation of IR terms into solver expressions.
//!
//! A [`Translator`] is fixed to one type vector and walks a term bottom-up,
//! producing its value expression while accumulating three kinds of side
//! state: definedness conditions (`defs`), non-poison conditions (`nops`),
//! and the existential variables minted for `undef` (`qvars`). Shared
//! subterms are translated at each use; for `undef` that is the point, as
//! every use may take a different value.
//!
//! Constant expressions share their value semantics with the corresponding
//! instructions but contribute no side conditions. Must-analysis
//! predicates translate to their defining formula only when every argument
//! is a constant; otherwise they become a fresh boolean that merely
//! implies the formula, modeling an analysis that is sound but incomplete.

use crate::ir::{
    BinaryOp, ConvOp, FloatOp, FunCnxpOp, IntCC, PredOp, Term, TermData, TermPool, Type,
    UnaryCnxpOp, POINTER_WIDTH,
};
use crate::model::{TypeModel, TypeVector};
use crate::smt::ast::{Expr, Sort};
use core::mem;
use log::trace;

/// The solver sort of a concrete type.
///
/// Panics on `x86_fp80`, which is excluded from enumeration and has no
/// backend sort here.
pub fn ty_sort(ty: Type) -> Sort {
    match ty {
        Type::Int(w) => Sort::Bv(w),
        Type::Ptr => Sort::Bv(POINTER_WIDTH),
        Type::Half => Sort::HALF,
        Type::Single => Sort::SINGLE,
        Type::Double => Sort::DOUBLE,
        Type::X86Fp80 => panic!("x86_fp80 has no solver sort"),
    }
}

fn bit_set(x: &Expr, i: u32) -> Expr {
    x.clone().extract(i, i).eq(Expr::bv(1, 1))
}

/// Count of leading zero bits of `x`, as an `out_w`-bit vector; `x == 0`
/// counts all of them.
pub(crate) fn ctlz(x: &Expr, out_w: u32) -> Expr {
    let w = x.width();
    let mut r = Expr::bv(w as u64, out_w);
    for i in 0..w {
        r = bit_set(x, i).ite(Expr::bv((w - 1 - i) as u64, out_w), r);
    }
    r
}

/// Count of trailing zero bits of `x`, as an `out_w`-bit vector; `x == 0`
/// counts all of them.
pub(crate) fn cttz(x: &Expr, out_w: u32) -> Expr {
    let w = x.width();
    let mut r = Expr::bv(w as u64, out_w);
    for i in (0..w).rev() {
        r = bit_set(x, i).ite(Expr::bv(i as u64, out_w), r);
    }
    r
}

/// Index of the highest set bit of `x`, as an `out_w`-bit vector; 0 when
/// `x == 0`.
pub(crate) fn bv_log2(x: &Expr, out_w: u32) -> Expr {
    let w = x.width();
    let mut r = Expr::bv(0, out_w);
    for i in 0..w {
        r = bit_set(x, i).ite(Expr::bv(i as u64, out_w), r);
    }
    r
}

/// Number of leading copies of the sign bit of `x`, counting the sign bit
/// itself, as an `out_w`-bit vector.
pub(crate) fn num_sign_bits(x: &Expr, out_w: u32) -> Expr {
    let w = x.width();
    // x and x>>1 agree on exactly the sign run minus its last bit, so the
    // run length is the leading-zero count of their xor.
    let d = x.clone().bvxor(x.clone().bvashr(Expr::bv(1, w)));
    ctlz(&d, out_w)
}

fn bin_value(op: BinaryOp, x: Expr, y: Expr) -> Expr {
    match op {
        BinaryOp::Add => x.bvadd(y),
        BinaryOp::Sub => x.bvsub(y),
        BinaryOp::Mul => x.bvmul(y),
        BinaryOp::Sdiv => x.bvsdiv(y),
        BinaryOp::Udiv => x.bvudiv(y),
        BinaryOp::Srem => x.bvsrem(y),
        BinaryOp::Urem => x.bvurem(y),
        BinaryOp::Shl => x.bvshl(y),
        BinaryOp::Ashr => x.bvashr(y),
        BinaryOp::Lshr => x.bvlshr(y),
        BinaryOp::And => x.bvand(y),
        BinaryOp::Or => x.bvor(y),
        BinaryOp::Xor => x.bvxor(y),
    }
}

fn int_cmp(cond: IntCC, x: Expr, y: Expr) -> Expr {
    match cond {
        IntCC::Equal => x.eq(y),
        IntCC::NotEqual => x.ne(y),
        IntCC::UnsignedGreaterThan => x.ugt(y),
        IntCC::UnsignedGreaterThanOrEqual => x.uge(y),
        IntCC::UnsignedLessThan => x.ult(y),
        IntCC::UnsignedLessThanOrEqual => x.ule(y),
        IntCC::SignedGreaterThan => x.sgt(y),
        IntCC::SignedGreaterThanOrEqual => x.sge(y),
        IntCC::SignedLessThan => x.slt(y),
        IntCC::SignedLessThanOrEqual => x.sle(y),
    }
}

fn int_min(w: u32) -> Expr {
    Expr::bv(1u64 << (w - 1).min(63), w)
}

/// Result of translating one term: its value and the side state gathered
/// along the way.
pub struct Translation {
    /// The term's value expression.
    pub value: Expr,
    /// Conditions required for the term to be defined.
    pub defs: Vec<Expr>,
    /// Conditions required for the term to not be poison.
    pub nops: Vec<Expr>,
    /// Existential variables minted for `undef` values.
    pub qvars: Vec<Expr>,
}

/// A single-pass translator fixed to one model and type vector.
pub struct Translator<'a> {
    pool: &'a TermPool,
    model: &'a TypeModel,
    vector: &'a TypeVector,
    fresh: u32,
    defs: Vec<Expr>,
    nops: Vec<Expr>,
    qvars: Vec<Expr>,
}

impl<'a> Translator<'a> {
    /// Create a translator for terms typed against `model` under `vector`.
    pub fn new(pool: &'a TermPool, model: &'a TypeModel, vector: &'a TypeVector) -> Self {
        Self {
            pool,
            model,
            vector,
            fresh: 0,
            defs: Vec::new(),
            nops: Vec::new(),
            qvars: Vec::new(),
        }
    }

    /// Clear the accumulated state, translate `term`, and hand everything
    /// back. Fresh names stay unique across calls on one translator.
    pub fn call(&mut self, term: Term) -> Translation {
        trace!("translating {}", self.pool.display(term));
        self.defs.clear();
        self.nops.clear();
        self.qvars.clear();
        let value = self.eval(term);
        Translation {
            value,
            defs: mem::take(&mut self.defs),
            nops: mem::take(&mut self.nops),
            qvars: mem::take(&mut self.qvars),
        }
    }

    fn bits(&self, t: Term) -> u32 {
        match self.model.type_of(self.vector, t) {
            Type::Int(w) => w,
            Type::Ptr => POINTER_WIDTH,
            ty => panic!("no bit width for {ty}"),
        }
    }

    fn sort(&self, t: Term) -> Sort {
        ty_sort(self.model.type_of(self.vector, t))
    }

    fn fresh_bool(&mut self) -> Expr {
        self.fresh += 1;
        Expr::symbol(format!("ana_{}", self.fresh), Sort::Bool)
    }

    fn fresh_bv(&mut self, width: u32) -> Expr {
        self.fresh += 1;
        Expr::symbol(format!("ana_{}", self.fresh), Sort::Bv(width))
    }

    fn must_analysis(&mut self, args: &[Term], body: Expr) -> Expr {
        if args.iter().all(|&a| self.pool.is_constant(a)) {
            return body;
        }
        let c = self.fresh_bool();
        self.defs.push(c.clone().implies(body));
        c
    }

    fn binary_defs(&mut self, op: BinaryOp, x: &Expr, y: &Expr) {
        let w = x.width();
        match op {
            BinaryOp::Sdiv | BinaryOp::Srem => {
                self.defs.push(y.clone().ne(Expr::bv(0, w)));
                self.defs.push(Expr::or(vec![
                    x.clone().ne(int_min(w)),
                    y.clone().ne(Expr::bv(u64::MAX, w)),
                ]));
            }
            BinaryOp::Udiv | BinaryOp::Urem => {
                self.defs.push(y.clone().ne(Expr::bv(0, w)));
            }
            BinaryOp::Shl | BinaryOp::Ashr | BinaryOp::Lshr => {
                self.defs.push(y.clone().ult(Expr::bv(w as u64, w)));
            }
            _ => {}
        }
    }

    fn binary_nops(&mut self, op: BinaryOp, flags: crate::ir::Flags, x: &Expr, y: &Expr) {
        let w = x.width();
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
                // Overflow checks compare the widened operation with the
                // widened result; +/- need one extra bit, * needs a full
                // doubling.
                let by = if op == BinaryOp::Mul { w } else { 1 };
                if flags.nsw() {
                    let wide = bin_value(op, x.clone().sign_ext(by), y.clone().sign_ext(by));
                    let narrow = bin_value(op, x.clone(), y.clone()).sign_ext(by);
                    self.nops.push(wide.eq(narrow));
                }
                if flags.nuw() {
                    let wide = bin_value(op, x.clone().zero_ext(by), y.clone().zero_ext(by));
                    let narrow = bin_value(op, x.clone(), y.clone()).zero_ext(by);
                    self.nops.push(wide.eq(narrow));
                }
            }
            BinaryOp::Sdiv if flags.exact() => {
                self.nops
                    .push(x.clone().bvsdiv(y.clone()).bvmul(y.clone()).eq(x.clone()));
            }
            BinaryOp::Udiv if flags.exact() => {
                self.nops
                    .push(x.clone().bvudiv(y.clone()).bvmul(y.clone()).eq(x.clone()));
            }
            BinaryOp::Shl => {
                if flags.nsw() {
                    self.nops.push(
                        x.clone()
                            .bvshl(y.clone())
                            .bvashr(y.clone())
                            .eq(x.clone()),
                    );
                }
                if flags.nuw() {
                    self.nops.push(
                        x.clone()
                            .bvshl(y.clone())
                            .bvlshr(y.clone())
                            .eq(x.clone()),
                    );
                }
            }
            BinaryOp::Ashr if flags.exact() => {
                self.nops
                    .push(x.clone().bvashr(y.clone()).bvshl(y.clone()).eq(x.clone()));
            }
            BinaryOp::Lshr if flags.exact() => {
                self.nops
                    .push(x.clone().bvlshr(y.clone()).bvshl(y.clone()).eq(x.clone()));
            }
            _ => {}
        }
    }

    /// Translate `term`, accumulating definedness, non-poison, and
    /// quantifier state as a side effect.
    pub fn eval(&mut self, term: Term) -> Expr {
        let pool = self.pool;
        match &pool[term] {
            TermData::Input { name } => Expr::symbol(name.clone(), self.sort(term)),
            TermData::Literal { value } => Expr::bv(*value as u64, self.bits(term)),
            TermData::FLiteral { value } => Expr::fp(*value, self.sort(term)),
            TermData::Undef => {
                self.fresh += 1;
                let x = Expr::symbol(format!("undef_{}", self.fresh), self.sort(term));
                self.qvars.push(x.clone());
                x
            }
            TermData::Binary { op, flags, args } => {
                let x = self.eval(args[0]);
                let y = self.eval(args[1]);
                self.binary_defs(*op, &x, &y);
                self.binary_nops(*op, *flags, &x, &y);
                bin_value(*op, x, y)
            }
            TermData::BinaryCnxp { op, args } => {
                let x = self.eval(args[0]);
                let y = self.eval(args[1]);
                bin_value(*op, x, y)
            }
            TermData::FloatBinary { op, flags, args } => {
                let x = self.eval(args[0]);
                let y = self.eval(args[1]);
                let value = match op {
                    FloatOp::Fadd => x.clone().fpadd(y.clone()),
                    FloatOp::Fsub => x.clone().fpsub(y.clone()),
                    FloatOp::Fmul => x.clone().fpmul(y.clone()),
                    FloatOp::Fdiv => x.clone().fpdiv(y.clone()),
                    FloatOp::Frem => x.clone().fprem(y.clone()),
                };
                if flags.nnan() {
                    self.defs.push(x.clone().is_nan().not_());
                    self.defs.push(y.clone().is_nan().not_());
                    self.defs.push(value.clone().is_nan().not_());
                }
                if flags.ninf() {
                    self.defs.push(x.is_infinite().not_());
                    self.defs.push(y.is_infinite().not_());
                    self.defs.push(value.clone().is_infinite().not_());
                }
                value
            }
            TermData::Conversion { op, arg } => {
                let v = self.eval(*arg);
                let src = self.bits(*arg);
                let tgt = self.bits(term);
                match op {
                    ConvOp::Sext => v.sign_ext(tgt - src),
                    ConvOp::Zext => v.zero_ext(tgt - src),
                    ConvOp::Trunc => v.extract(tgt - 1, 0),
                    ConvOp::ZextOrTrunc => {
                        if tgt == src {
                            v
                        } else if tgt > src {
                            v.zero_ext(tgt - src)
                        } else {
                            v.extract(tgt - 1, 0)
                        }
                    }
                }
            }
            TermData::Icmp { cond, args } => {
                let x = self.eval(args[0]);
                let y = self.eval(args[1]);
                int_cmp(*cond, x, y).ite(Expr::bv(1, 1), Expr::bv(0, 1))
            }
            TermData::Select { cond, args } => {
                let c = self.eval(*cond);
                let x = self.eval(args[0]);
                let y = self.eval(args[1]);
                c.eq(Expr::bv(1, 1)).ite(x, y)
            }
            TermData::UnaryCnxp { op, arg } => {
                let x = self.eval(*arg);
                match op {
                    UnaryCnxpOp::Not => x.bvnot(),
                    UnaryCnxpOp::Neg => x.bvneg(),
                    UnaryCnxpOp::Abs => {
                        let w = x.width();
                        x.clone()
                            .sge(Expr::bv(0, w))
                            .ite(x.clone(), x.bvneg())
                    }
                }
            }
            TermData::FunCnxp { op, args } => {
                let args = args.clone();
                match op {
                    FunCnxpOp::SignBits => {
                        let x = self.eval(args[0]);
                        let b = self.fresh_bv(self.bits(term));
                        self.defs
                            .push(b.clone().ule(num_sign_bits(&x, b.width())));
                        b
                    }
                    FunCnxpOp::OneBits => {
                        let x = self.eval(args[0]);
                        let w = x.width();
                        let b = self.fresh_bv(w);
                        self.defs
                            .push(b.clone().bvand(x.bvnot()).eq(Expr::bv(0, w)));
                        b
                    }
                    FunCnxpOp::ZeroBits => {
                        let x = self.eval(args[0]);
                        let w = x.width();
                        let b = self.fresh_bv(w);
                        self.defs.push(b.clone().bvand(x).eq(Expr::bv(0, w)));
                        b
                    }
                    FunCnxpOp::LeadingZeros => {
                        let x = self.eval(args[0]);
                        ctlz(&x, self.bits(term))
                    }
                    FunCnxpOp::TrailingZeros => {
                        let x = self.eval(args[0]);
                        cttz(&x, self.bits(term))
                    }
                    FunCnxpOp::Log2 => {
                        let x = self.eval(args[0]);
                        bv_log2(&x, self.bits(term))
                    }
                    FunCnxpOp::LshrFun => {
                        let x = self.eval(args[0]);
                        let y = self.eval(args[1]);
                        x.bvlshr(y)
                    }
                    FunCnxpOp::Smax => {
                        let x = self.eval(args[0]);
                        let y = self.eval(args[1]);
                        x.clone().sgt(y.clone()).ite(x, y)
                    }
                    FunCnxpOp::Umax => {
                        let x = self.eval(args[0]);
                        let y = self.eval(args[1]);
                        x.clone().ugt(y.clone()).ite(x, y)
                    }
                    FunCnxpOp::Sext => {
                        let x = self.eval(args[0]);
                        let by = self.bits(term) - x.width();
                        x.sign_ext(by)
                    }
                    FunCnxpOp::Zext => {
                        let x = self.eval(args[0]);
                        let by = self.bits(term) - x.width();
                        x.zero_ext(by)
                    }
                    FunCnxpOp::Trunc => {
                        let x = self.eval(args[0]);
                        x.extract(self.bits(term) - 1, 0)
                    }
                    // The argument's value is irrelevant, only its type.
                    FunCnxpOp::Width => {
                        Expr::bv(self.bits(args[0]) as u64, self.bits(term))
                    }
                }
            }
            TermData::AndPred { clauses } => {
                let clauses = clauses.clone();
                let parts = clauses.iter().map(|&c| self.eval(c)).collect();
                Expr::and(parts)
            }
            TermData::OrPred { clauses } => {
                let clauses = clauses.clone();
                let parts = clauses.iter().map(|&c| self.eval(c)).collect();
                Expr::or(parts)
            }
            TermData::NotPred { pred } => self.eval(*pred).not_(),
            TermData::Comparison { cond, args } => {
                let x = self.eval(args[0]);
                let y = self.eval(args[1]);
                int_cmp(*cond, x, y)
            }
            TermData::FunPred { op, args } => {
                let args = args.clone();
                match op {
                    PredOp::IntMin => {
                        let x = self.eval(args[0]);
                        let w = x.width();
                        x.eq(int_min(w))
                    }
                    PredOp::Power2 => {
                        let x = self.eval(args[0]);
                        let w = x.width();
                        let body = Expr::and(vec![
                            x.clone().ne(Expr::bv(0, w)),
                            x.clone()
                                .bvand(x.bvsub(Expr::bv(1, w)))
                                .eq(Expr::bv(0, w)),
                        ]);
                        self.must_analysis(&args, body)
                    }
                    PredOp::Power2OrZ => {
                        let x = self.eval(args[0]);
                        let w = x.width();
                        let body = x
                            .clone()
                            .bvand(x.bvsub(Expr::bv(1, w)))
                            .eq(Expr::bv(0, w));
                        self.must_analysis(&args, body)
                    }
                    PredOp::ShiftedMask => {
                        let x = self.eval(args[0]);
                        let w = x.width();
                        let v = x.clone().bvsub(Expr::bv(1, w)).bvor(x);
                        let body = Expr::and(vec![
                            v.clone().ne(Expr::bv(0, w)),
                            v.clone()
                                .bvadd(Expr::bv(1, w))
                                .bvand(v)
                                .eq(Expr::bv(0, w)),
                        ]);
                        self.must_analysis(&args, body)
                    }
                    PredOp::MaskZero => {
                        let x = self.eval(args[0]);
                        let y = self.eval(args[1]);
                        let w = x.width();
                        let body = x.bvand(y).eq(Expr::bv(0, w));
                        self.must_analysis(&args, body)
                    }
                    PredOp::NswAdd | PredOp::NuwAdd | PredOp::NswSub | PredOp::NuwSub => {
                        let x = self.eval(args[0]);
                        let y = self.eval(args[1]);
                        let signed = matches!(op, PredOp::NswAdd | PredOp::NswSub);
                        let bop = if matches!(op, PredOp::NswAdd | PredOp::NuwAdd) {
                            BinaryOp::Add
                        } else {
                            BinaryOp::Sub
                        };
                        let ext = |e: Expr| if signed { e.sign_ext(1) } else { e.zero_ext(1) };
                        let wide = bin_value(bop, ext(x.clone()), ext(y.clone()));
                        let narrow = ext(bin_value(bop, x, y));
                        self.must_analysis(&args, wide.eq(narrow))
                    }
                    PredOp::NswMul | PredOp::NuwMul => {
                        let x = self.eval(args[0]);
                        let y = self.eval(args[1]);
                        let w = x.width();
                        let signed = *op == PredOp::NswMul;
                        let ext = |e: Expr| if signed { e.sign_ext(w) } else { e.zero_ext(w) };
                        let wide = ext(x.clone()).bvmul(ext(y.clone()));
                        let narrow = ext(x.bvmul(y));
                        self.must_analysis(&args, wide.eq(narrow))
                    }
                    PredOp::NuwShl => {
                        let x = self.eval(args[0]);
                        let y = self.eval(args[1]);
                        let body = x
                            .clone()
                            .bvshl(y.clone())
                            .bvlshr(y)
                            .eq(x);
                        self.must_analysis(&args, body)
                    }
                    // A syntactic property with no model here; assuming it
                    // costs completeness, never soundness.
                    PredOp::OneUse => Expr::boolean(true),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{TypeConstraints, TypeVisitor};
    use crate::ir::Flags;
    use crate::smt::ast::{BinOp, ExprKind};

    /// Evaluate a closed expression (no symbols) to a concrete value.
    #[derive(Clone, Copy, Debug, PartialEq)]
    enum V {
        Bv { w: u32, bits: u64 },
        B(bool),
    }

    fn mask(w: u32) -> u64 {
        if w >= 64 {
            !0
        } else {
            (1 << w) - 1
        }
    }

    fn run(e: &Expr) -> V {
        match e.kind() {
            ExprKind::BvLit(bits) => V::Bv {
                w: e.width(),
                bits: *bits,
            },
            ExprKind::BoolLit(b) => V::B(*b),
            ExprKind::Not(a) => match run(a) {
                V::B(b) => V::B(!b),
                v => panic!("not on {v:?}"),
            },
            ExprKind::Extract { high, low, arg } => match run(arg) {
                V::Bv { bits, .. } => V::Bv {
                    w: high - low + 1,
                    bits: (bits >> low) & mask(high - low + 1),
                },
                v => panic!("extract on {v:?}"),
            },
            ExprKind::Ite {
                cond,
                then_val,
                else_val,
            } => match run(cond) {
                V::B(true) => run(then_val),
                V::B(false) => run(else_val),
                v => panic!("ite on {v:?}"),
            },
            ExprKind::BinOp { op, lhs, rhs } => {
                let (l, r) = (run(lhs), run(rhs));
                let (w, a, b) = match (l, r) {
                    (V::Bv { w, bits: a }, V::Bv { bits: b, .. }) => (w, a, b),
                    _ => panic!("bv op on bools"),
                };
                let sext = |bits: u64| ((bits << (64 - w)) as i64) >> (64 - w);
                match op {
                    BinOp::Eq => V::B(a == b),
                    BinOp::Ult => V::B(a < b),
                    BinOp::Add => V::Bv {
                        w,
                        bits: a.wrapping_add(b) & mask(w),
                    },
                    BinOp::Sub => V::Bv {
                        w,
                        bits: a.wrapping_sub(b) & mask(w),
                    },
                    BinOp::BvXor => V::Bv { w, bits: a ^ b },
                    BinOp::BvAnd => V::Bv { w, bits: a & b },
                    BinOp::BvOr => V::Bv { w, bits: a | b },
                    BinOp::Ashr => {
                        let sh = b.min(63);
                        V::Bv {
                            w,
                            bits: ((sext(a) >> sh) as u64) & mask(w),
                        }
                    }
                    op => panic!("no rule for {op:?}"),
                }
            }
            k => panic!("open expression {k:?}"),
        }
    }

    fn bits_of(v: V) -> u64 {
        match v {
            V::Bv { bits, .. } => bits,
            V::B(_) => panic!("expected bitvector"),
        }
    }

    #[test]
    fn bit_count_helpers() {
        for (x, expect) in [(0b0000, 4), (0b0001, 3), (0b0010, 2), (0b1111, 0)] {
            assert_eq!(bits_of(run(&ctlz(&Expr::bv(x, 4), 6))), expect, "ctlz {x:b}");
        }
        for (x, expect) in [(0b0000, 4), (0b0001, 0), (0b0100, 2), (0b1000, 3)] {
            assert_eq!(bits_of(run(&cttz(&Expr::bv(x, 4), 6))), expect, "cttz {x:b}");
        }
        for (x, expect) in [(0b0000, 0), (0b0001, 0), (0b0101, 2), (0b1000, 3)] {
            assert_eq!(bits_of(run(&bv_log2(&Expr::bv(x, 4), 6))), expect, "log2 {x:b}");
        }
        for (x, expect) in [
            (0b0000, 4),
            (0b1111, 4),
            (0b0001, 3),
            (0b1100, 2),
            (0b1000, 1),
            (0b0111, 1),
        ] {
            assert_eq!(
                bits_of(run(&num_sign_bits(&Expr::bv(x, 4), 6))),
                expect,
                "sign bits {x:b}"
            );
        }
    }

    fn typed(pool: &TermPool, roots: &[Term]) -> (TypeModel, TypeVector) {
        let mut tc = TypeConstraints::new(pool);
        for &r in roots {
            tc.collect(r).unwrap();
        }
        let model = tc.finalize().unwrap();
        let vector = model
            .type_vectors(65)
            .next()
            .expect("at least one type vector");
        (model, vector)
    }

    #[test]
    fn literal_masks_to_width() {
        let mut pool = TermPool::new();
        let x = pool.input("%x");
        let lit = pool.literal(-1);
        let add = pool.binary(BinaryOp::Add, Flags::new(), x, lit);
        let mut tc = TypeConstraints::new(&pool);
        tc.collect(add).unwrap();
        tc.specific(x, Type::Int(8)).unwrap();
        let model = tc.finalize().unwrap();
        let vector = model.type_vectors(65).next().unwrap();
        let mut smt = Translator::new(&pool, &model, &vector);
        let t = smt.call(lit);
        assert_eq!(t.value, Expr::bv(0xff, 8));
    }

    #[test]
    fn division_definedness() {
        let mut pool = TermPool::new();
        let x = pool.input("%x");
        let y = pool.input("%y");
        let udiv = pool.binary(BinaryOp::Udiv, Flags::new(), x, y);
        let (model, vector) = typed(&pool, &[udiv]);
        let mut smt = Translator::new(&pool, &model, &vector);
        let t = smt.call(udiv);
        assert_eq!(t.defs.len(), 1);
        assert_eq!(t.nops.len(), 0);

        let sdiv = pool.binary(BinaryOp::Sdiv, Flags::new().with_exact(), x, y);
        let (model, vector) = typed(&pool, &[sdiv]);
        let mut smt = Translator::new(&pool, &model, &vector);
        let t = smt.call(sdiv);
        // Nonzero divisor plus the INT_MIN/-1 exclusion.
        assert_eq!(t.defs.len(), 2);
        assert_eq!(t.nops.len(), 1);
    }

    #[test]
    fn add_flags_become_poison_conditions() {
        let mut pool = TermPool::new();
        let x = pool.input("%x");
        let y = pool.input("%y");
        let add = pool.binary(BinaryOp::Add, Flags::new().with_nsw().with_nuw(), x, y);
        let (model, vector) = typed(&pool, &[add]);
        let mut smt = Translator::new(&pool, &model, &vector);
        let t = smt.call(add);
        assert_eq!(t.defs.len(), 0);
        assert_eq!(t.nops.len(), 2);
        for nop in &t.nops {
            assert!(matches!(
                nop.kind(),
                ExprKind::BinOp { op: BinOp::Eq, .. }
            ));
        }
    }

    #[test]
    fn icmp_is_a_one_bit_select() {
        let mut pool = TermPool::new();
        let x = pool.input("%x");
        let zero = pool.literal(0);
        let cmp = pool.icmp(IntCC::UnsignedLessThan, x, zero);
        let (model, vector) = typed(&pool, &[cmp]);
        let mut smt = Translator::new(&pool, &model, &vector);
        let t = smt.call(cmp);
        assert_eq!(t.value.sort(), Sort::Bv(1));
        match t.value.kind() {
            ExprKind::Ite { cond, .. } => {
                assert!(matches!(
                    cond.kind(),
                    ExprKind::BinOp { op: BinOp::Ult, .. }
                ));
            }
            k => panic!("unexpected kind {k:?}"),
        }
    }

    #[test]
    fn undef_mints_fresh_quantified_variables() {
        let mut pool = TermPool::new();
        let u = pool.undef();
        let add = pool.binary(BinaryOp::Add, Flags::new(), u, u);
        let (model, vector) = typed(&pool, &[add]);
        let mut smt = Translator::new(&pool, &model, &vector);
        let t = smt.call(add);
        // Each use picks its own value.
        assert_eq!(t.qvars.len(), 2);
        assert_ne!(t.qvars[0], t.qvars[1]);
    }

    #[test]
    fn must_analysis_shortcut() {
        let mut pool = TermPool::new();
        let c = pool.input("C1");
        let p = pool.fun_pred(PredOp::Power2, &[c]);
        let (model, vector) = typed(&pool, &[p]);
        let mut smt = Translator::new(&pool, &model, &vector);
        let t = smt.call(p);
        assert!(t.defs.is_empty());
        assert!(matches!(t.value.kind(), ExprKind::And(_)));

        let x = pool.input("%x");
        let p = pool.fun_pred(PredOp::Power2, &[x]);
        let (model, vector) = typed(&pool, &[p]);
        let mut smt = Translator::new(&pool, &model, &vector);
        let t = smt.call(p);
        assert_eq!(t.defs.len(), 1);
        assert!(matches!(t.value.kind(), ExprKind::Symbol(_)));
        assert!(matches!(
            t.defs[0].kind(),
            ExprKind::BinOp {
                op: BinOp::Implies,
                ..
            }
        ));
    }

    #[test]
    fn zext_or_trunc_collapses_at_equal_width() {
        let mut pool = TermPool::new();
        let x = pool.input("%x");
        let z = pool.conversion(ConvOp::ZextOrTrunc, x);
        let mut tc = TypeConstraints::new(&pool);
        tc.collect(z).unwrap();
        tc.specific(x, Type::Int(16)).unwrap();
        tc.specific(z, Type::Int(16)).unwrap();
        let model = tc.finalize().unwrap();
        let vector = model.type_vectors(65).next().unwrap();
        let mut smt = Translator::new(&pool, &model, &vector);
        let t = smt.call(z);
        assert_eq!(t.value, Expr::symbol("%x", Sort::Bv(16)));
    }

    #[test]
    fn width_reads_the_argument_type() {
        let mut pool = TermPool::new();
        let x = pool.input("%x");
        let w = pool.fun_cnxp(FunCnxpOp::Width, &[x]);
        let mut tc = TypeConstraints::new(&pool);
        tc.collect(w).unwrap();
        tc.specific(x, Type::Int(16)).unwrap();
        tc.specific(w, Type::Int(8)).unwrap();
        let model = tc.finalize().unwrap();
        let vector = model.type_vectors(65).next().unwrap();
        let mut smt = Translator::new(&pool, &model, &vector);
        let t = smt.call(w);
        assert_eq!(t.value, Expr::bv(16, 8));
    }

    #[test]
    fn call_resets_but_fresh_names_do_not_repeat() {
        let mut pool = TermPool::new();
        let u = pool.undef();
        let (model, vector) = typed(&pool, &[u]);
        let mut smt = Translator::new(&pool, &model, &vector);
        let a = smt.call(u);
        let b = smt.call(u);
        assert_eq!(a.qvars.len(), 1);
        assert_eq!(b.qvars.len(), 1);
        assert_ne!(a.qvars[0], b.qvars[0]);
    }
}
