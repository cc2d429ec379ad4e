//! Type constraint gathering.
//!
//! Terms are polymorphic: `add %x, %y` works at any integer width, and a
//! rewrite is only correct if it verifies at every width the source admits.
//! Each term variant describes its local typing rules to a [`TypeVisitor`];
//! the [`TypeConstraints`] gatherer is the visitor that records them, as a
//! union-find over terms annotated with a constraint class, an optional
//! pinned type, width orderings, and width equalities. Once a whole rewrite
//! has been collected, `finalize` (in the `model` module) turns the gathered
//! state into an immutable type model.
//!
//! The same visitor interface is reimplemented by the validator, which
//! replays the rules against one concrete type vector.

use crate::disjoint::DisjointSets;
use crate::fx::{FxHashMap, FxHashSet};
use crate::ir::{ConvOp, FunCnxpOp, PredOp, Term, TermData, TermPool, Type};
use crate::model::{TyVar, TypeModel};
use crate::result::{TypeError, TypeResult};
use core::fmt;
use core::mem;
use cranelift_entity::EntityRef;
use log::trace;
use std::collections::BTreeSet;

/// A constraint class: the set of concrete types a unification set may
/// concretize to. Classes form a meet semilattice ordered by specificity;
/// later variants are more specific.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstraintClass {
    /// Any first-class type.
    FirstClass,
    /// Integer or floating point.
    Number,
    /// Floating point only.
    Float,
    /// Integer or pointer.
    IntPtr,
    /// Pointer only.
    Ptr,
    /// Integer only.
    Int,
    /// Exactly `i1`.
    Bool,
}

impl ConstraintClass {
    /// The most specific class implied by both `self` and `other`, or
    /// `None` when they are incompatible.
    pub fn meet(self, other: Self) -> Option<Self> {
        let (lo, hi) = if self <= other {
            (self, other)
        } else {
            (other, self)
        };
        match (lo, hi) {
            (Self::Number, Self::Ptr) => None,
            (Self::Number, Self::IntPtr) => Some(Self::Int),
            (Self::Float, hi) if hi != Self::Float => None,
            (Self::Ptr, hi) if hi != Self::Ptr => None,
            (_, hi) => Some(hi),
        }
    }

    /// Does the concrete type `ty` satisfy this class?
    pub fn meets(self, ty: Type) -> bool {
        match self {
            Self::FirstClass => true,
            Self::Number => ty.is_int() || ty.is_float(),
            Self::Float => ty.is_float(),
            Self::IntPtr => ty.is_int() || ty.is_ptr(),
            Self::Ptr => ty.is_ptr(),
            Self::Int => ty.is_int(),
            Self::Bool => ty == Type::Int(1),
        }
    }
}

impl fmt::Display for ConstraintClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::FirstClass => "first class",
            Self::Number => "integer or floating-point",
            Self::Float => "floating-point",
            Self::IntPtr => "integer or pointer",
            Self::Ptr => "pointer",
            Self::Int => "integer",
            Self::Bool => "i1",
        })
    }
}

/// The lower end of a width ordering: either a fixed bit count or another
/// term, in both cases strictly below the width of the constrained term.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WidthLo {
    /// A fixed number of bits. A bound of 0 is vacuous.
    Bits(u32),
    /// The width of another term.
    Term(Term),
}

/// The visitor interface through which each term variant states its typing
/// rules. Implemented by the gatherer and by the per-vector validator.
pub trait TypeVisitor {
    /// Require all of `terms` to have the same type.
    fn eq_types(&mut self, terms: &[Term]) -> TypeResult<()>;

    /// Pin `term` to the concrete type `ty`.
    fn specific(&mut self, term: Term, ty: Type) -> TypeResult<()>;

    /// Constrain `term` to the class `con`.
    fn constrain(&mut self, term: Term, con: ConstraintClass) -> TypeResult<()>;

    /// Require `width(lo) < width(hi)`.
    fn width_order(&mut self, lo: WidthLo, hi: Term) -> TypeResult<()>;

    /// Require `bits(a) == bits(b)`.
    fn width_equal(&mut self, a: Term, b: Term) -> TypeResult<()>;

    /// Tie `term` to the default type used for ambiguously typed predicate
    /// arguments (`i64`).
    fn default(&mut self, term: Term) -> TypeResult<()>;

    /// Constrain `term` to integers.
    fn integer(&mut self, term: Term) -> TypeResult<()> {
        self.constrain(term, ConstraintClass::Int)
    }

    /// Constrain `term` to `i1`.
    fn boolean(&mut self, term: Term) -> TypeResult<()> {
        self.constrain(term, ConstraintClass::Bool)
    }

    /// Constrain `term` to pointers.
    fn pointer(&mut self, term: Term) -> TypeResult<()> {
        self.constrain(term, ConstraintClass::Ptr)
    }

    /// Constrain `term` to floats.
    fn float(&mut self, term: Term) -> TypeResult<()> {
        self.constrain(term, ConstraintClass::Float)
    }

    /// Constrain `term` to integers or floats.
    fn number(&mut self, term: Term) -> TypeResult<()> {
        self.constrain(term, ConstraintClass::Number)
    }

    /// Constrain `term` to integers or pointers.
    fn int_ptr(&mut self, term: Term) -> TypeResult<()> {
        self.constrain(term, ConstraintClass::IntPtr)
    }

    /// Constrain `term` to any first-class type.
    fn first_class(&mut self, term: Term) -> TypeResult<()> {
        self.constrain(term, ConstraintClass::FirstClass)
    }
}

/// Exclusive lower bound on the width of an integer literal's type: the
/// type must be wide enough to represent the value, reading nonnegative
/// values as unsigned.
fn literal_width_bound(value: i64) -> u32 {
    let bits = if value >= 0 {
        64 - (value as u64).leading_zeros()
    } else {
        65 - ((!value) as u64).leading_zeros()
    };
    bits.max(1) - 1
}

/// Describe `term`'s local typing rules to `v`. Rules cover only the term
/// itself; traversal of subterms is the caller's job.
pub fn type_constraints<V: TypeVisitor>(pool: &TermPool, term: Term, v: &mut V) -> TypeResult<()> {
    match &pool[term] {
        TermData::Input { .. } | TermData::Undef => v.first_class(term),
        TermData::Literal { value } => {
            v.integer(term)?;
            v.width_order(WidthLo::Bits(literal_width_bound(*value)), term)
        }
        TermData::FLiteral { .. } => v.float(term),
        TermData::Binary { args, .. } | TermData::BinaryCnxp { args, .. } => {
            v.eq_types(&[term, args[0], args[1]])?;
            v.integer(term)
        }
        TermData::FloatBinary { args, .. } => {
            v.eq_types(&[term, args[0], args[1]])?;
            v.float(term)
        }
        TermData::Conversion { op, arg } => {
            v.integer(term)?;
            v.integer(*arg)?;
            match op {
                ConvOp::Sext | ConvOp::Zext => v.width_order(WidthLo::Term(*arg), term),
                ConvOp::Trunc => v.width_order(WidthLo::Term(term), *arg),
                ConvOp::ZextOrTrunc => Ok(()),
            }
        }
        TermData::Icmp { args, .. } => {
            v.boolean(term)?;
            v.eq_types(&[args[0], args[1]])?;
            v.int_ptr(args[0])
        }
        TermData::Select { cond, args } => {
            v.boolean(*cond)?;
            v.eq_types(&[term, args[0], args[1]])?;
            v.first_class(term)
        }
        TermData::UnaryCnxp { arg, .. } => {
            v.eq_types(&[term, *arg])?;
            v.integer(term)
        }
        TermData::FunCnxp { op, args } => match op {
            FunCnxpOp::SignBits
            | FunCnxpOp::LeadingZeros
            | FunCnxpOp::TrailingZeros
            | FunCnxpOp::Log2 => {
                v.integer(term)?;
                v.integer(args[0])
            }
            FunCnxpOp::OneBits | FunCnxpOp::ZeroBits => {
                v.eq_types(&[term, args[0]])?;
                v.integer(term)
            }
            FunCnxpOp::LshrFun | FunCnxpOp::Smax | FunCnxpOp::Umax => {
                v.eq_types(&[term, args[0], args[1]])?;
                v.integer(term)
            }
            FunCnxpOp::Sext | FunCnxpOp::Zext => {
                v.integer(term)?;
                v.integer(args[0])?;
                v.width_order(WidthLo::Term(args[0]), term)
            }
            FunCnxpOp::Trunc => {
                v.integer(term)?;
                v.integer(args[0])?;
                v.width_order(WidthLo::Term(term), args[0])
            }
            FunCnxpOp::Width => {
                v.integer(term)?;
                v.first_class(args[0])
            }
        },
        TermData::AndPred { .. } | TermData::OrPred { .. } | TermData::NotPred { .. } => Ok(()),
        TermData::Comparison { args, .. } => {
            v.eq_types(&[args[0], args[1]])?;
            v.int_ptr(args[0])
        }
        TermData::FunPred { op, args } => match op {
            PredOp::IntMin | PredOp::Power2 | PredOp::Power2OrZ | PredOp::ShiftedMask => {
                v.integer(args[0])
            }
            PredOp::MaskZero
            | PredOp::NswAdd
            | PredOp::NuwAdd
            | PredOp::NswSub
            | PredOp::NuwSub
            | PredOp::NswMul
            | PredOp::NuwMul
            | PredOp::NuwShl => {
                v.eq_types(&[args[0], args[1]])?;
                v.integer(args[0])
            }
            PredOp::OneUse => v.first_class(args[0]),
        },
    }
}

/// The default type for ambiguously typed predicate arguments.
pub const PREDICATE_DEFAULT: Type = Type::Int(64);

pub(crate) struct ExtendState {
    /// Snapshot of the model's term-to-tyvar context.
    pub(crate) known: FxHashMap<Term, TyVar>,
    pub(crate) default_id: TyVar,
    /// For each model tyvar, the representative carrying it, if any.
    pub(crate) tyvar_reps: Vec<Option<Term>>,
    /// Inverse of `tyvar_reps`, keyed by representative.
    pub(crate) rep_tyvar: FxHashMap<Term, TyVar>,
}

/// Accumulated typing state for one rewrite.
pub struct TypeConstraints<'a> {
    pub(crate) pool: &'a TermPool,
    pub(crate) sets: DisjointSets<Term>,
    pub(crate) specifics: FxHashMap<Term, Type>,
    pub(crate) constraints: FxHashMap<Term, ConstraintClass>,
    pub(crate) ordering: BTreeSet<(WidthLo, Term)>,
    pub(crate) width_equalities: BTreeSet<(Term, Term)>,
    pub(crate) default_rep: Option<Term>,
    gathered: FxHashSet<Term>,
    pub(crate) ext: Option<ExtendState>,
}

impl<'a> TypeConstraints<'a> {
    /// Create an empty gatherer over `pool`.
    pub fn new(pool: &'a TermPool) -> Self {
        Self {
            pool,
            sets: DisjointSets::new(),
            specifics: FxHashMap::default(),
            constraints: FxHashMap::default(),
            ordering: BTreeSet::new(),
            width_equalities: BTreeSet::new(),
            default_rep: None,
            gathered: FxHashSet::default(),
            ext: None,
        }
    }

    /// Create a gatherer that types new terms against an existing model
    /// instead of introducing fresh type variables.
    pub(crate) fn extending(pool: &'a TermPool, model: &TypeModel) -> Self {
        let mut tc = Self::new(pool);
        tc.ext = Some(ExtendState {
            known: model.context().clone(),
            default_id: model.default_id(),
            tyvar_reps: vec![None; model.tyvars()],
            rep_tyvar: FxHashMap::default(),
        });
        tc
    }

    /// Gather constraints for `root` and all of its subterms. Terms already
    /// collected by this gatherer are skipped.
    pub fn collect(&mut self, root: Term) -> TypeResult<()> {
        let pool = self.pool;
        let mut walk = pool.subterms_with_seen(root, mem::take(&mut self.gathered));
        loop {
            let Some(t) = walk.next() else { break };
            type_constraints(pool, t, self)?;
        }
        self.gathered = walk.into_seen();
        Ok(())
    }

    fn name(&self, t: Term) -> String {
        self.pool.display(t).to_string()
    }

    /// Current constraint class of a representative.
    pub(crate) fn constraint_of(&self, rep: Term) -> ConstraintClass {
        self.constraints
            .get(&rep)
            .copied()
            .unwrap_or(ConstraintClass::FirstClass)
    }

    /// Register `t` in the disjoint-set structure and return its
    /// representative. In extension mode, a term the model has already
    /// typed is tied to the representative carrying its type variable.
    fn ensure(&mut self, t: Term) -> TypeResult<Term> {
        if !self.sets.contains(t) {
            trace!("adding term {}", self.pool.display(t));
            self.sets.add_key(t);
            let known = self.ext.as_ref().and_then(|e| e.known.get(&t).copied());
            if let Some(tyvar) = known {
                let existing = self.ext.as_ref().unwrap().tyvar_reps[tyvar.index()];
                match existing {
                    Some(rep) => self.unify_terms(t, rep)?,
                    None => {
                        let e = self.ext.as_mut().unwrap();
                        e.tyvar_reps[tyvar.index()] = Some(t);
                        e.rep_tyvar.insert(t, tyvar);
                    }
                }
            }
        }
        Ok(self.sets.rep(t))
    }

    fn set_specific(&mut self, rep: Term, ty: Type) -> TypeResult<()> {
        match self.specifics.get(&rep) {
            None => {
                trace!("specifying {} : {}", self.pool.display(rep), ty);
                self.specifics.insert(rep, ty);
                Ok(())
            }
            Some(&old) if old == ty => Ok(()),
            Some(&old) => Err(TypeError::IncompatibleTypes {
                term: self.name(rep),
                first: ty,
                second: old,
            }),
        }
    }

    fn set_constraint(&mut self, rep: Term, con: ConstraintClass) -> TypeResult<()> {
        let old = self.constraint_of(rep);
        let Some(refined) = old.meet(con) else {
            return Err(TypeError::IncompatibleConstraints {
                term: self.name(rep),
                first: con,
                second: old,
            });
        };
        trace!(
            "refining constraint for {}: {con} & {old} = {refined}",
            self.pool.display(rep)
        );
        self.constraints.insert(rep, refined);
        Ok(())
    }

    fn unify_terms(&mut self, a: Term, b: Term) -> TypeResult<()> {
        let Some((survivor, absorbed)) = self.sets.begin_union(a, b) else {
            return Ok(());
        };
        trace!(
            "unifying {} and {}",
            self.pool.display(survivor),
            self.pool.display(absorbed)
        );
        if let Some(ty) = self.specifics.remove(&absorbed) {
            self.set_specific(survivor, ty)?;
        }
        if let Some(con) = self.constraints.remove(&absorbed) {
            self.set_constraint(survivor, con)?;
        }
        if self.default_rep == Some(absorbed) {
            self.default_rep = Some(survivor);
        }
        let moved = self
            .ext
            .as_ref()
            .and_then(|e| e.rep_tyvar.get(&absorbed).copied());
        if let Some(tyvar) = moved {
            if self.ext.as_ref().unwrap().rep_tyvar.contains_key(&survivor) {
                return Err(TypeError::CannotUnify {
                    first: self.name(survivor),
                    second: self.name(absorbed),
                });
            }
            let e = self.ext.as_mut().unwrap();
            e.rep_tyvar.remove(&absorbed);
            e.rep_tyvar.insert(survivor, tyvar);
            e.tyvar_reps[tyvar.index()] = Some(survivor);
        }
        self.sets.complete_union(survivor, absorbed);
        Ok(())
    }

    /// Rewrite the ordering and equality sets in terms of current
    /// representatives, dropping reflexive equalities.
    pub(crate) fn simplify_orderings(&mut self) {
        let ordering = mem::take(&mut self.ordering);
        for (lo, hi) in ordering {
            let lo = match lo {
                WidthLo::Term(t) => WidthLo::Term(self.sets.rep(t)),
                bits => bits,
            };
            let hi = self.sets.rep(hi);
            self.ordering.insert((lo, hi));
        }
        let eqs = mem::take(&mut self.width_equalities);
        for (a, b) in eqs {
            let a = self.sets.rep(a);
            let b = self.sets.rep(b);
            if a == b {
                continue;
            }
            let pair = if a < b { (a, b) } else { (b, a) };
            self.width_equalities.insert(pair);
        }
        debug_assert!(
            self.ordering.iter().all(|&(lo, hi)| match lo {
                WidthLo::Term(t) =>
                    self.constraint_of(t).meet(self.constraint_of(hi)).is_some(),
                WidthLo::Bits(_) => true,
            }),
            "width ordering between incompatible constraint classes"
        );
    }
}

impl TypeVisitor for TypeConstraints<'_> {
    fn eq_types(&mut self, terms: &[Term]) -> TypeResult<()> {
        let Some((&first, rest)) = terms.split_first() else {
            return Ok(());
        };
        self.ensure(first)?;
        for &t in rest {
            self.ensure(t)?;
            self.unify_terms(first, t)?;
        }
        Ok(())
    }

    fn specific(&mut self, term: Term, ty: Type) -> TypeResult<()> {
        let rep = self.ensure(term)?;
        self.set_specific(rep, ty)
    }

    fn constrain(&mut self, term: Term, con: ConstraintClass) -> TypeResult<()> {
        let rep = self.ensure(term)?;
        self.set_constraint(rep, con)
    }

    fn width_order(&mut self, lo: WidthLo, hi: Term) -> TypeResult<()> {
        let lo = match lo {
            WidthLo::Term(t) => WidthLo::Term(self.ensure(t)?),
            bits => bits,
        };
        let hi = self.ensure(hi)?;
        self.ordering.insert((lo, hi));
        Ok(())
    }

    fn width_equal(&mut self, a: Term, b: Term) -> TypeResult<()> {
        let a = self.ensure(a)?;
        let b = self.ensure(b)?;
        self.width_equalities.insert((a, b));
        Ok(())
    }

    fn default(&mut self, term: Term) -> TypeResult<()> {
        match self.default_rep {
            Some(default_rep) => self.eq_types(&[term, default_rep]),
            None => {
                let rep = self.ensure(term)?;
                self.set_specific(rep, PREDICATE_DEFAULT)?;
                self.set_constraint(rep, ConstraintClass::Int)?;
                self.default_rep = Some(rep);
                let default_id = self.ext.as_ref().map(|e| e.default_id);
                if let Some(default_id) = default_id {
                    let existing = self.ext.as_ref().unwrap().tyvar_reps[default_id.index()];
                    match existing {
                        Some(holder) => self.unify_terms(rep, holder)?,
                        None => {
                            let e = self.ext.as_mut().unwrap();
                            e.tyvar_reps[default_id.index()] = Some(rep);
                            e.rep_tyvar.insert(rep, default_id);
                        }
                    }
                }
                Ok(())
            }
        }
    }
}
