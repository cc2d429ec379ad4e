//! Abstract type models and type-vector enumeration.
//!
//! Finalizing a [`TypeConstraints`] turns the union-find world of terms
//! into a dense, immutable world of *type variables*: every unification set
//! becomes one [`TyVar`], numbered in a topological order of the width
//! bounds so that a variable's lower bounds always carry smaller IDs. The
//! model also owns the context mapping from each term to its variable,
//! which the translator and validator consult and which [`extend`] grows.
//!
//! Enumeration is an explicit depth-first search over variables in ID
//! order. Because of the topological numbering, by the time a variable is
//! reached every width bound it depends on is already assigned, so each
//! search frame filters its candidate types eagerly.
//!
//! [`extend`]: TypeModel::extend

use crate::constraints::{
    type_constraints, ConstraintClass, TypeConstraints, TypeVisitor, WidthLo, PREDICATE_DEFAULT,
};
use crate::fx::FxHashMap;
use crate::ir::{Term, TermPool, Type};
use crate::result::{TypeError, TypeResult};
use core::ops::Index;
use cranelift_entity::{entity_impl, EntityRef, PrimaryMap};
use log::{debug, trace};
use smallvec::SmallVec;

/// An opaque reference to a type variable of a [`TypeModel`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TyVar(u32);
entity_impl!(TyVar, "ty");

/// Everything the model knows about one type variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TyVarData {
    /// The constraint class every assignment must satisfy.
    pub constraint: ConstraintClass,
    /// A pinned concrete type, if any.
    pub specific: Option<Type>,
    /// Exclusive lower bound on the width in bits.
    pub min_width: u32,
    /// Variables whose assigned width must stay strictly below this one.
    /// Topological numbering guarantees they have smaller IDs.
    pub lower_bounds: SmallVec<[TyVar; 2]>,
    /// The smallest variable of this one's width-equality class, when the
    /// class is nontrivial.
    pub width_equal: Option<TyVar>,
}

/// A concrete assignment of types to every variable of a model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeVector {
    types: Vec<Type>,
}

impl TypeVector {
    /// The assignments, indexed by variable ID.
    pub fn types(&self) -> &[Type] {
        &self.types
    }

    /// Number of variables assigned.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Is the vector empty?
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Index<TyVar> for TypeVector {
    type Output = Type;

    fn index(&self, v: TyVar) -> &Type {
        &self.types[v.index()]
    }
}

/// The immutable result of finalizing a [`TypeConstraints`]: all remaining
/// typing freedom of one rewrite.
#[derive(Debug)]
pub struct TypeModel {
    vars: PrimaryMap<TyVar, TyVarData>,
    default_id: TyVar,
    context: FxHashMap<Term, TyVar>,
}

/// Float formats eligible for enumeration. The x87 format takes part in
/// ordering but is never enumerated.
const FLOAT_TYS: [Type; 3] = [Type::Half, Type::Single, Type::Double];

/// Integer widths in `[1, limit)` in enumeration order: the practically
/// interesting widths 4 and 8 first, then everything else ascending.
fn int_widths(limit: u32) -> Vec<u32> {
    let mut widths = Vec::new();
    if 4 < limit {
        widths.push(4);
    }
    if 8 < limit {
        widths.push(8);
    }
    for w in 1..limit.min(4) {
        widths.push(w);
    }
    for w in 5..limit.min(8) {
        widths.push(w);
    }
    for w in 9..limit {
        widths.push(w);
    }
    widths
}

fn topo_visit(
    rep: Term,
    lower: &FxHashMap<Term, Vec<Term>>,
    state: &mut FxHashMap<Term, bool>,
    order: &mut Vec<Term>,
    pool: &TermPool,
) -> TypeResult<()> {
    if let Some(&done) = state.get(&rep) {
        if done {
            return Ok(());
        }
        // Reached while still on the stack: the ordering is cyclic.
        return Err(TypeError::CircularOrdering {
            term: pool.display(rep).to_string(),
        });
    }
    state.insert(rep, false);
    if let Some(bounds) = lower.get(&rep) {
        for &b in bounds {
            topo_visit(b, lower, state, order, pool)?;
        }
    }
    order.push(rep);
    state.insert(rep, true);
    Ok(())
}

impl<'a> TypeConstraints<'a> {
    /// Consume the gathered constraints and produce a type model,
    /// assigning a type variable to every collected term.
    pub fn finalize(mut self) -> TypeResult<TypeModel> {
        self.simplify_orderings();

        let mut min_width: FxHashMap<Term, u32> = FxHashMap::default();
        let mut lower: FxHashMap<Term, Vec<Term>> = FxHashMap::default();
        for &(lo, hi) in &self.ordering {
            match lo {
                WidthLo::Bits(w) => {
                    let entry = min_width.entry(hi).or_insert(0);
                    *entry = (*entry).max(w);
                }
                WidthLo::Term(t) => lower.entry(hi).or_default().push(t),
            }
        }

        let reps = self.sets.reps();
        let mut state = FxHashMap::default();
        let mut order = Vec::with_capacity(reps.len());
        for &r in &reps {
            topo_visit(r, &lower, &mut state, &mut order, self.pool)?;
        }

        let mut tyvars: FxHashMap<Term, TyVar> = FxHashMap::default();
        for (i, &r) in order.iter().enumerate() {
            tyvars.insert(r, TyVar::new(i));
        }

        let mut vars: PrimaryMap<TyVar, TyVarData> = PrimaryMap::new();
        for &r in &order {
            let constraint = self.constraint_of(r);
            let specific = self.specifics.get(&r).copied();
            if let Some(ty) = specific {
                if !constraint.meets(ty) {
                    return Err(TypeError::UnsatisfiedConstraint {
                        term: self.pool.display(r).to_string(),
                        ty,
                        con: constraint,
                    });
                }
            }
            let lower_bounds = lower
                .get(&r)
                .map(|ts| ts.iter().map(|t| tyvars[t]).collect())
                .unwrap_or_default();
            vars.push(TyVarData {
                constraint,
                specific,
                min_width: min_width.get(&r).copied().unwrap_or(0),
                lower_bounds,
                width_equal: None,
            });
        }

        // Resolve width equalities so each variable of a nontrivial class
        // points at the smallest ID in the class.
        let mut leader: Vec<usize> = (0..vars.len()).collect();
        fn resolve(leader: &[usize], mut i: usize) -> usize {
            while leader[i] != i {
                i = leader[i];
            }
            i
        }
        for &(a, b) in &self.width_equalities {
            let va = resolve(&leader, tyvars[&a].index());
            let vb = resolve(&leader, tyvars[&b].index());
            if va != vb {
                leader[va.max(vb)] = va.min(vb);
            }
        }
        for i in 0..vars.len() {
            let l = resolve(&leader, i);
            if l != i {
                vars[TyVar::new(i)].width_equal = Some(TyVar::new(l));
            }
        }

        let default_id = match self.default_rep {
            Some(r) => {
                let rep = self.sets.rep(r);
                tyvars[&rep]
            }
            None => vars.push(TyVarData {
                constraint: ConstraintClass::Int,
                specific: Some(PREDICATE_DEFAULT),
                min_width: 0,
                lower_bounds: SmallVec::new(),
                width_equal: None,
            }),
        };

        let mut context = FxHashMap::default();
        for &r in &order {
            let tyvar = tyvars[&r];
            for t in self.sets.subset(r) {
                context.insert(t, tyvar);
            }
        }

        debug!(
            "type model with {} variables, default {default_id}",
            vars.len()
        );
        Ok(TypeModel {
            vars,
            default_id,
            context,
        })
    }
}

impl TypeModel {
    /// Number of type variables.
    pub fn tyvars(&self) -> usize {
        self.vars.len()
    }

    /// The variable standing in for ambiguously typed predicate arguments.
    pub fn default_id(&self) -> TyVar {
        self.default_id
    }

    /// The variable assigned to `t`, if `t` was typed against this model.
    pub fn tyvar_of(&self, t: Term) -> Option<TyVar> {
        self.context.get(&t).copied()
    }

    pub(crate) fn context(&self) -> &FxHashMap<Term, TyVar> {
        &self.context
    }

    /// Concrete type of `t` under `vector`.
    ///
    /// Panics if `t` was never typed against this model; that is a
    /// programmer error, not a recoverable one.
    pub fn type_of(&self, vector: &TypeVector, t: Term) -> Type {
        let v = self
            .tyvar_of(t)
            .expect("term was never typed against this model");
        vector[v]
    }

    /// Are two variables constrained to the same width?
    pub fn width_equal_tyvars(&self, a: TyVar, b: TyVar) -> bool {
        let resolve = |v: TyVar| self.vars[v].width_equal.unwrap_or(v);
        resolve(a) == resolve(b)
    }

    /// Every variable transitively required to be narrower than `v`,
    /// excluding `v` itself.
    pub fn transitive_lower_bounds(&self, v: TyVar) -> Vec<TyVar> {
        let mut out = Vec::new();
        let mut stack: Vec<TyVar> = self.vars[v].lower_bounds.to_vec();
        while let Some(b) = stack.pop() {
            if !out.contains(&b) {
                out.push(b);
                stack.extend(self.vars[b].lower_bounds.iter().copied());
            }
        }
        out
    }

    /// Lazily enumerate every type vector consistent with this model, with
    /// integer widths drawn from `[1, int_limit)`. Each call restarts the
    /// enumeration from the beginning.
    pub fn type_vectors(&self, int_limit: u32) -> TypeVectors<'_> {
        TypeVectors {
            model: self,
            int_limit,
            vector: vec![Type::Int(1); self.vars.len()],
            stack: Vec::with_capacity(self.vars.len()),
            started: false,
            done: false,
        }
    }

    /// Type-check `term` against this model without introducing new type
    /// variables or strengthening any constraint, then record the new
    /// terms in the context.
    ///
    /// Arguments of predicates that end up with no associated variable are
    /// tied to the default variable.
    pub fn extend(&mut self, pool: &TermPool, term: Term) -> TypeResult<()> {
        let mut tc = TypeConstraints::extending(pool, self);
        tc.collect(term)?;

        let mut defaultable = Vec::new();
        for t in pool.subterms(term) {
            defaultable.extend(pool.defaultable_args(t));
        }
        for t in defaultable {
            let rep = tc.sets.rep(t);
            let mapped = tc.ext.as_ref().unwrap().rep_tyvar.contains_key(&rep);
            if !mapped {
                trace!("defaulting {}", pool.display(t));
                tc.default(t)?;
            }
        }

        tc.simplify_orderings();
        let ext = tc.ext.take().expect("extension state");

        for rep in tc.sets.reps() {
            let Some(&tyvar) = ext.rep_tyvar.get(&rep) else {
                return Err(TypeError::AmbiguousType {
                    term: pool.display(rep).to_string(),
                });
            };
            let model_con = self.vars[tyvar].constraint;
            let ext_con = tc.constraint_of(rep);
            if model_con.meet(ext_con) != Some(model_con) {
                return Err(TypeError::ConstraintsTooStrong {
                    term: pool.display(term).to_string(),
                });
            }
            if let Some(&ty) = tc.specifics.get(&rep) {
                match self.vars[tyvar].specific {
                    None => {
                        return Err(TypeError::ConstraintsTooStrong {
                            term: pool.display(term).to_string(),
                        })
                    }
                    Some(m) if m != ty => {
                        return Err(TypeError::IncompatibleTypes {
                            term: pool.display(rep).to_string(),
                            first: ty,
                            second: m,
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        for &(a, b) in &tc.width_equalities {
            if a == b {
                return Err(TypeError::ImproperlyUnified {
                    first: pool.display(a).to_string(),
                    second: pool.display(b).to_string(),
                });
            }
            if !self.width_equal_tyvars(ext.rep_tyvar[&a], ext.rep_tyvar[&b]) {
                return Err(TypeError::ConstraintsTooStrong {
                    term: pool.display(term).to_string(),
                });
            }
        }

        for &(lo, hi) in &tc.ordering {
            let v2 = ext.rep_tyvar[&hi];
            let implied = match lo {
                WidthLo::Bits(w) => {
                    w <= self.vars[v2].min_width
                        || self
                            .transitive_lower_bounds(v2)
                            .iter()
                            .any(|&v| w <= self.vars[v].min_width)
                        || self.vars[v2].specific.is_some_and(|ty| w < ty.bits())
                }
                WidthLo::Term(t) => {
                    let v1 = ext.rep_tyvar[&t];
                    self.transitive_lower_bounds(v2).contains(&v1)
                }
            };
            if !implied {
                return Err(TypeError::ConstraintsTooStrong {
                    term: pool.display(term).to_string(),
                });
            }
        }

        for rep in tc.sets.reps() {
            let tyvar = ext.rep_tyvar[&rep];
            for t in tc.sets.subset(rep) {
                let old = self.context.insert(t, tyvar);
                debug_assert!(
                    old.map_or(true, |o| o == tyvar),
                    "term re-typed against the model"
                );
            }
        }
        Ok(())
    }

    /// Check `term`'s constraints against one concrete `vector`. Returns an
    /// error naming the first violated rule.
    pub fn validate(&self, pool: &TermPool, term: Term, vector: &TypeVector) -> TypeResult<()> {
        let mut validator = Validator {
            pool,
            model: self,
            vector,
        };
        for t in pool.subterms(term) {
            type_constraints(pool, t, &mut validator)?;
        }
        Ok(())
    }
}

impl Index<TyVar> for TypeModel {
    type Output = TyVarData;

    fn index(&self, v: TyVar) -> &TyVarData {
        &self.vars[v]
    }
}

struct Frame {
    candidates: std::vec::IntoIter<Type>,
}

/// Iterator over the type vectors of a model, returned by
/// [`TypeModel::type_vectors`].
pub struct TypeVectors<'a> {
    model: &'a TypeModel,
    int_limit: u32,
    vector: Vec<Type>,
    stack: Vec<Frame>,
    started: bool,
    done: bool,
}

impl TypeVectors<'_> {
    fn floor(&self, v: TyVar) -> u32 {
        let data = &self.model.vars[v];
        let mut floor = data.min_width;
        for &b in &data.lower_bounds {
            floor = floor.max(self.vector[b.index()].bits());
        }
        floor
    }

    fn frame(&self, var: usize) -> Frame {
        let v = TyVar::new(var);
        let data = &self.model.vars[v];
        let floor = self.floor(v);
        let eq_bits = data.width_equal.map(|j| self.vector[j.index()].bits());
        let admit = |ty: Type| ty.bits() > floor && eq_bits.map_or(true, |b| ty.bits() == b);

        let candidates: Vec<Type> = if let Some(ty) = data.specific {
            if admit(ty) {
                vec![ty]
            } else {
                Vec::new()
            }
        } else {
            let ints = || int_widths(self.int_limit).into_iter().map(Type::Int);
            match data.constraint {
                ConstraintClass::Int => ints().filter(|&t| admit(t)).collect(),
                ConstraintClass::Bool => [Type::Int(1)]
                    .into_iter()
                    .filter(|&t| admit(t))
                    .collect(),
                ConstraintClass::Float => {
                    FLOAT_TYS.into_iter().filter(|&t| admit(t)).collect()
                }
                ConstraintClass::Ptr => {
                    [Type::Ptr].into_iter().filter(|&t| admit(t)).collect()
                }
                ConstraintClass::IntPtr => ints()
                    .chain([Type::Ptr])
                    .filter(|&t| admit(t))
                    .collect(),
                ConstraintClass::Number => ints()
                    .chain(FLOAT_TYS)
                    .filter(|&t| admit(t))
                    .collect(),
                ConstraintClass::FirstClass => ints()
                    .chain([Type::Ptr])
                    .chain(FLOAT_TYS)
                    .filter(|&t| admit(t))
                    .collect(),
            }
        };
        Frame {
            candidates: candidates.into_iter(),
        }
    }
}

impl Iterator for TypeVectors<'_> {
    type Item = TypeVector;

    fn next(&mut self) -> Option<TypeVector> {
        if self.done {
            return None;
        }
        let n = self.model.tyvars();
        if !self.started {
            self.started = true;
            if n == 0 {
                self.done = true;
                return Some(TypeVector { types: Vec::new() });
            }
            let f = self.frame(0);
            self.stack.push(f);
        }
        loop {
            let depth = self.stack.len();
            let Some(frame) = self.stack.last_mut() else {
                self.done = true;
                return None;
            };
            match frame.candidates.next() {
                None => {
                    self.stack.pop();
                }
                Some(ty) => {
                    self.vector[depth - 1] = ty;
                    if depth == n {
                        return Some(TypeVector {
                            types: self.vector.clone(),
                        });
                    }
                    let f = self.frame(depth);
                    self.stack.push(f);
                }
            }
        }
    }
}

struct Validator<'a> {
    pool: &'a TermPool,
    model: &'a TypeModel,
    vector: &'a TypeVector,
}

impl Validator<'_> {
    fn ty(&self, t: Term) -> TypeResult<Type> {
        match self.model.tyvar_of(t) {
            Some(v) => Ok(self.vector[v]),
            None => Err(TypeError::AmbiguousType {
                term: self.pool.display(t).to_string(),
            }),
        }
    }

    fn mismatch(&self, t: Term, detail: String) -> TypeError {
        TypeError::Mismatch {
            term: self.pool.display(t).to_string(),
            detail,
        }
    }
}

impl TypeVisitor for Validator<'_> {
    fn eq_types(&mut self, terms: &[Term]) -> TypeResult<()> {
        let Some((&first, rest)) = terms.split_first() else {
            return Ok(());
        };
        let ty = self.ty(first)?;
        for &t in rest {
            let other = self.ty(t)?;
            if other != ty {
                return Err(self.mismatch(t, format!("{other} is not {ty}")));
            }
        }
        Ok(())
    }

    fn specific(&mut self, term: Term, ty: Type) -> TypeResult<()> {
        let actual = self.ty(term)?;
        if actual != ty {
            return Err(self.mismatch(term, format!("{actual} is not {ty}")));
        }
        Ok(())
    }

    fn constrain(&mut self, term: Term, con: ConstraintClass) -> TypeResult<()> {
        let ty = self.ty(term)?;
        if !con.meets(ty) {
            return Err(self.mismatch(term, format!("{ty} is not {con}")));
        }
        Ok(())
    }

    fn width_order(&mut self, lo: WidthLo, hi: Term) -> TypeResult<()> {
        let hi_ty = self.ty(hi)?;
        match lo {
            WidthLo::Bits(w) => {
                if hi_ty.bits() <= w {
                    return Err(self.mismatch(hi, format!("{hi_ty} is not wider than {w} bits")));
                }
            }
            WidthLo::Term(t) => {
                let lo_ty = self.ty(t)?;
                if lo_ty.partial_cmp(&hi_ty) != Some(core::cmp::Ordering::Less) {
                    return Err(self.mismatch(hi, format!("{lo_ty} is not below {hi_ty}")));
                }
            }
        }
        Ok(())
    }

    fn width_equal(&mut self, a: Term, b: Term) -> TypeResult<()> {
        let ta = self.ty(a)?;
        let tb = self.ty(b)?;
        if ta.bits() != tb.bits() {
            return Err(self.mismatch(b, format!("{ta} and {tb} differ in width")));
        }
        Ok(())
    }

    fn default(&mut self, term: Term) -> TypeResult<()> {
        let ty = self.ty(term)?;
        let def = self.vector[self.model.default_id];
        if ty != def {
            return Err(self.mismatch(term, format!("{ty} is not the default {def}")));
        }
        Ok(())
    }
}
