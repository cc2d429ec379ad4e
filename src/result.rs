//! Result and error types for typing and refinement checking.
//!
//! Typing failures abort the current rewrite but are recoverable by the
//! driver, which may simply skip it. A refinement counterexample is not an
//! error at all; it is the ordinary return value of the checker. The only
//! failure the checker itself can produce is a solver that gives up, which
//! is reported distinctly so a driver never mistakes "unknown" for
//! "verified".

use crate::constraints::ConstraintClass;
use crate::ir::Type;
use thiserror::Error;

/// A typing error or inconsistency discovered while gathering constraints,
/// building a type model, or validating a term against a type vector.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TypeError {
    /// Two different concrete types were pinned to the same unification set.
    #[error("Incompatible types for {term}: {first} and {second}")]
    IncompatibleTypes {
        /// Offending term.
        term: String,
        /// The type being pinned.
        first: Type,
        /// The type already pinned.
        second: Type,
    },

    /// Two constraint classes with an empty meet were applied to one set.
    #[error("Incompatible constraints for {term}: {first} and {second}")]
    IncompatibleConstraints {
        /// Offending term.
        term: String,
        /// The constraint being applied.
        first: ConstraintClass,
        /// The constraint already in force.
        second: ConstraintClass,
    },

    /// A pinned type does not satisfy the constraint class of its set.
    #[error("Incompatible constraints for {term}: {ty} is not {con}")]
    UnsatisfiedConstraint {
        /// Offending term.
        term: String,
        /// The pinned type.
        ty: Type,
        /// The constraint it fails.
        con: ConstraintClass,
    },

    /// The width ordering contains a cycle.
    #[error("Incompatible constraints for {term}: circular ordering")]
    CircularOrdering {
        /// A term on the cycle.
        term: String,
    },

    /// A term in a model extension could not be tied to any type variable.
    #[error("Ambiguous type for {term}")]
    AmbiguousType {
        /// Offending term.
        term: String,
    },

    /// A model extension constrains a type variable more than the model does.
    #[error("Constraints too strong for {term}")]
    ConstraintsTooStrong {
        /// The extending term.
        term: String,
    },

    /// A width equality relates a set to itself.
    #[error("Improperly unified {first} and {second}")]
    ImproperlyUnified {
        /// First term of the pair.
        first: String,
        /// Second term of the pair.
        second: String,
    },

    /// A model extension tried to merge two sets carrying distinct type
    /// variables.
    #[error("Cannot unify types for {first} and {second}")]
    CannotUnify {
        /// Surviving representative.
        first: String,
        /// Absorbed representative.
        second: String,
    },

    /// A term's constraints do not hold under a concrete type vector.
    #[error("Type mismatch for {term}: {detail}")]
    Mismatch {
        /// Offending term.
        term: String,
        /// What failed.
        detail: String,
    },
}

/// Result of a typing operation.
pub type TypeResult<T> = Result<T, TypeError>;

/// Any failure of the refinement checker itself.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// The rewrite does not type-check.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// The solver answered `unknown`; the rewrite is neither verified nor
    /// refuted.
    #[error("solver returned unknown for the {query} query")]
    SolverUnknown {
        /// Which of the three refinement queries gave up.
        query: &'static str,
    },

    /// No concrete type assignment satisfies the gathered constraints.
    #[error("no concrete typing for {term}")]
    NoTyping {
        /// The term that was being typed.
        term: String,
    },
}
