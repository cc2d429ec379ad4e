//! Refinement checking for peephole rewrites over a typed IR.
//!
//! A candidate rewrite pairs a *source* term with a *target* term and an
//! optional precondition. The target is a correct replacement when it
//! *refines* the source: wherever the source is defined the target is
//! defined, and wherever the source is also poison-free the two agree in
//! value. Because the IR is width-polymorphic, that question has to hold
//! at every concrete typing the rewrite admits, and most of this crate is
//! the machinery that makes "every concrete typing" tractable:
//!
//! - [`ir`] defines the term DAG: entity-referenced nodes for inputs,
//!   literals, instructions, constant expressions, and predicates.
//! - [`constraints`] gathers each term's typing rules into a union-find of
//!   constraint classes, width orderings, and width equalities.
//! - [`model`] finalizes the gathered constraints into an immutable type
//!   model and lazily enumerates the concrete type vectors it admits.
//! - [`smt`] translates a term under one type vector into solver
//!   expressions, tracking definedness, poison, and `undef` quantifiers,
//!   and defines the backend contract a concrete solver binding fulfills.
//! - [`refine`] asks the three refinement queries per type vector and
//!   packages counterexamples into printable reports.
//!
//! Parsing, pretty-printing, command-line handling, and the binding to an
//! actual SMT process all live with the driver, not here.

#![warn(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

pub mod constraints;
pub mod disjoint;
mod fx;
pub mod ir;
pub mod model;
pub mod refine;
pub mod result;
pub mod settings;
pub mod smt;

pub use crate::refine::{check_refinement, check_refinement_at, interp, Cause, RefinementError};
pub use crate::result::{Error, TypeError, TypeResult};
pub use crate::settings::Settings;
