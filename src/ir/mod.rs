//! Intermediate representation of rewrite terms.
//!
//! A rewrite is a pair of expression DAGs (source and target) plus an
//! optional precondition predicate. Terms are not implemented as Rust
//! references; every term is a `u32` entity reference into a [`TermPool`],
//! so sharing a subterm is just repeating its reference and identity is
//! index equality. A pool holds exactly one rewrite; reusing a term across
//! pools (or re-typing one against two models) is not supported.
//!
//! Variants are grouped by format rather than one variant per opcode: all
//! thirteen integer binaries share [`TermData::Binary`] and differ only in
//! their [`BinaryOp`]. Constant-expression analogues get their own formats
//! because they contribute neither definedness nor poison conditions when
//! translated.

mod condcodes;
mod types;

pub use self::condcodes::IntCC;
pub use self::types::{Type, POINTER_WIDTH};

use crate::fx::FxHashSet;
use core::fmt;
use cranelift_entity::{entity_impl, PrimaryMap};
use smallvec::SmallVec;

/// An opaque reference to a term in a [`TermPool`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Term(u32);
entity_impl!(Term, "t");

/// A small list of term references.
pub type TermList = SmallVec<[Term; 2]>;

/// An integer binary opcode, shared by instructions and constant
/// expressions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Wrapping addition.
    Add,
    /// Wrapping subtraction.
    Sub,
    /// Wrapping multiplication.
    Mul,
    /// Signed division.
    Sdiv,
    /// Unsigned division.
    Udiv,
    /// Signed remainder.
    Srem,
    /// Unsigned remainder.
    Urem,
    /// Shift left.
    Shl,
    /// Arithmetic shift right.
    Ashr,
    /// Logical shift right.
    Lshr,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
}

impl BinaryOp {
    /// Textual opcode name.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Sdiv => "sdiv",
            Self::Udiv => "udiv",
            Self::Srem => "srem",
            Self::Urem => "urem",
            Self::Shl => "shl",
            Self::Ashr => "ashr",
            Self::Lshr => "lshr",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
        }
    }
}

/// A floating-point binary opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FloatOp {
    /// Addition.
    Fadd,
    /// Subtraction.
    Fsub,
    /// Multiplication.
    Fmul,
    /// Division.
    Fdiv,
    /// Remainder.
    Frem,
}

impl FloatOp {
    /// Textual opcode name.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Fadd => "fadd",
            Self::Fsub => "fsub",
            Self::Fmul => "fmul",
            Self::Fdiv => "fdiv",
            Self::Frem => "frem",
        }
    }
}

/// A width-changing conversion opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConvOp {
    /// Sign extension to a strictly wider type.
    Sext,
    /// Zero extension to a strictly wider type.
    Zext,
    /// Truncation to a strictly narrower type.
    Trunc,
    /// Zero extension or truncation, identity when the widths match.
    ZextOrTrunc,
}

impl ConvOp {
    /// Textual opcode name.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Sext => "sext",
            Self::Zext => "zext",
            Self::Trunc => "trunc",
            Self::ZextOrTrunc => "zext_or_trunc",
        }
    }
}

/// A unary constant-expression opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryCnxpOp {
    /// Bitwise complement.
    Not,
    /// Two's-complement negation.
    Neg,
    /// Absolute value.
    Abs,
}

impl UnaryCnxpOp {
    /// Textual opcode name.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Not => "not",
            Self::Neg => "neg",
            Self::Abs => "abs",
        }
    }
}

/// A constant-expression function opcode.
///
/// The first three are symbolic bit analyses: they concretize to *some*
/// sound approximation of the known bits of their argument, not to a unique
/// value. The rest are ordinary functions of their arguments and types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FunCnxpOp {
    /// A lower bound on the number of leading sign bits.
    SignBits,
    /// A mask of bits known to be one.
    OneBits,
    /// A mask of bits known to be zero.
    ZeroBits,
    /// Count of leading zero bits.
    LeadingZeros,
    /// Count of trailing zero bits.
    TrailingZeros,
    /// Floor of the base-2 logarithm.
    Log2,
    /// Logical shift right as a two-argument function.
    LshrFun,
    /// Signed maximum.
    Smax,
    /// Unsigned maximum.
    Umax,
    /// Sign extension.
    Sext,
    /// Zero extension.
    Zext,
    /// Truncation.
    Trunc,
    /// Bit width of the argument's type.
    Width,
}

impl FunCnxpOp {
    /// Textual function name.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::SignBits => "sign_bits",
            Self::OneBits => "one_bits",
            Self::ZeroBits => "zero_bits",
            Self::LeadingZeros => "ctlz",
            Self::TrailingZeros => "cttz",
            Self::Log2 => "log2",
            Self::LshrFun => "lshr",
            Self::Smax => "smax",
            Self::Umax => "umax",
            Self::Sext => "sext",
            Self::Zext => "zext",
            Self::Trunc => "trunc",
            Self::Width => "width",
        }
    }
}

/// An analysis predicate opcode.
///
/// Most of these are must-analyses: translated on non-constant arguments,
/// they may answer `false` even when the property holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PredOp {
    /// The argument is the minimum signed value of its width.
    IntMin,
    /// The argument is a power of two.
    Power2,
    /// The argument is a power of two or zero.
    Power2OrZ,
    /// The argument is a contiguous run of ones, possibly shifted.
    ShiftedMask,
    /// The two arguments share no set bits.
    MaskZero,
    /// Signed addition does not overflow.
    NswAdd,
    /// Unsigned addition does not overflow.
    NuwAdd,
    /// Signed subtraction does not overflow.
    NswSub,
    /// Unsigned subtraction does not wrap.
    NuwSub,
    /// Signed multiplication does not overflow.
    NswMul,
    /// Unsigned multiplication does not overflow.
    NuwMul,
    /// Shift left does not discard set bits.
    NuwShl,
    /// The argument has a single use. Always true here.
    OneUse,
}

impl PredOp {
    /// Textual predicate name.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::IntMin => "int_min",
            Self::Power2 => "power2",
            Self::Power2OrZ => "power2_or_zero",
            Self::ShiftedMask => "shifted_mask",
            Self::MaskZero => "mask_zero",
            Self::NswAdd => "nsw_add",
            Self::NuwAdd => "nuw_add",
            Self::NswSub => "nsw_sub",
            Self::NuwSub => "nuw_sub",
            Self::NswMul => "nsw_mul",
            Self::NuwMul => "nuw_mul",
            Self::NuwShl => "nuw_shl",
            Self::OneUse => "one_use",
        }
    }
}

const FLAG_NSW: u8 = 1;
const FLAG_NUW: u8 = 1 << 1;
const FLAG_EXACT: u8 = 1 << 2;
const FLAG_NNAN: u8 = 1 << 3;
const FLAG_NINF: u8 = 1 << 4;

/// Instruction flags.
///
/// Arithmetic flags (`nsw`, `nuw`, `exact`) make the result poison when
/// their condition is violated; fast-math flags (`nnan`, `ninf`) make the
/// instruction undefined.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags {
    bits: u8,
}

impl Flags {
    /// No flags set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Is "no signed wrap" set?
    pub fn nsw(self) -> bool {
        self.bits & FLAG_NSW != 0
    }

    /// Is "no unsigned wrap" set?
    pub fn nuw(self) -> bool {
        self.bits & FLAG_NUW != 0
    }

    /// Is "exact" set?
    pub fn exact(self) -> bool {
        self.bits & FLAG_EXACT != 0
    }

    /// Is "no NaNs" set?
    pub fn nnan(self) -> bool {
        self.bits & FLAG_NNAN != 0
    }

    /// Is "no infinities" set?
    pub fn ninf(self) -> bool {
        self.bits & FLAG_NINF != 0
    }

    /// Set "no signed wrap".
    pub fn with_nsw(mut self) -> Self {
        self.bits |= FLAG_NSW;
        self
    }

    /// Set "no unsigned wrap".
    pub fn with_nuw(mut self) -> Self {
        self.bits |= FLAG_NUW;
        self
    }

    /// Set "exact".
    pub fn with_exact(mut self) -> Self {
        self.bits |= FLAG_EXACT;
        self
    }

    /// Set "no NaNs".
    pub fn with_nnan(mut self) -> Self {
        self.bits |= FLAG_NNAN;
        self
    }

    /// Set "no infinities".
    pub fn with_ninf(mut self) -> Self {
        self.bits |= FLAG_NINF;
        self
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut any = false;
        for (set, name) in [
            (self.nsw(), "nsw"),
            (self.nuw(), "nuw"),
            (self.exact(), "exact"),
            (self.nnan(), "nnan"),
            (self.ninf(), "ninf"),
        ] {
            if set {
                if any {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                any = true;
            }
        }
        if !any {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Contents of a term.
#[derive(Clone, Debug, PartialEq)]
pub enum TermData {
    /// A named free variable of the rewrite. Names beginning with `C`
    /// denote symbolic constants.
    Input {
        /// Source-level name.
        name: String,
    },
    /// An integer literal.
    Literal {
        /// The value; it narrows to the concrete width by truncation.
        value: i64,
    },
    /// A floating-point literal.
    FLiteral {
        /// The value, held at double precision.
        value: f64,
    },
    /// The undefined value: each translation picks it fresh.
    Undef,
    /// An integer binary instruction.
    Binary {
        /// Opcode.
        op: BinaryOp,
        /// Poison flags.
        flags: Flags,
        /// Operands.
        args: [Term; 2],
    },
    /// A floating-point binary instruction.
    FloatBinary {
        /// Opcode.
        op: FloatOp,
        /// Fast-math flags.
        flags: Flags,
        /// Operands.
        args: [Term; 2],
    },
    /// A width conversion instruction.
    Conversion {
        /// Opcode.
        op: ConvOp,
        /// Operand.
        arg: Term,
    },
    /// An integer comparison instruction producing an `i1`.
    Icmp {
        /// Condition code.
        cond: IntCC,
        /// Operands.
        args: [Term; 2],
    },
    /// A two-way select on an `i1` condition.
    Select {
        /// Condition operand.
        cond: Term,
        /// The two arms.
        args: [Term; 2],
    },
    /// A binary constant expression; same value semantics as [`Binary`]
    /// but never undefined and never poison.
    ///
    /// [`Binary`]: TermData::Binary
    BinaryCnxp {
        /// Opcode.
        op: BinaryOp,
        /// Operands.
        args: [Term; 2],
    },
    /// A unary constant expression.
    UnaryCnxp {
        /// Opcode.
        op: UnaryCnxpOp,
        /// Operand.
        arg: Term,
    },
    /// A constant-expression function application.
    FunCnxp {
        /// Function.
        op: FunCnxpOp,
        /// Arguments.
        args: TermList,
    },
    /// Conjunction of predicates.
    AndPred {
        /// The conjuncts.
        clauses: TermList,
    },
    /// Disjunction of predicates.
    OrPred {
        /// The disjuncts.
        clauses: TermList,
    },
    /// Negation of a predicate.
    NotPred {
        /// The negated predicate.
        pred: Term,
    },
    /// A comparison predicate over values; unlike [`Icmp`] it is a
    /// proposition, not an `i1` value.
    ///
    /// [`Icmp`]: TermData::Icmp
    Comparison {
        /// Condition code.
        cond: IntCC,
        /// Operands.
        args: [Term; 2],
    },
    /// An analysis predicate application.
    FunPred {
        /// Predicate.
        op: PredOp,
        /// Arguments.
        args: TermList,
    },
}

impl TermData {
    /// Direct children of this term, in argument order.
    pub fn children(&self) -> TermList {
        match self {
            Self::Input { .. } | Self::Literal { .. } | Self::FLiteral { .. } | Self::Undef => {
                TermList::new()
            }
            Self::Binary { args, .. }
            | Self::FloatBinary { args, .. }
            | Self::Icmp { args, .. }
            | Self::BinaryCnxp { args, .. }
            | Self::Comparison { args, .. } => TermList::from_slice(args),
            Self::Conversion { arg, .. } | Self::UnaryCnxp { arg, .. } => {
                TermList::from_slice(&[*arg])
            }
            Self::Select { cond, args } => TermList::from_slice(&[*cond, args[0], args[1]]),
            Self::FunCnxp { args, .. } | Self::FunPred { args, .. } => args.clone(),
            Self::AndPred { clauses } | Self::OrPred { clauses } => clauses.clone(),
            Self::NotPred { pred } => TermList::from_slice(&[*pred]),
        }
    }
}

/// The arena holding every term of one rewrite.
#[derive(Clone, Default)]
pub struct TermPool {
    terms: PrimaryMap<Term, TermData>,
}

impl TermPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of terms in the pool.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Is the pool empty?
    pub fn is_empty(&self) -> bool {
        self.terms.len() == 0
    }

    /// Insert a term and return its reference.
    pub fn make(&mut self, data: TermData) -> Term {
        self.terms.push(data)
    }

    /// Create an input with the given source-level name.
    pub fn input(&mut self, name: &str) -> Term {
        self.make(TermData::Input {
            name: name.to_string(),
        })
    }

    /// Create an integer literal.
    pub fn literal(&mut self, value: i64) -> Term {
        self.make(TermData::Literal { value })
    }

    /// Create a floating-point literal.
    pub fn fliteral(&mut self, value: f64) -> Term {
        self.make(TermData::FLiteral { value })
    }

    /// Create an undefined value.
    pub fn undef(&mut self) -> Term {
        self.make(TermData::Undef)
    }

    /// Create an integer binary instruction.
    pub fn binary(&mut self, op: BinaryOp, flags: Flags, x: Term, y: Term) -> Term {
        self.make(TermData::Binary {
            op,
            flags,
            args: [x, y],
        })
    }

    /// Create a floating-point binary instruction.
    pub fn float_binary(&mut self, op: FloatOp, flags: Flags, x: Term, y: Term) -> Term {
        self.make(TermData::FloatBinary {
            op,
            flags,
            args: [x, y],
        })
    }

    /// Create a conversion instruction.
    pub fn conversion(&mut self, op: ConvOp, arg: Term) -> Term {
        self.make(TermData::Conversion { op, arg })
    }

    /// Create an integer comparison instruction.
    pub fn icmp(&mut self, cond: IntCC, x: Term, y: Term) -> Term {
        self.make(TermData::Icmp { cond, args: [x, y] })
    }

    /// Create a select instruction.
    pub fn select(&mut self, cond: Term, x: Term, y: Term) -> Term {
        self.make(TermData::Select { cond, args: [x, y] })
    }

    /// Create a binary constant expression.
    pub fn binary_cnxp(&mut self, op: BinaryOp, x: Term, y: Term) -> Term {
        self.make(TermData::BinaryCnxp { op, args: [x, y] })
    }

    /// Create a unary constant expression.
    pub fn unary_cnxp(&mut self, op: UnaryCnxpOp, arg: Term) -> Term {
        self.make(TermData::UnaryCnxp { op, arg })
    }

    /// Create a constant-expression function application.
    pub fn fun_cnxp(&mut self, op: FunCnxpOp, args: &[Term]) -> Term {
        self.make(TermData::FunCnxp {
            op,
            args: TermList::from_slice(args),
        })
    }

    /// Create a conjunction of predicates.
    pub fn and_pred(&mut self, clauses: &[Term]) -> Term {
        self.make(TermData::AndPred {
            clauses: TermList::from_slice(clauses),
        })
    }

    /// Create a disjunction of predicates.
    pub fn or_pred(&mut self, clauses: &[Term]) -> Term {
        self.make(TermData::OrPred {
            clauses: TermList::from_slice(clauses),
        })
    }

    /// Create a negated predicate.
    pub fn not_pred(&mut self, pred: Term) -> Term {
        self.make(TermData::NotPred { pred })
    }

    /// Create a comparison predicate.
    pub fn comparison(&mut self, cond: IntCC, x: Term, y: Term) -> Term {
        self.make(TermData::Comparison { cond, args: [x, y] })
    }

    /// Create an analysis predicate application.
    pub fn fun_pred(&mut self, op: PredOp, args: &[Term]) -> Term {
        self.make(TermData::FunPred {
            op,
            args: TermList::from_slice(args),
        })
    }

    /// Depth-first iteration over `root` and every term reachable from it.
    /// Shared subterms are yielded once.
    pub fn subterms(&self, root: Term) -> Subterms<'_> {
        Subterms::new(self, root, FxHashSet::default())
    }

    /// Like [`subterms`], but terms already in `seen` are skipped. The
    /// (possibly grown) set can be recovered with [`Subterms::into_seen`].
    ///
    /// [`subterms`]: TermPool::subterms
    pub fn subterms_with_seen(&self, root: Term, seen: FxHashSet<Term>) -> Subterms<'_> {
        Subterms::new(self, root, seen)
    }

    /// Is this term a symbolic constant for the purposes of must-analysis?
    ///
    /// Constant expressions and literals qualify, as does an input whose
    /// name begins with `C`.
    pub fn is_constant(&self, t: Term) -> bool {
        match &self.terms[t] {
            TermData::Literal { .. }
            | TermData::FLiteral { .. }
            | TermData::BinaryCnxp { .. }
            | TermData::UnaryCnxp { .. }
            | TermData::FunCnxp { .. } => true,
            TermData::Input { name } => name.starts_with('C'),
            _ => false,
        }
    }

    /// Value arguments of a predicate term whose types may fall back to the
    /// default when nothing else constrains them. Empty for non-predicates.
    pub fn defaultable_args(&self, t: Term) -> TermList {
        match &self.terms[t] {
            TermData::Comparison { args, .. } => TermList::from_slice(args),
            TermData::FunPred { args, .. } => args.clone(),
            _ => TermList::new(),
        }
    }

    /// A printable handle for error messages and logs: the source-level
    /// name for inputs, otherwise the opcode and entity number.
    pub fn display(&self, t: Term) -> DisplayTerm<'_> {
        DisplayTerm { pool: self, term: t }
    }
}

impl core::ops::Index<Term> for TermPool {
    type Output = TermData;

    fn index(&self, t: Term) -> &TermData {
        &self.terms[t]
    }
}

/// Iterator returned by [`TermPool::subterms`].
pub struct Subterms<'a> {
    pool: &'a TermPool,
    stack: Vec<Term>,
    seen: FxHashSet<Term>,
}

impl<'a> Subterms<'a> {
    fn new(pool: &'a TermPool, root: Term, seen: FxHashSet<Term>) -> Self {
        Self {
            pool,
            stack: vec![root],
            seen,
        }
    }

    /// Recover the seen set, for chaining traversals over shared terms.
    pub fn into_seen(self) -> FxHashSet<Term> {
        self.seen
    }
}

impl Iterator for Subterms<'_> {
    type Item = Term;

    fn next(&mut self) -> Option<Term> {
        while let Some(t) = self.stack.pop() {
            if self.seen.insert(t) {
                let children = self.pool[t].children();
                self.stack.extend(children.iter().rev().copied());
                return Some(t);
            }
        }
        None
    }
}

/// Display handle returned by [`TermPool::display`].
pub struct DisplayTerm<'a> {
    pool: &'a TermPool,
    term: Term,
}

impl fmt::Display for DisplayTerm<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.pool[self.term] {
            TermData::Input { name } => f.write_str(name),
            TermData::Literal { value } => write!(f, "{value}"),
            TermData::FLiteral { value } => write!(f, "{value}"),
            TermData::Undef => f.write_str("undef"),
            TermData::Binary { op, .. } | TermData::BinaryCnxp { op, .. } => {
                write!(f, "{} {}", self.term, op.mnemonic())
            }
            TermData::FloatBinary { op, .. } => write!(f, "{} {}", self.term, op.mnemonic()),
            TermData::Conversion { op, .. } => write!(f, "{} {}", self.term, op.mnemonic()),
            TermData::Icmp { cond, .. } => write!(f, "{} icmp {cond}", self.term),
            TermData::Select { .. } => write!(f, "{} select", self.term),
            TermData::UnaryCnxp { op, .. } => write!(f, "{} {}", self.term, op.mnemonic()),
            TermData::FunCnxp { op, .. } => write!(f, "{} {}", self.term, op.mnemonic()),
            TermData::AndPred { .. } => write!(f, "{} and", self.term),
            TermData::OrPred { .. } => write!(f, "{} or", self.term),
            TermData::NotPred { .. } => write!(f, "{} not", self.term),
            TermData::Comparison { cond, .. } => write!(f, "{} cmp {cond}", self.term),
            TermData::FunPred { op, .. } => write!(f, "{} {}", self.term, op.mnemonic()),
        }
    }
}
