//! Shared tunables for type enumeration and refinement checking.

/// Knobs shared by the enumerator and the refinement checker.
///
/// `int_limit` is an exclusive upper bound: with the default of 65, integer
/// widths 1 through 64 are enumerated. `poison_undef` controls whether a
/// poisoned source discharges the target's definedness obligation; it is a
/// policy choice, not a correctness one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Exclusive upper bound on enumerated integer widths.
    pub int_limit: u32,
    /// When true, source poison implies no undefined-behavior obligation on
    /// the target.
    pub poison_undef: bool,
}

impl Settings {
    /// Create settings with the default limits.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            int_limit: 65,
            poison_undef: true,
        }
    }
}
