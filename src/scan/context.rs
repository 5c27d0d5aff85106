//! Per-call scan context and kernel dispatch

use std::ops::{BitAnd, BitOr, BitOrAssign};

use tracing::trace;

use super::backends;
use super::sig::SigByte;

/// Required divisor of candidate start addresses
///
/// `X1` considers every byte a candidate start; `X16` only addresses whose
/// numeric value is a multiple of 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAlign {
    X1 = 1,
    X16 = 16,
}

impl ScanAlign {
    /// The stride between candidate start addresses
    pub const fn stride(self) -> usize {
        self as usize
    }
}

/// Advisory flags carrying domain knowledge about the scanned bytes
///
/// Hints never change which match is produced; they only let the dispatcher
/// prefer an equivalent kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanHints(u64);

impl ScanHints {
    /// No domain knowledge
    pub const NONE: Self = Self(0);
    /// The scanned bytes are x86-64 machine code
    pub const X86_64_CODE: Self = Self(1 << 0);

    /// Whether every flag in `other` is set in `self`
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ScanHints {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ScanHints {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ScanHints {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// A scan kernel: searches `[begin, end)` for the first candidate position
/// matching the context's signature, or null
///
/// # Safety
/// `[begin, end)` must be readable, `begin <= end`, and the context's
/// signature must fit the range
pub(crate) type ScanFn = unsafe fn(*const u8, *const u8, &ScanContext<'_>) -> *const u8;

/// Everything a kernel needs, resolved once per scan call
///
/// Trivially copyable, allocation-free, read-only after construction. The
/// signature view is the truncated form: the first element is concrete.
#[derive(Clone, Copy)]
pub(crate) struct ScanContext<'a> {
    /// truncated signature, concrete first element
    pub(crate) sig: &'a [SigByte],
    /// the byte every candidate must start with
    pub(crate) first: u8,
    pub(crate) scanner: ScanFn,
    pub(crate) alignment: ScanAlign,
    /// kernel vector width in bytes, 0 for scalar
    pub(crate) vector_width: usize,
    pub(crate) hints: ScanHints,
}

impl<'a> ScanContext<'a> {
    /// Select a kernel for the current CPU and wrap it with the signature
    ///
    /// `sig` must be truncated: callers go through [`super::sig::truncate`]
    /// first.
    pub(crate) fn create(sig: &'a [SigByte], alignment: ScanAlign, hints: ScanHints) -> Self {
        debug_assert!(
            matches!(sig.first(), Some(Some(_))),
            "scan context requires a truncated signature"
        );

        let first = match sig.first() {
            Some(&Some(byte)) => byte,
            // unreachable for signatures upholding the parser invariants;
            // a zero first byte degrades to a miss, never to unsoundness
            _ => 0,
        };

        let (scanner, vector_width) = backends::resolve(alignment);

        let mut ctx = Self {
            sig,
            first,
            scanner,
            alignment,
            vector_width,
            hints,
        };

        ctx.apply_hints();

        trace!(
            len = ctx.sig.len(),
            vector_width = ctx.vector_width,
            stride = ctx.alignment.stride(),
            "scan context created"
        );

        ctx
    }

    /// Run the selected kernel over `[begin, end)`
    ///
    /// # Safety
    /// `[begin, end)` must be readable, `begin <= end`, and the signature must
    /// fit the range
    pub(crate) unsafe fn scan(&self, begin: *const u8, end: *const u8) -> *const u8 {
        // SAFETY: caller upholds the kernel contract
        unsafe { (self.scanner)(begin, end, self) }
    }

    /// Adjust the kernel choice based on hints
    ///
    /// Hints are advisory: the machine-code hint currently changes nothing,
    /// and no hint may ever select a kernel the CPU does not support.
    fn apply_hints(&mut self) {
        if self.hints.contains(ScanHints::X86_64_CODE) {
            trace!("x86-64 machine code hint set");
        }
    }
}
