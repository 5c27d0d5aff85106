//! Scan kernel family and run-time dispatch
//!
//! One kernel exists per (CPU feature set, alignment) pair. Dispatch happens
//! once per scan call, never per candidate; the widest ISA the CPU supports
//! wins. Feature detection goes through [`std::arch::is_x86_feature_detected`],
//! which caches its answer process-wide after the first query.

#[cfg(target_arch = "x86_64")]
mod avx2;
#[cfg(target_arch = "x86_64")]
mod avx512;
pub(crate) mod scalar;
#[cfg(target_arch = "x86_64")]
mod sse41;

use std::slice;

use super::context::{ScanAlign, ScanContext, ScanFn};
use super::sig::SigByte;

/// Which search routine family a context runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanMode {
    /// byte-find on the first signature byte, then a wildcard-aware tail
    /// compare; the fallback for every CPU and for SIMD head/tail fragments
    FastFirst,
    #[cfg(target_arch = "x86_64")]
    Sse41,
    #[cfg(target_arch = "x86_64")]
    Avx2,
    #[cfg(target_arch = "x86_64")]
    Avx512,
}

/// Pick the widest kernel the current CPU supports
pub(crate) fn resolve(alignment: ScanAlign) -> (ScanFn, usize) {
    kernel_for(detect_mode(), alignment)
}

fn detect_mode() -> ScanMode {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512bw") {
            return ScanMode::Avx512;
        }

        if is_x86_feature_detected!("avx2") {
            return ScanMode::Avx2;
        }

        if is_x86_feature_detected!("sse4.1") {
            return ScanMode::Sse41;
        }
    }

    ScanMode::FastFirst
}

/// The kernel and vector width for a (mode, alignment) pair
pub(crate) fn kernel_for(mode: ScanMode, alignment: ScanAlign) -> (ScanFn, usize) {
    match (mode, alignment) {
        (ScanMode::FastFirst, ScanAlign::X1) => (scalar::find_x1 as ScanFn, 0),
        (ScanMode::FastFirst, ScanAlign::X16) => (scalar::find_x16 as ScanFn, 0),
        #[cfg(target_arch = "x86_64")]
        (ScanMode::Sse41, ScanAlign::X1) => (sse41::find_x1 as ScanFn, 16),
        #[cfg(target_arch = "x86_64")]
        (ScanMode::Sse41, ScanAlign::X16) => (sse41::find_x16 as ScanFn, 16),
        #[cfg(target_arch = "x86_64")]
        (ScanMode::Avx2, ScanAlign::X1) => (avx2::find_x1 as ScanFn, 32),
        #[cfg(target_arch = "x86_64")]
        (ScanMode::Avx2, ScanAlign::X16) => (avx2::find_x16 as ScanFn, 32),
        #[cfg(target_arch = "x86_64")]
        (ScanMode::Avx512, ScanAlign::X1) => (avx512::find_x1 as ScanFn, 64),
        #[cfg(target_arch = "x86_64")]
        (ScanMode::Avx512, ScanAlign::X16) => (avx512::find_x16 as ScanFn, 64),
    }
}

/// View a raw range as a slice for the duration of a kernel call
///
/// # Safety
/// `[begin, end)` must be readable and `begin <= end`
pub(crate) unsafe fn raw_range<'a>(begin: *const u8, end: *const u8) -> &'a [u8] {
    let size = end as usize - begin as usize;

    // SAFETY: caller guarantees the range is readable
    unsafe { slice::from_raw_parts(begin, size) }
}

/// Wildcard-aware compare of `sig[skip..]` against `hay[at + skip..]`
///
/// Callers guarantee `at + sig.len() <= hay.len()`.
pub(crate) fn matches_from(hay: &[u8], at: usize, sig: &[SigByte], skip: usize) -> bool {
    debug_assert!(at + sig.len() <= hay.len());

    sig[skip..]
        .iter()
        .zip(&hay[at + skip..])
        .all(|(elem, byte)| elem.map_or(true, |value| value == *byte))
}

/// Scalar candidate walk shared by the scalar kernels and the SIMD head/tail
/// fragments
///
/// Considers candidate indices in `[from, cand_end)` stepping `stride` and
/// returns the lowest full match. Callers guarantee every candidate leaves
/// `sig.len()` readable bytes in `hay`, and that `from` sits on a stride
/// boundary of the backing address when `stride > 1`.
pub(crate) fn scan_range(
    hay: &[u8],
    sig: &[SigByte],
    first: u8,
    from: usize,
    cand_end: usize,
    stride: usize,
) -> Option<usize> {
    if stride == 1 {
        let mut from = from;

        while from < cand_end {
            let found = memchr::memchr(first, &hay[from..cand_end])?;
            let at = from + found;

            if matches_from(hay, at, sig, 1) {
                return Some(at);
            }

            from = at + 1;
        }

        None
    } else {
        let mut at = from;

        while at < cand_end {
            if hay[at] == first && matches_from(hay, at, sig, 1) {
                return Some(at);
            }

            at += stride;
        }

        None
    }
}
