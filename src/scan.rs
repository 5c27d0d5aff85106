//! This module allows one to scan memory ranges for byte signatures
//!
//! Entry points truncate leading wildcards before dispatch: the wildcards
//! match anything, so searching for the truncated signature and subtracting
//! the wildcard count from the hit is equivalent, and lets every kernel
//! assume a concrete first byte. Invalid ranges report no match rather than
//! faulting, and a scan never allocates except for [`find_all`] collecting
//! its output.

mod align;
mod backends;
mod context;
mod result;
mod sig;

use std::ptr;

pub use backends::scalar::find_first_const;
pub use context::{ScanAlign, ScanHints};
pub use result::{ScanInt, ScanResult, ScanResultMut};
pub use sig::{SigByte, Signature, SignatureError};

use context::ScanContext;
use sig::truncate;

/// Find the first occurrence of the signature in the range
///
/// Candidate start addresses are constrained by `alignment`; hints are
/// advisory and never change the result.
///
/// # Example
///
/// ```rust
/// use sigscan::scan::{self, ScanAlign, ScanHints, Signature};
///
/// let haystack = [0xABu8, 0xEC, 0x48, 0x89, 0x5C, 0x24, 0xEE];
/// let sig = Signature::parse("48 89 5c 24 ??").unwrap();
///
/// let hit = scan::find_first(&haystack, &sig, ScanAlign::X1, ScanHints::NONE);
/// assert_eq!(hit.get(), haystack[2..].as_ptr());
/// ```
pub fn find_first(
    haystack: &[u8],
    signature: &Signature,
    alignment: ScanAlign,
    hints: ScanHints,
) -> ScanResult {
    let begin = haystack.as_ptr();
    let end = begin.wrapping_add(haystack.len());

    // SAFETY: the range is derived from a live slice
    unsafe { find_first_raw(begin, end, signature, alignment, hints) }
}

/// [`find_first`] over a mutable range; the result address is writable
pub fn find_first_mut(
    haystack: &mut [u8],
    signature: &Signature,
    alignment: ScanAlign,
    hints: ScanHints,
) -> ScanResultMut {
    let begin = haystack.as_mut_ptr();
    let end = begin.wrapping_add(haystack.len());

    // SAFETY: the range is derived from a live slice
    let hit = unsafe {
        find_first_ptr(
            begin.cast_const(),
            end.cast_const(),
            signature.elems(),
            alignment,
            hints,
        )
    };

    ScanResultMut::new(hit.cast_mut())
}

/// [`find_first`] over a raw range
///
/// This is the form the module layer uses, where a section range is not
/// safely materializable as a slice.
///
/// # Safety
///
/// * `[begin, end)` is readable for the duration of the call
pub unsafe fn find_first_raw(
    begin: *const u8,
    end: *const u8,
    signature: &Signature,
    alignment: ScanAlign,
    hints: ScanHints,
) -> ScanResult {
    // SAFETY: safe to call as long as the safety conditions were met for this function
    let hit = unsafe { find_first_ptr(begin, end, signature.elems(), alignment, hints) };

    ScanResult::new(hit)
}

/// Root find-first implementation
///
/// # Safety
/// `[begin, end)` must be readable when `begin <= end`
unsafe fn find_first_ptr(
    begin: *const u8,
    end: *const u8,
    elems: &[SigByte],
    alignment: ScanAlign,
    hints: ScanHints,
) -> *const u8 {
    let (offset, trunc) = truncate(elems);
    let begin = begin.wrapping_add(offset);

    if begin as usize >= end as usize {
        return ptr::null();
    }

    let size = end as usize - begin as usize;
    if trunc.is_empty() || trunc.len() > size {
        return ptr::null();
    }

    let ctx = ScanContext::create(trunc, alignment, hints);

    // SAFETY: the adjusted range was bounds-checked above
    let hit = unsafe { ctx.scan(begin, end) };

    if hit.is_null() {
        hit
    } else {
        hit.wrapping_sub(offset)
    }
}

/// Find every occurrence, writing into a bounded output range
///
/// After each hit the cursor advances by the alignment stride, so stride-1
/// scans admit overlapping matches. Stops when the kernel misses, the output
/// fills up, or the remaining range is shorter than the signature. Returns
/// the position in `haystack` at which searching stopped and the number of
/// results written; resuming from `&haystack[stopped..]` continues the scan
/// exactly where it left off.
pub fn find_all_into(
    haystack: &[u8],
    out: &mut [ScanResult],
    signature: &Signature,
    alignment: ScanAlign,
    hints: ScanHints,
) -> (usize, usize) {
    let mut written = 0;

    let stopped = find_all_ptr(haystack, signature.elems(), alignment, hints, |hit| {
        if written == out.len() {
            return false;
        }

        out[written] = hit;
        written += 1;
        true
    });

    (stopped, written)
}

/// Find every occurrence, streaming results into a sink
///
/// Returns the match count.
pub fn find_all_with(
    haystack: &[u8],
    signature: &Signature,
    alignment: ScanAlign,
    hints: ScanHints,
    mut sink: impl FnMut(ScanResult),
) -> usize {
    let mut count = 0;

    find_all_ptr(haystack, signature.elems(), alignment, hints, |hit| {
        sink(hit);
        count += 1;
        true
    });

    count
}

/// Find every occurrence, collecting results into a vector
pub fn find_all(haystack: &[u8], signature: &Signature, alignment: ScanAlign) -> Vec<ScanResult> {
    let mut results = Vec::new();

    find_all_with(haystack, signature, alignment, ScanHints::NONE, |hit| {
        results.push(hit)
    });

    results
}

/// [`find_all`] over a mutable range; the result addresses are writable
pub fn find_all_mut(
    haystack: &mut [u8],
    signature: &Signature,
    alignment: ScanAlign,
) -> Vec<ScanResultMut> {
    // writability tracks the input range: collect match offsets first, then
    // re-derive each address from the mutable pointer instead of casting
    // constness away
    let offsets: Vec<usize> = {
        let hay: &[u8] = haystack;
        let base = hay.as_ptr() as usize;

        find_all(hay, signature, alignment)
            .into_iter()
            .map(|hit| hit.get() as usize - base)
            .collect()
    };

    let base = haystack.as_mut_ptr();

    offsets
        .into_iter()
        .map(|at| ScanResultMut::new(base.wrapping_add(at)))
        .collect()
}

/// Shared find-all loop
///
/// `emit` receives each hit and returns whether it consumed it; a refusal
/// stops the search with the cursor still before the hit, so resuming from
/// the returned index re-finds it. Returns the index in `haystack` at which
/// searching stopped.
fn find_all_ptr(
    haystack: &[u8],
    elems: &[SigByte],
    alignment: ScanAlign,
    hints: ScanHints,
    mut emit: impl FnMut(ScanResult) -> bool,
) -> usize {
    let (offset, trunc) = truncate(elems);

    if trunc.is_empty() {
        return 0;
    }

    let base = haystack.as_ptr();
    let len = haystack.len();
    let end = base.wrapping_add(len);

    let ctx = ScanContext::create(trunc, alignment, hints);

    // cursor indexes the truncated scan start, offset past the range head
    let mut cursor = offset;

    while cursor < len && len - cursor >= trunc.len() {
        // SAFETY: the cursor stays inside the slice, bounds-checked above
        let hit = unsafe { ctx.scan(base.wrapping_add(cursor), end) };

        if hit.is_null() {
            cursor = len;
            break;
        }

        let hit_at = hit as usize - base as usize;
        let head = hit_at - offset;

        if !emit(ScanResult::new(haystack[head..].as_ptr())) {
            break;
        }

        // the stride step alone can fail to progress past a hit when the
        // signature has leading wildcards, so clamp to strictly after it
        cursor = usize::max(head + alignment.stride(), hit_at + 1);
    }

    cursor - offset
}
