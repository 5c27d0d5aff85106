//! Scalar fast-first pattern scanning backend
//!
//! The fallback for every CPU, and the comparator the SIMD backends lean on
//! for head and tail fragments. Also home to the compile-time twin of the
//! find-first entry point.

use std::ptr;

use crate::scan::align;
use crate::scan::context::ScanContext;
use crate::scan::sig::SigByte;

use super::{raw_range, scan_range};

/// Find the first match at stride 1
///
/// Locates candidates with a byte-find over the signature's first byte, then
/// compares the remaining elements treating wildcards as always-true.
///
/// # Safety
/// `[begin, end)` must be readable and `begin <= end`
pub(crate) unsafe fn find_x1(begin: *const u8, end: *const u8, ctx: &ScanContext<'_>) -> *const u8 {
    // SAFETY: caller guarantees the range is readable
    let hay = unsafe { raw_range(begin, end) };
    let sig = ctx.sig;

    if hay.len() < sig.len() {
        return ptr::null();
    }

    let cand_end = hay.len() - sig.len() + 1;

    match scan_range(hay, sig, ctx.first, 0, cand_end, 1) {
        Some(at) => hay[at..].as_ptr(),
        None => ptr::null(),
    }
}

/// Find the first match at stride 16
///
/// Candidates step in increments of 16 from the first 16-aligned address in
/// range; the first byte is checked directly, no byte-find involved.
///
/// # Safety
/// `[begin, end)` must be readable and `begin <= end`
pub(crate) unsafe fn find_x16(
    begin: *const u8,
    end: *const u8,
    ctx: &ScanContext<'_>,
) -> *const u8 {
    // SAFETY: caller guarantees the range is readable
    let hay = unsafe { raw_range(begin, end) };
    let sig = ctx.sig;

    if hay.len() < sig.len() {
        return ptr::null();
    }

    let base = begin as usize;
    let last = hay.len() - sig.len();

    let from = align::next_boundary(base, 16) - base;
    if from > last {
        return ptr::null();
    }

    // one past the highest aligned candidate that still fits the signature
    let cand_end = align::prev_boundary(base + last, 16) + 1 - base;

    match scan_range(hay, sig, ctx.first, from, cand_end, 16) {
        Some(at) => hay[at..].as_ptr(),
        None => ptr::null(),
    }
}

/// Compile-time twin of the find-first entry point, at stride 1
///
/// Same observable behavior as the run-time path: leading wildcards are
/// stripped and their count folded back into the returned position, too-short
/// ranges report no match. Usable in `const` contexts, where candidate
/// alignment against numeric addresses is not observable, hence stride 1
/// only.
pub const fn find_first_const(hay: &[u8], sig: &[SigByte]) -> Option<usize> {
    // leading-wildcard truncation
    let mut offset = 0;
    while offset < sig.len() {
        if sig[offset].is_some() {
            break;
        }

        offset += 1;
    }

    // all-wildcard views are rejected by signature construction
    if offset == sig.len() {
        return None;
    }

    let len = sig.len() - offset;

    if hay.len() < offset || hay.len() - offset < len {
        return None;
    }

    let last = hay.len() - len;

    let mut at = offset;
    while at <= last {
        let mut k = 0;
        let mut matched = true;

        while k < len {
            match sig[offset + k] {
                Some(byte) => {
                    if hay[at + k] != byte {
                        matched = false;
                        break;
                    }
                }
                None => {}
            }

            k += 1;
        }

        if matched {
            return Some(at - offset);
        }

        at += 1;
    }

    None
}
