//! AVX2 pattern scanning backend

use std::arch::x86_64::{
    __m256i, _mm256_and_si256, _mm256_cmpeq_epi8, _mm256_load_si256, _mm256_loadu_si256,
    _mm256_movemask_epi8, _mm256_set1_epi8, _mm256_testz_si256, _mm256_xor_si256,
};
use std::ptr;

use crate::scan::align;
use crate::scan::context::ScanContext;
use crate::scan::sig::SigByte;

use super::{matches_from, raw_range, scan_range};

const WIDTH: usize = 32;

/// # Safety
/// `[begin, end)` must be readable, `begin <= end`, CPU supports AVX2
#[target_feature(enable = "avx2")]
pub(crate) unsafe fn find_x1(begin: *const u8, end: *const u8, ctx: &ScanContext<'_>) -> *const u8 {
    // SAFETY: forwarded kernel contract
    unsafe { find(begin, end, ctx, 1) }
}

/// # Safety
/// `[begin, end)` must be readable, `begin <= end`, CPU supports AVX2
#[target_feature(enable = "avx2")]
pub(crate) unsafe fn find_x16(
    begin: *const u8,
    end: *const u8,
    ctx: &ScanContext<'_>,
) -> *const u8 {
    // SAFETY: forwarded kernel contract
    unsafe { find(begin, end, ctx, 16) }
}

#[target_feature(enable = "avx2")]
unsafe fn find(
    begin: *const u8,
    end: *const u8,
    ctx: &ScanContext<'_>,
    stride: usize,
) -> *const u8 {
    // SAFETY: caller guarantees the range is readable
    let hay = unsafe { raw_range(begin, end) };
    let sig = ctx.sig;

    if hay.len() < sig.len() {
        return ptr::null();
    }

    let base = begin as usize;
    let last = hay.len() - sig.len();

    let mut value = [0u8; WIDTH];
    let mut mask = [0u8; WIDTH];

    for (i, elem) in sig.iter().take(WIDTH).enumerate() {
        if let Some(byte) = elem {
            value[i] = *byte;
            mask[i] = 0xFF;
        }
    }

    // SAFETY: the stack arrays hold WIDTH readable bytes
    let value = unsafe { _mm256_loadu_si256(value.as_ptr().cast()) };
    let mask = unsafe { _mm256_loadu_si256(mask.as_ptr().cast()) };
    let first = _mm256_set1_epi8(ctx.first as i8);

    let body = align::next_boundary(base, WIDTH) - base;

    let head_end = body.min(last + 1);
    let head_from = align::next_boundary(base, stride) - base;

    if head_from < head_end {
        if let Some(at) = scan_range(hay, sig, ctx.first, head_from, head_end, stride) {
            return hay[at..].as_ptr();
        }
    }

    let lane_keep = align::stride_mask64(stride) as u32;

    let mut chunk = body;
    while chunk + WIDTH <= hay.len() {
        // SAFETY: base + chunk is WIDTH-aligned and WIDTH bytes remain
        let data = unsafe { _mm256_load_si256(hay.as_ptr().add(chunk).cast()) };

        let cmp = _mm256_cmpeq_epi8(first, data);
        let mut lanes = (_mm256_movemask_epi8(cmp) as u32) & lane_keep;

        while lanes != 0 {
            let at = chunk + lanes.trailing_zeros() as usize;

            if at > last {
                break;
            }

            // SAFETY: at <= last leaves the whole signature in range
            if unsafe { confirm(hay, at, sig, value, mask) } {
                return hay[at..].as_ptr();
            }

            lanes &= lanes - 1;
        }

        chunk += WIDTH;
    }

    if chunk <= last {
        let tail_from = align::next_boundary(base + chunk, stride) - base;

        if let Some(at) = scan_range(hay, sig, ctx.first, tail_from, last + 1, stride) {
            return hay[at..].as_ptr();
        }
    }

    ptr::null()
}

/// # Safety
/// `at + sig.len() <= hay.len()`, CPU supports AVX2
#[target_feature(enable = "avx2")]
unsafe fn confirm(hay: &[u8], at: usize, sig: &[SigByte], value: __m256i, mask: __m256i) -> bool {
    if at + WIDTH <= hay.len() {
        // SAFETY: WIDTH bytes from at are in range
        let data = unsafe { _mm256_loadu_si256(hay.as_ptr().add(at).cast()) };

        let diff = _mm256_and_si256(_mm256_xor_si256(data, value), mask);
        if _mm256_testz_si256(diff, diff) == 0 {
            return false;
        }

        sig.len() <= WIDTH || matches_from(hay, at, sig, WIDTH)
    } else {
        matches_from(hay, at, sig, 1)
    }
}
