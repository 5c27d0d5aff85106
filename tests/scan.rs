//! End-to-end scanning behavior through the public API

use proptest::prelude::*;

use sigscan::scan::{
    self, find_first_const, ScanAlign, ScanHints, ScanResult, SigByte, Signature,
};

fn offset_of(result: ScanResult, hay: &[u8]) -> Option<usize> {
    result
        .has_result()
        .then(|| result.get() as usize - hay.as_ptr() as usize)
}

fn offsets_of(results: &[ScanResult], hay: &[u8]) -> Vec<usize> {
    results
        .iter()
        .map(|r| r.get() as usize - hay.as_ptr() as usize)
        .collect()
}

/// Full-signature match predicate, wildcards included
fn matches_at(hay: &[u8], at: usize, sig: &Signature) -> bool {
    at + sig.len() <= hay.len()
        && sig
            .elems()
            .iter()
            .zip(&hay[at..])
            .all(|(elem, byte)| elem.map_or(true, |value| value == *byte))
}

/// Every matching position at stride 1
fn reference_matches(hay: &[u8], sig: &Signature) -> Vec<usize> {
    (0..hay.len().saturating_sub(sig.len() - 1))
        .filter(|&at| matches_at(hay, at, sig))
        .collect()
}

#[test]
fn plain_match() {
    let hay = [0x00u8, 0x01, 0x02, 0x03, 0x04];
    let sig = Signature::parse("02 03").unwrap();

    let hit = scan::find_first(&hay, &sig, ScanAlign::X1, ScanHints::NONE);
    assert_eq!(offset_of(hit, &hay), Some(2));

    let all = scan::find_all(&hay, &sig, ScanAlign::X1);
    assert_eq!(offsets_of(&all, &hay), [2]);
}

#[test]
fn wildcards_in_body() {
    let sig = Signature::parse("AA ? CC").unwrap();

    let hay = [0xAAu8, 0xBB, 0xCC, 0xDD, 0xEE];
    let hit = scan::find_first(&hay, &sig, ScanAlign::X1, ScanHints::NONE);
    assert_eq!(offset_of(hit, &hay), Some(0));

    // changing the wildcard byte cannot produce a false negative
    let hay = [0xAAu8, 0xEE, 0xCC, 0xDD, 0xEE];
    let hit = scan::find_first(&hay, &sig, ScanAlign::X1, ScanHints::NONE);
    assert_eq!(offset_of(hit, &hay), Some(0));

    // and a concrete mismatch cannot produce a false positive
    let hay = [0xAAu8, 0xBB, 0xCE, 0xDD, 0xEE];
    let hit = scan::find_first(&hay, &sig, ScanAlign::X1, ScanHints::NONE);
    assert_eq!(offset_of(hit, &hay), None);
}

#[test]
fn leading_wildcards_line_up_with_the_tail() {
    let hay = [0x11u8, 0x22, 0x33, 0x44];

    let led = Signature::parse("? ? 33").unwrap();
    let tail = Signature::parse("33").unwrap();

    let led_hit = offset_of(
        scan::find_first(&hay, &led, ScanAlign::X1, ScanHints::NONE),
        &hay,
    );
    let tail_hit = offset_of(
        scan::find_first(&hay, &tail, ScanAlign::X1, ScanHints::NONE),
        &hay,
    );

    // find(R, wildcards + tail) == find(R, tail) - wildcard count
    assert_eq!(tail_hit, Some(2));
    assert_eq!(led_hit, Some(0));
}

#[test]
fn stride_16_skips_unaligned_matches() {
    let sig = Signature::parse("DE AD").unwrap();

    // force the haystack base onto a 16-byte boundary
    let mut backing = vec![0u8; 160];
    let shift = backing.as_ptr().align_offset(16);

    backing[shift + 17] = 0xDE;
    backing[shift + 18] = 0xAD;

    let hay = &backing[shift..shift + 128];

    let aligned = scan::find_first(hay, &sig, ScanAlign::X16, ScanHints::NONE);
    assert!(!aligned.has_result());

    let unaligned = scan::find_first(hay, &sig, ScanAlign::X1, ScanHints::NONE);
    assert_eq!(offset_of(unaligned, hay), Some(17));
}

#[test]
fn matches_straddling_simd_seams_are_found() {
    for width in [16usize, 32, 64] {
        let mut hay = vec![0u8; 200];
        hay[width - 1..width + 4].copy_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05]);

        let sig = Signature::parse("01 02 03 04 05").unwrap();

        let hit = scan::find_first(&hay, &sig, ScanAlign::X1, ScanHints::NONE);
        assert_eq!(offset_of(hit, &hay), Some(width - 1), "width {width}");
    }
}

#[test]
fn overlapping_matches_respect_stride() {
    let sig = Signature::parse("AB AB").unwrap();

    let mut backing = vec![0u8; 32];
    let shift = backing.as_ptr().align_offset(16);
    backing[shift..shift + 4].copy_from_slice(&[0xAB; 4]);

    let hay = &backing[shift..shift + 4];

    let all = scan::find_all(hay, &sig, ScanAlign::X1);
    assert_eq!(offsets_of(&all, hay), [0, 1, 2]);

    let aligned = scan::find_all(hay, &sig, ScanAlign::X16);
    assert_eq!(offsets_of(&aligned, hay), [0]);
}

#[test]
fn short_range_never_reads_out_of_bounds() {
    let hay = [0xABu8];
    let sig = Signature::parse("AB CD").unwrap();

    let hit = scan::find_first(&hay, &sig, ScanAlign::X1, ScanHints::NONE);
    assert!(!hit.has_result());

    assert!(scan::find_all(&hay, &sig, ScanAlign::X1).is_empty());
}

#[test]
fn bounded_output_stops_early_and_resumes() {
    let hay = [0xABu8, 0xAB, 0xAB, 0xAB, 0xAB];
    let sig = Signature::parse("AB AB").unwrap();

    let mut out = [ScanResult::default(); 2];
    let (stopped, written) =
        scan::find_all_into(&hay, &mut out, &sig, ScanAlign::X1, ScanHints::NONE);

    assert_eq!(written, 2);
    assert_eq!(offsets_of(&out, &hay), [0, 1]);

    // the remainder of the range still holds the matches that did not fit
    let rest = scan::find_all(&hay[stopped..], &sig, ScanAlign::X1);
    assert_eq!(offsets_of(&rest, &hay[stopped..]), [0, 1]);
}

#[test]
fn counted_find_all_streams_to_the_sink() {
    let hay = [0x01u8, 0x02, 0x01, 0x02];
    let sig = Signature::parse("01 02").unwrap();

    let mut sunk = Vec::new();
    let count = scan::find_all_with(&hay, &sig, ScanAlign::X1, ScanHints::NONE, |hit| {
        sunk.push(hit)
    });

    assert_eq!(count, 2);
    assert_eq!(offsets_of(&sunk, &hay), [0, 2]);
}

#[test]
fn hints_never_change_the_result() {
    let hay = [0x48u8, 0x89, 0x5C, 0x24, 0x08, 0x48, 0x89, 0x6C];
    let sig = Signature::parse("48 89 ?? 24").unwrap();

    let plain = scan::find_first(&hay, &sig, ScanAlign::X1, ScanHints::NONE);
    let hinted = scan::find_first(&hay, &sig, ScanAlign::X1, ScanHints::X86_64_CODE);

    assert_eq!(plain, hinted);
}

#[test]
fn relative_resolution_at_the_match_site() {
    // E8 <rel32> call with displacement 0x20, then padding
    let mut hay = vec![0u8; 64];
    hay[10] = 0xE8;
    hay[11..15].copy_from_slice(&0x20i32.to_le_bytes());

    let sig = Signature::parse("E8 ? ? ? ?").unwrap();
    let hit = scan::find_first(&hay, &sig, ScanAlign::X1, ScanHints::NONE);

    let target = unsafe { hit.rel(1) };
    let expected = hit.get() as usize + 0x20 + 1 + 4;
    assert_eq!(target.get() as usize, expected);
}

#[test]
fn const_and_runtime_paths_agree() {
    const HAY: &[u8] = &[0x55, 0x48, 0x89, 0xE5, 0x48, 0x83];
    const SIG: &[SigByte] = &[Some(0x48), None, Some(0xE5)];

    const AT: Option<usize> = find_first_const(HAY, SIG);
    assert_eq!(AT, Some(1));

    let sig = Signature::from_elems(SIG.to_vec()).unwrap();
    let hit = scan::find_first(HAY, &sig, ScanAlign::X1, ScanHints::NONE);

    assert_eq!(offset_of(hit, HAY), AT);
}

/// Signature element strategy: small alphabet, some wildcards, never
/// all-wildcard
fn sig_elems() -> impl Strategy<Value = Vec<SigByte>> {
    proptest::collection::vec((any::<bool>(), 0u8..4), 1..12).prop_map(|pairs| {
        let mut elems: Vec<SigByte> = pairs
            .into_iter()
            .map(|(wild, byte)| (!wild).then_some(byte))
            .collect();

        if elems.iter().all(|e| e.is_none()) {
            elems[0] = Some(1);
        }

        elems
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn find_first_equals_reference(
        hay in proptest::collection::vec(0u8..4, 0..200),
        elems in sig_elems(),
    ) {
        let sig = Signature::from_elems(elems).unwrap();

        let hit = scan::find_first(&hay, &sig, ScanAlign::X1, ScanHints::NONE);
        let expected = reference_matches(&hay, &sig).first().copied();

        prop_assert_eq!(offset_of(hit, &hay), expected);
    }

    #[test]
    fn find_all_is_exhaustive_at_stride_1(
        hay in proptest::collection::vec(0u8..4, 0..200),
        elems in sig_elems(),
    ) {
        let sig = Signature::from_elems(elems).unwrap();

        let all = scan::find_all(&hay, &sig, ScanAlign::X1);

        prop_assert_eq!(offsets_of(&all, &hay), reference_matches(&hay, &sig));
    }

    #[test]
    fn stride_16_results_are_aligned_and_agree_with_stride_1(
        hay in proptest::collection::vec(0u8..4, 0..200),
        elems in sig_elems(),
    ) {
        let sig = Signature::from_elems(elems).unwrap();

        let all = scan::find_all(&hay, &sig, ScanAlign::X1);
        let aligned = scan::find_all(&hay, &sig, ScanAlign::X16);

        // with no leading wildcards a stride-16 result set is exactly the
        // 16-aligned subset of the stride-1 result set
        if sig.elems()[0].is_some() {
            let expected: Vec<usize> = offsets_of(&all, &hay)
                .into_iter()
                .filter(|at| (hay.as_ptr() as usize + at) % 16 == 0)
                .collect();

            prop_assert_eq!(offsets_of(&aligned, &hay), expected);
        }

        for at in offsets_of(&aligned, &hay) {
            prop_assert!(matches_at(&hay, at, &sig));
        }
    }

    #[test]
    fn truncation_law_holds(
        hay in proptest::collection::vec(0u8..4, 1..120),
        wildcards in 1usize..4,
        elems in sig_elems(),
    ) {
        let mut led: Vec<SigByte> = vec![None; wildcards];
        led.extend(elems.iter().copied());

        let tail = Signature::from_elems(elems).unwrap();
        let led = Signature::from_elems(led).unwrap();

        let tail_hit = offset_of(
            scan::find_first(&hay, &tail, ScanAlign::X1, ScanHints::NONE),
            &hay,
        );
        let led_hit = offset_of(
            scan::find_first(&hay, &led, ScanAlign::X1, ScanHints::NONE),
            &hay,
        );

        if tail.elems()[0].is_some() {
            match tail_hit {
                Some(at) if at >= wildcards && at + tail.len() <= hay.len() => {
                    prop_assert_eq!(led_hit, Some(at - wildcards));
                }
                _ => {}
            }
        }
    }
}
