//! # Allele-Code Converter
//!
//! Pure per-variant transformation: caller-supplied signed allele codes
//! (two per sample, diploid) plus optional phase bytes, converted in place
//! into the session's preallocated arena buffers. No allocation happens
//! here; the same buffers are rewritten on every append.
//!
//! The common biallelic case packs both codes into a 2-bit genotype slot.
//! Samples needing a third or higher allele value go into one of two
//! sparse overflow tables: patch-01 for exactly one non-reference code,
//! patch-10 for two non-reference codes.

use bitvec::prelude::*;

use crate::arena::ArenaViews;
use crate::error::{PgenError, Result};
use crate::format::{GENO_MISSING, MAX_ALLELE_CODE, MISSING_ALLELE_CODE, NYPS_PER_WORD};

/// What one conversion pass observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvertSummary {
    /// Highest allele code observed, plus one (0 when every call is missing).
    pub observed_allele_ct: u32,
    /// Samples recorded in the patch-01 overflow table.
    pub patch01_ct: u32,
    /// Samples recorded in the patch-10 overflow table.
    pub patch10_ct: u32,
}

impl ConvertSummary {
    /// Whether the variant needs the multiallelic sparse-overflow encoding.
    pub fn has_patches(&self) -> bool {
        self.patch01_ct > 0 || self.patch10_ct > 0
    }
}

/// Convert one variant's allele codes into the arena buffers.
///
/// `codes` must hold exactly `2 * sample_count` entries (and `phase_bytes`,
/// when supplied, one per sample); mismatched lengths are rejected as
/// `Validation` errors. Valid values are
/// `0..=MAX_ALLELE_CODE` or `MISSING_ALLELE_CODE` for both codes of a
/// missing call. When `phase_bytes` is supplied, the phase-present set is
/// filled from it and phase-info is set for phased heterozygotes whose
/// first code is the greater one.
///
/// On error the buffers may hold partially written scratch; the session's
/// counters are untouched and the next successful conversion fully
/// overwrites every buffer it reads from.
pub fn convert_allele_codes(
    codes: &[i32],
    phase_bytes: Option<&[u8]>,
    views: &mut ArenaViews<'_>,
) -> Result<ConvertSummary> {
    let sample_count = views.sample_count as usize;
    if codes.len() != 2 * sample_count {
        return Err(PgenError::validation(format!(
            "expected {} allele codes for {sample_count} samples, got {}",
            2 * sample_count,
            codes.len()
        )));
    }
    if let Some(pb) = phase_bytes {
        if pb.len() != sample_count {
            return Err(PgenError::validation(format!(
                "expected {sample_count} phase bytes, got {}",
                pb.len()
            )));
        }
    }

    // Presence sets are reused across appends and must start empty.
    views.patch01_set.fill(0);
    views.patch10_set.fill(0);
    if phase_bytes.is_some() {
        views.phase_present.fill(0);
        views.phase_info.fill(0);
    }

    let patch01_bits = BitSlice::<u64, Lsb0>::from_slice_mut(&mut views.patch01_set[..]);
    let patch10_bits = BitSlice::<u64, Lsb0>::from_slice_mut(&mut views.patch10_set[..]);
    let phase_present_bits = BitSlice::<u64, Lsb0>::from_slice_mut(&mut views.phase_present[..]);
    let phase_info_bits = BitSlice::<u64, Lsb0>::from_slice_mut(&mut views.phase_info[..]);

    let mut word = 0u64;
    let mut max_code: i32 = -1;
    let mut patch01_ct = 0usize;
    let mut patch10_ct = 0usize;

    for s in 0..sample_count {
        let c0 = codes[2 * s];
        let c1 = codes[2 * s + 1];

        let geno: u64 = if c0 == MISSING_ALLELE_CODE || c1 == MISSING_ALLELE_CODE {
            if c0 != c1 {
                return Err(PgenError::invalid_allele_code(format!(
                    "sample {s}: half-missing genotype ({c0}, {c1})"
                )));
            }
            GENO_MISSING
        } else if !(0..=MAX_ALLELE_CODE).contains(&c0) || !(0..=MAX_ALLELE_CODE).contains(&c1) {
            let bad = if (0..=MAX_ALLELE_CODE).contains(&c0) { c1 } else { c0 };
            return Err(PgenError::invalid_allele_code(format!(
                "sample {s}: allele code {bad} outside 0..={MAX_ALLELE_CODE} \
                 (missing is {MISSING_ALLELE_CODE})"
            )));
        } else {
            max_code = max_code.max(c0).max(c1);
            match (c0 == 0, c1 == 0) {
                (true, true) => 0,
                (false, false) => {
                    if c0 != 1 || c1 != 1 {
                        patch10_bits.set(s, true);
                        views.patch10_vals[2 * patch10_ct] = c0 as u32;
                        views.patch10_vals[2 * patch10_ct + 1] = c1 as u32;
                        patch10_ct += 1;
                    }
                    2
                }
                _ => {
                    // Exactly one code is non-reference.
                    let k = c0 + c1;
                    if k > 1 {
                        patch01_bits.set(s, true);
                        views.patch01_vals[patch01_ct] = k as u32;
                        patch01_ct += 1;
                    }
                    1
                }
            }
        };

        word |= geno << (2 * (s % NYPS_PER_WORD));
        if s % NYPS_PER_WORD == NYPS_PER_WORD - 1 {
            views.genovec[s / NYPS_PER_WORD] = word;
            word = 0;
        }

        if let Some(pb) = phase_bytes {
            if pb[s] != 0 {
                phase_present_bits.set(s, true);
                if geno != GENO_MISSING && c0 > c1 {
                    phase_info_bits.set(s, true);
                }
            }
        }
    }

    // Flush the partial tail word; its unused high bits stay zero.
    if sample_count % NYPS_PER_WORD != 0 {
        views.genovec[sample_count / NYPS_PER_WORD] = word;
    }

    Ok(ConvertSummary {
        observed_allele_ct: (max_code + 1) as u32,
        patch01_ct: patch01_ct as u32,
        patch10_ct: patch10_ct as u32,
    })
}

/// Read back one sample's packed 2-bit genotype (test/debug helper).
pub fn unpack_genotype(genovec: &[u64], sample: usize) -> u64 {
    (genovec[sample / NYPS_PER_WORD] >> (2 * (sample % NYPS_PER_WORD))) & 3
}
