//! # Codec-Engine Seam
//!
//! The write session performs no file I/O itself: the physical encoding of
//! packed genotype vectors into on-disk records, compression, and byte
//! output all belong to an external variant-codec engine. This module pins
//! down the fixed set of entry points the session consumes, plus the status
//! codes an engine reports, so the session can stay engine-agnostic and
//! tests can substitute a recording double.
//!
//! The engine's two-phase initialization mirrors its memory discipline:
//! phase 1 validates parameters and reports how many cachelines of private
//! scratch the engine needs; the session then carves that region out of the
//! front of its single arena block and hands it over in phase 2.

use std::fmt;
use std::path::Path;

use crate::session::{WriteFlags, WriteMode};

/// Status codes a codec engine may report.
///
/// The names follow the engine's own error vocabulary so a failure logged
/// here can be matched against the engine's documentation directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecStatus {
    Skipped,
    Nomem,
    OpenFail,
    ReadFail,
    WriteFail,
    MalformedInput,
    InconsistentInput,
    VarRecordTooLarge,
    DegenerateData,
    RewindFail,
    InternalError,
    ImproperFunctionCall,
    NotYetSupported,
}

impl CodecStatus {
    /// Stable integer value of the status, for logs that need to round-trip
    /// back to the engine's numbering.
    pub fn code(self) -> i32 {
        match self {
            CodecStatus::Skipped => 1,
            CodecStatus::Nomem => 2,
            CodecStatus::OpenFail => 3,
            CodecStatus::ReadFail => 4,
            CodecStatus::WriteFail => 5,
            CodecStatus::MalformedInput => 6,
            CodecStatus::InconsistentInput => 7,
            CodecStatus::VarRecordTooLarge => 11,
            CodecStatus::DegenerateData => 13,
            CodecStatus::RewindFail => 15,
            CodecStatus::InternalError => 19,
            CodecStatus::ImproperFunctionCall => 21,
            CodecStatus::NotYetSupported => 22,
        }
    }

    /// Engine-vocabulary name of the status.
    pub fn name(self) -> &'static str {
        match self {
            CodecStatus::Skipped => "Skipped",
            CodecStatus::Nomem => "Nomem",
            CodecStatus::OpenFail => "OpenFail",
            CodecStatus::ReadFail => "ReadFail",
            CodecStatus::WriteFail => "WriteFail",
            CodecStatus::MalformedInput => "MalformedInput",
            CodecStatus::InconsistentInput => "InconsistentInput",
            CodecStatus::VarRecordTooLarge => "VarRecordTooLarge",
            CodecStatus::DegenerateData => "DegenerateData",
            CodecStatus::RewindFail => "RewindFail",
            CodecStatus::InternalError => "InternalError",
            CodecStatus::ImproperFunctionCall => "ImproperFunctionCall",
            CodecStatus::NotYetSupported => "NotYetSupported",
        }
    }
}

impl fmt::Display for CodecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine status {} {}", self.code(), self.name())
    }
}

/// What the engine reports from initialization phase 1.
#[derive(Clone, Copy, Debug)]
pub struct InitPlan {
    /// Cachelines of engine-private scratch the session must reserve at the
    /// front of the arena block.
    pub arena_cachelines: usize,

    /// Maximum encoded record length, threaded back into phase 2.
    pub max_record_len: u32,
}

/// Borrowed views of the sparse multiallelic overflow structures for one
/// variant, handed to the multiallelic write primitives.
///
/// The value arrays are densely packed in sample order: `vals_01[..ct_01]`
/// holds one allele code per set bit of `set_01`, `vals_10[..2 * ct_10]`
/// holds two per set bit of `set_10`.
#[derive(Clone, Copy, Debug)]
pub struct PatchRefs<'a> {
    pub set_01: &'a [u64],
    pub vals_01: &'a [u32],
    pub ct_01: u32,
    pub set_10: &'a [u64],
    pub vals_10: &'a [u32],
    pub ct_10: u32,
}

/// The fixed entry points the write session consumes from a codec engine.
///
/// All genotype vectors are 2 bits per sample, little-endian within each
/// 64-bit word; bit vectors are one bit per sample. Buffers are always
/// cacheline-padded and any trailing bits past the last sample are zero.
///
/// For the phased primitives, `phase_present == None` is the "every sample
/// phased" call shape; `Some(bits)` carries per-sample phase presence for a
/// partially phased variant. The engine has no single code path that
/// handles mixed phasing implicitly, so the session always decides which
/// shape to use.
pub trait CodecEngine {
    /// Validate parameters and size the engine's private arena region.
    fn init_phase1(
        &mut self,
        path: &Path,
        variant_count_limit: u32,
        sample_count: u32,
        allele_count_limit: u32,
        mode: WriteMode,
        flags: WriteFlags,
    ) -> Result<InitPlan, CodecStatus>;

    /// Hand the engine its reserved arena region and complete setup.
    fn init_phase2(
        &mut self,
        max_record_len: u32,
        engine_region: &mut [u8],
    ) -> Result<(), CodecStatus>;

    /// Append one biallelic, unphased variant.
    fn write_biallelic(&mut self, genovec: &[u64]) -> Result<(), CodecStatus>;

    /// Append one biallelic variant carrying phase information.
    fn write_biallelic_phased(
        &mut self,
        genovec: &[u64],
        phase_present: Option<&[u64]>,
        phase_info: &[u64],
    ) -> Result<(), CodecStatus>;

    /// Append one multiallelic, unphased variant with sparse overflow.
    fn write_multiallelic_sparse(
        &mut self,
        genovec: &[u64],
        patches: PatchRefs<'_>,
        allele_ct: u32,
    ) -> Result<(), CodecStatus>;

    /// Append one multiallelic variant with sparse overflow and phase
    /// information.
    fn write_multiallelic_phased(
        &mut self,
        genovec: &[u64],
        patches: PatchRefs<'_>,
        phase_present: Option<&[u64]>,
        phase_info: &[u64],
        allele_ct: u32,
    ) -> Result<(), CodecStatus>;

    /// Number of variants the engine has written so far.
    fn variant_index(&self) -> u32;

    /// Variant count the engine was initialized with.
    fn declared_count(&self) -> u32;

    /// Flush index/metadata and finalize the output file.
    ///
    /// Calling this with zero variants written is undefined in the engine;
    /// the session never does.
    fn finish(&mut self) -> Result<(), CodecStatus>;

    /// Release the engine's internal state.
    fn cleanup(&mut self) -> Result<(), CodecStatus>;
}

/// Sessions own their engine by value; this lets callers hand over a
/// borrow instead when they need the engine back after close (tests, or
/// adapters that pool engine state).
impl<E: CodecEngine + ?Sized> CodecEngine for &mut E {
    fn init_phase1(
        &mut self,
        path: &Path,
        variant_count_limit: u32,
        sample_count: u32,
        allele_count_limit: u32,
        mode: WriteMode,
        flags: WriteFlags,
    ) -> Result<InitPlan, CodecStatus> {
        (**self).init_phase1(
            path,
            variant_count_limit,
            sample_count,
            allele_count_limit,
            mode,
            flags,
        )
    }

    fn init_phase2(
        &mut self,
        max_record_len: u32,
        engine_region: &mut [u8],
    ) -> Result<(), CodecStatus> {
        (**self).init_phase2(max_record_len, engine_region)
    }

    fn write_biallelic(&mut self, genovec: &[u64]) -> Result<(), CodecStatus> {
        (**self).write_biallelic(genovec)
    }

    fn write_biallelic_phased(
        &mut self,
        genovec: &[u64],
        phase_present: Option<&[u64]>,
        phase_info: &[u64],
    ) -> Result<(), CodecStatus> {
        (**self).write_biallelic_phased(genovec, phase_present, phase_info)
    }

    fn write_multiallelic_sparse(
        &mut self,
        genovec: &[u64],
        patches: PatchRefs<'_>,
        allele_ct: u32,
    ) -> Result<(), CodecStatus> {
        (**self).write_multiallelic_sparse(genovec, patches, allele_ct)
    }

    fn write_multiallelic_phased(
        &mut self,
        genovec: &[u64],
        patches: PatchRefs<'_>,
        phase_present: Option<&[u64]>,
        phase_info: &[u64],
        allele_ct: u32,
    ) -> Result<(), CodecStatus> {
        (**self).write_multiallelic_phased(genovec, patches, phase_present, phase_info, allele_ct)
    }

    fn variant_index(&self) -> u32 {
        (**self).variant_index()
    }

    fn declared_count(&self) -> u32 {
        (**self).declared_count()
    }

    fn finish(&mut self) -> Result<(), CodecStatus> {
        (**self).finish()
    }

    fn cleanup(&mut self) -> Result<(), CodecStatus> {
        (**self).cleanup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_names_code_and_name() {
        let s = CodecStatus::VarRecordTooLarge.to_string();
        assert!(s.contains("11"));
        assert!(s.contains("VarRecordTooLarge"));
    }
}
