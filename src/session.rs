//! # Write Session
//!
//! The stateful open/append/close protocol over the codec engine. One
//! session owns one arena of scratch buffers, one engine handle, and the
//! variant counters; `append` is called once per variant and rewrites the
//! buffers in place.
//!
//! The `Uninitialized -> Open -> Closed` state machine is enforced by
//! ownership: `open` returns the session by value and `close` consumes it,
//! so a call after close is a compile error rather than a runtime check.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::arena::{Arena, ArenaPlan};
use crate::codec::{CodecEngine, PatchRefs};
use crate::convert::convert_allele_codes;
use crate::error::{PgenError, Result};
use crate::format::{MAX_ALT_ALLELES, MAX_VARIANT_COUNT, VARIANT_COUNT_UNKNOWN};

/// How the engine lays out the output file, chosen at open time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Revisit the file header once all variants are known; requires the
    /// variant count to be exact up front.
    SeekBackward,
    /// Emit a companion `.pgen.pgi` index file; the declared variant count
    /// may be an upper bound.
    SeparateIndex,
    /// Buffer records and copy into the final layout at close. The mode to
    /// use when the allele-count ceiling exceeds the biallelic default or
    /// only an upper bound on the variant count is known.
    WriteAndCopy,
}

/// Per-session feature flags, immutable for the session lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteFlags {
    /// Track per-sample phasing and use the phased engine primitives.
    pub preserve_phasing: bool,
    /// Allow the sparse multiallelic overflow encoding. Requires
    /// `preserve_phasing`: the overflow structures are only safely usable
    /// alongside the phasing bookkeeping.
    pub multi_allelic: bool,
}

impl WriteFlags {
    pub const NONE: WriteFlags = WriteFlags {
        preserve_phasing: false,
        multi_allelic: false,
    };

    pub const PHASED: WriteFlags = WriteFlags {
        preserve_phasing: true,
        multi_allelic: false,
    };

    pub const MULTIALLELIC_PHASED: WriteFlags = WriteFlags {
        preserve_phasing: true,
        multi_allelic: true,
    };
}

/// Immutable session limits fixed at open.
#[derive(Clone, Copy, Debug)]
pub struct SessionLimits {
    sample_count: u32,
    /// `None` when the caller only knows an upper bound.
    declared_variant_count: Option<u32>,
    /// Total allele ceiling, reference included (`max_alt_alleles + 1`).
    allele_count_limit: u32,
}

impl SessionLimits {
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn declared_variant_count(&self) -> Option<u32> {
        self.declared_variant_count
    }

    pub fn allele_count_limit(&self) -> u32 {
        self.allele_count_limit
    }
}

/// Which engine write primitive one variant dispatches to, selected from
/// the two observed booleans: has multiallelic overflow x carries phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VariantEncoding {
    Biallelic,
    BiallelicPhased,
    MultiallelicSparse,
    MultiallelicPhased,
}

impl VariantEncoding {
    fn select(has_patches: bool, carries_phase: bool) -> Self {
        match (has_patches, carries_phase) {
            (false, false) => VariantEncoding::Biallelic,
            (false, true) => VariantEncoding::BiallelicPhased,
            (true, false) => VariantEncoding::MultiallelicSparse,
            (true, true) => VariantEncoding::MultiallelicPhased,
        }
    }
}

/// An open pgen write session.
///
/// Buffers are exclusively owned and rewritten on every append; callers
/// must not retain buffer contents across calls and must serialize all
/// calls on one session. Distinct sessions are fully independent.
#[derive(Debug)]
pub struct WriteSession<E: CodecEngine> {
    engine: E,
    arena: Arena,
    path: PathBuf,
    mode: WriteMode,
    flags: WriteFlags,
    limits: SessionLimits,
    variants_written: u32,
}

impl<E: CodecEngine> WriteSession<E> {
    /// Open a write session.
    ///
    /// Validates the parameters, sizes and allocates the arena, and runs
    /// the engine's two initialization phases. `variant_count` may be
    /// [`VARIANT_COUNT_UNKNOWN`] except under [`WriteMode::SeekBackward`].
    pub fn open(
        path: &Path,
        mode: WriteMode,
        flags: WriteFlags,
        variant_count: u32,
        sample_count: u32,
        max_alt_alleles: u32,
        mut engine: E,
    ) -> Result<Self> {
        if sample_count < 1 {
            return Err(PgenError::validation(format!(
                "sample count must be at least 1, got {sample_count}"
            )));
        }
        if variant_count < 1 {
            return Err(PgenError::validation(format!(
                "variant count must be at least 1 (or the unknown sentinel), got {variant_count}"
            )));
        }
        if variant_count > MAX_VARIANT_COUNT {
            return Err(PgenError::validation(format!(
                "variant count {variant_count} exceeds the format maximum {MAX_VARIANT_COUNT}"
            )));
        }
        if max_alt_alleles < 2 {
            return Err(PgenError::validation(format!(
                "max alternate alleles must be at least 2, got {max_alt_alleles}"
            )));
        }
        if max_alt_alleles > MAX_ALT_ALLELES {
            return Err(PgenError::validation(format!(
                "max alternate alleles {max_alt_alleles} exceeds the format maximum \
                 {MAX_ALT_ALLELES}"
            )));
        }
        if mode == WriteMode::SeekBackward && variant_count == VARIANT_COUNT_UNKNOWN {
            return Err(PgenError::validation(
                "seek-backward write mode requires an exact variant count, \
                 not the unknown sentinel",
            ));
        }
        if flags.multi_allelic && !flags.preserve_phasing {
            return Err(PgenError::validation(
                "the multiallelic flag requires the preserve-phasing flag",
            ));
        }

        let limits = SessionLimits {
            sample_count,
            declared_variant_count: (variant_count != VARIANT_COUNT_UNKNOWN)
                .then_some(variant_count),
            allele_count_limit: max_alt_alleles + 1,
        };

        let init = engine
            .init_phase1(
                path,
                variant_count,
                sample_count,
                limits.allele_count_limit,
                mode,
                flags,
            )
            .map_err(|status| PgenError::codec(status, "engine initialization phase 1 failed"))?;

        let plan = ArenaPlan::for_samples(sample_count);
        let mut arena = Arena::allocate(plan, init.arena_cachelines);
        engine
            .init_phase2(init.max_record_len, arena.engine_region())
            .map_err(|status| PgenError::codec(status, "engine initialization phase 2 failed"))?;

        debug!(
            path = %path.display(),
            ?mode,
            ?flags,
            sample_count,
            variant_count,
            allele_count_limit = limits.allele_count_limit,
            arena_bytes = arena.plan().total_bytes(),
            "opened pgen write session"
        );

        Ok(Self {
            engine,
            arena,
            path: path.to_path_buf(),
            mode,
            flags,
            limits,
            variants_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn flags(&self) -> WriteFlags {
        self.flags
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    /// Number of variants actually recorded by the engine.
    pub fn written_variant_count(&self) -> u32 {
        self.engine.variant_index()
    }

    /// Append one variant.
    ///
    /// `allele_codes` holds two codes per sample. `phase_bytes` (one byte
    /// per sample, nonzero = phased) is required when the session preserves
    /// phasing and ignored otherwise. `allele_ct` is the variant's claimed
    /// total allele count; it is what the engine receives, since it covers
    /// the variant's full allele space rather than only the alleles seen
    /// in this genotype sample.
    ///
    /// A failed append leaves the session open with its counter unchanged;
    /// the caller may skip the variant and reconcile through the dropped
    /// count at close.
    pub fn append(
        &mut self,
        allele_codes: &[i32],
        phase_bytes: Option<&[u8]>,
        allele_ct: u32,
    ) -> Result<()> {
        let sample_count = self.limits.sample_count as usize;
        if allele_codes.len() != 2 * sample_count {
            return Err(PgenError::validation(format!(
                "expected {} allele codes (2 per sample), got {}",
                2 * sample_count,
                allele_codes.len()
            )));
        }

        // Phasing completeness for this variant: all-phased uses the
        // engine's "everything phased" call shape, anything else carries
        // the per-sample presence set.
        let phase_bytes = if self.flags.preserve_phasing {
            let pb = phase_bytes.ok_or_else(|| {
                PgenError::validation(
                    "session preserves phasing but no phase bytes were supplied",
                )
            })?;
            if pb.len() != sample_count {
                return Err(PgenError::validation(format!(
                    "expected {} phase bytes (1 per sample), got {}",
                    sample_count,
                    pb.len()
                )));
            }
            Some(pb)
        } else {
            None
        };
        let all_phased = phase_bytes.is_some_and(|pb| pb.iter().all(|&b| b != 0));

        let mut views = self.arena.views();
        let summary = convert_allele_codes(allele_codes, phase_bytes, &mut views)?;

        if summary.observed_allele_ct > self.limits.allele_count_limit {
            return Err(PgenError::validation(format!(
                "variant has {} alleles which exceeds the session limit of {}; \
                 reopen the writer with a higher allele limit",
                summary.observed_allele_ct, self.limits.allele_count_limit
            )));
        }
        if allele_ct < summary.observed_allele_ct {
            return Err(PgenError::validation(format!(
                "caller declared {} alleles but the genotypes use {}",
                allele_ct, summary.observed_allele_ct
            )));
        }
        if allele_ct > self.limits.allele_count_limit {
            return Err(PgenError::validation(format!(
                "caller declared {} alleles which exceeds the session limit of {}",
                allele_ct, self.limits.allele_count_limit
            )));
        }

        let encoding =
            VariantEncoding::select(summary.has_patches(), self.flags.preserve_phasing);
        let patches = PatchRefs {
            set_01: views.patch01_set,
            vals_01: views.patch01_vals,
            ct_01: summary.patch01_ct,
            set_10: views.patch10_set,
            vals_10: views.patch10_vals,
            ct_10: summary.patch10_ct,
        };
        let phase_present = (!all_phased).then_some(&*views.phase_present);

        let engine = &mut self.engine;
        let write_result = match encoding {
            VariantEncoding::Biallelic => engine.write_biallelic(views.genovec),
            VariantEncoding::BiallelicPhased => {
                engine.write_biallelic_phased(views.genovec, phase_present, views.phase_info)
            }
            VariantEncoding::MultiallelicSparse => {
                engine.write_multiallelic_sparse(views.genovec, patches, allele_ct)
            }
            VariantEncoding::MultiallelicPhased => engine.write_multiallelic_phased(
                views.genovec,
                patches,
                phase_present,
                views.phase_info,
                allele_ct,
            ),
        };
        write_result
            .map_err(|status| PgenError::codec(status, "appending variant record failed"))?;

        self.variants_written += 1;
        trace!(
            variant = self.variants_written,
            ?encoding,
            allele_ct,
            patch01 = summary.patch01_ct,
            patch10 = summary.patch10_ct,
            all_phased,
            "appended variant"
        );
        Ok(())
    }

    /// Close the session, consuming it.
    ///
    /// `dropped_variant_count` reconciles a known declared count against
    /// variants the caller intentionally skipped. A count mismatch yields
    /// [`PgenError::MissingVariants`]; zero written variants yields
    /// [`PgenError::EmptyOutput`]. The arena and engine state are released
    /// on every path, including the mismatch path (the engine's own release
    /// error is suppressed there so it cannot mask the accounting failure).
    pub fn close(mut self, dropped_variant_count: u32) -> Result<()> {
        let written = self.engine.variant_index();
        debug_assert_eq!(written, self.variants_written);

        debug!(
            path = %self.path.display(),
            written,
            dropped_variant_count,
            declared = ?self.limits.declared_variant_count,
            "closing pgen write session"
        );

        let declared = self.engine.declared_count();
        debug_assert_eq!(
            (declared != VARIANT_COUNT_UNKNOWN).then_some(declared),
            self.limits.declared_variant_count
        );
        if declared != VARIANT_COUNT_UNKNOWN {
            let expected = declared.saturating_sub(dropped_variant_count);
            if written != expected {
                // The finalize/cleanup entry points are undefined in the
                // engine at zero written variants; skip them there.
                if written > 0 {
                    let _ = self.engine.cleanup();
                }
                return Err(PgenError::MissingVariants {
                    written: written as u64,
                    expected: expected as u64,
                });
            }
        }

        if written == 0 {
            return Err(PgenError::EmptyOutput);
        }

        if let Err(status) = self.engine.finish() {
            let _ = self.engine.cleanup();
            return Err(PgenError::codec(status, "finalizing pgen output failed"));
        }
        self.engine
            .cleanup()
            .map_err(|status| PgenError::codec(status, "releasing codec engine state failed"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecStatus, InitPlan};

    /// Minimal engine for validating the open/close protocol; write
    /// primitives only count calls.
    #[derive(Debug, Default)]
    struct CountingEngine {
        written: u32,
        declared: u32,
        finished: bool,
        cleaned: bool,
        fail_writes_with: Option<CodecStatus>,
    }

    impl CodecEngine for CountingEngine {
        fn init_phase1(
            &mut self,
            _path: &Path,
            variant_count_limit: u32,
            _sample_count: u32,
            _allele_count_limit: u32,
            _mode: WriteMode,
            _flags: WriteFlags,
        ) -> std::result::Result<InitPlan, CodecStatus> {
            self.declared = variant_count_limit;
            Ok(InitPlan {
                arena_cachelines: 2,
                max_record_len: 16,
            })
        }

        fn init_phase2(
            &mut self,
            _max_record_len: u32,
            engine_region: &mut [u8],
        ) -> std::result::Result<(), CodecStatus> {
            assert_eq!(engine_region.len(), 2 * crate::format::CACHELINE);
            Ok(())
        }

        fn write_biallelic(&mut self, _genovec: &[u64]) -> std::result::Result<(), CodecStatus> {
            if let Some(status) = self.fail_writes_with {
                return Err(status);
            }
            self.written += 1;
            Ok(())
        }

        fn write_biallelic_phased(
            &mut self,
            _genovec: &[u64],
            _phase_present: Option<&[u64]>,
            _phase_info: &[u64],
        ) -> std::result::Result<(), CodecStatus> {
            self.written += 1;
            Ok(())
        }

        fn write_multiallelic_sparse(
            &mut self,
            _genovec: &[u64],
            _patches: PatchRefs<'_>,
            _allele_ct: u32,
        ) -> std::result::Result<(), CodecStatus> {
            self.written += 1;
            Ok(())
        }

        fn write_multiallelic_phased(
            &mut self,
            _genovec: &[u64],
            _patches: PatchRefs<'_>,
            _phase_present: Option<&[u64]>,
            _phase_info: &[u64],
            _allele_ct: u32,
        ) -> std::result::Result<(), CodecStatus> {
            self.written += 1;
            Ok(())
        }

        fn variant_index(&self) -> u32 {
            self.written
        }

        fn declared_count(&self) -> u32 {
            self.declared
        }

        fn finish(&mut self) -> std::result::Result<(), CodecStatus> {
            self.finished = true;
            Ok(())
        }

        fn cleanup(&mut self) -> std::result::Result<(), CodecStatus> {
            self.cleaned = true;
            Ok(())
        }
    }

    fn open_session(
        mode: WriteMode,
        flags: WriteFlags,
        variant_count: u32,
        sample_count: u32,
    ) -> Result<WriteSession<CountingEngine>> {
        WriteSession::open(
            Path::new("test.pgen"),
            mode,
            flags,
            variant_count,
            sample_count,
            7,
            CountingEngine::default(),
        )
    }

    #[test]
    fn test_open_rejects_zero_samples() {
        let err = open_session(WriteMode::WriteAndCopy, WriteFlags::NONE, 6, 0).unwrap_err();
        assert!(matches!(err, PgenError::Validation { .. }));
    }

    #[test]
    fn test_open_rejects_zero_variants() {
        let err = open_session(WriteMode::WriteAndCopy, WriteFlags::NONE, 0, 3).unwrap_err();
        assert!(matches!(err, PgenError::Validation { .. }));
    }

    #[test]
    fn test_open_rejects_allele_limit_out_of_bounds() {
        for max_alt in [0, 1, 255, 1000] {
            let err = WriteSession::open(
                Path::new("test.pgen"),
                WriteMode::WriteAndCopy,
                WriteFlags::NONE,
                6,
                3,
                max_alt,
                CountingEngine::default(),
            )
            .unwrap_err();
            assert!(
                matches!(err, PgenError::Validation { .. }),
                "max_alt {max_alt}"
            );
        }
    }

    #[test]
    fn test_open_rejects_seek_backward_with_unknown_count() {
        let err = open_session(
            WriteMode::SeekBackward,
            WriteFlags::NONE,
            VARIANT_COUNT_UNKNOWN,
            3,
        )
        .unwrap_err();
        assert!(matches!(err, PgenError::Validation { .. }));

        // The other modes accept the sentinel.
        assert!(open_session(
            WriteMode::WriteAndCopy,
            WriteFlags::NONE,
            VARIANT_COUNT_UNKNOWN,
            3
        )
        .is_ok());
    }

    #[test]
    fn test_open_rejects_multiallelic_without_phasing() {
        let flags = WriteFlags {
            preserve_phasing: false,
            multi_allelic: true,
        };
        let err = open_session(WriteMode::WriteAndCopy, flags, 6, 3).unwrap_err();
        assert!(matches!(err, PgenError::Validation { .. }));

        assert!(
            open_session(WriteMode::WriteAndCopy, WriteFlags::MULTIALLELIC_PHASED, 6, 3).is_ok()
        );
    }

    #[test]
    fn test_append_requires_phase_bytes_when_phasing_preserved() {
        let mut session =
            open_session(WriteMode::WriteAndCopy, WriteFlags::PHASED, 6, 3).unwrap();
        let err = session.append(&[0, 0, 0, 1, 1, 1], None, 2).unwrap_err();
        assert!(matches!(err, PgenError::Validation { .. }));
        assert_eq!(session.written_variant_count(), 0);
    }

    #[test]
    fn test_append_rejects_underdeclared_allele_count() {
        let mut session = open_session(
            WriteMode::WriteAndCopy,
            WriteFlags::MULTIALLELIC_PHASED,
            6,
            3,
        )
        .unwrap();
        // genotypes use alleles 0..=3 (4 observed) but the caller claims 3
        let err = session
            .append(&[0, 3, 0, 1, 1, 1], Some(&[1, 1, 1]), 3)
            .unwrap_err();
        assert!(matches!(err, PgenError::Validation { .. }));
        assert_eq!(session.written_variant_count(), 0);
    }

    #[test]
    fn test_append_rejects_allele_count_beyond_session_limit() {
        let mut session = open_session(
            WriteMode::WriteAndCopy,
            WriteFlags::MULTIALLELIC_PHASED,
            6,
            3,
        )
        .unwrap();
        // session limit is 8 total alleles (7 alt + ref)
        let err = session
            .append(&[0, 0, 0, 1, 1, 1], Some(&[1, 1, 1]), 9)
            .unwrap_err();
        assert!(matches!(err, PgenError::Validation { .. }));
    }

    #[test]
    fn test_failed_append_leaves_counter_unchanged() {
        let mut session = open_session(WriteMode::WriteAndCopy, WriteFlags::NONE, 2, 3).unwrap();
        session.engine.fail_writes_with = Some(CodecStatus::WriteFail);
        let err = session.append(&[0, 0, 0, 1, 1, 1], None, 2).unwrap_err();
        assert!(matches!(err, PgenError::Codec { .. }));
        assert_eq!(session.written_variant_count(), 0);

        session.engine.fail_writes_with = None;
        session.append(&[0, 0, 0, 1, 1, 1], None, 2).unwrap();
        session.append(&[1, 1, 0, 0, 0, 1], None, 2).unwrap();
        session.close(0).unwrap();
    }

    #[test]
    fn test_close_accounting() {
        let mut session = open_session(WriteMode::WriteAndCopy, WriteFlags::NONE, 6, 3).unwrap();
        for _ in 0..4 {
            session.append(&[0, 0, 0, 1, 1, 1], None, 2).unwrap();
        }
        // declared 6, wrote 4, dropped 2 -> balanced
        session.close(2).unwrap();
    }

    #[test]
    fn test_close_detects_missing_variants() {
        let mut session = open_session(WriteMode::WriteAndCopy, WriteFlags::NONE, 6, 3).unwrap();
        session.append(&[0, 0, 0, 1, 1, 1], None, 2).unwrap();
        let err = session.close(0).unwrap_err();
        match err {
            PgenError::MissingVariants { written, expected } => {
                assert_eq!(written, 1);
                assert_eq!(expected, 6);
            }
            other => panic!("expected MissingVariants, got {other:?}"),
        }
    }

    #[test]
    fn test_close_with_zero_variants_is_empty_output() {
        // With the declared count fully dropped, the count check passes and
        // the empty-output rule still fires.
        let session = open_session(WriteMode::WriteAndCopy, WriteFlags::NONE, 6, 3).unwrap();
        let err = session.close(6).unwrap_err();
        assert!(matches!(err, PgenError::EmptyOutput));

        // Unknown declared count, nothing written: same rule.
        let session = open_session(
            WriteMode::WriteAndCopy,
            WriteFlags::NONE,
            VARIANT_COUNT_UNKNOWN,
            3,
        )
        .unwrap();
        let err = session.close(0).unwrap_err();
        assert!(matches!(err, PgenError::EmptyOutput));
    }

    #[test]
    fn test_encoding_dispatch_table() {
        assert_eq!(
            VariantEncoding::select(false, false),
            VariantEncoding::Biallelic
        );
        assert_eq!(
            VariantEncoding::select(false, true),
            VariantEncoding::BiallelicPhased
        );
        assert_eq!(
            VariantEncoding::select(true, false),
            VariantEncoding::MultiallelicSparse
        );
        assert_eq!(
            VariantEncoding::select(true, true),
            VariantEncoding::MultiallelicPhased
        );
    }
}
