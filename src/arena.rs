//! # Arena Layout Planner and Scratch-Buffer Arena
//!
//! One write session owns one contiguous, cacheline-aligned block holding
//! every per-variant scratch buffer: the 2-bit genotype vector, the two
//! sparse multiallelic overflow ("patch") structures, the phase bit
//! vectors, and the dosage buffers. The codec engine's private scratch is
//! reserved at the front of the same block, so a single drop releases
//! everything.
//!
//! The planner is a pure function of the sample count. The arena replaces
//! the original design's raw pointer offsets into one `malloc` block with
//! typed, non-overlapping slice views carved by `split_at_mut`, so an
//! offset bug is a panic at construction instead of silent corruption.

use aligned_vec::{AVec, ConstAlign};

use crate::format::{round_up_to_cacheline, CACHELINE, NYPS_PER_WORD};

/// 64-bit words needed for a one-bit-per-sample vector.
pub(crate) fn bitvec_words(sample_count: u32) -> usize {
    (sample_count as usize).div_ceil(64)
}

/// 64-bit words needed for the 2-bits-per-sample genotype vector.
pub(crate) fn genovec_words(sample_count: u32) -> usize {
    (sample_count as usize).div_ceil(NYPS_PER_WORD)
}

/// Role of one buffer within the arena, in carve order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferRole {
    /// 2-bit packed genotype vector
    Genovec,
    /// Presence set for samples with one non-reference allele code > 1
    Patch01Set,
    /// Allele-code values for patch-01 samples (one per set bit)
    Patch01Vals,
    /// Presence set for samples with two non-reference allele codes
    Patch10Set,
    /// Allele-code values for patch-10 samples (two per set bit)
    Patch10Vals,
    /// Per-sample phase presence bits
    PhasePresent,
    /// Per-sample phase orientation bits
    PhaseInfo,
    /// Per-sample dosage presence bits
    DosagePresent,
    /// Per-sample dosage values
    DosageMain,
}

/// One planned buffer: element geometry plus its cacheline-rounded region.
#[derive(Clone, Copy, Debug)]
pub struct PlannedBuffer {
    pub role: BufferRole,
    /// Element width in bytes (8 for word-packed bit vectors).
    pub element_width: usize,
    pub element_count: usize,
    /// Byte offset within the planned region (excludes the engine reserve).
    pub offset: usize,
    /// Cacheline-rounded region length in bytes.
    pub byte_len: usize,
}

/// Ordered allocation plan for every session scratch buffer.
///
/// Buffers are carved in a fixed order out of one block; every offset is a
/// multiple of the cacheline size and regions never overlap.
#[derive(Clone, Debug)]
pub struct ArenaPlan {
    sample_count: u32,
    buffers: [PlannedBuffer; 9],
    total_bytes: usize,
}

impl ArenaPlan {
    /// Plan every scratch buffer for `sample_count` samples.
    ///
    /// Pure; never fails for `sample_count >= 1`.
    pub fn for_samples(sample_count: u32) -> Self {
        assert!(sample_count >= 1, "arena plan requires at least one sample");

        let n = sample_count as usize;
        let word = std::mem::size_of::<u64>();
        let allele_code = std::mem::size_of::<u32>();
        let dosage = std::mem::size_of::<u16>();

        let layout: [(BufferRole, usize, usize); 9] = [
            (BufferRole::Genovec, word, genovec_words(sample_count)),
            (BufferRole::Patch01Set, word, bitvec_words(sample_count)),
            (BufferRole::Patch01Vals, allele_code, n),
            (BufferRole::Patch10Set, word, bitvec_words(sample_count)),
            (BufferRole::Patch10Vals, allele_code, 2 * n),
            (BufferRole::PhasePresent, word, bitvec_words(sample_count)),
            (BufferRole::PhaseInfo, word, bitvec_words(sample_count)),
            (BufferRole::DosagePresent, word, bitvec_words(sample_count)),
            (BufferRole::DosageMain, dosage, n),
        ];

        let mut offset = 0;
        let buffers = layout.map(|(role, element_width, element_count)| {
            let byte_len = round_up_to_cacheline(element_width * element_count);
            let buf = PlannedBuffer {
                role,
                element_width,
                element_count,
                offset,
                byte_len,
            };
            offset += byte_len;
            buf
        });

        Self {
            sample_count,
            buffers,
            total_bytes: offset,
        }
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn buffers(&self) -> &[PlannedBuffer] {
        &self.buffers
    }

    /// Total planned bytes, excluding the engine's reserved region.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}

/// Typed, non-overlapping mutable views over one arena block.
///
/// Views are reborrowed from the arena on every append; callers must not
/// retain buffer contents across appends, since every buffer is rewritten
/// in place by the next variant.
#[derive(Debug)]
pub struct ArenaViews<'a> {
    pub sample_count: u32,
    pub genovec: &'a mut [u64],
    pub patch01_set: &'a mut [u64],
    pub patch01_vals: &'a mut [u32],
    pub patch10_set: &'a mut [u64],
    pub patch10_vals: &'a mut [u32],
    pub phase_present: &'a mut [u64],
    pub phase_info: &'a mut [u64],
    pub dosage_present: &'a mut [u64],
    pub dosage_main: &'a mut [u16],
}

/// The session's single scratch allocation: engine reserve first, then the
/// planned buffers, all cacheline-aligned.
#[derive(Debug)]
pub struct Arena {
    block: AVec<u8, ConstAlign<CACHELINE>>,
    plan: ArenaPlan,
    engine_bytes: usize,
}

impl Arena {
    /// Allocate the block for `plan` plus `engine_cachelines` of reserved
    /// engine scratch, zero-filled.
    pub fn allocate(plan: ArenaPlan, engine_cachelines: usize) -> Self {
        let engine_bytes = engine_cachelines * CACHELINE;
        let total = engine_bytes + plan.total_bytes();

        let mut block: AVec<u8, ConstAlign<CACHELINE>> = AVec::new(CACHELINE);
        block.resize(total, 0);

        let mut arena = Self {
            block,
            plan,
            engine_bytes,
        };
        arena.clear_trailing_words();
        arena
    }

    pub fn plan(&self) -> &ArenaPlan {
        &self.plan
    }

    /// The engine's private region at the front of the block.
    pub fn engine_region(&mut self) -> &mut [u8] {
        &mut self.block[..self.engine_bytes]
    }

    /// Carve the typed buffer views out of the block.
    ///
    /// Alignment of every region is guaranteed by the cacheline-rounded
    /// plan offsets and the block's alignment; the casts assert it.
    pub fn views(&mut self) -> ArenaViews<'_> {
        let lens: [usize; 9] = std::array::from_fn(|i| self.plan.buffers[i].byte_len);
        let mut rest: &mut [u8] = &mut self.block[self.engine_bytes..];

        fn take<'a>(rest: &mut &'a mut [u8], len: usize) -> &'a mut [u8] {
            let slab = std::mem::take(rest);
            let (head, tail) = slab.split_at_mut(len);
            *rest = tail;
            head
        }

        let genovec = bytemuck::cast_slice_mut(take(&mut rest, lens[0]));
        let patch01_set = bytemuck::cast_slice_mut(take(&mut rest, lens[1]));
        let patch01_vals = bytemuck::cast_slice_mut(take(&mut rest, lens[2]));
        let patch10_set = bytemuck::cast_slice_mut(take(&mut rest, lens[3]));
        let patch10_vals = bytemuck::cast_slice_mut(take(&mut rest, lens[4]));
        let phase_present = bytemuck::cast_slice_mut(take(&mut rest, lens[5]));
        let phase_info = bytemuck::cast_slice_mut(take(&mut rest, lens[6]));
        let dosage_present = bytemuck::cast_slice_mut(take(&mut rest, lens[7]));
        let dosage_main = bytemuck::cast_slice_mut(take(&mut rest, lens[8]));
        debug_assert!(rest.is_empty());

        ArenaViews {
            sample_count: self.plan.sample_count,
            genovec,
            patch01_set,
            patch01_vals,
            patch10_set,
            patch10_vals,
            phase_present,
            phase_info,
            dosage_present,
            dosage_main,
        }
    }

    /// Zero the final machine word of the genotype vector and phase-present
    /// set when the sample count does not fill it completely.
    ///
    /// Trailing garbage bits in a partially filled last word would corrupt
    /// the engine's encoding of the final samples.
    pub fn clear_trailing_words(&mut self) {
        let sample_count = self.plan.sample_count;
        let views = self.views();
        if sample_count as usize % NYPS_PER_WORD != 0 {
            views.genovec[genovec_words(sample_count) - 1] = 0;
        }
        if sample_count % 64 != 0 {
            views.phase_present[bitvec_words(sample_count) - 1] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_offsets_are_cacheline_aligned() {
        for sample_count in [1, 3, 63, 64, 65, 255, 256, 257, 511, 512, 513, 100_000] {
            let plan = ArenaPlan::for_samples(sample_count);
            for buf in plan.buffers() {
                assert_eq!(buf.offset % CACHELINE, 0, "role {:?}", buf.role);
                assert_eq!(buf.byte_len % CACHELINE, 0, "role {:?}", buf.role);
            }
        }
    }

    #[test]
    fn test_plan_regions_never_overlap() {
        let plan = ArenaPlan::for_samples(1000);
        let mut end = 0;
        for buf in plan.buffers() {
            assert!(buf.offset >= end, "role {:?} overlaps predecessor", buf.role);
            assert!(buf.byte_len >= buf.element_width * buf.element_count);
            end = buf.offset + buf.byte_len;
        }
        assert_eq!(end, plan.total_bytes());
    }

    #[test]
    fn test_plan_matches_cacheline_formulas() {
        // bit vectors: ceil(n / 512) cachelines; genovec: ceil(n / 256)
        let plan = ArenaPlan::for_samples(513);
        let by_role = |role| {
            plan.buffers()
                .iter()
                .find(|b| b.role == role)
                .unwrap()
                .byte_len
        };
        assert_eq!(by_role(BufferRole::Genovec), 3 * CACHELINE);
        assert_eq!(by_role(BufferRole::PhasePresent), 2 * CACHELINE);
        assert_eq!(by_role(BufferRole::Patch01Vals), 33 * CACHELINE);
        assert_eq!(by_role(BufferRole::DosageMain), 17 * CACHELINE);
    }

    #[test]
    fn test_arena_views_have_planned_element_counts() {
        let plan = ArenaPlan::for_samples(77);
        let mut arena = Arena::allocate(plan, 4);
        assert_eq!(arena.engine_region().len(), 4 * CACHELINE);

        let views = arena.views();
        assert_eq!(views.sample_count, 77);
        assert!(views.genovec.len() >= genovec_words(77));
        assert!(views.patch01_set.len() >= bitvec_words(77));
        assert!(views.patch01_vals.len() >= 77);
        assert!(views.patch10_vals.len() >= 154);
        assert!(views.dosage_main.len() >= 77);
    }

    #[test]
    fn test_arena_is_zeroed_at_allocation() {
        let mut arena = Arena::allocate(ArenaPlan::for_samples(130), 2);
        let views = arena.views();
        assert!(views.genovec.iter().all(|&w| w == 0));
        assert!(views.phase_present.iter().all(|&w| w == 0));
    }

    #[test]
    fn test_clear_trailing_words_scrubs_partial_tail() {
        let mut arena = Arena::allocate(ArenaPlan::for_samples(33), 0);
        {
            let views = arena.views();
            views.genovec[genovec_words(33) - 1] = u64::MAX;
            views.phase_present[bitvec_words(33) - 1] = u64::MAX;
        }
        arena.clear_trailing_words();
        let views = arena.views();
        assert_eq!(views.genovec[genovec_words(33) - 1], 0);
        assert_eq!(views.phase_present[bitvec_words(33) - 1], 0);
    }
}
