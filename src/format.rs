//! # PGEN Format Constants
//!
//! Geometry and ceilings of the PGEN on-disk format that the write session
//! must agree on with the codec engine. The engine owns the byte layout of
//! the output file; these constants only describe the shared buffer geometry
//! and the format-defined count limits.

/// Cacheline size, in bytes, that the codec engine requires every scratch
/// buffer to be aligned to and padded up to.
pub const CACHELINE: usize = 64;

/// Bits held by one cacheline (used to size per-sample bit vectors).
pub const BITS_PER_CACHELINE: usize = CACHELINE * 8;

/// Two-bit genotype entries held by one cacheline.
pub const NYPS_PER_CACHELINE: usize = CACHELINE * 4;

/// Two-bit genotype entries held by one 64-bit word.
pub const NYPS_PER_WORD: usize = 32;

/// Maximum variant count the format can represent.
pub const MAX_VARIANT_COUNT: u32 = 0x7fff_fffd;

/// Sentinel variant count meaning "unknown, bounded by the format maximum".
///
/// Matches the format convention of using the maximum representable count
/// as the "unknown" marker, so a declared count can always be passed to the
/// engine as a plain integer.
pub const VARIANT_COUNT_UNKNOWN: u32 = MAX_VARIANT_COUNT;

/// Maximum number of alternate alleles a single variant may declare.
pub const MAX_ALT_ALLELES: u32 = 254;

/// Highest representable allele code (total alleles include the reference,
/// so codes run `0..=MAX_ALT_ALLELES`).
pub const MAX_ALLELE_CODE: i32 = MAX_ALT_ALLELES as i32;

/// Sentinel allele code for a missing call.
pub const MISSING_ALLELE_CODE: i32 = -9;

/// Packed two-bit genotype value for a missing call.
pub const GENO_MISSING: u64 = 3;

/// Primary output file extension.
pub const PGEN_EXTENSION: &str = ".pgen";

/// Companion index file extension (written by the engine under
/// [`crate::session::WriteMode::SeparateIndex`]).
pub const PGEN_INDEX_EXTENSION: &str = ".pgen.pgi";

/// Round `n` up to the next multiple of `CACHELINE`.
pub const fn round_up_to_cacheline(n: usize) -> usize {
    (n + CACHELINE - 1) / CACHELINE * CACHELINE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cacheline_geometry() {
        assert_eq!(BITS_PER_CACHELINE, 512);
        assert_eq!(NYPS_PER_CACHELINE, 256);
        assert_eq!(NYPS_PER_WORD, 32);
    }

    #[test]
    fn test_round_up() {
        assert_eq!(round_up_to_cacheline(0), 0);
        assert_eq!(round_up_to_cacheline(1), 64);
        assert_eq!(round_up_to_cacheline(64), 64);
        assert_eq!(round_up_to_cacheline(65), 128);
    }

    #[test]
    fn test_unknown_sentinel_is_within_format_maximum() {
        assert!(VARIANT_COUNT_UNKNOWN <= MAX_VARIANT_COUNT);
    }
}
