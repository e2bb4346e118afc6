//! # pgenio: PGEN Write-Session Library
//!
//! A writer for the PLINK2 PGEN columnar, bit-packed genomic-variant
//! storage format. The crate exposes a small stateful session protocol —
//! open, append once per variant, close — that converts per-sample integer
//! allele codes (and optional phasing flags) into the packed scratch
//! buffers a variant-codec engine encodes to disk.
//!
//! ## Module Structure
//! ```text
//! pgenio
//! ├── format   # PGEN format constants (geometry, ceilings, sentinels)
//! ├── error    # Error taxonomy (validation, codec, missing-variants, ...)
//! ├── arena    # Layout planner + cacheline-aligned scratch arena
//! ├── codec    # Codec-engine trait seam and status codes
//! ├── convert  # Allele codes -> packed genotypes + sparse overflow
//! └── session  # The open/append/close state machine
//! ```
//!
//! The codec engine itself (on-disk record encoding, compression, file
//! I/O) is an external collaborator behind the [`codec::CodecEngine`]
//! trait; this crate prepares its buffers and drives its entry points.
//!
//! ## Example
//! ```ignore
//! use pgenio::{WriteFlags, WriteMode, WriteSession};
//!
//! let engine = my_codec::Engine::new();
//! let mut session = WriteSession::open(
//!     "cohort.pgen".as_ref(),
//!     WriteMode::WriteAndCopy,
//!     WriteFlags::NONE,
//!     6,   // declared variant count
//!     3,   // samples
//!     7,   // max alternate alleles
//!     engine,
//! )?;
//! for codes in variants {
//!     session.append(&codes, None, 2)?;
//! }
//! session.close(0)?;
//! ```

pub mod arena;
pub mod codec;
pub mod convert;
pub mod error;
pub mod format;
pub mod session;

// Re-export commonly used types
pub use arena::{Arena, ArenaPlan, ArenaViews, BufferRole};
pub use codec::{CodecEngine, CodecStatus, InitPlan, PatchRefs};
pub use convert::{convert_allele_codes, unpack_genotype, ConvertSummary};
pub use error::{PgenError, Result};
pub use format::{MAX_ALT_ALLELES, MAX_VARIANT_COUNT, VARIANT_COUNT_UNKNOWN};
pub use session::{SessionLimits, WriteFlags, WriteMode, WriteSession};
