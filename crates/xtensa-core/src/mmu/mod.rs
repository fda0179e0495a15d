//! Memory protection and address translation.
//!
//! Exactly one protection regime is active per variant. The regime is picked
//! once when the variant is finalized and every translation dispatches on it.

/// Access kinds, permission sets and attribute decoding tables.
pub mod access;
/// Segment-based memory protection unit.
pub mod mpu;
/// TLB and MPU management instruction helpers.
pub mod ops;
/// Way-organised TLB storage.
pub mod tlb;
/// Translation engine and host TLB fill.
pub mod translate;

pub use access::{
    cacheattr_attr_to_access, mmu_attr_to_access, region_attr_to_access, AccessKind, CachePolicy,
    PageAccess,
};
pub use mpu::{
    mpu_attr_to_access, validate_background, Mpu, MpuEntry, MpuHit, MPU_ACC_RIGHTS_MASK,
    MPU_ATTR_MASK, MPU_MEM_TYPE_MASK, MPU_PROBE_B, MPU_PROBE_V, MPU_SEGMENT_MASK,
};
pub use tlb::{ring_of, EntrySlot, LookupError, Tlb, TlbEntry, TlbHit, REGION_PAGE_MASK};
pub use translate::{FLAT_PAGE_SIZE, REGION_PAGE_SIZE};

use crate::config::{OptionSet, XtensaOption};

/// Protection regime of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ProtectionMode {
    /// Paged MMU with autorefill.
    Mmu,
    /// Eight 512 MiB regions; `translation` when frames may be remapped.
    Region {
        /// Region translation option present.
        translation: bool,
    },
    /// Segment-based MPU.
    Mpu,
    /// Identity mapping, permissions from `CACHEATTR`.
    Flat,
}

impl ProtectionMode {
    /// Picks the regime for an option set: MMU, then region protection or
    /// translation, then MPU, then flat.
    #[must_use]
    pub const fn select(options: OptionSet) -> Self {
        if options.contains(XtensaOption::Mmu) {
            Self::Mmu
        } else if options.contains_any(&[
            XtensaOption::RegionProtection,
            XtensaOption::RegionTranslation,
        ]) {
            Self::Region {
                translation: options.contains(XtensaOption::RegionTranslation),
            }
        } else if options.contains(XtensaOption::Mpu) {
            Self::Mpu
        } else {
            Self::Flat
        }
    }

    /// `true` when the regime keeps per-ring state (`PS.RING` is honoured).
    #[must_use]
    pub const fn has_rings(self) -> bool {
        matches!(self, Self::Mmu | Self::Mpu)
    }
}

/// Successful translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Translation {
    /// Physical address.
    pub paddr: u32,
    /// Size of the page containing the address.
    pub page_size: u32,
    /// Permissions and cache policy of the page.
    pub access: PageAccess,
}
