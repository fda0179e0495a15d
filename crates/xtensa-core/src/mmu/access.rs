//! Access kinds, page permission sets and attribute decoding tables.

use crate::ExceptionCause;

/// Kind of memory access being translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessKind {
    /// Data read.
    Load,
    /// Data write.
    Store,
    /// Instruction fetch.
    Fetch,
}

impl AccessKind {
    /// `true` when the access goes through the data TLB.
    #[must_use]
    pub const fn is_data(self) -> bool {
        !matches!(self, Self::Fetch)
    }

    /// Cause raised when no translation entry matches.
    #[must_use]
    pub const fn tlb_miss(self) -> ExceptionCause {
        match self {
            Self::Load | Self::Store => ExceptionCause::LoadStoreTlbMiss,
            Self::Fetch => ExceptionCause::InstructionTlbMiss,
        }
    }

    /// Cause raised when more than one translation entry matches.
    #[must_use]
    pub const fn multi_hit(self) -> ExceptionCause {
        match self {
            Self::Load | Self::Store => ExceptionCause::LoadStoreTlbMultiHit,
            Self::Fetch => ExceptionCause::InstructionTlbMultiHit,
        }
    }

    /// Cause raised when the entry belongs to a more privileged ring.
    #[must_use]
    pub const fn privilege(self) -> ExceptionCause {
        match self {
            Self::Load | Self::Store => ExceptionCause::LoadStorePrivilege,
            Self::Fetch => ExceptionCause::InstructionFetchPrivilege,
        }
    }

    /// Cause raised when the page permissions deny the access.
    #[must_use]
    pub const fn prohibited(self) -> ExceptionCause {
        match self {
            Self::Load => ExceptionCause::LoadProhibited,
            Self::Store => ExceptionCause::StoreProhibited,
            Self::Fetch => ExceptionCause::InstructionFetchProhibited,
        }
    }
}

/// Cache policy attached to a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub enum CachePolicy {
    Bypass,
    WriteThrough,
    WriteBack,
    Isolate,
}

/// Permission and cache-policy bits of a translated page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PageAccess(u16);

impl PageAccess {
    /// No access.
    pub const NONE: Self = Self(0);
    /// Readable.
    pub const READ: Self = Self(0x001);
    /// Writable.
    pub const WRITE: Self = Self(0x002);
    /// Executable.
    pub const EXEC: Self = Self(0x004);
    /// Uncached.
    pub const CACHE_BYPASS: Self = Self(0x100);
    /// Write-through cached.
    pub const CACHE_WT: Self = Self(0x200);
    /// Write-back cached.
    pub const CACHE_WB: Self = Self(0x400);
    /// Cache-isolated.
    pub const CACHE_ISOLATE: Self = Self(0x600);

    const RIGHTS_MASK: u16 = 0x007;
    const CACHE_MASK: u16 = 0x700;

    /// Builds a set from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits & (Self::RIGHTS_MASK | Self::CACHE_MASK))
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Union of two sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// `self` with every bit of `other` removed.
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// `true` when every permission bit of `other` is present.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 & Self::RIGHTS_MASK == other.0 & Self::RIGHTS_MASK
    }

    /// Permission bits only.
    #[must_use]
    pub const fn rights(self) -> Self {
        Self(self.0 & Self::RIGHTS_MASK)
    }

    /// `true` when `kind` is permitted.
    #[must_use]
    pub const fn is_granted(self, kind: AccessKind) -> bool {
        let needed = match kind {
            AccessKind::Load => Self::READ,
            AccessKind::Store => Self::WRITE,
            AccessKind::Fetch => Self::EXEC,
        };
        self.0 & needed.0 != 0
    }

    /// Cache policy, `None` when the set carries no policy.
    #[must_use]
    pub const fn cache_policy(self) -> Option<CachePolicy> {
        match self.0 & Self::CACHE_MASK {
            0x100 => Some(CachePolicy::Bypass),
            0x200 => Some(CachePolicy::WriteThrough),
            0x400 => Some(CachePolicy::WriteBack),
            0x600 => Some(CachePolicy::Isolate),
            _ => None,
        }
    }
}

impl core::ops::BitOr for PageAccess {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

const R: PageAccess = PageAccess::READ;
const W: PageAccess = PageAccess::WRITE;
const X: PageAccess = PageAccess::EXEC;

const fn rights(read: bool, write: bool, exec: bool) -> PageAccess {
    let mut bits = 0;
    if read {
        bits |= R.0;
    }
    if write {
        bits |= W.0;
    }
    if exec {
        bits |= X.0;
    }
    PageAccess(bits)
}

const fn with_cache(rights: PageAccess, cache: PageAccess) -> PageAccess {
    rights.union(cache)
}

const REGION_ACCESS: [PageAccess; 16] = {
    let mut table = [PageAccess::NONE; 16];
    table[0] = with_cache(rights(true, true, false), PageAccess::CACHE_WT);
    table[1] = with_cache(rights(true, true, true), PageAccess::CACHE_WT);
    table[2] = with_cache(rights(true, true, true), PageAccess::CACHE_BYPASS);
    table[3] = with_cache(rights(false, false, true), PageAccess::CACHE_WB);
    table[4] = with_cache(rights(true, true, true), PageAccess::CACHE_WB);
    table[5] = with_cache(rights(true, true, true), PageAccess::CACHE_WB);
    table[14] = with_cache(rights(true, true, false), PageAccess::CACHE_ISOLATE);
    table
};

const CACHEATTR_ACCESS: [PageAccess; 16] = {
    let mut table = REGION_ACCESS;
    table[5] = PageAccess::NONE;
    table
};

/// Decodes a paged-MMU attribute nibble.
#[must_use]
pub const fn mmu_attr_to_access(attr: u8) -> PageAccess {
    let attr = attr & 0xf;
    if attr < 12 {
        let rights = rights(true, attr & 0x2 != 0, attr & 0x1 != 0);
        let cache = match attr & 0xc {
            0 => PageAccess::CACHE_BYPASS,
            4 => PageAccess::CACHE_WB,
            _ => PageAccess::CACHE_WT,
        };
        with_cache(rights, cache)
    } else if attr == 13 {
        with_cache(rights(true, true, false), PageAccess::CACHE_ISOLATE)
    } else {
        PageAccess::NONE
    }
}

/// Decodes a region-protection attribute nibble.
#[must_use]
pub const fn region_attr_to_access(attr: u8) -> PageAccess {
    REGION_ACCESS[(attr & 0xf) as usize]
}

/// Decodes a `CACHEATTR` nibble.
#[must_use]
pub const fn cacheattr_attr_to_access(attr: u8) -> PageAccess {
    CACHEATTR_ACCESS[(attr & 0xf) as usize]
}
