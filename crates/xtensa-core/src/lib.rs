//! Address translation and exception delivery core for configurable Xtensa
//! processors.
//!
//! The crate models the parts of a processor that sit between an instruction
//! front end and the host memory subsystem: the protection regime chosen per
//! variant, TLB and MPU state, virtual-to-physical translation with hardware
//! page-table refill, interrupt prioritisation and exception entry, and a flat
//! register-number space for external inspection.

/// Guest-visible exception causes and fatal host errors.
pub mod fault;
pub use fault::{CauseClass, CoreError, ExceptionCause};

/// Immutable variant descriptors and the process-wide variant registry.
pub mod config;
pub use config::{
    find_variant, presets, register_variant, ExceptionVectors, InterruptType, IrqConfig,
    OptionSet, TlbGeometry, Variant, VariantConfig, VariantRegistry, Vector, XtensaOption,
};

/// Architectural register file, `PS` fields and delivery-state observation.
pub mod state;
pub use state::{
    special_register_name, sr, ur, user_register_name, ArchitecturalState, DeliveryState, Ps,
    PsField,
};

/// Protection regimes, TLB and MPU storage and the translation engine.
pub mod mmu;
pub use mmu::{
    AccessKind, CachePolicy, EntrySlot, LookupError, Mpu, MpuEntry, MpuHit, PageAccess,
    ProtectionMode, Tlb, TlbEntry, TlbHit, Translation, FLAT_PAGE_SIZE, REGION_PAGE_SIZE,
};

/// Interrupt pending state, prioritisation and exception entry.
pub mod interrupt;
pub use interrupt::{
    IrqHandle, IrqLines, DEBUGCAUSE_BI, DEBUGCAUSE_BN, DEBUGCAUSE_DB, DEBUGCAUSE_DI,
    DEBUGCAUSE_IB, DEBUGCAUSE_IC,
};

/// Flat register-number space.
pub mod regs;
pub use regs::{RegisterId, AR_BASE, PC_REGISTER, PHYS_BASE, PS_FIELD_BASE, SR_BASE, UR_BASE};

/// Host-facing contracts and the core instance.
pub mod api;
pub use api::{
    BusError, Core, FrontEnd, HostMapping, HostMemory, NullHost, CACHEATTR_RESET, RASID_RESET,
};

#[cfg(test)]
use env_logger as _;
#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
