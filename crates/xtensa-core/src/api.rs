//! Host-facing contracts and the per-processor core instance.
//!
//! A [`Core`] owns every piece of mutable processor state and is driven by a
//! single emulation thread. The host memory subsystem and the execution front
//! end are passed into each operation that needs them rather than stored.

use std::sync::Arc;

use thiserror::Error;

use crate::config::{find_variant, InterruptType, Variant, Vector, XtensaOption};
use crate::interrupt::{IrqHandle, IrqLines};
use crate::mmu::{Mpu, PageAccess, ProtectionMode, Tlb};
use crate::state::{sr, ArchitecturalState, Ps};
use crate::CoreError;

/// Reset value of `RASID`: rings 0..=3 own address-space ids 1..=4.
pub const RASID_RESET: u32 = 0x0403_0201;
/// Reset value of `CACHEATTR`: every region bypass, rwx.
pub const CACHEATTR_RESET: u32 = 0x2222_2222;

/// Physical bus failure reported by the host memory subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("bus error at physical address {paddr:#010x}")]
pub struct BusError {
    /// Physical address that failed.
    pub paddr: u32,
}

/// Page installed into the host translation cache after a successful fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct HostMapping {
    /// Virtual page, aligned to the host page size.
    pub vpage: u32,
    /// Physical page, aligned to the host page size.
    pub ppage: u32,
    /// Permissions and cache policy.
    pub access: PageAccess,
    /// Size of the guest page the mapping belongs to.
    pub page_size: u32,
    /// Host translation-cache index (ring, or 0 in exception mode).
    pub mmu_index: u8,
}

/// Host memory subsystem consumed by translation and TLB maintenance.
pub trait HostMemory {
    /// Reads one 32-bit word of guest physical memory. Used by the page walk.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when nothing backs `paddr`.
    fn read_physical_word(&mut self, paddr: u32) -> Result<u32, BusError>;

    /// Installs a translated page into the host translation cache.
    fn install_translation(&mut self, mapping: HostMapping);

    /// Drops any cached translation of the page containing `vaddr`.
    fn invalidate(&mut self, vaddr: u32);

    /// Drops every cached translation.
    fn invalidate_all(&mut self);
}

/// Execution front end hooks.
pub trait FrontEnd {
    /// Restores precise architectural state (PC of the faulting
    /// instruction) before a guest exception is raised from a TLB fill.
    fn restore_state(&mut self, arch: &mut ArchitecturalState);
}

/// Host with no memory and no translation cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NullHost;

impl HostMemory for NullHost {
    fn read_physical_word(&mut self, paddr: u32) -> Result<u32, BusError> {
        Err(BusError { paddr })
    }

    fn install_translation(&mut self, _mapping: HostMapping) {}

    fn invalidate(&mut self, _vaddr: u32) {}

    fn invalidate_all(&mut self) {}
}

impl FrontEnd for NullHost {
    fn restore_state(&mut self, _arch: &mut ArchitecturalState) {}
}

/// One emulated processor.
#[derive(Debug)]
pub struct Core {
    pub(crate) variant: Arc<Variant>,
    pub(crate) arch: ArchitecturalState,
    pub(crate) itlb: Tlb,
    pub(crate) dtlb: Tlb,
    pub(crate) mpu: Mpu,
    pub(crate) irq: Arc<IrqLines>,
    pub(crate) pending_level: u8,
    pub(crate) interrupt_requested: bool,
    pub(crate) last_vector: Option<Vector>,
    pub(crate) autorefill_idx: u32,
}

impl Core {
    /// Allocates a core for `variant` and resets it.
    ///
    /// # Errors
    ///
    /// Any fatal reset condition, see [`Core::reset`].
    pub fn new<H: HostMemory + ?Sized>(variant: Arc<Variant>, host: &mut H) -> Result<Self, CoreError> {
        let config = variant.config();
        let paged = variant.mode() == ProtectionMode::Mmu;
        let level_lines = variant.type_mask(InterruptType::Level);
        let mut core = Self {
            arch: ArchitecturalState::new(config.nareg),
            itlb: Tlb::new(*variant.tlb_geometry(false), false, paged),
            dtlb: Tlb::new(*variant.tlb_geometry(true), true, paged),
            mpu: Mpu::new(
                config.mpu_fg_segments,
                config.mpu_background.clone(),
                config.mpu_align,
            ),
            irq: Arc::new(IrqLines::new(variant.ninterrupt(), level_lines)),
            pending_level: 0,
            interrupt_requested: false,
            last_vector: None,
            autorefill_idx: 0,
            variant,
        };
        core.reset(host)?;
        Ok(core)
    }

    /// Looks `name` up in the variant registry and builds a core for it.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownVariant`] or any fatal reset condition.
    pub fn from_variant_name<H: HostMemory + ?Sized>(name: &str, host: &mut H) -> Result<Self, CoreError> {
        Self::new(find_variant(name)?, host)
    }

    /// Processor reset.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnsetVector`] when the variant has no reset vector, or a
    /// malformed MPU background table.
    pub fn reset<H: HostMemory + ?Sized>(&mut self, host: &mut H) -> Result<(), CoreError> {
        let Some(reset_vector) = self.variant.vector(Vector::Reset0) else {
            log::error!("{}: reset vector is not configured", self.variant.name());
            return Err(CoreError::UnsetVector(Vector::Reset0));
        };
        let config = self.variant.config();

        self.arch = ArchitecturalState::new(config.nareg);
        self.arch.set_pc(reset_vector);
        let ps = if self.variant.has(XtensaOption::Interrupt) {
            Ps::new(0x1F)
        } else {
            Ps::new(0x10)
        };
        self.arch.set_ps(ps);
        self.arch.set_sr(sr::VECBASE, config.vecbase);
        if self.variant.has(XtensaOption::WindowedRegister) {
            self.arch.set_sr(sr::WINDOW_START, 1);
        }

        self.irq.reset();
        self.pending_level = 0;
        self.interrupt_requested = false;
        self.last_vector = None;

        match self.variant.mode() {
            ProtectionMode::Mmu => {
                self.arch.set_sr(sr::CACHEATTR, CACHEATTR_RESET);
                self.arch.set_sr(sr::RASID, RASID_RESET);
                self.arch.set_sr(sr::ITLBCFG, 0);
                self.arch.set_sr(sr::DTLBCFG, 0);
                self.autorefill_idx = 0;
                self.itlb.reset_mmu();
                self.dtlb.reset_mmu();
            }
            ProtectionMode::Mpu => {
                self.arch.set_sr(sr::MPUENB, 0);
                self.arch.set_sr(sr::MPUCFG, u32::try_from(self.mpu.segments()).unwrap_or(0));
                self.arch.set_sr(sr::CACHEADRDIS, 0);
                if let Err(err) = self.mpu.reset() {
                    log::error!("{}: {err}", self.variant.name());
                    return Err(err);
                }
            }
            ProtectionMode::Region { .. } | ProtectionMode::Flat => {
                self.arch.set_sr(sr::CACHEATTR, CACHEATTR_RESET);
                self.itlb.reset_region();
                self.dtlb.reset_region();
            }
        }

        host.invalidate_all();
        self.recompute_pending();
        log::debug!(
            "{}: reset, pc {reset_vector:#010x}, {:?}",
            self.variant.name(),
            self.variant.mode()
        );
        Ok(())
    }

    /// Variant the core was built for.
    #[must_use]
    pub fn variant(&self) -> &Arc<Variant> {
        &self.variant
    }

    /// Architectural registers.
    #[must_use]
    pub const fn arch(&self) -> &ArchitecturalState {
        &self.arch
    }

    /// Mutable architectural registers, without any side effects.
    /// Use [`Core::write_register`] for architectural writes.
    pub fn arch_mut(&mut self) -> &mut ArchitecturalState {
        &mut self.arch
    }

    /// Instruction TLB.
    #[must_use]
    pub const fn itlb(&self) -> &Tlb {
        &self.itlb
    }

    /// Data TLB.
    #[must_use]
    pub const fn dtlb(&self) -> &Tlb {
        &self.dtlb
    }

    /// MPU segments.
    #[must_use]
    pub const fn mpu(&self) -> &Mpu {
        &self.mpu
    }

    /// Highest eligible pending interrupt level, 0 when none.
    #[must_use]
    pub const fn pending_level(&self) -> u8 {
        self.pending_level
    }

    /// `true` while a pending interrupt awaits delivery.
    #[must_use]
    pub const fn interrupt_requested(&self) -> bool {
        self.interrupt_requested
    }

    /// Vector class of the most recent exception entry.
    #[must_use]
    pub const fn last_vector(&self) -> Option<Vector> {
        self.last_vector
    }

    /// Cloneable handle for asserting interrupt lines from other threads.
    #[must_use]
    pub fn irq_handle(&self) -> IrqHandle {
        IrqHandle::new(Arc::clone(&self.irq))
    }
}
