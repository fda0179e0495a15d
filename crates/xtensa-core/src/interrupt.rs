//! Interrupt and exception delivery.
//!
//! Pending interrupt bits live in [`IrqLines`], the only state shared with
//! other threads. Everything else (save registers, `PS`, the PC redirect) is
//! owned by the [`Core`] and updated synchronously at detection time, so a
//! guest exception never unwinds past this module.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::api::Core;
use crate::config::{InterruptType, Vector, XtensaOption};
use crate::mmu::AccessKind;
use crate::state::{sr, DeliveryState};
use crate::{CoreError, ExceptionCause};

/// `DEBUGCAUSE` bit: instruction-count exception.
pub const DEBUGCAUSE_IC: u32 = 0x01;
/// `DEBUGCAUSE` bit: instruction breakpoint.
pub const DEBUGCAUSE_IB: u32 = 0x02;
/// `DEBUGCAUSE` bit: data breakpoint (watchpoint).
pub const DEBUGCAUSE_DB: u32 = 0x04;
/// `DEBUGCAUSE` bit: `BREAK` instruction.
pub const DEBUGCAUSE_BI: u32 = 0x08;
/// `DEBUGCAUSE` bit: `BREAK.N` instruction.
pub const DEBUGCAUSE_BN: u32 = 0x10;
/// `DEBUGCAUSE` bit: debug interrupt.
pub const DEBUGCAUSE_DI: u32 = 0x20;

#[derive(Debug, Default)]
struct PendingBits {
    intset: u32,
    changed: bool,
}

/// Lock-guarded interrupt pending bits.
#[derive(Debug)]
pub struct IrqLines {
    bits: Mutex<PendingBits>,
    ninterrupt: usize,
    level_lines: u32,
}

impl IrqLines {
    /// Creates `ninterrupt` deasserted lines; `level_lines` marks the
    /// level-triggered ones.
    #[must_use]
    pub fn new(ninterrupt: usize, level_lines: u32) -> Self {
        Self {
            bits: Mutex::new(PendingBits::default()),
            ninterrupt,
            level_lines,
        }
    }

    /// Number of lines.
    #[must_use]
    pub const fn ninterrupt(&self) -> usize {
        self.ninterrupt
    }

    /// Current pending bits (`INTSET`).
    #[must_use]
    pub fn pending(&self) -> u32 {
        self.bits.lock().intset
    }

    /// Drives external line `irq`. Level-triggered lines follow `asserted`;
    /// every other type latches on assert and ignores a deassert.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownIrq`] for a line the variant does not have.
    pub fn set_line(&self, irq: u32, asserted: bool) -> Result<(), CoreError> {
        if usize::try_from(irq).map_or(true, |irq| irq >= self.ninterrupt) {
            log::error!("irq {irq} is outside the {} configured lines", self.ninterrupt);
            return Err(CoreError::UnknownIrq(irq));
        }
        let bit = 1_u32 << irq;
        let mut bits = self.bits.lock();
        if asserted {
            bits.intset |= bit;
        } else if self.level_lines & bit != 0 {
            bits.intset &= !bit;
        }
        bits.changed = true;
        Ok(())
    }

    pub(crate) fn or(&self, mask: u32) {
        let mut bits = self.bits.lock();
        bits.intset |= mask;
        bits.changed = true;
    }

    pub(crate) fn clear(&self, mask: u32) {
        let mut bits = self.bits.lock();
        bits.intset &= !mask;
        bits.changed = true;
    }

    pub(crate) fn take_changed(&self) -> bool {
        std::mem::take(&mut self.bits.lock().changed)
    }

    pub(crate) fn reset(&self) {
        *self.bits.lock() = PendingBits::default();
    }
}

/// Handle peripheral models use to drive interrupt lines from any thread.
///
/// Changes are picked up by the core at its next instruction boundary.
#[derive(Debug, Clone)]
pub struct IrqHandle {
    lines: Arc<IrqLines>,
}

impl IrqHandle {
    pub(crate) const fn new(lines: Arc<IrqLines>) -> Self {
        Self { lines }
    }

    /// See [`IrqLines::set_line`].
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownIrq`] for a line the variant does not have.
    pub fn set_irq(&self, irq: u32, asserted: bool) -> Result<(), CoreError> {
        self.lines.set_line(irq, asserted)
    }

    /// Current pending bits.
    #[must_use]
    pub fn pending(&self) -> u32 {
        self.lines.pending()
    }
}

impl Core {
    /// Effective interrupt level: `PS.INTLEVEL`, raised to the EXCM level
    /// while `PS.EXCM` is set.
    #[must_use]
    pub fn cintlevel(&self) -> u8 {
        let ps = self.arch.ps();
        let excm_level = self.variant.config().excm_level;
        if ps.excm() {
            ps.intlevel().max(excm_level)
        } else {
            ps.intlevel()
        }
    }

    /// Moves `addr` from the link-time vector base to the current `VECBASE`
    /// when vectors are relocatable.
    #[must_use]
    pub fn relocate_vector(&self, addr: u32) -> u32 {
        if self.variant.has(XtensaOption::RelocatableVector) {
            addr.wrapping_sub(self.variant.config().vecbase)
                .wrapping_add(self.arch.sr(sr::VECBASE))
        } else {
            addr
        }
    }

    /// Picks the highest pending, enabled level above the current one.
    ///
    /// NMI lines count as enabled whatever `INTENABLE` says, and the scan
    /// always reaches the NMI level even when the current level is at or
    /// above it.
    pub fn recompute_pending(&mut self) {
        let intset = self.irq.pending();
        self.arch.set_sr(sr::INTSET, intset);

        let config = self.variant.config();
        let nmi_level = config.nmi_level;
        let nlevel = config.nlevel;
        let minlevel = self.cintlevel().min(nmi_level - 1);
        let enabled =
            intset & (self.arch.sr(sr::INTENABLE) | self.variant.type_mask(InterruptType::Nmi));

        let level = (minlevel + 1..=nlevel)
            .rev()
            .find(|level| self.variant.level_mask(*level) & enabled != 0);
        match level {
            Some(level) => {
                if self.pending_level != level {
                    log::debug!(
                        "pending level {level} (intset {intset:#010x}, cintlevel {})",
                        self.cintlevel()
                    );
                }
                self.pending_level = level;
                self.interrupt_requested = true;
            }
            None => {
                self.pending_level = 0;
                self.interrupt_requested = false;
            }
        }
    }

    /// Delivers the pending level if it is still eligible.
    ///
    /// Returns `Ok(true)` when control was redirected.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnsetLevelVector`] or [`CoreError::UnsetVector`] when the
    /// target vector is not configured.
    pub fn deliver_pending(&mut self) -> Result<bool, CoreError> {
        let level = self.pending_level;
        let config = self.variant.config();
        let nmi_level = config.nmi_level;
        let enabled = self.variant.level_mask(level)
            & self.irq.pending()
            & self.arch.sr(sr::INTENABLE)
            != 0;
        let eligible =
            (level > self.cintlevel() && level <= config.nlevel && enabled) || level == nmi_level;
        if !eligible {
            return Ok(false);
        }

        if level == 1 {
            self.raise(ExceptionCause::Level1Interrupt)?;
            return Ok(true);
        }

        let Some(vector) = self.variant.level_vector(level) else {
            log::error!("{}: level {level} vector is not configured", self.variant.name());
            return Err(CoreError::UnsetLevelVector(level));
        };
        let pc = self.arch.pc();
        let ps = self.arch.ps();
        self.arch.set_sr(sr::epc(level), pc);
        self.arch.set_sr(sr::eps(level), ps.raw());
        self.arch.set_ps(ps.with_intlevel(level).with_excm(true));
        let target = self.relocate_vector(vector);
        self.arch.set_pc(target);
        if level == nmi_level {
            self.irq.clear(self.variant.type_mask(InterruptType::Nmi));
        }
        self.last_vector = None;
        log::debug!("level {level} interrupt at {pc:#010x} -> {target:#010x}");
        self.recompute_pending();
        Ok(true)
    }

    /// Vector a synchronous exception taken now would use.
    fn exception_vector(&self) -> Result<(Vector, u32), CoreError> {
        let ps = self.arch.ps();
        let vector = if ps.excm() {
            Vector::Double
        } else if ps.um() {
            Vector::User
        } else {
            Vector::Kernel
        };
        match self.variant.vector(vector) {
            Some(addr) => Ok((vector, addr)),
            None => {
                log::error!("{}: {vector:?} vector is not configured", self.variant.name());
                Err(CoreError::UnsetVector(vector))
            }
        }
    }

    fn enter_exception(&mut self, cause: ExceptionCause, vaddr: Option<u32>) -> Result<(), CoreError> {
        let (vector, addr) = self.exception_vector()?;
        if let Some(vaddr) = vaddr {
            self.arch.set_sr(sr::EXCVADDR, vaddr);
        }
        let pc = self.arch.pc();
        let ps = self.arch.ps();
        if ps.excm() && self.variant.config().has_depc {
            self.arch.set_sr(sr::DEPC, pc);
        } else {
            self.arch.set_sr(sr::EPC1, pc);
        }
        self.arch.set_sr(sr::EXCCAUSE, u32::from(cause.as_u8()));
        self.arch.set_ps(ps.with_excm(true));

        let target = self.relocate_vector(addr);
        self.arch.set_pc(target);
        self.last_vector = Some(vector);
        log::debug!("{cause} at {pc:#010x} -> {vector:?} {target:#010x}");
        self.recompute_pending();
        Ok(())
    }

    /// Raises a synchronous exception.
    ///
    /// With `PS.EXCM` already set this is a double exception: the PC goes to
    /// `DEPC` (or `EPC1` when the variant has no `DEPC`) and the double
    /// vector is taken.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnsetVector`] when the target vector is not configured.
    /// No state is modified in that case.
    pub fn raise(&mut self, cause: ExceptionCause) -> Result<(), CoreError> {
        self.enter_exception(cause, None)
    }

    /// Like [`Core::raise`], recording the faulting address in `EXCVADDR`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnsetVector`] when the target vector is not configured.
    pub fn raise_with_vaddr(&mut self, cause: ExceptionCause, vaddr: u32) -> Result<(), CoreError> {
        self.enter_exception(cause, Some(vaddr))
    }

    /// Unaligned load or store at `vaddr`.
    ///
    /// # Errors
    ///
    /// See [`Core::raise`].
    pub fn alignment_fault(&mut self, vaddr: u32) -> Result<(), CoreError> {
        self.raise_with_vaddr(ExceptionCause::LoadStoreAlignment, vaddr)
    }

    /// Bus error reported for an access at `vaddr`.
    ///
    /// # Errors
    ///
    /// See [`Core::raise`].
    pub fn bus_error(&mut self, vaddr: u32, kind: AccessKind) -> Result<(), CoreError> {
        let cause = if kind.is_data() {
            ExceptionCause::LoadStorePifDataError
        } else {
            ExceptionCause::InstructionPifDataError
        };
        self.raise_with_vaddr(cause, vaddr)
    }

    /// Takes a debug exception with `cause` (`DEBUGCAUSE_*` bits) when the
    /// debug level is above the current interrupt level. Debug exceptions
    /// preempt exception mode instead of double-faulting.
    ///
    /// Returns `Ok(false)` when the exception is masked or the variant has no
    /// debug level.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnsetVector`] when the debug vector is not configured.
    pub fn debug_exception(&mut self, cause: u32) -> Result<bool, CoreError> {
        let level = self.variant.config().debug_level;
        if level == 0 || self.cintlevel() >= level {
            return Ok(false);
        }
        let Some(vector) = self.variant.vector(Vector::Debug) else {
            log::error!("{}: debug vector is not configured", self.variant.name());
            return Err(CoreError::UnsetVector(Vector::Debug));
        };
        let pc = self.arch.pc();
        let ps = self.arch.ps();
        self.arch.set_sr(sr::DEBUGCAUSE, cause);
        self.arch.set_sr(sr::epc(level), pc);
        self.arch.set_sr(sr::eps(level), ps.raw());
        self.arch.set_ps(ps.with_intlevel(level).with_excm(true));
        let target = self.relocate_vector(vector);
        self.arch.set_pc(target);
        self.last_vector = Some(Vector::Debug);
        log::debug!("debug exception {cause:#x} at {pc:#010x} -> {target:#010x}");
        self.recompute_pending();
        Ok(true)
    }

    /// Drives interrupt line `irq` from the emulation thread and recomputes
    /// the pending level immediately.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownIrq`] for a line the variant does not have.
    pub fn set_irq(&mut self, irq: u32, asserted: bool) -> Result<(), CoreError> {
        self.irq.set_line(irq, asserted)?;
        self.irq.take_changed();
        self.recompute_pending();
        Ok(())
    }

    /// Latches the timer interrupt wired to comparator `CCOMPARE{index}`.
    /// Comparators without a wired line are ignored.
    pub fn ccompare_match(&mut self, index: usize) {
        let Some(irq) = self.variant.config().timer_irqs.get(index).copied() else {
            log::warn!("CCOMPARE{index} has no timer interrupt");
            return;
        };
        self.irq.or(1 << irq);
        self.irq.take_changed();
        self.recompute_pending();
    }

    /// Instruction-boundary hook: folds in line changes made through an
    /// [`IrqHandle`] and delivers the pending interrupt if it is eligible.
    ///
    /// # Errors
    ///
    /// Fatal vector errors from delivery.
    pub fn on_instruction_boundary(&mut self) -> Result<bool, CoreError> {
        if self.irq.take_changed() {
            self.recompute_pending();
        }
        if self.interrupt_requested {
            self.deliver_pending()
        } else {
            Ok(false)
        }
    }

    /// Observable delivery state.
    #[must_use]
    pub fn delivery_state(&self) -> DeliveryState {
        if self.arch.ps().excm() {
            if self.last_vector == Some(Vector::Double) {
                DeliveryState::DoubleException
            } else {
                DeliveryState::ExceptionTaken
            }
        } else if self.pending_level > 0 {
            DeliveryState::ExceptionPending
        } else {
            DeliveryState::Running
        }
    }
}
