//! Translation engine: one entry point dispatching on the protection regime.

use super::access::{cacheattr_attr_to_access, mmu_attr_to_access, region_attr_to_access};
use super::mpu::{mpu_attr_to_access, MpuHit};
use super::tlb::{EntrySlot, LookupError, Tlb, TlbEntry, REGION_PAGE_MASK};
use super::{AccessKind, PageAccess, ProtectionMode, Translation};
use crate::api::{Core, FrontEnd, HostMapping, HostMemory};
use crate::state::sr;
use crate::{CoreError, ExceptionCause};

/// Page size reported in flat mode.
pub const FLAT_PAGE_SIZE: u32 = 0x1000;
/// Page size reported in region mode.
pub const REGION_PAGE_SIZE: u32 = 0x2000_0000;

const HOST_PAGE_MASK: u32 = !(FLAT_PAGE_SIZE - 1);

impl Core {
    pub(crate) const fn tlb(&self, data: bool) -> &Tlb {
        if data {
            &self.dtlb
        } else {
            &self.itlb
        }
    }

    pub(crate) fn tlb_mut(&mut self, data: bool) -> &mut Tlb {
        if data {
            &mut self.dtlb
        } else {
            &mut self.itlb
        }
    }

    pub(crate) fn tlbcfg(&self, data: bool) -> u32 {
        self.arch.sr(if data { sr::DTLBCFG } else { sr::ITLBCFG })
    }

    /// Privilege ring of the running code, always 0 without MMU or MPU.
    #[must_use]
    pub fn current_ring(&self) -> u8 {
        if self.variant.mode().has_rings() {
            self.arch.ps().ring()
        } else {
            0
        }
    }

    /// Host translation-cache index: ring 0 in exception mode, the current
    /// ring otherwise.
    #[must_use]
    pub fn mmu_index(&self) -> u8 {
        if self.arch.ps().excm() {
            0
        } else {
            self.current_ring()
        }
    }

    /// Translates `vaddr` for an access of `kind` from `ring`.
    ///
    /// With `update_tlb` set, a successful page-table walk is installed in an
    /// autorefill way and recorded in `EXCVADDR`; otherwise the core state is
    /// left untouched.
    ///
    /// # Errors
    ///
    /// Returns the guest-visible cause the access would raise.
    pub fn translate<H: HostMemory + ?Sized>(
        &mut self,
        update_tlb: bool,
        vaddr: u32,
        kind: AccessKind,
        ring: u8,
        host: &mut H,
    ) -> Result<Translation, ExceptionCause> {
        let result = match self.variant.mode() {
            ProtectionMode::Mmu => self.translate_mmu(update_tlb, vaddr, kind, ring, true, host),
            ProtectionMode::Region { .. } => self.translate_region(vaddr, kind),
            ProtectionMode::Mpu => self.translate_mpu(vaddr, kind, ring),
            ProtectionMode::Flat => self.translate_flat(vaddr, kind),
        };
        match &result {
            Ok(translation) => log::trace!(
                "{kind:?} {vaddr:#010x} ring {ring} -> {:#010x} (page {:#x}, access {:#05x})",
                translation.paddr,
                translation.page_size,
                translation.access.bits()
            ),
            Err(cause) => log::trace!("{kind:?} {vaddr:#010x} ring {ring} -> {cause}"),
        }
        result
    }

    fn translate_mmu<H: HostMemory + ?Sized>(
        &mut self,
        update_tlb: bool,
        vaddr: u32,
        kind: AccessKind,
        ring: u8,
        may_walk: bool,
        host: &mut H,
    ) -> Result<Translation, ExceptionCause> {
        let data = kind.is_data();
        let tlbcfg = self.tlbcfg(data);
        let rasid = self.arch.sr(sr::RASID);

        let (entry, entry_ring, way) = match self.tlb(data).lookup(vaddr, tlbcfg, rasid) {
            Ok(hit) => {
                let entry = *self.tlb(data).entry(hit.slot).ok_or(kind.tlb_miss())?;
                (entry, hit.ring, hit.slot.way)
            }
            Err(LookupError::MultiHit) => return Err(kind.multi_hit()),
            Err(LookupError::Miss) => {
                let pte = if may_walk {
                    self.load_pte(vaddr, host)
                } else {
                    None
                };
                let Some(pte) = pte else {
                    return Err(kind.tlb_miss());
                };
                self.autorefill(update_tlb, vaddr, data, pte, host)
            }
        };

        if entry_ring < ring {
            return Err(kind.privilege());
        }
        let hidden = if data {
            PageAccess::EXEC
        } else {
            PageAccess::READ | PageAccess::WRITE
        };
        let access = mmu_attr_to_access(entry.attr).without(hidden);
        if !access.is_granted(kind) {
            return Err(kind.prohibited());
        }
        let mask = self.tlb(data).addr_mask(way, tlbcfg);
        Ok(Translation {
            paddr: entry.paddr | (vaddr & !mask),
            page_size: (!mask).wrapping_add(1),
            access,
        })
    }

    /// Reads the page-table entry for `vaddr`. The page table itself is
    /// translated as a ring-0 load without a further walk.
    fn load_pte<H: HostMemory + ?Sized>(&mut self, vaddr: u32, host: &mut H) -> Option<u32> {
        let pt_vaddr = (self.arch.sr(sr::PTEVADDR) | (vaddr >> 10)) & !0x3;
        match self.translate_mmu(false, pt_vaddr, AccessKind::Load, 0, false, host) {
            Ok(translation) => match host.read_physical_word(translation.paddr) {
                Ok(pte) => {
                    log::trace!(
                        "autorefill {vaddr:#010x}: PTE va {pt_vaddr:#010x} pa {:#010x} = {pte:#010x}",
                        translation.paddr
                    );
                    Some(pte)
                }
                Err(err) => {
                    log::trace!("autorefill {vaddr:#010x}: PTE load failed: {err}");
                    None
                }
            },
            Err(cause) => {
                log::trace!("autorefill {vaddr:#010x}: PTE va {pt_vaddr:#010x} failed: {cause}");
                None
            }
        }
    }

    fn autorefill<H: HostMemory + ?Sized>(
        &mut self,
        update_tlb: bool,
        vaddr: u32,
        data: bool,
        pte: u32,
        host: &mut H,
    ) -> (TlbEntry, u8, usize) {
        let tlbcfg = self.tlbcfg(data);
        let rasid = self.arch.sr(sr::RASID);
        let ring = ((pte >> 4) & 0x3) as u8;
        let (vpn, index) = self.tlb(data).split_way(vaddr, 0, tlbcfg);

        if !update_tlb {
            let entry = self
                .tlb(data)
                .decode_pte(EntrySlot::new(0, index), vpn, pte, tlbcfg, rasid);
            return (entry, ring, 0);
        }

        self.autorefill_idx = self.autorefill_idx.wrapping_add(1);
        let slot = EntrySlot::new((self.autorefill_idx & 0x3) as usize, index);
        self.tlb_mut(data)
            .set_entry(slot, vpn, pte, tlbcfg, rasid, false, host);
        self.arch.set_sr(sr::EXCVADDR, vaddr);
        log::debug!(
            "autorefill {vaddr:#010x}: {vpn:#010x} -> {pte:#010x} in {} way {}",
            if data { "DTLB" } else { "ITLB" },
            slot.way
        );
        let entry = self
            .tlb(data)
            .entry(slot)
            .copied()
            .unwrap_or_else(|| self.tlb(data).decode_pte(slot, vpn, pte, tlbcfg, rasid));
        (entry, ring, slot.way)
    }

    fn translate_region(&self, vaddr: u32, kind: AccessKind) -> Result<Translation, ExceptionCause> {
        let slot = EntrySlot::new(0, (vaddr >> 29) as usize);
        let entry = *self.tlb(kind.is_data()).entry(slot).ok_or(kind.tlb_miss())?;
        let access = region_attr_to_access(entry.attr);
        if !access.is_granted(kind) {
            return Err(kind.prohibited());
        }
        Ok(Translation {
            paddr: entry.paddr | (vaddr & !REGION_PAGE_MASK),
            page_size: REGION_PAGE_SIZE,
            access,
        })
    }

    fn translate_mpu(
        &self,
        vaddr: u32,
        kind: AccessKind,
        ring: u8,
    ) -> Result<Translation, ExceptionCause> {
        let hit = self.mpu.lookup(vaddr, self.arch.sr(sr::MPUENB));
        if hit == MpuHit::MultiHit {
            return Err(kind.multi_hit());
        }
        let attr = self.mpu.attr(hit).unwrap_or(0);
        let access = mpu_attr_to_access(attr, ring);
        if !access.is_granted(kind) {
            return Err(kind.prohibited());
        }
        Ok(Translation {
            paddr: vaddr,
            page_size: self.mpu.align(),
            access,
        })
    }

    fn translate_flat(&self, vaddr: u32, kind: AccessKind) -> Result<Translation, ExceptionCause> {
        let shift = (vaddr & REGION_PAGE_MASK) >> 27;
        let attr = ((self.arch.sr(sr::CACHEATTR) >> shift) & 0xF) as u8;
        let access = cacheattr_attr_to_access(attr);
        if !access.is_granted(kind) {
            return Err(kind.prohibited());
        }
        Ok(Translation {
            paddr: vaddr,
            page_size: FLAT_PAGE_SIZE,
            access,
        })
    }

    /// Debugger-style probe: tries a load, then a fetch, at ring 0. Never
    /// installs a mapping and never raises a guest exception.
    pub fn probe_translate<H: HostMemory + ?Sized>(&mut self, vaddr: u32, host: &mut H) -> Option<u32> {
        [AccessKind::Load, AccessKind::Fetch]
            .into_iter()
            .find_map(|kind| self.translate(false, vaddr, kind, 0, host).ok())
            .map(|translation| translation.paddr)
    }

    /// Host TLB fill for an access that missed the host translation cache.
    ///
    /// On success the page is installed through [`HostMemory::install_translation`]
    /// and `Ok(true)` is returned. On failure a probing fill reports
    /// `Ok(false)`; otherwise the front end restores the precise state and
    /// the guest exception is raised, also reported as `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Fatal errors from exception entry (unset vector).
    pub fn tlb_fill<H, F>(
        &mut self,
        vaddr: u32,
        kind: AccessKind,
        mmu_index: u8,
        probe: bool,
        host: &mut H,
        front_end: &mut F,
    ) -> Result<bool, CoreError>
    where
        H: HostMemory + ?Sized,
        F: FrontEnd + ?Sized,
    {
        match self.translate(true, vaddr, kind, mmu_index, host) {
            Ok(translation) => {
                host.install_translation(HostMapping {
                    vpage: vaddr & HOST_PAGE_MASK,
                    ppage: translation.paddr & HOST_PAGE_MASK,
                    access: translation.access,
                    page_size: translation.page_size,
                    mmu_index,
                });
                Ok(true)
            }
            Err(_) if probe => Ok(false),
            Err(cause) => {
                front_end.restore_state(&mut self.arch);
                self.raise_with_vaddr(cause, vaddr)?;
                Ok(false)
            }
        }
    }
}
