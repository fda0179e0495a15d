//! Software TLB and MPU management.
//!
//! These back the `WxTLB`/`RxTLB0`/`RxTLB1`/`IxTLB`/`PxTLB` and
//! `WPTLB`/`RPTLB0`/`RPTLB1`/`PPTLB` instructions. `data` selects the data
//! TLB for the paged and region variants.

use super::mpu::{MpuHit, MPU_PROBE_B, MPU_PROBE_V, MPU_SEGMENT_MASK};
use super::tlb::{EntrySlot, LookupError, TlbEntry, REGION_PAGE_MASK};
use super::ProtectionMode;
use crate::api::{Core, HostMemory};
use crate::state::sr;
use crate::{CoreError, ExceptionCause};

const PTLB_VALID_ITLB: u32 = 0x8;
const PTLB_VALID_DTLB: u32 = 0x10;

impl Core {
    fn tlb_slot(&self, v: u32, data: bool) -> Option<(u32, EntrySlot)> {
        let slot = self.tlb(data).split_spec(v, self.tlbcfg(data));
        if slot.is_none() {
            log::warn!(
                "{}: way {} does not exist",
                if data { "DTLB" } else { "ITLB" },
                v & 0xF
            );
        }
        slot
    }

    fn tlb_entry_at(&self, v: u32, data: bool) -> Option<(EntrySlot, TlbEntry)> {
        let (_, slot) = self.tlb_slot(v, data)?;
        let entry = *self.tlb(data).entry(slot)?;
        Some((slot, entry))
    }

    /// Writes the entry selected by `v` from page-table-style word `pte`.
    /// Returns `false` when the slot does not exist or is hardware-fixed.
    pub fn wtlb<H: HostMemory + ?Sized>(&mut self, pte: u32, v: u32, data: bool, host: &mut H) -> bool {
        let Some((vpn, slot)) = self.tlb_slot(v, data) else {
            return false;
        };
        let tlbcfg = self.tlbcfg(data);
        let rasid = self.arch.sr(sr::RASID);
        let region_translation = matches!(
            self.variant.mode(),
            ProtectionMode::Region { translation: true }
        );
        self.tlb_mut(data)
            .set_entry(slot, vpn, pte, tlbcfg, rasid, region_translation, host)
    }

    /// Tag and address-space id of the entry selected by `v`. Region
    /// variants return the region base.
    #[must_use]
    pub fn rtlb0(&self, v: u32, data: bool) -> u32 {
        if self.variant.mode() != ProtectionMode::Mmu {
            return v & REGION_PAGE_MASK;
        }
        self.tlb_entry_at(v, data).map_or(0, |(slot, entry)| {
            let mask = self.tlb(data).vpn_mask(slot.way, self.tlbcfg(data));
            (entry.vaddr & mask) | u32::from(entry.asid)
        })
    }

    /// Frame and attribute of the entry selected by `v`.
    #[must_use]
    pub fn rtlb1(&self, v: u32, data: bool) -> u32 {
        self.tlb_entry_at(v, data)
            .map_or(0, |(_, entry)| entry.paddr | u32::from(entry.attr))
    }

    /// Invalidates the entry selected by `v`. Fixed and already invalid
    /// entries are left alone.
    pub fn itlb<H: HostMemory + ?Sized>(&mut self, v: u32, data: bool, host: &mut H) {
        if self.variant.mode() != ProtectionMode::Mmu {
            return;
        }
        if let Some((_, slot)) = self.tlb_slot(v, data) {
            self.tlb_mut(data).invalidate_entry(slot, host);
        }
    }

    /// Probes the TLB for `v`.
    ///
    /// A hit whose ring is not more privileged than the current one returns
    /// the page, the way and a valid bit; anything else returns 0. A
    /// multi-hit raises the multi-hit exception with `v` as the faulting
    /// address. Region variants return the region base with the valid bit.
    ///
    /// # Errors
    ///
    /// Fatal vector errors from raising the multi-hit exception.
    pub fn ptlb(&mut self, v: u32, data: bool) -> Result<u32, CoreError> {
        if self.variant.mode() != ProtectionMode::Mmu {
            return Ok((v & REGION_PAGE_MASK) | 0x1);
        }
        let lookup = self
            .tlb(data)
            .lookup(v, self.tlbcfg(data), self.arch.sr(sr::RASID));
        match lookup {
            Ok(hit) if hit.ring >= self.current_ring() => {
                let valid = if data { PTLB_VALID_DTLB } else { PTLB_VALID_ITLB };
                let way = u32::try_from(hit.slot.way).unwrap_or(0);
                Ok((v & 0xFFFF_F000) | way | valid)
            }
            Ok(_) | Err(LookupError::Miss) => Ok(0),
            Err(LookupError::MultiHit) => {
                let cause = if data {
                    ExceptionCause::LoadStoreTlbMultiHit
                } else {
                    ExceptionCause::InstructionTlbMultiHit
                };
                self.raise_with_vaddr(cause, v)?;
                Ok(0)
            }
        }
    }

    /// Writes MPU foreground segment `p & 0x1f`: start from `v`, attribute
    /// from `p`, enable bit from bit 0 of `v`. Every cached host translation
    /// is dropped.
    pub fn wptlb<H: HostMemory + ?Sized>(&mut self, p: u32, v: u32, host: &mut H) {
        let segment = (p & MPU_SEGMENT_MASK) as usize;
        if !self.mpu.write(segment, v, p) {
            log::warn!("MPU segment {segment} does not exist");
            return;
        }
        let bit = 1_u32 << segment;
        let mpuenb = self.arch.sr(sr::MPUENB);
        let mpuenb = if v & 1 != 0 { mpuenb | bit } else { mpuenb & !bit };
        self.arch.set_sr(sr::MPUENB, mpuenb);
        host.invalidate_all();
    }

    /// Start address of MPU segment `s`, with its enable bit in bit 0.
    #[must_use]
    pub fn rptlb0(&self, s: u32) -> u32 {
        let segment = (s & MPU_SEGMENT_MASK) as usize;
        self.mpu.foreground(segment).map_or(0, |entry| {
            entry.vaddr | ((self.arch.sr(sr::MPUENB) >> segment) & 1)
        })
    }

    /// Attribute of MPU segment `s`.
    #[must_use]
    pub fn rptlb1(&self, s: u32) -> u32 {
        let segment = (s & MPU_SEGMENT_MASK) as usize;
        self.mpu.foreground(segment).map_or(0, |entry| entry.attr)
    }

    /// Probes the MPU for `v`.
    ///
    /// An enabled foreground hit returns `attr | segment | V`; a background
    /// hit returns `attr | B`. Overlapping enabled segments raise the
    /// load/store multi-hit exception with `v` as the faulting address and
    /// return 0.
    ///
    /// # Errors
    ///
    /// Fatal vector errors from raising the multi-hit exception.
    pub fn pptlb(&mut self, v: u32) -> Result<u32, CoreError> {
        let hit = self.mpu.lookup(v, self.arch.sr(sr::MPUENB));
        match hit {
            MpuHit::MultiHit => {
                self.raise_with_vaddr(ExceptionCause::LoadStoreTlbMultiHit, v)?;
                Ok(0)
            }
            MpuHit::Foreground(segment) => {
                let attr = self.mpu.attr(hit).unwrap_or(0);
                let segment = u32::try_from(segment).unwrap_or(0);
                Ok(attr | segment | MPU_PROBE_V)
            }
            MpuHit::Background(_) => Ok(self.mpu.attr(hit).unwrap_or(0) | MPU_PROBE_B),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::api::{Core, NullHost};
    use crate::config::presets;
    use crate::mmu::{MPU_PROBE_B, MPU_PROBE_V};
    use crate::state::{sr, Ps};
    use crate::ExceptionCause;

    fn boot(name: &str) -> Core {
        let mut core = Core::from_variant_name(name, &mut NullHost).expect("core");
        core.arch_mut().set_ps(Ps::new(0));
        core
    }

    #[test]
    fn wtlb_then_rtlb_reads_back_the_entry() {
        let mut core = boot(presets::SAMPLE_MMU);
        assert!(core.wtlb(0x8765_4017, 0x1234_5002, true, &mut NullHost));

        assert_eq!(core.rtlb0(0x1234_5002, true), 0x1234_4000 | 2);
        assert_eq!(core.rtlb1(0x1234_5002, true), 0x8765_4007);
        assert_eq!(core.rtlb1(0x1234_5002, false), 0);
    }

    #[test]
    fn wtlb_rejects_missing_ways_and_fixed_entries() {
        let mut core = boot(presets::SAMPLE_MMU);
        assert!(!core.wtlb(0x0000_0003, 0x1000_0007, false, &mut NullHost));
        assert!(!core.wtlb(0x0000_0003, 0xD000_0005, true, &mut NullHost));
        assert_eq!(core.rtlb1(0xD000_0005, true), 0x0000_0007);
    }

    #[test]
    fn itlb_invalidates_variable_entries_only() {
        let mut core = boot(presets::SAMPLE_MMU);
        core.wtlb(0x0040_0003, 0x0040_0000, true, &mut NullHost);
        assert_ne!(core.ptlb(0x0040_0000, true).expect("probe"), 0);

        core.itlb(0x0040_0000, true, &mut NullHost);
        assert_eq!(core.ptlb(0x0040_0000, true).expect("probe"), 0);

        core.itlb(0xD000_0005, true, &mut NullHost);
        assert_eq!(core.ptlb(0xD000_0000, true).expect("probe"), 0xD000_0000 | 5 | 0x10);
    }

    #[test]
    fn ptlb_hides_more_privileged_entries() {
        let mut core = boot(presets::SAMPLE_MMU);
        core.arch_mut().set_ps(Ps::new(0).with_ring(1));
        assert_eq!(core.ptlb(0xD000_0000, false).expect("probe"), 0);

        core.wtlb(0x0040_0013, 0x0040_0001, false, &mut NullHost);
        assert_eq!(core.ptlb(0x0040_0123, false).expect("probe"), 0x0040_0000 | 1 | 0x8);
    }

    #[test]
    fn lookups_report_the_hit_way_and_segment() {
        let mut core = boot(presets::SAMPLE_MMU);
        assert!(core.wtlb(0x0030_0003, 0x0030_0004, true, &mut NullHost));
        assert_eq!(core.ptlb(0x0030_0123, true), Ok(0x0030_0000 | 4 | 0x10));

        let mut mpu = boot(presets::SAMPLE_MPU);
        mpu.wptlb(0x0000_0700 | 15, 0x0010_0001, &mut NullHost);
        assert_eq!(mpu.pptlb(0x0010_8000), Ok(0x0000_0700 | 15 | MPU_PROBE_V));
    }

    #[test]
    fn ptlb_multi_hit_raises() {
        let mut core = boot(presets::SAMPLE_MMU);
        core.wtlb(0x0040_0003, 0x0040_0000, true, &mut NullHost);
        core.wtlb(0x0040_0003, 0x0040_0001, true, &mut NullHost);

        assert_eq!(core.ptlb(0x0040_0010, true), Ok(0));
        assert_eq!(
            core.arch().sr(sr::EXCCAUSE),
            u32::from(ExceptionCause::LoadStoreTlbMultiHit.as_u8())
        );
        assert_eq!(core.arch().sr(sr::EXCVADDR), 0x0040_0010);
    }

    #[test]
    fn region_reads_report_the_region_base() {
        let mut core = boot(presets::SAMPLE_REGION);
        assert_eq!(core.rtlb0(0x6123_4567, true), 0x6000_0000);
        assert_eq!(core.ptlb(0x6123_4567, false), Ok(0x6000_0001));
        assert_eq!(core.rtlb1(0x6000_0000, true), 0x6000_0002);

        assert!(core.wtlb(0x2000_0004, 0x6000_0000, true, &mut NullHost));
        assert_eq!(core.rtlb1(0x6000_0000, true), 0x2000_0004);
    }

    #[test]
    fn mpu_segment_write_read_and_probe() {
        let mut core = boot(presets::SAMPLE_MPU);
        core.wptlb(0x0000_0700 | 2, 0x0001_0001, &mut NullHost);
        core.wptlb(0x0000_0600 | 3, 0x0002_0000, &mut NullHost);

        assert_eq!(core.arch().sr(sr::MPUENB), 0b0100);
        assert_eq!(core.rptlb0(2), 0x0001_0001);
        assert_eq!(core.rptlb0(3), 0x0002_0000);
        assert_eq!(core.rptlb1(2), 0x0000_0700);

        assert_eq!(core.pptlb(0x0001_8000), Ok(0x0000_0700 | 2 | MPU_PROBE_V));
        // segment 3 bounds segment 2 even while disabled
        assert_eq!(core.pptlb(0x0002_8000), Ok(0x0000_0F00 | MPU_PROBE_B));
        assert_eq!(core.pptlb(0x0000_8000), Ok(0x0000_0F00 | MPU_PROBE_B));
        assert_eq!(core.rptlb0(31), 0);
    }
}
