//! Way-organised TLB storage for the paged MMU and region modes.

use crate::api::HostMemory;
use crate::config::TlbGeometry;

/// Mask selecting one of the eight 512 MiB regions.
pub const REGION_PAGE_MASK: u32 = 0xE000_0000;

/// One TLB slot. An address-space id of 0 marks the slot invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TlbEntry {
    /// Virtual page number (tag).
    pub vaddr: u32,
    /// Physical frame.
    pub paddr: u32,
    /// Address-space id.
    pub asid: u8,
    /// Permission and cache attribute nibble.
    pub attr: u8,
    /// `false` for hardware-fixed entries that reject software writes.
    pub variable: bool,
}

/// Way and index of a TLB slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntrySlot {
    /// Way number.
    pub way: usize,
    /// Entry index inside the way.
    pub index: usize,
}

impl EntrySlot {
    /// Creates slot coordinates.
    #[must_use]
    pub const fn new(way: usize, index: usize) -> Self {
        Self { way, index }
    }
}

/// Successful lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TlbHit {
    /// Slot that matched.
    pub slot: EntrySlot,
    /// Ring resolved from the entry's address-space id.
    pub ring: u8,
}

/// Failed lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupError {
    /// No valid entry matched.
    Miss,
    /// Two or more valid entries matched.
    MultiHit,
}

/// Ring whose `RASID` slot holds `asid`, if any.
#[must_use]
pub fn ring_of(rasid: u32, asid: u8) -> Option<u8> {
    (0_u8..4).find(|ring| (rasid >> (u32::from(*ring) * 8)) & 0xFF == u32::from(asid))
}

/// Instruction or data TLB.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Tlb {
    geometry: TlbGeometry,
    data: bool,
    paged: bool,
    ways: Vec<Vec<TlbEntry>>,
}

impl Tlb {
    /// Allocates zeroed ways for `geometry`. `paged` selects MMU addressing,
    /// otherwise the single region way is used.
    #[must_use]
    pub fn new(geometry: TlbGeometry, data: bool, paged: bool) -> Self {
        let ways = geometry.way_size[..geometry.nways]
            .iter()
            .map(|size| vec![TlbEntry::default(); *size])
            .collect();
        Self {
            geometry,
            data,
            paged,
            ways,
        }
    }

    /// `true` for the data TLB.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        self.data
    }

    /// Number of ways.
    #[must_use]
    pub fn nways(&self) -> usize {
        self.ways.len()
    }

    /// Entry at `slot`.
    #[must_use]
    pub fn entry(&self, slot: EntrySlot) -> Option<&TlbEntry> {
        self.ways.get(slot.way)?.get(slot.index)
    }

    fn entry_mut(&mut self, slot: EntrySlot) -> Option<&mut TlbEntry> {
        self.ways.get_mut(slot.way)?.get_mut(slot.index)
    }

    /// Page-size selector of `way` taken from the `ITLBCFG`/`DTLBCFG` value.
    #[must_use]
    pub const fn page_size_index(way: usize, tlbcfg: u32) -> u32 {
        match way {
            4 => (tlbcfg >> 16) & 0x3,
            5 => (tlbcfg >> 20) & 0x1,
            6 => (tlbcfg >> 24) & 0x1,
            _ => 0,
        }
    }

    /// Mask selecting the page-number bits of an address held in `way`.
    #[must_use]
    pub const fn addr_mask(&self, way: usize, tlbcfg: u32) -> u32 {
        if !self.paged {
            return REGION_PAGE_MASK;
        }
        let ps = Self::page_size_index(way, tlbcfg);
        let varway56 = self.geometry.varway56;
        match way {
            4 => 0xFFF0_0000 << (ps * 2),
            5 if varway56 => 0xF800_0000 << ps,
            5 => 0xF800_0000,
            6 if varway56 => 0xF000_0000 << (1 - ps),
            6 => 0xF000_0000,
            _ => 0xFFFF_F000,
        }
    }

    /// Mask of the tag bits reported by a TLB read of `way`.
    #[must_use]
    pub const fn vpn_mask(&self, way: usize, tlbcfg: u32) -> u32 {
        match way {
            0..=3 => {
                if self.geometry.nrefillentries == 32 {
                    0xFFFF_8000
                } else {
                    0xFFFF_C000
                }
            }
            4 => self.addr_mask(way, tlbcfg) << 2,
            5 | 6 => {
                let mask = self.addr_mask(way, tlbcfg);
                if !self.geometry.varway56 {
                    mask << 1
                } else if way == 5 {
                    mask << 2
                } else {
                    mask << 3
                }
            }
            _ => 0xFFFF_F000,
        }
    }

    /// Splits `vaddr` into tag and entry index for a fixed `way`.
    #[must_use]
    pub const fn split_way(&self, vaddr: u32, way: usize, tlbcfg: u32) -> (u32, usize) {
        let ps = Self::page_size_index(way, tlbcfg);
        let varway56 = self.geometry.varway56;
        let index = match way {
            0..=3 => {
                let mask = if self.geometry.nrefillentries == 32 { 0x7 } else { 0x3 };
                (vaddr >> 12) & mask
            }
            4 => (vaddr >> (20 + ps * 2)) & 0x3,
            5 if varway56 => (vaddr >> (27 + ps)) & 0x3,
            5 => (vaddr >> 27) & 0x1,
            6 if varway56 => (vaddr >> (29 - ps)) & 0x7,
            6 => (vaddr >> 28) & 0x1,
            _ => 0,
        };
        (vaddr & self.addr_mask(way, tlbcfg), index as usize)
    }

    /// Decodes the way/index operand of the TLB management instructions.
    /// Returns `None` when the way field names a way the TLB does not have.
    #[must_use]
    pub fn split_spec(&self, v: u32, tlbcfg: u32) -> Option<(u32, EntrySlot)> {
        if !self.paged {
            let index = (v >> 29) & 0x7;
            return Some((v & REGION_PAGE_MASK, EntrySlot::new(0, index as usize)));
        }
        let way = (v & if self.data { 0xF } else { 0x7 }) as usize;
        if way >= self.ways.len() {
            return None;
        }
        let (vpn, index) = self.split_way(v, way, tlbcfg);
        Some((vpn, EntrySlot::new(way, index)))
    }

    /// Scans every way for `vaddr`.
    ///
    /// Entries with address-space id 0, or whose id is not mapped to a ring
    /// by `rasid`, never match.
    ///
    /// # Errors
    ///
    /// [`LookupError::MultiHit`] as soon as a second valid entry matches,
    /// [`LookupError::Miss`] when none does.
    pub fn lookup(&self, vaddr: u32, tlbcfg: u32, rasid: u32) -> Result<TlbHit, LookupError> {
        let mut hit = None;
        for way in 0..self.ways.len() {
            let (vpn, index) = self.split_way(vaddr, way, tlbcfg);
            let Some(entry) = self.entry(EntrySlot::new(way, index)) else {
                continue;
            };
            if entry.asid == 0 || entry.vaddr != vpn {
                continue;
            }
            if let Some(ring) = ring_of(rasid, entry.asid) {
                if hit.is_some() {
                    return Err(LookupError::MultiHit);
                }
                hit = Some(TlbHit {
                    slot: EntrySlot::new(way, index),
                    ring,
                });
            }
        }
        hit.ok_or(LookupError::Miss)
    }

    /// Builds the paged entry a page-table entry `pte` describes for `slot`.
    #[must_use]
    pub fn decode_pte(&self, slot: EntrySlot, vpn: u32, pte: u32, tlbcfg: u32, rasid: u32) -> TlbEntry {
        let variable = self.entry(slot).map_or(true, |entry| entry.variable);
        TlbEntry {
            vaddr: vpn,
            paddr: pte & self.addr_mask(slot.way, tlbcfg),
            asid: ((rasid >> ((pte >> 1) & 0x18)) & 0xFF) as u8,
            attr: (pte & 0xF) as u8,
            variable,
        }
    }

    /// Software write of one entry.
    ///
    /// Paged mode rejects hardware-fixed entries and returns `false`. Every
    /// accepted write invalidates the host translations of both the old and
    /// the new tag.
    #[allow(clippy::too_many_arguments)]
    pub fn set_entry<H: HostMemory + ?Sized>(
        &mut self,
        slot: EntrySlot,
        vpn: u32,
        pte: u32,
        tlbcfg: u32,
        rasid: u32,
        region_translation: bool,
        host: &mut H,
    ) -> bool {
        if self.paged {
            let decoded = self.decode_pte(slot, vpn, pte, tlbcfg, rasid);
            let data = self.data;
            let Some(entry) = self.entry_mut(slot) else {
                return false;
            };
            if !entry.variable {
                log::warn!(
                    "{} way {} entry {} is hardware-fixed, write of {pte:#010x} ignored",
                    if data { "DTLB" } else { "ITLB" },
                    slot.way,
                    slot.index
                );
                return false;
            }
            if entry.asid != 0 {
                host.invalidate(entry.vaddr);
            }
            *entry = decoded;
            host.invalidate(entry.vaddr);
            true
        } else {
            let Some(entry) = self.entry_mut(slot) else {
                return false;
            };
            host.invalidate(entry.vaddr);
            if region_translation {
                entry.paddr = pte & REGION_PAGE_MASK;
            }
            entry.attr = (pte & 0xF) as u8;
            true
        }
    }

    /// Invalidates the entry at `slot` when it is variable and valid.
    pub fn invalidate_entry<H: HostMemory + ?Sized>(&mut self, slot: EntrySlot, host: &mut H) {
        if let Some(entry) = self.entry_mut(slot) {
            if entry.variable && entry.asid != 0 {
                host.invalidate(entry.vaddr);
                entry.asid = 0;
            }
        }
    }

    /// Paged-MMU reset: every slot invalid and variable, then the fixed
    /// kernel windows in ways 5 and 6.
    pub fn reset_mmu(&mut self) {
        for entry in self.ways.iter_mut().flatten() {
            entry.asid = 0;
            entry.variable = true;
        }
        if self.geometry.varway56 {
            if let Some(way) = self.ways.get_mut(6) {
                for (index, entry) in (0_u32..8).zip(way.iter_mut()) {
                    let base = index << 29;
                    *entry = TlbEntry {
                        vaddr: base,
                        paddr: base,
                        asid: 1,
                        attr: 3,
                        variable: true,
                    };
                }
            }
        } else {
            let fixed = |vaddr, paddr, attr| TlbEntry {
                vaddr,
                paddr,
                asid: 1,
                attr,
                variable: false,
            };
            let windows = [
                (5, [fixed(0xD000_0000, 0, 7), fixed(0xD800_0000, 0, 3)]),
                (
                    6,
                    [
                        fixed(0xE000_0000, 0xF000_0000, 7),
                        fixed(0xF000_0000, 0xF000_0000, 3),
                    ],
                ),
            ];
            for (way, entries) in windows {
                if let Some(way) = self.ways.get_mut(way) {
                    for (slot, entry) in way.iter_mut().zip(entries) {
                        *slot = entry;
                    }
                }
            }
        }
    }

    /// Region reset: eight identity 512 MiB regions with attribute 2.
    pub fn reset_region(&mut self) {
        if let Some(way) = self.ways.get_mut(0) {
            for (index, entry) in (0_u32..).zip(way.iter_mut()) {
                let base = index << 29;
                *entry = TlbEntry {
                    vaddr: base,
                    paddr: base,
                    asid: 1,
                    attr: 2,
                    variable: true,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{ring_of, EntrySlot, LookupError, Tlb, TlbEntry};
    use crate::api::NullHost;
    use crate::config::TlbGeometry;

    const RASID: u32 = 0x0403_0201;

    fn mmu_dtlb(varway56: bool) -> Tlb {
        let mut tlb = Tlb::new(TlbGeometry::mmu(10, 4, varway56), true, true);
        tlb.reset_mmu();
        tlb
    }

    #[test]
    fn ring_resolves_from_rasid_slot() {
        assert_eq!(ring_of(RASID, 1), Some(0));
        assert_eq!(ring_of(RASID, 4), Some(3));
        assert_eq!(ring_of(RASID, 5), None);
    }

    #[test]
    fn reset_installs_fixed_kernel_windows() {
        let tlb = mmu_dtlb(false);

        let hit = tlb.lookup(0xD000_1234, 0, RASID).expect("cached window");
        assert_eq!(hit.slot, EntrySlot::new(5, 0));
        assert_eq!(hit.ring, 0);

        let hit = tlb.lookup(0xF123_4567, 0, RASID).expect("bypass window");
        assert_eq!(hit.slot, EntrySlot::new(6, 1));
        assert_eq!(tlb.lookup(0x1000_0000, 0, RASID), Err(LookupError::Miss));
    }

    #[test]
    fn varway56_reset_spans_the_address_space() {
        let tlb = mmu_dtlb(true);
        for region in 0_u32..8 {
            let hit = tlb.lookup(region << 29 | 0x0ABC, 0, RASID).expect("identity region");
            assert_eq!(hit.slot, EntrySlot::new(6, region as usize));
            let entry = tlb.entry(hit.slot).expect("entry");
            assert!(entry.variable);
            assert_eq!(entry.paddr, region << 29);
        }
    }

    #[test]
    fn fixed_entry_rejects_software_writes() {
        let mut tlb = mmu_dtlb(false);
        let mut host = NullHost;
        let slot = EntrySlot::new(5, 0);
        let before = *tlb.entry(slot).expect("entry");

        assert!(!tlb.set_entry(slot, 0x1000_0000, 0x2000_0003, 0, RASID, false, &mut host));
        assert_eq!(*tlb.entry(slot).expect("entry"), before);
    }

    #[test]
    fn set_entry_then_lookup_returns_the_mapping() {
        let mut tlb = mmu_dtlb(false);
        let mut host = NullHost;
        let (vpn, slot) = tlb.split_spec(0x1234_5002, 0).expect("way 2");
        assert_eq!(slot, EntrySlot::new(2, 1));

        assert!(tlb.set_entry(slot, vpn, 0x8765_4017, 0, RASID, false, &mut host));
        let hit = tlb.lookup(0x1234_5ABC, 0, RASID).expect("installed");
        assert_eq!(hit.slot, slot);
        assert_eq!(hit.ring, 1);
        assert_eq!(
            *tlb.entry(slot).expect("entry"),
            TlbEntry {
                vaddr: 0x1234_5000,
                paddr: 0x8765_4000,
                asid: 2,
                attr: 7,
                variable: true,
            }
        );
    }

    #[test]
    fn aliased_entries_report_multi_hit() {
        let mut tlb = mmu_dtlb(false);
        let mut host = NullHost;
        for way in [0_u32, 1] {
            let (vpn, slot) = tlb.split_spec(0x0040_0000 | way, 0).expect("refill way");
            assert!(tlb.set_entry(slot, vpn, 0x0040_0003, 0, RASID, false, &mut host));
        }

        assert_eq!(tlb.lookup(0x0040_0010, 0, RASID), Err(LookupError::MultiHit));
    }

    #[test]
    fn way_field_outside_the_tlb_is_rejected() {
        let itlb = Tlb::new(TlbGeometry::mmu(7, 4, false), false, true);
        assert!(itlb.split_spec(0x1000_0007, 0).is_none());
        let dtlb = mmu_dtlb(false);
        assert!(dtlb.split_spec(0x1000_000A, 0).is_none());
        assert!(dtlb.split_spec(0x1000_0009, 0).is_some());
    }

    #[test]
    fn way4_page_size_follows_tlbcfg() {
        let tlb = mmu_dtlb(false);
        assert_eq!(tlb.addr_mask(4, 0), 0xFFF0_0000);
        assert_eq!(tlb.addr_mask(4, 0x0003_0000), 0xFC00_0000);
        assert_eq!(tlb.split_way(0x0030_0000, 4, 0), (0x0030_0000, 3));
        assert_eq!(tlb.vpn_mask(4, 0), 0xFFC0_0000);
    }

    #[test]
    fn region_tlb_updates_attribute_and_optionally_frame() {
        let mut tlb = Tlb::new(TlbGeometry::region(), true, false);
        let mut host = NullHost;
        tlb.reset_region();

        let (vpn, slot) = tlb.split_spec(0x6000_0000, 0).expect("region slot");
        assert_eq!((vpn, slot), (0x6000_0000, EntrySlot::new(0, 3)));
        assert!(tlb.set_entry(slot, vpn, 0x2000_0004, 0, 0, false, &mut host));
        let entry = *tlb.entry(slot).expect("entry");
        assert_eq!((entry.paddr, entry.attr), (0x6000_0000, 4));

        assert!(tlb.set_entry(slot, vpn, 0x2000_0001, 0, 0, true, &mut host));
        let entry = *tlb.entry(slot).expect("entry");
        assert_eq!((entry.paddr, entry.attr), (0x2000_0000, 1));
    }

    proptest! {
        #[test]
        fn asid_zero_never_matches(vaddr in any::<u32>(), way in 0_u32..4) {
            let mut tlb = mmu_dtlb(false);
            let mut host = NullHost;
            let (vpn, slot) = tlb.split_spec((vaddr & !0xF) | way, 0).expect("refill way");
            // a zero ring-0 byte in RASID decodes to address-space id 0
            prop_assert!(tlb.set_entry(slot, vpn, 0x0000_0003, 0, 0x0403_0200, false, &mut host));
            prop_assert_eq!(tlb.entry(slot).expect("entry").asid, 0);
            prop_assert!(tlb.lookup(vaddr, 0, 0x0403_0200).map(|hit| hit.slot) != Ok(slot));
        }
    }
}
