//! Boots the paged sample variant, refills a page from an in-memory page
//! table and takes a level-3 interrupt. Run with `RUST_LOG=debug` to see
//! the core's trace.

use std::collections::HashMap;

use once_cell as _;
use parking_lot as _;
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

use xtensa_core::{
    presets, sr, AccessKind, ArchitecturalState, BusError, Core, CoreError, FrontEnd,
    HostMapping, HostMemory,
};

#[derive(Default)]
struct PageTableHost {
    words: HashMap<u32, u32>,
    installed: Vec<HostMapping>,
}

impl HostMemory for PageTableHost {
    fn read_physical_word(&mut self, paddr: u32) -> Result<u32, BusError> {
        self.words.get(&paddr).copied().ok_or(BusError { paddr })
    }

    fn install_translation(&mut self, mapping: HostMapping) {
        self.installed.push(mapping);
    }

    fn invalidate(&mut self, vaddr: u32) {
        self.installed.retain(|mapping| mapping.vpage != vaddr & !0xFFF);
    }

    fn invalidate_all(&mut self) {
        self.installed.clear();
    }
}

struct PreciseFrontEnd;

impl FrontEnd for PreciseFrontEnd {
    fn restore_state(&mut self, _arch: &mut ArchitecturalState) {}
}

fn main() -> Result<(), CoreError> {
    env_logger::init();

    let mut host = PageTableHost::default();
    let mut core = Core::from_variant_name(presets::SAMPLE_MMU, &mut host)?;
    log::info!("reset at {:#010x}", core.arch().pc());

    // Page table mapped through the fixed kernel window at 0xD000_0000.
    core.write_sr(sr::PTEVADDR, 0xD000_0000, &mut host);
    core.write_sr(sr::PS, 0, &mut host);
    let vaddr = 0x0040_0000;
    host.words.insert((vaddr >> 10) & !0x3, 0x0080_0003);

    core.tlb_fill(vaddr, AccessKind::Load, core.mmu_index(), false, &mut host, &mut PreciseFrontEnd)?;
    for mapping in &host.installed {
        log::info!(
            "installed {:#010x} -> {:#010x} ({:?})",
            mapping.vpage,
            mapping.ppage,
            mapping.access
        );
    }

    let missing = 0x7000_0000;
    if !core.tlb_fill(missing, AccessKind::Fetch, 0, false, &mut host, &mut PreciseFrontEnd)? {
        log::info!(
            "fetch at {missing:#010x} raised cause {} into {:#010x}",
            core.arch().sr(sr::EXCCAUSE),
            core.arch().pc()
        );
    }

    core.write_sr(sr::PS, 0, &mut host);
    core.write_sr(sr::INTENABLE, 1 << 9, &mut host);
    core.irq_handle().set_irq(9, true)?;
    if core.on_instruction_boundary()? {
        log::info!(
            "level 3 interrupt, EPC3 {:#010x}, handler {:#010x}",
            core.arch().sr(sr::epc(3)),
            core.arch().pc()
        );
    }
    Ok(())
}
