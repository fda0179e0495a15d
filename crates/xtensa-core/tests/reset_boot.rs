//! Reset values and variant registration for every built-in variant.

use std::sync::Arc;

use env_logger as _;
use log as _;
use once_cell as _;
use parking_lot as _;
use proptest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

use rstest::rstest;
use xtensa_core::{
    find_variant, presets, register_variant, sr, BusError, Core, CoreError, EntrySlot,
    HostMapping, HostMemory, MpuEntry, NullHost, OptionSet, ProtectionMode, TlbEntry, Variant,
    XtensaOption, CACHEATTR_RESET, RASID_RESET,
};

#[derive(Debug, Default)]
struct FlushCounter {
    flushes: usize,
}

impl HostMemory for FlushCounter {
    fn read_physical_word(&mut self, paddr: u32) -> Result<u32, BusError> {
        Err(BusError { paddr })
    }

    fn install_translation(&mut self, _mapping: HostMapping) {}

    fn invalidate(&mut self, _vaddr: u32) {}

    fn invalidate_all(&mut self) {
        self.flushes += 1;
    }
}

#[rstest]
#[case(presets::SAMPLE_MMU, 0xD000_0000, ProtectionMode::Mmu)]
#[case(presets::SAMPLE_MMU_VARWAY56, 0xD000_0000, ProtectionMode::Mmu)]
#[case(presets::SAMPLE_REGION, 0x4000_0000, ProtectionMode::Region { translation: true })]
#[case(presets::SAMPLE_MPU, 0x6000_0000, ProtectionMode::Mpu)]
#[case(presets::SAMPLE_FLAT, 0x5000_0000, ProtectionMode::Flat)]
fn every_variant_boots_from_its_reset_vector(
    #[case] name: &str,
    #[case] vecbase: u32,
    #[case] mode: ProtectionMode,
) {
    let mut host = FlushCounter::default();
    let core = Core::from_variant_name(name, &mut host).expect("built-in variant");

    assert_eq!(core.variant().mode(), mode);
    assert_eq!(core.arch().pc(), 0xFE00_0000);
    assert_eq!(core.arch().sr(sr::PS), 0x1F);
    assert_eq!(core.arch().sr(sr::VECBASE), vecbase);
    assert_eq!(core.read_sr(sr::INTSET), 0);
    assert_eq!(core.pending_level(), 0);
    assert_eq!(core.last_vector(), None);
    assert_eq!(host.flushes, 1);

    let windowed = core.variant().has(XtensaOption::WindowedRegister);
    assert_eq!(core.arch().sr(sr::WINDOW_START), u32::from(windowed));
}

#[test]
fn paged_variant_resets_the_mmu_registers_and_fixed_ways() {
    let core = Core::from_variant_name(presets::SAMPLE_MMU, &mut NullHost).expect("core");
    assert_eq!(core.arch().sr(sr::RASID), RASID_RESET);
    assert_eq!(core.arch().sr(sr::CACHEATTR), CACHEATTR_RESET);
    assert_eq!(core.arch().sr(sr::ITLBCFG), 0);
    assert_eq!(core.arch().sr(sr::DTLBCFG), 0);

    let window = core.dtlb().entry(EntrySlot::new(5, 0)).copied();
    assert_eq!(
        window,
        Some(TlbEntry {
            vaddr: 0xD000_0000,
            paddr: 0,
            asid: 1,
            attr: 7,
            variable: false,
        })
    );
    let bypass = core.itlb().entry(EntrySlot::new(6, 1)).copied();
    assert_eq!(bypass.map(|entry| (entry.vaddr, entry.paddr, entry.attr)), Some((0xF000_0000, 0xF000_0000, 3)));
    assert_eq!(core.dtlb().entry(EntrySlot::new(0, 0)).map(|entry| entry.asid), Some(0));
}

#[test]
fn variable_way_six_resets_to_identity_regions() {
    let mut core =
        Core::from_variant_name(presets::SAMPLE_MMU_VARWAY56, &mut NullHost).expect("core");
    for (index, base) in (0_u32..8).map(|region| region << 29).enumerate() {
        let entry = core
            .dtlb()
            .entry(EntrySlot::new(6, index))
            .copied()
            .expect("way 6 entry");
        assert_eq!((entry.vaddr, entry.paddr, entry.asid), (base, base, 1));
        assert!(entry.variable);
    }
    assert!(core.wtlb(0x2000_0003, 0x2000_0006, true, &mut NullHost));
}

#[test]
fn reset_discards_software_state() {
    let mut host = FlushCounter::default();
    let mut core = Core::from_variant_name(presets::SAMPLE_MMU, &mut host).expect("core");
    core.write_sr(sr::PS, 0, &mut host);
    assert!(core.wtlb(0x0040_0003, 0x0040_0000, true, &mut host));
    core.write_sr(sr::INTENABLE, 1 << 9, &mut host);
    core.set_irq(9, true).expect("level 3 line");
    assert_eq!(core.pending_level(), 3);

    core.reset(&mut host).expect("reset");
    assert_eq!(host.flushes, 2);
    assert_eq!(core.dtlb().entry(EntrySlot::new(0, 0)).map(|entry| entry.asid), Some(0));
    assert_eq!(core.read_sr(sr::INTSET), 0);
    assert_eq!(core.arch().sr(sr::INTENABLE), 0);
    assert_eq!(core.pending_level(), 0);
}

#[test]
fn region_variant_resets_to_identity_regions() {
    let core = Core::from_variant_name(presets::SAMPLE_REGION, &mut NullHost).expect("core");
    assert_eq!(core.arch().sr(sr::CACHEATTR), CACHEATTR_RESET);
    for tlb in [core.itlb(), core.dtlb()] {
        for (index, base) in (0_u32..8).map(|region| region << 29).enumerate() {
            let entry = tlb.entry(EntrySlot::new(0, index)).copied().expect("region");
            assert_eq!((entry.vaddr, entry.paddr, entry.attr), (base, base, 2));
        }
    }
}

#[test]
fn mpu_variant_resets_foreground_segments() {
    let mut core = Core::from_variant_name(presets::SAMPLE_MPU, &mut NullHost).expect("core");
    core.wptlb(0x0000_0700, 0x0001_0001, &mut NullHost);
    assert_eq!(core.arch().sr(sr::MPUENB), 1);

    core.reset(&mut NullHost).expect("reset");
    assert_eq!(core.arch().sr(sr::MPUENB), 0);
    assert_eq!(core.arch().sr(sr::MPUCFG), 16);
    assert_eq!(core.arch().sr(sr::CACHEADRDIS), 0);
    assert_eq!(core.mpu().foreground(0), Some(MpuEntry::default()));
    assert_eq!(core.rptlb0(0), 0);
}

#[test]
fn variant_without_interrupts_resets_ps_to_exception_mode_only() {
    let mut config = presets::sample_flat();
    config.name = "flat-no-interrupt".into();
    config.options = OptionSet::of(&[XtensaOption::Exception, XtensaOption::CacheAttr]);
    config.interrupts.clear();
    config.timer_irqs.clear();
    let variant = Arc::new(Variant::finalize(config).expect("valid"));

    let core = Core::new(variant, &mut NullHost).expect("core");
    assert_eq!(core.arch().sr(sr::PS), 0x10);
    assert_eq!(core.irq_handle().set_irq(0, true), Err(CoreError::UnknownIrq(0)));
}

#[rstest]
#[case(vec![MpuEntry::new(0x1000, 0x0F00)], CoreError::MpuBackgroundBase)]
#[case(Vec::new(), CoreError::MpuBackgroundBase)]
#[case(
    vec![
        MpuEntry::new(0, 0x0F00),
        MpuEntry::new(0x8000_0000, 0x0F00),
        MpuEntry::new(0x4000_0000, 0x0F00),
    ],
    CoreError::MpuBackgroundOrder { index: 2 }
)]
fn malformed_mpu_background_fails_reset(#[case] background: Vec<MpuEntry>, #[case] expected: CoreError) {
    let mut config = presets::sample_mpu();
    config.name = "mpu-bad-background".into();
    config.mpu_background = background;
    let variant = Arc::new(Variant::finalize(config).expect("finalizes"));

    assert_eq!(Core::new(variant, &mut NullHost).err(), Some(expected));
}

#[test]
fn registered_variants_are_found_by_name() {
    assert!(matches!(
        register_variant(presets::sample_mmu()),
        Err(CoreError::DuplicateVariant(name)) if name == presets::SAMPLE_MMU
    ));

    let mut config = presets::sample_region();
    config.name = "reset-boot-region".into();
    config.vecbase = 0x2000_0000;
    register_variant(config).expect("fresh name");

    let core = Core::from_variant_name("reset-boot-region", &mut NullHost).expect("core");
    assert_eq!(core.arch().sr(sr::VECBASE), 0x2000_0000);
    assert!(find_variant("reset-boot-missing").is_err());
}
