//! Sample variants covering each protection regime.

use super::{
    ExceptionVectors, InterruptType, IrqConfig, OptionSet, TlbGeometry, Vector, VariantConfig,
    XtensaOption, MAX_NLEVEL,
};
use crate::mmu::MpuEntry;

/// Paged MMU with fixed ways 5 and 6 and 16 autorefill entries.
pub const SAMPLE_MMU: &str = "sample-mmu";
/// Paged MMU with variable ways 5 and 6 and 32 autorefill entries.
pub const SAMPLE_MMU_VARWAY56: &str = "sample-mmu-varway56";
/// Region protection and translation.
pub const SAMPLE_REGION: &str = "sample-region";
/// Segment-based MPU.
pub const SAMPLE_MPU: &str = "sample-mpu";
/// No protection hardware beyond `CACHEATTR`.
pub const SAMPLE_FLAT: &str = "sample-flat";

const fn vectors_at(base: u32) -> ExceptionVectors {
    ExceptionVectors::new()
        .with(Vector::Reset0, 0xFE00_0000)
        .with(Vector::Reset1, 0x0000_1000)
        .with(Vector::WindowOverflow4, base)
        .with(Vector::WindowUnderflow4, base + 0x040)
        .with(Vector::WindowOverflow8, base + 0x080)
        .with(Vector::WindowUnderflow8, base + 0x0C0)
        .with(Vector::WindowOverflow12, base + 0x100)
        .with(Vector::WindowUnderflow12, base + 0x140)
        .with(Vector::Kernel, base + 0x300)
        .with(Vector::User, base + 0x340)
        .with(Vector::Double, base + 0x3C0)
}

fn level_vectors_at(base: u32, nlevel: u8) -> [Option<u32>; MAX_NLEVEL + 1] {
    let mut table = [None; MAX_NLEVEL + 1];
    for level in 2..=nlevel {
        table[usize::from(level)] = Some(base + 0x180 + 0x40 * (u32::from(level) - 2));
    }
    table
}

fn interrupt_options() -> OptionSet {
    OptionSet::of(&[
        XtensaOption::WindowedRegister,
        XtensaOption::Exception,
        XtensaOption::UnalignedException,
        XtensaOption::Interrupt,
        XtensaOption::HighPriorityInterrupt,
        XtensaOption::TimerInterrupt,
        XtensaOption::Debug,
        XtensaOption::RelocatableVector,
    ])
}

fn full_interrupt_set() -> Vec<IrqConfig> {
    use InterruptType::{Edge, Level, Nmi, Software, Timer};

    vec![
        IrqConfig::new(1, Level),
        IrqConfig::new(1, Level),
        IrqConfig::new(1, Level),
        IrqConfig::new(1, Level),
        IrqConfig::new(1, Level),
        IrqConfig::new(1, Level),
        IrqConfig::new(1, Timer),
        IrqConfig::new(1, Software),
        IrqConfig::new(2, Level),
        IrqConfig::new(3, Level),
        IrqConfig::new(3, Timer),
        IrqConfig::new(3, Software),
        IrqConfig::new(4, Level),
        IrqConfig::new(5, Timer),
        IrqConfig::new(7, Nmi),
        IrqConfig::new(1, Edge),
        IrqConfig::new(2, Edge),
        IrqConfig::new(3, Edge),
        IrqConfig::new(4, Edge),
        IrqConfig::new(5, Level),
    ]
}

fn mmu_variant(name: &str, refill_way_size: usize, varway56: bool) -> VariantConfig {
    let base = 0xD000_0000;
    let nlevel = 7;
    VariantConfig {
        name: name.into(),
        options: interrupt_options().with(XtensaOption::Mmu),
        vectors: vectors_at(base).with(Vector::Debug, base + 0x280),
        vecbase: base,
        level_vectors: level_vectors_at(base, nlevel),
        nlevel,
        nmi_level: 7,
        excm_level: 3,
        debug_level: 6,
        interrupts: full_interrupt_set(),
        timer_irqs: vec![6, 10, 13],
        itlb: TlbGeometry::mmu(7, refill_way_size, varway56),
        dtlb: TlbGeometry::mmu(10, refill_way_size, varway56),
        nareg: 32,
        has_depc: true,
        nibreak: 2,
        ndbreak: 2,
        ..VariantConfig::default()
    }
}

/// Paged-MMU sample with fixed kernel windows in ways 5 and 6.
#[must_use]
pub fn sample_mmu() -> VariantConfig {
    mmu_variant(SAMPLE_MMU, 4, false)
}

/// Paged-MMU sample with variable ways 5 and 6.
#[must_use]
pub fn sample_mmu_varway56() -> VariantConfig {
    mmu_variant(SAMPLE_MMU_VARWAY56, 8, true)
}

/// Region protection/translation sample without a dedicated `DEPC`.
#[must_use]
pub fn sample_region() -> VariantConfig {
    use InterruptType::{Edge, Level, Software, Timer};

    let base = 0x4000_0000;
    let nlevel = 3;
    VariantConfig {
        name: SAMPLE_REGION.into(),
        options: interrupt_options()
            .with(XtensaOption::RegionProtection)
            .with(XtensaOption::RegionTranslation),
        vectors: vectors_at(base),
        vecbase: base,
        level_vectors: level_vectors_at(base, nlevel),
        nlevel,
        nmi_level: 4,
        excm_level: 1,
        debug_level: 0,
        interrupts: vec![
            IrqConfig::new(1, Level),
            IrqConfig::new(1, Level),
            IrqConfig::new(1, Level),
            IrqConfig::new(1, Level),
            IrqConfig::new(1, Timer),
            IrqConfig::new(1, Software),
            IrqConfig::new(2, Level),
            IrqConfig::new(3, Edge),
            IrqConfig::new(2, Timer),
        ],
        timer_irqs: vec![4, 8],
        nareg: 32,
        ..VariantConfig::default()
    }
}

/// MPU sample with sixteen foreground segments.
#[must_use]
pub fn sample_mpu() -> VariantConfig {
    let base = 0x6000_0000;
    let nlevel = 7;
    VariantConfig {
        name: SAMPLE_MPU.into(),
        options: interrupt_options().with(XtensaOption::Mpu),
        vectors: vectors_at(base).with(Vector::Debug, base + 0x280),
        vecbase: base,
        level_vectors: level_vectors_at(base, nlevel),
        nlevel,
        nmi_level: 7,
        excm_level: 3,
        debug_level: 6,
        interrupts: full_interrupt_set(),
        timer_irqs: vec![6, 10, 13],
        mpu_fg_segments: 16,
        mpu_align: 4096,
        mpu_background: vec![
            // device, rwx for every ring
            MpuEntry::new(0x0000_0000, 0x0000_0F00),
            // cacheable write-back memory, rwx for every ring
            MpuEntry::new(0x6000_0000, 0x001F_0F00),
            // device, ring-0 read/write only
            MpuEntry::new(0x8000_0000, 0x0000_0600),
        ],
        nareg: 32,
        has_depc: true,
        nibreak: 2,
        ndbreak: 2,
        ..VariantConfig::default()
    }
}

/// Sample with neither MMU nor MPU; `CACHEATTR` decides access rights.
#[must_use]
pub fn sample_flat() -> VariantConfig {
    use InterruptType::{Edge, Level, Software, Timer};

    let base = 0x5000_0000;
    VariantConfig {
        name: SAMPLE_FLAT.into(),
        options: OptionSet::of(&[
            XtensaOption::Exception,
            XtensaOption::Interrupt,
            XtensaOption::TimerInterrupt,
            XtensaOption::CacheAttr,
        ]),
        vectors: vectors_at(base),
        vecbase: base,
        nlevel: 1,
        nmi_level: 2,
        excm_level: 1,
        interrupts: vec![
            IrqConfig::new(1, Level),
            IrqConfig::new(1, Software),
            IrqConfig::new(1, Edge),
            IrqConfig::new(1, Timer),
        ],
        timer_irqs: vec![3],
        ..VariantConfig::default()
    }
}

/// All built-in sample variants.
#[must_use]
pub fn all() -> Vec<VariantConfig> {
    vec![
        sample_mmu(),
        sample_mmu_varway56(),
        sample_region(),
        sample_mpu(),
        sample_flat(),
    ]
}
