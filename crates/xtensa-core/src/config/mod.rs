//! Immutable per-variant processor descriptor.
//!
//! A [`VariantConfig`] is plain data describing one configured processor.
//! [`Variant::finalize`] validates it once, derives the per-level and
//! per-type interrupt masks and picks the [`ProtectionMode`]. Finalized
//! variants are shared by reference and never mutated afterwards.

/// Configuration option bits.
pub mod options;
/// Built-in sample variants.
pub mod presets;
/// Process-wide name to variant registry.
pub mod registry;

pub use options::{OptionSet, XtensaOption};
pub use registry::{find_variant, register_variant, VariantRegistry};

use crate::mmu::{MpuEntry, ProtectionMode};
use crate::CoreError;

/// Highest interrupt level a variant can configure.
pub const MAX_NLEVEL: usize = 7;
/// Maximum number of interrupt lines.
pub const MAX_NINTERRUPT: usize = 32;
/// Maximum number of ways in a TLB.
pub const MAX_TLB_WAYS: usize = 10;
/// Maximum number of entries in a single TLB way.
pub const MAX_TLB_WAY_SIZE: usize = 8;
/// Maximum number of MPU foreground segments.
pub const MAX_MPU_FG_SEGMENTS: usize = 32;
/// Number of instruction breakpoint / data watchpoint register pairs.
pub const MAX_BREAKPOINTS: usize = 2;

/// Exception vector classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub enum Vector {
    Reset0,
    Reset1,
    WindowOverflow4,
    WindowUnderflow4,
    WindowOverflow8,
    WindowUnderflow8,
    WindowOverflow12,
    WindowUnderflow12,
    Kernel,
    User,
    Double,
    Debug,
}

impl Vector {
    /// Number of vector classes.
    pub const COUNT: usize = 12;

    /// Returns the table index for this vector class.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Exception vector table. `None` is the unset sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ExceptionVectors {
    table: [Option<u32>; Vector::COUNT],
}

impl ExceptionVectors {
    /// Table with every vector unset.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            table: [None; Vector::COUNT],
        }
    }

    /// Returns the configured address for `vector`.
    #[must_use]
    pub const fn get(&self, vector: Vector) -> Option<u32> {
        self.table[vector.index()]
    }

    /// Sets the address for `vector`.
    #[must_use]
    pub const fn with(mut self, vector: Vector, addr: u32) -> Self {
        self.table[vector.index()] = Some(addr);
        self
    }
}

/// Interrupt line types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub enum InterruptType {
    Level,
    Edge,
    Nmi,
    Software,
    Timer,
    Debug,
    WriteError,
    Profiling,
    IdmaDone,
    IdmaError,
    GsError,
}

impl InterruptType {
    /// Number of interrupt types.
    pub const COUNT: usize = 11;

    /// Returns the mask-table index for this type.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Level and type of one interrupt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct IrqConfig {
    /// Interrupt level the line is delivered at.
    pub level: u8,
    /// Line type.
    pub kind: InterruptType,
}

impl IrqConfig {
    /// Creates an interrupt line description.
    #[must_use]
    pub const fn new(level: u8, kind: InterruptType) -> Self {
        Self { level, kind }
    }
}

/// Geometry of one TLB (instruction or data).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TlbGeometry {
    /// Number of ways.
    pub nways: usize,
    /// Number of entries in each way.
    pub way_size: [usize; MAX_TLB_WAYS],
    /// Ways 5 and 6 have configurable page sizes.
    pub varway56: bool,
    /// Total number of autorefill entries in ways 0..=3 (16 or 32).
    pub nrefillentries: usize,
}

impl TlbGeometry {
    /// Paged-MMU geometry with `nways` ways and `refill_way_size` entries in
    /// each of the four autorefill ways.
    #[must_use]
    pub const fn mmu(nways: usize, refill_way_size: usize, varway56: bool) -> Self {
        Self {
            nways,
            way_size: [
                refill_way_size,
                refill_way_size,
                refill_way_size,
                refill_way_size,
                4,
                if varway56 { 4 } else { 2 },
                if varway56 { 8 } else { 2 },
                1,
                1,
                1,
            ],
            varway56,
            nrefillentries: refill_way_size * 4,
        }
    }

    /// Single-way geometry of eight 512 MiB regions.
    #[must_use]
    pub const fn region() -> Self {
        Self {
            nways: 1,
            way_size: [8, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            varway56: false,
            nrefillentries: 0,
        }
    }
}

impl Default for TlbGeometry {
    fn default() -> Self {
        Self::region()
    }
}

/// Plain-data description of one processor variant.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct VariantConfig {
    /// Registry name.
    pub name: String,
    /// Enabled configuration options.
    pub options: OptionSet,
    /// Exception vector table.
    pub vectors: ExceptionVectors,
    /// Reset value of `VECBASE` and base the static vectors are linked at.
    pub vecbase: u32,
    /// High-priority interrupt vectors indexed by level (2..=`MAX_NLEVEL`).
    pub level_vectors: [Option<u32>; MAX_NLEVEL + 1],
    /// Highest configured interrupt level, NMI level included when present.
    pub nlevel: u8,
    /// Level of non-maskable interrupts.
    pub nmi_level: u8,
    /// Level that `PS.EXCM` raises the effective interrupt level to.
    pub excm_level: u8,
    /// Level debug exceptions are taken at (0 when absent).
    pub debug_level: u8,
    /// Interrupt lines, indexed by interrupt number.
    pub interrupts: Vec<IrqConfig>,
    /// Interrupt numbers wired to `CCOMPARE0..`.
    pub timer_irqs: Vec<u8>,
    /// Instruction TLB geometry.
    pub itlb: TlbGeometry,
    /// Data TLB geometry.
    pub dtlb: TlbGeometry,
    /// Number of software-managed MPU segments.
    pub mpu_fg_segments: usize,
    /// MPU segment start alignment in bytes.
    pub mpu_align: u32,
    /// Static background MPU segment table.
    pub mpu_background: Vec<MpuEntry>,
    /// Number of physical address registers.
    pub nareg: usize,
    /// Variant has a dedicated `DEPC` register for double exceptions.
    pub has_depc: bool,
    /// Number of instruction breakpoint registers.
    pub nibreak: usize,
    /// Number of data watchpoint registers.
    pub ndbreak: usize,
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            options: OptionSet::empty(),
            vectors: ExceptionVectors::default(),
            vecbase: 0,
            level_vectors: [None; MAX_NLEVEL + 1],
            nlevel: 1,
            nmi_level: 2,
            excm_level: 1,
            debug_level: 0,
            interrupts: Vec::new(),
            timer_irqs: Vec::new(),
            itlb: TlbGeometry::region(),
            dtlb: TlbGeometry::region(),
            mpu_fg_segments: 0,
            mpu_align: 4096,
            mpu_background: Vec::new(),
            nareg: 16,
            has_depc: false,
            nibreak: 0,
            ndbreak: 0,
        }
    }
}

/// Finalized, validated variant descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    config: VariantConfig,
    mode: ProtectionMode,
    level_mask: [u32; MAX_NLEVEL + 1],
    type_mask: [u32; InterruptType::COUNT],
}

impl Variant {
    /// Validates `config` and derives the lookup tables used at run time.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] when the descriptor is internally
    /// inconsistent.
    pub fn finalize(config: VariantConfig) -> Result<Self, CoreError> {
        let invalid = |reason: String| Err(CoreError::InvalidConfig(reason));

        if config.name.is_empty() {
            return invalid("variant name is empty".into());
        }
        if config.interrupts.len() > MAX_NINTERRUPT {
            return invalid(format!("{} interrupts configured", config.interrupts.len()));
        }
        if config.nlevel == 0 || usize::from(config.nlevel) > MAX_NLEVEL {
            return invalid(format!("nlevel {} out of range", config.nlevel));
        }
        if config.nmi_level < 2 || config.nmi_level > 15 {
            return invalid(format!("nmi level {} out of range", config.nmi_level));
        }
        if config.excm_level == 0 || config.excm_level > config.nlevel {
            return invalid(format!("excm level {} out of range", config.excm_level));
        }
        if usize::from(config.debug_level) > MAX_NLEVEL || config.debug_level == 1 {
            return invalid(format!("debug level {} out of range", config.debug_level));
        }
        if !matches!(config.nareg, 16 | 32 | 64) {
            return invalid(format!("{} physical registers", config.nareg));
        }

        let mut level_mask = [0_u32; MAX_NLEVEL + 1];
        let mut type_mask = [0_u32; InterruptType::COUNT];
        for (irq, line) in config.interrupts.iter().enumerate() {
            if line.level == 0 || line.level > config.nlevel {
                return invalid(format!("irq {irq} level {} out of range", line.level));
            }
            // NMI bits may only live in the NMI level mask and nowhere else.
            let on_nmi_level = line.level == config.nmi_level;
            if (line.kind == InterruptType::Nmi) != on_nmi_level {
                return invalid(format!("irq {irq} NMI type and level disagree"));
            }
            level_mask[usize::from(line.level)] |= 1 << irq;
            type_mask[line.kind.index()] |= 1 << irq;
        }
        for timer in &config.timer_irqs {
            let is_timer = config
                .interrupts
                .get(usize::from(*timer))
                .is_some_and(|line| line.kind == InterruptType::Timer);
            if !is_timer {
                return invalid(format!("timer irq {timer} is not a timer interrupt"));
            }
        }

        let mode = ProtectionMode::select(config.options);
        match mode {
            ProtectionMode::Mmu => {
                for (label, tlb, max_ways) in [("itlb", &config.itlb, 7), ("dtlb", &config.dtlb, 10)] {
                    if tlb.nways < 7 || tlb.nways > max_ways {
                        return invalid(format!("{label} has {} ways", tlb.nways));
                    }
                    if !matches!(tlb.nrefillentries, 16 | 32) {
                        return invalid(format!(
                            "{label} has {} refill entries",
                            tlb.nrefillentries
                        ));
                    }
                    if tlb.way_size[..tlb.nways]
                        .iter()
                        .any(|size| *size == 0 || *size > MAX_TLB_WAY_SIZE)
                    {
                        return invalid(format!("{label} way size out of range"));
                    }
                }
            }
            ProtectionMode::Region { .. } | ProtectionMode::Flat => {
                if config.itlb != TlbGeometry::region() || config.dtlb != TlbGeometry::region() {
                    return invalid("region TLBs must have one way of eight entries".into());
                }
            }
            ProtectionMode::Mpu => {
                if config.mpu_fg_segments > MAX_MPU_FG_SEGMENTS {
                    return invalid(format!(
                        "{} MPU foreground segments",
                        config.mpu_fg_segments
                    ));
                }
                if !config.mpu_align.is_power_of_two() {
                    return invalid(format!("MPU alignment {:#x}", config.mpu_align));
                }
            }
        }
        if config.nibreak > MAX_BREAKPOINTS || config.ndbreak > MAX_BREAKPOINTS {
            return invalid("too many breakpoint registers".into());
        }

        Ok(Self {
            config,
            mode,
            level_mask,
            type_mask,
        })
    }

    /// Returns the raw descriptor.
    #[must_use]
    pub const fn config(&self) -> &VariantConfig {
        &self.config
    }

    /// Returns the registry name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the protection regime selected at finalization.
    #[must_use]
    pub const fn mode(&self) -> ProtectionMode {
        self.mode
    }

    /// Returns `true` when `option` is configured.
    #[must_use]
    pub const fn has(&self, option: XtensaOption) -> bool {
        self.config.options.contains(option)
    }

    /// Interrupt bits delivered at exactly `level`.
    #[must_use]
    pub fn level_mask(&self, level: u8) -> u32 {
        self.level_mask
            .get(usize::from(level))
            .copied()
            .unwrap_or(0)
    }

    /// Interrupt bits of type `kind`.
    #[must_use]
    pub const fn type_mask(&self, kind: InterruptType) -> u32 {
        self.type_mask[kind.index()]
    }

    /// Number of configured interrupt lines.
    #[must_use]
    pub fn ninterrupt(&self) -> usize {
        self.config.interrupts.len()
    }

    /// Returns the configuration of interrupt line `irq`.
    #[must_use]
    pub fn irq(&self, irq: usize) -> Option<IrqConfig> {
        self.config.interrupts.get(irq).copied()
    }

    /// Returns the configured address of an exception vector.
    #[must_use]
    pub const fn vector(&self, vector: Vector) -> Option<u32> {
        self.config.vectors.get(vector)
    }

    /// Returns the configured vector for a high-priority interrupt level.
    #[must_use]
    pub fn level_vector(&self, level: u8) -> Option<u32> {
        self.config
            .level_vectors
            .get(usize::from(level))
            .copied()
            .flatten()
    }

    /// Returns the geometry of the instruction (`false`) or data (`true`) TLB.
    #[must_use]
    pub const fn tlb_geometry(&self, dtlb: bool) -> &TlbGeometry {
        if dtlb {
            &self.config.dtlb
        } else {
            &self.config.itlb
        }
    }
}
