//! Segment-based memory protection unit.

use super::access::PageAccess;
use crate::CoreError;

/// Mask of the segment-number field in the `WPTLB`/`RPTLB` operand.
pub const MPU_SEGMENT_MASK: u32 = 0x1F;
/// Mask of the 4-bit access-rights field.
pub const MPU_ACC_RIGHTS_MASK: u32 = 0x0000_0F00;
/// Shift of the access-rights field.
pub const MPU_ACC_RIGHTS_SHIFT: u32 = 8;
/// Mask of the 9-bit memory-type field.
pub const MPU_MEM_TYPE_MASK: u32 = 0x001F_F000;
/// Shift of the memory-type field.
pub const MPU_MEM_TYPE_SHIFT: u32 = 12;
/// Attribute bits stored in a segment.
pub const MPU_ATTR_MASK: u32 = 0x001F_FF00;
/// `PPTLB` result flag: the background table answered.
pub const MPU_PROBE_B: u32 = 0x4000_0000;
/// `PPTLB` result flag: an enabled foreground segment answered.
pub const MPU_PROBE_V: u32 = 0x8000_0000;

const TYPE_CPU_CACHE: u32 = 0x1;
const TYPE_CPU_R: u32 = 0x40;
const TYPE_CPU_W: u32 = 0x20;
const TYPE_CPU_C: u32 = 0x10;

/// Memory-type patterns (mask, value) that denote a CPU-cacheable region.
const CPU_CACHE_PATTERNS: [(u32, u32); 3] = [(0x18F, 0x089), (0x188, 0x080), (0x180, 0x180)];

/// One MPU segment: start address and attribute word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MpuEntry {
    /// First address covered by the segment.
    pub vaddr: u32,
    /// Access-rights and memory-type attribute.
    pub attr: u32,
}

impl MpuEntry {
    /// Creates a segment.
    #[must_use]
    pub const fn new(vaddr: u32, attr: u32) -> Self {
        Self { vaddr, attr }
    }

    /// Access-rights index.
    #[must_use]
    pub const fn access_rights(self) -> u32 {
        (self.attr & MPU_ACC_RIGHTS_MASK) >> MPU_ACC_RIGHTS_SHIFT
    }

    /// Memory-type field.
    #[must_use]
    pub const fn memory_type(self) -> u32 {
        (self.attr & MPU_MEM_TYPE_MASK) >> MPU_MEM_TYPE_SHIFT
    }
}

/// Outcome of a foreground scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MpuHit {
    /// Exactly one enabled foreground segment contains the address.
    Foreground(usize),
    /// No enabled foreground segment contains the address; index into the
    /// background table.
    Background(usize),
    /// More than one enabled foreground segment contains the address.
    MultiHit,
}

/// Half-open scan: segment `i` covers `[seg[i], seg[i + 1])`, the last one
/// runs to the end of the address space. Only segments accepted by
/// `enabled` are counted.
fn scan(segments: &[MpuEntry], vaddr: u32, enabled: impl Fn(usize) -> bool) -> (usize, Option<usize>) {
    let mut hits = 0;
    let mut first = None;
    for (i, segment) in segments.iter().enumerate() {
        if !enabled(i) || vaddr < segment.vaddr {
            continue;
        }
        let below_next = segments.get(i + 1).map_or(true, |next| vaddr < next.vaddr);
        if below_next {
            hits += 1;
            if hits > 1 {
                break;
            }
            first = Some(i);
        }
    }
    (hits, first)
}

/// Checks the background table shape required at reset.
///
/// # Errors
///
/// [`CoreError::MpuBackgroundBase`] when the table is empty or does not start
/// at address 0, [`CoreError::MpuBackgroundOrder`] for the first segment that
/// starts below its predecessor.
pub fn validate_background(background: &[MpuEntry]) -> Result<(), CoreError> {
    match background.first() {
        Some(first) if first.vaddr == 0 => {}
        _ => return Err(CoreError::MpuBackgroundBase),
    }
    if let Some(index) = background
        .windows(2)
        .position(|pair| pair[1].vaddr < pair[0].vaddr)
    {
        return Err(CoreError::MpuBackgroundOrder { index: index + 1 });
    }
    Ok(())
}

/// Cacheability bits derived from the memory-type field.
const fn cpu_cache(attr: u32) -> u32 {
    let memory_type = (attr & MPU_MEM_TYPE_MASK) >> MPU_MEM_TYPE_SHIFT;
    let mut i = 0;
    while i < CPU_CACHE_PATTERNS.len() {
        let (mask, value) = CPU_CACHE_PATTERNS[i];
        if memory_type & mask == value {
            return TYPE_CPU_CACHE | (memory_type & (TYPE_CPU_R | TYPE_CPU_W | TYPE_CPU_C));
        }
        i += 1;
    }
    0
}

const fn rights(bits: u16) -> PageAccess {
    PageAccess::from_bits(bits)
}

/// Rights per access-rights index, `[ring 0, other rings]`.
const ACCESS_RIGHTS: [[PageAccess; 2]; 16] = {
    const R: u16 = 0x1;
    const W: u16 = 0x2;
    const X: u16 = 0x4;
    let mut table = [[PageAccess::NONE; 2]; 16];
    table[4] = [rights(R), rights(0)];
    table[5] = [rights(R | X), rights(0)];
    table[6] = [rights(R | W), rights(0)];
    table[7] = [rights(R | W | X), rights(0)];
    table[8] = [rights(W), rights(W)];
    table[9] = [rights(R | W), rights(R | W | X)];
    table[10] = [rights(R | W), rights(R)];
    table[11] = [rights(R | W | X), rights(R | X)];
    table[12] = [rights(R), rights(R)];
    table[13] = [rights(R | X), rights(R | X)];
    table[14] = [rights(R | W), rights(R | W)];
    table[15] = [rights(R | W | X), rights(R | W | X)];
    table
};

/// Decodes an MPU attribute for an access from `ring`.
#[must_use]
pub const fn mpu_attr_to_access(attr: u32, ring: u8) -> PageAccess {
    let index = ((attr & MPU_ACC_RIGHTS_MASK) >> MPU_ACC_RIGHTS_SHIFT) as usize;
    let rights = ACCESS_RIGHTS[index][if ring == 0 { 0 } else { 1 }];
    let cache = cpu_cache(attr);
    let policy = if cache & TYPE_CPU_CACHE == 0 {
        PageAccess::CACHE_BYPASS
    } else if cache & TYPE_CPU_C != 0 {
        PageAccess::CACHE_WB
    } else {
        PageAccess::CACHE_WT
    };
    rights.union(policy)
}

/// Foreground segments, their enable bits and the static background table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Mpu {
    foreground: Vec<MpuEntry>,
    background: Vec<MpuEntry>,
    align: u32,
}

impl Mpu {
    /// Creates an MPU with `segments` zeroed foreground segments.
    #[must_use]
    pub fn new(segments: usize, background: Vec<MpuEntry>, align: u32) -> Self {
        Self {
            foreground: vec![MpuEntry::default(); segments],
            background,
            align,
        }
    }

    /// Number of foreground segments.
    #[must_use]
    pub fn segments(&self) -> usize {
        self.foreground.len()
    }

    /// Segment start alignment, also the reported page size.
    #[must_use]
    pub const fn align(&self) -> u32 {
        self.align
    }

    /// Foreground segment `index`.
    #[must_use]
    pub fn foreground(&self, index: usize) -> Option<MpuEntry> {
        self.foreground.get(index).copied()
    }

    /// Background segment `index`.
    #[must_use]
    pub fn background(&self, index: usize) -> Option<MpuEntry> {
        self.background.get(index).copied()
    }

    /// Zeroes the foreground segments and validates the background table.
    ///
    /// # Errors
    ///
    /// See [`validate_background`].
    pub fn reset(&mut self) -> Result<(), CoreError> {
        self.foreground.fill(MpuEntry::default());
        validate_background(&self.background)
    }

    /// Locates `vaddr` among the foreground segments enabled in `mpuenb`,
    /// falling back to the background table.
    #[must_use]
    pub fn lookup(&self, vaddr: u32, mpuenb: u32) -> MpuHit {
        let enabled = |i: usize| i < 32 && mpuenb & (1 << i) != 0;
        match scan(&self.foreground, vaddr, enabled) {
            (0, _) | (_, None) => {
                let (_, segment) = scan(&self.background, vaddr, |_| true);
                MpuHit::Background(segment.unwrap_or(0))
            }
            (1, Some(segment)) => MpuHit::Foreground(segment),
            _ => MpuHit::MultiHit,
        }
    }

    /// Attribute of the segment a hit refers to.
    #[must_use]
    pub fn attr(&self, hit: MpuHit) -> Option<u32> {
        match hit {
            MpuHit::Foreground(index) => self.foreground(index).map(|entry| entry.attr),
            MpuHit::Background(index) => self.background(index).map(|entry| entry.attr),
            MpuHit::MultiHit => None,
        }
    }

    /// Writes foreground segment `index`: start aligned down, attribute
    /// masked. Returns `false` for an out-of-range index.
    pub fn write(&mut self, index: usize, vaddr: u32, attr: u32) -> bool {
        let align = self.align;
        match self.foreground.get_mut(index) {
            Some(entry) => {
                entry.vaddr = vaddr & !(align - 1);
                entry.attr = attr & MPU_ATTR_MASK;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{
        mpu_attr_to_access, validate_background, Mpu, MpuEntry, MpuHit, MPU_ATTR_MASK,
    };
    use crate::mmu::{AccessKind, CachePolicy};
    use crate::CoreError;

    fn background() -> Vec<MpuEntry> {
        vec![
            MpuEntry::new(0, 0x0F00),
            MpuEntry::new(0x6000_0000, 0x001F_0F00),
            MpuEntry::new(0x8000_0000, 0x0600),
        ]
    }

    #[test]
    fn background_must_start_at_zero() {
        assert_eq!(validate_background(&[]), Err(CoreError::MpuBackgroundBase));
        assert_eq!(
            validate_background(&[MpuEntry::new(0x1000, 0)]),
            Err(CoreError::MpuBackgroundBase)
        );
    }

    #[test]
    fn background_must_be_sorted() {
        let table = [
            MpuEntry::new(0, 0),
            MpuEntry::new(0x2000, 0),
            MpuEntry::new(0x1000, 0),
        ];
        assert_eq!(
            validate_background(&table),
            Err(CoreError::MpuBackgroundOrder { index: 2 })
        );
        assert_eq!(validate_background(&background()), Ok(()));
    }

    #[test]
    fn all_disabled_falls_through_without_multi_hit() {
        let mut mpu = Mpu::new(4, background(), 4096);
        mpu.write(0, 0x1000, 0x0700);
        mpu.write(1, 0x1000, 0x0700);
        mpu.write(2, 0x1000, 0x0700);

        for vaddr in [0, 0x0FFF, 0x1000, 0x5FFF_FFFF, 0x6000_0000, 0x8000_0000, u32::MAX] {
            assert!(
                matches!(mpu.lookup(vaddr, 0), MpuHit::Background(_)),
                "{vaddr:#x}"
            );
        }
        assert_eq!(mpu.lookup(0x6000_0000, 0), MpuHit::Background(1));
        assert_eq!(mpu.lookup(0x5FFF_FFFF, 0), MpuHit::Background(0));
    }

    #[test]
    fn enabled_segments_use_half_open_intervals() {
        let mut mpu = Mpu::new(3, background(), 4096);
        mpu.write(0, 0x1000, 0x0700);
        mpu.write(1, 0x2000, 0x0600);
        mpu.write(2, 0x3000, 0x0400);

        assert_eq!(mpu.lookup(0x1FFF, 0b111), MpuHit::Foreground(0));
        assert_eq!(mpu.lookup(0x2000, 0b111), MpuHit::Foreground(1));
        assert_eq!(mpu.lookup(0xFFFF_0000, 0b111), MpuHit::Foreground(2));
        assert_eq!(mpu.lookup(0x0800, 0b111), MpuHit::Background(0));
        assert_eq!(mpu.lookup(0x2000, 0b101), MpuHit::Background(0));
    }

    #[test]
    fn unsorted_enabled_segments_multi_hit() {
        let mut mpu = Mpu::new(3, background(), 4096);
        mpu.write(0, 0x0000, 0x0700);
        mpu.write(1, 0x2000, 0x0700);
        mpu.write(2, 0x1000, 0x0700);

        assert_eq!(mpu.lookup(0x1800, 0b111), MpuHit::MultiHit);
        assert_eq!(mpu.lookup(0x1800, 0b011), MpuHit::Foreground(0));
    }

    #[test]
    fn write_aligns_start_and_masks_attribute() {
        let mut mpu = Mpu::new(1, background(), 4096);
        assert!(mpu.write(0, 0x1234_5678, 0xFFFF_FFFF));
        assert_eq!(
            mpu.foreground(0),
            Some(MpuEntry::new(0x1234_5000, MPU_ATTR_MASK))
        );
        assert!(!mpu.write(1, 0, 0));
    }

    #[rstest]
    #[case(0x0F00, 0, true, true, true)]
    #[case(0x0F00, 2, true, true, true)]
    #[case(0x0600, 0, true, true, false)]
    #[case(0x0600, 1, false, false, false)]
    #[case(0x0A00, 3, true, false, false)]
    #[case(0x0900, 1, true, true, true)]
    #[case(0x0800, 0, false, true, false)]
    fn rights_depend_on_ring(
        #[case] attr: u32,
        #[case] ring: u8,
        #[case] read: bool,
        #[case] write: bool,
        #[case] exec: bool,
    ) {
        let access = mpu_attr_to_access(attr, ring);
        assert_eq!(access.is_granted(AccessKind::Load), read);
        assert_eq!(access.is_granted(AccessKind::Store), write);
        assert_eq!(access.is_granted(AccessKind::Fetch), exec);
    }

    #[rstest]
    #[case(0x0000_0F00, CachePolicy::Bypass)]
    #[case(0x001F_0F00, CachePolicy::WriteBack)]
    #[case(0x0018_0F00, CachePolicy::WriteThrough)]
    #[case(0x0008_9F00, CachePolicy::WriteThrough)]
    fn memory_type_selects_cache_policy(#[case] attr: u32, #[case] policy: CachePolicy) {
        assert_eq!(mpu_attr_to_access(attr, 0).cache_policy(), Some(policy));
    }
}
