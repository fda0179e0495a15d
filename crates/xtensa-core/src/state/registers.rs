/// Number of address registers visible through the register window.
pub const WINDOW_REGISTER_COUNT: usize = 16;
/// Number of slots in each of the special and user register banks.
pub const REGISTER_BANK_SIZE: usize = 256;

/// Special register numbers.
#[allow(missing_docs)]
pub mod sr {
    pub const LBEG: u8 = 0;
    pub const LEND: u8 = 1;
    pub const LCOUNT: u8 = 2;
    pub const SAR: u8 = 3;
    pub const BR: u8 = 4;
    pub const LITBASE: u8 = 5;
    pub const SCOMPARE1: u8 = 12;
    pub const ACCLO: u8 = 16;
    pub const ACCHI: u8 = 17;
    pub const MR: u8 = 32;
    pub const WINDOW_BASE: u8 = 72;
    pub const WINDOW_START: u8 = 73;
    pub const PTEVADDR: u8 = 83;
    pub const MMID: u8 = 89;
    pub const RASID: u8 = 90;
    pub const MPUENB: u8 = 90;
    pub const ITLBCFG: u8 = 91;
    pub const DTLBCFG: u8 = 92;
    pub const MPUCFG: u8 = 92;
    pub const ERACCESS: u8 = 95;
    pub const IBREAKENABLE: u8 = 96;
    pub const MEMCTL: u8 = 97;
    pub const CACHEATTR: u8 = 98;
    pub const CACHEADRDIS: u8 = 98;
    pub const ATOMCTL: u8 = 99;
    pub const DDR: u8 = 104;
    pub const IBREAKA: u8 = 128;
    pub const DBREAKA: u8 = 144;
    pub const DBREAKC: u8 = 160;
    pub const CONFIGID0: u8 = 176;
    pub const EPC1: u8 = 177;
    pub const DEPC: u8 = 192;
    pub const EPS2: u8 = 194;
    pub const CONFIGID1: u8 = 208;
    pub const EXCSAVE1: u8 = 209;
    pub const CPENABLE: u8 = 224;
    pub const INTSET: u8 = 226;
    pub const INTCLEAR: u8 = 227;
    pub const INTENABLE: u8 = 228;
    pub const PS: u8 = 230;
    pub const VECBASE: u8 = 231;
    pub const EXCCAUSE: u8 = 232;
    pub const DEBUGCAUSE: u8 = 233;
    pub const CCOUNT: u8 = 234;
    pub const PRID: u8 = 235;
    pub const ICOUNT: u8 = 236;
    pub const ICOUNTLEVEL: u8 = 237;
    pub const EXCVADDR: u8 = 238;
    pub const CCOMPARE: u8 = 240;
    pub const MISC: u8 = 244;

    /// `EPCn` for interrupt level `level` (1..=7).
    #[must_use]
    pub const fn epc(level: u8) -> u8 {
        EPC1 + level - 1
    }

    /// `EPSn` for interrupt level `level` (2..=7).
    #[must_use]
    pub const fn eps(level: u8) -> u8 {
        EPS2 + level - 2
    }
}

/// User register numbers.
#[allow(missing_docs)]
pub mod ur {
    pub const EXPSTATE: u8 = 230;
    pub const THREADPTR: u8 = 231;
    pub const FCR: u8 = 232;
    pub const FSR: u8 = 233;
}

/// Returns the architectural name of special register `n`, `None` when the
/// number is not assigned.
#[must_use]
pub const fn special_register_name(n: u8) -> Option<&'static str> {
    let name = match n {
        sr::LBEG => "LBEG",
        sr::LEND => "LEND",
        sr::LCOUNT => "LCOUNT",
        sr::SAR => "SAR",
        sr::BR => "BR",
        sr::LITBASE => "LITBASE",
        sr::SCOMPARE1 => "SCOMPARE1",
        sr::ACCLO => "ACCLO",
        sr::ACCHI => "ACCHI",
        32..=35 => "MR",
        sr::WINDOW_BASE => "WINDOWBASE",
        sr::WINDOW_START => "WINDOWSTART",
        sr::PTEVADDR => "PTEVADDR",
        sr::MMID => "MMID",
        sr::RASID => "RASID",
        sr::ITLBCFG => "ITLBCFG",
        sr::DTLBCFG => "DTLBCFG",
        sr::ERACCESS => "ERACCESS",
        sr::IBREAKENABLE => "IBREAKENABLE",
        sr::MEMCTL => "MEMCTL",
        sr::CACHEATTR => "CACHEATTR",
        sr::ATOMCTL => "ATOMCTL",
        sr::DDR => "DDR",
        128 | 129 => "IBREAKA",
        144 | 145 => "DBREAKA",
        160 | 161 => "DBREAKC",
        sr::CONFIGID0 => "CONFIGID0",
        177..=183 => "EPC",
        sr::DEPC => "DEPC",
        194..=199 => "EPS",
        sr::CONFIGID1 => "CONFIGID1",
        209..=215 => "EXCSAVE",
        sr::CPENABLE => "CPENABLE",
        sr::INTSET => "INTSET",
        sr::INTCLEAR => "INTCLEAR",
        sr::INTENABLE => "INTENABLE",
        sr::PS => "PS",
        sr::VECBASE => "VECBASE",
        sr::EXCCAUSE => "EXCCAUSE",
        sr::DEBUGCAUSE => "DEBUGCAUSE",
        sr::CCOUNT => "CCOUNT",
        sr::PRID => "PRID",
        sr::ICOUNT => "ICOUNT",
        sr::ICOUNTLEVEL => "ICOUNTLEVEL",
        sr::EXCVADDR => "EXCVADDR",
        240..=242 => "CCOMPARE",
        244..=247 => "MISC",
        _ => return None,
    };
    Some(name)
}

/// Returns the architectural name of user register `n`.
#[must_use]
pub const fn user_register_name(n: u8) -> Option<&'static str> {
    match n {
        ur::EXPSTATE => Some("EXPSTATE"),
        ur::THREADPTR => Some("THREADPTR"),
        ur::FCR => Some("FCR"),
        ur::FSR => Some("FSR"),
        _ => None,
    }
}

/// Sub-fields packed into the processor-state register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum PsField {
    IntLevel = 0,
    Excm = 1,
    Um = 2,
    Ring = 3,
    Owb = 4,
    CallInc = 5,
    Woe = 6,
}

impl PsField {
    /// Every defined field, in register-number order.
    pub const ALL: [Self; 7] = [
        Self::IntLevel,
        Self::Excm,
        Self::Um,
        Self::Ring,
        Self::Owb,
        Self::CallInc,
        Self::Woe,
    ];

    /// Bit position of the least significant bit of the field.
    #[must_use]
    pub const fn shift(self) -> u32 {
        match self {
            Self::IntLevel => 0,
            Self::Excm => 4,
            Self::Um => 5,
            Self::Ring => 6,
            Self::Owb => 8,
            Self::CallInc => 16,
            Self::Woe => 18,
        }
    }

    /// Field width in bits.
    #[must_use]
    pub const fn width(self) -> u32 {
        match self {
            Self::IntLevel | Self::Owb => 4,
            Self::Ring | Self::CallInc => 2,
            Self::Excm | Self::Um | Self::Woe => 1,
        }
    }

    /// In-place mask of the field.
    #[must_use]
    pub const fn mask(self) -> u32 {
        ((1 << self.width()) - 1) << self.shift()
    }

    /// Decodes a field index as used by the flat register-number space.
    #[must_use]
    pub const fn from_u8(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::IntLevel),
            1 => Some(Self::Excm),
            2 => Some(Self::Um),
            3 => Some(Self::Ring),
            4 => Some(Self::Owb),
            5 => Some(Self::CallInc),
            6 => Some(Self::Woe),
            _ => None,
        }
    }
}

/// Union of every defined `PS` bit.
pub const PS_DEFINED_MASK: u32 = 0x0007_0FFF;

/// Processor-state register value with per-field accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Ps(u32);

#[allow(clippy::cast_possible_truncation)]
impl Ps {
    /// Wraps a raw value, dropping undefined bits.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw & PS_DEFINED_MASK)
    }

    /// Raw register value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Reads one field, right-aligned.
    #[must_use]
    pub const fn field(self, field: PsField) -> u32 {
        (self.0 & field.mask()) >> field.shift()
    }

    /// Replaces one field; bits of `value` beyond the field width are dropped.
    #[must_use]
    pub const fn with_field(self, field: PsField, value: u32) -> Self {
        Self((self.0 & !field.mask()) | ((value << field.shift()) & field.mask()))
    }

    /// Current interrupt level.
    #[must_use]
    pub const fn intlevel(self) -> u8 {
        self.field(PsField::IntLevel) as u8
    }

    /// Sets the interrupt level.
    #[must_use]
    pub const fn with_intlevel(self, level: u8) -> Self {
        self.with_field(PsField::IntLevel, level as u32)
    }

    /// Exception-mode bit.
    #[must_use]
    pub const fn excm(self) -> bool {
        self.field(PsField::Excm) != 0
    }

    /// Sets or clears exception mode.
    #[must_use]
    pub const fn with_excm(self, excm: bool) -> Self {
        self.with_field(PsField::Excm, excm as u32)
    }

    /// User-vector-mode bit.
    #[must_use]
    pub const fn um(self) -> bool {
        self.field(PsField::Um) != 0
    }

    /// Sets or clears user vector mode.
    #[must_use]
    pub const fn with_um(self, um: bool) -> Self {
        self.with_field(PsField::Um, um as u32)
    }

    /// Privilege ring.
    #[must_use]
    pub const fn ring(self) -> u8 {
        self.field(PsField::Ring) as u8
    }

    /// Sets the privilege ring.
    #[must_use]
    pub const fn with_ring(self, ring: u8) -> Self {
        self.with_field(PsField::Ring, ring as u32)
    }

    /// Old window base.
    #[must_use]
    pub const fn owb(self) -> u8 {
        self.field(PsField::Owb) as u8
    }

    /// Sets the old window base.
    #[must_use]
    pub const fn with_owb(self, owb: u8) -> Self {
        self.with_field(PsField::Owb, owb as u32)
    }

    /// Call increment.
    #[must_use]
    pub const fn callinc(self) -> u8 {
        self.field(PsField::CallInc) as u8
    }

    /// Sets the call increment.
    #[must_use]
    pub const fn with_callinc(self, callinc: u8) -> Self {
        self.with_field(PsField::CallInc, callinc as u32)
    }

    /// Window-overflow-enable bit.
    #[must_use]
    pub const fn woe(self) -> bool {
        self.field(PsField::Woe) != 0
    }

    /// Sets or clears window overflow detection.
    #[must_use]
    pub const fn with_woe(self, woe: bool) -> Self {
        self.with_field(PsField::Woe, woe as u32)
    }
}

/// Complete architectural register file of one core.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ArchitecturalState {
    pc: u32,
    regs: [u32; WINDOW_REGISTER_COUNT],
    phys_regs: Vec<u32>,
    sregs: Vec<u32>,
    uregs: Vec<u32>,
}

impl ArchitecturalState {
    /// Creates a zeroed register file with `nareg` physical address registers.
    #[must_use]
    pub fn new(nareg: usize) -> Self {
        Self {
            pc: 0,
            regs: [0; WINDOW_REGISTER_COUNT],
            phys_regs: vec![0; nareg.max(WINDOW_REGISTER_COUNT)],
            sregs: vec![0; REGISTER_BANK_SIZE],
            uregs: vec![0; REGISTER_BANK_SIZE],
        }
    }

    /// Reads the program counter.
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.pc
    }

    /// Writes the program counter.
    pub const fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    /// Reads windowed address register `a{n}`.
    #[must_use]
    pub fn ar(&self, n: usize) -> Option<u32> {
        self.regs.get(n).copied()
    }

    /// Mutable access to windowed address register `a{n}`.
    pub fn ar_mut(&mut self, n: usize) -> Option<&mut u32> {
        self.regs.get_mut(n)
    }

    /// Number of physical address registers.
    #[must_use]
    pub fn nareg(&self) -> usize {
        self.phys_regs.len()
    }

    /// Reads physical address register `n` without synchronising the window.
    #[must_use]
    pub fn phys(&self, n: usize) -> Option<u32> {
        self.phys_regs.get(n).copied()
    }

    /// Mutable access to physical address register `n`.
    pub fn phys_mut(&mut self, n: usize) -> Option<&mut u32> {
        self.phys_regs.get_mut(n)
    }

    /// Reads special register `n` with no side effects.
    #[must_use]
    pub fn sr(&self, n: u8) -> u32 {
        self.sregs[usize::from(n)]
    }

    /// Writes special register `n` with no side effects.
    pub fn set_sr(&mut self, n: u8, value: u32) {
        self.sregs[usize::from(n)] = value;
    }

    /// Reads user register `n`.
    #[must_use]
    pub fn ur(&self, n: u8) -> u32 {
        self.uregs[usize::from(n)]
    }

    /// Writes user register `n`.
    pub fn set_ur(&mut self, n: u8, value: u32) {
        self.uregs[usize::from(n)] = value;
    }

    /// Processor-state register.
    #[must_use]
    pub fn ps(&self) -> Ps {
        Ps::new(self.sr(sr::PS))
    }

    /// Replaces the processor-state register.
    pub fn set_ps(&mut self, ps: Ps) {
        self.set_sr(sr::PS, ps.raw());
    }

    fn window_offset(&self) -> usize {
        let windows = self.phys_regs.len() / 4;
        (self.sr(sr::WINDOW_BASE) as usize % windows) * 4
    }

    /// Copies the windowed view into the physical register file.
    pub fn sync_phys_from_window(&mut self) {
        let base = self.window_offset();
        let nareg = self.phys_regs.len();
        for (i, value) in self.regs.iter().enumerate() {
            self.phys_regs[(base + i) % nareg] = *value;
        }
    }

    /// Reloads the windowed view from the physical register file.
    pub fn sync_window_from_phys(&mut self) {
        let base = self.window_offset();
        let nareg = self.phys_regs.len();
        for (i, slot) in self.regs.iter_mut().enumerate() {
            *slot = self.phys_regs[(base + i) % nareg];
        }
    }
}
