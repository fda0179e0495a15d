use thiserror::Error;

use crate::config::Vector;

/// Cause classes used for grouping and policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CauseClass {
    /// Instruction-level condition (illegal opcode, syscall, divide by zero).
    Instruction,
    /// Address translation could not find a unique mapping.
    Translation,
    /// A mapping was found but access rights or ring deny the access.
    Protection,
    /// Alignment or bus-level memory failure.
    Memory,
    /// Level-1 interrupt folded into the exception path.
    Interrupt,
    /// Coprocessor access while disabled.
    Coprocessor,
}

/// Guest-visible exception cause codes as stored in `EXCCAUSE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum ExceptionCause {
    /// Illegal instruction encoding.
    #[error("illegal instruction")]
    IllegalInstruction = 0,
    /// `SYSCALL` instruction.
    #[error("system call")]
    Syscall = 1,
    /// Bus error during instruction fetch.
    #[error("instruction fetch error")]
    InstructionFetchError = 2,
    /// Bus error during load or store.
    #[error("load/store error")]
    LoadStoreError = 3,
    /// Level-1 interrupt taken through the general exception vector.
    #[error("level-1 interrupt")]
    Level1Interrupt = 4,
    /// `MOVSP` when the caller's window is not live.
    #[error("alloca")]
    Alloca = 5,
    /// Integer division by zero.
    #[error("integer divide by zero")]
    IntegerDivideByZero = 6,
    /// Privileged instruction executed outside ring 0.
    #[error("privileged instruction")]
    Privileged = 8,
    /// Unaligned load or store.
    #[error("load/store alignment")]
    LoadStoreAlignment = 9,
    /// External register access without privilege.
    #[error("external register privilege")]
    ExternalRegisterPrivilege = 10,
    /// Exclusive access failure.
    #[error("exclusive access error")]
    ExclusiveError = 11,
    /// Data error on instruction fetch from the processor interface.
    #[error("instruction PIF data error")]
    InstructionPifDataError = 12,
    /// Data error on load/store through the processor interface.
    #[error("load/store PIF data error")]
    LoadStorePifDataError = 13,
    /// Address error on instruction fetch from the processor interface.
    #[error("instruction PIF address error")]
    InstructionPifAddressError = 14,
    /// Address error on load/store through the processor interface.
    #[error("load/store PIF address error")]
    LoadStorePifAddressError = 15,
    /// No instruction TLB entry matched.
    #[error("instruction TLB miss")]
    InstructionTlbMiss = 16,
    /// More than one instruction TLB entry matched.
    #[error("instruction TLB multi-hit")]
    InstructionTlbMultiHit = 17,
    /// Instruction fetch from a ring more privileged than the current one.
    #[error("instruction fetch privilege")]
    InstructionFetchPrivilege = 18,
    /// Instruction fetch from a non-executable page.
    #[error("instruction fetch prohibited")]
    InstructionFetchProhibited = 20,
    /// No data TLB entry matched.
    #[error("load/store TLB miss")]
    LoadStoreTlbMiss = 24,
    /// More than one data TLB entry matched.
    #[error("load/store TLB multi-hit")]
    LoadStoreTlbMultiHit = 25,
    /// Data access to a ring more privileged than the current one.
    #[error("load/store privilege")]
    LoadStorePrivilege = 26,
    /// Load from a non-readable page.
    #[error("load prohibited")]
    LoadProhibited = 28,
    /// Store to a non-writable page.
    #[error("store prohibited")]
    StoreProhibited = 29,
    /// Coprocessor 0 used while disabled in `CPENABLE`.
    #[error("coprocessor 0 disabled")]
    Coprocessor0Disabled = 32,
    /// Coprocessor 1 used while disabled in `CPENABLE`.
    #[error("coprocessor 1 disabled")]
    Coprocessor1Disabled = 33,
    /// Coprocessor 2 used while disabled in `CPENABLE`.
    #[error("coprocessor 2 disabled")]
    Coprocessor2Disabled = 34,
    /// Coprocessor 3 used while disabled in `CPENABLE`.
    #[error("coprocessor 3 disabled")]
    Coprocessor3Disabled = 35,
    /// Coprocessor 4 used while disabled in `CPENABLE`.
    #[error("coprocessor 4 disabled")]
    Coprocessor4Disabled = 36,
    /// Coprocessor 5 used while disabled in `CPENABLE`.
    #[error("coprocessor 5 disabled")]
    Coprocessor5Disabled = 37,
    /// Coprocessor 6 used while disabled in `CPENABLE`.
    #[error("coprocessor 6 disabled")]
    Coprocessor6Disabled = 38,
    /// Coprocessor 7 used while disabled in `CPENABLE`.
    #[error("coprocessor 7 disabled")]
    Coprocessor7Disabled = 39,
}

impl ExceptionCause {
    /// Converts a cause to the value stored in `EXCCAUSE`.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts an `EXCCAUSE` value back into a cause.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::IllegalInstruction),
            1 => Some(Self::Syscall),
            2 => Some(Self::InstructionFetchError),
            3 => Some(Self::LoadStoreError),
            4 => Some(Self::Level1Interrupt),
            5 => Some(Self::Alloca),
            6 => Some(Self::IntegerDivideByZero),
            8 => Some(Self::Privileged),
            9 => Some(Self::LoadStoreAlignment),
            10 => Some(Self::ExternalRegisterPrivilege),
            11 => Some(Self::ExclusiveError),
            12 => Some(Self::InstructionPifDataError),
            13 => Some(Self::LoadStorePifDataError),
            14 => Some(Self::InstructionPifAddressError),
            15 => Some(Self::LoadStorePifAddressError),
            16 => Some(Self::InstructionTlbMiss),
            17 => Some(Self::InstructionTlbMultiHit),
            18 => Some(Self::InstructionFetchPrivilege),
            20 => Some(Self::InstructionFetchProhibited),
            24 => Some(Self::LoadStoreTlbMiss),
            25 => Some(Self::LoadStoreTlbMultiHit),
            26 => Some(Self::LoadStorePrivilege),
            28 => Some(Self::LoadProhibited),
            29 => Some(Self::StoreProhibited),
            32 => Some(Self::Coprocessor0Disabled),
            33 => Some(Self::Coprocessor1Disabled),
            34 => Some(Self::Coprocessor2Disabled),
            35 => Some(Self::Coprocessor3Disabled),
            36 => Some(Self::Coprocessor4Disabled),
            37 => Some(Self::Coprocessor5Disabled),
            38 => Some(Self::Coprocessor6Disabled),
            39 => Some(Self::Coprocessor7Disabled),
            _ => None,
        }
    }

    /// Returns the coprocessor-disabled cause for coprocessor `index`.
    #[must_use]
    pub const fn coprocessor_disabled(index: u8) -> Option<Self> {
        if index < 8 {
            Self::from_u8(32 + index)
        } else {
            None
        }
    }

    /// Returns the class this cause belongs to.
    #[must_use]
    pub const fn class(self) -> CauseClass {
        match self {
            Self::IllegalInstruction
            | Self::Syscall
            | Self::Alloca
            | Self::IntegerDivideByZero
            | Self::Privileged
            | Self::ExternalRegisterPrivilege => CauseClass::Instruction,
            Self::InstructionTlbMiss
            | Self::InstructionTlbMultiHit
            | Self::LoadStoreTlbMiss
            | Self::LoadStoreTlbMultiHit => CauseClass::Translation,
            Self::InstructionFetchPrivilege
            | Self::InstructionFetchProhibited
            | Self::LoadStorePrivilege
            | Self::LoadProhibited
            | Self::StoreProhibited => CauseClass::Protection,
            Self::InstructionFetchError
            | Self::LoadStoreError
            | Self::LoadStoreAlignment
            | Self::ExclusiveError
            | Self::InstructionPifDataError
            | Self::LoadStorePifDataError
            | Self::InstructionPifAddressError
            | Self::LoadStorePifAddressError => CauseClass::Memory,
            Self::Level1Interrupt => CauseClass::Interrupt,
            Self::Coprocessor0Disabled
            | Self::Coprocessor1Disabled
            | Self::Coprocessor2Disabled
            | Self::Coprocessor3Disabled
            | Self::Coprocessor4Disabled
            | Self::Coprocessor5Disabled
            | Self::Coprocessor6Disabled
            | Self::Coprocessor7Disabled => CauseClass::Coprocessor,
        }
    }
}

/// Fatal, host-visible errors. The core stops instead of guessing intent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// No variant is registered under the requested name.
    #[error("unknown core variant `{0}`")]
    UnknownVariant(String),
    /// A variant with the same name is already registered.
    #[error("core variant `{0}` is already registered")]
    DuplicateVariant(String),
    /// The variant descriptor is internally inconsistent.
    #[error("invalid variant configuration: {0}")]
    InvalidConfig(String),
    /// Background MPU table does not start at address 0.
    #[error("background MPU segment 0 must start at address 0")]
    MpuBackgroundBase,
    /// Background MPU table is not sorted by start address.
    #[error("background MPU segment {index} starts below its predecessor")]
    MpuBackgroundOrder {
        /// Index of the first out-of-order segment.
        index: usize,
    },
    /// Control reached an exception vector the variant leaves unset.
    #[error("exception vector {0:?} is not configured")]
    UnsetVector(Vector),
    /// Control reached an interrupt level without a configured vector.
    #[error("interrupt level {0} has no configured vector")]
    UnsetLevelVector(u8),
    /// Register number outside the flat register-number space.
    #[error("unknown register number {0:#06x}")]
    UnknownRegister(u32),
    /// Interrupt line outside the configured interrupt set.
    #[error("interrupt {0} is not configured")]
    UnknownIrq(u32),
}
