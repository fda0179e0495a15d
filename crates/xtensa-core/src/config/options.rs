/// Configuration options a variant may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum XtensaOption {
    WindowedRegister,
    Exception,
    UnalignedException,
    Interrupt,
    HighPriorityInterrupt,
    TimerInterrupt,
    Debug,
    RelocatableVector,
    CacheAttr,
    RegionProtection,
    RegionTranslation,
    Mmu,
    Mpu,
}

impl XtensaOption {
    /// Returns the bit this option occupies in an [`OptionSet`].
    #[must_use]
    pub const fn bit(self) -> u64 {
        1 << self as u8
    }
}

/// Set of enabled configuration options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct OptionSet(u64);

impl OptionSet {
    /// Set with no options enabled.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Builds a set from a list of options.
    #[must_use]
    pub const fn of(options: &[XtensaOption]) -> Self {
        let mut bits = 0;
        let mut index = 0;
        while index < options.len() {
            bits |= options[index].bit();
            index += 1;
        }
        Self(bits)
    }

    /// Returns a copy with `option` enabled.
    #[must_use]
    pub const fn with(self, option: XtensaOption) -> Self {
        Self(self.0 | option.bit())
    }

    /// Returns `true` when `option` is enabled.
    #[must_use]
    pub const fn contains(self, option: XtensaOption) -> bool {
        self.0 & option.bit() != 0
    }

    /// Returns `true` when any of `options` is enabled.
    #[must_use]
    pub const fn contains_any(self, options: &[XtensaOption]) -> bool {
        self.0 & Self::of(options).0 != 0
    }

    /// Raw option bits.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }
}
