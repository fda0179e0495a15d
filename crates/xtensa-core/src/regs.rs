//! Flat register-number space used by external inspection.
//!
//! | Numbers            | Register                                  |
//! |--------------------|-------------------------------------------|
//! | `0x0000..=0x000F`  | windowed address registers `a0..a15`      |
//! | `0x0020`           | program counter                           |
//! | `0x0100 + n`       | physical address register `ar{n}`         |
//! | `0x0200 + n`       | special register `n`                      |
//! | `0x0300 + n`       | user register `n`                         |
//! | `0x0400 + f`       | `PS` sub-field `f` (see [`PsField`])      |

use crate::api::{Core, HostMemory};
use crate::config::{InterruptType, XtensaOption};
use crate::mmu::ProtectionMode;
use crate::state::{special_register_name, sr, user_register_name, Ps, PsField};
use crate::CoreError;

/// First windowed address register.
pub const AR_BASE: u32 = 0x0000;
/// Program counter.
pub const PC_REGISTER: u32 = 0x0020;
/// First physical address register.
pub const PHYS_BASE: u32 = 0x0100;
/// First special register.
pub const SR_BASE: u32 = 0x0200;
/// First user register.
pub const UR_BASE: u32 = 0x0300;
/// First `PS` sub-field view.
pub const PS_FIELD_BASE: u32 = 0x0400;

const ITLBCFG_MASK: u32 = 0x0113_0000;
const PTEVADDR_MASK: u32 = 0xFFC0_0000;

/// Decoded register number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RegisterId {
    /// Windowed address register.
    Ar(u8),
    /// Program counter.
    Pc,
    /// Physical address register.
    Phys(u8),
    /// Special register.
    Special(u8),
    /// User register.
    User(u8),
    /// Masked view of one `PS` sub-field.
    Ps(PsField),
}

impl RegisterId {
    /// Decodes a flat register number. Only the layout is checked here;
    /// variant-specific limits are checked by the core on access.
    #[must_use]
    pub const fn decode(number: u32) -> Option<Self> {
        let low = (number & 0xFF) as u8;
        match number & !0xFF {
            AR_BASE if number < 16 => Some(Self::Ar(low)),
            AR_BASE if number == PC_REGISTER => Some(Self::Pc),
            PHYS_BASE => Some(Self::Phys(low)),
            SR_BASE => Some(Self::Special(low)),
            UR_BASE => Some(Self::User(low)),
            PS_FIELD_BASE => match PsField::from_u8(low) {
                Some(field) => Some(Self::Ps(field)),
                None => None,
            },
            _ => None,
        }
    }

    /// Flat register number.
    #[must_use]
    pub const fn number(self) -> u32 {
        match self {
            Self::Ar(n) => AR_BASE + n as u32,
            Self::Pc => PC_REGISTER,
            Self::Phys(n) => PHYS_BASE + n as u32,
            Self::Special(n) => SR_BASE + n as u32,
            Self::User(n) => UR_BASE + n as u32,
            Self::Ps(field) => PS_FIELD_BASE + field as u32,
        }
    }
}

impl Core {
    /// Resolves `number` against this core's variant.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownRegister`] for numbers outside the layout, physical
    /// registers beyond the configured count and unassigned special or user
    /// register numbers.
    pub fn register_id(&self, number: u32) -> Result<RegisterId, CoreError> {
        let id = RegisterId::decode(number).filter(|id| match *id {
            RegisterId::Phys(n) => usize::from(n) < self.arch.nareg(),
            RegisterId::Special(n) => special_register_name(n).is_some(),
            RegisterId::User(n) => user_register_name(n).is_some(),
            RegisterId::Ar(_) | RegisterId::Pc | RegisterId::Ps(_) => true,
        });
        id.ok_or_else(|| {
            log::error!("register number {number:#06x} does not exist");
            CoreError::UnknownRegister(number)
        })
    }

    /// Reads a register by flat number.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownRegister`], see [`Core::register_id`].
    pub fn read_register(&mut self, number: u32) -> Result<u32, CoreError> {
        let value = match self.register_id(number)? {
            RegisterId::Ar(n) => self.arch.ar(usize::from(n)).unwrap_or(0),
            RegisterId::Pc => self.arch.pc(),
            RegisterId::Phys(n) => {
                self.arch.sync_phys_from_window();
                self.arch.phys(usize::from(n)).unwrap_or(0)
            }
            RegisterId::Special(n) => self.read_sr(n),
            RegisterId::User(n) => self.arch.ur(n),
            RegisterId::Ps(field) => self.arch.ps().field(field),
        };
        Ok(value)
    }

    /// Writes a register by flat number, with the same side effects as a
    /// guest write.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownRegister`], see [`Core::register_id`].
    pub fn write_register<H: HostMemory + ?Sized>(
        &mut self,
        number: u32,
        value: u32,
        host: &mut H,
    ) -> Result<(), CoreError> {
        match self.register_id(number)? {
            RegisterId::Ar(n) => {
                if let Some(slot) = self.arch.ar_mut(usize::from(n)) {
                    *slot = value;
                }
            }
            RegisterId::Pc => self.arch.set_pc(value),
            RegisterId::Phys(n) => {
                self.arch.sync_phys_from_window();
                if let Some(slot) = self.arch.phys_mut(usize::from(n)) {
                    *slot = value;
                }
                self.arch.sync_window_from_phys();
            }
            RegisterId::Special(n) => self.write_sr(n, value, host),
            RegisterId::User(n) => self.arch.set_ur(n, value),
            RegisterId::Ps(field) => {
                let ps = self.arch.ps().with_field(field, value);
                self.write_sr(sr::PS, ps.raw(), host);
            }
        }
        Ok(())
    }

    /// Guest read of special register `n`.
    #[must_use]
    pub fn read_sr(&self, n: u8) -> u32 {
        match n {
            sr::INTSET => self.irq.pending(),
            _ => self.arch.sr(n),
        }
    }

    fn set_sr_invalidating<H: HostMemory + ?Sized>(&mut self, n: u8, value: u32, host: &mut H) {
        if self.arch.sr(n) != value {
            self.arch.set_sr(n, value);
            host.invalidate_all();
        }
    }

    /// Guest write of special register `n`, applying its side effects.
    pub fn write_sr<H: HostMemory + ?Sized>(&mut self, n: u8, value: u32, host: &mut H) {
        let mode = self.variant.mode();
        match n {
            sr::PS => {
                self.arch.set_ps(Ps::new(value));
                self.recompute_pending();
            }
            sr::INTSET => {
                self.irq
                    .or(value & self.variant.type_mask(InterruptType::Software));
                self.recompute_pending();
            }
            sr::INTCLEAR => {
                let clearable = self.variant.type_mask(InterruptType::Software)
                    | self.variant.type_mask(InterruptType::Edge)
                    | self.variant.type_mask(InterruptType::WriteError);
                self.irq.clear(value & clearable);
                self.recompute_pending();
            }
            sr::INTENABLE => {
                self.arch.set_sr(n, value);
                self.recompute_pending();
            }
            sr::RASID if mode == ProtectionMode::Mmu => {
                self.set_sr_invalidating(n, (value & 0xFFFF_FF00) | 0x1, host);
            }
            sr::MPUENB if mode == ProtectionMode::Mpu => self.set_sr_invalidating(n, value, host),
            sr::ITLBCFG | sr::DTLBCFG if mode == ProtectionMode::Mmu => {
                self.set_sr_invalidating(n, value & ITLBCFG_MASK, host);
            }
            sr::MPUCFG if mode == ProtectionMode::Mpu => {
                log::warn!("MPUCFG is read-only, write of {value:#010x} ignored");
            }
            sr::PRID | sr::CONFIGID0 | sr::CONFIGID1 => {
                log::warn!(
                    "{} is read-only, write of {value:#010x} ignored",
                    special_register_name(n).unwrap_or("SR")
                );
            }
            sr::PTEVADDR => self.arch.set_sr(n, value & PTEVADDR_MASK),
            sr::CACHEATTR if mode != ProtectionMode::Mpu => {
                self.set_sr_invalidating(n, value, host);
            }
            240..=242 => {
                self.arch.set_sr(n, value);
                let index = usize::from(n - sr::CCOMPARE);
                if let Some(irq) = self.variant.config().timer_irqs.get(index).copied() {
                    self.irq.clear(1 << irq);
                    self.recompute_pending();
                }
            }
            sr::WINDOW_BASE => {
                let windows = u32::try_from(self.arch.nareg() / 4).unwrap_or(1).max(1);
                self.arch.sync_phys_from_window();
                self.arch.set_sr(n, value % windows);
                self.arch.sync_window_from_phys();
            }
            sr::IBREAKENABLE | 128..=129 | 144..=145 | 160..=161 => {
                log::warn!(
                    "{}: breakpoints are not enforced, {value:#010x} stored only",
                    special_register_name(n).unwrap_or("SR")
                );
                self.arch.set_sr(n, value);
            }
            sr::VECBASE if !self.variant.has(XtensaOption::RelocatableVector) => {
                log::warn!("VECBASE is fixed on this variant, write of {value:#010x} ignored");
            }
            _ => self.arch.set_sr(n, value),
        }
    }
}
