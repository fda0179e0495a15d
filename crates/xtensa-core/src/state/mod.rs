//! Architectural CPU state model primitives.

/// Register numbers, processor-state fields and the register file.
pub mod registers;
/// Delivery-engine state observation.
pub mod run_state;

pub use registers::{
    special_register_name, sr, ur, user_register_name, ArchitecturalState, Ps, PsField,
    PS_DEFINED_MASK, REGISTER_BANK_SIZE, WINDOW_REGISTER_COUNT,
};
pub use run_state::DeliveryState;
