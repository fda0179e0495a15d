/// Observable state of the interrupt and exception delivery engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DeliveryState {
    /// No exception in progress and nothing pending.
    #[default]
    Running,
    /// An interrupt level is pending and will be evaluated at the next
    /// instruction boundary.
    ExceptionPending,
    /// Exception mode is set; a handler is running.
    ExceptionTaken,
    /// The last vector taken was the double-exception vector.
    DoubleException,
}

impl DeliveryState {
    /// Returns `true` while a handler owns the core (`PS.EXCM` set).
    #[must_use]
    pub const fn in_handler(self) -> bool {
        matches!(self, Self::ExceptionTaken | Self::DoubleException)
    }
}
