//! Events surfaced by the report reader.

/// Asynchronous event published on the session's broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// Panel input state changed. Bit `n` set means panel `n` is pressed,
    /// panels numbered 0..=8 in numpad order starting at down-left.
    InputState { mask: u16 },
}
