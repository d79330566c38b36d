//! Panel identifiers and pressed-state snapshots.

use std::fmt;

use crate::PANEL_COUNT;

/// One of the nine panels, numbered in numpad order from the bottom-left.
///
/// The discriminant is the panel's bit position in input masks and its
/// index into per-panel arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Panel {
    DownLeft = 0,
    Down = 1,
    DownRight = 2,
    Left = 3,
    Center = 4,
    Right = 5,
    UpLeft = 6,
    Up = 7,
    UpRight = 8,
}

impl Panel {
    /// All panels in bit order.
    pub const ALL: [Panel; PANEL_COUNT] = [
        Panel::DownLeft,
        Panel::Down,
        Panel::DownRight,
        Panel::Left,
        Panel::Center,
        Panel::Right,
        Panel::UpLeft,
        Panel::Up,
        Panel::UpRight,
    ];

    /// Bit position in input masks.
    pub const fn bit(self) -> u8 {
        self as u8
    }

    pub fn from_bit(bit: u8) -> Option<Panel> {
        Panel::ALL.get(bit as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Panel::DownLeft => "down-left",
            Panel::Down => "down",
            Panel::DownRight => "down-right",
            Panel::Left => "left",
            Panel::Center => "center",
            Panel::Right => "right",
            Panel::UpLeft => "up-left",
            Panel::Up => "up",
            Panel::UpRight => "up-right",
        }
    }
}

impl fmt::Display for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pressed state of all nine panels at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PanelInputs {
    mask: u16,
}

impl PanelInputs {
    /// The nine valid panel bits.
    pub const VALID_MASK: u16 = (1 << PANEL_COUNT as u16) - 1;

    /// Build from a raw input mask, discarding bits past the ninth panel.
    pub fn from_mask(mask: u16) -> Self {
        Self {
            mask: mask & Self::VALID_MASK,
        }
    }

    pub fn mask(self) -> u16 {
        self.mask
    }

    pub fn pressed(self, panel: Panel) -> bool {
        self.mask & (1 << panel.bit()) != 0
    }

    pub fn any(self) -> bool {
        self.mask != 0
    }

    /// Panels currently pressed, in bit order.
    pub fn pressed_panels(self) -> impl Iterator<Item = Panel> {
        Panel::ALL.into_iter().filter(move |p| self.pressed(*p))
    }
}

impl fmt::Display for PanelInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.any() {
            return f.write_str("(none)");
        }
        let mut first = true;
        for panel in self.pressed_panels() {
            if !first {
                f.write_str("+")?;
            }
            f.write_str(panel.name())?;
            first = false;
        }
        Ok(())
    }
}
