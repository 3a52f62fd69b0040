//! Stable colors for services and flame frames.
//!
//! Colors are picked by hashing names into a small categorical RAL palette,
//! so a service keeps its color across lanes, frames and sessions.

use egui::{Color32, Stroke};

use crate::themes;

/// FNV-1a, 64 bit. Used for palette bucketing only.
#[derive(Clone, Copy, Debug)]
pub struct Fnv1a64(u64);

impl Fnv1a64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    pub fn new() -> Self {
        Self(Self::OFFSET_BASIS)
    }

    pub fn write(&mut self, bytes: &[u8]) -> &mut Self {
        for b in bytes {
            self.0 ^= u64::from(*b);
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
        self
    }

    pub fn finish(&self) -> u64 {
        self.0
    }
}

impl Default for Fnv1a64 {
    fn default() -> Self {
        Self::new()
    }
}

/// Avoids RAL 2009, the selection accent, and RAL 3020, used for errors.
pub const SERVICE_PALETTE: &[u16] = &[
    5015, 6032, 1003, 4008, 2010, 5021, 6018, 3014, 5005, 6033, 6027,
];

fn pick(hash: u64) -> Color32 {
    let idx = (hash % SERVICE_PALETTE.len() as u64) as usize;
    themes::ral(SERVICE_PALETTE[idx])
}

pub fn service_color(service: &str) -> Color32 {
    pick(Fnv1a64::new().write(service.as_bytes()).finish())
}

/// Frames of one service share its hue; operations shift it slightly.
pub fn frame_color(label: &str) -> Color32 {
    let (service, operation) = match label.split_once(':') {
        Some((service, operation)) => (service, operation),
        None => (label, ""),
    };
    let base = service_color(service);
    if operation.is_empty() {
        return base;
    }
    let shade = Fnv1a64::new().write(operation.as_bytes()).finish() % 4;
    themes::blend(base, Color32::WHITE, shade as f32 * 0.08)
}

pub fn luma(color: Color32) -> f32 {
    let [r, g, b, _] = color.to_array();
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) / 255.0
}

pub fn text_color_on(background: Color32) -> Color32 {
    if luma(background) > 0.55 {
        Color32::BLACK
    } else {
        Color32::WHITE
    }
}

/// Outline for the hovered or selected frame.
pub fn highlight_stroke(fill: Color32) -> Stroke {
    Stroke::new(2.0, text_color_on(fill))
}
