//! Color parsing and formatting for WLED segment colors.
//!
//! WLED accepts a segment color as a 3-channel `[r, g, b]` or 4-channel
//! `[r, g, b, w]` array; the fourth channel drives dedicated white LEDs.

use serde::{Deserialize, Serialize};

use crate::error::BlinkerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Color {
    Rgb([u8; 3]),
    Rgbw([u8; 4]),
}

impl Color {
    pub const OFF: Color = Color::Rgb([0, 0, 0]);
    /// Dedicated white channel only.
    pub const WHITE: Color = Color::Rgbw([0, 0, 0, 255]);

    pub fn is_off(&self) -> bool {
        match self {
            Color::Rgb(c) => c.iter().all(|&v| v == 0),
            Color::Rgbw(c) => c.iter().all(|&v| v == 0),
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_color(*self))
    }
}

/// Parse a color string.
///
/// Accepts:
/// - Hex: `"#FF0000"`, `"FF0000"` (RGB) or `"#FF000000"` (RGBW)
/// - Named: `"red"`, `"green"`, `"blue"`, `"white"` (W channel), `"warm"`,
///   `"orange"`, `"yellow"`, `"purple"`, `"cyan"`, `"off"`
pub fn parse_color(s: &str) -> crate::error::Result<Color> {
    let s = s.trim();

    match s.to_lowercase().as_str() {
        "red" => return Ok(Color::Rgb([255, 0, 0])),
        "green" => return Ok(Color::Rgb([0, 255, 0])),
        "blue" => return Ok(Color::Rgb([0, 0, 255])),
        "white" => return Ok(Color::WHITE),
        "warm" => return Ok(Color::Rgbw([255, 160, 0, 255])),
        "orange" => return Ok(Color::Rgb([255, 128, 0])),
        "yellow" => return Ok(Color::Rgb([255, 255, 0])),
        "purple" => return Ok(Color::Rgb([128, 0, 255])),
        "cyan" => return Ok(Color::Rgb([0, 255, 255])),
        "off" | "black" => return Ok(Color::OFF),
        _ => {}
    }

    let hex = s.strip_prefix('#').unwrap_or(s);
    if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
        return Err(BlinkerError::Color(format!(
            "Invalid color: {s} (use #RRGGBB, #RRGGBBWW or a color name)"
        )));
    }
    let val = u32::from_str_radix(hex, 16)
        .map_err(|_| BlinkerError::Color(format!("Invalid hex color: {s}")))?;
    let [a, b, c, d] = val.to_be_bytes();
    Ok(if hex.len() == 6 {
        Color::Rgb([b, c, d])
    } else {
        Color::Rgbw([a, b, c, d])
    })
}

/// Format a color as `#RRGGBB` or `#RRGGBBWW`.
pub fn format_color(color: Color) -> String {
    match color {
        Color::Rgb([r, g, b]) => format!("#{r:02X}{g:02X}{b:02X}"),
        Color::Rgbw([r, g, b, w]) => format!("#{r:02X}{g:02X}{b:02X}{w:02X}"),
    }
}

/// Clamp any integer channel value into 0–255.
pub fn channel(value: i64) -> u8 {
    value.clamp(0, 255) as u8
}
