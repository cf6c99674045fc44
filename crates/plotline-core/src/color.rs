//! RGBA colors with hex parsing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const GREEN: Color = Color::rgb(0x26, 0xa6, 0x9a);
    pub const RED: Color = Color::rgb(0xef, 0x53, 0x50);
    pub const BLUE: Color = Color::rgb(0x29, 0x62, 0xff);
    pub const ORANGE: Color = Color::rgb(0xff, 0x98, 0x00);
    pub const PURPLE: Color = Color::rgb(0x9c, 0x27, 0xb0);
    pub const GRAY: Color = Color::rgb(0x78, 0x7b, 0x86);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let byte = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => {
                let mut out = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    let v = c.to_digit(16)? as u8;
                    out[i] = v * 17;
                }
                Some(Self::rgb(out[0], out[1], out[2]))
            }
            6 => Some(Self::rgb(byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?)),
            8 => Some(Self::rgba(
                byte(&hex[0..2])?,
                byte(&hex[2..4])?,
                byte(&hex[4..6])?,
                byte(&hex[6..8])?,
            )),
            _ => None,
        }
    }

    /// Lowercase `#rrggbb`, or `#rrggbbaa` when not fully opaque.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    /// Perceived lightness in `[0, 1]` (HSP model).
    pub fn lightness(&self) -> f64 {
        let r = f64::from(self.r);
        let g = f64::from(self.g);
        let b = f64::from(self.b);
        (0.299 * r * r + 0.587 * g * g + 0.114 * b * b).sqrt() / 255.0
    }

    pub fn is_light(&self) -> bool {
        self.lightness() > 0.5
    }

    /// Text color readable on top of `self`.
    pub fn contrasting_text(&self) -> Color {
        if self.is_light() {
            Color::BLACK
        } else {
            Color::WHITE
        }
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s).ok_or_else(|| format!("invalid color: {s}"))
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(Color::from_hex("#fff"), Some(Color::WHITE));
        assert_eq!(Color::from_hex("000000"), Some(Color::BLACK));
        assert_eq!(
            Color::from_hex("#26a69a80"),
            Some(Color::rgba(0x26, 0xa6, 0x9a, 0x80))
        );
        assert_eq!(Color::from_hex("#12"), None);
        assert_eq!(Color::from_hex("#gggggg"), None);
    }

    #[test]
    fn test_contrasting_text() {
        assert_eq!(Color::WHITE.contrasting_text(), Color::BLACK);
        assert_eq!(Color::BLACK.contrasting_text(), Color::WHITE);
        assert_eq!(Color::rgb(0x13, 0x17, 0x22).contrasting_text(), Color::WHITE);
    }

    #[test]
    fn test_serde_as_hex_string() {
        let json = serde_json::to_string(&Color::RED).unwrap();
        assert_eq!(json, "\"#ef5350\"");
        let back: Color = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Color::RED);
    }
}
