//! Colour themes for the styled console.

use crossterm::style::Color;
use serde::{Deserialize, Serialize};

/// Built-in palette the overrides apply on top of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreset {
    #[default]
    Dark,
    Light,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid colour '{value}' for theme key '{key}'")]
pub struct InvalidColor {
    pub key: &'static str,
    pub value: String,
}

/// Resolved colours, one per themed element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub message: Color,
    pub warning: Color,
    pub highlight: Color,
    pub header: Color,
    /// Row colours for gen0, gen1, gen2.
    pub rows: [Color; 3],
    pub total_heap: Color,
    /// Heap share colours for gen0..gen4.
    pub heaps: [Color; 5],
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            message: Color::Blue,
            warning: Color::AnsiValue(208),
            highlight: Color::Grey,
            header: Color::Yellow,
            rows: [
                Color::AnsiValue(117),
                Color::AnsiValue(153),
                Color::AnsiValue(39),
            ],
            total_heap: Color::Grey,
            heaps: [
                Color::AnsiValue(46),
                Color::AnsiValue(205),
                Color::AnsiValue(33),
                Color::AnsiValue(226),
                Color::AnsiValue(98),
            ],
        }
    }

    pub fn light() -> Self {
        Self {
            message: rgb(0x71, 0x8c, 0x00),
            warning: rgb(0xc8, 0x28, 0x29),
            highlight: rgb(0x8a, 0x60, 0x00),
            header: rgb(0x8a, 0x60, 0x00),
            rows: [
                rgb(0x3e, 0x99, 0x9f),
                rgb(0x42, 0x71, 0xae),
                rgb(0x89, 0x59, 0xa8),
            ],
            total_heap: rgb(0x00, 0x00, 0x00),
            heaps: [
                rgb(0x71, 0x8c, 0x00),
                rgb(0xc8, 0x28, 0x29),
                rgb(0x42, 0x71, 0xae),
                rgb(0xea, 0xb7, 0x00),
                rgb(0x89, 0x59, 0xa8),
            ],
        }
    }

    pub fn preset(preset: ThemePreset) -> Self {
        match preset {
            ThemePreset::Dark => Self::dark(),
            ThemePreset::Light => Self::light(),
        }
    }

    /// Row colour for a GC of `generation`; LOH and above use the gen2 colour.
    pub fn row_color(&self, generation: u32) -> Color {
        self.rows[(generation as usize).min(self.rows.len() - 1)]
    }

    /// Applies user overrides on top of the preset.
    ///
    /// # Errors
    /// Returns the first override that does not parse as a colour.
    pub fn with_overrides(mut self, overrides: &ThemeOverrides) -> Result<Self, InvalidColor> {
        let slots: [(&'static str, Option<&String>, &mut Color); 13] = {
            let [row0, row1, row2] = &mut self.rows;
            let [heap0, heap1, heap2, heap3, heap4] = &mut self.heaps;
            [
                ("message", overrides.message.as_ref(), &mut self.message),
                ("warning", overrides.warning.as_ref(), &mut self.warning),
                ("highlight", overrides.highlight.as_ref(), &mut self.highlight),
                ("header", overrides.header.as_ref(), &mut self.header),
                ("gen0_row", overrides.gen0_row.as_ref(), row0),
                ("gen1_row", overrides.gen1_row.as_ref(), row1),
                ("gen2_row", overrides.gen2_row.as_ref(), row2),
                ("total_heap", overrides.total_heap.as_ref(), &mut self.total_heap),
                ("gen0_heap", overrides.gen0_heap.as_ref(), heap0),
                ("gen1_heap", overrides.gen1_heap.as_ref(), heap1),
                ("gen2_heap", overrides.gen2_heap.as_ref(), heap2),
                ("gen3_heap", overrides.gen3_heap.as_ref(), heap3),
                ("gen4_heap", overrides.gen4_heap.as_ref(), heap4),
            ]
        };

        for (key, value, slot) in slots {
            if let Some(value) = value {
                *slot = parse_color(value).ok_or_else(|| InvalidColor {
                    key,
                    value: value.clone(),
                })?;
            }
        }
        Ok(self)
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

/// Per-element colour overrides from the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gen0_row: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gen1_row: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gen2_row: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_heap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gen0_heap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gen1_heap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gen2_heap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gen3_heap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gen4_heap: Option<String>,
}

const fn rgb(r: u8, g: u8, b: u8) -> Color {
    Color::Rgb { r, g, b }
}

/// Accepts `#rrggbb`, an ANSI palette index (`0`-`255`) or a crossterm
/// colour name (`yellow`, `dark_grey`, ...).
pub fn parse_color(value: &str) -> Option<Color> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        return Some(rgb(channel(0)?, channel(2)?, channel(4)?));
    }
    if let Ok(index) = value.parse::<u8>() {
        return Some(Color::AnsiValue(index));
    }
    Color::try_from(value.to_ascii_lowercase().as_str()).ok()
}

/// Maps a crossterm colour onto comfy-table's own colour type.
pub fn table_color(color: Color) -> comfy_table::Color {
    use comfy_table::Color as T;

    match color {
        Color::Black => T::Black,
        Color::DarkGrey => T::DarkGrey,
        Color::Red => T::Red,
        Color::DarkRed => T::DarkRed,
        Color::Green => T::Green,
        Color::DarkGreen => T::DarkGreen,
        Color::Yellow => T::Yellow,
        Color::DarkYellow => T::DarkYellow,
        Color::Blue => T::Blue,
        Color::DarkBlue => T::DarkBlue,
        Color::Magenta => T::Magenta,
        Color::DarkMagenta => T::DarkMagenta,
        Color::Cyan => T::Cyan,
        Color::DarkCyan => T::DarkCyan,
        Color::White => T::White,
        Color::Grey => T::Grey,
        Color::Rgb { r, g, b } => T::Rgb { r, g, b },
        Color::AnsiValue(index) => T::AnsiValue(index),
        Color::Reset => T::Reset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color_forms() {
        assert_eq!(parse_color("#8a6000"), Some(rgb(0x8a, 0x60, 0x00)));
        assert_eq!(parse_color("117"), Some(Color::AnsiValue(117)));
        assert_eq!(parse_color("Yellow"), Some(Color::Yellow));
        assert_eq!(parse_color("dark_grey"), Some(Color::DarkGrey));
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(parse_color("not-a-colour"), None);
    }

    #[test]
    fn test_overrides_apply_on_preset() {
        let overrides = ThemeOverrides {
            header: Some("red".to_string()),
            gen1_row: Some("#000000".to_string()),
            ..ThemeOverrides::default()
        };
        let theme = Theme::light().with_overrides(&overrides).unwrap();

        assert_eq!(theme.header, Color::Red);
        assert_eq!(theme.rows[1], rgb(0, 0, 0));
        assert_eq!(theme.rows[0], Theme::light().rows[0]);
    }

    #[test]
    fn test_bad_override_names_the_key() {
        let overrides = ThemeOverrides {
            gen4_heap: Some("chartreuse-ish".to_string()),
            ..ThemeOverrides::default()
        };
        let err = Theme::dark().with_overrides(&overrides).unwrap_err();
        assert_eq!(err.key, "gen4_heap");
    }

    #[test]
    fn test_row_color_clamps_high_generations() {
        let theme = Theme::dark();
        assert_eq!(theme.row_color(3), theme.rows[2]);
        assert_eq!(theme.row_color(0), theme.rows[0]);
    }
}
