//! Named colormaps and value-to-RGBA colorization.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use topoviz_common::{Result, TopovizError};
use tracing::warn;

/// Colormap used when a layer names one that is not known.
pub const FALLBACK_CMAP: &str = "viridis";

/// Color value in RGBA format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::new(255, 255, 255, 255);
    pub const BLACK: Color = Color::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub fn transparent() -> Self {
        Self { r: 0, g: 0, b: 0, a: 0 }
    }

    /// Same color with opacity scaled by `alpha` (0..1).
    pub fn with_alpha(self, alpha: f64) -> Self {
        let a = (self.a as f64 * alpha.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..self }
    }

    /// Color from float components in 0..1, as plotting libraries store them.
    pub fn from_unit_rgb(r: f64, g: f64, b: f64) -> Self {
        let to_byte = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::rgb(to_byte(r), to_byte(g), to_byte(b))
    }

    /// Float components in 0..1.
    pub fn to_unit_rgb(self) -> [f64; 3] {
        [
            self.r as f64 / 255.0,
            self.g as f64 / 255.0,
            self.b as f64 / 255.0,
        ]
    }

    /// Parse a color name or a `#rrggbb` / `#rrggbbaa` hex string.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if let Some(hex) = spec.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(|| TopovizError::unknown("color", spec));
        }
        let color = match spec.to_ascii_lowercase().as_str() {
            "white" | "w" => Color::WHITE,
            "black" | "k" => Color::BLACK,
            "red" | "r" => Color::rgb(255, 0, 0),
            "green" | "g" => Color::rgb(0, 128, 0),
            "blue" | "b" => Color::rgb(0, 0, 255),
            "gray" | "grey" => Color::rgb(128, 128, 128),
            "lightgray" | "lightgrey" => Color::rgb(211, 211, 211),
            "darkgray" | "darkgrey" => Color::rgb(169, 169, 169),
            "yellow" | "y" => Color::rgb(255, 255, 0),
            "orange" => Color::rgb(255, 165, 0),
            "cyan" | "c" => Color::rgb(0, 255, 255),
            "magenta" | "m" => Color::rgb(255, 0, 255),
            "navy" => Color::rgb(0, 0, 128),
            "paraview" => Color::rgb(82, 87, 110),
            "none" | "transparent" => Color::transparent(),
            _ => return Err(TopovizError::unknown("color", spec)),
        };
        Ok(color)
    }
}

fn parse_hex(hex: &str) -> Option<Color> {
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        6 => Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
        8 => Some(Color::new(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
        _ => None,
    }
}

/// A color as written in workflow documents: a name / hex string, or
/// 3 or 4 float components in 0..1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorSpec {
    Name(String),
    Components(Vec<f64>),
}

impl ColorSpec {
    pub fn named(name: impl Into<String>) -> Self {
        ColorSpec::Name(name.into())
    }

    pub fn to_color(&self) -> Result<Color> {
        match self {
            ColorSpec::Name(name) => Color::parse(name),
            ColorSpec::Components(c) => match c.as_slice() {
                [r, g, b] => Ok(Color::from_unit_rgb(*r, *g, *b)),
                [r, g, b, a] => Ok(Color::from_unit_rgb(*r, *g, *b).with_alpha(*a)),
                _ => Err(TopovizError::invalid_parameter(
                    "color",
                    format!("expected 3 or 4 components, got {}", c.len()),
                )),
            },
        }
    }
}

impl From<Color> for ColorSpec {
    fn from(color: Color) -> Self {
        let mut components = color.to_unit_rgb().to_vec();
        if color.a < 255 {
            components.push(color.a as f64 / 255.0);
        }
        ColorSpec::Components(components)
    }
}

/// Linear color interpolation
pub fn interpolate_color(color1: Color, color2: Color, t: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    let t_inv = 1.0 - t;

    Color::new(
        ((color1.r as f32 * t_inv) + (color2.r as f32 * t)).round() as u8,
        ((color1.g as f32 * t_inv) + (color2.g as f32 * t)).round() as u8,
        ((color1.b as f32 * t_inv) + (color2.b as f32 * t)).round() as u8,
        ((color1.a as f32 * t_inv) + (color2.a as f32 * t)).round() as u8,
    )
}

/// Evenly spaced stops.
fn even(colors: &[(u8, u8, u8)]) -> Vec<(f32, Color)> {
    let last = (colors.len().max(2) - 1) as f32;
    colors
        .iter()
        .enumerate()
        .map(|(i, &(r, g, b))| (i as f32 / last, Color::rgb(r, g, b)))
        .collect()
}

/// A piecewise-linear colormap over normalized values in 0..1.
#[derive(Debug, Clone, PartialEq)]
pub struct Colormap {
    name: String,
    stops: Vec<(f32, Color)>,
}

impl Colormap {
    /// Look up a colormap by name. A `_r` suffix reverses it.
    pub fn by_name(name: &str) -> Result<Self> {
        if let Some(base) = name.strip_suffix("_r") {
            let mut cmap = Self::by_name(base)?;
            cmap.stops = cmap
                .stops
                .iter()
                .rev()
                .map(|&(pos, color)| (1.0 - pos, color))
                .collect();
            cmap.name = name.to_string();
            return Ok(cmap);
        }

        let stops = match name {
            "terrain" => vec![
                (0.00, Color::rgb(51, 51, 153)),
                (0.15, Color::rgb(0, 153, 255)),
                (0.25, Color::rgb(0, 204, 102)),
                (0.50, Color::rgb(255, 255, 153)),
                (0.75, Color::rgb(128, 92, 84)),
                (1.00, Color::rgb(255, 255, 255)),
            ],
            "gray" | "grey" => even(&[(0, 0, 0), (255, 255, 255)]),
            "Greys" => even(&[(255, 255, 255), (0, 0, 0)]),
            "viridis" => even(&[
                (68, 1, 84),
                (72, 40, 120),
                (62, 74, 137),
                (49, 104, 142),
                (38, 130, 142),
                (31, 158, 137),
                (53, 183, 121),
                (109, 205, 89),
                (180, 222, 44),
                (253, 231, 37),
            ]),
            "magma" => even(&[
                (0, 0, 4),
                (28, 16, 68),
                (79, 18, 123),
                (129, 37, 129),
                (181, 54, 122),
                (229, 80, 100),
                (251, 135, 97),
                (254, 194, 135),
                (252, 253, 191),
            ]),
            "gist_earth" => even(&[
                (0, 0, 0),
                (29, 59, 117),
                (61, 113, 132),
                (77, 145, 102),
                (112, 163, 82),
                (158, 178, 92),
                (186, 173, 100),
                (209, 186, 153),
                (253, 250, 250),
            ]),
            "coolwarm" => even(&[
                (59, 76, 192),
                (141, 176, 254),
                (221, 221, 221),
                (244, 154, 123),
                (180, 4, 38),
            ]),
            "Blues" => even(&[
                (247, 251, 255),
                (198, 219, 239),
                (107, 174, 214),
                (33, 113, 181),
                (8, 48, 107),
            ]),
            "batlow" => even(&[
                (1, 25, 89),
                (16, 63, 96),
                (28, 90, 98),
                (60, 109, 86),
                (104, 123, 62),
                (157, 137, 43),
                (210, 147, 67),
                (248, 161, 123),
                (253, 180, 180),
                (250, 204, 250),
            ]),
            "batlowW" => even(&[
                (1, 25, 89),
                (20, 70, 97),
                (49, 104, 91),
                (104, 123, 62),
                (170, 140, 45),
                (233, 155, 99),
                (253, 186, 178),
                (255, 230, 230),
                (255, 255, 255),
            ]),
            _ => return Err(TopovizError::unknown("colormap", name)),
        };

        Ok(Self {
            name: name.to_string(),
            stops,
        })
    }

    /// Like [`Colormap::by_name`], falling back to [`FALLBACK_CMAP`] with a warning.
    pub fn resolve(name: &str) -> Self {
        match Self::by_name(name) {
            Ok(cmap) => cmap,
            Err(_) => {
                warn!(cmap = %name, fallback = FALLBACK_CMAP, "Unknown colormap");
                // The fallback name is always in the table above.
                Self::by_name(FALLBACK_CMAP).unwrap_or(Self {
                    name: FALLBACK_CMAP.to_string(),
                    stops: even(&[(0, 0, 0), (255, 255, 255)]),
                })
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Color at normalized position `t` (clamped to 0..1).
    pub fn sample(&self, t: f32) -> Color {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let mut prev = self.stops[0];
        for &(pos, color) in &self.stops {
            if t <= pos {
                let span = pos - prev.0;
                if span <= 0.0 {
                    return color;
                }
                return interpolate_color(prev.1, color, (t - prev.0) / span);
            }
            prev = (pos, color);
        }
        prev.1
    }
}

/// Map `values` through `cmap` into row-major RGBA bytes.
///
/// Values are normalized to `vmin..vmax`; a degenerate or non-finite range maps
/// everything to the low end. NaN cells become fully transparent; all other
/// cells get opacity `alpha`.
pub fn colorize(values: &Array2<f32>, vmin: f64, vmax: f64, cmap: &Colormap, alpha: f64) -> Vec<u8> {
    let (rows, cols) = values.dim();
    let mut pixels = vec![0u8; rows * cols * 4];

    let range = vmax - vmin;
    let range = if range.is_finite() && range.abs() > f64::EPSILON {
        range
    } else {
        1.0
    };
    let low = if vmin.is_finite() { vmin } else { 0.0 };

    for (idx, &value) in values.iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        let normalized = ((value as f64 - low) / range) as f32;
        let color = cmap.sample(normalized).with_alpha(alpha);

        let pixel_idx = idx * 4;
        pixels[pixel_idx] = color.r;
        pixels[pixel_idx + 1] = color.g;
        pixels[pixel_idx + 2] = color.b;
        pixels[pixel_idx + 3] = color.a;
    }

    pixels
}
