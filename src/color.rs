//! Row coloring
//!
//! Rows are colored by one column: categorical columns get a palette entry
//! per distinct value, numeric columns are mapped through a color map.

use crate::infer::{ParamDef, ParamDefMap};
use crate::model::{ParamType, Row, Value};
use crate::scale::Scale;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    /// Color of missing and special values.
    pub const MISSING: Rgba = Rgba::rgb(100, 100, 100);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Rgba {
        Rgba { r, g, b, a: 1.0 }
    }

    pub fn with_alpha(self, a: f32) -> Rgba {
        Rgba {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    fn from_unit(rgb: [f32; 3]) -> Rgba {
        let c = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba::rgb(c(rgb[0]), c(rgb[1]), c(rgb[2]))
    }

    /// Parse `#rrggbb`, `#rgb`, `rgb(r,g,b)` or `rgba(r,g,b,a)`.
    pub fn parse_css(s: &str) -> Option<Rgba> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            let expand = |c: &str| u8::from_str_radix(&c.repeat(2), 16).ok();
            return match hex.len() {
                6 => Some(Rgba::rgb(
                    u8::from_str_radix(&hex[0..2], 16).ok()?,
                    u8::from_str_radix(&hex[2..4], 16).ok()?,
                    u8::from_str_radix(&hex[4..6], 16).ok()?,
                )),
                3 => Some(Rgba::rgb(
                    expand(&hex[0..1])?,
                    expand(&hex[1..2])?,
                    expand(&hex[2..3])?,
                )),
                _ => None,
            };
        }
        let inner = s
            .strip_prefix("rgba(")
            .or_else(|| s.strip_prefix("rgb("))?
            .strip_suffix(')')?;
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        if parts.len() < 3 {
            return None;
        }
        let channel = |p: &str| p.parse::<f32>().ok().map(|v| v.clamp(0.0, 255.0) as u8);
        let a = match parts.get(3) {
            Some(p) => p.parse::<f32>().ok()?,
            None => 1.0,
        };
        Some(Rgba::rgb(channel(parts[0])?, channel(parts[1])?, channel(parts[2])?).with_alpha(a))
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

/// `(row, opacity) -> color`, opaque to the views.
pub trait ColorFn: Send + Sync {
    fn color(&self, row: &Row, opacity: f32) -> Rgba;
}

/// Palette for columns with at most 20 distinct values.
const CATEGORICAL_PALETTE: [&str; 20] = [
    "#1f77b4", "#ff7f0e", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f", "#bcbd22",
    "#17becf", "#1f77b4", "#aec7e8", "#ffbb78", "#ff9896", "#c5b0d5", "#c49c94", "#f7b6d2",
    "#c7c7c7", "#dbdb8d", "#9edae5", "#2ca02c",
];

const VIRIDIS: [&str; 10] = [
    "#440154", "#482878", "#3e4989", "#31688e", "#26828e", "#1f9e89", "#35b779", "#6ece58",
    "#b5de2b", "#fde725",
];

const PLASMA: [&str; 10] = [
    "#0d0887", "#46039f", "#7201a8", "#9c179e", "#bd3786", "#d8576b", "#ed7953", "#fb9f3a",
    "#fdca26", "#f0f921",
];

const GREYS: [&str; 2] = ["#ffffff", "#000000"];

/// Named continuous color maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colormap {
    #[default]
    Turbo,
    Viridis,
    Plasma,
    Greys,
}

impl Colormap {
    /// Accepts short names and their `interpolate*` spellings.
    pub fn parse(name: &str) -> Option<Colormap> {
        let name = name.trim();
        let name = name.strip_prefix("interpolate").unwrap_or(name);
        match name.to_ascii_lowercase().as_str() {
            "" | "turbo" => Some(Colormap::Turbo),
            "viridis" => Some(Colormap::Viridis),
            "plasma" => Some(Colormap::Plasma),
            "greys" | "grays" => Some(Colormap::Greys),
            _ => None,
        }
    }

    pub fn sample(self, t: f64) -> Rgba {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        match self {
            Colormap::Turbo => turbo(t),
            Colormap::Viridis => gradient(&VIRIDIS, t),
            Colormap::Plasma => gradient(&PLASMA, t),
            Colormap::Greys => gradient(&GREYS, t),
        }
    }
}

fn turbo(t: f64) -> Rgba {
    let c = |v: f64| v.round().clamp(0.0, 255.0) as u8;
    Rgba::rgb(
        c(34.61 + t * (1172.33 - t * (10793.56 - t * (33300.12 - t * (38394.49 - t * 14825.05))))),
        c(23.31 + t * (557.33 + t * (1225.33 - t * (3574.96 - t * (1073.77 + t * 707.56))))),
        c(27.2 + t * (3211.1 - t * (15327.97 - t * (27814.0 - t * (22569.18 - t * 6838.66))))),
    )
}

fn gradient(stops: &[&str], t: f64) -> Rgba {
    let pos = t * (stops.len() - 1) as f64;
    let i = (pos.floor() as usize).min(stops.len() - 2);
    let frac = (pos - i as f64) as f32;
    let a = Rgba::parse_css(stops[i]).unwrap_or(Rgba::MISSING);
    let b = Rgba::parse_css(stops[i + 1]).unwrap_or(Rgba::MISSING);
    let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * frac).round() as u8;
    Rgba::rgb(mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b))
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    let c = v * s;
    let x = c * (1.0 - ((h * 6.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match (h * 6.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    [r + m, g + m, b + m]
}

fn rgb_to_hsv(c: Rgba) -> (f32, f32, f32) {
    let (r, g, b) = (c.r as f32 / 255.0, c.g as f32 / 255.0, c.b as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let d = max - min;
    let h = if d == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / d).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / d + 2.0) / 6.0
    } else {
        ((r - g) / d + 4.0) / 6.0
    };
    let s = if max == 0.0 { 0.0 } else { d / max };
    (h, s, max)
}

fn hash_code(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, c| h.wrapping_shl(5).wrapping_sub(h).wrapping_add(c as i32))
}

/// Stable color for a value of a column with many distinct values.
pub fn hashed_color(value: &Value) -> Rgba {
    let key = serde_json::to_string(value).unwrap_or_else(|_| value.to_string());
    let h = hash_code(&key);
    let uniform = (h as u32).wrapping_mul(2_654_435_761) as f64 / u32::MAX as f64;
    let (hue, mut sat, mut val) = rgb_to_hsv(turbo(uniform));
    match h.rem_euclid(3) {
        1 => val = (val - 0.2).max(0.0),
        2 => sat = (sat - 0.2).max(0.0),
        _ => {}
    }
    Rgba::from_unit(hsv_to_rgb(hue, sat, val))
}

/// Coloring by one column.
#[derive(Debug, Clone)]
pub struct ColorBy {
    column: Option<String>,
    param_type: ParamType,
    val2color: HashMap<String, Rgba>,
    scale: Option<Scale>,
    colormap: Colormap,
}

impl ColorBy {
    /// Grey for every row.
    pub fn none() -> Self {
        Self {
            column: None,
            param_type: ParamType::Categorical,
            val2color: HashMap::new(),
            scale: None,
            colormap: Colormap::Turbo,
        }
    }

    pub fn new(pd: &ParamDef, default_colormap: &str) -> Self {
        let colormap_name = pd.colormap.as_deref().unwrap_or(default_colormap);
        let colormap = Colormap::parse(colormap_name).unwrap_or_else(|| {
            tracing::warn!("Invalid color map '{}' for column {}, using turbo", colormap_name, pd.name);
            Colormap::Turbo
        });
        let mut val2color = HashMap::new();
        let mut scale = None;
        if pd.is_categorical() {
            if let Some(colors) = &pd.colors {
                for (k, css) in colors {
                    match Rgba::parse_css(css) {
                        Some(c) => {
                            val2color.insert(k.clone(), c);
                        }
                        None => tracing::warn!("Invalid color '{}' for {}={}", css, pd.name, k),
                    }
                }
            }
            let small = pd.distinct_values.len() <= CATEGORICAL_PALETTE.len();
            for (i, v) in pd.distinct_values.iter().enumerate() {
                let key = v.to_string();
                if val2color.contains_key(&key) {
                    continue;
                }
                let color = if small {
                    Rgba::parse_css(CATEGORICAL_PALETTE[i]).unwrap_or(Rgba::MISSING)
                } else {
                    hashed_color(v)
                };
                val2color.insert(key, color);
            }
        } else {
            scale = Some(Scale::without_outliers(pd).with_range(0.0, 1.0));
        }
        Self {
            column: Some(pd.name.clone()),
            param_type: pd.param_type,
            val2color,
            scale,
            colormap,
        }
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn value_color(&self, value: Option<&Value>, opacity: f32) -> Rgba {
        let value = match value {
            Some(v) => v,
            None => return Rgba::MISSING.with_alpha(opacity),
        };
        if self.param_type == ParamType::Categorical {
            return self
                .val2color
                .get(&value.to_string())
                .copied()
                .unwrap_or(Rgba::MISSING)
                .with_alpha(opacity);
        }
        if value.is_special_numeric() {
            return Rgba::MISSING.with_alpha(opacity);
        }
        match self.scale.as_ref().and_then(|s| s.apply(value)) {
            Some(t) => self.colormap.sample(t).with_alpha(opacity),
            None => Rgba::MISSING.with_alpha(opacity),
        }
    }
}

impl ColorFn for ColorBy {
    fn color(&self, row: &Row, opacity: f32) -> Rgba {
        match &self.column {
            Some(col) => self.value_color(row.get(col), opacity),
            None => Rgba::MISSING.with_alpha(opacity),
        }
    }
}

/// Column to color by when neither the experiment nor the user chose one:
/// prefer columns with explicit colors, avoid categorical and optional ones.
pub fn default_colorby(defs: &ParamDefMap) -> Option<String> {
    let score = |pd: &ParamDef| {
        let mut s = 0;
        if pd.colors.is_some() || pd.colormap.is_some() {
            s += 100;
        }
        if pd.is_categorical() {
            s -= 20;
        }
        if pd.optional {
            s -= 40;
        }
        s
    };
    let mut best: Option<(&ParamDef, i32)> = None;
    for pd in defs.iter() {
        let s = score(pd);
        if best.map(|(_, b)| s > b).unwrap_or(true) {
            best = Some((pd, s));
        }
    }
    best.map(|(pd, _)| pd.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::infer_types;
    use crate::model::tests::row;
    use crate::persist::StateScope;

    #[test]
    fn test_parse_css() {
        assert_eq!(Rgba::parse_css("#1f77b4"), Some(Rgba::rgb(0x1f, 0x77, 0xb4)));
        assert_eq!(Rgba::parse_css("#fff"), Some(Rgba::rgb(255, 255, 255)));
        assert_eq!(Rgba::parse_css("rgb(1, 2, 3)"), Some(Rgba::rgb(1, 2, 3)));
        assert_eq!(Rgba::parse_css("rgba(1,2,3,0.5)"), Some(Rgba::rgb(1, 2, 3).with_alpha(0.5)));
        assert_eq!(Rgba::parse_css("blue"), None);
        assert_eq!(Rgba::rgb(1, 2, 3).with_alpha(0.5).to_string(), "rgba(1, 2, 3, 0.5)");
    }

    #[test]
    fn test_colormap_endpoints() {
        assert_eq!(Colormap::Viridis.sample(0.0), Rgba::rgb(0x44, 0x01, 0x54));
        assert_eq!(Colormap::Viridis.sample(1.0), Rgba::rgb(0xfd, 0xe7, 0x25));
        assert_eq!(Colormap::Greys.sample(0.5), Rgba::rgb(128, 128, 128));
        assert_eq!(Colormap::parse("interpolateViridis"), Some(Colormap::Viridis));
        assert_eq!(Colormap::parse("rainbowish"), None);
        // Out of range and NaN clamp instead of panicking.
        assert_eq!(Colormap::Turbo.sample(7.0), Colormap::Turbo.sample(1.0));
        let _ = Colormap::Turbo.sample(f64::NAN);
    }

    #[test]
    fn test_categorical_palette_and_hint_colors() {
        let rows = vec![
            row("1", None, &[("opt", "adam".into())]),
            row("2", None, &[("opt", "sgd".into())]),
        ];
        let defs = infer_types(&StateScope::in_memory(), &rows, &Default::default(), &[]);
        let mut pd = defs.get("opt").cloned().unwrap();
        let by = ColorBy::new(&pd, "turbo");
        assert_eq!(by.color(&rows[0], 1.0), Rgba::parse_css("#1f77b4").unwrap());
        assert_eq!(by.color(&rows[1], 0.5), Rgba::parse_css("#ff7f0e").unwrap().with_alpha(0.5));

        pd.colors = Some([("sgd".to_string(), "#000000".to_string())].into_iter().collect());
        let by = ColorBy::new(&pd, "turbo");
        assert_eq!(by.color(&rows[1], 1.0), Rgba::rgb(0, 0, 0));
    }

    #[test]
    fn test_numeric_coloring_and_missing() {
        let rows = vec![
            row("1", None, &[("x", 0.0.into())]),
            row("2", None, &[("x", 10.0.into())]),
            row("3", None, &[("x", "inf".into())]),
            row("4", None, &[]),
        ];
        let defs = infer_types(&StateScope::in_memory(), &rows, &Default::default(), &[]);
        let mut pd = defs.get("x").cloned().unwrap();
        pd.param_type = ParamType::Numeric;
        let by = ColorBy::new(&pd, "viridis");
        assert_eq!(by.color(&rows[0], 1.0), Colormap::Viridis.sample(0.0));
        assert_eq!(by.color(&rows[1], 1.0), Colormap::Viridis.sample(1.0));
        assert_eq!(by.color(&rows[2], 1.0), Rgba::MISSING);
        assert_eq!(by.color(&rows[3], 0.3), Rgba::MISSING.with_alpha(0.3));
    }

    #[test]
    fn test_hashed_color_stable() {
        let v = Value::from("run-42");
        assert_eq!(hashed_color(&v), hashed_color(&v));
    }

    #[test]
    fn test_default_colorby_prefers_numeric() {
        let rows: Vec<Row> = (0..30)
            .map(|i| row(&i.to_string(), None, &[("opt", "adam".into()), ("loss", (i as f64).into())]))
            .collect();
        let defs = infer_types(&StateScope::in_memory(), &rows, &Default::default(), &[]);
        assert_eq!(default_colorby(&defs).as_deref(), Some("loss"));
    }
}
