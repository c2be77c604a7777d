//! Color parsing and normalization.
//!
//! Styles carry CSS-like color strings (`#rgb`, `#rrggbb`, `rgb(...)`,
//! `rgba(...)`, a small named table). Parsing is memoized per
//! [`ColorParser`] instance; the memo is bounded and trimmed on overflow.
//! Components receive a parser handle explicitly instead of sharing a
//! process-wide cache.

use std::collections::HashMap;
use std::sync::Mutex;

/// Bound for the parse memo before trimming kicks in.
const MEMO_CAPACITY: usize = 500;

/// Fraction of the memo kept after an overflow trim.
const MEMO_TRIM_RATIO: f64 = 0.7;

/// A parsed color with optional alpha.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// Alpha in `[0, 1]`; `None` when the source notation carried none.
    pub a: Option<f32>,
}

impl Rgba {
    /// Effective alpha, defaulting to opaque.
    pub fn alpha(&self) -> f32 {
        self.a.unwrap_or(1.0)
    }

    /// Bridge into the canvas color space, with an extra opacity multiplier.
    pub fn to_skia(&self, opacity: f32) -> tiny_skia::Color {
        let a = (self.alpha() * opacity).clamp(0.0, 1.0);
        tiny_skia::Color::from_rgba(
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            a,
        )
        .unwrap_or(tiny_skia::Color::TRANSPARENT)
    }
}

/// Memoizing color-string parser.
///
/// Parse results (including failures) are cached up to [`MEMO_CAPACITY`]
/// entries; overflowing trims the memo back to 70% in insertion-agnostic
/// order.
#[derive(Debug, Default)]
pub struct ColorParser {
    memo: Mutex<HashMap<String, Option<Rgba>>>,
}

impl ColorParser {
    /// Create a parser with an empty memo.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a color string.
    ///
    /// Recognizes `#rgb`, `#rrggbb`, `rgb(r, g, b)`, `rgba(r, g, b, a)`,
    /// `transparent`, and the named-color table. Returns `None` for
    /// anything else.
    pub fn parse(&self, s: &str) -> Option<Rgba> {
        if let Some(hit) = self.memo.lock().ok().and_then(|m| m.get(s).copied()) {
            return hit;
        }

        let parsed = parse_uncached(s);

        if let Ok(mut memo) = self.memo.lock() {
            if memo.len() >= MEMO_CAPACITY {
                let keep = (MEMO_CAPACITY as f64 * MEMO_TRIM_RATIO) as usize;
                let drop_count = memo.len().saturating_sub(keep);
                let victims: Vec<String> =
                    memo.keys().take(drop_count).cloned().collect();
                for k in victims {
                    memo.remove(&k);
                }
            }
            memo.insert(s.to_string(), parsed);
        }

        parsed
    }

    /// Whether a color string carries an explicit alpha channel.
    pub fn has_alpha(&self, s: &str) -> bool {
        self.parse(s).map(|c| c.a.is_some()).unwrap_or(false)
    }

    /// Re-emit a color with the given opacity as `rgba(r, g, b, a)`.
    ///
    /// Unparseable input is returned unchanged.
    pub fn with_opacity(&self, s: &str, opacity: f32) -> String {
        match self.parse(s) {
            Some(c) => format!("rgba({}, {}, {}, {})", c.r, c.g, c.b, opacity),
            None => s.to_string(),
        }
    }

    /// Current memo population, for tests and diagnostics.
    pub fn memo_len(&self) -> usize {
        self.memo.lock().map(|m| m.len()).unwrap_or(0)
    }
}

fn parse_uncached(s: &str) -> Option<Rgba> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }

    let lower = s.to_ascii_lowercase();
    if let Some(body) = lower
        .strip_prefix("rgba(")
        .and_then(|r| r.strip_suffix(')'))
    {
        return parse_components(body, true);
    }
    if let Some(body) = lower.strip_prefix("rgb(").and_then(|r| r.strip_suffix(')')) {
        return parse_components(body, false);
    }

    named_color(&lower)
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let r = channel(&hex[0..1])?;
            let g = channel(&hex[1..2])?;
            let b = channel(&hex[2..3])?;
            Some(Rgba {
                r: r * 17,
                g: g * 17,
                b: b * 17,
                a: None,
            })
        }
        6 => Some(Rgba {
            r: channel(&hex[0..2])?,
            g: channel(&hex[2..4])?,
            b: channel(&hex[4..6])?,
            a: None,
        }),
        _ => None,
    }
}

fn parse_components(body: &str, with_alpha: bool) -> Option<Rgba> {
    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    if parts.len() != if with_alpha { 4 } else { 3 } {
        return None;
    }

    let r = parts[0].parse::<u16>().ok()?.min(255) as u8;
    let g = parts[1].parse::<u16>().ok()?.min(255) as u8;
    let b = parts[2].parse::<u16>().ok()?.min(255) as u8;
    let a = if with_alpha {
        let a = parts[3].parse::<f32>().ok()?;
        if !a.is_finite() {
            return None;
        }
        Some(a.clamp(0.0, 1.0))
    } else {
        None
    };

    Some(Rgba { r, g, b, a })
}

fn named_color(name: &str) -> Option<Rgba> {
    let opaque = |r, g, b| Some(Rgba { r, g, b, a: None });
    match name {
        "transparent" => Some(Rgba {
            r: 0,
            g: 0,
            b: 0,
            a: Some(0.0),
        }),
        "black" => opaque(0, 0, 0),
        "white" => opaque(255, 255, 255),
        "red" => opaque(255, 0, 0),
        "green" => opaque(0, 128, 0),
        "blue" => opaque(0, 0, 255),
        "yellow" => opaque(255, 255, 0),
        "cyan" => opaque(0, 255, 255),
        "magenta" => opaque(255, 0, 255),
        "orange" => opaque(255, 165, 0),
        "purple" => opaque(128, 0, 128),
        "gray" | "grey" => opaque(128, 128, 128),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_hex() {
        let parser = ColorParser::new();
        assert_eq!(
            parser.parse("#f80"),
            Some(Rgba {
                r: 255,
                g: 136,
                b: 0,
                a: None
            })
        );
    }

    #[test]
    fn parses_long_hex() {
        let parser = ColorParser::new();
        assert_eq!(
            parser.parse("#3388ff"),
            Some(Rgba {
                r: 0x33,
                g: 0x88,
                b: 0xff,
                a: None
            })
        );
    }

    #[test]
    fn parses_rgb_functional() {
        let parser = ColorParser::new();
        assert_eq!(
            parser.parse("rgb(10, 20, 30)"),
            Some(Rgba {
                r: 10,
                g: 20,
                b: 30,
                a: None
            })
        );
    }

    #[test]
    fn parses_rgba_functional() {
        let parser = ColorParser::new();
        let c = parser.parse("rgba(10, 20, 30, 0.5)").unwrap();
        assert_eq!((c.r, c.g, c.b), (10, 20, 30));
        assert_eq!(c.a, Some(0.5));
    }

    #[test]
    fn parses_named_and_transparent() {
        let parser = ColorParser::new();
        assert_eq!(parser.parse("orange").unwrap().r, 255);
        assert_eq!(parser.parse("grey"), parser.parse("gray"));
        assert_eq!(parser.parse("transparent").unwrap().a, Some(0.0));
    }

    #[test]
    fn rejects_garbage() {
        let parser = ColorParser::new();
        assert_eq!(parser.parse("#12"), None);
        assert_eq!(parser.parse("rgb(1,2)"), None);
        assert_eq!(parser.parse("chartreuse-ish"), None);
        assert_eq!(parser.parse(""), None);
    }

    #[test]
    fn has_alpha_only_for_alpha_notations() {
        let parser = ColorParser::new();
        assert!(parser.has_alpha("rgba(1, 2, 3, 0.2)"));
        assert!(parser.has_alpha("transparent"));
        assert!(!parser.has_alpha("#fff"));
        assert!(!parser.has_alpha("rgb(1, 2, 3)"));
        assert!(!parser.has_alpha("not a color"));
    }

    #[test]
    fn with_opacity_reformats_parseable() {
        let parser = ColorParser::new();
        assert_eq!(
            parser.with_opacity("#3388ff", 0.4),
            "rgba(51, 136, 255, 0.4)"
        );
    }

    #[test]
    fn with_opacity_passes_through_unparseable() {
        let parser = ColorParser::new();
        assert_eq!(parser.with_opacity("bogus", 0.4), "bogus");
    }

    #[test]
    fn memo_caches_results() {
        let parser = ColorParser::new();
        parser.parse("#3388ff");
        parser.parse("#3388ff");
        parser.parse("red");
        assert_eq!(parser.memo_len(), 2);
    }

    #[test]
    fn memo_trims_on_overflow() {
        let parser = ColorParser::new();
        for i in 0..=MEMO_CAPACITY {
            parser.parse(&format!("rgb({}, 0, 0)", i % 256));
        }
        // 256 distinct strings at most in that loop; force real overflow.
        for i in 0..MEMO_CAPACITY + 10 {
            parser.parse(&format!("#{:06x}", i));
        }
        assert!(parser.memo_len() <= MEMO_CAPACITY);
    }

    #[test]
    fn clamps_out_of_range_components() {
        let parser = ColorParser::new();
        let c = parser.parse("rgb(300, 0, 0)").unwrap();
        assert_eq!(c.r, 255);
        let c = parser.parse("rgba(0, 0, 0, 7.0)").unwrap();
        assert_eq!(c.a, Some(1.0));
    }

    #[test]
    fn to_skia_applies_opacity() {
        let c = Rgba {
            r: 255,
            g: 0,
            b: 0,
            a: Some(0.5),
        };
        let skia = c.to_skia(0.5);
        assert!((skia.alpha() - 0.25).abs() < 1e-6);
    }
}
