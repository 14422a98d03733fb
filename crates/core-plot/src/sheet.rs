//! Plot-item style sheets.
//!
//! The sheet is a value, not code: parsing produces an ordered rule list,
//! each rule a predicate over `{class name, state set, property match}`
//! plus `(name -> value)` assignments. Application walks rules in
//! declaration order and calls `set_item_property` for every match;
//! properties unknown to an item return false and are ignored (non-fatal).
//!
//! Selector grammar:
//! ```text
//! type              e.g.  PlotCurve { pen-color: #ff0000; }
//! type:state        e.g.  PlotCurve:selected { pen-width: 2; }
//! type[prop=value]  e.g.  PlotCurve[title=raw] { visible: 0; }
//! *                 matches every item
//! ```
//! An indexed assignment `name[2]: v` forwards index 2 to the setter
//! (multi-part properties such as contour-level pens).

use crate::item::PlotItem;
use core_data::Rgba;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// A parsed style value.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleValue {
    Number(f64),
    Color(Rgba),
    Str(String),
}

impl StyleValue {
    pub fn parse(raw: &str) -> StyleValue {
        let raw = raw.trim();
        if let Some(color) = parse_color(raw) {
            return StyleValue::Color(color);
        }
        if let Ok(n) = raw.parse::<f64>() {
            return StyleValue::Number(n);
        }
        StyleValue::Str(raw.trim_matches('\'').trim_matches('"').to_string())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            StyleValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Rgba> {
        match self {
            StyleValue::Color(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StyleValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StyleValue::Number(n) => Some(*n != 0.0),
            StyleValue::Str(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for StyleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StyleValue::Number(n) => write!(f, "{n}"),
            StyleValue::Color(c) => write!(f, "#{:02x}{:02x}{:02x}", c.r, c.g, c.b),
            StyleValue::Str(s) => write!(f, "{s}"),
        }
    }
}

fn parse_color(raw: &str) -> Option<Rgba> {
    if let Some(hex) = raw.strip_prefix('#') {
        return match hex.len() {
            6 => {
                let v = u32::from_str_radix(hex, 16).ok()?;
                Some(Rgba::opaque(
                    ((v >> 16) & 0xff) as u8,
                    ((v >> 8) & 0xff) as u8,
                    (v & 0xff) as u8,
                ))
            }
            8 => {
                let v = u32::from_str_radix(hex, 16).ok()?;
                Some(Rgba::new(
                    ((v >> 24) & 0xff) as u8,
                    ((v >> 16) & 0xff) as u8,
                    ((v >> 8) & 0xff) as u8,
                    (v & 0xff) as u8,
                ))
            }
            _ => None,
        };
    }
    let named = match raw {
        "black" => Rgba::opaque(0, 0, 0),
        "white" => Rgba::opaque(255, 255, 255),
        "red" => Rgba::opaque(255, 0, 0),
        "green" => Rgba::opaque(0, 128, 0),
        "blue" => Rgba::opaque(0, 0, 255),
        "yellow" => Rgba::opaque(255, 255, 0),
        "cyan" => Rgba::opaque(0, 255, 255),
        "magenta" => Rgba::opaque(255, 0, 255),
        "gray" | "grey" => Rgba::opaque(128, 128, 128),
        "transparent" => Rgba::TRANSPARENT,
        _ => return None,
    };
    Some(named)
}

/// One parsed rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub class: Option<String>,
    pub state: Option<String>,
    pub prop_match: Option<(String, StyleValue)>,
    pub assignments: Vec<(String, Option<usize>, StyleValue)>,
}

impl Rule {
    fn matches(&self, item: &dyn PlotItem) -> bool {
        if let Some(ref class) = self.class {
            if class != item.core().class() {
                return false;
            }
        }
        if let Some(ref state) = self.state {
            if !item.core().has_state(state) {
                return false;
            }
        }
        if let Some((ref name, ref want)) = self.prop_match {
            match item.item_property(name) {
                Some(have) => {
                    if &have != want {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }
}

/// An ordered rule list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleSheet {
    rules: Vec<Rule>,
}

fn selector_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<type>\*|[A-Za-z_][A-Za-z0-9_]*)?(?::(?P<state>[A-Za-z_][A-Za-z0-9_-]*))?(?:\[(?P<prop>[A-Za-z_][A-Za-z0-9_-]*)=(?P<val>[^\]]+)\])?$",
        )
        .expect("selector regex")
    })
}

fn property_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<name>[A-Za-z_][A-Za-z0-9_-]*)(?:\[(?P<index>\d+)\])?$")
            .expect("property regex")
    })
}

impl StyleSheet {
    /// Parse sheet text. Malformed blocks are skipped with a warning;
    /// parsing is intentionally forgiving so a stale sheet attribute never
    /// breaks rendering.
    pub fn parse(text: &str) -> StyleSheet {
        let mut rules = Vec::new();
        let mut rest = text;
        while let Some(open) = rest.find('{') {
            let selector = rest[..open].trim().to_string();
            let Some(close) = rest[open..].find('}') else {
                tracing::warn!(target: "plot.sheet", "unterminated rule block");
                break;
            };
            let body = &rest[open + 1..open + close];
            rest = &rest[open + close + 1..];

            let Some(caps) = selector_regex().captures(&selector) else {
                tracing::warn!(target: "plot.sheet", selector = %selector, "bad selector");
                continue;
            };
            let class = caps.name("type").and_then(|m| {
                if m.as_str() == "*" {
                    None
                } else {
                    Some(m.as_str().to_string())
                }
            });
            let state = caps.name("state").map(|m| m.as_str().to_string());
            let prop_match = match (caps.name("prop"), caps.name("val")) {
                (Some(p), Some(v)) => Some((p.as_str().to_string(), StyleValue::parse(v.as_str()))),
                _ => None,
            };

            let mut assignments = Vec::new();
            for decl in body.split(';') {
                let decl = decl.trim();
                if decl.is_empty() {
                    continue;
                }
                let Some((name, value)) = decl.split_once(':') else {
                    continue;
                };
                let Some(pcaps) = property_regex().captures(name.trim()) else {
                    continue;
                };
                let prop_name = pcaps.name("name").unwrap().as_str().to_string();
                let index = pcaps
                    .name("index")
                    .and_then(|m| m.as_str().parse::<usize>().ok());
                assignments.push((prop_name, index, StyleValue::parse(value)));
            }
            rules.push(Rule {
                class,
                state,
                prop_match,
                assignments,
            });
        }
        StyleSheet { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply in declaration order. Returns the number of assignments an
    /// item accepted.
    pub fn apply(&self, item: &mut dyn PlotItem) -> usize {
        let mut accepted = 0;
        for rule in &self.rules {
            if !rule.matches(item) {
                continue;
            }
            for (name, index, value) in &rule.assignments {
                if item.set_item_property(name, value, *index) {
                    accepted += 1;
                }
            }
        }
        accepted
    }

    /// Serialize back to text (core-typed properties round-trip).
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for rule in &self.rules {
            match (&rule.class, &rule.state, &rule.prop_match) {
                (Some(c), None, None) => out.push_str(c),
                (Some(c), Some(s), None) => {
                    out.push_str(c);
                    out.push(':');
                    out.push_str(s);
                }
                (Some(c), None, Some((p, v))) => {
                    out.push_str(&format!("{c}[{p}={v}]"));
                }
                (None, None, None) => out.push('*'),
                (None, Some(s), None) => {
                    out.push_str("*:");
                    out.push_str(s);
                }
                _ => out.push('*'),
            }
            out.push_str(" { ");
            for (name, index, value) in &rule.assignments {
                match index {
                    Some(i) => out.push_str(&format!("{name}[{i}]: {value}; ")),
                    None => out.push_str(&format!("{name}: {value}; ")),
                }
            }
            out.push_str("}\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_selectors() {
        let sheet = StyleSheet::parse(
            "PlotCurve { pen-color: #ff0000; pen-width: 2; }\n\
             PlotCurve:selected { pen-width: 3; }\n\
             PlotCurve[title=raw] { visible: 0; }\n\
             * { z: 5; }",
        );
        assert_eq!(sheet.rules().len(), 4);
        let r = &sheet.rules()[0];
        assert_eq!(r.class.as_deref(), Some("PlotCurve"));
        assert_eq!(r.assignments.len(), 2);
        assert_eq!(
            r.assignments[0].2,
            StyleValue::Color(Rgba::opaque(255, 0, 0))
        );
        assert_eq!(sheet.rules()[1].state.as_deref(), Some("selected"));
        assert!(sheet.rules()[2].prop_match.is_some());
        assert_eq!(sheet.rules()[3].class, None);
    }

    #[test]
    fn parse_indexed_property() {
        let sheet = StyleSheet::parse("PlotSpectrogram { contour-pen-color[1]: red; }");
        let (name, index, value) = &sheet.rules()[0].assignments[0];
        assert_eq!(name, "contour-pen-color");
        assert_eq!(*index, Some(1));
        assert_eq!(*value, StyleValue::Color(Rgba::opaque(255, 0, 0)));
    }

    #[test]
    fn colors_and_numbers() {
        assert_eq!(
            StyleValue::parse("#102030"),
            StyleValue::Color(Rgba::opaque(0x10, 0x20, 0x30))
        );
        assert_eq!(StyleValue::parse("2.5"), StyleValue::Number(2.5));
        assert_eq!(
            StyleValue::parse("'hello'"),
            StyleValue::Str("hello".into())
        );
    }

    #[test]
    fn to_text_round_trips_structurally() {
        let text = "PlotCurve { pen-color: #ff0000; }\nPlotCurve:selected { pen-width: 3; }\n";
        let sheet = StyleSheet::parse(text);
        let round = StyleSheet::parse(&sheet.to_text());
        assert_eq!(sheet, round);
    }

    #[test]
    fn malformed_blocks_are_skipped() {
        let sheet = StyleSheet::parse("Broken selector! { x: 1; } PlotCurve { z: 2; }");
        assert_eq!(sheet.rules().len(), 1);
        assert_eq!(sheet.rules()[0].class.as_deref(), Some("PlotCurve"));
    }
}
