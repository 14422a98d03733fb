//! Tick label formatting.
//!
//! Three policies: a fixed value->label table, elapsed-time formatting and
//! generic numeric formatting with a uniform exponent. The exponent is
//! either set manually or computed from the interval magnitude so every
//! label on an axis shares the same power of ten.

use core_data::Interval;

#[derive(Debug, Clone, Default)]
pub enum ValueToText {
    /// Generic numeric labels; all labels share `exponent` (manual when
    /// `manual_exponent`, else recomputed from the interval).
    #[default]
    Generic,
    GenericWithState {
        exponent: i32,
        manual_exponent: bool,
    },
    /// Fixed positions with fixed labels; anything else is empty.
    Fixed(Vec<(f64, String)>),
    /// Seconds formatted `h:mm:ss.mmm`, trimmed to the magnitude.
    Time,
}

impl ValueToText {
    pub fn with_exponent(exponent: i32) -> Self {
        ValueToText::GenericWithState {
            exponent,
            manual_exponent: true,
        }
    }

    /// Recompute the automatic exponent for `interval`. Manual exponents
    /// and non-generic policies are untouched.
    pub fn update_exponent(&mut self, interval: Interval) {
        let auto = auto_exponent(interval);
        match self {
            ValueToText::Generic => {
                if auto != 0 {
                    *self = ValueToText::GenericWithState {
                        exponent: auto,
                        manual_exponent: false,
                    };
                }
            }
            ValueToText::GenericWithState {
                exponent,
                manual_exponent: false,
            } => *exponent = auto,
            _ => {}
        }
    }

    pub fn label(&self, v: f64) -> String {
        match self {
            ValueToText::Generic => format_plain(v),
            ValueToText::GenericWithState { exponent, .. } => {
                if *exponent == 0 {
                    format_plain(v)
                } else {
                    let scaled = v / 10f64.powi(*exponent);
                    format!("{}e{}", format_plain(scaled), exponent)
                }
            }
            ValueToText::Fixed(entries) => entries
                .iter()
                .find(|(pos, _)| (pos - v).abs() < 1e-9)
                .map(|(_, label)| label.clone())
                .unwrap_or_default(),
            ValueToText::Time => format_time(v),
        }
    }
}

/// Uniform exponent: engages past 10^4 / below 10^-3.
fn auto_exponent(interval: Interval) -> i32 {
    let mag = interval.min.abs().max(interval.max.abs());
    if mag == 0.0 || !mag.is_finite() {
        return 0;
    }
    let e = mag.log10().floor() as i32;
    if e >= 4 || e <= -3 { e } else { 0 }
}

fn format_plain(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    // Up to 6 significant digits, trailing zeros trimmed.
    let s = format!("{v:.6}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() { "0".to_string() } else { s.to_string() }
}

fn format_time(seconds: f64) -> String {
    let neg = seconds < 0.0;
    let total_ms = (seconds.abs() * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let s = (total_ms / 1000) % 60;
    let m = (total_ms / 60_000) % 60;
    let h = total_ms / 3_600_000;
    let sign = if neg { "-" } else { "" };
    if h > 0 {
        format!("{sign}{h}:{m:02}:{s:02}")
    } else if m > 0 {
        format!("{sign}{m}:{s:02}")
    } else if ms != 0 {
        format!("{sign}{s}.{ms:03}")
    } else {
        format!("{sign}{s}")
    }
}
