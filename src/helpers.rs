use chrono::{DateTime, Utc};

pub fn human_bytes(b: f64) -> String {
    if b <= 0.0 {
        return "0 B".to_string();
    }
    const UNIT: f64 = 1024.0;
    if b < UNIT {
        return format!("{} B", b as i64);
    }
    let suffixes = ["KiB", "MiB", "GiB", "TiB"];
    let mut div = UNIT;
    let mut exp = 0;
    while b / div >= UNIT && exp < suffixes.len() - 1 {
        div *= UNIT;
        exp += 1;
    }
    format!("{:.1} {}", b / div, suffixes[exp])
}

#[derive(Clone, Copy)]
enum Scale {
    Mul(f64),
    Div(f64),
}

const SUFFIXES: [(&str, Scale); 15] = [
    // Binary suffixes must be checked before their single-letter SI counterparts.
    ("Ki", Scale::Mul(1024.0)),
    ("Mi", Scale::Mul(1048576.0)),
    ("Gi", Scale::Mul(1073741824.0)),
    ("Ti", Scale::Mul(1099511627776.0)),
    ("Pi", Scale::Mul(1125899906842624.0)),
    ("Ei", Scale::Mul(1152921504606846976.0)),
    ("n", Scale::Div(1e9)),
    ("u", Scale::Div(1e6)),
    ("m", Scale::Div(1e3)),
    ("k", Scale::Mul(1e3)),
    ("K", Scale::Mul(1e3)),
    ("M", Scale::Mul(1e6)),
    ("G", Scale::Mul(1e9)),
    ("T", Scale::Mul(1e12)),
    ("P", Scale::Mul(1e15)),
];

/// Converts a Kubernetes quantity to cores (CPU) or bytes (memory).
/// Never fails: anything unparseable is `0`.
pub fn parse_quantity(raw: &str) -> f64 {
    let s = raw.trim();
    if s.is_empty() {
        return 0.0;
    }

    for (suffix, scale) in SUFFIXES {
        if let Some(num) = s.strip_suffix(suffix) {
            if let Ok(v) = num.parse::<f64>() {
                return finite_or_zero(match scale {
                    Scale::Mul(f) => v * f,
                    Scale::Div(d) => v / d,
                });
            }
        }
    }
    if let Some(num) = s.strip_suffix('E') {
        if let Ok(v) = num.parse::<f64>() {
            return finite_or_zero(v * 1e18);
        }
    }

    s.parse::<f64>().map(finite_or_zero).unwrap_or(0.0)
}

/// Same as [`parse_quantity`] for quantities that may arrive as JSON numbers.
pub fn parse_quantity_value(raw: Option<&serde_json::Value>) -> f64 {
    match raw {
        Some(serde_json::Value::String(s)) => parse_quantity(s),
        Some(serde_json::Value::Number(n)) => n.as_f64().map(finite_or_zero).unwrap_or(0.0),
        _ => 0.0,
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

pub fn parse_timestamp(ts: Option<&str>) -> Option<DateTime<Utc>> {
    let ts = ts.filter(|s| !s.is_empty())?;
    DateTime::parse_from_rfc3339(ts).ok().map(|dt| dt.to_utc())
}

/// Largest whole unit of elapsed time since `created`: `"3d"`, `"5h"`, `"12m"`.
pub fn format_age_at(created: Option<&str>, now: DateTime<Utc>) -> String {
    let created = match parse_timestamp(created) {
        Some(t) => t,
        None => return "Unknown".to_string(),
    };

    let d = now - created;
    if d.num_days() >= 1 {
        format!("{}d", d.num_days())
    } else if d.num_hours() >= 1 {
        format!("{}h", d.num_hours())
    } else {
        format!("{}m", d.num_minutes().max(0))
    }
}
