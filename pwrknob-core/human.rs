//! Human-oriented value parsing and formatting
//!
//! Two jobs: turn operator input ("on", "2.4GHz", "800mW") into machine
//! values, and turn CPU number sets into compact range strings for
//! diagnostics.

use crate::error::{PwrknobError, Result};

/// SI prefixes accepted in front of a base unit, e.g. the "M" of "100MHz".
const SI_SCALERS: &[(&str, f64)] = &[
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("m", 1e-3),
    ("u", 1e-6),
    ("n", 1e-9),
];

/// Format an ascending CPU number list as a compact range string,
/// e.g. `[0, 1, 2, 3, 7]` becomes `"0-3,7"`.
pub fn rangify(nums: &[u32]) -> String {
    let mut parts = Vec::new();
    let mut iter = nums.iter().copied().peekable();

    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end = iter.next().unwrap();
        }
        if end > start {
            parts.push(format!("{start}-{end}"));
        } else {
            parts.push(start.to_string());
        }
    }

    parts.join(",")
}

/// Parse a range string like `"0-3,8,10-11"` into an ascending,
/// deduplicated number list.
pub fn parse_int_list(s: &str) -> Result<Vec<u32>> {
    let mut nums = Vec::new();

    for part in s.trim().split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start.trim().parse().map_err(|_| bad_range(s))?;
            let end: u32 = end.trim().parse().map_err(|_| bad_range(s))?;
            if start > end {
                return Err(bad_range(s));
            }
            nums.extend(start..=end);
        } else {
            nums.push(part.parse().map_err(|_| bad_range(s))?);
        }
    }

    nums.sort_unstable();
    nums.dedup();
    Ok(nums)
}

fn bad_range(s: &str) -> PwrknobError {
    PwrknobError::InvalidTarget(format!(
        "'{s}' is not a valid number list, expected e.g. '0-3,8'"
    ))
}

/// Parse a boolean-style token. Accepts the canonical "on"/"off" plus the
/// common synonyms.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "on" | "enable" | "enabled" | "true" | "1" => Some(true),
        "off" | "disable" | "disabled" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Parse a number with an optional SI-prefixed unit, scaled to the base
/// unit. `parse_si_value("100MHz", "Hz")` is `1e8`; a bare number passes
/// through unscaled. The unit, when present, must match `unit`.
pub fn parse_si_value(s: &str, unit: &str) -> Option<f64> {
    let s = s.trim();

    if let Ok(v) = s.parse::<f64>() {
        return Some(v);
    }

    let rest = s.strip_suffix(unit)?;
    let rest = rest.trim();

    if let Ok(v) = rest.parse::<f64>() {
        return Some(v);
    }

    for (prefix, scale) in SI_SCALERS {
        if let Some(num) = rest.strip_suffix(prefix) {
            return num.trim().parse::<f64>().ok().map(|v| v * scale);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rangify() {
        assert_eq!(rangify(&[]), "");
        assert_eq!(rangify(&[4]), "4");
        assert_eq!(rangify(&[0, 1, 2, 3, 7]), "0-3,7");
        assert_eq!(rangify(&[0, 2, 3, 5]), "0,2-3,5");
    }

    #[test]
    fn test_parse_int_list() {
        assert_eq!(parse_int_list("0-3,8").unwrap(), vec![0, 1, 2, 3, 8]);
        assert_eq!(parse_int_list("3, 1, 1").unwrap(), vec![1, 3]);
        assert!(parse_int_list("3-1").is_err());
        assert!(parse_int_list("x").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("Disable"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_parse_si_value() {
        assert_eq!(parse_si_value("100MHz", "Hz"), Some(1e8));
        assert_eq!(parse_si_value("2.4 GHz", "Hz"), Some(2.4e9));
        assert_eq!(parse_si_value("800", "Hz"), Some(800.0));
        assert_eq!(parse_si_value("800Hz", "Hz"), Some(800.0));
        assert_eq!(parse_si_value("800mW", "W"), Some(0.8));
        assert_eq!(parse_si_value("fast", "Hz"), None);
    }
}
