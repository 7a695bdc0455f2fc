// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Parsing of link bandwidth and delay strings.

fn split_number(s: &str) -> Result<(f64, String), String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value = number
        .parse::<f64>()
        .map_err(|_| format!("'{s}' does not start with a number"))?;
    Ok((value, unit.trim().to_ascii_lowercase()))
}

/// Parse a bandwidth in Mbit/s.
///
/// A bare number is taken to be Mbit/s. Otherwise the suffix selects the
/// unit: `bps`, `kbps`, `mbps` or `gbps` (`k`, `m` and `g` are also
/// accepted).
pub fn parse_bandwidth_mbps(s: &str) -> Result<f64, String> {
    let (value, unit) = split_number(s)?;
    let scale = match unit.as_str() {
        "" | "m" | "mbps" | "mbit" | "mbit/s" => 1.0,
        "bps" | "bit/s" => 1e-6,
        "k" | "kbps" | "kbit" | "kbit/s" => 1e-3,
        "g" | "gbps" | "gbit" | "gbit/s" => 1e3,
        _ => return Err(format!("Unknown bandwidth unit in '{s}'")),
    };
    Ok(value * scale)
}

/// Parse a delay in milliseconds.
///
/// A bare number is taken to be milliseconds. Supported suffixes are `us`,
/// `ms` and `s`. Sub-millisecond delays are rounded to the nearest
/// millisecond.
pub fn parse_delay_ms(s: &str) -> Result<u64, String> {
    let (value, unit) = split_number(s)?;
    let ms = match unit.as_str() {
        "" | "ms" => value,
        "us" => value / 1000.0,
        "s" => value * 1000.0,
        _ => return Err(format!("Unknown delay unit in '{s}'")),
    };
    Ok(ms.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bandwidths() {
        assert_eq!(parse_bandwidth_mbps("40").unwrap(), 40.0);
        assert_eq!(parse_bandwidth_mbps("100Mbps").unwrap(), 100.0);
        assert_eq!(parse_bandwidth_mbps("1Gbps").unwrap(), 1000.0);
        assert_eq!(parse_bandwidth_mbps("500 kbps").unwrap(), 0.5);
        assert!(parse_bandwidth_mbps("fast").is_err());
        assert!(parse_bandwidth_mbps("10 furlongs").is_err());
    }

    #[test]
    fn delays() {
        assert_eq!(parse_delay_ms("15").unwrap(), 15);
        assert_eq!(parse_delay_ms("15ms").unwrap(), 15);
        assert_eq!(parse_delay_ms("1s").unwrap(), 1000);
        assert_eq!(parse_delay_ms("1.5 s").unwrap(), 1500);
        assert_eq!(parse_delay_ms("2500us").unwrap(), 3);
        assert!(parse_delay_ms("soon").is_err());
    }
}
