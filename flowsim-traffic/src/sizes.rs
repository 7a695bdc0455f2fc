// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Payload size distributions.
//!
//! Sizes are byte strings such as `64KiB` or `2MB`, or plain numbers of
//! bytes. A distribution can be written as a string:
//!
//!  - `64KiB` or `fixed:64KiB`
//!  - `uniform:1MiB-8MiB`
//!  - `exponential:64KiB` (the mean)
//!  - `pareto:10KiB:1.5` (the scale and the shape)
//!
//! or, in YAML files, as a map:
//!
//! ```yaml
//! size: { dist: uniform, min: 1MiB, max: 8MiB }
//! ```

use std::fmt;
use std::str::FromStr;

use byte_unit::Byte;
use rand::Rng;
use serde::{Deserialize, de};
use serde_yaml::Value;

/// Parse a byte string such as `64KiB`, or a plain number of bytes.
pub fn parse_bytes(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let ignore_case = false;
    let num_bytes = Byte::parse_str(s, ignore_case)
        .map_err(|e| format!("Unable to parse {s} as Byte string: {e}"))?;
    Ok(num_bytes.as_u64())
}

/// Deserialize a value which could be an integer or a byte string.
pub fn parse_byte_str<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: de::Deserializer<'de>,
{
    let value: Value = Deserialize::deserialize(deserializer)?;
    if let Some(number) = value.as_u64() {
        return Ok(number);
    }
    match value.as_str() {
        Some(s) => parse_bytes(s).map_err(de::Error::custom),
        None => Err(de::Error::custom(format!(
            "'{value:?}': Unsupported type for Deserialize (should be u64 or String)"
        ))),
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SizeDistribution {
    Fixed(u64),
    Uniform { min: u64, max: u64 },
    Exponential { mean: u64 },
    Pareto { scale: u64, shape: f64 },
}

impl SizeDistribution {
    /// The default for HTTP: exponential with a mean of 64 KiB.
    #[must_use]
    pub fn http_default() -> Self {
        SizeDistribution::Exponential { mean: 64 * 1024 }
    }

    /// The default for FTP: uniform between 1 MiB and 8 MiB.
    #[must_use]
    pub fn ftp_default() -> Self {
        SizeDistribution::Uniform {
            min: 1024 * 1024,
            max: 8 * 1024 * 1024,
        }
    }

    fn validate(self) -> Result<Self, String> {
        match self {
            SizeDistribution::Uniform { min, max } if min > max => {
                Err(format!("uniform size minimum {min} is above maximum {max}"))
            }
            SizeDistribution::Exponential { mean: 0 } => {
                Err("exponential size mean must be positive".to_string())
            }
            SizeDistribution::Pareto { scale, shape } if scale == 0 || shape.is_nan() || shape <= 0.0 => {
                Err("pareto size needs a positive scale and shape".to_string())
            }
            _ => Ok(self),
        }
    }

    /// Draw a size in bytes. Continuous distributions never return zero.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> u64 {
        match *self {
            SizeDistribution::Fixed(bytes) => bytes,
            SizeDistribution::Uniform { min, max } => rng.gen_range(min..=max),
            SizeDistribution::Exponential { mean } => {
                let u: f64 = rng.r#gen();
                let bytes = -(mean as f64) * (1.0 - u).ln();
                (bytes.round() as u64).max(1)
            }
            SizeDistribution::Pareto { scale, shape } => {
                let u: f64 = rng.r#gen();
                let bytes = scale as f64 / (1.0 - u).powf(1.0 / shape);
                (bytes.round() as u64).max(1)
            }
        }
    }
}

impl FromStr for SizeDistribution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some((dist, args)) = s.split_once(':') else {
            return Ok(SizeDistribution::Fixed(parse_bytes(s)?));
        };

        let dist = match dist.to_ascii_lowercase().as_str() {
            "fixed" => SizeDistribution::Fixed(parse_bytes(args)?),
            "uniform" => {
                let Some((min, max)) = args.split_once('-') else {
                    return Err(format!("'{s}': expected uniform:MIN-MAX"));
                };
                SizeDistribution::Uniform {
                    min: parse_bytes(min)?,
                    max: parse_bytes(max)?,
                }
            }
            "exponential" => SizeDistribution::Exponential {
                mean: parse_bytes(args)?,
            },
            "pareto" => {
                let Some((scale, shape)) = args.split_once(':') else {
                    return Err(format!("'{s}': expected pareto:SCALE:SHAPE"));
                };
                SizeDistribution::Pareto {
                    scale: parse_bytes(scale)?,
                    shape: shape
                        .trim()
                        .parse()
                        .map_err(|e| format!("'{s}': bad pareto shape: {e}"))?,
                }
            }
            _ => return Err(format!("Unknown size distribution '{dist}'")),
        };
        dist.validate()
    }
}

impl fmt::Display for SizeDistribution {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SizeDistribution::Fixed(bytes) => write!(f, "fixed:{bytes}"),
            SizeDistribution::Uniform { min, max } => write!(f, "uniform:{min}-{max}"),
            SizeDistribution::Exponential { mean } => write!(f, "exponential:{mean}"),
            SizeDistribution::Pareto { scale, shape } => write!(f, "pareto:{scale}:{shape}"),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "dist", rename_all = "lowercase")]
enum SizeSection {
    Fixed {
        #[serde(deserialize_with = "parse_byte_str")]
        bytes: u64,
    },
    Uniform {
        #[serde(deserialize_with = "parse_byte_str")]
        min: u64,
        #[serde(deserialize_with = "parse_byte_str")]
        max: u64,
    },
    Exponential {
        #[serde(deserialize_with = "parse_byte_str")]
        mean: u64,
    },
    Pareto {
        #[serde(deserialize_with = "parse_byte_str")]
        scale: u64,
        shape: f64,
    },
}

impl<'de> Deserialize<'de> for SizeDistribution {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        let value: Value = Deserialize::deserialize(deserializer)?;
        if let Some(bytes) = value.as_u64() {
            return Ok(SizeDistribution::Fixed(bytes));
        }
        if let Some(s) = value.as_str() {
            return s.parse().map_err(de::Error::custom);
        }

        let section: SizeSection = serde_yaml::from_value(value).map_err(de::Error::custom)?;
        let dist = match section {
            SizeSection::Fixed { bytes } => SizeDistribution::Fixed(bytes),
            SizeSection::Uniform { min, max } => SizeDistribution::Uniform { min, max },
            SizeSection::Exponential { mean } => SizeDistribution::Exponential { mean },
            SizeSection::Pareto { scale, shape } => SizeDistribution::Pareto { scale, shape },
        };
        dist.validate().map_err(de::Error::custom)
    }
}
