//! Lossless conversion between raw and the human denominations.
//!
//! | Denomination | Raw per unit |
//! |---|---|
//! | `trollar`  | 10^24 |
//! | `ktrollar` | 10^27 |
//! | `Mtrollar` | 10^30 |
//!
//! All arithmetic is integer arithmetic on u128. A decimal value that carries
//! more fractional digits than a denomination can resolve is rejected rather
//! than rounded.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{RawAmount, TypesError};

/// Sends below one trollar are ignored by the node.
pub const DUST_THRESHOLD: RawAmount = RawAmount::new(10u128.pow(24));

/// Largest scale a u128 mantissa can meaningfully carry.
const MAX_SCALE: u32 = 38;

/// A human denomination, related to raw by a fixed power of ten.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Denomination {
    Trollar,
    Ktrollar,
    Mtrollar,
}

impl Denomination {
    /// Power of ten separating one unit of this denomination from raw.
    pub fn exponent(&self) -> u32 {
        match self {
            Self::Trollar => 24,
            Self::Ktrollar => 27,
            Self::Mtrollar => 30,
        }
    }

    /// Raw value of exactly one unit.
    pub fn unit(&self) -> RawAmount {
        RawAmount::new(10u128.pow(self.exponent()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trollar => "trollar",
            Self::Ktrollar => "ktrollar",
            Self::Mtrollar => "Mtrollar",
        }
    }

    /// Convert a decimal value expressed in this denomination to raw.
    pub fn to_raw(&self, value: &DecimalAmount) -> Result<RawAmount, TypesError> {
        let exponent = self.exponent();
        if value.scale > exponent {
            return Err(TypesError::ExcessPrecision {
                value: value.to_string(),
                denomination: self.as_str().to_string(),
            });
        }
        value
            .mantissa
            .checked_mul(10u128.pow(exponent - value.scale))
            .map(RawAmount::new)
            .ok_or(TypesError::Overflow)
    }

    /// Express a raw amount in this denomination, exactly.
    pub fn from_raw(&self, raw: RawAmount) -> DecimalAmount {
        DecimalAmount::new(raw.raw(), self.exponent())
    }
}

impl fmt::Display for Denomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Denomination {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trollar" => Ok(Self::Trollar),
            "ktrollar" => Ok(Self::Ktrollar),
            "mtrollar" => Ok(Self::Mtrollar),
            _ => Err(TypesError::UnknownDenomination(s.to_string())),
        }
    }
}

/// An exact non-negative decimal: `mantissa × 10^-scale`.
///
/// Always kept normalized (no trailing fractional zeros), so equality is
/// numeric equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DecimalAmount {
    mantissa: u128,
    scale: u32,
}

impl DecimalAmount {
    pub const ZERO: Self = Self {
        mantissa: 0,
        scale: 0,
    };

    pub fn new(mut mantissa: u128, mut scale: u32) -> Self {
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }
        Self { mantissa, scale }
    }

    /// A whole number of units.
    pub fn whole(units: u128) -> Self {
        Self::new(units, 0)
    }

    pub fn mantissa(&self) -> u128 {
        self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// Drop fractional digits beyond `scale`.
    pub fn truncate(&self, scale: u32) -> Self {
        if self.scale <= scale {
            return *self;
        }
        Self::new(self.mantissa / 10u128.pow(self.scale - scale), scale)
    }
}

impl fmt::Display for DecimalAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.to_string();
        let scale = self.scale as usize;
        if scale == 0 {
            return f.write_str(&digits);
        }
        if digits.len() > scale {
            let (int, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{int}.{frac}")
        } else {
            write!(f, "0.{}{digits}", "0".repeat(scale - digits.len()))
        }
    }
}

impl FromStr for DecimalAmount {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypesError::InvalidAmount(s.to_string());
        let (int, frac) = match s.split_once('.') {
            Some((int, frac)) => (int, frac),
            None => (s, ""),
        };
        if int.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let frac = frac.trim_end_matches('0');
        if frac.len() as u32 > MAX_SCALE {
            return Err(TypesError::Overflow);
        }
        let digits = format!("{int}{frac}");
        let digits = digits.trim_start_matches('0');
        let mantissa = if digits.is_empty() {
            0
        } else {
            digits.parse::<u128>().map_err(|_| TypesError::Overflow)?
        };
        Ok(Self::new(mantissa, frac.len() as u32))
    }
}

impl Serialize for DecimalAmount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DecimalAmount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Split `raw` into the largest multiple of `denomination`'s unit and the raw
/// remainder below it.
///
/// `whole + remainder == raw` always holds; nothing is dropped.
pub fn split_raw(raw: RawAmount, denomination: Denomination) -> (RawAmount, RawAmount) {
    let unit = denomination.unit().raw();
    let remainder = raw.raw() % unit;
    (RawAmount::new(raw.raw() - remainder), RawAmount::new(remainder))
}
