use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// A non-negative decimal stored as an integer count of `1 / SCALE` units.
///
/// Energy and emissions use six decimal places, durations three, so sums over
/// many records stay exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed<const SCALE: i64>(i64);

pub type Micros = Fixed<1_000_000>;
pub type Millis = Fixed<1_000>;

impl<const SCALE: i64> Fixed<SCALE> {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Rounds to the nearest unit. Returns `None` for negative, non-finite or
    /// out-of-range values.
    #[must_use]
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let scaled = (value * SCALE as f64).round();
        if scaled > i64::MAX as f64 {
            return None;
        }
        Some(Self(scaled as i64))
    }

    #[must_use]
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }
}

impl<const SCALE: i64> fmt::Display for Fixed<SCALE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = SCALE.ilog10() as usize;
        write!(
            f,
            "{}.{:0digits$}",
            self.0 / SCALE,
            self.0 % SCALE,
            digits = digits
        )
    }
}

impl<const SCALE: i64> Serialize for Fixed<SCALE> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de, const SCALE: i64> Deserialize<'de> for Fixed<SCALE> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Self::from_f64(value)
            .ok_or_else(|| de::Error::custom(format!("{value} is not a non-negative quantity")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_to_scale() {
        let energy = Micros::from_f64(0.1234567).unwrap();
        assert_eq!(energy.raw(), 123_457);

        let duration = Millis::from_f64(120.0).unwrap();
        assert_eq!(duration.raw(), 120_000);
        assert_eq!(duration.as_f64(), 120.0);
    }

    #[test]
    fn test_rejects_negative_and_non_finite() {
        assert!(Micros::from_f64(-0.000001).is_none());
        assert!(Micros::from_f64(f64::NAN).is_none());
        assert!(Micros::from_f64(f64::INFINITY).is_none());
        assert_eq!(Micros::from_f64(0.0), Some(Micros::ZERO));
    }

    #[test]
    fn test_sum_of_raw_units_is_exact() {
        let total: i64 = [0.1, 0.2, 0.3]
            .iter()
            .map(|v| Micros::from_f64(*v).unwrap().raw())
            .sum();
        assert_eq!(Micros::from_raw(total).to_string(), "0.600000");
    }
}
