use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr, time::Duration};

/// A duration as written in Kubernetes resources, e.g. `30s`, `1m30s` or `500ms`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct K8sDuration(Duration);

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("empty duration")]
    Empty,

    #[error("missing a unit: {}", EXPECTED_UNITS)]
    NoUnit,

    #[error("invalid unit {0:?}: {units}", units = EXPECTED_UNITS)]
    InvalidUnit(String),

    #[error("invalid number: {0}")]
    NotANumber(#[from] std::num::ParseFloatError),

    #[error("negative durations are not supported")]
    Negative,
}

const EXPECTED_UNITS: &str = "expected one of 'ns', 'us', 'ms', 's', 'm', or 'h'";

// === impl K8sDuration ===

impl K8sDuration {
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    #[inline]
    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }

    #[inline]
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for K8sDuration {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl From<K8sDuration> for Duration {
    fn from(K8sDuration(d): K8sDuration) -> Self {
        d
    }
}

impl FromStr for K8sDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseError::Empty);
        }
        if s.starts_with('-') {
            return Err(ParseError::Negative);
        }
        if s == "0" {
            return Ok(Self::default());
        }

        let mut total = Duration::ZERO;
        let mut rest = s.strip_prefix('+').unwrap_or(s);
        while !rest.is_empty() {
            let num_end = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .ok_or(ParseError::NoUnit)?;
            let (num, tail) = rest.split_at(num_end);
            let unit_end = tail
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(tail.len());
            let (unit, tail) = tail.split_at(unit_end);

            let value = num.parse::<f64>()?;
            let base = match unit {
                "ns" => Duration::from_nanos(1),
                "us" | "\u{00b5}s" | "\u{03bc}s" => Duration::from_micros(1),
                "ms" => Duration::from_millis(1),
                "s" => Duration::from_secs(1),
                "m" => Duration::from_secs(60),
                "h" => Duration::from_secs(60 * 60),
                other => return Err(ParseError::InvalidUnit(other.to_string())),
            };
            total += base.mul_f64(value);
            rest = tail;
        }

        Ok(Self(total))
    }
}

impl fmt::Display for K8sDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.0;
        if d.is_zero() {
            return f.write_str("0s");
        }
        if d < Duration::from_secs(1) {
            let nanos = d.subsec_nanos();
            return if nanos % 1_000_000 == 0 {
                write!(f, "{}ms", nanos / 1_000_000)
            } else if nanos % 1_000 == 0 {
                write!(f, "{}us", nanos / 1_000)
            } else {
                write!(f, "{nanos}ns")
            };
        }

        let secs = d.as_secs();
        let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        if h > 0 {
            write!(f, "{h}h")?;
        }
        if h > 0 || m > 0 {
            write!(f, "{m}m")?;
        }
        match d.subsec_millis() {
            0 => write!(f, "{s}s"),
            ms => write!(f, "{s}.{ms:03}s"),
        }
    }
}

impl Serialize for K8sDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for K8sDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = K8sDuration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration string such as \"30s\"")
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<Self::Value, E> {
                s.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

impl schemars::JsonSchema for K8sDuration {
    fn schema_name() -> String {
        "K8sDuration".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("30s", Duration::from_secs(30))]
    #[case("1m30s", Duration::from_secs(90))]
    #[case("2h", Duration::from_secs(7200))]
    #[case("500ms", Duration::from_millis(500))]
    #[case("1.5s", Duration::from_millis(1500))]
    #[case("0", Duration::ZERO)]
    fn parses(#[case] input: &str, #[case] expected: Duration) {
        assert_eq!(input.parse::<K8sDuration>(), Ok(K8sDuration(expected)));
    }

    #[rstest]
    #[case("", ParseError::Empty)]
    #[case("10", ParseError::NoUnit)]
    #[case("-1s", ParseError::Negative)]
    #[case("3d", ParseError::InvalidUnit("d".to_string()))]
    fn rejects(#[case] input: &str, #[case] expected: ParseError) {
        assert_eq!(input.parse::<K8sDuration>(), Err(expected));
    }

    #[rstest]
    #[case(Duration::from_secs(90), "1m30s")]
    #[case(Duration::from_secs(3600), "1h0m0s")]
    #[case(Duration::from_millis(250), "250ms")]
    #[case(Duration::from_millis(1500), "1.500s")]
    fn displays(#[case] input: Duration, #[case] expected: &str) {
        assert_eq!(K8sDuration::from(input).to_string(), expected);
    }

    #[test]
    fn serde_as_string() {
        let d: K8sDuration = serde_json::from_str("\"45s\"").unwrap();
        assert_eq!(d.as_secs(), 45);
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"45s\"");
    }
}
