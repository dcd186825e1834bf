//! Generator specifications and the generators built from them.
//!
//! A [`GeneratorSpec`] is the serializable description found in a model file.
//! [`GeneratorSpec::build`] validates it and turns it into a boxed
//! [`ValueGenerator`] seeded for one column.

use crate::fake::FakeKind;
use crate::value::{Literal, Value};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Produces the values of a single column.
///
/// Implementations are pure apart from their own counters and RNG state.
pub trait ValueGenerator: Send {
    fn next_value(&mut self) -> Value;
}

/// Error type for generator specifications
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("invalid range: min {min} is greater than max {max}")]
    InvalidRange { min: String, max: String },

    #[error("float range [{min}, {max}) must have finite bounds and a finite span")]
    NonFiniteRange { min: f64, max: f64 },

    #[error("precision {0} is too large for a float range")]
    InvalidPrecision(u32),

    #[error("invalid date '{value}': {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("sequence step must not be zero")]
    ZeroStep,

    #[error("one_of requires at least one value")]
    EmptyChoices,

    #[error("probability must be between 0 and 1, got {0}")]
    InvalidProbability(f64),

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Decimal places beyond this exceed f64 precision
const MAX_FLOAT_PRECISION: u32 = 15;

fn default_start() -> i64 {
    1
}

fn default_step() -> i64 {
    1
}

/// Serializable generator description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeneratorSpec {
    /// Monotonic integers: start, start + step, ...
    Sequence {
        #[serde(default = "default_start")]
        start: i64,
        #[serde(default = "default_step")]
        step: i64,
    },
    /// Uniform integer in `[min, max]`
    IntRange { min: i64, max: i64 },
    /// Uniform float in `[min, max)`, optionally rounded
    FloatRange {
        min: f64,
        max: f64,
        #[serde(default)]
        precision: Option<u32>,
    },
    /// Uniform date in `[start, end]` (`YYYY-MM-DD`)
    DateRange { start: String, end: String },
    /// Uniform timestamp in `[start, end]` (`YYYY-MM-DD HH:MM:SS`)
    TimestampRange { start: String, end: String },
    /// Random (v4 layout) UUID
    Uuid,
    /// Uniform pick from a fixed list
    OneOf { values: Vec<Literal> },
    /// Boolean that is true with the given probability
    WeightedBool { true_weight: f64 },
    /// Text with `{index}` and `{rand:N}` placeholders
    Pattern { pattern: String },
    /// Realistic fake data
    Fake { kind: FakeKind },
    /// Always NULL
    Null,
}

impl GeneratorSpec {
    /// Validate the specification without building a generator
    pub fn validate(&self) -> Result<(), GeneratorError> {
        self.build(0).map(|_| ())
    }

    /// Build a generator seeded with `seed`
    pub fn build(&self, seed: u64) -> Result<Box<dyn ValueGenerator>, GeneratorError> {
        let rng = ChaCha8Rng::seed_from_u64(seed);

        let gen: Box<dyn ValueGenerator> = match self {
            GeneratorSpec::Sequence { start, step } => {
                if *step == 0 {
                    return Err(GeneratorError::ZeroStep);
                }
                Box::new(Sequence {
                    next: *start,
                    step: *step,
                })
            }
            GeneratorSpec::IntRange { min, max } => {
                check_range(min, max)?;
                Box::new(IntRange {
                    rng,
                    min: *min,
                    max: *max,
                })
            }
            GeneratorSpec::FloatRange {
                min,
                max,
                precision,
            } => {
                check_range(min, max)?;
                if !min.is_finite() || !max.is_finite() || !(max - min).is_finite() {
                    return Err(GeneratorError::NonFiniteRange {
                        min: *min,
                        max: *max,
                    });
                }
                let scale = match precision {
                    Some(p) if *p > MAX_FLOAT_PRECISION => {
                        return Err(GeneratorError::InvalidPrecision(*p))
                    }
                    Some(p) => Some(10f64.powi(*p as i32)),
                    None => None,
                };
                Box::new(FloatRange {
                    rng,
                    min: *min,
                    max: *max,
                    scale,
                })
            }
            GeneratorSpec::DateRange { start, end } => {
                let start_date = parse_date(start)?;
                let end_date = parse_date(end)?;
                check_range(&start_date, &end_date)?;
                Box::new(DateRange {
                    rng,
                    start: start_date,
                    span_days: (end_date - start_date).num_days(),
                })
            }
            GeneratorSpec::TimestampRange { start, end } => {
                let start_ts = parse_timestamp(start)?;
                let end_ts = parse_timestamp(end)?;
                check_range(&start_ts, &end_ts)?;
                Box::new(TimestampRange {
                    rng,
                    start: start_ts,
                    span_secs: (end_ts - start_ts).num_seconds(),
                })
            }
            GeneratorSpec::Uuid => Box::new(UuidGen { rng }),
            GeneratorSpec::OneOf { values } => {
                if values.is_empty() {
                    return Err(GeneratorError::EmptyChoices);
                }
                Box::new(OneOf {
                    rng,
                    values: values.iter().map(Literal::to_value).collect(),
                })
            }
            GeneratorSpec::WeightedBool { true_weight } => {
                if !(0.0..=1.0).contains(true_weight) {
                    return Err(GeneratorError::InvalidProbability(*true_weight));
                }
                Box::new(WeightedBool {
                    rng,
                    true_weight: *true_weight,
                })
            }
            GeneratorSpec::Pattern { pattern } => Box::new(Pattern {
                rng,
                segments: parse_pattern(pattern)?,
                index: 0,
            }),
            GeneratorSpec::Fake { kind } => Box::new(FakeGen { rng, kind: *kind }),
            GeneratorSpec::Null => Box::new(NullGen),
        };

        Ok(gen)
    }
}

fn check_range<T: PartialOrd + std::fmt::Display>(min: &T, max: &T) -> Result<(), GeneratorError> {
    if min > max {
        return Err(GeneratorError::InvalidRange {
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(())
}

fn parse_date(value: &str) -> Result<NaiveDate, GeneratorError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|source| {
        GeneratorError::InvalidDate {
            value: value.to_string(),
            source,
        }
    })
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime, GeneratorError> {
    let trimmed = value.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|source| GeneratorError::InvalidDate {
            value: value.to_string(),
            source,
        })
}

struct Sequence {
    next: i64,
    step: i64,
}

impl ValueGenerator for Sequence {
    fn next_value(&mut self) -> Value {
        let current = self.next;
        self.next = self.next.wrapping_add(self.step);
        Value::Int(current)
    }
}

struct IntRange {
    rng: ChaCha8Rng,
    min: i64,
    max: i64,
}

impl ValueGenerator for IntRange {
    fn next_value(&mut self) -> Value {
        Value::Int(self.rng.random_range(self.min..=self.max))
    }
}

struct FloatRange {
    rng: ChaCha8Rng,
    min: f64,
    max: f64,
    scale: Option<f64>,
}

impl ValueGenerator for FloatRange {
    fn next_value(&mut self) -> Value {
        let raw = if self.min == self.max {
            self.min
        } else {
            self.rng.random_range(self.min..self.max)
        };
        match self.scale {
            Some(scale) => Value::Float((raw * scale).round() / scale),
            None => Value::Float(raw),
        }
    }
}

struct DateRange {
    rng: ChaCha8Rng,
    start: NaiveDate,
    span_days: i64,
}

impl ValueGenerator for DateRange {
    fn next_value(&mut self) -> Value {
        let offset = self.rng.random_range(0..=self.span_days);
        Value::Date(self.start + TimeDelta::days(offset))
    }
}

struct TimestampRange {
    rng: ChaCha8Rng,
    start: NaiveDateTime,
    span_secs: i64,
}

impl ValueGenerator for TimestampRange {
    fn next_value(&mut self) -> Value {
        let offset = self.rng.random_range(0..=self.span_secs);
        Value::Timestamp(self.start + TimeDelta::seconds(offset))
    }
}

struct UuidGen {
    rng: ChaCha8Rng,
}

impl ValueGenerator for UuidGen {
    fn next_value(&mut self) -> Value {
        let bytes: [u8; 16] = self.rng.random();
        Value::Uuid(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }
}

struct OneOf {
    rng: ChaCha8Rng,
    values: Vec<Value>,
}

impl ValueGenerator for OneOf {
    fn next_value(&mut self) -> Value {
        let idx = self.rng.random_range(0..self.values.len());
        self.values[idx].clone()
    }
}

struct WeightedBool {
    rng: ChaCha8Rng,
    true_weight: f64,
}

impl ValueGenerator for WeightedBool {
    fn next_value(&mut self) -> Value {
        Value::Bool(self.rng.random_bool(self.true_weight))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Index,
    RandomDigits(usize),
}

fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, GeneratorError> {
    let invalid = |reason: &str| GeneratorError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    let mut rest = pattern;

    while let Some(open) = rest.find('{') {
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        let close = rest[open..]
            .find('}')
            .map(|i| open + i)
            .ok_or_else(|| invalid("unclosed '{'"))?;
        let placeholder = &rest[open + 1..close];

        if placeholder == "index" {
            segments.push(Segment::Index);
        } else if let Some(n) = placeholder.strip_prefix("rand:") {
            let digits: usize = n
                .parse()
                .map_err(|_| invalid("rand placeholder needs a digit count"))?;
            if digits == 0 || digits > 18 {
                return Err(invalid("rand digit count must be between 1 and 18"));
            }
            segments.push(Segment::RandomDigits(digits));
        } else {
            return Err(invalid(&format!("unknown placeholder '{{{}}}'", placeholder)));
        }

        rest = &rest[close + 1..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }

    Ok(segments)
}

struct Pattern {
    rng: ChaCha8Rng,
    segments: Vec<Segment>,
    index: u64,
}

impl ValueGenerator for Pattern {
    fn next_value(&mut self) -> Value {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Index => out.push_str(&self.index.to_string()),
                Segment::RandomDigits(n) => {
                    let upper = 10u64.pow(*n as u32);
                    let value = self.rng.random_range(0..upper);
                    out.push_str(&format!("{:0width$}", value, width = *n));
                }
            }
        }
        self.index += 1;
        Value::Text(out)
    }
}

struct FakeGen {
    rng: ChaCha8Rng,
    kind: FakeKind,
}

impl ValueGenerator for FakeGen {
    fn next_value(&mut self) -> Value {
        Value::Text(self.kind.generate(&mut self.rng))
    }
}

struct NullGen;

impl ValueGenerator for NullGen {
    fn next_value(&mut self) -> Value {
        Value::Null
    }
}
