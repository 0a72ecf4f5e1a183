use std::{fmt, time::Duration};

/// Metric type.
///
/// Each type maps to the type code used on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricType {
    /// A counter (`c`).
    Counter,

    /// A timer, in milliseconds (`ms`).
    Timer,

    /// A gauge (`g`).
    Gauge,

    /// A set of unique values (`s`).
    Set,

    /// A histogram (`h`).
    Histogram,
}

impl MetricType {
    /// Returns the wire type code for this metric type.
    pub const fn as_str(self) -> &'static str {
        match self {
            MetricType::Counter => "c",
            MetricType::Timer => "ms",
            MetricType::Gauge => "g",
            MetricType::Set => "s",
            MetricType::Histogram => "h",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric value.
///
/// Values are either numbers or arbitrary strings, such as the members of a set or a signed gauge delta
/// (`+5`/`-5`). Strings are written verbatim.
#[derive(Clone, Debug, PartialEq)]
pub enum MetricValue {
    /// A signed integer.
    Signed(i64),

    /// An unsigned integer.
    Unsigned(u64),

    /// A floating-point number.
    Float(f64),

    /// A string.
    Text(String),
}

impl MetricValue {
    /// Appends the wire representation of this value to `buf`.
    pub(crate) fn write_to(&self, buf: &mut String) {
        match self {
            MetricValue::Signed(v) => buf.push_str(itoa::Buffer::new().format(*v)),
            MetricValue::Unsigned(v) => buf.push_str(itoa::Buffer::new().format(*v)),
            MetricValue::Float(v) => buf.push_str(ryu::Buffer::new().format(*v)),
            MetricValue::Text(s) => buf.push_str(s),
        }
    }

    /// Returns this value negated.
    ///
    /// Strings are prefixed with `-`, unless they already start with one, in which case it is stripped.
    pub(crate) fn negate(self) -> Self {
        match self {
            MetricValue::Signed(v) => MetricValue::Signed(v.saturating_neg()),
            MetricValue::Unsigned(v) => match i64::try_from(v) {
                Ok(v) => MetricValue::Signed(-v),
                Err(_) => MetricValue::Signed(i64::MIN),
            },
            MetricValue::Float(v) => MetricValue::Float(-v),
            MetricValue::Text(s) => match s.strip_prefix('-') {
                Some(rest) => MetricValue::Text(rest.to_string()),
                None => MetricValue::Text(format!("-{}", s)),
            },
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = String::new();
        self.write_to(&mut buf);
        f.write_str(&buf)
    }
}

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for MetricValue {
            fn from(v: $t) -> Self {
                MetricValue::Signed(i64::from(v))
            }
        })*
    };
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for MetricValue {
            fn from(v: $t) -> Self {
                MetricValue::Unsigned(u64::from(v))
            }
        })*
    };
}

impl_from_signed!(i8, i16, i32, i64);
impl_from_unsigned!(u8, u16, u32, u64);

impl From<isize> for MetricValue {
    fn from(v: isize) -> Self {
        MetricValue::Signed(v as i64)
    }
}

impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        MetricValue::Unsigned(v as u64)
    }
}

impl From<f32> for MetricValue {
    fn from(v: f32) -> Self {
        MetricValue::Float(f64::from(v))
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

/// Durations are expressed in whole milliseconds, the unit timers are reported in.
impl From<Duration> for MetricValue {
    fn from(v: Duration) -> Self {
        MetricValue::Unsigned(u64::try_from(v.as_millis()).unwrap_or(u64::MAX))
    }
}

/// A single metric occurrence.
///
/// Names and tags are not validated: a name containing `:`, `|`, or a newline will produce a malformed line on the
/// wire. Sanitizing them is the responsibility of the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricSample {
    name: String,
    value: MetricValue,
    metric_type: MetricType,
    sample_rate: Option<f64>,
    tags: Vec<String>,
}

impl MetricSample {
    /// Creates a new `MetricSample` with no sample rate and no tags.
    pub fn new<N, V>(name: N, value: V, metric_type: MetricType) -> Self
    where
        N: Into<String>,
        V: Into<MetricValue>,
    {
        Self {
            name: name.into(),
            value: value.into(),
            metric_type,
            sample_rate: None,
            tags: Vec::new(),
        }
    }

    /// Sets the sample rate.
    #[must_use]
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the metric value.
    pub fn value(&self) -> &MetricValue {
        &self.value
    }

    /// Returns the metric type.
    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    /// Returns the sample rate, if one was set.
    pub fn sample_rate(&self) -> Option<f64> {
        self.sample_rate
    }

    /// Returns the call-specific tags.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

/// One or more metric names.
///
/// When more than one name is given, the same value, type, sample rate, and tags are applied to each name
/// independently.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Names(Vec<String>);

impl Names {
    /// Returns the number of names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no names.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for Names {
    fn from(name: &str) -> Self {
        Names(vec![name.to_string()])
    }
}

impl From<String> for Names {
    fn from(name: String) -> Self {
        Names(vec![name])
    }
}

impl From<&String> for Names {
    fn from(name: &String) -> Self {
        Names(vec![name.clone()])
    }
}

impl From<Vec<String>> for Names {
    fn from(names: Vec<String>) -> Self {
        Names(names)
    }
}

impl From<Vec<&str>> for Names {
    fn from(names: Vec<&str>) -> Self {
        Names(names.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Names {
    fn from(names: &[&str]) -> Self {
        Names(names.iter().map(|s| (*s).to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Names {
    fn from(names: [&str; N]) -> Self {
        Names(names.iter().map(|s| (*s).to_string()).collect())
    }
}
