/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{ErrorList, MetricError};

mod value;
pub use value::MetricValue;

mod json;
pub use json::MetricJson;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricType {
    Gauge,
    Counter,
}

impl MetricType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
        }
    }

    /// Single character discriminator used in the dump file.
    pub const fn dump_tag(&self) -> char {
        match self {
            MetricType::Gauge => '0',
            MetricType::Counter => '1',
        }
    }

    pub fn from_dump_tag(tag: &str) -> Result<Self, MetricError> {
        match tag {
            "0" => Ok(MetricType::Gauge),
            "1" => Ok(MetricType::Counter),
            _ => Err(MetricError::UnknownMetricType(tag.to_string())),
        }
    }
}

impl FromStr for MetricType {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("gauge") {
            Ok(MetricType::Gauge)
        } else if s.eq_ignore_ascii_case("counter") {
            Ok(MetricType::Counter)
        } else {
            Err(MetricError::UnknownMetricType(s.to_string()))
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single named sample.
///
/// For gauges the value is the current value, for counters it is a delta
/// (or an already summed total, see [`Metric::create_summed_counter`]).
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    name: Arc<str>,
    value: MetricValue,
}

impl Metric {
    pub fn new(name: &str, raw_value: &str, r#type: MetricType) -> Result<Self, MetricError> {
        let value = MetricValue::parse(raw_value, r#type)?;
        Ok(Metric {
            name: Arc::from(name),
            value,
        })
    }

    /// Same as [`Metric::new`], with the type given as its text form.
    pub fn parse(name: &str, raw_value: &str, r#type: &str) -> Result<Self, MetricError> {
        let r#type = MetricType::from_str(r#type)?;
        Metric::new(name, raw_value, r#type)
    }

    pub fn gauge(name: &str, value: f64) -> Self {
        Metric {
            name: Arc::from(name),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn counter(name: &str, delta: i64) -> Self {
        Metric {
            name: Arc::from(name),
            value: MetricValue::Counter(delta),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn r#type(&self) -> MetricType {
        self.value.r#type()
    }

    #[inline]
    pub fn value(&self) -> MetricValue {
        self.value
    }

    /// Canonical text form of the value.
    pub fn value_string(&self) -> String {
        self.value.to_string()
    }

    pub fn add_delta(&mut self, delta: i64) -> Result<(), MetricError> {
        match &mut self.value {
            MetricValue::Counter(v) => {
                *v = v
                    .checked_add(delta)
                    .ok_or_else(|| MetricError::Overflow(self.name.to_string()))?;
                Ok(())
            }
            MetricValue::Gauge(_) => Err(MetricError::TypeMismatch {
                expected: MetricType::Counter,
                actual: MetricType::Gauge,
            }),
        }
    }

    pub fn set_gauge(&mut self, value: f64) -> Result<(), MetricError> {
        match &mut self.value {
            MetricValue::Gauge(v) => {
                *v = value;
                Ok(())
            }
            MetricValue::Counter(_) => Err(MetricError::TypeMismatch {
                expected: MetricType::Gauge,
                actual: MetricType::Counter,
            }),
        }
    }

    /// Sum all counter samples into one metric named `name`.
    ///
    /// Every sample that is not a counter is reported, and the whole
    /// reduction fails if there is any.
    pub fn create_summed_counter<'a, I>(name: &str, samples: I) -> Result<Metric, MetricError>
    where
        I: IntoIterator<Item = &'a Metric>,
    {
        let mut summed = Metric::counter(name, 0);
        let mut errors = Vec::new();
        for sample in samples {
            match sample.value {
                MetricValue::Counter(delta) => summed.add_delta(delta)?,
                MetricValue::Gauge(_) => errors.push(MetricError::TypeMismatch {
                    expected: MetricType::Counter,
                    actual: MetricType::Gauge,
                }),
            }
        }

        match errors.len() {
            0 => Ok(summed),
            1 => Err(errors.remove(0)),
            _ => Err(MetricError::Multiple(ErrorList(errors))),
        }
    }
}

/// Reduce raw samples to one metric per name, keeping first-seen name order.
///
/// Gauges keep the last sample, counters are summed.
pub fn reduce_metrics(samples: Vec<Metric>) -> Result<Vec<Metric>, MetricError> {
    let mut gauges: IndexMap<Arc<str>, Metric> = IndexMap::new();
    let mut counters: IndexMap<Arc<str>, Vec<Metric>> = IndexMap::new();

    for m in samples {
        match m.value {
            MetricValue::Gauge(_) => {
                gauges.insert(m.name.clone(), m);
            }
            MetricValue::Counter(_) => counters.entry(m.name.clone()).or_default().push(m),
        }
    }

    let mut reduced = Vec::with_capacity(gauges.len() + counters.len());
    reduced.extend(gauges.into_values());
    for (name, samples) in counters {
        reduced.push(Metric::create_summed_counter(&name, &samples)?);
    }
    Ok(reduced)
}
