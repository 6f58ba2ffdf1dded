/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::str::FromStr;

use super::MetricType;
use crate::error::MetricError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn parse(raw: &str, r#type: MetricType) -> Result<Self, MetricError> {
        match r#type {
            MetricType::Gauge => f64::from_str(raw)
                .map(MetricValue::Gauge)
                .map_err(|_| MetricError::ConvertingRawValue(raw.to_string())),
            MetricType::Counter => i64::from_str(raw)
                .map(MetricValue::Counter)
                .map_err(|_| MetricError::ConvertingRawValue(raw.to_string())),
        }
    }

    #[inline]
    pub fn r#type(&self) -> MetricType {
        match self {
            MetricValue::Gauge(_) => MetricType::Gauge,
            MetricValue::Counter(_) => MetricType::Counter,
        }
    }

    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            MetricValue::Gauge(f) => Some(*f),
            MetricValue::Counter(_) => None,
        }
    }

    pub fn as_counter(&self) -> Option<i64> {
        match self {
            MetricValue::Gauge(_) => None,
            MetricValue::Counter(i) => Some(*i),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Counter(i) => itoa::Buffer::new().format(*i).fmt(f),
            MetricValue::Gauge(v) => ryu::Buffer::new().format(*v).fmt(f),
        }
    }
}
