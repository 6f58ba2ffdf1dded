/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Metric, MetricType, MetricValue};
use crate::error::MetricError;

/// Structured form of a metric, as exchanged with remote agents.
///
/// Exactly one of `delta` (counter) and `value` (gauge) is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricJson {
    pub id: String,
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl From<&Metric> for MetricJson {
    fn from(m: &Metric) -> Self {
        let (delta, value) = match m.value() {
            MetricValue::Gauge(f) => (None, Some(f)),
            MetricValue::Counter(i) => (Some(i), None),
        };
        MetricJson {
            id: m.name().to_string(),
            r#type: m.r#type().as_str().to_string(),
            delta,
            value,
        }
    }
}

impl TryFrom<MetricJson> for Metric {
    type Error = MetricError;

    fn try_from(j: MetricJson) -> Result<Self, Self::Error> {
        match MetricType::from_str(&j.r#type)? {
            MetricType::Gauge => match j.value {
                Some(f) => Ok(Metric::gauge(&j.id, f)),
                None => Err(MetricError::ConvertingRawValue(format!(
                    "no value for gauge {}",
                    j.id
                ))),
            },
            MetricType::Counter => match j.delta {
                Some(i) => Ok(Metric::counter(&j.id, i)),
                None => Err(MetricError::ConvertingRawValue(format!(
                    "no delta for counter {}",
                    j.id
                ))),
            },
        }
    }
}

impl Metric {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(MetricJson::from(self)).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_json_batch(data: &[u8]) -> Result<Vec<Metric>, MetricError> {
        let list: Vec<MetricJson> = serde_json::from_slice(data)
            .map_err(|e| MetricError::ConvertingRawValue(format!("invalid json batch: {e}")))?;
        list.into_iter().map(Metric::try_from).collect()
    }
}
