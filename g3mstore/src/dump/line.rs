/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use indexmap::IndexMap;

use crate::error::{MetricError, StoreError};
use crate::types::{Metric, MetricType};

const FIELD_SEPARATOR: char = ';';

/// Append one `<tag>;<name>;<value>` line.
pub(super) fn push_line(buf: &mut String, metric: &Metric) {
    buf.push(metric.r#type().dump_tag());
    buf.push(FIELD_SEPARATOR);
    buf.push_str(metric.name());
    buf.push(FIELD_SEPARATOR);
    buf.push_str(&metric.value_string());
    buf.push('\n');
}

pub(super) fn encode_all<'a, I>(metrics: I) -> String
where
    I: IntoIterator<Item = &'a Metric>,
{
    let mut buf = String::new();
    for m in metrics {
        push_line(&mut buf, m);
    }
    buf
}

fn parse_line(line_no: usize, line: &str) -> Result<Metric, StoreError> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    let [tag, name, value] = fields.as_slice() else {
        return Err(StoreError::WrongDumpedLine {
            line_no,
            line: line.to_string(),
        });
    };
    if name.is_empty() {
        return Err(MetricError::EmptyName.into());
    }
    let r#type = MetricType::from_dump_tag(tag)?;
    let metric = Metric::new(name, value, r#type)?;
    Ok(metric)
}

/// Replay content of a dump file.
#[derive(Default)]
pub(super) struct ParsedDump {
    /// Latest value per name.
    pub(super) gauges: IndexMap<String, Metric>,
    /// Every counter line in file order.
    pub(super) counters: Vec<Metric>,
    pub(super) errors: Vec<StoreError>,
}

impl ParsedDump {
    pub(super) fn into_metrics(self) -> (Vec<Metric>, Vec<StoreError>) {
        let mut metrics = Vec::with_capacity(self.gauges.len() + self.counters.len());
        metrics.extend(self.gauges.into_values());
        metrics.extend(self.counters);
        (metrics, self.errors)
    }
}

pub(super) fn parse_dump(content: &str) -> ParsedDump {
    let mut parsed = ParsedDump::default();

    for (i, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        match parse_line(i + 1, line) {
            Ok(m) => match m.r#type() {
                MetricType::Gauge => {
                    parsed.gauges.insert(m.name().to_string(), m);
                }
                MetricType::Counter => parsed.counters.push(m),
            },
            Err(e) => parsed.errors.push(e),
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode() {
        let s = encode_all(&[Metric::gauge("temp", 13.0), Metric::counter("hits", -6)]);
        assert_eq!(s, "0;temp;13.0\n1;hits;-6\n");
    }

    #[test]
    fn gauge_last_wins_counter_replayed() {
        let parsed = parse_dump("0;temp;1.5\n1;hits;1\n0;temp;2.5\n1;hits;2\n0;load;0.1\n");
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.gauges.len(), 2);
        assert_eq!(parsed.gauges["temp"], Metric::gauge("temp", 2.5));
        assert_eq!(
            parsed.counters,
            vec![Metric::counter("hits", 1), Metric::counter("hits", 2)]
        );

        let (metrics, errors) = parsed.into_metrics();
        assert!(errors.is_empty());
        assert_eq!(
            metrics,
            vec![
                Metric::gauge("temp", 2.5),
                Metric::gauge("load", 0.1),
                Metric::counter("hits", 1),
                Metric::counter("hits", 2)
            ]
        );
    }

    #[test]
    fn malformed_lines_skipped() {
        let parsed =
            parse_dump("0;temp\n1;hits;3\n1;a;b;4\n\n2;x;1\n1;hits;abc\r\n1;hits;4\r\n0;;1\n");
        assert_eq!(
            parsed.counters,
            vec![Metric::counter("hits", 3), Metric::counter("hits", 4)]
        );
        assert_eq!(parsed.errors.len(), 5);
        assert!(matches!(
            parsed.errors[0],
            StoreError::WrongDumpedLine { line_no: 1, .. }
        ));
        assert!(matches!(
            parsed.errors[1],
            StoreError::WrongDumpedLine { line_no: 3, .. }
        ));
        assert!(matches!(parsed.errors[2], StoreError::Metric(_)));
        assert!(matches!(parsed.errors[3], StoreError::Metric(_)));
        assert!(matches!(
            parsed.errors[4],
            StoreError::Metric(MetricError::EmptyName)
        ));
    }

    #[test]
    fn empty() {
        let parsed = parse_dump("");
        assert!(parsed.gauges.is_empty());
        assert!(parsed.counters.is_empty());
        assert!(parsed.errors.is_empty());
    }
}
