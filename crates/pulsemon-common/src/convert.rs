//! Conversions between the domain metric model and its protobuf wire form.

use crate::error::MetricsError;
use crate::metric::{Metric, MetricValue};
use crate::proto;

pub fn metric_to_proto(m: &Metric) -> proto::Metric {
    let mut out = proto::Metric {
        id: m.id.clone(),
        mtype: m.kind().to_string(),
        delta: 0,
        value: 0.0,
    };
    match m.value {
        MetricValue::Gauge(v) => out.value = v,
        MetricValue::Counter(d) => out.delta = d,
    }
    out
}

pub fn metric_from_proto(p: &proto::Metric) -> Result<Metric, MetricsError> {
    let kind: crate::metric::MetricKind = p.mtype.parse()?;
    let value = match kind {
        crate::metric::MetricKind::Gauge => MetricValue::Gauge(p.value),
        crate::metric::MetricKind::Counter => MetricValue::Counter(p.delta),
    };
    Ok(Metric {
        id: p.id.clone(),
        value,
    })
}

pub fn metrics_to_proto(metrics: &[Metric]) -> proto::Metrics {
    proto::Metrics {
        metrics: metrics.iter().map(metric_to_proto).collect(),
    }
}

pub fn metrics_from_proto(p: &proto::Metrics) -> Result<Vec<Metric>, MetricsError> {
    p.metrics.iter().map(metric_from_proto).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proto_round_trip() {
        let g = Metric::new_gauge("g", 2.5);
        let c = Metric::new_counter("c", -4);
        assert_eq!(metric_from_proto(&metric_to_proto(&g)).unwrap(), g);
        assert_eq!(metric_from_proto(&metric_to_proto(&c)).unwrap(), c);
    }

    #[test]
    fn proto_with_unknown_kind_is_bad_data() {
        let p = proto::Metric {
            id: "x".into(),
            mtype: "histogram".into(),
            delta: 0,
            value: 0.0,
        };
        assert!(metric_from_proto(&p).is_err());
    }
}
