mod common;

use common::{build_test_context, test_keypair, TestOptions};
use prost::Message;
use pulsemon_codec::pipeline::{encryption_stage, signature_stage, Pipeline};
use pulsemon_common::headers;
use pulsemon_common::proto;
use pulsemon_common::proto::metrics_service_server::MetricsService as MetricsServiceTrait;
use pulsemon_server::grpc::GrpcMetricsService;
use tonic::metadata::MetadataValue;
use tonic::{Code, Request};

fn update_request(
    metric: proto::Metric,
    pipeline: Option<&Pipeline>,
    real_ip: Option<&str>,
) -> Request<proto::MetricUpdateRequest> {
    let mut data = metric.encode_to_vec();
    let mut signature = None;
    if let Some(pipeline) = pipeline {
        let ctx = pipeline.run(&mut data).expect("pipeline should run");
        signature = ctx.get(headers::SIGNATURE).map(str::to_string);
    }

    let mut req = Request::new(proto::MetricUpdateRequest { data });
    if let Some(signature) = signature {
        let value: MetadataValue<_> = signature.parse().expect("signature should parse");
        req.metadata_mut().insert(headers::SIGNATURE_META, value);
    }
    if let Some(ip) = real_ip {
        let value: MetadataValue<_> = ip.parse().expect("ip should parse");
        req.metadata_mut().insert(headers::REAL_IP_META, value);
    }
    req
}

fn counter(id: &str, delta: i64) -> proto::Metric {
    proto::Metric {
        id: id.to_string(),
        mtype: "counter".to_string(),
        delta,
        value: 0.0,
    }
}

#[tokio::test]
async fn update_and_get_round_trip() {
    let ctx = build_test_context(TestOptions::default());
    let service = GrpcMetricsService::new(ctx.state.clone());

    let resp = service
        .update_metric(update_request(counter("foo", 3), None, None))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(resp.delta, 3);

    let resp = service
        .update_metric(update_request(counter("foo", 4), None, None))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(resp.delta, 7);

    let got = service
        .get_metric(Request::new(proto::MetricRequest {
            id: "foo".to_string(),
            mtype: "counter".to_string(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(got.delta, 7);
    assert_eq!(got.mtype, "counter");
}

#[tokio::test]
async fn unknown_metric_maps_to_not_found() {
    let ctx = build_test_context(TestOptions::default());
    let service = GrpcMetricsService::new(ctx.state.clone());

    let err = service
        .get_metric(Request::new(proto::MetricRequest {
            id: "missing".to_string(),
            mtype: "gauge".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);
}

#[tokio::test]
async fn invalid_kind_maps_to_invalid_argument() {
    let ctx = build_test_context(TestOptions::default());
    let service = GrpcMetricsService::new(ctx.state.clone());

    let bad = proto::Metric {
        id: "x".to_string(),
        mtype: "histogram".to_string(),
        delta: 1,
        value: 0.0,
    };
    let err = service
        .update_metric(update_request(bad, None, None))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn bulk_update_returns_post_write_snapshot() {
    let ctx = build_test_context(TestOptions::default());
    let service = GrpcMetricsService::new(ctx.state.clone());

    let batch = proto::Metrics {
        metrics: vec![
            counter("a", 1),
            proto::Metric {
                id: "b".to_string(),
                mtype: "gauge".to_string(),
                delta: 0,
                value: 2.0,
            },
        ],
    };

    for expected_delta in [1, 2] {
        let req = Request::new(proto::MetricsUpdateRequest {
            data: batch.encode_to_vec(),
        });
        let resp = service.update_metrics(req).await.unwrap().into_inner();
        assert_eq!(resp.metrics[0].delta, expected_delta);
        assert_eq!(resp.metrics[1].value, 2.0);
    }

    let all = service
        .get_all_metrics(Request::new(proto::Empty {}))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(all.metrics.len(), 2);
}

#[tokio::test]
async fn subnet_filter_rejects_outside_metadata_address() {
    let ctx = build_test_context(TestOptions {
        trusted_subnet: Some("192.168.0.0/16".to_string()),
        ..TestOptions::default()
    });
    let service = GrpcMetricsService::new(ctx.state.clone());

    let err = service
        .update_metric(update_request(counter("foo", 1), None, Some("10.0.0.1")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::PermissionDenied);

    let err = service
        .update_metric(update_request(counter("foo", 1), None, None))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::PermissionDenied);

    let resp = service
        .update_metric(update_request(counter("foo", 1), None, Some("192.168.1.7")))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(resp.delta, 1);
}

#[tokio::test]
async fn signed_encrypted_payload_round_trips() {
    let secret = "grpc-secret".to_string();
    let (private, public) = test_keypair();
    let ctx = build_test_context(TestOptions {
        secret_key: Some(secret.clone()),
        private_key: Some(private),
        ..TestOptions::default()
    });
    let service = GrpcMetricsService::new(ctx.state.clone());

    let mut pipeline = Pipeline::default();
    pipeline.push(signature_stage(secret.into_bytes()));
    pipeline.push(encryption_stage(public));

    let resp = service
        .update_metric(update_request(counter("secure", 11), Some(&pipeline), None))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(resp.delta, 11);
}

#[tokio::test]
async fn tampered_signed_payload_is_rejected() {
    let secret = "grpc-secret".to_string();
    let ctx = build_test_context(TestOptions {
        secret_key: Some(secret.clone()),
        ..TestOptions::default()
    });
    let service = GrpcMetricsService::new(ctx.state.clone());

    let mut data = counter("x", 1).encode_to_vec();
    let signature = pulsemon_codec::sign::sign_data(&data, secret.as_bytes());
    data[0] ^= 0x01;

    let mut req = Request::new(proto::MetricUpdateRequest { data });
    let value: MetadataValue<_> = signature.parse().unwrap();
    req.metadata_mut().insert(headers::SIGNATURE_META, value);

    let err = service.update_metric(req).await.unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}
