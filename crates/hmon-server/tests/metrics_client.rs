use hmon_server::metrics::{
    MetricRequest, MetricSample, MetricsBackend, MetricsError, VictoriaMetricsClient,
};
use mockito::{Matcher, Server, ServerGuard};
use std::time::Duration;

fn client(server: &ServerGuard) -> VictoriaMetricsClient {
    VictoriaMetricsClient::new(&server.url(), "host", Duration::from_secs(5))
        .expect("client should build")
}

fn request(window: Option<Duration>) -> MetricRequest {
    MetricRequest {
        metric: "cpu_percent".to_string(),
        scope: Some("web-01".to_string()),
        window,
    }
}

#[test]
fn selector_includes_scope_and_window() {
    let client = VictoriaMetricsClient::new("http://vm:8428/", "instance", Duration::from_secs(1))
        .unwrap();
    assert_eq!(
        client.selector(&request(Some(Duration::from_secs(300)))),
        r#"{__name__="cpu_percent",instance="web-01"}[300s]"#
    );

    let unscoped = MetricRequest {
        metric: "odd\"name".to_string(),
        scope: None,
        window: None,
    };
    assert_eq!(client.selector(&unscoped), r#"{__name__="odd\"name"}"#);
}

#[tokio::test]
async fn instant_query_returns_latest_value() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/query")
        .match_query(Matcher::UrlEncoded(
            "query".to_string(),
            r#"{__name__="cpu_percent",host="web-01"}"#.to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "status": "success",
                "data": {
                    "resultType": "vector",
                    "result": [{"metric": {"host": "web-01"}, "value": [1717243200.0, "95.5"]}]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let sample = client(&server).fetch(&request(None)).await.unwrap();
    assert_eq!(sample, MetricSample::Value(95.5));
    mock.assert_async().await;
}

#[tokio::test]
async fn range_query_returns_series() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v1/query")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "status": "success",
                "data": {
                    "resultType": "matrix",
                    "result": [{
                        "metric": {"host": "web-01"},
                        "values": [[1717243100.0, "70"], [1717243160.0, "80"], [1717243200.0, "90"]]
                    }]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let sample = client(&server)
        .fetch(&request(Some(Duration::from_secs(300))))
        .await
        .unwrap();
    assert_eq!(sample, MetricSample::Series(vec![70.0, 80.0, 90.0]));
}

#[tokio::test]
async fn empty_result_is_no_data() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v1/query")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#)
        .create_async()
        .await;

    let sample = client(&server).fetch(&request(None)).await.unwrap();
    assert_eq!(sample, MetricSample::NoData);
}

#[tokio::test]
async fn backend_errors_are_reported() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v1/query")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let err = client(&server).fetch(&request(None)).await.unwrap_err();
    assert!(matches!(err, MetricsError::Status(503)));
}

#[tokio::test]
async fn query_errors_are_reported() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v1/query")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#)
        .create_async()
        .await;

    let err = client(&server).fetch(&request(None)).await.unwrap_err();
    assert!(matches!(err, MetricsError::Query(ref msg) if msg == "parse error"));
}
