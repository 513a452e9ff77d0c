//! Correlation against a live ping server

use std::time::Duration;

use klaatu_common::PingServerConfig;
use klaatu_correlator::{
    Correlation, CorrelationError, Correlator, EventMatcher, NoReevaluate, PingClient,
};
use klaatu_ping_server::PingServer;
use serde_json::json;

fn ephemeral() -> PingServerConfig {
    PingServerConfig {
        listen: "127.0.0.1:0".to_string(),
        ..Default::default()
    }
}

fn client(base_url: &str) -> PingClient {
    PingClient::new(base_url, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn enrollment_posted_mid_wait_is_observed() {
    let server = PingServer::new(ephemeral()).spawn().await.unwrap();
    let correlator = Correlator::new(client(&server.base_url()), Duration::from_millis(100));

    let poster = client(&server.base_url());
    let on_miss = move || {
        let poster = poster.clone();
        async move {
            // stands in for the browser re-fetching recipes and enrolling
            poster
                .submit(&json!({
                    "events": [{
                        "category": "nimbus_events",
                        "name": "enrollment",
                        "extra": {"experiment": "exp1", "branch": "treatment"}
                    }]
                }))
                .await?;
            Ok::<(), anyhow::Error>(())
        }
    };

    let matcher = EventMatcher::experiment("exp1").branch("treatment").enrollment();
    let outcome = correlator
        .await_event_within(&matcher, Duration::from_secs(10), &on_miss)
        .await
        .unwrap();

    let matched = outcome.into_match(matcher.describe_target()).unwrap();
    assert_eq!(matched.record.name.as_deref(), Some("enrollment"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn session_lengths_round_trip() {
    let server = PingServer::new(ephemeral()).spawn().await.unwrap();
    let client = client(&server.base_url());

    client
        .submit(&json!({
            "type": "main",
            "environment": {"experiments": {"exp1": {"branch": "control"}}},
            "payload": {"info": {"subsessionLength": 42, "sessionLength": 99}}
        }))
        .await
        .unwrap();

    let pings = client.list().await.unwrap();
    let info = pings[0].session_info().unwrap();
    assert_eq!(info.subsession_length, Some(42));
    assert_eq!(info.session_length, Some(99));

    let correlator = Correlator::new(client.clone(), Duration::from_millis(100));
    let outcome = correlator
        .await_event_within(&EventMatcher::experiment("exp1").branch("control"), Duration::from_secs(5), &NoReevaluate)
        .await
        .unwrap();
    assert!(outcome.is_match());

    client.clear().await.unwrap();
    assert!(client.list().await.unwrap().is_empty());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn absent_event_times_out_as_a_normal_outcome() {
    let server = PingServer::new(ephemeral()).spawn().await.unwrap();
    let correlator = Correlator::new(client(&server.base_url()), Duration::from_millis(100));

    let outcome = correlator
        .await_event_within(
            &EventMatcher::experiment("exp1").unenrollment(),
            Duration::from_millis(500),
            &NoReevaluate,
        )
        .await
        .unwrap();

    match outcome {
        Correlation::NotFound { attempts, waited } => {
            assert!(attempts >= 2);
            assert!(waited >= Duration::from_millis(500));
        }
        other => panic!("expected timeout, got {:?}", other),
    }

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn unreachable_store_is_an_infrastructure_error() {
    let server = PingServer::new(ephemeral()).spawn().await.unwrap();
    let base_url = server.base_url();
    server.shutdown().await.unwrap();

    let correlator = Correlator::new(client(&base_url), Duration::from_millis(100));
    let err = correlator
        .await_event_within(&EventMatcher::experiment("exp1"), Duration::from_secs(5), &NoReevaluate)
        .await
        .unwrap_err();

    assert!(err.is_infrastructure());
    assert!(matches!(err, CorrelationError::Transport { .. }));
}
