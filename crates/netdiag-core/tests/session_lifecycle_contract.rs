//! Contract Test: Session Lifecycle
//!
//! Constraints verified:
//! - Self-terminating probes return to Idle after their terminal event
//! - The terminal event is the last event a session delivers
//! - A second start supersedes the running session of the same kind
//! - Stop on an Idle kind is a no-op
//! - Unbounded probes stay Running until stopped or finished
//! - Kinds never interfere with each other

mod common;

use common::*;
use netdiag_core::config::SessionConfig;
use netdiag_core::traits::EngineEvent;
use netdiag_core::{
    DecodedResult, Error, NetDiagConfig, PortSelection, ProbeEvent, ProbeKind, RestartPolicy, SdkLogLevel,
    SessionState,
};
use serde_json::json;
use std::time::Duration;

fn ping_line(text: &str, is_end: bool) -> serde_json::Value {
    json!({ "result": text, "isEnd": is_end })
}

#[tokio::test]
async fn ping_delivers_sequence_then_goes_idle() {
    let engine = ControlledEngine::new(EngineBehavior::default());
    let client = client_with(&engine, NetDiagConfig::default());
    let (listener, mut events) = collector();

    let _sub = client.start_ping("10.0.0.1", 4, listener).await.unwrap();
    assert!(client.is_pinging());
    let session = engine.last_session(ProbeKind::Ping);

    let ends = [false, false, false, true];
    for (seq, is_end) in ends.iter().enumerate() {
        engine.emit(session, EngineEvent::PingResult, ping_line(&format!("icmp_seq={}", seq), *is_end));
    }

    for (seq, is_end) in ends.iter().enumerate() {
        match next_event(&mut events).await {
            ProbeEvent::Result {
                result: DecodedResult::Ping(ping),
                session: got,
            } => {
                assert_eq!(got, session);
                assert_eq!(ping.text, format!("icmp_seq={}", seq));
                assert_eq!(ping.is_end, *is_end);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    assert!(!client.is_pinging());
    assert_eq!(client.session_state(ProbeKind::Ping), SessionState::Idle);

    // Anything the engine still sends for the finished session is dropped.
    engine.emit(session, EngineEvent::PingResult, ping_line("late", true));
    assert_quiet(&mut events, Duration::from_millis(50)).await;

    client.shutdown().await;
}

#[tokio::test]
async fn listener_sees_idle_when_terminal_event_arrives() {
    let engine = ControlledEngine::new(EngineBehavior::default());
    let client = std::sync::Arc::new(client_with(&engine, NetDiagConfig::default()));
    let (tx, mut seen) = tokio::sync::mpsc::unbounded_channel();

    let observer = std::sync::Arc::clone(&client);
    let _sub = client
        .start_tcp_ping("10.0.0.1", Some(443), Some(1), move |event: &ProbeEvent| {
            let _ = tx.send((event.is_terminal(), observer.is_tcp_pinging()));
        })
        .await
        .unwrap();

    let session = engine.last_session(ProbeKind::TcpPing);
    engine.emit(session, EngineEvent::TcpPingResult, json!({ "result": "connected", "isEnd": true }));

    let (terminal, active) = tokio::time::timeout(EVENT_TIMEOUT, seen.recv()).await.unwrap().unwrap();
    assert!(terminal);
    assert!(!active);
}

#[tokio::test]
async fn stop_on_idle_is_noop() {
    let engine = ControlledEngine::new(EngineBehavior::default());
    let client = client_with(&engine, NetDiagConfig::default());

    client.stop_port_scan().await;
    client.stop(ProbeKind::LanScan).await;

    assert!(!client.is_port_scanning());
    assert!(engine.stops().is_empty(), "no engine command for an idle kind");
}

#[tokio::test]
async fn second_start_supersedes_previous_session() {
    let engine = ControlledEngine::new(EngineBehavior::default());
    let client = client_with(&engine, NetDiagConfig::default());

    let (first_listener, mut first_events) = collector();
    let _first = client.start_traceroute("10.0.0.1", first_listener).await.unwrap();
    let old = engine.last_session(ProbeKind::Traceroute);

    let (second_listener, mut second_events) = collector();
    let _second = client.start_traceroute("10.0.0.2", second_listener).await.unwrap();
    let new = engine.last_session(ProbeKind::Traceroute);

    assert_ne!(old, new);
    assert_eq!(engine.stops(), vec![ProbeKind::Traceroute]);

    let hop = |dest: &str, is_end: bool| json!({ "result": "1 hop", "destIp": dest, "isEnd": is_end });
    engine.emit(old, EngineEvent::TracerouteResult, hop("10.0.0.1", true));
    engine.emit(new, EngineEvent::TracerouteResult, hop("10.0.0.2", false));

    // Both listeners are subscribed to the kind; neither sees the old session.
    for events in [&mut first_events, &mut second_events] {
        let event = next_event(events).await;
        assert_eq!(event.session(), new);
    }
    assert!(client.is_tracerouting());
}

#[tokio::test]
async fn reject_policy_keeps_running_session() {
    let engine = ControlledEngine::new(EngineBehavior::default());
    let config = NetDiagConfig {
        session: SessionConfig {
            restart_policy: RestartPolicy::Reject,
            ..Default::default()
        },
        ..Default::default()
    };
    let client = client_with(&engine, config);

    let (listener, _events) = collector();
    let _sub = client.start_lan_scan(listener).await.unwrap();

    let (listener, mut rejected_events) = collector();
    let err = client.start_lan_scan(listener).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert!(client.is_lan_scanning());
    assert_eq!(engine.starts().len(), 1);

    // The refused listener was never attached to the running session.
    let running = engine.last_session(ProbeKind::LanScan);
    engine.emit(running, EngineEvent::LanScanActiveIp, json!({ "ip": "192.168.1.7" }));
    assert_quiet(&mut rejected_events, Duration::from_millis(50)).await;
}

#[test]
fn supported_client_requires_a_runtime() {
    let engine: std::sync::Arc<dyn netdiag_core::ProbeEngine> = ControlledEngine::new(EngineBehavior::default());
    let gate = netdiag_core::PlatformGate::supported("test", engine);

    let err = netdiag_core::NetDiagnosis::new(gate, NetDiagConfig::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn udp_traceroute_runs_until_stopped() {
    let engine = ControlledEngine::new(EngineBehavior::default());
    let client = client_with(&engine, NetDiagConfig::default());
    let (listener, mut events) = collector();

    let _sub = client.start_udp_traceroute("10.0.0.1", None, listener).await.unwrap();
    let session = engine.last_session(ProbeKind::UdpTraceroute);
    match &engine.starts()[0].1 {
        netdiag_core::ProbeParams::UdpTraceroute { max_ttl, .. } => assert_eq!(*max_ttl, 30),
        other => panic!("unexpected params: {:?}", other),
    }

    for hop in 1..=5 {
        engine.emit(session, EngineEvent::UdpTracerouteResult, json!({ "result": format!("{} hop", hop) }));
    }
    for _ in 1..=5 {
        assert!(!next_event(&mut events).await.is_terminal());
    }
    assert!(client.is_udp_tracerouting());

    client.stop_udp_traceroute().await;
    assert!(!client.is_udp_tracerouting());
    assert_eq!(engine.stops(), vec![ProbeKind::UdpTraceroute]);

    engine.emit(session, EngineEvent::UdpTracerouteResult, json!({ "result": "after stop" }));
    assert_quiet(&mut events, Duration::from_millis(50)).await;
}

#[tokio::test]
async fn stop_completes_after_grace_period_without_ack() {
    let engine = ControlledEngine::new(EngineBehavior {
        hang_on_stop: true,
        ..Default::default()
    });
    let config = NetDiagConfig {
        session: SessionConfig {
            stop_grace_period_ms: 30,
            ..Default::default()
        },
        ..Default::default()
    };
    let client = client_with(&engine, config);

    let (listener, _events) = collector();
    let _sub = client.start_lan_scan(listener).await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), client.stop_lan_scan())
        .await
        .expect("stop returns once the grace period elapses");
    assert!(!client.is_lan_scanning());
}

#[tokio::test]
async fn lan_scan_finished_returns_to_idle() {
    let engine = ControlledEngine::new(EngineBehavior::default());
    let client = client_with(&engine, NetDiagConfig::default());
    let (listener, mut events) = collector();

    let _sub = client.start_lan_scan(listener).await.unwrap();
    let session = engine.last_session(ProbeKind::LanScan);

    engine.emit(session, EngineEvent::LanScanActiveIp, json!({ "ip": "192.168.1.20" }));
    engine.emit(session, EngineEvent::LanScanProgress, json!({ "percent": 0.5 }));
    engine.emit(session, EngineEvent::LanScanProgress, json!({ "percent": 1.7 }));
    engine.emit(session, EngineEvent::LanScanFinished, json!({}));

    assert!(matches!(
        next_event(&mut events).await.result(),
        Some(DecodedResult::LanScanActiveIp(_))
    ));
    assert!(matches!(
        next_event(&mut events).await.result(),
        Some(DecodedResult::LanScanProgress(p)) if p.percent == 0.5
    ));

    // Out-of-range progress is reported, and does not end the scan.
    let failed = next_event(&mut events).await;
    assert!(matches!(failed, ProbeEvent::Failed { kind: ProbeKind::LanScan, .. }));
    assert!(!failed.is_terminal());

    let finished = next_event(&mut events).await;
    assert!(matches!(finished.result(), Some(DecodedResult::LanScanFinished)));
    assert!(!client.is_lan_scanning());
}

#[tokio::test]
async fn port_scan_ends_after_every_port_reported() {
    let engine = ControlledEngine::new(EngineBehavior::default());
    let client = client_with(&engine, NetDiagConfig::default());
    let (listener, mut events) = collector();

    let _sub = client
        .start_port_scan("10.0.0.1", PortSelection::Range { begin: 20, end: 22 }, listener)
        .await
        .unwrap();
    let session = engine.last_session(ProbeKind::PortScan);

    engine.emit(session, EngineEvent::PortScanResult, json!({ "port": 20, "isOpen": false }));
    engine.emit(
        session,
        EngineEvent::PortScanResult,
        json!({ "port": "21", "isOpen": false, "error": "connection refused" }),
    );
    engine.emit(session, EngineEvent::PortScanResult, json!({ "port": 22, "isOpen": true }));

    let mut terminal = Vec::new();
    for _ in 0..3 {
        let event = next_event(&mut events).await;
        if let Some(DecodedResult::PortScan(port)) = event.result()
            && port.port == 21
        {
            assert_eq!(port.error.as_deref(), Some("connection refused"));
        }
        terminal.push(event.is_terminal());
    }

    assert_eq!(terminal, vec![false, false, true]);
    assert!(!client.is_port_scanning());
}

#[tokio::test]
async fn malformed_final_record_is_terminal_failure() {
    let engine = ControlledEngine::new(EngineBehavior::default());
    let client = client_with(&engine, NetDiagConfig::default());
    let (listener, mut events) = collector();

    let _sub = client.start_ping("10.0.0.1", 2, listener).await.unwrap();
    let session = engine.last_session(ProbeKind::Ping);

    engine.emit(session, EngineEvent::PingResult, ping_line("a", false));
    engine.emit(session, EngineEvent::PingResult, json!({ "isEnd": true }));

    assert!(!next_event(&mut events).await.is_terminal());
    let last = next_event(&mut events).await;
    assert!(matches!(last, ProbeEvent::Failed { kind: ProbeKind::Ping, .. }));
    assert!(last.is_terminal());
    assert!(!client.is_pinging());

    engine.emit(session, EngineEvent::PingResult, ping_line("late", true));
    assert_quiet(&mut events, Duration::from_millis(50)).await;
}

#[tokio::test]
async fn malformed_port_record_counts_toward_scan_end() {
    let engine = ControlledEngine::new(EngineBehavior::default());
    let client = client_with(&engine, NetDiagConfig::default());
    let (listener, mut events) = collector();

    let _sub = client
        .start_port_scan("10.0.0.1", PortSelection::List(vec![22, 80]), listener)
        .await
        .unwrap();
    let session = engine.last_session(ProbeKind::PortScan);

    engine.emit(session, EngineEvent::PortScanResult, json!({ "port": "x" }));
    engine.emit(session, EngineEvent::PortScanResult, json!({ "port": 80, "isOpen": false }));

    let first = next_event(&mut events).await;
    assert!(matches!(first, ProbeEvent::Failed { .. }));
    assert!(!first.is_terminal());

    let last = next_event(&mut events).await;
    assert!(matches!(last.result(), Some(DecodedResult::PortScan(p)) if p.is_end));
    assert!(!client.is_port_scanning());
}

#[tokio::test]
async fn kinds_run_independently() {
    let engine = ControlledEngine::new(EngineBehavior::default());
    let client = client_with(&engine, NetDiagConfig::default());

    let (ping_listener, mut ping_events) = collector();
    let (udp_listener, mut udp_events) = collector();
    let _ping = client.start_ping("10.0.0.1", 2, ping_listener).await.unwrap();
    let _udp = client.start_udp_traceroute("10.0.0.1", Some(8), udp_listener).await.unwrap();

    client.stop_udp_traceroute().await;
    assert!(client.is_pinging());

    let ping = engine.last_session(ProbeKind::Ping);
    engine.emit(ping, EngineEvent::PingResult, ping_line("reply", false));

    assert_eq!(next_event(&mut ping_events).await.kind(), ProbeKind::Ping);
    assert_quiet(&mut udp_events, Duration::from_millis(50)).await;
}

#[tokio::test]
async fn invalid_parameters_issue_no_engine_command() {
    let engine = ControlledEngine::new(EngineBehavior::default());
    let client = client_with(&engine, NetDiagConfig::default());

    let (listener, _events) = collector();
    let err = client
        .start_port_scan("10.0.0.1", PortSelection::Range { begin: 90, end: 80 }, listener)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let (listener, _events) = collector();
    assert!(client.start_ping(" ", 4, listener).await.is_err());

    assert!(engine.starts().is_empty());
    assert!(!client.is_port_scanning());
}

#[tokio::test]
async fn refused_start_releases_listener() {
    let engine = ControlledEngine::new(EngineBehavior {
        refuse_start: true,
        ..Default::default()
    });
    let client = client_with(&engine, NetDiagConfig::default());

    let (listener, _events) = collector();
    let err = client.start_ping("10.0.0.1", 4, listener).await.unwrap_err();

    assert!(matches!(err, Error::Engine { .. }));
    assert!(!client.is_pinging());
}

#[tokio::test]
async fn shutdown_stops_running_sessions() {
    let engine = ControlledEngine::new(EngineBehavior::default());
    let client = client_with(&engine, NetDiagConfig::default());

    let (listener, _events) = collector();
    let _sub = client.start_lan_scan(listener).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), client.shutdown())
        .await
        .expect("shutdown completes");

    assert_eq!(engine.stops(), vec![ProbeKind::LanScan]);
}

#[tokio::test]
async fn initialize_passes_sdk_settings_through() {
    let engine = ControlledEngine::new(EngineBehavior::default());
    let config = NetDiagConfig::from_json(r#"{ "sdk": { "log_level": "warn" } }"#).unwrap();
    let client = client_with(&engine, config);

    client.initialize().await.unwrap();
    client.set_log_level(SdkLogLevel::Debug).await.unwrap();

    assert_eq!(engine.initialize_call_count(), 1);
    assert_eq!(engine.log_levels(), vec![SdkLogLevel::Warn, SdkLogLevel::Debug]);
    assert_eq!(client.sdk_version(), "controlled-1.0");
}
