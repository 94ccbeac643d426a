//! Minimal embedding example for netdiag-core
//!
//! This example wires a scripted in-process engine into the façade through
//! the engine registry, runs a ping, a port scan and a LAN scan, and issues
//! both one-shot queries. The application owns the whole lifecycle.

use async_trait::async_trait;
use netdiag_core::traits::{EngineEvent, ProbeEngine, ProbeEngineFactory, RawPayload, RawResult};
use netdiag_core::{
    EngineRegistry, NetDiagConfig, NetDiagnosis, PortSelection, ProbeEvent, ProbeKind, ProbeParams, Result,
    SdkLogLevel, SessionId,
};
use serde_json::json;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

/// Engine that replays canned results for every start command
struct ScriptedEngine {
    tx: mpsc::UnboundedSender<RawResult>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<RawResult>>>,
}

impl ScriptedEngine {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    fn script(session: SessionId, params: &ProbeParams) -> Vec<RawResult> {
        match params {
            ProbeParams::Ping { host, count } => (1..=*count)
                .map(|seq| {
                    let line = format!("64 bytes from {}: icmp_seq={} ttl=64 time=0.{} ms", host, seq, seq);
                    RawResult::new(session, EngineEvent::PingResult, json!({ "result": line, "isEnd": seq == *count }))
                })
                .collect(),
            ProbeParams::PortScan { ports, .. } => {
                let ports: Vec<u16> = match ports {
                    PortSelection::Range { begin, end } => (*begin..=*end).collect(),
                    PortSelection::List(list) => list.clone(),
                };
                ports
                    .into_iter()
                    .map(|port| {
                        RawResult::new(
                            session,
                            EngineEvent::PortScanResult,
                            json!({ "port": port, "isOpen": port == 443 }),
                        )
                    })
                    .collect()
            }
            ProbeParams::LanScan => vec![
                RawResult::new(session, EngineEvent::LanScanActiveIp, json!({ "ip": "192.168.1.1" })),
                RawResult::new(session, EngineEvent::LanScanProgress, json!({ "percent": "0.5" })),
                RawResult::new(session, EngineEvent::LanScanActiveIp, json!({ "ip": "192.168.1.42" })),
                RawResult::new(session, EngineEvent::LanScanProgress, json!({ "percent": 1.0 })),
                RawResult::new(session, EngineEvent::LanScanFinished, json!({})),
            ],
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl ProbeEngine for ScriptedEngine {
    async fn set_log_level(&self, level: SdkLogLevel) -> Result<()> {
        info!("[Scripted] SDK log level set to {:?}", level);
        Ok(())
    }

    fn sdk_version(&self) -> String {
        "scripted-0.1".to_string()
    }

    async fn start(&self, session: SessionId, params: &ProbeParams) -> Result<()> {
        let tx = self.tx.clone();
        let script = Self::script(session, params);
        tokio::spawn(async move {
            for record in script {
                tokio::time::sleep(Duration::from_millis(20)).await;
                if tx.send(record).is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    async fn stop(&self, kind: ProbeKind) -> Result<()> {
        info!("[Scripted] stop {}", kind);
        Ok(())
    }

    fn results(&self) -> Pin<Box<dyn Stream<Item = RawResult> + Send + 'static>> {
        let rx = self.rx.lock().unwrap_or_else(|e| e.into_inner()).take();
        match rx {
            Some(rx) => Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx)),
            None => Box::pin(tokio_stream::empty()),
        }
    }

    async fn lookup_domain(&self, domain: &str) -> Result<RawPayload> {
        if domain.ends_with(".invalid") {
            return Ok(json!({ "error": "resolution failed" }).into());
        }
        Ok(json!([{ "name": domain, "ip": "192.0.2.10" }]).into())
    }

    async fn network_info(&self) -> Result<RawPayload> {
        // Some engines hand over serialized text instead of structured data.
        let text = r#"{
            "deviceNetInfo": {
                "netType": "WIFI", "wifiSSID": "demo", "wifiBSSID": "02:00:00:00:00:01",
                "wifiIPV4": "192.168.1.20", "wifiNetmask": "255.255.255.0",
                "wifiIPV6": "", "cellIPV4": ""
            },
            "ipInfoModel": {
                "ip": "198.51.100.7", "city": "Springfield", "region": "North",
                "country": "XX", "location": "0,0", "org": "Example ISP"
            }
        }"#;
        Ok(RawPayload::Text(text.to_string()))
    }

    fn engine_name(&self) -> &'static str {
        "scripted"
    }
}

struct ScriptedEngineFactory;

impl ProbeEngineFactory for ScriptedEngineFactory {
    fn create(&self, _config: &NetDiagConfig) -> Result<Arc<dyn ProbeEngine>> {
        Ok(Arc::new(ScriptedEngine::new()))
    }
}

fn print_event(event: &ProbeEvent) {
    match event {
        ProbeEvent::Result { session, result } => println!("[Event] {} {:?}", session, result),
        ProbeEvent::Failed { session, kind, error, .. } => println!("[Event] {} {} failed: {}", session, kind, error),
    }
}

async fn wait_idle(client: &NetDiagnosis, kind: ProbeKind) {
    while client.is_active(kind) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    println!("=== Embedded netdiag-core Example ===\n");

    println!("1. Registering engine...");
    let registry = EngineRegistry::new();
    registry.register_engine("demo", Box::new(ScriptedEngineFactory));

    let config = NetDiagConfig::from_json(r#"{ "platform": "demo", "sdk": { "log_level": "debug" } }"#)?;
    let client = NetDiagnosis::from_registry(&registry, config)?;
    client.initialize().await?;
    println!("   SDK version: {}\n", client.sdk_version());

    println!("2. Ping (self-terminating)...");
    let ping = client.start_ping("192.0.2.1", 3, print_event).await?;
    wait_idle(&client, ProbeKind::Ping).await;
    drop(ping);

    println!("\n3. Port scan over 440..=443...");
    let scan = client
        .start_port_scan("192.0.2.1", PortSelection::Range { begin: 440, end: 443 }, print_event)
        .await?;
    wait_idle(&client, ProbeKind::PortScan).await;
    scan.unsubscribe();

    println!("\n4. LAN scan (ends on finished signal)...");
    let lan = client.start_lan_scan(print_event).await?;
    wait_idle(&client, ProbeKind::LanScan).await;
    drop(lan);

    println!("\n5. One-shot queries...");
    println!("   lookup: {:?}", client.lookup_domain("example.test").await?);
    match client.lookup_domain("nowhere.invalid").await {
        Ok(records) => println!("   lookup: {:?}", records),
        Err(e) => println!("   lookup failed: {}", e),
    }
    let info = client.get_network_info().await?;
    println!("   network: {} via {}", info.ip_info_model.ip, info.device_net_info.net_type);

    println!("\n6. Shutting down...");
    client.shutdown().await;

    println!("\n=== Embedding Successful ===");
    println!("Key Points:");
    println!("- The engine is a plug-in chosen by platform name");
    println!("- Sessions end on their own or on stop");
    println!("- Listeners are released by dropping their handle");

    Ok(())
}
