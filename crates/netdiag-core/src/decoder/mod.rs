//! Result decoder
//!
//! Turns raw engine records into typed results and isolates every parsing
//! failure into a [`DecodeError`]. The decoder is stateless; it never logs and
//! never panics on engine input.
//!
//! ## Reserved error field
//!
//! Engines report failures by embedding an `error` string in an otherwise
//! regular payload. For one-shot queries and for every stream except port
//! scans this becomes [`DecodeError::EngineSignaled`]. Port scan results carry
//! a per-port `error` as part of their data instead.

use serde_json::{Map, Value};
use std::net::IpAddr;

use crate::error::DecodeError;
use crate::probe::{
    DecodedResult, LanScanActiveIp, LanScanProgress, LookupRecord, NetworkInfo, PingResult,
    PortScanResult, TcpPingResult, TracerouteResult, UdpTracerouteResult,
};
use crate::traits::{EngineEvent, RawPayload, RawResult};

/// Name of the field engines use to signal failure
pub const ERROR_FIELD: &str = "error";

const LOOKUP: &str = "lookupDomain";
const NETWORK_INFO: &str = "getNetworkInfo";

/// Decode one streamed raw record
pub fn decode(raw: &RawResult) -> Result<DecodedResult, DecodeError> {
    let what = raw.event.name();

    // The finished signal has no payload worth parsing.
    if raw.event == EngineEvent::LanScanFinished {
        return Ok(DecodedResult::LanScanFinished);
    }

    let value = parse(&raw.payload, what)?;
    if raw.event != EngineEvent::PortScanResult {
        check_engine_error(&value)?;
    }
    let obj = as_object(&value, what)?;

    let result = match raw.event {
        EngineEvent::PingResult => DecodedResult::Ping(PingResult {
            text: string_field(obj, what, "result")?,
            is_end: bool_field(obj, what, "isEnd")?,
        }),
        EngineEvent::TracerouteResult => DecodedResult::Traceroute(TracerouteResult {
            text: string_field(obj, what, "result")?,
            dest_ip: string_field(obj, what, "destIp")?,
            is_end: bool_field(obj, what, "isEnd")?,
        }),
        EngineEvent::UdpTracerouteResult => DecodedResult::UdpTraceroute(UdpTracerouteResult {
            text: string_field(obj, what, "result")?,
        }),
        EngineEvent::TcpPingResult => DecodedResult::TcpPing(TcpPingResult {
            text: string_field(obj, what, "result")?,
            is_end: bool_field(obj, what, "isEnd")?,
        }),
        EngineEvent::PortScanResult => DecodedResult::PortScan(PortScanResult {
            port: port_field(obj, what, "port")?,
            is_open: bool_field(obj, what, "isOpen")?,
            error: optional_string_field(obj, what, ERROR_FIELD)?,
            is_end: match obj.get("isEnd") {
                None | Some(Value::Null) => false,
                Some(_) => bool_field(obj, what, "isEnd")?,
            },
        }),
        EngineEvent::LanScanActiveIp => {
            let ip = string_field(obj, what, "ip")?;
            let ip = ip
                .parse::<IpAddr>()
                .map_err(|e| DecodeError::malformed(what, format!("ip `{}`: {}", ip, e)))?;
            DecodedResult::LanScanActiveIp(LanScanActiveIp { ip })
        }
        EngineEvent::LanScanProgress => DecodedResult::LanScanProgress(LanScanProgress {
            percent: percent_field(obj, what, "percent")?,
        }),
        EngineEvent::LanScanFinished => DecodedResult::LanScanFinished,
    };

    Ok(result)
}

/// Decode the single answer to a domain lookup
///
/// An empty array is a valid answer; an embedded error is not.
pub fn decode_lookup(payload: &RawPayload) -> Result<Vec<LookupRecord>, DecodeError> {
    let value = parse(payload, LOOKUP)?;
    check_engine_error(&value)?;

    let entries = value
        .as_array()
        .ok_or_else(|| DecodeError::malformed(LOOKUP, "expected an array of records"))?;

    entries
        .iter()
        .map(|entry| {
            let obj = as_object(entry, LOOKUP)?;
            let name = string_field(obj, LOOKUP, "name")?;
            let ip = string_field(obj, LOOKUP, "ip")?;
            let ip = ip
                .parse::<IpAddr>()
                .map_err(|e| DecodeError::malformed(LOOKUP, format!("ip `{}`: {}", ip, e)))?;
            Ok(LookupRecord { name, ip })
        })
        .collect()
}

/// Decode the single answer to a network info query
pub fn decode_network_info(payload: &RawPayload) -> Result<NetworkInfo, DecodeError> {
    let value = parse(payload, NETWORK_INFO)?;
    check_engine_error(&value)?;
    as_object(&value, NETWORK_INFO)?;

    serde_json::from_value(value).map_err(|e| DecodeError::malformed(NETWORK_INFO, e))
}

/// Whether a record announces the end of its session even if it fails to decode
pub(crate) fn signals_end(raw: &RawResult) -> bool {
    if raw.event == EngineEvent::LanScanFinished {
        return true;
    }
    raw.payload
        .to_value()
        .ok()
        .and_then(|value| value.get("isEnd").and_then(Value::as_bool))
        .unwrap_or(false)
}

fn parse(payload: &RawPayload, what: &str) -> Result<Value, DecodeError> {
    payload.to_value().map_err(|e| DecodeError::malformed(what, e))
}

fn check_engine_error(value: &Value) -> Result<(), DecodeError> {
    match value.get(ERROR_FIELD) {
        Some(Value::String(message)) if !message.is_empty() => {
            Err(DecodeError::EngineSignaled(message.clone()))
        }
        Some(Value::Null) | Some(Value::String(_)) | None => Ok(()),
        Some(other) => Err(DecodeError::EngineSignaled(other.to_string())),
    }
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, DecodeError> {
    value
        .as_object()
        .ok_or_else(|| DecodeError::malformed(what, "expected an object"))
}

fn require<'a>(obj: &'a Map<String, Value>, what: &str, field: &str) -> Result<&'a Value, DecodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(DecodeError::missing(what, field)),
        Some(value) => Ok(value),
    }
}

fn string_field(obj: &Map<String, Value>, what: &str, field: &str) -> Result<String, DecodeError> {
    require(obj, what, field)?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| DecodeError::malformed(what, format!("`{}` is not a string", field)))
}

fn optional_string_field(
    obj: &Map<String, Value>,
    what: &str,
    field: &str,
) -> Result<Option<String>, DecodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DecodeError::malformed(what, format!("`{}` is not a string", field))),
    }
}

fn bool_field(obj: &Map<String, Value>, what: &str, field: &str) -> Result<bool, DecodeError> {
    require(obj, what, field)?
        .as_bool()
        .ok_or_else(|| DecodeError::malformed(what, format!("`{}` is not a boolean", field)))
}

/// Numbers may arrive as JSON numbers or numeric strings
fn number_field(obj: &Map<String, Value>, what: &str, field: &str) -> Result<f64, DecodeError> {
    let value = require(obj, what, field)?;
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| DecodeError::malformed(what, format!("`{}` is not representable", field))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| DecodeError::malformed(what, format!("`{}` is not numeric: {:?}", field, s))),
        _ => Err(DecodeError::malformed(what, format!("`{}` is not numeric", field))),
    }
}

fn port_field(obj: &Map<String, Value>, what: &str, field: &str) -> Result<u16, DecodeError> {
    let port = number_field(obj, what, field)?;
    if port.fract() != 0.0 || !(0.0..=f64::from(u16::MAX)).contains(&port) {
        return Err(DecodeError::out_of_range(field, port));
    }
    Ok(port as u16)
}

/// Percent values outside `[0, 1]` are rejected, never clamped
fn percent_field(obj: &Map<String, Value>, what: &str, field: &str) -> Result<f64, DecodeError> {
    let percent = number_field(obj, what, field)?;
    if !(0.0..=1.0).contains(&percent) {
        return Err(DecodeError::out_of_range(field, percent));
    }
    Ok(percent)
}
