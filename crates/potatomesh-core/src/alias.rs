//! Declarative field-name aliases, applied once when a record is ingested.
//!
//! Every feed speaks snake_case, but older endpoints and the raw radio
//! payloads still emit camelCase (and a few abbreviations). `canonicalize`
//! rewrites an object so the rest of the crate only ever reads canonical keys.

use serde_json::{Map, Value};

/// `(canonical, aliases)` pairs. The canonical key wins when both are set.
pub const ALIASES: &[(&str, &[&str])] = &[
    // identity
    ("node_id", &["nodeId"]),
    ("node_num", &["nodeNum", "num"]),
    ("neighbor_id", &["neighborId"]),
    ("neighbor_num", &["neighborNum"]),
    // display / config
    ("short_name", &["shortName"]),
    ("long_name", &["longName"]),
    ("hw_model", &["hwModel"]),
    ("modem_preset", &["modemPreset"]),
    ("lora_freq", &["loraFreq"]),
    ("public_key", &["publicKey"]),
    ("hops_away", &["hopsAway"]),
    // timestamps and their ISO companions
    ("rx_time", &["rxTime"]),
    ("rx_iso", &["rxIso"]),
    ("first_heard", &["firstHeard"]),
    ("last_heard", &["lastHeard"]),
    ("last_seen_iso", &["lastSeenIso"]),
    ("telemetry_time", &["telemetryTime"]),
    ("telemetry_iso", &["telemetryIso", "telemetry_time_iso"]),
    ("position_time", &["positionTime", "pos_time"]),
    ("position_iso", &["positionIso", "position_time_iso", "pos_time_iso"]),
    // position
    ("latitude", &["lat"]),
    ("longitude", &["lon", "lng"]),
    ("altitude", &["alt"]),
    ("sats_in_view", &["satsInView"]),
    ("precision_bits", &["precisionBits"]),
    ("location_source", &["locationSource"]),
    // device metrics
    ("battery_level", &["batteryLevel"]),
    ("uptime_seconds", &["uptimeSeconds", "uptime"]),
    ("channel_utilization", &["channelUtilization"]),
    ("air_util_tx", &["airUtilTx"]),
    // environment metrics
    ("relative_humidity", &["relativeHumidity", "humidity"]),
    ("barometric_pressure", &["barometricPressure", "pressure"]),
    ("gas_resistance", &["gasResistance"]),
    ("white_lux", &["whiteLux"]),
    ("ir_lux", &["irLux"]),
    ("uv_lux", &["uvLux"]),
    ("wind_direction", &["windDirection"]),
    ("wind_speed", &["windSpeed"]),
    ("wind_gust", &["windGust"]),
    ("wind_lull", &["windLull"]),
    ("rainfall_1h", &["rainfall1h"]),
    ("rainfall_24h", &["rainfall24h"]),
    ("soil_moisture", &["soilMoisture"]),
    ("soil_temperature", &["soilTemperature"]),
    // messages
    ("from_id", &["fromId"]),
    ("to_id", &["toId"]),
    ("channel_name", &["channelName"]),
    ("reply_id", &["replyId"]),
    ("hop_limit", &["hopLimit"]),
    // traces
    ("request_id", &["requestId"]),
    ("src", &["source"]),
    ("dest", &["destination"]),
    ("hops", &["path", "route"]),
];

/// Nested sections whose fields are lifted to the top level when the top
/// level does not already carry them (raw node-info payloads nest these).
pub const NESTED_SECTIONS: &[&str] = &[
    "user",
    "deviceMetrics",
    "device_metrics",
    "environmentMetrics",
    "environment_metrics",
    "position",
];

fn is_present(map: &Map<String, Value>, key: &str) -> bool {
    matches!(map.get(key), Some(value) if !value.is_null())
}

/// Rewrite `input` so that every known alias is replaced by its canonical key.
pub fn canonicalize(input: &Map<String, Value>) -> Map<String, Value> {
    let mut out = input.clone();

    for section in NESTED_SECTIONS {
        if let Some(Value::Object(nested)) = input.get(*section) {
            for (key, value) in nested {
                if !is_present(&out, key) && !value.is_null() {
                    out.insert(key.clone(), value.clone());
                }
            }
        }
    }

    for (canonical, aliases) in ALIASES {
        let mut found = if is_present(&out, canonical) {
            None
        } else {
            aliases
                .iter()
                .find_map(|alias| out.get(*alias).filter(|v| !v.is_null()).cloned())
        };
        for alias in *aliases {
            out.remove(*alias);
        }
        if let Some(value) = found.take() {
            out.insert((*canonical).to_string(), value);
        }
    }

    out
}

/// Convenience wrapper for a raw feed item; non-objects yield `None`.
pub fn canonical_object(value: &Value) -> Option<Map<String, Value>> {
    value.as_object().map(canonicalize)
}
