use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::coerce;
use crate::identity::canonical_id_from_num;

/// Telemetry readings tracked per node. The serialized name is the canonical
/// feed key for the metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryMetric {
    BatteryLevel,
    Voltage,
    UptimeSeconds,
    ChannelUtilization,
    AirUtilTx,
    Temperature,
    RelativeHumidity,
    BarometricPressure,
    GasResistance,
    Iaq,
    Distance,
    Lux,
    WhiteLux,
    IrLux,
    UvLux,
    WindDirection,
    WindSpeed,
    WindGust,
    WindLull,
    Weight,
    Radiation,
    #[serde(rename = "rainfall_1h")]
    Rainfall1h,
    #[serde(rename = "rainfall_24h")]
    Rainfall24h,
    SoilMoisture,
    SoilTemperature,
    Current,
}

impl TelemetryMetric {
    pub const ALL: [TelemetryMetric; 26] = [
        TelemetryMetric::BatteryLevel,
        TelemetryMetric::Voltage,
        TelemetryMetric::UptimeSeconds,
        TelemetryMetric::ChannelUtilization,
        TelemetryMetric::AirUtilTx,
        TelemetryMetric::Temperature,
        TelemetryMetric::RelativeHumidity,
        TelemetryMetric::BarometricPressure,
        TelemetryMetric::GasResistance,
        TelemetryMetric::Iaq,
        TelemetryMetric::Distance,
        TelemetryMetric::Lux,
        TelemetryMetric::WhiteLux,
        TelemetryMetric::IrLux,
        TelemetryMetric::UvLux,
        TelemetryMetric::WindDirection,
        TelemetryMetric::WindSpeed,
        TelemetryMetric::WindGust,
        TelemetryMetric::WindLull,
        TelemetryMetric::Weight,
        TelemetryMetric::Radiation,
        TelemetryMetric::Rainfall1h,
        TelemetryMetric::Rainfall24h,
        TelemetryMetric::SoilMoisture,
        TelemetryMetric::SoilTemperature,
        TelemetryMetric::Current,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            TelemetryMetric::BatteryLevel => "battery_level",
            TelemetryMetric::Voltage => "voltage",
            TelemetryMetric::UptimeSeconds => "uptime_seconds",
            TelemetryMetric::ChannelUtilization => "channel_utilization",
            TelemetryMetric::AirUtilTx => "air_util_tx",
            TelemetryMetric::Temperature => "temperature",
            TelemetryMetric::RelativeHumidity => "relative_humidity",
            TelemetryMetric::BarometricPressure => "barometric_pressure",
            TelemetryMetric::GasResistance => "gas_resistance",
            TelemetryMetric::Iaq => "iaq",
            TelemetryMetric::Distance => "distance",
            TelemetryMetric::Lux => "lux",
            TelemetryMetric::WhiteLux => "white_lux",
            TelemetryMetric::IrLux => "ir_lux",
            TelemetryMetric::UvLux => "uv_lux",
            TelemetryMetric::WindDirection => "wind_direction",
            TelemetryMetric::WindSpeed => "wind_speed",
            TelemetryMetric::WindGust => "wind_gust",
            TelemetryMetric::WindLull => "wind_lull",
            TelemetryMetric::Weight => "weight",
            TelemetryMetric::Radiation => "radiation",
            TelemetryMetric::Rainfall1h => "rainfall_1h",
            TelemetryMetric::Rainfall24h => "rainfall_24h",
            TelemetryMetric::SoilMoisture => "soil_moisture",
            TelemetryMetric::SoilTemperature => "soil_temperature",
            TelemetryMetric::Current => "current",
        }
    }
}

/// A set of telemetry values that share one observation time.
///
/// `iso` is the companion of `time` and is only ever set or replaced together
/// with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryBlock {
    pub time: Option<i64>,
    pub iso: Option<String>,
    #[serde(default)]
    pub metrics: BTreeMap<TelemetryMetric, f64>,
}

impl TelemetryBlock {
    /// Read every known metric from a canonicalized record.
    pub fn read_metrics(map: &Map<String, Value>) -> BTreeMap<TelemetryMetric, f64> {
        TelemetryMetric::ALL
            .iter()
            .filter_map(|metric| coerce::number_field(map, metric.key()).map(|v| (*metric, v)))
            .collect()
    }

    pub fn get(&self, metric: TelemetryMetric) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_none() && self.metrics.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Position fix. Same timestamp/ISO pairing rule as [`TelemetryBlock`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionBlock {
    pub time: Option<i64>,
    pub iso: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub sats_in_view: Option<i64>,
    pub precision_bits: Option<i64>,
    pub location_source: Option<String>,
}

impl PositionBlock {
    pub fn read_fields(map: &Map<String, Value>, time: Option<i64>, iso: Option<String>) -> Self {
        Self {
            time,
            iso: time.and(iso),
            latitude: coerce::number_field(map, "latitude"),
            longitude: coerce::number_field(map, "longitude"),
            altitude: coerce::number_field(map, "altitude"),
            sats_in_view: coerce::integer_field(map, "sats_in_view"),
            precision_bits: coerce::integer_field(map, "precision_bits"),
            location_source: coerce::string_field(map, "location_source"),
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_none() && self.latitude.is_none() && self.longitude.is_none()
    }
}

/// Raw feed records that contributed to an aggregate, kept for detail views.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub neighbors: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traces: Vec<Value>,
}

impl RawSources {
    pub fn is_empty(&self) -> bool {
        self.fallback.is_none()
            && self.node.is_none()
            && self.telemetry.is_none()
            && self.position.is_none()
            && self.neighbors.is_empty()
            && self.traces.is_empty()
    }
}

/// The reconciled view of one mesh node across every feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAggregate {
    pub node_id: Option<String>,
    pub node_num: Option<u64>,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub role: Option<String>,
    pub hw_model: Option<String>,
    pub modem_preset: Option<String>,
    pub lora_freq: Option<f64>,
    pub first_heard: Option<i64>,
    pub last_heard: Option<i64>,
    pub last_seen_iso: Option<String>,
    pub snr: Option<f64>,
    pub hops_away: Option<i64>,
    pub public_key: Option<String>,
    #[serde(default)]
    pub telemetry: TelemetryBlock,
    #[serde(default)]
    pub position: PositionBlock,
    #[serde(default, skip_serializing_if = "RawSources::is_empty")]
    pub raw_sources: RawSources,
}

impl NodeAggregate {
    /// String ID when known, otherwise the decimal node number.
    pub fn canonical_key(&self) -> Option<String> {
        self.node_id
            .clone()
            .or_else(|| self.node_num.map(|num| num.to_string()))
    }

    /// String ID, or the hex form derived from the node number.
    pub fn display_id(&self) -> Option<String> {
        self.node_id
            .clone()
            .or_else(|| self.node_num.map(canonical_id_from_num))
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.position.coordinates()
    }

    pub fn battery_level(&self) -> Option<f64> {
        self.telemetry.get(TelemetryMetric::BatteryLevel)
    }

    pub fn telemetry_time(&self) -> Option<i64> {
        self.telemetry.time
    }

    pub fn position_time(&self) -> Option<i64> {
        self.position.time
    }

    /// JSON handed to renderers. Name fields are mirrored into their legacy
    /// camelCase aliases so consumers of either convention agree.
    pub fn to_export_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            let short = map.get("short_name").cloned().unwrap_or(Value::Null);
            let long = map.get("long_name").cloned().unwrap_or(Value::Null);
            map.insert("shortName".to_string(), short);
            map.insert("longName".to_string(), long);
        }
        value
    }
}
