use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A sensor message as published by the device gateway.
#[derive(Debug, Deserialize)]
pub struct DeviceMessage {
    pub data: TelemetryData,
    #[serde(default)]
    pub metadata: Metadata,
    pub uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelemetryData {
    #[serde(rename = "SHIPMENT_ID")]
    pub shipment_id: Option<String>,
    #[serde(rename = "TEMPERATURE", default, deserialize_with = "parse_f64_option")]
    pub temperature: Option<f64>,
    #[serde(rename = "RECORDED_AT")]
    pub recorded_at: Option<String>,
    #[serde(rename = "LOCATION")]
    pub location: Option<String>,
    #[serde(rename = "DEVICE_ID")]
    pub device_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Metadata {
    #[serde(rename = "DEVICE_ID")]
    pub device_id: Option<String>,
    #[serde(flatten)]
    pub other: HashMap<String, Value>,
}

impl DeviceMessage {
    pub fn get_device_id(&self) -> Option<&String> {
        self.data.device_id.as_ref().or(self.metadata.device_id.as_ref())
    }
}

fn parse_f64_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrFloat {
        String(String),
        Float(f64),
    }

    let v: Option<StringOrFloat> = Option::deserialize(deserializer)?;
    match v {
        Some(StringOrFloat::Float(f)) => Ok(Some(f)),
        Some(StringOrFloat::String(s)) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                s.trim().parse::<f64>().map(Some).map_err(serde::de::Error::custom)
            }
        }
        None => Ok(None),
    }
}
