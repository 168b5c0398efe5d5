//! ---
//! mfg_section: "02-messaging-ipc-data-model"
//! mfg_type: "source"
//! mfg_scope: "code"
//! mfg_description: "Device state, command, and SenML schema helpers."
//! mfg_version: "v0.1.0-alpha"
//! mfg_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// One SenML record using the short field names from RFC 8428.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenmlRecord {
    /// Base name prefixed to `n` to form the full measurement name.
    #[serde(rename = "bn", default, skip_serializing_if = "Option::is_none")]
    pub base_name: Option<String>,
    /// Measurement name.
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Unit label.
    #[serde(rename = "u", default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Numeric value.
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Boolean value.
    #[serde(rename = "vb", default, skip_serializing_if = "Option::is_none")]
    pub boolean_value: Option<bool>,
    /// Sample time, epoch milliseconds in this deployment.
    #[serde(rename = "t")]
    pub time: i64,
}

/// A pack is serialized as a bare JSON array of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenmlPack(pub Vec<SenmlRecord>);

impl SenmlPack {
    /// Single-record pack carrying a numeric measurement.
    pub fn numeric(
        base_name: impl Into<String>,
        name: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        time: i64,
    ) -> Self {
        Self(vec![SenmlRecord {
            base_name: Some(base_name.into()),
            name: Some(name.into()),
            unit: Some(unit.into()),
            value: Some(value),
            boolean_value: None,
            time,
        }])
    }

    /// Append a boolean record sharing the pack's base name.
    pub fn push_boolean(&mut self, name: impl Into<String>, value: bool, time: i64) {
        self.0.push(SenmlRecord {
            base_name: None,
            name: Some(name.into()),
            unit: None,
            value: None,
            boolean_value: Some(value),
            time,
        });
    }
}
