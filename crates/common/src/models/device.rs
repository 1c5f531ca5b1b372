use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::validation::{format_eui, normalize_eui};

/// Paginated list envelope used by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkServer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub connection_types: Vec<Value>,
}

/// Network server as it appears in device payloads: a bare id or the full object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworkServerRef {
    Id(String),
    Server(NetworkServer),
}

impl NetworkServerRef {
    pub fn id(&self) -> &str {
        match self {
            NetworkServerRef::Id(id) => id,
            NetworkServerRef::Server(server) => &server.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceModel {
    pub id: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub default_config: Value,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub manufacture: Option<String>,
    #[serde(default)]
    pub name: String,
}

/// LoRaWAN activation credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LorawanDevice {
    pub dev_eui: String,
    pub join_eui: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_code: Option<String>,
    pub app_key: String,
}

/// One entry of a bulk create request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCredentials {
    pub device_model: String,
    pub network_server: String,
    pub lorawan_device: LorawanDevice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_published: Option<bool>,
}

/// Device as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub dev_eui: String,
    #[serde(default)]
    pub join_eui: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lorawan_device: Option<LorawanDevice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_model: Option<DeviceModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_server: Option<NetworkServerRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Flat device row edited in the device table
///
/// Every field is optional: a PATCH carries only the columns that changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableDevice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_eui: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_eui: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_server: Option<NetworkServerRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Credential subset of a device update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LorawanPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_eui: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_eui: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,
}

/// Device update in the nested shape the backend accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicePatch {
    #[serde(flatten)]
    pub row: TableDevice,
    pub lorawan_device: LorawanPatch,
}

/// Synthetic device event shown on the device detail page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub timestamp: String,
    pub node_id: String,
    pub event_code: String,
    pub data: Vec<Value>,
}

impl Device {
    fn credential(flat: &str, nested: Option<&str>) -> String {
        if !flat.is_empty() {
            return flat.to_string();
        }
        nested.unwrap_or_default().to_string()
    }
}

impl From<Device> for TableDevice {
    fn from(device: Device) -> Self {
        let lora = device.lorawan_device.as_ref();
        let dev_eui = Device::credential(&device.dev_eui, lora.map(|l| l.dev_eui.as_str()));
        let join_eui = Device::credential(&device.join_eui, lora.map(|l| l.join_eui.as_str()));
        let app_key = Device::credential(&device.app_key, lora.map(|l| l.app_key.as_str()));
        let claim_code = device
            .claim_code
            .clone()
            .or_else(|| lora.and_then(|l| l.claim_code.clone()));

        TableDevice {
            id: Some(device.id),
            dev_eui: Some(format_eui(&dev_eui)),
            join_eui: Some(format_eui(&join_eui)),
            app_key: Some(app_key),
            claim_code,
            status: Some(device.status),
            description: device.description,
            network_server: device
                .network_server
                .map(|ns| NetworkServerRef::Id(ns.id().to_string())),
            extra: Map::new(),
        }
    }
}

impl From<TableDevice> for DevicePatch {
    /// Nest the credential columns under `lorawan_device`
    ///
    /// The flat columns stay on the row as well; EUIs lose their display spacing.
    fn from(mut row: TableDevice) -> Self {
        row.dev_eui = row.dev_eui.map(|v| normalize_eui(&v));
        row.join_eui = row.join_eui.map(|v| normalize_eui(&v));

        let lorawan_device = LorawanPatch {
            dev_eui: row.dev_eui.clone(),
            join_eui: row.join_eui.clone(),
            claim_code: row.claim_code.clone(),
            app_key: row.app_key.clone(),
        };

        DevicePatch {
            row,
            lorawan_device,
        }
    }
}
