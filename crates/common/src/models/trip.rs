use serde::{Deserialize, Serialize};

/// One GPS fix recorded during a trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: String,
    #[serde(default)]
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    #[serde(default)]
    pub space_device_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub is_finished: bool,
    #[serde(default)]
    pub last_latitude: Option<f64>,
    #[serde(default)]
    pub last_longitude: Option<f64>,
    #[serde(default)]
    pub last_report: Option<f64>,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
}
