//! Heartbeat wire types. The payload a worker posts is authoritative for
//! liveness and status; the registry never re-derives either.

use serde::{Deserialize, Serialize};

use crate::types::NodeId;

// ── NodeStatus ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Idle,
    Busy,
    Offline,
}

// ── Heartbeat payload ────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub gpu: String,
    /// Free VRAM in megabytes.
    pub vram_free: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineInfo {
    /// Inference engine name, e.g. "ollama".
    #[serde(rename = "type")]
    pub engine_type: String,
    pub version: String,
    pub port: u16,
}

/// Worker liveness report, stored verbatim in the ephemeral store under
/// `node:<node_id>` with a 15-second TTL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Heartbeat {
    pub node_id: NodeId,
    /// Address on the shared mesh network where the worker is reachable.
    pub mesh_ip: String,
    pub status: NodeStatus,
    pub models: Vec<String>,
    pub hardware: HardwareInfo,
    pub engine: EngineInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_uses_wire_casing() {
        let hb: Heartbeat = serde_json::from_str(
            r#"{
                "node_id": "n1",
                "mesh_ip": "100.64.0.7",
                "status": "IDLE",
                "models": ["llama2:7b"],
                "hardware": {"gpu": "RTX 3060", "vram_free": 10240},
                "engine": {"type": "ollama", "version": "0.1.17", "port": 11434}
            }"#,
        )
        .unwrap();
        assert_eq!(hb.status, NodeStatus::Idle);
        assert_eq!(hb.engine.engine_type, "ollama");
        assert_eq!(
            serde_json::to_value(NodeStatus::Offline).unwrap(),
            serde_json::json!("OFFLINE")
        );
    }
}
