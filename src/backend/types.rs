//! Records persisted by the storage backends.
//!
//! All records are serialized as JSON, both in memory (for parity with the
//! clustered store) and in Redis hashes.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// A room known to the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub sid: String,
    pub name: String,
    /// Seconds a room may stay empty before it is closed.
    pub empty_timeout_secs: u32,
    /// Seconds a room stays open after the last participant leaves.
    pub departure_timeout_secs: u32,
    /// Zero means unlimited.
    pub max_participants: u32,
    pub creation_time: i64,
    /// Node currently hosting the room.
    pub node_id: String,
    #[serde(default)]
    pub metadata: String,
}

/// A participant in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub sid: String,
    pub identity: String,
    pub joined_at: i64,
}

/// Lifecycle state of a node, as advertised to peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Starting,
    Serving,
    ShuttingDown,
}

/// Load statistics advertised with each keepalive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStats {
    pub started_at: i64,
    pub updated_at: i64,
    pub num_rooms: u32,
    pub num_clients: u32,
    pub num_cpus: u32,
}

/// A node record, as stored by the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    pub ip: String,
    pub region: String,
    pub state: NodeState,
    pub stats: NodeStats,
}

/// Status of an egress (recording/streaming) job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EgressStatus {
    Starting,
    Active,
    Ending,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressInfo {
    pub egress_id: String,
    pub room_name: String,
    pub status: EgressStatus,
    pub started_at: i64,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressInfo {
    pub ingress_id: String,
    pub stream_key: String,
    pub room_name: String,
    pub participant_identity: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipTrunk {
    pub trunk_id: String,
    pub name: String,
    pub numbers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDispatch {
    pub dispatch_id: String,
    pub agent_name: String,
    pub room_name: String,
    #[serde(default)]
    pub metadata: String,
}
