use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for diagnostics information
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    /// Live websocket connections joined to a session group
    pub n_conn: u32,
    /// Documents with at least one live connection
    pub n_groups: u32,
    pub cpu_usage: f32,
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}
