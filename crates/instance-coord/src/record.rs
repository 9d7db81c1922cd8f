use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    Worker,
}

impl Role {
    /// Instance 0 is the master; the role never moves.
    pub fn for_instance(instance_id: u32) -> Self {
        if instance_id == 0 {
            Role::Master
        } else {
            Role::Worker
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Worker => "worker",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Unreachable,
}

/// What one process publishes about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: u32,
    pub is_master: bool,
    pub health: Health,
    /// Unix time of the last heartbeat, in milliseconds.
    pub last_heartbeat_ms: u64,
    /// Number of instances this process expects to cooperate with.
    pub cluster_size: u32,
    pub pid: u32,
    /// Set by the master once its shutdown has begun.
    #[serde(default)]
    pub shutdown_requested: bool,
}

impl InstanceRecord {
    pub fn new(instance_id: u32, cluster_size: u32) -> Self {
        Self {
            instance_id,
            is_master: Role::for_instance(instance_id) == Role::Master,
            health: Health::Healthy,
            last_heartbeat_ms: now_millis(),
            cluster_size,
            pid: std::process::id(),
            shutdown_requested: false,
        }
    }

    pub fn role(&self) -> Role {
        if self.is_master {
            Role::Master
        } else {
            Role::Worker
        }
    }

    /// Milliseconds since the last heartbeat; zero if the clock went back.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_heartbeat_ms)
    }

    pub fn last_heartbeat_rfc3339(&self) -> Option<String> {
        let nanos = i128::from(self.last_heartbeat_ms) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()
            .and_then(|t| t.format(&Rfc3339).ok())
    }
}

pub fn now_millis() -> u64 {
    let ms = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    u64::try_from(ms).unwrap_or(0)
}
