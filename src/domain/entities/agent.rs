use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    Online,
    Busy,
    Away,
    Offline,
}

impl OnlineStatus {
    /// Agents in these states may receive new conversations.
    pub fn is_assignable(&self) -> bool {
        matches!(self, OnlineStatus::Online | OnlineStatus::Busy)
    }
}

impl fmt::Display for OnlineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnlineStatus::Online => write!(f, "online"),
            OnlineStatus::Busy => write!(f, "busy"),
            OnlineStatus::Away => write!(f, "away"),
            OnlineStatus::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for OnlineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" => Ok(OnlineStatus::Online),
            "busy" => Ok(OnlineStatus::Busy),
            "away" => Ok(OnlineStatus::Away),
            "offline" => Ok(OnlineStatus::Offline),
            _ => Err(format!("Invalid online status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Agent,
    Manager,
    Admin,
}

impl AgentRole {
    pub fn is_supervisor(&self) -> bool {
        matches!(self, AgentRole::Manager | AgentRole::Admin)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentRole::Agent => write!(f, "agent"),
            AgentRole::Manager => write!(f, "manager"),
            AgentRole::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "agent" => Ok(AgentRole::Agent),
            "manager" => Ok(AgentRole::Manager),
            "admin" => Ok(AgentRole::Admin),
            _ => Err(format!("Invalid agent role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub org_id: String,
    pub online_status: OnlineStatus,
    /// 0 means unlimited
    pub max_concurrent_chats: u32,
    pub team_ids: BTreeSet<String>,
    pub role: AgentRole,
}

impl Agent {
    pub fn new(id: impl Into<String>, org_id: impl Into<String>, max_concurrent_chats: u32) -> Self {
        Self {
            id: id.into(),
            org_id: org_id.into(),
            online_status: OnlineStatus::Offline,
            max_concurrent_chats,
            team_ids: BTreeSet::new(),
            role: AgentRole::Agent,
        }
    }

    pub fn with_status(mut self, status: OnlineStatus) -> Self {
        self.online_status = status;
        self
    }

    pub fn with_role(mut self, role: AgentRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_ids.insert(team_id.into());
        self
    }

    /// Capacity for the conditional assignment guard, `None` when unlimited.
    pub fn capacity(&self) -> Option<u32> {
        if self.max_concurrent_chats == 0 {
            None
        } else {
            Some(self.max_concurrent_chats)
        }
    }

    pub fn has_capacity_for(&self, active_load: u32) -> bool {
        match self.capacity() {
            Some(max) => active_load < max,
            None => true,
        }
    }
}
