use crate::domain::entities::{EscalationAction, OnlineStatus, Priority};
use crate::domain::events::RealtimeEvent;
use crate::domain::ports::broadcast_gateway::BroadcastGateway;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{error::TrySendError, Sender};
use tokio::sync::Mutex;

struct Subscriber {
    org_id: String,
    agent_id: String,
    sender: Sender<RealtimeEvent>,
}

/// SSE fan-out keyed by connection id. An agent may hold several connections
/// (tabs, devices); each one gets its own channel.
#[derive(Clone)]
pub struct ConnectionHub {
    connections: Arc<Mutex<HashMap<u64, Subscriber>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a connection and return its id for later removal.
    pub async fn add_connection(
        &self,
        org_id: &str,
        agent_id: &str,
        sender: Sender<RealtimeEvent>,
    ) -> u64 {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.connections.lock().await;
        connections.insert(
            connection_id,
            Subscriber {
                org_id: org_id.to_string(),
                agent_id: agent_id.to_string(),
                sender,
            },
        );
        connection_id
    }

    pub async fn remove_connection(&self, connection_id: u64) {
        let mut connections = self.connections.lock().await;
        connections.remove(&connection_id);
    }

    /// Drop every sender so open streams end, used on shutdown.
    pub async fn close_all(&self) {
        let mut connections = self.connections.lock().await;
        tracing::info!("Closing {} realtime connections", connections.len());
        connections.clear();
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    async fn deliver<F>(&self, event: RealtimeEvent, filter: F) -> usize
    where
        F: Fn(&Subscriber) -> bool,
    {
        let mut connections = self.connections.lock().await;
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (connection_id, subscriber) in connections.iter() {
            if !filter(subscriber) {
                continue;
            }
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        "Dropping {} event for agent {}: connection buffer full",
                        event.name(),
                        subscriber.agent_id
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(*connection_id),
            }
        }

        for connection_id in closed {
            connections.remove(&connection_id);
        }

        delivered
    }

    async fn broadcast_to_org(&self, org_id: &str, event: RealtimeEvent) {
        let delivered = self.deliver(event, |s| s.org_id == org_id).await;
        tracing::debug!("Broadcast to org {} reached {} connections", org_id, delivered);
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl BroadcastGateway for ConnectionHub {
    async fn emit_presence_changed(&self, org_id: &str, agent_id: &str, status: OnlineStatus) {
        self.broadcast_to_org(
            org_id,
            RealtimeEvent::PresenceChanged {
                org_id: org_id.to_string(),
                agent_id: agent_id.to_string(),
                status,
                timestamp: timestamp(),
            },
        )
        .await;
    }

    async fn emit_assigned(&self, org_id: &str, conversation_id: &str, agent_id: &str) {
        self.broadcast_to_org(
            org_id,
            RealtimeEvent::ConversationAssigned {
                org_id: org_id.to_string(),
                conversation_id: conversation_id.to_string(),
                agent_id: agent_id.to_string(),
                timestamp: timestamp(),
            },
        )
        .await;
    }

    async fn emit_queued(&self, org_id: &str, conversation_id: &str, position: i64) {
        self.broadcast_to_org(
            org_id,
            RealtimeEvent::ConversationQueued {
                org_id: org_id.to_string(),
                conversation_id: conversation_id.to_string(),
                position,
                timestamp: timestamp(),
            },
        )
        .await;
    }

    async fn emit_escalated(
        &self,
        org_id: &str,
        conversation_id: &str,
        rule_id: &str,
        action: EscalationAction,
    ) {
        self.broadcast_to_org(
            org_id,
            RealtimeEvent::ConversationEscalated {
                org_id: org_id.to_string(),
                conversation_id: conversation_id.to_string(),
                rule_id: rule_id.to_string(),
                action,
                timestamp: timestamp(),
            },
        )
        .await;
    }

    async fn emit_priority_changed(&self, org_id: &str, conversation_id: &str, priority: Priority) {
        self.broadcast_to_org(
            org_id,
            RealtimeEvent::PriorityChanged {
                org_id: org_id.to_string(),
                conversation_id: conversation_id.to_string(),
                priority,
                timestamp: timestamp(),
            },
        )
        .await;
    }

    async fn send_to_agents(&self, agent_ids: &[String], event: RealtimeEvent) -> usize {
        self.deliver(event, |s| agent_ids.iter().any(|id| id == &s.agent_id))
            .await
    }
}

/// Records every emitted event instead of delivering it.
#[derive(Clone, Default)]
pub struct MockBroadcastGateway {
    events: Arc<Mutex<Vec<RealtimeEvent>>>,
    direct: Arc<Mutex<Vec<(Vec<String>, RealtimeEvent)>>>,
}

impl MockBroadcastGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<RealtimeEvent> {
        self.events.lock().await.clone()
    }

    /// Events sent with `send_to_agents`, with their recipients.
    pub async fn direct_messages(&self) -> Vec<(Vec<String>, RealtimeEvent)> {
        self.direct.lock().await.clone()
    }

    async fn record(&self, event: RealtimeEvent) {
        self.events.lock().await.push(event);
    }
}

#[async_trait]
impl BroadcastGateway for MockBroadcastGateway {
    async fn emit_presence_changed(&self, org_id: &str, agent_id: &str, status: OnlineStatus) {
        self.record(RealtimeEvent::PresenceChanged {
            org_id: org_id.to_string(),
            agent_id: agent_id.to_string(),
            status,
            timestamp: timestamp(),
        })
        .await;
    }

    async fn emit_assigned(&self, org_id: &str, conversation_id: &str, agent_id: &str) {
        self.record(RealtimeEvent::ConversationAssigned {
            org_id: org_id.to_string(),
            conversation_id: conversation_id.to_string(),
            agent_id: agent_id.to_string(),
            timestamp: timestamp(),
        })
        .await;
    }

    async fn emit_queued(&self, org_id: &str, conversation_id: &str, position: i64) {
        self.record(RealtimeEvent::ConversationQueued {
            org_id: org_id.to_string(),
            conversation_id: conversation_id.to_string(),
            position,
            timestamp: timestamp(),
        })
        .await;
    }

    async fn emit_escalated(
        &self,
        org_id: &str,
        conversation_id: &str,
        rule_id: &str,
        action: EscalationAction,
    ) {
        self.record(RealtimeEvent::ConversationEscalated {
            org_id: org_id.to_string(),
            conversation_id: conversation_id.to_string(),
            rule_id: rule_id.to_string(),
            action,
            timestamp: timestamp(),
        })
        .await;
    }

    async fn emit_priority_changed(&self, org_id: &str, conversation_id: &str, priority: Priority) {
        self.record(RealtimeEvent::PriorityChanged {
            org_id: org_id.to_string(),
            conversation_id: conversation_id.to_string(),
            priority,
            timestamp: timestamp(),
        })
        .await;
    }

    async fn send_to_agents(&self, agent_ids: &[String], event: RealtimeEvent) -> usize {
        self.direct.lock().await.push((agent_ids.to_vec(), event));
        agent_ids.len()
    }
}
