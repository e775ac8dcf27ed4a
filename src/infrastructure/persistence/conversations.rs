use crate::domain::entities::{
    Conversation, ConversationStatus, EscalationTrigger, Priority, SlaDeadlines,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::conversation_store::{
    AssignOutcome, CandidateCursor, ConversationStore, LostRace,
};
use crate::infrastructure::persistence::{
    format_timestamp, parse_column, parse_optional_timestamp, parse_timestamp, Database,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{any::AnyRow, Row};
use std::collections::HashMap;

const CONVERSATION_COLUMNS: &str = "id, org_id, status, priority, agent_id, channel, page_url, \
     created_at, first_response_at, sla_respond_by, sla_resolve_by, queue_entered_at, \
     last_customer_message_at, last_agent_reply_at";

/// Queued means pending and nobody assigned yet.
const QUEUED: &str = "status = 'pending' AND agent_id IS NULL";

/// Open means not resolved or closed.
const OPEN: &str = "status IN ('pending', 'active')";

impl Database {
    fn row_to_conversation(row: &AnyRow) -> DomainResult<Conversation> {
        let status: String = row.try_get("status")?;
        let priority: String = row.try_get("priority")?;
        let created_at: String = row.try_get("created_at")?;
        let sla_respond_by: String = row.try_get("sla_respond_by")?;
        let sla_resolve_by: String = row.try_get("sla_resolve_by")?;

        Ok(Conversation {
            id: row.try_get("id")?,
            org_id: row.try_get("org_id")?,
            status: parse_column::<ConversationStatus>(&status)?,
            priority: parse_column::<Priority>(&priority)?,
            agent_id: row.try_get("agent_id")?,
            channel: row.try_get("channel")?,
            page_url: row.try_get("page_url")?,
            created_at: parse_timestamp(&created_at)?,
            first_response_at: parse_optional_timestamp(row.try_get("first_response_at")?)?,
            sla_respond_by: parse_timestamp(&sla_respond_by)?,
            sla_resolve_by: parse_timestamp(&sla_resolve_by)?,
            queue_entered_at: parse_optional_timestamp(row.try_get("queue_entered_at")?)?,
            last_customer_message_at: parse_optional_timestamp(
                row.try_get("last_customer_message_at")?,
            )?,
            last_agent_reply_at: parse_optional_timestamp(row.try_get("last_agent_reply_at")?)?,
        })
    }

    /// Work out which guard of a failed conditional assignment tripped.
    async fn diagnose_lost_race(&self, conversation_id: &str) -> DomainResult<LostRace> {
        let conversation = self
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| {
                DomainError::NotFound(format!("Conversation {} not found", conversation_id))
            })?;

        Ok(if conversation.status != ConversationStatus::Pending {
            LostRace::NotPending
        } else if conversation.agent_id.is_some() {
            LostRace::AlreadyAssigned
        } else {
            LostRace::AgentAtCapacity
        })
    }

    async fn touch(&self, sql: &str, conversation_id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        let at = format_timestamp(at);
        let result = sqlx::query(sql)
            .bind(&at)
            .bind(&at)
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!(
                "Conversation {} not found",
                conversation_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for Database {
    async fn create_conversation(&self, conversation: &Conversation) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO conversations (id, org_id, status, priority, agent_id, channel, page_url,
                created_at, first_response_at, sla_respond_by, sla_resolve_by, queue_entered_at,
                last_customer_message_at, last_agent_reply_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id)
        .bind(&conversation.org_id)
        .bind(conversation.status.to_string())
        .bind(conversation.priority.to_string())
        .bind(&conversation.agent_id)
        .bind(&conversation.channel)
        .bind(&conversation.page_url)
        .bind(format_timestamp(conversation.created_at))
        .bind(conversation.first_response_at.map(format_timestamp))
        .bind(format_timestamp(conversation.sla_respond_by))
        .bind(format_timestamp(conversation.sla_resolve_by))
        .bind(conversation.queue_entered_at.map(format_timestamp))
        .bind(conversation.last_customer_message_at.map(format_timestamp))
        .bind(conversation.last_agent_reply_at.map(format_timestamp))
        .bind(format_timestamp(conversation.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_conversation(&self, conversation_id: &str) -> DomainResult<Option<Conversation>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM conversations WHERE id = ?",
            CONVERSATION_COLUMNS
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn count_active_by_agent(&self, org_id: &str) -> DomainResult<HashMap<String, u32>> {
        let rows = sqlx::query(&format!(
            "SELECT agent_id, COUNT(*) AS active FROM conversations
             WHERE org_id = ? AND agent_id IS NOT NULL AND {}
             GROUP BY agent_id",
            OPEN
        ))
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        let mut loads = HashMap::with_capacity(rows.len());
        for row in &rows {
            let agent_id: String = row.try_get("agent_id")?;
            let active: i64 = row.try_get("active")?;
            loads.insert(agent_id, active.max(0) as u32);
        }
        Ok(loads)
    }

    async fn count_pending_before(
        &self,
        org_id: &str,
        created_at: DateTime<Utc>,
        conversation_id: &str,
    ) -> DomainResult<i64> {
        let created_at = format_timestamp(created_at);
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS ahead FROM conversations
             WHERE org_id = ? AND {}
               AND (created_at < ? OR (created_at = ? AND id < ?))",
            QUEUED
        ))
        .bind(org_id)
        .bind(&created_at)
        .bind(&created_at)
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("ahead")?)
    }

    async fn assign(
        &self,
        conversation_id: &str,
        agent_id: &str,
        capacity: Option<u32>,
        at: DateTime<Utc>,
    ) -> DomainResult<AssignOutcome> {
        let cap = capacity.map(i64::from).unwrap_or(0);

        // Single statement: the capacity subquery and the pending/unassigned
        // guard are evaluated under the same write lock.
        let result = sqlx::query(&format!(
            "UPDATE conversations SET agent_id = ?, updated_at = ?
             WHERE id = ? AND {}
               AND (? = 0 OR (
                   SELECT COUNT(*) FROM conversations c
                   WHERE c.agent_id = ? AND c.status IN ('pending', 'active')
               ) < ?)",
            QUEUED
        ))
        .bind(agent_id)
        .bind(format_timestamp(at))
        .bind(conversation_id)
        .bind(cap)
        .bind(agent_id)
        .bind(cap)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(AssignOutcome::Assigned);
        }

        Ok(AssignOutcome::LostRace(
            self.diagnose_lost_race(conversation_id).await?,
        ))
    }

    async fn force_assign(
        &self,
        conversation_id: &str,
        agent_id: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE conversations SET agent_id = ?, updated_at = ? WHERE id = ? AND {}",
            OPEN
        ))
        .bind(agent_id)
        .bind(format_timestamp(at))
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_queued(&self, conversation_id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        let at = format_timestamp(at);
        sqlx::query(&format!(
            "UPDATE conversations
             SET queue_entered_at = COALESCE(queue_entered_at, ?), updated_at = ?
             WHERE id = ? AND {}",
            QUEUED
        ))
        .bind(&at)
        .bind(&at)
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_queued(&self, org_id: &str, limit: i64) -> DomainResult<Vec<Conversation>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM conversations
             WHERE org_id = ? AND {}
             ORDER BY created_at ASC, id ASC
             LIMIT ?",
            CONVERSATION_COLUMNS, QUEUED
        ))
        .bind(org_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_conversation).collect()
    }

    async fn set_priority(
        &self,
        conversation_id: &str,
        priority: Priority,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let result = sqlx::query("UPDATE conversations SET priority = ?, updated_at = ? WHERE id = ?")
            .bind(priority.to_string())
            .bind(format_timestamp(at))
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!(
                "Conversation {} not found",
                conversation_id
            )));
        }
        Ok(())
    }

    async fn set_deadlines(
        &self,
        conversation_id: &str,
        deadlines: &SlaDeadlines,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE conversations SET sla_respond_by = ?, sla_resolve_by = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(format_timestamp(deadlines.respond_by))
        .bind(format_timestamp(deadlines.resolve_by))
        .bind(format_timestamp(at))
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!(
                "Conversation {} not found",
                conversation_id
            )));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        conversation_id: &str,
        status: ConversationStatus,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let result = sqlx::query("UPDATE conversations SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(format_timestamp(at))
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!(
                "Conversation {} not found",
                conversation_id
            )));
        }
        Ok(())
    }

    async fn record_customer_message(
        &self,
        conversation_id: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.touch(
            "UPDATE conversations SET last_customer_message_at = ?, updated_at = ? WHERE id = ?",
            conversation_id,
            at,
        )
        .await
    }

    async fn record_agent_reply(
        &self,
        conversation_id: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.touch(
            "UPDATE conversations SET
                last_agent_reply_at = ?,
                first_response_at = COALESCE(first_response_at, ?),
                status = CASE
                    WHEN status = 'pending' AND agent_id IS NOT NULL THEN 'active'
                    ELSE status
                END
             WHERE id = ?",
            conversation_id,
            at,
        )
        .await
    }

    async fn find_escalation_candidates(
        &self,
        org_id: &str,
        trigger: EscalationTrigger,
        cutoff: DateTime<Utc>,
        after: Option<&CandidateCursor>,
        limit: i64,
    ) -> DomainResult<Vec<Conversation>> {
        let (condition, reference) = match trigger {
            EscalationTrigger::FirstResponseSla => {
                ("first_response_at IS NULL AND created_at <= ?", "created_at")
            }
            EscalationTrigger::ResolutionSla => ("created_at <= ?", "created_at"),
            EscalationTrigger::NoResponse => (
                "last_customer_message_at <= ?
                 AND (last_agent_reply_at IS NULL OR last_agent_reply_at < last_customer_message_at)",
                "last_customer_message_at",
            ),
            EscalationTrigger::PriorityHigh => (
                "priority IN ('high', 'urgent') AND created_at <= ?",
                "created_at",
            ),
        };

        let keyset = if after.is_some() {
            format!("AND ({0} > ? OR ({0} = ? AND id > ?))", reference)
        } else {
            String::new()
        };

        let sql = format!(
            "SELECT {} FROM conversations
             WHERE org_id = ? AND {} AND {} {}
             ORDER BY {} ASC, id ASC
             LIMIT ?",
            CONVERSATION_COLUMNS, OPEN, condition, keyset, reference
        );
        let mut query = sqlx::query(&sql)
            .bind(org_id)
            .bind(format_timestamp(cutoff));
        if let Some(cursor) = after {
            let reference_at = format_timestamp(cursor.reference);
            query = query
                .bind(reference_at.clone())
                .bind(reference_at)
                .bind(cursor.conversation_id.clone());
        }
        let rows = query.bind(limit).fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_conversation).collect()
    }
}
