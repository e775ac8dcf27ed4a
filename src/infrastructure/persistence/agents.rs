use crate::domain::entities::{Agent, AgentRole, OnlineStatus};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::agent_directory::AgentDirectory;
use crate::infrastructure::persistence::{format_timestamp, parse_column, Database};
use async_trait::async_trait;
use sqlx::{any::AnyRow, Row};
use std::collections::BTreeSet;

impl Database {
    // ========================================
    // Agent Directory Operations
    // ========================================

    /// Insert or replace an agent together with its team memberships
    pub async fn upsert_agent(&self, agent: &Agent) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = format_timestamp(chrono::Utc::now());

        sqlx::query(
            "INSERT INTO agents (id, org_id, online_status, max_concurrent_chats, role, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                org_id = excluded.org_id,
                online_status = excluded.online_status,
                max_concurrent_chats = excluded.max_concurrent_chats,
                role = excluded.role,
                updated_at = excluded.updated_at",
        )
        .bind(&agent.id)
        .bind(&agent.org_id)
        .bind(agent.online_status.to_string())
        .bind(agent.max_concurrent_chats as i64)
        .bind(agent.role.to_string())
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM team_members WHERE agent_id = ?")
            .bind(&agent.id)
            .execute(&mut *tx)
            .await?;

        for team_id in &agent.team_ids {
            sqlx::query("INSERT INTO team_members (team_id, agent_id) VALUES (?, ?)")
                .bind(team_id)
                .bind(&agent.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn teams_of(&self, agent_id: &str) -> DomainResult<BTreeSet<String>> {
        let rows = sqlx::query("SELECT team_id FROM team_members WHERE agent_id = ?")
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("team_id").map_err(DomainError::from))
            .collect()
    }

    fn row_to_agent(row: &AnyRow, team_ids: BTreeSet<String>) -> DomainResult<Agent> {
        let online_status: String = row.try_get("online_status")?;
        let role: String = row.try_get("role")?;
        let max_concurrent_chats: i64 = row.try_get("max_concurrent_chats")?;

        Ok(Agent {
            id: row.try_get("id")?,
            org_id: row.try_get("org_id")?,
            online_status: parse_column::<OnlineStatus>(&online_status)?,
            max_concurrent_chats: max_concurrent_chats.clamp(0, u32::MAX as i64) as u32,
            team_ids,
            role: parse_column::<AgentRole>(&role)?,
        })
    }
}

#[async_trait]
impl AgentDirectory for Database {
    async fn list_agents(&self, org_id: &str) -> DomainResult<Vec<Agent>> {
        let rows = sqlx::query(
            "SELECT id, org_id, online_status, max_concurrent_chats, role
             FROM agents WHERE org_id = ? ORDER BY id ASC",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        let memberships = sqlx::query(
            "SELECT tm.team_id, tm.agent_id FROM team_members tm
             INNER JOIN agents a ON a.id = tm.agent_id
             WHERE a.org_id = ?",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        let mut teams: std::collections::HashMap<String, BTreeSet<String>> =
            std::collections::HashMap::new();
        for row in &memberships {
            let agent_id: String = row.try_get("agent_id")?;
            let team_id: String = row.try_get("team_id")?;
            teams.entry(agent_id).or_default().insert(team_id);
        }

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let team_ids = teams.remove(&id).unwrap_or_default();
                Self::row_to_agent(row, team_ids)
            })
            .collect()
    }

    async fn get_agent(&self, agent_id: &str) -> DomainResult<Option<Agent>> {
        let row = sqlx::query(
            "SELECT id, org_id, online_status, max_concurrent_chats, role
             FROM agents WHERE id = ?",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let team_ids = self.teams_of(agent_id).await?;
                Ok(Some(Self::row_to_agent(&row, team_ids)?))
            }
            None => Ok(None),
        }
    }

    async fn list_team_members(&self, team_id: &str) -> DomainResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT agent_id FROM team_members WHERE team_id = ? ORDER BY agent_id ASC",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("agent_id").map_err(DomainError::from))
            .collect()
    }

    async fn update_online_status(
        &self,
        agent_id: &str,
        status: OnlineStatus,
    ) -> DomainResult<()> {
        let result = sqlx::query("UPDATE agents SET online_status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(format_timestamp(chrono::Utc::now()))
            .bind(agent_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("Agent {} not found", agent_id)));
        }
        Ok(())
    }

    async fn reset_online_statuses(&self) -> DomainResult<u64> {
        let result = sqlx::query(
            "UPDATE agents SET online_status = 'offline', updated_at = ?
             WHERE online_status != 'offline'",
        )
        .bind(format_timestamp(chrono::Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
