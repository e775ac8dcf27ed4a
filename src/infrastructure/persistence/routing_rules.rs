use crate::domain::entities::{RoutingConditions, RoutingRule, RoutingTargetType};
use crate::domain::errors::DomainResult;
use crate::domain::ports::routing_rule_repository::RoutingRuleRepository;
use crate::infrastructure::persistence::{parse_column, Database};
use async_trait::async_trait;
use sqlx::{any::AnyRow, Row};

impl Database {
    pub async fn create_routing_rule(&self, rule: &RoutingRule) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO routing_rules (id, org_id, priority, is_active, channel, page_url_contains, target_type, target_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&rule.id)
        .bind(&rule.org_id)
        .bind(rule.priority as i64)
        .bind(if rule.is_active { 1_i64 } else { 0_i64 })
        .bind(&rule.conditions.channel)
        .bind(&rule.conditions.page_url_contains)
        .bind(rule.target_type.to_string())
        .bind(&rule.target_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_routing_rule(row: &AnyRow) -> DomainResult<RoutingRule> {
        let priority: i64 = row.try_get("priority")?;
        let is_active: i64 = row.try_get("is_active")?;
        let target_type: String = row.try_get("target_type")?;

        Ok(RoutingRule {
            id: row.try_get("id")?,
            org_id: row.try_get("org_id")?,
            priority: priority.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
            is_active: is_active != 0,
            conditions: RoutingConditions {
                channel: row.try_get("channel")?,
                page_url_contains: row.try_get("page_url_contains")?,
            },
            target_type: parse_column::<RoutingTargetType>(&target_type)?,
            target_id: row.try_get("target_id")?,
        })
    }
}

#[async_trait]
impl RoutingRuleRepository for Database {
    async fn list_active_rules(&self, org_id: &str) -> DomainResult<Vec<RoutingRule>> {
        let rows = sqlx::query(
            "SELECT id, org_id, priority, is_active, channel, page_url_contains, target_type, target_id
             FROM routing_rules
             WHERE org_id = ? AND is_active = 1",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_routing_rule).collect()
    }
}
