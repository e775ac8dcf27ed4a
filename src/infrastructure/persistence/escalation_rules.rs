use crate::domain::entities::{ActionConfig, EscalationAction, EscalationRule, EscalationTrigger};
use crate::domain::errors::DomainResult;
use crate::domain::ports::escalation_rule_repository::EscalationRuleRepository;
use crate::infrastructure::persistence::{parse_column, Database};
use async_trait::async_trait;
use sqlx::{any::AnyRow, Row};

impl Database {
    pub async fn create_escalation_rule(&self, rule: &EscalationRule) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO escalation_rules (id, org_id, is_active, trigger_type, threshold_minutes, action, action_config)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&rule.id)
        .bind(&rule.org_id)
        .bind(if rule.is_active { 1_i64 } else { 0_i64 })
        .bind(rule.trigger_type.to_string())
        .bind(rule.threshold_minutes)
        .bind(rule.action.to_string())
        .bind(serde_json::to_string(&rule.action_config)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_escalation_rule(row: &AnyRow) -> DomainResult<EscalationRule> {
        let is_active: i64 = row.try_get("is_active")?;
        let trigger_type: String = row.try_get("trigger_type")?;
        let action: String = row.try_get("action")?;
        let action_config: String = row.try_get("action_config")?;

        Ok(EscalationRule {
            id: row.try_get("id")?,
            org_id: row.try_get("org_id")?,
            is_active: is_active != 0,
            trigger_type: parse_column::<EscalationTrigger>(&trigger_type)?,
            threshold_minutes: row.try_get("threshold_minutes")?,
            action: parse_column::<EscalationAction>(&action)?,
            action_config: serde_json::from_str::<ActionConfig>(&action_config)?,
        })
    }
}

#[async_trait]
impl EscalationRuleRepository for Database {
    async fn list_orgs_with_active_rules(&self) -> DomainResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT org_id FROM escalation_rules WHERE is_active = 1 ORDER BY org_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut orgs = Vec::with_capacity(rows.len());
        for row in &rows {
            orgs.push(row.try_get("org_id")?);
        }
        Ok(orgs)
    }

    async fn list_active_rules(&self, org_id: &str) -> DomainResult<Vec<EscalationRule>> {
        let rows = sqlx::query(
            "SELECT id, org_id, is_active, trigger_type, threshold_minutes, action, action_config
             FROM escalation_rules
             WHERE org_id = ? AND is_active = 1
             ORDER BY id ASC",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_escalation_rule).collect()
    }
}
