//! Automation flows: stored step definitions, validated on write. Nothing here
//! executes a flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    ClientCreated,
    InvoiceCreated,
    InvoiceOverdue,
    PaymentCompleted,
    SubscriptionRenewal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionChannel {
    Email,
    Whatsapp,
}

/// One step of a flow, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowStep {
    Trigger {
        event: TriggerEvent,
    },
    Condition {
        field: String,
        operator: ConditionOperator,
        value: serde_json::Value,
    },
    Action {
        channel: ActionChannel,
        template: String,
    },
    Delay {
        minutes: u32,
    },
}

/// Structural check for a step list: exactly one trigger, first; at least one
/// action; no zero-length delays or empty templates.
pub fn validate_steps(steps: &[FlowStep]) -> Result<(), String> {
    match steps.first() {
        Some(FlowStep::Trigger { .. }) => {}
        Some(_) => return Err("first step must be a trigger".to_string()),
        None => return Err("flow must contain at least one step".to_string()),
    }

    let triggers = steps
        .iter()
        .filter(|s| matches!(s, FlowStep::Trigger { .. }))
        .count();
    if triggers > 1 {
        return Err("flow must contain exactly one trigger".to_string());
    }

    if !steps.iter().any(|s| matches!(s, FlowStep::Action { .. })) {
        return Err("flow must contain at least one action".to_string());
    }

    for step in steps {
        match step {
            FlowStep::Delay { minutes: 0 } => {
                return Err("delay must be at least one minute".to_string())
            }
            FlowStep::Action { template, .. } if template.trim().is_empty() => {
                return Err("action template must not be empty".to_string())
            }
            FlowStep::Condition { field, .. } if field.trim().is_empty() => {
                return Err("condition field must not be empty".to_string())
            }
            _ => {}
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Flow {
    pub flow_id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub active: bool,
    pub steps: Json<Vec<FlowStep>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateFlow {
    pub company_id: Uuid,
    pub name: String,
    pub active: bool,
    pub steps: Vec<FlowStep>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateFlow {
    pub name: Option<String>,
    pub active: Option<bool>,
    pub steps: Option<Vec<FlowStep>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trigger() -> FlowStep {
        FlowStep::Trigger {
            event: TriggerEvent::InvoiceOverdue,
        }
    }

    fn action() -> FlowStep {
        FlowStep::Action {
            channel: ActionChannel::Email,
            template: "Reminder for {{invoice_number}}".to_string(),
        }
    }

    #[test]
    fn steps_deserialize_from_tagged_json() {
        let steps: Vec<FlowStep> = serde_json::from_value(json!([
            {"type": "trigger", "event": "invoice_overdue"},
            {"type": "delay", "minutes": 60},
            {"type": "condition", "field": "total_amount", "operator": "greater_than", "value": 1000},
            {"type": "action", "channel": "whatsapp", "template": "Hi {{client_name}}"}
        ]))
        .unwrap();

        assert_eq!(steps.len(), 4);
        assert_eq!(steps[1], FlowStep::Delay { minutes: 60 });
        assert!(validate_steps(&steps).is_ok());
    }

    #[test]
    fn unknown_step_type_is_rejected_at_parse() {
        let result: Result<Vec<FlowStep>, _> =
            serde_json::from_value(json!([{"type": "webhook", "url": "x"}]));
        assert!(result.is_err());
    }

    #[test]
    fn flow_must_start_with_single_trigger() {
        assert!(validate_steps(&[]).is_err());
        assert!(validate_steps(&[action(), trigger()]).is_err());
        assert!(validate_steps(&[trigger(), trigger(), action()]).is_err());
    }

    #[test]
    fn flow_needs_an_action() {
        let err = validate_steps(&[trigger(), FlowStep::Delay { minutes: 5 }]).unwrap_err();
        assert!(err.contains("action"));
    }

    #[test]
    fn zero_delay_is_rejected() {
        let steps = vec![trigger(), FlowStep::Delay { minutes: 0 }, action()];
        assert!(validate_steps(&steps).is_err());
    }
}
