//! Activity notices: an activity row plus a system message in the chat
//! thread it belongs to.
//!
//! The two inserts are independent writes. If the message insert fails the
//! activity is deleted again by id, so no activity is left without its
//! notice.

use std::sync::Arc;

use legalflow_gateway::{DataGateway, Filter, Row, TableRef};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::LegalflowError;
use crate::obs;

/// An activity to record (task, deadline, call...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_activity_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numero_cnj: Option<String>,
}

fn default_activity_status() -> String {
    "todo".to_string()
}

impl NewActivity {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: default_activity_status(),
            numero_cnj: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach the activity to a case by its CNJ number.
    pub fn with_case(mut self, numero_cnj: impl Into<String>) -> Self {
        self.numero_cnj = Some(numero_cnj.into());
        self
    }
}

/// Ids of the two rows written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedNotice {
    pub activity_id: Uuid,
    pub message_id: Uuid,
}

pub struct ActivityNotices {
    gateway: Arc<dyn DataGateway>,
    activities: TableRef,
    messages: TableRef,
}

impl ActivityNotices {
    pub fn new(gateway: Arc<dyn DataGateway>) -> Self {
        Self {
            gateway,
            activities: TableRef::new("legalflow", "activities"),
            messages: TableRef::new("legalflow", "thread_messages"),
        }
    }

    #[instrument(skip(self, activity, notice), fields(title = %activity.title))]
    pub async fn post_activity_with_notice(
        &self,
        activity: &NewActivity,
        thread_id: Uuid,
        notice: &str,
    ) -> crate::Result<PostedNotice> {
        let activity_id = Uuid::new_v4();
        let mut activity_row = to_row(activity)?;
        activity_row.insert("id".to_string(), json!(activity_id));

        self.gateway
            .insert(&self.activities, vec![activity_row])
            .await?;
        debug!(%activity_id, "activity inserted");

        let message_id = Uuid::new_v4();
        let message_row = to_row(&json!({
            "id": message_id,
            "thread_id": thread_id,
            "role": "system",
            "content": notice,
            "metadata": {"activity_id": activity_id},
        }))?;

        match self.gateway.insert(&self.messages, vec![message_row]).await {
            Ok(_) => Ok(PostedNotice {
                activity_id,
                message_id,
            }),
            Err(original) => {
                let table = self.activities.qualified();
                let id = activity_id.to_string();
                let undo = self
                    .gateway
                    .delete(&self.activities, &[Filter::eq("id", id.as_str())])
                    .await;
                // An empty delete result means the row was hidden or already gone.
                let removed = undo.as_ref().is_ok_and(|rows| {
                    rows.iter()
                        .any(|row| row.get("id").and_then(Value::as_str) == Some(id.as_str()))
                });
                obs::emit_compensation(&table, &id, removed);
                let reason = match undo {
                    Ok(_) if removed => return Err(original.into()),
                    Ok(_) => "delete removed no row".to_string(),
                    Err(undo_err) => undo_err.to_string(),
                };
                Err(LegalflowError::Compensation {
                    table,
                    id,
                    reason: format!("{reason} (after message insert failed: {original})"),
                })
            }
        }
    }
}

fn to_row<T: Serialize>(value: &T) -> crate::Result<Row> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        other => Err(LegalflowError::RowShape(other.to_string())),
    }
}
