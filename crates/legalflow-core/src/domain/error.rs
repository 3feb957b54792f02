//! Error taxonomy for the LegalFlow operations engine.

use legalflow_gateway::GatewayError;

/// Failures of the modification history store, classified from the
/// backend's error so callers can tell "not provisioned" from "not allowed".
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HistoryError {
    #[error(
        "Database tables not found. Run the modification history SQL setup script \
         to create {table} before recording history. ({message})"
    )]
    TablesMissing { table: String, message: String },

    #[error("permission denied on {table}: {message}")]
    PermissionDenied { table: String, message: String },

    #[error("history backend error: {0}")]
    Remote(String),

    #[error("could not decode history row: {0}")]
    Decode(String),
}

/// LegalFlow engine errors.
#[derive(Debug, thiserror::Error)]
pub enum LegalflowError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("audit trail could not be written: {0}")]
    AuditTrail(String),

    #[error("compensating delete on {table} for {id} failed: {reason}")]
    Compensation {
        table: String,
        id: String,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("row is not a JSON object: {0}")]
    RowShape(String),
}

/// Result type for LegalFlow engine operations.
pub type Result<T> = std::result::Result<T, LegalflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_missing_message_points_at_setup() {
        let err = HistoryError::TablesMissing {
            table: "public.autofix_history".to_string(),
            message: "relation does not exist".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Database tables not found."));
        assert!(msg.contains("public.autofix_history"));
    }

    #[test]
    fn gateway_errors_convert() {
        let err: LegalflowError = GatewayError::Transport("connection refused".into()).into();
        assert!(err.to_string().contains("connection refused"));
        assert!(matches!(err, LegalflowError::Gateway(_)));
    }

    #[test]
    fn compensation_names_the_row() {
        let err = LegalflowError::Compensation {
            table: "legalflow.activities".to_string(),
            id: "a-1".to_string(),
            reason: "offline".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("legalflow.activities"));
        assert!(msg.contains("a-1"));
    }
}
