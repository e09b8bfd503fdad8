//! # Mutation Replies
//!
//! UI code receives `{ success, error?: { code, message } }` from every
//! mutating call instead of an error it has to catch.

use crate::errors::{ErrorCode, SyncError};
use serde::{Deserialize, Serialize};

/// Error half of a [`MutationResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&SyncError> for ErrorInfo {
    fn from(err: &SyncError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Reply to a mutation issued through the window bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl MutationResult {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(err: &SyncError) -> Self {
        Self {
            success: false,
            error: Some(ErrorInfo::from(err)),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

impl<T> From<Result<T, SyncError>> for MutationResult {
    fn from(result: Result<T, SyncError>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(err) => Self::failed(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransactionError;
    use serde_json::json;

    #[test]
    fn test_success_omits_error() {
        let wire = serde_json::to_value(MutationResult::ok()).unwrap();
        assert_eq!(wire, json!({ "success": true }));
    }

    #[test]
    fn test_failure_carries_code_and_message() {
        let result: MutationResult =
            Err::<(), _>(SyncError::from(TransactionError::AlreadyOpen("w".into()))).into();
        assert!(!result.is_success());
        assert_eq!(result.error_code(), Some(ErrorCode::TransactionError));
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(wire["error"]["code"], json!("TRANSACTION_ERROR"));
        assert!(wire["error"]["message"].as_str().unwrap().contains("already open"));
    }
}
