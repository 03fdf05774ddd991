use log::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::dispatch_api::OrderFlowError;

/// The persisted outcome of a mutating call: either the serialized success result or the code and message of the
/// error it produced. Replays return this verbatim, success and failure alike.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum StoredOutcome {
    Ok { result: serde_json::Value },
    Err { code: String, message: String },
}

impl StoredOutcome {
    pub fn from_result<T: Serialize>(result: &Result<T, OrderFlowError>) -> Result<Self, OrderFlowError> {
        match result {
            Ok(value) => {
                let result = serde_json::to_value(value)
                    .map_err(|e| OrderFlowError::Validation(format!("Could not serialize outcome: {e}")))?;
                Ok(StoredOutcome::Ok { result })
            },
            Err(e) => Ok(StoredOutcome::Err { code: e.code().to_string(), message: e.to_string() }),
        }
    }

    /// Reconstructs the original outcome. A stored success that no longer deserializes into `T` is a programming
    /// error (the DTO changed shape under a live idempotency window) and surfaces as a validation error.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, OrderFlowError> {
        match self {
            StoredOutcome::Ok { result } => serde_json::from_value(result)
                .map_err(|e| OrderFlowError::Validation(format!("Stored outcome no longer matches: {e}"))),
            StoredOutcome::Err { code, message } => Err(OrderFlowError::ReplayedFailure { code, message }),
        }
    }
}

pub(crate) fn decode_outcome<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, OrderFlowError> {
    let stored: StoredOutcome = serde_json::from_str(raw)
        .map_err(|e| OrderFlowError::Validation(format!("Stored outcome for key {key} is unreadable: {e}")))?;
    debug!("♻️ Idempotency key {key} seen before. Replaying the stored outcome without re-executing.");
    stored.into_result()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn success_outcomes_round_trip() {
        let result: Result<Vec<u32>, OrderFlowError> = Ok(vec![1, 2, 3]);
        let stored = StoredOutcome::from_result(&result).unwrap();
        let replayed: Vec<u32> = stored.into_result().unwrap();
        assert_eq!(replayed, vec![1, 2, 3]);
    }

    #[test]
    fn failures_replay_with_code_and_message() {
        let result: Result<(), OrderFlowError> = Err(OrderFlowError::Validation("bad input".to_string()));
        let stored = StoredOutcome::from_result(&result).unwrap();
        let err = stored.into_result::<()>().unwrap_err();
        match err {
            OrderFlowError::ReplayedFailure { code, message } => {
                assert_eq!(code, "validation");
                assert_eq!(message, "Invalid request: bad input");
            },
            other => panic!("unexpected error: {other}"),
        }
    }
}
