use serde::Serialize;
use serde_json::Value;

use crate::{
    invoke::{self, Completion, DecodedEvent},
    strval,
};

pub const SUCCESS: &str = "SUCCESS";
pub const ERROR: &str = "ERROR";

/// The stable result of a run invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    #[serde(rename_all = "camelCase")]
    Success {
        status: String,
        hash: String,
        return_value: Value,
        method: String,
        events: Vec<DecodedEvent>,
    },
    SubmissionError {
        status: String,
        hash: String,
        result: String,
        method: String,
    },
    HostError {
        status: String,
        title: String,
        response: String,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn status(&self) -> &str {
        match self {
            Outcome::Success { status, .. }
            | Outcome::SubmissionError { status, .. }
            | Outcome::HostError { status, .. } => status,
        }
    }
}

/// Host failures become [`Outcome::HostError`]; any other error is returned
/// unclassified.
pub fn classify(
    method: &str,
    result: Result<Completion, invoke::Error>,
) -> Result<Outcome, invoke::Error> {
    match result {
        Ok(Completion::Success {
            hash,
            return_value,
            events,
        }) => Ok(Outcome::Success {
            status: SUCCESS.to_string(),
            hash,
            return_value: strval::to_json(&return_value),
            method: method.to_string(),
            events,
        }),
        Ok(Completion::Failed {
            hash,
            status,
            result,
        }) => Ok(Outcome::SubmissionError {
            status,
            hash,
            result,
            method: method.to_string(),
        }),
        Err(invoke::Error::Host { title, response }) => Ok(Outcome::HostError {
            status: ERROR.to_string(),
            title,
            response,
        }),
        Err(e) => Err(e),
    }
}
