//! Command channel
//!
//! Request/response protocol between the UI layer and the session
//! controller. Requests are tagged by `method`; every request gets exactly one
//! [`CommandReply`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, ErrorCode};
use crate::session::SessionController;

/// Methods understood by [`SessionController::handle`]
pub const KNOWN_METHODS: &[&str] = &[
    "initialize",
    "startBackgroundService",
    "stopBackgroundService",
    "stopAlarm",
];

/// Command-channel request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum Command {
    Initialize,
    StartBackgroundService {
        municipality: Option<String>,
        #[serde(rename = "operatorName", alias = "rescuerName")]
        operator_name: Option<String>,
    },
    StopBackgroundService,
    StopAlarm,
}

impl Command {
    /// Parse a raw request, distinguishing unknown methods from bad arguments
    pub fn parse(value: serde_json::Value) -> Result<Command, CommandReply> {
        let method = value
            .get("method")
            .and_then(|m| m.as_str())
            .map(str::to_string);

        match method {
            Some(method) if !KNOWN_METHODS.contains(&method.as_str()) => {
                Err(CommandReply::error(
                    ErrorCode::NotImplemented,
                    format!("Method not implemented: {}", method),
                ))
            }
            None => Err(CommandReply::error(
                ErrorCode::InvalidArgument,
                "Missing method",
            )),
            Some(_) => serde_json::from_value(value).map_err(|e| {
                CommandReply::error(ErrorCode::InvalidArgument, format!("Bad arguments: {}", e))
            }),
        }
    }
}

/// Command-channel response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CommandReply {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl CommandReply {
    pub fn success(message: impl Into<String>) -> Self {
        CommandReply::Success {
            message: Some(message.into()),
        }
    }

    pub fn empty() -> Self {
        CommandReply::Success { message: None }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        CommandReply::Error {
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandReply::Success { .. })
    }
}

impl From<Error> for CommandReply {
    fn from(error: Error) -> Self {
        CommandReply::error(error.code(), error.to_string())
    }
}

impl SessionController {
    /// Execute one command-channel request
    pub async fn handle(&self, command: Command) -> CommandReply {
        debug!("Command: {:?}", command);
        let result = match command {
            Command::Initialize => self.initialize().map(|_| CommandReply::empty()),
            Command::StartBackgroundService {
                municipality,
                operator_name,
            } => {
                let Some(municipality) = municipality else {
                    return Error::InvalidArgument("Municipality cannot be null".to_string()).into();
                };
                let Some(operator_name) = operator_name else {
                    return Error::InvalidArgument("Rescuer name cannot be null".to_string()).into();
                };
                self.start_monitoring(&municipality, &operator_name)
                    .await
                    .map(|_| CommandReply::success("Service started successfully"))
            }
            Command::StopBackgroundService => self
                .stop_monitoring()
                .await
                .map(|_| CommandReply::success("Service stopped successfully")),
            Command::StopAlarm => self
                .stop_alarm()
                .await
                .map(|_| CommandReply::success("Alarm stopped")),
        };

        result.unwrap_or_else(CommandReply::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_start() {
        let command = Command::parse(json!({
            "method": "startBackgroundService",
            "municipality": "riverside",
            "rescuerName": "op1"
        }))
        .unwrap();

        assert_eq!(
            command,
            Command::StartBackgroundService {
                municipality: Some("riverside".to_string()),
                operator_name: Some("op1".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_missing_arguments_keeps_none() {
        let command = Command::parse(json!({ "method": "startBackgroundService" })).unwrap();
        assert_eq!(
            command,
            Command::StartBackgroundService {
                municipality: None,
                operator_name: None,
            }
        );
    }

    #[test]
    fn test_unknown_method_not_implemented() {
        match Command::parse(json!({ "method": "selfDestruct" })) {
            Err(CommandReply::Error { code, .. }) => assert_eq!(code, ErrorCode::NotImplemented),
            other => panic!("Expected NotImplemented, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_method_invalid() {
        match Command::parse(json!({ "municipality": "riverside" })) {
            Err(CommandReply::Error { code, .. }) => assert_eq!(code, ErrorCode::InvalidArgument),
            other => panic!("Expected InvalidArgument, got {:?}", other),
        }
    }

    #[test]
    fn test_reply_wire_format() {
        let ok = serde_json::to_value(CommandReply::success("Service started successfully")).unwrap();
        assert_eq!(ok, json!({ "status": "success", "message": "Service started successfully" }));

        let err = serde_json::to_value(CommandReply::from(Error::PermissionDenied(
            "Need permissions to start service".to_string(),
        )))
        .unwrap();
        assert_eq!(err["status"], "error");
        assert_eq!(err["code"], "PERMISSION_REQUIRED");
    }
}
