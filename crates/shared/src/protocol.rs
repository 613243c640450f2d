use serde::{Deserialize, Serialize};

use crate::{
    domain::{Command, FocusRequest},
    error::ApiError,
};

/// Body accepted by the dispatch endpoints. A missing flag defers to the entry point default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_focus: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientRequest {
    DispatchCommand {
        command: Command,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preserve_focus: Option<bool>,
    },
    HidePanel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    FocusInputRequested { request: FocusRequest },
    PanelHidden,
    Error(ApiError),
}
