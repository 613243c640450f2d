use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_newtype!(RequestId);

/// Whether a panel reveal may take input focus away from where it currently is.
///
/// `Steal` is the legacy behavior and the value an absent flag collapses to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    #[default]
    Steal,
    Preserve,
}

impl FocusMode {
    pub fn from_flag(preserve_focus: Option<bool>) -> Self {
        preserve_focus.map(Self::from).unwrap_or_default()
    }

    pub fn preserves_focus(self) -> bool {
        self == Self::Preserve
    }
}

impl From<bool> for FocusMode {
    fn from(preserve_focus: bool) -> Self {
        if preserve_focus {
            Self::Preserve
        } else {
            Self::Steal
        }
    }
}

impl From<FocusMode> for bool {
    fn from(mode: FocusMode) -> Self {
        mode.preserves_focus()
    }
}

/// Entry points that reveal the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    FocusChatInput,
    OpenPanel,
    AddToChat,
    ExplainCode,
    ImproveCode,
    FixWithAi,
    AddTerminalOutput,
    PanelButton,
}

impl Command {
    pub const ALL: &'static [Command] = &[
        Command::FocusChatInput,
        Command::OpenPanel,
        Command::AddToChat,
        Command::ExplainCode,
        Command::ImproveCode,
        Command::FixWithAi,
        Command::AddTerminalOutput,
        Command::PanelButton,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Command::FocusChatInput => "focus_chat_input",
            Command::OpenPanel => "open_panel",
            Command::AddToChat => "add_to_chat",
            Command::ExplainCode => "explain_code",
            Command::ImproveCode => "improve_code",
            Command::FixWithAi => "fix_with_ai",
            Command::AddTerminalOutput => "add_terminal_output",
            Command::PanelButton => "panel_button",
        }
    }

    /// Explicit user requests take focus; incidental triggers leave it where it is.
    pub fn default_focus_mode(self) -> FocusMode {
        match self {
            Command::FocusChatInput | Command::OpenPanel => FocusMode::Steal,
            Command::AddToChat
            | Command::ExplainCode
            | Command::ImproveCode
            | Command::FixWithAi
            | Command::AddTerminalOutput
            | Command::PanelButton => FocusMode::Preserve,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command '{0}'")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Command::ALL
            .iter()
            .copied()
            .find(|command| command.as_str() == needle)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

/// A single reveal notification. Built once by the dispatcher and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusRequest {
    request_id: RequestId,
    #[serde(default)]
    preserve_focus: bool,
    issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<Command>,
}

impl FocusRequest {
    pub fn new(mode: FocusMode, command: Option<Command>) -> Self {
        Self {
            request_id: RequestId::new(),
            preserve_focus: mode.preserves_focus(),
            issued_at: Utc::now(),
            command,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn preserve_focus(&self) -> bool {
        self.preserve_focus
    }

    pub fn mode(&self) -> FocusMode {
        FocusMode::from(self.preserve_focus)
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn command(&self) -> Option<Command> {
        self.command
    }
}

/// Host-side view of the panel, exposed for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelStatus {
    pub visible: bool,
    pub dispatched: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_request: Option<FocusRequest>,
}
