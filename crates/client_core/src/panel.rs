//! UI-side owner of panel visibility and input focus.
//!
//! Focus state lives only here and changes only through [`PanelHost::apply`], so a reveal that
//! asked to preserve focus can never move it by accident.

use shared::domain::FocusRequest;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FocusOwner {
    #[default]
    Editor,
    PanelInput,
    /// Anything outside the editor and the panel, e.g. a terminal.
    External(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelNotification {
    Reveal(FocusRequest),
    Hidden,
    /// The host UI reports that the user moved focus themselves.
    FocusMoved(FocusOwner),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PanelTransition {
    pub visibility_changed: bool,
    pub focus_changed: bool,
}

impl PanelTransition {
    pub fn is_noop(&self) -> bool {
        !self.visibility_changed && !self.focus_changed
    }
}

#[derive(Debug, Clone, Default)]
pub struct PanelHost {
    visible: bool,
    focus: FocusOwner,
}

impl PanelHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_focus(focus: FocusOwner) -> Self {
        Self {
            visible: false,
            focus,
        }
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn focus(&self) -> &FocusOwner {
        &self.focus
    }

    pub fn input_focused(&self) -> bool {
        self.focus == FocusOwner::PanelInput
    }

    pub fn apply(&mut self, notification: &PanelNotification) -> PanelTransition {
        match notification {
            PanelNotification::Reveal(request) => self.on_notification(request),
            PanelNotification::Hidden => {
                let visibility_changed = self.set_visible(false);
                let focus_changed = self.input_focused() && self.set_focus(FocusOwner::Editor);
                PanelTransition {
                    visibility_changed,
                    focus_changed,
                }
            }
            // The input cannot take focus while the panel is hidden.
            PanelNotification::FocusMoved(FocusOwner::PanelInput) if !self.visible => {
                PanelTransition::default()
            }
            PanelNotification::FocusMoved(owner) => PanelTransition {
                visibility_changed: false,
                focus_changed: self.set_focus(owner.clone()),
            },
        }
    }

    /// Shows the panel and, unless the request preserves focus, moves focus to its input.
    pub fn on_notification(&mut self, request: &FocusRequest) -> PanelTransition {
        let visibility_changed = self.set_visible(true);
        let focus_changed = !request.preserve_focus() && self.set_focus(FocusOwner::PanelInput);
        PanelTransition {
            visibility_changed,
            focus_changed,
        }
    }

    fn set_visible(&mut self, visible: bool) -> bool {
        let changed = self.visible != visible;
        self.visible = visible;
        changed
    }

    fn set_focus(&mut self, owner: FocusOwner) -> bool {
        if self.focus == owner {
            return false;
        }
        self.focus = owner;
        true
    }
}

#[cfg(test)]
#[path = "tests/panel_tests.rs"]
mod tests;
