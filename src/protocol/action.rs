//! Fixed table of actions the browser agent implements.
//!
//! Action names are the wire names in the `action` field of a call frame.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ============================================================================
// Action
// ============================================================================

/// An operation forwarded to the browser agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Liveness probe answered by the agent itself.
    Ping,

    // Tabs
    /// List all open tabs.
    GetTabs,
    /// Get the active tab of the focused window.
    GetActiveTab,
    /// Open a new tab.
    NewTab,
    /// Close a tab.
    CloseTab,
    /// Activate a tab and focus its window.
    FocusTab,

    // Navigation
    /// Navigate a tab to a URL.
    Navigate,
    /// History back.
    GoBack,
    /// History forward.
    GoForward,

    // Input
    /// Click by selector or coordinates.
    Click,
    /// Type text into an element.
    Type,
    /// Hover by selector or coordinates.
    Hover,
    /// Drag one element onto another.
    DragDrop,
    /// Press a keyboard key.
    PressKey,
    /// Select options in a `<select>`.
    SelectOption,
    /// Set an input's value directly.
    SetInputValue,

    // Content
    /// Read page text.
    ReadPage,
    /// Accessibility snapshot.
    Snapshot,
    /// Capture the visible tab.
    Screenshot,
    /// Run a script in the page.
    ExecuteScript,
    /// Collected console output.
    GetConsoleLogs,

    // Tab groups
    /// List tab groups.
    ListGroups,
    /// Group tabs together.
    CreateGroup,
    /// Add tabs to an existing group.
    AddToGroup,
    /// Open URLs in a new group.
    OpenUrlsInGroup,
    /// Remove tabs from their group.
    UngroupTabs,
    /// Collapse or expand a group.
    CollapseGroup,
}

impl Action {
    /// Every action, in table order.
    pub const ALL: &'static [Action] = &[
        Self::Ping,
        Self::GetTabs,
        Self::GetActiveTab,
        Self::NewTab,
        Self::CloseTab,
        Self::FocusTab,
        Self::Navigate,
        Self::GoBack,
        Self::GoForward,
        Self::Click,
        Self::Type,
        Self::Hover,
        Self::DragDrop,
        Self::PressKey,
        Self::SelectOption,
        Self::SetInputValue,
        Self::ReadPage,
        Self::Snapshot,
        Self::Screenshot,
        Self::ExecuteScript,
        Self::GetConsoleLogs,
        Self::ListGroups,
        Self::CreateGroup,
        Self::AddToGroup,
        Self::OpenUrlsInGroup,
        Self::UngroupTabs,
        Self::CollapseGroup,
    ];

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::GetTabs => "getTabs",
            Self::GetActiveTab => "getActiveTab",
            Self::NewTab => "newTab",
            Self::CloseTab => "closeTab",
            Self::FocusTab => "focusTab",
            Self::Navigate => "navigate",
            Self::GoBack => "goBack",
            Self::GoForward => "goForward",
            Self::Click => "click",
            Self::Type => "type",
            Self::Hover => "hover",
            Self::DragDrop => "dragDrop",
            Self::PressKey => "pressKey",
            Self::SelectOption => "selectOption",
            Self::SetInputValue => "setInputValue",
            Self::ReadPage => "readPage",
            Self::Snapshot => "snapshot",
            Self::Screenshot => "screenshot",
            Self::ExecuteScript => "executeScript",
            Self::GetConsoleLogs => "getConsoleLogs",
            Self::ListGroups => "listGroups",
            Self::CreateGroup => "createGroup",
            Self::AddToGroup => "addToGroup",
            Self::OpenUrlsInGroup => "openUrlsInGroup",
            Self::UngroupTabs => "ungroupTabs",
            Self::CollapseGroup => "collapseGroup",
        }
    }

    /// Returns `true` for actions that only read browser state.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        matches!(
            self,
            Self::Ping
                | Self::GetTabs
                | Self::GetActiveTab
                | Self::ListGroups
                | Self::GetConsoleLogs
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| Error::bad_request(format!("Unknown action: {s}")))
    }
}

// ============================================================================
// Tests
// ============================================================================
