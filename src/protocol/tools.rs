//! MCP tool catalog.
//!
//! Each tool maps to one [`Action`] or to the local delay handled by the
//! adapters themselves.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value, json};

use super::Action;

// ============================================================================
// Types
// ============================================================================

/// What a tool invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolTarget {
    /// Forward to the agent.
    Peer(Action),
    /// Sleep locally without touching the agent.
    Wait,
}

/// JSON schema type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// `"string"`.
    String,
    /// `"number"`.
    Number,
    /// `"boolean"`.
    Boolean,
    /// `"array"` of strings.
    StringArray,
}

/// One tool parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    /// Argument name.
    pub name: &'static str,
    /// Schema type.
    pub kind: ParamType,
    /// Text shown to the client.
    pub description: &'static str,
    /// Listed under `required` in the input schema.
    pub required: bool,
}

/// One entry of the tool catalog.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    /// Tool name, e.g. `browser_navigate`.
    pub name: &'static str,
    /// Text shown to the client.
    pub description: &'static str,
    /// Agent action or local handling.
    pub target: ToolTarget,
    /// Input schema properties.
    pub params: &'static [ParamSpec],
}

// ============================================================================
// Catalog
// ============================================================================

const fn param(
    name: &'static str,
    kind: ParamType,
    description: &'static str,
    required: bool,
) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        description,
        required,
    }
}

const TAB_ID: ParamSpec = param("tabId", ParamType::Number, "Optional tab ID", false);

/// Tool name of the local delay.
pub const WAIT_TOOL: &str = "browser_wait";

/// Tool name whose result is returned as image content.
pub const SCREENSHOT_TOOL: &str = "browser_screenshot";

/// The static tool table.
pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "browser_navigate",
        description: "Navigate to a URL",
        target: ToolTarget::Peer(Action::Navigate),
        params: &[
            param("url", ParamType::String, "URL to navigate to", true),
            TAB_ID,
        ],
    },
    ToolSpec {
        name: "browser_back",
        description: "Go back in browser history",
        target: ToolTarget::Peer(Action::GoBack),
        params: &[TAB_ID],
    },
    ToolSpec {
        name: "browser_forward",
        description: "Go forward in browser history",
        target: ToolTarget::Peer(Action::GoForward),
        params: &[TAB_ID],
    },
    ToolSpec {
        name: "browser_click",
        description: "Click an element on the page",
        target: ToolTarget::Peer(Action::Click),
        params: &[
            param("selector", ParamType::String, "CSS selector to click", false),
            param("x", ParamType::Number, "X coordinate (alternative to selector)", false),
            param("y", ParamType::Number, "Y coordinate (alternative to selector)", false),
            TAB_ID,
        ],
    },
    ToolSpec {
        name: "browser_type",
        description: "Type text into an element",
        target: ToolTarget::Peer(Action::Type),
        params: &[
            param("text", ParamType::String, "Text to type", true),
            param(
                "selector",
                ParamType::String,
                "CSS selector (optional, uses focused element)",
                false,
            ),
            param("submit", ParamType::Boolean, "Press Enter after typing", false),
            TAB_ID,
        ],
    },
    ToolSpec {
        name: "browser_hover",
        description: "Hover over an element",
        target: ToolTarget::Peer(Action::Hover),
        params: &[
            param("selector", ParamType::String, "CSS selector to hover", false),
            param("x", ParamType::Number, "X coordinate (alternative)", false),
            param("y", ParamType::Number, "Y coordinate (alternative)", false),
            TAB_ID,
        ],
    },
    ToolSpec {
        name: "browser_drag",
        description: "Drag and drop between elements",
        target: ToolTarget::Peer(Action::DragDrop),
        params: &[
            param("from", ParamType::String, "Source element selector", true),
            param("to", ParamType::String, "Target element selector", true),
            TAB_ID,
        ],
    },
    ToolSpec {
        name: "browser_press_key",
        description: "Press a keyboard key",
        target: ToolTarget::Peer(Action::PressKey),
        params: &[
            param("key", ParamType::String, "Key to press (Enter, Tab, Escape, etc.)", true),
            TAB_ID,
        ],
    },
    ToolSpec {
        name: "browser_select",
        description: "Select option in a dropdown",
        target: ToolTarget::Peer(Action::SelectOption),
        params: &[
            param("selector", ParamType::String, "Select element CSS selector", true),
            param("values", ParamType::StringArray, "Values to select", true),
            TAB_ID,
        ],
    },
    ToolSpec {
        name: "browser_snapshot",
        description: "Get accessibility snapshot of the page",
        target: ToolTarget::Peer(Action::Snapshot),
        params: &[TAB_ID],
    },
    ToolSpec {
        name: SCREENSHOT_TOOL,
        description: "Take a screenshot of the visible tab",
        target: ToolTarget::Peer(Action::Screenshot),
        params: &[TAB_ID],
    },
    ToolSpec {
        name: "browser_console_logs",
        description: "Get console logs from the page",
        target: ToolTarget::Peer(Action::GetConsoleLogs),
        params: &[TAB_ID],
    },
    ToolSpec {
        name: "browser_tabs",
        description: "List all open browser tabs",
        target: ToolTarget::Peer(Action::GetTabs),
        params: &[],
    },
    ToolSpec {
        name: "browser_new_tab",
        description: "Open a new browser tab",
        target: ToolTarget::Peer(Action::NewTab),
        params: &[param("url", ParamType::String, "URL to open (optional)", false)],
    },
    ToolSpec {
        name: "browser_close_tab",
        description: "Close a browser tab",
        target: ToolTarget::Peer(Action::CloseTab),
        params: &[param("tabId", ParamType::Number, "Tab ID to close", true)],
    },
    ToolSpec {
        name: WAIT_TOOL,
        description: "Wait for specified seconds",
        target: ToolTarget::Wait,
        params: &[param("time", ParamType::Number, "Seconds to wait", true)],
    },
];

// ============================================================================
// Lookup & Rendering
// ============================================================================

/// Finds a tool by name.
#[must_use]
pub fn find_tool(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|tool| tool.name == name)
}

impl ToolSpec {
    /// Renders the JSON schema for this tool's arguments.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for p in self.params {
            let schema = match p.kind {
                ParamType::String => json!({ "type": "string", "description": p.description }),
                ParamType::Number => json!({ "type": "number", "description": p.description }),
                ParamType::Boolean => json!({ "type": "boolean", "description": p.description }),
                ParamType::StringArray => json!({
                    "type": "array",
                    "items": { "type": "string" },
                    "description": p.description,
                }),
            };
            properties.insert(p.name.to_string(), schema);
            if p.required {
                required.push(Value::String(p.name.to_string()));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), Value::Array(required));
        }
        Value::Object(schema)
    }

    /// Renders the `tools/list` entry.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }
}

/// Renders the whole catalog for `tools/list`.
#[must_use]
pub fn tool_catalog() -> Value {
    Value::Array(TOOLS.iter().map(ToolSpec::to_json).collect())
}

// ============================================================================
// Tests
// ============================================================================
