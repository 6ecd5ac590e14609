//! In-app navigation driven by the assistant
//!
//! The remote model can call a single function, `navigateTo`, with one of the
//! application's views. Each call is forwarded to the host's [`Navigator`] and
//! answered with a function response carrying the call's id.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::live::{FunctionCall, FunctionDeclaration, FunctionResponse};

/// Name of the navigation function exposed to the model
pub const NAVIGATE_FUNCTION: &str = "navigateTo";

/// Application views the assistant can switch to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Dashboard,
    Photo,
    Audio,
    Scripts,
    Meetings,
    Projects,
}

impl View {
    pub const ALL: [View; 6] = [
        View::Dashboard,
        View::Photo,
        View::Audio,
        View::Scripts,
        View::Meetings,
        View::Projects,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::Dashboard => "dashboard",
            View::Photo => "photo",
            View::Audio => "audio",
            View::Scripts => "scripts",
            View::Meetings => "meetings",
            View::Projects => "projects",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        View::ALL
            .into_iter()
            .find(|view| view.as_str() == s)
            .ok_or_else(|| format!("unknown view '{}'", s))
    }
}

/// Host-side navigation hook
pub trait Navigator: Send + Sync {
    fn navigate(&self, view: View) -> anyhow::Result<()>;
}

impl<F> Navigator for F
where
    F: Fn(View) -> anyhow::Result<()> + Send + Sync,
{
    fn navigate(&self, view: View) -> anyhow::Result<()> {
        self(view)
    }
}

/// Declaration sent in the session setup
pub fn navigate_declaration() -> FunctionDeclaration {
    let views: Vec<&str> = View::ALL.iter().map(View::as_str).collect();

    FunctionDeclaration {
        name: NAVIGATE_FUNCTION.to_string(),
        description: "Navigates the user to a specific module or page within the studio application."
            .to_string(),
        parameters: json!({
            "type": "OBJECT",
            "properties": {
                "view": {
                    "type": "STRING",
                    "description": "The ID of the view to navigate to.",
                    "enum": views,
                }
            },
            "required": ["view"],
        }),
    }
}

/// Maps function calls onto the navigator
pub struct CommandBridge {
    navigator: Box<dyn Navigator>,
}

impl CommandBridge {
    pub fn new(navigator: Box<dyn Navigator>) -> Self {
        Self { navigator }
    }

    /// Functions this bridge can answer
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        vec![navigate_declaration()]
    }

    /// Handle one function call
    ///
    /// The navigator runs before the response is built. Unknown function names
    /// get no response at all.
    pub fn dispatch(&self, call: &FunctionCall) -> Option<FunctionResponse> {
        if call.name != NAVIGATE_FUNCTION {
            warn!("Ignoring call to unknown function '{}' (id {})", call.name, call.id);
            return None;
        }

        let view = match call.args.get("view").and_then(|v| v.as_str()) {
            Some(raw) => match raw.parse::<View>() {
                Ok(view) => view,
                Err(e) => {
                    warn!("Rejecting navigateTo call {}: {}", call.id, e);
                    return Some(FunctionResponse::failure(&call.id, &call.name, e));
                }
            },
            None => {
                warn!("Rejecting navigateTo call {}: missing view", call.id);
                return Some(FunctionResponse::failure(
                    &call.id,
                    &call.name,
                    "missing required argument 'view'",
                ));
            }
        };

        match self.navigator.navigate(view) {
            Ok(()) => {
                info!("Navigated to {}", view);
                Some(FunctionResponse::success(
                    &call.id,
                    &call.name,
                    format!("Success. Navigated to {}", view),
                ))
            }
            Err(e) => {
                warn!("Navigation to {} failed: {:#}", view, e);
                Some(FunctionResponse::failure(&call.id, &call.name, format!("{:#}", e)))
            }
        }
    }
}
