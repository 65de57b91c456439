//! Command routing
//!
//! Sends captured utterances to an Ollama-compatible chat endpoint with
//! tool-calling enabled. Tool calls (game launch, application launch,
//! system power actions) are executed locally; anything else falls through
//! to a persona completion so the device always has something to say.

use serde::{Deserialize, Serialize};

use crate::config::RouterConfig;
use crate::{Error, Result};

/// A routed reply ready for synthesis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedReply {
    /// Reply text to speak
    pub text: String,
    /// Name of the tool that ran, if any
    pub used_tool: Option<String>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<serde_json::Value>,
    stream: bool,
}

#[derive(Deserialize, Default)]
struct ChatResponse {
    #[serde(default)]
    message: ResponseMessage,
}

#[derive(Deserialize, Default)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

impl FunctionCall {
    /// Tool arguments as an object, tolerating JSON-encoded strings
    fn arguments_object(&self) -> serde_json::Map<String, serde_json::Value> {
        match &self.arguments {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::String(raw) => serde_json::from_str(raw).unwrap_or_default(),
            _ => serde_json::Map::new(),
        }
    }
}

/// Routes utterances to the language model and executes tool calls
pub struct CommandRouter {
    client: reqwest::Client,
    model: String,
    base_url: String,
    persona_prompt: String,
}

impl CommandRouter {
    /// Create a router for the configured endpoint
    #[must_use]
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            persona_prompt: config.persona_prompt.clone(),
        }
    }

    /// Route one utterance to a spoken reply
    ///
    /// # Errors
    ///
    /// Returns an error if the chat endpoint is unreachable or replies
    /// with garbage; the caller substitutes the canned failure clip.
    pub async fn route(&self, utterance: &str) -> Result<RoutedReply> {
        let response = self.chat_with_tools(utterance).await?;

        if !response.message.tool_calls.is_empty() {
            let results: Vec<String> = response
                .message
                .tool_calls
                .iter()
                .map(execute_tool)
                .collect();
            let used_tool = response
                .message
                .tool_calls
                .first()
                .map(|call| call.function.name.clone());
            return Ok(RoutedReply {
                text: results.join("\n"),
                used_tool,
            });
        }

        let text = self.persona_completion(utterance).await?;
        Ok(RoutedReply {
            text,
            used_tool: None,
        })
    }

    /// First pass: let the model pick a tool
    async fn chat_with_tools(&self, utterance: &str) -> Result<ChatResponse> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a command router. Prefer calling tools when they fit the request.",
                },
                ChatMessage {
                    role: "user",
                    content: utterance,
                },
            ],
            tools: Some(tool_definitions()),
            stream: false,
        };

        self.send_chat(&request).await
    }

    /// Second pass: in-character reply when no tool matched
    async fn persona_completion(&self, utterance: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.persona_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: utterance,
                },
            ],
            tools: None,
            stream: false,
        };

        let response = self.send_chat(&request).await?;
        Ok(response
            .message
            .content
            .filter(|content| !content.trim().is_empty())
            .unwrap_or_else(|| "I'm thinking, but I stayed quiet.".to_string()))
    }

    async fn send_chat(&self, request: &ChatRequest<'_>) -> Result<ChatResponse> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Router(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Router(format!("chat error {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Router(e.to_string()))
    }
}

/// Run one tool call, reporting the outcome as speakable text
fn execute_tool(call: &ToolCall) -> String {
    let name = call.function.name.as_str();
    let args = call.function.arguments_object();
    tracing::info!(tool = name, "executing tool");

    match name {
        "launch_game" => launch_game(&args),
        "launch_application" => launch_application(&args),
        "system_control" => system_control(&args),
        _ => format!("I do not have a handler for {name}."),
    }
}

/// Tool schemas advertised to the model
fn tool_definitions() -> serde_json::Value {
    serde_json::json!([
        {
            "type": "function",
            "function": {
                "name": "launch_game",
                "description": "Launch a ROM in RetroArch. Use this when the user asks to play a specific game or platform.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "rom_path": {
                            "type": "string",
                            "description": "Absolute path to the ROM file requested by the user."
                        },
                        "core_path": {
                            "type": "string",
                            "description": "Optional: path to a specific RetroArch core to load before the ROM."
                        }
                    },
                    "required": ["rom_path"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "launch_application",
                "description": "Start a desktop or system application with optional arguments.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "command": {
                            "type": "string",
                            "description": "Command to execute (e.g. 'spotify', 'vlc --fullscreen')."
                        }
                    },
                    "required": ["command"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "system_control",
                "description": "Perform a system level action like shutdown, reboot, or sleep.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "action": {
                            "type": "string",
                            "enum": ["shutdown", "reboot", "sleep"],
                            "description": "The system action to perform."
                        }
                    },
                    "required": ["action"]
                }
            }
        }
    ])
}

fn string_arg<'a>(
    args: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<&'a str> {
    args.get(key).and_then(|value| value.as_str())
}

fn launch_game(args: &serde_json::Map<String, serde_json::Value>) -> String {
    let Some(rom_path) = string_arg(args, "rom_path") else {
        return "I need a ROM path to launch a game.".to_string();
    };

    let mut command = std::process::Command::new("retroarch");
    if let Some(core_path) = string_arg(args, "core_path") {
        command.args(["-L", core_path]);
    }
    command.arg(rom_path);

    let rom_name = std::path::Path::new(rom_path)
        .file_name()
        .map_or_else(|| rom_path.to_string(), |n| n.to_string_lossy().to_string());

    match command.spawn() {
        Ok(_) => format!("Launching RetroArch with {rom_name}."),
        Err(e) => {
            tracing::warn!(error = %e, "retroarch launch failed");
            format!("I couldn't start RetroArch: {e}.")
        }
    }
}

fn launch_application(args: &serde_json::Map<String, serde_json::Value>) -> String {
    let Some(command_line) = string_arg(args, "command") else {
        return "I need a command to launch an application.".to_string();
    };

    let mut parts = command_line.split_whitespace();
    let Some(program) = parts.next() else {
        return "I need a command to launch an application.".to_string();
    };

    match std::process::Command::new(program).args(parts).spawn() {
        Ok(_) => format!("Launching application: {command_line}."),
        Err(e) => {
            tracing::warn!(error = %e, command = command_line, "application launch failed");
            format!("I couldn't start {program}: {e}.")
        }
    }
}

fn system_control(args: &serde_json::Map<String, serde_json::Value>) -> String {
    let command: &[&str] = match string_arg(args, "action") {
        Some("shutdown") => &["sudo", "shutdown", "now"],
        Some("reboot") => &["sudo", "reboot"],
        Some("sleep") => &["systemctl", "suspend"],
        Some(other) => return format!("Unknown system action: {other}."),
        None => return "I need a system action to perform.".to_string(),
    };

    let reply = match string_arg(args, "action") {
        Some("shutdown") => "Shutting down now.",
        Some("reboot") => "Rebooting now.",
        _ => "Going to sleep.",
    };

    match std::process::Command::new(command[0]).args(&command[1..]).spawn() {
        Ok(_) => reply.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "system control failed");
            format!("I couldn't run that system action: {e}.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_response_parses() {
        let response: ChatResponse = serde_json::from_str(
            r#"{
                "message": {
                    "content": "",
                    "tool_calls": [
                        {"function": {"name": "launch_game", "arguments": {"rom_path": "/roms/game.sfc"}}}
                    ]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(response.message.tool_calls.len(), 1);
        let call = &response.message.tool_calls[0];
        assert_eq!(call.function.name, "launch_game");
        assert_eq!(
            call.function.arguments_object().get("rom_path").unwrap(),
            "/roms/game.sfc"
        );
    }

    #[test]
    fn plain_reply_response_parses() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"message": {"content": "Hello there!"}}"#,
        )
        .unwrap();

        assert!(response.message.tool_calls.is_empty());
        assert_eq!(response.message.content.as_deref(), Some("Hello there!"));
    }

    #[test]
    fn string_encoded_arguments_are_tolerated() {
        let call: ToolCall = serde_json::from_str(
            r#"{"function": {"name": "launch_application", "arguments": "{\"command\": \"vlc\"}"}}"#,
        )
        .unwrap();

        assert_eq!(
            call.function.arguments_object().get("command").unwrap(),
            "vlc"
        );
    }

    #[test]
    fn unknown_tool_reports_missing_handler() {
        let call: ToolCall = serde_json::from_str(
            r#"{"function": {"name": "order_pizza", "arguments": {}}}"#,
        )
        .unwrap();

        assert_eq!(
            execute_tool(&call),
            "I do not have a handler for order_pizza."
        );
    }

    #[test]
    fn tool_handlers_validate_arguments() {
        let empty = serde_json::Map::new();
        assert!(launch_game(&empty).contains("ROM path"));
        assert!(launch_application(&empty).contains("command"));
        assert!(system_control(&empty).contains("system action"));

        let mut bogus = serde_json::Map::new();
        bogus.insert(
            "action".to_string(),
            serde_json::Value::String("dance".to_string()),
        );
        assert_eq!(system_control(&bogus), "Unknown system action: dance.");
    }

    #[test]
    fn tool_definitions_cover_all_handlers() {
        let tools = tool_definitions();
        let names: Vec<&str> = tools
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["function"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec!["launch_game", "launch_application", "system_control"]
        );
    }
}
