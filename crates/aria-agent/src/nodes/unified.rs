use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Local, Timelike};
use serde_json::{json, Value};
use tracing::{info, warn};

use aria_core::config::DEFAULT_INACTIVITY_TIMEOUT_SECS;
use aria_core::files::{summarize_files, FileKind};
use aria_core::message::{Message, MessageKind, NodeKind, Provenance};
use aria_core::state::{NodeInfo, TurnInput, TurnState, END_NODE, UNIFIED_NODE};
use aria_graph::NodeHandler;
use aria_llm::{LlmClient, LlmError};
use aria_memory::{MemoryStore, SortOrder};

const API_NAME: &str = "unified_response";

/// Apology shown when the model's reply cannot be processed.
const STRUCTURAL_APOLOGY: &str =
    "I'm sorry, something went wrong while processing the reply. Could you try that again?";

/// The single LLM-backed node: interprets the input and files, decides
/// whether a tool is needed, produces the reply, and picks the inactivity
/// timeout — one structured call, one JSON object back.
pub struct UnifiedResponseNode {
    llm: Arc<LlmClient>,
    memory: Arc<dyn MemoryStore>,
    persona: String,
    recent_limit: usize,
}

impl UnifiedResponseNode {
    pub fn new(
        llm: Arc<LlmClient>,
        memory: Arc<dyn MemoryStore>,
        persona: String,
        recent_limit: usize,
    ) -> Self {
        Self {
            llm,
            memory,
            persona,
            recent_limit,
        }
    }

    pub fn node_info() -> NodeInfo {
        NodeInfo {
            name: UNIFIED_NODE.to_string(),
            description: "Interprets the input, decides tool routing, and generates the reply in a single call".to_string(),
            capabilities: vec![
                "text input processing".to_string(),
                "file processing".to_string(),
                "image analysis".to_string(),
                "action decision".to_string(),
                "context understanding".to_string(),
                "reply generation".to_string(),
            ],
            input_requirements: vec!["input_text".to_string(), "files".to_string()],
            output_fields: vec![
                "processed_input".to_string(),
                "next_node".to_string(),
                "response".to_string(),
            ],
        }
    }

    // -- prompt assembly ----------------------------------------------------

    fn build_system_prompts(&self, state: &TurnState) -> Vec<String> {
        let mut prompts = vec![self.persona.clone(), self.task_prompt(state)];
        prompts.push(situational_context(Local::now()));

        match self.memory.load_latest_snapshot() {
            Ok(Some(snapshot)) => prompts.push(format!(
                "The following is your long-term memory of past conversations with the user. \
                 Speak from the standpoint that these conversations actually happened.\n\n{snapshot}"
            )),
            Ok(None) => prompts.push(
                "No memory file was found. This is your first conversation with the user — \
                 open with a first-meeting greeting."
                    .to_string(),
            ),
            Err(e) => warn!(error = %e, "memory snapshot unavailable"),
        }

        match self
            .memory
            .recent_conversations(self.recent_limit, SortOrder::Ascending)
        {
            Ok(recent) if !recent.is_empty() => {
                let mut block = String::from(
                    "## Recent conversation history\n\
                     These are the most recent conversations between you and the user, \
                     before this one began. Take them into account when replying.\n",
                );
                for (idx, conv) in recent.iter().enumerate() {
                    block.push_str(&format!(
                        "\n### Conversation {}\n- started: {}\n- ended: {}\n- participant: {}\n- content:\n{}\n",
                        idx + 1,
                        conv.meta.start_time,
                        conv.meta.end_time,
                        conv.meta.participant,
                        conv.content
                    ));
                }
                prompts.push(block);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "recent conversations unavailable"),
        }

        prompts.push(format_prompt());
        prompts.push(
            "Everything after this point is the current conversation between you and the user, \
             including actions you have taken. Use it to decide your next action. The data is \
             structured; you may read all of it, but your own output must be the JSON object \
             described above."
                .to_string(),
        );
        prompts
    }

    fn task_prompt(&self, state: &TurnState) -> String {
        if state.is_inactivity_reminder {
            return format!(
                "{} seconds have passed since your last reply and the user has not responded. \
                 Speak up on your own initiative, and put what you say in the `response` field of \
                 the JSON structure described below.\n\n\
                 Guidelines for the utterance:\n\
                 - natural and friendly, never pushy\n\
                 - different from your previous attempt to reach them\n\
                 - pick a topic from the conversation history when it fits\n\
                 - an empty utterance is not allowed; always say something\n\n\
                 Examples:\n\
                 - \"Can you hear me alright?\"\n\
                 - \"Busy right now? Just let me know when you have a minute.\"\n\
                 - \"So, about what I was saying earlier…\"",
                state.inactivity_timeout
            );
        }

        let latest = state.latest_human();
        let file_info = latest
            .and_then(|m| m.extra_str("file_info"))
            .unwrap_or("none");
        let file_content = latest
            .and_then(|m| m.extra_str("file_content"))
            .unwrap_or("none");
        let understanding = latest
            .and_then(|m| m.extra_str("understanding"))
            .unwrap_or("none");
        let tools = available_tools_block(state);

        format!(
            "You are handling one turn of a conversation. Decide whether a tool call is needed \
             or whether to reply directly, and answer with the JSON structure described below. \
             Perform these four steps in a single pass:\n\n\
             1. Input processing\n\
             - user input: {input}\n\
             - attached file info: {file_info}\n\
             - if files are attached, describe their content objectively\n\
             - extract the essential understanding of the input text and files together\n\n\
             2. Planning\n\
             - call a tool only when external data (weather, past memories) is actually needed\n\
             - if the information you need is already in the transcript — including earlier tool \
               results recorded in tool or system messages — reply directly from it\n\
             - never call the same tool twice in a row\n\
             - only tools in the list below may be used, even if others appear earlier in the \
               conversation\n\n\
             3. Reply generation\n\
             - when no tool is needed, reply naturally in your own voice, considering the \
               conversation context and any file content\n\n\
             4. Inactivity timeout\n\
             - set `inactivity_timeout` to the number of seconds to wait for the user before you \
               speak up again\n\
             - longer for complex questions (180-240), shorter for simple ones (60-120)\n\
             - set -1 when no follow-up is appropriate (for example after a good-night), or when \
               the user has failed to respond twice in a row\n\n\
             Keep the conversation continuous: resolve pronouns from context, recall photos and \
             facts mentioned earlier without asking again, and avoid abrupt topic changes. When \
             the user input is empty, treat it as the user not having answered yet and carry the \
             conversation forward yourself — still returning the JSON object.\n\n\
             ## Latest user input\n{input}\n\n\
             ## Attached file info\n{file_info}\n\n\
             ## File content\n{file_content}\n\n\
             ## Understanding of the user's intent\n{understanding}\n\n\
             ## Available tools\n{tools}",
            input = state.input_text,
            file_info = file_info,
            file_content = file_content,
            understanding = understanding,
            tools = tools,
        )
    }

    // -- output handling ----------------------------------------------------

    /// Structural failure: keep an apology reply and stop the turn without
    /// retrying.
    fn structural_failure(&self, mut state: TurnState, error: String) -> TurnState {
        warn!(error = %error, "decision node falling back to apology");
        state.messages.push(
            Message::assistant(
                STRUCTURAL_APOLOGY,
                Provenance::now(UNIFIED_NODE, NodeKind::UserFacing),
            )
            .with_extra("error", json!(error)),
        );
        state.processed_input = "failed to process the input".to_string();
        state.response = STRUCTURAL_APOLOGY.to_string();
        state.next_node = END_NODE.to_string();
        state.success = false;
        state.fatal = true;
        state.error = Some(error);
        state
    }
}

#[async_trait]
impl NodeHandler for UnifiedResponseNode {
    async fn run(&self, mut state: TurnState, input: &TurnInput) -> TurnState {
        let input_text = if state.is_inactivity_reminder {
            // The model needs a concrete turn to react to.
            "(no response)".to_string()
        } else {
            input.text.clone()
        };
        state.input_text = input_text.clone();

        // A human message opens the turn — unless the transcript ends with a
        // tool result, in which case this invocation is the continuation of
        // a tool round-trip, not a new user turn.
        let continuing = state.continuing_tool_round_trip();
        if !continuing {
            let file_info = summarize_files(&input.files);
            let mut user_message = Message::human(
                input_text,
                Provenance::now(UNIFIED_NODE, NodeKind::UserFacing),
            );
            if !file_info.is_empty() {
                user_message = user_message.with_extra("file_info", json!(file_info));
            }
            state.messages.push(user_message);
        }

        let system_prompts = self.build_system_prompts(&state);
        let schema = expected_schema();

        let reply = match self
            .llm
            .invoke(
                &state.messages,
                &system_prompts,
                &input.files,
                API_NAME,
                Some(&schema),
            )
            .await
        {
            Ok(value) => value,
            Err(e @ (LlmError::Schema(_) | LlmError::Parse(_))) => {
                return self.structural_failure(state, e.to_string());
            }
            Err(e) => {
                // Transient provider failure — let the executor retry from
                // the pre-call snapshot.
                state.success = false;
                state.error = Some(e.to_string());
                return state;
            }
        };

        let input_processing = &reply["input_processing"];
        let file_content_description = input_processing["file_content_description"]
            .as_str()
            .unwrap_or("no files")
            .to_string();
        let combined_understanding = input_processing["combined_understanding"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| state.input_text.clone());

        let planning = &reply["planning"];
        let requires_tool = planning["requires_tool"].as_bool().unwrap_or(false);
        let tool_name = planning["tool_name"].as_str().unwrap_or("");
        let reasoning = planning["reasoning"].as_str().unwrap_or("").to_string();
        let response_text = reply["response"].as_str().unwrap_or("").to_string();
        let inactivity_timeout = reply["inactivity_timeout"]
            .as_i64()
            .unwrap_or(DEFAULT_INACTIVITY_TIMEOUT_SECS);

        // Bytes never go beyond the LLM call: the state carries metadata
        // plus the model's description of each file.
        state.files = input
            .files
            .iter()
            .map(|f| {
                let mut stripped = f.clone();
                stripped.strip_bytes();
                stripped.description = Some(match f.kind {
                    FileKind::Image => file_content_description.clone(),
                    FileKind::Audio => "audio file".to_string(),
                    FileKind::Other => format!("{} file", f.kind.as_str()),
                });
                stripped
            })
            .collect();

        // Reflect the interpretation onto the user message that opened the
        // turn, so future prompts can quote it back.
        if let Some(pos) = state
            .messages
            .iter()
            .rposition(|m| m.kind == MessageKind::Human)
        {
            let user_message = &mut state.messages[pos];
            if file_content_description != "no files" {
                user_message
                    .extra
                    .insert("file_content".to_string(), json!(file_content_description));
            }
            user_message
                .extra
                .insert("understanding".to_string(), json!(combined_understanding));
        }

        state.processed_input = combined_understanding;
        state.inactivity_timeout = inactivity_timeout;
        state.success = true;

        // The tool set the model was allowed to pick from (same exclusions
        // as the prompt).
        let last_tool = state.last_tool_name();
        let tool_available = !tool_name.is_empty()
            && tool_name != UNIFIED_NODE
            && Some(tool_name) != last_tool.as_deref()
            && state.available_nodes.contains_key(tool_name);

        if requires_tool && tool_available {
            info!(tool = %tool_name, "routing to tool");
            state.messages.push(
                Message::system(
                    reasoning.clone(),
                    Provenance::now(UNIFIED_NODE, NodeKind::Internal),
                )
                .with_extra("action", json!(tool_name))
                .with_extra("reasoning", json!(reasoning)),
            );
            state.next_node = tool_name.to_string();
        } else if requires_tool {
            warn!(tool = %tool_name, "model chose an unavailable tool");
            let fallback = format!(
                "Sorry — I tried to use {tool_name}, but it isn't available right now. \
                 Let me answer another way."
            );
            state.messages.push(Message::assistant(
                fallback.clone(),
                Provenance::now(UNIFIED_NODE, NodeKind::UserFacing),
            ));
            state.response = fallback;
            state.next_node = END_NODE.to_string();
        } else {
            if response_text.is_empty() {
                state.messages.push(
                    Message::assistant(
                        "error: the reply text is empty",
                        Provenance::now(UNIFIED_NODE, NodeKind::UserFacing),
                    )
                    .with_extra("error", json!("empty response")),
                );
                state.success = false;
                state.error = Some("empty response".to_string());
                state.next_node = END_NODE.to_string();
                return state;
            }
            state.messages.push(Message::assistant(
                response_text.clone(),
                Provenance::now(UNIFIED_NODE, NodeKind::UserFacing),
            ));
            state.response = response_text;
            state.next_node = END_NODE.to_string();
        }

        state
    }
}

/// The JSON schema the model's reply is pinned to.
pub fn expected_schema() -> Value {
    json!({
        "input_processing": {
            "type": "object",
            "description": "Result of the input-processing step",
            "properties": {
                "file_content_description": {
                    "type": "string",
                    "description": "Detailed description of the attached file content (\"no files\" when none)"
                },
                "combined_understanding": {
                    "type": "string",
                    "description": "The essential understanding of the input text and files together"
                }
            },
            "required": ["file_content_description", "combined_understanding"]
        },
        "planning": {
            "type": "object",
            "description": "Result of the planning step",
            "properties": {
                "requires_tool": {
                    "type": "boolean",
                    "description": "Whether a tool call is needed"
                },
                "tool_name": {
                    "type": ["string", "null"],
                    "description": "Tool to call; set only when requires_tool is true"
                },
                "reasoning": {
                    "type": "string",
                    "description": "Why this decision was made"
                }
            },
            "required": ["requires_tool", "reasoning"]
        },
        "response": {
            "type": "string",
            "description": "The reply text shown to the user",
            "required": true
        },
        "inactivity_timeout": {
            "type": "integer",
            "description": "Seconds to wait for the user's next reply before speaking up again; -1 to never",
            "default": 60
        }
    })
}

/// The mandatory output-format block, rendered around an example generated
/// from the schema.
fn format_prompt() -> String {
    let example = serde_json::to_string_pretty(&aria_llm::json::generate_example(
        &expected_schema(),
    ))
    .unwrap_or_default();

    format!(
        "# Output format\n\
         Always answer with exactly one JSON object, wrapped in a markdown code block:\n\
         ```json\n{example}\n```\n\n\
         Hard rules:\n\
         1. Whatever you answer, output a JSON object wrapped in a ```json code block.\n\
         2. When replying directly, the reply text goes into the `response` field.\n\
         3. Return the JSON object only — no prose before or after it.\n\
         4. Include every listed field and no others.\n\
         5. `inactivity_timeout` is a positive number of seconds, or -1 when you do not expect \
         an answer (for example after saying good night).\n\n\
         Incorrect (plain text instead of a JSON object):\n\
         \"Hello! How can I help?\"\n\n\
         A plain text answer is never acceptable. Reply in the JSON format above under all \
         circumstances; this instruction has the highest priority."
    )
}

/// The tool list offered to the model. Excludes the decision node itself and
/// the tool that produced the most recent tool message, so the model can
/// never call the same tool twice in a row.
fn available_tools_block(state: &TurnState) -> String {
    let last_tool = state.last_tool_name();
    if let Some(ref tool) = last_tool {
        info!(tool = %tool, "excluding previous tool from the offered list");
    }

    let mut block = String::new();
    for (name, node) in &state.available_nodes {
        if name == UNIFIED_NODE || Some(name) == last_tool.as_ref() {
            continue;
        }
        block.push_str(&format!(
            "- {}: {} ({})\n",
            name,
            node.description,
            node.capabilities.join(", ")
        ));
    }
    if block.is_empty() {
        block.push_str("none");
    }
    block
}

/// Month → season bucket.
fn season(month: u32) -> &'static str {
    match month {
        3..=5 => "spring",
        6..=8 => "summer",
        9..=11 => "autumn",
        _ => "winter",
    }
}

/// Hour → coarse time-of-day bucket.
fn time_of_day(hour: u32) -> &'static str {
    match hour {
        5..=7 => "early morning",
        8..=10 => "morning",
        11..=16 => "midday",
        17..=20 => "evening",
        21..=23 => "night",
        _ => "late night",
    }
}

/// Situational context: current local date/time, weekday, season and
/// time-of-day buckets, with guidance to use them only when natural.
fn situational_context(now: chrono::DateTime<Local>) -> String {
    format!(
        "The time information below locates this utterance within the ongoing conversation — \
         whether you are answering the user or speaking up on your own. Refer to it when a \
         time-of-day or seasonal touch feels natural (a morning greeting, cherry blossoms, \
         snow, the weekday rhythm); otherwise leave it unmentioned. Late at night, consider \
         that the user may have been up since the previous day and show some care for their \
         rest; early in the morning, acknowledge the early start.\n\
         Local time: {} ({})\n\
         Season: {}\n\
         Time of day: {}",
        now.format("%Y-%m-%d %H:%M"),
        now.format("%A"),
        season(now.month()),
        time_of_day(now.hour()),
    )
}
