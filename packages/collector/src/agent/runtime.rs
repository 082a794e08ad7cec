//! Generic tool-calling loop.
//!
//! Drives an LLM/tool dialogue: send the conversation, execute the tool
//! calls in the reply in order, append one tool message per call, repeat
//! until the model finishes, the turn budget runs out, or the task is
//! cancelled. Tool faults are returned to the model as error payloads; the
//! loop itself never aborts on them.

use llm_client::{ChatMessage, ToolCall, ToolRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::tools::{BROWSE_PAGE, FINISH, SAVE_RESULT, SAVE_RESULTS_BATCH};
use crate::llm::LanguageModel;

/// Tool results larger than this are eligible for pruning.
const PRUNE_THRESHOLD_CHARS: usize = 2_000;

/// Consecutive browse turns without a new save before the runtime hints the
/// agent to finish.
const EMPTY_BROWSE_HINT_THRESHOLD: u32 = 2;

/// Inputs for one agent run.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub system_prompt: String,
    pub user_message: String,
    /// Hard cap on LLM round-trips.
    pub max_turns: usize,
    /// Rewrite past large tool results after successful batch saves.
    pub enable_pruning: bool,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The model called `finish` or answered with plain text.
    Finished,
    ExhaustedTurns,
    Cancelled,
    LlmFailed,
}

/// Result of one agent run. Saved items live in the accumulator the tools
/// were built over; this carries everything else.
#[derive(Debug)]
pub struct AgentOutcome {
    pub turns_used: usize,
    pub final_text: String,
    pub termination: Termination,
    pub error: Option<String>,
}

/// Progress callback; receives short status lines.
pub type ProgressFn<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// The tool-calling loop over a model and a tool registry.
pub struct AgentRunner<'a> {
    model: &'a dyn LanguageModel,
    tools: &'a ToolRegistry,
}

impl<'a> AgentRunner<'a> {
    pub fn new(model: &'a dyn LanguageModel, tools: &'a ToolRegistry) -> Self {
        Self { model, tools }
    }

    pub async fn run(
        &self,
        spec: &AgentSpec,
        cancel: &CancellationToken,
        on_progress: ProgressFn<'_>,
    ) -> AgentOutcome {
        let definitions = self.tools.definitions();
        let mut messages = vec![
            ChatMessage::system(&spec.system_prompt),
            ChatMessage::user(&spec.user_message),
        ];

        let mut outcome = AgentOutcome {
            turns_used: 0,
            final_text: String::new(),
            termination: Termination::ExhaustedTurns,
            error: None,
        };
        let mut consecutive_empty_browses: u32 = 0;

        for turn in 0..spec.max_turns {
            if cancel.is_cancelled() {
                outcome.termination = Termination::Cancelled;
                return outcome;
            }

            outcome.turns_used = turn + 1;
            on_progress(&format!("turn {}/{}", turn + 1, spec.max_turns));

            let assistant = match self
                .model
                .complete_with_tools(&messages, &definitions)
                .await
            {
                Ok(msg) => msg,
                Err(err) => {
                    warn!(error = %err, "LLM turn failed");
                    outcome.termination = Termination::LlmFailed;
                    outcome.error = Some(err.to_string());
                    return outcome;
                }
            };

            messages.push(assistant.to_chat_message());

            if !assistant.has_tool_calls() {
                // Plain text answer: natural termination.
                outcome.final_text = assistant.content;
                outcome.termination = Termination::Finished;
                return outcome;
            }

            let mut turn_had_browse = false;
            let mut turn_saved = false;

            for call in &assistant.tool_calls {
                if call.name == BROWSE_PAGE {
                    turn_had_browse = true;
                    on_progress(&format!("browsing {}", preview_url(call)));
                }

                let result = match self.tools.dispatch(&call.name, &call.arguments).await {
                    Ok(json) => json,
                    Err(err) => {
                        // Returned to the model as data so it can correct
                        // itself on the next turn.
                        warn!(tool = %call.name, error = %err, "tool call failed");
                        serde_json::json!({ "error": err.to_string() }).to_string()
                    }
                };

                if is_successful_save(&call.name, &result) {
                    turn_saved = true;
                }

                messages.push(ChatMessage::tool(&call.id, &result));

                if spec.enable_pruning
                    && call.name == SAVE_RESULTS_BATCH
                    && is_successful_save(&call.name, &result)
                {
                    prune_latest_large_tool_result(&mut messages, harvested_total(&result));
                }

                if call.name == FINISH {
                    outcome.final_text = finish_summary(call);
                    outcome.termination = Termination::Finished;
                    info!(turns = outcome.turns_used, "agent finished");
                    return outcome;
                }
            }

            if turn_had_browse {
                if turn_saved {
                    consecutive_empty_browses = 0;
                } else {
                    consecutive_empty_browses += 1;
                }
                if consecutive_empty_browses >= EMPTY_BROWSE_HINT_THRESHOLD {
                    on_progress(&format!(
                        "{consecutive_empty_browses} pages without new items, hinting finish"
                    ));
                    messages.push(ChatMessage::user(format!(
                        "The last {consecutive_empty_browses} pages yielded no new items in \
                         the target date range. Call finish to end this section."
                    )));
                }
            }
        }

        info!(turns = outcome.turns_used, "agent exhausted its turn budget");
        outcome
    }
}

fn preview_url(call: &ToolCall) -> String {
    serde_json::from_str::<serde_json::Value>(&call.arguments)
        .ok()
        .and_then(|v| v.get("url").and_then(|u| u.as_str()).map(String::from))
        .map(|u| u.chars().take(80).collect())
        .unwrap_or_default()
}

fn finish_summary(call: &ToolCall) -> String {
    serde_json::from_str::<serde_json::Value>(&call.arguments)
        .ok()
        .and_then(|v| v.get("summary").and_then(|s| s.as_str()).map(String::from))
        .unwrap_or_default()
}

/// Whether a save tool result reports at least one newly accepted item.
fn is_successful_save(tool_name: &str, result_json: &str) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(result_json) else {
        return false;
    };
    match tool_name {
        SAVE_RESULTS_BATCH => value
            .get("accepted_count")
            .and_then(|c| c.as_u64())
            .unwrap_or(0)
            > 0,
        SAVE_RESULT => value.get("accepted").and_then(|a| a.as_bool()) == Some(true),
        _ => false,
    }
}

fn harvested_total(result_json: &str) -> u64 {
    serde_json::from_str::<serde_json::Value>(result_json)
        .ok()
        .and_then(|v| {
            v.get("total")
                .or_else(|| v.get("accepted_count"))
                .and_then(|n| n.as_u64())
        })
        .unwrap_or(0)
}

/// Rewrite the most recent large tool result to a compact marker.
///
/// Touches only the `content` of one historical tool message; count, roles,
/// call ids and ordering are left as they were.
fn prune_latest_large_tool_result(messages: &mut [ChatMessage], harvested: u64) -> bool {
    for msg in messages.iter_mut().rev() {
        if msg.role == "tool" && msg.content.chars().count() > PRUNE_THRESHOLD_CHARS {
            msg.content = format!(
                "[page processed, {harvested} items harvested, original content elided]"
            );
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use llm_client::{
        AssistantMessage, CompletionOptions, LlmError, Tool, ToolDefinition, ToolRegistry,
    };
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};

    use crate::agent::tools::{ItemAccumulator, SaveBatchTool, SharedAccumulator};

    /// Model that replays a fixed sequence of assistant turns.
    struct ScriptedModel {
        turns: Mutex<VecDeque<AssistantMessage>>,
    }

    impl ScriptedModel {
        fn new(turns: Vec<AssistantMessage>) -> Self {
            Self {
                turns: Mutex::new(turns.into()),
            }
        }
    }

    #[async_trait]
    impl crate::llm::LanguageModel for ScriptedModel {
        async fn complete_text(
            &self,
            _system: &str,
            _user: &str,
            _opts: CompletionOptions,
        ) -> Result<String, LlmError> {
            Err(LlmError::Config("text completion not scripted".into()))
        }

        async fn complete_with_tools(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<AssistantMessage, LlmError> {
            self.turns
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::Api {
                    status: 500,
                    message: "script exhausted".into(),
                })
        }
    }

    fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    fn assistant_with_calls(calls: Vec<ToolCall>) -> AssistantMessage {
        AssistantMessage {
            content: String::new(),
            tool_calls: calls,
        }
    }

    /// Tool with a deliberately large output, standing in for browse_page.
    #[derive(Deserialize, JsonSchema)]
    struct BigArgs {}

    #[derive(Serialize)]
    struct BigOutput {
        text: String,
    }

    struct BigTool;

    #[async_trait]
    impl Tool for BigTool {
        const NAME: &'static str = "browse_page";
        type Args = BigArgs;
        type Output = BigOutput;
        type Error = std::convert::Infallible;

        fn description(&self) -> &str {
            "Return a large page"
        }

        async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
            Ok(BigOutput {
                text: "x".repeat(3_000),
            })
        }
    }

    fn accumulator() -> SharedAccumulator {
        Arc::new(Mutex::new(ItemAccumulator::new(Vec::new(), None, 30)))
    }

    fn batch_args(urls: &[&str]) -> String {
        let rendered: Vec<serde_json::Value> = urls
            .iter()
            .map(|u| {
                serde_json::json!({
                    "title": "A sufficiently descriptive title",
                    "url": u,
                    "published_date": "2026-01-30",
                })
            })
            .collect();
        serde_json::json!({ "items": rendered }).to_string()
    }

    fn spec(max_turns: usize, enable_pruning: bool) -> AgentSpec {
        AgentSpec {
            system_prompt: "collect articles".into(),
            user_message: "start".into(),
            max_turns,
            enable_pruning,
        }
    }

    fn no_progress() -> impl Fn(&str) + Send + Sync {
        |_: &str| {}
    }

    #[tokio::test]
    async fn test_finish_terminates_after_reply() {
        let acc = accumulator();
        let registry = ToolRegistry::new()
            .register(SaveBatchTool::new(acc.clone()))
            .register(crate::agent::tools::FinishTool);
        let model = ScriptedModel::new(vec![assistant_with_calls(vec![tool_call(
            "c1",
            "finish",
            r#"{"summary":"all done"}"#,
        )])]);

        let progress = no_progress();
        let outcome = AgentRunner::new(&model, &registry)
            .run(&spec(5, false), &CancellationToken::new(), &progress)
            .await;

        assert_eq!(outcome.termination, Termination::Finished);
        assert_eq!(outcome.final_text, "all done");
        assert_eq!(outcome.turns_used, 1);
    }

    #[tokio::test]
    async fn test_plain_text_is_natural_termination() {
        let registry = ToolRegistry::new().register(crate::agent::tools::FinishTool);
        let model = ScriptedModel::new(vec![AssistantMessage {
            content: "nothing new this week".into(),
            tool_calls: vec![],
        }]);

        let progress = no_progress();
        let outcome = AgentRunner::new(&model, &registry)
            .run(&spec(5, false), &CancellationToken::new(), &progress)
            .await;

        assert_eq!(outcome.termination, Termination::Finished);
        assert_eq!(outcome.final_text, "nothing new this week");
    }

    #[tokio::test]
    async fn test_exhausted_turns() {
        let acc = accumulator();
        let registry = ToolRegistry::new().register(SaveBatchTool::new(acc.clone()));
        // Two turns of saving without ever finishing, against max_turns = 2.
        let model = ScriptedModel::new(vec![
            assistant_with_calls(vec![tool_call(
                "c1",
                SAVE_RESULTS_BATCH,
                &batch_args(&["https://a.gov/1.htm"]),
            )]),
            assistant_with_calls(vec![tool_call(
                "c2",
                SAVE_RESULTS_BATCH,
                &batch_args(&["https://a.gov/2.htm"]),
            )]),
        ]);

        let progress = no_progress();
        let outcome = AgentRunner::new(&model, &registry)
            .run(&spec(2, false), &CancellationToken::new(), &progress)
            .await;

        assert_eq!(outcome.termination, Termination::ExhaustedTurns);
        assert_eq!(outcome.turns_used, 2);
        // Items saved before exhaustion survive.
        assert_eq!(acc.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_turn() {
        let registry = ToolRegistry::new().register(crate::agent::tools::FinishTool);
        let model = ScriptedModel::new(vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let progress = no_progress();
        let outcome = AgentRunner::new(&model, &registry)
            .run(&spec(5, false), &cancel, &progress)
            .await;

        assert_eq!(outcome.termination, Termination::Cancelled);
        assert_eq!(outcome.turns_used, 0);
    }

    #[tokio::test]
    async fn test_llm_failure_surfaces() {
        let registry = ToolRegistry::new().register(crate::agent::tools::FinishTool);
        let model = ScriptedModel::new(vec![]); // first call already fails

        let progress = no_progress();
        let outcome = AgentRunner::new(&model, &registry)
            .run(&spec(5, false), &CancellationToken::new(), &progress)
            .await;

        assert_eq!(outcome.termination, Termination::LlmFailed);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_unknown_tool_reported_to_model_and_loop_continues() {
        let registry = ToolRegistry::new().register(crate::agent::tools::FinishTool);
        let model = ScriptedModel::new(vec![
            assistant_with_calls(vec![tool_call("c1", "no_such_tool", "{}")]),
            assistant_with_calls(vec![tool_call("c2", "finish", "{}")]),
        ]);

        let progress = no_progress();
        let outcome = AgentRunner::new(&model, &registry)
            .run(&spec(5, false), &CancellationToken::new(), &progress)
            .await;

        // The bad call did not abort the run.
        assert_eq!(outcome.termination, Termination::Finished);
        assert_eq!(outcome.turns_used, 2);
    }

    #[tokio::test]
    async fn test_pruning_rewrites_one_large_result_only() {
        let acc = accumulator();
        let registry = ToolRegistry::new()
            .register(BigTool)
            .register(SaveBatchTool::new(acc.clone()))
            .register(crate::agent::tools::FinishTool);

        let model = ScriptedModel::new(vec![
            assistant_with_calls(vec![tool_call("c1", "browse_page", "{}")]),
            assistant_with_calls(vec![tool_call(
                "c2",
                SAVE_RESULTS_BATCH,
                &batch_args(&["https://a.gov/1.htm", "https://a.gov/2.htm"]),
            )]),
            assistant_with_calls(vec![tool_call("c3", "finish", "{}")]),
        ]);

        let progress = no_progress();
        let outcome = AgentRunner::new(&model, &registry)
            .run(&spec(5, true), &CancellationToken::new(), &progress)
            .await;

        assert_eq!(outcome.termination, Termination::Finished);
        assert_eq!(acc.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_prune_preserves_structure() {
        let mut messages = vec![
            ChatMessage::system("s"),
            ChatMessage::user("u"),
            ChatMessage::assistant("a1"),
            ChatMessage::tool("c1", "y".repeat(5_000)),
            ChatMessage::assistant("a2"),
            ChatMessage::tool("c2", "small"),
        ];
        let before_roles: Vec<String> = messages.iter().map(|m| m.role.clone()).collect();
        let before_ids: Vec<Option<String>> =
            messages.iter().map(|m| m.tool_call_id.clone()).collect();

        assert!(prune_latest_large_tool_result(&mut messages, 7));

        let after_roles: Vec<String> = messages.iter().map(|m| m.role.clone()).collect();
        let after_ids: Vec<Option<String>> =
            messages.iter().map(|m| m.tool_call_id.clone()).collect();

        assert_eq!(messages.len(), 6);
        assert_eq!(before_roles, after_roles);
        assert_eq!(before_ids, after_ids);
        // Exactly one content changed: the large tool result.
        assert!(messages[3].content.contains("7 items harvested"));
        assert_eq!(messages[5].content, "small");
        assert_eq!(messages[2].content, "a1");
    }

    #[test]
    fn test_prune_no_large_result_is_noop() {
        let mut messages = vec![
            ChatMessage::system("s"),
            ChatMessage::tool("c1", "small"),
        ];
        assert!(!prune_latest_large_tool_result(&mut messages, 1));
        assert_eq!(messages[1].content, "small");
    }

    #[tokio::test]
    async fn test_calls_within_one_turn_execute_in_textual_order() {
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        #[derive(Deserialize, JsonSchema)]
        struct Empty {}

        #[derive(Serialize)]
        struct Ack {}

        struct FirstTool(Arc<Mutex<Vec<&'static str>>>);
        struct SecondTool(Arc<Mutex<Vec<&'static str>>>);

        #[async_trait]
        impl Tool for FirstTool {
            const NAME: &'static str = "first_tool";
            type Args = Empty;
            type Output = Ack;
            type Error = std::convert::Infallible;

            fn description(&self) -> &str {
                "first"
            }

            async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
                self.0.lock().unwrap().push("first_tool");
                Ok(Ack {})
            }
        }

        #[async_trait]
        impl Tool for SecondTool {
            const NAME: &'static str = "second_tool";
            type Args = Empty;
            type Output = Ack;
            type Error = std::convert::Infallible;

            fn description(&self) -> &str {
                "second"
            }

            async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
                self.0.lock().unwrap().push("second_tool");
                Ok(Ack {})
            }
        }

        let registry = ToolRegistry::new()
            .register(FirstTool(log.clone()))
            .register(SecondTool(log.clone()))
            .register(crate::agent::tools::FinishTool);

        let model = ScriptedModel::new(vec![
            assistant_with_calls(vec![
                tool_call("c1", "second_tool", "{}"),
                tool_call("c2", "first_tool", "{}"),
                tool_call("c3", "second_tool", "{}"),
            ]),
            assistant_with_calls(vec![tool_call("c4", "finish", "{}")]),
        ]);

        let progress = no_progress();
        let outcome = AgentRunner::new(&model, &registry)
            .run(&spec(5, false), &CancellationToken::new(), &progress)
            .await;

        assert_eq!(outcome.termination, Termination::Finished);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["second_tool", "first_tool", "second_tool"]
        );
    }

    #[test]
    fn test_save_success_detection() {
        assert!(is_successful_save(
            SAVE_RESULTS_BATCH,
            r#"{"accepted_count":2,"skipped_count":0,"total":2}"#
        ));
        assert!(!is_successful_save(
            SAVE_RESULTS_BATCH,
            r#"{"accepted_count":0,"skipped_count":3,"total":1}"#
        ));
        assert!(is_successful_save(
            SAVE_RESULT,
            r#"{"accepted":true,"total":1}"#
        ));
        assert!(!is_successful_save(
            SAVE_RESULT,
            r#"{"accepted":false,"reason":"duplicate","total":1}"#
        ));
        assert!(!is_successful_save("browse_page", r#"{"text":"x"}"#));
    }
}
