//! Agent run loop: drives the model until it calls `done`.
//!
//! Each iteration gives the model one chance to act. Malformed tool calls are
//! answered with a corrective message and retried within the same iteration,
//! up to `max_error_retry` times. On the final iteration only `done` is offered.
//! A tool returning [`ToolResponse::Prompt`] runs a nested agent whose report
//! is fed back to the parent as the tool result.

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::errors::{DispatchError, MalformedResponse, RunError};
use crate::core::message::{Message, ToolCall};
use crate::core::prompt::{Prompt, REPORT_PROPERTY};
use crate::core::response::{ToolResponse, Values};
use crate::core::results::{BotResults, TokenUsage};
use crate::io::model::{ModelClient, ModelRequest, ModelResponse};
use crate::tools::{Dispatcher, ToolRegistry};

/// Nesting limit for sub-agent runs (the top-level run is depth 0).
pub const DEFAULT_MAX_DEPTH: usize = 8;

pub struct Agent<C> {
    client: C,
    registry: ToolRegistry,
    max_depth: usize,
}

/// Result of processing one model turn.
enum Turn {
    Done(Values),
    Continue(Vec<Message>),
}

enum TurnError {
    Malformed(MalformedResponse),
    Fatal(RunError),
}

impl From<DispatchError> for TurnError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Malformed(malformed) => TurnError::Malformed(malformed),
            DispatchError::Fatal { tool, source } => TurnError::Fatal(RunError::Tool { tool, source }),
        }
    }
}

impl<C: ModelClient> Agent<C> {
    pub fn new(client: C, registry: ToolRegistry) -> Self {
        Self {
            client,
            registry,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Run `prompt` to completion.
    ///
    /// Returns the `done` values, or a fatal [`RunError`]. Token usage includes
    /// retries and every nested sub-agent run.
    pub fn run(&self, prompt: &Prompt) -> Result<BotResults, RunError> {
        self.run_at_depth(prompt, 0)
    }

    #[instrument(skip_all, fields(depth = depth, model = prompt.model()))]
    fn run_at_depth(&self, prompt: &Prompt, depth: usize) -> Result<BotResults, RunError> {
        if depth > self.max_depth {
            return Err(RunError::MaxDepth {
                max_depth: self.max_depth,
            });
        }
        info!(
            max_iterations = prompt.max_iterations(),
            max_error_retry = prompt.max_error_retry(),
            "starting run"
        );
        debug!(
            prompt = %serde_json::to_string(&prompt.summary()).unwrap_or_default(),
            "run prompt"
        );

        let mut dispatcher = Dispatcher::build(&self.registry, prompt)?;
        let mut history = initial_history(prompt);
        let mut tokens = TokenUsage::default();

        for iteration in 1..=prompt.max_iterations() {
            debug!(iteration, "iteration");
            if iteration == prompt.max_iterations() {
                debug!(iteration, "final iteration; only done is available");
                dispatcher.narrow_to_completion();
                history.push(Message::User(prompt.max_iteration_prompt().to_string()));
            }

            let mut retries_left = prompt.max_error_retry();
            loop {
                let definitions = dispatcher.definitions();
                let response = self
                    .client
                    .complete(&ModelRequest {
                        model: prompt.model(),
                        messages: &history,
                        tools: &definitions,
                    })
                    .map_err(RunError::Model)?;
                tokens += response.usage;

                match self.process_turn(&mut dispatcher, response, depth, &mut tokens) {
                    Ok(Turn::Done(values)) => {
                        info!(iteration, input_tokens = tokens.input, output_tokens = tokens.output, "run complete");
                        return Ok(BotResults {
                            values,
                            tokens,
                            iterations: iteration,
                        });
                    }
                    Ok(Turn::Continue(messages)) => {
                        history.extend(messages);
                        break;
                    }
                    Err(TurnError::Malformed(err)) => {
                        if retries_left == 0 {
                            warn!(iteration, error = %err, "retry budget exhausted");
                            return Err(RunError::RetriesExhausted {
                                iteration,
                                source: err,
                            });
                        }
                        retries_left -= 1;
                        let retry = err.retry_message();
                        warn!(iteration, retries_left, error = %err, "malformed response; asking model to retry");
                        history.push(Message::User(retry));
                    }
                    Err(TurnError::Fatal(err)) => return Err(err),
                }
            }
        }

        Err(RunError::MaxIterations {
            max_iterations: prompt.max_iterations(),
        })
    }

    /// Dispatch every call of one model reply in order.
    ///
    /// On error nothing from this turn reaches the history.
    fn process_turn(
        &self,
        dispatcher: &mut Dispatcher,
        response: ModelResponse,
        depth: usize,
        tokens: &mut TokenUsage,
    ) -> Result<Turn, TurnError> {
        let ModelResponse {
            content,
            tool_calls,
            ..
        } = response;
        if tool_calls.is_empty() {
            debug!("model made no tool calls");
            return Ok(Turn::Continue(Vec::new()));
        }

        let mut results = Vec::with_capacity(tool_calls.len());
        let mut images = Vec::new();
        for (index, call) in tool_calls.iter().enumerate() {
            let outcome = dispatcher.dispatch(call)?;
            let text = match outcome.response {
                ToolResponse::Done(values) => {
                    let skipped = tool_calls.len() - index - 1;
                    if skipped > 0 {
                        warn!(skipped, "done called alongside other tools; remaining calls ignored");
                    }
                    return Ok(Turn::Done(values));
                }
                ToolResponse::Message {
                    text,
                    images: attached,
                } => {
                    images.extend(attached);
                    text
                }
                ToolResponse::Prompt(nested) => self.run_sub_agent(call, &nested, depth, tokens)?,
            };
            results.push(Message::Tool {
                tool_call_id: outcome.call_id,
                content: text,
            });
        }

        let mut messages = Vec::with_capacity(results.len() + 2);
        messages.push(Message::Assistant {
            content,
            tool_calls,
        });
        messages.extend(results);
        if !images.is_empty() {
            messages.push(Message::UserImages(images));
        }
        Ok(Turn::Continue(messages))
    }

    fn run_sub_agent(
        &self,
        call: &ToolCall,
        prompt: &Prompt,
        depth: usize,
        tokens: &mut TokenUsage,
    ) -> Result<String, TurnError> {
        info!(tool = %call.name, depth = depth + 1, "starting sub-agent");
        let results = self
            .run_at_depth(prompt, depth + 1)
            .map_err(TurnError::Fatal)?;
        *tokens += results.tokens;
        Ok(report_text(&results.values))
    }
}

fn initial_history(prompt: &Prompt) -> Vec<Message> {
    let mut history = vec![
        Message::System(prompt.system_prompt().to_string()),
        Message::User(prompt.user_prompt().to_string()),
    ];
    if !prompt.images().is_empty() {
        history.push(Message::UserImages(prompt.images().to_vec()));
    }
    history
}

/// The sub-run's `report` string, or all of its values as JSON.
fn report_text(values: &Values) -> String {
    match values.get(REPORT_PROPERTY) {
        Some(Value::String(report)) => report.clone(),
        _ => Value::Object(values.clone()).to_string(),
    }
}
