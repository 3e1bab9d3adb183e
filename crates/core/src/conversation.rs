//! Conversation-related types.

use ghidra_assistant_model::{ModelMessage, ToolCallRequest, ToolCallResult};

use crate::Error;

/// The history of a single conversation and its remaining tool budget.
///
/// History is append-only. Every tool result that gets appended must answer
/// a call of the assistant message it follows, so the model is never shown
/// an orphan result.
#[derive(Clone, Debug)]
pub struct ConversationState {
    history: Vec<ModelMessage>,
    remaining_turns: usize,
    job_id: String,
}

impl ConversationState {
    /// Starts a conversation with the system instructions and the user's
    /// message scoped to `job_id`.
    pub fn seed(
        system_prompt: &str,
        job_id: &str,
        message: &str,
        turn_budget: usize,
    ) -> Self {
        Self {
            history: vec![
                ModelMessage::System(system_prompt.to_owned()),
                ModelMessage::User(format!("For job_id '{job_id}', {message}")),
            ],
            remaining_turns: turn_budget,
            job_id: job_id.to_owned(),
        }
    }

    /// Returns the messages exchanged so far.
    #[inline]
    pub fn history(&self) -> &[ModelMessage] {
        &self.history
    }

    /// Returns the job every tool call is scoped to.
    #[inline]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Returns how many more tool turns may run.
    #[inline]
    pub fn remaining_turns(&self) -> usize {
        self.remaining_turns
    }

    /// Returns the tool calls of the latest assistant message.
    pub fn pending_tool_calls(&self) -> &[ToolCallRequest] {
        self.last_assistant()
            .map(|idx| self.history[idx].tool_calls())
            .unwrap_or(&[])
    }

    pub(crate) fn push_assistant(&mut self, msg: ModelMessage) {
        debug_assert!(matches!(msg, ModelMessage::Assistant { .. }));
        self.history.push(msg);
    }

    pub(crate) fn push_tool_result(
        &mut self,
        result: ToolCallResult,
    ) -> Result<(), Error> {
        let Some(idx) = self.last_assistant() else {
            return Err(Error::UnpairedToolResult(result.id));
        };
        let requested = self.history[idx]
            .tool_calls()
            .iter()
            .any(|call| call.id == result.id);
        let answered = self.history[idx + 1..].iter().any(|msg| {
            matches!(msg, ModelMessage::Tool(prev) if prev.id == result.id)
        });
        if !requested || answered {
            return Err(Error::UnpairedToolResult(result.id));
        }
        self.history.push(ModelMessage::Tool(result));
        Ok(())
    }

    /// Uses up one tool turn, returns whether another one may follow.
    pub(crate) fn consume_turn(&mut self) -> bool {
        self.remaining_turns = self.remaining_turns.saturating_sub(1);
        self.remaining_turns > 0
    }

    fn last_assistant(&self) -> Option<usize> {
        // Only tool results may sit between the assistant message and the
        // end of history.
        let idx = self
            .history
            .iter()
            .rposition(|msg| !matches!(msg, ModelMessage::Tool(_)))?;
        matches!(self.history[idx], ModelMessage::Assistant { .. })
            .then_some(idx)
    }
}
