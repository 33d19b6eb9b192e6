use crate::history::History;
use crate::llm::answer::ERROR_ANSWER;
use crate::models::{ConversationMessage, Role, Turn};
use crate::pipeline::{PipelineOutcome, RagPipeline};

/// Messages and history window of one conversation.
#[derive(Debug, Clone)]
pub struct ChatSession {
    messages: Vec<ConversationMessage>,
    history: History,
}

impl ChatSession {
    pub fn new(history_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            history: History::with_capacity(history_turns),
        }
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn store_message(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ConversationMessage::new(role, content));
    }

    /// Run one full turn for `input` and record it.
    pub async fn ask(&mut self, pipeline: &RagPipeline, input: &str) -> PipelineOutcome {
        self.store_message(Role::User, input);
        let outcome = pipeline.run(input, &self.history).await;
        self.record_answer(input, &outcome);
        outcome
    }

    /// Record a finished pipeline run: the assistant message is always
    /// stored, the turn only when the answer call succeeded.
    pub fn record_answer(&mut self, question: &str, outcome: &PipelineOutcome) {
        self.store_message(Role::Assistant, outcome.answer.clone());
        if outcome.answer != ERROR_ANSWER {
            self.history.push(Turn {
                question: question.to_string(),
                answer: outcome.answer.clone(),
            });
        }
    }
}
