//! Independent review of detector output.
//!
//! A second model, with its own prompt and the code excerpt in front of it,
//! either confirms the detector's verdict or corrects it. A review is always
//! produced; failures degrade to a conservative fallback, never to absence.

use crate::llm::{prompts, recover, LlmClient, Model};
use crate::report::{BugReport, SupervisorReview};

pub struct SupervisorAgent {
    model: Model,
}

impl SupervisorAgent {
    pub fn new() -> Self {
        Self {
            model: Model::Supervisor,
        }
    }

    pub async fn review(&self, client: &LlmClient, report: &BugReport) -> SupervisorReview {
        let prompt = prompts::supervision_prompt(report);

        match client
            .chat(prompts::SUPERVISOR_SYSTEM, &prompt, self.model)
            .await
        {
            Ok(text) => match recover::<SupervisorReview>(&text) {
                Ok(review) => review,
                Err(failure) => SupervisorReview::fallback(
                    report,
                    format!("Supervisor error: {}", failure.reason),
                ),
            },
            Err(e) => SupervisorReview::fallback(report, format!("Supervisor error: {}", e)),
        }
    }
}

impl Default for SupervisorAgent {
    fn default() -> Self {
        Self::new()
    }
}
