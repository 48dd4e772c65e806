//! Confirmation gate for destructive actions
//!
//! Idle -> AwaitingConfirmation -> (no) Idle
//!                              -> (yes) Executing -> Completed -> Idle
//!
//! A new request is rejected unless the flow is Idle.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConfirmPhase {
    #[default]
    Idle,
    AwaitingConfirmation,
    Executing,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmError {
    #[error("another action is in progress")]
    Busy,
    #[error("nothing is waiting for confirmation")]
    NotAwaiting,
    #[error("no action is executing")]
    NotExecuting,
    #[error("no result is being shown")]
    NotCompleted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmationFlow<A> {
    phase: ConfirmPhase,
    prompt: String,
    success_text: String,
    /// Success or failure text once the action has returned
    outcome: Option<Result<String, String>>,
    action: Option<A>,
}

impl<A> Default for ConfirmationFlow<A> {
    fn default() -> Self {
        Self {
            phase: ConfirmPhase::Idle,
            prompt: String::new(),
            success_text: String::new(),
            outcome: None,
            action: None,
        }
    }
}

impl<A: Clone> ConfirmationFlow<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ConfirmPhase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == ConfirmPhase::Idle
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn outcome(&self) -> Option<&Result<String, String>> {
        self.outcome.as_ref()
    }

    pub fn action(&self) -> Option<&A> {
        self.action.as_ref()
    }

    /// Bind an action and ask for confirmation
    pub fn request(
        &mut self,
        action: A,
        prompt: impl Into<String>,
        success_text: impl Into<String>,
    ) -> Result<(), ConfirmError> {
        if self.phase != ConfirmPhase::Idle {
            return Err(ConfirmError::Busy);
        }
        self.phase = ConfirmPhase::AwaitingConfirmation;
        self.prompt = prompt.into();
        self.success_text = success_text.into();
        self.outcome = None;
        self.action = Some(action);
        Ok(())
    }

    /// Answer the prompt. On yes, returns the action the caller must now
    /// invoke; the flow stays in Executing until `finish` is called.
    pub fn respond(&mut self, yes: bool) -> Result<Option<A>, ConfirmError> {
        if self.phase != ConfirmPhase::AwaitingConfirmation {
            return Err(ConfirmError::NotAwaiting);
        }
        if yes {
            self.phase = ConfirmPhase::Executing;
            Ok(self.action.clone())
        } else {
            self.reset();
            Ok(None)
        }
    }

    /// Record the action's result
    pub fn finish(&mut self, result: Result<(), String>) -> Result<(), ConfirmError> {
        if self.phase != ConfirmPhase::Executing {
            return Err(ConfirmError::NotExecuting);
        }
        self.phase = ConfirmPhase::Completed;
        self.outcome = Some(match result {
            Ok(()) => Ok(self.success_text.clone()),
            Err(message) => Err(message),
        });
        Ok(())
    }

    /// Display timeout elapsed
    pub fn dismiss(&mut self) -> Result<(), ConfirmError> {
        if self.phase != ConfirmPhase::Completed {
            return Err(ConfirmError::NotCompleted);
        }
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Action {
        Terminate(String),
    }

    fn requested() -> ConfirmationFlow<Action> {
        let mut flow = ConfirmationFlow::new();
        flow.request(
            Action::Terminate("wf-1".into()),
            "Terminate wf-1? (y/n)",
            "Terminated wf-1",
        )
        .unwrap();
        flow
    }

    #[test]
    fn test_decline_returns_to_idle() {
        let mut flow = requested();
        assert_eq!(flow.phase(), ConfirmPhase::AwaitingConfirmation);
        assert_eq!(flow.respond(false), Ok(None));
        assert_eq!(flow.phase(), ConfirmPhase::Idle);
        assert!(flow.action().is_none());
    }

    #[test]
    fn test_accept_runs_once_then_idles() {
        let mut flow = requested();
        let mut invoked = 0;
        if let Some(Action::Terminate(id)) = flow.respond(true).unwrap() {
            assert_eq!(id, "wf-1");
            invoked += 1;
        }
        assert_eq!(flow.phase(), ConfirmPhase::Executing);
        // a second yes does not hand the action out again
        assert_eq!(flow.respond(true), Err(ConfirmError::NotAwaiting));

        flow.finish(Ok(())).unwrap();
        assert_eq!(flow.phase(), ConfirmPhase::Completed);
        assert_eq!(flow.outcome(), Some(&Ok("Terminated wf-1".to_string())));

        flow.dismiss().unwrap();
        assert_eq!(flow.phase(), ConfirmPhase::Idle);
        assert_eq!(invoked, 1);
    }

    #[test]
    fn test_failure_text_replaces_success() {
        let mut flow = requested();
        flow.respond(true).unwrap();
        flow.finish(Err("permission denied".into())).unwrap();
        assert_eq!(flow.outcome(), Some(&Err("permission denied".to_string())));
        flow.dismiss().unwrap();
        assert!(flow.is_idle());
    }

    #[test]
    fn test_requests_rejected_when_busy() {
        let mut flow = requested();
        let again = flow.request(Action::Terminate("wf-2".into()), "?", "!");
        assert_eq!(again, Err(ConfirmError::Busy));
        assert_eq!(flow.action(), Some(&Action::Terminate("wf-1".into())));

        flow.respond(true).unwrap();
        assert_eq!(
            flow.request(Action::Terminate("wf-2".into()), "?", "!"),
            Err(ConfirmError::Busy)
        );
    }

    #[test]
    fn test_out_of_order_transitions_rejected() {
        let mut flow: ConfirmationFlow<Action> = ConfirmationFlow::new();
        assert_eq!(flow.finish(Ok(())), Err(ConfirmError::NotExecuting));
        assert_eq!(flow.dismiss(), Err(ConfirmError::NotCompleted));
        assert_eq!(flow.respond(true), Err(ConfirmError::NotAwaiting));
    }
}
