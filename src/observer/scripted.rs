use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;

use crate::browser::page::Page;
use crate::element::element_model::Observation;
use crate::observer::observer::{ElementObserver, ObserverError};

#[derive(Debug, Clone)]
enum Reply {
    Observations(Vec<Observation>),
    Fail(String),
}

/// Shared record of every instruction an observer received.
pub type InstructionLog = Rc<RefCell<Vec<String>>>;

/// Observer that answers from a fixed script.
///
/// Rules are matched in insertion order by case-insensitive substring of the
/// instruction. Unmatched instructions get the default reply (empty unless
/// `failing_by_default` was called).
#[derive(Debug, Clone)]
pub struct ScriptedObserver {
    rules: Vec<(String, Reply)>,
    default_reply: Reply,
    fail_attach: bool,
    log: InstructionLog,
}

impl Default for ScriptedObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedObserver {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default_reply: Reply::Observations(Vec::new()),
            fail_attach: false,
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn on(mut self, pattern: &str, observations: Vec<Observation>) -> Self {
        self.rules
            .push((pattern.to_lowercase(), Reply::Observations(observations)));
        self
    }

    pub fn fail_on(mut self, pattern: &str, error: &str) -> Self {
        self.rules
            .push((pattern.to_lowercase(), Reply::Fail(error.to_string())));
        self
    }

    /// Every unmatched instruction fails.
    pub fn failing_by_default(mut self, error: &str) -> Self {
        self.default_reply = Reply::Fail(error.to_string());
        self
    }

    /// `attach` fails, which puts a detector into deterministic-only mode.
    pub fn failing_attach(mut self) -> Self {
        self.fail_attach = true;
        self
    }

    pub fn instruction_log(&self) -> InstructionLog {
        Rc::clone(&self.log)
    }
}

#[async_trait(?Send)]
impl ElementObserver for ScriptedObserver {
    async fn attach(&mut self, page: &dyn Page) -> Result<(), ObserverError> {
        if self.fail_attach {
            return Err(ObserverError::Unavailable(format!(
                "scripted attach failure for {}",
                page.url()
            )));
        }
        Ok(())
    }

    async fn observe(&self, instruction: &str) -> Result<Vec<Observation>, ObserverError> {
        self.log.borrow_mut().push(instruction.to_string());

        let lower = instruction.to_lowercase();
        let reply = self
            .rules
            .iter()
            .find(|(pattern, _)| lower.contains(pattern.as_str()))
            .map(|(_, reply)| reply)
            .unwrap_or(&self.default_reply);

        match reply {
            Reply::Observations(obs) => Ok(obs.clone()),
            Reply::Fail(error) => Err(ObserverError::Rejected(error.clone())),
        }
    }
}
