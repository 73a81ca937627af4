//! Continuation-passing execution primitives for Action plans.
//!
//! A plan is a tree of [`Step`] values built with [`gate`], [`seq`] and
//! [`terminal`]. Building a plan performs no IO. Denials are branch
//! outcomes; only an undeterminable predicate or a failed critical effect
//! becomes a [`StepError`], which unwinds to [`Steps::perform`] and is
//! answered there exactly once.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::action_log::ActionLog;
use super::command::Command;

#[derive(Debug, Error)]
/// Fatal signal raised inside a plan.
pub enum StepError {
    #[error("check '{check}' could not be evaluated: {error:#}")]
    Predicate {
        check: &'static str,
        error: anyhow::Error,
    },
    #[error("step '{step}' failed: {error:#}")]
    Effect {
        step: &'static str,
        error: anyhow::Error,
    },
}

#[async_trait]
pub trait Step: Send + Sync {
    async fn perform(&self, command: &Command, log: &ActionLog) -> Result<(), StepError>;

    /// Structural description, one line per node, used for plan inspection.
    fn describe(&self, depth: usize, out: &mut Vec<String>);
}

/// Plan nodes are shared so one subtree can follow several gates.
pub type PlanStep = Arc<dyn Step>;

#[async_trait]
/// A boolean gate. Errors mean "undetermined" and are always fatal.
pub trait Predicate: Send + Sync {
    fn name(&self) -> &'static str;
    async fn evaluate(&self, command: &Command, log: &ActionLog) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    /// Failure aborts the plan.
    Critical,
    /// Failure is logged and the plan continues.
    Cosmetic,
}

#[async_trait]
pub trait Effect: Send + Sync {
    fn name(&self) -> &'static str;
    fn criticality(&self) -> Criticality;

    fn describe(&self) -> String {
        self.name().to_string()
    }

    async fn apply(&self, command: &Command, log: &ActionLog) -> anyhow::Result<()>;
}

struct Gate {
    predicate: Box<dyn Predicate>,
    on_true: PlanStep,
    on_false: PlanStep,
}

#[async_trait]
impl Step for Gate {
    async fn perform(&self, command: &Command, log: &ActionLog) -> Result<(), StepError> {
        let check = self.predicate.name();
        let passed = self
            .predicate
            .evaluate(command, log)
            .await
            .map_err(|error| StepError::Predicate { check, error })?;
        log.info(format!("check {check}: {passed}"));
        if passed {
            self.on_true.perform(command, log).await
        } else {
            self.on_false.perform(command, log).await
        }
    }

    fn describe(&self, depth: usize, out: &mut Vec<String>) {
        out.push(format!("{}gate {}", "  ".repeat(depth), self.predicate.name()));
        self.on_true.describe(depth + 1, out);
        self.on_false.describe(depth + 1, out);
    }
}

struct Seq {
    effect: Box<dyn Effect>,
    next: PlanStep,
}

#[async_trait]
impl Step for Seq {
    async fn perform(&self, command: &Command, log: &ActionLog) -> Result<(), StepError> {
        let step = self.effect.name();
        if let Err(error) = self.effect.apply(command, log).await {
            match self.effect.criticality() {
                Criticality::Critical => return Err(StepError::Effect { step, error }),
                Criticality::Cosmetic => {
                    log.warn(format!("{step} failed, continuing: {error:#}"));
                }
            }
        }
        self.next.perform(command, log).await
    }

    fn describe(&self, depth: usize, out: &mut Vec<String>) {
        out.push(format!("{}do {}", "  ".repeat(depth), self.effect.describe()));
        self.next.describe(depth, out);
    }
}

struct Terminal {
    message: String,
}

#[async_trait]
impl Step for Terminal {
    async fn perform(&self, _command: &Command, log: &ActionLog) -> Result<(), StepError> {
        log.info(&self.message);
        Ok(())
    }

    fn describe(&self, depth: usize, out: &mut Vec<String>) {
        out.push(format!("{}end {}", "  ".repeat(depth), self.message));
    }
}

/// Branch on `predicate`.
pub fn gate(
    predicate: impl Predicate + 'static,
    on_true: PlanStep,
    on_false: PlanStep,
) -> PlanStep {
    Arc::new(Gate {
        predicate: Box::new(predicate),
        on_true,
        on_false,
    })
}

/// Run `effect`, then `next`.
pub fn seq(effect: impl Effect + 'static, next: PlanStep) -> PlanStep {
    Arc::new(Seq {
        effect: Box::new(effect),
        next,
    })
}

/// End of a plan path.
pub fn terminal(message: impl Into<String>) -> PlanStep {
    Arc::new(Terminal {
        message: message.into(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    Completed,
    /// A fatal signal was caught; `reply_sent` tells whether the failure reply went out.
    Failed { reply_sent: bool },
}

/// Plan root: the single boundary where fatal signals are contained.
pub struct Steps {
    root: PlanStep,
    failure_reply: PlanStep,
}

impl Steps {
    pub fn new(root: PlanStep, failure_reply: PlanStep) -> Self {
        Self {
            root,
            failure_reply,
        }
    }

    pub async fn perform(&self, command: &Command, log: &ActionLog) -> PlanOutcome {
        let Err(error) = self.root.perform(command, log).await else {
            return PlanOutcome::Completed;
        };
        log.error(format!("plan aborted: {error}"));
        match self.failure_reply.perform(command, log).await {
            Ok(()) => PlanOutcome::Failed { reply_sent: true },
            Err(reply_error) => {
                log.error(format!("failure reply could not be sent: {reply_error}"));
                PlanOutcome::Failed { reply_sent: false }
            }
        }
    }

    /// The plan tree rendered one node per line.
    pub fn describe(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.root.describe(0, &mut out);
        out
    }
}
