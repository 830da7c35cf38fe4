//! # Loop State
//!
//! The iteration loop as an explicit state machine:
//!
//! ```text
//! Init ──start──> Running(1) ──refine──> Running(2) ... Running(N) ──refine──> Terminated(MaxIterations)
//!                     │                                      │
//!                     └──────────────pass───────────────────-┴──> Terminated(QualityMet { iteration })
//! ```

use serde::{Deserialize, Serialize};

/// How the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// The quality gate passed in this iteration
    QualityMet { iteration: u32 },
    /// The iteration budget ran out without a pass
    MaxIterations,
}

/// State of the iteration loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoopState {
    Init,
    Running { iteration: u32 },
    Terminated(Termination),
}

/// Loop state plus its iteration bound
#[derive(Debug, Clone)]
pub struct IterationLoop {
    state: LoopState,
    max_iterations: u32,
}

impl IterationLoop {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            state: LoopState::Init,
            max_iterations,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Init -> Running(1). A zero budget terminates immediately.
    pub fn start(&mut self) -> LoopState {
        if self.state == LoopState::Init {
            self.state = if self.max_iterations == 0 {
                LoopState::Terminated(Termination::MaxIterations)
            } else {
                LoopState::Running { iteration: 1 }
            };
        }
        self.state
    }

    /// Gate passed: Running(i) -> Terminated(QualityMet { i })
    pub fn pass(&mut self) -> LoopState {
        if let LoopState::Running { iteration } = self.state {
            self.state = LoopState::Terminated(Termination::QualityMet { iteration });
        }
        self.state
    }

    /// Gate failed: Running(i) -> Running(i + 1), or Terminated(MaxIterations)
    /// once the budget is spent
    pub fn refine(&mut self) -> LoopState {
        if let LoopState::Running { iteration } = self.state {
            self.state = if iteration >= self.max_iterations {
                LoopState::Terminated(Termination::MaxIterations)
            } else {
                LoopState::Running {
                    iteration: iteration + 1,
                }
            };
        }
        self.state
    }

    pub fn current_iteration(&self) -> Option<u32> {
        match self.state {
            LoopState::Running { iteration } => Some(iteration),
            _ => None,
        }
    }

    pub fn termination(&self) -> Option<Termination> {
        match self.state {
            LoopState::Terminated(termination) => Some(termination),
            _ => None,
        }
    }
}
