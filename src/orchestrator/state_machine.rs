//! Campaign State Machine
//!
//! Lifecycle of one campaign run:
//! - Idle: wallets and settings not yet checked
//! - Running: cycles in progress
//! - Completed: accumulated volume reached the target
//! - Aborted: stopped by the operator

use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CampaignState {
    Idle,
    Running,
    Completed,
    Aborted,
}

impl CampaignState {
    pub fn code(&self) -> u8 {
        match self {
            CampaignState::Idle => 0,
            CampaignState::Running => 1,
            CampaignState::Completed => 2,
            CampaignState::Aborted => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignState::Completed | CampaignState::Aborted)
    }
}

impl std::fmt::Display for CampaignState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignState::Idle => write!(f, "Idle"),
            CampaignState::Running => write!(f, "Running"),
            CampaignState::Completed => write!(f, "Completed"),
            CampaignState::Aborted => write!(f, "Aborted"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: CampaignState,
    pub to: CampaignState,
    pub timestamp: i64,
    pub reason: Option<String>,
}

pub struct CampaignStateMachine {
    current: CampaignState,
    state_entered_at: Instant,
    history: Vec<StateTransition>,
    max_history: usize,
}

impl CampaignStateMachine {
    pub fn new() -> Self {
        Self {
            current: CampaignState::Idle,
            state_entered_at: Instant::now(),
            history: Vec::new(),
            max_history: 16,
        }
    }

    pub fn current_state(&self) -> CampaignState {
        self.current
    }

    pub fn time_in_state(&self) -> std::time::Duration {
        self.state_entered_at.elapsed()
    }

    pub fn can_transition_to(&self, target: CampaignState) -> bool {
        use CampaignState::*;

        matches!(
            (self.current, target),
            (Idle, Running) | (Running, Completed) | (Running, Aborted)
        )
    }

    pub fn transition_to(&mut self, target: CampaignState) -> bool {
        self.transition_to_with_reason(target, None)
    }

    pub fn transition_to_with_reason(&mut self, target: CampaignState, reason: Option<String>) -> bool {
        if !self.can_transition_to(target) {
            warn!("Invalid campaign transition: {} -> {}", self.current, target);
            return false;
        }

        info!(
            "Campaign transition: {} -> {}{} after {:?}",
            self.current,
            target,
            reason.as_ref().map(|r| format!(" ({})", r)).unwrap_or_default(),
            self.time_in_state()
        );

        self.history.push(StateTransition {
            from: self.current,
            to: target,
            timestamp: chrono::Utc::now().timestamp_millis(),
            reason,
        });
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }

        self.current = target;
        self.state_entered_at = Instant::now();
        true
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }
}

impl Default for CampaignStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
