use std::collections::HashMap;

use chrono::Duration;

use crate::event::EventKind;
use crate::lead::Stage;

/// Template for the follow-up task an event kind schedules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTemplate {
    pub label: String,
    pub due_in_hours: i64,
}

impl TaskTemplate {
    pub fn new(label: &str, due_in_hours: i64) -> Self {
        Self {
            label: label.to_owned(),
            due_in_hours,
        }
    }

    pub fn due_offset(&self) -> Duration {
        Duration::hours(self.due_in_hours)
    }
}

/// One row of the transition table: the stage an event kind targets, and
/// the follow-up it schedules (if any).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRule {
    pub target_stage: Stage,
    pub task_template: Option<TaskTemplate>,
}

/// Static mapping from event kind to transition rule.
///
/// Immutable once built and injected into the engine at construction, so
/// tests can run alternate rule sets. A kind with no entry is rejected as
/// `UnknownEventKind` by the engine.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    rules: HashMap<EventKind, TransitionRule>,
}

impl TransitionTable {
    pub fn new(rules: impl IntoIterator<Item = (EventKind, TransitionRule)>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn rule(&self, kind: EventKind) -> Option<&TransitionRule> {
        self.rules.get(&kind)
    }
}

impl Default for TransitionTable {
    /// The production funnel rules.
    fn default() -> Self {
        Self::new([
            (
                EventKind::InviteSent,
                TransitionRule {
                    target_stage: Stage::Invited,
                    task_template: Some(TaskTemplate::new("Follow up on invite", 72)),
                },
            ),
            (
                EventKind::Connected,
                TransitionRule {
                    target_stage: Stage::Connected,
                    task_template: Some(TaskTemplate::new("Send first message", 24)),
                },
            ),
            (
                EventKind::MessageSent,
                TransitionRule {
                    target_stage: Stage::Messaged,
                    task_template: Some(TaskTemplate::new("Check for reply", 48)),
                },
            ),
            (
                EventKind::ReplyReceived,
                TransitionRule {
                    target_stage: Stage::Replied,
                    task_template: None,
                },
            ),
            (
                EventKind::MeetingBooked,
                TransitionRule {
                    target_stage: Stage::Meeting,
                    task_template: None,
                },
            ),
        ])
    }
}
