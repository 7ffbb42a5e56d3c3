use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{ExecutionResult, LotteryId, ProjectId, UnitTypeId};

/// Completion signals published while a run progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LotteryEvent {
    GroupExecuted {
        execution_uuid: Uuid,
        lottery_id: LotteryId,
        unit_type_id: UnitTypeId,
        result: ExecutionResult,
    },
    ProjectExecuted {
        execution_uuid: Uuid,
        project_id: ProjectId,
        lottery_id: LotteryId,
        result: ExecutionResult,
    },
    ExecutionFailed {
        execution_uuid: Uuid,
        lottery_id: LotteryId,
        error_type: String,
        message: String,
    },
}

/// Broadcast channel for lottery events. Sending never blocks and events
/// published while nobody listens are dropped.
#[derive(Debug, Clone)]
pub struct LotteryEvents {
    tx: broadcast::Sender<LotteryEvent>,
}

impl LotteryEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LotteryEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: LotteryEvent) {
        // Err only means there are no subscribers right now.
        let _ = self.tx.send(event);
    }
}

impl Default for LotteryEvents {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let events = LotteryEvents::default();
        let mut rx = events.subscribe();

        events.publish(LotteryEvent::ExecutionFailed {
            execution_uuid: Uuid::nil(),
            lottery_id: 7,
            error_type: "timeout".to_string(),
            message: "boom".to_string(),
        });

        match rx.recv().await.unwrap() {
            LotteryEvent::ExecutionFailed { lottery_id, .. } => assert_eq!(lottery_id, 7),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let events = LotteryEvents::new(1);
        events.publish(LotteryEvent::ExecutionFailed {
            execution_uuid: Uuid::nil(),
            lottery_id: 1,
            error_type: "unexpected".to_string(),
            message: "nobody listens".to_string(),
        });
    }
}
