//! Broadcast bus for [`BuildEvent`]s.
//!
//! The orchestrator publishes stage, component and hook progress here; the
//! CLI subscribes to drive its progress display. Publishing with no
//! subscribers is a no-op, so a headless build pays nothing for it.

use rigsmith_types::event::BuildEvent;
use tokio::sync::broadcast;

/// Cloning the bus clones the sender.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BuildEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: BuildEvent) {
        let _ = self.sender.send(event);
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigsmith_types::build::BuildStage;
    use uuid::Uuid;

    fn stage_started(components: usize) -> BuildEvent {
        BuildEvent::StageStarted {
            session_id: Uuid::now_v7(),
            stage: BuildStage::Guide,
            components,
        }
    }

    #[tokio::test]
    async fn test_subscribers_each_receive_events() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(stage_started(3));

        assert!(matches!(rx1.recv().await.unwrap(), BuildEvent::StageStarted { components: 3, .. }));
        assert!(matches!(rx2.recv().await.unwrap(), BuildEvent::StageStarted { .. }));
    }

    #[test]
    fn test_publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::new(4);
        bus.publish(stage_started(1));
        bus.publish(stage_started(2));
    }

    #[tokio::test]
    async fn test_lagged_receiver_reports_skipped_count() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(stage_started(i));
        }
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => assert_eq!(n, 3),
            other => panic!("expected lag, got {other:?}"),
        }
        assert!(matches!(rx.recv().await.unwrap(), BuildEvent::StageStarted { components: 3, .. }));
    }
}
