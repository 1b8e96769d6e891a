//! Streaming Bus (§4.10): per-session bounded ring of progress events.
//! Emission never blocks the pipeline and buffer overwrite is silent;
//! readers poll `latest`.

use brain_core::{StreamingEvent, StreamingRing, StreamingUpdateType};
use brain_types::SessionId;
use std::collections::HashMap;
use tokio::sync::Mutex;

pub const RING_CAPACITY: usize = 20;

#[derive(Default)]
pub struct StreamingBus {
    rings: Mutex<HashMap<SessionId, StreamingRing>>,
}

impl StreamingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn emit(&self, session_id: &SessionId, update_type: StreamingUpdateType, context: serde_json::Value) {
        let mut rings = self.rings.lock().await;
        rings
            .entry(session_id.clone())
            .or_insert_with(|| StreamingRing::new(RING_CAPACITY))
            .push(StreamingEvent::new(update_type, context));
    }

    pub async fn latest(&self, session_id: &SessionId) -> Vec<StreamingEvent> {
        self.rings
            .lock()
            .await
            .get(session_id)
            .map(|ring| ring.latest())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ring_stays_bounded_per_session() {
        let bus = StreamingBus::new();
        let session = SessionId::from("s1");
        for _ in 0..30 {
            bus.emit(&session, StreamingUpdateType::ActionProgress, serde_json::Value::Null)
                .await;
        }
        assert_eq!(bus.latest(&session).await.len(), RING_CAPACITY);
    }
}
