// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The queue payload shape: `{task_id, apk_name, apk_path}`,
//! JSON-encoded. Shared between the reconciler (which republishes it) and
//! the daemon's queue consumer (which decodes it).

use packlab_core::TaskId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: TaskId,
    pub apk_name: String,
    pub apk_path: String,
}

impl TaskMessage {
    #[allow(clippy::expect_used)]
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("TaskMessage always serializes")
    }

    pub fn decode(payload: &[u8]) -> Result<Self, crate::error::EngineError> {
        serde_json::from_slice(payload)
            .map_err(|e| crate::error::EngineError::BadMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let msg = TaskMessage {
            task_id: TaskId::new("t1"),
            apk_name: "demo.apk".into(),
            apk_path: "inbound/demo.apk".into(),
        };
        let decoded = TaskMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.task_id, msg.task_id);
        assert_eq!(decoded.apk_path, "inbound/demo.apk");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(TaskMessage::decode(b"not json").is_err());
    }
}
