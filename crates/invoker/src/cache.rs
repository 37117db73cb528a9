use converse_core::{InvocationRequest, InvocationResult};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Deterministic key over everything that shapes the model's answer.
///
/// Caller metadata and prompt links are excluded; they do not change output.
pub fn cache_key(request: &InvocationRequest) -> String {
    let canonical = json!({
        "modelId": request.model_id,
        "messages": request.messages,
        "inferenceConfig": request.inference_config,
        "guardrailConfig": request.guardrail_config,
        "additionalModelRequestFields": request.additional_model_request_fields,
        "tools": request.tools,
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, InvocationResult>,
    order: VecDeque<String>,
}

/// Bounded response cache; once full, the oldest inserted entry is evicted.
#[derive(Debug)]
pub struct ResponseCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn get(&self, key: &str) -> Option<InvocationResult> {
        self.lock().entries.get(key).cloned()
    }

    pub fn insert(&self, key: String, result: InvocationResult) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.lock();
        if state.entries.insert(key.clone(), result).is_some() {
            return;
        }
        state.order.push_back(key);
        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
