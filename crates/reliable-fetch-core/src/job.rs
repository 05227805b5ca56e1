use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One serialized job as produced by the enqueuing side.
///
/// The fetch layer only models the fields it has to read or write: the
/// class name and job id (for logging and registry lookup) and the
/// interruption counter. Everything else is carried verbatim through a
/// decode/encode round trip so producers can evolve the envelope freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Job class/type name, used to look up the interruption budget.
    pub class: String,

    /// Job id; producers send both strings and integers, so it stays raw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jid: Option<Value>,

    /// How many times this job was forcibly returned to its source queue.
    #[serde(default)]
    pub interrupted_count: u64,

    /// All fields this layer does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    /// Deserialize a job from its wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize the job back to wire bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Count one forced return to the source queue. The counter never
    /// decreases across the job's lifetime in this system.
    pub fn record_interruption(&mut self) {
        self.interrupted_count += 1;
    }

    /// Job id rendered for log output.
    pub fn jid_display(&self) -> String {
        match &self.jid {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "-".to_string(),
        }
    }
}
