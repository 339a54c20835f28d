use serde_json::Value as JsonValue;

/// Opaque result of one stage body invocation.
///
/// The serialized JSON text of the value is what checkpoints store as their
/// `output_ref`, so anything a stage returns must survive a JSON round trip.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct StageOutput(JsonValue);

impl StageOutput {
    pub fn new(value: JsonValue) -> Self {
        Self(value)
    }

    pub fn empty() -> Self {
        Self(JsonValue::Null)
    }

    pub fn value(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_value(self) -> JsonValue {
        self.0
    }

    /// Resolve a JSON pointer (`/a/0/b`) inside the output.
    pub fn pointer(&self, pointer: &str) -> Option<&JsonValue> {
        self.0.pointer(pointer)
    }

    pub fn to_output_ref(&self) -> String {
        self.0.to_string()
    }

    pub fn from_output_ref(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw).map(Self)
    }
}

impl From<JsonValue> for StageOutput {
    fn from(value: JsonValue) -> Self {
        Self(value)
    }
}
