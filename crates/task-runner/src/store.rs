use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct ResponseStore {
    fields: BTreeMap<String, Value>,
}

impl ResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        tracing::trace!(key = %key, "record response field");
        self.fields.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub(crate) fn snapshot(&self) -> Envelope {
        Envelope {
            fields: self.fields.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitFormat {
    #[default]
    Object,
    TrialArray,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Envelope {
    fields: BTreeMap<String, Value>,
}

impl Envelope {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn to_value(&self, format: SubmitFormat) -> Value {
        let object: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        match format {
            SubmitFormat::Object => Value::Object(object),
            SubmitFormat::TrialArray => Value::Array(vec![Value::Object(object)]),
        }
    }

    pub fn to_body(&self, format: SubmitFormat) -> serde_json::Result<SubmissionBody> {
        let bytes = serde_json::to_vec(&self.to_value(format))?;
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(&bytes)));
        Ok(SubmissionBody { bytes, digest })
    }
}

/// Serialized envelope. Retries resend these exact bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionBody {
    pub bytes: Vec<u8>,
    pub digest: String,
}
