use crate::store::ResponseStore;
use serde::{Deserialize, Serialize};

pub const MISSING_GENDER: &str = "You must indicate your gender.";
pub const MISSING_BIRTHYEAR: &str = "You must indicate the year you were born, e.g., 1965.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormState {
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birthyear: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected { message: String },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Verdict::Accepted => None,
            Verdict::Rejected { message } => Some(message),
        }
    }

    fn rejected(message: &str) -> Self {
        Verdict::Rejected {
            message: message.to_string(),
        }
    }
}

/// Presence checks only. The birth year is not parsed or range checked.
pub fn validate(form: &FormState) -> Verdict {
    match form.gender.as_deref() {
        Some(g) if !g.is_empty() => {}
        _ => return Verdict::rejected(MISSING_GENDER),
    }
    if form.birthyear.is_empty() {
        return Verdict::rejected(MISSING_BIRTHYEAR);
    }
    Verdict::Accepted
}

pub fn check_demographics(form: &FormState, store: &mut ResponseStore) -> Verdict {
    let verdict = validate(form);
    if verdict.is_accepted() {
        store.record("gender", form.gender.clone().unwrap_or_default());
        store.record("birthyear", form.birthyear.clone());
    } else {
        tracing::debug!(message = verdict.message().unwrap_or(""), "demographics rejected");
    }
    verdict
}
