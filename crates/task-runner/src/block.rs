use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Instructions(InstructionsBlock),
    ClickChoice(ChoiceBlock),
    Html(HtmlBlock),
    Debrief(DebriefBlock),
}

impl Block {
    pub fn kind(&self) -> &'static str {
        match self {
            Block::Instructions(_) => "instructions",
            Block::ClickChoice(_) => "click_choice",
            Block::Html(_) => "html",
            Block::Debrief(_) => "debrief",
        }
    }

    pub fn form(&self) -> Option<FormKind> {
        match self {
            Block::Html(html) => html.form,
            _ => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Block::Instructions(b) => format!("instructions ({} pages)", b.pages.len()),
            Block::ClickChoice(b) => format!(
                "click_choice {} [{}] ({} trials)",
                b.name,
                b.choice.as_str(),
                b.stimuli.len()
            ),
            Block::Html(b) => match b.form {
                Some(form) => format!("html {} [{}]", b.url, form.as_str()),
                None => format!("html {}", b.url),
            },
            Block::Debrief(b) => format!("debrief {}", b.url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionsBlock {
    pub pages: Vec<String>,
    #[serde(default = "default_true")]
    pub show_clickable_nav: bool,
    #[serde(default)]
    pub allow_keys: bool,
    #[serde(default)]
    pub post_click_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceKind {
    Keep,
    Reject,
}

impl ChoiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChoiceKind::Keep => "keep",
            ChoiceKind::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceBlock {
    pub name: String,
    pub choice: ChoiceKind,
    pub stimuli: Vec<Vec<String>>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub timing_response_ms: Option<u64>,
    #[serde(default)]
    pub post_click_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    Demographics,
    ValidatingDemographics,
}

impl FormKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormKind::Demographics => "demographics",
            FormKind::ValidatingDemographics => "validating_demographics",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlBlock {
    pub url: String,
    pub cont_btn: String,
    #[serde(default)]
    pub form: Option<FormKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebriefBlock {
    pub url: String,
    pub cont_btn: String,
}

fn default_true() -> bool {
    true
}
