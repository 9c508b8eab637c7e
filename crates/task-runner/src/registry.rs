use crate::block::{Block, DebriefBlock, FormKind, HtmlBlock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const STATIC_ROOT: &str = "static";

pub const TASK_RESOURCES: &[&str] = &[
    "resources/instr_screenshots/accept_1.jpg",
    "resources/instr_screenshots/accept_2.jpg",
    "resources/instr_screenshots/reject_1.jpg",
    "resources/templates/symbols/error.png",
    "resources/templates/symbols/check.png",
    "html/demographics.html",
    "html/validating_demographics.html",
    "html/practice_debrief.html",
    "html/success.html",
];

/// Keys are the file name with `.` and `-` replaced by `_`
/// (`accept_1.jpg` -> `accept_1_jpg`); values are the path joined under `root`.
pub fn static_url_table(root: &str, resources: &[&str]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for resource in resources {
        let name = Path::new(resource)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| resource.to_string());
        let key = name.replace(['.', '-'], "_");
        out.insert(key, format!("{}/{}", root.trim_end_matches('/'), resource));
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Assets {
    #[serde(default = "default_demographics")]
    pub demographics: String,
    #[serde(default = "default_validating_demographics")]
    pub validating_demographics: String,
    #[serde(default = "default_debrief")]
    pub debrief: String,
    #[serde(default = "default_cont_btn")]
    pub cont_btn: String,
}

impl Default for Assets {
    fn default() -> Self {
        Self {
            demographics: default_demographics(),
            validating_demographics: default_validating_demographics(),
            debrief: default_debrief(),
            cont_btn: default_cont_btn(),
        }
    }
}

fn default_asset(key: &str) -> String {
    static_url_table(STATIC_ROOT, TASK_RESOURCES)
        .remove(key)
        .unwrap_or_default()
}

fn default_demographics() -> String {
    default_asset("demographics_html")
}

fn default_validating_demographics() -> String {
    default_asset("validating_demographics_html")
}

fn default_debrief() -> String {
    default_asset("practice_debrief_html")
}

fn default_cont_btn() -> String {
    "submit".to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockRegistry {
    demographics: Block,
    validating_demographics: Block,
    debrief: Block,
}

impl BlockRegistry {
    pub fn from_assets(assets: &Assets) -> Self {
        Self {
            demographics: Block::Html(HtmlBlock {
                url: assets.demographics.clone(),
                cont_btn: assets.cont_btn.clone(),
                form: Some(FormKind::Demographics),
            }),
            validating_demographics: Block::Html(HtmlBlock {
                url: assets.validating_demographics.clone(),
                cont_btn: assets.cont_btn.clone(),
                form: Some(FormKind::ValidatingDemographics),
            }),
            debrief: Block::Debrief(DebriefBlock {
                url: assets.debrief.clone(),
                cont_btn: assets.cont_btn.clone(),
            }),
        }
    }

    pub fn demographics(&self) -> &Block {
        &self.demographics
    }

    pub fn validating_demographics(&self) -> &Block {
        &self.validating_demographics
    }

    pub fn debrief(&self) -> &Block {
        &self.debrief
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::from_assets(&Assets::default())
    }
}
