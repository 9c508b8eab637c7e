use anyhow::{anyhow, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

pub const PREVIEW_ASSIGNMENT_ID: &str = "ASSIGNMENT_ID_NOT_AVAILABLE";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfo {
    pub assignment_id: String,
    pub hit_id: String,
    pub worker_id: String,
    pub preview_mode: bool,
    pub outside_turk: bool,
}

pub trait PlatformProvider {
    fn platform_info(&self) -> PlatformInfo;
}

#[derive(Debug, Clone, Default)]
pub struct StaticPlatform(pub PlatformInfo);

impl PlatformProvider for StaticPlatform {
    fn platform_info(&self) -> PlatformInfo {
        self.0.clone()
    }
}

#[derive(Debug, Clone)]
pub struct QueryPlatform {
    info: PlatformInfo,
}

impl QueryPlatform {
    /// Accepts a full URL or a bare `key=value&...` query.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = if raw.contains("://") {
            Url::parse(raw).map_err(|e| anyhow!("invalid task url '{}': {}", raw, e))?
        } else {
            let query = raw.trim_start_matches('?');
            Url::parse(&format!("http://localhost/?{}", query))
                .map_err(|e| anyhow!("invalid query '{}': {}", raw, e))?
        };
        let mut assignment_id = String::new();
        let mut hit_id = String::new();
        let mut worker_id = String::new();
        for (key, value) in url.query_pairs() {
            match &*key {
                "assignmentId" => assignment_id = value.into_owned(),
                "hitId" => hit_id = value.into_owned(),
                "workerId" => worker_id = value.into_owned(),
                _ => {}
            }
        }
        let preview_mode = assignment_id == PREVIEW_ASSIGNMENT_ID;
        let outside_turk =
            !preview_mode && assignment_id.is_empty() && hit_id.is_empty() && worker_id.is_empty();
        Ok(Self {
            info: PlatformInfo {
                assignment_id,
                hit_id,
                worker_id,
                preview_mode,
                outside_turk,
            },
        })
    }
}

impl PlatformProvider for QueryPlatform {
    fn platform_info(&self) -> PlatformInfo {
        self.info.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_with_ids_is_inside_turk() {
        let p = QueryPlatform::parse("?assignmentId=A1&hitId=H1&workerId=W1&turkSubmitTo=x")
            .expect("parse");
        let info = p.platform_info();
        assert_eq!(info.assignment_id, "A1");
        assert_eq!(info.hit_id, "H1");
        assert_eq!(info.worker_id, "W1");
        assert!(!info.preview_mode);
        assert!(!info.outside_turk);
    }

    #[test]
    fn preview_assignment_sets_preview_mode() {
        let p = QueryPlatform::parse(
            "https://tasks.example.org/task?assignmentId=ASSIGNMENT_ID_NOT_AVAILABLE&hitId=H9",
        )
        .expect("parse");
        let info = p.platform_info();
        assert!(info.preview_mode);
        assert!(!info.outside_turk);
        assert_eq!(info.worker_id, "");
    }

    #[test]
    fn empty_query_is_outside_turk() {
        let info = QueryPlatform::parse("").expect("parse").platform_info();
        assert!(info.outside_turk);
        assert!(!info.preview_mode);
    }

    #[test]
    fn serializes_with_platform_field_names() {
        let info = PlatformInfo {
            assignment_id: "A".to_string(),
            hit_id: "H".to_string(),
            worker_id: "W".to_string(),
            preview_mode: false,
            outside_turk: true,
        };
        assert_eq!(
            serde_json::to_value(&info).expect("json"),
            json!({
                "assignmentId": "A",
                "hitId": "H",
                "workerId": "W",
                "previewMode": false,
                "outsideTurk": true
            })
        );
    }
}
