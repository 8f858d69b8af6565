use serde::{Deserialize, Serialize};

use crate::constants::{FEATURE_STATUS, FEATURE_TYPE};
use crate::error::ApiError;

/// A component as returned by `GET /components/{id}`. `id` is the id the
/// lookup was made with, so the feature parent always matches the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ComponentEnvelope {
    data: Option<ComponentData>,
}

#[derive(Debug, Deserialize)]
struct ComponentData {
    name: Option<String>,
    attributes: Option<ComponentAttributes>,
}

#[derive(Debug, Deserialize)]
struct ComponentAttributes {
    name: Option<String>,
}

impl ComponentEnvelope {
    /// Resolve the record, reading `data.name` first and `data.attributes.name`
    /// as a fallback.
    pub(crate) fn into_record(self, requested_id: &str) -> Result<ComponentRecord, ApiError> {
        let data = self
            .data
            .ok_or_else(|| ApiError::Malformed("response has no data object".to_string()))?;

        let name = data
            .name
            .or_else(|| data.attributes.and_then(|a| a.name))
            .ok_or_else(|| ApiError::Malformed("component has no name".to_string()))?;

        Ok(ComponentRecord {
            id: requested_id.to_string(),
            name,
        })
    }
}

/// Body of `POST /features`, built from a looked-up component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureRequest {
    pub data: FeatureData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureData {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub status: StatusRef,
    pub parent: ParentRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentRef {
    pub component: IdRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdRef {
    pub id: String,
}

impl FeatureRequest {
    /// Blocked feature named after its parent component.
    pub fn for_component(parent_id: &str, name: &str) -> Self {
        Self {
            data: FeatureData {
                kind: FEATURE_TYPE.to_string(),
                name: name.to_string(),
                description: feature_description(name),
                status: StatusRef {
                    name: FEATURE_STATUS.to_string(),
                },
                parent: ParentRef {
                    component: IdRef {
                        id: parent_id.to_string(),
                    },
                },
            },
        }
    }
}

impl From<&ComponentRecord> for FeatureRequest {
    fn from(record: &ComponentRecord) -> Self {
        FeatureRequest::for_component(&record.id, &record.name)
    }
}

/// HTML description attached to every created feature.
pub fn feature_description(name: &str) -> String {
    format!(
        "<p>Feature created automatically for component <b>{}</b>.</p>",
        escape_html(name)
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
