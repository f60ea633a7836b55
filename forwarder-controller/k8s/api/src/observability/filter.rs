use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub type_: FilterType,

    #[serde(default, rename = "kubeAPIAudit", skip_serializing_if = "Option::is_none")]
    pub kube_api_audit: Option<KubeApiAudit>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop: Vec<DropTest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prune: Option<PruneFilter>,

    #[serde(default, rename = "openshiftLabels", skip_serializing_if = "BTreeMap::is_empty")]
    pub add_labels: BTreeMap<String, String>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum FilterType {
    #[serde(rename = "addLabels")]
    AddLabels,
    #[serde(rename = "detectMultiline")]
    DetectMultiline,
    #[default]
    #[serde(rename = "drop")]
    Drop,
    #[serde(rename = "kubeAPIAudit")]
    KubeApiAudit,
    #[serde(rename = "parse")]
    Parse,
    #[serde(rename = "prune")]
    Prune,
}

/// Drops a record when every condition of any one test holds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct DropTest {
    #[serde(default, rename = "test")]
    pub conditions: Vec<DropCondition>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DropCondition {
    pub field: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_matches: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PruneFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub r#in: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_in: Vec<String>,
}

/// Audit policy applied to kube-apiserver audit events.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubeApiAudit {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub omit_stages: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub omit_response_codes: Option<Vec<i32>>,
}

// === impl FilterType ===

impl FilterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddLabels => "addLabels",
            Self::DetectMultiline => "detectMultiline",
            Self::Drop => "drop",
            Self::KubeApiAudit => "kubeAPIAudit",
            Self::Parse => "parse",
            Self::Prune => "prune",
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
