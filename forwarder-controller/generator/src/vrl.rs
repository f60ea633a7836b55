//! Remap-language snippets shared by the Vector filters and sinks.

use crate::Error;
use logging_forwarder_controller_k8s_api::observability::filter::{
    DropTest, KubeApiAudit, PruneFilter,
};
use std::fmt::Write;

/// Response codes omitted from audit events unless a filter says otherwise.
const DEFAULT_OMIT_RESPONSE_CODES: [i32; 4] = [404, 409, 422, 429];

/// Splits a field path such as `.kubernetes.labels."app.kubernetes.io/name"` into its segments.
pub(crate) fn path_segments(path: &str) -> Result<Vec<String>, Error> {
    let mut segments = Vec::new();
    let mut rest = path
        .strip_prefix('.')
        .ok_or_else(|| Error::Generator(format!("field path {path:?} must start with '.'")))?;
    while !rest.is_empty() {
        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted
                .find('"')
                .ok_or_else(|| Error::Generator(format!("unterminated quote in {path:?}")))?;
            segments.push(quoted[..end].to_string());
            rest = &quoted[end + 1..];
        } else {
            let end = rest.find('.').unwrap_or(rest.len());
            segments.push(rest[..end].to_string());
            rest = &rest[end..];
        }
        rest = rest.strip_prefix('.').unwrap_or(rest);
    }
    if segments.iter().any(String::is_empty) {
        return Err(Error::Generator(format!("field path {path:?} has an empty segment")));
    }
    Ok(segments)
}

/// A path as an array literal, e.g. `["kubernetes", "labels", "app"]`.
fn path_array(path: &str) -> Result<String, Error> {
    let segments = path_segments(path)?;
    Ok(serde_json::Value::from(segments).to_string())
}

/// A double-quoted string literal.
pub(crate) fn string(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

/// A raw regex literal.
fn regex(pattern: &str) -> String {
    format!("r'{}'", pattern.replace('\'', "\\'"))
}

/// True when `s` holds `{...}` placeholders that must be evaluated per record.
pub(crate) fn is_template(s: &str) -> bool {
    s.contains('{')
}

/// Translates a field template into an expression.
///
/// A template is literal text with `{...}` placeholders. Each placeholder lists alternatives
/// separated by `||`: field paths tried in order, optionally ending in a quoted default. For
/// example `app-{.kubernetes.namespace_name||"none"}` becomes
/// `"app-" + (string(.kubernetes.namespace_name) ?? "none")`.
pub(crate) fn template(tmpl: &str) -> Result<String, Error> {
    let mut parts = Vec::new();
    let mut rest = tmpl;
    while let Some(start) = rest.find('{') {
        if start > 0 {
            parts.push(string(&rest[..start]));
        }
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| Error::Generator(format!("unterminated placeholder in {tmpl:?}")))?;
        parts.push(placeholder(&after[..end], tmpl)?);
        rest = &after[end + 1..];
    }
    if !rest.is_empty() || parts.is_empty() {
        parts.push(string(rest));
    }
    Ok(parts.join(" + "))
}

fn placeholder(expr: &str, tmpl: &str) -> Result<String, Error> {
    let mut alternatives = Vec::new();
    let mut default = None;
    for alt in expr.split("||").map(str::trim) {
        if default.is_some() {
            return Err(Error::Generator(format!(
                "a default must be the last alternative in {tmpl:?}"
            )));
        }
        if let Some(lit) = alt.strip_prefix('"').and_then(|a| a.strip_suffix('"')) {
            default = Some(string(lit));
        } else if alt.starts_with('.') {
            path_segments(alt)?;
            alternatives.push(format!("string({alt})"));
        } else {
            return Err(Error::Generator(format!(
                "invalid placeholder {alt:?} in {tmpl:?}"
            )));
        }
    }
    alternatives.push(default.unwrap_or_else(|| string("")));
    Ok(format!("({})", alternatives.join(" ?? ")))
}

/// A condition that holds for records that are kept, i.e. those matching no drop test.
pub(crate) fn drop_condition(tests: &[DropTest]) -> String {
    let tests = tests
        .iter()
        .map(|test| {
            let conditions = test
                .conditions
                .iter()
                .filter_map(|c| {
                    let (pattern, negate) = match (&c.matches, &c.not_matches) {
                        (Some(p), _) => (p, ""),
                        (None, Some(p)) => (p, "!"),
                        (None, None) => return None,
                    };
                    Some(format!(
                        "{negate}match(to_string({}) ?? \"\", {})",
                        c.field,
                        regex(pattern)
                    ))
                })
                .collect::<Vec<_>>();
            format!("({})", conditions.join(" && "))
        })
        .collect::<Vec<_>>();
    format!("!({})", tests.join(" || "))
}

pub(crate) fn prune(prune: &PruneFilter) -> Result<String, Error> {
    let mut src = String::new();
    for path in &prune.r#in {
        path_segments(path)?;
        let _ = writeln!(src, "del({path})");
    }
    if !prune.not_in.is_empty() {
        src.push_str("_kept = {}\n");
        for path in &prune.not_in {
            let array = path_array(path)?;
            let _ = writeln!(src, "_v = get!(., {array})");
            let _ = writeln!(src, "if _v != null {{ _kept = set!(_kept, {array}, _v) }}");
        }
        src.push_str(". = _kept\n");
    }
    Ok(src.trim_end().to_string())
}

pub(crate) const PARSE_JSON: &str = r#"if is_string(.message) {
  parsed, err = parse_json(.message)
  if err == null && is_object(parsed) {
    .structured = parsed
  }
}"#;

pub(crate) fn add_labels(labels: &std::collections::BTreeMap<String, String>) -> String {
    let object = serde_json::to_string(labels).unwrap_or_else(|_| "{}".to_string());
    format!(".openshift.labels = merge(object(.openshift.labels) ?? {{}}, {object})")
}

/// Applies an audit policy to kube-apiserver audit events.
///
/// Rules are evaluated in order and the first match decides the level. `None` drops the event,
/// `Metadata` strips request and response bodies, `Request` strips the response body.
pub(crate) fn kube_api_audit(policy: &KubeApiAudit) -> String {
    let mut src = String::from(
        "if .log_type == \"audit\" && .log_source == \"kubeAPI\" {\n  level = \"Metadata\"\n",
    );

    let omit_codes = policy
        .omit_response_codes
        .clone()
        .unwrap_or_else(|| DEFAULT_OMIT_RESPONSE_CODES.to_vec());
    if !omit_codes.is_empty() {
        let _ = writeln!(
            src,
            "  if includes({}, .responseStatus.code) {{ abort }}",
            serde_json::Value::from(omit_codes)
        );
    }
    if !policy.omit_stages.is_empty() {
        let _ = writeln!(
            src,
            "  if includes({}, .stage) {{ abort }}",
            serde_json::Value::from(policy.omit_stages.clone())
        );
    }

    let rules = policy
        .rules
        .iter()
        .filter_map(|rule| {
            let level = rule.get("level")?.as_str()?;
            Some((rule_match(rule), level))
        })
        .collect::<Vec<_>>();
    for (i, (matches, level)) in rules.iter().enumerate() {
        let keyword = if i == 0 { "  if" } else { " else if" };
        let _ = write!(src, "{keyword} {matches} {{\n    level = {}\n  }}", string(level));
    }
    if !rules.is_empty() {
        src.push('\n');
    }

    src.push_str(
        r#"  if level == "None" { abort }
  .level = level
  if level == "Metadata" {
    del(.requestObject)
    del(.responseObject)
  } else if level == "Request" {
    del(.responseObject)
  }
}"#,
    );
    src
}

/// A condition matching the events an audit policy rule selects.
fn rule_match(rule: &serde_json::Value) -> String {
    let strings = |key: &str| -> Vec<String> {
        rule.get(key)
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };

    let mut conditions = Vec::new();
    for (key, field) in [
        ("users", ".user.username"),
        ("verbs", ".verb"),
        ("namespaces", ".objectRef.namespace"),
    ] {
        let values = strings(key);
        if !values.is_empty() {
            conditions.push(format!(
                "includes({}, {field})",
                serde_json::Value::from(values)
            ));
        }
    }

    let groups = strings("userGroups");
    if !groups.is_empty() {
        conditions.push(format!(
            "length(intersect(array(.user.groups) ?? [], {}) ?? []) > 0",
            serde_json::Value::from(groups)
        ));
    }

    let resources = rule
        .get("resources")
        .and_then(|v| v.as_array())
        .map(|groups| {
            groups
                .iter()
                .filter_map(|g| g.get("resources")?.as_array())
                .flatten()
                .filter_map(|r| r.as_str().map(str::to_string))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if !resources.is_empty() {
        conditions.push(format!(
            "includes({}, .objectRef.resource)",
            serde_json::Value::from(resources)
        ));
    }

    if conditions.is_empty() {
        return "true".to_string();
    }
    conditions.join(" && ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use logging_forwarder_controller_k8s_api::observability::filter::DropCondition;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(".log_type", &["log_type"])]
    #[case(".kubernetes.namespace_name", &["kubernetes", "namespace_name"])]
    #[case(".kubernetes.labels.\"app.kubernetes.io/name\"", &["kubernetes", "labels", "app.kubernetes.io/name"])]
    fn segments(#[case] path: &str, #[case] expected: &[&str]) {
        assert_eq!(path_segments(path).unwrap(), expected);
    }

    #[test]
    fn invalid_paths() {
        assert!(path_segments("log_type").is_err());
        assert!(path_segments(".a.\"b").is_err());
        assert!(path_segments(".a..b").is_err());
    }

    #[rstest]
    #[case("app-write", r#""app-write""#)]
    #[case(r#"{.log_type||"none"}"#, r#"(string(.log_type) ?? "none")"#)]
    #[case(
        r#"app-{.kubernetes.namespace_name||.log_type}-x"#,
        r#""app-" + (string(.kubernetes.namespace_name) ?? string(.log_type) ?? "") + "-x""#
    )]
    fn templates(#[case] tmpl: &str, #[case] expected: &str) {
        assert_eq!(template(tmpl).unwrap(), expected);
    }

    #[test]
    fn invalid_templates() {
        assert!(template("{.log_type").is_err());
        assert!(template(r#"{"a"||.b}"#).is_err());
        assert!(template("{log_type}").is_err());
    }

    #[test]
    fn drops_matching_records() {
        let tests = vec![
            DropTest {
                conditions: vec![
                    DropCondition {
                        field: ".kubernetes.namespace_name".to_string(),
                        matches: Some("very-important".to_string()),
                        not_matches: None,
                    },
                    DropCondition {
                        field: ".level".to_string(),
                        matches: None,
                        not_matches: Some("warning|error".to_string()),
                    },
                ],
            },
            DropTest {
                conditions: vec![DropCondition {
                    field: ".message".to_string(),
                    matches: Some("it's debug".to_string()),
                    not_matches: None,
                }],
            },
        ];
        assert_eq!(
            drop_condition(&tests),
            r#"!((match(to_string(.kubernetes.namespace_name) ?? "", r'very-important') && !match(to_string(.level) ?? "", r'warning|error')) || (match(to_string(.message) ?? "", r'it\'s debug')))"#
        );
    }

    #[test]
    fn prunes_fields() {
        let src = prune(&PruneFilter {
            r#in: vec![".kubernetes.labels".to_string()],
            not_in: vec![".log_type".to_string(), ".message".to_string()],
        })
        .unwrap();
        assert_eq!(
            src,
            r#"del(.kubernetes.labels)
_kept = {}
_v = get!(., ["log_type"])
if _v != null { _kept = set!(_kept, ["log_type"], _v) }
_v = get!(., ["message"])
if _v != null { _kept = set!(_kept, ["message"], _v) }
. = _kept"#
        );
    }

    #[test]
    fn audit_policy() {
        let policy = KubeApiAudit {
            rules: vec![
                serde_json::json!({ "level": "None", "verbs": ["watch"] }),
                serde_json::json!({
                    "level": "RequestResponse",
                    "resources": [{ "group": "", "resources": ["pods"] }],
                }),
                serde_json::json!({ "verbs": ["get"] }),
            ],
            omit_stages: vec!["RequestReceived".to_string()],
            omit_response_codes: Some(vec![]),
        };
        let src = kube_api_audit(&policy);
        assert!(!src.contains("responseStatus"), "{src}");
        assert!(src.contains(r#"if includes(["RequestReceived"], .stage) { abort }"#));
        assert!(src.contains(
            "  if includes([\"watch\"], .verb) {\n    level = \"None\"\n  } else if includes([\"pods\"], .objectRef.resource) {\n    level = \"RequestResponse\"\n  }\n"
        ));
    }

    #[test]
    fn default_omitted_codes() {
        let src = kube_api_audit(&KubeApiAudit::default());
        assert!(src.contains("if includes([404,409,422,429], .responseStatus.code) { abort }"));
    }
}
