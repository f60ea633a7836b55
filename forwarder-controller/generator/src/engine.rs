//! Depth-first rendering of configuration elements.
//!
//! An [`Element`] pairs the name of a template with the context it renders with. Templates are
//! looked up by name, so an element's context may itself hold elements that its template renders
//! in place with the `compose_one` and `compose` filters.

use crate::Error;
use minijinja::{Environment, ErrorKind, State, UndefinedBehavior, Value};
use serde::Serialize;

/// A named template and its context.
#[derive(Clone, Debug, Serialize)]
pub struct Element {
    template: &'static str,
    context: Value,
}

/// Renders elements against a fixed set of templates.
#[derive(Debug)]
pub struct Engine {
    env: Environment<'static>,
}

// === impl Element ===

impl Element {
    pub fn new(template: &'static str, context: impl Serialize) -> Self {
        Self {
            template,
            context: Value::from_serialize(context),
        }
    }

    #[inline]
    pub fn template(&self) -> &'static str {
        self.template
    }
}

// === impl Engine ===

impl Engine {
    pub fn new(templates: fn(&str) -> Option<&'static str>) -> Self {
        let mut env = Environment::new();
        env.set_loader(move |name| Ok(templates(name).map(str::to_string)));
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_filter("compose", compose);
        env.add_filter("compose_one", compose_one);
        env.add_filter("comma_separated", comma_separated);
        env.add_filter("quote", quote);
        env.add_function("kv", kv);
        Self { env }
    }

    pub fn render(&self, element: &Element) -> Result<String, Error> {
        let render = || {
            self.env
                .get_template(element.template)?
                .render(&element.context)
        };
        render()
            .map(|s| tidy(&s))
            .map_err(|source| Error::Template {
                template: element.template.to_string(),
                source,
            })
    }

    /// Renders `elements` in order, separated by blank lines. Elements that render nothing are
    /// skipped.
    pub fn compose(&self, elements: &[Element]) -> Result<String, Error> {
        let mut out = String::new();
        for element in elements {
            let text = self.render(element)?;
            if text.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&text);
        }
        out.push('\n');
        Ok(out)
    }
}

fn render_value(state: &State<'_, '_>, element: &Value) -> Result<String, minijinja::Error> {
    if element.is_none() || element.is_undefined() {
        return Ok(String::new());
    }
    let name = element.get_attr("template")?;
    let name = name.as_str().ok_or_else(|| {
        minijinja::Error::new(ErrorKind::InvalidOperation, "element without a template name")
    })?;
    let context = element.get_attr("context")?;
    let text = state.env().get_template(name)?.render(context)?;
    Ok(text.trim().to_string())
}

/// Drops blank lines left by omitted values and separates tables with a single blank line.
///
/// Lines inside `'''` literal strings are kept as written.
fn tidy(text: &str) -> String {
    let mut out = Vec::new();
    let mut literal = false;
    for line in text.trim().lines() {
        let trimmed = line.trim();
        if !literal {
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('[') && !out.is_empty() && trimmed.ends_with(']') {
                out.push("");
            }
        }
        if trimmed.matches("'''").count() % 2 == 1 {
            literal = !literal;
        }
        out.push(line.trim_end());
    }
    out.join("\n")
}

/// `{{ element|compose_one }}` renders a single element, or nothing for `none`.
fn compose_one(state: &State<'_, '_>, element: Value) -> Result<String, minijinja::Error> {
    render_value(state, &element)
}

/// `{{ elements|compose }}` renders a list of elements, one per line group.
fn compose(state: &State<'_, '_>, elements: Value) -> Result<String, minijinja::Error> {
    let mut rendered = Vec::new();
    for element in elements.try_iter()? {
        let text = render_value(state, &element)?;
        if !text.is_empty() {
            rendered.push(text);
        }
    }
    Ok(rendered.join("\n"))
}

/// `[{{ ids|comma_separated }}]` renders a list of strings as quoted, comma separated values.
fn comma_separated(values: Value) -> Result<String, minijinja::Error> {
    let mut quoted = Vec::new();
    for v in values.try_iter()? {
        let s = match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        };
        quoted.push(quote(&s));
    }
    Ok(quoted.join(", "))
}

/// A double-quoted string with TOML basic-string escapes.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// `{{ kv("key", value) }}` renders `key = value`, or nothing when the value is empty.
fn kv(key: &str, value: Value) -> String {
    if value.is_none() || value.is_undefined() {
        return String::new();
    }
    if let Some(s) = value.as_str() {
        if s.is_empty() {
            return String::new();
        }
        return format!("{key} = {}", quote(s));
    }
    format!("{key} = {value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn templates(name: &str) -> Option<&'static str> {
        match name {
            "outer" => Some(
                "[sinks.{{ id }}]\ninputs = [{{ inputs|comma_separated }}]\n{{ kv(\"endpoint\", endpoint) }}\n{{ auth|compose_one }}\n{{ labels|compose }}",
            ),
            "auth" => Some("auth.strategy = {{ strategy|quote }}"),
            "label" => Some("{{ name }} = {{ value|quote }}"),
            _ => None,
        }
    }

    #[derive(Serialize)]
    struct Outer {
        id: &'static str,
        inputs: Vec<&'static str>,
        endpoint: Option<&'static str>,
        auth: Option<Element>,
        labels: Vec<Element>,
    }

    #[derive(Serialize)]
    struct Label {
        name: &'static str,
        value: &'static str,
    }

    #[test]
    fn renders_depth_first() {
        let engine = Engine::new(templates);
        let outer = Element::new(
            "outer",
            Outer {
                id: "out",
                inputs: vec!["a", "b"],
                endpoint: Some("https://example.com"),
                auth: Some(Element::new(
                    "auth",
                    serde_json::json!({ "strategy": "bearer" }),
                )),
                labels: vec![
                    Element::new("label", Label { name: "x", value: "1" }),
                    Element::new("label", Label { name: "y", value: "say \"hi\"" }),
                ],
            },
        );
        assert_eq!(
            engine.render(&outer).unwrap(),
            "[sinks.out]\ninputs = [\"a\", \"b\"]\nendpoint = \"https://example.com\"\nauth.strategy = \"bearer\"\nx = \"1\"\ny = \"say \\\"hi\\\"\""
        );
    }

    #[test]
    fn empty_values_are_omitted() {
        let engine = Engine::new(templates);
        let outer = Element::new(
            "outer",
            Outer {
                id: "out",
                inputs: vec![],
                endpoint: None,
                auth: None,
                labels: vec![],
            },
        );
        assert_eq!(engine.render(&outer).unwrap(), "[sinks.out]\ninputs = []");
    }

    #[test]
    fn separates_tables() {
        let text = "[sinks.a]\ntype = \"x\"\n\n\n[sinks.a.tls]\n\nenabled = true\nsource = \'\'\'\n.a = 1\n\n.b = 2\n\'\'\'\n";
        assert_eq!(
            tidy(text),
            "[sinks.a]\ntype = \"x\"\n\n[sinks.a.tls]\nenabled = true\nsource = \'\'\'\n.a = 1\n\n.b = 2\n\'\'\'"
        );
    }

    #[test]
    fn unknown_template() {
        let engine = Engine::new(templates);
        let err = engine.render(&Element::new("missing", ())).unwrap_err();
        assert!(matches!(err, Error::Template { ref template, .. } if template == "missing"));
    }
}
