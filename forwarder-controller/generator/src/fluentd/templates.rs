pub(super) fn source(name: &str) -> Option<&'static str> {
    let template = match name {
        "system" => SYSTEM,
        "metrics" => METRICS,
        "tail" => TAIL,
        "journal" => JOURNAL,
        "label" => LABEL,
        "concat" => CONCAT,
        "kubernetes_metadata" => KUBERNETES_METADATA,
        "record" => RECORD,
        "grep" => GREP,
        "output" => OUTPUT,
        "section" => SECTION,
        _ => return None,
    };
    Some(template)
}

const SYSTEM: &str = r#"
## Generated by the cluster logging operator.
<system>
  log_level {{ log_level }}
</system>
"#;

const METRICS: &str = r#"
<source>
  @type prometheus
  bind "[::]"
  <transport tls>
    cert_path {{ crt_file }}
    private_key_path {{ key_file }}
    min_version {{ min_version }}
  </transport>
</source>
<source>
  @type prometheus_monitor
  <labels>
    hostname ${hostname}
  </labels>
</source>
<source>
  @type prometheus_output_monitor
  <labels>
    hostname ${hostname}
  </labels>
</source>
"#;

const TAIL: &str = r#"
<source>
  @type tail
  @id {{ id }}
  path {{ path|quote }}
  {% if excludes %}
  exclude_path [{{ excludes|comma_separated }}]
  {% endif %}
  pos_file {{ pos_file|quote }}
  follow_inodes true
  refresh_interval 5
  rotate_wait 5
  tag {{ tag }}
  read_from_head true
  skip_refresh_on_startup true
  @label {{ label }}
  {{ parse|indent(2) }}
</source>
"#;

const JOURNAL: &str = r##"
<source>
  @type systemd
  @id journal-input
  path "/var/log/journal"
  <storage>
    @type local
    persistent true
    path {{ pos_file|quote }}
  </storage>
  matches "#{ENV['JOURNAL_FILTERS_JSON'] || '[]'}"
  tag journal
  read_from_head true
  @label @INGRESS
</source>
"##;

const LABEL: &str = r#"
<label {{ label }}>
  {{ parts|compose|indent(2) }}
  {% for route in matches %}
  <match {{ route.pattern }}>
  {% if route.labels|length == 1 %}
    @type relabel
    @label {{ route.labels[0] }}
  {% elif route.labels %}
    @type copy
    copy_mode deep
    {% for label in route.labels %}
    <store>
      @type relabel
      @label {{ label }}
    </store>
    {% endfor %}
  {% else %}
    @type null
  {% endif %}
  </match>
  {% endfor %}
</label>
"#;

const CONCAT: &str = r#"
<filter kubernetes.**>
  @type concat
  key message
  partial_key logtag
  partial_value P
  separator ''
</filter>
"#;

const KUBERNETES_METADATA: &str = r#"
<filter kubernetes.**>
  @type kubernetes_metadata
  kubernetes_url 'https://kubernetes.default.svc'
  allow_orphans false
  cache_size '1000'
  ssl_partial_chain 'true'
</filter>
"#;

const RECORD: &str = r#"
<filter {{ pattern }}>
  @type record_modifier
  <record>
  {% for key, value in records|items %}
    {{ key }} {{ value }}
  {% endfor %}
  </record>
</filter>
"#;

const GREP: &str = r#"
<filter {{ pattern }}>
  @type grep
  {% for key, value in regexps|items %}
  <regexp>
    key {{ key }}
    pattern {{ value }}
  </regexp>
  {% endfor %}
</filter>
"#;

const OUTPUT: &str = r#"
<label {{ label }}>
  {{ parts|compose|indent(2) }}
  <match **>
    @type {{ plugin }}
    @id {{ id }}
    {% for key, value in settings %}
    {{ key }} {{ value }}
    {% endfor %}
    {{ sections|compose|indent(4) }}
  </match>
</label>
"#;

const SECTION: &str = r#"
<{{ name }}>
{% for key, value in settings %}
  {{ key }} {{ value }}
{% endfor %}
</{{ name }}>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_template_parses() {
        let names = [
            "system",
            "metrics",
            "tail",
            "journal",
            "label",
            "concat",
            "kubernetes_metadata",
            "record",
            "grep",
            "output",
            "section",
        ];
        let mut env = minijinja::Environment::new();
        for name in names {
            let src = source(name).unwrap_or_else(|| panic!("missing template {name}"));
            env.add_template(name, src)
                .unwrap_or_else(|e| panic!("{name}: {e}"));
        }
        assert!(source("unknown").is_none());
    }
}
