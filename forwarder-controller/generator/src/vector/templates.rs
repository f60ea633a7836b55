//! Vector configuration templates, looked up by element name.

pub(super) fn source(name: &str) -> Option<&'static str> {
    let template = match name {
        "global" => GLOBAL,
        "kubernetes_logs" => KUBERNETES_LOGS,
        "journald" => JOURNALD,
        "file" => FILE,
        "http_server" => HTTP_SERVER,
        "syslog_server" => SYSLOG_SERVER,
        "remap" => REMAP,
        "filter" => FILTER,
        "throttle" => THROTTLE,
        "detect_exceptions" => DETECT_EXCEPTIONS,
        "tls" => TLS,
        "http_auth" => HTTP_AUTH,
        "aws_auth" => AWS_AUTH,
        "sasl" => SASL,
        "buffer" => BUFFER,
        "acknowledgements" => ACKNOWLEDGEMENTS,
        "batch" => BATCH,
        "request" => REQUEST,
        "elasticsearch" => ELASTICSEARCH,
        "http" => HTTP,
        "kafka" => KAFKA,
        "loki" => LOKI,
        "syslog" => SYSLOG,
        "cloudwatch" => CLOUDWATCH,
        "s3" => S3,
        "splunk" => SPLUNK,
        "azure_monitor" => AZURE_MONITOR,
        "google_cloud_logging" => GOOGLE_CLOUD_LOGGING,
        "otlp" => OTLP,
        "console" => CONSOLE,
        "metrics" => METRICS,
        _ => return None,
    };
    Some(template)
}

const GLOBAL: &str = r#"
expire_metrics_secs = 60
data_dir = {{ data_dir|quote }}

[api]
enabled = true

[secret.kubernetes_secret]
type = "file"
base_path = {{ secrets_dir|quote }}
"#;

const KUBERNETES_LOGS: &str = r#"
[sources.{{ id }}]
type = "kubernetes_logs"
max_read_bytes = 3145728
glob_minimum_cooldown_ms = 15000
auto_partial_merge = true
include_paths_glob_patterns = [{{ includes|comma_separated }}]
exclude_paths_glob_patterns = [{{ excludes|comma_separated }}]
{{ kv("extra_label_selector", label_selector) }}
pod_annotation_fields.pod_labels = "kubernetes.labels"
pod_annotation_fields.pod_namespace = "kubernetes.namespace_name"
pod_annotation_fields.pod_annotations = "kubernetes.annotations"
pod_annotation_fields.pod_uid = "kubernetes.pod_id"
pod_annotation_fields.pod_node_name = "hostname"
namespace_annotation_fields.namespace_uid = "kubernetes.namespace_id"
rotate_wait_secs = 5
"#;

const JOURNALD: &str = r#"
[sources.{{ id }}]
type = "journald"
journal_directory = "/var/log/journal"
"#;

const FILE: &str = r#"
[sources.{{ id }}]
type = "file"
include = [{{ include|comma_separated }}]
host_key = "hostname"
glob_minimum_cooldown_ms = 15000
ignore_older_secs = 3600
max_line_bytes = 3145728
max_read_bytes = 262144
rotate_wait_secs = 5
"#;

const HTTP_SERVER: &str = r#"
[sources.{{ id }}]
type = "http_server"
address = {{ address|quote }}
decoding.codec = "json"
{{ tls|compose_one }}
"#;

const SYSLOG_SERVER: &str = r#"
[sources.{{ id }}]
type = "syslog"
address = {{ address|quote }}
mode = "tcp"
{{ tls|compose_one }}
"#;

const REMAP: &str = r#"
[transforms.{{ id }}]
type = "remap"
inputs = [{{ inputs|comma_separated }}]
{% if drop_on_abort %}
drop_on_abort = true
{% endif %}
source = '''
{{ source }}
'''
"#;

const FILTER: &str = r#"
[transforms.{{ id }}]
type = "filter"
inputs = [{{ inputs|comma_separated }}]
condition = '''
{{ condition }}
'''
"#;

const THROTTLE: &str = r#"
[transforms.{{ id }}]
type = "throttle"
inputs = [{{ inputs|comma_separated }}]
window_secs = 1
threshold = {{ threshold }}
{{ kv("key_field", key_field) }}
"#;

const DETECT_EXCEPTIONS: &str = r#"
[transforms.{{ id }}]
type = "detect_exceptions"
inputs = [{{ inputs|comma_separated }}]
languages = ["All"]
group_by = ["kubernetes.namespace_name","kubernetes.pod_name","kubernetes.container_name", "kubernetes.pod_id"]
expire_after_ms = 2000
multiline_flush_interval_ms = 2000
"#;

const TLS: &str = r#"
[{{ table }}.tls]
{% if enabled %}
enabled = true
{% endif %}
{{ kv("min_tls_version", min_tls_version) }}
{{ kv("ciphersuites", ciphersuites) }}
{% if insecure %}
verify_certificate = false
verify_hostname = false
{% endif %}
{{ kv("key_file", key_file) }}
{{ kv("crt_file", crt_file) }}
{{ kv("ca_file", ca_file) }}
{{ kv("key_pass", key_pass) }}
"#;

const HTTP_AUTH: &str = r#"
[{{ table }}.auth]
strategy = {{ strategy|quote }}
{{ kv("user", user) }}
{{ kv("password", password) }}
{{ kv("token", token) }}
"#;

const AWS_AUTH: &str = r#"
{% if credentials_file %}
auth.credentials_file = {{ credentials_file|quote }}
auth.profile = {{ profile|quote }}
{% else %}
auth.access_key_id = {{ access_key_id|quote }}
auth.secret_access_key = {{ secret_access_key|quote }}
{% endif %}
"#;

const SASL: &str = r#"
[{{ table }}.sasl]
enabled = true
mechanism = {{ mechanism|quote }}
{{ kv("username", username) }}
{{ kv("password", password) }}
"#;

const BUFFER: &str = r#"
[{{ table }}.buffer]
{% if disk %}
type = "disk"
when_full = "block"
max_size = 268435488
{% else %}
when_full = "drop_newest"
{% endif %}
"#;

const ACKNOWLEDGEMENTS: &str = r#"
[{{ table }}.acknowledgements]
enabled = true
"#;

const BATCH: &str = r#"
[{{ table }}.batch]
max_bytes = {{ max_bytes }}
"#;

const REQUEST: &str = r#"
[{{ table }}.request]
{{ kv("retry_initial_backoff_secs", retry_initial_backoff_secs) }}
{{ kv("retry_max_duration_secs", retry_max_duration_secs) }}
{{ kv("timeout_secs", timeout_secs) }}
{% if headers %}

[{{ table }}.request.headers]
{% for name, value in headers|items %}
{{ name|quote }} = {{ value|quote }}
{% endfor %}
{% endif %}
"#;

const ELASTICSEARCH: &str = r#"
[sinks.{{ id }}]
type = "elasticsearch"
inputs = [{{ inputs|comma_separated }}]
endpoints = [{{ endpoints|comma_separated }}]
bulk.index = {{ index|quote }}
bulk.action = "create"
{{ kv("api_version", api_version) }}
{{ kv("compression", compression) }}
id_key = "_id"
encoding.except_fields = ["_internal"]
{{ parts|compose }}
"#;

const HTTP: &str = r#"
[sinks.{{ id }}]
type = "http"
inputs = [{{ inputs|comma_separated }}]
uri = {{ uri|quote }}
method = {{ method|quote }}
{{ kv("compression", compression) }}
encoding.codec = "json"
encoding.except_fields = ["_internal"]
{{ parts|compose }}
"#;

const KAFKA: &str = r#"
[sinks.{{ id }}]
type = "kafka"
inputs = [{{ inputs|comma_separated }}]
bootstrap_servers = {{ bootstrap_servers|quote }}
topic = {{ topic|quote }}
{{ kv("compression", compression) }}
healthcheck.enabled = false
encoding.codec = "json"
encoding.timestamp_format = "rfc3339"
encoding.except_fields = ["_internal"]
{{ parts|compose }}
"#;

const LOKI: &str = r#"
[sinks.{{ id }}]
type = "loki"
inputs = [{{ inputs|comma_separated }}]
endpoint = {{ endpoint|quote }}
out_of_order_action = "accept"
healthcheck.enabled = false
{{ kv("tenant_id", tenant_id) }}
{{ kv("compression", compression) }}

[sinks.{{ id }}.encoding]
codec = "json"
except_fields = ["_internal"]

[sinks.{{ id }}.labels]
{% for name, value in labels|items %}
{{ name }} = {{ value|quote }}
{% endfor %}
{{ parts|compose }}
"#;

const SYSLOG: &str = r#"
[sinks.{{ id }}]
type = "socket"
inputs = [{{ inputs|comma_separated }}]
address = {{ address|quote }}
mode = {{ mode|quote }}

[sinks.{{ id }}.encoding]
codec = "syslog"
except_fields = ["_internal"]
rfc = {{ rfc|quote }}
{{ kv("facility", facility) }}
{{ kv("severity", severity) }}
{{ kv("app_name", app_name) }}
{{ kv("msg_id", msg_id) }}
{{ kv("proc_id", proc_id) }}
{{ kv("payload_key", payload_key) }}
{{ parts|compose }}
"#;

const CLOUDWATCH: &str = r#"
[sinks.{{ id }}]
type = "aws_cloudwatch_logs"
inputs = [{{ inputs|comma_separated }}]
region = {{ region|quote }}
group_name = {{ group_name|quote }}
stream_name = {{ stream_name|quote }}
{{ kv("endpoint", endpoint) }}
{{ kv("compression", compression) }}
healthcheck.enabled = false
encoding.codec = "json"
encoding.except_fields = ["_internal"]
{{ auth|compose_one }}
{{ parts|compose }}
"#;

const S3: &str = r#"
[sinks.{{ id }}]
type = "aws_s3"
inputs = [{{ inputs|comma_separated }}]
region = {{ region|quote }}
bucket = {{ bucket|quote }}
key_prefix = {{ key_prefix|quote }}
{{ kv("endpoint", endpoint) }}
{{ kv("compression", compression) }}
healthcheck.enabled = false
encoding.codec = "json"
encoding.except_fields = ["_internal"]
{{ auth|compose_one }}
{{ parts|compose }}
"#;

const SPLUNK: &str = r#"
[sinks.{{ id }}]
type = "splunk_hec_logs"
inputs = [{{ inputs|comma_separated }}]
endpoint = {{ endpoint|quote }}
default_token = {{ token|quote }}
{{ kv("index", index) }}
{{ kv("compression", compression) }}
timestamp_key = "@timestamp"
encoding.codec = "json"
encoding.except_fields = ["_internal"]
{{ parts|compose }}
"#;

const AZURE_MONITOR: &str = r#"
[sinks.{{ id }}]
type = "azure_monitor_logs"
inputs = [{{ inputs|comma_separated }}]
customer_id = {{ customer_id|quote }}
shared_key = {{ shared_key|quote }}
log_type = {{ log_type|quote }}
{{ kv("azure_resource_id", azure_resource_id) }}
{{ kv("host", host) }}
encoding.except_fields = ["_internal"]
{{ parts|compose }}
"#;

const GOOGLE_CLOUD_LOGGING: &str = r#"
[sinks.{{ id }}]
type = "gcp_stackdriver_logs"
inputs = [{{ inputs|comma_separated }}]
{{ kv(id_key, id_value) }}
log_id = {{ log_id|quote }}
{{ kv("credentials_path", credentials_path) }}
severity_key = "level"
encoding.except_fields = ["_internal"]

[sinks.{{ id }}.resource]
type = "k8s_node"
node_name = "{{ '{{' }} hostname {{ '}}' }}"
{{ parts|compose }}
"#;

const OTLP: &str = r#"
[sinks.{{ id }}]
type = "opentelemetry"
inputs = [{{ inputs|comma_separated }}]

[sinks.{{ id }}.protocol]
type = "http"
uri = {{ uri|quote }}
method = "post"
{{ kv("compression", compression) }}
payload_prefix = "{\"resourceLogs\":"
payload_suffix = "}"

[sinks.{{ id }}.protocol.encoding]
codec = "json"
except_fields = ["_internal"]
{{ parts|compose }}
"#;

const CONSOLE: &str = r#"
[sinks.{{ id }}]
type = "console"
inputs = [{{ inputs|comma_separated }}]
target = "stdout"
encoding.codec = "json"
"#;

const METRICS: &str = r#"
[sources.internal_metrics]
type = "internal_metrics"

[transforms.add_nodename_to_metric]
type = "remap"
inputs = ["internal_metrics"]
source = '''
.tags.hostname = get_env_var!("VECTOR_SELF_NODE_NAME")
'''

[sinks.prometheus_output]
type = "prometheus_exporter"
inputs = ["add_nodename_to_metric"]
address = {{ address|quote }}
default_namespace = "collector"

[sinks.prometheus_output.tls]
enabled = true
key_file = {{ key_file|quote }}
crt_file = {{ crt_file|quote }}
min_tls_version = {{ min_tls_version|quote }}
ciphersuites = {{ ciphersuites|quote }}
"#;
