//! The collector workload: a daemon set when any input reads node-local files, otherwise a
//! deployment.

use crate::{meta, Context};
use logging_forwarder_controller_core::{
    annotations::CONFIG_HASH, config_hash, dns1123_label, inputs, paths, RefNames,
    METRICS_PORT, METRICS_PORT_NAME,
};
use logging_forwarder_controller_k8s_api::{
    api::{
        apps::v1::{
            DaemonSetSpec, DaemonSetUpdateStrategy, DeploymentSpec, RollingUpdateDaemonSet,
        },
        core::v1::{
            Capabilities, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource,
            EnvVar, EnvVarSource, HostPathVolumeSource, KeyToPath, ObjectFieldSelector,
            PodSpec, PodTemplateSpec, ProjectedVolumeSource, SELinuxOptions, SeccompProfile,
            SecretVolumeSource, SecurityContext, ServiceAccountTokenProjection, Toleration,
            Volume, VolumeMount, VolumeProjection,
        },
    },
    observability::{output::AwsAuthType, BearerTokenFrom, CollectorType},
    DaemonSet, Deployment, IntOrString, LabelSelector, ObjectMeta,
};
use std::collections::BTreeMap;

const PRIORITY_CLASS: &str = "system-node-critical";
const TERMINATION_GRACE_SECONDS: i64 = 10;
const OS_LABEL: &str = "kubernetes.io/os";
const DEFAULT_MAX_UNAVAILABLE: &str = "100%";

/// The audience and lifetime of the projected token used for web identity federation.
const SA_TOKEN_AUDIENCE: &str = "openshift";
const SA_TOKEN_EXPIRATION_SECONDS: i64 = 3600;

#[derive(Clone, Debug, PartialEq)]
pub enum Workload {
    DaemonSet(DaemonSet),
    Deployment(Deployment),
}

pub fn workload(ctx: &Context<'_>) -> Workload {
    let daemonset = inputs::deploy_as_daemonset(ctx.spec, ctx.options);
    let metadata = meta::owned(ctx, &ctx.names.common);
    let selector = LabelSelector {
        match_labels: Some(ctx.identity().selector()),
        ..Default::default()
    };
    let template = pod_template(ctx, daemonset);

    if daemonset {
        return Workload::DaemonSet(DaemonSet {
            metadata,
            spec: Some(DaemonSetSpec {
                selector,
                template,
                update_strategy: Some(DaemonSetUpdateStrategy {
                    type_: Some("RollingUpdate".to_string()),
                    rolling_update: Some(RollingUpdateDaemonSet {
                        max_unavailable: Some(max_unavailable(ctx)),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    Workload::Deployment(Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            selector,
            template,
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// The annotation wins over the spec; both fall back to replacing every pod at once.
fn max_unavailable(ctx: &Context<'_>) -> IntOrString {
    ctx.options
        .max_unavailable
        .clone()
        .or_else(|| {
            ctx.spec
                .collector
                .as_ref()
                .and_then(|c| c.max_unavailable.clone())
        })
        .unwrap_or_else(|| IntOrString::String(DEFAULT_MAX_UNAVAILABLE.to_string()))
}

fn pod_template(ctx: &Context<'_>, daemonset: bool) -> PodTemplateSpec {
    let collector = ctx.spec.collector.clone().unwrap_or_default();

    let mut annotations = collector.annotations.clone();
    annotations.insert(CONFIG_HASH.to_string(), ctx.config_hash.to_string());

    let mut node_selector = collector.node_selector.clone();
    node_selector.insert(OS_LABEL.to_string(), "linux".to_string());

    let mut tolerations = default_tolerations();
    tolerations.extend(collector.tolerations.iter().cloned());

    let mounts = Mounts::build(ctx, daemonset);

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(ctx.identity().labels()),
            annotations: Some(annotations),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            service_account_name: Some(ctx.names.service_account.clone()),
            priority_class_name: Some(PRIORITY_CLASS.to_string()),
            termination_grace_period_seconds: Some(TERMINATION_GRACE_SECONDS),
            node_selector: Some(node_selector),
            tolerations: Some(tolerations),
            affinity: collector.affinity.clone(),
            containers: vec![Container {
                name: ctx.collector().as_str().to_string(),
                image: Some(ctx.image().to_string()),
                image_pull_policy: Some("IfNotPresent".to_string()),
                command: command(ctx.collector()),
                args: args(ctx.collector()),
                ports: Some(vec![ContainerPort {
                    name: Some(METRICS_PORT_NAME.to_string()),
                    container_port: METRICS_PORT,
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
                env: Some(env(ctx)),
                resources: collector.resources.clone(),
                security_context: Some(container_security_context()),
                volume_mounts: Some(mounts.mounts),
                termination_message_policy: Some("FallbackToLogsOnError".to_string()),
                ..Default::default()
            }],
            volumes: Some(mounts.volumes),
            ..Default::default()
        }),
    }
}

fn default_tolerations() -> Vec<Toleration> {
    ["node-role.kubernetes.io/master", "node.kubernetes.io/disk-pressure"]
        .into_iter()
        .map(|key| Toleration {
            key: Some(key.to_string()),
            operator: Some("Exists".to_string()),
            effect: Some("NoSchedule".to_string()),
            ..Default::default()
        })
        .collect()
}

fn command(collector: CollectorType) -> Option<Vec<String>> {
    match collector {
        CollectorType::Vector => None,
        CollectorType::Fluentd => Some(vec![
            "/bin/sh".to_string(),
            format!("{}/{}", paths::FLUENTD_CONFIG_DIR, paths::FLUENTD_RUN_SCRIPT_KEY),
        ]),
    }
}

fn args(collector: CollectorType) -> Option<Vec<String>> {
    match collector {
        CollectorType::Vector => Some(vec![
            "--config-toml".to_string(),
            format!("{}/{}", paths::VECTOR_CONFIG_DIR, paths::VECTOR_CONFIG_KEY),
        ]),
        CollectorType::Fluentd => None,
    }
}

fn env(ctx: &Context<'_>) -> Vec<EnvVar> {
    let value = |name: &str, value: &str| EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    };
    let field = |name: &str, path: &str| EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                api_version: Some("v1".to_string()),
                field_path: path.to_string(),
            }),
            ..Default::default()
        }),
    };

    let trust_bundle_hash = config_hash(ctx.trust_bundle.unwrap_or_default());
    let log_level = match ctx.collector() {
        CollectorType::Vector => "VECTOR_LOG",
        CollectorType::Fluentd => "LOG_LEVEL",
    };

    let mut env = vec![
        value("COLLECTOR_CONF_HASH", ctx.config_hash),
        value("TRUSTED_CA_HASH", &trust_bundle_hash),
        field("K8S_NODE_NAME", "spec.nodeName"),
        field("NODE_IPV4", "status.hostIP"),
        field("POD_IP", "status.podIP"),
        field("POD_IPS", "status.podIPs"),
        value("OPENSHIFT_CLUSTER_ID", &ctx.cluster.id),
        value(log_level, &ctx.options.log_level),
    ];
    if ctx.collector() == CollectorType::Vector {
        env.push(field("VECTOR_SELF_NODE_NAME", "spec.nodeName"));
    }
    env.extend(
        ctx.cluster
            .proxy
            .env()
            .into_iter()
            .map(|(name, v)| value(&name, &v)),
    );
    env
}

fn container_security_context() -> SecurityContext {
    SecurityContext {
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            add: None,
        }),
        se_linux_options: Some(SELinuxOptions {
            type_: Some("spc_t".to_string()),
            ..Default::default()
        }),
        read_only_root_filesystem: Some(true),
        allow_privilege_escalation: Some(false),
        seccomp_profile: Some(SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            localhost_profile: None,
        }),
        ..Default::default()
    }
}

/// Volumes and their mounts, kept in step.
#[derive(Default)]
struct Mounts {
    volumes: Vec<Volume>,
    mounts: Vec<VolumeMount>,
}

// === impl Mounts ===

impl Mounts {
    fn build(ctx: &Context<'_>, daemonset: bool) -> Self {
        let mut m = Self::default();
        let namespace = ctx.namespace();
        let collector = ctx.collector();

        m.secret("metrics", &ctx.names.metrics_secret, paths::METRICS_CERT_DIR, true);
        m.add(
            Volume {
                name: "tmp".to_string(),
                empty_dir: Some(EmptyDirVolumeSource {
                    medium: Some("Memory".to_string()),
                    size_limit: None,
                }),
                ..Default::default()
            },
            "/tmp",
            false,
        );

        if daemonset {
            for (name, path) in paths::HOST_LOG_ROOTS {
                m.host_path(name, path, None, true);
            }
        }

        let data_dir = paths::data_dir(collector, &namespace, &ctx.name());
        if daemonset {
            m.host_path("datadir", &data_dir, Some("DirectoryOrCreate"), false);
        } else {
            m.add(
                Volume {
                    name: "datadir".to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                },
                &data_dir,
                false,
            );
        }

        let config_dir = paths::config_dir(collector);
        match collector {
            CollectorType::Vector => m.secret("config", &ctx.names.config_artifact, config_dir, true),
            CollectorType::Fluentd => m.config_map("config", &ctx.names.config_artifact, config_dir),
        }

        let refs = RefNames::of(ctx.spec);
        let mut secrets = refs.secrets;
        secrets.insert(ctx.names.sa_token_secret.clone());
        for secret in &secrets {
            m.secret(secret, secret, &paths::secret_dir(secret), true);
        }
        for config_map in &refs.config_maps {
            m.config_map(
                &format!("config-{config_map}"),
                config_map,
                &paths::config_map_dir(config_map),
            );
        }

        for (input, _) in ctx.spec.receivers() {
            let service = ctx.names.input_service(&input.name);
            m.optional_secret(
                &format!("receiver-{service}"),
                &service,
                &paths::receiver_cert_dir(&service),
            );
        }

        if uses_projected_token(ctx) {
            m.add(
                Volume {
                    name: paths::SA_TOKEN_VOLUME.to_string(),
                    projected: Some(ProjectedVolumeSource {
                        sources: Some(vec![VolumeProjection {
                            service_account_token: Some(ServiceAccountTokenProjection {
                                audience: Some(SA_TOKEN_AUDIENCE.to_string()),
                                expiration_seconds: Some(SA_TOKEN_EXPIRATION_SECONDS),
                                path: paths::SA_TOKEN_FILE.to_string(),
                            }),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                &paths::service_account_token_dir(paths::SA_TOKEN_VOLUME),
                true,
            );
        }

        if ctx.aws_credentials.is_some() {
            m.config_map(
                "aws-credentials",
                &ctx.names.aws_credentials_map,
                paths::AWS_CREDENTIALS_DIR,
            );
        }

        if ctx.trust_bundle.is_some() {
            m.add(
                Volume {
                    name: ctx.names.trust_bundle.clone(),
                    config_map: Some(ConfigMapVolumeSource {
                        name: ctx.names.trust_bundle.clone(),
                        items: Some(vec![KeyToPath {
                            key: paths::TRUSTED_CA_KEY.to_string(),
                            path: paths::TRUSTED_CA_FILE.to_string(),
                            mode: None,
                        }]),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                paths::TRUSTED_CA_DIR,
                true,
            );
        }

        m
    }

    /// Volume names are derived from secret and config map names, which may contain dots.
    fn add(&mut self, mut volume: Volume, path: &str, read_only: bool) {
        volume.name = dns1123_label(&volume.name);
        self.mounts.push(VolumeMount {
            name: volume.name.clone(),
            mount_path: path.to_string(),
            read_only: read_only.then_some(true),
            ..Default::default()
        });
        self.volumes.push(volume);
    }

    fn secret(&mut self, name: &str, secret: &str, path: &str, read_only: bool) {
        let source = SecretVolumeSource {
            secret_name: Some(secret.to_string()),
            ..Default::default()
        };
        self.add(
            Volume {
                name: name.to_string(),
                secret: Some(source),
                ..Default::default()
            },
            path,
            read_only,
        );
    }

    /// A secret that may not exist yet, such as a serving certificate still being issued.
    fn optional_secret(&mut self, name: &str, secret: &str, path: &str) {
        let source = SecretVolumeSource {
            secret_name: Some(secret.to_string()),
            optional: Some(true),
            ..Default::default()
        };
        self.add(
            Volume {
                name: name.to_string(),
                secret: Some(source),
                ..Default::default()
            },
            path,
            true,
        );
    }

    fn config_map(&mut self, name: &str, config_map: &str, path: &str) {
        self.add(
            Volume {
                name: name.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: config_map.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            path,
            true,
        );
    }

    fn host_path(&mut self, name: &str, path: &str, type_: Option<&str>, read_only: bool) {
        self.add(
            Volume {
                name: name.to_string(),
                host_path: Some(HostPathVolumeSource {
                    path: path.to_string(),
                    type_: type_.map(str::to_string),
                }),
                ..Default::default()
            },
            path,
            read_only,
        );
    }
}

/// True when an output assumes an IAM role with the service account's own token.
fn uses_projected_token(ctx: &Context<'_>) -> bool {
    ctx.spec
        .outputs
        .iter()
        .filter_map(|o| o.aws_authentication())
        .filter(|a| a.type_ == AwsAuthType::IamRole)
        .filter_map(|a| a.iam_role.as_ref())
        .any(|r| r.token.from == BearerTokenFrom::ServiceAccount)
}

// === impl Workload ===

impl Workload {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::DaemonSet(ds) => ds.metadata.name.as_deref(),
            Self::Deployment(d) => d.metadata.name.as_deref(),
        }
    }

    pub fn pod_template(&self) -> Option<&PodTemplateSpec> {
        match self {
            Self::DaemonSet(ds) => ds.spec.as_ref().map(|s| &s.template),
            Self::Deployment(d) => d.spec.as_ref().map(|s| &s.template),
        }
    }

    /// The value of an environment variable on the collector container.
    pub fn env(&self, name: &str) -> Option<&str> {
        self.pod_template()?
            .spec
            .as_ref()?
            .containers
            .first()?
            .env
            .as_ref()?
            .iter()
            .find(|e| e.name == name)?
            .value
            .as_deref()
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.pod_template()
            .and_then(|t| t.metadata.as_ref())
            .and_then(|m| m.annotations.clone())
            .unwrap_or_default()
    }
}
