#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod duration;
pub mod monitoring;
pub mod observability;
pub mod security;

pub use self::{
    duration::K8sDuration,
    observability::{ClusterLogForwarder, ClusterLogForwarderSpec, ClusterLogForwarderStatus},
};
pub use k8s_openapi::{
    api::{
        self,
        apps::v1::{DaemonSet, Deployment},
        authorization::v1::SubjectAccessReview,
        core::v1::{ConfigMap, Secret, Service, ServiceAccount},
        networking::v1::NetworkPolicy,
        rbac::v1::{ClusterRoleBinding, Role, RoleBinding},
    },
    apimachinery::pkg::{
        apis::meta::v1::{LabelSelector, LabelSelectorRequirement, OwnerReference},
        util::intstr::IntOrString,
    },
    ByteString,
};
pub use kube::{
    api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams, ResourceExt},
    Client, Error, Resource,
};
