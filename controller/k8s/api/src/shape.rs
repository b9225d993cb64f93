//! Shapes workloads into the objects the API server accepts.

use crate::labels::{self, Map};
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment},
        batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec},
        core::v1::{
            Container, ContainerPort, EnvVar, HTTPGetAction, LocalObjectReference, Namespace,
            Pod, PodSpec, PodTemplateSpec, Probe, ResourceRequirements, Service, ServicePort,
            ServiceSpec, TCPSocketAction,
        },
    },
    apimachinery::pkg::{
        api::resource::Quantity,
        apis::meta::v1::{LabelSelector, ObjectMeta},
        util::intstr::IntOrString,
    },
};
use region_controller_core::{
    deployment::{HealthCheck, ServiceSpec as Endpoint, Workload},
    job::{CronWorkload, JobWorkload},
    space::Space,
};

pub const TERMINATION_GRACE_PERIOD_SECONDS: i64 = 60;
pub const CRON_STARTING_DEADLINE_SECONDS: i64 = 60;

/// Platform-wide shaping options.
#[derive(Clone, Debug)]
pub struct Shaper {
    pub revision_history_limit: i32,
    pub image_pull_secret: Option<String>,
}

impl Default for Shaper {
    fn default() -> Self {
        Self {
            revision_history_limit: 10,
            image_pull_secret: None,
        }
    }
}

// === impl Shaper ===

impl Shaper {
    pub fn namespace(&self, space: &Space) -> Namespace {
        let mut labels = Map::new();
        labels.insert("name".to_string(), space.name.clone());
        if space.internal {
            labels.insert("internal".to_string(), "true".to_string());
        }
        for tag in space.compliance_tags() {
            labels.insert(format!("compliance-{tag}"), "true".to_string());
        }
        Namespace {
            metadata: ObjectMeta {
                name: Some(space.name.clone()),
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn deployment(&self, workload: &Workload) -> Deployment {
        Deployment {
            metadata: self.metadata(workload),
            spec: Some(DeploymentSpec {
                replicas: Some(workload.instances),
                revision_history_limit: Some(self.revision_history_limit),
                selector: LabelSelector {
                    match_labels: Some(labels::selector(&workload.name)),
                    ..Default::default()
                },
                strategy: Some(DeploymentStrategy {
                    type_: Some("RollingUpdate".to_string()),
                    rolling_update: Some(RollingUpdateDeployment {
                        max_unavailable: Some(IntOrString::Int(0)),
                        ..Default::default()
                    }),
                }),
                template: self.template(workload, None, true),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn service(&self, endpoint: &Endpoint) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(endpoint.name.clone()),
                namespace: Some(endpoint.space.clone()),
                labels: Some(endpoint.labels.clone()),
                ..Default::default()
            },
            spec: Some(self.service_spec(endpoint)),
            ..Default::default()
        }
    }

    /// The parts of a service spec the controller owns, applied over an existing spec on update.
    pub fn service_spec(&self, endpoint: &Endpoint) -> ServiceSpec {
        ServiceSpec {
            selector: Some(labels::selector(&endpoint.name)),
            ports: Some(vec![ServicePort {
                name: Some(if endpoint.http2 { "http2" } else { "http" }.to_string()),
                port: 80,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(endpoint.port.into())),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    /// A bare pod run once to completion.
    pub fn pod(&self, workload: &Workload) -> Pod {
        let template = self.template(workload, Some("Never"), false);
        Pod {
            metadata: ObjectMeta {
                name: Some(workload.name.clone()),
                namespace: Some(workload.space.clone()),
                ..template.metadata.unwrap_or_default()
            },
            spec: template.spec,
            ..Default::default()
        }
    }

    pub fn job(&self, job: &JobWorkload) -> Job {
        Job {
            metadata: self.metadata(&job.workload),
            spec: Some(self.job_spec(job)),
            ..Default::default()
        }
    }

    pub fn cron_job(&self, cron: &CronWorkload) -> CronJob {
        let job = JobWorkload {
            workload: cron.workload.clone(),
            parallelism: None,
            active_deadline_seconds: None,
        };
        CronJob {
            metadata: self.metadata(&cron.workload),
            spec: Some(CronJobSpec {
                schedule: cron.schedule.to_string(),
                starting_deadline_seconds: Some(CRON_STARTING_DEADLINE_SECONDS),
                job_template: JobTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels::pod_template(
                            &cron.workload.name,
                            &cron.workload.labels,
                        )),
                        ..Default::default()
                    }),
                    spec: Some(self.job_spec(&job)),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn job_spec(&self, job: &JobWorkload) -> JobSpec {
        JobSpec {
            parallelism: job.parallelism,
            active_deadline_seconds: job.active_deadline_seconds,
            template: self.template(&job.workload, Some("OnFailure"), false),
            ..Default::default()
        }
    }

    fn metadata(&self, workload: &Workload) -> ObjectMeta {
        ObjectMeta {
            name: Some(workload.name.clone()),
            namespace: Some(workload.space.clone()),
            labels: Some(workload.labels.clone()),
            ..Default::default()
        }
    }

    fn template(
        &self,
        workload: &Workload,
        restart_policy: Option<&str>,
        serves: bool,
    ) -> PodTemplateSpec {
        let annotations = workload.sidecar.then(|| {
            Some((labels::SIDECAR_INJECT.to_string(), "true".to_string()))
                .into_iter()
                .collect()
        });
        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(labels::pod_template(&workload.name, &workload.labels)),
                annotations,
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![container(workload, serves)],
                image_pull_secrets: self.image_pull_secret.as_ref().map(|name| {
                    vec![LocalObjectReference {
                        name: name.clone(),
                    }]
                }),
                restart_policy: restart_policy.map(String::from),
                termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD_SECONDS),
                ..Default::default()
            }),
        }
    }
}

/// Only serving workloads expose a port and readiness probe.
fn container(workload: &Workload, serves: bool) -> Container {
    let port = workload.port.filter(|_| serves);
    Container {
        name: workload.name.clone(),
        image: Some(workload.image.to_string()),
        image_pull_policy: Some("Always".to_string()),
        args: workload.command.clone(),
        env: Some(
            workload
                .env
                .iter()
                .map(|v| EnvVar {
                    name: v.name.clone(),
                    value: Some(v.value.clone()),
                    ..Default::default()
                })
                .collect(),
        ),
        ports: port.map(|p| {
            vec![ContainerPort {
                container_port: p.into(),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]
        }),
        readiness_probe: port.map(|p| probe(p, &workload.health_check)),
        resources: resources(&workload.memory.request, &workload.memory.limit),
        ..Default::default()
    }
}

fn probe(port: u16, health_check: &HealthCheck) -> Probe {
    let port = IntOrString::Int(port.into());
    let mut probe = Probe {
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        ..Default::default()
    };
    match health_check.http_path() {
        Some(path) => {
            probe.http_get = Some(HTTPGetAction {
                path: Some(path.to_string()),
                port,
                ..Default::default()
            })
        }
        None => {
            probe.tcp_socket = Some(TCPSocketAction {
                port,
                ..Default::default()
            })
        }
    }
    probe
}

fn resources(request: &str, limit: &str) -> Option<ResourceRequirements> {
    let memory = |q: &str| {
        (!q.is_empty()).then(|| {
            Some(("memory".to_string(), Quantity(q.to_string())))
                .into_iter()
                .collect()
        })
    };
    let requests = memory(request);
    let limits = memory(limit);
    if requests.is_none() && limits.is_none() {
        return None;
    }
    Some(ResourceRequirements {
        requests,
        limits,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;
    use region_controller_core::{config::EnvVar as Var, deployment::Memory};

    fn workload() -> Workload {
        Workload {
            name: "gotest".into(),
            space: "gotest".into(),
            image: "docker.io/akkeris/apachetest:latest".parse().unwrap(),
            command: None,
            env: vec![Var::new("PORT", "8080")],
            labels: btreemap! { "plan".to_string() => "scout".to_string() },
            instances: 2,
            port: Some(8080),
            health_check: HealthCheck::Root,
            memory: Memory {
                request: "256Mi".into(),
                limit: "512Mi".into(),
            },
            sidecar: false,
        }
    }

    fn container_of(spec: &Option<PodSpec>) -> &Container {
        &spec.as_ref().unwrap().containers[0]
    }

    #[test]
    fn deployment_probes_the_resolved_port() {
        let d = Shaper::default().deployment(&workload());
        let spec = d.spec.unwrap();
        assert_eq!(spec.replicas, Some(2));
        assert_eq!(spec.revision_history_limit, Some(10));
        assert_eq!(
            spec.strategy.unwrap().rolling_update.unwrap().max_unavailable,
            Some(IntOrString::Int(0))
        );

        let pod = spec.template.spec.as_ref().unwrap();
        assert_eq!(pod.termination_grace_period_seconds, Some(60));
        let c = container_of(&spec.template.spec);
        let http = c.readiness_probe.as_ref().unwrap().http_get.as_ref().unwrap();
        assert_eq!(http.path.as_deref(), Some("/"));
        assert_eq!(http.port, IntOrString::Int(8080));
        assert_eq!(c.ports.as_ref().unwrap()[0].container_port, 8080);
        assert_eq!(c.image.as_deref(), Some("docker.io/akkeris/apachetest:latest"));
    }

    #[test]
    fn tcp_health_checks_use_socket_probes() {
        let mut w = workload();
        w.health_check = HealthCheck::Tcp;
        let d = Shaper::default().deployment(&w);
        let c = container_of(&d.spec.as_ref().unwrap().template.spec).clone();
        let probe = c.readiness_probe.unwrap();
        assert!(probe.http_get.is_none());
        assert_eq!(probe.tcp_socket.unwrap().port, IntOrString::Int(8080));
    }

    #[test]
    fn workers_have_no_probe() {
        let mut w = workload();
        w.port = None;
        let d = Shaper::default().deployment(&w);
        let c = container_of(&d.spec.as_ref().unwrap().template.spec);
        assert!(c.readiness_probe.is_none());
        assert!(c.ports.is_none());
    }

    #[test]
    fn labels_are_copied_and_extended() {
        let d = Shaper::default().deployment(&workload());
        assert_eq!(
            d.metadata.labels,
            Some(btreemap! { "plan".to_string() => "scout".to_string() })
        );
        let template = d.spec.unwrap().template.metadata.unwrap();
        assert_eq!(
            template.labels,
            Some(btreemap! {
                "app".to_string() => "gotest".to_string(),
                "name".to_string() => "gotest".to_string(),
                "plan".to_string() => "scout".to_string(),
                "version".to_string() => "v1".to_string(),
            })
        );
        assert!(template.annotations.is_none());
    }

    #[test]
    fn sidecar_and_pull_secret() {
        let mut w = workload();
        w.sidecar = true;
        let shaper = Shaper {
            image_pull_secret: Some("registry".into()),
            ..Default::default()
        };
        let template = shaper.deployment(&w).spec.unwrap().template;
        assert_eq!(
            template.metadata.unwrap().annotations,
            Some(btreemap! { "sidecar.istio.io/inject".to_string() => "true".to_string() })
        );
        assert_eq!(
            template.spec.unwrap().image_pull_secrets,
            Some(vec![LocalObjectReference {
                name: "registry".into()
            }])
        );
    }

    #[test]
    fn one_off_pods_never_restart() {
        let pod = Shaper::default().pod(&workload());
        assert_eq!(pod.metadata.name.as_deref(), Some("gotest"));
        let spec = pod.spec.unwrap();
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
        assert!(spec.containers[0].readiness_probe.is_none());
        assert_eq!(
            spec.containers[0].env.as_ref().unwrap()[0].value.as_deref(),
            Some("8080")
        );
    }

    #[test]
    fn cron_jobs_wrap_jobs() {
        let cron = CronWorkload {
            workload: workload(),
            schedule: "*/5 * * * *".parse().unwrap(),
        };
        let spec = Shaper::default().cron_job(&cron).spec.unwrap();
        assert_eq!(spec.schedule, "*/5 * * * *");
        assert_eq!(spec.starting_deadline_seconds, Some(60));
        let pod = spec.job_template.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("OnFailure"));
    }

    #[test]
    fn services_target_the_resolved_port() {
        let svc = Shaper::default().service(&Endpoint {
            name: "gotest".into(),
            space: "gotest".into(),
            port: 8080,
            labels: Default::default(),
            http2: true,
        });
        let port = &svc.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.name.as_deref(), Some("http2"));
        assert_eq!(port.port, 80);
        assert_eq!(port.target_port, Some(IntOrString::Int(8080)));
    }
}
