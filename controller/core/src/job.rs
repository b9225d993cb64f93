use crate::{
    deployment::{validate_name, Image, Workload},
    schedule::Schedule,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stored batch job definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub space: String,
    #[serde(default, rename = "cmd", skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub plan: String,
}

/// A stored cron job definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronJob {
    pub name: String,
    pub space: String,
    #[serde(default, rename = "cmd", skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub plan: String,
    pub schedule: String,
}

/// A request to run a job or cron job's image.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDeploy {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub delete_before_create: bool,
    #[serde(default)]
    pub parallelism: Option<i32>,
    #[serde(default)]
    pub active_deadline_seconds: Option<i64>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobScale {
    pub parallelism: i32,
    pub active_deadline_seconds: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobWorkload {
    pub workload: Workload,
    pub parallelism: Option<i32>,
    pub active_deadline_seconds: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CronWorkload {
    pub workload: Workload,
    pub schedule: Schedule,
}

// === impl Job ===

impl Job {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name, "name")?;
        validate_name(&self.space, "space")?;
        if self.plan.is_empty() {
            return Err(Error::invalid("plan is required"));
        }
        Ok(())
    }
}

// === impl CronJob ===

impl CronJob {
    pub fn validate(&self) -> Result<Schedule> {
        validate_name(&self.name, "name")?;
        validate_name(&self.space, "space")?;
        if self.plan.is_empty() {
            return Err(Error::invalid("plan is required"));
        }
        self.schedule.parse()
    }
}

// === impl JobDeploy ===

impl JobDeploy {
    pub fn validate(&self) -> Result<Image> {
        if let Some(p) = self.parallelism {
            if p < 0 {
                return Err(Error::invalid("parallelism must be a non-negative integer"));
            }
        }
        if let Some(d) = self.active_deadline_seconds {
            if d <= 0 {
                return Err(Error::invalid("activeDeadlineSeconds must be positive"));
            }
        }
        self.image.parse()
    }
}

impl JobScale {
    pub fn validate(&self) -> Result<()> {
        if self.parallelism < 0 {
            return Err(Error::invalid("parallelism must be a non-negative integer"));
        }
        if self.active_deadline_seconds <= 0 {
            return Err(Error::invalid("activeDeadlineSeconds must be positive"));
        }
        Ok(())
    }
}

/// Splits a stored command line into container arguments.
pub fn command_args(command: Option<&str>) -> Option<Vec<String>> {
    let args = command?
        .split_whitespace()
        .map(String::from)
        .collect::<Vec<_>>();
    if args.is_empty() {
        None
    } else {
        Some(args)
    }
}
