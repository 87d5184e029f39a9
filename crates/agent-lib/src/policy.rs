//! Autoscale policy extraction from service labels

use crate::error::PolicyParseError;
use crate::models::Policy;
use std::collections::HashMap;
use std::str::FromStr;

/// Label filter selecting services opted into autoscaling
pub const LABEL_AUTOSCALE: &str = "swarm.autoscale=true";
pub const LABEL_CPU: &str = "swarm.autoscale.cpu";
pub const LABEL_MEMORY: &str = "swarm.autoscale.mem";
pub const LABEL_MIN: &str = "swarm.autoscale.min";
pub const LABEL_MAX: &str = "swarm.autoscale.max";

/// Extract the autoscale policy declared in a service's labels
///
/// Missing and empty labels leave the field unset. The first label whose
/// value does not parse fails the whole extraction.
pub fn extract(labels: &HashMap<String, String>) -> Result<Policy, PolicyParseError> {
    Ok(Policy {
        cpu_percent: lookup(labels, LABEL_CPU)?,
        memory_percent: lookup(labels, LABEL_MEMORY)?,
        min_replicas: lookup(labels, LABEL_MIN)?,
        max_replicas: lookup(labels, LABEL_MAX)?,
    })
}

/// A numeric label type
trait LabelValue: FromStr {
    fn is_valid(&self) -> bool {
        true
    }
}

/// `inf` and `NaN` parse as `f64` but cannot be sent as JSON numbers
impl LabelValue for f64 {
    fn is_valid(&self) -> bool {
        self.is_finite()
    }
}

impl LabelValue for i64 {}

fn lookup<T: LabelValue>(
    labels: &HashMap<String, String>,
    field: &'static str,
) -> Result<Option<T>, PolicyParseError> {
    match labels.get(field).map(String::as_str) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<T>()
            .ok()
            .filter(T::is_valid)
            .map(Some)
            .ok_or_else(|| PolicyParseError {
                field,
                value: value.to_string(),
            }),
    }
}
