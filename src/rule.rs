//! Concrete, per-edge fault specifications — the output of scenario
//! expansion and the payload posted to proxies.

use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};

/// Probability distribution shape used to schedule a fault within its
/// probability window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    Uniform,
    Exponential,
    Normal,
}

impl Default for Distribution {
    fn default() -> Self {
        Self::Uniform
    }
}

/// `messagetype` discriminator on a [`Rule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Request,
    Response,
    Publish,
    Subscribe,
}

/// Latency injection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayFault {
    pub probability: f64,
    pub distribution: Distribution,
    /// `<number><unit>` duration string, e.g. `1s500ms`.
    pub duration: String,
}

impl Default for DelayFault {
    fn default() -> Self {
        Self { probability: 0.0, distribution: Distribution::Uniform, duration: "0s".to_string() }
    }
}

/// Payload-mangling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangleFault {
    pub probability: f64,
    pub distribution: Distribution,
    pub search: String,
    pub replace: String,
}

impl Default for MangleFault {
    fn default() -> Self {
        Self {
            probability: 0.0,
            distribution: Distribution::Uniform,
            search: String::new(),
            replace: String::new(),
        }
    }
}

/// Abort injection parameters. `errorcode = -1` means "reset the transport
/// connection"; any other value is an HTTP status code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortFault {
    pub probability: f64,
    pub distribution: Distribution,
    pub errorcode: i64,
}

impl Default for AbortFault {
    fn default() -> Self {
        Self { probability: 0.0, distribution: Distribution::Uniform, errorcode: -1 }
    }
}

/// A concrete per-edge fault specification, serialized to the proxy with
/// exactly the field names the control plane expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub source: String,
    pub dest: String,
    pub messagetype: MessageType,
    #[serde(default)]
    pub headerpattern: String,
    #[serde(default)]
    pub bodypattern: String,

    pub delayprobability: f64,
    pub delaydistribution: Distribution,
    pub delaytime: String,

    pub mangleprobability: f64,
    pub mangledistribution: Distribution,
    pub searchstring: String,
    pub replacestring: String,

    pub abortprobability: f64,
    pub abortdistribution: Distribution,
    pub errorcode: i64,
}

impl Rule {
    /// Construct a Rule, applying the fault defaults exactly once and
    /// enforcing the two invariants: `delay.p + mangle.p + abort.p <= 1`,
    /// and at least one of the three probabilities positive.
    pub fn new(
        source: impl Into<String>,
        dest: impl Into<String>,
        messagetype: MessageType,
        headerpattern: impl Into<String>,
        bodypattern: impl Into<String>,
        delay: DelayFault,
        mangle: MangleFault,
        abort: AbortFault,
    ) -> Result<Self> {
        let sum = delay.probability + mangle.probability + abort.probability;
        if sum > 1.0 {
            return Err(HarnessError::Input(format!(
                "rule probability sum {sum} exceeds 1.0 (delay={}, mangle={}, abort={})",
                delay.probability, mangle.probability, abort.probability
            )));
        }
        if delay.probability <= 0.0 && mangle.probability <= 0.0 && abort.probability <= 0.0 {
            return Err(HarnessError::Input(
                "rule has all three fault probabilities at zero; at least one must be positive"
                    .to_string(),
            ));
        }

        Ok(Self {
            source: source.into(),
            dest: dest.into(),
            messagetype,
            headerpattern: headerpattern.into(),
            bodypattern: bodypattern.into(),
            delayprobability: delay.probability,
            delaydistribution: delay.distribution,
            delaytime: delay.duration,
            mangleprobability: mangle.probability,
            mangledistribution: mangle.distribution,
            searchstring: mangle.search,
            replacestring: mangle.replace,
            abortprobability: abort.probability,
            abortdistribution: abort.distribution,
            errorcode: abort.errorcode,
        })
    }

    /// Sum of the three fault probabilities.
    pub fn probability_sum(&self) -> f64 {
        self.delayprobability + self.mangleprobability + self.abortprobability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abort_all() -> AbortFault {
        AbortFault { probability: 1.0, distribution: Distribution::Uniform, errorcode: -1 }
    }

    #[test]
    fn rejects_probability_sum_over_one() {
        let err = Rule::new(
            "a",
            "b",
            MessageType::Request,
            "",
            "",
            DelayFault { probability: 0.6, ..Default::default() },
            MangleFault::default(),
            AbortFault { probability: 0.6, ..abort_all() },
        )
        .unwrap_err();
        assert!(err.is_input());
    }

    #[test]
    fn rejects_all_zero_probabilities() {
        let err = Rule::new(
            "a",
            "b",
            MessageType::Request,
            "",
            "",
            DelayFault::default(),
            MangleFault::default(),
            AbortFault::default(),
        )
        .unwrap_err();
        assert!(err.is_input());
    }

    #[test]
    fn accepts_a_valid_rule() {
        let rule = Rule::new(
            "productpage",
            "reviews",
            MessageType::Request,
            "",
            "",
            DelayFault::default(),
            MangleFault::default(),
            abort_all(),
        )
        .unwrap();
        assert_eq!(rule.probability_sum(), 1.0);
    }

    #[test]
    fn serializes_with_the_sixteen_wire_field_names() {
        let rule = Rule::new(
            "a",
            "b",
            MessageType::Request,
            "",
            "",
            DelayFault::default(),
            MangleFault::default(),
            abort_all(),
        )
        .unwrap();
        let json = serde_json::to_value(&rule).unwrap();
        let obj = json.as_object().unwrap();
        for field in [
            "source",
            "dest",
            "messagetype",
            "headerpattern",
            "bodypattern",
            "delayprobability",
            "delaydistribution",
            "delaytime",
            "mangleprobability",
            "mangledistribution",
            "searchstring",
            "replacestring",
            "abortprobability",
            "abortdistribution",
            "errorcode",
        ] {
            assert!(obj.contains_key(field), "missing wire field {field}");
        }
    }
}
