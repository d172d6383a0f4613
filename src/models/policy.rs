use serde::{Deserialize, Serialize};

/// Receipt / approval thresholds, in dollars.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub receipt_threshold: f64,
    pub approval_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LowDollarWaiver {
    pub enabled: bool,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPolicies {
    pub travel: Thresholds,
    pub meals: Thresholds,
    pub supplies: Thresholds,
}

/// Documentation policy applied per GL line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub low_dollar_waiver: LowDollarWaiver,
    pub general: Thresholds,
    pub categories: CategoryPolicies,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            low_dollar_waiver: LowDollarWaiver {
                enabled: true,
                threshold: 25.0,
            },
            general: Thresholds {
                receipt_threshold: 75.0,
                approval_threshold: 2_500.0,
            },
            categories: CategoryPolicies {
                travel: Thresholds {
                    receipt_threshold: 75.0,
                    approval_threshold: 1_000.0,
                },
                meals: Thresholds {
                    receipt_threshold: 75.0,
                    approval_threshold: 500.0,
                },
                supplies: Thresholds {
                    receipt_threshold: 100.0,
                    approval_threshold: 2_500.0,
                },
            },
        }
    }
}
