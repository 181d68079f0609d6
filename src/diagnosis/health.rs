use super::types::{ClassLabel, HEALTHY_SENTINEL};
use serde::{Deserialize, Serialize};

/// 判定标签是否代表健康植株
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HealthPolicy {
    /// 标签中包含 "healthy"（不区分大小写）
    #[default]
    Substring,
    /// 病害部分恰好为 "healthy"，或标签本身就是 "healthy"
    Sentinel,
}

impl HealthPolicy {
    pub fn is_healthy(&self, label: &ClassLabel) -> bool {
        match self {
            HealthPolicy::Substring => label
                .as_str()
                .to_ascii_lowercase()
                .contains(HEALTHY_SENTINEL),
            HealthPolicy::Sentinel => label.condition() == HEALTHY_SENTINEL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthPolicy::Substring => "substring",
            HealthPolicy::Sentinel => "sentinel",
        }
    }
}
