use serde::{Deserialize, Serialize};

use crate::kt::bkt::DEFAULT_MASTERY_THRESHOLD;
use crate::kt::types::BktParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub mastery_threshold: f64,
    pub default_params: BktParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mastery_threshold: DEFAULT_MASTERY_THRESHOLD,
            default_params: BktParams::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(val) = env_f64("KT_MASTERY_THRESHOLD") {
            if val > 0.0 && val <= 1.0 {
                config.mastery_threshold = val;
            } else {
                tracing::warn!(value = val, "KT_MASTERY_THRESHOLD outside (0, 1], using default");
            }
        }

        let params = &mut config.default_params;
        for (key, slot) in [
            ("KT_DEFAULT_P_INIT", &mut params.p_init),
            ("KT_DEFAULT_P_TRANSIT", &mut params.p_transit),
            ("KT_DEFAULT_P_SLIP", &mut params.p_slip),
            ("KT_DEFAULT_P_GUESS", &mut params.p_guess),
        ] {
            if let Some(val) = env_f64(key) {
                *slot = val;
            }
        }

        config
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<f64>().ok())
}
