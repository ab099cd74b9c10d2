use crate::error::Result;
use crate::io;
use crate::paths;
use crate::types::CeremonyType;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// CooldownHours
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownHours {
    #[serde(default = "default_planning_cooldown")]
    pub planning: u32,
    #[serde(default = "default_standup_cooldown")]
    pub standup: u32,
    #[serde(default = "default_retrospective_cooldown")]
    pub retrospective: u32,
}

fn default_planning_cooldown() -> u32 {
    24
}

fn default_standup_cooldown() -> u32 {
    12
}

fn default_retrospective_cooldown() -> u32 {
    24
}

impl Default for CooldownHours {
    fn default() -> Self {
        Self {
            planning: default_planning_cooldown(),
            standup: default_standup_cooldown(),
            retrospective: default_retrospective_cooldown(),
        }
    }
}

impl CooldownHours {
    pub fn for_type(&self, ceremony_type: CeremonyType) -> u32 {
        match ceremony_type {
            CeremonyType::Planning => self.planning,
            CeremonyType::Standup => self.standup,
            CeremonyType::Retrospective => self.retrospective,
        }
    }
}

// ---------------------------------------------------------------------------
// MaintenanceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Deactivation requires confidence below this threshold.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Deactivation requires success rate below this threshold.
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    /// Minimum applications before a learning may be judged weak.
    #[serde(default = "default_min_applications")]
    pub min_applications: u32,
    /// Application rows older than this are pruned.
    #[serde(default = "default_retention_days")]
    pub application_retention_days: u32,
    /// Confidence margin a newer learning needs to supersede an older one.
    #[serde(default = "default_supersede_margin")]
    pub supersede_margin: f64,
}

fn default_min_confidence() -> f64 {
    0.3
}

fn default_min_success_rate() -> f64 {
    0.4
}

fn default_min_applications() -> u32 {
    3
}

fn default_retention_days() -> u32 {
    365
}

fn default_supersede_margin() -> f64 {
    0.2
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            min_success_rate: default_min_success_rate(),
            min_applications: default_min_applications(),
            application_retention_days: default_retention_days(),
            supersede_margin: default_supersede_margin(),
        }
    }
}

// ---------------------------------------------------------------------------
// CadenceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CadenceConfig {
    #[serde(default = "default_max_ceremonies")]
    pub max_ceremonies_per_scope: u32,
    #[serde(default)]
    pub cooldown_hours: CooldownHours,
    #[serde(default = "default_ceremony_timeout")]
    pub ceremony_timeout_seconds: u64,
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
    #[serde(default = "default_half_life")]
    pub decay_half_life_days: f64,
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    #[serde(default = "default_max_adjustments")]
    pub max_ceremony_adjustments_per_pass: u32,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

fn default_max_ceremonies() -> u32 {
    10
}

fn default_ceremony_timeout() -> u64 {
    600
}

fn default_relevance_threshold() -> f64 {
    0.2
}

fn default_half_life() -> f64 {
    180.0
}

fn default_breaker_threshold() -> u32 {
    3
}

fn default_max_adjustments() -> u32 {
    2
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            max_ceremonies_per_scope: default_max_ceremonies(),
            cooldown_hours: CooldownHours::default(),
            ceremony_timeout_seconds: default_ceremony_timeout(),
            relevance_threshold: default_relevance_threshold(),
            decay_half_life_days: default_half_life(),
            circuit_breaker_threshold: default_breaker_threshold(),
            max_ceremony_adjustments_per_pass: default_max_adjustments(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

impl CadenceConfig {
    /// Load from `.cadence/config.yaml`, falling back to defaults when the
    /// file does not exist.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        io::atomic_write(&path, data.as_bytes())
    }

    /// Sanity-check option values. Errors make the engine unusable;
    /// warnings indicate probably-unintended settings.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.max_ceremonies_per_scope == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "max_ceremonies_per_scope is 0: no ceremony can ever fire".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "relevance_threshold {} outside [0,1]",
                    self.relevance_threshold
                ),
            });
        }
        if self.decay_half_life_days <= 0.0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "decay_half_life_days must be positive".to_string(),
            });
        }
        if self.circuit_breaker_threshold == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "circuit_breaker_threshold is 0: every failure skips the type".to_string(),
            });
        }
        if self.ceremony_timeout_seconds < 30 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "ceremony_timeout_seconds {} is very short; dialogue runs rarely finish under 30s",
                    self.ceremony_timeout_seconds
                ),
            });
        }
        if self.maintenance.min_applications == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "maintenance.min_applications is 0: learnings may be deactivated with no evidence"
                    .to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
