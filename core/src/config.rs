use crate::{
    snapshot::DEFAULT_SNAPSHOT_HORIZON,
    types::{Position, ResourceType, Tick},
};
use serde::{Deserialize, Serialize};

// ── Spine ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpineConfig {
    /// Ticks retained by both stores. 0 disables pruning entirely.
    #[serde(default = "default_horizon")]
    pub horizon: Tick,
    /// Capture a snapshot every N ticks; the journal covers the gaps.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: Tick,
    /// Optional cap on journal entries. 0 means only the tick horizon applies.
    #[serde(default)]
    pub max_journal_entries: usize,
}

fn default_horizon() -> Tick {
    DEFAULT_SNAPSHOT_HORIZON
}

fn default_snapshot_interval() -> Tick {
    1
}

impl Default for SpineConfig {
    fn default() -> Self {
        Self {
            horizon:             default_horizon(),
            snapshot_interval:   default_snapshot_interval(),
            max_journal_entries: 0,
        }
    }
}

// ── Gameplay tuning ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameplayConfig {
    /// Gather yield is rate × (1 - jitter/2 + jitter × roll).
    pub gather_jitter:        f32,
    /// Mining skill adds up to this fraction on top of the base rate.
    pub mining_skill_bonus:   f32,
    /// Hauling skill widens pickup radius by up to this fraction.
    pub hauling_radius_bonus: f32,
    pub xp_per_unit_mined:    f32,
    pub xp_per_unit_hauled:   f32,
    /// Per-agent, per-tick chance of a crew drill.
    #[serde(default = "default_drill_chance")]
    pub drill_chance:         f64,
    #[serde(default = "default_drill_xp")]
    pub drill_xp:             f32,
}

fn default_drill_chance() -> f64 {
    0.05
}

fn default_drill_xp() -> f32 {
    1.0
}

impl Default for GameplayConfig {
    fn default() -> Self {
        Self {
            gather_jitter:        0.5,
            mining_skill_bonus:   0.5,
            hauling_radius_bonus: 1.0,
            xp_per_unit_mined:    0.1,
            xp_per_unit_hauled:   0.05,
            drill_chance:         default_drill_chance(),
            drill_xp:             default_drill_xp(),
        }
    }
}

// ── Scenario ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub name:        String,
    pub resource:    ResourceType,
    pub amount:      f32,
    pub gather_rate: f32,
    pub position:    Position,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VesselConfig {
    pub name:     String,
    /// Index into `nodes`.
    pub node:     usize,
    pub capacity: f32,
    pub position: Position,
    #[serde(default)]
    pub crewed:   bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CarrierConfig {
    pub name:          String,
    pub position:      Position,
    pub pickup_radius: f32,
    #[serde(default)]
    pub crewed:        bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioConfig {
    pub nodes:    Vec<NodeConfig>,
    pub vessels:  Vec<VesselConfig>,
    pub carriers: Vec<CarrierConfig>,
}

impl Default for ScenarioConfig {
    /// Two fields worked by three vessels, one crewed carrier in reach.
    fn default() -> Self {
        Self {
            nodes: vec![
                NodeConfig {
                    name:        "AST-1".into(),
                    resource:    ResourceType::Minerals,
                    amount:      5_000.0,
                    gather_rate: 6.0,
                    position:    Position::new(0.0, 0.0, 0.0),
                },
                NodeConfig {
                    name:        "AST-2".into(),
                    resource:    ResourceType::RareMetals,
                    amount:      1_200.0,
                    gather_rate: 2.5,
                    position:    Position::new(8.0, 0.0, 0.0),
                },
            ],
            vessels: vec![
                VesselConfig {
                    name:     "MV-Alpha".into(),
                    node:     0,
                    capacity: 40.0,
                    position: Position::new(1.0, 0.0, 0.0),
                    crewed:   true,
                },
                VesselConfig {
                    name:     "MV-Beta".into(),
                    node:     0,
                    capacity: 25.0,
                    position: Position::new(0.0, 1.5, 0.0),
                    crewed:   false,
                },
                VesselConfig {
                    name:     "MV-Gamma".into(),
                    node:     1,
                    capacity: 15.0,
                    position: Position::new(7.0, 0.5, 0.0),
                    crewed:   true,
                },
            ],
            carriers: vec![CarrierConfig {
                name:          "CV-Hold".into(),
                position:      Position::new(3.0, 0.0, 0.0),
                pickup_radius: 3.0,
                crewed:        true,
            }],
        }
    }
}

// ── Top-level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SimConfig {
    pub spine:    SpineConfig,
    pub gameplay: GameplayConfig,
    pub scenario: ScenarioConfig,
}

impl SimConfig {
    /// Load `spine.json`, `gameplay.json` and `scenario.json` from `data_dir`.
    /// Missing files fall back to defaults; malformed files are errors.
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        Ok(Self {
            spine:    load_or_default(&format!("{data_dir}/spine.json"))?,
            gameplay: load_or_default(&format!("{data_dir}/gameplay.json"))?,
            scenario: load_or_default(&format!("{data_dir}/scenario.json"))?,
        })
    }

    pub fn with_horizon(mut self, horizon: Tick) -> Self {
        self.spine.horizon = horizon;
        self
    }
}

fn load_or_default<T>(path: &str) -> anyhow::Result<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("config: {path} not found, using defaults");
            return Ok(T::default());
        }
        Err(e) => return Err(anyhow::anyhow!("Cannot read {path}: {e}")),
    };
    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spine_config_fills_missing_fields() {
        let cfg: SpineConfig = serde_json::from_str(r#"{ "horizon": 64 }"#).unwrap();
        assert_eq!(cfg.horizon, 64);
        assert_eq!(cfg.snapshot_interval, 1);
        assert_eq!(cfg.max_journal_entries, 0);
    }

    #[test]
    fn missing_data_dir_loads_defaults() {
        let cfg = SimConfig::load("/nonexistent/timespine-data").unwrap();
        assert_eq!(cfg, SimConfig::default());
        assert_eq!(cfg.spine.horizon, DEFAULT_SNAPSHOT_HORIZON);
    }
}
