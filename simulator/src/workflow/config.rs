use crate::generator::profile::GeneratorConfig;
use crate::generator::template::GridTemplate;
use anyhow::Context;
use parkcore::processing::{MonitorSettings, PipelineSettings};
use parkcore::{SlotMap, SlotMapConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Synthetic,
    Http { base_url: String },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Synthetic
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub layout: SlotMapConfig,
    /// Used only when `layout.slots` is empty.
    pub grid: GridTemplate,
    pub pipeline: PipelineSettings,
    pub monitor: MonitorSettings,
    pub processing_interval_ms: u64,
    pub source: SourceConfig,
    pub generator: GeneratorConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            layout: SlotMapConfig::default(),
            grid: GridTemplate::default(),
            pipeline: PipelineSettings::default(),
            monitor: MonitorSettings::default(),
            processing_interval_ms: 1_000,
            source: SourceConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(rows: usize, cols: usize, processing_interval_ms: u64, monitor_interval_ms: u64) -> Self {
        Self {
            grid: GridTemplate {
                rows,
                cols,
                ..Default::default()
            },
            monitor: MonitorSettings {
                interval_ms: monitor_interval_ms,
                ..Default::default()
            },
            processing_interval_ms,
            ..Default::default()
        }
    }

    /// Validates the layout into an immutable slot map, falling back to the grid template.
    pub fn to_slot_map(&self) -> anyhow::Result<SlotMap> {
        let mut layout = self.layout.clone();
        if layout.slots.is_empty() {
            layout.slots = self.grid.slot_entries();
        }
        SlotMap::from_config(&layout).context("validating slot layout")
    }
}
