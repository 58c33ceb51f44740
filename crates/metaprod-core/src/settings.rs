//! Per-project pipeline settings
//!
//! Settings are stored as a JSON document per project and can be imported
//! from a TOML file. Every field has a default, so a TOML file only needs to
//! list what differs:
//!
//! ```toml
//! multiplex = true
//! profile_threshold = 80
//!
//! [engines.profile]
//! comet = true
//! sage = true
//! ```

use crate::error::{PipelineError, Result};
use crate::pipeline::status::Pass;
use crate::search::engine::SearchEngine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Proteome id of the human reference proteome.
pub const HUMAN_PROTEOME: &str = "UP000005640";

/// Proteome id assigned to contaminant entries without proteome metadata.
pub const CONTAMINANT_PROTEOME: &str = "0";

/// Default share of profile NSAF covered by the proteome database, in percent.
pub const DEFAULT_PROFILE_THRESHOLD: u32 = 90;

/// How pass-one results are pooled when narrowing the pass-two database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProfileType {
    /// One proteome database per file
    File,
    /// One per sample; files without a sample fall back to per-file
    #[default]
    Sample,
    /// One shared by the whole project
    Project,
}

impl std::str::FromStr for ProfileType {
    type Err = metaprod_common::MetaprodError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(ProfileType::File),
            "sample" => Ok(ProfileType::Sample),
            "project" => Ok(ProfileType::Project),
            _ => Err(metaprod_common::MetaprodError::invalid("profile type", s)),
        }
    }
}

/// Which engines run in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSelection {
    pub xtandem: bool,
    pub msgfplus: bool,
    pub omssa: bool,
    pub comet: bool,
    pub metamorpheus: bool,
    pub myrimatch: bool,
    pub sage: bool,
}

impl Default for EngineSelection {
    fn default() -> Self {
        Self {
            xtandem: true,
            msgfplus: true,
            omssa: false,
            comet: true,
            metamorpheus: false,
            myrimatch: false,
            sage: false,
        }
    }
}

impl EngineSelection {
    pub fn none() -> Self {
        Self {
            xtandem: false,
            msgfplus: false,
            omssa: false,
            comet: false,
            metamorpheus: false,
            myrimatch: false,
            sage: false,
        }
    }

    pub fn only(engines: &[SearchEngine]) -> Self {
        let mut selection = Self::none();
        for engine in engines {
            selection.set(*engine, true);
        }
        selection
    }

    pub fn is_enabled(&self, engine: SearchEngine) -> bool {
        match engine {
            SearchEngine::XTandem => self.xtandem,
            SearchEngine::MsgfPlus => self.msgfplus,
            SearchEngine::Omssa => self.omssa,
            SearchEngine::Comet => self.comet,
            SearchEngine::MetaMorpheus => self.metamorpheus,
            SearchEngine::MyriMatch => self.myrimatch,
            SearchEngine::Sage => self.sage,
        }
    }

    pub fn set(&mut self, engine: SearchEngine, enabled: bool) {
        let slot = match engine {
            SearchEngine::XTandem => &mut self.xtandem,
            SearchEngine::MsgfPlus => &mut self.msgfplus,
            SearchEngine::Omssa => &mut self.omssa,
            SearchEngine::Comet => &mut self.comet,
            SearchEngine::MetaMorpheus => &mut self.metamorpheus,
            SearchEngine::MyriMatch => &mut self.myrimatch,
            SearchEngine::Sage => &mut self.sage,
        };
        *slot = enabled;
    }

    /// Enabled engines in a stable order.
    pub fn enabled(&self) -> Vec<SearchEngine> {
        SearchEngine::ALL
            .iter()
            .copied()
            .filter(|engine| self.is_enabled(*engine))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PassEngines {
    pub profile: EngineSelection,
    pub proteome: EngineSelection,
}

/// Everything the state machine needs to know about a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub engines: PassEngines,

    /// Multiplexed (reporter ion) data; enables the quantification prep step
    pub multiplex: bool,

    /// Run peak-area quantification and carry peak areas into results
    pub run_quantification: bool,

    /// Run the profiling pass
    pub profile_pass: bool,

    /// Run the proteome pass
    pub proteome_pass: bool,

    pub profile_type: ProfileType,

    /// Percent of cumulative profile NSAF whose proteomes are kept
    pub profile_threshold: u32,

    /// Keep the human proteome in the generated proteome database
    pub use_human: bool,

    /// Append the contaminant database to the generated proteome database
    pub use_contaminants: bool,

    /// Pass-one search database; defaults to the project profile FASTA
    pub profile_fasta: Option<PathBuf>,

    /// Pass-two search database when the profiling pass is disabled
    pub proteome_fasta: Option<PathBuf>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            engines: PassEngines::default(),
            multiplex: false,
            run_quantification: false,
            profile_pass: true,
            proteome_pass: true,
            profile_type: ProfileType::default(),
            profile_threshold: DEFAULT_PROFILE_THRESHOLD,
            use_human: true,
            use_contaminants: true,
            profile_fasta: None,
            proteome_fasta: None,
        }
    }
}

impl ProjectSettings {
    /// Read settings from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|e| PipelineError::file(path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Self = toml::from_str(text)
            .map_err(|e| PipelineError::configuration(format!("Invalid settings file: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.profile_pass && !self.proteome_pass {
            return Err(PipelineError::configuration(
                "At least one of profile_pass or proteome_pass must be enabled",
            ));
        }
        if self.profile_threshold == 0 || self.profile_threshold > 100 {
            return Err(PipelineError::configuration(format!(
                "profile_threshold must be between 1 and 100, got {}",
                self.profile_threshold
            )));
        }
        Ok(())
    }

    pub fn engines_for(&self, pass: Pass) -> &EngineSelection {
        match pass {
            Pass::Profile => &self.engines.profile,
            Pass::Proteome => &self.engines.proteome,
        }
    }

    pub fn runs_pass(&self, pass: Pass) -> bool {
        match pass {
            Pass::Profile => self.profile_pass,
            Pass::Proteome => self.proteome_pass,
        }
    }

    /// Whether the pass-two database is generated from profile results.
    pub fn generates_proteome_fasta(&self) -> bool {
        self.profile_pass && self.proteome_pass
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = ProjectSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.profile_threshold, 90);
        assert_eq!(settings.profile_type, ProfileType::Sample);
        assert!(settings.generates_proteome_fasta());
    }

    #[test]
    fn test_partial_toml() {
        let settings = ProjectSettings::from_toml_str(
            r#"
            multiplex = true
            profile_type = "project"

            [engines.profile]
            xtandem = false
            msgfplus = false
            sage = true
            "#,
        )
        .unwrap();

        assert!(settings.multiplex);
        assert_eq!(settings.profile_type, ProfileType::Project);
        assert_eq!(
            settings.engines_for(Pass::Profile).enabled(),
            vec![SearchEngine::Comet, SearchEngine::Sage]
        );
        // untouched pass keeps its defaults
        assert_eq!(settings.engines_for(Pass::Proteome), &EngineSelection::default());
    }

    #[test]
    fn test_both_passes_disabled_is_rejected() {
        let result = ProjectSettings::from_toml_str("profile_pass = false\nproteome_pass = false");
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_threshold_bounds() {
        let settings = ProjectSettings {
            profile_threshold: 101,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_paths() {
        let settings = ProjectSettings {
            proteome_fasta: Some(PathBuf::from("/fasta/soil.fasta")),
            ..Default::default()
        };
        let restored = ProjectSettings::from_json(&settings.to_json().unwrap()).unwrap();
        assert_eq!(restored, settings);
    }

    #[test]
    fn test_engine_selection_only() {
        let selection = EngineSelection::only(&[SearchEngine::Sage, SearchEngine::Omssa]);
        assert_eq!(selection.enabled(), vec![SearchEngine::Omssa, SearchEngine::Sage]);
        assert!(EngineSelection::none().enabled().is_empty());
    }
}
