//! External step command templates
//!
//! Every external step is described in a TOML file, one table per step:
//!
//! ```toml
//! [convert]
//! program = "/opt/msconvert/msconvert"
//! args = ["{raw}", "--mzML", "-o", "{out}"]
//! timeout_secs = 3600
//! outputs = ["{out}/{filename}.mzML"]
//!
//! [search]
//! program = "java"
//! args = ["-Xmx{memory}M", "-jar", "SearchGUI.jar", "-fasta_file", "{fasta}", "{engines}"]
//! engine_args = ["-{engine}", "{enabled}"]
//! archive = "searchgui_out.zip"
//! ```
//!
//! Placeholders in braces are filled from the item being processed. An
//! argument that is exactly `{engines}` expands to `engine_args` once per
//! known engine.

use crate::error::{PipelineError, Result};
use crate::search::engine::SearchEngine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default wall-clock limit of an external step
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 4 * 60 * 60;

pub const DEFAULT_SEARCH_ARCHIVE: &str = "searchgui_out.zip";

const PLACEHOLDER: &str = r"\{([a-z_]+)\}";
const ENGINES_ARG: &str = "{engines}";

/// External steps that have a command template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStep {
    Convert,
    Search,
    Score,
    QuantPrep,
    Quant,
}

impl ToolStep {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolStep::Convert => "convert",
            ToolStep::Search => "search",
            ToolStep::Score => "score",
            ToolStep::QuantPrep => "quant_prep",
            ToolStep::Quant => "quant",
        }
    }
}

impl std::fmt::Display for ToolStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_timeout() -> u64 {
    DEFAULT_STEP_TIMEOUT_SECS
}

fn default_engine_args() -> Vec<String> {
    vec!["-{engine}".to_string(), "{enabled}".to_string()]
}

fn default_archive() -> String {
    DEFAULT_SEARCH_ARCHIVE.to_string()
}

/// Template of one external step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Files that must exist after a successful run
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTemplate {
    #[serde(flatten)]
    pub command: CommandTemplate,
    #[serde(default = "default_engine_args")]
    pub engine_args: Vec<String>,
    /// Archive the search front end writes into `{pass_dir}`
    #[serde(default = "default_archive")]
    pub archive: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainFile {
    pub convert: Option<CommandTemplate>,
    pub search: Option<SearchTemplate>,
    pub score: Option<CommandTemplate>,
    pub quant_prep: Option<CommandTemplate>,
    pub quant: Option<CommandTemplate>,
}

/// A fully rendered command ready for the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Step name, used in logs
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub outputs: Vec<PathBuf>,
    pub working_dir: Option<PathBuf>,
}

/// Placeholder values for one step invocation
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    values: BTreeMap<&'static str, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &'static str, value: impl ToString) -> Self {
        self.values.insert(key, value.to_string());
        self
    }

    pub fn set_path(self, key: &'static str, value: &Path) -> Self {
        let text = value.display().to_string();
        self.set(key, text)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Loaded toolchain with a compiled placeholder pattern
#[derive(Debug, Clone)]
pub struct Toolchain {
    file: ToolchainFile,
    placeholder: Regex,
}

impl Toolchain {
    pub fn new(file: ToolchainFile) -> Result<Self> {
        let placeholder = Regex::new(PLACEHOLDER).map_err(|e| PipelineError::parse(e.to_string()))?;
        Ok(Self { file, placeholder })
    }

    /// Load the toolchain file. A missing or malformed file is a
    /// configuration failure.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::configuration(format!("Cannot read toolchain file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ToolchainFile = toml::from_str(text)
            .map_err(|e| PipelineError::configuration(format!("Invalid toolchain file: {}", e)))?;
        Self::new(file)
    }

    pub fn file(&self) -> &ToolchainFile {
        &self.file
    }

    fn template(&self, step: ToolStep) -> Result<&CommandTemplate> {
        let template = match step {
            ToolStep::Convert => self.file.convert.as_ref(),
            ToolStep::Search => self.file.search.as_ref().map(|s| &s.command),
            ToolStep::Score => self.file.score.as_ref(),
            ToolStep::QuantPrep => self.file.quant_prep.as_ref(),
            ToolStep::Quant => self.file.quant.as_ref(),
        };
        template.ok_or_else(|| {
            PipelineError::configuration(format!("Toolchain has no [{}] entry", step.as_str()))
        })
    }

    pub fn search_template(&self) -> Result<&SearchTemplate> {
        self.file
            .search
            .as_ref()
            .ok_or_else(|| PipelineError::configuration("Toolchain has no [search] entry"))
    }

    /// Fill placeholders in one template string.
    pub fn render(&self, template: &str, vars: &TemplateVars) -> Result<String> {
        let mut unknown = None;
        let rendered = self.placeholder.replace_all(template, |caps: &regex::Captures<'_>| {
            let key = &caps[1];
            match vars.get(key) {
                Some(value) => value.to_string(),
                None => {
                    unknown.get_or_insert_with(|| key.to_string());
                    String::new()
                },
            }
        });

        match unknown {
            Some(key) => Err(PipelineError::configuration(format!(
                "Unknown placeholder {{{}}} in toolchain template '{}'",
                key, template
            ))),
            None => Ok(rendered.into_owned()),
        }
    }

    /// Render the command of a non-search step.
    pub fn command(&self, step: ToolStep, vars: &TemplateVars) -> Result<CommandSpec> {
        let template = self.template(step)?;
        let args = template
            .args
            .iter()
            .map(|arg| self.render(arg, vars))
            .collect::<Result<Vec<_>>>()?;
        self.finish(step.as_str(), template, args, vars)
    }

    /// Render the search command with only `engines` switched on.
    pub fn search_command(&self, vars: &TemplateVars, engines: &[SearchEngine]) -> Result<CommandSpec> {
        let search = self.search_template()?;

        let mut args = Vec::with_capacity(search.command.args.len() + SearchEngine::ALL.len() * 2);
        for arg in &search.command.args {
            if arg == ENGINES_ARG {
                for engine in SearchEngine::ALL {
                    let enabled = if engines.contains(&engine) { "1" } else { "0" };
                    let engine_vars = vars.clone().set("engine", engine.flag()).set("enabled", enabled);
                    for engine_arg in &search.engine_args {
                        args.push(self.render(engine_arg, &engine_vars)?);
                    }
                }
            } else {
                args.push(self.render(arg, vars)?);
            }
        }

        self.finish(ToolStep::Search.as_str(), &search.command, args, vars)
    }

    /// Path of the search archive for the given placeholders.
    pub fn search_archive(&self, vars: &TemplateVars) -> Result<PathBuf> {
        let search = self.search_template()?;
        let pass_dir = vars
            .get("pass_dir")
            .ok_or_else(|| PipelineError::configuration("Search archive needs {pass_dir}"))?;
        Ok(Path::new(pass_dir).join(self.render(&search.archive, vars)?))
    }

    fn finish(
        &self,
        name: &str,
        template: &CommandTemplate,
        args: Vec<String>,
        vars: &TemplateVars,
    ) -> Result<CommandSpec> {
        let outputs = template
            .outputs
            .iter()
            .map(|output| self.render(output, vars).map(PathBuf::from))
            .collect::<Result<Vec<_>>>()?;
        let working_dir = template
            .working_dir
            .as_deref()
            .map(|dir| self.render(dir, vars).map(PathBuf::from))
            .transpose()?;

        Ok(CommandSpec {
            name: name.to_string(),
            program: PathBuf::from(self.render(&template.program, vars)?),
            args,
            timeout: Duration::from_secs(template.timeout_secs),
            outputs,
            working_dir,
        })
    }
}
