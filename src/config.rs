//! Unified configuration for crucible.
//!
//! Settings are read from `.crucible/crucible.toml` and layered
//! file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "my-app"
//! test_command = "cargo test"
//! test_timeout_secs = 900
//!
//! [profile]
//! name = "Ada"
//! languages = ["rust"]
//!
//! [review]
//! max_iterations = 5
//! max_rejection_cycles = 3
//! autonomous = false
//!
//! [convergence]
//! max_depth = 5
//! threshold = 0
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::convergence::ConvergenceState;
use crate::orchestrator::DeveloperProfile;
use crate::store::ProjectStore;

/// Project-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Project name (optional, defaults to directory name)
    #[serde(default)]
    pub name: Option<String>,
    /// Shell command that runs the project's test suite
    #[serde(default)]
    pub test_command: Option<String>,
    /// Timeout for one test-suite run
    #[serde(default = "default_test_timeout_secs")]
    pub test_timeout_secs: u64,
}

fn default_test_timeout_secs() -> u64 {
    900
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            name: None,
            test_command: None,
            test_timeout_secs: default_test_timeout_secs(),
        }
    }
}

/// Review, convergence-loop and sign-off settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSection {
    /// Iteration cap for the adversarial convergence loop
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// How many times sign-off may reject before giving up
    #[serde(default = "default_max_rejection_cycles")]
    pub max_rejection_cycles: u32,
    /// Skip the human sign-off prompt entirely
    #[serde(default)]
    pub autonomous: bool,
}

fn default_max_iterations() -> u32 {
    5
}

fn default_max_rejection_cycles() -> u32 {
    3
}

impl Default for ReviewSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_rejection_cycles: default_max_rejection_cycles(),
            autonomous: false,
        }
    }
}

/// Improvement-cycle convergence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceSection {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default)]
    pub threshold: usize,
}

fn default_max_depth() -> u32 {
    5
}

impl Default for ConvergenceSection {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            threshold: 0,
        }
    }
}

/// The complete crucible.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrucibleToml {
    #[serde(default)]
    pub project: ProjectSection,
    /// Developer profile; the orchestrator refuses to leave IDLE without one
    #[serde(default)]
    pub profile: Option<DeveloperProfile>,
    #[serde(default)]
    pub review: ReviewSection,
    #[serde(default)]
    pub convergence: ConvergenceSection,
}

impl CrucibleToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse crucible.toml")
    }

    /// Load from the given path, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize crucible.toml")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.review.max_iterations == 0 {
            warnings.push(
                "review.max_iterations is 0: the convergence loop will never run an iteration"
                    .to_string(),
            );
        }
        if self.convergence.max_depth == 0 {
            warnings.push(
                "convergence.max_depth is 0: improvement cycles stop before the first run"
                    .to_string(),
            );
        }
        if let Some(cmd) = &self.project.test_command
            && cmd.trim().is_empty()
        {
            warnings.push("project.test_command is empty".to_string());
        }
        if self.profile.is_none() {
            warnings.push("No [profile] section: the pipeline cannot leave IDLE".to_string());
        }
        warnings
    }
}

/// Effective configuration: crucible.toml merged with environment and CLI overrides.
#[derive(Debug, Clone)]
pub struct CrucibleConfig {
    pub project_dir: PathBuf,
    pub toml: CrucibleToml,
    /// CLI override: `--yes` forces autonomous sign-off
    pub cli_autonomous: bool,
    pub verbose: bool,
}

impl CrucibleConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let store = ProjectStore::new(&project_dir);
        let toml = CrucibleToml::load_or_default(&store.config_file())?;
        Ok(Self {
            project_dir,
            toml,
            cli_autonomous: false,
            verbose: false,
        })
    }

    pub fn with_cli_args(project_dir: PathBuf, verbose: bool, yes: bool) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        config.cli_autonomous = yes;
        Ok(config)
    }

    pub fn store(&self) -> ProjectStore {
        ProjectStore::new(&self.project_dir)
    }

    pub fn profile(&self) -> Option<&DeveloperProfile> {
        self.toml.profile.as_ref()
    }

    /// Autonomous sign-off (CLI → env → file).
    pub fn autonomous(&self) -> bool {
        if self.cli_autonomous {
            return true;
        }
        if let Ok(val) = std::env::var("CRUCIBLE_AUTONOMOUS") {
            return parse_env_flag(&val);
        }
        self.toml.review.autonomous
    }

    /// Test command (env → file).
    pub fn test_command(&self) -> Option<String> {
        std::env::var("CRUCIBLE_TEST_COMMAND")
            .ok()
            .filter(|cmd| !cmd.trim().is_empty())
            .or_else(|| self.toml.project.test_command.clone())
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.toml.project.test_timeout_secs)
    }

    pub fn max_iterations(&self) -> u32 {
        self.toml.review.max_iterations
    }

    pub fn max_rejection_cycles(&self) -> u32 {
        self.toml.review.max_rejection_cycles
    }

    /// Empty convergence state seeded with the configured limits.
    pub fn convergence_state(&self) -> ConvergenceState {
        ConvergenceState::new(self.toml.convergence.max_depth, self.toml.convergence.threshold)
    }

    pub fn project_name(&self) -> String {
        self.toml.project.name.clone().unwrap_or_else(|| {
            self.project_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string())
        })
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

fn parse_env_flag(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
