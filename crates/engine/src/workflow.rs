//! Workflow steps
//!
//! A workflow is an ordered list of process invocations. Each step is either
//! a bare process name or an object with a `process` key; objects without one
//! are placeholders and are skipped at execution time.
//!
//! ```
//! use pop_engine::WorkflowStep;
//!
//! let steps = WorkflowStep::list_from_json(r#"["p_load", {"process": "p_total"}, {"note": "x"}]"#).unwrap();
//! let names: Vec<_> = steps.iter().map(|s| s.process_name()).collect();
//! assert_eq!(names, vec![Some("p_load"), Some("p_total"), None]);
//! ```

use pop_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// One step of a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkflowStep {
    /// Bare process name
    Name(String),
    /// Structured step
    Step {
        /// Process to run; `None` skips the step
        #[serde(default)]
        process: Option<String>,
    },
}

impl WorkflowStep {
    /// Process this step invokes, if any
    pub fn process_name(&self) -> Option<&str> {
        match self {
            WorkflowStep::Name(name) => Some(name),
            WorkflowStep::Step { process } => process.as_deref(),
        }
    }

    /// Parse a JSON array of steps
    pub fn list_from_json(json: &str) -> Result<Vec<WorkflowStep>> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("Invalid workflow: {}", e)))
    }
}

impl From<&str> for WorkflowStep {
    fn from(name: &str) -> Self {
        WorkflowStep::Name(name.to_string())
    }
}

impl From<String> for WorkflowStep {
    fn from(name: String) -> Self {
        WorkflowStep::Name(name)
    }
}
