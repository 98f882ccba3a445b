//! Analysis configuration.
//!
//! [`AnalysisConfig`] is a plain struct: fields are public, [`Default`] gives the standard settings,
//! and the `with_*` methods allow chaining.
//!
//! ```
//! use absint_rs::config::{AnalysisConfig, WorkingSetKind};
//!
//! let config = AnalysisConfig::default()
//!     .with_widening_threshold(1)
//!     .with_working_set(WorkingSetKind::Lifo);
//! assert!(config.validate().is_ok());
//! ```

use crate::error::ConfigError;

/// Order in which pending nodes (or procedures) are processed. Both disciplines ignore duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkingSetKind {
    #[default]
    Fifo,
    Lifo,
}

/// How calls to the same procedure are distinguished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextSensitivity {
    /// One result per procedure, shared by all its callers.
    #[default]
    Insensitive,
    /// One result per calling site.
    CallSite,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Run the type-inference phase before the main analysis (default: true)
    pub infer_types: bool,
    /// Dump the input CFGs (default: false)
    pub dump_cfgs: bool,
    /// Dump the results of type inference (default: false)
    pub dump_type_inference: bool,
    /// Dump the results of the main analysis (default: false)
    pub dump_analysis: bool,
    pub working_set: WorkingSetKind,
    /// Lub-based updates of a loop head, or of a procedure summary, before widening is used (default: 5)
    pub widening_threshold: usize,
    /// Node visits allowed per CFG fixpoint (default: 10 000)
    pub max_iterations: usize,
    /// Pending nodes allowed per CFG fixpoint (default: 100 000)
    pub max_working_set: usize,
    /// Procedure runs allowed per interprocedural fixpoint (default: 10 000)
    pub max_procedure_iterations: usize,
    pub context_sensitivity: ContextSensitivity,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            infer_types: true,
            dump_cfgs: false,
            dump_type_inference: false,
            dump_analysis: false,
            working_set: WorkingSetKind::Fifo,
            widening_threshold: 5,
            max_iterations: 10_000,
            max_working_set: 100_000,
            max_procedure_iterations: 10_000,
            context_sensitivity: ContextSensitivity::Insensitive,
        }
    }
}

impl AnalysisConfig {
    pub fn with_type_inference(mut self, infer_types: bool) -> Self {
        self.infer_types = infer_types;
        self
    }

    pub fn with_dumps(mut self, cfgs: bool, type_inference: bool, analysis: bool) -> Self {
        self.dump_cfgs = cfgs;
        self.dump_type_inference = type_inference;
        self.dump_analysis = analysis;
        self
    }

    pub fn with_working_set(mut self, kind: WorkingSetKind) -> Self {
        self.working_set = kind;
        self
    }

    pub fn with_widening_threshold(mut self, threshold: usize) -> Self {
        self.widening_threshold = threshold;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_working_set(mut self, max_working_set: usize) -> Self {
        self.max_working_set = max_working_set;
        self
    }

    pub fn with_max_procedure_iterations(mut self, max_procedure_iterations: usize) -> Self {
        self.max_procedure_iterations = max_procedure_iterations;
        self
    }

    pub fn with_context_sensitivity(mut self, sensitivity: ContextSensitivity) -> Self {
        self.context_sensitivity = sensitivity;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.widening_threshold == 0 {
            return Err(ConfigError::ZeroWideningThreshold);
        }
        let budgets = [
            ("max_iterations", self.max_iterations),
            ("max_working_set", self.max_working_set),
            ("max_procedure_iterations", self.max_procedure_iterations),
        ];
        for (name, value) in budgets {
            if value == 0 {
                return Err(ConfigError::ZeroBudget(name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = AnalysisConfig::default();
        assert!(config.infer_types);
        assert_eq!(config.widening_threshold, 5);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_invalid_values() {
        let config = AnalysisConfig::default().with_widening_threshold(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroWideningThreshold));

        let config = AnalysisConfig::default().with_max_working_set(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroBudget("max_working_set")));
    }
}
