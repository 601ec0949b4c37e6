//! Compiler options, `[Configuration]` blocks and the phase deadline.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::diagnostics::{FatalError, FatalResult, Phase};

/// Options for one compilation unit. The CLI maps its flags onto this and
/// `[Configuration]` blocks in the source may override the recognised keys.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Verbose diagnostics; appends phase/component to every message.
    pub debug: bool,
    /// Disable pretty-printing of the generated document.
    pub minify: bool,
    /// Force SPA output (no html/head/body shell) regardless of detection.
    pub fragment: bool,
    /// Force full-page output even when the source has no `html` element.
    pub full_page: bool,
    /// Overall pipeline budget, checked between phases.
    pub timeout: Duration,
    /// Extra module search directories, tried after the official directory.
    pub module_dirs: Vec<PathBuf>,
    /// Initial value for generated auto-class indices.
    pub index_initial_count: usize,
    /// Suppress the auto-generated class used to hoist bare local styles.
    pub disable_style_auto_add_class: bool,
    /// Do not implicitly namespace module exports by module name.
    pub disable_default_namespace: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            debug: false,
            minify: false,
            fragment: false,
            full_page: false,
            timeout: Duration::from_secs(30),
            module_dirs: Vec::new(),
            index_initial_count: 0,
            disable_style_auto_add_class: false,
            disable_default_namespace: false,
        }
    }
}

/// A single configuration value. Unquoted literals that look like integers or
/// booleans are narrowed; everything else stays a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl SettingValue {
    pub fn parse(text: &str) -> Self {
        match text {
            "true" => return SettingValue::Bool(true),
            "false" => return SettingValue::Bool(false),
            _ => {}
        }
        if let Ok(n) = text.parse::<i64>() {
            return SettingValue::Int(n);
        }
        SettingValue::Str(text.to_string())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(n) => Some(*n),
            _ => None,
        }
    }
}

/// Parsed contents of one `[Configuration]` block. Settings and groups keep
/// their declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSet {
    pub name: Option<String>,
    pub settings: IndexMap<String, SettingValue>,
    pub groups: IndexMap<String, Vec<String>>,
}

impl ConfigurationSet {
    pub fn bool_setting(&self, key: &str) -> Option<bool> {
        self.settings.get(key).and_then(SettingValue::as_bool)
    }

    pub fn int_setting(&self, key: &str) -> Option<i64> {
        self.settings.get(key).and_then(SettingValue::as_int)
    }

    /// Fold the recognised keys into the options. Unrecognised keys are kept
    /// in the set and remain inspectable; they are not an error.
    pub fn apply(&self, options: &mut CompilerOptions) {
        if let Some(v) = self.bool_setting("DEBUG_MODE") {
            options.debug = v;
        }
        if let Some(v) = self.int_setting("INDEX_INITIAL_COUNT") {
            options.index_initial_count = v.max(0) as usize;
        }
        if let Some(v) = self.bool_setting("DISABLE_STYLE_AUTO_ADD_CLASS") {
            options.disable_style_auto_add_class = v;
        }
        if let Some(v) = self.bool_setting("DISABLE_DEFAULT_NAMESPACE") {
            options.disable_default_namespace = v;
        }
    }
}

/// Wall-clock budget for a compilation unit. Exceeding it surfaces as a
/// timeout error naming the phase that tripped the check.
#[derive(Debug, Clone)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn new(budget: Duration) -> Self {
        Deadline { started: Instant::now(), budget }
    }

    pub fn check(&self, phase: Phase) -> FatalResult<()> {
        if self.started.elapsed() > self.budget {
            Err(FatalError::Timeout { phase })
        } else {
            Ok(())
        }
    }
}
