use serde::Serialize;
use std::fmt;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum WarningCode {
    /// The configured id generator failed and the sequential strategy was used.
    GeneratorFallback,
    /// A reserved column supplied by the caller was ignored.
    ReservedColumnIgnored,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
}
impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// Warnings accumulated by one store. Errors are not kept here, they are
/// returned by the operation that produced them.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}
impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn warn(&mut self, table: &str, code: WarningCode, message: impl Into<String>) {
        let message = message.into();
        warn!(table, ?code, %message, "store warning");
        self.warnings.push(Warning { code, message });
    }
    /// Takes over warnings collected elsewhere, e.g. by a wrapped store.
    pub fn absorb(&mut self, warnings: Vec<Warning>) {
        self.warnings.extend(warnings);
    }
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
    pub fn take(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}
