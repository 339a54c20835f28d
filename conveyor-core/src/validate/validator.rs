use std::sync::LazyLock;

use regex::Regex;

use crate::document::PipelineDocument;
use crate::error::{ValidationError, Violation};

use super::rules;

static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("valid"));

pub(crate) fn is_valid_id(id: &str) -> bool {
    ID_RE.is_match(id)
}

pub struct Validator {
    violations: Vec<Violation>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.violations))
        }
    }

    pub fn validate_document(&mut self, doc: &PipelineDocument) {
        rules::document::validate_document(self, doc);
    }

    pub(crate) fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation::new(path, message));
    }

    pub(crate) fn validate_version(&mut self, path: &str, version: &str) {
        let major = version.split('.').next().unwrap_or_default();
        if major != "1" {
            self.push(path, "only pipeline document version 1 is supported");
        }
    }
}
