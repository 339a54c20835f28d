use std::collections::HashSet;

use crate::document::{CandidateSource, PipelineDocument};
use crate::validate::validator::Validator;

use super::stage::validate_stage;

pub(crate) fn validate_document(v: &mut Validator, doc: &PipelineDocument) {
    v.validate_version("$.version", &doc.version);

    if doc.stages.is_empty() {
        v.push("$.stages", "must contain at least one stage");
    }

    if doc.breaker.failure_threshold == 0 {
        v.push("$.breaker.failure_threshold", "must be at least 1");
    }

    match &doc.candidates {
        Some(CandidateSource::Ids(ids)) => {
            if ids.is_empty() {
                v.push("$.candidates.ids", "must not be empty");
            }
            let mut seen = HashSet::new();
            for (idx, id) in ids.iter().enumerate() {
                if id.trim().is_empty() {
                    v.push(format!("$.candidates.ids[{idx}]"), "must not be empty");
                } else if !seen.insert(id.as_str()) {
                    v.push(format!("$.candidates.ids[{idx}]"), format!("duplicate candidate id `{id}`"));
                }
            }
        }
        Some(CandidateSource::Directory(dir)) => {
            if dir.as_os_str().is_empty() {
                v.push("$.candidates.directory", "must not be empty");
            }
        }
        None => {}
    }

    let mut seen = HashSet::new();
    for (idx, stage) in doc.stages.iter().enumerate() {
        let path = format!("$.stages[{idx}]");
        if !seen.insert(stage.id.as_str()) {
            v.push(format!("{path}.id"), format!("duplicate stage id `{}`", stage.id));
        }
        validate_stage(v, stage, &path);
    }
}
