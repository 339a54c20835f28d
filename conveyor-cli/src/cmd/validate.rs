use std::path::Path;

use conveyor_core::Validate;
use serde::Serialize;

use super::config::read_document;
use crate::exit_codes;
use crate::output::print_result;
use crate::OutputArgs;

#[derive(Serialize)]
struct ValidateResult {
    valid: bool,
    format: String,
    stages: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
}

pub async fn validate_cmd(path: &Path, output: OutputArgs) -> i32 {
    let parsed = match read_document(path, &output) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let errors: Vec<String> = match parsed.document.validate() {
        Ok(()) => Vec::new(),
        Err(err) => err
            .violations
            .iter()
            .map(|v| format!("{}: {}", v.path, v.message))
            .collect(),
    };
    let result = ValidateResult {
        valid: errors.is_empty(),
        format: format!("{:?}", parsed.format),
        stages: parsed.document.stages.len(),
        errors,
    };

    if output.text() {
        if result.valid {
            println!(
                "ok: valid pipeline ({:?}, {} stages)",
                parsed.format, result.stages
            );
        } else {
            eprintln!("error: validation failed");
            for e in &result.errors {
                eprintln!("- {e}");
            }
        }
    } else {
        print_result(output.format, output.quiet, &result);
    }

    if result.valid {
        exit_codes::SUCCESS
    } else {
        exit_codes::USAGE_ERROR
    }
}
