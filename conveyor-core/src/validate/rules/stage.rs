use crate::document::StageSpec;
use crate::expressions::{parse_condition, ExpressionScopeKind};
use crate::validate::validator::{is_valid_id, Validator};

pub(crate) fn validate_stage(v: &mut Validator, stage: &StageSpec, path: &str) {
    if stage.id.trim().is_empty() {
        v.push(format!("{path}.id"), "must not be empty");
    } else if !is_valid_id(&stage.id) {
        v.push(format!("{path}.id"), "must match regex ^[A-Za-z0-9_.\\-]+$");
    }

    match stage.run.first() {
        None => v.push(format!("{path}.run"), "must name a program to execute"),
        Some(program) if program.trim().is_empty() => {
            v.push(format!("{path}.run[0]"), "program must not be empty")
        }
        Some(_) => {}
    }

    for key in stage.env.keys() {
        if key.is_empty() || key.contains('=') {
            v.push(format!("{path}.env.{key}"), "invalid environment variable name");
        }
    }

    for (idx, expr) in stage.when.iter().enumerate() {
        if let Err(e) = parse_condition(expr, ExpressionScopeKind::Run) {
            v.push(format!("{path}.when[{idx}]"), format!("invalid condition: {e}"));
        }
    }

    if let Some(accept) = &stage.accept {
        for (idx, expr) in accept.criteria.iter().enumerate() {
            if let Err(e) = parse_condition(expr, ExpressionScopeKind::Acceptance) {
                v.push(
                    format!("{path}.accept.criteria[{idx}]"),
                    format!("invalid criterion: {e}"),
                );
            }
        }
        if let Some(cmd) = &accept.command {
            if cmd.first().map_or(true, |p| p.trim().is_empty()) {
                v.push(format!("{path}.accept.command"), "must name a program to execute");
            }
        }
    }
}
