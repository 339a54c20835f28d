//! Condition expressions used by `when` and `accept.criteria`.
//!
//! Grammar: `<operand> [<op> <literal>]` where operand is one of
//! `$outputs.<stage>[#<json-pointer>]`, `$output[#<json-pointer>]`,
//! `$env.<NAME>`, `$candidate`, `$run`, and op is one of
//! `== != <= >= < >`. Without a comparison the operand is tested for
//! truthiness.

mod eval;

use std::fmt;

use serde_json::Value as JsonValue;

pub use eval::{json_truthy, parse_literal};

use crate::types::{RunContext, StageOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionScopeKind {
    /// Stage run conditions: see prior outputs, env, candidate and run ids.
    Run,
    /// Acceptance criteria: see only the output under test and env.
    Acceptance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Outputs {
        stage: String,
        pointer: Option<String>,
    },
    Output {
        pointer: Option<String>,
    },
    Env(String),
    Candidate,
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
}

impl CompareOp {
    fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
        }
    }
}

const OPS: [CompareOp; 6] = [
    CompareOp::Eq,
    CompareOp::Ne,
    CompareOp::Le,
    CompareOp::Ge,
    CompareOp::Lt,
    CompareOp::Gt,
];

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub operand: Operand,
    pub comparison: Option<(CompareOp, JsonValue)>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,
    #[error("operand must start with `$`: {0}")]
    NotAnExpression(String),
    #[error("unknown operand `{0}`")]
    UnknownOperand(String),
    #[error("`{0}` is not available in this context")]
    OutOfScope(String),
    #[error("json pointer must start with `/`: {0}")]
    InvalidPointer(String),
    #[error("missing literal after `{0}`")]
    MissingLiteral(String),
}

pub fn parse_condition(input: &str, scope: ExpressionScopeKind) -> Result<Condition, ExpressionError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ExpressionError::Empty);
    }

    let mut comparison = None;
    let mut lhs = input;
    for op in OPS {
        if let Some((l, r)) = input.split_once(op.as_str()) {
            let r = r.trim();
            if r.is_empty() {
                return Err(ExpressionError::MissingLiteral(op.as_str().to_string()));
            }
            lhs = l;
            comparison = Some((op, parse_literal(r)));
            break;
        }
    }

    let operand = parse_operand(lhs.trim())?;
    check_scope(&operand, scope)?;
    Ok(Condition {
        operand,
        comparison,
    })
}

fn parse_operand(s: &str) -> Result<Operand, ExpressionError> {
    let Some(body) = s.strip_prefix('$') else {
        return Err(ExpressionError::NotAnExpression(s.to_string()));
    };

    let (head, pointer) = match body.split_once('#') {
        Some((h, p)) => {
            if !p.is_empty() && !p.starts_with('/') {
                return Err(ExpressionError::InvalidPointer(p.to_string()));
            }
            (h, Some(p.to_string()))
        }
        None => (body, None),
    };

    if let Some(stage) = head.strip_prefix("outputs.") {
        if stage.is_empty() {
            return Err(ExpressionError::UnknownOperand(s.to_string()));
        }
        return Ok(Operand::Outputs {
            stage: stage.to_string(),
            pointer,
        });
    }
    if let Some(name) = head.strip_prefix("env.") {
        if name.is_empty() || pointer.is_some() {
            return Err(ExpressionError::UnknownOperand(s.to_string()));
        }
        return Ok(Operand::Env(name.to_string()));
    }
    match (head, pointer) {
        ("output", pointer) => Ok(Operand::Output { pointer }),
        ("candidate", None) => Ok(Operand::Candidate),
        ("run", None) => Ok(Operand::Run),
        _ => Err(ExpressionError::UnknownOperand(s.to_string())),
    }
}

fn check_scope(operand: &Operand, scope: ExpressionScopeKind) -> Result<(), ExpressionError> {
    let ok = match (operand, scope) {
        (Operand::Env(_), _) => true,
        (Operand::Output { .. }, ExpressionScopeKind::Acceptance) => true,
        (Operand::Output { .. }, ExpressionScopeKind::Run) => false,
        (_, ExpressionScopeKind::Run) => true,
        (_, ExpressionScopeKind::Acceptance) => false,
    };
    if ok {
        Ok(())
    } else {
        Err(ExpressionError::OutOfScope(operand.to_string()))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Outputs { stage, pointer } => {
                write!(f, "$outputs.{stage}{}", pointer_suffix(pointer))
            }
            Operand::Output { pointer } => write!(f, "$output{}", pointer_suffix(pointer)),
            Operand::Env(name) => write!(f, "$env.{name}"),
            Operand::Candidate => f.write_str("$candidate"),
            Operand::Run => f.write_str("$run"),
        }
    }
}

fn pointer_suffix(pointer: &Option<String>) -> String {
    pointer.as_ref().map(|p| format!("#{p}")).unwrap_or_default()
}

impl Condition {
    pub fn evaluate_run(&self, ctx: &RunContext) -> bool {
        let value = match &self.operand {
            Operand::Outputs { stage, pointer } => ctx
                .output(stage)
                .and_then(|o| eval::select(o.value(), pointer.as_deref())),
            Operand::Env(name) => eval::env_value(name),
            Operand::Candidate => Some(JsonValue::String(ctx.candidate_id().to_string())),
            Operand::Run => Some(JsonValue::String(ctx.run_id().to_string())),
            Operand::Output { .. } => None,
        };
        self.check(value)
    }

    pub fn evaluate_output(&self, output: &StageOutput) -> bool {
        let value = match &self.operand {
            Operand::Output { pointer } => eval::select(output.value(), pointer.as_deref()),
            Operand::Env(name) => eval::env_value(name),
            _ => None,
        };
        self.check(value)
    }

    fn check(&self, value: Option<JsonValue>) -> bool {
        match (&self.comparison, value) {
            (None, Some(v)) => json_truthy(&v),
            (None, None) => false,
            (Some((op, expected)), Some(actual)) => eval::compare_values(&actual, expected, *op),
            // A missing value only satisfies `!=`.
            (Some((op, _)), None) => *op == CompareOp::Ne,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_outputs_with_pointer_and_comparison() {
        let c = parse_condition("$outputs.idea#/score >= 7", ExpressionScopeKind::Run).unwrap();
        assert_eq!(
            c.operand,
            Operand::Outputs {
                stage: "idea".to_string(),
                pointer: Some("/score".to_string())
            }
        );
        assert_eq!(c.comparison, Some((CompareOp::Ge, json!(7))));
    }

    #[test]
    fn stage_ids_may_contain_dots() {
        let c = parse_condition("$outputs.video.v2", ExpressionScopeKind::Run).unwrap();
        assert_eq!(
            c.operand,
            Operand::Outputs {
                stage: "video.v2".to_string(),
                pointer: None
            }
        );
    }

    #[test]
    fn output_operand_is_rejected_in_run_scope() {
        let err = parse_condition("$output#/ok", ExpressionScopeKind::Run).unwrap_err();
        assert!(matches!(err, ExpressionError::OutOfScope(_)));
        let err = parse_condition("$outputs.a", ExpressionScopeKind::Acceptance).unwrap_err();
        assert!(matches!(err, ExpressionError::OutOfScope(_)));
    }

    #[test]
    fn evaluates_against_run_context() {
        let mut ctx = RunContext::new("run-1", "story-9");
        ctx.insert_output("idea", json!({"approved": true, "score": 8}).into());

        let approved = parse_condition("$outputs.idea#/approved == true", ExpressionScopeKind::Run).unwrap();
        let low = parse_condition("$outputs.idea#/score < 5", ExpressionScopeKind::Run).unwrap();
        let missing = parse_condition("$outputs.voice", ExpressionScopeKind::Run).unwrap();
        let who = parse_condition("$candidate == story-9", ExpressionScopeKind::Run).unwrap();

        assert!(approved.evaluate_run(&ctx));
        assert!(!low.evaluate_run(&ctx));
        assert!(!missing.evaluate_run(&ctx));
        assert!(who.evaluate_run(&ctx));
    }

    #[test]
    fn evaluates_acceptance_over_output() {
        let output = StageOutput::new(json!({"word_count": 310, "lang": "en"}));
        let enough = parse_condition("$output#/word_count >= 300", ExpressionScopeKind::Acceptance).unwrap();
        let lang = parse_condition("$output#/lang == 'en'", ExpressionScopeKind::Acceptance).unwrap();
        let absent = parse_condition("$output#/missing != 1", ExpressionScopeKind::Acceptance).unwrap();
        assert!(enough.evaluate_output(&output));
        assert!(lang.evaluate_output(&output));
        assert!(absent.evaluate_output(&output));
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert_eq!(parse_condition("  ", ExpressionScopeKind::Run), Err(ExpressionError::Empty));
        assert!(matches!(
            parse_condition("outputs.a", ExpressionScopeKind::Run),
            Err(ExpressionError::NotAnExpression(_))
        ));
        assert!(matches!(
            parse_condition("$outputs.a ==", ExpressionScopeKind::Run),
            Err(ExpressionError::MissingLiteral(_))
        ));
        assert!(matches!(
            parse_condition("$outputs.a#score", ExpressionScopeKind::Run),
            Err(ExpressionError::InvalidPointer(_))
        ));
    }
}
