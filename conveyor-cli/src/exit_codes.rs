/// Exit codes for CI/automation and wrapping launchers.
pub const SUCCESS: i32 = 0;
/// No candidate, unknown stage, invalid pipeline or arguments.
pub const USAGE_ERROR: i32 = 1;
/// Execution failed after retries, breaker open, cancelled, store failure.
pub const RUNTIME_ERROR: i32 = 2;
pub const ACCEPTANCE_UNMET: i32 = 3;
