use conveyor_core::build_plan;

use super::config::load_pipeline;
use crate::exit_codes;
use crate::output::print_result;
use crate::{OutputArgs, PipelineArgs};

pub async fn plan_cmd(pipeline: PipelineArgs, output: OutputArgs) -> i32 {
    let loaded = match load_pipeline(&pipeline, &output) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let plan = build_plan(&loaded.registry);

    if output.text() {
        print!("{}", plan.to_text());
    } else {
        print_result(output.format, output.quiet, &plan);
    }
    exit_codes::SUCCESS
}
