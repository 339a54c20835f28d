use serde::Serialize;

use super::config::connect_store;
use crate::exit_codes;
use crate::output::{print_error, print_result};
use crate::{OutputArgs, StoreArgs};

#[derive(Serialize)]
struct MigrateResult {
    success: bool,
    message: String,
}

pub async fn migrate_cmd(store: StoreArgs, output: OutputArgs) -> i32 {
    let handle = match connect_store(&store, &output).await {
        Ok(h) => h,
        Err(code) => return code,
    };

    match handle.migrate().await {
        Ok(applied) => {
            let message = if applied {
                "migrations applied"
            } else {
                "store has no schema to migrate"
            };
            if output.text() {
                println!("ok: {message}");
            } else {
                print_result(
                    output.format,
                    output.quiet,
                    &MigrateResult {
                        success: true,
                        message: message.to_string(),
                    },
                );
            }
            exit_codes::SUCCESS
        }
        Err(e) => {
            print_error(output.format, output.quiet, &format!("migration failed: {e}"));
            exit_codes::RUNTIME_ERROR
        }
    }
}
