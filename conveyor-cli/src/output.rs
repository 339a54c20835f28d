use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// A command result that also reads as a single line of text.
pub trait Summary: Serialize {
    /// The line for stdout, or the message to report as an error.
    fn summary(&self) -> Result<String, String>;
}

pub fn print_result<T: Serialize>(format: OutputFormat, quiet: bool, result: &T) {
    if quiet {
        return;
    }
    let rendered = match format {
        OutputFormat::Text => serde_json::to_string_pretty(result),
        OutputFormat::Json => serde_json::to_string(result),
    };
    if let Ok(out) = rendered {
        println!("{out}");
    }
}

/// JSON as usual; in text mode the summary line instead of pretty JSON.
pub fn print_summary<T: Summary>(format: OutputFormat, quiet: bool, result: &T) {
    match (format, result.summary()) {
        (OutputFormat::Json, _) => print_result(format, quiet, result),
        (OutputFormat::Text, _) if quiet => {}
        (OutputFormat::Text, Ok(line)) => println!("{line}"),
        (OutputFormat::Text, Err(message)) => print_error(format, quiet, &message),
    }
}

pub fn print_error(format: OutputFormat, quiet: bool, message: &str) {
    if quiet {
        return;
    }
    match format {
        OutputFormat::Text => eprintln!("error: {message}"),
        OutputFormat::Json => {
            let err = serde_json::json!({"error": message});
            eprintln!("{}", serde_json::to_string(&err).unwrap_or_default());
        }
    }
}
