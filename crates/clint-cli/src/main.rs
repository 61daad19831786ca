use std::sync::Arc;

use atty::Stream;
use clap::Parser;
use clint_core::{
    error_outcome, format_status_message, to_json_response, CommandContext, CommandInfo,
    CommandStatus, ExecutionOutcome, GlobalOptions, SharedEffects, SystemEffects,
};
use color_eyre::Result;
use serde_json::Value;

mod cli;
mod dispatch;
mod style;

use cli::ClintCli;
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = ClintCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
    };

    let info = dispatch::command_info(&cli.command);
    let effects: SharedEffects = Arc::new(SystemEffects::new());
    let outcome = match CommandContext::new(&global, effects) {
        Ok(ctx) => dispatch::dispatch_command(&ctx, &cli.command),
        Err(err) => error_outcome(&err),
    };
    let code = emit_output(&cli, info, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("clint={level},clint_core={level},clint_domain={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_output(cli: &ClintCli, info: CommandInfo, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = match outcome.status {
        CommandStatus::Ok => 0,
        CommandStatus::UserError => 1,
        CommandStatus::Failure => 2,
    };

    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));

    if cli.json {
        let payload = to_json_response(info, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if is_passthrough(&outcome.details) && outcome.status == CommandStatus::Ok {
        if !cli.quiet {
            println!("{}", outcome.message);
        }
    } else if cli.quiet {
        if outcome.status != CommandStatus::Ok {
            eprintln!("{}", format_status_message(info, &outcome.message));
        }
    } else {
        let message = format_status_message(info, &outcome.message);
        println!("{}", style.status(outcome.status, &message));
        for problem in problems(&outcome.details) {
            println!("{}", style.problem(problem));
        }
        if let Some(hint) = hint_from_details(&outcome.details) {
            println!("{}", style.info(&format!("Hint: {hint}")));
        }
    }

    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn problems(details: &Value) -> impl Iterator<Item = &str> {
    details
        .get("problems")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

fn is_passthrough(details: &Value) -> bool {
    details
        .as_object()
        .and_then(|map| map.get("passthrough"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
