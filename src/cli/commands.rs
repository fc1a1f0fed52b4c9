//! Command dispatch

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use clap::CommandFactory;
use clap_complete::generate;
use tracing::{debug, instrument};

use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::output;
use crate::cli::render::{RenderOptions, TreeNodeConvert};
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, Settings};
use crate::domain::{Diagnostics, ErrorKind, Report};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    if let Some(Commands::Completion { shell }) = &cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(*shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let settings = load_settings(cli)?;
    match &cli.command {
        Some(Commands::Config { command }) => cmd_config(command, &settings),
        Some(Commands::Tree { masks }) => {
            let container = ServiceContainer::new(settings);
            cmd_tree(&container, cli.strict, *masks)
        }
        Some(Commands::Levels) => {
            let container = ServiceContainer::new(settings);
            cmd_levels(&container, cli.strict)
        }
        Some(Commands::Watch { interval, count }) => {
            let container = ServiceContainer::new(settings);
            cmd_watch(&container, cli.strict, *interval, *count)
        }
        Some(Commands::Completion { .. }) => Ok(()),
        None => Cli::command()
            .print_help()
            .map_err(|e| InfraError::io("print help", e).into()),
    }
}

/// Config layers plus the command-line overrides.
pub fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(root) = &cli.proc_root {
        settings.proc_root = root.clone();
    }
    if let Some(max_cpus) = cli.max_cpus {
        settings.max_cpus = max_cpus;
    }
    settings.validate()?;
    debug!(?settings, "effective settings");
    Ok(settings)
}

/// Print every diagnostic; in strict mode parse and integrity errors abort.
pub fn report_diagnostics(diagnostics: &Diagnostics, strict: bool) -> CliResult<()> {
    for diag in diagnostics.iter() {
        output::diagnostic(diag);
    }
    let fatal = diagnostics
        .iter()
        .filter(|d| d.kind() != ErrorKind::MissingData)
        .count();
    if strict && fatal > 0 {
        return Err(CliError::Strict { count: fatal });
    }
    Ok(())
}

#[instrument(level = "debug", skip(container))]
fn cmd_tree(container: &ServiceContainer, strict: bool, masks: bool) -> CliResult<()> {
    let cycle = container.topology.run_cycle()?;
    report_diagnostics(&cycle.diagnostics, strict)?;

    let opts = RenderOptions {
        mask_width: masks.then_some(container.settings.max_cpus),
    };
    output::info(&Report::new(&cycle.tree).to_tree_string(opts));
    Ok(())
}

#[instrument(level = "debug", skip(container))]
fn cmd_levels(container: &ServiceContainer, strict: bool) -> CliResult<()> {
    let cycle = container.topology.run_cycle()?;
    report_diagnostics(&cycle.diagnostics, strict)?;

    let report = Report::new(&cycle.tree);
    output::header(&format!("total load: {}", report.root_load()));
    for level in report.level_summary() {
        output::info(&format!(
            "L{} {:<8} domains={:<4} imbalance={}",
            level.level,
            level.type_name,
            level.loads.len(),
            level.imbalance()
        ));
        let loads: Vec<String> = level.loads.iter().map(|l| l.to_string()).collect();
        output::detail(&loads.join(" "));
    }
    Ok(())
}

#[instrument(level = "debug", skip(container))]
fn cmd_watch(
    container: &ServiceContainer,
    strict: bool,
    interval: Option<u64>,
    count: Option<usize>,
) -> CliResult<()> {
    let interval = Duration::from_secs(interval.unwrap_or(container.settings.interval_secs));
    if interval.is_zero() {
        return Err(CliError::InvalidArgs("interval must be at least 1s".into()));
    }

    // Names are resolved once; every cycle rebuilds the tree from scratch.
    let names = container.topology.load_names()?;
    let mut cycles = 0usize;
    loop {
        let cycle = container.topology.run_cycle_with(&names)?;
        report_diagnostics(&cycle.diagnostics, strict)?;
        output::info(&Report::new(&cycle.tree).to_tree_string(RenderOptions::default()));
        io::stdout()
            .flush()
            .map_err(|e| InfraError::io("flush stdout", e))?;

        cycles += 1;
        if count.is_some_and(|n| cycles >= n) {
            return Ok(());
        }
        thread::sleep(interval);
    }
}

fn cmd_config(command: &ConfigCommands, settings: &Settings) -> CliResult<()> {
    match command {
        ConfigCommands::Show => output::info(&settings.to_toml()?),
        ConfigCommands::Template => output::info(&Settings::template()),
        ConfigCommands::Path => match global_config_path() {
            Some(path) => {
                let state = if path.exists() { "" } else { " (not present)" };
                output::info(&format!("global: {}{}", path.display(), state));
            }
            None => output::warning("no config directory for this platform"),
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;

    #[test]
    fn given_missing_data_only_when_strict_then_passes() {
        let mut diags = Diagnostics::new();
        diags.push(DomainError::MissingName {
            level: 1,
            fallback: "domain0".into(),
        });
        assert!(report_diagnostics(&diags, true).is_ok());
    }

    #[test]
    fn given_integrity_error_when_strict_then_fails() {
        let mut diags = Diagnostics::new();
        diags.push(DomainError::PartitionViolation {
            cpu: 1,
            level: 1,
            count: 2,
        });
        assert!(report_diagnostics(&diags, false).is_ok());
        assert!(matches!(
            report_diagnostics(&diags, true),
            Err(CliError::Strict { count: 1 })
        ));
    }
}
