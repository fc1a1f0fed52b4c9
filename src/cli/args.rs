//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

/// Reconstruct the kernel scheduling-domain hierarchy and show where run-queue load sits
#[derive(Parser, Debug)]
#[command(name = "schedtree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output, repeat for more (-d info, -dd debug, -ddd trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub debug: u8,

    /// Directory holding schedstat, sched_debug and cpuinfo
    #[arg(long, global = true, env = "SCHEDTREE_PROC_ROOT", value_hint = ValueHint::DirPath)]
    pub proc_root: Option<PathBuf>,

    /// Additional config file, applied after the global one
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Width of every cpumask
    #[arg(long, global = true)]
    pub max_cpus: Option<usize>,

    /// Fail on parse and integrity diagnostics instead of printing partial output
    #[arg(long, global = true)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the domain hierarchy with aggregated loads
    Tree {
        /// Print cpumasks in kernel hex format next to each domain
        #[arg(short, long)]
        masks: bool,
    },

    /// Show load per level and the imbalance between sibling domains
    Levels,

    /// Repeat the tree view on an interval
    Watch {
        /// Seconds between cycles (default: interval_secs from config)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop after this many cycles
        #[arg(short, long)]
        count: Option<usize>,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Print a commented config template
    Template,

    /// Show config paths
    Path,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn given_repeated_debug_flag_when_parsing_then_counts_occurrences() {
        let cli = Cli::parse_from(["schedtree", "-ddd", "--strict", "levels"]);
        assert_eq!(cli.debug, 3);
        assert!(cli.strict);
        assert!(matches!(cli.command, Some(Commands::Levels)));
    }

    #[test]
    fn given_watch_options_when_parsing_then_keeps_them() {
        let cli = Cli::parse_from(["schedtree", "watch", "-i", "2", "-c", "3"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Watch {
                interval: Some(2),
                count: Some(3)
            })
        ));
    }
}
