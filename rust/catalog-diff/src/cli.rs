//! Command-line surface.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::diff::DiffOptions;
use crate::pull::{PullSettings, ServerSpec};
use crate::{compile, pool, puppetdb, report};

#[derive(Debug, Parser)]
#[command(
    name = "catalog-diff",
    version,
    about = "Compile and compare configuration catalogs for a fleet across two Puppet-protocol servers"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pull catalogs for the whole fleet from both servers
    Pull(PullArgs),
    /// Pull catalogs into ephemeral directories and diff every matched pair
    Diff(DiffArgs),
}

#[derive(Debug, Args)]
pub struct TuningArgs {
    /// Number of concurrent per-node workers
    #[arg(long, default_value_t = pool::DEFAULT_CONCURRENCY)]
    pub threads: usize,

    /// Number of entries kept in ranked report breakdowns
    #[arg(long, default_value_t = report::DEFAULT_CHANGED_DEPTH)]
    pub changed_depth: usize,

    /// Per-request timeout, seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Fleet database port
    #[arg(long, default_value_t = puppetdb::DEFAULT_PORT)]
    pub puppetdb_port: u16,

    /// Compile endpoint port
    #[arg(long, default_value_t = compile::DEFAULT_PORT)]
    pub compile_port: u16,

    /// Restrict the run to these nodes (comma separated); the full factset
    /// inventory otherwise
    #[arg(long, value_delimiter = ',')]
    pub nodes: Option<Vec<String>>,
}

#[derive(Debug, Args)]
pub struct PullArgs {
    /// Old server, host[/environment]
    pub old_server: ServerSpec,

    /// New server, host[/environment]
    pub new_server: ServerSpec,

    /// Directory for old-server catalog artifacts
    pub old_dir: PathBuf,

    /// Directory for new-server catalog artifacts
    pub new_dir: PathBuf,

    #[command(flatten)]
    pub tuning: TuningArgs,

    /// Read old catalogs from the fleet database's stored catalogs instead
    /// of compiling
    #[arg(long)]
    pub stored_old: bool,

    /// Also persist each node's raw fact document next to the old catalogs
    #[arg(long)]
    pub save_facts: bool,

    /// Write the final report as JSON to this path as well
    #[arg(long)]
    pub output_report: Option<PathBuf>,
}

impl PullArgs {
    pub fn settings(&self) -> PullSettings {
        PullSettings {
            old_server: self.old_server.clone(),
            new_server: self.new_server.clone(),
            old_dir: self.old_dir.clone(),
            new_dir: self.new_dir.clone(),
            threads: self.tuning.threads,
            changed_depth: self.tuning.changed_depth,
            timeout: Duration::from_secs(self.tuning.timeout_secs.max(1)),
            puppetdb_port: self.tuning.puppetdb_port,
            compile_port: self.tuning.compile_port,
            nodes: self.tuning.nodes.clone(),
            stored_old: self.stored_old,
            save_facts: self.save_facts,
        }
    }
}

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Old server, host[/environment]
    pub old_server: ServerSpec,

    /// New server, host[/environment]
    pub new_server: ServerSpec,

    /// External diff program invoked per catalog pair
    #[arg(long)]
    pub differ: PathBuf,

    #[command(flatten)]
    pub tuning: TuningArgs,

    /// Read old catalogs from the fleet database's stored catalogs instead
    /// of compiling
    #[arg(long)]
    pub stored_old: bool,

    /// Ask the differ for File resource content diffs
    #[arg(long)]
    pub content_diff: bool,

    /// Ask the differ for unified resource diffs
    #[arg(long)]
    pub show_resource_diff: bool,

    /// Ask the differ to leave classes out of resource diffs
    #[arg(long)]
    pub exclude_classes: bool,

    /// Write the final report as JSON to this path as well
    #[arg(long)]
    pub output_report: Option<PathBuf>,
}

impl DiffArgs {
    pub fn settings(&self, old_dir: &Path, new_dir: &Path) -> PullSettings {
        PullSettings {
            old_server: self.old_server.clone(),
            new_server: self.new_server.clone(),
            old_dir: old_dir.to_path_buf(),
            new_dir: new_dir.to_path_buf(),
            threads: self.tuning.threads,
            changed_depth: self.tuning.changed_depth,
            timeout: Duration::from_secs(self.tuning.timeout_secs.max(1)),
            puppetdb_port: self.tuning.puppetdb_port,
            compile_port: self.tuning.compile_port,
            nodes: self.tuning.nodes.clone(),
            stored_old: self.stored_old,
            save_facts: false,
        }
    }

    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            content_diff: self.content_diff,
            show_resource_diff: self.show_resource_diff,
            exclude_classes: self.exclude_classes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn pull_args_parse_with_defaults() {
        let cli = Cli::parse_from([
            "catalog-diff",
            "pull",
            "old.example.com",
            "new.example.com/staging",
            "/tmp/old",
            "/tmp/new",
        ]);
        let Command::Pull(args) = cli.command else {
            panic!("expected pull command");
        };
        assert_eq!(args.tuning.threads, 10);
        assert_eq!(args.tuning.changed_depth, 10);
        assert_eq!(args.tuning.puppetdb_port, 8081);
        assert_eq!(args.tuning.compile_port, 8140);
        assert_eq!(args.new_server.environment, "staging");
        assert!(!args.stored_old);
    }

    #[test]
    fn node_list_is_comma_separated() {
        let cli = Cli::parse_from([
            "catalog-diff",
            "pull",
            "old",
            "new",
            "/tmp/old",
            "/tmp/new",
            "--nodes",
            "a.example.com,b.example.com",
        ]);
        let Command::Pull(args) = cli.command else {
            panic!("expected pull command");
        };
        assert_eq!(
            args.tuning.nodes,
            Some(vec!["a.example.com".to_string(), "b.example.com".to_string()])
        );
    }
}
