//! CLI argument parsing for the intent-pack pipeline.
//!
//! The CLI is intentionally thin: each command maps onto one pipeline stage
//! and all policy lives in the stage modules, so the same core can be driven
//! from tests without a process boundary.
use crate::compile::ExportFormat;
use crate::confirm::Verdict;
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Root CLI entrypoint for the pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "ipack",
    version,
    about = "Build validated intent packets from repository evidence",
    after_help = "Commands:\n  init                      Write a default .ipack/config.json\n  evidence                  Scan the repository into evidence/index.json\n  discover                  Infer candidate sections (needs config + IPACK_DISCOVERY)\n  confirm --checklist       Write confirm/checklist.md for review\n  confirm --ingest          Record decisions from the edited checklist\n  build --packet-id <id>    Compile confirmed blocks and export the packet\n  validate <file>           Check a packet against a level\n  status                    Summarize pipeline state\n\nExamples:\n  ipack init\n  ipack evidence\n  IPACK_DISCOVERY=1 ipack discover --provider-command 'llm -m local'\n  ipack confirm --checklist\n  ipack confirm --ingest\n  ipack build --packet-id job-status --title 'Job status' --level 2\n  ipack validate .ipack/out/job-status.json --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Repository to scan
    #[arg(long, value_name = "DIR", default_value = ".", global = true)]
    pub repo: PathBuf,

    /// Workspace directory (defaults to .ipack under the repository)
    #[arg(long, value_name = "DIR", global = true)]
    pub workspace: Option<PathBuf>,

    /// Log stage progress to stderr (IPACK_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level pipeline commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    Evidence(EvidenceArgs),
    Discover(DiscoverArgs),
    Confirm(ConfirmArgs),
    Build(BuildArgs),
    Export(ExportArgs),
    Validate(ValidateArgs),
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Initialize a workspace with a default config.json")]
pub struct InitArgs {
    /// Overwrite an existing config.json
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Scan the repository and write the evidence index")]
pub struct EvidenceArgs {}

#[derive(Parser, Debug)]
#[command(about = "Infer candidate sections from the evidence index")]
pub struct DiscoverArgs {
    /// Provider command (overrides discovery.command and IPACK_PROVIDER_COMMAND)
    #[arg(long, value_name = "CMD")]
    pub provider_command: Option<String>,

    /// Run inference even when the inputs digest matches the last run
    #[arg(long)]
    pub force: bool,
}

/// Confirm runs in exactly one mode per invocation.
#[derive(Parser, Debug)]
#[command(about = "Review candidates and record decisions")]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["interactive", "checklist", "ingest", "revise"])
))]
pub struct ConfirmArgs {
    /// Review candidates one at a time on the terminal
    #[arg(long)]
    pub interactive: bool,

    /// Write confirm/checklist.md for document-based review
    #[arg(long)]
    pub checklist: bool,

    /// Record the decisions in the edited confirm/checklist.md
    #[arg(long)]
    pub ingest: bool,

    /// Change the decision for one candidate id
    #[arg(long, value_name = "ID", requires = "decision")]
    pub revise: Option<String>,

    /// New decision for --revise
    #[arg(long, value_enum, requires = "revise")]
    pub decision: Option<DecisionArg>,

    /// Reviewer recorded on each decision (defaults to $USER)
    #[arg(long, value_name = "NAME")]
    pub reviewer: Option<String>,
}

/// Export knobs shared by `build` and `export`.
#[derive(Args, Debug, Clone, Default)]
pub struct WriteArgs {
    /// Output format (defaults to the --out extension, then export.format)
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Overwrite an existing destination
    #[arg(long)]
    pub force: bool,

    /// Fail on an existing destination instead of writing a versioned name
    #[arg(long, conflicts_with = "force")]
    pub no_versioning: bool,

    /// Write an invalid packet anyway and stamp it as invalid
    #[arg(long)]
    pub warn_on_invalid: bool,

    /// Do not validate before writing
    #[arg(long)]
    pub skip_validation: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Compile confirmed blocks into a packet and export it")]
pub struct BuildArgs {
    /// Packet identifier (lowercase kebab-case)
    #[arg(long, value_name = "ID")]
    pub packet_id: String,

    /// Human-readable packet title
    #[arg(long, value_name = "TITLE")]
    pub title: String,

    /// Conformance level (defaults to discovery.target_level)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(1..=3))]
    pub level: Option<u8>,

    /// Destination path (defaults to out/<packet-id>.<ext> in the workspace)
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Validate and export an existing packet file")]
pub struct ExportArgs {
    /// Packet to export (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub packet: PathBuf,

    /// Destination path
    #[arg(long, value_name = "PATH")]
    pub out: PathBuf,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Validate a packet against a conformance level")]
pub struct ValidateArgs {
    /// Packet file (JSON or YAML)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Level to validate at (defaults to the packet's declared level)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(1..=3))]
    pub level: Option<u8>,

    /// Emit the validation result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Summarize pipeline state")]
pub struct StatusArgs {
    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Json,
    Yaml,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Yaml => ExportFormat::Yaml,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionArg {
    Accept,
    Reject,
}

impl From<DecisionArg> for Verdict {
    fn from(value: DecisionArg) -> Self {
        match value {
            DecisionArg::Accept => Verdict::Accept,
            DecisionArg::Reject => Verdict::Reject,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn confirm_requires_exactly_one_mode() {
        assert!(RootArgs::try_parse_from(["ipack", "confirm"]).is_err());
        assert!(
            RootArgs::try_parse_from(["ipack", "confirm", "--checklist", "--ingest"]).is_err()
        );
        assert!(RootArgs::try_parse_from(["ipack", "confirm", "--revise", "abc"]).is_err());
        let args = RootArgs::try_parse_from([
            "ipack",
            "confirm",
            "--revise",
            "abc",
            "--decision",
            "reject",
        ])
        .expect("revise parses");
        let Command::Confirm(confirm) = args.command else {
            panic!("expected confirm");
        };
        assert_eq!(confirm.decision, Some(DecisionArg::Reject));
    }

    #[test]
    fn build_level_is_range_checked() {
        let parse = |level: &str| {
            RootArgs::try_parse_from([
                "ipack",
                "build",
                "--packet-id",
                "job-status",
                "--title",
                "Job status",
                "--level",
                level,
            ])
        };
        assert!(parse("2").is_ok());
        assert!(parse("4").is_err());
        assert!(parse("0").is_err());
    }
}
