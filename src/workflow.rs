//! Command drivers for each pipeline stage.
//!
//! Every driver loads its inputs from the workspace, calls into the stage
//! module, persists the stage output, and appends a history entry. Stage
//! modules never print; drivers write command output to stdout.
use crate::cli::{
    BuildArgs, ConfirmArgs, DiscoverArgs, EvidenceArgs, ExportArgs, InitArgs, StatusArgs,
    ValidateArgs, WriteArgs,
};
use crate::compile::{self, BuildOptions, ExportFormat, ExportOptions, WrittenArtifact};
use crate::confirm::{self, ConfirmReport, Ledger, ReviewContext};
use crate::discovery::{
    self, append_attempts, provider_for, CandidateDocument, DiscoveryRequest, DiscoveryRun, Gate,
};
use crate::error::{PipelineError, Stage};
use crate::evidence::{build_evidence, EvidenceIndex, ScanOptions};
use crate::sections::Level;
use crate::util::Cancellation;
use crate::validate::{declared_level, parse_document, validate};
use crate::workspace::{
    self, default_config, load_json_optional, resolve_provider_command, sha256_hex, write_config,
    write_json, Digester, PipelineConfig, WorkspacePaths,
};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod context;
mod status;

pub(crate) use context::{PipelineContext, StageOutcome};

/// Repository and workspace locations shared by every command.
#[derive(Debug, Clone)]
pub struct Locations {
    pub repo: PathBuf,
    pub workspace: Option<PathBuf>,
    /// Polled by evidence, discovery and confirmation between units of work.
    /// Whoever embeds the drivers holds a clone and cancels through it.
    pub cancel: Cancellation,
}

impl Locations {
    fn context(&self) -> Result<PipelineContext> {
        PipelineContext::load(&self.repo, self.workspace.as_deref())
    }
}

pub fn run_init(locations: &Locations, args: InitArgs) -> Result<()> {
    let ctx = locations.context()?;
    let config_path = ctx.paths.config_path();
    if config_path.is_file() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            config_path.display()
        ));
    }
    let started_at = workspace::now();
    let config = default_config();
    let result = write_config(ctx.paths.root(), &config).map(|()| StageOutcome {
        outputs_hash: Some(config_hash(&config)),
        ..StageOutcome::default()
    });
    ctx.record(Stage::Config, started_at, result)?;
    println!("wrote {}", config_path.display());
    Ok(())
}

pub fn run_evidence(locations: &Locations, _args: EvidenceArgs) -> Result<()> {
    let ctx = locations.context()?;
    let started_at = workspace::now();
    let result = evidence_stage(&ctx, &locations.cancel);
    ctx.record(Stage::Evidence, started_at, result)
}

fn evidence_stage(ctx: &PipelineContext, cancel: &Cancellation) -> Result<StageOutcome> {
    let mut options = ScanOptions::from_config(&ctx.config.evidence);
    if let Some(rel) = ctx.workspace_in_repo() {
        options = options.exclude_dir(&rel);
    }
    let pinned = workspace::reproducible_now();
    let mut index = build_evidence(
        &ctx.repo_root,
        &options,
        pinned.unwrap_or_else(workspace::now),
        cancel,
    )?;

    let index_path = ctx.paths.evidence_index_path();
    if pinned.is_none() {
        match load_json_optional::<EvidenceIndex>(&index_path) {
            Ok(Some(previous)) if previous.content_digest == index.content_digest => {
                tracing::info!(digest = %index.content_digest, "evidence unchanged; keeping generatedAt");
                index.generated_at = previous.generated_at;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(err = %format!("{err:#}"), "ignoring unreadable previous evidence index");
            }
        }
    }
    write_json(&index_path, &index)?;

    let body = &index.body;
    println!(
        "evidence: {} files, {} skipped, {} dependencies, {} routes, {} auth signals",
        body.files.len(),
        body.skipped.len(),
        body.dependencies.len(),
        body.routes.len(),
        body.auth_signals.len()
    );
    if body.redaction_applied {
        let masked: usize = body.redactions.values().sum();
        println!("redacted {masked} snippets (pattern-based, not exhaustive)");
    }
    println!("wrote {}", index_path.display());
    Ok(StageOutcome {
        inputs_hash: Some(sha256_hex(&serde_json::to_vec(&ctx.config.evidence)?)),
        outputs_hash: Some(index.content_digest),
        message: None,
    })
}

pub fn run_discover(locations: &Locations, args: DiscoverArgs) -> Result<()> {
    let ctx = locations.context()?;
    ctx.require_config()?;
    let started_at = workspace::now();
    let result = discover_stage(&ctx, &args, &locations.cancel);
    ctx.record(Stage::Discovery, started_at, result)
}

fn discover_stage(
    ctx: &PipelineContext,
    args: &DiscoverArgs,
    cancel: &Cancellation,
) -> Result<StageOutcome> {
    let config = &ctx.config.discovery;
    // recomputed on every call; a closed gate is a successful no-op
    let gate = Gate::evaluate(config);
    if let Some(reason) = gate.skip_reason() {
        println!("discovery skipped: {reason}");
        return Ok(StageOutcome::message(format!("skipped: {reason}")));
    }

    let index_path = ctx.paths.evidence_index_path();
    let evidence: EvidenceIndex = load_json_optional(&index_path)?
        .ok_or_else(|| ctx.missing_input(Stage::Discovery, index_path.clone(), "evidence"))?;

    let command = resolve_provider_command(args.provider_command.as_deref(), config);
    let provider = provider_for(config, command, ctx.paths.root())?;
    let request = DiscoveryRequest {
        target_level: config.target_level,
        max_retries: config.max_retries,
        min_confidence: config.min_confidence,
        timeout: Duration::from_secs(config.timeout_secs),
        generated_at: ctx.now(),
    };
    let inputs_digest = discovery::inputs_digest(&evidence, &request, provider.name());

    let candidates_path = ctx.paths.candidates_path();
    if !args.force {
        if let Some(previous) = load_json_optional::<CandidateDocument>(&candidates_path)? {
            if previous.inputs_digest == inputs_digest {
                tracing::info!(digest = %inputs_digest, "discovery cache hit");
                println!(
                    "discovery: inputs unchanged, keeping {} candidates (use --force to rerun)",
                    previous.candidates.len()
                );
                return Ok(StageOutcome {
                    inputs_hash: Some(inputs_digest),
                    outputs_hash: Some(previous.digest()),
                    message: Some("cache hit".to_string()),
                });
            }
        }
    }

    let mut attempts = Vec::new();
    let run = discovery::discover(gate, &evidence, &request, provider.as_ref(), cancel, &mut attempts);
    append_attempts(&ctx.paths, &attempts)?;
    let document = match run? {
        DiscoveryRun::Completed(document) => document,
        DiscoveryRun::Skipped { reason } => {
            println!("discovery skipped: {reason}");
            return Ok(StageOutcome::message(format!("skipped: {reason}")));
        }
    };
    write_json(&candidates_path, &document)?;

    let summary = &document.summary;
    println!(
        "discovery: {} candidates after {} attempts ({} dropped below confidence, {} rejected, {} sensitive sections turned into open questions)",
        summary.accepted,
        summary.attempts,
        summary.dropped_low_confidence,
        summary.rejected.len(),
        summary.stripped_sensitive
    );
    for item in &summary.rejected {
        println!("  rejected item {}: {}", item.index, item.reasons.join("; "));
    }
    println!("wrote {}", candidates_path.display());
    Ok(StageOutcome {
        inputs_hash: Some(inputs_digest),
        outputs_hash: Some(document.digest()),
        message: None,
    })
}

pub fn run_confirm(locations: &Locations, args: ConfirmArgs) -> Result<()> {
    let ctx = locations.context()?;
    let started_at = workspace::now();
    let result = confirm_stage(&ctx, &args, &locations.cancel);
    ctx.record(Stage::Confirmation, started_at, result)
}

fn confirm_stage(
    ctx: &PipelineContext,
    args: &ConfirmArgs,
    cancel: &Cancellation,
) -> Result<StageOutcome> {
    let paths = &ctx.paths;
    let candidates_path = paths.candidates_path();
    let document: CandidateDocument = load_json_optional(&candidates_path)?
        .ok_or_else(|| ctx.missing_input(Stage::Confirmation, candidates_path.clone(), "discover"))?;
    let mut ledger = Ledger::load(paths)?;
    let review = ReviewContext {
        reviewer: args
            .reviewer
            .clone()
            .or_else(|| env::var("USER").ok())
            .unwrap_or_else(|| "unknown".to_string()),
        at: workspace::now(),
    };

    if args.checklist {
        let checklist_path = paths.checklist_path();
        let text = confirm::render_checklist(&document, &ledger);
        if let Some(parent) = checklist_path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&checklist_path, &text)
            .with_context(|| format!("write {}", checklist_path.display()))?;
        let pending = confirm::pending_count(&document, &ledger);
        println!("wrote {} ({pending} pending)", checklist_path.display());
        return Ok(StageOutcome {
            inputs_hash: Some(document.digest()),
            outputs_hash: Some(sha256_hex(text.as_bytes())),
            message: Some("checklist written".to_string()),
        });
    }

    let report = if args.ingest {
        let checklist_path = paths.checklist_path();
        let text = fs::read_to_string(&checklist_path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ctx.missing_input(Stage::Confirmation, checklist_path.clone(), "confirm --checklist")
            } else {
                PipelineError::Io {
                    stage: Stage::Confirmation,
                    path: checklist_path.clone(),
                    source,
                }
            }
        })?;
        confirm::ingest_checklist(paths, &document, &mut ledger, &text, &review, cancel)?
    } else if let (Some(candidate_id), Some(decision)) = (&args.revise, args.decision) {
        confirm::revise(paths, &document, &mut ledger, candidate_id, decision.into(), &review)?
    } else {
        let stdin = io::stdin();
        let stdout = io::stdout();
        confirm::review_interactive(
            paths,
            &document,
            &mut ledger,
            &review,
            cancel,
            &mut stdin.lock(),
            &mut stdout.lock(),
        )?
    };
    print_report(&report);
    Ok(StageOutcome {
        inputs_hash: Some(document.digest()),
        outputs_hash: Some(ledger_hash(paths)?),
        message: Some(format!(
            "{} recorded, {} pending, {} ledger entries",
            report.recorded.len(),
            report.pending,
            ledger.entry_count()
        )),
    })
}

fn print_report(report: &ConfirmReport) {
    for note in &report.recorded {
        println!(
            "recorded {} for {} {}",
            note.decision.as_str(),
            note.section,
            note.candidate_id
        );
    }
    for note in &report.already_decided {
        println!(
            "already {}: {} {}",
            note.decision.as_str(),
            note.section,
            note.candidate_id
        );
    }
    if report.stopped {
        println!("review stopped early");
    }
    println!("{} pending", report.pending);
}

pub fn run_build(locations: &Locations, args: BuildArgs) -> Result<()> {
    let ctx = locations.context()?;
    let started_at = workspace::now();
    let result = build_stage(&ctx, &args);
    ctx.record(Stage::Compile, started_at, result)
}

fn build_stage(ctx: &PipelineContext, args: &BuildArgs) -> Result<StageOutcome> {
    let paths = &ctx.paths;
    let ledger = Ledger::load(paths)?;
    let open_questions = load_json_optional::<CandidateDocument>(&paths.candidates_path())?
        .map(|document| document.open_questions)
        .unwrap_or_default();
    let level = match args.level {
        Some(number) => Level::try_from(number).map_err(|err| anyhow!(err))?,
        None => ctx.config.discovery.target_level,
    };
    let options = BuildOptions {
        packet_id: args.packet_id.clone(),
        title: args.title.clone(),
        level,
        open_questions,
    };
    let built = compile::build(&ledger, &options)?;
    for entry in &built.superseded {
        println!(
            "{}: {} superseded by {}",
            entry.section, entry.superseded, entry.winner
        );
    }

    let format = resolve_format(&args.write, args.out.as_deref(), &ctx.config);
    let dest = args
        .out
        .clone()
        .unwrap_or_else(|| paths.packet_path(&args.packet_id, format.extension()));
    let export_options = export_options(&args.write, &ctx.config, source_hashes(paths)?, ctx);
    let artifact = compile::export(&built.packet, format, &dest, &export_options)?;
    print_artifact(&artifact);
    Ok(StageOutcome {
        inputs_hash: Some(ledger_hash(paths)?),
        outputs_hash: Some(artifact.sha256),
        message: Some(format!("wrote {}", paths.rel_path(&artifact.path))),
    })
}

pub fn run_export(locations: &Locations, args: ExportArgs) -> Result<()> {
    let ctx = locations.context()?;
    let started_at = workspace::now();
    let result = export_stage(&ctx, &args);
    ctx.record(Stage::Export, started_at, result)
}

fn export_stage(ctx: &PipelineContext, args: &ExportArgs) -> Result<StageOutcome> {
    let bytes = fs::read(&args.packet).map_err(|source| PipelineError::Io {
        stage: Stage::Export,
        path: args.packet.clone(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    let packet = parse_document(&text, &args.packet, Stage::Export)?;
    let input_hash = sha256_hex(&bytes);
    let hashes = BTreeMap::from([(args.packet.display().to_string(), input_hash.clone())]);

    let format = resolve_format(&args.write, Some(&args.out), &ctx.config);
    let options = export_options(&args.write, &ctx.config, hashes, ctx);
    let artifact = compile::export(&packet, format, &args.out, &options)?;
    print_artifact(&artifact);
    Ok(StageOutcome {
        inputs_hash: Some(input_hash),
        outputs_hash: Some(artifact.sha256),
        message: Some(format!("wrote {}", artifact.path.display())),
    })
}

/// `--format`, then the destination extension, then `export.format`.
fn resolve_format(write: &WriteArgs, out: Option<&Path>, config: &PipelineConfig) -> ExportFormat {
    write
        .format
        .map(ExportFormat::from)
        .or_else(|| out.and_then(ExportFormat::from_path))
        .unwrap_or(config.export.format)
}

fn export_options(
    write: &WriteArgs,
    config: &PipelineConfig,
    source_hashes: BTreeMap<String, String>,
    ctx: &PipelineContext,
) -> ExportOptions {
    ExportOptions {
        versioning: config.export.versioning && !write.no_versioning,
        skip_validation: write.skip_validation || config.export.skip_validation,
        warn_on_invalid: write.warn_on_invalid || config.export.warn_on_invalid,
        force: write.force,
        source_hashes,
        packaged_at: ctx.now(),
    }
}

fn print_artifact(artifact: &WrittenArtifact) {
    println!(
        "wrote {} ({} bytes, sha256 {}, validation {:?})",
        artifact.path.display(),
        artifact.bytes,
        artifact.sha256,
        artifact.packaging.validation.status
    );
    if artifact.versioned {
        println!("destination existed; wrote a versioned copy");
    }
}

/// SHA-256 of each pipeline input that exists, keyed by workspace path.
fn source_hashes(paths: &WorkspacePaths) -> Result<BTreeMap<String, String>> {
    let mut hashes = BTreeMap::new();
    for path in [
        paths.candidates_path(),
        paths.confirmed_log_path(),
        paths.rejected_log_path(),
    ] {
        if !path.is_file() {
            continue;
        }
        let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        hashes.insert(paths.rel_path(&path), sha256_hex(&bytes));
    }
    Ok(hashes)
}

fn ledger_hash(paths: &WorkspacePaths) -> Result<String> {
    let mut digester = Digester::new("ipack-ledger-v1");
    for path in [paths.confirmed_log_path(), paths.rejected_log_path()] {
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
        };
        digester.update(&bytes);
    }
    Ok(digester.finish())
}

fn config_hash(config: &PipelineConfig) -> String {
    sha256_hex(&serde_json::to_vec(config).unwrap_or_default())
}

pub fn run_validate(args: ValidateArgs) -> Result<()> {
    let text = fs::read_to_string(&args.file).map_err(|source| PipelineError::Io {
        stage: Stage::Validate,
        path: args.file.clone(),
        source,
    })?;
    let document: Value = parse_document(&text, &args.file, Stage::Validate)?;
    let level = match args.level {
        Some(number) => Level::try_from(number).map_err(|err| anyhow!(err))?,
        None => declared_level(&document),
    };
    let result = validate(&document, level);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.valid {
        println!(
            "{}: valid at level {} ({} warnings)",
            args.file.display(),
            level,
            result.warning_count()
        );
        for issue in &result.errors {
            println!("  {issue}");
        }
    }
    if !result.valid {
        return Err(PipelineError::Invalid {
            stage: Stage::Validate,
            result,
        }
        .into());
    }
    Ok(())
}

pub fn run_status(locations: &Locations, args: StatusArgs) -> Result<()> {
    let ctx = locations.context()?;
    let summary = status::build_status_summary(&ctx)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", status::render_status(&summary));
    }
    Ok(())
}

/// Render a failed command to stderr: stage, every issue, and remediation.
pub fn report_failure(err: &anyhow::Error) {
    let Some(pipeline) = err.downcast_ref::<PipelineError>() else {
        eprintln!("error: {err:#}");
        return;
    };
    eprintln!("error: {} stage failed", pipeline.stage());
    eprintln!("  {err:#}");
    for issue in pipeline.issues() {
        eprintln!("  - {issue}");
    }
    if let Some(remediation) = pipeline.remediation() {
        eprintln!("remediation: {remediation}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::packet_for_level;

    fn locations(repo: &Path) -> Locations {
        Locations {
            repo: repo.to_path_buf(),
            workspace: None,
            cancel: Cancellation::new(),
        }
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let repo = tempfile::tempdir().expect("tempdir");
        let locations = locations(repo.path());
        run_init(&locations, InitArgs { force: false }).expect("first init");
        let err = run_init(&locations, InitArgs { force: false }).expect_err("second init");
        assert!(err.to_string().contains("--force"));
        run_init(&locations, InitArgs { force: true }).expect("forced init");
    }

    #[test]
    fn evidence_rerun_keeps_the_index_byte_identical() {
        let repo = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(repo.path().join("src")).expect("mkdir");
        fs::write(
            repo.path().join("src/app.js"),
            "app.get('/jobs/:id/status', requireAuth, handler);\n",
        )
        .expect("write source");
        let locations = locations(repo.path());
        run_init(&locations, InitArgs { force: false }).expect("init");
        run_evidence(&locations, EvidenceArgs {}).expect("first scan");
        let ctx = locations.context().expect("context");
        let first = fs::read(ctx.paths.evidence_index_path()).expect("read index");

        run_evidence(&locations, EvidenceArgs {}).expect("second scan");
        let second = fs::read(ctx.paths.evidence_index_path()).expect("read index");
        assert_eq!(first, second);

        let index: EvidenceIndex = serde_json::from_slice(&second).expect("parse index");
        assert!(index.contains_path("src/app.js"));
        // the workspace itself is never scanned
        assert!(index
            .body
            .files
            .iter()
            .all(|file| !file.path.starts_with(".ipack")));
    }

    #[test]
    fn cancelled_evidence_run_fails_and_is_recorded() {
        let repo = tempfile::tempdir().expect("tempdir");
        fs::write(repo.path().join("README.md"), "# Jobs\n").expect("write readme");
        let locations = locations(repo.path());
        run_init(&locations, InitArgs { force: false }).expect("init");
        locations.cancel.cancel();

        let err = run_evidence(&locations, EvidenceArgs {}).expect_err("cancelled scan");
        let pipeline = err.downcast_ref::<PipelineError>().expect("pipeline error");
        assert!(matches!(
            pipeline,
            PipelineError::Cancelled {
                stage: Stage::Evidence
            }
        ));
        let ctx = locations.context().expect("context");
        assert!(!ctx.paths.evidence_index_path().exists());
        let history = workspace::load_history(&ctx.paths).expect("history");
        assert!(!history.last().expect("entry").success);
    }

    #[test]
    fn closed_gate_is_a_recorded_success() {
        let repo = tempfile::tempdir().expect("tempdir");
        let locations = locations(repo.path());
        run_init(&locations, InitArgs { force: false }).expect("init");
        run_discover(
            &locations,
            DiscoverArgs {
                provider_command: None,
                force: false,
            },
        )
        .expect("gate skip");
        let ctx = locations.context().expect("context");
        assert!(!ctx.paths.candidates_path().exists());
        let history = workspace::load_history(&ctx.paths).expect("history");
        let last = history.last().expect("entry");
        assert!(last.success);
        assert!(last
            .message
            .as_deref()
            .is_some_and(|message| message.starts_with("skipped")));
    }

    #[test]
    fn format_follows_flag_then_extension_then_config() {
        let config = default_config();
        let mut write = WriteArgs::default();
        assert_eq!(resolve_format(&write, None, &config), ExportFormat::Json);
        assert_eq!(
            resolve_format(&write, Some(Path::new("p.yml")), &config),
            ExportFormat::Yaml
        );
        write.format = Some(crate::cli::FormatArg::Json);
        assert_eq!(
            resolve_format(&write, Some(Path::new("p.yml")), &config),
            ExportFormat::Json
        );
    }

    #[test]
    fn validate_command_fails_on_invalid_packets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("packet.json");
        let mut packet = packet_for_level(Level::One);
        write_json(&path, &packet).expect("write packet");
        run_validate(ValidateArgs {
            file: path.clone(),
            level: None,
            json: false,
        })
        .expect("valid packet");

        if let Some(obj) = packet.as_object_mut() {
            obj.remove("purpose");
        }
        write_json(&path, &packet).expect("write packet");
        let err = run_validate(ValidateArgs {
            file: path,
            level: None,
            json: true,
        })
        .expect_err("invalid packet");
        let err = err.downcast_ref::<PipelineError>().expect("pipeline error");
        assert_eq!(err.stage(), Stage::Validate);
        assert!(err.issues().iter().any(|issue| issue.contains("$.purpose")));
    }
}
