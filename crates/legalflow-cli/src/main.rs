//! LegalFlow Ops CLI
//!
//! The `legalflow` command runs the operational engine against the hosted
//! LegalFlow backend.
//!
//! ## Commands
//!
//! - `audit`: Check every module's tables and report health
//! - `autofix`: Apply a corrective patch by code (or `--list` them)
//! - `history` / `stats`: Read the modification history
//! - `prompt`: Send a code-generation prompt to Builder.io
//! - `schema-check`: Compare column values against known enumerations
//! - `import`: Record a git import in the history
//! - `notice`: Create an activity and announce it in a chat thread

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use legalflow_core::{
    catalogue, ActivityNotices, AuditResult, AuditRunner, AuditTrailPolicy, AutofixDispatcher,
    AutofixResult, BuilderConfig, BuilderPromptExecutor, BuilderPromptRequest,
    BuilderPromptResponse, ColumnStatus, GitImport, HistoryQuery, HistoryRecorder,
    ModificationEntry, ModificationType, NewActivity, PromptCategory, PromptPriority,
    ResponseSource, SchemaValidationReport, SchemaValidator, SystemStats, DEFAULT_HISTORY_LIMIT,
    METRICS,
};
use legalflow_gateway::{DataGateway, RestGateway};
use serde::Serialize;
use tracing::{info, Level};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "legalflow")]
#[command(author = "LegalFlow Engineering")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "LegalFlow Ops: audit, autofix and modification history", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Format of command output on stdout
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CategoryArg {
    BugFix,
    Feature,
    Improvement,
    Refactor,
}

impl From<CategoryArg> for PromptCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::BugFix => PromptCategory::BugFix,
            CategoryArg::Feature => PromptCategory::Feature,
            CategoryArg::Improvement => PromptCategory::Improvement,
            CategoryArg::Refactor => PromptCategory::Refactor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PriorityArg {
    Low,
    Medium,
    High,
}

impl From<PriorityArg> for PromptPriority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => PromptPriority::Low,
            PriorityArg::Medium => PromptPriority::Medium,
            PriorityArg::High => PromptPriority::High,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the module health audit
    Audit,

    /// Apply a corrective patch
    Autofix {
        /// Patch code (e.g. API_SEED, journey_triggers_fix)
        #[arg(required_unless_present = "list")]
        code: Option<String>,

        /// List the available patch codes
        #[arg(long, conflicts_with = "code")]
        list: bool,
    },

    /// Show the modification history (newest first)
    History {
        /// Maximum number of entries
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,

        /// Entries to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Only entries for this module
        #[arg(short, long)]
        module: Option<String>,

        /// Only entries of this type (autofix, manual, builder_prompt, git_import)
        #[arg(short = 't', long = "type")]
        kind: Option<ModificationType>,
    },

    /// Aggregate counts over the modification history
    Stats,

    /// Send a code-generation prompt
    Prompt {
        /// What should be changed
        text: String,

        #[arg(short, long, value_enum, default_value_t = CategoryArg::Improvement)]
        category: CategoryArg,

        #[arg(short, long, value_enum, default_value_t = PriorityArg::Medium)]
        priority: PriorityArg,

        /// Free-form context for the generator
        #[arg(long, default_value = "")]
        context: String,

        /// File expected to change (repeatable)
        #[arg(long = "expected-file")]
        expected_files: Vec<String>,
    },

    /// Compare sampled column values against known enumerations
    SchemaCheck,

    /// Record a git import in the history
    Import {
        /// Repository identifier (e.g. org/repo)
        #[arg(long)]
        repository: String,

        #[arg(long, default_value = "main")]
        branch: String,

        /// Imported commit SHA (repeatable)
        #[arg(long = "commit", required = true)]
        commits: Vec<String>,

        /// Changed file path (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,
    },

    /// Create an activity and post a system notice in a chat thread
    Notice {
        /// Conversation thread id
        #[arg(long)]
        thread: Uuid,

        /// Activity title
        #[arg(long)]
        title: String,

        /// CNJ number of the related case
        #[arg(long)]
        case: Option<String>,

        /// Notice text posted to the thread
        message: String,
    },
}

/// Shared handles built once per invocation.
struct Engine {
    gateway: Arc<dyn DataGateway>,
    history: HistoryRecorder,
    policy: AuditTrailPolicy,
}

impl Engine {
    fn from_env() -> Result<Self> {
        let gateway: Arc<dyn DataGateway> = Arc::new(
            RestGateway::from_env().context("Failed to configure the LegalFlow database gateway")?,
        );
        let policy = AuditTrailPolicy::from_env().context("Invalid audit trail policy")?;
        Ok(Self::new(gateway, policy))
    }

    fn new(gateway: Arc<dyn DataGateway>, policy: AuditTrailPolicy) -> Self {
        let history = HistoryRecorder::new(gateway.clone());
        Self {
            gateway,
            history,
            policy,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    legalflow_core::init_tracing(cli.json, level);

    let outcome = run(cli.command, cli.output).await;
    METRICS.flush();
    outcome
}

async fn run(command: Commands, output: OutputFormat) -> Result<()> {
    if let Commands::Autofix { list: true, .. } = command {
        return cmd_autofix_list(output);
    }

    let engine = Engine::from_env()?;
    match command {
        Commands::Audit => cmd_audit(&engine, output).await,
        Commands::Autofix { code, .. } => {
            let code = code.context("a patch code is required")?;
            cmd_autofix(&engine, &code, output).await
        }
        Commands::History {
            limit,
            offset,
            module,
            kind,
        } => {
            let query = HistoryQuery {
                limit,
                offset,
                module,
                kind,
            };
            cmd_history(&engine, &query, output).await
        }
        Commands::Stats => cmd_stats(&engine, output).await,
        Commands::Prompt {
            text,
            category,
            priority,
            context,
            expected_files,
        } => {
            let mut request = BuilderPromptRequest::new(text, category.into())
                .with_priority(priority.into())
                .with_context(context);
            if !expected_files.is_empty() {
                request = request.with_expected_files(expected_files);
            }
            cmd_prompt(&engine, &request, output).await
        }
        Commands::SchemaCheck => cmd_schema_check(&engine, output).await,
        Commands::Import {
            repository,
            branch,
            commits,
            files,
        } => {
            let import = GitImport {
                repository,
                branch,
                commits,
                files_changed: files,
            };
            cmd_import(&engine, &import, output).await
        }
        Commands::Notice {
            thread,
            title,
            case,
            message,
        } => {
            let mut activity = NewActivity::new(title);
            if let Some(case) = case {
                activity = activity.with_case(case);
            }
            cmd_notice(&engine, &activity, thread, &message, output).await
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ========== Audit / Autofix ==========

async fn cmd_audit(engine: &Engine, output: OutputFormat) -> Result<()> {
    let runner = AuditRunner::new(engine.gateway.clone(), engine.history.clone())
        .with_policy(engine.policy);
    let result = runner.run_audit().await.context("Audit failed")?;
    info!(digest = %result.digest(), "audit complete");

    match output {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Text => {
            print!("{}", render_audit(&result));
            Ok(())
        }
    }
}

fn render_audit(result: &AuditResult) -> String {
    let mut out = String::new();
    for (module, report) in &result.modules {
        out.push_str(&format!("{:<12} {}\n", module, report.status));
        for check in &report.checks {
            out.push_str(&format!(
                "  [{:<7}] {} ({})",
                check.status.as_str(),
                check.name,
                check.id
            ));
            if let Some(details) = &check.details {
                out.push_str(&format!(": {details}"));
            }
            out.push('\n');
        }
    }
    let (ok, error, pending) = result.tally();
    out.push_str(&format!(
        "\n{ok} ok, {error} error, {pending} pending  digest {}\n",
        &result.digest()[..12]
    ));
    out
}

fn cmd_autofix_list(output: OutputFormat) -> Result<()> {
    let entries = catalogue();
    match output {
        OutputFormat::Json => {
            let listed: Vec<serde_json::Value> = entries
                .iter()
                .map(|(code, description)| {
                    serde_json::json!({
                        "code": code.as_str(),
                        "module": code.module(),
                        "description": description,
                    })
                })
                .collect();
            print_json(&listed)
        }
        OutputFormat::Text => {
            for (code, description) in entries {
                println!("{:<24} {:<12} {}", code.as_str(), code.module(), description);
            }
            Ok(())
        }
    }
}

async fn cmd_autofix(engine: &Engine, code: &str, output: OutputFormat) -> Result<()> {
    let dispatcher = AutofixDispatcher::new(engine.gateway.clone(), engine.history.clone())
        .with_policy(engine.policy);
    let result = dispatcher
        .run_autofix(code)
        .await
        .with_context(|| format!("Autofix {code} aborted"))?;

    match output {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print!("{}", render_autofix(&result)),
    }
    if !result.success {
        bail!("patch {code} did not succeed");
    }
    Ok(())
}

fn render_autofix(result: &AutofixResult) -> String {
    let mut out = format!(
        "{} {}\n",
        if result.success { "OK " } else { "ERR" },
        result.message
    );
    for change in &result.changes {
        out.push_str(&format!("  + {change}\n"));
    }
    for error in &result.errors {
        out.push_str(&format!("  ! {error}\n"));
    }
    out
}

// ========== History ==========

async fn cmd_history(engine: &Engine, query: &HistoryQuery, output: OutputFormat) -> Result<()> {
    let entries = engine
        .history
        .get_modification_history(query)
        .await
        .context("Failed to read modification history")?;

    match output {
        OutputFormat::Json => print_json(&entries),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No modifications recorded");
            } else {
                print!("{}", render_history(&entries));
            }
            Ok(())
        }
    }
}

fn render_history(entries: &[ModificationEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!(
            "{} {} {:<14} {:<12} {}\n",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            if entry.success { "ok " } else { "err" },
            entry.kind.as_str(),
            entry.module,
            entry.description
        ));
    }
    out
}

async fn cmd_stats(engine: &Engine, output: OutputFormat) -> Result<()> {
    let stats = engine
        .history
        .get_system_stats()
        .await
        .context("Failed to compute history statistics")?;

    match output {
        OutputFormat::Json => print_json(&stats),
        OutputFormat::Text => {
            print!("{}", render_stats(&stats));
            Ok(())
        }
    }
}

fn render_stats(stats: &SystemStats) -> String {
    let mut out = format!(
        "total {}  successful {}  failed {}\n",
        stats.total_modifications, stats.successful, stats.failed
    );
    if let Some(rate) = stats.success_rate() {
        out.push_str(&format!("success rate {:.1}%\n", rate * 100.0));
    }
    if let Some(last) = stats.last_modification {
        out.push_str(&format!("last modification {}\n", last.to_rfc3339()));
    }
    for (kind, count) in &stats.by_type {
        out.push_str(&format!("  type   {:<14} {count}\n", kind.as_str()));
    }
    for (module, count) in &stats.by_module {
        out.push_str(&format!("  module {:<14} {count}\n", module));
    }
    out
}

async fn cmd_import(engine: &Engine, import: &GitImport, output: OutputFormat) -> Result<()> {
    let id = engine
        .history
        .record_git_import(import)
        .await
        .context("Failed to record git import")?;
    match output {
        OutputFormat::Json => print_json(&serde_json::json!({ "id": id })),
        OutputFormat::Text => {
            println!(
                "Recorded import of {} commit(s) as {id}",
                import.commits.len()
            );
            Ok(())
        }
    }
}

// ========== Builder / Schema / Notices ==========

async fn cmd_prompt(
    engine: &Engine,
    request: &BuilderPromptRequest,
    output: OutputFormat,
) -> Result<()> {
    let config = BuilderConfig::from_env().context("Invalid Builder.io configuration")?;
    let executor = BuilderPromptExecutor::new(config, engine.history.clone())?
        .with_policy(engine.policy);
    let response = executor.execute_builder_prompt(request).await;

    match output {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Text => {
            print!("{}", render_prompt(&response));
            Ok(())
        }
    }
}

fn render_prompt(response: &BuilderPromptResponse) -> String {
    let mut out = format!("{} {:?} ({})\n", response.id, response.status, response.source.label());
    if let ResponseSource::Simulated { reason } = &response.source {
        out.push_str(&format!("  simulated: {reason}\n"));
    }
    if let Some(result) = &response.result {
        out.push_str(&format!("  {}\n", result.summary));
        for change in &result.modifications {
            out.push_str(&format!("  + {change}\n"));
        }
        for file in &result.files_changed {
            out.push_str(&format!("  ~ {file}\n"));
        }
    }
    if let Some(error) = &response.error {
        out.push_str(&format!("  ! {error}\n"));
    }
    out
}

async fn cmd_schema_check(engine: &Engine, output: OutputFormat) -> Result<()> {
    let report = SchemaValidator::new(engine.gateway.clone())
        .validate_schema()
        .await;

    match output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            print!("{}", render_schema(&report));
            Ok(())
        }
    }
}

fn render_schema(report: &SchemaValidationReport) -> String {
    let mut out = String::new();
    for check in &report.checks {
        out.push_str(&format!(
            "{:<11} {}.{} ({} sampled)",
            check.status.as_str(),
            check.table,
            check.column,
            check.sampled
        ));
        match check.status {
            ColumnStatus::Mismatch => {
                let values: Vec<&str> = check.unexpected.iter().map(String::as_str).collect();
                out.push_str(&format!(": unexpected {}", values.join(", ")));
            }
            ColumnStatus::Unavailable => {
                if let Some(details) = &check.details {
                    out.push_str(&format!(": {details}"));
                }
            }
            ColumnStatus::Valid => {}
        }
        out.push('\n');
    }
    out
}

async fn cmd_notice(
    engine: &Engine,
    activity: &NewActivity,
    thread: Uuid,
    message: &str,
    output: OutputFormat,
) -> Result<()> {
    let notices = ActivityNotices::new(engine.gateway.clone());
    let posted = notices
        .post_activity_with_notice(activity, thread, message)
        .await
        .context("Failed to post activity notice")?;

    match output {
        OutputFormat::Json => print_json(&posted),
        OutputFormat::Text => {
            println!(
                "Activity {} posted to thread {thread} (message {})",
                posted.activity_id, posted.message_id
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legalflow_core::{
        CheckResult, CheckStatus, ColumnCheck, ModuleReport, NewModification, HISTORY_TABLE,
    };
    use legalflow_gateway::MemoryGateway;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn engine(gw: &MemoryGateway) -> Engine {
        Engine::new(Arc::new(gw.clone()), AuditTrailPolicy::default())
    }

    #[test]
    fn parses_history_filters() {
        let cli = Cli::try_parse_from([
            "legalflow", "history", "--limit", "5", "--type", "git_import", "-m", "git",
        ])
        .unwrap();
        match cli.command {
            Commands::History {
                limit, kind, module, ..
            } => {
                assert_eq!(limit, 5);
                assert_eq!(kind, Some(ModificationType::GitImport));
                assert_eq!(module.as_deref(), Some("git"));
            }
            _ => panic!("expected history command"),
        }
    }

    #[test]
    fn rejects_unknown_history_type() {
        assert!(Cli::try_parse_from(["legalflow", "history", "--type", "chat"]).is_err());
    }

    #[test]
    fn autofix_needs_code_or_list() {
        assert!(Cli::try_parse_from(["legalflow", "autofix"]).is_err());
        assert!(Cli::try_parse_from(["legalflow", "autofix", "--list"]).is_ok());
        assert!(Cli::try_parse_from(["legalflow", "autofix", "API_SEED", "--list"]).is_err());
    }

    #[test]
    fn prompt_defaults_and_global_output() {
        let cli = Cli::try_parse_from([
            "legalflow",
            "prompt",
            "Adicionar exportação CSV",
            "--category",
            "bug-fix",
            "--expected-file",
            "client/pages/Deals.tsx",
            "--output",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Prompt {
                category,
                priority,
                expected_files,
                ..
            } => {
                assert_eq!(PromptCategory::from(category), PromptCategory::BugFix);
                assert_eq!(PromptPriority::from(priority), PromptPriority::Medium);
                assert_eq!(expected_files, vec!["client/pages/Deals.tsx".to_string()]);
            }
            _ => panic!("expected prompt command"),
        }
    }

    #[test]
    fn import_requires_a_commit() {
        assert!(Cli::try_parse_from(["legalflow", "import", "--repository", "org/repo"]).is_err());
    }

    #[test]
    fn audit_text_lists_modules_and_details() {
        let mut result = AuditResult::default();
        result.insert(
            "crm",
            ModuleReport::from_checks(vec![CheckResult {
                id: "contacts_table".to_string(),
                name: "Contatos".to_string(),
                status: CheckStatus::Error,
                details: Some("Nenhum registro".to_string()),
            }]),
        );
        let text = render_audit(&result);
        assert!(text.starts_with("crm          error\n"));
        assert!(text.contains("Contatos (contacts_table): Nenhum registro"));
        assert!(text.contains("0 ok, 1 error, 0 pending"));
    }

    #[test]
    fn autofix_text_marks_failures() {
        let text = render_autofix(&AutofixResult::not_found("NOPE"));
        assert_eq!(
            text,
            "ERR Patch não encontrado\n  ! Unknown patch code: NOPE\n"
        );
    }

    #[test]
    fn history_text_has_one_line_per_entry() {
        let entry = NewModification::new(ModificationType::Manual, "audit", "Auditoria")
            .into_entry();
        let text = render_history(&[entry.clone(), entry]);
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("manual"));
    }

    #[test]
    fn schema_text_lists_unexpected_values() {
        let report = SchemaValidationReport {
            checks: vec![ColumnCheck {
                table: "legalflow.deals".to_string(),
                column: "stage".to_string(),
                status: ColumnStatus::Mismatch,
                sampled: 4,
                unexpected: BTreeSet::from(["ganho".to_string()]),
                details: None,
            }],
        };
        assert_eq!(
            render_schema(&report),
            "mismatch    legalflow.deals.stage (4 sampled): unexpected ganho\n"
        );
    }

    #[tokio::test]
    async fn unknown_patch_fails_the_command_without_writes() {
        let gw = MemoryGateway::new();
        gw.create_table(HISTORY_TABLE);

        let err = cmd_autofix(&engine(&gw), "NOPE", OutputFormat::Text)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("NOPE"));
        assert!(gw.calls().is_empty());
    }

    #[tokio::test]
    async fn placeholder_patch_succeeds_and_is_logged() {
        let gw = MemoryGateway::new();
        gw.create_table(HISTORY_TABLE);

        cmd_autofix(&engine(&gw), "rls_basic_setup", OutputFormat::Json)
            .await
            .unwrap();
        assert_eq!(gw.rows(HISTORY_TABLE).len(), 2);
    }

    #[tokio::test]
    async fn import_then_history_round_trip() {
        let gw = MemoryGateway::new();
        gw.create_table(HISTORY_TABLE);
        let engine = engine(&gw);

        let import = GitImport {
            repository: "legalflow/app".to_string(),
            branch: "main".to_string(),
            commits: vec!["a1b2c3".to_string()],
            files_changed: vec!["client/App.tsx".to_string()],
        };
        cmd_import(&engine, &import, OutputFormat::Text).await.unwrap();

        let query = HistoryQuery::default().kind(ModificationType::GitImport);
        cmd_history(&engine, &query, OutputFormat::Text).await.unwrap();
        cmd_stats(&engine, OutputFormat::Json).await.unwrap();

        let rows = gw.rows(HISTORY_TABLE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["module"], "git");
    }

    #[tokio::test]
    async fn history_without_tables_reports_setup_hint() {
        let gw = MemoryGateway::new();

        let err = cmd_history(&engine(&gw), &HistoryQuery::default(), OutputFormat::Text)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Database tables not found"));
    }

    #[tokio::test]
    async fn audit_runs_against_empty_backend() {
        let gw = MemoryGateway::new();
        gw.create_table(HISTORY_TABLE);

        cmd_audit(&engine(&gw), OutputFormat::Text).await.unwrap();
        assert_eq!(gw.rows(HISTORY_TABLE).len(), 1);
    }
}
