//! sqlchat binary - composition root and terminal chat loop.
//!
//! 1. Load configuration from TOML
//! 2. Open the local state store (SQLite, or memory with `--in-memory`)
//! 3. Build the HTTP backend and the query orchestrator
//! 4. Read questions and commands from stdin; pipeline runs execute on a
//!    background task so `/cancel` stays responsive

mod cli;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use sqlchat_chat::response::summarize_rows;
use sqlchat_chat::{
    filter_tables, ApproveOutcome, Attachment, ChatError, DemoQuestions, KpiDisplay, Message,
    MetricRules, PipelinePhase, QueryOrchestrator, Role, RunOutcome,
};
use sqlchat_client::HttpBackend;
use sqlchat_core::{Currency, KeyValueStore, MemoryStore, Region, SqlChatConfig, StageBucket};
use sqlchat_storage::SqliteStore;

use cli::CliArgs;

const HELP: &str = "\
Type a question to ask it. Commands:
  /stage <1-7|value>   choose the stage scope for the pending question
  /cancel              cancel the running or pending question
  /new                 start a new chat
  /sessions            list chats
  /switch <n>          switch to chat n
  /rename <name>       rename the current chat
  /clear               delete all chats
  /region <GBR|CAN>    change region (currency follows)
  /tables [filter]     list available tables
  /scope <table>       toggle a table in or out of scope
  /kpi                 refresh the KPI strip
  /csv [path]          export the latest result as CSV
  /approve             save the latest answer as an approved example
  /demo                ask the next demo question
  /recent              show recent questions
  /rules [text]        show or save metric rules
  /debug               print the latest request and response
  /quit                exit";

/// Terminal front-end state.
struct App {
    orch: Arc<QueryOrchestrator>,
    rules: MetricRules,
    demo: DemoQuestions,
    running: Option<JoinHandle<()>>,
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn render_message(msg: &Message, currency: Currency) -> String {
    let who = match msg.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    match &msg.attachment {
        Some(Attachment::BarChart(chart)) | Some(Attachment::LineChart(chart)) => {
            let mut out = format!("{}: {}", who, msg.content);
            for (idx, label) in chart.labels.iter().enumerate() {
                let values: Vec<String> = chart
                    .series
                    .iter()
                    .map(|s| format!("{}={}", s.name, s.values.get(idx).copied().unwrap_or(0.0)))
                    .collect();
                out.push_str(&format!("\n  {:<24} {}", label, values.join("  ")));
            }
            out
        }
        Some(Attachment::Table(table)) => format!(
            "{}: [table]\n{}",
            who,
            summarize_rows(&table.columns, &table.rows, currency)
        ),
        Some(Attachment::StagePrompt(options)) => {
            let mut out = format!("{}: {}", who, msg.content);
            for (idx, opt) in options.iter().enumerate() {
                out.push_str(&format!("\n  {}. {} ({})", idx + 1, opt.label, opt.value));
            }
            out
        }
        None => format!("{}: {}", who, msg.content),
    }
}

fn print_session(orch: &QueryOrchestrator) {
    let currency = orch.context().currency;
    if let Some(session) = orch.active_session() {
        println!("== {} ==", session.name);
        for msg in &session.messages {
            println!("{}", render_message(msg, currency));
        }
    }
}

fn print_last_message(orch: &QueryOrchestrator) {
    let currency = orch.context().currency;
    if let Some(msg) = orch.active_session().and_then(|s| s.messages.last().cloned()) {
        println!("{}", render_message(&msg, currency));
    }
}

/// A 1-based option number or a stage value.
fn parse_stage(arg: &str) -> Option<StageBucket> {
    if let Ok(n) = arg.trim().parse::<usize>() {
        return n
            .checked_sub(1)
            .and_then(|i| StageBucket::ALL.get(i))
            .copied();
    }
    arg.parse().ok()
}

/// Run the pending question under `stage`, then refresh the KPI strip for
/// the stage that is now in effect.
async fn resolve_and_refresh(
    orch: &QueryOrchestrator,
    stage: StageBucket,
) -> Result<(RunOutcome, KpiDisplay), ChatError> {
    let outcome = orch.resolve_stage(stage).await?;
    let kpis = orch.refresh_kpis().await;
    Ok((outcome, kpis))
}

impl App {
    fn submit(&mut self, question: &str) -> Result<(), ChatError> {
        self.orch.submit(question)?;
        print_last_message(&self.orch);
        Ok(())
    }

    fn resolve(&mut self, stage: StageBucket) {
        let orch = Arc::clone(&self.orch);
        self.running = Some(tokio::spawn(async move {
            let kpis = match resolve_and_refresh(&orch, stage).await {
                Ok((outcome, kpis)) => {
                    match outcome {
                        RunOutcome::Completed {
                            elapsed_ms, lint, ..
                        } => {
                            print_last_message(&orch);
                            println!("({} ms)", elapsed_ms);
                            for issue in lint {
                                println!("  sql lint: {}", issue);
                            }
                        }
                        RunOutcome::Failed { .. } => print_last_message(&orch),
                        RunOutcome::Cancelled => println!("Cancelled"),
                        RunOutcome::Superseded => {
                            tracing::debug!("Superseded run finished");
                            return;
                        }
                    }
                    kpis
                }
                Err(e) => {
                    println!("{}", e);
                    prompt();
                    return;
                }
            };
            println!("{}", kpis);
            prompt();
        }));
        println!("Running...");
    }

    /// Handle one input line. Returns `false` to exit.
    async fn handle(&mut self, line: &str) -> Result<bool, ChatError> {
        let (cmd, arg) = match line.strip_prefix('/') {
            Some(rest) => {
                let mut parts = rest.splitn(2, ' ');
                let cmd = parts.next().unwrap_or_default();
                (cmd, parts.next().unwrap_or_default().trim())
            }
            None => {
                // A bare option number answers a pending stage prompt.
                if self.orch.phase() == PipelinePhase::AwaitingStageConfirmation {
                    if let Some(stage) = line.parse::<usize>().ok().and_then(|_| parse_stage(line)) {
                        self.resolve(stage);
                        return Ok(true);
                    }
                }
                self.submit(line)?;
                return Ok(true);
            }
        };

        match cmd {
            "help" | "h" => println!("{}", HELP),
            "quit" | "exit" | "q" => return Ok(false),
            "stage" => match parse_stage(arg) {
                Some(stage) => self.resolve(stage),
                None => println!("Unknown stage: {}", arg),
            },
            "cancel" => {
                if !self.orch.cancel() {
                    println!("Nothing to cancel");
                }
            }
            "new" => {
                self.orch.new_session()?;
                print_session(&self.orch);
            }
            "sessions" => {
                for (idx, s) in self.orch.summaries().iter().enumerate() {
                    let marker = if s.active { "*" } else { " " };
                    println!("{} {}. {} - {}", marker, idx + 1, s.name, s.preview);
                }
            }
            "switch" => {
                let summaries = self.orch.summaries();
                match arg.parse::<usize>().ok().and_then(|n| summaries.get(n.checked_sub(1)?)) {
                    Some(s) => {
                        self.orch.activate(s.id)?;
                        print_session(&self.orch);
                    }
                    None => println!("No such chat: {}", arg),
                }
            }
            "rename" => {
                if let Some(session) = self.orch.active_session() {
                    self.orch.rename(session.id, arg)?;
                }
            }
            "clear" => {
                self.orch.clear_all()?;
                println!("All chats deleted");
            }
            "region" => match arg.parse::<Region>() {
                Ok(region) => {
                    let ctx = self.orch.set_region(region)?;
                    println!("Region {} ({})", ctx.region.label(), ctx.currency);
                    println!("{}", self.orch.refresh_kpis().await);
                }
                Err(e) => println!("{}", e),
            },
            "tables" => {
                let tables = self.orch.list_tables().await;
                let selected = self.orch.selected_tables();
                for name in filter_tables(&tables, arg) {
                    let mark = if selected.iter().any(|t| t == name) { "x" } else { " " };
                    println!("[{}] {}", mark, name);
                }
            }
            "scope" => {
                if arg.is_empty() {
                    println!("{}", self.orch.selected_tables().join("\n"));
                } else {
                    let on = self.orch.toggle_table(arg)?;
                    println!("{} {}", if on { "Added" } else { "Removed" }, arg);
                }
            }
            "kpi" => println!("{}", self.orch.refresh_kpis().await),
            "csv" => match self.orch.export_csv() {
                Some(csv) => {
                    let path = if arg.is_empty() {
                        PathBuf::from(format!("results_{}.csv", chrono::Utc::now().timestamp_millis()))
                    } else {
                        PathBuf::from(arg)
                    };
                    match std::fs::write(&path, csv) {
                        Ok(()) => println!("Wrote {}", path.display()),
                        Err(e) => println!("Failed to write {}: {}", path.display(), e),
                    }
                }
                None => println!("No results to export"),
            },
            "approve" => match self.orch.approve_latest().await {
                Ok(ApproveOutcome::Saved { id }) => println!("Saved as #{}", id),
                Ok(ApproveOutcome::NothingToApprove) => println!("Nothing to approve"),
                Err(e) => println!("Save failed: {}", e),
            },
            "demo" => {
                let question = self.demo.next_question();
                self.submit(question)?;
            }
            "recent" => {
                for q in self.orch.recents() {
                    println!("- {}", q);
                }
            }
            "rules" => {
                if arg.is_empty() {
                    println!("{}", self.rules.load().unwrap_or_default());
                } else {
                    self.rules.save(arg)?;
                    println!("Metric rules saved");
                }
            }
            "debug" => match self.orch.debug_bundle() {
                Some(bundle) => println!("{}", bundle),
                None => println!("No response yet"),
            },
            other => println!("Unknown command: /{} (try /help)", other),
        }
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = SqlChatConfig::load_or_default(&config_file);
    config.backend.base_url = args.resolve_base_url(&config);

    // Tracing. Logs go to stderr so they do not interleave with the chat.
    let log_level = args.resolve_log_level(&config);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting sqlchat v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    // Storage.
    let store: Arc<dyn KeyValueStore> = if args.in_memory {
        tracing::info!("Using in-memory state");
        Arc::new(MemoryStore::new())
    } else {
        let data_dir = args.resolve_data_dir(&config);
        if let Err(e) = std::fs::create_dir_all(&data_dir) {
            tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
            return Err(e.into());
        }
        let db_path = data_dir.join("sqlchat.db");
        let store = SqliteStore::open(&db_path)?;
        tracing::info!(path = %db_path.display(), "SQLite state store opened");
        Arc::new(store)
    };

    // Backend + orchestrator.
    let backend = Arc::new(HttpBackend::new(config.backend.clone())?);
    tracing::info!(base_url = %config.backend.base_url, "Query service configured");
    let orch = Arc::new(QueryOrchestrator::new(
        Arc::clone(&store),
        backend,
        config.chat.clone(),
    )?);

    let mut app = App {
        orch: Arc::clone(&orch),
        rules: MetricRules::new(Arc::clone(&store)),
        demo: DemoQuestions::new(store),
        running: None,
    };

    orch.greet_active()?;
    print_session(&orch);
    println!("{}", orch.refresh_kpis().await);
    println!("Type /help for commands.");
    prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            prompt();
            continue;
        }
        match app.handle(line).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("{}", e),
        }
        if app.running.as_ref().map_or(true, |h| h.is_finished()) {
            prompt();
        }
    }

    if let Some(handle) = app.running.take() {
        orch.cancel();
        let _ = handle.await;
    }
    tracing::info!("sqlchat exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use sqlchat_chat::{
        ApproveRequest, ApproveResponse, BackendError, IntentRequest, IntentResponse, KpiStrip,
        QueryBackend, QueryContext, SqlRequest, SqlResponse,
    };
    use sqlchat_core::config::ChatConfig;

    /// Answers every call and records the context of each KPI request.
    #[derive(Default)]
    struct RecordingBackend {
        kpi_contexts: Mutex<Vec<QueryContext>>,
    }

    #[async_trait]
    impl QueryBackend for RecordingBackend {
        async fn resolve_intent(&self, _request: &IntentRequest) -> Result<IntentResponse, BackendError> {
            Ok(IntentResponse::default())
        }

        async fn generate_sql(&self, _request: &SqlRequest) -> Result<SqlResponse, BackendError> {
            Ok(SqlResponse {
                narrative: Some("Fine.".into()),
                ..SqlResponse::default()
            })
        }

        async fn list_tables(&self) -> Result<Vec<String>, BackendError> {
            Ok(Vec::new())
        }

        async fn kpi_strip(&self, context: &QueryContext) -> Result<KpiStrip, BackendError> {
            self.kpi_contexts.lock().unwrap().push(*context);
            Ok(serde_json::from_value(json!({
                "kpis": {"revenue_k": 10, "margin_k": 2, "gap_k": 1, "coverage_ratio": 1.5},
                "quarter": "Q3"
            }))
            .unwrap())
        }

        async fn approve_example(&self, _request: &ApproveRequest) -> Result<ApproveResponse, BackendError> {
            Ok(ApproveResponse::default())
        }
    }

    fn orchestrator(backend: Arc<RecordingBackend>) -> QueryOrchestrator {
        let config = ChatConfig {
            max_question_length: 200,
            welcome_messages: false,
        };
        QueryOrchestrator::new(Arc::new(MemoryStore::new()), backend, config).unwrap()
    }

    // ---- Stage input ----

    #[test]
    fn test_parse_stage() {
        assert_eq!(parse_stage("1"), Some(StageBucket::NotApplied));
        assert_eq!(parse_stage("7"), Some(StageBucket::Pipeline));
        assert_eq!(parse_stage("0"), None);
        assert_eq!(parse_stage("8"), None);
        assert_eq!(parse_stage("bridge"), Some(StageBucket::Bridge));
    }

    // ---- KPI refresh ----

    #[tokio::test]
    async fn test_stage_choice_refreshes_kpis_for_new_stage() {
        let backend = Arc::new(RecordingBackend::default());
        let orch = orchestrator(backend.clone());
        orch.submit("revenue this quarter").unwrap();

        let (outcome, kpis) = resolve_and_refresh(&orch, StageBucket::Upside).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));
        assert_eq!(kpis.quarter, "Q3");

        let contexts = backend.kpi_contexts.lock().unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].stage, StageBucket::Upside);
    }

    #[tokio::test]
    async fn test_no_refresh_without_pending_question() {
        let backend = Arc::new(RecordingBackend::default());
        let orch = orchestrator(backend.clone());
        assert!(matches!(
            resolve_and_refresh(&orch, StageBucket::Forecast).await,
            Err(ChatError::NoPendingQuestion)
        ));
        assert!(backend.kpi_contexts.lock().unwrap().is_empty());
    }
}
