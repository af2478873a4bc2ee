//! ferry demo: wires the engine with an in-memory queue and runs a handful of
//! tasks through it (fresh, stale, failing, panicking, raw, unknown kind).

mod observability;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use serde::Serialize;

use ferry_core::domain::{TaskEnvelope, TaskKind, TaskStatus};
use ferry_core::ports::DeliveryQueue;
use ferry_core::tasks::mail::{MAIL_SEND_KIND, MailError, MailSendHandler, MailTask, Mailer};
use ferry_core::typed::{RawHandler, TaskHeader};
use ferry_core::{App, AppBuilder, EngineConfig, HandlerError, TaskContext, TaskId};

#[derive(Debug, Parser)]
#[command(name = "ferry", about = "Run sample tasks through the ferry execution engine")]
struct Args {
    /// JSON config file (missing fields fall back to defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    workers: Option<usize>,

    /// 0 disables the staleness check
    #[arg(long)]
    stale_window_secs: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

/// Prints instead of sending. `@timeout.invalid` fails and `@panic.invalid` panics.
struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), MailError> {
        if to.iter().any(|addr| addr.ends_with("@timeout.invalid")) {
            return Err(MailError::new("smtp timeout"));
        }
        if to.iter().any(|addr| addr.ends_with("@panic.invalid")) {
            panic!("mailer state corrupted");
        }
        println!("mail to={} subject={subject:?} body={body:?}", to.join(","));
        Ok(())
    }
}

const AI_GENERATE_KIND: &str = "ai:generate";

/// Raw handler: reads the prompt straight from the payload.
struct EchoGenerator;

#[async_trait]
impl RawHandler for EchoGenerator {
    async fn handle(&self, ctx: &TaskContext, payload: &[u8]) -> Result<(), HandlerError> {
        let value: serde_json::Value =
            serde_json::from_slice(payload).map_err(HandlerError::from_source)?;
        let prompt = value["prompt"]
            .as_str()
            .ok_or_else(|| HandlerError::new("prompt missing"))?;
        println!("generate task_id={} prompt={prompt:?}", ctx.task_id());
        Ok(())
    }
}

#[derive(Serialize)]
struct Outcome<'a> {
    label: &'a str,
    task_id: Option<String>,
    status: Option<TaskStatus>,
    errors: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    observability::init(args.json_logs);

    let mut config = EngineConfig::load(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(secs) = args.stale_window_secs {
        config.stale_window_secs = secs;
    }

    let app = build_app(config)?;
    let queue = Arc::new(app.in_memory_queue());
    let workers = app.spawn_workers(queue.clone());

    tokio::select! {
        result = run_demo(&app, queue.as_ref()) => {
            for outcome in result? {
                println!("{}", serde_json::to_string(&outcome)?);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }

    queue.close().await;
    workers.shutdown_and_join().await;
    println!("counts: {:?}", queue.counts().await);
    Ok(())
}

fn build_app(config: EngineConfig) -> Result<App, Box<dyn std::error::Error>> {
    let prefix = config.mail_subject_prefix.clone();
    let app = AppBuilder::new()
        .with_config(config)
        .register::<MailTask, _>(MailSendHandler::new(ConsoleMailer, prefix))?
        .register_raw(AI_GENERATE_KIND, EchoGenerator)?
        .expect_tasks(&[MAIL_SEND_KIND, AI_GENERATE_KIND])
        .build()?;
    Ok(app)
}

async fn run_demo(
    app: &App,
    queue: &dyn DeliveryQueue,
) -> Result<Vec<Outcome<'static>>, Box<dyn std::error::Error>> {
    let producer = app.producer();
    let now = Utc::now();
    // (label, task id, 終了状態になるまで待つか)
    let mut submitted: Vec<(&'static str, Option<TaskId>, bool)> = Vec::new();

    let mut welcome = MailTask::new(vec!["alice@example.com".into()], "Welcome", "hello", now);
    submitted.push(("fresh", Some(producer.enqueue(queue, &mut welcome).await?), true));

    if let Some(window) = app.config().stale_window() {
        let created = now - chrono::Duration::from_std(window)? - chrono::Duration::minutes(5);
        let mut late = MailTask::new(vec!["bob@example.com".into()], "Late", "too late", created);
        // 破棄されたタスクは pending のまま終わらない
        submitted.push(("stale", Some(producer.enqueue(queue, &mut late).await?), false));
    }

    let mut failing = MailTask::new(vec!["carol@timeout.invalid".into()], "Retry", "x", now);
    submitted.push(("failing", Some(producer.enqueue(queue, &mut failing).await?), true));

    let mut panicking = MailTask::new(vec!["dave@panic.invalid".into()], "Boom", "x", now);
    submitted.push(("panicking", Some(producer.enqueue(queue, &mut panicking).await?), true));

    let generate = serde_json::json!({
        "id": "gen-1",
        "user_id": 42,
        "quota_id": 7,
        "quota_amount": 120,
        "created_at": now,
        "prompt": "a lighthouse at dusk",
    });
    // header だけ先に検証しておく
    let _: TaskHeader = serde_json::from_value(generate.clone())?;
    queue
        .submit(TaskEnvelope::new(
            TaskKind::new(AI_GENERATE_KIND),
            serde_json::to_vec(&generate)?,
        ))
        .await?;
    submitted.push(("raw", Some(TaskId::new("gen-1")), true));

    queue
        .submit(TaskEnvelope::new(
            TaskKind::new("video:render"),
            br#"{"id":"vid-1","created_at":"2024-01-01T00:00:00Z"}"#.to_vec(),
        ))
        .await?;
    submitted.push(("unknown_kind", None, false));

    let status = app.status();
    let mut outcomes = Vec::with_capacity(submitted.len());
    for (label, task_id, settles) in submitted {
        let Some(task_id) = task_id else {
            outcomes.push(Outcome {
                label,
                task_id: None,
                status: None,
                errors: vec![],
            });
            continue;
        };
        let view = if settles {
            status.wait_terminal(&task_id, Duration::from_secs(3)).await
        } else {
            status.get_status(&task_id).await
        };
        let (status, errors) = match view {
            Ok(view) => (Some(view.status), view.result.errors),
            Err(err) => (None, vec![err.to_string()]),
        };
        outcomes.push(Outcome {
            label,
            task_id: Some(task_id.into_string()),
            status,
            errors,
        });
    }
    Ok(outcomes)
}
