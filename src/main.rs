mod cli;
mod config;
mod export;
mod model;
mod sanitize;
mod store;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::info;

use cli::Command;
use export::{ExportEvent, ExportJob};
use model::field::discover_fields;
use store::tfs::TfsStore;
use store::WorkItemStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match cli::parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    match command {
        Command::Help => {
            cli::print_help();
            Ok(())
        }
        Command::Fields { project } => list_fields(project).await,
        Command::Export {
            project,
            out,
            fields,
            attachments,
        } => run_export(project, out, fields, attachments).await,
    }
}

async fn connect(project_override: Option<String>) -> Result<TfsStore> {
    let config = config::load_config()?;
    let Some(tfs) = config.tfs else {
        bail!("No [tfs] section in ~/.bug-export/config.toml. Add collection_url, project and pat.");
    };
    let project = project_override
        .or(tfs.project)
        .context("No project given. Set one in config.toml or pass --project.")?;
    info!(project, "connecting to tracking store");
    TfsStore::connect(&tfs.collection_url, &project, &tfs.pat).await
}

async fn list_fields(project: Option<String>) -> Result<()> {
    let store = connect(project).await?;
    let items = store.query_bugs().await?;
    let Some(sample) = items.first() else {
        println!(
            "Project {} has no bugs; there are no fields to offer.",
            store.project()
        );
        return Ok(());
    };
    for name in discover_fields(sample) {
        println!("{name}");
    }
    Ok(())
}

async fn run_export(
    project: Option<String>,
    out: std::path::PathBuf,
    fields: Vec<String>,
    attachments: bool,
) -> Result<()> {
    let store = connect(project).await?;
    let items = store.query_bugs().await?;
    info!(bugs = items.len(), "query complete");

    let job = ExportJob {
        project: store.project().to_string(),
        selected_fields: fields,
        destination: out,
        fetch_attachments: attachments,
    };

    // Progress is rendered from a separate task; the export itself runs
    // sequentially and has no cooperative abort point, so interrupting the
    // process mid-run can leave downloaded attachments behind.
    let (tx, mut rx) = mpsc::unbounded_channel::<ExportEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ExportEvent::Progress { current, total } => {
                    eprintln!("Work Item {current}/{total}");
                }
                ExportEvent::Blocked(reason) => eprintln!("Export not started: {reason}"),
                ExportEvent::Completed(path) => {
                    println!("The export is complete: {}", path.display());
                }
                ExportEvent::Failed(reason) => eprintln!("Export failed: {reason}"),
            }
        }
    });

    let result = export::run(&store, &store, &items, &job, tx).await;
    printer.await.context("progress task panicked")?;

    if result.is_err() {
        std::process::exit(1);
    }
    Ok(())
}
