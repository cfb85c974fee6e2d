use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use ssm_lsp::schema::DocumentSchema;
use ssm_lsp::server::{Backend, VALIDATE_METHOD};
use tower_lsp::{LspService, Server};
use tracing_subscriber::EnvFilter;

/// Language server for SSM Automation documents.
#[derive(Parser, Debug)]
#[command(name = "ssm-lsp", version)]
#[command(about = "Language server for SSM Automation documents in JSON and YAML")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the language server over stdio (default)
    Serve,
    /// Write the bundled document schema as JSON
    Schema {
        /// Output file
        #[arg(value_name = "PATH")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    std::panic::set_hook(Box::new(|info| {
        tracing::error!("Uncaught exception: {info}");
    }));

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Schema { out } => write_schema(&out),
    }
}

async fn serve() -> anyhow::Result<()> {
    tracing::info!("starting ssm-lsp {}", env!("CARGO_PKG_VERSION"));

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::build(Backend::new)
        .custom_method(VALIDATE_METHOD, Backend::validate_document)
        .finish();

    // From here on panics also reach the client
    let errors = service.inner().errors();
    std::panic::set_hook(Box::new(move |info| {
        errors.error(format!("Uncaught exception: {info}"));
    }));

    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}

fn write_schema(out: &Path) -> anyhow::Result<()> {
    let schema = DocumentSchema::builtin().context("loading built-in schema")?;
    let text = serde_json::to_string_pretty(&schema.bundled())?;
    if let Some(parent) = out.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(out, text + "\n").with_context(|| format!("writing {}", out.display()))?;
    tracing::info!("wrote {}", out.display());
    Ok(())
}
