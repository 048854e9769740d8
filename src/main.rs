mod config;
mod detail;
mod directory;
mod logging;
mod screen;
mod search;
mod source;
mod translit;
mod ui;
mod vcard_io;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::task::LocalSet;
use tracing::info;

use config::Config;
use detail::{DetailController, DetailError};
use directory::DirectoryError;
use source::VdirSource;

#[derive(Parser, Debug)]
#[command(name = "rolo", about = "Browse and search a directory of vCard contacts")]
struct Cli {
    /// Configuration file (defaults to <config dir>/rolo/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print contacts grouped by first letter
    List(ListArgs),
    /// Print one contact's details
    Show(ShowArgs),
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Only contacts whose name contains this term
    term: Option<String>,
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Contact id (the vCard UID)
    id: String,
}

fn main() -> Result<()> {
    logging::init_tracing();

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;
    info!(config = %config.config_path.display(), "configuration loaded");

    let source = VdirSource::new(&config.vdir, config.phone_region.clone());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    match cli.command {
        Some(Command::List(args)) => runtime.block_on(handle_list(&source, &config, args)),
        Some(Command::Show(args)) => runtime.block_on(handle_show(&source, &config, args)),
        None => {
            let local = LocalSet::new();
            local.block_on(&runtime, ui::app::run(source, &config))
        }
    }
}

async fn handle_list(source: &VdirSource, config: &Config, args: ListArgs) -> Result<()> {
    let term = args.term.unwrap_or_default();
    let groups = match directory::load(source, &term, config.source_timeout).await {
        Ok(groups) => groups,
        Err(DirectoryError::PermissionDenied) => {
            eprintln!(
                "warning: contact access was denied for {}",
                config.vdir.display()
            );
            Vec::new()
        }
        Err(err) => return Err(err).context("contacts could not be loaded"),
    };

    if groups.is_empty() {
        println!("No contacts");
        return Ok(());
    }

    for group in groups {
        println!("{}", group.title);
        for item in group.items {
            println!("  {}\t{}", item.name, item.id);
        }
    }
    Ok(())
}

async fn handle_show(source: &VdirSource, config: &Config, args: ShowArgs) -> Result<()> {
    let mut controller = DetailController::new();
    let detail = match controller.select(source, &args.id, config.source_timeout).await {
        Ok(detail) => detail,
        Err(DetailError::NotFound(id)) => bail!("contact not found: {}", id),
        Err(err) => return Err(err).context("contact details could not be loaded"),
    };

    println!("{}", detail.name);
    println!("id: {}", detail.id);
    for phone in &detail.phone_numbers {
        println!("phone: {}", phone.number);
    }
    if detail.image.is_some() {
        println!("photo: embedded");
    }
    Ok(())
}
