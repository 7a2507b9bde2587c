//! Admin CLI for a canvas deployment.
//!
//! Writes and checks `canvas.toml`, and prints the board as it would be
//! restored from storage on the next server start.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use canvas::exit_codes;
use canvas::io::config::{CanvasConfig, load_config, write_config};
use canvas::io::durability::{load_board, open_durability};

#[derive(Parser)]
#[command(name = "canvas", version, about = "Shared pixel canvas admin tool")]
struct Cli {
    /// Path to the canvas config file.
    #[arg(long, global = true, default_value = "canvas.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Load and validate the config file.
    Validate,
    /// Print the stored board as JSON, ordered by x then y.
    Dump {
        /// Include the last editor of each cell.
        #[arg(long)]
        extended: bool,
    },
}

#[derive(Serialize)]
struct BoardResponse<T: Serialize> {
    board: T,
}

fn main() {
    canvas::logging::init("warn");
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::INVALID);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Validate => cmd_validate(&cli.config),
        Command::Dump { extended } => cmd_dump(&cli.config, extended),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &CanvasConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    println!("{}", path.display());
    Ok(())
}

fn cmd_validate(path: &Path) -> Result<()> {
    let cfg = load_config(path)?;
    println!(
        "ok: {}x{} board, cooldown {}",
        cfg.width,
        cfg.height,
        if cfg.cooldown.enabled {
            format!("{}ms", cfg.cooldown.duration_ms)
        } else {
            "disabled".to_string()
        }
    );
    Ok(())
}

fn cmd_dump(path: &Path, extended: bool) -> Result<()> {
    let cfg = load_config(path)?;
    let store = open_durability(&cfg.storage).context("open board storage")?;
    let board = load_board(store.as_ref(), cfg.dimensions(), cfg.default_color)?;
    let payload = if extended {
        serde_json::to_string_pretty(&BoardResponse {
            board: board.cells(),
        })
    } else {
        serde_json::to_string_pretty(&BoardResponse {
            board: board.colors(),
        })
    }
    .context("serialize board")?;
    println!("{payload}");
    Ok(())
}
