#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::{fs, thread};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use livemark_core::diff::DiffEngine;
use livemark_core::indicators::{ChangeIndicators, Indicator, Node};
use livemark_core::markdown;
use livemark_core::source_map::annotate;
use livemark_watch::{POLL_INTERVAL, SubscriberId, WatchRegistry};

/// Subscriber identity for the single window this process drives.
const VIEWER: SubscriberId = 1;

#[derive(Parser)]
#[command(
    name = "livemark",
    about = "View markdown and follow the file on disk",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render markdown to a simple plain-text preview and print to stdout.
    Preview {
        /// Path to a markdown file. Use `-` to read from stdin.
        path: PathBuf,
    },
    /// Watch a markdown file and reprint it with change markers after
    /// every settled external write.
    Watch {
        path: PathBuf,
        /// Accept each reported change as the new baseline.
        #[arg(long)]
        rebaseline: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Preview { path } => preview(&path),
        Command::Watch { path, rebaseline } => watch(&path, rebaseline),
    }
}

fn preview(path: &Path) -> anyhow::Result<()> {
    let source = if path.as_os_str() == "-" {
        use std::io::Read as _;

        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read markdown from stdin")?;
        buf
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("failed to read markdown from {}", path.display()))?
    };

    print!("{}", markdown::plain_text(&source));
    Ok(())
}

fn watch(path: &Path, rebaseline: bool) -> anyhow::Result<()> {
    let path = path
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", path.display()))?;
    let initial = fs::read_to_string(&path)
        .with_context(|| format!("failed to read markdown from {}", path.display()))?;

    let mut engine = DiffEngine::new();
    engine.set_baseline(initial.as_str());

    let reset_requested = Rc::new(RefCell::new(false));
    let mut view = ChangeIndicators::new(annotate(&initial), {
        let flag = Rc::clone(&reset_requested);
        Box::new(move || {
            *flag.borrow_mut() = true;
        })
    });

    let mut registry = WatchRegistry::new();
    registry
        .subscribe(&path, VIEWER)
        .with_context(|| format!("unable to watch {}", path.display()))?;

    let incoming: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
    let deleted = Rc::new(RefCell::new(false));
    {
        let incoming = Rc::clone(&incoming);
        registry.on_change(
            VIEWER,
            Box::new(move |event| {
                incoming.borrow_mut().push(event.content.clone());
                Ok(())
            }),
        );
    }
    {
        let deleted = Rc::clone(&deleted);
        registry.on_delete(
            VIEWER,
            Box::new(move |_| {
                *deleted.borrow_mut() = true;
                Ok(())
            }),
        );
    }

    eprintln!("watching {} (Ctrl-C to stop)", path.display());
    print_view(&view);

    loop {
        registry.pump();

        if *deleted.borrow() {
            eprintln!("{} has been deleted", path.display());
            return Ok(());
        }

        let settled: Vec<String> = incoming.borrow_mut().drain(..).collect();
        for content in settled {
            tracing::info!(path = %path.display(), "change settled");
            let diff = engine.compute_diff(&content);
            view.set_content(annotate(&content));
            view.apply_changes(&diff);
            println!();
            print_view(&view);

            if rebaseline && view.reset_visible() {
                view.reset();
            }
            if *reset_requested.borrow() {
                // Host side of the reset contract: re-baseline from the
                // rendered content, then clear the indicators.
                engine.set_baseline(content.as_str());
                view.clear_indicators();
                *reset_requested.borrow_mut() = false;
            }
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn print_view(view: &ChangeIndicators) {
    for node in view.nodes() {
        match node {
            Node::DeletionMarker => println!("x  (removed)"),
            Node::Block { block, indicator } => {
                let gutter = match indicator {
                    Some(Indicator::Added) => '+',
                    Some(Indicator::Modified) => '~',
                    None => ' ',
                };
                if block.text.is_empty() {
                    println!("{gutter}  ---");
                } else {
                    for line in block.text.lines() {
                        println!("{gutter}  {line}");
                    }
                }
            }
        }
    }
}
