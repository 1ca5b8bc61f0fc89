//! `boajs`: a small command-line driver for the module subsystem. Evaluates
//! one or more ES modules or CommonJS files given on the command line, or
//! falls into a CommonJS-flavored REPL when none are given.

#![allow(clippy::print_stdout, clippy::print_stderr, missing_docs)]

use boa_modules::context::ModuleConfig;
use boa_modules::pmap::PackageMap;
use clap::Parser;
use color_eyre::eyre::{Context as _, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;

/// Command-line options for `boajs`.
#[derive(Debug, Parser)]
#[command(author, version, about = "Run ECMAScript/CommonJS modules", name = "boajs")]
struct Opt {
    /// Module or CommonJS file(s) to evaluate, in order.
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Path to a package map (pmap) JSON file to load before evaluation.
    #[arg(long, value_name = "PMAP")]
    pmap: Option<PathBuf>,

    /// Evaluate FILE(s) as CommonJS (`require`) instead of ES modules.
    #[arg(long)]
    commonjs: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let log_level = std::env::var("BOAJS_LOG").unwrap_or_else(|_| "warn".to_owned());
    simple_logger::init_with_level(log_level.parse().unwrap_or(log::Level::Warn))
        .context("failed to initialize logger")?;

    let opt = Opt::parse();

    let mut builder = ModuleConfig::new();
    if let Some(pmap_path) = &opt.pmap {
        let pmap = PackageMap::from_file(pmap_path)
            .map_err(|e| color_eyre::eyre::eyre!("failed to load pmap: {e}"))?;
        builder = builder.package_map(pmap);
    }

    let mut context = builder
        .build()
        .map_err(|e| color_eyre::eyre::eyre!("failed to initialize context: {e}"))?;

    if opt.files.is_empty() {
        return run_repl(&mut context);
    }

    for file in &opt.files {
        let path = file.to_string_lossy().into_owned();
        let result = if opt.commonjs {
            context.require(&path).map(|_| ())
        } else {
            context.run_module(&path)
        };

        if let Err(e) = result {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }

    context.run_jobs();
    Ok(())
}

/// Evaluates each line directly against the shared engine context and
/// prints its completion value, draining the job queue between lines.
fn run_repl(context: &mut boa_modules::context::ModuleContext) -> Result<()> {
    let mut editor = DefaultEditor::new().context("failed to start the line editor")?;
    let history_path = dirs_history_path();
    if let Some(path) = &history_path {
        let _ = editor.load_history(path);
    }

    loop {
        match editor.readline("boajs> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                match context.engine.eval(boa_engine::Source::from_bytes(line.as_bytes())) {
                    Ok(value) => {
                        let printed = value
                            .to_string(&mut context.engine)
                            .map(|s| s.to_std_string_escaped())
                            .unwrap_or_else(|_| "<unprintable value>".to_owned());
                        println!("{printed}");
                    }
                    Err(e) => eprintln!("{e}"),
                }
                context.run_jobs();
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }

    if let Some(path) = &history_path {
        let _ = editor.save_history(path);
    }
    Ok(())
}

fn dirs_history_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".boajs_history"))
}
