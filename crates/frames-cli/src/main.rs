use std::{
    fs,
    io::{self, IsTerminal},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use frames_core::parser::load_module;
use frames_core::transform::{ClassTransformer, FileTransformer, TransformationContext};
use frames_core::init_tracing;
use frames_cli::{CliConfig, Repl};
use tracing::info;

fn cli() -> Command {
    Command::new("framec")
        .version(frames_core::VERSION)
        .about("Generate, check and explore framed classes")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("JSON file with `runtime` and `emit` settings")
                .global(true),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Log frame and transform steps")
                .action(clap::ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("gen")
                .about("Frame declarations and write Rust source")
                .arg(
                    Arg::new("input")
                        .value_name("INPUT")
                        .help("A .frames/.json file or a directory of them")
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("PATH")
                        .help("Output file, or directory when INPUT is a directory"),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Report what framing would do without writing anything")
                .arg(Arg::new("input").value_name("FILE").required(true)),
        )
        .subcommand(
            Command::new("repl")
                .about("Load declarations and drive frames interactively")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .help("Run REPL commands from a script file"),
                ),
        )
}

fn main() -> Result<()> {
    let matches = cli().get_matches();

    if matches.get_flag("debug") && std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "frames_core=debug,frames_cli=debug,framec=debug");
    }
    init_tracing();

    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let config = CliConfig::load_or_default(config_path.as_deref())?;

    match matches.subcommand() {
        Some(("gen", sub)) => generate(sub, &config),
        Some(("check", sub)) => check(sub, &config),
        Some(("repl", sub)) => run_repl(config, sub.get_one::<String>("file").map(PathBuf::from)),
        _ => unreachable!("clap requires a subcommand"),
    }
}

fn input_path(matches: &ArgMatches) -> Result<PathBuf> {
    matches
        .get_one::<String>("input")
        .map(PathBuf::from)
        .context("missing INPUT")
}

fn generate(matches: &ArgMatches, config: &CliConfig) -> Result<()> {
    let input = input_path(matches)?;
    let output = matches.get_one::<String>("output").map(PathBuf::from);
    let mut transformer = FileTransformer::new(config.emit.clone());

    if input.is_dir() {
        let output = output.unwrap_or_else(|| PathBuf::from("generated"));
        let summary = transformer.transform_directory(&input, &output)?;
        println!(
            "Wrote {} of {} files to {} ({} classes framed, {} properties)",
            summary.files_written,
            summary.files_processed,
            output.display(),
            summary.classes.classes_transformed,
            summary.classes.properties_framed
        );
        for error in &summary.errors {
            eprintln!("{error}");
        }
        if !summary.success() {
            bail!("{} files failed", summary.errors.len());
        }
        return Ok(());
    }

    match output {
        Some(output) => {
            let summary = transformer.transform_file(&input, &output)?;
            info!(output = %output.display(), classes = summary.classes.classes_transformed, "generated");
            println!("Wrote {}", output.display());
        }
        None => {
            let source = fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let (code, _) = transformer.transform_source(&source, &format_of(&input), &origin_of(&input))?;
            print!("{code}");
        }
    }
    Ok(())
}

fn check(matches: &ArgMatches, config: &CliConfig) -> Result<()> {
    let input = input_path(matches)?;
    let module = load_module(&input)?;
    let context = TransformationContext::new()
        .with_source_file(input.display().to_string())
        .with_record_suffix(config.emit.record_suffix.clone());
    let outcome = ClassTransformer::framing()
        .with_context(context)
        .transform_module(module);

    for class in &outcome.transformed {
        println!(
            "{}: framed into {} ({})",
            class.host.name,
            class.record.name,
            class.framed.join(", ")
        );
    }
    let summary = &outcome.summary;
    println!(
        "{} classes, {} framed, {} skipped, {} properties framed",
        summary.classes_seen, summary.classes_transformed, summary.classes_skipped, summary.properties_framed
    );
    for error in &summary.errors {
        eprintln!("error: {error}");
    }
    if !summary.success() {
        bail!("{}: {} errors", input.display(), summary.errors.len());
    }
    Ok(())
}

fn format_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "frames".to_string())
}

fn origin_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn run_repl(config: CliConfig, input_file: Option<PathBuf>) -> Result<()> {
    use rustyline::{error::ReadlineError, DefaultEditor};

    let mut repl = Repl::new(config.runtime);

    // Scripts run line by line, echoing what they execute
    if let Some(path) = input_file {
        let script = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        for line in script.lines() {
            if !repl.is_running() {
                break;
            }
            if !line.trim().is_empty() {
                println!("> {line}");
            }
            repl.execute_line(line);
        }
        repl.show_exit_stats();
        return Ok(());
    }

    println!("framec v{}", frames_core::VERSION);
    if io::stdin().is_terminal() {
        println!("Type .help for help, .quit to exit");
        println!();
    }

    let mut rl = DefaultEditor::new()?;
    while repl.is_running() {
        let prompt = match repl.active_frame() {
            Some(frame) => format!("frames[{}]> ", frame.generation()),
            None => "frames> ".to_string(),
        };
        match rl.readline(&prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    rl.add_history_entry(line.as_str())?;
                }
                repl.execute_line(&line);
            }
            Err(ReadlineError::Interrupted) => {
                println!("Use .quit to exit");
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err}");
                break;
            }
        }
    }

    // Show exit statistics
    repl.show_exit_stats();

    Ok(())
}
