use anyhow::Context;
use colored::Colorize;
use sharc_archive::{ArchiveLoader, ModuleName};
use sharc_runtime::{modes, ConflictPolicy, ImportOutcome, ModuleUniverse, RunOutcome, RuntimeConfig};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::Inspect(args) => cmd_inspect(args),
        Command::Verify(args) => cmd_verify(args),
    }
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = RuntimeConfig::from_env()?;
    if let Some(text) = &args.mode {
        config.mode = Some(text.parse()?);
    }
    if let Some(path) = args.archive {
        config.archive = Some(path);
    }
    if let Some(path) = args.list {
        config.list = Some(path);
    }
    if let Some(path) = args.dump_list {
        config.dump_list = Some(path);
    }
    if let Some(text) = &args.seed {
        config.seed = text.parse()?;
    }
    if let Some(text) = &args.set_layout {
        config.set_layout =
            Some(text.parse().map_err(|e| anyhow::anyhow!("--set-layout: {e}"))?);
    }
    if args.skip_conflicts {
        config.conflicts = ConflictPolicy::SkipRecord;
    }

    let universe = match &args.manifest {
        Some(path) => ModuleUniverse::from_manifest_path(path)
            .with_context(|| format!("reading manifest {}", path.display()))?,
        None => ModuleUniverse::standard()?,
    };

    let mut imports = Vec::with_capacity(args.imports.len());
    for text in &args.imports {
        imports.push(ModuleName::parse(text)?);
    }

    let outcome = modes::run(&config, &universe, &imports, args.expr.as_deref())?;
    print_outcome(outcome);
    Ok(())
}

fn print_outcome(outcome: RunOutcome) {
    match outcome {
        RunOutcome::Imported { imports, shared, recorded } => {
            for (name, how) in &imports {
                let tag = match how {
                    ImportOutcome::ArchiveHit => "archive".green(),
                    ImportOutcome::HostImport => "host".cyan(),
                    ImportOutcome::Cached => "cached".dimmed(),
                };
                println!("  {:>7}  {}", tag, name);
            }
            if shared {
                println!("{} imports served from a mapped archive", "✓".green());
            }
            if let Some(path) = recorded {
                println!("{} import list written to {}", "✓".green(), path.display());
            }
        }
        RunOutcome::Built(report) => {
            println!(
                "{} {} records ({} bytes) written to {}",
                "✓".green().bold(),
                report.written.len(),
                report.bytes,
                report.path.display(),
            );
            for name in &report.skipped {
                println!("  {} {}", "skipped:".yellow(), name);
            }
        }
        RunOutcome::DebugDumped { path, bytes } => {
            println!("{} debug object ({bytes} bytes) written to {}", "✓".green(), path.display());
        }
        RunOutcome::DebugLoaded { repr } => println!("{repr}"),
    }
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let loader = ArchiveLoader::open(&args.archive)?;
    let stamp = loader.stamp();
    println!("{}", args.archive.display().to_string().bold());
    println!(
        "  stamp: seed {} ({}), sets {}",
        stamp.seed.value(),
        stamp.seed_policy,
        stamp.set_layout
    );
    println!("  checksum: {}", hex::encode(loader.records_checksum()).dimmed());
    println!("  records: {}", loader.record_count());
    for record in loader.records() {
        let seed_mark =
            if record.seed_sensitive() { " seed-sensitive".yellow() } else { "".normal() };
        println!(
            "  {:<24} {:<6} {:>6} bytes{}",
            record.name().to_string().cyan(),
            record.kind().to_string(),
            record.stored_len(),
            seed_mark,
        );
        if !record.depends_on().is_empty() {
            let deps: Vec<_> = record.depends_on().iter().map(|n| n.to_string()).collect();
            println!("    {} {}", "needs:".dimmed(), deps.join(", "));
        }
    }
    Ok(())
}

fn cmd_verify(args: VerifyArgs) -> anyhow::Result<()> {
    let loader = ArchiveLoader::open(&args.archive)?;
    loader
        .verify()
        .with_context(|| format!("{} failed verification", args.archive.display()))?;
    println!(
        "{} {} records verified in {}",
        "✓".green().bold(),
        loader.record_count(),
        args.archive.display()
    );
    Ok(())
}
