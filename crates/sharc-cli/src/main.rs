use clap::Parser;

mod cli;
mod commands;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.verbose);
    commands::run_command(cli)
}

/// Warnings by default, debug with `-v`, trace beyond that through
/// `SHARC_VERBOSE`.
fn init_tracing(verbose: bool) {
    let env_level = std::env::var("SHARC_VERBOSE")
        .ok()
        .and_then(|text| text.parse::<u8>().ok())
        .unwrap_or(0);
    let level = match env_level.max(u8::from(verbose)) {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}
