use clap::Parser;
use element_detection::cli::commands::{PageSource, Settings, cmd_adapt, cmd_detect};
use element_detection::cli::config::{Cli, Commands, load_config, resolve_ollama, resolve_trace_path};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref());

    // Resolve Ollama settings: CLI > config > env > defaults
    let ollama = resolve_ollama(
        cli.ollama_endpoint.as_deref(),
        cli.ollama_model.as_deref(),
        &config.ollama,
    );
    let trace_path = resolve_trace_path(cli.trace.as_deref(), &config.trace);
    let settings = Settings {
        config,
        ollama,
        trace_path,
    };

    match cli.command {
        Commands::Detect {
            file,
            live,
            url,
            observer,
            server_script,
        } => {
            let source = match (file, live) {
                (_, Some(live_url)) => PageSource::Live {
                    url: live_url,
                    server_script,
                },
                (Some(path), None) => PageSource::File { path, url },
                (None, None) => return Err("detect needs --file or --live".into()),
            };
            cmd_detect(&source, &observer, &settings).await?;
        }
        Commands::Adapt {
            before,
            after,
            url,
            observer,
        } => {
            let report = cmd_adapt(&before, &after, &url, &observer, &settings).await?;
            if !report.lost.is_empty() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
