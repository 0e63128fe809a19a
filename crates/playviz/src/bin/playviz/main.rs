mod cli;

use anyhow::Context;
use playviz::model::Project;
use tracing_subscriber::EnvFilter;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

/// `PLAYVIZ_LOG` wins over `-v`
fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_env("PLAYVIZ_LOG").unwrap_or_else(|_| {
        let level = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("playviz={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &cli::Cli) -> anyhow::Result<()> {
    let options = cli.options()?;

    let mut project = Project::load_dir(&cli.playbook_dir)
        .with_context(|| format!("Failed to load {}", cli.playbook_dir.display()))?;
    let graph = playviz::pipeline::run(&mut project, &options);

    for unresolved in &project.unresolved {
        tracing::warn!(
            source = %unresolved.source,
            reference = %unresolved.reference,
            "unresolved {}",
            unresolved.kind
        );
    }

    // render completely before writing anything
    let rendered = match cli.output.format {
        cli::OutputFormat::Dot => playviz::render::dot(&graph),
        cli::OutputFormat::Html => {
            let generated = chrono::Local::now().format("%Y.%m.%d %H:%M:%S").to_string();
            let page = playviz::render::Page::new(&cli.output.title, &generated);
            playviz::render::html(&graph, &page)?
        }
        cli::OutputFormat::Json => serde_json::to_string_pretty(&graph)?,
        cli::OutputFormat::Yaml => serde_yaml::to_string(&graph)?,
    };

    match &cli.output.file {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{rendered}"),
    }

    Ok(())
}
