use anyhow::{Context, Result, bail};
use std::env;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use wire_e2e::config::HarnessConfig;
use wire_e2e::reporting::{OutputFormat, Reporter, TestStatus};
use wire_e2e::scenario::Suite;

#[derive(Debug)]
struct RunArgs {
    config: Option<PathBuf>,
    format: OutputFormat,
    output: Option<PathBuf>,
}

fn parse_run_args(args: &[String]) -> Result<RunArgs> {
    let mut parsed = RunArgs {
        config: None,
        format: OutputFormat::Markdown,
        output: None,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--format" | "-f" => {
                let format = iter.next().context("--format needs a value")?;
                parsed.format = format.parse()?;
            }
            "--output" | "-o" => {
                let path = iter.next().context("--output needs a path")?;
                parsed.output = Some(PathBuf::from(path));
            }
            other => bail!("Unknown option '{}'", other),
        }
    }

    Ok(parsed)
}

async fn run(args: &[String]) -> Result<bool> {
    let run_args = parse_run_args(args)?;
    let config = HarnessConfig::load(run_args.config.as_deref())?;
    let reporter = Reporter::new(run_args.format)?;

    let report = Suite::execute(&config).await?;

    for scenario in &report.scenarios {
        let mark = match scenario.status {
            TestStatus::Passed => "PASS",
            TestStatus::Failed => "FAIL",
            TestStatus::Skipped => "SKIP",
        };
        eprintln!("[{}] {} ({:?})", mark, scenario.name, scenario.duration);
        if let Some(error) = &scenario.error {
            eprintln!("       {}", error);
        }
    }

    let rendered = reporter.render(&report)?;
    match &run_args.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!("Report written to {}", path.display());
        }
        None => println!("{}", rendered),
    }

    Ok(report.all_passed())
}

fn print_usage() {
    println!("wire-e2e - login/logout UI checks for the Wire iOS app");
    println!();
    println!("USAGE:");
    println!("    wire-e2e run [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <PATH>      Harness configuration (JSON)");
    println!("    -f, --format <FORMAT>    Report format: markdown or json");
    println!("    -o, --output <PATH>      Write the report to a file instead of stdout");
    println!("    -h, --help               Print help information");
    println!("    -v, --version            Print version information");
    println!();
    println!("ENVIRONMENT:");
    println!("    WIRE_E2E_SERVER_URL, WIRE_E2E_DRIVER, WIRE_E2E_CREDENTIALS, WIRE_E2E_ARTIFACTS");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        process::exit(1);
    };

    let code = match command.as_str() {
        "run" => match run(&args[1..]).await {
            Ok(true) => 0,
            Ok(false) => 1,
            Err(err) => {
                eprintln!("Error: {:#}", err);
                1
            }
        },
        "help" | "-h" | "--help" => {
            print_usage();
            0
        }
        "-v" | "--version" => {
            println!("wire-e2e {}", env!("CARGO_PKG_VERSION"));
            0
        }
        other => {
            eprintln!("Error: Unknown command '{}'", other);
            print_usage();
            1
        }
    };

    process::exit(code);
}
