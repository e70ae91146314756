use anyhow::{bail, Context};
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use deimos::{
    output::{parse_xml, OutputConfig, OutputFormat, OutputManager},
    scanner::runner::{next_lossy_line, run_arguments},
    CancellationToken, DriverConfig, MasscanScanner, ScanArgs, ScanError,
};

fn cli() -> Command {
    Command::new("deimos")
        .version(env!("CARGO_PKG_VERSION"))
        .author("ibrahimsql")
        .about("Deimos: run masscan and get typed results back")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("TOML config file (default: ~/.deimos.toml)")
                .global(true),
        )
        .arg(
            Arg::new("masscan-path")
                .long("masscan-path")
                .value_name("PATH")
                .help("masscan binary to run instead of the one on PATH")
                .global(true),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .help("Kill masscan after this many seconds")
                .value_parser(clap::value_parser!(u64))
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Verbose output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("scan")
                .about("Run a scan and print the decoded report")
                .arg(
                    Arg::new("targets")
                        .value_name("TARGET")
                        .help("IP addresses, ranges or CIDR blocks")
                        .num_args(1..)
                        .required_unless_present("resume"),
                )
                .arg(
                    Arg::new("ports")
                        .short('p')
                        .long("ports")
                        .value_name("PORTS")
                        .help("Ports to scan (e.g., 80,443,8000-8100)")
                        .value_delimiter(','),
                )
                .arg(
                    Arg::new("udp")
                        .long("udp")
                        .value_name("PORTS")
                        .help("UDP ports to scan (e.g., 53,161-162)")
                        .value_delimiter(','),
                )
                .arg(
                    Arg::new("top-ports")
                        .long("top-ports")
                        .value_name("COUNT")
                        .value_parser(clap::value_parser!(u32)),
                )
                .arg(
                    Arg::new("rate")
                        .long("rate")
                        .value_name("PPS")
                        .help("Packets per second")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("banners")
                        .long("banners")
                        .help("Grab banners from open ports")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("ping")
                        .long("ping")
                        .help("Include an ICMP echo request")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("ttl")
                        .long("ttl")
                        .value_name("TTL")
                        .value_parser(clap::value_parser!(i32).range(0..=255)),
                )
                .arg(
                    Arg::new("wait")
                        .long("wait")
                        .value_name("SECONDS")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("exclude")
                        .long("exclude")
                        .value_name("TARGET")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("excludefile")
                        .long("excludefile")
                        .value_name("FILE"),
                )
                .arg(
                    Arg::new("resume")
                        .long("resume")
                        .value_name("FILE")
                        .help("Resume a paused scan (paused.conf)"),
                )
                .arg(
                    Arg::new("format")
                        .short('o')
                        .long("format")
                        .value_name("FORMAT")
                        .help("Output format")
                        .value_parser(["text", "json", "csv", "greppable", "xml"])
                        .default_value("text"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .value_name("FILE")
                        .help("Write results to a file instead of stdout"),
                )
                .arg(
                    Arg::new("show-closed")
                        .long("show-closed")
                        .help("Include closed ports in the output")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("stream")
                        .long("stream")
                        .help("Print masscan's status lines while it runs")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .help("Print the masscan command line and exit")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("iflist")
                .about("List the network interfaces masscan can use")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp_secs()
        .init();
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.red} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Token cancelled on Ctrl-C
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", "[!] Interrupted, stopping masscan".bright_yellow());
            on_signal.cancel();
        }
    });
    token
}

fn load_scanner(matches: &ArgMatches) -> anyhow::Result<MasscanScanner> {
    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let mut config = DriverConfig::load(config_path.as_deref()).context("loading configuration")?;

    if let Some(path) = matches.get_one::<String>("masscan-path") {
        config.binary_path = Some(PathBuf::from(path));
    }
    if let Some(timeout) = matches.get_one::<u64>("timeout") {
        config.timeout = Some(*timeout);
    }

    let scanner = match config.scanner() {
        Ok(scanner) => scanner,
        Err(ScanError::NotInstalled) => {
            bail!("masscan was not found on PATH; install it or pass --masscan-path")
        }
        Err(e) => return Err(e.into()),
    };
    Ok(scanner.with_cancellation(interrupt_token()))
}

fn scan_args(matches: &ArgMatches) -> ScanArgs {
    let mut args = ScanArgs::new();

    if let Some(resume) = matches.get_one::<String>("resume") {
        return args.with_resume(resume);
    }
    if let Some(targets) = matches.get_many::<String>("targets") {
        args = args.with_targets(targets.cloned());
    }
    if let Some(ports) = matches.get_many::<String>("ports") {
        args = args.with_ports(ports);
    }
    if let Some(udp) = matches.get_many::<String>("udp") {
        for spec in udp {
            args = args.with_udp_ports(spec);
        }
    }
    if let Some(count) = matches.get_one::<u32>("top-ports") {
        args = args.with_top_ports(*count);
    }
    if let Some(rate) = matches.get_one::<u64>("rate") {
        args = args.with_rate(*rate);
    }
    if matches.get_flag("banners") {
        args = args.with_banners();
    }
    if matches.get_flag("ping") {
        args = args.with_ping();
    }
    if let Some(ttl) = matches.get_one::<i32>("ttl") {
        args = args.with_ttl(*ttl);
    }
    if let Some(wait) = matches.get_one::<u64>("wait") {
        args = args.with_wait(*wait);
    }
    if let Some(excludes) = matches.get_many::<String>("exclude") {
        for target in excludes {
            args = args.with_exclude(target.clone());
        }
    }
    if let Some(file) = matches.get_one::<String>("excludefile") {
        args = args.with_exclude_file(Path::new(file));
    }
    args
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("{} {}", "[~]".bright_blue(), warning);
    }
}

async fn run_scan(matches: &ArgMatches) -> anyhow::Result<()> {
    let scanner = load_scanner(matches)?;
    let scanner = scanner.configure(|args| {
        scan_args(matches)
            .as_slice()
            .iter()
            .fold(args, |args, token| args.with_raw_arg(token.clone()))
    });

    if matches.get_flag("dry-run") {
        println!(
            "{} {}",
            scanner.binary_path().display(),
            run_arguments(scanner.args()).join(" ")
        );
        return Ok(());
    }

    let format: OutputFormat = matches
        .get_one::<String>("format")
        .map(|f| f.parse())
        .transpose()
        .map_err(anyhow::Error::msg)?
        .unwrap_or(OutputFormat::Text);

    let output = OutputManager::new(OutputConfig {
        format,
        file: matches.get_one::<String>("output").cloned(),
        colored: !matches.get_flag("no-color"),
        show_closed: matches.get_flag("show-closed"),
    });

    let (result, warnings) = if matches.get_flag("stream") {
        stream_scan(&scanner).await?
    } else {
        let pb = spinner("masscan is running");
        let outcome = scanner.run().await;
        pb.finish_and_clear();
        outcome.into_parts()
    };

    print_warnings(&warnings);
    let run = result.context("scan failed")?;
    output.write_results(&run).context("writing results")?;
    Ok(())
}

/// Run with live stderr, then decode the collected stdout
async fn stream_scan(
    scanner: &MasscanScanner,
) -> anyhow::Result<(deimos::Result<deimos::MasscanRun>, Vec<String>)> {
    let mut running = scanner.start().await?;

    let stderr_task = running.take_stderr().map(|lines| {
        let mut reader = lines.into_inner();
        tokio::spawn(async move {
            let mut warnings = Vec::new();
            loop {
                match next_lossy_line(&mut reader).await {
                    Ok(None) => break,
                    Ok(Some(line)) => {
                        eprintln!("{} {}", "masscan:".bright_black(), line);
                        warnings.push(line);
                    }
                    Err(e) => {
                        log::warn!("Failed to read masscan stderr: {}", e);
                        break;
                    }
                }
            }
            warnings
        })
    });

    let mut stdout = Vec::new();
    while let Some(line) = running.next_stdout_line().await? {
        stdout.extend_from_slice(line.as_bytes());
        stdout.push(b'\n');
    }

    let exit = running.wait().await;
    let warnings = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };

    match exit {
        Err(e) if e.is_timeout() => return Ok((Err(e), Vec::new())),
        Err(e) => log::warn!("masscan: {}", e),
        Ok(_) => {}
    }

    let result = parse_xml(&stdout).map_err(ScanError::from);
    Ok((result, warnings))
}

async fn run_iflist(matches: &ArgMatches) -> anyhow::Result<()> {
    let scanner = load_scanner(matches)?;
    let list = scanner.interface_list().await.context("listing interfaces")?;

    let format = if matches.get_flag("json") {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    OutputManager::new(OutputConfig {
        format,
        colored: !matches.get_flag("no-color"),
        ..Default::default()
    })
    .write_interfaces(&list)?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    let (name, sub) = match matches.subcommand() {
        Some(found) => found,
        None => unreachable!("subcommand_required is set"),
    };

    // Global flags are propagated down to the subcommand
    init_logging(sub.get_flag("verbose"));
    if sub.get_flag("no-color") {
        colored::control::set_override(false);
    }

    let result = match name {
        "scan" => run_scan(sub).await,
        "iflist" => run_iflist(sub).await,
        other => unreachable!("unknown subcommand {}", other),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "[!] ERROR:".bright_red(), e);
        process::exit(1);
    }
}
