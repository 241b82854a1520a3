//! httpreplay CLI

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context};
use http_body_util::BodyExt;
use httpreplay::{
    Config, HyperTransport, Mode, PathGenerator, Recording, ReplayBody, ReplayTransport,
};
use hyper::Request;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!("httpreplay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: httpreplay <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  path <METHOD> <URL> [Name:Value ...]   Show where a request is recorded");
    eprintln!("  show <FILE>                            Summarize a recording file");
    eprintln!("  get <URL> [--dir DIR] [--mode MODE] [--strict] [--config FILE]");
    eprintln!("                                         Fetch a URL through the recorder");
    eprintln!();
    eprintln!("Modes: record-if-missing (default), playback-only, record-only");
    process::exit(1);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        usage();
    };

    let result = match command.as_str() {
        "path" => show_path(rest).await,
        "show" => show_recording(rest),
        "get" => fetch(rest).await,
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'httpreplay' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn show_path(args: &[String]) -> anyhow::Result<()> {
    let [method, url, headers @ ..] = args else {
        usage();
    };

    let mut builder = Request::builder().method(method.as_str()).uri(url.as_str());
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("Header '{header}' is not Name:Value"))?;
        builder = builder.header(name.trim(), value.trim());
    }
    let mut request = builder
        .body(ReplayBody::empty())
        .context("Invalid request")?;

    let path = PathGenerator::new().recording_path(&mut request).await?;
    println!("{}", path.path().display());
    if path.checksum().is_some() {
        println!("{}", path.generic_path().display());
    }
    Ok(())
}

fn show_recording(args: &[String]) -> anyhow::Result<()> {
    let [file] = args else {
        usage();
    };

    let recording = Recording::load(Path::new(file))?;
    println!("{} {}", recording.proto, recording.status);
    for (name, value) in &recording.headers {
        println!("{name}: {}", String::from_utf8_lossy(value.as_bytes()));
    }
    println!();
    println!("({} body bytes)", recording.body.len());
    Ok(())
}

async fn fetch(args: &[String]) -> anyhow::Result<()> {
    let mut url = None;
    let mut dir = None;
    let mut mode = None;
    let mut strict = false;
    let mut config_file = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dir" => dir = Some(PathBuf::from(iter.next().context("--dir needs a value")?)),
            "--mode" => mode = Some(iter.next().context("--mode needs a value")?.parse::<Mode>()?),
            "--strict" => strict = true,
            "--config" => {
                config_file = Some(PathBuf::from(iter.next().context("--config needs a value")?));
            }
            other if url.is_none() && !other.starts_with("--") => url = Some(other.to_string()),
            other => bail!("Unexpected argument '{other}'"),
        }
    }
    let Some(url) = url else {
        usage();
    };

    let mut config = match config_file {
        Some(path) => Config::from_file(&path)?,
        None => Config::new("testdata"),
    };
    if let Some(dir) = dir {
        config.recording_dir = dir;
    }
    if let Some(mode) = mode {
        config.mode = mode;
    }
    config.strict_path |= strict;

    info!(
        "Fetching {url} (mode: {}, dir: {})",
        config.mode,
        config.recording_dir.display()
    );

    let transport = ReplayTransport::from_config(&config, HyperTransport::new())?;
    let request = Request::get(url.as_str())
        .body(ReplayBody::empty())
        .context("Invalid URL")?;

    let response = transport.round_trip(request).await?;
    info!("{} {:?}", response.status(), response.version());

    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read body: {e}"))?
        .to_bytes();

    std::io::stdout().write_all(&body)?;
    Ok(())
}
