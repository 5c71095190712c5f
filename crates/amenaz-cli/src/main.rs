//! amenaz - command line front end for the civil-protection hazard map.
//!
//! Downloads cities and hazard layers from the map backend, keeps them in
//! the local cache for offline use, and prints their status or a rendered
//! layer.

mod app;

use std::io;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use amenaz_core::CitySource;
use app::App;

const USAGE: &str = "\
Usage: amenaz [OPTIONS]

Options:
  --static                         Use the built-in city list
  --backend                        Load the city list from the backend
  --token <TOKEN>                  Store a session token and continue
  --clear-cache                    Delete all cached map data and exit
  --dump-layer <CITY_ID> <LAYER>   Print a rendered layer as JSON
  --search <QUERY>                 Look up a place and print the search marker
  -h, --help                       Show this help";

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    city_source: Option<CitySource>,
    token: Option<String>,
    clear_cache: bool,
    dump_layer: Option<(i64, String)>,
    search: Option<String>,
    help: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--static" => parsed.city_source = Some(CitySource::Static),
            "--backend" => parsed.city_source = Some(CitySource::Backend),
            "--token" => {
                let token = args.next().context("--token needs a value")?;
                parsed.token = Some(token);
            }
            "--clear-cache" => parsed.clear_cache = true,
            "--dump-layer" => {
                let city_id = args
                    .next()
                    .context("--dump-layer needs a city id")?
                    .parse::<i64>()
                    .context("City id must be a number")?;
                let layer = args.next().context("--dump-layer needs a layer name")?;
                parsed.dump_layer = Some((city_id, layer));
            }
            "--search" => {
                let query = args.next().context("--search needs a query")?;
                parsed.search = Some(query);
            }
            "-h" | "--help" => parsed.help = true,
            other => bail!("Unknown argument '{}'\n\n{}", other, USAGE),
        }
    }
    Ok(parsed)
}

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes buffered log lines when dropped.
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();

    let args = parse_args(std::env::args().skip(1))?;
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }

    info!("amenaz starting");
    let mut app = App::new()?;

    if let Some(source) = args.city_source {
        app.set_city_source(source);
    }
    if let Some(token) = args.token {
        app.store_token(token)?;
    }

    if args.clear_cache {
        let removed = app.clear_cache()?;
        println!("Removed {} cache entries", removed);
        return Ok(());
    }

    match (args.dump_layer, args.search) {
        (Some((city_id, layer)), _) => app.dump_layer(city_id, &layer).await?,
        (None, Some(query)) => app.search(&query).await?,
        (None, None) => app.print_summary().await?,
    }

    info!("amenaz done");
    Ok(())
}
