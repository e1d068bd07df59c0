use anyhow::{anyhow, Context, Result};
use clap::{App, Arg, ArgMatches};
use folio::build::build_site;
use folio::config::{Config, Overrides};
use std::path::Path;
use tracing_subscriber::EnvFilter;
use url::Url;

fn main() {
    let matches = App::new("folio")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Builds a static blog from a directory of Markdown posts")
        .arg(
            Arg::with_name("source")
                .help("The directory holding the post source files")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("output")
                .help("The directory to write the site to")
                .required(true)
                .index(2),
        )
        .arg(
            Arg::with_name("base-url")
                .long("base-url")
                .takes_value(true)
                .value_name("URL")
                .help("The absolute URL the site is served from"),
        )
        .arg(
            Arg::with_name("page-size")
                .long("page-size")
                .takes_value(true)
                .value_name("N")
                .help("The number of posts per index page"),
        )
        .arg(
            Arg::with_name("drafts")
                .long("drafts")
                .help("List drafts in indexes and feeds like published posts"),
        )
        .arg(
            Arg::with_name("recursive")
                .short("r")
                .long("recursive")
                .help(
                    "Look for posts in subdirectories of the source directory",
                ),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .takes_value(true)
                .value_name("FILE")
                .help(
                    "The project file to use instead of the nearest folio.yaml",
                ),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Logs more details (repeat for even more)"),
        )
        .get_matches();

    init_logging(matches.occurrences_of("verbose"));

    if let Err(err) = run(&matches) {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

// `RUST_LOG` takes precedence over `-v`.
fn init_logging(verbosity: u64) {
    let default = match verbosity {
        0 => "folio=info",
        1 => "folio=debug",
        _ => "folio=trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(matches: &ArgMatches) -> Result<()> {
    let overrides = Overrides {
        config_file: matches.value_of("config").map(Into::into),
        base_url: matches
            .value_of("base-url")
            .map(|url| {
                Url::parse(url)
                    .with_context(|| format!("Parsing base URL `{}`", url))
            })
            .transpose()?,
        page_size: matches
            .value_of("page-size")
            .map(|n| {
                n.parse::<usize>().map_err(|err| {
                    anyhow!("Parsing page size `{}`: {}", n, err)
                })
            })
            .transpose()?,
        include_drafts: matches.is_present("drafts"),
        recursive: matches.is_present("recursive"),
    };

    // `source` and `output` are required, so clap guarantees their presence.
    let source = Path::new(matches.value_of("source").unwrap_or_default());
    let output = Path::new(matches.value_of("output").unwrap_or_default());
    let config = Config::load(source, output, overrides)?;
    // Build errors already spell out their causes.
    build_site(&config).map_err(|err| anyhow!("{}", err))?;
    Ok(())
}
