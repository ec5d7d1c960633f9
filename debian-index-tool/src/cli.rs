// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    clap::{Arg, ArgMatches, Command},
    debian_index::{
        binary_package_list::PackageIndex,
        error::DebianError,
        repository::{
            filesystem::FilesystemRepositoryReader, http::HttpRepositoryClient,
            release::FieldValue, PackageList, Repository,
        },
    },
    log::{warn, LevelFilter},
    serde::Deserialize,
    std::io::Write,
    thiserror::Error,
};

const URLS_ABOUT: &str = "\
Repository URLs

Various commands accept URLs describing the location of a repository. Here is
how they work.

If a value contains `://`, it will be parsed as a URL. Otherwise it will be
interpreted as a local filesystem path.

The following URL schemes (the part before the `://` in a URL) are recognized:

file://
   A local filesystem path. The path component of the URL is interpreted as
   a filesystem path.

http:// and https://
   A HTTP-based repository.

In all cases, the URL should point to the base of the Debian repository. This
is typically a directory containing `dists` and `pool` sub-directories.
";

const SCAN_ABOUT: &str = "\
Scan the binary packages of a Debian repository.

Distributions are discovered from the directory listing of `dists/` unless
they are specified explicitly. For every distribution, the `Release` file is
resolved and a `Packages` index is fetched for every combination of
advertised component and architecture (including the `all` architecture).

For every package, a line of the form

   PACKAGE <name> in <component> / <architecture>

is printed. Packages having build IDs are followed by a line

   BUILDIDS <id> <id>...

Within a `Packages` index, packages are printed sorted by name, not in the
order they appear in the file.

A missing `Packages` index is reported and scanning continues.

# YAML Configuration

Instead of a URL, a YAML file can be used to specify the scan configuration.
It can have the following keys:

url (required) (string)
   The URL or path of the repository to scan.

distributions (optional) (list[string])
   Names of distributions to scan. Distributions must be located in paths
   like `dists/<value>`.

only_components (optional) (list[string])
   Names of components to scan.

only_architectures (optional) (list[string])
   Names of architectures to scan.
";

const BUILD_IDS_ABOUT: &str = "\
Print the build IDs advertised by binary packages.

Debug symbol packages carry a `Build-Ids` field listing the build IDs of the
ELF objects they contain. For every such package, one line per build ID

   BID;<build id>;<sha256>

is printed, followed by a line describing the package

   SHA;<sha256>;<package>;<version>
";

#[derive(Debug, Error)]
pub enum DitError {
    #[error("argument parsing error: {0:?}")]
    Clap(#[from] clap::Error),

    #[error("{0:?}")]
    Debian(#[from] DebianError),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0:?}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid sub-command: {0}")]
    InvalidSubCommand(String),
}

pub type Result<T> = std::result::Result<T, DitError>;

/// Describes what a `scan` operation should visit.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    /// URL or path of the repository.
    pub url: String,

    /// Distributions to scan. Discovered from `dists/` if not set.
    pub distributions: Option<Vec<String>>,

    /// Filter of components to scan.
    pub only_components: Option<Vec<String>>,

    /// Filter of architectures to scan.
    pub only_architectures: Option<Vec<String>>,
}

impl ScanConfig {
    fn includes(&self, list: &PackageList) -> bool {
        let allowed = |filter: &Option<Vec<String>>, value: &str| match filter {
            Some(values) => values.iter().any(|v| v == value),
            None => true,
        };

        allowed(&self.only_components, list.component())
            && allowed(&self.only_architectures, list.architecture())
    }
}

/// Open a repository from a URL or filesystem path.
fn open_repository(url: &str, distributions: Option<&[String]>) -> Result<Repository> {
    let repo = if let Some(path) = url.strip_prefix("file://") {
        Repository::new(FilesystemRepositoryReader::new(path))
    } else if url.contains("://") {
        Repository::new(HttpRepositoryClient::new(url)?)
    } else {
        Repository::new(FilesystemRepositoryReader::new(url))
    };

    Ok(match distributions {
        Some(names) => repo.with_distributions(names),
        None => repo,
    })
}

fn required_value<'a>(args: &'a ArgMatches, name: &'static str) -> Result<&'a str> {
    args.value_of(name).ok_or(DitError::MissingArgument(name))
}

fn write_packages(
    writer: &mut impl Write,
    list: &PackageList,
    index: &PackageIndex,
) -> Result<()> {
    for record in index {
        writeln!(
            writer,
            "PACKAGE {} in {} / {}",
            record.package()?,
            list.component(),
            list.architecture()
        )?;

        if let Some(ids) = record.build_ids() {
            writeln!(writer, "BUILDIDS {}", ids.collect::<Vec<_>>().join(" "))?;
        }
    }

    Ok(())
}

fn write_build_ids(writer: &mut impl Write, index: &PackageIndex) -> Result<()> {
    for record in index {
        let associations = record.build_id_checksums()?;

        for (id, sha256) in &associations {
            writeln!(writer, "BID;{};{}", id, sha256)?;
        }

        if let Some((_, sha256)) = associations.first() {
            writeln!(
                writer,
                "SHA;{};{};{}",
                sha256,
                record.package()?,
                record.version_str()?
            )?;
        }
    }

    Ok(())
}

fn write_release_fields<'a>(
    writer: &mut impl Write,
    fields: impl Iterator<Item = (&'a str, &'a FieldValue)>,
) -> Result<()> {
    for (name, value) in fields {
        match value {
            FieldValue::Scalar(v) => writeln!(writer, "{}: {}", name, v)?,
            FieldValue::Array(values) => {
                writeln!(writer, "{}:", name)?;
                for v in values {
                    writeln!(writer, " {}", v)?;
                }
            }
        }
    }

    Ok(())
}

async fn scan_repository(
    writer: &mut impl Write,
    repo: &Repository,
    config: &ScanConfig,
) -> Result<()> {
    for release in repo.releases().await? {
        for list in release.package_lists().await? {
            if !config.includes(list) {
                continue;
            }

            match list.packages().await {
                Ok(index) => write_packages(writer, list, index)?,
                Err(e @ DebianError::IndexUnavailable(_)) => {
                    warn!("{}", e);
                    writeln!(
                        writer,
                        "Failed to load packages for {} / {}: {}",
                        list.component(),
                        list.architecture(),
                        e
                    )?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}

async fn build_id_report(writer: &mut impl Write, repo: &Repository) -> Result<()> {
    for release in repo.releases().await? {
        for list in release.package_lists().await? {
            match list.packages().await {
                Ok(index) => write_build_ids(writer, index)?,
                Err(e @ DebianError::IndexUnavailable(_)) => {
                    warn!("{}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}

pub async fn run_cli() -> Result<()> {
    let app = Command::new("Debian Index Tool")
        .version("0.1")
        .about("Inspect Debian repository metadata")
        .arg_required_else_help(true);

    let app = app.arg(
        Arg::new("verbose")
            .long("verbose")
            .short('v')
            .global(true)
            .multiple_occurrences(true)
            .help("Increase logging verbosity. Can be specified multiple times."),
    );

    let app = app.subcommand(
        Command::new("scan")
            .about("Print the binary packages of a repository")
            .long_about(SCAN_ABOUT)
            .arg(
                Arg::new("yaml-config")
                    .long("yaml-config")
                    .takes_value(true)
                    .allow_invalid_utf8(true)
                    .help("Path to a YAML file defining the scan configuration"),
            )
            .arg(
                Arg::new("url")
                    .required_unless_present("yaml-config")
                    .conflicts_with("yaml-config")
                    .help("URL or path of the repository"),
            ),
    );

    let app = app.subcommand(
        Command::new("release")
            .about("Print the fields of a distribution's Release file")
            .arg(
                Arg::new("url")
                    .required(true)
                    .help("URL or path of the repository"),
            )
            .arg(
                Arg::new("distribution")
                    .required(true)
                    .help("Name of the distribution"),
            ),
    );

    let app = app.subcommand(
        Command::new("build-ids")
            .about("Print build IDs of binary packages")
            .long_about(BUILD_IDS_ABOUT)
            .arg(
                Arg::new("distribution")
                    .long("distribution")
                    .takes_value(true)
                    .multiple_occurrences(true)
                    .help("Name of a distribution to process. Discovered if not specified"),
            )
            .arg(
                Arg::new("url")
                    .required(true)
                    .help("URL or path of the repository"),
            ),
    );

    let mut app =
        app.subcommand(Command::new("urls").about("Print documentation about repository URLs"));

    let matches = app.clone().get_matches();

    let log_level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level.as_str()),
    );

    // Disable log context except at higher log levels.
    if log_level <= LevelFilter::Info {
        builder
            .format_timestamp(None)
            .format_level(false)
            .format_target(false);
    }

    builder.init();

    match matches.subcommand() {
        Some(("scan", args)) => command_scan(args).await,
        Some(("release", args)) => command_release(args).await,
        Some(("build-ids", args)) => command_build_ids(args).await,
        Some(("urls", _)) => {
            println!("{}", URLS_ABOUT);
            Ok(())
        }
        Some((command, _)) => Err(DitError::InvalidSubCommand(command.to_string())),
        None => {
            app.print_help()?;
            Ok(())
        }
    }
}

async fn command_scan(args: &ArgMatches) -> Result<()> {
    let config = if let Some(yaml_path) = args.value_of_os("yaml-config") {
        let f = std::fs::File::open(yaml_path)?;
        serde_yaml::from_reader::<_, ScanConfig>(f)?
    } else {
        ScanConfig {
            url: required_value(args, "url")?.to_string(),
            ..Default::default()
        }
    };

    let repo = open_repository(&config.url, config.distributions.as_deref())?;

    scan_repository(&mut std::io::stdout().lock(), &repo, &config).await
}

async fn command_release(args: &ArgMatches) -> Result<()> {
    let repo = open_repository(required_value(args, "url")?, None)?;
    let release = repo.release(required_value(args, "distribution")?);

    let document = release.document().await?;

    write_release_fields(&mut std::io::stdout().lock(), document.iter_field_values())
}

async fn command_build_ids(args: &ArgMatches) -> Result<()> {
    let distributions = args
        .values_of("distribution")
        .map(|values| values.map(String::from).collect::<Vec<_>>());

    let repo = open_repository(required_value(args, "url")?, distributions.as_deref())?;

    build_id_report(&mut std::io::stdout().lock(), &repo).await
}

#[cfg(test)]
mod test {
    use {super::*, debian_index::repository::memory::MemoryRepository, indoc::indoc};

    fn repository() -> Repository {
        let mut memory = MemoryRepository::default();
        memory.insert(
            "dists/stable/Release",
            "Components: main contrib\nArchitectures: amd64\n",
        );
        memory.insert("dists/stable/Release.gpg", "signature");
        memory.insert(
            "dists/stable/main/binary-amd64/Packages",
            indoc! {"
                Package: libc6-dbg
                Version: 2.31-13
                Build-Ids: 1234 5678
                SHA256: abcd

                Package: libc6
                Version: 2.31-13
                SHA256: ef01
            "},
        );
        memory.insert(
            "dists/stable/contrib/binary-amd64/Packages",
            "Package: extra\nVersion: 1\n",
        );

        Repository::new(memory)
    }

    #[tokio::test]
    async fn scan_output() -> Result<()> {
        let mut out = vec![];
        scan_repository(&mut out, &repository(), &ScanConfig::default()).await?;

        assert_eq!(
            String::from_utf8_lossy(&out),
            indoc! {"
                Failed to load packages for main / all: no Packages file at memory:///dists/stable/main/binary-all/Packages
                PACKAGE libc6 in main / amd64
                PACKAGE libc6-dbg in main / amd64
                BUILDIDS 1234 5678
                Failed to load packages for contrib / all: no Packages file at memory:///dists/stable/contrib/binary-all/Packages
                PACKAGE extra in contrib / amd64
            "}
        );

        Ok(())
    }

    #[tokio::test]
    async fn scan_filters() -> Result<()> {
        let config = ScanConfig {
            only_components: Some(vec!["contrib".into()]),
            only_architectures: Some(vec!["amd64".into()]),
            ..Default::default()
        };

        let mut out = vec![];
        scan_repository(&mut out, &repository(), &config).await?;

        assert_eq!(
            String::from_utf8_lossy(&out),
            "PACKAGE extra in contrib / amd64\n"
        );

        Ok(())
    }

    #[tokio::test]
    async fn build_ids_output() -> Result<()> {
        let mut out = vec![];
        build_id_report(&mut out, &repository()).await?;

        assert_eq!(
            String::from_utf8_lossy(&out),
            "BID;1234;abcd\nBID;5678;abcd\nSHA;abcd;libc6-dbg;2.31-13\n"
        );

        Ok(())
    }

    #[tokio::test]
    async fn release_fields_output() -> Result<()> {
        let repo = repository();
        let release = repo.release("stable");
        let document = release.document().await?;

        let mut out = vec![];
        write_release_fields(&mut out, document.iter_field_values())?;

        assert_eq!(
            String::from_utf8_lossy(&out),
            "Components: main contrib\nArchitectures: amd64\n"
        );

        Ok(())
    }

    #[test]
    fn scan_config_yaml() -> Result<()> {
        let config: ScanConfig = serde_yaml::from_str(indoc! {"
            url: http://deb.debian.org/debian
            distributions:
              - bullseye
            only_components:
              - main
        "})?;

        assert_eq!(config.url, "http://deb.debian.org/debian");
        assert_eq!(config.distributions, Some(vec!["bullseye".to_string()]));
        assert_eq!(config.only_components, Some(vec!["main".to_string()]));
        assert!(config.only_architectures.is_none());

        assert!(serde_yaml::from_str::<ScanConfig>("url: x\nbogus: 1\n").is_err());

        Ok(())
    }
}
