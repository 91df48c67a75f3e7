use crate::batch::Source;
use crate::config::Config;
use crate::downloader::Downloader;
use crate::speed::IpVersion;
use anyhow::{anyhow, Context};
use clap::{App, Arg, ArgMatches};
use colorful::{Color, Colorful};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// 需要执行的任务
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Save { url: String, path: Option<PathBuf> },
    Multi { source: Source, output: Option<PathBuf> },
    Ftp { url: String, path: Option<PathBuf> },
    Unzip { url: String, extract: Option<PathBuf>, delete_after: bool },
    Clone { url: String, dir: Option<PathBuf> },
    Text { url: String, encoding: Option<String> },
    Json { url: String },
    Headers { url: String, follow_redirects: bool },
    Speed { size: u32, ipv: IpVersion, port: u16 },
}

/// 命令行参数,保存用户输入的各个参数
pub struct CommandArgument {
    command: Option<Command>,
    config: Config,
}

fn url_arg() -> Arg<'static> {
    Arg::new("url").help("download url").required(true).index(1)
}

fn path_arg() -> Arg<'static> {
    Arg::new("path")
        .short('o')
        .long("output")
        .help("where to save the file")
        .takes_value(true)
}

fn app() -> App<'static> {
    App::new("grab")
        .version(env!("CARGO_PKG_VERSION"))
        .author("chenlinfeng")
        .about("download files over http(s) and ftp")
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .short('t')
                .help("request timeout in seconds")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .help("replace files that already exist")
                .global(true),
        )
        .arg(
            Arg::new("quiet-errors")
                .long("quiet-errors")
                .help("report failures as empty results instead of errors")
                .global(true),
        )
        .subcommand(App::new("save").about("save one file").arg(url_arg()).arg(path_arg()))
        .subcommand(
            App::new("multi")
                .about("download many files in parallel")
                .arg(
                    Arg::new("url")
                        .short('u')
                        .long("url")
                        .help("download url")
                        .multiple_values(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::new("input")
                        .long("input")
                        .short('i')
                        .help("the filename include urls")
                        .takes_value(true),
                )
                .arg(
                    Arg::new("output")
                        .help("output path")
                        .long("output")
                        .short('o')
                        .takes_value(true),
                )
                .arg(
                    Arg::new("concurrency")
                        .short('c')
                        .long("concurrency")
                        .help("download threads")
                        .takes_value(true),
                )
                .arg(
                    Arg::new("poll")
                        .long("poll")
                        .help("wait for free threads by polling every N seconds")
                        .takes_value(true),
                ),
        )
        .subcommand(App::new("ftp").about("save a file from an ftp server").arg(url_arg()).arg(path_arg()))
        .subcommand(
            App::new("unzip")
                .about("save a zip archive and extract it")
                .arg(url_arg())
                .arg(
                    Arg::new("extract")
                        .short('o')
                        .long("output")
                        .help("extraction directory")
                        .takes_value(true),
                )
                .arg(Arg::new("delete").long("delete").help("remove the archive afterwards")),
        )
        .subcommand(
            App::new("clone")
                .about("fetch a repository through its zip archive")
                .arg(url_arg())
                .arg(path_arg()),
        )
        .subcommand(
            App::new("text").about("print a remote text file").arg(url_arg()).arg(
                Arg::new("encoding")
                    .short('e')
                    .long("encoding")
                    .help("character encoding")
                    .takes_value(true),
            ),
        )
        .subcommand(App::new("json").about("print a remote json document").arg(url_arg()))
        .subcommand(
            App::new("headers")
                .about("print the reply headers")
                .arg(url_arg())
                .arg(Arg::new("no-redirect").long("no-redirect").help("do not follow redirects")),
        )
        .subcommand(
            App::new("speed")
                .about("measure download speed")
                .arg(
                    Arg::new("size")
                        .short('s')
                        .long("size")
                        .help("test file size in MB")
                        .default_value("5")
                        .takes_value(true),
                )
                .arg(Arg::new("ipv6").long("ipv6").help("use the ipv6 test host"))
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .default_value("80")
                        .takes_value(true),
                ),
        )
}

fn number<T: std::str::FromStr>(matcher: &ArgMatches, name: &str) -> Result<Option<T>, String> {
    match matcher.value_of(name) {
        None => Ok(None),
        Some(val) => val
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("invalid value for --{}: {}", name, val)),
    }
}

fn seconds(matcher: &ArgMatches, name: &str) -> Result<Option<Duration>, String> {
    match number::<f64>(matcher, name)? {
        Some(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs)
            .map(Some)
            .map_err(|_| format!("--{} must be a positive number of seconds", name)),
        Some(_) => Err(format!("--{} must be positive", name)),
        None => Ok(None),
    }
}

fn required(matcher: &ArgMatches, name: &str) -> String {
    matcher.value_of(name).unwrap_or_default().to_string()
}

fn optional_path(matcher: &ArgMatches, name: &str) -> Option<PathBuf> {
    matcher.value_of(name).map(PathBuf::from)
}

impl Default for CommandArgument {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandArgument {
    pub fn new() -> Self {
        Self {
            command: None,
            config: Config::default(),
        }
    }

    /// 解析命令行参数如果出现参数缺失将会返回相关错误信息
    pub fn parse(&mut self) -> Result<(), String> {
        let matcher = app().get_matches();
        self.read_matches(&matcher)
    }

    pub fn parse_from<I, T>(&mut self, args: I) -> Result<(), String>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matcher = app().try_get_matches_from(args).map_err(|err| err.to_string())?;
        self.read_matches(&matcher)
    }

    fn read_matches(&mut self, matcher: &ArgMatches) -> Result<(), String> {
        let (name, sub) = matcher.subcommand().ok_or("please choose a command, see --help")?;

        // 全局参数会传递到子命令
        let mut config = Config::default()
            .set_overwrite(sub.is_present("overwrite"))
            .set_raise_on_error(!sub.is_present("quiet-errors"));
        if let Some(timeout) = seconds(sub, "timeout")? {
            config = config.set_timeout(timeout);
        }

        let command = match name {
            "save" => Command::Save {
                url: required(sub, "url"),
                path: optional_path(sub, "path"),
            },
            "multi" => {
                let mut urls: Vec<String> = Vec::new();
                if let Some(values) = sub.values_of("url") {
                    urls.extend(values.map(str::to_string));
                }
                let source = match sub.value_of("input") {
                    Some(file) if urls.is_empty() => Source::File(PathBuf::from(file)),
                    Some(_) => return Err("use either --url or --input, not both".to_string()),
                    None if urls.is_empty() => return Err("please input url".to_string()),
                    None => Source::Inline(urls),
                };
                config = config.set_max_threads(number::<usize>(sub, "concurrency")?.unwrap_or(8));
                if let Some(poll) = seconds(sub, "poll")? {
                    config = config.set_poll_interval(poll);
                }
                Command::Multi {
                    source,
                    output: optional_path(sub, "output"),
                }
            }
            "ftp" => Command::Ftp {
                url: required(sub, "url"),
                path: optional_path(sub, "path"),
            },
            "unzip" => Command::Unzip {
                url: required(sub, "url"),
                extract: optional_path(sub, "extract"),
                delete_after: sub.is_present("delete"),
            },
            "clone" => Command::Clone {
                url: required(sub, "url"),
                dir: optional_path(sub, "path"),
            },
            "text" => Command::Text {
                url: required(sub, "url"),
                encoding: sub.value_of("encoding").map(str::to_string),
            },
            "json" => Command::Json {
                url: required(sub, "url"),
            },
            "headers" => Command::Headers {
                url: required(sub, "url"),
                follow_redirects: !sub.is_present("no-redirect"),
            },
            "speed" => Command::Speed {
                size: number::<u32>(sub, "size")?.unwrap_or(5),
                ipv: if sub.is_present("ipv6") { IpVersion::V6 } else { IpVersion::V4 },
                port: number::<u16>(sub, "port")?.unwrap_or(80),
            },
            other => return Err(format!("unknown command {}", other)),
        };
        self.command = Some(command);
        self.config = config;
        Ok(())
    }

    /// 获取需要执行的任务
    pub fn get_command(&self) -> Option<&Command> {
        self.command.as_ref()
    }

    pub fn get_config(&self) -> &Config {
        &self.config
    }
}

/// 执行解析好的命令
pub fn run(command: &Command, config: Config) -> anyhow::Result<()> {
    let downloader = Downloader::new().set_config(config);
    debug!("{}", downloader);
    match command {
        Command::Save { url, path } => {
            let saved = downloader
                .save(url, path.as_deref())
                .with_context(|| format!("could not save {}", url))?;
            report_path(&saved);
        }
        Command::Multi { source, output } => {
            let report = downloader
                .run_batch(source, output.as_deref())
                .context("could not start the batch")?;
            for outcome in &report.outcomes {
                match (&outcome.error, &outcome.local_path) {
                    (Some(err), _) => println!("{}", format!("failed {}: {}", outcome.request.url, err).color(Color::Red)),
                    (None, Some(path)) if outcome.skipped => {
                        println!("{}", format!("exists {}", path.display()).color(Color::Yellow))
                    }
                    (None, Some(path)) => println!("{}", format!("saved {}", path.display()).color(Color::Green)),
                    (None, None) => {}
                }
            }
            let failed = report.failures().count();
            if failed > 0 && downloader.config().raise_on_error {
                return Err(anyhow!("{} of {} download(s) failed", failed, report.outcomes.len()));
            }
        }
        Command::Ftp { url, path } => {
            let saved = downloader
                .ftp(url, path.as_deref())
                .with_context(|| format!("could not fetch {}", url))?;
            report_path(&saved);
        }
        Command::Unzip { url, extract, delete_after } => {
            let dir = downloader
                .save_unzip(url, extract.as_deref(), *delete_after)
                .with_context(|| format!("could not unpack {}", url))?;
            report_path(&dir);
        }
        Command::Clone { url, dir } => {
            let dir = downloader
                .git_clone(url, dir.as_deref())
                .with_context(|| format!("could not clone {}", url))?;
            report_path(&dir);
        }
        Command::Text { url, encoding } => {
            print!("{}", downloader.text(url, encoding.as_deref())?);
        }
        Command::Json { url } => {
            println!("{}", serde_json::to_string_pretty(&downloader.json(url)?)?);
        }
        Command::Headers { url, follow_redirects } => {
            let mut headers: Vec<(String, String)> = downloader.headers(url, *follow_redirects)?.into_iter().collect();
            headers.sort();
            for (name, value) in headers {
                println!("{}: {}", name.color(Color::Cyan), value);
            }
        }
        Command::Speed { size, ipv, port } => {
            let report = downloader.down_speed(*size, *ipv, *port)?;
            println!("{}", format!("{}MB: {}", size, report).gradient(Color::Green).bold());
        }
    }
    Ok(())
}

fn report_path(path: &std::path::Path) {
    if path.as_os_str().is_empty() {
        println!("{}", "nothing saved".color(Color::Yellow));
    } else {
        println!("{}", format!("saved to {}", path.display()).color(Color::Green));
    }
}

pub fn execute() -> anyhow::Result<()> {
    let mut command = CommandArgument::new();
    command.parse().map_err(|err| anyhow!(err))?;
    let task = command
        .get_command()
        .cloned()
        .ok_or_else(|| anyhow!("please input a command"))?;
    run(&task, command.get_config().clone())
}
