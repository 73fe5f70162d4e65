//! CLI entry point for `mailtide`.

use std::io::{BufRead, Read, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailtide::config::{self, clamp_limit, Config};
use mailtide::error::MailError;
use mailtide::export::attachment::AttachmentWriter;
use mailtide::i18n;
use mailtide::mailbox::imap::ImapConnector;
use mailtide::model::message::{ParsedMessage, Retrieval};
use mailtide::parser::mime::MessageParser;
use mailtide::retrieve::{retrieve, RetrieveRequest};
use mailtide::send::{send_message, OutgoingMessage};

#[derive(Parser)]
#[command(name = "mailtide", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Language (en, ru). Defaults to the config file, then the system locale.
    #[arg(long, value_name = "LANG", global = true)]
    lang: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message
    Send {
        /// Recipient address
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "")]
        subject: String,
        /// Message text; read from stdin when omitted
        #[arg(long)]
        body: Option<String>,
        /// File to attach (repeatable)
        #[arg(long = "attach", value_name = "PATH")]
        attachments: Vec<PathBuf>,
    },
    /// Read recent messages
    Read {
        /// How many messages; non-positive or invalid values use the configured default
        #[arg(short = 'n', long, value_name = "N")]
        limit: Option<String>,
        /// Only unread messages
        #[arg(long)]
        unseen: bool,
        /// Mark each shown message as read
        #[arg(long)]
        mark_read: bool,
        #[arg(long)]
        json: bool,
    },
    /// Config file helpers
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file
    Init,
    /// Print the config file location
    Path,
}

/// Detect language early from the --lang arg, before clap processes --help.
fn lang_from_args() -> Option<i18n::Lang> {
    let args: Vec<String> = std::env::args().collect();
    for (i, arg) in args.iter().enumerate() {
        if arg == "--lang" {
            if let Some(lang) = args.get(i + 1).and_then(|c| i18n::Lang::from_code(c)) {
                return Some(lang);
            }
        }
        if let Some(lang) = arg.strip_prefix("--lang=").and_then(i18n::Lang::from_code) {
            return Some(lang);
        }
    }
    None
}

/// Build a localized clap Command using i18n strings.
fn build_localized_command() -> clap::Command {
    let mut cmd = Cli::command()
        .about(i18n::app_about())
        .after_help(i18n::app_after_help());

    let subcommands: Vec<clap::Command> = cmd
        .get_subcommands()
        .map(|sub| {
            let about = match sub.get_name() {
                "send" => Some(i18n::help_cmd_send()),
                "read" => Some(i18n::help_cmd_read()),
                "config" => Some(i18n::help_cmd_config()),
                "completions" => Some(i18n::help_cmd_completions()),
                "manpage" => Some(i18n::help_cmd_manpage()),
                _ => None,
            };
            match about {
                Some(about) => sub.clone().about(about),
                None => sub.clone(),
            }
        })
        .collect();

    for sub in subcommands {
        cmd = cmd.mut_subcommand(sub.get_name().to_string(), |_| sub.clone());
    }

    cmd
}

fn main() -> ExitCode {
    let config = config::load_config();

    // Language must be known before clap renders --help
    let lang = lang_from_args()
        .or_else(|| config.general.lang.as_deref().and_then(i18n::Lang::from_code))
        .unwrap_or_else(i18n::detect_system_lang);
    i18n::set_lang(lang);

    let matches = build_localized_command().get_matches();
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Option<Commands>, config: &Config) -> anyhow::Result<()> {
    match command {
        None => cmd_interactive(config),
        Some(Commands::Send {
            to,
            subject,
            body,
            attachments,
        }) => {
            let body = match body {
                Some(body) => body,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            cmd_send(
                config,
                &OutgoingMessage {
                    to,
                    subject,
                    body,
                    attachments,
                },
            )
        }
        Some(Commands::Read {
            limit,
            unseen,
            mark_read,
            json,
        }) => {
            let request = RetrieveRequest {
                limit: resolve_limit(limit.as_deref().unwrap_or(""), config),
                unseen_only: unseen,
                mark_as_read: mark_read,
            };
            cmd_read(config, request, json)
        }
        Some(Commands::Config { action }) => cmd_config(action),
        Some(Commands::Completions { shell }) => cmd_completions(shell),
        Some(Commands::Manpage) => cmd_manpage(),
    }
}

/// Print a failure, naming the stage that produced it when known.
fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<MailError>() {
        Some(mail_err) => eprintln!(
            "{} ({}): {mail_err}",
            i18n::err_prefix(),
            i18n::stage_name(mail_err.stage())
        ),
        None => eprintln!("{}: {err:#}", i18n::err_prefix()),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailtide.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn resolve_limit(input: &str, config: &Config) -> NonZeroUsize {
    let n = clamp_limit(input, config.retrieval.default_limit);
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

// ── Send ─────────────────────────────────────────────────────────

fn cmd_send(config: &Config, outgoing: &OutgoingMessage) -> anyhow::Result<()> {
    let credentials = config.credentials()?;
    let report = send_message(&config.smtp, &credentials, outgoing)?;

    for path in &report.skipped_attachments {
        eprintln!("{} {}", i18n::msg_attachment_missing(), path.display());
    }
    println!("{} {}", i18n::msg_sent_to(), outgoing.to.trim());
    Ok(())
}

// ── Read ─────────────────────────────────────────────────────────

fn cmd_read(config: &Config, request: RetrieveRequest, json: bool) -> anyhow::Result<()> {
    let credentials = config.credentials()?;
    let connector = ImapConnector::new(&config.imap, credentials);
    let writer = AttachmentWriter::new(&config.retrieval.attachment_dir);
    let parser = MessageParser::new(&writer);

    let pb = if json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} {} [{{bar:40.cyan/blue}}] {{pos}}/{{len}}",
                i18n::msg_fetching()
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let result = retrieve(
        &connector,
        &parser,
        &config.imap.folder,
        request,
        &|done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        },
    );
    pb.finish_and_clear();
    let retrieval = result?;

    if json {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, &retrieval)?;
        writeln!(out)?;
    } else {
        print_retrieval(&retrieval, config.retrieval.preview_chars);
    }
    Ok(())
}

fn print_retrieval(retrieval: &Retrieval, preview_chars: usize) {
    if retrieval.is_empty() {
        println!("{}", i18n::msg_no_messages());
        return;
    }

    for message in &retrieval.messages {
        print_message(message, preview_chars);
    }

    if !retrieval.failures.is_empty() {
        println!();
        println!("{}", i18n::msg_skipped());
        for failure in &retrieval.failures {
            println!(
                "  {} ({}): {}",
                failure.id,
                i18n::stage_name(failure.stage.into()),
                failure.reason
            );
        }
    }
}

fn print_message(message: &ParsedMessage, preview_chars: usize) {
    use humansize::{format_size, BINARY};

    println!("{}", "=".repeat(60));
    println!("{} {}", i18n::label_message(), message.id);
    println!("{:<9} {}", i18n::label_from(), message.sender);
    println!("{:<9} {}", i18n::label_subject(), message.subject);
    println!("{:<9} {}", i18n::label_date(), message.date);
    println!();
    println!(
        "{}",
        i18n::label_text().replace("{}", &preview_chars.to_string())
    );
    println!("{}", message.preview(preview_chars));
    println!();

    if message.attachments.is_empty() {
        println!("{}", i18n::msg_no_attachments());
        return;
    }
    println!("{}", i18n::label_saved_attachments());
    for path in &message.attachments {
        match std::fs::metadata(path) {
            Ok(meta) => println!("  - {} ({})", path.display(), format_size(meta.len(), BINARY)),
            Err(_) => println!("  - {}", path.display()),
        }
    }
}

// ── Interactive menu ─────────────────────────────────────────────

/// Print `label` and read one line. `None` on end of input.
fn prompt(input: &mut impl BufRead, label: &str) -> anyhow::Result<Option<String>> {
    print!("{label}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn cmd_interactive(config: &Config) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();

    println!("{}", i18n::menu_title());
    println!("{}", i18n::menu_send());
    println!("{}", i18n::menu_recent());
    println!("{}", i18n::menu_unseen());
    println!("{}", i18n::menu_quit());

    let Some(choice) = prompt(&mut input, i18n::prompt_choice())? else {
        println!("{}", i18n::msg_cancelled());
        return Ok(());
    };

    match choice.trim() {
        "1" => match read_outgoing(&mut input)? {
            Some(outgoing) => cmd_send(config, &outgoing),
            None => {
                println!("{}", i18n::msg_cancelled());
                Ok(())
            }
        },
        "2" => {
            let count = prompt(&mut input, i18n::prompt_recent_count())?.unwrap_or_default();
            cmd_read(config, RetrieveRequest::recent(resolve_limit(&count, config)), false)
        }
        "3" => {
            let count = prompt(&mut input, i18n::prompt_unseen_count())?.unwrap_or_default();
            cmd_read(
                config,
                RetrieveRequest::unseen_and_mark(resolve_limit(&count, config)),
                false,
            )
        }
        "q" | "Q" => {
            println!("{}", i18n::msg_goodbye());
            Ok(())
        }
        _ => {
            println!("{}", i18n::err_unknown_choice());
            Ok(())
        }
    }
}

/// Collect recipient, subject, body (up to an `END` line) and attachment paths.
fn read_outgoing(input: &mut impl BufRead) -> anyhow::Result<Option<OutgoingMessage>> {
    let Some(to) = prompt(input, i18n::prompt_to())? else {
        return Ok(None);
    };
    let Some(subject) = prompt(input, i18n::prompt_subject())? else {
        return Ok(None);
    };

    println!("{}", i18n::prompt_body());
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim() == "END" {
            break;
        }
        lines.push(line.to_string());
    }

    let attachments = prompt(input, i18n::prompt_attachments())?
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect();

    Ok(Some(OutgoingMessage {
        to: to.trim().to_string(),
        subject,
        body: lines.join("\n"),
        attachments,
    }))
}

// ── Config / completions / manpage ───────────────────────────────

fn cmd_config(action: ConfigAction) -> anyhow::Result<()> {
    let path = config::config_file_path()
        .ok_or_else(|| anyhow::anyhow!("{}", i18n::err_no_config_path()))?;

    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Init => {
            if path.exists() {
                println!("{} {}", i18n::msg_config_exists(), path.display());
            } else {
                let written = config::save_config(&Config::default())?;
                println!("{} {}", i18n::msg_config_written(), written.display());
            }
        }
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailtide", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::stdout().write_all(&buf)?;
    Ok(())
}
