use anyhow::anyhow;
use serde_json::Value;
use taskdeck::auth::parse_token_claims;
use taskdeck::tasks::{TaskPatch, TaskStatus, TaskStore};
use taskdeck::ApiClient;
use taskdeck_cli::pretty::{pp_task, pp_task_list};
use taskdeck_cli::*;

use colored_json::to_colored_json_auto;
use log::{self, debug};
use std::io::Write;
use std::path::PathBuf;
use structopt::StructOpt;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

#[derive(StructOpt)]
#[structopt(
    rename_all = "kebab-case",
    about = "CLI client for a taskdeck task-management server"
)]
struct Opt {
    #[structopt(
        global = true,
        long = "--host",
        env = "TASKDECK_HOST",
        default_value = "http://localhost:8080"
    )]
    host: String,

    /// Where the session token pair is stored between runs. Defaults to
    /// taskdeck/session.json under the platform config directory.
    #[structopt(
        global = true,
        long = "--session-file",
        env = "TASKDECK_SESSION",
        parse(from_os_str)
    )]
    session_file: Option<PathBuf>,

    /// Log more messages. Pass multiple times for ever more verbosity
    ///
    /// By default, it'll only report errors. Passing `-v` one time also prints
    /// warnings, `-vv` enables info logging, `-vvv` debug, and `-vvvv` trace.
    #[structopt(global = true, long, short = "v", parse(from_occurrences))]
    verbose: i8,

    #[structopt(long = "--shell-completions", hidden = true)]
    shell_completions: Option<structopt::clap::Shell>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
enum AccountCommand {
    /// Register a new account (does not log you in)
    Register {
        #[structopt(long, short)]
        username: String,

        #[structopt(long, short)]
        password: String,

        /// Must match --password
        #[structopt(long)]
        confirm_password: String,
    },
    Login {
        #[structopt(long, short)]
        username: String,

        #[structopt(long, short)]
        password: String,
    },
    /// Drop the stored session tokens. Local only, no network call
    Logout,
}

#[derive(StructOpt)]
enum Command {
    /// List all tasks
    List {
        /// Print the raw JSON instead of the colored listing
        #[structopt(long)]
        json: bool,
    },

    /// Show a single task as JSON
    Show { id: i64 },

    /// Create a new task; the server starts it out as "pending"
    Add { title: String },

    /// Change a task's title and/or status
    Update {
        id: i64,

        #[structopt(long)]
        title: Option<String>,

        /// "pending" or "done"
        #[structopt(long)]
        status: Option<TaskStatus>,
    },

    /// Flip a task between pending and done
    Toggle { id: i64 },

    /// Delete a task
    Delete { id: i64 },

    /// Sub-commands for managing the account and session
    Account {
        #[structopt(subcommand)]
        cmd: AccountCommand,
    },

    /// Summarize connection and authentication with the server
    Status,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let opt = Opt::from_args();

    let log_level = match opt.verbose {
        std::i8::MIN..=-1 => "none",
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        4..=std::i8::MAX => "trace",
    };
    // hyper logging is very verbose, so crank that down even if everything else is more verbose
    let log_filter = format!("{},hyper=error", log_level);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter))
        .format_timestamp(None)
        .init();

    debug!("Args parsed, starting up");

    #[cfg(windows)]
    colored_json::enable_ansi_support();

    if let Some(shell) = opt.shell_completions {
        Opt::clap().gen_completions_to("taskdeck", shell, &mut std::io::stdout());
        std::process::exit(0);
    }

    if let Err(err) = run(opt) {
        // Be graceful about some errors
        if let Some(io_err) = err.root_cause().downcast_ref::<std::io::Error>() {
            if let std::io::ErrorKind::BrokenPipe = io_err.kind() {
                // presumably due to something like writing to stdout and piped to `head -n10` and
                // stdout was closed
                debug!("got BrokenPipe error, assuming stdout closed as expected and exiting with success");
                std::process::exit(0);
            }
        }
        let mut color_stderr = StandardStream::stderr(if atty::is(atty::Stream::Stderr) {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        });
        color_stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        eprintln!("Error: {:?}", err);
        color_stderr.set_color(&ColorSpec::new())?;
        std::process::exit(1);
    }
    Ok(())
}

fn print_result_json(result: Option<Value>) -> anyhow::Result<()> {
    if let Some(val) = result {
        writeln!(&mut std::io::stdout(), "{}", to_colored_json_auto(&val)?)?
    };
    Ok(())
}

fn default_session_file() -> anyhow::Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or(anyhow!("no config directory on this platform; pass --session-file"))?;
    Ok(dir.join("taskdeck").join("session.json"))
}

fn run(opt: Opt) -> anyhow::Result<()> {
    let session_file = match opt.session_file.clone() {
        Some(path) => path,
        None => default_session_file()?,
    };
    let mut client = ApiClient::connect(&opt.host, session_file.clone())?;

    match opt.cmd {
        Command::Account {
            cmd:
                AccountCommand::Register {
                    username,
                    password,
                    confirm_password,
                },
        } => {
            validate_username(&username)?;
            validate_password(&password)?;
            validate_confirmation(&password, &confirm_password)?;
            let message = client.register(&username, &password)?;
            println!("{}", message);
            println!("You can now log in with `taskdeck account login`.");
        }
        Command::Account {
            cmd: AccountCommand::Login { username, password },
        } => {
            validate_username(&username)?;
            if password.is_empty() {
                return Err(anyhow!("password is required"));
            }
            client.login(&username, &password)?;
            println!("Logged in as {}.", username);
        }
        Command::Account {
            cmd: AccountCommand::Logout,
        } => {
            client.logout();
            println!("Logged out.");
        }
        Command::Status => {
            println!("Configuration");
            println!("  host: {}", opt.host);
            println!("  session file: {}", session_file.display());
            let session = client.session();
            if session.is_authenticated {
                println!("  authenticated: yes");
                if let Some(token) = &session.access_token {
                    match parse_token_claims(token) {
                        Ok(claims) => {
                            if let Some(username) = claims.username {
                                println!("  username: {}", username);
                            }
                            if let Some(exp) = claims.expires_at {
                                println!("  access token expires: {} (unix)", exp);
                            }
                        }
                        Err(err) => debug!("could not parse access token claims: {}", err),
                    }
                }
            } else {
                println!("  authenticated: no");
            }
        }
        Command::List { json } => {
            let mut store = TaskStore::new();
            store.fetch_all(&mut client)?;
            if json {
                print_result_json(Some(serde_json::to_value(store.tasks())?))?;
            } else {
                pp_task_list(store.tasks())?;
            }
        }
        Command::Show { id } => {
            let mut store = TaskStore::new();
            let task = store.get(&mut client, id)?;
            print_result_json(Some(serde_json::to_value(&task)?))?;
        }
        Command::Add { title } => {
            validate_title(&title)?;
            let mut store = TaskStore::new();
            let task = store.add(&mut client, &title)?;
            pp_task(&task)?;
        }
        Command::Update { id, title, status } => {
            if let Some(ref new_title) = title {
                validate_title(new_title)?;
            }
            let patch = TaskPatch { title, status };
            if patch.is_empty() {
                return Err(anyhow!("nothing to update: pass --title and/or --status"));
            }
            let mut store = TaskStore::new();
            let task = store.update(&mut client, id, &patch)?;
            pp_task(&task)?;
        }
        Command::Toggle { id } => {
            // toggling derives the new status from the current one, so the
            // list has to be fetched first
            let mut store = TaskStore::new();
            store.fetch_all(&mut client)?;
            let task = store.toggle(&mut client, id)?;
            pp_task(&task)?;
        }
        Command::Delete { id } => {
            let mut store = TaskStore::new();
            store.remove(&mut client, id)?;
            println!("Deleted task {}.", id);
        }
    }
    Ok(())
}
