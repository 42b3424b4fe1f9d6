//! Terminal front end for the follow-for-follow funnel.
//!
//! Walks one visitor through register → spin → follow → outreach against the
//! configured backend. Prompts go to stdout, diagnostics to stderr.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use funnel::core::selector::{RandomSelector, SpinPlan};
use funnel::core::types::{FlowState, MESSAGE_SOFT_LIMIT};
use funnel::error::{FlowError, Severity};
use funnel::exit_codes;
use funnel::flow::{Completion, SessionFlow};
use funnel::io::backend::HttpBackend;
use funnel::io::clipboard::{SystemClipboard, SystemOpener, UrlOpener};
use funnel::io::config::{DEFAULT_CONFIG_FILE, FunnelConfig, load_config, write_config};
use funnel::logging;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "funnel",
    version,
    about = "Follow-for-follow growth funnel in the terminal"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// More diagnostics on stderr (repeat for more).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file if it does not exist.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// List the projects a visitor can pick.
    Projects,
    /// Walk through one session interactively.
    Run(RunArgs),
}

#[derive(clap::Args, Debug, Clone)]
struct RunArgs {
    /// Your handle on the social platform (leading `@` optional).
    #[arg(long)]
    handle: String,

    /// Project you are bullish on (see `funnel projects`).
    #[arg(long)]
    project: String,

    /// Open profile and post links in the default browser.
    #[arg(long)]
    open: bool,

    /// Skip the spin animation.
    #[arg(long)]
    no_animation: bool,

    /// Seed the draw for a reproducible session.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Projects => cmd_projects(&cli.config),
        Command::Run(args) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("build async runtime")?;
            runtime.block_on(cmd_run(&cli.config, args))
        }
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        println!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &FunnelConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_projects(config_path: &Path) -> Result<i32> {
    let cfg = load_effective_config(config_path)?;
    for name in cfg.catalog().names() {
        println!("{name}");
    }
    Ok(exit_codes::OK)
}

fn load_effective_config(config_path: &Path) -> Result<FunnelConfig> {
    let mut cfg = load_config(config_path)?;
    cfg.apply_env(|key| std::env::var(key).ok());
    cfg.validate().context("validate config after env overrides")?;
    Ok(cfg)
}

async fn cmd_run(config_path: &Path, args: RunArgs) -> Result<i32> {
    let cfg = load_effective_config(config_path)?;
    let backend = HttpBackend::new(&cfg.backend.base_url, cfg.request_timeout())?;
    let selector = args
        .seed
        .map(RandomSelector::seeded)
        .unwrap_or_default();
    let flow = SessionFlow::new(cfg.catalog(), selector).with_spin_settings(cfg.spin_settings());
    info!(base_url = backend.base_url(), "starting session");

    let mut driver = Driver {
        flow,
        backend,
        console: Console::new(),
        clipboard: SystemClipboard::default(),
        opener: SystemOpener::default(),
        args,
    };
    driver.drive().await
}

/// What the driver loop should do after a step.
enum Step {
    Continue,
    Quit(i32),
}

struct Driver {
    flow: SessionFlow,
    backend: HttpBackend,
    console: Console,
    clipboard: SystemClipboard,
    opener: SystemOpener,
    args: RunArgs,
}

impl Driver {
    async fn drive(&mut self) -> Result<i32> {
        let (handle, project) = (self.args.handle.clone(), self.args.project.clone());
        if let Err(err) = self.flow.register(&self.backend, &handle, &project).await {
            report(&err);
            return Ok(exit_codes::for_error(&err));
        }
        if let Some(record) = self.flow.record() {
            println!(
                "Welcome @{}! You're in for {}.",
                record.handle, record.affinity
            );
        }

        loop {
            let step = match self.flow.state() {
                FlowState::Registering => Step::Quit(exit_codes::INVALID),
                FlowState::Drawing => self.draw_step().await?,
                FlowState::Reviewing => self.review_step().await?,
                FlowState::Outreach => self.outreach_step().await?,
            };
            if let Step::Quit(code) = step {
                return Ok(code);
            }
        }
    }

    async fn draw_step(&mut self) -> Result<Step> {
        let plan = match self.flow.spin() {
            Ok(plan) => plan,
            Err(err) => {
                report(&err);
                return Ok(Step::Quit(exit_codes::for_error(&err)));
            }
        };
        animate(&plan, self.args.no_animation).await?;

        loop {
            let Some(choice) = self.console.ask("[c]ontinue, [s]pin again, [q]uit > ")? else {
                return Ok(Step::Quit(exit_codes::OK));
            };
            match choice.as_str() {
                "" | "c" => match self.flow.confirm_draw(&self.backend).await {
                    Ok(_) => return Ok(Step::Continue),
                    Err(err) => report(&err),
                },
                "s" => return Ok(Step::Continue),
                "q" => return Ok(Step::Quit(exit_codes::OK)),
                other => println!("unknown choice '{other}'"),
            }
        }
    }

    async fn review_step(&mut self) -> Result<Step> {
        self.print_peers();
        let prompt = if self.flow.tracker().is_all_followed() {
            "All followed! [g]enerate message, [r]eset, [f]resh peers, [n]ew draw, [q]uit > "
        } else {
            "peer number or @handle to follow, [r]eset, [f]resh peers, [n]ew draw, [q]uit > "
        };
        let Some(choice) = self.console.ask(prompt)? else {
            return Ok(Step::Quit(exit_codes::OK));
        };

        let result = match choice.as_str() {
            "g" => self.flow.generate_outreach(&self.backend).await.map(drop),
            "r" => self.flow.reset_review(),
            "f" => self.flow.refresh_peers(&self.backend).await.map(drop),
            "n" => self.flow.restart(),
            "q" => return Ok(Step::Quit(exit_codes::OK)),
            "" => Ok(()),
            other => self.follow(other),
        };
        if let Err(err) = result {
            report(&err);
        }
        Ok(Step::Continue)
    }

    fn follow(&mut self, choice: &str) -> Result<(), FlowError> {
        let handle = match choice.parse::<usize>() {
            Ok(n) => match n.checked_sub(1).and_then(|i| self.flow.peers().get(i)) {
                Some(peer) => peer.handle.clone(),
                None => {
                    return Err(FlowError::invalid_input(format!(
                        "no peer numbered {n}"
                    )));
                }
            },
            Err(_) => choice.to_string(),
        };
        let url = self.flow.tracker().profile_url(&handle);
        self.flow.follow(&handle)?;
        if let Some(url) = url {
            self.show_link("Profile", &url);
        }
        Ok(())
    }

    async fn outreach_step(&mut self) -> Result<Step> {
        if let Some(message) = self.flow.message() {
            println!("\n{}\n", message.text());
            println!("Characters: {}/{}", message.char_count(), MESSAGE_SOFT_LIMIT);
            if message.exceeds_soft_limit() {
                println!("(longer than a single post; consider trimming before posting)");
            }
        }
        let Some(choice) = self.console.ask(
            "[c]opy, [p]ost, [r]eset follows, [f]resh peers, [n]ew draw, [q]uit > ",
        )?
        else {
            return Ok(Step::Quit(exit_codes::OK));
        };

        let result = match choice.as_str() {
            "c" => self
                .flow
                .copy_to_clipboard(&self.clipboard)
                .map(|()| println!("Message copied to clipboard!")),
            "p" => match self.flow.request_post_intent(&self.backend).await {
                Ok(Completion::Applied(url)) => {
                    self.show_link("Post", &url);
                    Ok(())
                }
                Ok(Completion::Discarded) => Ok(()),
                Err(err) => Err(err),
            },
            "r" => self.flow.reset_review(),
            "f" => self.flow.refresh_peers(&self.backend).await.map(drop),
            "n" => self.flow.restart(),
            "q" => return Ok(Step::Quit(exit_codes::OK)),
            other => {
                println!("unknown choice '{other}'");
                Ok(())
            }
        };
        if let Err(err) = result {
            report(&err);
        }
        Ok(Step::Continue)
    }

    fn print_peers(&self) {
        let tracker = self.flow.tracker();
        println!(
            "\nFollow these {} accounts ({} done):",
            tracker.peers().len(),
            tracker.followed_count()
        );
        for (index, peer) in tracker.peers().iter().enumerate() {
            let mark = if tracker.is_followed(&peer.handle) {
                "x"
            } else {
                " "
            };
            println!("  {}. [{mark}] @{}", index + 1, peer.handle);
        }
    }

    fn show_link(&self, label: &str, url: &str) {
        println!("{label}: {url}");
        if !self.args.open {
            return;
        }
        if let Err(err) = self.opener.open(url) {
            warn!(err = %format!("{err:#}"), "could not open link");
            eprintln!("warning: could not open {url}");
        }
    }
}

async fn animate(plan: &SpinPlan, skip: bool) -> Result<()> {
    let mut stdout = io::stdout();
    if !skip {
        for frame in plan.frames() {
            tokio::time::sleep(frame.delay).await;
            write!(stdout, "\r  spinning... {}", frame.value).context("write stdout")?;
            stdout.flush().context("flush stdout")?;
        }
        writeln!(stdout).context("write stdout")?;
    }
    writeln!(
        stdout,
        "You drew {0}: follow {0} accounts to unlock your message.",
        plan.result()
    )
    .context("write stdout")?;
    Ok(())
}

fn report(err: &FlowError) {
    let label = match err.severity() {
        Severity::Warning => "warning",
        Severity::Error => "error",
    };
    if err.is_retryable() {
        eprintln!("{label}: {err} (safe to retry)");
    } else {
        eprintln!("{label}: {err}");
    }
}

/// Line-oriented prompt reader over stdin.
struct Console {
    input: io::StdinLock<'static>,
}

impl Console {
    fn new() -> Self {
        Self {
            input: io::stdin().lock(),
        }
    }

    /// Print `prompt` and read one trimmed line. `None` on end of input.
    fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        print!("{prompt}");
        io::stdout().flush().context("flush stdout")?;
        let mut line = String::new();
        let read = self.input.read_line(&mut line).context("read stdin")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["funnel", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn parse_init_force_with_config() {
        let cli = Cli::parse_from(["funnel", "--config", "alt.toml", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
        assert_eq!(cli.config, PathBuf::from("alt.toml"));
    }

    #[test]
    fn parse_run() {
        let cli = Cli::parse_from([
            "funnel", "run", "--handle", "@me", "--project", "Sign", "--seed", "7",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.handle, "@me");
        assert_eq!(args.project, "Sign");
        assert_eq!(args.seed, Some(7));
        assert!(!args.open);
    }

    #[test]
    fn run_requires_handle_and_project() {
        assert!(Cli::try_parse_from(["funnel", "run", "--handle", "me"]).is_err());
    }
}
