//! Thin CLI layer: parse args, styled output, and call into modbisect-core.
//! Crash-proof: panic caught and reported; all errors return Result.

mod prompt;

use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use modbisect_core::{
    clear_session, default_config_path, init_state_dir, join_ids, load_config, load_mods,
    load_session, save_session, state_dir, ActivationPort, BisectError, Config, CulpritOracle,
    DirectoryActivator, MemoryActivator, ModIndex, Report, Session, SessionFile, SessionState,
    Snapshot, StepOutcome, TrialOffer, Verdict,
};

use crate::prompt::TerminalOracle;

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn warning(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.yellow());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

fn quiet() -> bool {
    modbisect_core::utils::is_quiet()
}

/// Spinner while scanning jars; hidden when quiet or not a TTY.
fn scan_spinner(message: &str) -> ProgressBar {
    if quiet() || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⠈⠐⠠⠰⠸⠹")
        .template("{spinner:.dim} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

fn to_msg(e: BisectError) -> String {
    match &e {
        BisectError::Activation(_) => format!(
            "{}\nFix the mod directory, then run `modbisect apply`.",
            e
        ),
        _ => e.to_string(),
    }
}

// ---- workspace: config + scanned mods + state dir ----

struct Workspace {
    config: Config,
    index: ModIndex,
}

fn config_path(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path)
}

fn open_workspace(matches: &ArgMatches) -> Result<Workspace, String> {
    let path = config_path(matches);
    let config = load_config(&path).map_err(to_msg)?;
    let spinner = scan_spinner(&format!("Scanning {}", config.root.display()));
    let index = load_mods(&config.root);
    spinner.finish_and_clear();
    Ok(Workspace {
        config,
        index: index.map_err(to_msg)?,
    })
}

fn load_active(ws: &Workspace) -> Result<SessionFile, String> {
    let file = load_session(&state_dir())
        .map_err(to_msg)?
        .ok_or_else(|| "No session in progress. Run `modbisect start` first.".to_string())?;
    file.check_fingerprint(&ws.index).map_err(to_msg)?;
    Ok(file)
}

fn save(file: &SessionFile) -> Result<(), String> {
    let dir = init_state_dir().map_err(|e| format!("Failed to create state directory: {}", e))?;
    save_session(&dir, file).map_err(to_msg)
}

fn new_session(ws: &Workspace) -> Result<SessionFile, String> {
    let input = ws.config.session_input(&ws.index).map_err(to_msg)?;
    let session = Session::start(input).map_err(to_msg)?;
    Ok(SessionFile::new(&ws.index, session))
}

/// Compute (or re-offer) the pending trial, persist it, then apply it to the mod directory.
fn apply_next(ws: &mut Workspace, file: &mut SessionFile) -> Result<Option<TrialOffer>, String> {
    let offer = file.session.next_offer().map_err(to_msg)?;
    save(file)?;
    if let Some(offer) = &offer {
        DirectoryActivator::new(&mut ws.index)
            .activate(&offer.enabled)
            .map_err(|e| to_msg(e.into()))?;
    }
    Ok(offer)
}

fn print_offer(offer: &TrialOffer, session: &Session) {
    info(&format!(
        "Trial {}: testing {} of {} suspects ({} mods enabled, about {} trials left).",
        offer.iteration,
        offer.probe.len(),
        session.undetermined().len(),
        offer.enabled.len(),
        session.estimated_trials_left()
    ));
}

fn print_report(report: &Report) {
    let lines = report.render();
    for (i, line) in lines.iter().enumerate() {
        if line.starts_with("Warning") {
            warning(line);
        } else if i > 0 {
            dim(line);
        } else {
            match report.state {
                SessionState::Converged { .. } => success(line),
                SessionState::Inconclusive => warning(line),
                SessionState::AwaitingTrial => info(line),
            }
        }
    }
}

fn print_snapshot(s: &Snapshot) {
    let verdict = match s.verdict {
        Verdict::Good => "good",
        Verdict::Bad => "bad",
    };
    dim(&format!(
        "#{} {:<4} probe: {} ({} enabled, {} left)",
        s.iteration,
        verdict,
        join_ids(&s.probe),
        s.enabled.len(),
        s.remaining.len()
    ));
    if !s.ambiguous_extras.is_empty() {
        warning(&format!(
            "Warning: enabled only as dependencies: {}",
            join_ids(&s.ambiguous_extras)
        ));
    }
}

/// Show the next trial, or the result once the session is finished.
fn announce(offer: Option<&TrialOffer>, session: &Session) {
    match offer {
        Some(offer) => {
            print_offer(offer, session);
            dim("Launch the game, then run `modbisect good` if the bug is gone or `modbisect bad` if it reproduces.");
        }
        None => {
            print_report(&session.report());
            dim("Run `modbisect reset` to re-enable every mod.");
        }
    }
}

// ---- commands ----

fn cmd_start(matches: &ArgMatches, force: bool) -> Result<(), String> {
    let mut ws = open_workspace(matches)?;
    if load_session(&state_dir()).map_err(to_msg)?.is_some() && !force {
        return Err(
            "A session is already in progress. Run `modbisect reset` or `modbisect start --force`."
                .to_string(),
        );
    }
    let mut file = new_session(&ws)?;
    let offer = apply_next(&mut ws, &mut file)?;
    success(&format!(
        "Session started: {} suspects, {} required.",
        file.session.candidates().universe().len(),
        file.session.required().len()
    ));
    announce(offer.as_ref(), &file.session);
    Ok(())
}

fn cmd_verdict(matches: &ArgMatches, verdict: Verdict) -> Result<(), String> {
    let mut ws = open_workspace(matches)?;
    let mut file = load_active(&ws)?;
    if file.session.is_terminal() {
        print_report(&file.session.report());
        return Err("Session already finished. Run `modbisect reset` to start over.".to_string());
    }
    // A verdict only counts for a trial that is actually on disk.
    let applied = match file.session.pending() {
        Some(offer) => ws.index.is_applied(&offer.enabled),
        None => {
            file.session.next_offer().map_err(to_msg)?;
            save(&file)?;
            false
        }
    };
    if !applied {
        let trial = file
            .session
            .pending()
            .map(|offer| format!("trial {}", offer.iteration))
            .unwrap_or_else(|| "the pending trial".to_string());
        return Err(format!(
            "The mod directory does not match {}. Run `modbisect apply` first.",
            trial
        ));
    }
    let snapshot = file.session.record_verdict(verdict).map_err(to_msg)?;
    print_snapshot(&snapshot);
    let offer = apply_next(&mut ws, &mut file)?;
    announce(offer.as_ref(), &file.session);
    Ok(())
}

fn cmd_apply(matches: &ArgMatches) -> Result<(), String> {
    let mut ws = open_workspace(matches)?;
    let mut file = load_active(&ws)?;
    let offer = apply_next(&mut ws, &mut file)?;
    if offer.is_some() {
        success("Trial applied to the mod directory.");
    }
    announce(offer.as_ref(), &file.session);
    Ok(())
}

fn cmd_run(matches: &ArgMatches) -> Result<(), String> {
    let mut ws = open_workspace(matches)?;
    let mut file = match load_session(&state_dir()).map_err(to_msg)? {
        Some(file) => {
            file.check_fingerprint(&ws.index).map_err(to_msg)?;
            info(&format!(
                "Resuming session ({} trials recorded).",
                file.session.history().len()
            ));
            file
        }
        None => new_session(&ws)?,
    };

    let mut oracle = TerminalOracle::stdin();
    loop {
        if let Some(offer) = file.session.next_offer().map_err(to_msg)? {
            save(&file)?;
            print_offer(&offer, &file.session);
        }
        let outcome = {
            let mut port = DirectoryActivator::new(&mut ws.index);
            file.session.step(&mut port, &mut oracle)
        };
        save(&file)?;
        match outcome.map_err(to_msg)? {
            StepOutcome::Recorded(snapshot) => print_snapshot(&snapshot),
            StepOutcome::Finished(_) => break,
            StepOutcome::Aborted => {
                info("Progress saved. Run `modbisect run` to resume.");
                return Ok(());
            }
        }
    }
    announce(None, &file.session);
    Ok(())
}

fn cmd_status(matches: &ArgMatches, list_remaining: bool, json: bool) -> Result<(), String> {
    let ws = open_workspace(matches)?;
    let file = load_session(&state_dir()).map_err(to_msg)?;
    if let Some(file) = &file {
        file.check_fingerprint(&ws.index).map_err(to_msg)?;
    }
    let total = ws.index.mods.len();
    let enabled = ws.index.enabled_ids().len();
    let required = file
        .as_ref()
        .map(|f| f.session.required().len())
        .unwrap_or_else(|| ws.config.required_set().len());

    if json {
        let value = serde_json::json!({
            "root": ws.index.root.display().to_string(),
            "enabled": enabled,
            "disabled": total - enabled,
            "required": required,
            "total": total,
            "session": file.as_ref().map(|f| f.session.report()),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(());
    }

    println!("Enabled:  {}", enabled);
    println!("Disabled: {}", total - enabled);
    println!("Required: {}", required);
    println!("Total:    {}", total);
    match &file {
        Some(file) => {
            print_report(&file.session.report());
            if let Some(offer) = file.session.pending() {
                dim(&format!("Pending trial {}: {} mods enabled.", offer.iteration, offer.enabled.len()));
            }
            if list_remaining {
                for id in file.session.undetermined() {
                    let name = ws.index.get(id).map(|m| m.name.as_str()).unwrap_or(id);
                    println!("  {} ({})", id, name);
                }
            }
        }
        None => dim("No session in progress."),
    }
    Ok(())
}

fn cmd_history(matches: &ArgMatches, json: bool) -> Result<(), String> {
    let ws = open_workspace(matches)?;
    let file = load_active(&ws)?;
    let history = file.session.history();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(history).unwrap_or_else(|_| "[]".to_string())
        );
        return Ok(());
    }
    if history.is_empty() {
        dim("No trials recorded yet.");
    }
    for trial in history {
        let verdict = match trial.verdict {
            Verdict::Good => "good",
            Verdict::Bad => "bad",
        };
        println!(
            "#{:<3} {:<4} {} probed, {} enabled, {} left  {}",
            trial.iteration,
            verdict,
            trial.probe.len(),
            trial.enabled.len(),
            trial.remaining,
            trial.recorded_at
        );
        dim(&format!("     probe: {}", join_ids(&trial.probe)));
        if !trial.ambiguous_extras.is_empty() {
            warning(&format!(
                "     enabled only as dependencies: {}",
                join_ids(&trial.ambiguous_extras)
            ));
        }
    }
    Ok(())
}

fn cmd_reset(matches: &ArgMatches) -> Result<(), String> {
    let mut ws = open_workspace(matches)?;
    let all = ws.index.ids();
    DirectoryActivator::new(&mut ws.index)
        .activate(&all)
        .map_err(|e| to_msg(e.into()))?;
    let removed = clear_session(&state_dir()).map_err(to_msg)?;
    if removed {
        success(&format!("Session cleared; all {} mods enabled.", all.len()));
    } else {
        success(&format!("All {} mods enabled.", all.len()));
    }
    Ok(())
}

fn cmd_toggle(matches: &ArgMatches, id: &str, enable: bool) -> Result<(), String> {
    let mut ws = open_workspace(matches)?;
    let changed = DirectoryActivator::new(&mut ws.index)
        .set_enabled(id, enable)
        .map_err(|e| to_msg(e.into()))?;
    let verb = if enable { "enabled" } else { "disabled" };
    if changed {
        success(&format!("{} {}.", if enable { "Enabled" } else { "Disabled" }, id));
    } else {
        dim(&format!("{} was already {}.", id, verb));
    }
    Ok(())
}

fn cmd_require(matches: &ArgMatches, id: &str) -> Result<(), String> {
    let mut ws = open_workspace(matches)?;
    let mut file = load_active(&ws)?;
    let moved = file.session.require(id).map_err(to_msg)?;
    if moved.is_empty() {
        dim(&format!("{} was already required.", id));
    } else {
        success(&format!("Now required: {}.", join_ids(&moved)));
    }
    let offer = apply_next(&mut ws, &mut file)?;
    announce(offer.as_ref(), &file.session);
    Ok(())
}

fn cmd_depend(matches: &ArgMatches, id: &str, dependency: &str) -> Result<(), String> {
    let mut ws = open_workspace(matches)?;
    let mut file = load_active(&ws)?;
    if file.session.add_dependency(id, dependency).map_err(to_msg)? {
        success(&format!("{} now depends on {}.", id, dependency));
    } else {
        dim(&format!("{} already depends on {}.", id, dependency));
    }
    let offer = apply_next(&mut ws, &mut file)?;
    announce(offer.as_ref(), &file.session);
    Ok(())
}

/// Dry run against the scanned mods: no files are renamed, no session is saved.
fn cmd_simulate(matches: &ArgMatches, culprits: Vec<String>, json: bool) -> Result<(), String> {
    let ws = open_workspace(matches)?;
    let known = ws.index.ids();
    if let Some(unknown) = culprits.iter().find(|c| !known.contains(*c)) {
        return Err(format!("Unknown mod `{}`.", unknown));
    }
    let mut session = new_session(&ws)?.session;
    let mut port = MemoryActivator::with_known(known);
    let mut oracle = CulpritOracle::new(culprits);

    let bar = if json || quiet() || !std::io::stdout().is_terminal() {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(session.estimated_trials_left() as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("{bar:30.cyan/dim} {pos}/{len} trials") {
            bar.set_style(style);
        }
        bar
    };
    let mut snapshots = Vec::new();
    let outcome = session.run(&mut port, &mut oracle, |s: &Snapshot| {
        bar.inc(1);
        snapshots.push(s.clone());
    });
    bar.finish_and_clear();
    outcome.map_err(to_msg)?;

    if json {
        let value = serde_json::json!({
            "trials": snapshots,
            "report": session.report(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(());
    }
    for s in &snapshots {
        print_snapshot(s);
    }
    print_report(&session.report());
    Ok(())
}

fn run() -> Result<(), String> {
    let json_arg = Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output machine-readable JSON");
    let mod_arg = Arg::new("mod").required(true).help("Mod id");

    let matches = Command::new("modbisect")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Find the Minecraft mod that causes a bug by bisecting the mod folder, dependencies included")
        .after_help(
            "Examples:\n  modbisect start\n  modbisect bad\n  modbisect status --list-remaining\n  modbisect run\n  modbisect simulate --culprit sodium",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .value_name("PATH")
                .help("Config file (default: config.toml, or MODBISECT_CONFIG)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Minimal output"),
        )
        .subcommand(
            Command::new("start")
                .about("Start a session and apply the first trial")
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Discard a session already in progress"),
                ),
        )
        .subcommand(Command::new("good").about("The bug is gone with the current mods"))
        .subcommand(Command::new("bad").about("The bug reproduces with the current mods"))
        .subcommand(
            Command::new("apply").about("Re-apply the pending trial (after fixing the mod directory)"),
        )
        .subcommand(Command::new("run").about("Interactive loop: apply each trial and ask for a verdict"))
        .subcommand(
            Command::new("status")
                .about("Show mod counts and session progress")
                .arg(
                    Arg::new("list-remaining")
                        .long("list-remaining")
                        .action(ArgAction::SetTrue)
                        .help("List mods still under suspicion"),
                )
                .arg(json_arg.clone()),
        )
        .subcommand(
            Command::new("history")
                .about("List the trials recorded so far")
                .arg(json_arg.clone()),
        )
        .subcommand(Command::new("reset").about("Enable every mod and discard the session"))
        .subcommand(
            Command::new("enable")
                .about("Enable one mod")
                .arg(mod_arg.clone()),
        )
        .subcommand(
            Command::new("disable")
                .about("Disable one mod")
                .arg(mod_arg.clone()),
        )
        .subcommand(
            Command::new("require")
                .about("Keep a mod (and its dependencies) enabled for the rest of the session")
                .arg(mod_arg.clone()),
        )
        .subcommand(
            Command::new("depend")
                .about("Record that a mod needs another mod")
                .arg(mod_arg.clone())
                .arg(Arg::new("dependency").required(true).help("Mod it depends on")),
        )
        .subcommand(
            Command::new("simulate")
                .about("Dry run with a designated culprit; touches no files")
                .arg(
                    Arg::new("culprit")
                        .long("culprit")
                        .required(true)
                        .num_args(1..)
                        .help("Mod id(s) that make the bug reproduce"),
                )
                .arg(json_arg.clone()),
        )
        .get_matches();

    let json = matches
        .subcommand()
        .map(|(_, sub)| sub.try_get_one::<bool>("json").ok().flatten().copied().unwrap_or(false))
        .unwrap_or(false);
    if matches.get_flag("quiet") || json {
        env::set_var("MODBISECT_QUIET", "1");
    }

    match matches.subcommand() {
        Some(("start", sub)) => cmd_start(&matches, sub.get_flag("force")),
        Some(("good", _)) => cmd_verdict(&matches, Verdict::Good),
        Some(("bad", _)) => cmd_verdict(&matches, Verdict::Bad),
        Some(("apply", _)) => cmd_apply(&matches),
        Some(("run", _)) => cmd_run(&matches),
        Some(("status", sub)) => cmd_status(&matches, sub.get_flag("list-remaining"), json),
        Some(("history", _)) => cmd_history(&matches, json),
        Some(("reset", _)) => cmd_reset(&matches),
        Some(("enable", sub)) => cmd_toggle(&matches, required_arg(sub, "mod")?, true),
        Some(("disable", sub)) => cmd_toggle(&matches, required_arg(sub, "mod")?, false),
        Some(("require", sub)) => cmd_require(&matches, required_arg(sub, "mod")?),
        Some(("depend", sub)) => cmd_depend(
            &matches,
            required_arg(sub, "mod")?,
            required_arg(sub, "dependency")?,
        ),
        Some(("simulate", sub)) => {
            let culprits: Vec<String> = sub
                .get_many::<String>("culprit")
                .map(|v| v.cloned().collect())
                .unwrap_or_default();
            cmd_simulate(&matches, culprits, json)
        }
        _ => {
            if use_color() {
                println!("{}", "modbisect".bright_cyan().bold());
            } else {
                println!("modbisect");
            }
            dim("Bisect a Minecraft mod folder to find the mod behind a bug.");
            dim("\nRun `modbisect --help` for details.");
            Ok(())
        }
    }
}

fn required_arg<'a>(sub: &'a ArgMatches, name: &str) -> Result<&'a str, String> {
    sub.get_one::<String>(name)
        .map(|s| s.as_str())
        .ok_or_else(|| format!("Missing argument <{}>", name))
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(|| run()) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&e);
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}
