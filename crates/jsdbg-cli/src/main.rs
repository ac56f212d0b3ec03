//! jsdbg — headless JavaScript debugger for automated agents.
//!
//! Every subcommand except `daemon` and `sessions` is a thin client: it
//! serialises one request, sends it to the per-session daemon (starting it
//! on demand), and renders the response.

use clap::{Parser, Subcommand};
use serde_json::json;

use jsdbg_cli::ipc::Request;
use jsdbg_cli::{client, daemon, output, paths};

#[derive(Parser)]
#[command(name = "jsdbg", version, about = "Headless JavaScript debugger for automated agents")]
struct Cli {
    /// Session name; each session is one daemon owning one debug target.
    #[arg(long, global = true, default_value = "default", env = "JSDBG_SESSION")]
    session: String,

    /// Print raw JSON responses.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the session daemon is alive.
    Ping,
    /// Launch a program under the debugger (e.g. `jsdbg launch node app.js`).
    Launch {
        /// Break on the first statement.
        #[arg(long)]
        brk: bool,
        /// Inspector port (0 picks an ephemeral port).
        #[arg(long)]
        port: Option<u16>,
        /// The command line to run.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
    /// Attach to a listening inspector: a ws:// URL or a port number.
    Attach { target: String },
    /// Session and target status.
    Status,
    /// Snapshot of the paused target: location, code, stack, variables.
    State {
        #[arg(long)]
        no_vars: bool,
        #[arg(long)]
        no_stack: bool,
        #[arg(long)]
        no_code: bool,
        #[arg(long)]
        compact: bool,
        #[arg(long)]
        depth: Option<u32>,
        /// Context lines around the current line.
        #[arg(long, default_value_t = 3)]
        lines: u32,
        /// Frame selector: `@fN` or a bare index.
        #[arg(long)]
        frame: Option<String>,
        /// Include closure scopes.
        #[arg(long)]
        all_scopes: bool,
        /// Report generated-script coordinates (skip source maps).
        #[arg(long)]
        generated: bool,
    },
    /// Resume execution.
    Continue,
    /// Step: over, into, or out.
    Step {
        #[arg(default_value = "over")]
        mode: String,
    },
    /// Interrupt a running target.
    Pause,
    /// Run until a location is reached.
    RunTo { file: String, line: u32 },
    /// Set a breakpoint.
    Break {
        file: String,
        line: u32,
        #[arg(long)]
        condition: Option<String>,
        /// Pause only from the Nth hit onward.
        #[arg(long)]
        hit_count: Option<u32>,
        /// Explicit URL regex instead of path resolution.
        #[arg(long)]
        url_regex: Option<String>,
    },
    /// Remove a breakpoint or logpoint by ref, or `all`.
    BreakRm {
        #[arg(value_name = "REF")]
        handle: String,
    },
    /// List breakpoints and logpoints.
    BreakLs,
    /// Toggle a breakpoint by ref, or `all`.
    BreakToggle {
        #[arg(value_name = "REF")]
        handle: String,
    },
    /// List valid breakpoint positions in a line range.
    Breakable {
        file: String,
        start_line: u32,
        end_line: u32,
    },
    /// Set a logpoint: logs the template, never pauses.
    Logpoint {
        file: String,
        line: u32,
        /// Message template; `{expr}` interpolates.
        template: String,
        #[arg(long)]
        condition: Option<String>,
        #[arg(long)]
        max_emissions: Option<u32>,
    },
    /// Exception pause mode: all, uncaught, caught, none.
    Catch { mode: String },
    /// Show source around the current line, or of a file.
    Source {
        file: Option<String>,
        #[arg(long)]
        lines: Option<u32>,
        #[arg(long)]
        all: bool,
        #[arg(long)]
        generated: bool,
    },
    /// List loaded scripts.
    Scripts { filter: Option<String> },
    /// Current call stack.
    Stack {
        #[arg(long)]
        async_depth: Option<u32>,
        #[arg(long)]
        generated: bool,
    },
    /// Search loaded script contents.
    Search {
        query: String,
        #[arg(long)]
        script_id: Option<String>,
        #[arg(long)]
        regex: bool,
        #[arg(long)]
        case_sensitive: bool,
    },
    /// Captured console output and child stdout/stderr.
    Console {
        #[arg(long)]
        level: Option<String>,
        /// Only entries at or after this millisecond timestamp.
        #[arg(long)]
        since: Option<u64>,
        #[arg(long)]
        clear: bool,
    },
    /// Recorded exceptions.
    Exceptions {
        #[arg(long)]
        since: Option<u64>,
    },
    /// Evaluate an expression in the paused target; `@v`/`@o`/`@f` refs
    /// interpolate.
    Eval {
        expression: String,
        #[arg(long)]
        frame: Option<String>,
        #[arg(long)]
        await_promise: bool,
        #[arg(long)]
        throw_on_side_effect: bool,
        /// Evaluation timeout in milliseconds.
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Scope variables of the selected frame.
    Vars {
        #[arg(long)]
        frame: Option<String>,
        /// Comma-separated name filter.
        #[arg(long)]
        names: Option<String>,
        #[arg(long)]
        all_scopes: bool,
    },
    /// Expand a value ref into its properties.
    Props {
        #[arg(value_name = "REF")]
        handle: String,
        /// Include inherited properties.
        #[arg(long)]
        inherited: bool,
        /// Include internal `[[...]]` properties.
        #[arg(long)]
        internal: bool,
        #[arg(long)]
        depth: Option<u32>,
    },
    /// Blackbox script URL patterns (skipped while stepping).
    Blackbox {
        #[arg(required = true)]
        patterns: Vec<String>,
    },
    /// List blackbox patterns.
    BlackboxLs,
    /// Remove blackbox patterns.
    BlackboxRm {
        #[arg(required = true)]
        patterns: Vec<String>,
    },
    /// Assign a variable in the selected frame.
    Set {
        name: String,
        value: String,
        #[arg(long)]
        frame: Option<String>,
    },
    /// Override the return value of the frame about to return.
    SetReturn { value: String },
    /// Replace a script's source in the running target.
    Hotpatch {
        file: String,
        /// Read the new source from this file; defaults to stdin.
        #[arg(long)]
        source_file: Option<std::path::PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-enter a frame from its top.
    RestartFrame { frame_ref: Option<String> },
    /// Loaded source maps.
    Sourcemap { file: Option<String> },
    /// Turn off all source-map handling for this session.
    SourcemapDisable,
    /// Stop the target and relaunch it with the same command line.
    Restart,
    /// Stop the target and shut the session daemon down.
    Stop,
    /// List sessions with a control socket.
    Sessions,
    /// Run the session daemon (started on demand by the other commands).
    #[command(hide = true)]
    Daemon,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Command::Daemon => {
            simple_logger::SimpleLogger::new()
                .with_level(log::LevelFilter::Info)
                .env()
                .init()?;
            return daemon::run(&cli.session).await;
        }
        Command::Sessions => {
            for session in paths::list_sessions() {
                println!("{session}");
            }
            return Ok(());
        }
        _ => {}
    }

    let request = build_request(&cli.command)?;
    let response = client::request(&cli.session, &request).await?;
    if output::render(&request.cmd, &response, cli.json) {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn build_request(command: &Command) -> anyhow::Result<Request> {
    let request = match command {
        Command::Ping => Request::bare("ping"),
        Command::Status => Request::bare("status"),
        Command::Launch { brk, port, command } => Request::new(
            "launch",
            json!({"command": command, "brk": brk, "port": port}),
        ),
        Command::Attach { target } => Request::new("attach", json!({"target": target})),
        Command::State {
            no_vars,
            no_stack,
            no_code,
            compact,
            depth,
            lines,
            frame,
            all_scopes,
            generated,
        } => Request::new(
            "state",
            json!({
                "vars": !no_vars,
                "stack": !no_stack,
                "code": !no_code,
                "compact": compact,
                "depth": depth,
                "lines": lines,
                "frame": frame,
                "allScopes": all_scopes,
                "generated": generated,
            }),
        ),
        Command::Continue => Request::bare("continue"),
        Command::Step { mode } => Request::new("step", json!({"mode": mode})),
        Command::Pause => Request::bare("pause"),
        Command::RunTo { file, line } => {
            Request::new("run-to", json!({"file": file, "line": line}))
        }
        Command::Break {
            file,
            line,
            condition,
            hit_count,
            url_regex,
        } => Request::new(
            "break",
            json!({
                "file": file,
                "line": line,
                "condition": condition,
                "hitCount": hit_count,
                "urlRegex": url_regex,
            }),
        ),
        Command::BreakRm { handle } => Request::new("break-rm", json!({"ref": handle})),
        Command::BreakLs => Request::bare("break-ls"),
        Command::BreakToggle { handle } => {
            Request::new("break-toggle", json!({"ref": handle}))
        }
        Command::Breakable {
            file,
            start_line,
            end_line,
        } => Request::new(
            "breakable",
            json!({"file": file, "startLine": start_line, "endLine": end_line}),
        ),
        Command::Logpoint {
            file,
            line,
            template,
            condition,
            max_emissions,
        } => Request::new(
            "logpoint",
            json!({
                "file": file,
                "line": line,
                "template": template,
                "condition": condition,
                "maxEmissions": max_emissions,
            }),
        ),
        Command::Catch { mode } => Request::new("catch", json!({"mode": mode})),
        Command::Source {
            file,
            lines,
            all,
            generated,
        } => Request::new(
            "source",
            json!({"file": file, "lines": lines, "all": all, "generated": generated}),
        ),
        Command::Scripts { filter } => Request::new("scripts", json!({"filter": filter})),
        Command::Stack {
            async_depth,
            generated,
        } => Request::new(
            "stack",
            json!({"asyncDepth": async_depth, "generated": generated}),
        ),
        Command::Search {
            query,
            script_id,
            regex,
            case_sensitive,
        } => Request::new(
            "search",
            json!({
                "query": query,
                "scriptId": script_id,
                "isRegex": regex,
                "caseSensitive": case_sensitive,
            }),
        ),
        Command::Console {
            level,
            since,
            clear,
        } => Request::new(
            "console",
            json!({"level": level, "since": since, "clear": clear}),
        ),
        Command::Exceptions { since } => Request::new("exceptions", json!({"since": since})),
        Command::Eval {
            expression,
            frame,
            await_promise,
            throw_on_side_effect,
            timeout,
        } => Request::new(
            "eval",
            json!({
                "expression": expression,
                "frame": frame,
                "awaitPromise": await_promise,
                "throwOnSideEffect": throw_on_side_effect,
                "timeout": timeout,
            }),
        ),
        Command::Vars {
            frame,
            names,
            all_scopes,
        } => {
            let names: Option<Vec<String>> = names
                .as_ref()
                .map(|n| n.split(',').map(|s| s.trim().to_string()).collect());
            Request::new(
                "vars",
                json!({"frame": frame, "names": names, "allScopes": all_scopes}),
            )
        }
        Command::Props {
            handle,
            inherited,
            internal,
            depth,
        } => Request::new(
            "props",
            json!({
                "ref": handle,
                "own": !inherited,
                "internal": internal,
                "depth": depth,
            }),
        ),
        Command::Blackbox { patterns } => {
            Request::new("blackbox", json!({"patterns": patterns}))
        }
        Command::BlackboxLs => Request::bare("blackbox-ls"),
        Command::BlackboxRm { patterns } => {
            Request::new("blackbox-rm", json!({"patterns": patterns}))
        }
        Command::Set { name, value, frame } => Request::new(
            "set",
            json!({"name": name, "value": value, "frame": frame}),
        ),
        Command::SetReturn { value } => Request::new("set-return", json!({"value": value})),
        Command::Hotpatch {
            file,
            source_file,
            dry_run,
        } => {
            let source = match source_file {
                Some(path) => std::fs::read_to_string(path)?,
                None => {
                    use std::io::Read;
                    let mut buffer = String::new();
                    std::io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };
            Request::new(
                "hotpatch",
                json!({"file": file, "source": source, "dryRun": dry_run}),
            )
        }
        Command::RestartFrame { frame_ref } => {
            Request::new("restart-frame", json!({"frameRef": frame_ref}))
        }
        Command::Sourcemap { file } => Request::new("sourcemap", json!({"file": file})),
        Command::SourcemapDisable => Request::bare("sourcemap-disable"),
        Command::Restart => Request::bare("restart"),
        Command::Stop => Request::bare("stop"),
        Command::Sessions | Command::Daemon => unreachable!("handled before dispatch"),
    };
    Ok(request)
}
