//! Human-readable rendering of daemon responses.
//!
//! `--json` bypasses all of this and prints the raw response body.

use colored::Colorize;
use serde_json::Value;

use crate::ipc::Response;

/// Print a response. Returns `false` when the response was a failure, so
/// the caller can pick the exit code.
pub fn render(cmd: &str, response: &Response, json: bool) -> bool {
    if json {
        match serde_json::to_string_pretty(response) {
            Ok(text) => println!("{text}"),
            Err(_) => println!("{response:?}"),
        }
        return response.ok;
    }

    if !response.ok {
        let message = response.error.as_deref().unwrap_or("unknown error");
        eprintln!("{} {message}", "error:".red().bold());
        if let Some(suggestion) = &response.suggestion {
            eprintln!("  {} {suggestion}", "hint:".yellow());
        }
        return false;
    }

    let data = response.data.clone().unwrap_or(Value::Null);
    match cmd {
        "state" => render_state(&data),
        "status" => render_status(&data),
        "stack" => render_stack(&data),
        "break-ls" => render_breakpoints(&data),
        "scripts" => render_scripts(&data),
        "console" => render_console(&data),
        "exceptions" => render_exceptions(&data),
        "vars" => render_vars(&data),
        "eval" => render_eval(&data),
        "continue" | "step" | "pause" | "run-to" | "restart-frame" => render_control(&data),
        _ => print_pretty(&data),
    }
    true
}

fn print_pretty(data: &Value) {
    match serde_json::to_string_pretty(data) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{data}"),
    }
}

fn str_of<'a>(data: &'a Value, key: &str) -> &'a str {
    data[key].as_str().unwrap_or_default()
}

fn location_line(location: &Value) -> String {
    format!(
        "{}:{}",
        str_of(location, "url"),
        location["line"].as_u64().unwrap_or(0)
    )
}

fn render_status(data: &Value) {
    let state = str_of(data, "state");
    let mut line = format!(
        "session {} is {}",
        str_of(data, "session").bold(),
        colored_state(state)
    );
    if let Some(pid) = data["pid"].as_u64() {
        line.push_str(&format!(" (pid {pid})"));
    }
    println!("{line}");
    if let Some(pause) = data.get("pauseInfo").filter(|p| !p.is_null()) {
        println!(
            "  paused at {} ({})",
            location_line(pause),
            str_of(pause, "reason")
        );
    }
    println!(
        "  scripts: {}, uptime: {}s",
        data["scriptCount"].as_u64().unwrap_or(0),
        data["uptimeSeconds"].as_u64().unwrap_or(0)
    );
}

fn colored_state(state: &str) -> colored::ColoredString {
    match state {
        "paused" => state.yellow().bold(),
        "running" => state.green().bold(),
        _ => state.dimmed(),
    }
}

fn render_control(data: &Value) {
    let state = str_of(data, "state");
    match data.get("pause").filter(|p| !p.is_null()) {
        Some(pause) => println!(
            "{} at {} ({})",
            colored_state(state),
            location_line(pause),
            str_of(pause, "reason")
        ),
        None => println!("{}", colored_state(state)),
    }
}

fn render_state(data: &Value) {
    let status = str_of(data, "status");
    if status != "paused" {
        println!("{}", colored_state(status));
        return;
    }
    if let Some(location) = data.get("location").filter(|l| !l.is_null()) {
        println!(
            "{} at {} ({})",
            "paused".yellow().bold(),
            location_line(location),
            str_of(data, "reason")
        );
    }
    if let Some(lines) = data["source"]["lines"].as_array() {
        println!();
        for entry in lines {
            let marker = if entry["current"].as_bool().unwrap_or(false) {
                ">".yellow().bold().to_string()
            } else {
                " ".to_string()
            };
            println!(
                "{marker} {:>4} | {}",
                entry["line"].as_u64().unwrap_or(0),
                str_of(entry, "text")
            );
        }
    }
    if let Some(stack) = data["stack"].as_array() {
        println!("\n{}", "stack:".bold());
        for frame in stack {
            println!(
                "  {} {} {} {}:{}",
                str_of(frame, "ref").cyan(),
                frame["index"].as_u64().unwrap_or(0),
                str_of(frame, "functionName"),
                str_of(frame, "url"),
                frame["line"].as_u64().unwrap_or(0)
            );
        }
    }
    if let Some(vars) = data["locals"].as_array() {
        println!("\n{}", "vars:".bold());
        print_var_rows(vars);
    }
    if let Some(count) = data["breakpointCount"].as_u64() {
        println!("\nbreakpoints: {count}");
    }
}

fn print_var_rows(vars: &[Value]) {
    for var in vars {
        println!(
            "  {} {} = {} {}",
            str_of(var, "ref").cyan(),
            str_of(var, "name"),
            str_of(var, "value"),
            format!("({})", str_of(var, "type")).dimmed()
        );
    }
}

fn render_vars(data: &Value) {
    if let Some(vars) = data.as_array() {
        if vars.is_empty() {
            println!("no variables in scope");
        } else {
            print_var_rows(vars);
        }
    }
}

fn render_eval(data: &Value) {
    println!(
        "{} = {} {}",
        str_of(data, "ref").cyan(),
        str_of(data, "value"),
        format!("({})", str_of(data, "type")).dimmed()
    );
}

fn render_stack(data: &Value) {
    if let Some(frames) = data.as_array() {
        for frame in frames {
            println!(
                "{} {} {} {}:{}",
                str_of(frame, "ref").cyan(),
                frame["index"].as_u64().unwrap_or(0),
                str_of(frame, "functionName"),
                str_of(frame, "url"),
                frame["line"].as_u64().unwrap_or(0)
            );
        }
    }
}

fn render_breakpoints(data: &Value) {
    let Some(entries) = data.as_array() else {
        return;
    };
    if entries.is_empty() {
        println!("no breakpoints");
        return;
    }
    for entry in entries {
        let mut line = format!(
            "{} {}:{}",
            str_of(entry, "ref").cyan(),
            str_of(entry, "url"),
            entry["line"].as_u64().unwrap_or(0)
        );
        if let Some(original) = entry["originalUrl"].as_str() {
            line.push_str(&format!(
                " (original {original}:{})",
                entry["originalLine"].as_u64().unwrap_or(0)
            ));
        }
        if let Some(condition) = entry["condition"].as_str() {
            line.push_str(&format!(" if {condition}"));
        }
        if let Some(hits) = entry["hitCount"].as_u64() {
            line.push_str(&format!(" hits>={hits}"));
        }
        if entry["disabled"].as_bool().unwrap_or(false) {
            line.push_str(&format!(" {}", "[disabled]".dimmed()));
        }
        println!("{line}");
    }
}

fn render_scripts(data: &Value) {
    if let Some(scripts) = data.as_array() {
        for script in scripts {
            let url = str_of(script, "url");
            let display = if url.is_empty() { "<anonymous>" } else { url };
            println!("{:>5}  {display}", str_of(script, "scriptId"));
        }
    }
}

fn render_console(data: &Value) {
    if let Some(messages) = data.as_array() {
        for message in messages {
            let level = str_of(message, "level");
            let tag = match level {
                "error" | "stderr" => level.red().to_string(),
                "warn" | "warning" => level.yellow().to_string(),
                _ => level.dimmed().to_string(),
            };
            println!("[{tag}] {}", str_of(message, "text"));
        }
    }
}

fn render_exceptions(data: &Value) {
    if let Some(entries) = data.as_array() {
        if entries.is_empty() {
            println!("no exceptions recorded");
            return;
        }
        for entry in entries {
            println!("{} {}", "exception:".red().bold(), str_of(entry, "text"));
            if let Some(location) = entry["location"].as_str() {
                println!("  at {location}");
            }
            if let Some(stack) = entry["stack"].as_str() {
                println!("{stack}");
            }
        }
    }
}
