//! Console front-end: one command per stdin line.
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::control::engine::ControlHandle;
use crate::control::state::ControlCommand;
use crate::config::{save_config, save_config_to};
use crate::errors::GrabResult;

pub const HELP: &str = "\
commands:
  start              start monitoring the selected window
  stop               stop monitoring
  act                toggle acting (auto grab) on/off
  pause | p | f9     pause / resume acting (the global hotkey, F9 by default, does the same)
  select <title>     select the first window whose title contains <title>
  select-at <x> <y>  select the window under a screen point
  conf <0.05-1.0>    set the detection confidence threshold
  save [path]        write the config, with the current confidence, to disk
  status             print the current mode
  quit               shut down";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Loop(ControlCommand),
    ToggleActing,
    TogglePause,
    Save(Option<PathBuf>),
    Status,
    Help,
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let cmd = match word.to_ascii_lowercase().as_str() {
        "start" => ConsoleCommand::Loop(ControlCommand::StartMonitoring),
        "stop" => ConsoleCommand::Loop(ControlCommand::StopMonitoring),
        "quit" | "exit" | "q" => ConsoleCommand::Loop(ControlCommand::Shutdown),
        "act" | "grab" => ConsoleCommand::ToggleActing,
        "pause" | "p" | "f9" => ConsoleCommand::TogglePause,
        "save" => ConsoleCommand::Save((!rest.is_empty()).then(|| PathBuf::from(rest))),
        "status" => ConsoleCommand::Status,
        "help" | "?" | "" => ConsoleCommand::Help,
        "select" if !rest.is_empty() => ConsoleCommand::Loop(ControlCommand::SelectWindow { title: rest.to_string() }),
        "select" => return Err("usage: select <title>".into()),
        "select-at" => {
            let mut parts = rest.split_whitespace().map(str::parse::<i32>);
            match (parts.next(), parts.next(), parts.next()) {
                (Some(Ok(x)), Some(Ok(y)), None) => ConsoleCommand::Loop(ControlCommand::SelectAt { x, y }),
                _ => return Err("usage: select-at <x> <y>".into()),
            }
        }
        "conf" | "confidence" => match rest.parse::<f32>() {
            Ok(v) if v.is_finite() => ConsoleCommand::Loop(ControlCommand::SetConfidence(v)),
            _ => return Err(format!("not a number: {rest:?}")),
        },
        other => return Err(format!("unknown command {other:?}, try `help`")),
    };
    Ok(cmd)
}

/// Apply one command. Returns `false` once shutdown was requested.
pub async fn apply(handle: &ControlHandle, cmd: ConsoleCommand) -> GrabResult<bool> {
    match cmd {
        ConsoleCommand::Loop(ControlCommand::Shutdown) => {
            handle.send(ControlCommand::Shutdown).await?;
            return Ok(false);
        }
        ConsoleCommand::Loop(c) => handle.send(c).await?,
        ConsoleCommand::ToggleActing => {
            if !handle.toggle_acting() {
                tracing::info!("acting unchanged, start monitoring first");
            }
        }
        ConsoleCommand::TogglePause => {
            handle.toggle_pause();
        }
        ConsoleCommand::Save(path) => {
            let config = handle.context().config_snapshot();
            let saved = match path {
                Some(path) => save_config_to(&config, &path).map(|()| path),
                None => save_config(&config),
            };
            match saved {
                Ok(path) => println!("config saved to {}", path.display()),
                Err(e) => tracing::warn!(error = %e, "config not saved"),
            }
        }
        ConsoleCommand::Status => {
            let ctx = handle.context();
            tracing::info!(
                mode = ?ctx.mode(),
                confidence = ctx.confidence(),
                window = ctx.target().map(|t| t.title).unwrap_or_default(),
                "status"
            );
        }
        ConsoleCommand::Help => println!("{HELP}"),
    }
    Ok(true)
}

pub fn spawn_console_listener(handle: ControlHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::debug!("stdin closed, console listener exiting");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            };
            let cmd = match parse_command(&line) {
                Ok(cmd) => cmd,
                Err(msg) => {
                    tracing::warn!("{msg}");
                    continue;
                }
            };
            match apply(&handle, cmd).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "control loop gone");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::engine::control_channel;
    use crate::control::state::LoopMode;
    use crate::test_support::Harness;

    #[test]
    fn parses_loop_commands() {
        assert_eq!(parse_command("start"), Ok(ConsoleCommand::Loop(ControlCommand::StartMonitoring)));
        assert_eq!(parse_command("  STOP "), Ok(ConsoleCommand::Loop(ControlCommand::StopMonitoring)));
        assert_eq!(
            parse_command("select 微信 PC"),
            Ok(ConsoleCommand::Loop(ControlCommand::SelectWindow { title: "微信 PC".into() }))
        );
        assert_eq!(
            parse_command("select-at 100 -20"),
            Ok(ConsoleCommand::Loop(ControlCommand::SelectAt { x: 100, y: -20 }))
        );
        assert_eq!(parse_command("conf 0.6"), Ok(ConsoleCommand::Loop(ControlCommand::SetConfidence(0.6))));
        assert_eq!(parse_command("quit"), Ok(ConsoleCommand::Loop(ControlCommand::Shutdown)));
    }

    #[test]
    fn parses_toggles() {
        for word in ["pause", "p", "F9"] {
            assert_eq!(parse_command(word), Ok(ConsoleCommand::TogglePause));
        }
        assert_eq!(parse_command("act"), Ok(ConsoleCommand::ToggleActing));
        assert_eq!(parse_command(""), Ok(ConsoleCommand::Help));
    }

    #[test]
    fn parses_save_with_optional_path() {
        assert_eq!(parse_command("save"), Ok(ConsoleCommand::Save(None)));
        assert_eq!(
            parse_command("save ./my config.toml"),
            Ok(ConsoleCommand::Save(Some(PathBuf::from("./my config.toml"))))
        );
    }

    #[tokio::test]
    async fn save_writes_live_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let h = Harness::new();
        let (_lp, handle) = control_channel(h.ctx.clone());
        h.ctx.set_confidence(0.65);

        assert!(apply(&handle, ConsoleCommand::Save(Some(path.clone()))).await.unwrap());
        let saved = crate::config::load_config_from(&path).unwrap();
        assert!((saved.detector.confidence - 0.65).abs() < 1e-6);
        assert_eq!(saved.window.title, h.ctx.config.window.title);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_command("select").is_err());
        assert!(parse_command("select-at 1").is_err());
        assert!(parse_command("select-at 1 2 3").is_err());
        assert!(parse_command("conf high").is_err());
        assert!(parse_command("conf NaN").is_err());
        assert!(parse_command("jump").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn toggles_apply_directly_to_context() {
        let h = Harness::new();
        let (_lp, handle) = control_channel(h.ctx.clone());
        h.ctx.set_mode(LoopMode::Monitoring);

        assert!(apply(&handle, ConsoleCommand::ToggleActing).await.unwrap());
        assert_eq!(h.ctx.mode(), LoopMode::ActingEnabled);
        apply(&handle, ConsoleCommand::TogglePause).await.unwrap();
        assert_eq!(h.ctx.mode(), LoopMode::ActingPaused);
        // acting toggle from paused disables and clears the pause
        apply(&handle, ConsoleCommand::ToggleActing).await.unwrap();
        assert_eq!(h.ctx.mode(), LoopMode::Monitoring);
    }

    #[tokio::test]
    async fn quit_stops_listening() {
        let h = Harness::new();
        let (_lp, handle) = control_channel(h.ctx.clone());
        let keep_going = apply(&handle, ConsoleCommand::Loop(ControlCommand::Shutdown)).await.unwrap();
        assert!(!keep_going);
    }

    #[tokio::test]
    async fn closed_loop_is_an_error() {
        let h = Harness::new();
        let (lp, handle) = control_channel(h.ctx.clone());
        drop(lp);
        assert!(apply(&handle, ConsoleCommand::Loop(ControlCommand::StartMonitoring)).await.is_err());
    }
}
