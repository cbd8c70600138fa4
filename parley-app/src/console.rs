//! Line-oriented stdin console for driving the engine by hand.

use anyhow::{bail, Context};
use parley_core::ControlMessage;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsoleCommand {
    Control(ControlMessage),
    Quit,
}

pub const HELP: &str = "commands: start | stop | agc on|off | target <rms> | quit | <json control message>";

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> anyhow::Result<Option<ConsoleCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if line.starts_with('{') {
        let message: ControlMessage =
            serde_json::from_str(line).context("invalid control message JSON")?;
        return Ok(Some(ConsoleCommand::Control(message)));
    }

    let mut words = line.split_whitespace();
    let command = match (words.next(), words.next(), words.next()) {
        (Some("start"), None, None) => ConsoleCommand::Control(ControlMessage::Start),
        (Some("stop"), None, None) => ConsoleCommand::Control(ControlMessage::Stop),
        (Some("quit" | "exit"), None, None) => ConsoleCommand::Quit,
        (Some("agc"), Some(state), None) => {
            let enabled = match state {
                "on" => true,
                "off" => false,
                other => bail!("expected `agc on` or `agc off`, got `agc {other}`"),
            };
            ConsoleCommand::Control(ControlMessage::Config {
                enable_agc: Some(enabled),
                target_rms: None,
            })
        }
        (Some("target"), Some(value), None) => {
            let level: f32 = value
                .parse()
                .with_context(|| format!("`{value}` is not a number"))?;
            ConsoleCommand::Control(ControlMessage::Config {
                enable_agc: None,
                target_rms: Some(level),
            })
        }
        _ => bail!("unrecognised command `{line}` ({HELP})"),
    };
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_map_to_control_messages() {
        assert_eq!(
            parse_line("start").unwrap(),
            Some(ConsoleCommand::Control(ControlMessage::Start))
        );
        assert_eq!(
            parse_line("  stop ").unwrap(),
            Some(ConsoleCommand::Control(ControlMessage::Stop))
        );
        assert_eq!(parse_line("quit").unwrap(), Some(ConsoleCommand::Quit));
        assert_eq!(parse_line("").unwrap(), None);
    }

    #[test]
    fn agc_and_target_build_partial_config() {
        assert_eq!(
            parse_line("agc off").unwrap(),
            Some(ConsoleCommand::Control(ControlMessage::Config {
                enable_agc: Some(false),
                target_rms: None,
            }))
        );
        assert_eq!(
            parse_line("target 0.2").unwrap(),
            Some(ConsoleCommand::Control(ControlMessage::Config {
                enable_agc: None,
                target_rms: Some(0.2),
            }))
        );
    }

    #[test]
    fn raw_json_is_accepted() {
        assert_eq!(
            parse_line(r#"{"type":"config","targetRMS":0.3}"#).unwrap(),
            Some(ConsoleCommand::Control(ControlMessage::Config {
                enable_agc: None,
                target_rms: Some(0.3),
            }))
        );
    }

    #[test]
    fn malformed_lines_are_errors() {
        assert!(parse_line("agc maybe").is_err());
        assert!(parse_line("target loud").is_err());
        assert!(parse_line("start now").is_err());
        assert!(parse_line(r#"{"type":"pause"}"#).is_err());
    }
}
