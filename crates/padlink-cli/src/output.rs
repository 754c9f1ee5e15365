//! Output formatting for CLI results
//!
//! Three formats are supported:
//! - Table: human-readable tables (default)
//! - JSON: structured output for scripting
//! - Quiet: exit codes only

use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use padlink_core::PadEvent;
use serde::Serialize;

use crate::inspect::{DecodeReport, DecryptReport, MessageReport};
use crate::simulate::{SessionReport, SimulationSummary};
use crate::ExitCode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Standard JSON response wrapper
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<&'static str>,
    /// RFC 3339
    pub timestamp: String,
    pub command: String,
}

impl<T: Serialize> JsonResponse<T> {
    pub fn success(data: T, command: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            exit_code: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: command.to_string(),
        }
    }
}

impl JsonResponse<()> {
    pub fn error(message: &str, code: ExitCode, command: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
            exit_code: Some(code.name()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: command.to_string(),
        }
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn is_quiet(&self) -> bool {
        self.format == OutputFormat::Quiet
    }

    pub fn format_decrypt(&self, report: &DecryptReport) -> String {
        match self.format {
            OutputFormat::Table => decrypt_table(report),
            OutputFormat::Json => to_json(&JsonResponse::success(report, "decrypt")),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_decode(&self, report: &DecodeReport) -> String {
        match self.format {
            OutputFormat::Table => fields_table(report),
            OutputFormat::Json => to_json(&JsonResponse::success(report, "decode")),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// One line per event while a simulation runs. Table format only.
    pub fn format_event(&self, event: &PadEvent) -> Option<String> {
        if self.format != OutputFormat::Table {
            return None;
        }
        let action = if event.event.pressed { "pressed" } else { "released" };
        Some(format!(
            "[{}] {} {} {} ({})",
            event.slot, event.peripheral, event.event.button, action, event.event.source
        ))
    }

    pub fn format_summary(&self, summary: &SimulationSummary) -> String {
        match self.format {
            OutputFormat::Table => sessions_table(&summary.sessions),
            OutputFormat::Json => to_json(&JsonResponse::success(summary, "simulate")),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_error(&self, error: &dyn std::fmt::Display, code: ExitCode, command: &str) -> String {
        match self.format {
            OutputFormat::Table => format!("Error: {error}"),
            OutputFormat::Json => to_json(&JsonResponse::error(&error.to_string(), code, command)),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Progress line on stderr, only in verbose table mode.
    pub fn progress(&self, message: &str) {
        if self.verbose && self.format == OutputFormat::Table {
            eprintln!("... {message}");
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

fn decrypt_table(report: &DecryptReport) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Property", "Value"]);
    table.add_row(vec!["Counter".to_string(), report.counter.to_string()]);
    table.add_row(vec![
        "Authentic".to_string(),
        if report.authentic { "yes" } else { "NO" }.to_string(),
    ]);
    if let Some(plaintext) = &report.plaintext {
        table.add_row(vec!["Plaintext".to_string(), plaintext.clone()]);
    }
    match &report.message {
        Some(MessageReport::ButtonStatus(decoded)) => {
            table.add_row(vec!["Message".to_string(), "button status".to_string()]);
            table.add_row(vec!["Fields".to_string(), fields_table(decoded)]);
        }
        Some(MessageReport::Idle) => {
            table.add_row(vec!["Message".to_string(), "idle".to_string()]);
        }
        Some(MessageReport::Unknown { opcode }) => {
            table.add_row(vec!["Message".to_string(), format!("unknown opcode 0x{opcode:02x}")]);
        }
        Some(MessageReport::Empty) => {
            table.add_row(vec!["Message".to_string(), "empty".to_string()]);
        }
        None => {}
    }
    table.to_string()
}

fn fields_table(report: &DecodeReport) -> String {
    if report.fields.is_empty() {
        return "No fields.".to_string();
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Field", "Tag", "Value", "State"]);
    for field in &report.fields {
        let state = match field.pressed {
            Some(true) => "pressed",
            Some(false) => "released",
            None => "-",
        };
        table.add_row(vec![
            field.name.to_string(),
            format!("0x{:02x}", field.tag),
            field.value.to_string(),
            state.to_string(),
        ]);
    }
    table.to_string()
}

fn sessions_table(sessions: &[SessionReport]) -> String {
    if sessions.is_empty() {
        return "No sessions.".to_string();
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Slot",
        "Peripheral",
        "Packets",
        "Authentic",
        "Bad Tag",
        "Malformed",
        "Events",
    ]);
    for s in sessions {
        table.add_row(vec![
            s.slot.clone(),
            s.peripheral.clone(),
            s.packets_received.to_string(),
            s.authentic.to_string(),
            s.auth_failures.to_string(),
            s.malformed.to_string(),
            s.events_emitted.to_string(),
        ]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::{decode_payload, FieldReport};

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("quiet".parse::<OutputFormat>().unwrap(), OutputFormat::Quiet);
        assert!("yaml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::default().to_string(), "table");
    }

    #[test]
    fn test_json_decode_schema() {
        let formatter = OutputFormatter::new(OutputFormat::Json, false);
        let output = formatter.format_decode(&decode_payload(&[0x08, 0x01, 0x10, 0x00]));
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["success"], true);
        assert_eq!(value["command"], "decode");
        assert_eq!(value["data"]["side"], "right");
        assert_eq!(value["data"]["fields"][1]["name"], "Y");
        assert_eq!(value["data"]["fields"][1]["pressed"], true);
        assert!(value["data"]["fields"][0].get("pressed").is_none());
    }

    #[test]
    fn test_json_error_carries_exit_code() {
        let formatter = OutputFormatter::new(OutputFormat::Json, false);
        let output = formatter.format_error(&"bad key", ExitCode::InvalidInput, "decrypt");
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "bad key");
        assert_eq!(value["exit_code"], "INVALID_INPUT");
    }

    #[test]
    fn test_table_decrypt_mentions_counter() {
        let formatter = OutputFormatter::new(OutputFormat::Table, false);
        let report = DecryptReport {
            counter: 7,
            authentic: false,
            plaintext: None,
            message: None,
        };
        let output = formatter.format_decrypt(&report);
        assert!(output.contains('7'));
        assert!(output.contains("NO"));
    }

    #[test]
    fn test_quiet_prints_nothing() {
        let formatter = OutputFormatter::new(OutputFormat::Quiet, true);
        let report = DecodeReport {
            side: None,
            fields: vec![FieldReport {
                name: "Y",
                tag: 0x10,
                value: 0,
                pressed: Some(true),
            }],
        };
        assert!(formatter.is_quiet());
        assert!(formatter.format_decode(&report).is_empty());
        assert!(formatter
            .format_error(&"boom", ExitCode::GeneralError, "decode")
            .is_empty());
    }
}
