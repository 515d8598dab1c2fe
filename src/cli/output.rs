//! Output formatters for the grindcard CLI
//!
//! - **Human**: Readable summary with a countdown and capability list
//! - **JSON**: One snapshot object per line, the same shape UI callers read
//!
//! ## Example
//!
//! ```rust,no_run
//! use grindcard_entitlements::cli::output::{create_formatter, OutputFormat};
//! use grindcard_entitlements::EntitlementSnapshot;
//!
//! let formatter = create_formatter(OutputFormat::Json, true);
//! let mut stdout = std::io::stdout();
//! formatter
//!     .format_snapshot(&EntitlementSnapshot::signed_out(), &mut stdout)
//!     .unwrap();
//! ```

use std::io::{self, Write};

use crate::capabilities::Capability;
use crate::entitlements::TimeRemaining;
use crate::session::{EntitlementSnapshot, SessionPhase};

// =============================================================================
// Output Format Enum
// =============================================================================

/// Available output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Human => write!(f, "human"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

// =============================================================================
// Output Formatter Trait
// =============================================================================

/// Trait for output formatters
pub trait OutputFormatter: Send + Sync {
    /// Format one published snapshot
    fn format_snapshot(
        &self,
        snapshot: &EntitlementSnapshot,
        writer: &mut dyn Write,
    ) -> io::Result<()>;

    /// Format a status message
    fn format_status(&self, message: &str, writer: &mut dyn Write) -> io::Result<()>;

    /// Format an error message
    fn format_error(&self, error: &str, writer: &mut dyn Write) -> io::Result<()>;
}

// =============================================================================
// Human Formatter
// =============================================================================

/// Human-readable output formatter
pub struct HumanFormatter {
    show_capabilities: bool,
}

impl HumanFormatter {
    pub fn new(show_capabilities: bool) -> Self {
        Self { show_capabilities }
    }
}

/// Countdown such as `6d 23h 59m 58s`
pub fn format_countdown(remaining: &TimeRemaining) -> String {
    format!(
        "{}d {:02}h {:02}m {:02}s",
        remaining.days, remaining.hours, remaining.minutes, remaining.seconds
    )
}

fn phase_label(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Unauthenticated => "signed out",
        SessionPhase::Resolving => "checking membership...",
        SessionPhase::ActiveTrial => "free trial",
        SessionPhase::ActivePaid => "member",
        SessionPhase::ActiveExpired => "trial ended",
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_snapshot(
        &self,
        snapshot: &EntitlementSnapshot,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        match &snapshot.user_id {
            Some(user) => writeln!(writer, "{}: {}", user, phase_label(snapshot.phase))?,
            None => writeln!(writer, "{}", phase_label(snapshot.phase))?,
        }

        if snapshot.is_in_trial() {
            writeln!(
                writer,
                "  trial ends in {} ({} days left)",
                format_countdown(&snapshot.time_remaining),
                snapshot.days_remaining
            )?;
        }

        if self.show_capabilities && !snapshot.loading() {
            for cap in Capability::ALL {
                let mark = if snapshot.has(cap) { "yes" } else { "no" };
                writeln!(writer, "  {:<26} {}", cap.as_str(), mark)?;
            }
        }
        Ok(())
    }

    fn format_status(&self, message: &str, writer: &mut dyn Write) -> io::Result<()> {
        writeln!(writer, "{}", message)
    }

    fn format_error(&self, error: &str, writer: &mut dyn Write) -> io::Result<()> {
        writeln!(writer, "Error: {}", error)
    }
}

// =============================================================================
// JSON Formatter
// =============================================================================

/// JSON lines formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format_snapshot(
        &self,
        snapshot: &EntitlementSnapshot,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(writer, "{}", json)
    }

    fn format_status(&self, message: &str, writer: &mut dyn Write) -> io::Result<()> {
        let json = serde_json::json!({ "type": "status", "message": message });
        writeln!(writer, "{}", json)
    }

    fn format_error(&self, error: &str, writer: &mut dyn Write) -> io::Result<()> {
        let json = serde_json::json!({ "type": "error", "message": error });
        writeln!(writer, "{}", json)
    }
}

/// Create a formatter for the given format
pub fn create_formatter(format: OutputFormat, show_capabilities: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Human => Box::new(HumanFormatter::new(show_capabilities)),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::resolve_capabilities;
    use crate::identity::UserId;
    use std::sync::Arc;

    fn trial_snapshot() -> EntitlementSnapshot {
        let remaining = TimeRemaining::from_total_seconds(6 * 86_400 + 23 * 3_600 + 59 * 60 + 58);
        EntitlementSnapshot {
            phase: SessionPhase::ActiveTrial,
            user_id: Some(UserId::new("ash")),
            days_remaining: remaining.days,
            time_remaining: remaining,
            capabilities: Arc::new(resolve_capabilities(false, true)),
        }
    }

    fn render(formatter: &dyn OutputFormatter, snapshot: &EntitlementSnapshot) -> String {
        let mut buf = Vec::new();
        formatter.format_snapshot(snapshot, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("HUMAN".parse::<OutputFormat>(), Ok(OutputFormat::Human));
        assert!("csv".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_countdown() {
        assert_eq!(
            format_countdown(&trial_snapshot().time_remaining),
            "6d 23h 59m 58s"
        );
    }

    #[test]
    fn test_human_output() {
        let out = render(&HumanFormatter::new(true), &trial_snapshot());
        assert!(out.starts_with("ash: free trial"));
        assert!(out.contains("trial ends in 6d 23h 59m 58s (6 days left)"));
        assert!(out.contains("appear_on_leaderboard"));

        let terse = render(&HumanFormatter::new(false), &trial_snapshot());
        assert!(!terse.contains("appear_on_leaderboard"));
    }

    #[test]
    fn test_human_output_hides_capabilities_while_loading() {
        let snapshot = EntitlementSnapshot {
            phase: SessionPhase::Resolving,
            user_id: Some(UserId::new("ash")),
            days_remaining: 0,
            time_remaining: TimeRemaining::ZERO,
            capabilities: Arc::new(crate::capabilities::CapabilityMatrix::resolving()),
        };
        let out = render(&HumanFormatter::new(true), &snapshot);
        assert_eq!(out, "ash: checking membership...\n");
    }

    #[test]
    fn test_json_output_is_one_line() {
        let out = render(&JsonFormatter, &trial_snapshot());
        assert_eq!(out.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["canShareGrindCard"], true);
        assert_eq!(value["daysRemaining"], 6);
    }

    #[test]
    fn test_json_error_message() {
        let mut buf = Vec::new();
        JsonFormatter.format_error("lookup failed", &mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "lookup failed");
    }
}
