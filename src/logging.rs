use anyhow::Result;
use flexi_logger::{DeferredNow, Logger, LoggerHandle};
use log::Record;
use std::io::Write;

const DEV_SPEC: &str = "transit_line_editor=debug,warn";
const PRODUCTION_SPEC: &str = "warn";

fn line_format(w: &mut dyn Write, now: &mut DeferredNow, record: &Record) -> std::io::Result<()> {
    write!(
        w,
        "[{}] {} {}: {}",
        now.now_utc_owned().to_rfc3339(),
        record.level(),
        record.target(),
        record.args()
    )
}

/// Logs to stderr. `RUST_LOG` overrides the default level spec.
/// Keep the returned handle alive for the lifetime of the process.
pub fn init_logging(production: bool) -> Result<LoggerHandle> {
    let spec = if production { PRODUCTION_SPEC } else { DEV_SPEC };
    let handle = Logger::try_with_env_or_str(spec)?
        .log_to_stderr()
        .format(line_format)
        .start()?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_format_uses_record_time() {
        let mut now = DeferredNow::new();
        let stamp = now.now_utc_owned();
        let mut out = Vec::new();
        line_format(
            &mut out,
            &mut now,
            &Record::builder()
                .args(format_args!("Loaded {} transit line(s)", 2))
                .level(log::Level::Info)
                .target("transit_line_editor::editor")
                .build(),
        )
        .unwrap();

        let line = String::from_utf8(out).unwrap();
        let (time, rest) = line.strip_prefix('[').unwrap().split_once("] ").unwrap();
        let parsed = chrono::DateTime::parse_from_rfc3339(time).unwrap();
        assert_eq!(parsed, stamp);
        assert_eq!(rest, "INFO transit_line_editor::editor: Loaded 2 transit line(s)");
    }
}
