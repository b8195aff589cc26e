use log::{debug, info};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;

use crate::error::{ProbeError, Result};
use crate::host::Scenario;
use crate::probe::correlation::CorrelationScope;
use crate::probe::event::CryptoEvent;
use crate::probe::orchestrator::{DiscoveryReport, Probe};
use crate::probe::sink::ChannelSink;
use crate::probe::stats::StatisticsSnapshot;
use crate::settings::ProbeSettings;
use crate::utils::{log_discovery_report, log_session_summary};

/// Inputs of `cipherprobe replay`.
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    pub scenario: PathBuf,
    pub config: Option<PathBuf>,
    /// Event output file; stdout when absent
    pub output: Option<PathBuf>,
    pub pretty: bool,
    /// Overrides the configured correlation scope
    pub scope: Option<CorrelationScope>,
}

/// What a replay did.
#[derive(Debug, Clone)]
pub struct ReplaySummary {
    pub report: DiscoveryReport,
    pub calls: usize,
    pub events_written: usize,
    pub statistics: StatisticsSnapshot,
}

/// Loads the configuration and the scenario, then replays it with events
/// written as JSON lines.
pub fn replay_scenario(options: &ReplayOptions) -> Result<ReplaySummary> {
    let mut settings = ProbeSettings::load_or_default(options.config.as_deref())?;
    if let Some(scope) = options.scope {
        settings.correlation_scope = scope;
    }
    let scenario = Scenario::load_from_file(&options.scenario)?;
    info!(
        "Replaying {} ({} modules, {} calls)",
        options.scenario.display(),
        scenario.modules.len(),
        scenario.calls.len()
    );

    match &options.output {
        Some(path) => {
            let file = BufWriter::new(File::create(path)?);
            run_replay(&settings, &scenario, file, options.pretty)
        }
        None => run_replay(&settings, &scenario, io::stdout(), options.pretty),
    }
}

/// Runs discovery against the scenario's simulated target, performs its
/// calls, and streams every event to `writer` from a separate thread.
pub fn run_replay<W>(
    settings: &ProbeSettings,
    scenario: &Scenario,
    writer: W,
    pretty: bool,
) -> Result<ReplaySummary>
where
    W: Write + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    let probe = Probe::new(settings, Arc::new(ChannelSink::new(sender)))?;
    let printer = thread::spawn(move || write_events(receiver, writer, pretty));

    let prepared = scenario.prepare()?;
    let report = probe.run(&prepared.process);
    log_discovery_report(&report);

    let calls = scenario.replay(&prepared);
    let statistics = probe.statistics().snapshot();

    // Listeners hold the last senders; the printer stops once both are gone
    drop(prepared);
    drop(probe);

    let events_written = printer
        .join()
        .map_err(|_| ProbeError::Io(io::Error::other("event printer thread panicked")))??;
    let calls = calls?;

    log_session_summary(&statistics);
    debug!("{} events written", events_written);

    Ok(ReplaySummary {
        report,
        calls,
        events_written,
        statistics,
    })
}

/// Writes events until the channel closes. Returns how many were written.
pub fn write_events<W: Write>(
    receiver: Receiver<CryptoEvent>,
    mut writer: W,
    pretty: bool,
) -> Result<usize> {
    let mut written = 0;
    for event in receiver {
        let line = if pretty {
            serde_json::to_string_pretty(&event)?
        } else {
            event.to_json()?
        };
        writeln!(writer, "{}", line)?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const SAMPLE: &str = include_str!("../../scenarios/pycryptodome_cbc.toml");

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn lines(&self) -> Vec<CryptoEvent> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    #[test]
    fn test_sample_scenario_emits_both_directions() {
        let scenario = Scenario::from_toml(SAMPLE).unwrap();
        let output = SharedBuffer::default();

        let summary =
            run_replay(&ProbeSettings::default(), &scenario, output.clone(), false).unwrap();
        assert_eq!(summary.calls, 6);
        assert_eq!(summary.events_written, 2);
        assert!(summary.report.key_hooked());
        assert!(summary.report.is_hooked("cbc.encrypt"));

        let events = output.lines();
        assert_eq!(events.len(), 2);

        let encrypt = &events[0];
        assert_eq!(encrypt.sequence, 1);
        assert_eq!(encrypt.payload, "attack at dawn!!");
        assert_eq!(encrypt.algorithm.as_deref(), Some("CBC"));
        assert_eq!(encrypt.action.as_deref(), Some("encrypt"));
        assert_eq!(encrypt.key.as_deref(), Some("0x2b7e151628aed2a6abf7158809cf4f3c"));
        assert_eq!(encrypt.iv.as_deref(), Some("0x000102030405060708090a0b0c0d0e0f"));

        let decrypt = &events[1];
        assert_eq!(decrypt.thread_id, 2);
        assert_eq!(decrypt.action.as_deref(), Some("decrypt"));
        assert!(decrypt.payload.starts_with("0x"));
        assert_eq!(decrypt.key, encrypt.key);
    }

    #[test]
    fn test_missing_primary_writes_nothing() {
        let scenario = Scenario::from_toml(
            r#"
            [[modules]]
            name = "_raw_cbc.so"
            base = 0x10000
            exports = [{ name = "CBC_encrypt", offset = 0x10 }]

            [[buffers]]
            name = "data"
            text = "hello"

            [[calls]]
            symbol = "CBC_encrypt"
            args = [{ int = 0 }, { buffer = "data" }, { int = 0 }, { len = "data" }]
            "#,
        )
        .unwrap();
        let output = SharedBuffer::default();

        let summary = run_replay(&ProbeSettings::default(), &scenario, output.clone(), true).unwrap();
        assert!(summary.report.primary.is_none());
        assert_eq!(summary.calls, 1);
        assert_eq!(summary.events_written, 0);
        assert_eq!(summary.statistics, StatisticsSnapshot::default());
    }

    #[test]
    fn test_pretty_output_is_multiline() {
        let (sender, receiver) = mpsc::channel();
        sender
            .send(CryptoEvent {
                sequence: 1,
                thread_id: 1,
                captured_at: chrono::Utc::now(),
                action: None,
                payload: "HELLO".to_string(),
                algorithm: None,
                key: None,
                iv: None,
                nonce: None,
                secret: None,
            })
            .unwrap();
        drop(sender);

        let mut out = Vec::new();
        assert_eq!(write_events(receiver, &mut out, true).unwrap(), 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.lines().count() > 1);
        assert!(text.contains("\"payload\": \"HELLO\""));
    }
}
