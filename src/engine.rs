//! The `Engine`: bundles every component in §2 into a single owned value and
//! drives the per-chunk pipeline: chunk -> Normalizer -> dispatcher ->
//! event state machine / transaction parser -> aggregator ->
//! checkpointer/output writer. One value every handler takes as `&mut Engine`
//! rather than module-global state.

use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate, Timelike};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::aggregator::Aggregator;
use crate::chunk_source::ChunkSource;
use crate::checkpoint::Checkpointer;
use crate::config::{Config, Dialect};
use crate::dispatcher::{self, EventKind};
use crate::event_sm::{Directive, EventStateMachine, State};
use crate::gate::BusinessHoursGate;
use crate::normalizer::Normalizer;
use crate::output::OutputWriter;
use crate::plu::PluCatalog;
use crate::transaction::{Commit, TransactionParser};

fn header_420_capture_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2})/(\d{2})/(\d{4})\s+(\d{2}):(\d{2})(?::\d{2})?").unwrap()
    })
}

fn parse_420_header(chunk: &str) -> Option<(NaiveDate, u32, String)> {
    let caps = header_420_capture_re().captures(chunk)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    let hour: u32 = caps[4].parse().ok()?;
    let minute: u32 = caps[5].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some((date, hour, format!("{:02}:{:02}", hour, minute)))
}

/// `SIGUSR1`-equivalent dump-on-demand trigger. Real signal on Unix targets;
/// never fires elsewhere, so `recv()` just never resolves.
#[cfg(unix)]
struct DumpSignal(tokio::signal::unix::Signal);

#[cfg(unix)]
impl DumpSignal {
    fn install() -> Self {
        use tokio::signal::unix::{signal, SignalKind};
        DumpSignal(signal(SignalKind::user_defined1()).expect("failed to install SIGUSR1 handler"))
    }

    async fn recv(&mut self) {
        self.0.recv().await;
    }
}

#[cfg(not(unix))]
struct DumpSignal;

#[cfg(not(unix))]
impl DumpSignal {
    fn install() -> Self {
        DumpSignal
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await
    }
}

pub struct Engine<S: ChunkSource> {
    config: Config,
    normalizer: Normalizer,
    sm: EventStateMachine,
    parser: TransactionParser,
    aggregator: Aggregator,
    checkpointer: Checkpointer,
    output: OutputWriter,
    gate: BusinessHoursGate,
    source: S,
    current_date: Option<NaiveDate>,
    last_transaction_at: Option<Instant>,
}

impl<S: ChunkSource> Engine<S> {
    pub fn new(config: Config, catalog: PluCatalog, site_id: String, source: S) -> Self {
        let current_hour = Local::now().hour();
        Self::new_at_hour(config, catalog, site_id, source, current_hour)
    }

    /// Same construction as [`Engine::new`], but with the "current clock
    /// hour" used to decide whether a checkpoint is same-hour-loadable
    /// passed in explicitly rather than read from the wall clock. Exposed
    /// so crash-recovery replay can be reproduced deterministically (tests,
    /// `MonitorMode` capture replay) instead of depending on the real time
    /// of day a test happens to run at.
    pub fn new_at_hour(
        config: Config,
        catalog: PluCatalog,
        site_id: String,
        source: S,
        current_hour: u32,
    ) -> Self {
        let gate = BusinessHoursGate::new(config.opening_hour, config.closing_hour);
        let checkpointer = Checkpointer::new(config.checkpoint_dir.clone());
        let output = OutputWriter::new(
            config.output_dir.clone(),
            site_id,
            config.register.clone(),
        );
        let normalizer = Normalizer::new(config.dialect, config.currency_symbol);

        let mut aggregator = Aggregator::new(catalog);
        if let Some(restored) = checkpointer.load_on_startup(current_hour) {
            info!(hour = current_hour, "restored hourly row from checkpoint");
            aggregator.restore(restored);
        }

        Engine {
            config,
            normalizer,
            sm: EventStateMachine::new(),
            parser: TransactionParser::new(),
            aggregator,
            checkpointer,
            output,
            gate,
            source,
            current_date: None,
            last_transaction_at: None,
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Runs the cooperative main loop forever: read one chunk, process it,
    /// yield. A `SIGUSR1` arriving during the yield dumps the in-flight row
    /// and loops back around without consuming a chunk-read slot.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut last_minute_check = Instant::now();
        let mut dump_signal = DumpSignal::install();
        loop {
            if !self.gate.is_open_now() {
                self.enter_idle().await;
                continue;
            }

            match self.source.next_chunk()? {
                Some(raw) => self.process_raw_chunk(&raw)?,
                None => {}
            }

            if last_minute_check.elapsed() >= Duration::from_secs(60) {
                self.maybe_quiet_flush();
                last_minute_check = Instant::now();
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                _ = dump_signal.recv() => {
                    info!(row = ?self.aggregator.row(), "dump-on-demand row snapshot");
                }
            }
        }
    }

    /// Closes output resources, deletes checkpoints, clears ephemeral state,
    /// then sleeps until the gate reopens (checked once a minute so idle
    /// mode can exit promptly at opening).
    async fn enter_idle(&mut self) {
        if !self.sm.is_mid_transaction() && !self.aggregator.row().is_empty() {
            let _ = self.flush();
        }
        self.checkpointer.delete_all();
        self.aggregator.clear();
        while !self.gate.is_open_now() {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    }

    /// Drains every chunk currently buffered in the source, processing each
    /// in order. Used by replay-style callers (tests, `MonitorMode` capture
    /// replay) that don't want the gate/yield machinery in `run`.
    pub fn drain_source(&mut self) -> anyhow::Result<()> {
        while let Some(raw) = self.source.next_chunk()? {
            self.process_raw_chunk(&raw)?;
        }
        Ok(())
    }

    pub fn process_raw_chunk(&mut self, raw: &str) -> anyhow::Result<()> {
        let chunks = self.normalizer.normalize(raw);
        for chunk in chunks {
            self.handle_chunk(&chunk)?;
        }
        Ok(())
    }

    fn handle_chunk(&mut self, chunk: &str) -> anyhow::Result<()> {
        let kind = dispatcher::classify(chunk);
        match kind {
            EventKind::Header420 => self.handle_header_420(chunk)?,
            EventKind::Header520 => self.handle_header_520(),
            EventKind::Footer => {
                self.sm.on_footer();
                self.parser.reset();
                self.checkpoint_if_active();
            }
            EventKind::Report | EventKind::Refund | EventKind::Diagnostic => {
                self.sm.on_report_refund_or_diagnostic();
            }
            EventKind::Cancel | EventKind::Reprint => {
                self.sm.on_cancel_or_reprint(&mut self.aggregator);
                self.parser.reset();
                self.checkpoint_if_active();
            }
            EventKind::NoSale => {
                self.sm.on_no_sale(&mut self.aggregator);
                self.checkpoint_if_active();
            }
            EventKind::TransactionLine => self.handle_transaction_line(chunk),
        }
        Ok(())
    }

    fn handle_header_420(&mut self, chunk: &str) -> anyhow::Result<()> {
        let Some((date, hour, hhmm)) = parse_420_header(chunk) else {
            warn!(chunk, "malformed 420 header, dropping");
            return Ok(());
        };
        self.current_date = Some(date);
        let directive = self.sm.on_header(self.config.dialect, hour, hhmm.clone(), &mut self.aggregator);
        self.apply_header_directive(directive, hour, hhmm);
        Ok(())
    }

    fn handle_header_520(&mut self) {
        let now = Local::now();
        let hour = now.hour();
        let hhmm = format!("{:02}:{:02}", hour, now.minute());
        self.current_date.get_or_insert(now.date_naive());
        let directive = self.sm.on_header(self.config.dialect, hour, hhmm.clone(), &mut self.aggregator);
        self.apply_header_directive(directive, hour, hhmm);
    }

    fn apply_header_directive(&mut self, directive: Directive, hour: u32, hhmm: String) {
        if directive == Directive::FlushBeforeContinuing {
            let _ = self.flush();
            self.aggregator.row_mut().hour = Some(crate::aggregator::HourWindow(hour));
            self.aggregator.row_mut().first_transaction = Some(hhmm);
        }
        self.checkpoint_if_active();
    }

    fn handle_transaction_line(&mut self, chunk: &str) {
        if self.sm.state == State::Other {
            return;
        }
        let looks_like_transaction =
            chunk.contains(self.config.currency_symbol) || chunk.trim_start().starts_with("AMOUNT");
        if looks_like_transaction {
            self.sm.note_transaction_line(self.config.dialect);
        }

        match self.parser.apply(chunk, &self.config, &mut self.aggregator) {
            Ok(Commit::None) => {}
            Ok(commit @ (Commit::Total | Commit::Change)) => {
                debug!(?commit, "transaction committed");
                if let Some(time) = self.sm.last_event_time().map(str::to_string) {
                    if self.aggregator.row().first_transaction.is_none() {
                        self.aggregator.row_mut().first_transaction = Some(time.clone());
                    }
                    self.aggregator.row_mut().last_transaction = Some(time);
                }
                self.sm.on_commit(&mut self.aggregator);
                self.last_transaction_at = Some(Instant::now());
            }
            Err(err) => {
                info!(error = %err, "transaction line rejected, dropping");
            }
        }
        self.checkpoint_if_active();
    }

    fn checkpoint_if_active(&self) {
        if self.sm.state == State::Other {
            return;
        }
        if let Some(hour) = self.aggregator.current_hour() {
            self.checkpointer.save(hour.0, self.aggregator.row());
        }
    }

    /// Flush trigger 2: clock-based rollover after `QuietSeconds` of
    /// inactivity, guarded against ever firing mid-transaction.
    fn maybe_quiet_flush(&mut self) {
        if self.sm.is_mid_transaction() {
            return;
        }
        let Some(hour) = self.aggregator.current_hour() else {
            return;
        };
        let now_hour = Local::now().hour();
        if now_hour <= hour.0 {
            return;
        }
        let idle_long_enough = self
            .last_transaction_at
            .map(|t| t.elapsed() >= Duration::from_secs(self.config.quiet_seconds))
            .unwrap_or(true);
        if idle_long_enough {
            info!(hour = hour.0, "quiet-seconds rollover, flushing");
            let _ = self.flush();
        }
    }

    /// Writes the current row (if not empty) and clears aggregator +
    /// checkpoint state. Never call while `State::Transaction` is active.
    fn flush(&mut self) -> anyhow::Result<()> {
        debug_assert_ne!(self.sm.state, State::Transaction, "flush guard violated");
        let date = self.current_date.unwrap_or_else(|| Local::now().date_naive());
        let mut row = self.aggregator.row().clone();
        row.finalize_invariants();
        self.output.write_row(date, self.aggregator.catalog(), &row)?;
        self.aggregator.clear();
        self.checkpointer.delete_all();
        Ok(())
    }

    /// Exposed for tests and for the SIGUSR1 dump-on-demand handler: forces
    /// a flush regardless of trigger, still honoring the mid-transaction
    /// guard.
    pub fn force_flush(&mut self) -> anyhow::Result<()> {
        if self.sm.is_mid_transaction() {
            anyhow::bail!("refusing to flush mid-transaction");
        }
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_source::VecChunkSource;
    use crate::config::CliArgs;

    fn engine(dialect: Dialect, chunks: Vec<&str>) -> Engine<VecChunkSource> {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::load(CliArgs::default()).unwrap();
        config.dialect = dialect;
        config.output_dir = dir.path().join("out");
        config.checkpoint_dir = dir.path().join("checkpoints");
        std::fs::create_dir_all(&config.checkpoint_dir).unwrap();
        let catalog = PluCatalog::load_from_str("Bread\nCoffee\n");
        let source = VecChunkSource::new(chunks);
        // Leak the tempdir for the duration of the test by boxing it into
        // the config paths already being absolute; the directory is cleaned
        // up when the test process exits.
        std::mem::forget(dir);
        Engine::new(config, catalog, "shopa".to_string(), source)
    }

    fn drain(engine: &mut Engine<VecChunkSource>) {
        while let Some(chunk) = engine.source.next_chunk().unwrap() {
            engine.process_raw_chunk(&chunk).unwrap();
        }
    }

    #[test]
    fn s1_420_happy_path() {
        let mut e = engine(
            Dialect::D420,
            vec![
                "10/03/2024 09:05:12",
                "Coffee        £2.50",
                "TOTAL         £2.50",
                "CASH          £5.00",
                "CHANGE        £2.50",
                "CLERK 01",
            ],
        );
        drain(&mut e);
        e.force_flush().unwrap();
        // after flush the row is cleared; re-derive by reading the CSV
        let path = e.output.path_for(e.current_date.unwrap());
        let contents = std::fs::read_to_string(path).unwrap();
        let data_line = contents.lines().nth(1).unwrap();
        assert_eq!(
            data_line,
            "09.00-10.00,2.50,2.50,0.00,0.00,2.50,1,09:05,09:05,0"
        );
    }

    #[test]
    fn s2_cancel_reverses_to_identical_row() {
        let mut e = engine(
            Dialect::D420,
            vec![
                "10/03/2024 09:05:12",
                "Coffee        £2.50",
                "TOTAL         £2.50",
                "CASH          £5.00",
                "CHANGE        £2.50",
                "CLERK 01",
                "10/03/2024 09:07:00",
                "Bread         £1.00",
                "CANCEL",
                "CLERK 01",
            ],
        );
        drain(&mut e);
        e.force_flush().unwrap();
        let path = e.output.path_for(e.current_date.unwrap());
        let contents = std::fs::read_to_string(path).unwrap();
        let data_line = contents.lines().nth(1).unwrap();
        assert_eq!(
            data_line,
            "09.00-10.00,2.50,2.50,0.00,0.00,2.50,1,09:05,09:05,0"
        );
    }

    #[test]
    fn s3_card_then_hour_rollover_emits_two_rows() {
        let mut e = engine(
            Dialect::D420,
            vec![
                "10/03/2024 09:55:00",
                "Bread         £1.00",
                "TOTAL         £1.00",
                "CARD          £1.00",
                "CLERK 01",
                "10/03/2024 10:05:00",
                "Coffee        £2.00",
                "TOTAL         £2.00",
                "CASH          £2.00",
                "CHANGE        £0.00",
                "CLERK 01",
            ],
        );
        drain(&mut e);
        e.force_flush().unwrap();
        let path = e.output.path_for(e.current_date.unwrap());
        let contents = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines[1],
            "09.00-10.00,1.00,0.00,1.00,1.00,0.00,1,09:55,09:55,0"
        );
        assert_eq!(
            lines[2],
            "10.00-11.00,2.00,2.00,0.00,0.00,2.00,1,10:05,10:05,0"
        );
    }

    #[test]
    fn s4_over_cap_item_is_rejected_and_reversed() {
        let mut e = engine(
            Dialect::D420,
            vec![
                "10/03/2024 12:00:00",
                "Coffee        £999.99",
                "TOTAL         £2.00",
                "CASH          £2.00",
                "CHANGE        £0.00",
                "CLERK 01",
            ],
        );
        drain(&mut e);
        e.force_flush().unwrap();
        let path = e.output.path_for(e.current_date.unwrap());
        let contents = std::fs::read_to_string(path).unwrap();
        let data_line = contents.lines().nth(1).unwrap();
        assert_eq!(
            data_line,
            "12.00-13.00,2.00,2.00,0.00,0.00,0.00,1,12:00,12:00,0"
        );
    }

    #[test]
    fn s5_nosale_only_yields_no_row() {
        let mut e = engine(Dialect::D420, vec!["NOSALE", "NOSALE", "NOSALE"]);
        drain(&mut e);
        assert_eq!(e.aggregator().row().no_sale, 3);
        assert!(e.force_flush().is_ok());
        assert!(e.aggregator().row().is_empty());
    }
}
