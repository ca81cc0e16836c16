//! 📊 progress.rs — "Are we there yet?" — every pipeline, every time, forever.
//!
//! Two halves, cleanly split:
//!
//! - [`ProgressCounters`]: the numbers. A pair of atomics and a start
//!   instant, shared by everything that cares. Workers' completion
//!   callbacks write it; the optimizer's scoring reads it; the display
//!   reads it. Created at run start, discarded at run end. Never a global.
//! - [`ProgressDisplay`]: the show. A ticker task that re-renders an
//!   indicatif spinner with a comfy-table message once a second until told
//!   to stop. Purely cosmetic, fully detachable — the pipeline neither
//!   knows nor cares whether anyone is watching.
//!
//! ⚠️  Warning: watching the progress display will not make it go faster.
//! Neither will refreshing it. We've tried. Science says no.
//!
//! # Ancient Proverb
//! "He who runs an ingestion without a progress display, ingests alone and
//! in darkness."

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

// -- 📏 one mebibyte — not a megabyte, pedants. there's a difference.
const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// 📦 Human-readable byte count, scaled to its own magnitude.
/// Because "1073741824 bytes" is a war crime in a log line.
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= GIB {
        format!("{:.2} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} bytes")
    }
}

/// 🔢 Commas for the 3 people in the audience who like readability.
/// "1000000 docs" → "1,000,000 docs" — you're welcome, eyes.
pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS or HH:MM:SS. If it shows HH:MM:SS, you should probably call
/// your mom. It's been a while.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// 📊 The run's cumulative totals: bytes sunk, documents sunk, and when the
/// whole adventure started.
///
/// Updated ONLY from equalizer completion callbacks — a document counts
/// once its batch has actually landed, not when it was parsed and certainly
/// not when it was merely dreamed of. The optimizer's throughput score
/// leans on this: it measures delivery, not ambition.
#[derive(Debug)]
pub struct ProgressCounters {
    bytes: AtomicU64,
    docs: AtomicU64,
    start: Instant,
}

impl Default for ProgressCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self {
            bytes: AtomicU64::new(0),
            docs: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    /// 📦 Credit one delivered batch to the run totals.
    pub fn update(&self, bytes: u64, docs: u64) {
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
        self.docs.fetch_add(docs, Ordering::SeqCst);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    pub fn docs(&self) -> u64 {
        self.docs.load(Ordering::SeqCst)
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// 📡 A snapshot of throughput at any given moment. Like a speedometer, but
/// for documents, and less likely to get you a ticket.
struct Rates {
    docs_per_sec: f64,
    mib_per_sec: f64,
}

/// 📊 The show: a spinner plus a borderless comfy-table, re-rendered once a
/// second by a background ticker until [`ProgressDisplay::finish`] is called.
///
/// Rates are computed over a 5-second sliding window so the displayed
/// number doesn't look like a seismograph. Your heart rate is not our
/// responsibility, but we try.
pub(crate) struct ProgressDisplay {
    stop_tx: async_channel::Sender<()>,
    ticker: tokio::task::JoinHandle<()>,
    counters: Arc<ProgressCounters>,
}

impl ProgressDisplay {
    /// 🚀 Start the ticker. It renders immediately, then once a second.
    pub(crate) fn start(counters: Arc<ProgressCounters>) -> Self {
        let (stop_tx, stop_rx) = async_channel::bounded::<()>(1);
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                // 🐛 safe unwrap: template string is hardcoded and valid, I checked, twice
                .unwrap(),
        );

        let ticker_counters = Arc::clone(&counters);
        let ticker = tokio::spawn(async move {
            // sliding window of (when, bytes, docs), seeded at t=0 so the
            // first render doesn't divide by zero like an animal
            let mut samples: VecDeque<(Instant, u64, u64)> = VecDeque::new();
            samples.push_back((Instant::now(), 0, 0));
            loop {
                render(&bar, &ticker_counters, &mut samples);
                // stop signal is "the channel closed" — recv erroring IS the message
                match tokio::time::timeout(Duration::from_secs(1), stop_rx.recv()).await {
                    // timeout elapsed → tick again
                    Err(_) => continue,
                    // closed (or, impossibly, a message) → final frame and out
                    Ok(_) => break,
                }
            }
            render(&bar, &ticker_counters, &mut samples);
            bar.finish_and_clear();
        });

        Self {
            stop_tx,
            ticker,
            counters,
        }
    }

    /// 🏁 Stop the ticker and log the run summary, tone matched to outcome.
    pub(crate) async fn finish(self, success: bool) {
        self.stop_tx.close();
        let _ = self.ticker.await;
        let elapsed = self.counters.elapsed();
        let summary = format!(
            "{} docs, {} in {}",
            format_number(self.counters.docs()),
            format_bytes(self.counters.bytes()),
            format_duration(elapsed),
        );
        if success {
            info!("✅ Ingestion completed: {summary}");
        } else {
            error!("💀 Ingestion failed after {summary}");
        }
    }
}

/// 🎨 One frame: evict stale samples, push the present, do the division,
/// slam the table into the spinner message.
fn render(
    bar: &ProgressBar,
    counters: &ProgressCounters,
    samples: &mut VecDeque<(Instant, u64, u64)>,
) {
    let now = Instant::now();
    let total_bytes = counters.bytes();
    let total_docs = counters.docs();

    // 🔄 evict samples older than 5 seconds — a bouncer, but for data points
    let window = Duration::from_secs(5);
    while let Some(&(when, _, _)) = samples.front() {
        if now.duration_since(when) > window {
            samples.pop_front();
        } else {
            break;
        }
    }
    samples.push_back((now, total_bytes, total_docs));

    let rates = match samples.front() {
        Some(&(oldest_when, oldest_bytes, oldest_docs)) => {
            let elapsed = now.duration_since(oldest_when).as_secs_f64();
            if elapsed > 0.0 {
                Rates {
                    docs_per_sec: total_docs.saturating_sub(oldest_docs) as f64 / elapsed,
                    mib_per_sec: (total_bytes.saturating_sub(oldest_bytes) as f64 / elapsed)
                        / MIB as f64,
                }
            } else {
                Rates {
                    docs_per_sec: 0.0,
                    mib_per_sec: 0.0,
                }
            }
        }
        None => Rates {
            docs_per_sec: 0.0,
            mib_per_sec: 0.0,
        },
    };

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.add_row(vec![
        Cell::new(format!("{} Docs/s", format_number(rates.docs_per_sec as u64)))
            .set_alignment(CellAlignment::Right),
        Cell::new(format!("{} Docs", format_number(total_docs)))
            .set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new(format!("{:.2} MiB/s", rates.mib_per_sec)).set_alignment(CellAlignment::Right),
        Cell::new(format_bytes(total_bytes)).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new(format!(
            "{} elapsed",
            format_duration(counters.elapsed())
        ))
        .set_alignment(CellAlignment::Right),
        Cell::new("").set_alignment(CellAlignment::Right),
    ]);
    bar.set_message(format!("ingesting\n{table}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_bytes_learn_to_speak_human() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(20 * MIB), "20.00 MiB");
        assert_eq!(format_bytes(3 * GIB), "3.00 GiB");
    }

    #[test]
    fn the_one_where_commas_save_eyesight() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn the_one_where_time_gets_colons() {
        assert_eq!(format_duration(Duration::from_secs(59)), "00:59");
        assert_eq!(format_duration(Duration::from_secs(61)), "01:01");
        assert_eq!(format_duration(Duration::from_secs(3_661)), "01:01:01");
    }

    #[test]
    fn the_one_where_the_counters_only_go_up() {
        let counters = ProgressCounters::new();
        counters.update(1_000, 10);
        counters.update(2_000, 20);
        assert_eq!(counters.bytes(), 3_000);
        assert_eq!(counters.docs(), 30);
    }

    #[tokio::test]
    async fn the_one_where_the_show_ends_on_cue() {
        let counters = Arc::new(ProgressCounters::new());
        let display = ProgressDisplay::start(Arc::clone(&counters));
        counters.update(4_096, 7);
        tokio::time::sleep(Duration::from_millis(20)).await;
        // finish must stop the ticker promptly, not after another full tick
        tokio::time::timeout(Duration::from_millis(500), display.finish(true))
            .await
            .expect("💀 finish must not wait out the ticker interval");
    }
}
