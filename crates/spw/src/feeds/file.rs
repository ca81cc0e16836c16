//! 📂 The filesystem feed — a recursive walk and a promise.
//!
//! 🎬 *[a directory tree stretches to the horizon. somewhere in it: data.]*
//! *[also in it: .DS_Store, a README, and a directory named "old_old_FINAL".]*
//! *["In a world of nested folders... one walk dared to go depth-first."]*
//!
//! The walk happens ONCE, at construction, synchronously — we want the full
//! manifest (file count, total bytes) before the first worker moves, both
//! for the summary line and so a permissions problem three directories deep
//! fails the run at minute zero instead of minute ninety. Units are then
//! opened lazily, one at a time, as the pool asks for them.
//!
//! Excludes are exact name matches against file and directory names. An
//! excluded directory is not entered at all; its entire subtree might as
//! well not exist.
//!
//! 🗜️ Files may be transparently decompressed (gzip / zlib / deflate). The
//! decoders are synchronous, so each compressed unit gets a blocking pump
//! task that inflates chunks and feeds them through a bounded channel to an
//! async reader adapter. The worker sees plain bytes and asks no questions.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;
use tokio::io::{AsyncRead, ReadBuf};
use tracing::{debug, trace};

use crate::feeds::{ByteSource, Feed};
use crate::progress::format_bytes;

/// 🗜️ Decompression chunk size for the blocking pump.
const INFLATE_CHUNK_BYTES: usize = 64 * 1024;

/// 🗜️ The compression schemes a source file may arrive wearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Gzip,
    Zlib,
    Deflate,
}

/// 📂 Config for the filesystem feed. Co-located with the feed that uses it
/// — no scavenger hunt at 2am.
#[derive(Debug, Clone, Deserialize)]
pub struct FileFeedConfig {
    /// 🌳 root directory to walk
    pub path: String,
    /// 🚫 exact file / directory names to skip entirely
    #[serde(default)]
    pub excludes: Vec<String>,
    /// 🗜️ how every file in the tree is compressed, if at all. One scheme
    /// for the whole feed — mixed trees are somebody else's art project.
    #[serde(default)]
    pub compression: Option<Compression>,
}

/// 📂 One discovered source file: where it lives and how big it claimed to
/// be at walk time.
#[derive(Debug, Clone)]
struct FileUnit {
    path: PathBuf,
    size: u64,
}

/// 📂 Feed over every (non-excluded) file under a directory tree,
/// depth-first, name-sorted at each level. Deterministic on purpose — the
/// same tree always vends the same order, which makes "it failed on unit
/// 37" a reproducible statement instead of a mood.
#[derive(Debug)]
pub struct FileFeed {
    config: FileFeedConfig,
    units: Vec<FileUnit>,
    index: usize,
}

impl FileFeed {
    /// 🚀 Walk the tree now, vend lazily later.
    pub fn new(config: FileFeedConfig) -> Result<Self> {
        let mut units = Vec::new();
        walk(Path::new(&config.path), &config.excludes, &mut units).with_context(|| {
            format!(
                "💀 The walk through '{}' ended early. A directory would not open, \
                or vanished mid-stride, or was never there to begin with. \
                The filesystem keeps its own counsel.",
                config.path
            )
        })?;
        debug!(
            "📂 walked '{}': {} file(s), {} total",
            config.path,
            units.len(),
            format_bytes(units.iter().map(|u| u.size).sum())
        );
        Ok(Self {
            config,
            units,
            index: 0,
        })
    }
}

/// 🌳 Depth-first, name-sorted traversal. Excluded names are skipped whether
/// they are files or whole subtrees.
fn walk(dir: &Path, excludes: &[String], units: &mut Vec<FileUnit>) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("could not read directory '{}'", dir.display()))?
        .collect::<std::io::Result<_>>()
        .with_context(|| format!("could not list an entry under '{}'", dir.display()))?;
    // sort by name so the vend order is stable across runs and platforms
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name();
        if excludes.iter().any(|ex| ex.as_str() == name) {
            trace!("🚫 excluding '{}'", name.to_string_lossy());
            continue;
        }
        let file_type = entry
            .file_type()
            .with_context(|| format!("could not stat '{}'", entry.path().display()))?;
        if file_type.is_dir() {
            walk(&entry.path(), excludes, units)?;
        } else if file_type.is_file() {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            units.push(FileUnit {
                path: entry.path(),
                size,
            });
        }
        // symlinks and other exotica: politely ignored
    }
    Ok(())
}

#[async_trait]
impl Feed for FileFeed {
    async fn next(&mut self) -> Result<Option<ByteSource>> {
        let Some(unit) = self.units.get(self.index) else {
            return Ok(None);
        };
        self.index += 1;
        trace!("📂 vending '{}'", unit.path.display());
        let source: ByteSource = match self.config.compression {
            None => {
                let file = tokio::fs::File::open(&unit.path).await.with_context(|| {
                    format!(
                        "💀 '{}' was there at walk time and is not openable now. \
                        Files, like opportunities, do not wait.",
                        unit.path.display()
                    )
                })?;
                Box::new(file)
            }
            Some(compression) => Box::new(spawn_inflate_pump(unit.path.clone(), compression)),
        };
        Ok(Some(source))
    }

    fn summary(&self) -> String {
        format!(
            "Feed `{}` contains {} files containing {}",
            self.config.path,
            self.units.len(),
            format_bytes(self.units.iter().map(|u| u.size).sum())
        )
    }
}

/// 🗜️ Spin up a blocking task that opens + inflates the file and pumps
/// chunks into a bounded channel. Returns the async-readable other end.
///
/// The channel is bounded so a fast decoder can't balloon memory ahead of a
/// slow consumer; the pump stops early if the reader is dropped (send fails
/// once the receiver is gone).
fn spawn_inflate_pump(path: PathBuf, compression: Compression) -> ChannelReader {
    let (tx, rx) = async_channel::bounded::<std::io::Result<Vec<u8>>>(8);
    tokio::task::spawn_blocking(move || {
        use std::io::Read;
        let file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(err) => {
                let _ = tx.send_blocking(Err(err));
                return;
            }
        };
        let mut decoder: Box<dyn Read> = match compression {
            Compression::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
            Compression::Zlib => Box::new(flate2::read::ZlibDecoder::new(file)),
            Compression::Deflate => Box::new(flate2::read::DeflateDecoder::new(file)),
        };
        loop {
            let mut chunk = vec![0u8; INFLATE_CHUNK_BYTES];
            match decoder.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    chunk.truncate(n);
                    if tx.send_blocking(Ok(chunk)).is_err() {
                        // reader went away; nobody wants these bytes anymore
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx.send_blocking(Err(err));
                    break;
                }
            }
        }
    });
    ChannelReader {
        rx: Box::pin(rx),
        chunk: Vec::new(),
        pos: 0,
    }
}

/// 🔌 AsyncRead over a channel of inflated chunks. Closed channel = EOF.
///
/// The receiver's `Stream` impl wants a pinned self, while the feed hands
/// out `Unpin` readers — so the receiver rides in its own pinned box and
/// the reader stays freely movable.
struct ChannelReader {
    rx: Pin<Box<async_channel::Receiver<std::io::Result<Vec<u8>>>>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl AsyncRead for ChannelReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.pos < this.chunk.len() {
                let n = out.remaining().min(this.chunk.len() - this.pos);
                out.put_slice(&this.chunk[this.pos..this.pos + n]);
                this.pos += n;
                return Poll::Ready(Ok(()));
            }
            match futures::ready!(this.rx.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => {
                    this.chunk = chunk;
                    this.pos = 0;
                }
                Some(Err(err)) => return Poll::Ready(Err(err)),
                None => return Poll::Ready(Ok(())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::AsyncReadExt;

    async fn drain(feed: &mut FileFeed) -> Vec<String> {
        let mut contents = Vec::new();
        while let Some(mut unit) = feed.next().await.expect("💀 feed must vend cleanly") {
            let mut body = String::new();
            unit.read_to_string(&mut body)
                .await
                .expect("💀 unit must read to end");
            contents.push(body);
        }
        contents
    }

    #[tokio::test]
    async fn the_one_where_the_walk_goes_depth_first_and_alphabetical() {
        let dir = tempfile::tempdir().expect("💀 tempdir");
        std::fs::create_dir(dir.path().join("b_nested")).expect("💀 mkdir");
        std::fs::write(dir.path().join("a.ndjson"), "alpha").expect("💀 write");
        std::fs::write(dir.path().join("b_nested/inner.ndjson"), "inner").expect("💀 write");
        std::fs::write(dir.path().join("c.ndjson"), "charlie").expect("💀 write");

        let mut feed = FileFeed::new(FileFeedConfig {
            path: dir.path().to_string_lossy().into_owned(),
            excludes: vec![],
            compression: None,
        })
        .expect("💀 the walk must succeed");
        assert!(feed.summary().contains("3 files"));
        // name order at each level, subtrees expanded in place
        assert_eq!(drain(&mut feed).await, vec!["alpha", "inner", "charlie"]);
    }

    #[tokio::test]
    async fn the_one_where_an_excluded_directory_never_existed() {
        let dir = tempfile::tempdir().expect("💀 tempdir");
        std::fs::create_dir(dir.path().join("skipme")).expect("💀 mkdir");
        std::fs::write(dir.path().join("skipme/hidden.ndjson"), "nope").expect("💀 write");
        std::fs::write(dir.path().join("keep.ndjson"), "yep").expect("💀 write");
        std::fs::write(dir.path().join("unwanted.txt"), "nope").expect("💀 write");

        let mut feed = FileFeed::new(FileFeedConfig {
            path: dir.path().to_string_lossy().into_owned(),
            excludes: vec!["skipme".to_string(), "unwanted.txt".to_string()],
            compression: None,
        })
        .expect("💀 the walk must succeed");
        assert_eq!(drain(&mut feed).await, vec!["yep"]);
    }

    #[tokio::test]
    async fn the_one_where_the_bytes_arrive_in_a_little_coat() {
        // 🗜️ gzip a payload big enough to span several pump chunks
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let payload = "a line of documents\n".repeat(20_000);
        let file = std::fs::File::create(dir.path().join("data.gz")).expect("💀 create");
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(payload.as_bytes()).expect("💀 compress");
        encoder.finish().expect("💀 finish");

        let mut feed = FileFeed::new(FileFeedConfig {
            path: dir.path().to_string_lossy().into_owned(),
            excludes: vec![],
            compression: Some(Compression::Gzip),
        })
        .expect("💀 the walk must succeed");
        let contents = drain(&mut feed).await;
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0], payload);
    }

    #[tokio::test]
    async fn the_one_where_the_reader_sips_instead_of_gulps() {
        // 🗜️ a zlib unit, read through the boxed source type a few bytes at
        // a time — exercises resuming mid-chunk and the reader staying
        // movable behind the trait object
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let payload = "0123456789".repeat(1_000);
        let file = std::fs::File::create(dir.path().join("data.z")).expect("💀 create");
        let mut encoder = flate2::write::ZlibEncoder::new(file, flate2::Compression::default());
        encoder.write_all(payload.as_bytes()).expect("💀 compress");
        encoder.finish().expect("💀 finish");

        let mut feed = FileFeed::new(FileFeedConfig {
            path: dir.path().to_string_lossy().into_owned(),
            excludes: vec![],
            compression: Some(Compression::Zlib),
        })
        .expect("💀 the walk must succeed");
        let mut source: ByteSource = feed
            .next()
            .await
            .expect("💀 feed must vend cleanly")
            .expect("💀 one unit expected");

        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = source.read(&mut buf).await.expect("💀 sip must succeed");
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, payload.as_bytes());
    }

    #[tokio::test]
    async fn the_one_where_the_directory_was_a_rumor() {
        let err = FileFeed::new(FileFeedConfig {
            path: "/definitely/not/a/real/path/spillway".to_string(),
            excludes: vec![],
            compression: None,
        })
        .expect_err("💀 a missing root must fail construction");
        assert!(format!("{err:#}").contains("not/a/real/path"));
    }
}
