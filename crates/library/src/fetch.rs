use crate::reconcile::Reconciler;
use async_stream::stream;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use hoard_fetch::{FetchOutcome, FetchTransport, FetchWorker, file_name_from_url};
use hoard_record::{AssetRecord, DownloadStatus, Inventory, id_from_filename, merge, normalize_id};
use std::collections::btree_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::pin::pin;

/// Progress events emitted by [`fetch`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started): exactly once.
/// 2. [`Skipped`](Self::Skipped): once per URL whose asset is already present.
/// 3. [`Fetched`](Self::Fetched): once per fetched URL, in completion order.
/// 4. [`Complete`](Self::Complete): exactly once.
#[derive(Debug)]
pub enum FetchEvent {
    Started,
    /// The inventory already holds the asset with this id.
    Skipped(String),
    Fetched(Box<FetchOutcome>),
    Complete,
}

/// Streams [`FetchEvent`]s for a batch of `urls`.
///
/// URLs whose derived id is in `inventory` with a present status (downloaded,
/// exists or in database) are skipped, and a URL repeated in the batch is
/// fetched once. The rest are handed to `worker`, at most `concurrency` at a
/// time (at least one). Once an outcome reports cancellation no further
/// fetches are started.
///
/// URLs that resolve to the same file name are never in flight together: each
/// waits for the previous one to finish, so it finds the file already on disk
/// exactly as it would in a sequential run.
///
/// The stream does not borrow `inventory`, so results can be folded back into
/// it while the stream is consumed.
pub fn fetch<'a, T: FetchTransport>(
    inventory: &Inventory,
    urls: Vec<String>,
    worker: &'a FetchWorker<T>,
    destination: Option<&'a Path>,
    concurrency: usize,
) -> impl Stream<Item = FetchEvent> + use<'a, T> {
    let mut seen = HashSet::new();
    let mut skipped = Vec::new();
    let mut queued = Vec::new();
    // Later URLs sharing a file name with a queued one, keyed by that name.
    let mut waiting: HashMap<String, VecDeque<String>> = HashMap::new();
    for url in urls {
        if !seen.insert(url.clone()) {
            tracing::debug!(%url, "Ignoring repeated URL");
            continue;
        }
        if let Some(id) = present_id(inventory, &url, worker.protocol()) {
            skipped.push(id);
            continue;
        }
        match file_name_from_url(&url, worker.protocol()) {
            Ok(name) if waiting.contains_key(&name) => {
                tracing::debug!(%url, %name, "Shares a file name with an earlier URL; queued behind it");
                waiting.entry(name).or_default().push_back(url);
            },
            Ok(name) => {
                waiting.insert(name, VecDeque::new());
                queued.push(url);
            },
            Err(_) => queued.push(url),
        }
    }
    tracing::info!(queued = queued.len(), skipped = skipped.len(), "Fetch batch planned");

    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        yield FetchEvent::Started;
        for id in skipped {
            tracing::debug!(%id, "Already present; skipping");
            yield FetchEvent::Skipped(id);
        }

        let start = move |url: String| async move { worker.fetch(&url, destination).await };
        let mut pending = queued.into_iter().map(start);
        let mut processing = FuturesUnordered::new();
        processing.extend(pending.by_ref().take(concurrency.max(1)));
        let mut cancelled = false;
        while let Some(outcome) = processing.next().await {
            cancelled |= outcome.cancelled;
            // A URL waiting on this file name takes over the finished slot.
            let behind = outcome
                .record
                .filename
                .as_ref()
                .and_then(|name| waiting.get_mut(name))
                .and_then(VecDeque::pop_front);
            yield FetchEvent::Fetched(Box::new(outcome));
            if cancelled {
                continue;
            }
            if let Some(next) = behind.map(start).or_else(|| pending.next()) {
                processing.push(next);
            }
        }

        yield FetchEvent::Complete;
    })
}

fn present_id(inventory: &Inventory, url: &str, protocol: &str) -> Option<String> {
    let name = file_name_from_url(url, protocol).ok()?;
    let id = normalize_id(&id_from_filename(&name));
    inventory.get(&id).filter(|record| record.dl_status.is_present()).map(|_| id)
}

/// Folds a fetched record into `inventory`, returning the key it landed under.
///
/// Records whose file name could be derived are keyed by their normalized id.
/// An existing entry is merged with the fetched record as the base, so the
/// fresh lifecycle fields win and the existing descriptive fields backfill.
/// `error_info` always comes from the fetched record: a successful fetch
/// clears an earlier failure.
pub fn fold_into(inventory: &mut Inventory, mut record: AssetRecord) -> String {
    if record.filename.is_some() {
        record.id = normalize_id(&record.id);
    }
    let key = record.id.clone();
    match inventory.entry(key.clone()) {
        Entry::Vacant(entry) => {
            entry.insert(record);
        },
        Entry::Occupied(mut entry) => {
            let mut merged = merge(&record, entry.get());
            merged.error_info = record.error_info;
            entry.insert(merged);
        },
    }
    key
}

/// Totals for one [`run_fetch`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub skipped: usize,
    pub downloaded: usize,
    pub existing: usize,
    pub failed: usize,
    /// Whether the batch stopped early because it was cancelled.
    pub cancelled: bool,
    /// The snapshot log written for this run, if any.
    pub snapshot: Option<PathBuf>,
}

/// Fetches `urls`, folds every outcome into `inventory`, saves the cache and
/// appends a snapshot log of the fetched records.
///
/// Persistence failures are logged; they never undo what was fetched.
#[tracing::instrument(skip_all, fields(urls = urls.len(), concurrency = concurrency))]
pub async fn run_fetch<T: FetchTransport>(
    inventory: &mut Inventory,
    urls: Vec<String>,
    worker: &FetchWorker<T>,
    destination: Option<&Path>,
    concurrency: usize,
    reconciler: &Reconciler,
) -> FetchReport {
    let mut report = FetchReport::default();
    let mut touched = BTreeSet::new();
    let mut events = pin!(fetch(inventory, urls, worker, destination, concurrency));
    while let Some(event) = events.next().await {
        match event {
            FetchEvent::Started | FetchEvent::Complete => {},
            FetchEvent::Skipped(_) => report.skipped += 1,
            FetchEvent::Fetched(outcome) => {
                report.cancelled |= outcome.cancelled;
                match outcome.status() {
                    DownloadStatus::Downloaded => report.downloaded += 1,
                    DownloadStatus::Exists => report.existing += 1,
                    _ => report.failed += 1,
                }
                touched.insert(fold_into(inventory, outcome.record));
            },
        }
    }
    if touched.is_empty() {
        return report;
    }

    if let Err(err) = reconciler.save(inventory).await {
        tracing::warn!(error = ?err, "Fetched records were not cached");
    }
    match reconciler.write_snapshot(touched.iter().filter_map(|key| inventory.get(key))).await {
        Ok(path) => report.snapshot = path,
        Err(err) => tracing::warn!(error = ?err, "Fetched records were not logged"),
    }
    tracing::info!(?report, "Fetch run finished");
    report
}
