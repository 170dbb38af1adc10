/// Pending-line buffer shared between the producer and the delivery loop.
///
/// Lines move from the live buffer into a staged batch on `flush()` and are
/// discarded on `ack()`. A line is never in both places, and nothing leaves
/// the staged batch except through `ack()`.
use std::sync::{Mutex, MutexGuard};

/// A single input line tagged with its insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// 0-based position in the order lines were added.
    pub seq: u64,
    pub text: String,
}

/// Ordered snapshot of lines taken by one `flush()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    lines: Vec<Line>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[allow(dead_code)]
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Line texts in delivery order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|l| l.text.as_str())
    }

    /// Render the batch as a single message body.
    ///
    /// Lines are joined with `\n`, then `&`, `<` and `>` are replaced with their
    /// percent-encoded HTML entities. Escaping runs once over the joined text;
    /// `&` goes first so the inserted sequences are not escaped again.
    pub fn encode(&self) -> String {
        let joined = self.texts().collect::<Vec<_>>().join("\n");
        escape_markup(&joined)
    }
}

fn escape_markup(text: &str) -> String {
    text.replace('&', "%26amp%3B")
        .replace('<', "%26lt%3B")
        .replace('>', "%26gt%3B")
}

#[derive(Debug, Default)]
struct Inner {
    live: Vec<Line>,
    staged: Vec<Line>,
    next_seq: u64,
}

/// Mutex-protected line queue with flush/ack staging.
#[derive(Debug, Default)]
pub struct LineQueue {
    inner: Mutex<Inner>,
}

impl LineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // Every operation leaves Inner consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a line to the tail of the live buffer.
    pub fn add(&self, text: impl Into<String>) {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.live.push(Line {
            seq,
            text: text.into(),
        });
    }

    /// True iff there is nothing live and nothing staged awaiting `ack()`.
    pub fn is_empty(&self) -> bool {
        let inner = self.lock();
        inner.live.is_empty() && inner.staged.is_empty()
    }

    /// Move the live buffer into the staged batch and return the staged batch.
    ///
    /// If an earlier batch is still staged, the live lines are appended to it,
    /// so the returned batch always covers everything not yet acknowledged.
    pub fn flush(&self) -> Batch {
        let mut inner = self.lock();
        let live = std::mem::take(&mut inner.live);
        inner.staged.extend(live);
        Batch {
            lines: inner.staged.clone(),
        }
    }

    /// Discard the staged batch. No-op when nothing is staged.
    pub fn ack(&self) {
        self.lock().staged.clear();
    }

    /// Number of lines not yet acknowledged (live + staged).
    pub fn pending(&self) -> usize {
        let inner = self.lock();
        inner.live.len() + inner.staged.len()
    }
}
