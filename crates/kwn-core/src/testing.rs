//! Hand-written fakes of the ports, shared by the unit tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicI32, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{
    domain::{ChatId, Filter, Listing, ListingId, MessageId, MessageRef, PageResponse, RawListing},
    messaging::{
        port::MessagingPort,
        types::{InlineKeyboard, MessagingCapabilities},
    },
    pacing::Pacer,
    ports::{KeyValueStore, ListingSource, NotificationSink},
    Error, Result,
};

pub fn raw(id: i64) -> RawListing {
    RawListing {
        id: Some(id),
        title: Some(format!("project {id}")),
        description: Some(format!("<p>details of <b>{id}</b></p>")),
        ..Default::default()
    }
}

pub fn page(ids: &[i64], pages: u32) -> PageResponse {
    PageResponse::Page {
        listings: ids.iter().copied().map(raw).collect(),
        pages,
    }
}

/// In-memory store honouring TTLs on the tokio clock.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    fail_get: Mutex<HashSet<String>>,
    fail_set: Mutex<HashSet<String>>,
    sets: AtomicUsize,
}

impl MemoryStore {
    pub fn raw(&self, key: &str) -> Option<String> {
        let map = self.entries.lock().unwrap();
        map.get(key)
            .filter(|(_, exp)| *exp > Instant::now())
            .map(|(v, _)| v.clone())
    }

    pub fn fail_get_for(&self, key: &str) {
        self.fail_get.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_set_for(&self, key: &str) {
        self.fail_set.lock().unwrap().insert(key.to_string());
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        if self.fail_get.lock().unwrap().contains(key) {
            return Err(Error::Store(format!("get {key} failed")));
        }
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_set.lock().unwrap().contains(key) {
            return Err(Error::Store(format!("set {key} failed")));
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }
}

/// Replays scripted pages and records which pages were requested.
pub struct ScriptedSource {
    pages: Mutex<HashMap<u32, VecDeque<Result<PageResponse>>>>,
    requested: Mutex<Vec<u32>>,
}

impl ScriptedSource {
    pub fn new(pages: Vec<(u32, PageResponse)>) -> Self {
        let mut map: HashMap<u32, VecDeque<Result<PageResponse>>> = HashMap::new();
        for (n, p) in pages {
            map.entry(n).or_default().push_back(Ok(p));
        }
        Self {
            pages: Mutex::new(map),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Serve the same page set to every cycle.
    pub fn repeating(pages: Vec<(u32, PageResponse)>, cycles: usize) -> Self {
        let mut all = Vec::new();
        for _ in 0..cycles {
            all.extend(pages.iter().cloned());
        }
        Self::new(all)
    }

    pub fn with_error(self, page: u32, err: Error) -> Self {
        self.pages
            .lock()
            .unwrap()
            .entry(page)
            .or_default()
            .push_back(Err(err));
        self
    }

    pub fn requested(&self) -> Vec<u32> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl ListingSource for ScriptedSource {
    async fn fetch_page(&self, _filter: &Filter, page: u32) -> Result<PageResponse> {
        self.requested.lock().unwrap().push(page);
        let next = self
            .pages
            .lock()
            .unwrap()
            .get_mut(&page)
            .and_then(|q| q.pop_front());
        next.unwrap_or(Ok(PageResponse::Page {
            listings: Vec::new(),
            pages: 0,
        }))
    }
}

/// Records delivered listing ids; ids in `fail` are refused.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Listing>>,
    fail: Mutex<HashSet<ListingId>>,
}

impl RecordingSink {
    pub fn failing_for(ids: &[i64]) -> Self {
        let sink = Self::default();
        sink.fail
            .lock()
            .unwrap()
            .extend(ids.iter().copied().map(ListingId));
        sink
    }

    pub fn sent_ids(&self) -> Vec<i64> {
        self.sent.lock().unwrap().iter().map(|l| l.id.0).collect()
    }

    pub fn sent(&self) -> Vec<Listing> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, listing: &Listing) -> Result<()> {
        if self.fail.lock().unwrap().contains(&listing.id) {
            return Err(Error::Delivery(format!("refused {}", listing.id)));
        }
        self.sent.lock().unwrap().push(listing.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingPacer {
    pauses: AtomicUsize,
}

impl CountingPacer {
    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Pacer for CountingPacer {
    async fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub html: String,
    pub keyboard: Option<InlineKeyboard>,
}

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<SentMessage>>,
    next_id: AtomicI32,
    fail: bool,
}

impl RecordingMessenger {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, msg: SentMessage) -> Result<MessageRef> {
        if self.fail {
            return Err(Error::Delivery("chat unavailable".to_string()));
        }
        let chat_id = msg.chat_id;
        self.sent.lock().unwrap().push(msg);
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)),
        })
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_inline_keyboards: true,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.record(SentMessage {
            chat_id,
            html: html.to_string(),
            keyboard: None,
        })
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.record(SentMessage {
            chat_id,
            html: html.to_string(),
            keyboard: Some(keyboard),
        })
    }

    async fn delete_message(&self, _msg: MessageRef) -> Result<()> {
        Ok(())
    }

    async fn answer_callback_query(&self, _callback_id: &str, _text: Option<&str>) -> Result<()> {
        Ok(())
    }
}
