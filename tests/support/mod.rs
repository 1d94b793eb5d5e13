// Shared test doubles for the engine scenario tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use pairchat::{
    AgeBracket, ChatError, Country, Engine, Gender, MemoryProfiles, MessageContent, MessageId,
    Notice, ProfileSource, Scheduler, SessionController, Ticket, Transport, TransportError,
    UserId, UserProfile,
};

/// One outbound operation seen by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Notice {
        user: UserId,
        id: MessageId,
        notice: Notice,
    },
    Message {
        user: UserId,
        id: MessageId,
        content: MessageContent,
        reply_to: Option<MessageId>,
    },
    Edited {
        user: UserId,
        id: MessageId,
        content: MessageContent,
    },
    Deleted {
        user: UserId,
        id: MessageId,
    },
    Error {
        user: UserId,
        error: ChatError,
    },
}

impl Sent {
    pub fn user(&self) -> UserId {
        match self {
            Sent::Notice { user, .. }
            | Sent::Message { user, .. }
            | Sent::Edited { user, .. }
            | Sent::Deleted { user, .. }
            | Sent::Error { user, .. } => *user,
        }
    }
}

#[derive(Default)]
struct Inner {
    log: Vec<Sent>,
    last_id: HashMap<UserId, i64>,
    unreachable: HashSet<UserId>,
    fail_deliveries: usize,
}

impl Inner {
    fn allocate(&mut self, user: UserId) -> MessageId {
        let last = self.last_id.entry(user).or_insert(0);
        *last += 1;
        MessageId(*last)
    }

    fn check(&self, user: UserId) -> Result<(), TransportError> {
        if self.unreachable.contains(&user) {
            Err(TransportError::Unreachable(user))
        } else {
            Ok(())
        }
    }
}

/// Transport that records every operation and can be told to fail
#[derive(Default)]
pub struct RecordingTransport {
    inner: Mutex<Inner>,
}

impl RecordingTransport {
    /// Id for a message the user typed themselves
    pub fn accept(&self, user: UserId) -> MessageId {
        self.inner.lock().unwrap().allocate(user)
    }

    pub fn set_unreachable(&self, user: UserId, unreachable: bool) {
        let mut inner = self.inner.lock().unwrap();
        if unreachable {
            inner.unreachable.insert(user);
        } else {
            inner.unreachable.remove(&user);
        }
    }

    /// Make the next `count` deliveries fail
    pub fn fail_deliveries(&self, count: usize) {
        self.inner.lock().unwrap().fail_deliveries = count;
    }

    /// Drain the recorded operations
    pub fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut self.inner.lock().unwrap().log)
    }

    pub fn take_for(&self, user: UserId) -> Vec<Sent> {
        self.take().into_iter().filter(|s| s.user() == user).collect()
    }

    pub fn notices_for(&self, user: UserId) -> Vec<Notice> {
        self.take_for(user)
            .into_iter()
            .filter_map(|s| match s {
                Sent::Notice { notice, .. } => Some(notice),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn notify(&self, user: UserId, notice: Notice) -> Result<MessageId, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check(user)?;
        let id = inner.allocate(user);
        inner.log.push(Sent::Notice { user, id, notice });
        Ok(id)
    }

    async fn deliver(
        &self,
        user: UserId,
        content: &MessageContent,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check(user)?;
        if inner.fail_deliveries > 0 {
            inner.fail_deliveries -= 1;
            return Err(TransportError::QueueFull(user));
        }
        let id = inner.allocate(user);
        inner.log.push(Sent::Message {
            user,
            id,
            content: content.clone(),
            reply_to,
        });
        Ok(id)
    }

    async fn edit(
        &self,
        user: UserId,
        message_id: MessageId,
        content: &MessageContent,
    ) -> Result<bool, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check(user)?;
        if !content.kind().is_editable() {
            return Ok(false);
        }
        inner.log.push(Sent::Edited {
            user,
            id: message_id,
            content: content.clone(),
        });
        Ok(true)
    }

    async fn delete(&self, user: UserId, message_id: MessageId) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check(user)?;
        inner.log.push(Sent::Deleted {
            user,
            id: message_id,
        });
        Ok(())
    }

    async fn report(&self, user: UserId, error: &ChatError) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.log.push(Sent::Error {
            user,
            error: error.clone(),
        });
        Ok(())
    }
}

/// Scheduler that only records requests
#[derive(Default)]
pub struct ManualScheduler {
    pub scheduled: Mutex<HashMap<UserId, Ticket>>,
    pub cancelled: Mutex<Vec<UserId>>,
}

impl ManualScheduler {
    pub fn pending(&self, user: UserId) -> Option<Ticket> {
        self.scheduled.lock().unwrap().get(&user).copied()
    }
}

impl Scheduler for ManualScheduler {
    fn after(&self, _delay: Duration, user: UserId, ticket: Ticket) {
        self.scheduled.lock().unwrap().insert(user, ticket);
    }

    fn cancel(&self, user: UserId) {
        self.scheduled.lock().unwrap().remove(&user);
        self.cancelled.lock().unwrap().push(user);
    }
}

pub struct Fixture {
    pub engine: Engine,
    pub transport: Arc<RecordingTransport>,
    pub scheduler: Arc<ManualScheduler>,
    pub profiles: Arc<MemoryProfiles>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_source(MemoryProfiles::new())
    }

    pub fn with_source(profiles: MemoryProfiles) -> Self {
        let transport = Arc::new(RecordingTransport::default());
        let scheduler = Arc::new(ManualScheduler::default());
        let profiles = Arc::new(profiles);
        let engine = Engine::new(
            SessionController::new(),
            transport.clone(),
            scheduler.clone(),
            profiles.clone(),
        );
        Self {
            engine,
            transport,
            scheduler,
            profiles,
        }
    }

    pub async fn register(&mut self, user: UserId, gender: Gender) {
        self.engine.register(user, profile(gender)).await.unwrap();
    }

    /// Register two users and pair them, clearing the transport log
    pub async fn paired(&mut self, a: UserId, b: UserId) {
        self.register(a, Gender::Male).await;
        self.register(b, Gender::Female).await;
        self.engine.start(a, None).await.unwrap();
        self.engine.start(b, None).await.unwrap();
        self.transport.take();
    }

    pub async fn saved_profile(&self, user: UserId) -> Option<UserProfile> {
        self.profiles.get(user).await.unwrap()
    }
}

pub fn profile(gender: Gender) -> UserProfile {
    UserProfile {
        gender,
        country: Country::Belarus,
        age: AgeBracket::From18To21,
    }
}

pub fn text(s: &str) -> MessageContent {
    MessageContent::Text {
        text: s.to_string(),
    }
}

pub fn sticker(file_id: &str) -> MessageContent {
    MessageContent::Sticker {
        file_id: file_id.to_string(),
        emoji: None,
    }
}
