//! Giveaways and their live bindings
//!
//! Each giveaway id owns one record with two locks. The state lock guards
//! the active giveaway, clicks received before it was configured and the
//! handle of its pending completion. It is only held for in-memory changes,
//! so a click is answered without waiting on Discord.
//!
//! The bindings lock guards the published messages bound to the id and is
//! held for a whole fetch, patch and write cycle. Two syncs for the same id
//! therefore never have writes in flight against the same message at once.
//! Every change to the state bumps a version; a sync that finds the cards
//! already written at the current version does nothing, so a burst of
//! queued refreshes collapses into one write. Different ids proceed in
//! parallel.

use crate::api::MessagingApi;
use crate::error::{Error, Result};
use crate::patch::{patch_document, render_count, render_countdown, LabelCache};
use crate::token::TokenKind;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d+)\s*([smhd])\s*$").expect("duration pattern is a valid regex")
});

/// Parse `30s`, `10m`, `2h` or `1d`
#[must_use]
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let caps = DURATION.captures(raw)?;
    let amount: u64 = caps[1].parse().ok()?;
    let unit = match caps[2].to_ascii_lowercase().as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        _ => 86_400,
    };
    amount.checked_mul(unit).map(Duration::from_secs)
}

/// Extract `(guild, channel, message)` from a Discord message link
#[must_use]
pub fn parse_message_link(link: &str) -> Option<(u64, u64, u64)> {
    let mut ids = link.trim().trim_end_matches('/').rsplit('/');
    let message = ids.next()?.parse().ok()?;
    let channel = ids.next()?.parse().ok()?;
    let guild = ids.next()?.parse().ok()?;
    Some((guild, channel, message))
}

/// Giveaway settings
#[derive(Debug, Clone)]
pub struct GiveawayConfig {
    /// Shortest accepted giveaway duration
    pub min_duration: Duration,
    /// Most participants listed by name
    pub display_cap: usize,
    /// Drop a binding after this many consecutive failed updates
    pub prune_after_failures: Option<u32>,
}

impl Default for GiveawayConfig {
    fn default() -> Self {
        Self {
            min_duration: Duration::from_secs(5),
            display_cap: 30,
            prune_after_failures: None,
        }
    }
}

/// An active giveaway
#[derive(Debug, Clone)]
pub struct Giveaway {
    /// Giveaway id shared with the card tokens
    pub id: String,
    /// Guild it runs in
    pub guild_id: u64,
    /// Channel receiving the result announcement
    pub channel_id: u64,
    /// Number of winners to draw
    pub winners: usize,
    /// Scheduled end
    pub ends_at: DateTime<Utc>,
    /// Users who joined
    pub participants: HashSet<u64>,
}

/// A published message kept in sync with a giveaway
#[derive(Debug, Clone)]
pub struct Binding {
    /// Channel holding the message
    pub channel_id: u64,
    /// The message itself
    pub message_id: u64,
    /// Webhook URL the message was sent through, once resolved
    pub endpoint: Option<String>,
    /// Labels of the live blocks, per path
    pub labels: LabelCache,
    /// Consecutive failed updates
    pub failures: u32,
}

impl Binding {
    fn new(channel_id: u64, message_id: u64) -> Self {
        Self {
            channel_id,
            message_id,
            endpoint: None,
            labels: LabelCache::new(),
            failures: 0,
        }
    }
}

/// What a join click did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The user is now in
    Joined,
    /// The user was in and has left
    Left,
}

impl JoinOutcome {
    /// Ephemeral confirmation for the clicker
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::Joined => "You joined the giveaway. Click again to leave.",
            Self::Left => "You left the giveaway.",
        }
    }
}

/// Result of a completed giveaway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Drawn winners
    pub winners: Vec<u64>,
    /// Participants at completion time
    pub participants: usize,
}

/// State changed by clicks and commands; never locked across I/O
#[derive(Debug, Default)]
struct RecordState {
    giveaway: Option<Giveaway>,
    /// Clicks received before the giveaway was configured
    early: HashSet<u64>,
    completion: Option<CancellationToken>,
    /// What the bound cards should show
    live: LiveValues,
    /// Bumped whenever `live` changes
    version: u64,
}

impl RecordState {
    fn participants(&self) -> &HashSet<u64> {
        self.giveaway
            .as_ref()
            .map_or(&self.early, |giveaway| &giveaway.participants)
    }

    fn participants_mut(&mut self) -> &mut HashSet<u64> {
        match self.giveaway.as_mut() {
            Some(giveaway) => &mut giveaway.participants,
            None => &mut self.early,
        }
    }

    fn publish(&mut self, live: LiveValues) {
        self.live = live;
        self.version += 1;
    }
}

#[derive(Debug, Default)]
struct BindingSet {
    entries: Vec<Binding>,
    /// Version every entry was last written at
    synced: Option<u64>,
}

#[derive(Debug, Default)]
struct UpdateRecord {
    state: Mutex<RecordState>,
    bindings: Mutex<BindingSet>,
}

/// Live values written during one sync pass
#[derive(Debug, Clone, Copy, Default)]
struct LiveValues {
    count: usize,
    ends_at: Option<DateTime<Utc>>,
}

/// Owns every giveaway record and keeps bound messages up to date
pub struct GiveawayManager {
    api: Arc<dyn MessagingApi>,
    config: GiveawayConfig,
    records: DashMap<String, Arc<UpdateRecord>>,
}

impl GiveawayManager {
    /// Create a manager writing through `api`
    pub fn new(api: Arc<dyn MessagingApi>, config: GiveawayConfig) -> Arc<Self> {
        Arc::new(Self {
            api,
            config,
            records: DashMap::new(),
        })
    }

    fn record(&self, id: &str) -> Arc<UpdateRecord> {
        self.records.entry(id.to_string()).or_default().clone()
    }

    fn existing(&self, id: &str) -> Option<Arc<UpdateRecord>> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    /// Whether a giveaway with this id is running
    pub async fn is_active(&self, id: &str) -> bool {
        match self.existing(id) {
            Some(record) => record.state.lock().await.giveaway.is_some(),
            None => false,
        }
    }

    /// Current participants, sorted
    pub async fn participants(&self, id: &str) -> Vec<u64> {
        let Some(record) = self.existing(id) else {
            return Vec::new();
        };
        let state = record.state.lock().await;
        let mut users: Vec<u64> = state.participants().iter().copied().collect();
        users.sort_unstable();
        users
    }

    /// Operator-facing participant listing, capped at the display limit
    pub async fn participants_summary(&self, id: &str) -> String {
        let users = self.participants(id).await;
        if users.is_empty() {
            return format!("No participants in `{}` yet.", id);
        }

        let shown: Vec<String> = users
            .iter()
            .take(self.config.display_cap)
            .map(|user| format!("<@{}>", user))
            .collect();
        let mut summary = format!(
            "**{} participant(s) in `{}`:**\n{}",
            users.len(),
            id,
            shown.join(", ")
        );
        if users.len() > self.config.display_cap {
            summary.push_str(&format!(
                "\n...and {} more.",
                users.len() - self.config.display_cap
            ));
        }
        summary
    }

    /// Toggle a user's membership. Works before the giveaway is configured;
    /// such clicks are merged in when it is.
    ///
    /// Only the in-memory state is touched; call [`Self::refresh`] to push
    /// the new counter to the bound cards.
    pub async fn toggle_participant(&self, id: &str, user_id: u64) -> JoinOutcome {
        let record = self.record(id);
        let mut state = record.state.lock().await;
        let participants = state.participants_mut();
        let outcome = if participants.remove(&user_id) {
            JoinOutcome::Left
        } else {
            participants.insert(user_id);
            JoinOutcome::Joined
        };
        let live = LiveValues {
            count: state.participants().len(),
            ..state.live
        };
        state.publish(live);
        debug!(giveaway_id = %id, user_id, ?outcome, "Participant toggled");
        outcome
    }

    /// Push the current counter to every bound message
    pub async fn refresh(&self, id: &str) {
        let Some(record) = self.existing(id) else {
            return;
        };
        let mut bindings = record.bindings.lock().await;
        self.sync(id, &record, &mut bindings, false).await;
    }

    /// Configure (or reconfigure) a giveaway and schedule its completion.
    ///
    /// Returns the scheduled end.
    #[instrument(skip(self), fields(giveaway_id = %id))]
    pub async fn configure(
        self: &Arc<Self>,
        id: &str,
        guild_id: u64,
        channel_id: u64,
        duration: Duration,
        winners: usize,
    ) -> Result<DateTime<Utc>> {
        if duration < self.config.min_duration {
            return Err(Error::MalformedInput(format!(
                "Duration must be at least {} seconds.",
                self.config.min_duration.as_secs()
            )));
        }
        if winners == 0 {
            return Err(Error::MalformedInput(
                "There must be at least one winner.".to_string(),
            ));
        }
        let span = chrono::Duration::from_std(duration)
            .map_err(|_| Error::MalformedInput("Duration is too long.".to_string()))?;
        let ends_at = Utc::now() + span;

        let record = self.record(id);
        {
            let mut state = record.state.lock().await;
            if let Some(previous) = state.completion.take() {
                previous.cancel();
            }
            let mut participants = std::mem::take(&mut state.early);
            if let Some(previous) = state.giveaway.take() {
                participants.extend(previous.participants);
            }
            let count = participants.len();
            state.giveaway = Some(Giveaway {
                id: id.to_string(),
                guild_id,
                channel_id,
                winners,
                ends_at,
                participants,
            });
            state.publish(LiveValues {
                count,
                ends_at: Some(ends_at),
            });

            let token = CancellationToken::new();
            state.completion = Some(token.clone());
            self.schedule_completion(id.to_string(), duration, token);
        }
        info!(%ends_at, winners, "Giveaway configured");

        let mut bindings = record.bindings.lock().await;
        self.sync(id, &record, &mut bindings, false).await;
        Ok(ends_at)
    }

    fn schedule_completion(self: &Arc<Self>, id: String, after: Duration, token: CancellationToken) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(giveaway_id = %id, "Scheduled completion cancelled");
                }
                _ = tokio::time::sleep(after) => {
                    match manager.finish(&id, Some(&token)).await {
                        Ok(Some(_)) => {}
                        Ok(None) => debug!(giveaway_id = %id, "Scheduled completion superseded"),
                        Err(e) => warn!(giveaway_id = %id, error = %e, "Scheduled completion failed"),
                    }
                }
            }
        });
    }

    /// End a giveaway now, cancelling its scheduled completion
    pub async fn complete(&self, id: &str) -> Result<Completion> {
        self.finish(id, None)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Giveaway `{}`", id)))
    }

    /// Draw winners, announce them and write the final count.
    ///
    /// Returns `Ok(None)` when `scheduled` was cancelled before the state
    /// lock was taken, i.e. a reconfigure or manual end got there first.
    async fn finish(&self, id: &str, scheduled: Option<&CancellationToken>) -> Result<Option<Completion>> {
        let not_found = || Error::NotFound(format!("Giveaway `{}`", id));
        let record = self.existing(id).ok_or_else(not_found)?;

        let (giveaway, participants, winners) = {
            let mut state = record.state.lock().await;
            if scheduled.is_some_and(CancellationToken::is_cancelled) {
                return Ok(None);
            }
            let giveaway = state.giveaway.take().ok_or_else(not_found)?;
            if let Some(token) = state.completion.take() {
                token.cancel();
            }

            let pool: Vec<u64> = giveaway.participants.iter().copied().collect();
            let winners: Vec<u64> = pool
                .choose_multiple(&mut rand::thread_rng(), giveaway.winners.min(pool.len()))
                .copied()
                .collect();
            state.publish(LiveValues {
                count: pool.len(),
                ends_at: None,
            });
            (giveaway, pool.len(), winners)
        };
        info!(
            giveaway_id = %id,
            participants,
            winners = winners.len(),
            "Giveaway completed"
        );

        let announcement = if winners.is_empty() {
            format!("Giveaway `{}` ended with no participants.", id)
        } else {
            let mentions: Vec<String> = winners.iter().map(|w| format!("<@{}>", w)).collect();
            format!(
                "Giveaway `{}` ended! Congratulations {}",
                id,
                mentions.join(", ")
            )
        };
        if let Err(e) = self.api.announce(giveaway.channel_id, &announcement).await {
            warn!(giveaway_id = %id, error = %e, "Failed to announce winners");
        }

        let mut bindings = record.bindings.lock().await;
        self.sync(id, &record, &mut bindings, false).await;

        Ok(Some(Completion {
            winners,
            participants,
        }))
    }

    /// Bind a published message to a giveaway and bring it up to date
    #[instrument(skip(self), fields(giveaway_id = %id))]
    pub async fn bind(&self, id: &str, channel_id: u64, message_id: u64) {
        let record = self.record(id);
        let mut bindings = record.bindings.lock().await;
        bindings.entries.push(Binding::new(channel_id, message_id));
        info!(bindings = bindings.entries.len(), "Message bound");
        self.sync(id, &record, &mut bindings, true).await;
    }

    /// Remove every binding to `message_id`; returns how many were removed
    pub async fn unbind(&self, id: &str, message_id: u64) -> usize {
        let Some(record) = self.existing(id) else {
            return 0;
        };
        let mut bindings = record.bindings.lock().await;
        let before = bindings.entries.len();
        bindings
            .entries
            .retain(|binding| binding.message_id != message_id);
        before - bindings.entries.len()
    }

    /// Bindings of a giveaway
    pub async fn bindings(&self, id: &str) -> Vec<Binding> {
        match self.existing(id) {
            Some(record) => record.bindings.lock().await.entries.clone(),
            None => Vec::new(),
        }
    }

    /// Bring every binding to the current version. Callers hold the
    /// bindings lock; the state lock is only taken for the snapshot.
    async fn sync(&self, id: &str, record: &UpdateRecord, bindings: &mut BindingSet, force: bool) {
        let (version, values) = {
            let state = record.state.lock().await;
            (state.version, state.live)
        };
        if !force && bindings.synced == Some(version) {
            debug!(giveaway_id = %id, version, "Bound cards already current");
            return;
        }
        let all_written = self.sync_bindings(id, &mut bindings.entries, values).await;
        bindings.synced = all_written.then_some(version);
    }

    /// Write live values to every binding. One failing binding never stops
    /// the others. Returns whether every binding was written.
    async fn sync_bindings(&self, id: &str, bindings: &mut Vec<Binding>, values: LiveValues) -> bool {
        let mut all_written = true;
        let mut stale = Vec::new();
        for (index, binding) in bindings.iter_mut().enumerate() {
            match self.sync_binding(id, binding, values).await {
                Ok(changed) => {
                    binding.failures = 0;
                    debug!(giveaway_id = %id, message_id = binding.message_id, changed, "Binding synced");
                }
                Err(e) => {
                    all_written = false;
                    binding.failures += 1;
                    warn!(
                        giveaway_id = %id,
                        message_id = binding.message_id,
                        failures = binding.failures,
                        error = %e,
                        "Binding update failed"
                    );
                    if self
                        .config
                        .prune_after_failures
                        .is_some_and(|limit| binding.failures >= limit)
                    {
                        stale.push(index);
                    }
                }
            }
        }

        for index in stale.into_iter().rev() {
            let binding = bindings.remove(index);
            info!(giveaway_id = %id, message_id = binding.message_id, "Stale binding pruned");
        }
        all_written
    }

    async fn sync_binding(&self, id: &str, binding: &mut Binding, values: LiveValues) -> Result<bool> {
        let endpoint = match &binding.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                let endpoint = self.api.ensure_delivery_endpoint(binding.channel_id).await?;
                binding.endpoint = Some(endpoint.clone());
                endpoint
            }
        };

        let mut card = self.api.fetch_message(&endpoint, binding.message_id).await?;

        let mut outcome = patch_document(
            &mut card,
            TokenKind::Count,
            id,
            |base| render_count(base, values.count),
            &binding.labels,
        );
        if let Some(ends_at) = values.ends_at {
            let countdown = patch_document(
                &mut card,
                TokenKind::Time,
                id,
                |base| render_countdown(base, ends_at.timestamp()),
                &outcome.cache,
            );
            outcome.changed |= countdown.changed;
            outcome.cache = countdown.cache;
        }

        if !outcome.changed {
            return Ok(false);
        }
        self.api
            .edit_message(&endpoint, binding.message_id, &card)
            .await?;
        binding.labels = outcome.cache;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::WebhookPayload;
    use crate::blocks::{Block, Card};
    use crate::token::encode;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// In-memory messages keyed by id; ids in `broken` fail to fetch.
    /// Every fetch and edit waits `delay` first.
    #[derive(Default)]
    struct FakeApi {
        messages: StdMutex<HashMap<u64, Card>>,
        broken: StdMutex<HashSet<u64>>,
        edits: StdMutex<Vec<u64>>,
        announcements: StdMutex<Vec<(u64, String)>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl FakeApi {
        fn with_message(self, id: u64, blocks: Vec<Block>) -> Self {
            let card = Card::from_blocks(&blocks).unwrap();
            self.messages.lock().unwrap().insert(id, card);
            self
        }

        fn text_of(&self, id: u64, index: usize) -> String {
            let blocks = self.messages.lock().unwrap()[&id].blocks().unwrap();
            match &blocks[index] {
                Block::Text { content } => content.clone(),
                other => panic!("text expected, got {:?}", other),
            }
        }
    }

    #[async_trait]
    impl MessagingApi for FakeApi {
        async fn ensure_delivery_endpoint(&self, channel_id: u64) -> Result<String> {
            Ok(format!("hook-{}", channel_id))
        }

        async fn fetch_message(&self, _endpoint: &str, message_id: u64) -> Result<Card> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.broken.lock().unwrap().contains(&message_id) {
                return Err(Error::Transport {
                    status: 404,
                    message: "Unknown Message".to_string(),
                });
            }
            self.messages
                .lock()
                .unwrap()
                .get(&message_id)
                .cloned()
                .ok_or_else(|| Error::NotFound("message".to_string()))
        }

        async fn edit_message(&self, _endpoint: &str, message_id: u64, card: &Card) -> Result<()> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.messages
                .lock()
                .unwrap()
                .insert(message_id, card.clone());
            self.edits.lock().unwrap().push(message_id);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        async fn publish(&self, _endpoint: &str, _payload: &WebhookPayload) -> Result<()> {
            Ok(())
        }

        async fn announce(&self, channel_id: u64, content: &str) -> Result<()> {
            self.announcements
                .lock()
                .unwrap()
                .push((channel_id, content.to_string()));
            Ok(())
        }
    }

    fn card(id: &str) -> Vec<Block> {
        vec![
            Block::text(format!("Participants: 0{}", encode(&format!("gaw:count:{}", id)))),
            Block::text(format!("Ends {}", encode(&format!("gaw:time:{}", id)))),
        ]
    }

    fn manager(api: &Arc<FakeApi>, config: GiveawayConfig) -> Arc<GiveawayManager> {
        GiveawayManager::new(api.clone(), config)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("10M"), Some(Duration::from_secs(600)));
        assert_eq!(parse_duration(" 2h "), Some(Duration::from_secs(7_200)));
        assert_eq!(parse_duration("1d"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("1w"), None);
        assert_eq!(parse_duration("-5s"), None);
        assert_eq!(parse_duration("s"), None);
    }

    #[test]
    fn test_parse_message_link() {
        assert_eq!(
            parse_message_link("https://discord.com/channels/1/22/333"),
            Some((1, 22, 333))
        );
        assert_eq!(parse_message_link("https://discord.com/channels/1/22/x"), None);
        assert_eq!(parse_message_link("333"), None);
    }

    #[tokio::test]
    async fn test_early_clicks_merged_on_configure() {
        let api = Arc::new(FakeApi::default().with_message(7, card("g1")));
        let manager = manager(&api, GiveawayConfig::default());

        assert_eq!(manager.toggle_participant("g1", 100).await, JoinOutcome::Joined);
        assert_eq!(manager.toggle_participant("g1", 200).await, JoinOutcome::Joined);
        assert_eq!(manager.toggle_participant("g1", 200).await, JoinOutcome::Left);
        assert!(!manager.is_active("g1").await);

        manager.bind("g1", 5, 7).await;
        manager
            .configure("g1", 1, 5, Duration::from_secs(60), 1)
            .await
            .unwrap();

        assert!(manager.is_active("g1").await);
        assert_eq!(manager.participants("g1").await, vec![100]);
        assert!(api.text_of(7, 0).starts_with("Participants: 1"));
        assert!(api.text_of(7, 1).starts_with("Ends: <t:"));
    }

    #[tokio::test]
    async fn test_configure_validates_arguments() {
        let api = Arc::new(FakeApi::default());
        let manager = manager(&api, GiveawayConfig::default());

        assert!(matches!(
            manager.configure("g", 1, 5, Duration::from_secs(4), 1).await,
            Err(Error::MalformedInput(_))
        ));
        assert!(matches!(
            manager.configure("g", 1, 5, Duration::from_secs(60), 0).await,
            Err(Error::MalformedInput(_))
        ));
        assert!(!manager.is_active("g").await);

        // The minimum itself is accepted
        tokio_test::assert_ok!(manager.configure("g", 1, 5, Duration::from_secs(5), 1).await);
        assert!(manager.is_active("g").await);
    }

    #[tokio::test]
    async fn test_failing_binding_does_not_block_others() {
        let api = Arc::new(
            FakeApi::default()
                .with_message(1, card("g1"))
                .with_message(2, card("g1")),
        );
        api.broken.lock().unwrap().insert(1);
        let manager = manager(&api, GiveawayConfig::default());

        manager.bind("g1", 5, 1).await;
        manager.bind("g1", 5, 2).await;
        manager.toggle_participant("g1", 42).await;
        manager.refresh("g1").await;

        assert!(api.text_of(2, 0).starts_with("Participants: 1"));
        assert!(api.text_of(1, 0).starts_with("Participants: 0"));
        assert!(!api.edits.lock().unwrap().contains(&1));

        // Without a prune policy the broken binding stays
        let bindings = manager.bindings("g1").await;
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].failures, 3);
        assert_eq!(bindings[1].failures, 0);
    }

    #[tokio::test]
    async fn test_stale_binding_pruned() {
        let api = Arc::new(FakeApi::default().with_message(2, card("g1")));
        api.broken.lock().unwrap().insert(1);
        let config = GiveawayConfig {
            prune_after_failures: Some(2),
            ..Default::default()
        };
        let manager = manager(&api, config);

        manager.bind("g1", 5, 1).await;
        manager.bind("g1", 5, 2).await;
        assert_eq!(manager.bindings("g1").await.len(), 1);
        assert_eq!(manager.bindings("g1").await[0].message_id, 2);
    }

    #[tokio::test]
    async fn test_unbind() {
        let api = Arc::new(FakeApi::default().with_message(1, card("g1")));
        let manager = manager(&api, GiveawayConfig::default());

        manager.bind("g1", 5, 1).await;
        manager.bind("g1", 5, 1).await;
        assert_eq!(manager.unbind("g1", 1).await, 2);
        assert_eq!(manager.unbind("g1", 1).await, 0);
        assert_eq!(manager.unbind("missing", 1).await, 0);
    }

    #[tokio::test]
    async fn test_same_record_writes_never_overlap() {
        let api = Arc::new(FakeApi::default().with_message(1, card("g1")));
        let manager = manager(&api, GiveawayConfig::default());
        manager.bind("g1", 5, 1).await;

        let a = async {
            manager.toggle_participant("g1", 1).await;
            manager.refresh("g1").await;
        };
        let b = async {
            manager.toggle_participant("g1", 2).await;
            manager.refresh("g1").await;
        };
        let c = async {
            manager.toggle_participant("g1", 3).await;
            manager.refresh("g1").await;
        };
        tokio::join!(a, b, c);

        assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(api.text_of(1, 0).starts_with("Participants: 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_completion_announces_once() {
        let api = Arc::new(FakeApi::default().with_message(1, card("g1")));
        let manager = manager(&api, GiveawayConfig::default());
        manager.bind("g1", 5, 1).await;
        for user in [10, 20, 30] {
            manager.toggle_participant("g1", user).await;
        }

        manager
            .configure("g1", 1, 99, Duration::from_secs(30), 2)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;

        let announcements = api.announcements.lock().unwrap().clone();
        assert_eq!(announcements.len(), 1);
        assert_eq!(announcements[0].0, 99);
        assert_eq!(announcements[0].1.matches("<@").count(), 2);
        assert!(!manager.is_active("g1").await);
        assert!(api.text_of(1, 0).starts_with("Participants: 3"));

        assert!(matches!(manager.complete("g1").await, Err(Error::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_end_cancels_schedule() {
        let api = Arc::new(FakeApi::default());
        let manager = manager(&api, GiveawayConfig::default());

        manager
            .configure("g1", 1, 99, Duration::from_secs(30), 3)
            .await
            .unwrap();
        let completion = manager.complete("g1").await.unwrap();
        assert!(completion.winners.is_empty());

        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;

        let announcements = api.announcements.lock().unwrap().clone();
        assert_eq!(announcements.len(), 1);
        assert!(announcements[0].1.contains("no participants"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_replaces_schedule() {
        let api = Arc::new(FakeApi::default());
        let manager = manager(&api, GiveawayConfig::default());

        manager
            .configure("g1", 1, 99, Duration::from_secs(10), 1)
            .await
            .unwrap();
        manager.toggle_participant("g1", 7).await;
        manager
            .configure("g1", 1, 99, Duration::from_secs(60), 1)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(20)).await;
        settle().await;
        assert!(api.announcements.lock().unwrap().is_empty());
        assert_eq!(manager.participants("g1").await, vec![7]);

        tokio::time::sleep(Duration::from_secs(45)).await;
        settle().await;
        let announcements = api.announcements.lock().unwrap().clone();
        assert_eq!(announcements.len(), 1);
        assert!(announcements[0].1.contains("<@7>"));
    }

    #[tokio::test]
    async fn test_participants_summary_caps_listing() {
        let api = Arc::new(FakeApi::default());
        let config = GiveawayConfig {
            display_cap: 2,
            ..Default::default()
        };
        let manager = manager(&api, config);

        assert!(manager.participants_summary("g1").await.contains("No participants"));
        for user in 1..=5 {
            manager.toggle_participant("g1", user).await;
        }
        let summary = manager.participants_summary("g1").await;
        assert!(summary.contains("5 participant(s)"));
        assert!(summary.contains("<@1>, <@2>"));
        assert!(!summary.contains("<@3>"));
        assert!(summary.contains("and 3 more"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_not_held_up_by_card_sync() {
        let api = Arc::new(
            FakeApi {
                delay: Duration::from_millis(1_500),
                ..Default::default()
            }
            .with_message(1, card("g1")),
        );
        let manager = manager(&api, GiveawayConfig::default());
        manager.bind("g1", 5, 1).await;
        manager.toggle_participant("g1", 1).await;

        let background = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.refresh("g1").await })
        };
        // The refresh now holds the bindings lock and waits on the fetch
        settle().await;

        let started = tokio::time::Instant::now();
        assert_eq!(manager.toggle_participant("g1", 2).await, JoinOutcome::Joined);
        assert!(started.elapsed() < Duration::from_millis(100));

        background.await.unwrap();
        manager.refresh("g1").await;
        assert!(api.text_of(1, 0).starts_with("Participants: 2"));
    }

    #[tokio::test]
    async fn test_queued_refreshes_coalesce() {
        let api = Arc::new(FakeApi::default().with_message(1, card("g1")));
        let manager = manager(&api, GiveawayConfig::default());
        manager.bind("g1", 5, 1).await;
        assert_eq!(api.edits.lock().unwrap().len(), 1);

        for user in [1, 2, 3] {
            manager.toggle_participant("g1", user).await;
        }
        tokio::join!(
            manager.refresh("g1"),
            manager.refresh("g1"),
            manager.refresh("g1")
        );

        assert_eq!(api.edits.lock().unwrap().len(), 2);
        assert!(api.text_of(1, 0).starts_with("Participants: 3"));
    }

    #[tokio::test]
    async fn test_failed_sync_is_retried() {
        let api = Arc::new(FakeApi::default().with_message(1, card("g1")));
        api.broken.lock().unwrap().insert(1);
        let manager = manager(&api, GiveawayConfig::default());
        manager.bind("g1", 5, 1).await;
        manager.toggle_participant("g1", 9).await;
        manager.refresh("g1").await;

        api.broken.lock().unwrap().clear();
        manager.refresh("g1").await;
        assert!(api.text_of(1, 0).starts_with("Participants: 1"));
    }

    #[tokio::test]
    async fn test_superseded_timer_is_not_an_error() {
        let api = Arc::new(FakeApi::default());
        let manager = manager(&api, GiveawayConfig::default());
        manager
            .configure("g1", 1, 99, Duration::from_secs(30), 1)
            .await
            .unwrap();

        let stale = CancellationToken::new();
        stale.cancel();
        assert_eq!(manager.finish("g1", Some(&stale)).await.unwrap(), None);
        assert!(manager.is_active("g1").await);
        assert!(api.announcements.lock().unwrap().is_empty());

        let live = CancellationToken::new();
        let completion = manager.finish("g1", Some(&live)).await.unwrap();
        assert_eq!(completion.map(|c| c.participants), Some(0));
        assert!(!manager.is_active("g1").await);
    }
}
