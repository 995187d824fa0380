//! Brig service
//!
//! Ties the store to the gateway: brigging and releasing members, listing a
//! guild's brig and sweeping out expired sentences on a timer.

use crate::BRIG_TARGET;
use crate::brig::{BrigEntry, BrigError, BrigGateway, BrigResult, BrigStore};
use crate::config::{Phrases, render};
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use poise::serenity_prelude::{GuildId, Mentionable, UserId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Request type for the sweep task
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SweepRequest {
    /// Sweep right away instead of waiting for the next tick
    #[display("sweep now")]
    SweepNow,
    /// Stop the sweep task
    #[display("shutdown")]
    Shutdown,
}

/// Service for brig operations
#[derive(Clone)]
pub struct BrigService {
    /// Store for brig entries
    pub store: BrigStore,
    gateway: Arc<dyn BrigGateway>,
    role_name: String,
    phrases: Arc<Phrases>,
    /// Held across every add and remove, gateway calls included
    op_lock: Arc<Mutex<()>>,
    /// Guilds already told their brig role is missing
    role_missing_noticed: Arc<DashSet<GuildId>>,
}

impl BrigService {
    /// Create a new brig service
    pub fn new(
        store: BrigStore,
        gateway: Arc<dyn BrigGateway>,
        role_name: impl Into<String>,
        phrases: Phrases,
    ) -> Self {
        Self {
            store,
            gateway,
            role_name: role_name.into(),
            phrases: Arc::new(phrases),
            op_lock: Arc::new(Mutex::new(())),
            role_missing_noticed: Arc::new(DashSet::new()),
        }
    }

    /// Put a member in the brig, starting now
    ///
    /// # Errors
    /// See [`BrigService::add_at`].
    pub async fn add(
        &self,
        guild_id: GuildId,
        member_id: UserId,
        duration_minutes: Option<i64>,
    ) -> BrigResult<BrigEntry> {
        self.add_at(guild_id, member_id, duration_minutes, Utc::now())
            .await
    }

    /// Put a member in the brig for `duration_minutes` starting at `now`
    ///
    /// Any previous sentence of the member is replaced.
    ///
    /// # Errors
    /// Returns an error if the duration is invalid, the brig role is missing,
    /// the role cannot be assigned or the store cannot be saved.
    pub async fn add_at(
        &self,
        guild_id: GuildId,
        member_id: UserId,
        duration_minutes: Option<i64>,
        now: DateTime<Utc>,
    ) -> BrigResult<BrigEntry> {
        let entry = BrigEntry::new(guild_id, member_id, now, duration_minutes)?;
        let _guard = self.op_lock.lock().await;

        if let Err(e) = self.gateway.assign_role(guild_id, member_id).await {
            if matches!(e, BrigError::RoleMissing { .. }) {
                self.notify_role_missing(guild_id, "brig", false).await;
            }
            return Err(e);
        }
        self.role_missing_noticed.remove(&guild_id);
        self.notify(guild_id, self.added_message(&entry)).await;

        if let Some(previous) = self.store.upsert(entry.clone()) {
            debug!(
                target: BRIG_TARGET,
                guild_id = %guild_id,
                member_id = %member_id,
                previous_end = ?previous.end,
                "Replacing existing sentence"
            );
        }
        self.store.persist().await?;

        info!(
            target: BRIG_TARGET,
            guild_id = %guild_id,
            member_id = %member_id,
            end = ?entry.end,
            event = "brigged",
            "Member put in the brig"
        );
        Ok(entry)
    }

    /// Release a member from the brig
    ///
    /// Returns the released entry, or `None` if the member was not brigged, in
    /// which case nothing happens. A member who left the guild is released
    /// without touching roles.
    ///
    /// # Errors
    /// Returns an error if the brig role is missing, the role cannot be
    /// revoked or the store cannot be saved. The entry is kept in those cases.
    pub async fn remove(
        &self,
        guild_id: GuildId,
        member_id: UserId,
    ) -> BrigResult<Option<BrigEntry>> {
        self.release(guild_id, member_id, None).await
    }

    /// Release a member, or only if their sentence is over at `expired_at`
    ///
    /// The expiry check runs under the operation lock, so a sentence replaced
    /// after the sweep picked its candidates is left alone.
    async fn release(
        &self,
        guild_id: GuildId,
        member_id: UserId,
        expired_at: Option<DateTime<Utc>>,
    ) -> BrigResult<Option<BrigEntry>> {
        let _guard = self.op_lock.lock().await;

        let Some(entry) = self.store.get(guild_id, member_id) else {
            debug!(
                target: BRIG_TARGET,
                guild_id = %guild_id,
                member_id = %member_id,
                "Member not in the brig, nothing to release"
            );
            return Ok(None);
        };
        if let Some(now) = expired_at {
            if !entry.is_expired_at(now) {
                debug!(
                    target: BRIG_TARGET,
                    guild_id = %guild_id,
                    member_id = %member_id,
                    end = ?entry.end,
                    "Sentence was renewed, skipping release"
                );
                return Ok(None);
            }
        }

        match self.gateway.revoke_role(guild_id, member_id).await {
            Ok(()) => {
                self.role_missing_noticed.remove(&guild_id);
                let message = render(
                    &self.phrases.brig_remove,
                    &[("member", &member_id.mention().to_string())],
                );
                self.notify(guild_id, message).await;
            }
            Err(BrigError::MemberNotFound { .. }) => {
                warn!(
                    target: BRIG_TARGET,
                    guild_id = %guild_id,
                    member_id = %member_id,
                    "Member is gone from the guild, dropping their sentence"
                );
            }
            Err(e @ BrigError::RoleMissing { .. }) => {
                // Sweep notices once per missing-role episode
                self.notify_role_missing(guild_id, "unbrig", expired_at.is_some())
                    .await;
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        self.store.remove(guild_id, member_id);
        self.store.persist().await?;

        info!(
            target: BRIG_TARGET,
            guild_id = %guild_id,
            member_id = %member_id,
            event = "released",
            "Member released from the brig"
        );
        Ok(Some(entry))
    }

    /// All sentences of a guild
    #[must_use]
    pub fn list(&self, guild_id: GuildId) -> Vec<BrigEntry> {
        self.store.for_guild(guild_id)
    }

    /// Release every member whose sentence is over
    pub async fn sweep(&self) -> Vec<BrigEntry> {
        self.sweep_at(Utc::now()).await
    }

    /// Release every member whose sentence is over at `now`
    ///
    /// Failures are logged per member and do not stop the sweep.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Vec<BrigEntry> {
        let mut released = Vec::new();

        for (guild_id, member_id) in self.store.expired_at(now) {
            match self.release(guild_id, member_id, Some(now)).await {
                Ok(Some(entry)) => released.push(entry),
                Ok(None) => {}
                Err(e) => error!(
                    target: BRIG_TARGET,
                    guild_id = %guild_id,
                    member_id = %member_id,
                    "Failed to release expired sentence: {e}"
                ),
            }
        }

        released
    }

    /// Spawn the sweep task and return the sender used to control it
    pub fn start_sweeper(&self, period: Duration) -> Sender<SweepRequest> {
        let (tx, rx) = mpsc::channel::<SweepRequest>(16);
        let service = self.clone();

        tokio::spawn(async move {
            service.sweep_task(rx, period).await;
        });

        tx
    }

    /// The sweep loop: sweeps on every tick and on request until shut down
    async fn sweep_task(&self, mut rx: Receiver<SweepRequest>, period: Duration) {
        info!("Starting brig sweep task with {period:?} interval");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                request = rx.recv() => match request {
                    Some(SweepRequest::SweepNow) => {
                        debug!("Received request: {}", SweepRequest::SweepNow);
                        self.sweep().await;
                    }
                    Some(SweepRequest::Shutdown) | None => {
                        info!("Received shutdown request for brig sweep task");
                        break;
                    }
                },

                _ = interval.tick() => {
                    let released = self.sweep().await;
                    if !released.is_empty() {
                        info!("Sweep released {} member(s)", released.len());
                    }
                }
            }
        }

        info!("Brig sweep task shut down");
    }

    /// Tell the guild its brig role is missing; `once` skips guilds already told
    async fn notify_role_missing(&self, guild_id: GuildId, command: &str, once: bool) {
        let first = self.role_missing_noticed.insert(guild_id);
        if once && !first {
            return;
        }
        self.notify(guild_id, self.role_missing_message(command)).await;
    }

    async fn notify(&self, guild_id: GuildId, message: String) {
        if let Err(e) = self.gateway.notify(guild_id, message).await {
            warn!(
                target: BRIG_TARGET,
                guild_id = %guild_id,
                "Failed to send brig notification: {e}"
            );
        }
    }

    /// Message announcing a new sentence
    #[must_use]
    pub fn added_message(&self, entry: &BrigEntry) -> String {
        let duration = match entry.length_minutes() {
            Some(minutes) => format!("for {minutes} minutes"),
            None => "indefinitely".to_string(),
        };
        render(
            &self.phrases.brig_add,
            &[
                ("member", &entry.member_id.mention().to_string()),
                ("duration", &duration),
            ],
        )
    }

    /// Message explaining that the brig role is missing
    #[must_use]
    pub fn role_missing_message(&self, command: &str) -> String {
        render(
            &self.phrases.no_role,
            &[
                ("role", &format!("\"{}\"", self.role_name)),
                ("command", &format!("`{command}`")),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brig::gateway::MockBrigGateway;
    use mockall::predicate::eq;
    use tokio::sync::Notify;

    const GUILD: GuildId = GuildId::new(1);
    const MEMBER: UserId = UserId::new(42);

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    fn service(gateway: MockBrigGateway) -> BrigService {
        BrigService::new(
            BrigStore::in_memory(),
            Arc::new(gateway),
            "THE BRIG",
            Phrases::default(),
        )
    }

    fn role_missing(guild_id: GuildId) -> BrigError {
        BrigError::RoleMissing {
            role: "THE BRIG".to_string(),
            guild_id: guild_id.get(),
        }
    }

    #[tokio::test]
    async fn test_add_indefinite_survives_sweep() {
        let mut gateway = MockBrigGateway::new();
        gateway.expect_assign_role().times(1).returning(|_, _| Ok(()));
        gateway
            .expect_notify()
            .withf(|_, message| message == "<@42> has been put in the brig indefinitely.")
            .times(1)
            .returning(|_, _| Ok(()));
        gateway.expect_revoke_role().never();
        let service = service(gateway);

        let entry = service.add_at(GUILD, MEMBER, None, at(1000)).await.unwrap();
        assert!(entry.is_indefinite());

        assert!(service.sweep_at(at(i64::from(u32::MAX))).await.is_empty());
        assert_eq!(service.list(GUILD), vec![entry]);
    }

    #[tokio::test]
    async fn test_timed_sentence_released_by_sweep() {
        let mut gateway = MockBrigGateway::new();
        gateway
            .expect_assign_role()
            .with(eq(GUILD), eq(MEMBER))
            .times(1)
            .returning(|_, _| Ok(()));
        gateway
            .expect_revoke_role()
            .with(eq(GUILD), eq(MEMBER))
            .times(1)
            .returning(|_, _| Ok(()));
        gateway
            .expect_notify()
            .withf(|_, message| message == "<@42> has been put in the brig for 5 minutes.")
            .times(1)
            .returning(|_, _| Ok(()));
        gateway
            .expect_notify()
            .withf(|guild_id, message| {
                *guild_id == GUILD && message == "<@42> has been released from the brig."
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let service = service(gateway);

        let entry = service.add_at(GUILD, MEMBER, Some(5), at(1000)).await.unwrap();
        assert_eq!(entry.start, Some(at(1000)));
        assert_eq!(entry.end, Some(at(1300)));

        assert!(service.sweep_at(at(1299)).await.is_empty());
        assert_eq!(service.list(GUILD).len(), 1);

        let released = service.sweep_at(at(1301)).await;
        assert_eq!(released, vec![entry]);
        assert!(service.list(GUILD).is_empty());
    }

    #[tokio::test]
    async fn test_remove_absent_is_noop() {
        let mut gateway = MockBrigGateway::new();
        gateway.expect_revoke_role().never();
        gateway.expect_notify().never();
        let service = service(gateway);

        assert!(service.remove(GUILD, MEMBER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_twice_overwrites() {
        let mut gateway = MockBrigGateway::new();
        gateway.expect_assign_role().times(2).returning(|_, _| Ok(()));
        gateway.expect_notify().times(2).returning(|_, _| Ok(()));
        let service = service(gateway);

        service.add_at(GUILD, MEMBER, Some(5), at(1000)).await.unwrap();
        let second = service.add_at(GUILD, MEMBER, Some(10), at(2000)).await.unwrap();

        assert_eq!(service.list(GUILD), vec![second]);
        assert_eq!(service.list(GUILD)[0].end, Some(at(2600)));
    }

    #[tokio::test]
    async fn test_invalid_duration_changes_nothing() {
        let mut gateway = MockBrigGateway::new();
        gateway.expect_assign_role().never();
        gateway.expect_notify().never();
        let service = service(gateway);

        let result = service.add_at(GUILD, MEMBER, Some(0), at(1000)).await;
        assert!(matches!(result, Err(BrigError::InvalidDuration(0))));
        let result = service.add_at(GUILD, MEMBER, Some(-1), at(1000)).await;
        assert!(matches!(result, Err(BrigError::InvalidDuration(-1))));
        assert!(service.store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_role_aborts_add_and_notifies() {
        let mut gateway = MockBrigGateway::new();
        gateway
            .expect_assign_role()
            .returning(|guild_id, _| Err(role_missing(guild_id)));
        gateway
            .expect_notify()
            .withf(|_, message| message == "The role \"THE BRIG\" doesn't exist, so `brig` failed.")
            .times(1)
            .returning(|_, _| Ok(()));
        let service = service(gateway);

        let result = service.add_at(GUILD, MEMBER, Some(5), at(1000)).await;
        assert!(matches!(result, Err(BrigError::RoleMissing { .. })));
        assert!(service.store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_role_aborts_remove_and_keeps_entry() {
        let mut gateway = MockBrigGateway::new();
        gateway
            .expect_revoke_role()
            .returning(|guild_id, _| Err(role_missing(guild_id)));
        gateway
            .expect_notify()
            .withf(|_, message| message.contains("`unbrig`"))
            .times(1)
            .returning(|_, _| Ok(()));
        let service = service(gateway);
        service
            .store
            .upsert(BrigEntry::new(GUILD, MEMBER, at(1000), Some(5)).unwrap());

        let result = service.remove(GUILD, MEMBER).await;
        assert!(matches!(result, Err(BrigError::RoleMissing { .. })));
        assert!(service.store.get(GUILD, MEMBER).is_some());
    }

    #[tokio::test]
    async fn test_departed_member_is_released_quietly() {
        let mut gateway = MockBrigGateway::new();
        gateway.expect_revoke_role().returning(|guild_id, member_id| {
            Err(BrigError::MemberNotFound {
                guild_id: guild_id.get(),
                member_id: member_id.get(),
            })
        });
        gateway.expect_notify().never();
        let service = service(gateway);
        service
            .store
            .upsert(BrigEntry::new(GUILD, MEMBER, at(1000), Some(5)).unwrap());

        let released = service.sweep_at(at(2000)).await;
        assert_eq!(released.len(), 1);
        assert!(service.store.is_empty());
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_add() {
        let mut gateway = MockBrigGateway::new();
        gateway.expect_assign_role().returning(|_, _| Ok(()));
        gateway
            .expect_notify()
            .returning(|guild_id, _| Err(role_missing(guild_id)));
        let service = service(gateway);

        assert!(service.add_at(GUILD, MEMBER, Some(5), at(1000)).await.is_ok());
        assert_eq!(service.store.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_continues_after_failure() {
        let other = UserId::new(7);
        let mut gateway = MockBrigGateway::new();
        gateway
            .expect_revoke_role()
            .with(eq(GUILD), eq(MEMBER))
            .returning(|_, _| Err(BrigError::Io(std::io::Error::other("boom"))));
        gateway
            .expect_revoke_role()
            .with(eq(GUILD), eq(other))
            .returning(|_, _| Ok(()));
        gateway.expect_notify().returning(|_, _| Ok(()));
        let service = service(gateway);
        service
            .store
            .upsert(BrigEntry::new(GUILD, MEMBER, at(1000), Some(5)).unwrap());
        service
            .store
            .upsert(BrigEntry::new(GUILD, other, at(1000), Some(5)).unwrap());

        let released = service.sweep_at(at(2000)).await;
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].member_id, other);
        assert!(service.store.get(GUILD, MEMBER).is_some());
    }

    /// Gateway whose revoke waits until the test lets it through
    #[derive(Default)]
    struct ParkedRevoke {
        entered: Notify,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl BrigGateway for ParkedRevoke {
        async fn assign_role(&self, _: GuildId, _: UserId) -> BrigResult<()> {
            Ok(())
        }

        async fn revoke_role(&self, _: GuildId, _: UserId) -> BrigResult<()> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }

        async fn notify(&self, _: GuildId, _: String) -> BrigResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_rebrig_during_sweep_release_keeps_new_sentence() {
        let gateway = Arc::new(ParkedRevoke::default());
        let service = BrigService::new(
            BrigStore::in_memory(),
            gateway.clone(),
            "THE BRIG",
            Phrases::default(),
        );
        service
            .store
            .upsert(BrigEntry::new(GUILD, MEMBER, at(1000), Some(5)).unwrap());

        let sweeper = service.clone();
        let sweep = tokio::spawn(async move { sweeper.sweep_at(at(1301)).await });
        gateway.entered.notified().await;

        let admin = service.clone();
        let rebrig =
            tokio::spawn(async move { admin.add_at(GUILD, MEMBER, Some(60), at(1301)).await });
        tokio::task::yield_now().await;
        gateway.release.notify_one();

        assert_eq!(sweep.await.unwrap().len(), 1);
        let renewed = rebrig.await.unwrap().unwrap();
        assert_eq!(renewed.end, Some(at(1301 + 3600)));
        assert_eq!(service.store.get(GUILD, MEMBER), Some(renewed));
    }

    #[tokio::test]
    async fn test_sweep_skips_sentence_renewed_after_scan() {
        let mut gateway = MockBrigGateway::new();
        gateway.expect_revoke_role().never();
        gateway.expect_notify().never();
        let service = service(gateway);
        let renewed = BrigEntry::new(GUILD, MEMBER, at(1300), Some(60)).unwrap();
        service.store.upsert(renewed.clone());

        let released = service.release(GUILD, MEMBER, Some(at(1301))).await.unwrap();
        assert!(released.is_none());
        assert_eq!(service.store.get(GUILD, MEMBER), Some(renewed));
    }

    #[tokio::test]
    async fn test_sweep_reports_missing_role_once() {
        let mut gateway = MockBrigGateway::new();
        gateway
            .expect_revoke_role()
            .times(3)
            .returning(|guild_id, _| Err(role_missing(guild_id)));
        gateway
            .expect_notify()
            .withf(|_, message| message.contains("`unbrig`"))
            .times(1)
            .returning(|_, _| Ok(()));
        let service = service(gateway);
        service
            .store
            .upsert(BrigEntry::new(GUILD, MEMBER, at(1000), Some(5)).unwrap());

        for now in [2000, 2001, 2002] {
            assert!(service.sweep_at(at(now)).await.is_empty());
        }
        assert!(service.store.get(GUILD, MEMBER).is_some());
    }

    #[tokio::test]
    async fn test_missing_role_notice_rearms_after_role_works() {
        let mut gateway = MockBrigGateway::new();
        gateway
            .expect_revoke_role()
            .times(3)
            .returning(|guild_id, _| Err(role_missing(guild_id)));
        gateway.expect_assign_role().times(1).returning(|_, _| Ok(()));
        gateway
            .expect_notify()
            .withf(|_, message| message.contains("`unbrig`"))
            .times(2)
            .returning(|_, _| Ok(()));
        gateway
            .expect_notify()
            .withf(|_, message| message.contains("put in the brig"))
            .times(1)
            .returning(|_, _| Ok(()));
        let service = service(gateway);
        service
            .store
            .upsert(BrigEntry::new(GUILD, MEMBER, at(1000), Some(5)).unwrap());

        service.sweep_at(at(2000)).await;
        service.sweep_at(at(2001)).await;
        service.add_at(GUILD, MEMBER, Some(1), at(2001)).await.unwrap();
        service.sweep_at(at(2100)).await;

        assert!(service.store.get(GUILD, MEMBER).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_releases_and_shuts_down() {
        let mut gateway = MockBrigGateway::new();
        gateway.expect_revoke_role().times(1).returning(|_, _| Ok(()));
        gateway.expect_notify().returning(|_, _| Ok(()));
        let service = service(gateway);
        let expired_at = Utc::now() - chrono::Duration::minutes(10);
        service
            .store
            .upsert(BrigEntry::new(GUILD, MEMBER, expired_at, Some(1)).unwrap());

        let tx = service.start_sweeper(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(service.store.is_empty());

        tx.send(SweepRequest::Shutdown).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(tx.is_closed());
    }

    #[test]
    fn test_sweep_request_display() {
        assert_eq!(SweepRequest::SweepNow.to_string(), "sweep now");
        assert_eq!(SweepRequest::Shutdown.to_string(), "shutdown");
    }
}
