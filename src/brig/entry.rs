//! Brig entries
//!
//! A brig entry records that a member of a guild holds the brig role, and
//! until when. Entries without an end time are indefinite and only leave the
//! brig through `unbrig`.

use crate::brig::{BrigError, BrigResult};
use chrono::{DateTime, Duration, FixedOffset, SubsecRound, Utc};
use poise::serenity_prelude::{GuildId, UserId};

/// Format used when showing sentence windows to moderators
pub const WINDOW_FORMAT: &str = "%d/%m/%Y, %I:%M %p";

/// Label shown for sentences without an end time
pub const INDEFINITE_LABEL: &str = "Indefinite";

/// A member's stay in the brig
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrigEntry {
    /// Guild the member was brigged in
    pub guild_id: GuildId,
    /// The brigged member
    pub member_id: UserId,
    /// When the sentence started
    pub start: Option<DateTime<Utc>>,
    /// When the sentence ends, `None` for indefinite sentences
    pub end: Option<DateTime<Utc>>,
}

impl BrigEntry {
    /// Create an entry starting at `now` and lasting `duration_minutes`
    ///
    /// # Errors
    /// Returns `BrigError::InvalidDuration` if the duration is not positive or
    /// the end time cannot be represented.
    pub fn new(
        guild_id: GuildId,
        member_id: UserId,
        now: DateTime<Utc>,
        duration_minutes: Option<i64>,
    ) -> BrigResult<Self> {
        let start = now.trunc_subsecs(0);
        let end = match duration_minutes {
            None => None,
            Some(minutes) if minutes <= 0 => return Err(BrigError::InvalidDuration(minutes)),
            Some(minutes) => Some(
                Duration::try_minutes(minutes)
                    .and_then(|duration| start.checked_add_signed(duration))
                    .ok_or(BrigError::InvalidDuration(minutes))?,
            ),
        };

        Ok(Self {
            guild_id,
            member_id,
            start: Some(start),
            end,
        })
    }

    /// Whether the sentence has no end time
    #[must_use]
    pub fn is_indefinite(&self) -> bool {
        self.end.is_none()
    }

    /// Whether the sentence is over at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.end.is_some_and(|end| end <= now)
    }

    /// Sentence length rounded to whole minutes
    #[must_use]
    pub fn length_minutes(&self) -> Option<i64> {
        let (start, end) = self.start.zip(self.end)?;
        let seconds = (end - start).num_seconds();
        Some((seconds + 30).div_euclid(60))
    }

    /// Human readable sentence window in the given display offset
    #[must_use]
    pub fn window_label(&self, offset: &FixedOffset) -> String {
        let render = |time: DateTime<Utc>| time.with_timezone(offset).format(WINDOW_FORMAT);
        match (self.start, self.end) {
            (Some(start), Some(end)) => format!(
                "{} — {} ({} minutes)",
                render(start),
                render(end),
                self.length_minutes().unwrap_or_default()
            ),
            (None, Some(end)) => format!("Until {}", render(end)),
            (_, None) => INDEFINITE_LABEL.to_string(),
        }
    }
}
