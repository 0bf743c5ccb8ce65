//! Candidate grant selection by deadline urgency

use grantscout_shared::{Grant, GrantScoutError};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::{Date, Duration, OffsetDateTime};

/// Upper bound on grants handed to the model per request
pub const MAX_CANDIDATES: i64 = 200;

/// How soon the caller needs funding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Urgency {
    /// Closing within 30 days
    Immediate,
    /// Closing within 90 days
    Planning,
    /// Anything still open, including grants with no deadline
    #[default]
    LongTerm,
}

impl Urgency {
    /// Close-date window for this urgency, relative to `today`
    pub fn window(self, today: Date) -> DateWindow {
        match self {
            Urgency::Immediate => DateWindow {
                from: today,
                until: Some(today + Duration::days(30)),
                include_undated: false,
            },
            Urgency::Planning => DateWindow {
                from: today,
                until: Some(today + Duration::days(90)),
                include_undated: false,
            },
            Urgency::LongTerm => DateWindow {
                from: today,
                until: None,
                include_undated: true,
            },
        }
    }
}

/// Inclusive close-date range used to filter grants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: Date,
    pub until: Option<Date>,
    pub include_undated: bool,
}

impl DateWindow {
    /// Same predicate as the SQL filter in [`CandidateSelector::select_candidates_on`]
    pub fn admits(&self, close_date: Option<Date>) -> bool {
        match close_date {
            None => self.include_undated,
            Some(date) => date >= self.from && self.until.map_or(true, |until| date <= until),
        }
    }
}

/// Loads the bounded candidate set for a recommendation request
#[derive(Clone)]
pub struct CandidateSelector {
    pool: PgPool,
}

impl CandidateSelector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Select candidates relative to the current UTC date
    pub async fn select_candidates(&self, urgency: Urgency) -> Result<Vec<Grant>, GrantScoutError> {
        self.select_candidates_on(urgency, OffsetDateTime::now_utc().date())
            .await
    }

    /// Select candidates relative to a fixed date.
    ///
    /// Soonest-closing first; grants without a deadline come last. An empty
    /// result is not an error.
    pub async fn select_candidates_on(
        &self,
        urgency: Urgency,
        today: Date,
    ) -> Result<Vec<Grant>, GrantScoutError> {
        let window = urgency.window(today);

        let grants = sqlx::query_as::<_, Grant>(
            r#"
            SELECT id, title, agency, synopsis, eligibility, close_date, tags
            FROM grants
            WHERE (close_date >= $1 AND ($2::date IS NULL OR close_date <= $2))
               OR ($3 AND close_date IS NULL)
            ORDER BY close_date ASC NULLS LAST, id ASC
            LIMIT $4
            "#,
        )
        .bind(window.from)
        .bind(window.until)
        .bind(window.include_undated)
        .bind(MAX_CANDIDATES)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(
            urgency = ?urgency,
            candidates = grants.len(),
            "Selected candidate grants"
        );

        Ok(grants)
    }
}
