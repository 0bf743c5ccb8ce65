//! Recommendation orchestration
//!
//! A request moves `Idle → AwaitingModelResponse → {ParsedOk | ParseFailed}`,
//! or straight to `NoCandidates` when the selector finds nothing. The model is
//! never called for an empty candidate set.

use std::sync::Arc;

use grantscout_shared::{Grant, GrantScoutError, Organization};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::candidates::{CandidateSelector, Urgency};
use super::chat::{ChatError, ChatMessage, ChatModel};
use super::parser::{self, GrantRecommendation, ParseError};
use super::prompt;

const SYSTEM_PROMPT: &str =
    "You are an expert grant advisor. You answer only with the JSON format requested.";

/// How a recommendation request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    /// Model reply parsed; list may still be empty if every id was unknown
    Ranked,
    /// No grants matched the urgency window
    NoCandidates,
    /// Model reply could not be parsed
    ParseFailed,
    /// Model call failed
    ModelUnavailable,
    /// No chat provider configured
    NotConfigured,
}

/// Recommendations plus how they were produced
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationOutcome {
    pub status: RecommendationStatus,
    pub recommendations: Vec<GrantRecommendation>,
}

impl RecommendationOutcome {
    fn empty(status: RecommendationStatus) -> Self {
        Self {
            status,
            recommendations: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("No organization profile for user {0}")]
    OrganizationNotFound(Uuid),
    #[error("Grant store error: {0}")]
    Store(#[from] GrantScoutError),
    #[error("Chat provider not configured")]
    NotConfigured,
    #[error("Chat provider error: {0}")]
    Model(#[from] ChatError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl From<sqlx::Error> for MatchError {
    fn from(err: sqlx::Error) -> Self {
        MatchError::Store(GrantScoutError::Database(err))
    }
}

/// Ranks candidate grants for an organization using a chat model
#[derive(Clone)]
pub struct GrantMatcher {
    pool: PgPool,
    selector: CandidateSelector,
    model: Option<Arc<dyn ChatModel>>,
}

impl GrantMatcher {
    pub fn new(pool: PgPool, model: Option<Arc<dyn ChatModel>>) -> Self {
        let selector = CandidateSelector::new(pool.clone());
        Self {
            pool,
            selector,
            model,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    /// Load the organization profile attached to a user
    pub async fn load_organization(&self, user_id: Uuid) -> Result<Organization, MatchError> {
        sqlx::query_as::<_, Organization>(
            r#"
            SELECT id, user_id, name, mission, focus_areas, budget_bracket,
                   staff_size, service_area, fiscal_year
            FROM organizations
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(MatchError::OrganizationNotFound(user_id))
    }

    /// Produce recommendations, propagating every failure
    pub async fn recommend(
        &self,
        user_id: Uuid,
        urgency: Urgency,
        context: Option<&str>,
    ) -> Result<RecommendationOutcome, MatchError> {
        let organization = self.load_organization(user_id).await?;
        let candidates = self.selector.select_candidates(urgency).await?;

        tracing::info!(
            user_id = %user_id,
            urgency = ?urgency,
            candidates = candidates.len(),
            "Generating grant recommendations"
        );

        self.rank(&organization, &candidates, context).await
    }

    /// Rank a known candidate set
    pub async fn rank(
        &self,
        organization: &Organization,
        candidates: &[Grant],
        context: Option<&str>,
    ) -> Result<RecommendationOutcome, MatchError> {
        if candidates.is_empty() {
            return Ok(RecommendationOutcome::empty(RecommendationStatus::NoCandidates));
        }

        let model = self.model.as_ref().ok_or(MatchError::NotConfigured)?;

        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(prompt::compose(organization, candidates, context)),
        ];
        let reply = model.complete(&messages).await?;
        let recommendations = parser::parse(&reply, candidates)?;

        Ok(RecommendationOutcome {
            status: RecommendationStatus::Ranked,
            recommendations,
        })
    }

    /// Produce recommendations for a chat turn.
    ///
    /// Model, parse and configuration failures become an empty list with the
    /// cause recorded in `status`. A missing organization or a store failure
    /// is still returned as an error.
    pub async fn recommend_for_chat(
        &self,
        user_id: Uuid,
        urgency: Urgency,
        context: Option<&str>,
    ) -> Result<RecommendationOutcome, MatchError> {
        match self.recommend(user_id, urgency, context).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => degrade(user_id, e),
        }
    }
}

fn degrade(user_id: Uuid, err: MatchError) -> Result<RecommendationOutcome, MatchError> {
    let status = match &err {
        MatchError::OrganizationNotFound(_) | MatchError::Store(_) => return Err(err),
        MatchError::NotConfigured => RecommendationStatus::NotConfigured,
        MatchError::Model(_) => RecommendationStatus::ModelUnavailable,
        MatchError::Parse(_) => RecommendationStatus::ParseFailed,
    };

    tracing::warn!(
        user_id = %user_id,
        status = ?status,
        error = %err,
        "Continuing without recommendations"
    );

    Ok(RecommendationOutcome::empty(status))
}
