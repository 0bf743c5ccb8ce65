//! Model reply parsing and reconciliation against the candidate set

use std::collections::{HashMap, HashSet};

use grantscout_shared::Grant;
use serde::Serialize;
use serde_json::Value;

/// Most recommendations kept from one reply
pub const MAX_RECOMMENDATIONS: usize = 5;

const NO_REASONING: &str = "No reasoning provided";

/// One ranked grant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRecommendation {
    pub grant_id: String,
    /// Always within 0..=100
    pub match_score: f64,
    pub reasoning: String,
    pub grant: Grant,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Model reply is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Model reply has no recommendations array")]
    MissingRecommendations,
}

/// Remove a surrounding ``` or ```json fence
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

fn score_of(entry: &Value) -> f64 {
    entry
        .get("matchScore")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 100.0)
}

/// Parse a model reply into ranked recommendations.
///
/// Only the first five entries are considered. Entries naming a grant outside
/// `candidates` are dropped, as are repeats of a grant already listed. The result is sorted by score, highest first,
/// keeping the model's order for ties.
pub fn parse(raw: &str, candidates: &[Grant]) -> Result<Vec<GrantRecommendation>, ParseError> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))?;

    let entries = value
        .get("recommendations")
        .and_then(Value::as_array)
        .ok_or(ParseError::MissingRecommendations)?;

    let by_id: HashMap<&str, &Grant> = candidates.iter().map(|g| (g.id.as_str(), g)).collect();
    let mut seen: HashSet<&str> = HashSet::new();

    let mut recommendations: Vec<GrantRecommendation> = entries
        .iter()
        .take(MAX_RECOMMENDATIONS)
        .filter_map(|entry| {
            let grant_id = entry.get("grantId").and_then(Value::as_str)?;
            let Some(grant) = by_id.get(grant_id) else {
                tracing::debug!(grant_id, "Dropping recommendation for unknown grant");
                return None;
            };
            if !seen.insert(grant_id) {
                tracing::debug!(grant_id, "Dropping repeated recommendation");
                return None;
            }

            Some(GrantRecommendation {
                grant_id: grant_id.to_string(),
                match_score: score_of(entry),
                reasoning: entry
                    .get("reasoning")
                    .and_then(Value::as_str)
                    .unwrap_or(NO_REASONING)
                    .to_string(),
                grant: (*grant).clone(),
            })
        })
        .collect();

    // sort_by is stable
    recommendations.sort_by(|a, b| b.match_score.total_cmp(&a.match_score));

    Ok(recommendations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<Grant> {
        ["g-1", "g-2", "g-3", "g-4", "g-5", "g-6"]
            .iter()
            .map(|id| Grant {
                id: id.to_string(),
                title: format!("Grant {}", id),
                agency: None,
                synopsis: None,
                eligibility: None,
                close_date: None,
                tags: vec![],
            })
            .collect()
    }

    fn ids(recs: &[GrantRecommendation]) -> Vec<&str> {
        recs.iter().map(|r| r.grant_id.as_str()).collect()
    }

    #[test]
    fn test_scores_are_clamped() {
        let raw = r#"{"recommendations":[
            {"grantId":"g-1","matchScore":150,"reasoning":"great"},
            {"grantId":"g-2","matchScore":-5,"reasoning":"poor"}
        ]}"#;

        let recs = parse(raw, &candidates()).unwrap();
        assert_eq!(recs[0].match_score, 100.0);
        assert_eq!(recs[1].match_score, 0.0);
    }

    #[test]
    fn test_unknown_grant_dropped() {
        let raw = r#"{"recommendations":[
            {"grantId":"g-404","matchScore":99,"reasoning":"made up"},
            {"grantId":"g-2","matchScore":70,"reasoning":"real"}
        ]}"#;

        let recs = parse(raw, &candidates()).unwrap();
        assert_eq!(ids(&recs), vec!["g-2"]);
    }

    #[test]
    fn test_fenced_reply_matches_unfenced() {
        let body = r#"{"recommendations":[{"grantId":"g-3","matchScore":80,"reasoning":"fit"}]}"#;
        let fenced = format!("```json\n{}\n```", body);
        let bare_fence = format!("```\n{}\n```", body);

        let plain = parse(body, &candidates()).unwrap();
        assert_eq!(parse(&fenced, &candidates()).unwrap(), plain);
        assert_eq!(parse(&bare_fence, &candidates()).unwrap(), plain);
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let raw = r#"{"recommendations":[
            {"grantId":"g-1"},
            {"grantId":"g-2","matchScore":"high","reasoning":42}
        ]}"#;

        let recs = parse(raw, &candidates()).unwrap();
        assert_eq!(recs.len(), 2);
        for rec in &recs {
            assert_eq!(rec.match_score, 0.0);
            assert_eq!(rec.reasoning, "No reasoning provided");
        }
    }

    #[test]
    fn test_only_first_five_entries_considered() {
        let raw = r#"{"recommendations":[
            {"grantId":"g-1","matchScore":10},
            {"grantId":"g-2","matchScore":20},
            {"grantId":"g-3","matchScore":30},
            {"grantId":"g-4","matchScore":40},
            {"grantId":"g-5","matchScore":50},
            {"grantId":"g-6","matchScore":100}
        ]}"#;

        let recs = parse(raw, &candidates()).unwrap();
        assert_eq!(ids(&recs), vec!["g-5", "g-4", "g-3", "g-2", "g-1"]);
    }

    #[test]
    fn test_ties_keep_model_order() {
        let raw = r#"{"recommendations":[
            {"grantId":"g-3","matchScore":60},
            {"grantId":"g-1","matchScore":90},
            {"grantId":"g-2","matchScore":60}
        ]}"#;

        let recs = parse(raw, &candidates()).unwrap();
        assert_eq!(ids(&recs), vec!["g-1", "g-3", "g-2"]);
    }

    #[test]
    fn test_repeated_grant_kept_once() {
        let raw = r#"{"recommendations":[
            {"grantId":"g-2","matchScore":55,"reasoning":"first"},
            {"grantId":"g-1","matchScore":70},
            {"grantId":"g-2","matchScore":95,"reasoning":"again"}
        ]}"#;

        let recs = parse(raw, &candidates()).unwrap();
        assert_eq!(ids(&recs), vec!["g-1", "g-2"]);
        assert_eq!(recs[1].match_score, 55.0);
        assert_eq!(recs[1].reasoning, "first");
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let err = parse("Here are my picks: g-1, g-2", &candidates()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    #[test]
    fn test_missing_recommendations_key() {
        let err = parse(r#"{"grants":[]}"#, &candidates()).unwrap_err();
        assert!(matches!(err, ParseError::MissingRecommendations));

        let err = parse(r#"{"recommendations":"none"}"#, &candidates()).unwrap_err();
        assert!(matches!(err, ParseError::MissingRecommendations));
    }

    #[test]
    fn test_empty_recommendations_is_ok() {
        let recs = parse(r#"{"recommendations":[]}"#, &candidates()).unwrap();
        assert!(recs.is_empty());
    }
}
