//! Prompt text for grant ranking

use grantscout_shared::{Grant, Organization};
use serde::Serialize;

/// Grant as presented to the model
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptGrant<'a> {
    id: &'a str,
    title: &'a str,
    agency: &'a str,
    close_date: String,
    synopsis: &'a str,
    eligibility: &'a str,
    tags: String,
}

impl<'a> From<&'a Grant> for PromptGrant<'a> {
    fn from(grant: &'a Grant) -> Self {
        Self {
            id: &grant.id,
            title: &grant.title,
            agency: present(grant.agency.as_deref()).unwrap_or("Unknown"),
            close_date: grant
                .close_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "No deadline".to_string()),
            synopsis: present(grant.synopsis.as_deref()).unwrap_or("No description available"),
            eligibility: present(grant.eligibility.as_deref()).unwrap_or("Not specified"),
            tags: if grant.tags.is_empty() {
                "No tags".to_string()
            } else {
                grant.tags.join(", ")
            },
        }
    }
}

const INSTRUCTIONS: &str = r#"Select exactly the top 5 grants that best match this organization.
Respond with ONLY a JSON object of this exact shape:
{"recommendations":[{"grantId":"<id from the list>","matchScore":<integer 0-100>,"reasoning":"<one or two sentences>"}]}
Do not include any prose before or after the JSON. Do not wrap it in markdown code fences."#;

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Build the ranking prompt.
///
/// Output depends only on the arguments: organization lines in a fixed order
/// (empty fields omitted), optional context, the candidate list as JSON, then
/// the response-format instructions.
pub fn compose(organization: &Organization, grants: &[Grant], context: Option<&str>) -> String {
    let focus_areas = organization
        .focus_areas
        .iter()
        .map(|area| area.trim())
        .filter(|area| !area.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    let fields = [
        ("Organization Name", present(organization.name.as_deref())),
        ("Mission", present(organization.mission.as_deref())),
        ("Focus Areas", present(Some(focus_areas.as_str()))),
        ("Budget", present(organization.budget_bracket.as_deref())),
        ("Staff Size", present(organization.staff_size.as_deref())),
        ("Service Area", present(organization.service_area.as_deref())),
        ("Fiscal Year", present(organization.fiscal_year.as_deref())),
    ];

    let mut prompt = String::from(
        "You are a grant advisor for nonprofit organizations. Rank the available grants for the organization below.\n\nOrganization Profile:\n",
    );
    for (label, value) in fields {
        if let Some(value) = value {
            prompt.push_str(label);
            prompt.push_str(": ");
            prompt.push_str(value);
            prompt.push('\n');
        }
    }

    if let Some(context) = present(context) {
        prompt.push_str("\nAdditional Context:\n");
        prompt.push_str(context);
        prompt.push('\n');
    }

    let listed: Vec<PromptGrant<'_>> = grants.iter().map(PromptGrant::from).collect();
    // Serializing plain strings into a Vec cannot fail
    let grants_json = serde_json::to_string_pretty(&listed).unwrap_or_else(|_| "[]".to_string());

    prompt.push_str("\nAvailable Grants:\n");
    prompt.push_str(&grants_json);
    prompt.push_str("\n\n");
    prompt.push_str(INSTRUCTIONS);

    prompt
}
