use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;
use utoipa::ToSchema;

struct StepTemplate {
    id: &'static str,
    label: &'static str,
    description: &'static str,
    href: &'static str,
}

const NEW_USER_STEPS: [StepTemplate; 3] = [
    StepTemplate {
        id: "verify_email",
        label: "Verify your email",
        description: "Check your inbox and click the verification link.",
        href: "/account",
    },
    StepTemplate {
        id: "complete_profile",
        label: "Complete your profile",
        description: "Add your display name and bio.",
        href: "/account",
    },
    StepTemplate {
        id: "explore_events",
        label: "Browse upcoming events",
        description: "Discover workshops and training sessions.",
        href: "/events",
    },
];

const CLIENT_STEPS: [StepTemplate; 2] = [
    StepTemplate {
        id: "submit_intake",
        label: "Submit a client intake form",
        description: "Tell us about your team and goals.",
        href: "/services/request",
    },
    StepTemplate {
        id: "sign_agreement",
        label: "Sign the engagement agreement",
        description: "Review and sign the service agreement.",
        href: "/dashboard",
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingStep {
    pub id: String,
    pub label: String,
    pub description: String,
    pub href: String,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    #[ts(optional)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingProgress {
    pub complete: bool,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub steps: Vec<OnboardingStep>,
}

/// Client steps are shown once the member has started the client track.
pub fn includes_client_steps(completions: &BTreeMap<String, DateTime<Utc>>) -> bool {
    CLIENT_STEPS
        .iter()
        .any(|step| completions.contains_key(step.id))
}

/// build_onboarding_progress
///
/// Projects the completed step ids onto the step templates for the user's track.
pub fn build_onboarding_progress(
    completions: &BTreeMap<String, DateTime<Utc>>,
    include_client_steps: bool,
) -> OnboardingProgress {
    let client: &[StepTemplate] = if include_client_steps { &CLIENT_STEPS } else { &[] };

    let steps: Vec<OnboardingStep> = NEW_USER_STEPS
        .iter()
        .chain(client)
        .map(|template| {
            let completed_at = completions.get(template.id).copied();
            OnboardingStep {
                id: template.id.to_string(),
                label: template.label.to_string(),
                description: template.description.to_string(),
                href: template.href.to_string(),
                completed: completed_at.is_some(),
                completed_at,
            }
        })
        .collect();

    let completed_steps = steps.iter().filter(|s| s.completed).count();
    OnboardingProgress {
        complete: completed_steps == steps.len(),
        completed_steps,
        total_steps: steps.len(),
        steps,
    }
}
