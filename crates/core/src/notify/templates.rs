use std::collections::BTreeMap;

use serde_json::Value;
use tera::{Context, Tera};

use super::{NotificationError, TemplateId};

const APPROVAL_REQUESTED_SUBJECT: &str = "Trip approval requested: {{ trip_name }}";
const APPROVAL_REQUESTED_BODY: &str = "Dear {{ recipient_name }},

{{ traveler_name }} has requested {{ level_label }} approval for the trip \"{{ trip_name }}\" ({{ start_date }} to {{ end_date }}).

Review the request at {{ portal_base_url }}/trips/{{ trip_id }}/approvals
";

const APPROVAL_ESCALATED_SUBJECT: &str = "Trip approval escalated to {{ level_label }}: {{ trip_name }}";
const APPROVAL_ESCALATED_BODY: &str = "Dear {{ recipient_name }},

The trip \"{{ trip_name }}\" for {{ traveler_name }} was approved at the previous level and now needs your {{ level_label }} approval.

Review the request at {{ portal_base_url }}/trips/{{ trip_id }}/approvals
";

const TRIP_APPROVED_SUBJECT: &str = "Trip approved at {{ level_label }}: {{ trip_name }}";
const TRIP_APPROVED_BODY: &str = "Dear {{ recipient_name }},

{{ approver_name }} approved the trip \"{{ trip_name }}\" at {{ level_label }}.
{% if comment %}
Comment: {{ comment }}
{% endif %}{% if approval_complete %}
All required approvals are now in place.
{% else %}
The trip has moved on to the next approval level.
{% endif %}
Details: {{ portal_base_url }}/trips/{{ trip_id }}
";

const TRIP_DECLINED_SUBJECT: &str = "Trip declined at {{ level_label }}: {{ trip_name }}";
const TRIP_DECLINED_BODY: &str = "Dear {{ recipient_name }},

{{ approver_name }} declined the trip \"{{ trip_name }}\" at {{ level_label }}.
{% if comment %}
Comment: {{ comment }}
{% endif %}
Update the trip and request approval again at {{ portal_base_url }}/trips/{{ trip_id }}
";

const APPROVAL_UNASSIGNED_SUBJECT: &str = "No approver available for {{ trip_name }}";
const APPROVAL_UNASSIGNED_BODY: &str = "Dear {{ recipient_name }},

The trip \"{{ trip_name }}\" needs {{ level_label }} approval but no approver could be assigned: {{ reason }}.

Contact your administrator, then request approval again at {{ portal_base_url }}/trips/{{ trip_id }}
";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub subject: String,
    pub body: String,
}

/// Email templates compiled once at startup.
pub struct TemplateCatalog {
    tera: Tera,
    subject_prefix: String,
    portal_base_url: String,
}

impl TemplateCatalog {
    pub fn new(
        subject_prefix: impl Into<String>,
        portal_base_url: impl Into<String>,
    ) -> Result<Self, NotificationError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (subject_name(TemplateId::ApprovalRequested), APPROVAL_REQUESTED_SUBJECT),
            (body_name(TemplateId::ApprovalRequested), APPROVAL_REQUESTED_BODY),
            (subject_name(TemplateId::ApprovalEscalated), APPROVAL_ESCALATED_SUBJECT),
            (body_name(TemplateId::ApprovalEscalated), APPROVAL_ESCALATED_BODY),
            (subject_name(TemplateId::TripApproved), TRIP_APPROVED_SUBJECT),
            (body_name(TemplateId::TripApproved), TRIP_APPROVED_BODY),
            (subject_name(TemplateId::TripDeclined), TRIP_DECLINED_SUBJECT),
            (body_name(TemplateId::TripDeclined), TRIP_DECLINED_BODY),
            (subject_name(TemplateId::ApprovalUnassigned), APPROVAL_UNASSIGNED_SUBJECT),
            (body_name(TemplateId::ApprovalUnassigned), APPROVAL_UNASSIGNED_BODY),
        ])
        .map_err(|error| NotificationError::Template {
            template: TemplateId::ApprovalRequested,
            message: error.to_string(),
        })?;

        Ok(Self {
            tera,
            subject_prefix: subject_prefix.into(),
            portal_base_url: portal_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn render(
        &self,
        template: TemplateId,
        values: &BTreeMap<String, Value>,
        recipient_name: &str,
    ) -> Result<RenderedTemplate, NotificationError> {
        let mut context = Context::new();
        for (key, value) in values {
            context.insert(key.as_str(), value);
        }
        context.insert("recipient_name", recipient_name);
        context.insert("portal_base_url", &self.portal_base_url);

        let render_error = |error: tera::Error| NotificationError::Template {
            template,
            message: error.to_string(),
        };
        let subject = self.tera.render(&subject_name(template), &context).map_err(render_error)?;
        let body = self.tera.render(&body_name(template), &context).map_err(render_error)?;

        let subject = if self.subject_prefix.is_empty() {
            subject.trim().to_string()
        } else {
            format!("{} {}", self.subject_prefix, subject.trim())
        };
        Ok(RenderedTemplate { subject, body })
    }
}

fn subject_name(template: TemplateId) -> String {
    format!("{}.subject", template.as_str())
}

fn body_name(template: TemplateId) -> String {
    format!("{}.body", template.as_str())
}
