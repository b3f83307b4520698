//! Tools shipped with the binary.

use super::CanonicalTool;

pub(super) fn tools() -> Vec<CanonicalTool> {
    vec![
        // Communication
        CanonicalTool::new("Slack", "Communication", Some(12.50), &["slack technologies"]),
        CanonicalTool::new(
            "Microsoft Teams",
            "Communication",
            Some(5.00),
            &["teams", "ms teams", "msteams"],
        ),
        CanonicalTool::new("Zoom", "Communication", Some(15.00), &["zoom video", "zoom meetings"]),
        CanonicalTool::new("Discord", "Communication", None, &[]),
        CanonicalTool::new("Google Meet", "Communication", None, &["meet", "hangouts meet"]),
        // Project management
        CanonicalTool::new("Jira", "Project Management", Some(8.15), &["jira software", "atlassian jira"]),
        CanonicalTool::new("Asana", "Project Management", Some(13.49), &[]),
        CanonicalTool::new("Monday", "Project Management", Some(12.00), &["monday.com", "monday work management"]),
        CanonicalTool::new("Trello", "Project Management", None, &[]),
        CanonicalTool::new("Linear", "Project Management", None, &["linear.app"]),
        // CRM
        CanonicalTool::new("HubSpot", "CRM", Some(50.00), &["hubspot crm"]),
        CanonicalTool::new("Salesforce", "CRM", Some(75.00), &["salesforce crm", "sales cloud"]),
        CanonicalTool::new("Zoho CRM", "CRM", None, &["zoho"]),
        // Design
        CanonicalTool::new("Figma", "Design", Some(15.00), &[]),
        CanonicalTool::new("Adobe XD", "Design", None, &["xd"]),
        CanonicalTool::new("Sketch", "Design", None, &[]),
        // Knowledge
        CanonicalTool::new("Notion", "Knowledge Management", Some(10.00), &[]),
        CanonicalTool::new("Confluence", "Knowledge Management", None, &["atlassian confluence"]),
        // Cloud
        CanonicalTool::new("AWS", "Cloud", None, &["amazon web services"]),
        CanonicalTool::new("Azure", "Cloud", None, &["microsoft azure"]),
        CanonicalTool::new("Google Cloud", "Cloud", None, &["gcp", "google cloud platform"]),
    ]
}
