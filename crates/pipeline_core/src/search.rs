//! Display-time narrowing of the lead collection.

use shared::domain::Lead;

/// Leads whose name, email, or stage id contains `query`, ignoring case.
/// An empty query keeps every lead. Order is preserved.
pub fn search_filter<'a>(leads: &'a [Lead], query: &str) -> Vec<&'a Lead> {
    if query.is_empty() {
        return leads.iter().collect();
    }
    let needle = query.to_lowercase();
    leads.iter().filter(|lead| matches(lead, &needle)).collect()
}

/// `needle` must already be lowercase.
fn matches(lead: &Lead, needle: &str) -> bool {
    [&lead.name, &lead.email, &lead.stage]
        .into_iter()
        .any(|field| field.to_lowercase().contains(needle))
}
