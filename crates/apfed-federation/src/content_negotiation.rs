//! Accept-header negotiation between the Activity Streams representation
//! and whatever an application serves as a human-facing fallback (HTML,
//! plain JSON, …).

const ACTIVITY_MEDIA_TYPES: &[&str] = &[
    "application/activity+json",
    "application/ld+json",
];

/// Whether `accept` indicates the caller wants the Activity Streams JSON-LD
/// representation rather than a human-facing one. Absent or `*/*` Accept
/// headers are treated as wanting the federation representation, matching
/// how most ActivityPub implementations greet unqualified requests.
pub fn wants_activity_json(accept: Option<&str>) -> bool {
    let Some(accept) = accept else { return true };
    accept.split(',').any(|part| {
        let media_type = part.split(';').next().unwrap_or("").trim();
        media_type == "*/*" || ACTIVITY_MEDIA_TYPES.contains(&media_type)
    })
}
