use tlsb2_types::{FileInfo, Kind, Namespace};

/// Identity of the most recently uploaded object of `kind` in `files`.
///
/// Files outside the namespace are ignored. Among files sharing the latest
/// timestamp, the first one in listing order wins.
pub fn most_recent_identity(namespace: &Namespace, kind: Kind, files: &[FileInfo]) -> Option<String> {
    let mut candidates: Vec<(&FileInfo, &str)> = files
        .iter()
        .filter_map(|f| namespace.identity_of(kind, &f.name).ok().map(|id| (f, id)))
        .collect();

    // Newest first; the sort is stable so ties keep listing order.
    candidates.sort_by(|(a, _), (b, _)| b.uploaded_at.cmp(&a.uploaded_at));
    candidates.first().map(|(_, identity)| identity.to_string())
}
