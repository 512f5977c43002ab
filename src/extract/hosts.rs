use std::collections::BTreeSet;

use super::rules::ExtractionRules;

/// Extract hostnames from lower-cased ticket text. All patterns are applied
/// and their matches unioned; the same substring may satisfy several
/// patterns, the set dedupes.
pub fn extract_hosts(text: &str, rules: &ExtractionRules) -> BTreeSet<String> {
    if text.is_empty() {
        return BTreeSet::new();
    }
    let lower = text.to_lowercase();

    let mut candidates = BTreeSet::new();
    for pattern in &rules.host_patterns {
        for m in pattern.find_iter(&lower) {
            candidates.insert(m.as_str().to_string());
        }
    }

    candidates
        .into_iter()
        .filter(|h| is_valid_host(h, rules))
        .collect()
}

/// Reject pattern matches that are UUID fragments, hashes, versions, cloud
/// regions, ticket keys, attachment names, or blacklisted words.
pub fn is_valid_host(hostname: &str, rules: &ExtractionRules) -> bool {
    let hostname = hostname.trim().to_lowercase();

    if rules.host_blacklist.contains(hostname.as_str()) {
        return false;
    }
    if rules.uuid_fragment.is_match(&hostname) {
        return false;
    }
    if rules.hex_hash.is_match(&hostname) {
        return false;
    }
    // Only digits once dashes are removed
    if hostname.replace('-', "").chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    if rules.version_like.is_match(&hostname) {
        return false;
    }
    if !hostname.chars().any(|c| c.is_alphabetic()) {
        return false;
    }
    // Incomplete fragments of s3-node-*
    if rules.bare_node.is_match(&hostname) {
        return false;
    }
    if rules.cloud_region.is_match(&hostname) {
        return false;
    }
    // Ticket-key-shaped (icrd-141, ngcs-456), except the s3-node family
    if rules.ticket_key_like.is_match(&hostname) && !hostname.starts_with("s3-node") {
        return false;
    }
    if rules.attachment_name.is_match(&hostname) {
        return false;
    }

    true
}
