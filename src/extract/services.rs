use std::collections::BTreeSet;

use super::rules::ExtractionRules;

/// Extract canonical service names from ticket text and business-unit
/// labels. Three sources feed the set: synonym hits anywhere in the text,
/// bracket tags, and parsed business units.
pub fn extract_services(
    text: &str,
    business_units: &[String],
    rules: &ExtractionRules,
) -> BTreeSet<String> {
    let mut services = BTreeSet::new();

    if !text.is_empty() {
        let lower = text.to_lowercase();

        for (canonical, aliases) in &rules.synonyms {
            if lower.contains(canonical.as_str()) {
                services.insert(canonical.clone());
            }
            for alias in aliases {
                if lower.contains(alias.as_str()) {
                    services.insert(canonical.clone());
                }
            }
        }

        for caps in rules.bracket_tag.captures_iter(text) {
            let tag = &caps[1];
            if !is_valid_service_tag(tag, rules) {
                continue;
            }
            let tag_lower = tag.to_lowercase().trim().to_string();
            if rules.tag_ignore.contains(tag_lower.as_str()) {
                continue;
            }
            for (canonical, aliases) in &rules.synonyms {
                if tag_lower.contains(canonical.as_str())
                    || aliases.iter().any(|a| tag_lower.contains(a.as_str()))
                {
                    services.insert(canonical.clone());
                    break;
                }
            }
        }
    }

    for bu in business_units {
        if let Some(service) = parse_business_unit(bu, rules) {
            services.insert(service);
        }
    }

    services
}

/// A bracket tag is a plausible service label unless it is a user mention,
/// a date, a URL, an image macro, too short, or purely numeric.
pub fn is_valid_service_tag(tag: &str, rules: &ExtractionRules) -> bool {
    let tag = tag.trim();
    if tag.starts_with('~') {
        return false;
    }
    if rules.date_tag.is_match(tag) {
        return false;
    }
    if tag.starts_with("http") || tag.contains(".com") || tag.contains(".org") {
        return false;
    }
    if tag.starts_with('!') || tag.ends_with('!') {
        return false;
    }
    if tag.len() < 2 {
        return false;
    }
    let stripped: String = tag
        .chars()
        .filter(|c| !matches!(c, ' ' | ':' | ','))
        .collect();
    if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    true
}

/// Parse a business-unit label into a service name.
///
/// Recognized shapes:
/// - brand prefixes: `AR_Cloud Builder` -> "cloud builder", `IC-S3 Object
///   Storage` -> "s3 object storage"
/// - parenthesized acronym: `Next Generation Cloud Server (NGCS)` -> "ngcs"
/// - hierarchical path: take the last segment and recurse
/// - generic suffix stripping: `Mail Business Support Systems` -> "mail"
/// - short labels pass through lower-cased: `Sedo` -> "sedo"
pub fn parse_business_unit(bu: &str, rules: &ExtractionRules) -> Option<String> {
    let bu = bu.trim();
    if bu.is_empty() {
        return None;
    }
    let bu_lower = bu.to_lowercase();

    for pattern in &rules.bu_prefixes {
        if let Some(caps) = pattern.captures(&bu_lower) {
            return Some(caps[1].replace('_', " ").trim().to_string());
        }
    }
    if let Some(caps) = rules.bu_parenthesized.captures(&bu_lower) {
        return Some(caps[2].replace('_', " ").trim().to_string());
    }

    if bu.contains('/') {
        let last = bu.split('/').next_back().unwrap_or("").trim();
        if let Some(parsed) = parse_business_unit(last, rules) {
            return Some(parsed);
        }
        return Some(last.to_lowercase());
    }

    let mut result = bu_lower.clone();
    for suffix in &rules.bu_generic_suffixes {
        if result.ends_with(suffix.as_str()) {
            result = result[..result.len() - suffix.len()].trim().to_string();
            result = rules.bu_trailing_paren.replace(&result, "").trim().to_string();
            break;
        }
    }

    if result.len() >= 2 {
        return Some(result);
    }
    if bu.len() >= 2 && bu.len() <= 50 {
        return Some(bu_lower);
    }
    None
}
