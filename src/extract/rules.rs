use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Known technology tokens matched as whole words in ticket text.
const TECHNOLOGIES: &[&str] = &[
    // Search / logs
    "opensearch", "kibana", "elasticsearch", "logstash", "fluentd",
    // Web servers / runtimes
    "apache", "nginx", "php", "python", "java", "nodejs", "tomcat", "jboss", "wildfly",
    // Databases
    "mysql", "postgresql", "mariadb", "mongodb", "redis", "cassandra", "ceph",
    // Containers / orchestration
    "docker", "kubernetes", "k8s", "proxmox", "vmware", "vcenter", "esxi", "openstack",
    // CI/CD
    "jenkins", "ansible", "terraform", "gitlab", "github", "bitbucket", "git", "rundeck", "salt",
    // Security / CDN
    "imperva", "cloudflare", "akamai", "waf",
    // Messaging
    "kafka", "rabbitmq", "activemq",
    // Monitoring
    "grafana", "prometheus", "zabbix", "nagios", "datadog",
    // Load balancing / proxy
    "haproxy", "keepalived", "lvs", "varnish",
    // Cache
    "memcached",
    // Cloud providers
    "aws", "azure", "gcp",
    // Storage
    "s3", "cloudian", "hyperstore", "netbackup", "nfs",
    // Mail
    "dovecot", "postfix", "roundcube", "exim",
    // Virtualization
    "qemu", "kvm", "libvirt", "hyper-v", "virtuozzo",
    // OS / distros
    "debian", "ubuntu", "centos", "rhel",
    // Brand products
    "waas", "dcd", "clipp", "ngcs", "dave",
    // Identity / auth
    "keycloak", "iam", "oauth", "ldap", "saml", "openid",
];

/// Strings that match a host pattern but never name a host.
const HOST_BLACKLIST: &[&str] = &[
    "https", "http", "image", "browse", "version", "update", "release",
    "node12", "node10", "node11", "node-33", "node-91", "node-601", "node-604", "node-901",
    "utf8", "utf16", "iso8859", "win1252",
    "amd64", "x86", "arm64",
    "eu-south-2", "eu-central-1", "eu-central-2", "us-east-1", "us-west-2",
    "region", "regions",
    "image-2025", "image-2024", "image-2023", "screenshot-1", "screenshot-2",
];

/// Bracket tags that are workflow labels, not services.
const TAG_IGNORE: &[&str] = &[
    "ai", "dev", "smb", "urgent", "qa", "prod", "pre", "test",
    "wip", "todo", "done", "blocked", "review",
    "minor", "major", "critical", "blocker",
    "bug", "feature", "task", "story", "epic",
];

/// Generic organizational suffixes stripped from business-unit labels.
const BU_GENERIC_SUFFIXES: &[&str] = &[
    "business support systems", "customer interaction systems",
    "employee support systems", "operations support systems",
    "product service systems", "external supplier systems",
    "outsourced service systems", "corporate management systems",
    "-bss", "-cis", "-ess", "-oss", "-pss", "-extss", "-outss", "-cms",
];

/// Brand prefixes on business-unit labels; the captured remainder is the
/// service name.
const BU_PREFIX_PATTERNS: &[&str] = &[
    r"^ar_(.+)$",
    r"^fh_(.+)$",
    r"^ic-(.+)$",
    r"^ionos-(.+)$",
    r"^strato-(.+)$",
    r"^home\.pl-(.+)$",
    r"^cronon[- ](.+)$",
    r"^fasthosts[- ](.+)$",
    r"^world4you[- ](.+)$",
    r"^internetx[- ](.+)$",
    r"^we22[- ](.+)$",
    r"^udag[- ](.+)$",
];

/// Compiled pattern tables driving the normalizer. Built once at startup
/// from the current synonym table; matching is then a pure table lookup.
pub struct ExtractionRules {
    /// Applied as a union; the same substring may match several patterns.
    pub host_patterns: Vec<Regex>,
    pub host_blacklist: BTreeSet<String>,
    pub uuid_fragment: Regex,
    pub hex_hash: Regex,
    pub version_like: Regex,
    pub bare_node: Regex,
    pub cloud_region: Regex,
    pub ticket_key_like: Regex,
    pub attachment_name: Regex,
    /// (token, whole-word pattern) pairs for the technology vocabulary.
    pub technologies: Vec<(String, Regex)>,
    /// Canonical service name -> aliases.
    pub synonyms: BTreeMap<String, Vec<String>>,
    pub tag_ignore: BTreeSet<String>,
    pub bracket_tag: Regex,
    pub date_tag: Regex,
    /// `[DD/MM/YYYY HH:MM, DD/MM/YYYY HH:MM]` with an optional second date.
    pub live_interval: Regex,
    /// `YYYYMMDD HH:MM - USER: ACTION`, one per line.
    pub timeline_entry: Regex,
    pub bu_prefixes: Vec<Regex>,
    pub bu_parenthesized: Regex,
    pub bu_trailing_paren: Regex,
    pub bu_generic_suffixes: Vec<String>,
}

impl ExtractionRules {
    pub fn new(synonyms: BTreeMap<String, Vec<String>>) -> Self {
        let host_patterns = vec![
            Regex::new(r"\bs3-node-\d+(?:-\d+)?\b").unwrap(),
            Regex::new(r"\b[a-z]{2,10}-[a-z]*-?\d{1,3}\b").unwrap(),
            Regex::new(r"\b[a-z]{2,6}\d{2,4}\b").unwrap(),
            Regex::new(r"\b[a-z]{3,8}-\d{3,5}\b").unwrap(),
            Regex::new(r"\b[a-z]{6,30}[a-z]\d{2}\b").unwrap(),
        ];

        let technologies = TECHNOLOGIES
            .iter()
            .map(|token| {
                let pattern = format!(r"\b{}\b", regex::escape(token));
                (token.to_string(), Regex::new(&pattern).unwrap())
            })
            .collect();

        Self {
            host_patterns,
            host_blacklist: HOST_BLACKLIST.iter().map(|s| s.to_string()).collect(),
            uuid_fragment: Regex::new(r"^[a-f0-9]{4,8}$").unwrap(),
            hex_hash: Regex::new(r"^[a-f0-9]{32,}$").unwrap(),
            version_like: Regex::new(r"^v?\d+(\.\d+)*$").unwrap(),
            bare_node: Regex::new(r"^node-\d+$").unwrap(),
            cloud_region: Regex::new(r"^(eu|us|ap|sa|af|me)-(north|south|east|west|central)-\d+$")
                .unwrap(),
            ticket_key_like: Regex::new(r"^[a-z]{2,6}-\d{1,5}$").unwrap(),
            attachment_name: Regex::new(r"^(image|screenshot|img|pic|photo)-").unwrap(),
            technologies,
            synonyms,
            tag_ignore: TAG_IGNORE.iter().map(|s| s.to_string()).collect(),
            bracket_tag: Regex::new(r"\[([^\]]+)\]").unwrap(),
            date_tag: Regex::new(r"^\d{2}/\d{2}/\d{4}").unwrap(),
            live_interval: Regex::new(
                r"\[(\d{2}/\d{2}/\d{4})\s+(\d{2}:\d{2}),\s*(?:(\d{2}/\d{2}/\d{4})\s+)?(\d{2}:\d{2})\]",
            )
            .unwrap(),
            timeline_entry: Regex::new(r"(?m)^(\d{8})\s+(\d{2}:\d{2})\s*-\s*(\w+):\s*(.+)$")
                .unwrap(),
            bu_prefixes: BU_PREFIX_PATTERNS
                .iter()
                .map(|p| Regex::new(p).unwrap())
                .collect(),
            bu_parenthesized: Regex::new(r"^(.+?)\s*\(([A-Za-z]{2,10}(?:-[A-Za-z]{2,10})?)\)$")
                .unwrap(),
            bu_trailing_paren: Regex::new(r"\s*\([^)]*\)\s*$").unwrap(),
            bu_generic_suffixes: BU_GENERIC_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Sorted canonical service names, for the vocabulary endpoint.
    pub fn canonical_services(&self) -> Vec<String> {
        self.synonyms.keys().cloned().collect()
    }

}

/// Sorted technology tokens, for the vocabulary endpoint.
pub fn technology_vocabulary() -> Vec<String> {
    let mut tokens: Vec<String> = TECHNOLOGIES.iter().map(|t| t.to_string()).collect();
    tokens.sort();
    tokens
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self::new(crate::models::scoring::default_synonyms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_compile() {
        let rules = ExtractionRules::default();
        assert_eq!(rules.host_patterns.len(), 5);
        assert!(rules.technologies.len() > 70);
        assert!(rules.synonyms.contains_key("s3 object storage"));
    }

    #[test]
    fn vocabulary_is_sorted() {
        let techs = technology_vocabulary();
        let mut sorted = techs.clone();
        sorted.sort();
        assert_eq!(techs, sorted);
        assert!(techs.contains(&"kubernetes".to_string()));
    }
}
