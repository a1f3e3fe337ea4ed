//! Entity tagging: a compiled registry of typed surface-form patterns.
//!
//! The tagger applies structural patterns (URLs, emails, files, versions,
//! dates), known-name lists (languages, technologies), and a title-case
//! span heuristic that separates people from organizations and compound
//! nouns by their head word. Results are deduplicated by normalized form;
//! the first matching type wins.

use crate::models::{EntityType, ExtractedEntity};
use crate::text::STOP_WORDS;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Known programming languages.
static LANGUAGES: &[&str] = &[
    "Rust",
    "Python",
    "Java",
    "JavaScript",
    "TypeScript",
    "Go",
    "C++",
    "C#",
    "Ruby",
    "PHP",
    "Swift",
    "Kotlin",
    "Scala",
    "Elixir",
    "Haskell",
    "Clojure",
    "F#",
    "Zig",
];

/// Known technologies: databases, frameworks, infrastructure.
static TECHNOLOGIES: &[&str] = &[
    // Databases
    "PostgreSQL",
    "MySQL",
    "SQLite",
    "Redis",
    "MongoDB",
    "Cassandra",
    "DynamoDB",
    "CockroachDB",
    "ClickHouse",
    "Elasticsearch",
    "Neo4j",
    "Firestore",
    // Web frameworks
    "React",
    "Vue",
    "Angular",
    "Svelte",
    "Next.js",
    "Nuxt",
    "Express",
    "Django",
    "Rails",
    "Laravel",
    "Spring",
    "Flask",
    "FastAPI",
    "Actix",
    // Cloud providers
    "AWS",
    "Azure",
    "GCP",
    "Cloudflare",
    "Vercel",
    "Netlify",
    "Heroku",
    "DigitalOcean",
    "Linode",
    // Containers and orchestration
    "Docker",
    "Kubernetes",
    "k8s",
    "Podman",
    "Nomad",
    "ECS",
    "EKS",
    "GKE",
    // Infrastructure and observability
    "Terraform",
    "Ansible",
    "Prometheus",
    "Grafana",
    "Datadog",
    "Jaeger",
    // Messaging
    "Kafka",
    "RabbitMQ",
    "NATS",
    "Pulsar",
    "SQS",
    // Build tools
    "Webpack",
    "Vite",
    "esbuild",
    "Rollup",
    "Cargo",
    "npm",
    "yarn",
    "pnpm",
    "Maven",
    "Gradle",
    // Runtimes
    "Node.js",
    "Deno",
    "Bun",
    "WASM",
    // APIs and protocols
    "REST",
    "GraphQL",
    "gRPC",
    "WebSocket",
    "MQTT",
    "OpenAPI",
];

/// Head words that mark a title-case span as a system/organization noun
/// rather than a person.
static ORG_HEADS: &[&str] = &[
    "Inc", "Corp", "LLC", "Ltd", "GmbH", "Team", "Labs", "Group", "Company",
];

static SYSTEM_HEADS: &[&str] = &[
    "Service", "API", "Manager", "Pipeline", "Database", "Server", "Cache", "Engine", "Store",
    "Queue", "Worker", "Gateway", "Module", "Client", "Handler",
];

fn alternation(names: &[&str]) -> String {
    names
        .iter()
        .map(|n| regex::escape(n))
        .collect::<Vec<_>>()
        .join("|")
}

/// Registry patterns are built from static material; a failure here is a
/// programmer error caught by the tagger tests below.
#[allow(clippy::unwrap_used)]
fn compile(raw: &str) -> Regex {
    Regex::new(raw).unwrap()
}

macro_rules! static_regex {
    ($name:ident, $builder:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| compile(&$builder));
    };
}

static_regex!(URL_RE, r"https?://[^\s)>\]]+".to_string());
static_regex!(
    EMAIL_RE,
    r"\b[A-Za-z0-9][\w.+-]*@[\w-]+\.[A-Za-z][\w.]*\b".to_string()
);
static_regex!(
    FILE_RE,
    r"\b[\w./-]*\w\.(?:rs|py|js|ts|go|java|rb|c|h|cpp|md|toml|yaml|yml|json|txt|sql|sh|cfg|ini)\b"
        .to_string()
);
static_regex!(VERSION_RE, r"\bv?\d+\.\d+(?:\.\d+)?(?:-[\w.]+)?\b".to_string());
static_regex!(
    DATE_RE,
    r"\b(?:\d{4}-\d{2}-\d{2}|(?:January|February|March|April|May|June|July|August|September|October|November|December) \d{1,2},? \d{4})\b"
        .to_string()
);
// Known names need non-word boundaries by hand: names like "C++" end in
// regex metacharacters where \b does not apply.
static_regex!(
    LANGUAGE_RE,
    format!(r"(?:^|[^\w+#.])({})(?:$|[^\w+#])", alternation(LANGUAGES))
);
static_regex!(
    TECHNOLOGY_RE,
    format!(r"(?:^|[^\w.])({})(?:$|[^\w.])", alternation(TECHNOLOGIES))
);
static_regex!(
    TITLE_SPAN_RE,
    r"\b([A-Z][a-z]+(?: [A-Z][A-Za-z]*){1,3})\b".to_string()
);

/// Classifies a title-case span by its head word.
fn classify_span(span: &str) -> EntityType {
    let last = span.split_whitespace().last().unwrap_or_default();
    let trimmed = last.trim_end_matches('.');
    if ORG_HEADS.contains(&trimmed) {
        EntityType::Organization
    } else if SYSTEM_HEADS.contains(&trimmed) {
        EntityType::CompoundEntity
    } else if span.split_whitespace().count() == 2
        && span.split_whitespace().all(|w| {
            w.len() >= 2 && w.chars().next().is_some_and(char::is_uppercase)
        })
    {
        EntityType::Person
    } else {
        EntityType::CompoundEntity
    }
}

/// Tags typed entities in a piece of text.
///
/// Deduplicates by normalized surface form (first type wins), filters stop
/// words and single-character tokens, and is deterministic: results follow
/// pattern-registry order, then position in the text.
#[must_use]
pub fn tag_entities(text: &str) -> Vec<ExtractedEntity> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut entities = Vec::new();

    let mut push = |surface: &str, entity_type: EntityType| {
        let surface = surface.trim().trim_end_matches(['.', ',', ';', ':']);
        if surface.len() < 2 {
            return;
        }
        let normalized = surface.to_lowercase();
        if STOP_WORDS.contains(normalized.as_str()) {
            return;
        }
        if seen.insert(normalized) {
            entities.push(ExtractedEntity::new(surface, entity_type));
        }
    };

    for m in URL_RE.find_iter(text) {
        push(m.as_str(), EntityType::Url);
    }
    for m in EMAIL_RE.find_iter(text) {
        push(m.as_str(), EntityType::Email);
    }
    for m in FILE_RE.find_iter(text) {
        push(m.as_str(), EntityType::File);
    }
    for m in DATE_RE.find_iter(text) {
        push(m.as_str(), EntityType::Date);
    }
    for m in VERSION_RE.find_iter(text) {
        push(m.as_str(), EntityType::Version);
    }
    for caps in LANGUAGE_RE.captures_iter(text) {
        if let Some(name) = caps.get(1) {
            push(name.as_str(), EntityType::ProgrammingLanguage);
        }
    }
    for caps in TECHNOLOGY_RE.captures_iter(text) {
        if let Some(name) = caps.get(1) {
            push(name.as_str(), EntityType::Technology);
        }
    }
    for caps in TITLE_SPAN_RE.captures_iter(text) {
        if let Some(span) = caps.get(1) {
            // Sentence-initial single words already went through the known
            // lists; spans here are multi-word by construction.
            push(span.as_str(), classify_span(span.as_str()));
        }
    }

    entities
}
