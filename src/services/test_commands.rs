//! Test-command normalization and the executable-command whitelist.
//!
//! Normalization maps prose to a small fixed set of safe commands and never
//! invents a command from free text. The whitelist is the final gate for both
//! inbound failure reports and outbound patches.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Fallback for anything missing, unmapped, or destructive-sounding.
pub const DEFAULT_TEST_COMMAND: &str = "pnpm typecheck";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static command pattern compiles")
}

static COMMAND_PREFIX: LazyLock<Regex> = LazyLock::new(|| compile(r"^(pnpm|npm|yarn|node|tsx|tsc)\s+"));
static PROSE_LEAD: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)^(run|execute|check|verify|please|should|make sure|ensure)"));
static DANGEROUS_WORDS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(delete|remove|rm|clean|destroy|wipe|purge)\b"));
static COMMAND_SHAPE: LazyLock<Regex> = LazyLock::new(|| compile(r"^[\w-]+\s+[\w-]+"));
static FENCE_OPEN: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)^```\w*\n?"));
static FENCE_CLOSE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?m)\n?```$"));

static PROSE_MAP: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (compile(r"(?i)\b(run\s+)?typecheck"), "pnpm typecheck"),
        (compile(r"(?i)\b(check|verify)\s+(types?|typescript|ts)\b"), "pnpm typecheck"),
        (compile(r"(?i)\btsc\b"), "pnpm typecheck"),
        (compile(r"(?i)\b(run\s+)?tests?\b"), "pnpm test"),
        (compile(r"(?i)\bvitest\b"), "pnpm test"),
        (compile(r"(?i)\b(run\s+)?lint"), "pnpm lint"),
        (compile(r"(?i)\b(run\s+)?build"), "pnpm build"),
        (compile(r"(?i)\bcompile"), "pnpm build"),
    ]
});

static QUOTED: LazyLock<Regex> = LazyLock::new(|| compile(r#""[^"]*"|'[^']*'"#));
static CHAINING: LazyLock<Regex> = LazyLock::new(|| compile(r"&&|\|\||;|\||`|\$\("));
static DESTRUCTIVE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\brm\b|\bcurl\b|\bwget\b|\bsudo\b|\bgit\s+push\b"));

const ARG: &str = r"[\w:./=@-]+";

static WHITELIST: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        compile(r"^pnpm (typecheck|test|lint|build)$"),
        compile(&format!(r"^pnpm (exec|run) {ARG}( {ARG})*$")),
        compile(r"^npm test$"),
        compile(&format!(r"^npm run {ARG}$")),
        compile(&format!(r"^npx (tsc|vitest|eslint)( {ARG})*$")),
        compile(&format!(r"^tsc( {ARG})*$")),
        compile(r#"^node -e ("[^"]*"|'[^']*')$"#),
        compile(&format!(r"^vitest run( {ARG})*$")),
    ]
});

fn is_prose(s: &str) -> bool {
    if COMMAND_PREFIX.is_match(s) {
        return false;
    }
    PROSE_LEAD.is_match(s)
        || DANGEROUS_WORDS.is_match(s)
        || (s.contains(' ') && !COMMAND_SHAPE.is_match(s))
}

fn prose_to_command(s: &str) -> &'static str {
    if DANGEROUS_WORDS.is_match(s) {
        return DEFAULT_TEST_COMMAND;
    }
    PROSE_MAP
        .iter()
        .find(|(pattern, _)| pattern.is_match(s))
        .map_or(DEFAULT_TEST_COMMAND, |(_, command)| command)
}

/// Normalize one entry: strip fences and backticks, map prose.
pub fn normalize_command(raw: &str) -> String {
    let stripped = FENCE_OPEN.replace_all(raw.trim(), "");
    let stripped = FENCE_CLOSE.replace_all(&stripped, "");
    let stripped = stripped.trim().trim_matches('`').trim();

    if stripped.is_empty() {
        return DEFAULT_TEST_COMMAND.to_string();
    }
    if is_prose(stripped) {
        return prose_to_command(stripped).to_string();
    }
    stripped.to_string()
}

/// Normalize the `testCommands` field of an inbound report. Missing, empty or
/// non-list values become `["pnpm typecheck"]`; a lone string is one entry.
pub fn normalize_test_commands(raw: Option<&Value>) -> Vec<String> {
    let entries: Vec<String> = match raw {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    };
    if entries.is_empty() {
        return vec![DEFAULT_TEST_COMMAND.to_string()];
    }
    entries.iter().map(|e| normalize_command(e)).collect()
}

/// Check one command line against the safety rules and the whitelist.
pub fn validate_command(command: &str) -> Result<(), String> {
    if command.trim().is_empty() {
        return Err("empty command".to_string());
    }
    if command.contains(['\n', '\r']) {
        return Err("contains a newline".to_string());
    }
    let unquoted = QUOTED.replace_all(command, "");
    if let Some(m) = CHAINING.find(&unquoted) {
        return Err(format!("contains shell operator '{}'", m.as_str()));
    }
    if let Some(m) = DESTRUCTIVE.find(command) {
        return Err(format!("contains destructive token '{}'", m.as_str()));
    }
    if !WHITELIST.iter().any(|re| re.is_match(command.trim())) {
        return Err("not a whitelisted command".to_string());
    }
    Ok(())
}

/// Whether a single command line passes the whitelist.
pub fn is_whitelisted(command: &str) -> bool {
    validate_command(command).is_ok()
}

/// Validate every command, one error string per failure.
pub fn validate_commands(commands: &[String]) -> Vec<String> {
    commands
        .iter()
        .enumerate()
        .filter_map(|(i, c)| validate_command(c).err().map(|e| format!("testCommands[{i}]: {e}")))
        .collect()
}
