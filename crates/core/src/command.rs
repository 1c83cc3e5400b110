//! Shell command classification.
//!
//! Commands reported by the agent are usually wrapped (`bash -lc '...'`) and
//! sometimes piped. Classification unwraps, splits on unquoted pipes and maps
//! the first recognizable segment onto a [`CommandKind`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

use crate::item::str_field;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandKind {
    Search,
    Read,
    ListFiles,
    Format,
    Test,
    Lint,
    Noop,
    Unknown,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Read => "read",
            Self::ListFiles => "listFiles",
            Self::Format => "format",
            Self::Test => "test",
            Self::Lint => "lint",
            Self::Noop => "noop",
            Self::Unknown => "unknown",
        }
    }

    /// Read, search and list commands form exploration spans.
    pub fn is_exploration(self) -> bool {
        matches!(self, Self::Read | Self::Search | Self::ListFiles)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCommand {
    pub kind: CommandKind,
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ParsedCommand {
    fn new(kind: CommandKind, cmd: &str) -> Self {
        Self {
            kind,
            cmd: cmd.to_string(),
            name: None,
            query: None,
            path: None,
        }
    }

    fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }
}

/// Structured action the backend attaches to a command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CommandAction {
    Read {
        command: String,
        name: String,
        path: String,
    },
    ListFiles {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    Search {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    Unknown {
        command: String,
    },
}

static SHELL_LC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(?:/bin/)?(?:bash|zsh|sh)\s+-lc\s+(.+)$").expect("shell -lc regex should compile")
});
static SHELL_C: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(?:/bin/)?(?:bash|zsh|sh)\s+(?:-l\s+)?-c\s+(.+)$").expect("shell -c regex should compile")
});
static SEARCH_ARGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^(?:grep|rg|ag|ack)\s+(?:-\S+\s+)*(?:'([^']*)'|"([^"]*)"|(\S+))\s*(.*)$"#)
        .expect("search args regex should compile")
});
static FIND_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)-name\s+['"]?([^'"]+)['"]?"#).expect("find -name regex should compile")
});
static LAST_PATH_ARG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|\s)([^\s"']+|"[^"]+"|'[^']+')\s*$"#).expect("last path arg regex should compile")
});
static SED_IN_PLACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)-i\b|--in-place\b").expect("sed in-place regex should compile"));

static SEARCH_CMD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:grep|rg|ag|ack)\s").expect("search regex should compile"));
static FIND_CMD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^find\s").expect("find regex should compile"));
static LIST_CMD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:ls|dir|tree)\b").expect("list regex should compile"));
static READ_CMD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:cat|head|tail|less|more|bat)\s").expect("read regex should compile"));
static SED_CMD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^sed\b").expect("sed regex should compile"));
static NL_CMD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^nl\b").expect("nl regex should compile"));
static FORMAT_CMD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:prettier|black|gofmt|rustfmt|clang-format|autopep8)\b").expect("format regex should compile")
});
static TEST_CMD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:npm\s+test|yarn\s+test|pytest|jest|cargo\s+test|go\s+test|rspec|mocha)\b")
        .expect("test regex should compile")
});
static LINT_CMD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:eslint|pylint|flake8|clippy|golint|tslint|rubocop)\b").expect("lint regex should compile")
});
static NOOP_CMD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:echo\b|true\b|:)").expect("noop regex should compile"));

/// Strip one level of matching outer quotes, undoing shell escaping inside.
pub fn strip_outer_quotes(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        return trimmed[1..trimmed.len() - 1].replace(r#"'"'"'"#, "'");
    }
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        return trimmed[1..trimmed.len() - 1].replace("\\\"", "\"");
    }
    trimmed.to_string()
}

/// `bash -lc '<cmd>'` → `<cmd>`. Unwrapped commands pass through trimmed.
pub fn unwrap_shell_command(command: &str) -> String {
    let trimmed = command.trim();
    for pattern in [&*SHELL_LC, &*SHELL_C] {
        if let Some(inner) = pattern.captures(trimmed).and_then(|c| c.get(1)) {
            return strip_outer_quotes(inner.as_str());
        }
    }
    trimmed.to_string()
}

fn normalize_shell_command(command: &str) -> String {
    let unwrapped = unwrap_shell_command(command);
    let without_prompt = match unwrapped.strip_prefix('$') {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest,
        _ => unwrapped.as_str(),
    };
    without_prompt.trim().to_string()
}

/// Split on `|` outside of single or double quotes, dropping empty segments.
pub fn split_pipe_segments(command: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut buffer = String::new();
    let mut in_single = false;
    let mut in_double = false;

    for ch in command.chars() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '|' if !in_single && !in_double => {
                let segment = buffer.trim();
                if !segment.is_empty() {
                    segments.push(segment.to_string());
                }
                buffer.clear();
                continue;
            }
            _ => {}
        }
        buffer.push(ch);
    }

    let tail = buffer.trim();
    if !tail.is_empty() {
        segments.push(tail.to_string());
    }
    segments
}

/// Last whitespace-separated token, unless it looks like a flag.
pub fn extract_last_path_arg(command: &str) -> Option<String> {
    let token = LAST_PATH_ARG.captures(command)?.get(1)?.as_str();
    let token = strip_outer_quotes(token);
    if token.is_empty() || token.starts_with('-') {
        return None;
    }
    Some(token)
}

fn parse_single(segment: &str) -> ParsedCommand {
    let cmd = segment.trim();
    if cmd.is_empty() {
        return ParsedCommand::new(CommandKind::Unknown, "");
    }
    let lower = cmd.to_lowercase();

    if SEARCH_CMD.is_match(&lower) {
        let mut parsed = ParsedCommand::new(CommandKind::Search, cmd);
        if let Some(caps) = SEARCH_ARGS.captures(cmd) {
            parsed.query = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string());
            parsed.path = caps
                .get(4)
                .map(|m| m.as_str().trim())
                .filter(|p| !p.is_empty())
                .map(str::to_string);
        }
        return parsed;
    }

    if FIND_CMD.is_match(&lower) {
        if let Some(name) = FIND_NAME.captures(cmd).and_then(|c| c.get(1)) {
            let mut parsed = ParsedCommand::new(CommandKind::Search, cmd);
            parsed.query = Some(name.as_str().trim().to_string());
            return parsed;
        }
        return ParsedCommand::new(CommandKind::ListFiles, cmd);
    }

    if LIST_CMD.is_match(&lower) {
        let mut parsed = ParsedCommand::new(CommandKind::ListFiles, cmd);
        parsed.path = cmd
            .split_whitespace()
            .skip(1)
            .find(|part| !part.starts_with('-'))
            .map(str::to_string);
        return parsed;
    }

    if READ_CMD.is_match(&lower) {
        return ParsedCommand::new(CommandKind::Read, cmd).with_name(extract_last_path_arg(cmd));
    }

    if SED_CMD.is_match(&lower) {
        if SED_IN_PLACE.is_match(&lower) {
            return ParsedCommand::new(CommandKind::Unknown, cmd);
        }
        return match extract_last_path_arg(cmd) {
            Some(name) => ParsedCommand::new(CommandKind::Read, cmd).with_name(Some(name)),
            None => ParsedCommand::new(CommandKind::Unknown, cmd),
        };
    }

    if NL_CMD.is_match(&lower) {
        return match extract_last_path_arg(cmd) {
            Some(name) => ParsedCommand::new(CommandKind::Read, cmd).with_name(Some(name)),
            None => ParsedCommand::new(CommandKind::Unknown, cmd),
        };
    }

    let kind = if FORMAT_CMD.is_match(&lower) {
        CommandKind::Format
    } else if TEST_CMD.is_match(&lower) {
        CommandKind::Test
    } else if LINT_CMD.is_match(&lower) {
        CommandKind::Lint
    } else if NOOP_CMD.is_match(&lower) {
        CommandKind::Noop
    } else {
        CommandKind::Unknown
    };
    ParsedCommand::new(kind, cmd)
}

/// Classify a raw command string.
pub fn parse_command(command: &str) -> ParsedCommand {
    let cmd = normalize_shell_command(command);
    if cmd.is_empty() {
        return ParsedCommand::new(CommandKind::Unknown, "");
    }
    let segments = split_pipe_segments(&cmd);
    if segments.len() > 1 {
        if let Some(parsed) = segments
            .iter()
            .map(|segment| parse_single(segment))
            .find(|parsed| parsed.kind != CommandKind::Unknown)
        {
            return parsed;
        }
    }
    parse_single(&cmd)
}

/// Tolerant decoding of a raw `commandActions` array. Malformed actions are skipped.
pub fn normalize_command_actions(value: Option<&Value>) -> Vec<CommandAction> {
    let Some(actions) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    actions
        .iter()
        .filter_map(|action| {
            let kind = str_field(action, &["type"])?;
            let command = str_field(action, &["command"])?.to_string();
            let path = str_field(action, &["path"]).map(str::to_string);
            match kind {
                "read" => {
                    let name = str_field(action, &["name"])?.to_string();
                    let path = path.unwrap_or_else(|| name.clone());
                    Some(CommandAction::Read { command, name, path })
                }
                "listFiles" => Some(CommandAction::ListFiles { command, path }),
                "search" => Some(CommandAction::Search {
                    command,
                    query: str_field(action, &["query"]).map(str::to_string),
                    path,
                }),
                "unknown" => Some(CommandAction::Unknown { command }),
                _ => None,
            }
        })
        .collect()
}

fn parsed_from_action(action: &CommandAction) -> ParsedCommand {
    match action {
        CommandAction::Read { command, name, path } => ParsedCommand {
            kind: CommandKind::Read,
            cmd: command.clone(),
            name: Some(name.clone()),
            query: None,
            path: Some(path.clone()),
        },
        CommandAction::ListFiles { command, path } => ParsedCommand {
            kind: CommandKind::ListFiles,
            cmd: command.clone(),
            name: None,
            query: None,
            path: path.clone(),
        },
        CommandAction::Search { command, query, path } => ParsedCommand {
            kind: CommandKind::Search,
            cmd: command.clone(),
            name: None,
            query: query.clone(),
            path: path.clone(),
        },
        CommandAction::Unknown { command } => ParsedCommand::new(CommandKind::Unknown, command),
    }
}

/// Backend-provided actions win over local parsing; the first action decides.
pub fn resolve_parsed_command(command: &str, actions: &[CommandAction]) -> ParsedCommand {
    match actions.first() {
        Some(action) => parsed_from_action(action),
        None => parse_command(command),
    }
}

/// One-line human summary, e.g. `("Read", "src/main.rs")`.
pub fn command_summary(parsed: &ParsedCommand, finished: bool, raw_command: Option<&str>) -> (&'static str, String) {
    let pick = |done: &'static str, running: &'static str| if finished { done } else { running };
    match parsed.kind {
        CommandKind::Search => {
            let content = match (&parsed.query, &parsed.path) {
                (Some(query), Some(path)) => format!("{query} in {path}"),
                (Some(query), None) => query.clone(),
                _ => "files".to_string(),
            };
            (pick("Searched for", "Searching for"), content)
        }
        CommandKind::Read => (
            pick("Read", "Reading"),
            parsed.name.clone().unwrap_or_else(|| "file".to_string()),
        ),
        CommandKind::ListFiles => match &parsed.path {
            Some(path) => (pick("Listed files in", "Listing files in"), path.clone()),
            None => (pick("Explored", "Exploring"), "files".to_string()),
        },
        _ => {
            let content = raw_command
                .map(str::trim)
                .filter(|raw| !raw.is_empty())
                .unwrap_or(&parsed.cmd)
                .to_string();
            (pick("Ran", "Running"), content)
        }
    }
}

const OUTPUT_NOISE_PREFIXES: &[&str] = &[
    "Chunk ID:",
    "Wall time:",
    "Process exited with code",
    "Original token count:",
];

/// Drop exec-harness bookkeeping lines from aggregated command output.
pub fn normalize_command_output(output: Option<&str>) -> String {
    let Some(output) = output.filter(|o| !o.is_empty()) else {
        return String::new();
    };
    let normalized = output.replace("\r\n", "\n").replace('\r', "\n");
    let kept: Vec<&str> = normalized
        .split('\n')
        .filter(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return true;
            }
            if OUTPUT_NOISE_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
                return false;
            }
            !(trimmed.starts_with("Output:") && trimmed["Output:".len()..].trim().is_empty())
        })
        .collect();

    let joined = kept.join("\n");
    let first_content = joined
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(idx, _)| idx)
        .unwrap_or(joined.len());
    // Only whole leading blank lines are removed; indentation on the first line survives.
    let cut = joined[..first_content].rfind('\n').map(|idx| idx + 1).unwrap_or(0);
    joined[cut..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_login_shell_wrapper() {
        assert_eq!(unwrap_shell_command("bash -lc 'cat src/lib.rs'"), "cat src/lib.rs");
        assert_eq!(unwrap_shell_command("/bin/zsh -c \"ls -la\""), "ls -la");
        assert_eq!(unwrap_shell_command("sh -l -c 'rg foo'"), "rg foo");
        assert_eq!(unwrap_shell_command("  git status "), "git status");
    }

    #[test]
    fn strip_outer_quotes_unescapes_embedded_single_quote() {
        assert_eq!(strip_outer_quotes(r#"'echo '"'"'hi'"'"''"#), "echo 'hi'");
        assert_eq!(strip_outer_quotes(r#""say \"x\"""#), r#"say "x""#);
        assert_eq!(strip_outer_quotes("plain"), "plain");
    }

    #[test]
    fn classifies_reads() {
        let parsed = parse_command("bash -lc 'head -n 40 src/main.rs'");
        assert_eq!(parsed.kind, CommandKind::Read);
        assert_eq!(parsed.name.as_deref(), Some("src/main.rs"));

        let parsed = parse_command("sed -n '1,80p' crates/core/src/lib.rs");
        assert_eq!(parsed.kind, CommandKind::Read);
        assert_eq!(parsed.name.as_deref(), Some("crates/core/src/lib.rs"));

        assert_eq!(parse_command("sed -i 's/a/b/' file.txt").kind, CommandKind::Unknown);
        assert_eq!(parse_command("nl -ba").kind, CommandKind::Unknown);
    }

    #[test]
    fn classifies_search_and_list() {
        let parsed = parse_command("rg -n 'fn main' src");
        assert_eq!(parsed.kind, CommandKind::Search);
        assert_eq!(parsed.query.as_deref(), Some("fn main"));
        assert_eq!(parsed.path.as_deref(), Some("src"));

        let parsed = parse_command("find . -name '*.rs'");
        assert_eq!(parsed.kind, CommandKind::Search);
        assert_eq!(parsed.query.as_deref(), Some("*.rs"));

        assert_eq!(parse_command("find . -type f").kind, CommandKind::ListFiles);

        let parsed = parse_command("ls -la src/");
        assert_eq!(parsed.kind, CommandKind::ListFiles);
        assert_eq!(parsed.path.as_deref(), Some("src/"));
    }

    #[test]
    fn pipe_picks_first_recognized_segment() {
        let parsed = parse_command("git ls-files | rg parser");
        assert_eq!(parsed.kind, CommandKind::Search);
        assert_eq!(parsed.query.as_deref(), Some("parser"));

        assert_eq!(split_pipe_segments("echo 'a|b' | wc -l"), vec!["echo 'a|b'", "wc -l"]);
    }

    #[test]
    fn classifies_tooling_commands() {
        assert_eq!(parse_command("cargo test -p core").kind, CommandKind::Test);
        assert_eq!(parse_command("rustfmt src/lib.rs").kind, CommandKind::Format);
        assert_eq!(parse_command("eslint .").kind, CommandKind::Lint);
        assert_eq!(parse_command("echo done").kind, CommandKind::Noop);
        assert_eq!(parse_command("$ make build").kind, CommandKind::Unknown);
        assert_eq!(parse_command("").cmd, "");
    }

    #[test]
    fn backend_actions_take_precedence() {
        let actions = normalize_command_actions(Some(&json!([
            { "type": "read", "command": "weird-reader x", "name": "x.rs" },
            { "type": "bogus", "command": "ignored" },
            { "type": "search" }
        ])));
        assert_eq!(actions.len(), 1);

        let parsed = resolve_parsed_command("weird-reader x", &actions);
        assert_eq!(parsed.kind, CommandKind::Read);
        assert_eq!(parsed.path.as_deref(), Some("x.rs"));
    }

    #[test]
    fn summaries_follow_tense() {
        let read = parse_command("cat README.md");
        assert_eq!(command_summary(&read, true, None), ("Read", "README.md".to_string()));
        assert_eq!(command_summary(&read, false, None).0, "Reading");

        let list = parse_command("find . -type d");
        assert_eq!(command_summary(&list, true, None), ("Explored", "files".to_string()));

        let other = parse_command("make");
        assert_eq!(
            command_summary(&other, false, Some(" bash -lc make ")),
            ("Running", "bash -lc make".to_string())
        );
    }

    #[test]
    fn output_normalization_strips_harness_lines() {
        let raw = "Chunk ID: 7\r\nWall time: 0.1s\nProcess exited with code 0\nOutput:\n\n  hello\nworld\n";
        assert_eq!(normalize_command_output(Some(raw)), "  hello\nworld\n");
        assert_eq!(normalize_command_output(None), "");
    }
}
