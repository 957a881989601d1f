//! Whitelist filter and command parser.
//!
//! Turns an agent-supplied command string into a [`ParsedCommand`]: program,
//! argument vector, optional stdout redirect and optional heredoc body. The
//! sandbox never sees raw strings and never invokes a shell, so anything the
//! tokenizer does not model (pipes, chaining, substitution, variable
//! expansion, input redirection) is rejected up front.

use serde::{Deserialize, Serialize};

use crate::error::{CommandRejected, RejectReason};

/// Commands the agent may run.
pub const ALLOWED_COMMANDS: &[&str] = &[
    "cat", "head", "tail", "ls", "find", "tree", "file", "stat", "grep", "sed", "awk", "cut", "tr",
    "sort", "uniq", "wc", "diff", "cp", "mv", "rm", "mkdir", "touch", "chmod", "echo", "printf",
    "cd", "pwd", "git", "python", "python3", "pytest", "node", "npm",
];

/// Git subcommands that only touch the working tree or the local repository.
pub const ALLOWED_GIT_SUBCOMMANDS: &[&str] = &[
    "status", "diff", "log", "show", "add", "commit", "checkout", "restore", "reset", "init",
    "branch", "stash", "rm", "mv", "blame", "grep", "ls-files", "rev-parse",
];

const FORBIDDEN_FIND_ACTIONS: &[&str] = &[
    "-exec", "-execdir", "-ok", "-okdir", "-delete", "-fprint", "-fprint0", "-fprintf", "-fls",
];

const FORBIDDEN_AWK_TOKENS: &[&str] = &["system", "getline", "|", ">>", "> \"", ">\"", "close("];

/// A single argument after quote removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub value: String,
    /// Contains unquoted glob characters and should be expanded.
    #[serde(default)]
    pub glob: bool,
}

impl Argument {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            glob: false,
        }
    }
}

/// Stdout redirection target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub target: String,
    pub append: bool,
}

/// A validated command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    raw: String,
    program: String,
    args: Vec<Argument>,
    redirect: Option<Redirect>,
    heredoc: Option<String>,
}

impl ParsedCommand {
    /// Builds a command that skips the whitelist. Test-only: every command
    /// that reaches a sandbox outside tests goes through [`CommandFilter`].
    #[cfg(test)]
    pub(crate) fn trusted<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<Argument> = args.into_iter().map(|a| Argument::literal(a)).collect();
        let raw = std::iter::once(program.to_string())
            .chain(args.iter().map(|a| a.value.clone()))
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            raw,
            program: program.to_string(),
            args,
            redirect: None,
            heredoc: None,
        }
    }

    /// The command exactly as submitted.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[Argument] {
        &self.args
    }

    pub fn arg_values(&self) -> Vec<&str> {
        self.args.iter().map(|a| a.value.as_str()).collect()
    }

    pub fn redirect(&self) -> Option<&Redirect> {
        self.redirect.as_ref()
    }

    pub fn heredoc(&self) -> Option<&str> {
        self.heredoc.as_deref()
    }

    /// `cd` and `pwd` are handled by the sandbox itself.
    pub fn is_builtin(&self) -> bool {
        matches!(self.program.as_str(), "cd" | "pwd")
    }
}

impl std::fmt::Display for ParsedCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Validates command strings against the allow-list.
#[derive(Debug, Clone)]
pub struct CommandFilter {
    allowed: Vec<String>,
}

impl Default for CommandFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandFilter {
    pub fn new() -> Self {
        Self {
            allowed: ALLOWED_COMMANDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Restricts the allow-list further. Names outside [`ALLOWED_COMMANDS`]
    /// are ignored.
    pub fn with_allowed(mut self, names: &[&str]) -> Self {
        self.allowed = names
            .iter()
            .filter(|n| ALLOWED_COMMANDS.contains(n))
            .map(|s| s.to_string())
            .collect();
        self
    }

    pub fn is_allowed(&self, program: &str) -> bool {
        self.allowed.iter().any(|a| a == program)
    }

    /// Parses and validates one command string.
    pub fn validate(&self, command: &str) -> Result<ParsedCommand, CommandRejected> {
        let reject = |reason: RejectReason, message: String| {
            Err(CommandRejected::new(command, reason, message))
        };

        if command.trim().is_empty() {
            return reject(RejectReason::Empty, "empty command".to_string());
        }
        if command.contains('\0') {
            return reject(RejectReason::Metacharacter, "NUL byte in command".to_string());
        }

        let lexed = tokenize(command).map_err(|(reason, msg)| CommandRejected::new(command, reason, msg))?;

        let mut words = Vec::new();
        let mut redirect = None;
        let mut heredoc_delim: Option<(String, bool)> = None;
        let mut iter = lexed.tokens.into_iter();
        while let Some(token) = iter.next() {
            match token {
                Token::Word(word) => words.push(word),
                Token::RedirectOut { append } => {
                    if redirect.is_some() {
                        return reject(RejectReason::Grammar, "only one output redirect is supported".to_string());
                    }
                    match iter.next() {
                        Some(Token::Word(target)) if !target.text.is_empty() => {
                            redirect = Some((target, append));
                        }
                        _ => return reject(RejectReason::Grammar, "redirect without a target".to_string()),
                    }
                }
                Token::Heredoc { strip_tabs } => {
                    if heredoc_delim.is_some() {
                        return reject(RejectReason::Grammar, "only one heredoc is supported".to_string());
                    }
                    match iter.next() {
                        Some(Token::Word(delim)) if !delim.text.is_empty() => {
                            heredoc_delim = Some((delim.text, strip_tabs));
                        }
                        _ => return reject(RejectReason::Grammar, "heredoc without a delimiter".to_string()),
                    }
                }
            }
        }

        let heredoc = match (heredoc_delim, lexed.rest) {
            (Some((delim, strip_tabs)), Some(rest)) => {
                Some(read_heredoc_body(&rest, &delim, strip_tabs).map_err(|(reason, msg)| {
                    CommandRejected::new(command, reason, msg)
                })?)
            }
            (Some(_), None) => {
                return reject(RejectReason::Grammar, "unterminated heredoc".to_string());
            }
            (None, _) => None,
        };

        if words.is_empty() {
            return reject(RejectReason::Empty, "no command name".to_string());
        }
        let program_word = words.remove(0);
        let program = program_word.text;
        if program.contains('/') {
            return reject(
                RejectReason::NotAllowed,
                format!("'{}' must be invoked by name, not by path", program),
            );
        }
        if !self.is_allowed(&program) {
            return reject(RejectReason::NotAllowed, format!("'{}' is not an allowed command", program));
        }
        for word in &words {
            if word.tilde {
                return reject(
                    RejectReason::HomeDirectory,
                    format!("home directory reference '{}'", word.text),
                );
            }
        }

        let args: Vec<Argument> = words
            .into_iter()
            .map(|w| Argument {
                value: w.text,
                glob: w.glob,
            })
            .collect();

        let redirect = match redirect {
            Some((target, append)) => {
                if target.tilde {
                    return reject(
                        RejectReason::HomeDirectory,
                        format!("home directory reference '{}'", target.text),
                    );
                }
                check_path(&target.text, false).map_err(|(reason, msg)| {
                    CommandRejected::new(command, reason, format!("redirect target: {}", msg))
                })?;
                Some(Redirect {
                    target: target.text,
                    append,
                })
            }
            None => None,
        };

        if heredoc.is_some() && program != "cat" {
            return reject(RejectReason::Grammar, "heredoc input is only supported for cat".to_string());
        }

        let roles = argument_roles(&program, &args)
            .map_err(|(reason, msg)| CommandRejected::new(command, reason, msg))?;
        for (arg, role) in args.iter().zip(roles.iter()) {
            let result = match role {
                Role::Path => check_path(&arg.value, program == "cd"),
                Role::Option => check_option(&arg.value),
                Role::Text => check_text(&arg.value),
                Role::Pattern => Ok(()),
            };
            result.map_err(|(reason, msg)| CommandRejected::new(command, reason, msg))?;
        }

        check_grammar(&program, &args, &roles)
            .map_err(|(reason, msg)| CommandRejected::new(command, reason, msg))?;

        Ok(ParsedCommand {
            raw: command.to_string(),
            program,
            args,
            redirect,
            heredoc,
        })
    }
}

type Rejection = (RejectReason, String);

fn meta(msg: &str) -> Rejection {
    (RejectReason::Metacharacter, msg.to_string())
}

fn grammar(msg: impl Into<String>) -> Rejection {
    (RejectReason::Grammar, msg.into())
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Word {
    text: String,
    quoted: bool,
    glob: bool,
    tilde: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(Word),
    RedirectOut { append: bool },
    Heredoc { strip_tabs: bool },
}

struct Lexed {
    tokens: Vec<Token>,
    /// Text after the first unquoted newline, present only when a heredoc
    /// operator was seen on the command line.
    rest: Option<String>,
}

fn tokenize(input: &str) -> Result<Lexed, Rejection> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut current: Option<Word> = None;
    let mut saw_heredoc = false;
    let mut i = 0;

    fn flush(current: &mut Option<Word>, tokens: &mut Vec<Token>) {
        if let Some(word) = current.take() {
            tokens.push(Token::Word(word));
        }
    }

    while i < chars.len() {
        let (byte_idx, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);
        match c {
            ' ' | '\t' => {
                flush(&mut current, &mut tokens);
                i += 1;
            }
            '\n' | '\r' => {
                if saw_heredoc {
                    flush(&mut current, &mut tokens);
                    let body_start = if c == '\r' && next == Some('\n') {
                        byte_idx + 2
                    } else {
                        byte_idx + 1
                    };
                    return Ok(Lexed {
                        tokens,
                        rest: Some(input[body_start..].to_string()),
                    });
                }
                return Err(meta("newline separates multiple commands"));
            }
            ';' => return Err(meta("';' command chaining is not allowed")),
            '&' => return Err(meta("'&' chaining or backgrounding is not allowed")),
            '|' => return Err(meta("pipes are not supported")),
            '`' => return Err(meta("backtick command substitution is not allowed")),
            '(' | ')' => return Err(meta("subshells are not allowed")),
            '#' if current.is_none() => {
                // Comment runs to end of line.
                while i < chars.len() && chars[i].1 != '\n' {
                    i += 1;
                }
            }
            '$' => {
                if next.is_some_and(|n| n == '(' || n == '{' || n == '_' || n.is_alphanumeric()) {
                    return Err(meta("variable expansion and command substitution are not allowed"));
                }
                current.get_or_insert_with(Word::default).text.push('$');
                i += 1;
            }
            '>' => {
                if let Some(word) = &current {
                    if !word.quoted && !word.text.is_empty() && word.text.chars().all(|d| d.is_ascii_digit()) {
                        return Err(meta("file-descriptor redirection is not allowed"));
                    }
                }
                flush(&mut current, &mut tokens);
                let append = next == Some('>');
                i += if append { 2 } else { 1 };
                if chars.get(i).is_some_and(|(_, c)| *c == '>') {
                    return Err(grammar("malformed redirect"));
                }
                tokens.push(Token::RedirectOut { append });
            }
            '<' => {
                if next != Some('<') {
                    return Err(meta("input redirection is not allowed"));
                }
                if chars.get(i + 2).is_some_and(|(_, c)| *c == '<') {
                    return Err(meta("here-strings are not allowed"));
                }
                flush(&mut current, &mut tokens);
                let strip_tabs = chars.get(i + 2).is_some_and(|(_, c)| *c == '-');
                i += if strip_tabs { 3 } else { 2 };
                saw_heredoc = true;
                tokens.push(Token::Heredoc { strip_tabs });
            }
            '\\' => {
                let word = current.get_or_insert_with(Word::default);
                word.quoted = true;
                match next {
                    Some('\n') => {}
                    Some(n) => word.text.push(n),
                    None => word.text.push('\\'),
                }
                i += 2;
            }
            '\'' => {
                let word = current.get_or_insert_with(Word::default);
                word.quoted = true;
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        Some((_, '\'')) => break,
                        Some((_, ch)) => word.text.push(*ch),
                        None => return Err(grammar("unterminated single quote")),
                    }
                    j += 1;
                }
                i = j + 1;
            }
            '"' => {
                let word = current.get_or_insert_with(Word::default);
                word.quoted = true;
                let mut j = i + 1;
                loop {
                    let Some((_, ch)) = chars.get(j).copied() else {
                        return Err(grammar("unterminated double quote"));
                    };
                    let after = chars.get(j + 1).map(|(_, c)| *c);
                    match ch {
                        '"' => break,
                        '\\' if matches!(after, Some('"' | '\\' | '$' | '`')) => {
                            if let Some(a) = after {
                                word.text.push(a);
                            }
                            j += 2;
                            continue;
                        }
                        '`' => return Err(meta("backtick command substitution is not allowed")),
                        '$' if after.is_some_and(|n| n == '(' || n == '{' || n == '_' || n.is_alphanumeric()) => {
                            return Err(meta("variable expansion and command substitution are not allowed"));
                        }
                        _ => word.text.push(ch),
                    }
                    j += 1;
                }
                i = j + 1;
            }
            '*' | '?' | '[' => {
                let word = current.get_or_insert_with(Word::default);
                word.glob = true;
                word.text.push(c);
                i += 1;
            }
            '~' => {
                let word = current.get_or_insert_with(Word::default);
                if word.text.is_empty() && !word.quoted {
                    word.tilde = true;
                }
                word.text.push('~');
                i += 1;
            }
            _ => {
                current.get_or_insert_with(Word::default).text.push(c);
                i += 1;
            }
        }
    }
    flush(&mut current, &mut tokens);
    Ok(Lexed { tokens, rest: None })
}

fn read_heredoc_body(rest: &str, delim: &str, strip_tabs: bool) -> Result<String, Rejection> {
    let mut body = String::new();
    let mut lines = rest.split('\n');
    let mut terminated = false;
    for line in lines.by_ref() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let candidate = if strip_tabs { line.trim_start_matches('\t') } else { line };
        if candidate == delim {
            terminated = true;
            break;
        }
        body.push_str(candidate);
        body.push('\n');
    }
    if !terminated {
        return Err(grammar(format!("heredoc is missing its '{}' terminator", delim)));
    }
    if lines.any(|l| !l.trim().is_empty()) {
        return Err(meta("text after the heredoc terminator is a second command"));
    }
    Ok(body)
}

/// How an argument is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// A filesystem path: no absolute paths, `~` or `..` segments.
    Path,
    /// An option flag; `--opt=value` values are path-checked.
    Option,
    /// Free text (echo, commit messages); rejected only if it looks like an
    /// absolute or parent path.
    Text,
    /// A regex, sed script, awk program or inline code.
    Pattern,
}

fn is_option(value: &str) -> bool {
    value.len() > 1 && value.starts_with('-')
}

/// Assigns a role to every argument of `program`.
fn argument_roles(program: &str, args: &[Argument]) -> Result<Vec<Role>, Rejection> {
    let values: Vec<&str> = args.iter().map(|a| a.value.as_str()).collect();
    let mut roles = vec![Role::Path; values.len()];

    match program {
        "echo" | "printf" | "tr" => {
            for (i, v) in values.iter().enumerate() {
                roles[i] = if is_option(v) && program != "printf" { Role::Option } else { Role::Text };
            }
        }
        "grep" | "sed" | "awk" => {
            let mut pattern_given = false;
            let mut options_done = false;
            let mut i = 0;
            while i < values.len() {
                let v = values[i];
                if !options_done && v == "--" {
                    roles[i] = Role::Option;
                    options_done = true;
                } else if !options_done && is_option(v) {
                    roles[i] = Role::Option;
                    if program == "grep" {
                        if let Some(attached) = grep_pattern_file(v) {
                            pattern_given = true;
                            match attached {
                                Some(path) => check_path(path, false)?,
                                None if i + 1 < values.len() => {
                                    roles[i + 1] = Role::Path;
                                    i += 1;
                                }
                                None => {}
                            }
                            i += 1;
                            continue;
                        }
                    }
                    if program == "awk" && !is_allowed_awk_option(v) {
                        return Err(grammar(format!("awk option '{}' is not supported", v)));
                    }
                    let takes_pattern = matches!((program, v), ("grep" | "sed", "-e") | ("grep", "--regexp") | ("awk", "-v"));
                    let takes_value = matches!(
                        (program, v),
                        ("grep", "-A" | "-B" | "-C" | "-m" | "--max-count") | ("awk", "-F")
                    );
                    if matches!((program, v), ("sed" | "awk", "-f")) {
                        return Err(grammar(format!("{} scripts must be given inline", program)));
                    }
                    if takes_pattern && i + 1 < values.len() {
                        if v != "-v" {
                            pattern_given = true;
                        }
                        roles[i + 1] = Role::Pattern;
                        i += 1;
                    } else if takes_value && i + 1 < values.len() {
                        roles[i + 1] = Role::Pattern;
                        i += 1;
                    }
                } else if !pattern_given {
                    roles[i] = Role::Pattern;
                    pattern_given = true;
                } else {
                    roles[i] = Role::Path;
                }
                i += 1;
            }
        }
        "cut" | "sort" => {
            let mut i = 0;
            while i < values.len() {
                if is_option(values[i]) {
                    roles[i] = Role::Option;
                    if matches!(values[i], "-d" | "-t") && i + 1 < values.len() {
                        roles[i + 1] = Role::Pattern;
                        i += 1;
                    }
                }
                i += 1;
            }
        }
        "find" => {
            let mut in_expression = false;
            for (i, v) in values.iter().enumerate() {
                if v.starts_with('-') || *v == "!" {
                    in_expression = true;
                }
                roles[i] = if in_expression { Role::Pattern } else { Role::Path };
            }
        }
        "python" | "python3" | "node" => {
            let mut i = 0;
            while i < values.len() {
                let v = values[i];
                if matches!(v, "-c" | "-e" | "--eval" | "-p" | "--print") {
                    roles[i] = Role::Option;
                    for role in roles.iter_mut().skip(i + 1) {
                        *role = Role::Pattern;
                    }
                    break;
                }
                if v == "-m" {
                    roles[i] = Role::Option;
                    if i + 1 < values.len() {
                        roles[i + 1] = Role::Pattern;
                        i += 1;
                    }
                } else if is_option(v) {
                    roles[i] = Role::Option;
                }
                i += 1;
            }
        }
        "git" => {
            let mut i = 0;
            while i < values.len() {
                let v = values[i];
                if i == 0 {
                    roles[i] = Role::Pattern;
                } else if matches!(v, "-m" | "--message") {
                    roles[i] = Role::Option;
                    if i + 1 < values.len() {
                        roles[i + 1] = Role::Text;
                        i += 1;
                    }
                } else if is_option(v) {
                    roles[i] = Role::Option;
                }
                i += 1;
            }
        }
        "npm" => roles.iter_mut().for_each(|r| *r = Role::Text),
        "chmod" => {
            let mut mode_seen = false;
            for (i, v) in values.iter().enumerate() {
                if matches!(*v, "-R" | "-v" | "-c" | "-f" | "--recursive") {
                    roles[i] = Role::Option;
                } else if !mode_seen {
                    roles[i] = Role::Pattern;
                    mode_seen = true;
                }
            }
        }
        _ => {
            let mut options_done = false;
            for (i, v) in values.iter().enumerate() {
                if !options_done && *v == "--" {
                    roles[i] = Role::Option;
                    options_done = true;
                } else if !options_done && is_option(v) {
                    roles[i] = Role::Option;
                }
            }
        }
    }
    Ok(roles)
}

/// Detects grep's pattern-file option (`-f FILE`, `-fFILE`, `-rf FILE`,
/// `--file FILE`, `--file=FILE`). The inner option is the attached file, if any.
fn grep_pattern_file(option: &str) -> Option<Option<&str>> {
    if option == "--file" {
        return Some(None);
    }
    if let Some(path) = option.strip_prefix("--file=") {
        return Some(Some(path));
    }
    if option.starts_with("--") {
        return None;
    }
    let cluster = &option[1..];
    for (idx, c) in cluster.char_indices() {
        if c == 'f' {
            let rest = &cluster[idx + 1..];
            return Some((!rest.is_empty()).then_some(rest));
        }
        // The rest of the cluster is this option's value.
        if "ABCDdem".contains(c) {
            return None;
        }
    }
    None
}

fn is_allowed_awk_option(option: &str) -> bool {
    option == "--" || option.starts_with("-F") || option.starts_with("-v")
}

/// True when a `print`/`printf` statement redirects its output, i.e. has
/// a `>` outside parentheses and string literals.
fn awk_print_redirects(program: &str) -> bool {
    let mut code = String::with_capacity(program.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in program.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                code.push('_');
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else {
            code.push(c);
        }
    }
    code.split(|c| matches!(c, '{' | '}' | ';' | '\n'))
        .filter_map(print_statement_tail)
        .any(|tail| {
            let mut depth = 0i32;
            tail.chars().any(|c| {
                match c {
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    _ => {}
                }
                c == '>' && depth <= 0
            })
        })
}

fn print_statement_tail(statement: &str) -> Option<&str> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    for (idx, _) in statement.match_indices("print") {
        if statement[..idx].chars().next_back().is_some_and(is_word) {
            continue;
        }
        let rest = &statement[idx + "print".len()..];
        let rest = rest.strip_prefix('f').unwrap_or(rest);
        if rest.chars().next().is_some_and(is_word) {
            continue;
        }
        return Some(rest);
    }
    None
}

/// Rejects absolute paths, home references and parent traversal.
///
/// `allow_parent` permits exactly `..` (used by `cd`; the sandbox clamps it).
pub fn check_path(path: &str, allow_parent: bool) -> Result<(), (RejectReason, String)> {
    if path.starts_with('/') {
        return Err((RejectReason::AbsolutePath, format!("absolute path '{}'", path)));
    }
    if path.starts_with('~') {
        return Err((RejectReason::HomeDirectory, format!("home directory reference '{}'", path)));
    }
    if allow_parent && path == ".." {
        return Ok(());
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err((RejectReason::Traversal, format!("parent directory traversal in '{}'", path)));
    }
    Ok(())
}

fn check_option(option: &str) -> Result<(), Rejection> {
    match option.split_once('=') {
        Some((_, value)) if !value.is_empty() => check_path(value, false),
        _ => Ok(()),
    }
}

fn check_text(text: &str) -> Result<(), Rejection> {
    if text.starts_with('/') {
        return Err((RejectReason::AbsolutePath, format!("absolute path '{}'", text)));
    }
    if text == ".." || text.starts_with("../") {
        return Err((RejectReason::Traversal, format!("parent directory traversal in '{}'", text)));
    }
    Ok(())
}

fn check_grammar(program: &str, args: &[Argument], roles: &[Role]) -> Result<(), Rejection> {
    let values: Vec<&str> = args.iter().map(|a| a.value.as_str()).collect();
    let operands: Vec<&str> = values
        .iter()
        .zip(roles)
        .filter(|(_, r)| **r != Role::Option)
        .map(|(v, _)| *v)
        .collect();

    match program {
        "pwd" => {
            if !values.is_empty() {
                return Err(grammar("pwd takes no arguments"));
            }
        }
        "cd" => {
            if values.len() > 1 || values.iter().any(|v| is_option(v)) {
                return Err(grammar("cd takes at most one directory"));
            }
        }
        "sed" => {
            let scripts: Vec<&str> = values
                .iter()
                .zip(roles)
                .filter(|(_, r)| **r == Role::Pattern)
                .map(|(v, _)| *v)
                .collect();
            if scripts.is_empty() {
                return Err(grammar("sed requires a script"));
            }
            for script in scripts {
                validate_sed_script(script)?;
            }
            for option in values.iter().zip(roles).filter(|(_, r)| **r == Role::Option).map(|(v, _)| *v) {
                if !is_allowed_sed_option(option) {
                    return Err(grammar(format!("sed option '{}' is not supported", option)));
                }
            }
        }
        "awk" => {
            let programs: Vec<&str> = values
                .iter()
                .zip(roles)
                .filter(|(_, r)| **r == Role::Pattern)
                .map(|(v, _)| *v)
                .collect();
            if programs.is_empty() {
                return Err(grammar("awk requires a program"));
            }
            for text in programs {
                if let Some(token) = FORBIDDEN_AWK_TOKENS.iter().find(|t| text.contains(*t)) {
                    return Err(grammar(format!("awk program may not use '{}'", token.trim())));
                }
                if awk_print_redirects(text) {
                    return Err(grammar("awk output redirection is not allowed"));
                }
            }
        }
        "find" => {
            if let Some(action) = values.iter().find(|v| FORBIDDEN_FIND_ACTIONS.contains(*v)) {
                return Err(grammar(format!("find action '{}' is not allowed", action)));
            }
        }
        "git" => {
            let Some(sub) = values.first() else {
                return Err(grammar("git requires a subcommand"));
            };
            if !ALLOWED_GIT_SUBCOMMANDS.contains(sub) {
                return Err(grammar(format!("git subcommand '{}' is not allowed", sub)));
            }
            if values.iter().any(|v| {
                v.starts_with("--exec") || v.starts_with("--upload-pack") || v.starts_with("--receive-pack")
            }) {
                return Err(grammar("git helper program options are not allowed"));
            }
        }
        "npm" => match values.first().copied() {
            Some("test") | Some("ls") => {}
            Some("run") if values.len() >= 2 => {}
            _ => return Err(grammar("npm supports only 'test', 'run <script>' and 'ls'")),
        },
        "chmod" => {
            let Some(mode) = operands.first() else {
                return Err(grammar("chmod requires a mode"));
            };
            if !is_valid_chmod_mode(mode) {
                return Err(grammar(format!("invalid chmod mode '{}'", mode)));
            }
            if operands.len() < 2 {
                return Err(grammar("chmod requires at least one file"));
            }
        }
        "cp" | "mv" => {
            if operands.len() < 2 {
                return Err(grammar(format!("{} requires a source and a destination", program)));
            }
        }
        "rm" | "mkdir" | "touch" => {
            if operands.is_empty() {
                return Err(grammar(format!("{} requires at least one path", program)));
            }
        }
        _ => {}
    }
    Ok(())
}

fn is_allowed_sed_option(option: &str) -> bool {
    if option.starts_with("-i") {
        return !option.contains('/');
    }
    if matches!(
        option,
        "--in-place" | "--quiet" | "--silent" | "--regexp-extended" | "--expression" | "--"
    ) {
        return true;
    }
    option.starts_with('-')
        && !option.starts_with("--")
        && option[1..].chars().all(|c| "nErsize".contains(c))
        && !(option.contains('e') && option.len() > 2)
}

/// Accepts `s<d>regex<d>replacement<d>[flags]`, `[addr]p`, `[addr]d`,
/// and `/regex/p|d`.
pub fn validate_sed_script(script: &str) -> Result<(), (RejectReason, String)> {
    let script = script.trim();
    if let Some(rest) = script.strip_prefix('s') {
        let mut chars = rest.chars();
        let Some(delim) = chars.next() else {
            return Err(grammar("sed substitution is missing its delimiter"));
        };
        if delim.is_alphanumeric() || delim == '\\' || delim == '\n' || delim == ' ' {
            return Err(grammar(format!("invalid sed delimiter '{}'", delim)));
        }
        let mut parts: Vec<String> = vec![String::new()];
        let mut escaped = false;
        for c in chars {
            if escaped {
                if let Some(last) = parts.last_mut() {
                    last.push('\\');
                    last.push(c);
                }
                escaped = false;
                continue;
            }
            if c == '\\' {
                escaped = true;
                continue;
            }
            if c == delim {
                parts.push(String::new());
                continue;
            }
            if let Some(last) = parts.last_mut() {
                last.push(c);
            }
        }
        if parts.len() != 3 {
            return Err(grammar(format!(
                "sed substitution must look like s{d}pattern{d}replacement{d}[flags]",
                d = delim
            )));
        }
        let flags = &parts[2];
        if !flags.chars().all(|c| "gipI".contains(c) || c.is_ascii_digit()) {
            return Err(grammar(format!("unsupported sed flags '{}'", flags)));
        }
        return Ok(());
    }

    let address = regex_lite_address(script);
    if address {
        return Ok(());
    }
    Err(grammar(format!(
        "sed script '{}' must be a substitution (s/…/…/) or a print/delete command",
        script
    )))
}

fn regex_lite_address(script: &str) -> bool {
    let Some(cmd) = script.chars().last() else {
        return false;
    };
    if cmd != 'p' && cmd != 'd' {
        return false;
    }
    let address = &script[..script.len() - 1];
    if address.is_empty() {
        return true;
    }
    if address.len() >= 2 && address.starts_with('/') && address.ends_with('/') {
        return !address[1..address.len() - 1].contains('/');
    }
    address
        .split(',')
        .all(|part| !part.is_empty() && (part == "$" || part.chars().all(|c| c.is_ascii_digit())))
        && address.split(',').count() <= 2
}

fn is_valid_chmod_mode(mode: &str) -> bool {
    let octal = (3..=4).contains(&mode.len()) && mode.chars().all(|c| ('0'..='7').contains(&c));
    if octal {
        return true;
    }
    mode.split(',').all(|clause| {
        let who_len = clause.chars().take_while(|c| "ugoa".contains(*c)).count();
        let rest = &clause[who_len..];
        let mut chars = rest.chars();
        matches!(chars.next(), Some('+' | '-' | '='))
            && {
                let perms: String = chars.collect();
                !perms.is_empty() && perms.chars().all(|c| "rwxXst".contains(c))
            }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(cmd: &str) -> ParsedCommand {
        CommandFilter::new()
            .validate(cmd)
            .unwrap_or_else(|e| panic!("'{}' should be accepted: {}", cmd, e))
    }

    fn rejected(cmd: &str) -> RejectReason {
        match CommandFilter::new().validate(cmd) {
            Ok(parsed) => panic!("'{}' should be rejected, parsed as {:?}", cmd, parsed),
            Err(e) => e.reason,
        }
    }

    // --- allow-list ---

    #[test]
    fn test_allowed_commands_parse() {
        for cmd in [
            "cat main.py",
            "head -n 20 main.py",
            "tail -5 main.py",
            "ls -la",
            "ls",
            "find . -name '*.py'",
            "tree",
            "file main.py",
            "stat main.py",
            "grep -n 'range(n)' main.py",
            "sed -n '1,10p' main.py",
            "awk '{print NR\": \"$0}' main.py",
            "cut -d ',' -f 1 data.csv",
            "tr a-z A-Z",
            "sort -t ':' -k 2 notes.txt",
            "uniq notes.txt",
            "wc -l main.py",
            "diff main.py main.py.bak",
            "cp main.py main.py.bak",
            "mv notes.txt docs/notes.txt",
            "rm -f main.py.bak",
            "mkdir -p docs/api",
            "touch docs/README.md",
            "chmod 644 main.py",
            "chmod u+x run.py",
            "echo hello > notes.txt",
            "printf 'a\\n' >> notes.txt",
            "cd docs",
            "cd ..",
            "pwd",
            "git status",
            "git commit -m 'fix off by one'",
            "python3 -m pytest -q",
            "python -c 'print(1/2)'",
            "pytest test_main.py",
            "node test_utils.js",
            "npm test",
        ] {
            accepted(cmd);
        }
    }

    #[test]
    fn test_unknown_commands_rejected() {
        assert_eq!(rejected("curl http://example.com"), RejectReason::NotAllowed);
        assert_eq!(rejected("bash -c ls"), RejectReason::NotAllowed);
        assert_eq!(rejected("sudo cat main.py"), RejectReason::NotAllowed);
        assert_eq!(rejected("/bin/cat main.py"), RejectReason::NotAllowed);
        assert_eq!(rejected("./run.sh"), RejectReason::NotAllowed);
    }

    #[test]
    fn test_restricted_filter() {
        let filter = CommandFilter::new().with_allowed(&["cat", "ls", "bash"]);
        assert!(filter.validate("cat main.py").is_ok());
        assert!(filter.validate("grep x main.py").is_err());
        assert!(!filter.is_allowed("bash"));
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(rejected(""), RejectReason::Empty);
        assert_eq!(rejected("   "), RejectReason::Empty);
        assert_eq!(rejected("> out.txt"), RejectReason::Empty);
    }

    // --- paths ---

    #[test]
    fn test_absolute_paths_rejected() {
        assert_eq!(rejected("rm -rf /"), RejectReason::AbsolutePath);
        assert_eq!(rejected("cat /etc/passwd"), RejectReason::AbsolutePath);
        assert_eq!(rejected("echo hi > /tmp/x"), RejectReason::AbsolutePath);
        assert_eq!(rejected("cp main.py /tmp/main.py"), RejectReason::AbsolutePath);
        assert_eq!(rejected("ls --directory=/etc"), RejectReason::AbsolutePath);
        assert_eq!(rejected("echo /etc/passwd"), RejectReason::AbsolutePath);
    }

    #[test]
    fn test_traversal_rejected() {
        assert_eq!(rejected("cat ../secret"), RejectReason::Traversal);
        assert_eq!(rejected("cat docs/../../secret"), RejectReason::Traversal);
        assert_eq!(rejected("cd ../.."), RejectReason::Traversal);
        assert_eq!(rejected("cd ../other"), RejectReason::Traversal);
        assert_eq!(rejected("echo x > ../out.txt"), RejectReason::Traversal);
        assert_eq!(rejected("ls .."), RejectReason::Traversal);
    }

    #[test]
    fn test_home_rejected() {
        assert_eq!(rejected("cat ~/.ssh/id_rsa"), RejectReason::HomeDirectory);
        assert_eq!(rejected("cd ~"), RejectReason::HomeDirectory);
        assert_eq!(rejected("echo hi > ~/x"), RejectReason::HomeDirectory);
    }

    #[test]
    fn test_quoted_tilde_is_literal() {
        let parsed = accepted("grep '~' main.py");
        assert_eq!(parsed.arg_values(), vec!["~", "main.py"]);
    }

    #[test]
    fn test_check_path() {
        assert!(check_path("src/main.py", false).is_ok());
        assert!(check_path("a..b", false).is_ok());
        assert!(check_path("..", true).is_ok());
        assert!(check_path("..", false).is_err());
        assert!(check_path("../x", true).is_err());
    }

    // --- metacharacters ---

    #[test]
    fn test_chaining_rejected() {
        for cmd in [
            "cat main.py; rm main.py",
            "cat main.py && rm main.py",
            "cat main.py || true",
            "cat main.py | grep def",
            "sleep 100 &",
            "echo `id`",
            "echo $(id)",
            "echo \"$(id)\"",
            "echo $HOME",
            "echo ${PATH}",
            "cat < main.py",
            "cat <<< hi",
            "(cat main.py)",
            "cat main.py\nrm main.py",
            "cat main.py 2> err.txt",
        ] {
            assert_eq!(rejected(cmd), RejectReason::Metacharacter, "{}", cmd);
        }
    }

    #[test]
    fn test_quoted_metacharacters_are_literal() {
        let parsed = accepted("grep 'a;b|c&d' main.py");
        assert_eq!(parsed.arg_values()[0], "a;b|c&d");
        let parsed = accepted("echo \"cost: 5$\"");
        assert_eq!(parsed.arg_values(), vec!["cost: 5$"]);
    }

    #[test]
    fn test_unterminated_quote_rejected() {
        assert_eq!(rejected("echo 'oops"), RejectReason::Grammar);
        assert_eq!(rejected("echo \"oops"), RejectReason::Grammar);
    }

    // --- tokenizer ---

    #[test]
    fn test_quote_and_escape_handling() {
        let parsed = accepted(r#"echo "a \"quoted\" word" 'single $x' plain\ space"#);
        assert_eq!(
            parsed.arg_values(),
            vec!["a \"quoted\" word", "single $x", "plain space"]
        );
    }

    #[test]
    fn test_redirect_parsing() {
        let parsed = accepted("echo hello >> notes.txt");
        assert_eq!(parsed.program(), "echo");
        assert_eq!(parsed.arg_values(), vec!["hello"]);
        assert_eq!(
            parsed.redirect(),
            Some(&Redirect {
                target: "notes.txt".to_string(),
                append: true
            })
        );

        let parsed = accepted("echo hello>notes.txt");
        assert_eq!(parsed.redirect().map(|r| r.append), Some(false));
        assert_eq!(rejected("echo hi >"), RejectReason::Grammar);
        assert_eq!(rejected("echo a > x > y"), RejectReason::Grammar);
    }

    #[test]
    fn test_glob_flag() {
        let parsed = accepted("ls *.py 'lit*'");
        assert!(parsed.args()[0].glob);
        assert!(!parsed.args()[1].glob);
    }

    #[test]
    fn test_comment_ignored() {
        let parsed = accepted("ls -la # list everything");
        assert_eq!(parsed.arg_values(), vec!["-la"]);
    }

    // --- heredoc ---

    #[test]
    fn test_heredoc_body() {
        let parsed = accepted("cat > notes.txt <<EOF\nline one\nline $two\nEOF");
        assert_eq!(parsed.heredoc(), Some("line one\nline $two\n"));
        assert_eq!(parsed.redirect().map(|r| r.target.as_str()), Some("notes.txt"));
    }

    #[test]
    fn test_heredoc_quoted_delimiter_and_tabs() {
        let parsed = accepted("cat <<-'END' > a.txt\n\tindented\n\tEND\n");
        assert_eq!(parsed.heredoc(), Some("indented\n"));
    }

    #[test]
    fn test_heredoc_errors() {
        assert_eq!(rejected("cat > a.txt <<EOF\nno end"), RejectReason::Grammar);
        assert_eq!(
            rejected("cat > a.txt <<EOF\nbody\nEOF\nrm a.txt"),
            RejectReason::Metacharacter
        );
        assert_eq!(rejected("python3 <<EOF\nprint(1)\nEOF"), RejectReason::Grammar);
    }

    // --- per-command grammar ---

    #[test]
    fn test_sed_grammar() {
        accepted("sed -i 's/range(n)/range(n+1)/' main.py");
        accepted("sed -i.bak 's|a/b|c|g' main.py");
        accepted("sed -i -e 's/a/b/' -e 's/c/d/2' main.py");
        accepted("sed '3d' main.py");
        accepted("sed -n '/def/p' main.py");
        accepted("sed -n '$p' main.py");
        assert_eq!(rejected("sed -i 's/a/b' main.py"), RejectReason::Grammar);
        assert_eq!(rejected("sed -i 's/a/b/w out.txt' main.py"), RejectReason::Grammar);
        assert_eq!(rejected("sed 'e id' main.py"), RejectReason::Grammar);
        assert_eq!(rejected("sed -f script.sed main.py"), RejectReason::Grammar);
        assert_eq!(rejected("sed -i"), RejectReason::Grammar);
    }

    #[test]
    fn test_validate_sed_script() {
        assert!(validate_sed_script("s/x/y/g").is_ok());
        assert!(validate_sed_script("s#a\\#b#c#").is_ok());
        assert!(validate_sed_script("1,5p").is_ok());
        assert!(validate_sed_script("s/x/y/e").is_err());
        assert!(validate_sed_script("sxaxbx").is_err());
        assert!(validate_sed_script("1,2,3p").is_err());
    }

    #[test]
    fn test_awk_grammar() {
        accepted("awk -F ',' '{print $1}' data.csv");
        accepted("awk '$3 > 5 {print}' data.txt");
        assert_eq!(rejected("awk 'BEGIN {system(\"id\")}'"), RejectReason::Grammar);
        assert_eq!(rejected("awk '{print > \"out\"}' a.txt"), RejectReason::Grammar);
        assert_eq!(rejected("awk '{print | \"sh\"}' a.txt"), RejectReason::Grammar);
    }

    #[test]
    fn test_awk_redirect_to_variable_rejected() {
        assert_eq!(
            rejected("awk 'BEGIN{f=\"/tmp/x\"; print \"escaped\" > f}'"),
            RejectReason::Grammar
        );
        assert_eq!(rejected("awk '{printf(\"%s\", $1) > out}' a.txt"), RejectReason::Grammar);
        assert_eq!(rejected("awk '{print $1 > 3}' a.txt"), RejectReason::Grammar);
        assert_eq!(rejected("awk -f prog.awk a.txt"), RejectReason::Grammar);
        assert_eq!(rejected("awk -fprog.awk a.txt"), RejectReason::Grammar);
        accepted("awk '$1 > 3 {print $1}' data.txt");
        accepted("awk '{if ($2 >= 1) print}' data.txt");
        accepted("awk '{print ($1 > 2)}' data.txt");
        accepted("awk '{print \"a > b\"}' data.txt");
        accepted("awk -v limit=3 '$1 > limit' data.txt");
    }

    #[test]
    fn test_grep_pattern_file_is_a_path() {
        assert_eq!(rejected("grep -f /etc/hostname main.py"), RejectReason::AbsolutePath);
        assert_eq!(rejected("grep -f ../x main.py"), RejectReason::Traversal);
        assert_eq!(rejected("grep --file /etc/hostname main.py"), RejectReason::AbsolutePath);
        assert_eq!(rejected("grep --file=/etc/hostname main.py"), RejectReason::AbsolutePath);
        assert_eq!(rejected("grep -f/etc/hostname main.py"), RejectReason::AbsolutePath);
        assert_eq!(rejected("grep -rf ../x ."), RejectReason::Traversal);
        accepted("grep -f patterns.txt main.py");
        accepted("grep -nf patterns.txt main.py");
        accepted("grep -e foo -f patterns.txt main.py");
    }

    #[test]
    fn test_find_grammar() {
        accepted("find . -type f -name '*.py'");
        assert_eq!(rejected("find . -exec rm {} +"), RejectReason::Grammar);
        assert_eq!(rejected("find . -delete"), RejectReason::Grammar);
        assert_eq!(rejected("find / -name x"), RejectReason::AbsolutePath);
    }

    #[test]
    fn test_git_grammar() {
        accepted("git diff");
        accepted("git log --oneline -n 5");
        accepted("git show HEAD~1");
        assert_eq!(rejected("git push origin main"), RejectReason::Grammar);
        assert_eq!(rejected("git -c core.pager=id log"), RejectReason::Grammar);
        assert_eq!(rejected("git"), RejectReason::Grammar);
        assert_eq!(rejected("git diff --ext-diff --exec-path=x"), RejectReason::Grammar);
    }

    #[test]
    fn test_npm_grammar() {
        accepted("npm test");
        accepted("npm run lint");
        assert_eq!(rejected("npm install left-pad"), RejectReason::Grammar);
        assert_eq!(rejected("npm run"), RejectReason::Grammar);
    }

    #[test]
    fn test_chmod_grammar() {
        accepted("chmod -R 755 docs");
        accepted("chmod u+x,g-w run.py");
        assert_eq!(rejected("chmod 999 main.py"), RejectReason::Grammar);
        assert_eq!(rejected("chmod 644"), RejectReason::Grammar);
    }

    #[test]
    fn test_builtin_grammar() {
        assert!(accepted("cd docs").is_builtin());
        assert!(accepted("pwd").is_builtin());
        assert_eq!(rejected("pwd -P"), RejectReason::Grammar);
        assert_eq!(rejected("cd a b"), RejectReason::Grammar);
    }

    #[test]
    fn test_operand_counts() {
        assert_eq!(rejected("cp main.py"), RejectReason::Grammar);
        assert_eq!(rejected("rm -rf"), RejectReason::Grammar);
        assert_eq!(rejected("mkdir"), RejectReason::Grammar);
    }

    #[test]
    fn test_pattern_arguments_exempt_from_path_rules() {
        accepted("grep -rn '/api/' .");
        accepted("sed -i 's/\\/usr\\/bin/bin/' config.txt");
        accepted("python3 -c 'import os; print(os.getcwd())'");
    }

    #[test]
    fn test_trusted_command() {
        let cmd = ParsedCommand::trusted("python3", ["-m", "pytest"]);
        assert_eq!(cmd.raw(), "python3 -m pytest");
        assert_eq!(cmd.program(), "python3");
        assert!(cmd.redirect().is_none());
    }

    #[test]
    fn test_rejection_carries_command() {
        let err = CommandFilter::new().validate("rm -rf /").unwrap_err();
        assert_eq!(err.command, "rm -rf /");
        assert!(err.message.contains("absolute"));
    }
}
