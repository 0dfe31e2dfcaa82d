//! Per-command input/output transforms.
//!
//! A [`HookSet`] decides how submitted text is written to the subprocess
//! and how each captured output line is rewritten before it reaches the
//! sink. The [`HookRegistry`] picks one per session from the command string;
//! the choice never changes for the life of that session.

use crate::error::{SessionError, SessionResult};
use regex::bytes::Regex;
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Input and output transforms for one kind of subprocess.
pub trait Hooks: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Bytes written to stdin for a submitted line.
    fn encode_input(&self, text: &str) -> Vec<u8> {
        with_newline(text)
    }

    /// Bytes stored in the sink for one captured line (without its line break).
    fn rewrite_output<'a>(&self, line: &'a [u8]) -> Cow<'a, [u8]> {
        Cow::Borrowed(line)
    }
}

/// Shared, immutable hook selection for a session.
pub type HookSet = Arc<dyn Hooks>;

fn with_newline(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(b'\n');
    bytes
}

/// Pass-through hooks used when no registry entry matches.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityHooks;

impl Hooks for IdentityHooks {
    fn name(&self) -> &str {
        "identity"
    }
}

// ── pianobar ────────────────────────────────────────────────────────

/// A progress redraw: clear-line, the old status text, carriage return, clear-line.
/// Byte mode, so song metadata in a legacy encoding still matches `.`.
static PIANOBAR_REDRAW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u)\x1b\[2K.*\r\x1b\[2K").expect("pianobar redraw pattern is valid")
});

const CLEAR_LINE: &[u8] = b"\x1b[2K";
const CLEAR_LINE_BARE: &[u8] = b"[2K";

/// Hooks for the `pianobar` console client.
///
/// `s` (select station) is a single keystroke, not a line, so it is sent
/// without a newline. Output loses its redraw spans and the leading
/// clear-line sequence.
#[derive(Debug, Default, Clone, Copy)]
pub struct PianobarHooks;

impl Hooks for PianobarHooks {
    fn name(&self) -> &str {
        "pianobar"
    }

    fn encode_input(&self, text: &str) -> Vec<u8> {
        if text == "s" {
            debug!(input = text, "writing to pianobar without newline");
            text.as_bytes().to_vec()
        } else {
            with_newline(text)
        }
    }

    fn rewrite_output<'a>(&self, line: &'a [u8]) -> Cow<'a, [u8]> {
        let cleaned = PIANOBAR_REDRAW.replace_all(line, &b""[..]);
        let marker = if find(&cleaned, CLEAR_LINE).is_some() {
            CLEAR_LINE
        } else {
            CLEAR_LINE_BARE
        };
        match find(&cleaned, marker) {
            Some(pos) => {
                let mut out = Vec::with_capacity(cleaned.len() - marker.len());
                out.extend_from_slice(&cleaned[..pos]);
                out.extend_from_slice(&cleaned[pos + marker.len()..]);
                Cow::Owned(out)
            }
            None => cleaned,
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ── configured rules ────────────────────────────────────────────────

/// A `[[hooks]]` table from the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookRule {
    /// Substring of the command that activates this rule.
    #[serde(rename = "match")]
    pub matches: String,
    /// Inputs written to stdin without a trailing newline.
    #[serde(default)]
    pub raw_inputs: Vec<String>,
    /// Byte regexes removed from every captured line.
    #[serde(default)]
    pub strip: Vec<String>,
}

impl HookRule {
    /// Compile the rule's patterns.
    pub fn compile(&self) -> SessionResult<RuleHooks> {
        let strip = self
            .strip
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| SessionError::InvalidHook {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<SessionResult<Vec<_>>>()?;
        Ok(RuleHooks {
            name: self.matches.clone(),
            raw_inputs: self.raw_inputs.iter().cloned().collect(),
            strip,
        })
    }
}

/// Hooks built from a [`HookRule`].
#[derive(Debug)]
pub struct RuleHooks {
    name: String,
    raw_inputs: HashSet<String>,
    strip: Vec<Regex>,
}

impl Hooks for RuleHooks {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode_input(&self, text: &str) -> Vec<u8> {
        if self.raw_inputs.contains(text) {
            text.as_bytes().to_vec()
        } else {
            with_newline(text)
        }
    }

    fn rewrite_output<'a>(&self, line: &'a [u8]) -> Cow<'a, [u8]> {
        let mut current = Cow::Borrowed(line);
        for re in &self.strip {
            let replaced = match re.replace_all(&current, &b""[..]) {
                Cow::Owned(bytes) => Some(bytes),
                Cow::Borrowed(_) => None,
            };
            if let Some(bytes) = replaced {
                current = Cow::Owned(bytes);
            }
        }
        current
    }
}

// ── registry ────────────────────────────────────────────────────────

/// Ordered list of command-substring → hooks entries. First match wins.
#[derive(Debug, Clone)]
pub struct HookRegistry {
    entries: Vec<(String, HookSet)>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl HookRegistry {
    /// A registry with no entries; every command resolves to identity.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The built-in entries (currently just `pianobar`).
    pub fn builtin() -> Self {
        Self::empty().with("pianobar", Arc::new(PianobarHooks))
    }

    /// Configured rules, consulted before the built-ins.
    pub fn from_rules(rules: &[HookRule]) -> SessionResult<Self> {
        let mut registry = Self::empty();
        for rule in rules {
            registry = registry.with(rule.matches.clone(), Arc::new(rule.compile()?));
        }
        registry.entries.extend(Self::builtin().entries);
        Ok(registry)
    }

    /// Append an entry.
    pub fn with(mut self, pattern: impl Into<String>, hooks: HookSet) -> Self {
        self.entries.push((pattern.into(), hooks));
        self
    }

    /// Select hooks for `command`.
    pub fn resolve(&self, command: &str) -> HookSet {
        for (pattern, hooks) in &self.entries {
            if command.contains(pattern.as_str()) {
                debug!(command, hooks = hooks.name(), "hooks selected");
                return hooks.clone();
            }
        }
        Arc::new(IdentityHooks)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
