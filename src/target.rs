//! Target list parsing.
//!
//! The input is newline-delimited. Lines are trimmed; blank lines and lines
//! starting with `#` are skipped. A line starting with `EXEC ` is a script to
//! run in both browsers instead of a path to navigate to.

use std::fmt;
use std::io::BufRead;

use url::Url;

/// Prefix marking a line as an inline script
pub const SCRIPT_MARKER: &str = "EXEC ";

/// One unit of comparison work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    text: String,
    is_script: bool,
    index: usize,
}

impl Target {
    /// Build a target from an already trimmed, non-comment line
    pub fn new(index: usize, line: &str) -> Self {
        match line.strip_prefix(SCRIPT_MARKER) {
            Some(script) => Self {
                text: script.to_string(),
                is_script: true,
                index,
            },
            None => Self {
                text: line.to_string(),
                is_script: false,
                index,
            },
        }
    }

    /// Path or script text, without the script marker
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_script(&self) -> bool {
        self.is_script
    }

    /// Zero-based position among the retained lines
    pub fn index(&self) -> usize {
        self.index
    }

    /// URL this target navigates to on `base`; `None` for scripts
    pub fn url_on(&self, base: &Url) -> Option<Result<Url, url::ParseError>> {
        (!self.is_script).then(|| base.join(&self.text))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_script {
            write!(f, "{}{}", SCRIPT_MARKER, self.text)
        } else {
            write!(f, "{}", self.text)
        }
    }
}

/// Split an input text into targets
pub fn parse_targets(input: &str) -> Vec<Target> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .enumerate()
        .map(|(index, line)| Target::new(index, line))
        .collect()
}

/// Read targets from a line source such as a file or stdin
pub fn read_targets(reader: impl BufRead) -> std::io::Result<Vec<Target>> {
    let mut targets = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        targets.push(Target::new(targets.len(), line));
    }
    Ok(targets)
}
