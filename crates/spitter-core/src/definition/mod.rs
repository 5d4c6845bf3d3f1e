//! Modelfile rewriting.
//!
//! The local Modelfile references its weights through local paths. Before it
//! is sent to the remote, those `FROM` lines are removed together with
//! comments, and one `FROM @<digest>` line per synced layer is prepended.

mod provider;

pub use provider::{DefinitionProvider, OllamaShowProvider};

use crate::manifest::Digest;

/// Line prefix Ollama leaks into its output on some Windows consoles.
const CONSOLE_MODE_NOISE: &str = "failed to get console mode";

/// Whether a Modelfile line survives the rewrite.
fn keep_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    !(trimmed.starts_with('#')
        || is_from_directive(trimmed)
        || trimmed.starts_with(CONSOLE_MODE_NOISE))
}

/// `FROM` is case-insensitive in Modelfiles and must stand on its own.
fn is_from_directive(trimmed: &str) -> bool {
    let Some(keyword) = trimmed.get(..4) else {
        return false;
    };
    keyword.eq_ignore_ascii_case("FROM")
        && trimmed[4..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace)
}

/// Drop comment lines, `FROM` lines and console noise, keeping the rest verbatim.
pub fn filter_modelfile(input: &str) -> String {
    input
        .split('\n')
        .filter(|line| keep_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the remote Modelfile: one `FROM @<digest>` per base layer, in order,
/// followed by the filtered local text.
pub fn rewrite_modelfile(local: &str, base_layers: &[Digest]) -> String {
    let mut modelfile = String::new();
    for digest in base_layers {
        modelfile.push_str("FROM @");
        modelfile.push_str(&digest.to_string());
        modelfile.push('\n');
    }
    modelfile.push_str(&filter_modelfile(local));
    modelfile
}
