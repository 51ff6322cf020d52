use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

static BLANK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("blank line pattern"));

/// Split uploaded text into knowledge blocks separated by blank lines.
pub fn split_blocks(input: &str) -> Vec<String> {
    let normalized = input.replace("\r\n", "\n");
    BLANK_LINE
        .split(&normalized)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(str::to_string)
        .collect()
}

/// First non-empty line of a block, used as its heading.
pub fn heading(block: &str) -> &str {
    block
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    hex::encode(hasher.finalize())
}
