use std::sync::LazyLock;

use regex::Regex;

pub const MIN_CHARS: usize = 2_000;
pub const MAX_CHARS: usize = 5_000;
pub const MIN_HASHTAGS: usize = 3;
pub const MAX_HASHTAGS: usize = 5;

static HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(?:^|[\s　])[#＃][^\s#＃]+").expect("hashtag pattern compiles"));
static EMOJI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{1F000}-\x{1FAFF}\x{2600}-\x{27BF}]").expect("emoji pattern compiles"));

/// Checks written chapter text against the rules the prompt asks the model
/// to follow. Nothing is rejected; findings are returned as warnings.
///
/// - length between [`MIN_CHARS`] and [`MAX_CHARS`] characters
/// - between [`MIN_HASHTAGS`] and [`MAX_HASHTAGS`] hashtags
/// - no emoji
pub fn inspect(content: &str) -> Vec<String> {
    let mut warnings = Vec::new();

    let chars = content.chars().count();
    if !(MIN_CHARS..=MAX_CHARS).contains(&chars) {
        warnings.push(format!("length {chars} chars is outside {MIN_CHARS}-{MAX_CHARS}"));
    }

    let tags = HASHTAG.find_iter(content).count();
    if !(MIN_HASHTAGS..=MAX_HASHTAGS).contains(&tags) {
        warnings.push(format!("{tags} hashtags, expected {MIN_HASHTAGS}-{MAX_HASHTAGS}"));
    }

    let found = EMOJI.find_iter(content).count();
    if found > 0 {
        warnings.push(format!("contains {found} emoji"));
    }

    warnings
}
