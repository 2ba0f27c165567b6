//! Trigger matching rules.

use regex::Regex;

use crate::{Error, Result};

/// The parts of a message that active-trigger matching looks at.
#[derive(Debug, Clone, Copy)]
pub struct MatchInput<'a> {
    pub text: &'a str,
    /// Command prefix, `!` by default.
    pub prefix: &'a str,
    /// The bot's mention token, `<@id>`.
    pub mention: &'a str,
    /// Whether the message arrived in a direct-message channel.
    pub direct: bool,
}

impl MatchInput<'_> {
    /// Direct messages and messages containing the mention token address the bot.
    pub fn mentioned(&self) -> bool {
        self.direct || self.text.contains(self.mention)
    }

    /// Whether `trigger` fires for this message.
    ///
    /// Tried in order: `<prefix><trigger>` anywhere in the text; a message
    /// opening with the mention token where one word equals the trigger
    /// (case-insensitive); a direct message starting with the trigger.
    pub fn matches_active(&self, trigger: &str) -> bool {
        if trigger.is_empty() {
            return false;
        }
        if self.text.contains(&format!("{}{trigger}", self.prefix)) {
            return true;
        }
        if let Some(rest) = self.text.strip_prefix(&format!("{} ", self.mention))
            && rest.split(' ').any(|word| word.eq_ignore_ascii_case(trigger))
        {
            return true;
        }
        self.direct && self.text.to_lowercase().starts_with(&trigger.to_lowercase())
    }
}

/// A plugin is considered only when it does not need a mention, or got one.
pub fn eligible(mentioned: bool, requires_mention: bool) -> bool {
    mentioned || !requires_mention
}

/// Replace the first `<prefix><trigger>` with the bare trigger.
pub fn strip_prefix(text: &str, prefix: &str, trigger: &str) -> String {
    text.replacen(&format!("{prefix}{trigger}"), trigger, 1)
}

/// Compile a passive trigger pattern.
pub fn compile_passive(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Every non-overlapping match of `re` in `text`, in order.
pub fn passive_matches<'t>(re: &Regex, text: &'t str) -> Vec<&'t str> {
    re.find_iter(text).map(|m| m.as_str()).collect()
}
