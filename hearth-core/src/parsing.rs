//! Small text helpers shared by the handlers.

/// Replaced with the bot's own nick.
pub const NICK_TAG: &str = "{%nick%}";
/// Replaced with the nick of whoever sent the line.
pub const USER_TAG: &str = "{%user%}";
/// Replaced with the channel (or the bot's nick, for a PM).
pub const CHANNEL_TAG: &str = "{%channel%}";

/// Whether `template` contains any placeholder.
pub fn has_tags(template: &str) -> bool {
    [NICK_TAG, USER_TAG, CHANNEL_TAG]
        .iter()
        .any(|tag| template.contains(tag))
}

/// Substitute placeholders in a plain-text template.
pub fn liquefy(template: &str, user: &str, nick: &str, channel: &str) -> String {
    template
        .replace(NICK_TAG, nick)
        .replace(USER_TAG, user)
        .replace(CHANNEL_TAG, channel)
}

/// Substitute placeholders in a regex template.
///
/// Values are escaped so a nick like `bot|away` matches literally.
pub fn liquefy_pattern(template: &str, user: &str, nick: &str, channel: &str) -> String {
    liquefy(
        template,
        &regex::escape(user),
        &regex::escape(nick),
        &regex::escape(channel),
    )
}

/// IRC names compare case-insensitively.
pub fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
