/// Platform domains that are never reported as phishing.
///
/// Matched exactly and case-sensitively; subdomains are not covered.
pub const PLATFORM_DOMAINS: &[&str] = &[
    "discord.com",
    "discord.gg",
    "discord.media",
    "discord.new",
    "discord.gift",
    "discord.dev",
    "discordapp.com",
    "discordapp.net",
    "discordstatus.com",
    "dis.gd",
];

pub fn is_allowlisted(domain: &str) -> bool {
    PLATFORM_DOMAINS.contains(&domain)
}
