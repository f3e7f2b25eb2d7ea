//! User-facing reply texts (sent with HTML parse mode)

use crate::error::Error;

/// Escape text for Telegram's HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// `/start` greeting
pub fn greeting() -> &'static str {
    "👋 Hi! I download videos.\n\n\
     Send me a link to a video from:\n\
     • YouTube\n\
     • TikTok\n\
     • Instagram (Reels and regular posts)\n\n\
     and I will send the video back to you!"
}

/// `/help` usage
pub fn help() -> &'static str {
    "📖 Help\n\n\
     Commands:\n\
     /start - Start using the bot\n\
     /help - Show this message\n\n\
     Usage:\n\
     Just send a video link and I will download it for you!\n\n\
     Supported platforms:\n\
     • YouTube (youtube.com, youtu.be)\n\
     • TikTok (tiktok.com)\n\
     • Instagram (instagram.com)"
}

/// Reply to an unrecognised command
pub fn unknown_command() -> &'static str {
    "❓ Unknown command. Use /help for usage."
}

/// Text carried no link at all
pub fn send_valid_link() -> &'static str {
    "❌ Please send a valid video link."
}

/// Text looked like a link but none could be extracted
pub fn could_not_extract() -> &'static str {
    "❌ Could not extract a link from the message."
}

/// Link belongs to no supported platform
pub fn unsupported_platform(url: &str) -> String {
    format!(
        "❌ Unsupported platform or invalid URL: {}\nSupported: YouTube, TikTok, Instagram.",
        escape_html(url)
    )
}

/// Status message for a direct request
pub fn accepted() -> &'static str {
    "⏳ Request accepted, starting the download..."
}

/// Status message for an inline request
pub fn inline_accepted() -> &'static str {
    "⏳ Processing inline request, downloading the video..."
}

/// Download queue is full
pub fn overloaded() -> &'static str {
    "⚠️ Too many requests at once. Please try again in a couple of minutes."
}

/// The bot is shutting down
pub fn shutting_down() -> &'static str {
    "⚠️ The bot is restarting. Please try again shortly."
}

/// Prompt an unauthorized user for a token
pub fn token_required() -> &'static str {
    "🔒 This bot is available by access token only.\nSend me the token you got from the administrator."
}

/// Token was rejected
pub fn invalid_token() -> &'static str {
    "❌ Invalid access token.\nCheck the token or contact the administrator."
}

/// Token was accepted
pub fn authorized() -> &'static str {
    "✅ Authorization successful! You can now send video links."
}

/// Private-chat notice for an unauthorized inline user
pub fn protected_bot() -> &'static str {
    "🔒 This bot is protected. Send your access token to the bot in a private chat to continue."
}

/// Inline article title for unauthorized users
pub fn inline_auth_title() -> &'static str {
    "Authorization required"
}

/// Inline article text for unauthorized users
pub fn inline_auth_body() -> &'static str {
    "This bot is protected.\nOpen a private chat with the bot and send the access token you got from the administrator."
}

/// Inline article title offering a download
pub fn inline_download_title() -> &'static str {
    "Download video"
}

/// Inline article text posted when the download result is picked
pub fn inline_download_body(url: &str) -> String {
    format!("⏳ Download request:\n{}\n\nThe bot will send the video to your private chat.", url)
}

/// Inline article title when the query has no link
pub fn inline_help_title() -> &'static str {
    "Enter a video link"
}

/// Inline article text when the query has no link
pub fn inline_help_body() -> &'static str {
    "Example: https://www.youtube.com/watch?v=dQw4w9WgXcQ"
}

/// Secondary line on every inline article
pub fn inline_description() -> &'static str {
    "YouTube, TikTok and Instagram are supported"
}

/// Backend failed
pub fn download_failed(error: &Error) -> String {
    format!("❌ Error downloading the video: {}", escape_html(&error.to_string()))
}

/// Artifact could not be measured
pub fn size_check_failed() -> &'static str {
    "❌ Error checking the file size."
}

/// Artifact exceeds the ceiling
pub fn too_large(size: u64, limit: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    format!(
        "❌ The video is too large ({:.2} MB). The limit is {:.0} MB.",
        size as f64 / MIB,
        limit as f64 / MIB
    )
}

/// Delivery failed
pub fn send_failed(error: &Error) -> String {
    format!("❌ Error sending the video: {}", escape_html(&error.to_string()))
}

/// Processing crashed
pub fn internal_error() -> &'static str {
    "❌ Something went wrong while processing your request."
}
