//! Canned chat replies.

use rand::seq::SliceRandom;

pub const GREETING: &str = "Hi! Send me a YouTube link and I'll download the video for you.";

pub const UNRECOGNIZED: &str = "I don't understand that. Send me a link to a YouTube video.";

pub const TOO_LARGE: &str = "The video is too large for the chat (50 MB limit). Try another one.";

const DOWNLOADING_QUOTES: &[&str] = &[
    "On it. Fetching your video...",
    "Downloading. Good things come to those who wait.",
    "Rolling the tape, hang on.",
    "Give me a moment, the bits are on their way.",
    "Working on it. Grab a coffee.",
];

const ERROR_QUOTES: &[&str] = &[
    "Sorry, I couldn't get that video. Please try again later.",
    "Something went wrong while fetching the video. Try another link.",
    "The tape snapped. This video can't be delivered right now.",
    "No luck this time. Please try again in a bit.",
];

pub fn downloading_quote() -> &'static str {
    pick(DOWNLOADING_QUOTES)
}

pub fn error_quote() -> &'static str {
    pick(ERROR_QUOTES)
}

pub fn is_error_quote(text: &str) -> bool {
    ERROR_QUOTES.contains(&text)
}

pub fn is_downloading_quote(text: &str) -> bool {
    DOWNLOADING_QUOTES.contains(&text)
}

fn pick(list: &'static [&'static str]) -> &'static str {
    list.choose(&mut rand::thread_rng()).copied().unwrap_or("...")
}
