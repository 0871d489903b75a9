use rand::seq::SliceRandom;
use rand::Rng;

/// Topics drawn from when `NEWS_TOPICS` is not set.
pub const DEFAULT_TOPICS: &[&str] = &[
    "artificial intelligence",
    "climate change",
    "space exploration",
    "renewable energy",
    "public health",
    "quantum computing",
    "ocean conservation",
    "cybersecurity",
    "education technology",
    "archaeology",
    "biodiversity",
    "electric vehicles",
    "global economy",
    "neuroscience",
    "urban planning",
];

pub fn default_topics() -> Vec<String> {
    DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect()
}

/// Uniform pick; `None` only for an empty list.
pub fn pick_topic<'a, R: Rng + ?Sized>(topics: &'a [String], rng: &mut R) -> Option<&'a str> {
    topics.choose(rng).map(String::as_str)
}
