//! Chat phrase generation for `socialize` and `trade`.

use rand::seq::IndexedRandom;

/// Source of chat lines.
pub trait Phrasebook: Send + Sync {
    /// A greeting, optionally addressed to `target`.
    fn greeting(&self, target: Option<&str>) -> String;

    /// A trade proposal to `target`.
    fn trade_offer(&self, target: &str, offer: &str, request: &str) -> String {
        format!("Hey {target}, want to trade {offer} for {request}?")
    }
}

/// The stock phrasebook: one of four random greetings.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPhrasebook;

impl Phrasebook for DefaultPhrasebook {
    fn greeting(&self, target: Option<&str>) -> String {
        let templates: [fn(Option<&str>) -> String; 4] = [
            |t| format!("Hello {}!", t.unwrap_or("friend")),
            |t| format!("Greetings {}", t.unwrap_or("traveler")),
            |_| "Nice day, isn't it?".to_owned(),
            |_| "How are you doing?".to_owned(),
        ];
        let mut rng = rand::rng();
        templates
            .choose(&mut rng)
            .map_or_else(|| "Hello!".to_owned(), |pick| pick(target))
    }
}
