use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "Happy", "Brave", "Clever", "Wise", "Swift", "Calm", "Bright", "Kind", "Bold", "Neat",
    "Cool", "Witty", "Eager", "Proud", "Gentle", "Wild", "Jolly", "Sunny", "Quirky", "Funny",
    "Smart", "Lucky", "Noble", "Lively", "Strong",
];

const NOUNS: &[&str] = &[
    "Panda", "Tiger", "Dolphin", "Eagle", "Lion", "Wolf", "Bear", "Owl", "Fox", "Hawk",
    "Deer", "Horse", "Koala", "Falcon", "Otter", "Phoenix", "Dragon", "Unicorn", "Wizard",
    "Knight", "Explorer", "Voyager", "Pioneer", "Champion", "Rider",
];

/// `AdjectiveNoun123`, e.g. `HappyPanda42`.
pub fn random_nickname() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Happy");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("Panda");
    format!("{}{}{}", adjective, noun, rng.gen_range(0..1000))
}
