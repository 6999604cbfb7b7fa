//! Static 78-card catalog and shuffling.

use lazy_static::lazy_static;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

/// Number of cards in a full deck
pub const DECK_SIZE: usize = 78;

/// Whether a card was drawn upright or reversed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Orientation {
    Upright,
    Reversed,
}

impl Orientation {
    /// Label used in prompts
    pub fn label_zh(self) -> &'static str {
        match self {
            Orientation::Upright => "正位",
            Orientation::Reversed => "逆位",
        }
    }
}

/// Catalog entry, shared by every deck
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardInfo {
    pub identifier: String,
    pub name: String,
    pub display_name: String,
}

/// A card as drawn in a reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Card {
    pub identifier: String,
    pub name: String,
    pub display_name: String,
    pub image_ref: String,
    pub orientation: Orientation,
}

const MAJOR_ARCANA: [(&str, &str); 22] = [
    ("The Fool", "愚者"),
    ("The Magician", "魔術師"),
    ("The High Priestess", "女祭司"),
    ("The Empress", "皇后"),
    ("The Emperor", "皇帝"),
    ("The Hierophant", "教皇"),
    ("The Lovers", "戀人"),
    ("The Chariot", "戰車"),
    ("Strength", "力量"),
    ("The Hermit", "隱者"),
    ("Wheel of Fortune", "命運之輪"),
    ("Justice", "正義"),
    ("The Hanged Man", "倒吊人"),
    ("Death", "死神"),
    ("Temperance", "節制"),
    ("The Devil", "惡魔"),
    ("The Tower", "高塔"),
    ("The Star", "星星"),
    ("The Moon", "月亮"),
    ("The Sun", "太陽"),
    ("Judgement", "審判"),
    ("The World", "世界"),
];

/// (identifier prefix, English suit, Chinese suit)
const SUITS: [(&str, &str, &str); 4] = [
    ("wa", "Wands", "權杖"),
    ("cu", "Cups", "聖杯"),
    ("sw", "Swords", "寶劍"),
    ("pe", "Pentacles", "錢幣"),
];

/// (identifier suffix, English rank, Chinese rank)
const RANKS: [(&str, &str, &str); 14] = [
    ("ac", "Ace", "王牌"),
    ("02", "Two", "二"),
    ("03", "Three", "三"),
    ("04", "Four", "四"),
    ("05", "Five", "五"),
    ("06", "Six", "六"),
    ("07", "Seven", "七"),
    ("08", "Eight", "八"),
    ("09", "Nine", "九"),
    ("10", "Ten", "十"),
    ("pa", "Page", "侍者"),
    ("kn", "Knight", "騎士"),
    ("qu", "Queen", "皇后"),
    ("ki", "King", "國王"),
];

lazy_static! {
    static ref CATALOG: Vec<CardInfo> = build_catalog();
}

fn build_catalog() -> Vec<CardInfo> {
    let majors = MAJOR_ARCANA
        .iter()
        .enumerate()
        .map(|(i, (name, zh))| CardInfo {
            identifier: format!("ar{i:02}"),
            name: (*name).to_string(),
            display_name: (*zh).to_string(),
        });

    let minors = SUITS.iter().flat_map(|(prefix, suit, suit_zh)| {
        RANKS.iter().map(move |(suffix, rank, rank_zh)| CardInfo {
            identifier: format!("{prefix}{suffix}"),
            name: format!("{rank} of {suit}"),
            display_name: format!("{suit_zh}{rank_zh}"),
        })
    });

    majors.chain(minors).collect()
}

/// The full catalog in canonical order
pub fn catalog() -> &'static [CardInfo] {
    &CATALOG
}

/// A shuffled deck with orientations fixed at shuffle time
#[derive(Debug, Clone, PartialEq)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// Shuffle a fresh deck with the thread-local RNG
    pub fn shuffled(image_base_url: &str) -> Self {
        Self::shuffled_with(image_base_url, &mut rand::thread_rng())
    }

    /// Shuffle a fresh deck with the given RNG
    pub fn shuffled_with<R: Rng + ?Sized>(image_base_url: &str, rng: &mut R) -> Self {
        let base = image_base_url.trim_end_matches('/');
        let mut cards: Vec<Card> = catalog()
            .iter()
            .map(|info| Card {
                identifier: info.identifier.clone(),
                name: info.name.clone(),
                display_name: info.display_name.clone(),
                image_ref: format!("{base}/{}.jpg", info.identifier),
                orientation: Orientation::Upright,
            })
            .collect();

        cards.shuffle(rng);
        for card in &mut cards {
            if rng.gen_bool(0.5) {
                card.orientation = Orientation::Reversed;
            }
        }
        Self { cards }
    }

    /// Card at a 1-based draw position
    pub fn draw(&self, position: usize) -> Option<&Card> {
        position.checked_sub(1).and_then(|idx| self.cards.get(idx))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}
