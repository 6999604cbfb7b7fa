//! Traditional Chinese prompt templates for tarot interpretation.

use crate::llm::ChatMessage;

use super::deck::Card;
use super::workflow::SpreadKind;

const SINGLE_POSITIONS: [&str; 1] = ["對問題的核心指引"];

const THREE_POSITIONS: [&str; 3] = [
    "當前的狀況或是問題的根源",
    "當前面臨的挑戰或機遇",
    "可能的結果或建議",
];

const CELTIC_POSITIONS: [&str; 10] = [
    "目前的處境",
    "面臨的阻礙或挑戰",
    "潛意識的根基",
    "過去的影響",
    "意識中的目標",
    "近期的發展",
    "自身的態度",
    "外在環境與他人的影響",
    "希望與恐懼",
    "最終的結果",
];

const ORDINALS: [&str; 10] = ["一", "二", "三", "四", "五", "六", "七", "八", "九", "十"];

/// Position meanings for a spread, one per drawn card
pub fn positions(spread: SpreadKind) -> &'static [&'static str] {
    match spread {
        SpreadKind::Single => &SINGLE_POSITIONS,
        SpreadKind::Three => &THREE_POSITIONS,
        SpreadKind::CelticCross => &CELTIC_POSITIONS,
    }
}

fn ordinal(index: usize) -> String {
    ORDINALS
        .get(index)
        .map(|zh| (*zh).to_string())
        .unwrap_or_else(|| (index + 1).to_string())
}

fn card_label(card: &Card) -> String {
    format!("{}（{}）", card.display_name, card.orientation.label_zh())
}

/// Reader persona, the question and every drawn card with its position
pub fn system_prompt(question: &str, spread: SpreadKind, cards: &[Card]) -> String {
    let drawn = cards
        .iter()
        .zip(positions(spread))
        .enumerate()
        .map(|(i, (card, position))| {
            format!("第{}張：{}，代表{}", ordinal(i), card_label(card), position)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "你是一位專業的塔羅牌讀者，擅長解讀塔羅牌的深層含義。請注意以下幾點：\n\
         1. 請使用繁體中文進行解讀\n\
         2. 請考慮卡片的正逆位\n\
         3. 解讀時要結合提問的具體情境\n\
         4. 給出明確且具體的指引\n\n\
         使用者的問題是：{question}\n\
         抽到的{count}張牌是：\n{drawn}",
        count = cards.len(),
    )
}

/// Request for the card at `index` (0-based)
pub fn card_prompt(index: usize, card: &Card, position: &str) -> String {
    format!(
        "第{}張牌是{}，代表{}，請解讀這張牌的含義：",
        ordinal(index),
        card_label(card),
        position
    )
}

/// Request for the closing synthesis
pub fn overall_prompt(card_count: usize) -> String {
    if card_count == 1 {
        "請根據這張牌的能量，給出一個完整的解讀，包含當前處境以及未來的建議：".to_string()
    } else {
        format!(
            "請綜合{}張牌的能量，給出一個完整的解讀。包含當前處境、面臨的挑戰以及未來的建議：",
            ordinal(card_count - 1)
        )
    }
}

/// Prompt messages for every interpretation call, in call order
///
/// One entry per card followed by the overall pass. Every entry shares the
/// same system framing.
pub fn reading_messages(question: &str, spread: SpreadKind, cards: &[Card]) -> Vec<Vec<ChatMessage>> {
    let system = system_prompt(question, spread, cards);
    let per_card = cards
        .iter()
        .zip(positions(spread))
        .enumerate()
        .map(|(i, (card, position))| card_prompt(i, card, position));

    per_card
        .chain(std::iter::once(overall_prompt(cards.len())))
        .map(|prompt| vec![ChatMessage::system(system.clone()), ChatMessage::user(prompt)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tarot::deck::Orientation;

    fn card(name: &str, orientation: Orientation) -> Card {
        Card {
            identifier: "ar00".to_string(),
            name: "The Fool".to_string(),
            display_name: name.to_string(),
            image_ref: "u/ar00.jpg".to_string(),
            orientation,
        }
    }

    #[test]
    fn test_positions_match_draw_counts() {
        for spread in [SpreadKind::Single, SpreadKind::Three, SpreadKind::CelticCross] {
            assert_eq!(positions(spread).len(), spread.draw_count());
        }
    }

    #[test]
    fn test_system_prompt_lists_cards_with_orientation() {
        let cards = vec![
            card("愚者", Orientation::Upright),
            card("月亮", Orientation::Reversed),
            card("太陽", Orientation::Upright),
        ];
        let prompt = system_prompt("事業", SpreadKind::Three, &cards);
        assert!(prompt.contains("使用者的問題是：事業"));
        assert!(prompt.contains("第二張：月亮（逆位），代表當前面臨的挑戰或機遇"));
        assert!(prompt.contains("抽到的3張牌是"));
    }

    #[test]
    fn test_reading_messages_order() {
        let cards = vec![card("愚者", Orientation::Upright), card("月亮", Orientation::Upright), card("太陽", Orientation::Reversed)];
        let messages = reading_messages("感情", SpreadKind::Three, &cards);
        assert_eq!(messages.len(), 4);
        assert!(messages[0][1].content.starts_with("第一張牌是愚者"));
        assert!(messages[2][1].content.starts_with("第三張牌是太陽（逆位）"));
        assert!(messages[3][1].content.starts_with("請綜合三張牌"));
    }
}
